use serde::Serialize;

use crate::error::ClassifiedError;
use crate::ledger::CallRecord;

/// Result envelope returned by every canonical operation.
///
/// Both lists are always serialized, empty or not, so callers can tell a clean
/// success from a degraded or failed run by looking at `payload` and `errors`
/// together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub payload: T,
    pub supplier_requests: Vec<CallRecord>,
    pub errors: Vec<ClassifiedError>,
}

impl<T> Envelope<T> {
    pub fn new(payload: T, supplier_requests: Vec<CallRecord>, errors: Vec<ClassifiedError>) -> Self {
        Self {
            payload,
            supplier_requests,
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            payload: f(self.payload),
            supplier_requests: self.supplier_requests,
            errors: self.errors,
        }
    }
}
