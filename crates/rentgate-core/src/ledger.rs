//! Append-only, lock-protected ledgers for call records and classified errors.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

use serde::Serialize;

use crate::error::ClassifiedError;
use crate::http_client::HttpMethod;
use crate::operation::OperationTag;
use crate::UtcDateTime;

/// Request half of a [`CallRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub started_at: UtcDateTime,
}

/// Response half of a [`CallRecord`]; absent when no response was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// One entry per attempted outbound call. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub operation: OperationTag,
    pub request: RecordedRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RecordedResponse>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallRecord {
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|response| response.status_code)
    }
}

/// Thread-safe, ordered, append-only collection.
///
/// Entries are ordered by arrival. The backing vector is never handed out.
pub struct Ledger<T> {
    entries: Mutex<Vec<T>>,
}

pub type CallLedger = Ledger<CallRecord>;
pub type ErrorLedger = Ledger<ClassifiedError>;

impl<T> Default for Ledger<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Ledger<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: T) {
        self.entries
            .lock()
            .expect("ledger lock is not poisoned")
            .push(entry);
    }

    pub fn add_all(&self, entries: impl IntoIterator<Item = T>) {
        let entries: Vec<T> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        self.entries
            .lock()
            .expect("ledger lock is not poisoned")
            .extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("ledger lock is not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Ledger<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.entries
            .lock()
            .expect("ledger lock is not poisoned")
            .clone()
    }

    /// Appends every entry of `other`; `other` is left untouched.
    pub fn merge(&self, other: &Ledger<T>) {
        if std::ptr::eq(self, other) {
            return;
        }
        // Copy out first so the two locks are never held together.
        let entries = other.snapshot();
        self.add_all(entries);
    }
}

impl<T: Debug> Debug for Ledger<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.entries.lock() {
            Ok(entries) => f.debug_list().entries(entries.iter()).finish(),
            Err(_) => f.write_str("Ledger(<poisoned>)"),
        }
    }
}

/// The call/error ledger pair owned by one operation (or nested sub-operation).
#[derive(Debug, Default)]
pub struct OperationLedgers {
    pub calls: CallLedger,
    pub errors: ErrorLedger,
}

impl OperationLedgers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a child operation's ledgers into this pair.
    pub fn merge(&self, child: &OperationLedgers) {
        self.calls.merge(&child.calls);
        self.errors.merge(&child.errors);
    }

    pub fn record_error(&self, error: ClassifiedError) {
        self.errors.add(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn add_all_preserves_order_after_existing_entries() {
        let ledger = Ledger::new();
        ledger.add(1);
        ledger.add_all(vec![2, 3]);

        assert_eq!(ledger.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn merge_appends_child_entries_without_draining_child() {
        let parent = OperationLedgers::new();
        let child = OperationLedgers::new();
        parent.record_error(ClassifiedError::supplier("parent"));
        child.record_error(ClassifiedError::timeout("child"));

        parent.merge(&child);

        assert_eq!(parent.errors.len(), 2);
        assert_eq!(child.errors.len(), 1);
        assert_eq!(parent.errors.snapshot()[1], ClassifiedError::timeout("child"));
    }

    #[test]
    fn merging_a_ledger_into_itself_is_a_no_op() {
        let ledger = Ledger::new();
        ledger.add("a");
        ledger.merge(&ledger);

        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn concurrent_threads_never_lose_entries() {
        let ledger = Arc::new(Ledger::new());
        let handles = (0..16)
            .map(|thread| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for index in 0..250 {
                        ledger.add(thread * 1_000 + index);
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().expect("thread completes");
        }

        let mut entries = ledger.snapshot();
        entries.sort_unstable();
        entries.dedup();
        assert_eq!(entries.len(), 16 * 250);
    }
}
