//! Concurrent fan-out / fan-in over independent units of work.
//!
//! Every unit reports exactly one outcome. A unit that panics is caught at its
//! task boundary and reported as a [`ErrorKind::Connection`] failure; a unit
//! whose task vanishes without reporting gets the same treatment when the
//! coordinator drains the result channel. [`FanOut::run`] returns only once all
//! units are accounted for.
//!
//! [`ErrorKind::Connection`]: crate::ErrorKind::Connection

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::error::ClassifiedError;

/// How unit tasks are scheduled onto the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// One task per unit.
    #[default]
    Unbounded,
    /// A fixed number of workers pulling units from a shared queue.
    Bounded(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutOptions {
    pub scheduling: Scheduling,
    /// Cancel units that have not finished once a unit fails with a
    /// timeout or connection error. Supplier rejections of a single unit
    /// never cancel its siblings.
    pub fail_fast: bool,
}

impl FanOutOptions {
    pub fn bounded(workers: usize) -> Self {
        Self {
            scheduling: Scheduling::Bounded(workers),
            ..Self::default()
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitSuccess<T> {
    pub index: usize,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub index: usize,
    pub error: ClassifiedError,
}

/// Accumulated outcomes of one fan-out, each list ordered by unit index.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutReport<T> {
    pub successes: Vec<UnitSuccess<T>>,
    pub errors: Vec<UnitFailure>,
}

impl<T> Default for FanOutReport<T> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> FanOutReport<T> {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn total(&self) -> usize {
        self.success_count() + self.error_count()
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<ClassifiedError>) {
        (
            self.successes.into_iter().map(|success| success.value).collect(),
            self.errors.into_iter().map(|failure| failure.error).collect(),
        )
    }
}

type Outcome<T> = (usize, Result<T, ClassifiedError>);

#[derive(Debug, Clone, Copy, Default)]
pub struct FanOut {
    options: FanOutOptions,
}

impl FanOut {
    pub fn new(options: FanOutOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> FanOutOptions {
        self.options
    }

    /// Runs `work` once per unit and waits for every outcome.
    pub async fn run<U, T, W, Fut>(&self, units: Vec<U>, work: W) -> FanOutReport<T>
    where
        U: Send + 'static,
        T: Send + 'static,
        W: Fn(U) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        let total = units.len();
        if total == 0 {
            return FanOutReport::default();
        }

        let work = Arc::new(work);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<Outcome<T>>();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let fail_fast = self.options.fail_fast;

        match self.options.scheduling {
            Scheduling::Unbounded => {
                for (index, unit) in units.into_iter().enumerate() {
                    let work = Arc::clone(&work);
                    let results_tx = results_tx.clone();
                    let cancel_rx = cancel_rx.clone();
                    tokio::spawn(
                        async move {
                            let outcome =
                                run_unit(index, unit, work.as_ref(), fail_fast, cancel_rx).await;
                            let _ = results_tx.send((index, outcome));
                        }
                        .in_current_span(),
                    );
                }
            }
            Scheduling::Bounded(workers) => {
                let queue = Arc::new(Mutex::new(
                    units.into_iter().enumerate().collect::<VecDeque<_>>(),
                ));
                for _ in 0..workers.clamp(1, total) {
                    let queue = Arc::clone(&queue);
                    let work = Arc::clone(&work);
                    let results_tx = results_tx.clone();
                    let cancel_rx = cancel_rx.clone();
                    tokio::spawn(
                        async move {
                            loop {
                                let next = queue
                                    .lock()
                                    .expect("fan-out queue lock is not poisoned")
                                    .pop_front();
                                let Some((index, unit)) = next else {
                                    break;
                                };
                                let outcome = run_unit(
                                    index,
                                    unit,
                                    work.as_ref(),
                                    fail_fast,
                                    cancel_rx.clone(),
                                )
                                .await;
                                let _ = results_tx.send((index, outcome));
                            }
                        }
                        .in_current_span(),
                    );
                }
            }
        }
        drop(results_tx);
        drop(cancel_rx);

        let mut outcomes: Vec<Option<Result<T, ClassifiedError>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        while let Some((index, outcome)) = results_rx.recv().await {
            let Some(slot) = outcomes.get_mut(index) else {
                continue;
            };
            if slot.is_some() {
                tracing::warn!(unit = index, "fan-out unit reported twice; keeping first outcome");
                continue;
            }
            if fail_fast && outcome.as_ref().is_err_and(ClassifiedError::is_fatal) {
                let _ = cancel_tx.send(true);
            }
            *slot = Some(outcome);
        }

        let mut report = FanOutReport::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(value)) => report.successes.push(UnitSuccess { index, value }),
                Some(Err(error)) => report.errors.push(UnitFailure { index, error }),
                None => {
                    tracing::error!(unit = index, "fan-out unit never reported an outcome");
                    report.errors.push(UnitFailure {
                        index,
                        error: ClassifiedError::connection(format!(
                            "unit {index} terminated without reporting an outcome"
                        )),
                    });
                }
            }
        }
        report
    }
}

async fn run_unit<U, T, W, Fut>(
    index: usize,
    unit: U,
    work: &W,
    fail_fast: bool,
    mut cancel_rx: watch::Receiver<bool>,
) -> Result<T, ClassifiedError>
where
    W: Fn(U) -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    let guarded = AssertUnwindSafe(async move { work(unit).await }).catch_unwind();

    let caught = if fail_fast {
        tokio::select! {
            biased;
            () = cancelled(&mut cancel_rx) => {
                return Err(ClassifiedError::connection(
                    "cancelled after a sibling unit failed",
                ));
            }
            caught = guarded => caught,
        }
    } else {
        guarded.await
    };

    caught.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(unit = index, panic = %message, "fan-out unit panicked");
        Err(ClassifiedError::connection(format!(
            "unit {index} terminated abnormally: {message}"
        )))
    })
}

/// Resolves once cancellation is signalled; never resolves if the coordinator is gone.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
