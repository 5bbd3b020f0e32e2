//! Behavior tests for concurrent fan-out / fan-in.
//!
//! The coordinator must account for every unit exactly once, whether the unit
//! succeeds, fails, panics or is cancelled, and must never hang doing so.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rentgate_core::{ClassifiedError, ErrorKind, FanOut, FanOutOptions};

fn every_third_fails(index: usize) -> Result<usize, ClassifiedError> {
    if index % 3 == 0 {
        Err(ClassifiedError::supplier(format!("unit {index} rejected")))
    } else {
        Ok(index)
    }
}

// ============================================================================
// Accounting
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn when_every_third_unit_fails_successes_and_errors_add_up() {
    for options in [FanOutOptions::default(), FanOutOptions::bounded(3)] {
        for units in [1_usize, 2, 3, 7, 30, 100] {
            // Given: K units where unit i fails when i is a multiple of three
            let fan_out = FanOut::new(options);
            let expected_errors = units.div_ceil(3);

            // When: The fan-out runs to completion
            let report = fan_out
                .run((0..units).collect(), |index| async move {
                    tokio::task::yield_now().await;
                    every_third_fails(index)
                })
                .await;

            // Then: Exactly K - ceil(K/3) values and ceil(K/3) errors come back
            assert_eq!(report.success_count(), units - expected_errors, "{options:?} k={units}");
            assert_eq!(report.error_count(), expected_errors, "{options:?} k={units}");
            assert!(report.successes.iter().all(|success| success.value % 3 != 0));
            assert!(report
                .errors
                .iter()
                .all(|failure| failure.error.kind() == ErrorKind::Supplier));
        }
    }
}

#[tokio::test]
async fn successes_come_back_in_unit_order_regardless_of_completion_order() {
    // Given: Units that finish in reverse order
    let fan_out = FanOut::default();

    // When: Later units complete first
    let report = fan_out
        .run((0..5_u64).collect(), |index| async move {
            tokio::time::sleep(Duration::from_millis(5 * (5 - index))).await;
            Ok::<_, ClassifiedError>(index)
        })
        .await;

    // Then: Values are still ordered by unit index
    let (values, errors) = report.into_parts();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert!(errors.is_empty());
}

// ============================================================================
// Fault containment
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn when_one_unit_panics_siblings_still_report_and_the_panic_is_a_connection_error() {
    for options in [FanOutOptions::default(), FanOutOptions::bounded(2)] {
        // Given: Six units, one of which panics
        let fan_out = FanOut::new(options);

        // When: The fan-out runs, bounded by a generous watchdog
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            fan_out.run((0..6_usize).collect(), |index| async move {
                if index == 4 {
                    panic!("supplier SDK blew up");
                }
                Ok::<_, ClassifiedError>(index)
            }),
        )
        .await
        .expect("fan-out must not hang on a panicking unit");

        // Then: Five successes and exactly one connection error naming the unit
        assert_eq!(report.success_count(), 5);
        assert_eq!(report.error_count(), 1);
        let failure = &report.errors[0];
        assert_eq!(failure.index, 4);
        assert_eq!(failure.error.kind(), ErrorKind::Connection);
        assert!(failure.error.message().contains("unit 4 terminated abnormally"));
        assert!(failure.error.message().contains("supplier SDK blew up"));
    }
}

#[tokio::test]
async fn without_fail_fast_every_unit_runs_to_completion() {
    // Given: A default (best effort) fan-out and a completion counter
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);

    // When: The first unit fails immediately and the rest are slow
    let report = FanOut::default()
        .run((0..4_usize).collect(), move |index| {
            let counter = Arc::clone(&counter);
            async move {
                if index == 0 {
                    return Err(ClassifiedError::timeout("deadline exceeded"));
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(index)
            }
        })
        .await;

    // Then: The sibling units were not cancelled
    assert_eq!(completed.load(Ordering::SeqCst), 3);
    assert_eq!(report.success_count(), 3);
    assert_eq!(report.error_count(), 1);
}

#[tokio::test]
async fn with_fail_fast_pending_units_are_cancelled_and_still_reported() {
    // Given: A fail-fast fan-out where unit 0 times out and the rest would take seconds
    let fan_out = FanOut::new(FanOutOptions::default().with_fail_fast(true));

    // When: The fan-out runs
    let report = tokio::time::timeout(
        Duration::from_secs(2),
        fan_out.run((0..4_usize).collect(), |index| async move {
            if index == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                return Err(ClassifiedError::timeout("deadline exceeded"));
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(index)
        }),
    )
    .await
    .expect("cancelled units must report promptly");

    // Then: Every unit is accounted for and the slow ones report cancellation
    assert_eq!(report.total(), 4);
    assert_eq!(report.success_count(), 0);
    assert_eq!(report.errors[0].error, ClassifiedError::timeout("deadline exceeded"));
    assert!(report.errors[1..]
        .iter()
        .all(|failure| failure.error.message() == "cancelled after a sibling unit failed"));
}

#[tokio::test]
async fn with_fail_fast_a_supplier_rejection_does_not_cancel_siblings() {
    // Given: A fail-fast fan-out where unit 0 is rejected by the supplier
    let fan_out = FanOut::new(FanOutOptions::default().with_fail_fast(true));

    // When: The other units take a little longer and succeed
    let report = tokio::time::timeout(
        Duration::from_secs(2),
        fan_out.run((0..4_usize).collect(), |index| async move {
            if index == 0 {
                return Err(ClassifiedError::supplier("INVALID CODE"));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(index)
        }),
    )
    .await
    .expect("fan-out completes");

    // Then: Only the rejected unit failed
    assert_eq!(report.success_count(), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].error, ClassifiedError::supplier("INVALID CODE"));
}

// ============================================================================
// Bounded scheduling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_pool_never_exceeds_its_worker_count() {
    // Given: A pool of two workers and twenty units
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (tracker, high_water) = (Arc::clone(&in_flight), Arc::clone(&peak));

    // When: Every unit holds its slot briefly
    let report = FanOut::new(FanOutOptions::bounded(2))
        .run((0..20_usize).collect(), move |index| {
            let (tracker, high_water) = (Arc::clone(&tracker), Arc::clone(&high_water));
            async move {
                let now = tracker.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                tracker.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ClassifiedError>(index)
            }
        })
        .await;

    // Then: All units ran, never more than two at once
    assert_eq!(report.success_count(), 20);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn zero_worker_pool_still_makes_progress() {
    // Given: A misconfigured pool of zero workers
    let fan_out = FanOut::new(FanOutOptions::bounded(0));

    // When: Units are submitted
    let report = fan_out
        .run(vec!["a", "b"], |unit| async move { Ok::<_, ClassifiedError>(unit.len()) })
        .await;

    // Then: At least one worker runs them
    assert_eq!(report.success_count(), 2);
}
