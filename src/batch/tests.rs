//! Unit tests for the batch executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::rstest;

use super::*;
use crate::error::ErrorKind;

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn ids(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("res-{n:02}")).collect()
}

#[rstest]
#[case(1, 1)]
#[case(7, 1)]
#[case(7, 3)]
#[case(3, 8)]
#[case(25, 5)]
#[tokio::test(start_paused = true)]
async fn every_target_gets_one_outcome_within_the_limit(
    #[case] count: usize,
    #[case] limit: usize,
) {
    let tracker = Arc::new(InFlight::default());
    let gauge = Arc::clone(&tracker);
    let job = BatchJob::new(ids(count), move |id: String| {
        let gauge = Arc::clone(&gauge);
        async move {
            gauge.enter();
            tokio::time::sleep(Duration::from_millis(50)).await;
            gauge.leave();
            Ok::<_, ApiError>(id)
        }
    })
    .with_concurrency(limit);

    let result = BatchExecutor::default().run(job).await;

    assert_eq!(result.outcomes.len(), count);
    assert_eq!(result.succeeded_count, count);
    assert!(tracker.peak() <= limit, "peak {} > {limit}", tracker.peak());
    assert!(result.is_success());
}

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn one_permanent_failure_is_isolated(#[case] limit: usize) {
    let job = BatchJob::new(["a", "b", "c"], |id: String| async move {
        if id == "b" {
            Err(ApiError::from_status(400, "rejected", None))
        } else {
            Ok(id)
        }
    })
    .with_concurrency(limit);

    let result = BatchExecutor::default().run(job).await;

    assert_eq!(
        result.outcomes.get("a"),
        Some(&BatchOutcome::Succeeded(String::from("a")))
    );
    assert!(matches!(
        result.outcomes.get("b"),
        Some(BatchOutcome::Failed(err)) if err.kind() == ErrorKind::Permanent
    ));
    assert_eq!(
        result.outcomes.get("c"),
        Some(&BatchOutcome::Succeeded(String::from("c")))
    );
    assert_eq!(result.succeeded_count, 2);
    assert_eq!(result.failed_count, 1);
    assert!(!result.is_success());
}

#[tokio::test]
async fn sequential_mode_preserves_input_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&order);
    let job = BatchJob::new(["z", "m", "a"], move |id: String| {
        recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.clone());
        async move { Ok::<_, ApiError>(()) }
    });

    let result = BatchExecutor::default().run(job).await;

    let seen = order.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert_eq!(seen, vec!["z", "m", "a"]);
    let listed: Vec<&str> = result.iter().map(|(id, _)| id).collect();
    assert_eq!(listed, vec!["z", "m", "a"]);
}

#[test]
fn duplicate_targets_collapse_to_first_occurrence() {
    let job = BatchJob::new(["a", "b", "a", "c", "b"], |_id: String| async {
        Ok::<_, ApiError>(())
    });
    assert_eq!(job.targets(), ["a", "b", "c"]);
    assert_eq!(job.with_concurrency(0).concurrency_limit(), 1);
}

#[rstest]
#[case(1)]
#[case(2)]
#[tokio::test(start_paused = true)]
async fn cancellation_marks_unfinished_targets(#[case] limit: usize) {
    let cancel = CancelSignal::new();
    let job = BatchJob::new(ids(6), |id: String| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, ApiError>(id)
    })
    .with_concurrency(limit);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let result = BatchExecutor::new(cancel).run(job).await;

    assert_eq!(result.outcomes.len(), 6);
    // Each worker finishes one item at 10s and is cut off during the second.
    assert_eq!(result.succeeded_count, limit);
    assert_eq!(result.cancelled_count, 6 - limit);
    assert_eq!(result.failed_count, 0);
    assert!(!result.is_success());
}

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn a_panicking_operation_is_reported_as_failed(#[case] limit: usize) {
    let job = BatchJob::new(["a", "b", "c"], |id: String| async move {
        if id == "b" {
            panic!("operation crashed on {id}");
        }
        Ok::<_, ApiError>(id)
    })
    .with_concurrency(limit);

    let result = BatchExecutor::default().run(job).await;

    assert!(matches!(
        result.outcomes.get("b"),
        Some(BatchOutcome::Failed(ApiError::Internal(_)))
    ));
    assert_eq!(result.succeeded_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.cancelled_count, 0);
}
