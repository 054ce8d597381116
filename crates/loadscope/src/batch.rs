//! Fan-out / fan-in barrier.
//!
//! Every spec of a batch is spawned before any is awaited; the batch settles
//! only when every task has finished, even if one of them panicked.

use crate::catalog::RequestSpec;
use crate::client::{RequestExecutor, RequestResult};
use crate::progress::ProgressTracker;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Why a batch produced no results
#[derive(Debug)]
pub(crate) enum BatchError {
    /// At least one task failed to join; the rest were still drained
    Join(JoinError),
    /// The run was cancelled; outstanding tasks were aborted
    Cancelled,
}

/// Run `specs` concurrently and return their results in spec order
pub(crate) async fn run_batch(
    executor: &Arc<dyn RequestExecutor>,
    specs: &[RequestSpec],
    tracker: Option<&Arc<ProgressTracker>>,
    cancel: &CancellationToken,
) -> Result<Vec<RequestResult>, BatchError> {
    if cancel.is_cancelled() {
        return Err(BatchError::Cancelled);
    }

    let mut set = JoinSet::new();
    for (index, spec) in specs.iter().enumerate() {
        let executor = Arc::clone(executor);
        let tracker = tracker.cloned();
        let spec = spec.clone();
        set.spawn(async move {
            let result = executor.execute(&spec).await;
            if let Some(tracker) = tracker {
                tracker.advance();
            }
            (index, result)
        });
    }

    let mut slots: Vec<Option<RequestResult>> = vec![None; specs.len()];
    let mut join_error = None;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                set.abort_all();
                while set.join_next().await.is_some() {}
                return Err(BatchError::Cancelled);
            }
            joined = set.join_next() => match joined {
                Some(Ok((index, result))) => slots[index] = Some(result),
                Some(Err(err)) => {
                    if join_error.is_none() {
                        join_error = Some(err);
                    }
                }
                None => break,
            },
        }
    }

    match join_error {
        Some(err) => Err(BatchError::Join(err)),
        None => Ok(slots.into_iter().flatten().collect()),
    }
}
