// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Bounded-concurrency fan-out for read-only tool batches.
//!
//! Results are reassembled by input index: callers observe source order no
//! matter how tasks interleave.  Cancellation is cooperative — in-flight
//! tasks are signalled through a watch channel and drained briefly before
//! their slots are recorded as cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::warn;

use tunacode_tools::{ToolError, ToolExecutor};

/// One call in a parallel batch.
#[derive(Debug, Clone)]
pub struct ParallelCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// How long in-flight tasks get to finish after cancellation before their
/// results are recorded as cancelled.
const CANCEL_DRAIN: Duration = Duration::from_millis(250);

/// Execute `calls` with at most `max_concurrency` running at once.
///
/// The output preserves input order and always has the same length as
/// `calls` — errors are collected, never short-circuited.  Tasks observe
/// `cancel`; once it flips, unfinished slots resolve to
/// [`ToolError::Cancelled`] within the drain window.
pub async fn execute_parallel(
    executor: Arc<dyn ToolExecutor>,
    calls: Vec<ParallelCall>,
    max_concurrency: usize,
    cancel: watch::Receiver<bool>,
) -> Vec<Result<String, ToolError>> {
    let gate = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let mut tasks = Vec::with_capacity(calls.len());
    for call in calls {
        let executor = Arc::clone(&executor);
        let gate = Arc::clone(&gate);
        let mut cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if *cancel.borrow() {
                return Err(ToolError::Cancelled);
            }
            // A closed semaphore never happens here; treat it as cancellation.
            let _permit = match gate.acquire().await {
                Ok(p) => p,
                Err(_) => return Err(ToolError::Cancelled),
            };
            tokio::select! {
                biased;
                _ = cancel.changed() => Err(ToolError::Cancelled),
                result = executor.invoke(&call.name, &call.args) => result,
            }
        }));
    }

    // Await in input order so the output indices line up with the calls.
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        let cancelled = *cancel.borrow();
        let outcome = if cancelled {
            // Drain briefly; a task that outlives the window is abandoned.
            match tokio::time::timeout(CANCEL_DRAIN, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    results.push(Err(ToolError::Cancelled));
                    continue;
                }
            }
        } else {
            task.await
        };
        results.push(match outcome {
            Ok(r) => r,
            Err(e) => {
                warn!("parallel tool task panicked: {e}");
                Err(ToolError::Transport(format!("tool task panicked: {e}")))
            }
        });
    }
    results
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowEcho {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delay_ms: u64,
    }

    #[async_trait]
    impl ToolExecutor for SlowEcho {
        async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if name == "boom" {
                return Err(ToolError::Domain("boom failed".into()));
            }
            Ok(format!("{name}:{args}"))
        }
    }

    fn calls(names: &[&str]) -> Vec<ParallelCall> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ParallelCall {
                id: format!("c{i}"),
                name: n.to_string(),
                args: json!({"i": i}),
            })
            .collect()
    }

    fn idle_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        let exec = Arc::new(SlowEcho {
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay_ms: 5,
        });
        let (_guard, rx) = idle_cancel();
        let results = execute_parallel(exec, calls(&["a", "b", "c"]), 8, rx).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().starts_with("a:"));
        assert!(results[1].as_ref().unwrap().starts_with("b:"));
        assert!(results[2].as_ref().unwrap().starts_with("c:"));
    }

    #[tokio::test]
    async fn errors_do_not_short_circuit() {
        let exec = Arc::new(SlowEcho {
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay_ms: 1,
        });
        let (_guard, rx) = idle_cancel();
        let results = execute_parallel(exec, calls(&["a", "boom", "c"]), 8, rx).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ToolError::Domain(_))));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_gate() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let exec = Arc::new(SlowEcho {
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
            delay_ms: 20,
        });
        let batch = calls(&["a", "b", "c", "d", "e", "f"]);
        let (_guard, rx) = idle_cancel();
        let _ = execute_parallel(exec, batch, 2, rx).await;
        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {} > 2", peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let exec = Arc::new(SlowEcho {
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay_ms: 1,
        });
        let (_guard, rx) = idle_cancel();
        let results = execute_parallel(exec, vec![], 4, rx).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_resolves_all_slots() {
        let exec = Arc::new(SlowEcho {
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay_ms: 10_000,
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(execute_parallel(exec, calls(&["a", "b"]), 8, rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let results = handle.await.unwrap();
        assert_eq!(results.len(), 2);
        for r in results {
            assert!(matches!(r, Err(ToolError::Cancelled)));
        }
    }
}
