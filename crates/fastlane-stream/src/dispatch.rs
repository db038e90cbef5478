//! Fire-and-forget handler execution
//!
//! Handlers run as tokio tasks tracked in a `JoinSet`. The processor never
//! waits on them while consuming; finished tasks are collected
//! opportunistically, and the rest are either drained after finalize or
//! detached.

use crate::handler::{Handler, HandlerContext};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// How a handler run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum HandlerOutcome {
    /// Returned `Ok`
    Completed,
    /// Returned an error
    Failed(String),
    /// Panicked
    Panicked(String),
    /// Cancelled because the drain timeout elapsed
    Aborted,
}

impl HandlerOutcome {
    /// Whether the handler completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Completed)
    }
}

/// Report for one handler run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerReport {
    /// Condition index
    pub condition: usize,

    /// Condition name
    pub name: String,

    /// Elapsed stream time when the condition triggered
    pub triggered_secs: f64,

    /// Wall time the handler ran for
    pub duration_secs: f64,

    /// How it ended
    pub outcome: HandlerOutcome,
}

#[derive(Debug)]
struct PendingHandler {
    condition: usize,
    name: String,
    triggered_secs: f64,
    started: Instant,
}

/// Runs handlers without blocking stream consumption
///
/// Dropping a dispatcher detaches whatever is still running: handlers are
/// never cancelled implicitly.
#[derive(Debug, Default)]
pub struct Dispatcher {
    tasks: JoinSet<HandlerReport>,
    in_flight: HashMap<task::Id, PendingHandler>,
    reports: Vec<HandlerReport>,
}

impl Dispatcher {
    /// Empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `handler` for `ctx`
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, handler: &Handler, ctx: HandlerContext) {
        let condition = ctx.condition;
        let name = ctx.condition_name.clone();
        let triggered_secs = ctx.elapsed.as_secs_f64();

        debug!("Dispatching handler for condition '{}'", name);

        // The handler is called inside the task so a panic before its first
        // await is caught by the JoinSet too
        let handler = handler.clone();
        let report_name = name.clone();
        let abort = self.tasks.spawn(async move {
            let started = Instant::now();
            let outcome = match handler(ctx).await {
                Ok(()) => HandlerOutcome::Completed,
                Err(e) => HandlerOutcome::Failed(format!("{:#}", e)),
            };
            HandlerReport {
                condition,
                name: report_name,
                triggered_secs,
                duration_secs: started.elapsed().as_secs_f64(),
                outcome,
            }
        });

        self.in_flight.insert(
            abort.id(),
            PendingHandler {
                condition,
                name,
                triggered_secs,
                started: Instant::now(),
            },
        );
    }

    /// Handlers still running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Record handlers that have already finished, without waiting
    pub fn collect_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next_with_id() {
            self.settle(result);
        }
    }

    /// Wait for running handlers, aborting any still running after `timeout`
    ///
    /// Returns a report for every handler dispatched since the last drain or
    /// detach.
    pub async fn drain(&mut self, timeout: Duration) -> Vec<HandlerReport> {
        // A timeout too large to represent waits without a deadline
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let next = match deadline {
                Some(deadline) => {
                    tokio::time::timeout_at(deadline, self.tasks.join_next_with_id()).await
                }
                None => Ok(self.tasks.join_next_with_id().await),
            };
            match next {
                Ok(Some(result)) => self.settle(result),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} handler(s) still running after {:?}; aborting",
                        self.tasks.len(),
                        timeout
                    );
                    self.tasks.abort_all();
                    while let Some(result) = self.tasks.join_next_with_id().await {
                        self.settle(result);
                    }
                    break;
                }
            }
        }
        std::mem::take(&mut self.reports)
    }

    /// Stop tracking running handlers and let them finish on their own
    ///
    /// Returns reports for handlers that already finished.
    pub fn detach(&mut self) -> Vec<HandlerReport> {
        self.collect_finished();
        if !self.tasks.is_empty() {
            debug!("Detaching {} running handler(s)", self.tasks.len());
            self.tasks.detach_all();
            self.in_flight.clear();
        }
        std::mem::take(&mut self.reports)
    }

    fn settle(&mut self, result: Result<(task::Id, HandlerReport), JoinError>) {
        let report = match result {
            Ok((id, report)) => {
                self.in_flight.remove(&id);
                report
            }
            Err(join_error) => {
                let Some(pending) = self.in_flight.remove(&join_error.id()) else {
                    warn!("Untracked handler task {} ended: {}", join_error.id(), join_error);
                    return;
                };
                let outcome = if join_error.is_panic() {
                    HandlerOutcome::Panicked(panic_message(join_error.into_panic()))
                } else {
                    HandlerOutcome::Aborted
                };
                HandlerReport {
                    condition: pending.condition,
                    name: pending.name,
                    triggered_secs: pending.triggered_secs,
                    duration_secs: pending.started.elapsed().as_secs_f64(),
                    outcome,
                }
            }
        };

        match &report.outcome {
            HandlerOutcome::Completed => debug!(
                "Handler for '{}' completed in {:.3}s",
                report.name, report.duration_secs
            ),
            HandlerOutcome::Failed(message) => {
                error!("Handler for '{}' failed: {}", report.name, message)
            }
            HandlerOutcome::Panicked(message) => {
                error!("Handler for '{}' panicked: {}", report.name, message)
            }
            HandlerOutcome::Aborted => warn!("Handler for '{}' aborted", report.name),
        }
        self.reports.push(report);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.tasks.detach_all();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler, HandlerFuture};
    use fastlane_domain::{SnapshotFieldMap, StreamId};
    use std::sync::Arc;

    fn ctx(condition: usize, name: &str) -> HandlerContext {
        HandlerContext {
            stream_id: StreamId::new(),
            condition,
            condition_name: name.to_string(),
            fields: SnapshotFieldMap::default(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[tokio::test]
    async fn test_drain_reports_every_outcome() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(&handler(|_| async { Ok(()) }), ctx(0, "ok"));
        dispatcher.dispatch(
            &handler(|_| async { Err(anyhow::anyhow!("downstream unavailable")) }),
            ctx(1, "fails"),
        );
        dispatcher.dispatch(
            &handler(|_| async {
                if true {
                    panic!("handler blew up");
                }
                Ok(())
            }),
            ctx(2, "panics"),
        );

        let mut reports = dispatcher.drain(Duration::from_secs(5)).await;
        reports.sort_by_key(|r| r.condition);

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].outcome, HandlerOutcome::Completed);
        assert_eq!(reports[0].triggered_secs, 1.5);
        assert_eq!(
            reports[1].outcome,
            HandlerOutcome::Failed("downstream unavailable".to_string())
        );
        assert_eq!(
            reports[2].outcome,
            HandlerOutcome::Panicked("handler blew up".to_string())
        );
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_timeout_aborts_stragglers() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(
            &handler(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
            ctx(0, "slow"),
        );

        let reports = dispatcher.drain(Duration::from_millis(50)).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, HandlerOutcome::Aborted);
        assert_eq!(reports[0].name, "slow");
    }

    #[tokio::test]
    async fn test_synchronous_panic_is_reported() {
        let mut dispatcher = Dispatcher::new();
        let panicking: Handler = Arc::new(|_ctx: HandlerContext| -> HandlerFuture {
            panic!("bad handler setup");
        });
        dispatcher.dispatch(&panicking, ctx(0, "sync_panic"));

        let reports = dispatcher.drain(Duration::from_secs(5)).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].outcome,
            HandlerOutcome::Panicked("bad handler setup".to_string())
        );
    }

    #[tokio::test]
    async fn test_drain_with_unrepresentable_timeout() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(&handler(|_| async { Ok(()) }), ctx(0, "ok"));

        let reports = dispatcher.drain(Duration::from_secs(u64::MAX)).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_detach_leaves_handlers_running() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = std::sync::Mutex::new(Some(tx));
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(
            &handler(move |_| {
                let tx = tx.lock().unwrap().take();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if let Some(tx) = tx {
                        let _ = tx.send(());
                    }
                    Ok(())
                }
            }),
            ctx(0, "detached"),
        );

        assert!(dispatcher.detach().is_empty());
        drop(dispatcher);

        // The detached task still runs to completion
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&HandlerOutcome::Failed("boom".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"failed","message":"boom"}"#);
        assert!(HandlerOutcome::Completed.is_success());
        assert!(!HandlerOutcome::Aborted.is_success());
    }
}
