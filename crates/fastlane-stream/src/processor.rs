//! Stream consumption loop
//!
//! The processor is the single writer to a tracker. It pulls snapshots from
//! a source in order, ingests them, publishes the resulting state on a watch
//! channel and dispatches handlers for newly triggered conditions.

use crate::config::{MalformedSnapshotPolicy, ProcessorConfig};
use crate::dispatch::{Dispatcher, HandlerReport};
use crate::error::StreamError;
use crate::handler::{Handler, HandlerContext, HandlerRegistry};
use crate::source::SnapshotSource;
use fastlane_domain::{FieldExtractor, SnapshotFieldMap, StreamId};
use fastlane_tracker::{FieldCompletionTracker, IngestOutcome, Summary, TrackerError};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Observable state after each processed snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    /// Stream being consumed
    pub stream_id: StreamId,

    /// Snapshots ingested so far
    pub snapshot_index: usize,

    /// Elapsed stream time
    pub elapsed: Duration,

    /// Field map of the latest snapshot
    pub fields: SnapshotFieldMap,

    /// Conditions that triggered on the latest snapshot
    pub newly_triggered: Vec<usize>,

    /// All conditions triggered so far
    pub triggered: Vec<usize>,

    /// Whether the stream has been finalized
    pub finished: bool,

    /// Summary, once finished
    pub summary: Option<Summary>,
}

impl StreamUpdate {
    fn started(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            snapshot_index: 0,
            elapsed: Duration::ZERO,
            fields: SnapshotFieldMap::default(),
            newly_triggered: Vec::new(),
            triggered: Vec::new(),
            finished: false,
            summary: None,
        }
    }
}

/// Result of a completed stream run
#[derive(Debug, Clone)]
pub struct StreamReport<T> {
    /// Timing summary from the tracker
    pub summary: Summary,

    /// Handler reports; empty for handlers still running when detached
    pub handler_reports: Vec<HandlerReport>,

    /// The source's final response, if it produced one
    pub final_response: Option<T>,

    /// Snapshots skipped as malformed
    pub skipped_snapshots: usize,
}

/// Drives a tracker from a snapshot source
///
/// # Examples
///
/// ```
/// use fastlane_domain::PresenceExtractor;
/// use fastlane_stream::{handler, HandlerRegistry, ProcessorConfig, ScriptedSource, StreamProcessor};
/// use fastlane_tracker::{FieldCompletionTracker, TrackerConfig, REQUIRED_READY};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TrackerConfig::from_fields(["name", "email", "bio"], ["name", "email"]);
/// let tracker = FieldCompletionTracker::new(&config, config.default_conditions(), PresenceExtractor)?;
/// let handlers = HandlerRegistry::new().on_named(
///     REQUIRED_READY,
///     handler(|ctx| async move {
///         println!("start downstream work for {:?}", ctx.fields.value("email"));
///         Ok(())
///     }),
/// );
///
/// let mut processor = StreamProcessor::new(tracker, handlers, ProcessorConfig::default())?;
/// let mut source = ScriptedSource::new()
///     .then_now(json!({"name": "Ada"}))
///     .then_now(json!({"name": "Ada", "email": "ada@example.com"}))
///     .finish_with(json!({"name": "Ada", "email": "ada@example.com", "bio": "..."}));
///
/// let report = processor.run(&mut source).await?;
/// assert_eq!(report.summary.triggered_count(), 2);
/// assert_eq!(report.handler_reports.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct StreamProcessor<E: FieldExtractor> {
    tracker: FieldCompletionTracker<E>,
    handlers: BTreeMap<usize, Handler>,
    config: ProcessorConfig,
    updates: watch::Sender<StreamUpdate>,
}

impl<E: FieldExtractor> StreamProcessor<E> {
    /// Create a processor, resolving handler targets against the tracker's conditions
    pub fn new(
        tracker: FieldCompletionTracker<E>,
        handlers: HandlerRegistry,
        config: ProcessorConfig,
    ) -> Result<Self, StreamError> {
        config.validate().map_err(StreamError::Config)?;
        let handlers = handlers.resolve(tracker.conditions())?;
        let (updates, _) = watch::channel(StreamUpdate::started(tracker.stream_id()));

        debug!(
            "Stream processor created: {} handler(s) for {} condition(s)",
            handlers.len(),
            tracker.conditions().len()
        );

        Ok(Self {
            tracker,
            handlers,
            config,
            updates,
        })
    }

    /// Observe state updates
    ///
    /// The receiver always holds the latest update; intermediate ones may be
    /// skipped by slow observers.
    pub fn subscribe(&self) -> watch::Receiver<StreamUpdate> {
        self.updates.subscribe()
    }

    /// The tracker
    pub fn tracker(&self) -> &FieldCompletionTracker<E> {
        &self.tracker
    }

    /// The tracker, mutably
    ///
    /// After a failed run the tracker is left un-finalized; callers can still
    /// finalize it for a partial summary.
    pub fn tracker_mut(&mut self) -> &mut FieldCompletionTracker<E> {
        &mut self.tracker
    }

    /// Give back the tracker
    pub fn into_tracker(self) -> FieldCompletionTracker<E> {
        self.tracker
    }

    /// The processor configuration
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Consume `source` to the end and finalize
    ///
    /// The tracker is reset first, so one processor can run several streams
    /// in sequence. Handlers run concurrently with consumption; a slow
    /// handler never delays ingestion of later snapshots.
    pub async fn run<S>(&mut self, source: &mut S) -> Result<StreamReport<E::Snapshot>, StreamError>
    where
        S: SnapshotSource<Snapshot = E::Snapshot>,
        E::Snapshot: Sized,
    {
        self.tracker.reset();
        let stream_id = self.tracker.stream_id();
        self.updates.send_replace(StreamUpdate::started(stream_id));

        // Dropping the dispatcher on an early return detaches running handlers
        let mut dispatcher = Dispatcher::new();
        let mut skipped = 0usize;

        let has_required = self
            .tracker
            .conditions()
            .iter()
            .any(|c| c.is_required_style());
        // A deadline too far out to represent is no deadline
        let deadline = self
            .config
            .required_fields_timeout()
            .filter(|_| has_required)
            .and_then(|waited| Instant::now().checked_add(waited).map(|at| (waited, at)));

        info!("Stream {} started", stream_id);

        loop {
            let next = match deadline {
                Some((waited, at)) if !self.tracker.required_ready() => {
                    if Instant::now() >= at {
                        return Err(self.required_timeout(waited));
                    }
                    let next = tokio::time::timeout_at(at, source.next_snapshot()).await;
                    match next {
                        Ok(next) => next,
                        Err(_) => return Err(self.required_timeout(waited)),
                    }
                }
                _ => source.next_snapshot().await,
            };

            let snapshot = match next {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(e)) => {
                    error!("Stream {}: source failed: {:#}", stream_id, e);
                    return Err(StreamError::Source(e));
                }
                None => break,
            };

            match self.tracker.ingest(&snapshot) {
                Ok(outcome) => self.on_ingest(&mut dispatcher, outcome, false),
                Err(TrackerError::Extraction(e))
                    if self.config.on_malformed_snapshot == MalformedSnapshotPolicy::Skip =>
                {
                    skipped += 1;
                    warn!("Stream {}: skipping malformed snapshot: {}", stream_id, e);
                }
                Err(e) => return Err(e.into()),
            }

            dispatcher.collect_finished();
        }

        let final_response = match source.final_response().await {
            Ok(response) => response,
            Err(e) => {
                error!("Stream {}: final response failed: {:#}", stream_id, e);
                return Err(StreamError::Source(e));
            }
        };

        let (summary, terminal) = match self.tracker.finalize_with_outcome(final_response.as_ref()) {
            Ok(finalized) => finalized,
            Err(TrackerError::Extraction(e))
                if self.config.on_malformed_snapshot == MalformedSnapshotPolicy::Skip =>
            {
                skipped += 1;
                warn!(
                    "Stream {}: final response malformed, finalizing without it: {}",
                    stream_id, e
                );
                (self.tracker.finalize(None)?, None)
            }
            Err(e) => return Err(e.into()),
        };

        match terminal {
            Some(outcome) => self.on_ingest(&mut dispatcher, outcome, true),
            None => {
                let fields = self.updates.borrow().fields.clone();
                self.updates.send_replace(StreamUpdate {
                    stream_id,
                    snapshot_index: summary.snapshot_count,
                    elapsed: Duration::from_secs_f64(summary.total_elapsed_secs),
                    fields,
                    newly_triggered: Vec::new(),
                    triggered: self.tracker.triggered(),
                    finished: true,
                    summary: None,
                });
            }
        }
        self.updates.send_modify(|update| update.summary = Some(summary.clone()));

        let handler_reports = if self.config.await_handlers {
            dispatcher.drain(self.config.handler_drain_timeout()).await
        } else {
            dispatcher.detach()
        };

        if skipped > 0 {
            warn!("Stream {}: {} malformed snapshot(s) skipped", stream_id, skipped);
        }

        Ok(StreamReport {
            summary,
            handler_reports,
            final_response,
            skipped_snapshots: skipped,
        })
    }

    fn on_ingest(&self, dispatcher: &mut Dispatcher, outcome: IngestOutcome, finished: bool) {
        let stream_id = self.tracker.stream_id();
        let conditions = self.tracker.conditions();

        for &index in &outcome.triggered {
            if let Some(handler) = self.handlers.get(&index) {
                dispatcher.dispatch(
                    handler,
                    HandlerContext {
                        stream_id,
                        condition: index,
                        condition_name: conditions[index].name().to_string(),
                        fields: outcome.fields.clone(),
                        elapsed: outcome.elapsed,
                    },
                );
            }
        }

        self.updates.send_replace(StreamUpdate {
            stream_id,
            snapshot_index: outcome.snapshot_index,
            elapsed: outcome.elapsed,
            fields: outcome.fields,
            newly_triggered: outcome.triggered,
            triggered: self.tracker.triggered(),
            finished,
            summary: None,
        });
    }

    fn required_timeout(&self, waited: Duration) -> StreamError {
        warn!(
            "Stream {}: required fields not ready after {:?}",
            self.tracker.stream_id(),
            waited
        );
        StreamError::RequiredFieldsTimeout { waited }
    }
}
