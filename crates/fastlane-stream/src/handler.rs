//! Condition handlers
//!
//! Handlers are async callbacks bound to a completion condition. They run
//! fire-and-forget: the processor spawns them and keeps consuming the stream.

use crate::error::StreamError;
use fastlane_domain::{SnapshotFieldMap, StreamId};
use fastlane_tracker::CompletionCondition;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by a handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Async callback invoked when its condition first triggers
pub type Handler = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;

/// What a handler is told about the trigger
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Stream the condition triggered in
    pub stream_id: StreamId,

    /// Index of the condition in declaration order
    pub condition: usize,

    /// Name of the condition
    pub condition_name: String,

    /// Field map of the snapshot that triggered the condition
    pub fields: SnapshotFieldMap,

    /// Elapsed stream time at the trigger
    pub elapsed: Duration,
}

/// Wrap an async closure as a [`Handler`]
///
/// # Examples
///
/// ```
/// use fastlane_stream::handler;
///
/// let on_ready = handler(|ctx| async move {
///     println!("{} ready after {:?}", ctx.condition_name, ctx.elapsed);
///     Ok(())
/// });
/// # let _ = on_ready;
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)) as HandlerFuture)
}

enum Target {
    Index(usize),
    Name(String),
}

/// Handlers keyed by condition, by index or by name
///
/// Registration is unchecked; targets are resolved against the tracker's
/// conditions when the processor is built. At most one handler per
/// condition: a later registration for the same condition replaces the
/// earlier one.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<(Target, Handler)>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the condition at `index`
    pub fn on(mut self, index: usize, handler: Handler) -> Self {
        self.entries.push((Target::Index(index), handler));
        self
    }

    /// Register a handler for the condition called `name`
    pub fn on_named(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.entries.push((Target::Name(name.into()), handler));
        self
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every target to a condition index
    pub(crate) fn resolve(
        self,
        conditions: &[CompletionCondition],
    ) -> Result<BTreeMap<usize, Handler>, StreamError> {
        let mut resolved = BTreeMap::new();
        for (target, handler) in self.entries {
            let index = match target {
                Target::Index(index) if index < conditions.len() => index,
                Target::Index(index) => {
                    return Err(StreamError::UnknownHandlerTarget(format!(
                        "condition index {} (tracker has {})",
                        index,
                        conditions.len()
                    )))
                }
                Target::Name(name) => conditions
                    .iter()
                    .position(|c| c.name() == name)
                    .ok_or(StreamError::UnknownHandlerTarget(name))?,
            };
            if resolved.insert(index, handler).is_some() {
                tracing::warn!(
                    "Handler for condition '{}' registered twice; keeping the last one",
                    conditions[index].name()
                );
            }
        }
        Ok(resolved)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<String> = self
            .entries
            .iter()
            .map(|(target, _)| match target {
                Target::Index(index) => format!("#{}", index),
                Target::Name(name) => name.clone(),
            })
            .collect();
        f.debug_struct("HandlerRegistry").field("targets", &targets).finish()
    }
}
