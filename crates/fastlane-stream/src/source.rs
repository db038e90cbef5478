//! Upstream snapshot sources
//!
//! A source yields partial snapshots strictly in order, then optionally an
//! authoritative final response once it is exhausted.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Ordered stream of partial snapshots with an optional final response
pub trait SnapshotSource: Send {
    /// Partial object type
    type Snapshot: Send;

    /// Next partial snapshot; `None` once the stream is exhausted
    fn next_snapshot(&mut self) -> impl Future<Output = Option<anyhow::Result<Self::Snapshot>>> + Send;

    /// Authoritative result, requested after exhaustion
    fn final_response(&mut self) -> impl Future<Output = anyhow::Result<Option<Self::Snapshot>>> + Send;
}

/// Source fed through tokio channels
///
/// Snapshots arrive on an mpsc channel; the stream ends when every sender is
/// dropped. The final response, if any, arrives on a oneshot channel.
///
/// # Examples
///
/// ```
/// use fastlane_stream::{ChannelSource, SnapshotSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let (snapshots, final_tx, mut source) = ChannelSource::<u32>::pair(8);
/// snapshots.send(1).await?;
/// drop(snapshots);
/// let _ = final_tx.send(2);
///
/// assert_eq!(source.next_snapshot().await.transpose()?, Some(1));
/// assert!(source.next_snapshot().await.is_none());
/// assert_eq!(source.final_response().await?, Some(2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelSource<T> {
    snapshots: mpsc::Receiver<T>,
    final_response: Option<oneshot::Receiver<T>>,
}

impl<T: Send> ChannelSource<T> {
    /// Source without a final response
    pub fn new(snapshots: mpsc::Receiver<T>) -> Self {
        Self {
            snapshots,
            final_response: None,
        }
    }

    /// Source with a final response channel
    pub fn with_final(snapshots: mpsc::Receiver<T>, final_response: oneshot::Receiver<T>) -> Self {
        Self {
            snapshots,
            final_response: Some(final_response),
        }
    }

    /// Create a source together with its two sending halves
    pub fn pair(capacity: usize) -> (mpsc::Sender<T>, oneshot::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let (final_tx, final_rx) = oneshot::channel();
        (tx, final_tx, Self::with_final(rx, final_rx))
    }
}

impl<T: Send> SnapshotSource for ChannelSource<T> {
    type Snapshot = T;

    async fn next_snapshot(&mut self) -> Option<anyhow::Result<T>> {
        self.snapshots.recv().await.map(Ok)
    }

    async fn final_response(&mut self) -> anyhow::Result<Option<T>> {
        match self.final_response.take() {
            Some(rx) => match rx.await {
                Ok(response) => Ok(Some(response)),
                Err(_) => {
                    tracing::warn!("Final response sender dropped; finishing without a terminal response");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// One step of a scripted stream
#[derive(Debug, Clone)]
pub enum ScriptStep<T> {
    /// Wait `delay`, then yield `snapshot`
    Snapshot {
        /// Pause before the snapshot
        delay: Duration,
        /// The partial snapshot
        snapshot: T,
    },
    /// Wait `delay`, then fail with `message`
    Fail {
        /// Pause before the failure
        delay: Duration,
        /// Error message
        message: String,
    },
}

/// Replays a fixed timeline of snapshots
///
/// Useful for simulations and tests: each step sleeps for its delay before
/// yielding, mimicking fields arriving from a model over time.
#[derive(Debug, Clone)]
pub struct ScriptedSource<T> {
    steps: VecDeque<ScriptStep<T>>,
    final_response: Option<T>,
    final_error: Option<String>,
}

impl<T> Default for ScriptedSource<T> {
    fn default() -> Self {
        Self {
            steps: VecDeque::new(),
            final_response: None,
            final_error: None,
        }
    }
}

impl<T: Send> ScriptedSource<T> {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot yielded after `delay`
    pub fn then(mut self, delay: Duration, snapshot: T) -> Self {
        self.steps.push_back(ScriptStep::Snapshot { delay, snapshot });
        self
    }

    /// Append a snapshot yielded immediately
    pub fn then_now(self, snapshot: T) -> Self {
        self.then(Duration::ZERO, snapshot)
    }

    /// Append a mid-stream failure after `delay`
    pub fn then_fail(mut self, delay: Duration, message: impl Into<String>) -> Self {
        self.steps.push_back(ScriptStep::Fail {
            delay,
            message: message.into(),
        });
        self
    }

    /// Set the final response
    pub fn finish_with(mut self, response: T) -> Self {
        self.final_response = Some(response);
        self
    }

    /// Make the final response request fail
    pub fn finish_with_error(mut self, message: impl Into<String>) -> Self {
        self.final_error = Some(message.into());
        self
    }

    /// Steps not yet replayed
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl<T: Send> SnapshotSource for ScriptedSource<T> {
    type Snapshot = T;

    async fn next_snapshot(&mut self) -> Option<anyhow::Result<T>> {
        let step = self.steps.pop_front()?;
        match step {
            ScriptStep::Snapshot { delay, snapshot } => {
                pause(delay).await;
                Some(Ok(snapshot))
            }
            ScriptStep::Fail { delay, message } => {
                pause(delay).await;
                Some(Err(anyhow::anyhow!(message)))
            }
        }
    }

    async fn final_response(&mut self) -> anyhow::Result<Option<T>> {
        if let Some(message) = self.final_error.take() {
            anyhow::bail!(message);
        }
        Ok(self.final_response.take())
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_in_order() {
        let mut source = ScriptedSource::new()
            .then_now(1)
            .then(Duration::from_millis(5), 2)
            .finish_with(3);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_snapshot().await.unwrap().unwrap(), 1);
        assert_eq!(source.next_snapshot().await.unwrap().unwrap(), 2);
        assert!(source.next_snapshot().await.is_none());
        assert_eq!(source.final_response().await.unwrap(), Some(3));
        // Final response is handed out once
        assert_eq!(source.final_response().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mut source = ScriptedSource::new()
            .then_now(1)
            .then_fail(Duration::ZERO, "connection reset");
        assert!(source.next_snapshot().await.unwrap().is_ok());
        let err = source.next_snapshot().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_scripted_final_error() {
        let mut source = ScriptedSource::<u8>::new().finish_with_error("no final");
        assert!(source.next_snapshot().await.is_none());
        assert!(source.final_response().await.is_err());
    }

    #[tokio::test]
    async fn test_channel_source_without_final() {
        let (tx, rx) = mpsc::channel(4);
        let mut source = ChannelSource::new(rx);
        tx.send("a").await.unwrap();
        drop(tx);
        assert_eq!(source.next_snapshot().await.unwrap().unwrap(), "a");
        assert!(source.next_snapshot().await.is_none());
        assert_eq!(source.final_response().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_channel_source_dropped_final_sender() {
        let (tx, final_tx, mut source) = ChannelSource::<u8>::pair(1);
        drop(tx);
        drop(final_tx);
        assert!(source.next_snapshot().await.is_none());
        assert_eq!(source.final_response().await.unwrap(), None);
    }
}
