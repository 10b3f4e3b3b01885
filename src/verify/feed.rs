//! Pushes persisted record changes to listeners.
//!
//! Every write bumps a store-wide revision. A subscription remembers the last
//! revision it delivered and re-reads newer changes from the [`ChangeLog`], so
//! writes made through another connection or process reach it on the next
//! poll. Writers sharing the feed wake listeners immediately.

use futures_util::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::record::VerificationRecord;

const DEFAULT_FEED_CAPACITY: usize = 64;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A record as persisted by the write that produced `revision`.
#[derive(Debug, Clone)]
pub struct RecordChange {
    pub revision: i64,
    pub record: VerificationRecord,
}

/// Durable, revision-ordered view of record writes.
pub trait ChangeLog: Send + Sync {
    /// Highest revision written so far, `0` when nothing was written.
    fn head_revision<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<i64>> + Send + 'a>>;

    /// Current state of a user's records changed after `revision`, oldest
    /// change first.
    fn changes_since<'a>(
        &'a self,
        user_id: &'a str,
        revision: i64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RecordChange>>> + Send + 'a>>;
}

/// In-process wake-up bus carrying the user id of each write.
#[derive(Debug, Clone)]
pub struct RecordFeed {
    tx: broadcast::Sender<String>,
}

impl Default for RecordFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl RecordFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce a committed write. Having no listeners is not an error.
    pub fn publish(&self, record: &VerificationRecord) {
        let _ = self.tx.send(record.user_id.clone());
    }

    /// Listen for changes to one user's records written after this call.
    pub async fn subscribe(
        &self,
        user_id: &str,
        log: Arc<dyn ChangeLog>,
        poll_interval: Duration,
    ) -> anyhow::Result<RecordSubscription> {
        // Join the bus before reading the head so no wake-up falls in between.
        let rx = self.tx.subscribe();
        let cursor = log.head_revision().await?;
        Ok(RecordSubscription {
            user_id: user_id.to_string(),
            rx,
            log,
            cursor,
            pending: VecDeque::new(),
            poll_interval,
            closed: false,
        })
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A per-user listener. Dropping it (or calling [`cancel`](Self::cancel))
/// unsubscribes.
pub struct RecordSubscription {
    user_id: String,
    rx: broadcast::Receiver<String>,
    log: Arc<dyn ChangeLog>,
    cursor: i64,
    pending: VecDeque<VerificationRecord>,
    poll_interval: Duration,
    closed: bool,
}

impl std::fmt::Debug for RecordSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSubscription")
            .field("user_id", &self.user_id)
            .field("cursor", &self.cursor)
            .field("pending", &self.pending.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RecordSubscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next change for this user, or `None` once the feed is closed and
    /// every persisted change was delivered.
    ///
    /// Several writes to one record between two reads arrive as its latest
    /// state.
    pub async fn recv(&mut self) -> Option<VerificationRecord> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            self.poll().await;
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.closed {
                return None;
            }
            self.wait().await;
        }
    }

    async fn poll(&mut self) {
        match self.log.changes_since(&self.user_id, self.cursor).await {
            Ok(changes) => {
                for change in changes {
                    self.cursor = self.cursor.max(change.revision);
                    self.pending.push_back(change.record);
                }
            }
            Err(e) => {
                warn!(
                    user_id = self.user_id.as_str(),
                    error = %format!("{e:#}"),
                    "Reading record changes failed"
                );
            }
        }
    }

    /// Sleep until a write for this user is announced or the poll interval
    /// elapses.
    async fn wait(&mut self) {
        let deadline = tokio::time::sleep(self.poll_interval);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                woken = self.rx.recv() => match woken {
                    Ok(user_id) if user_id != self.user_id => {}
                    Ok(_) => return,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(user_id = self.user_id.as_str(), skipped, "Record feed lagged");
                        return;
                    }
                    Err(RecvError::Closed) => {
                        self.closed = true;
                        return;
                    }
                },
                () = &mut deadline => return,
            }
        }
    }

    pub fn cancel(self) {}

    pub fn into_stream(self) -> impl Stream<Item = VerificationRecord> + Send + 'static {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|record| (record, subscription))
        })
    }
}
