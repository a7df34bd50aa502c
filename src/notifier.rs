use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Timestamp of the most recent room store mutation, shared with every
/// live-stream subscriber.
///
/// Cheap to clone; all clones publish to the same channel.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Arc<watch::Sender<Option<DateTime<Utc>>>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record a mutation at `at`. Timestamps never move backwards, so a
    /// clock step back cannot hide a change from subscribers.
    pub fn touch(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|last| {
            *last = Some(match *last {
                Some(prev) if prev >= at => prev + chrono::Duration::microseconds(1),
                _ => at,
            });
        });
    }

    /// `None` until the first mutation.
    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.tx.subscribe()
    }
}
