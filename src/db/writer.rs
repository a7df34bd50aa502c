use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::{
    models::{HistorySample, RoomState},
    RoomRepository,
};

/// Pending writes; new ones are dropped while it is full.
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct PendingWrite {
    state: RoomState,
    sample: Option<HistorySample>,
}

/// Persists room mutations on a single background task.
///
/// Callers enqueue without waiting, so a slow or unreachable database never
/// holds up the in-memory store. One consumer keeps persisted order equal to
/// enqueue order.
#[derive(Debug, Clone)]
pub struct StateWriter {
    tx: mpsc::Sender<PendingWrite>,
}

impl StateWriter {
    /// Spawn the writer task. Must be called from within a Tokio runtime.
    pub fn spawn(repo: RoomRepository, history_limit: usize) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(repo, history_limit, rx));
        Self { tx }
    }

    /// Queue the new room state, plus a history sample when the mutation was a reading.
    pub fn enqueue(&self, state: RoomState, sample: Option<HistorySample>) {
        match self.tx.try_send(PendingWrite { state, sample }) {
            Ok(()) => {}
            Err(TrySendError::Full(w)) => {
                warn!(room_id = %w.state.room_id, "Persistence queue full; dropping write");
            }
            Err(TrySendError::Closed(w)) => {
                warn!(room_id = %w.state.room_id, "Persistence task has stopped; dropping write");
            }
        }
    }
}

async fn run(repo: RoomRepository, history_limit: usize, mut rx: mpsc::Receiver<PendingWrite>) {
    while let Some(write) = rx.recv().await {
        let room_id = &write.state.room_id;
        if let Err(e) = repo.save_state(&write.state).await {
            warn!(room_id = %room_id, error = %e, "Failed to persist room state");
        }
        if let Some(sample) = &write.sample {
            if let Err(e) = repo.append_history(room_id, sample, history_limit).await {
                warn!(room_id = %room_id, error = %e, "Failed to persist history sample");
            }
        }
        debug!(room_id = %room_id, "Room state persisted");
    }
}
