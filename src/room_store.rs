use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::{
    db::{
        models::{round1, HistoryRow, HistorySample, RoomReading, RoomState},
        writer::StateWriter,
        RoomRepository,
    },
    notifier::ChangeNotifier,
};

/// Upper bound on the per-room history ring.
pub const MAX_HISTORY: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(String),
}

/// Room count and mean temperature for one floor.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FloorSummary {
    pub count: usize,
    pub avg_temp: f64,
}

#[derive(Debug)]
struct RoomEntry {
    state: RoomState,
    history: VecDeque<HistorySample>,
}

/// Latest state per room plus a short history ring, shared across tasks.
///
/// A single `tokio::sync::RwLock` guards the whole map: writers replace a
/// room's state in one step, readers always see whole `RoomState`s. Every
/// mutation bumps the [`ChangeNotifier`] and queues its database write before
/// the lock is released; the write itself happens off the lock.
#[derive(Clone)]
pub struct RoomStore {
    inner: Arc<RwLock<HashMap<String, RoomEntry>>>,
    notifier: ChangeNotifier,
    writer: Option<StateWriter>,
    history_limit: usize,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl RoomStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            notifier: ChangeNotifier::new(),
            writer: None,
            history_limit: history_limit.clamp(1, MAX_HISTORY),
        }
    }

    /// Persist every mutation to Postgres on a background task.
    /// Must be called from within a Tokio runtime.
    pub fn with_repository(mut self, repo: RoomRepository) -> Self {
        self.writer = Some(StateWriter::spawn(repo, self.history_limit));
        self
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Seed the store from persisted rows. Does not notify subscribers.
    pub async fn hydrate(&self, states: Vec<RoomState>, history: Vec<HistoryRow>) {
        let mut rooms = self.inner.write().await;
        for state in states {
            rooms.insert(
                state.room_id.clone(),
                RoomEntry {
                    state,
                    history: VecDeque::with_capacity(self.history_limit),
                },
            );
        }
        for row in history {
            if let Some(entry) = rooms.get_mut(&row.room_id) {
                push_bounded(&mut entry.history, row.into(), self.history_limit);
            }
        }
    }

    /// Create the room on first sight, otherwise overwrite every reading field.
    pub async fn upsert(&self, reading: RoomReading) -> RoomState {
        let now = Utc::now();
        let mut rooms = self.inner.write().await;

        let entry = match rooms.entry(reading.room_id.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.state.apply(reading, now);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(RoomEntry {
                state: RoomState::create(reading, now),
                history: VecDeque::with_capacity(self.history_limit),
            }),
        };

        let sample = HistorySample {
            time: now,
            room_temp: entry.state.room_temp,
            set_temp: entry.state.set_temp,
        };
        push_bounded(&mut entry.history, sample.clone(), self.history_limit);
        let state = entry.state.clone();
        self.notifier.touch(now);

        if let Some(writer) = &self.writer {
            writer.enqueue(state.clone(), Some(sample));
        }
        drop(rooms);

        state
    }

    /// Change the operator-facing name. An empty name resets it to the room id.
    pub async fn rename(&self, room_id: &str, display_name: &str) -> Result<RoomState, StoreError> {
        let now = Utc::now();
        let mut rooms = self.inner.write().await;
        let entry = rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::NotFound(room_id.to_owned()))?;

        let name = display_name.trim();
        entry.state.display_name = if name.is_empty() {
            entry.state.room_id.clone()
        } else {
            name.to_owned()
        };
        entry.state.updated_at = now;
        let state = entry.state.clone();
        self.notifier.touch(now);

        if let Some(writer) = &self.writer {
            writer.enqueue(state.clone(), None);
        }
        drop(rooms);

        Ok(state)
    }

    /// Snapshot of every visible room, keyed and ordered by room id.
    pub async fn get_all(&self) -> BTreeMap<String, RoomState> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(id, _)| !is_hidden_room_id(id))
            .map(|(id, e)| (id.clone(), e.state.clone()))
            .collect()
    }

    pub async fn get_one(&self, room_id: &str) -> Result<RoomState, StoreError> {
        self.inner
            .read()
            .await
            .get(room_id)
            .map(|e| e.state.clone())
            .ok_or_else(|| StoreError::NotFound(room_id.to_owned()))
    }

    /// Up to `limit` most recent samples, oldest first. Unknown rooms yield an empty list.
    pub async fn history(&self, room_id: &str, limit: usize) -> Vec<HistorySample> {
        let rooms = self.inner.read().await;
        let Some(entry) = rooms.get(room_id) else {
            return Vec::new();
        };
        let skip = entry.history.len().saturating_sub(limit);
        entry.history.iter().skip(skip).cloned().collect()
    }

    /// Room count and average temperature per floor.
    ///
    /// The floor is the room id's first character when it is a digit, else
    /// `"X"`. Rooms without a temperature still count and contribute 0 to
    /// the sum.
    pub async fn summary_by_floor(&self) -> BTreeMap<String, FloorSummary> {
        let rooms = self.inner.read().await;
        let mut totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();

        for (id, entry) in rooms.iter() {
            let Some(first) = id.chars().next() else {
                continue;
            };
            let floor = if first.is_ascii_digit() {
                first.to_string()
            } else {
                "X".to_owned()
            };
            let t = totals.entry(floor).or_default();
            t.0 += 1;
            t.1 += entry.state.room_temp.unwrap_or(0.0);
        }

        totals
            .into_iter()
            .map(|(floor, (count, sum))| {
                let avg_temp = round1(sum / count as f64);
                (floor, FloorSummary { count, avg_temp })
            })
            .collect()
    }
}

/// Empty ids and the literal `none` come from malformed ingests and are never listed.
pub fn is_hidden_room_id(room_id: &str) -> bool {
    let id = room_id.trim();
    id.is_empty() || id.eq_ignore_ascii_case("none")
}

fn push_bounded(ring: &mut VecDeque<HistorySample>, sample: HistorySample, limit: usize) {
    while ring.len() >= limit {
        ring.pop_front();
    }
    ring.push_back(sample);
}
