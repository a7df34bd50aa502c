use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{Mode, RoomReading};

/// Body POSTed for every relayed reading. Field names match what
/// `POST /telemetry` accepts, so a relay can feed another instance directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardPayload {
    pub room: String,
    pub room_temp: Option<f64>,
    pub set_temp: Option<f64>,
    pub delta: Option<f64>,
    pub hvac: Option<String>,
    pub mode: Mode,
    pub time: DateTime<Utc>,
    pub raw: Option<String>,
}

impl From<RoomReading> for ForwardPayload {
    fn from(r: RoomReading) -> Self {
        Self {
            room: r.room_id,
            room_temp: r.room_temp,
            set_temp: r.set_temp,
            delta: r.delta,
            hvac: r.hvac_state,
            mode: r.mode,
            time: r.captured_at,
            raw: r.raw_hex,
        }
    }
}
