use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Coarse operating mode reported by a room controller.
///
/// Mirrors the `hvac_mode` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "hvac_mode")]
pub enum Mode {
    Cool,
    Off,
    Unknown,
}

impl Mode {
    /// Lenient parse used for pre-decoded payloads. Anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "cool" => Self::Cool,
            "off" => Self::Off,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Cool => "Cool",
            Mode::Off => "Off",
            Mode::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One decoded telemetry sample for a room.
///
/// `delta` is present iff both `room_temp` and `set_temp` are; construct
/// through [`RoomReading::new`] to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomReading {
    pub room_id: String,
    /// °F, absent when the calibration lookup missed.
    pub room_temp: Option<f64>,
    /// °F.
    pub set_temp: Option<f64>,
    pub delta: Option<f64>,
    /// Relay combination, e.g. `"LEM OFF + HVAC ON"`. Always present for
    /// socket-decoded frames; pre-decoded payloads may omit it.
    pub hvac_state: Option<String>,
    pub mode: Mode,
    pub captured_at: DateTime<Utc>,
    /// Raw frame bytes, upper-case hex. Only set for socket-decoded frames.
    pub raw_hex: Option<String>,
}

impl RoomReading {
    pub fn new(
        room_id: String,
        room_temp: Option<f64>,
        set_temp: Option<f64>,
        hvac_state: Option<String>,
        mode: Mode,
        captured_at: DateTime<Utc>,
        raw_hex: Option<String>,
    ) -> Self {
        Self {
            room_id,
            room_temp,
            set_temp,
            delta: delta(room_temp, set_temp),
            hvac_state,
            mode,
            captured_at,
            raw_hex,
        }
    }
}

/// `room_temp - set_temp` rounded to one decimal, or `None` if either side is missing.
pub fn delta(room_temp: Option<f64>, set_temp: Option<f64>) -> Option<f64> {
    match (room_temp, set_temp) {
        (Some(t), Some(s)) => Some(round1(t - s)),
        _ => None,
    }
}

/// Round to one decimal place, the precision every reported temperature uses.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Latest known telemetry plus operator metadata for one room.
/// One row per room in `room_states`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RoomState {
    pub room_id: String,
    pub display_name: String,
    pub room_temp: Option<f64>,
    pub set_temp: Option<f64>,
    pub delta: Option<f64>,
    pub hvac_state: Option<String>,
    pub mode: Mode,
    pub captured_at: DateTime<Utc>,
    pub raw_hex: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomState {
    /// First sighting of a room: display name defaults to the room id.
    pub fn create(reading: RoomReading, now: DateTime<Utc>) -> Self {
        Self {
            display_name: reading.room_id.clone(),
            room_id: reading.room_id,
            room_temp: reading.room_temp,
            set_temp: reading.set_temp,
            delta: reading.delta,
            hvac_state: reading.hvac_state,
            mode: reading.mode,
            captured_at: reading.captured_at,
            raw_hex: reading.raw_hex,
            created_at: now,
            updated_at: now,
        }
    }

    /// Last-write-wins: every reading field is replaced, absent values included.
    pub fn apply(&mut self, reading: RoomReading, now: DateTime<Utc>) {
        self.room_temp = reading.room_temp;
        self.set_temp = reading.set_temp;
        self.delta = reading.delta;
        self.hvac_state = reading.hvac_state;
        self.mode = reading.mode;
        self.captured_at = reading.captured_at;
        self.raw_hex = reading.raw_hex;
        self.updated_at = now;
    }
}

/// One point of a room's recent history, oldest-first when listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub time: DateTime<Utc>,
    pub room_temp: Option<f64>,
    pub set_temp: Option<f64>,
}

/// `room_history` row as loaded at startup.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub room_id: String,
    pub room_temp: Option<f64>,
    pub set_temp: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistorySample {
    fn from(r: HistoryRow) -> Self {
        Self {
            time: r.recorded_at,
            room_temp: r.room_temp,
            set_temp: r.set_temp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_rounds_to_one_decimal() {
        assert_eq!(delta(Some(71.5), Some(68.0)), Some(3.5));
        assert_eq!(delta(Some(65.8), Some(70.0)), Some(-4.2));
        assert_eq!(delta(Some(72.04), Some(72.0)), Some(0.0));
    }

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(71.25), 71.3);
        assert_eq!(round1(-4.1999), -4.2);
        assert_eq!(round1(213.7 / 3.0), 71.2);
    }

    #[test]
    fn delta_absent_when_either_side_missing() {
        assert_eq!(delta(None, Some(68.0)), None);
        assert_eq!(delta(Some(71.5), None), None);
        assert_eq!(delta(None, None), None);
    }

    #[test]
    fn mode_from_label_is_lenient() {
        assert_eq!(Mode::from_label("Cool"), Mode::Cool);
        assert_eq!(Mode::from_label(" off "), Mode::Off);
        assert_eq!(Mode::from_label("?"), Mode::Unknown);
        assert_eq!(Mode::from_label(""), Mode::Unknown);
    }

    #[test]
    fn apply_overwrites_with_absence() {
        let now = Utc::now();
        let first = RoomReading::new("204".into(), Some(71.5), Some(68.0), None, Mode::Cool, now, None);
        let mut state = RoomState::create(first, now);
        assert_eq!(state.display_name, "204");

        let second = RoomReading::new("204".into(), None, Some(68.0), None, Mode::Off, now, None);
        state.apply(second, now);
        assert_eq!(state.room_temp, None);
        assert_eq!(state.delta, None);
        assert_eq!(state.mode, Mode::Off);
    }
}
