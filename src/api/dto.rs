use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::models::{HistorySample, Mode, RoomReading, RoomState};

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("invalid or missing room_number")]
    InvalidRoom,
    #[error("{field} must be a number, got {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Request body for `POST /telemetry`: a reading already decoded by an
/// external proxy.
///
/// `room` wins over `room_number` unless it is absent, null or `""`; a
/// whitespace-only `room` is rejected rather than falling back. Temperatures
/// may be numbers or numeric strings and must be finite. `delta` is always
/// derived from the two temperatures, so a supplied one is ignored.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TelemetryPayload {
    #[schema(value_type = Option<String>, example = "204")]
    pub room: Option<Value>,
    #[schema(value_type = Option<String>)]
    pub room_number: Option<Value>,
    #[schema(value_type = Option<f64>, example = 71.5)]
    pub room_temp: Option<Value>,
    #[schema(value_type = Option<f64>, example = 68)]
    pub set_temp: Option<Value>,
    #[schema(example = "LEM OFF + HVAC ON")]
    pub hvac: Option<String>,
    #[schema(example = "Cool")]
    pub mode: Option<String>,
}

impl TelemetryPayload {
    pub fn into_reading(self, now: DateTime<Utc>) -> Result<RoomReading, IngestError> {
        let raw_room = match self.room {
            None | Some(Value::Null) => self.room_number,
            Some(Value::String(s)) if s.is_empty() => self.room_number,
            room => room,
        };
        let room_id = room_id(raw_room)
            .filter(|id| !is_placeholder(id))
            .ok_or(IngestError::InvalidRoom)?;

        let room_temp = number("room_temp", self.room_temp)?;
        let set_temp = number("set_temp", self.set_temp)?;
        let hvac = self
            .hvac
            .map(|h| h.trim().to_owned())
            .filter(|h| !h.is_empty());
        let mode = self.mode.as_deref().map_or(Mode::Unknown, Mode::from_label);

        Ok(RoomReading::new(room_id, room_temp, set_temp, hvac, mode, now, None))
    }
}

/// Request body for `POST /telemetry/rename`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameRequest {
    #[schema(value_type = String, example = "13")]
    pub room_number: Option<Value>,
    /// Blank resets the name to the room id.
    #[schema(example = "Tactic 7")]
    pub display_name: Option<String>,
}

impl RenameRequest {
    pub fn room_id(&self) -> Option<String> {
        room_id(self.room_number.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    pub room: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RenameResponse {
    pub success: bool,
    pub room: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoomStateDto {
    pub room_id: String,
    pub display_name: String,
    /// °F; null when outside the calibrated range.
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

impl From<RoomState> for RoomStateDto {
    fn from(s: RoomState) -> Self {
        Self {
            room_id: s.room_id,
            display_name: s.display_name,
            room_temp: s.room_temp,
            set_temp: s.set_temp,
            delta: s.delta,
            hvac_state: s.hvac_state,
            mode: s.mode,
            captured_at: s.captured_at,
            raw_hex: s.raw_hex,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Response for `GET /telemetry/current`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentResponse {
    pub count: usize,
    /// Keyed by room id.
    pub items: BTreeMap<String, RoomStateDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryPointDto {
    pub time: DateTime<Utc>,
    pub room_temp: Option<f64>,
    pub set_temp: Option<f64>,
}

impl From<HistorySample> for HistoryPointDto {
    fn from(s: HistorySample) -> Self {
        Self {
            time: s.time,
            room_temp: s.room_temp,
            set_temp: s.set_temp,
        }
    }
}

fn room_id(raw: Option<Value>) -> Option<String> {
    let id = match raw? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn is_placeholder(id: &str) -> bool {
    id.eq_ignore_ascii_case("none") || id.eq_ignore_ascii_case("null")
}

fn number(field: &'static str, raw: Option<Value>) -> Result<Option<f64>, IngestError> {
    let invalid = |value: String| IngestError::InvalidNumber { field, value };
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(s.to_owned()))
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}
