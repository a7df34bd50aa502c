use chrono::{DateTime, Utc};

use super::{
    calibration,
    frame::{MIN_FRAME_LEN, SYNC_MARKER},
};
use crate::db::models::{Mode, RoomReading};

// Field offsets within a frame.
const ROOM_ID: usize = 12;
const SETPOINT: usize = 17;
const RELAY: usize = 18;
const TEMPERATURE: usize = 20;
const MODE: usize = 33;

/// Decode a candidate frame stamped with the current time.
///
/// Returns `None` for anything that is not a frame (short, wrong marker);
/// the caller drops those silently.
pub fn decode(frame: &[u8]) -> Option<RoomReading> {
    decode_at(frame, Utc::now())
}

/// Deterministic core of [`decode`]: same frame and timestamp, same reading.
///
/// | Offset | Width | Meaning                                   |
/// |--------|-------|-------------------------------------------|
/// | 0      | 2     | marker `FF A2`                            |
/// | 12     | 2     | room number, big-endian                   |
/// | 17     | 1     | setpoint code → [`calibration::setpoint`] |
/// | 18     | 1     | relay code → [`calibration::hvac_state`]  |
/// | 20     | 2     | temperature code → [`calibration::temperature`] |
/// | 33     | 2     | mode bytes                                |
pub fn decode_at(frame: &[u8], captured_at: DateTime<Utc>) -> Option<RoomReading> {
    if frame.len() < MIN_FRAME_LEN || frame[..2] != SYNC_MARKER {
        return None;
    }

    let room = u16::from_be_bytes([frame[ROOM_ID], frame[ROOM_ID + 1]]);
    let temp_code = u16::from_be_bytes([frame[TEMPERATURE], frame[TEMPERATURE + 1]]);

    Some(RoomReading::new(
        room.to_string(),
        calibration::temperature(temp_code),
        calibration::setpoint(frame[SETPOINT]),
        Some(calibration::hvac_state(frame[RELAY])),
        mode(&frame[MODE..MODE + 2]),
        captured_at,
        Some(hex::encode_upper(frame)),
    ))
}

/// The controller's mode field is matched on its hex text, not on bit flags:
/// any `80` in the hex string means cooling, otherwise any `00` means off.
fn mode(bytes: &[u8]) -> Mode {
    let text = hex::encode_upper(bytes);
    if text.contains("80") {
        Mode::Cool
    } else if text.contains("00") {
        Mode::Off
    } else {
        Mode::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inncom::frame::FRAME_LEN;

    /// Room 204, setpoint 68 °F, relay "LEM OFF + HVAC ON", 71.5 °F, cooling.
    fn sample_frame() -> Vec<u8> {
        let mut f = vec![0x11u8; FRAME_LEN];
        f[..2].copy_from_slice(&SYNC_MARKER);
        f[12..14].copy_from_slice(&204u16.to_be_bytes());
        f[17] = 0x9C;
        f[18] = 0x0F;
        f[20..22].copy_from_slice(&[0xAC, 0x0B]);
        f[33..35].copy_from_slice(&[0x80, 0x01]);
        f
    }

    #[test]
    fn decodes_all_fields() {
        let now = Utc::now();
        let r = decode_at(&sample_frame(), now).unwrap();
        assert_eq!(r.room_id, "204");
        assert_eq!(r.room_temp, Some(71.5));
        assert_eq!(r.set_temp, Some(68.0));
        assert_eq!(r.delta, Some(3.5));
        assert_eq!(r.hvac_state.as_deref(), Some("LEM OFF + HVAC ON"));
        assert_eq!(r.mode, Mode::Cool);
        assert_eq!(r.captured_at, now);
        let raw = r.raw_hex.unwrap();
        assert_eq!(raw.len(), FRAME_LEN * 2);
        assert!(raw.starts_with("FFA2"));
    }

    #[test]
    fn decoding_is_deterministic_apart_from_timestamp() {
        let frame = sample_frame();
        let mut a = decode(&frame).unwrap();
        let b = decode(&frame).unwrap();
        a.captured_at = b.captured_at;
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_marker_and_short_frames() {
        let mut frame = sample_frame();
        assert!(decode(&frame[..MIN_FRAME_LEN - 1]).is_none());
        assert!(decode(&frame[..MIN_FRAME_LEN]).is_some());
        frame[1] = 0xA3;
        assert!(decode(&frame).is_none());
        assert!(decode(&[0u8; 0]).is_none());
    }

    #[test]
    fn uncalibrated_values_are_absent_not_errors() {
        let mut frame = sample_frame();
        frame[20..22].copy_from_slice(&[0x00, 0x00]);
        frame[18] = 0x55;
        let r = decode(&frame).unwrap();
        assert_eq!(r.room_temp, None);
        assert_eq!(r.set_temp, Some(68.0));
        assert_eq!(r.delta, None);
        assert_eq!(r.hvac_state.as_deref(), Some("Unknown(55)"));

        frame[17] = 0x01;
        assert_eq!(decode(&frame).unwrap().set_temp, None);
    }

    #[test]
    fn mode_matches_on_hex_text() {
        assert_eq!(mode(&[0x80, 0x01]), Mode::Cool);
        assert_eq!(mode(&[0x00, 0x80]), Mode::Cool);
        assert_eq!(mode(&[0x00, 0x01]), Mode::Off);
        // "0800": the "80" straddles the two bytes.
        assert_eq!(mode(&[0x08, 0x00]), Mode::Cool);
        assert_eq!(mode(&[0x12, 0x34]), Mode::Unknown);
    }

    #[test]
    fn room_number_is_big_endian() {
        let mut frame = sample_frame();
        frame[12..14].copy_from_slice(&[0x01, 0x02]);
        assert_eq!(decode(&frame).unwrap().room_id, "258");
    }
}
