//! Appends every decoded frame to a CSV file for offline analysis.
//!
//! Errors are logged and swallowed: the log is best-effort and never
//! interrupts ingestion.

use std::path::PathBuf;

use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::warn;

use crate::db::models::RoomReading;

const HEADER: &str = "Room,RoomTemp,SetTemp,Delta,HVAC,Mode,Time,Packet\n";

#[derive(Debug)]
pub struct FrameLog {
    path: PathBuf,
    // Serialises appends from concurrent connections so rows never interleave.
    lock: Mutex<()>,
}

impl FrameLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub async fn append(&self, reading: &RoomReading) {
        let _guard = self.lock.lock().await;

        let mut file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "frame_log: failed to open log file");
                return;
            }
        };

        let is_empty = match file.metadata().await {
            Ok(m) => m.len() == 0,
            Err(_) => false,
        };
        let mut content = String::new();
        if is_empty {
            content.push_str(HEADER);
        }
        content.push_str(&csv_row(reading));

        if let Err(e) = file.write_all(content.as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "frame_log: failed to write row");
        }
    }
}

fn csv_row(r: &RoomReading) -> String {
    format!(
        "{},{},{},{},{},{},{},{}\n",
        csv_field(&r.room_id),
        opt(r.room_temp),
        opt(r.set_temp),
        opt(r.delta),
        csv_field(r.hvac_state.as_deref().unwrap_or("")),
        r.mode,
        r.captured_at.to_rfc3339(),
        r.raw_hex.as_deref().unwrap_or(""),
    )
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}
