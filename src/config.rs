use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

use crate::{room_store::MAX_HISTORY, stream::StreamSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Raw TCP listener for controller frames.
    pub ingest_host: String,
    pub ingest_port: u16,
    /// Postgres persistence is enabled only when set.
    pub database_url: Option<String>,
    /// Samples kept per room, 1..=20.
    pub history_limit: usize,
    pub stream_tick: Duration,
    pub heartbeat_ticks: u32,
    /// Relay every decoded frame to this URL when set.
    pub forward_url: Option<String>,
    pub forward_timeout: Duration,
    /// Append every decoded frame to this CSV file when set.
    pub frame_log_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let set = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let history_limit: usize = get("HISTORY_LIMIT", "20")
            .parse()
            .context("HISTORY_LIMIT must be a positive integer")?;
        if !(1..=MAX_HISTORY).contains(&history_limit) {
            bail!("HISTORY_LIMIT must be between 1 and {MAX_HISTORY}, got {history_limit}");
        }

        let stream_tick_ms: u64 = get("STREAM_TICK_MS", "1000")
            .parse()
            .context("STREAM_TICK_MS must be a positive integer")?;
        if stream_tick_ms == 0 {
            bail!("STREAM_TICK_MS must be greater than zero");
        }

        let heartbeat_ticks: u32 = get("HEARTBEAT_TICKS", "25")
            .parse()
            .context("HEARTBEAT_TICKS must be a positive integer")?;
        if heartbeat_ticks == 0 {
            bail!("HEARTBEAT_TICKS must be greater than zero");
        }

        Ok(Self {
            server_host: get("SERVER_HOST", "0.0.0.0"),
            server_port: get("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            ingest_host: get("INGEST_HOST", "0.0.0.0"),
            ingest_port: get("INGEST_PORT", "3003")
                .parse()
                .context("INGEST_PORT must be a valid port number")?,
            database_url: set("DATABASE_URL"),
            history_limit,
            stream_tick: Duration::from_millis(stream_tick_ms),
            heartbeat_ticks,
            forward_url: set("FORWARD_URL"),
            forward_timeout: Duration::from_secs(
                get("FORWARD_TIMEOUT_SECS", "2")
                    .parse()
                    .context("FORWARD_TIMEOUT_SECS must be a positive integer")?,
            ),
            frame_log_path: set("FRAME_LOG_PATH").map(PathBuf::from),
        })
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            tick: self.stream_tick,
            heartbeat_ticks: self.heartbeat_ticks,
        }
    }
}
