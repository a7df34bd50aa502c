pub mod models;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::db::models::RoomReading;

use self::models::ForwardPayload;

/// Readings waiting to be relayed; new readings are dropped while it is full.
const QUEUE_CAPACITY: usize = 256;

/// Relays decoded readings to a remote ingestion endpoint.
///
/// Cloning is cheap; every clone feeds the same background task.
#[derive(Debug, Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<RoomReading>,
}

impl Forwarder {
    /// Spawn the relay task. Must be called from within a Tokio runtime.
    pub fn spawn(url: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build relay HTTP client")?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        info!(url = %url, timeout_secs = timeout.as_secs(), "Reading relay started");
        tokio::spawn(run(http, url, rx));
        Ok(Self { tx })
    }

    /// Queue a reading for relay without waiting.
    pub fn forward(&self, reading: &RoomReading) {
        match self.tx.try_send(reading.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(r)) => {
                warn!(room_id = %r.room_id, "Relay queue full; dropping reading");
            }
            Err(TrySendError::Closed(r)) => {
                warn!(room_id = %r.room_id, "Relay task has stopped; dropping reading");
            }
        }
    }
}

async fn run(http: Client, url: String, mut rx: mpsc::Receiver<RoomReading>) {
    while let Some(reading) = rx.recv().await {
        let room_id = reading.room_id.clone();
        match post(&http, &url, reading.into()).await {
            Ok(()) => debug!(room_id = %room_id, "Reading relayed"),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to relay reading"),
        }
    }
}

async fn post(http: &Client, url: &str, payload: ForwardPayload) -> Result<()> {
    http.post(url)
        .json(&payload)
        .send()
        .await
        .context("Relay request failed")?
        .error_for_status()
        .context("Relay endpoint returned error status")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        api::{router, AppState},
        db::models::Mode,
        room_store::RoomStore,
        stream::StreamSettings,
    };

    #[test]
    fn payload_uses_ingest_field_names() {
        let reading = RoomReading::new(
            "204".into(),
            Some(71.5),
            Some(68.0),
            Some("LEM OFF + HVAC ON".into()),
            Mode::Cool,
            Utc::now(),
            Some("FFA2".into()),
        );
        let v = serde_json::to_value(ForwardPayload::from(reading)).unwrap();
        assert_eq!(v["room"], "204");
        assert_eq!(v["room_temp"], 71.5);
        assert_eq!(v["set_temp"], 68.0);
        assert_eq!(v["delta"], 3.5);
        assert_eq!(v["hvac"], "LEM OFF + HVAC ON");
        assert_eq!(v["mode"], "Cool");
        assert_eq!(v["raw"], "FFA2");
    }

    #[tokio::test]
    async fn relayed_reading_lands_in_a_downstream_instance() {
        let downstream = RoomStore::default();
        let app = router(AppState::new(downstream.clone(), StreamSettings::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let forwarder =
            Forwarder::spawn(format!("http://{addr}/telemetry"), Duration::from_secs(2)).unwrap();
        let reading = RoomReading::new(
            "310".into(),
            Some(72.0),
            Some(70.0),
            Some("LEM ON + HVAC ON".into()),
            Mode::Cool,
            Utc::now(),
            None,
        );
        forwarder.forward(&reading);

        let state = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(state) = downstream.get_one("310").await {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("reading should be relayed");
        assert_eq!(state.room_temp, Some(72.0));
        assert_eq!(state.delta, Some(2.0));
        assert_eq!(state.mode, Mode::Cool);
    }
}
