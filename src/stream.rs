use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::notifier::ChangeNotifier;

const CHANNEL_CAPACITY: usize = 8;
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub tick: Duration,
    /// Idle ticks (no refresh) before a `ping` is sent.
    pub heartbeat_ticks: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            heartbeat_ticks: 25,
        }
    }
}

/// Fires once when the server is going down; every open stream then ends so
/// the HTTP server can drain.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Shutdown::trigger`] has been called, immediately if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on trigger.
        let _ = rx.wait_for(|down| *down).await;
    }
}

/// What a subscriber is told. `refresh` only says *that* something changed;
/// clients re-fetch the room table themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Hello { time: DateTime<Utc> },
    Refresh { ts: DateTime<Utc> },
    Ping,
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Hello { .. } => "hello",
            StreamEvent::Refresh { .. } => "refresh",
            StreamEvent::Ping => "ping",
        }
    }
}

/// An event ready for the transport: SSE event name plus JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub event: &'static str,
    pub data: String,
}

impl StreamMessage {
    pub fn encode(event: &StreamEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.name(),
            data: serde_json::to_string(event)?,
        })
    }
}

/// Start a subscriber loop and return the receiving end of its messages.
///
/// The loop ends as soon as the receiver is dropped, which is how the HTTP
/// layer signals that the client went away, or when `shutdown` fires. Either
/// way the receiver then yields `None`.
pub fn subscribe(
    notifier: &ChangeNotifier,
    settings: StreamSettings,
    shutdown: &Shutdown,
) -> mpsc::Receiver<StreamMessage> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_subscriber(
        Uuid::new_v4(),
        notifier.subscribe(),
        settings,
        shutdown.clone(),
        tx,
    ));
    rx
}

async fn run_subscriber(
    id: Uuid,
    mut changes: watch::Receiver<Option<DateTime<Utc>>>,
    settings: StreamSettings,
    shutdown: Shutdown,
    tx: mpsc::Sender<StreamMessage>,
) {
    info!(subscriber = %id, "Stream subscriber connected");

    // Changes from before the connection are covered by the client's initial fetch.
    let mut seen = *changes.borrow_and_update();
    let mut idle_ticks = 0u32;
    let mut pending = Some(StreamEvent::Hello { time: Utc::now() });

    let mut ticker = time::interval(settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        if let Some(event) = pending.take() {
            match StreamMessage::encode(&event) {
                Ok(msg) => {
                    debug!(subscriber = %id, event = msg.event, "Stream event");
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Failed to encode stream event; backing off");
                    time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        tokio::select! {
            _ = tx.closed() => break,
            _ = shutdown.triggered() => {
                debug!(subscriber = %id, "Closing stream for shutdown");
                break;
            }
            _ = ticker.tick() => {}
        }

        let latest = *changes.borrow_and_update();
        if latest > seen {
            seen = latest;
            idle_ticks = 0;
            pending = latest.map(|ts| StreamEvent::Refresh { ts });
        } else {
            idle_ticks += 1;
            if idle_ticks >= settings.heartbeat_ticks {
                idle_ticks = 0;
                pending = Some(StreamEvent::Ping);
            }
        }
    }

    info!(subscriber = %id, "Stream subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::time::Instant;

    use super::*;

    fn settings() -> StreamSettings {
        StreamSettings::default()
    }

    fn parse(msg: &StreamMessage) -> Value {
        serde_json::from_str(&msg.data).unwrap()
    }

    fn hello_time(msg: &StreamMessage) -> DateTime<Utc> {
        assert_eq!(msg.event, "hello");
        let v = parse(msg);
        assert_eq!(v["type"], "hello");
        v["time"].as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn events_encode_with_type_tag() {
        let ts = Utc::now();
        let msg = StreamMessage::encode(&StreamEvent::Refresh { ts }).unwrap();
        assert_eq!(msg.event, "refresh");
        let v = parse(&msg);
        assert_eq!(v["type"], "refresh");
        assert_eq!(v["ts"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap(), ts);

        let ping = StreamMessage::encode(&StreamEvent::Ping).unwrap();
        assert_eq!(ping.data, r#"{"type":"ping"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn hello_is_sent_immediately() {
        let notifier = ChangeNotifier::new();
        let mut rx = subscribe(&notifier, settings(), &Shutdown::new());
        let start = Instant::now();
        let msg = rx.recv().await.unwrap();
        hello_time(&msg);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_produces_refresh_within_one_tick() {
        let notifier = ChangeNotifier::new();
        let mut rx = subscribe(&notifier, settings(), &Shutdown::new());
        let hello = hello_time(&rx.recv().await.unwrap());

        let changed_at = hello + chrono::Duration::seconds(1);
        notifier.touch(changed_at);
        let start = Instant::now();

        let msg = rx.recv().await.unwrap();
        assert!(start.elapsed() <= settings().tick);
        assert_eq!(msg.event, "refresh");
        let ts: DateTime<Utc> = parse(&msg)["ts"].as_str().unwrap().parse().unwrap();
        assert_eq!(ts, changed_at);
        assert!(ts > hello);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_coalesces_into_one_refresh() {
        let notifier = ChangeNotifier::new();
        let mut rx = subscribe(&notifier, settings(), &Shutdown::new());
        rx.recv().await.unwrap();

        let base = Utc::now();
        for i in 0..5 {
            notifier.touch(base + chrono::Duration::milliseconds(i));
        }

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, "refresh");
        // Nothing else changes, so the next message is the heartbeat.
        let next = rx.recv().await.unwrap();
        assert_eq!(next.event, "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_sends_ping_and_no_refresh() {
        let notifier = ChangeNotifier::new();
        // A change before connecting is not replayed.
        notifier.touch(Utc::now());

        let mut rx = subscribe(&notifier, settings(), &Shutdown::new());
        rx.recv().await.unwrap();

        let start = Instant::now();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event, "ping");
        assert_eq!(parse(&msg)["type"], "ping");
        assert_eq!(start.elapsed(), settings().tick * 25);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_resets_the_heartbeat() {
        let notifier = ChangeNotifier::new();
        let mut rx = subscribe(&notifier, settings(), &Shutdown::new());
        rx.recv().await.unwrap();

        time::sleep(settings().tick * 20).await;
        notifier.touch(Utc::now());
        assert_eq!(rx.recv().await.unwrap().event, "refresh");

        let start = Instant::now();
        assert_eq!(rx.recv().await.unwrap().event, "ping");
        assert!(start.elapsed() >= settings().tick * 24);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_when_receiver_is_dropped() {
        let notifier = ChangeNotifier::new();
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(run_subscriber(
            Uuid::new_v4(),
            notifier.subscribe(),
            settings(),
            Shutdown::new(),
            tx,
        ));

        rx.recv().await.unwrap();
        drop(rx);

        time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber loop should stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_open_streams() {
        let notifier = ChangeNotifier::new();
        let shutdown = Shutdown::new();
        let mut a = subscribe(&notifier, settings(), &shutdown);
        let mut b = subscribe(&notifier, settings(), &shutdown);
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        shutdown.trigger();
        assert!(shutdown.is_triggered());
        let closed = time::timeout(Duration::from_secs(1), async {
            assert!(a.recv().await.is_none());
            assert!(b.recv().await.is_none());
        })
        .await;
        assert!(closed.is_ok(), "streams should end on shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_after_shutdown_only_sends_hello() {
        let notifier = ChangeNotifier::new();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut rx = subscribe(&notifier, settings(), &shutdown);
        assert_eq!(rx.recv().await.unwrap().event, "hello");
        assert!(rx.recv().await.is_none());
    }
}
