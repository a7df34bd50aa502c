use std::{io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::TcpListener,
    time,
};
use tracing::{debug, info, warn};

use crate::{
    forwarder::Forwarder,
    frame_log::FrameLog,
    inncom::{decoder, FrameSync},
    room_store::RoomStore,
};

const READ_BUF_LEN: usize = 4096;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Socket ingestion: raw controller bytes → frames → readings → room store.
#[derive(Clone)]
pub struct IngestService {
    store: RoomStore,
    forwarder: Option<Forwarder>,
    frame_log: Option<Arc<FrameLog>>,
}

impl IngestService {
    pub fn new(store: RoomStore) -> Self {
        Self {
            store,
            forwarder: None,
            frame_log: None,
        }
    }

    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn with_frame_log(mut self, log: FrameLog) -> Self {
        self.frame_log = Some(Arc::new(log));
        self
    }

    /// Accepts connections forever, one task per connection.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Frame listener accepting connections");
        }

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let service = self.clone();
            tokio::spawn(async move {
                let peer = peer.to_string();
                info!(peer = %peer, "Controller connected");
                match service.handle_connection(socket, &peer).await {
                    Ok(frames) => info!(peer = %peer, frames, "Controller disconnected"),
                    Err(e) => warn!(peer = %peer, error = %e, "Controller connection failed"),
                }
            });
        }
    }

    /// Reads until end of stream, applying frames in arrival order.
    /// Returns how many frames were decoded and applied.
    pub async fn handle_connection<R>(&self, mut reader: R, peer: &str) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let mut sync = FrameSync::new();
        let mut buf = [0u8; READ_BUF_LEN];
        let mut applied = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sync.push(&buf[..n]);
            while let Some(frame) = sync.next_frame() {
                applied += usize::from(self.apply(&frame, peer).await);
            }
        }

        if let Some(frame) = sync.finish() {
            applied += usize::from(self.apply(&frame, peer).await);
        }
        Ok(applied)
    }

    async fn apply(&self, frame: &[u8], peer: &str) -> bool {
        let Some(reading) = decoder::decode(frame) else {
            return false;
        };

        if let Some(log) = &self.frame_log {
            log.append(&reading).await;
        }
        if let Some(forwarder) = &self.forwarder {
            forwarder.forward(&reading);
        }

        let state = self.store.upsert(reading).await;
        debug!(
            peer = %peer,
            room_id = %state.room_id,
            room_temp = ?state.room_temp,
            set_temp = ?state.set_temp,
            mode = %state.mode,
            "Frame applied"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpStream};

    use super::*;
    use crate::{
        db::models::Mode,
        inncom::frame::{FRAME_LEN, SYNC_MARKER},
    };

    fn frame(room: u16, temp: [u8; 2], setpoint: u8) -> Vec<u8> {
        let mut f = vec![0x11u8; FRAME_LEN];
        f[..2].copy_from_slice(&SYNC_MARKER);
        f[12..14].copy_from_slice(&room.to_be_bytes());
        f[17] = setpoint;
        f[18] = 0x0F;
        f[20..22].copy_from_slice(&temp);
        f[33..35].copy_from_slice(&[0x80, 0x01]);
        f
    }

    async fn wait_for_room(store: &RoomStore, room_id: &str) -> crate::db::models::RoomState {
        time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(state) = store.get_one(room_id).await {
                    return state;
                }
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("room should appear")
    }

    #[tokio::test]
    async fn applies_frames_in_arrival_order() {
        let store = RoomStore::default();
        let service = IngestService::new(store.clone());

        let mut stream = vec![0x00, 0x42];
        stream.extend(frame(204, [0xAC, 0x0B], 0x9C));
        stream.extend(frame(204, [0xAD, 0x00], 0x9C));
        stream.extend([0x13, 0x37]);

        let applied = service.handle_connection(&stream[..], "test").await.unwrap();
        assert_eq!(applied, 2);

        let state = store.get_one("204").await.unwrap();
        assert_eq!(state.room_temp, Some(72.0));
        assert_eq!(state.set_temp, Some(68.0));
        assert_eq!(state.delta, Some(4.0));
        assert_eq!(state.mode, Mode::Cool);
        assert_eq!(state.hvac_state.as_deref(), Some("LEM OFF + HVAC ON"));

        let temps: Vec<_> = store.history("204", 20).await.iter().map(|s| s.room_temp).collect();
        assert_eq!(temps, vec![Some(71.5), Some(72.0)]);
    }

    #[tokio::test]
    async fn noise_only_connection_touches_nothing() {
        let store = RoomStore::default();
        let service = IngestService::new(store.clone());
        let noise = vec![0xA2u8; 500];

        assert_eq!(service.handle_connection(&noise[..], "test").await.unwrap(), 0);
        assert!(store.get_all().await.is_empty());
        assert!(store.notifier().last_change().is_none());
    }

    #[tokio::test]
    async fn truncated_final_frame_is_flushed_on_close() {
        let store = RoomStore::default();
        let service = IngestService::new(store.clone());
        let partial = frame(13, [0xA9, 0x02], 0x9E)[..42].to_vec();

        assert_eq!(service.handle_connection(&partial[..], "test").await.unwrap(), 1);
        let state = store.get_one("13").await.unwrap();
        assert_eq!(state.room_temp, Some(65.8));
        assert_eq!(state.set_temp, Some(70.0));
        assert_eq!(state.delta, Some(-4.2));
    }

    #[tokio::test]
    async fn frame_log_receives_decoded_rows() {
        let path = std::env::temp_dir().join(format!("ingest_{}.csv", uuid::Uuid::new_v4()));
        let store = RoomStore::default();
        let service = IngestService::new(store).with_frame_log(FrameLog::new(&path));

        let stream = frame(204, [0xAC, 0x0B], 0x9C);
        service.handle_connection(&stream[..], "test").await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("204,71.5,68,3.5,"));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_connections_are_independent() {
        let store = RoomStore::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(IngestService::new(store.clone()).run(listener));

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        // Half a frame on `a`, a full frame on `b`, then finish `a`.
        let fa = frame(101, [0xAB, 0x0C], 0x9C);
        let fb = frame(202, [0xAD, 0x00], 0xA0);
        a.write_all(&fa[..20]).await.unwrap();
        b.write_all(&fb).await.unwrap();
        let state_b = wait_for_room(&store, "202").await;
        assert_eq!(state_b.room_temp, Some(72.0));
        assert!(store.get_one("101").await.is_err());

        a.write_all(&fa[20..]).await.unwrap();
        let state_a = wait_for_room(&store, "101").await;
        assert_eq!(state_a.room_temp, Some(70.0));

        // Dropping one connection leaves the listener serving others.
        drop(a);
        b.write_all(&frame(203, [0xA4, 0x08], 0x94)).await.unwrap();
        let state = wait_for_room(&store, "203").await;
        assert_eq!(state.room_temp, Some(60.0));
        assert_eq!(state.delta, Some(0.0));
    }
}
