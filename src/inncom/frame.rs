/// Two-byte marker that starts every frame.
pub const SYNC_MARKER: [u8; 2] = [0xFF, 0xA2];
/// Bytes taken from the marker onwards for one candidate frame.
pub const FRAME_LEN: usize = 48;
/// Shortest candidate the decoder accepts.
pub const MIN_FRAME_LEN: usize = 40;

/// Finds frame starts in a byte stream that arrives in arbitrary chunks.
///
/// One synchronizer per connection. Feed it with [`push`](Self::push) after
/// every socket read and drain complete candidates with
/// [`next_frame`](Self::next_frame). After a match the scan resumes two bytes
/// past the marker, so a marker inside a garbled frame is still found.
#[derive(Debug, Default)]
pub struct FrameSync {
    buf: Vec<u8>,
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held back while waiting for the rest of a frame (or a marker's second byte).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete candidate, or `None` once more input is needed.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buf) else {
            // Keep a trailing 0xFF: it may pair with the next read.
            let keep = usize::from(self.buf.last() == Some(&SYNC_MARKER[0]));
            self.buf.drain(..self.buf.len() - keep);
            return None;
        };
        self.buf.drain(..start);

        if self.buf.len() < FRAME_LEN {
            return None;
        }
        let frame = self.buf[..FRAME_LEN].to_vec();
        self.buf.drain(..SYNC_MARKER.len());
        Some(frame)
    }

    /// Drains every complete candidate currently buffered.
    pub fn frames(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        std::iter::from_fn(move || self.next_frame())
    }

    /// Called at end of stream. Emits the pending partial frame if it is long
    /// enough to decode, and clears the buffer either way.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let frame = find_marker(&self.buf)
            .map(|start| self.buf[start..].to_vec())
            .filter(|f| f.len() >= MIN_FRAME_LEN);
        self.buf.clear();
        frame
    }
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC_MARKER.len()).position(|w| w == SYNC_MARKER)
}
