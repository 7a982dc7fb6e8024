//! Recovers discrete frames from the dongle's byte stream.
//!
//! The serial line gives no guarantee about read boundaries: a read may hold a
//! single byte, several concatenated frames, or start in the middle of a frame.

use crate::frame::{declared_payload_len, RawFrame, HEADER_LEN, SYNC};

/// Without a marker in sight, the buffer is dropped once it grows past this.
pub const DEFAULT_DESYNC_THRESHOLD: usize = 64;
/// Largest payload length accepted after a marker before it is considered a
/// false match.
pub const DEFAULT_MAX_PAYLOAD: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembled {
    Frame(RawFrame),
    /// Bytes were thrown away to get back in step with the stream.
    Desync { discarded: usize },
}

#[derive(Debug, Clone)]
pub struct Reassembler {
    buf: Vec<u8>,
    desync_threshold: usize,
    max_payload: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_DESYNC_THRESHOLD, DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_limits(desync_threshold: usize, max_payload: usize) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            desync_threshold,
            max_payload,
        }
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a batch of bytes and return every event it completes, in stream
    /// order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Reassembled> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            let Some(start) = find_sync(&self.buf) else {
                if self.buf.len() > self.desync_threshold {
                    // A trailing first marker byte may be the start of a frame
                    let keep = usize::from(self.buf.last() == Some(&SYNC[0]));
                    let discarded = self.buf.len() - keep;
                    self.buf.drain(..discarded);
                    tracing::warn!(discarded, "no frame marker in buffer, discarding");
                    out.push(Reassembled::Desync { discarded });
                }
                break;
            };
            let Some(payload_len) = self
                .buf
                .get(start..)
                .and_then(declared_payload_len)
            else {
                // Marker found but the length field has not arrived yet
                break;
            };
            if payload_len > self.max_payload {
                let discarded = start + 1;
                self.buf.drain(..discarded);
                tracing::warn!(payload_len, discarded, "implausible frame length, skipping marker");
                out.push(Reassembled::Desync { discarded });
                continue;
            }
            let total = HEADER_LEN + payload_len;
            if self.buf.len() < start + total {
                break;
            }
            if start > 0 {
                tracing::debug!(garbage = start, "dropping bytes before frame marker");
                self.buf.drain(..start);
            }
            let frame: Vec<u8> = self.buf.drain(..total).collect();
            out.push(Reassembled::Frame(RawFrame::from_parts_unchecked(frame)));
        }
        out
    }
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC.len()).position(|w| w == SYNC)
}
