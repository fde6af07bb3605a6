use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::cobs::{decode, DELIMITER};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Incremental COBS deframer.
///
/// Owns the parse buffer (raw bytes not yet resolved into frames), the store of
/// decoded packets, and a counter of frames that failed to decode. A frame is the
/// bytes strictly between two delimiters; bytes before the first delimiter are
/// dropped once a frame completes after them.
///
/// Not thread safe by itself: exactly one consumer drives [`CobsDeframer::parse`].
#[derive(Debug)]
pub struct CobsDeframer {
    parse_buf: BytesMut,
    packets: VecDeque<Bytes>,
    parse_errors: u64,
    max_frame_size: Option<usize>,
    discarding: bool,
}

impl Default for CobsDeframer {
    fn default() -> Self {
        Self::new()
    }
}

impl CobsDeframer {
    pub fn new() -> Self {
        Self {
            parse_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            packets: VecDeque::new(),
            parse_errors: 0,
            max_frame_size: None,
            discarding: false,
        }
    }

    /// Drop any frame whose encoded body is longer than `max` bytes.
    ///
    /// A pending frame is dropped as soon as it grows past the bound, which keeps
    /// the parse buffer bounded when a closing delimiter is lost on the line.
    /// Each dropped frame counts as one parse error.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }

    /// Append raw bytes without parsing.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.parse_buf.extend_from_slice(chunk);
    }

    /// Append raw bytes and run a parsing pass. Returns the number of new packets.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        self.extend(chunk);
        self.parse()
    }

    /// Resolve every complete frame currently in the parse buffer.
    ///
    /// Returns the number of packets added to the store. A trailing partial
    /// frame stays buffered for the next pass.
    pub fn parse(&mut self) -> usize {
        let mut decoded = 0usize;

        loop {
            if self.discarding {
                match self.parse_buf.iter().position(|&b| b == DELIMITER) {
                    Some(idx) => {
                        self.parse_buf.advance(idx + 1);
                        self.discarding = false;
                    }
                    None => {
                        self.parse_buf.clear();
                        break;
                    }
                }
            }

            let Some(start) = self.parse_buf.iter().position(|&b| b == DELIMITER) else {
                break;
            };

            let body_start = start + 1;
            let Some(len) = self.parse_buf[body_start..]
                .iter()
                .position(|&b| b == DELIMITER)
            else {
                self.check_pending(body_start);
                break;
            };
            let end = body_start + len;

            if self.max_frame_size.is_some_and(|max| len > max) {
                self.parse_errors += 1;
                debug!(frame_len = len, "dropping oversized frame");
                self.parse_buf.advance(end + 1);
                continue;
            }

            match decode(&self.parse_buf[body_start..end]) {
                Ok(packet) if !packet.is_empty() => {
                    self.packets.push_back(packet);
                    decoded += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    self.parse_errors += 1;
                    debug!(
                        error = %err,
                        frame_len = len,
                        parse_errors = self.parse_errors,
                        "dropping malformed frame"
                    );
                }
            }

            self.parse_buf.advance(end + 1);
        }

        decoded
    }

    fn check_pending(&mut self, body_start: usize) {
        let Some(max) = self.max_frame_size else {
            return;
        };
        let pending = self.parse_buf.len() - body_start;
        if pending > max {
            self.parse_errors += 1;
            debug!(pending, max, "dropping oversized frame");
            self.parse_buf.clear();
            self.discarding = true;
        }
    }

    /// Number of decoded packets waiting in the store.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Take the oldest decoded packet.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.packets.pop_front()
    }

    /// Take every decoded packet, oldest first.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.packets.drain(..).collect()
    }

    /// Frames that failed to decode since creation or the last [`CobsDeframer::clear`].
    pub fn parsing_error_count(&self) -> u64 {
        self.parse_errors
    }

    /// Raw bytes still held in the parse buffer.
    pub fn buffered_len(&self) -> usize {
        self.parse_buf.len()
    }

    /// Drop buffered bytes, decoded packets, and the error count.
    pub fn clear(&mut self) {
        self.parse_buf.clear();
        self.packets.clear();
        self.parse_errors = 0;
        self.discarding = false;
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::cobs::encode_frame;

    fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
        prop::collection::vec(prop::collection::vec(any::<u8>(), 1..600), 0..12)
    }

    /// Cut `stream` at the given offsets (taken modulo its length).
    fn split_at_points(stream: &[u8], mut points: Vec<usize>) -> Vec<&[u8]> {
        if stream.is_empty() {
            return vec![stream];
        }
        points.iter_mut().for_each(|p| *p %= stream.len());
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::with_capacity(points.len() + 1);
        let mut last = 0;
        for point in points {
            chunks.push(&stream[last..point]);
            last = point;
        }
        chunks.push(&stream[last..]);
        chunks
    }

    #[test]
    fn prop_round_trip_in_order() {
        proptest!(|(payloads in payloads())| {
            let stream: Vec<u8> = payloads.iter().flat_map(|p| encode_frame(p).to_vec()).collect();

            let mut deframer = CobsDeframer::new();
            prop_assert_eq!(deframer.push(&stream), payloads.len());

            let decoded: Vec<Vec<u8>> = deframer.drain().iter().map(|b| b.to_vec()).collect();
            prop_assert_eq!(decoded, payloads);
            prop_assert_eq!(deframer.parsing_error_count(), 0);
            prop_assert_eq!(deframer.buffered_len(), 0);
        });
    }

    #[test]
    fn prop_chunking_does_not_change_output() {
        proptest!(|(
            payloads in payloads(),
            noise in prop::collection::vec(any::<u8>(), 0..64),
            points in prop::collection::vec(any::<usize>(), 0..32),
            max_frame_size in prop::option::of(1usize..700),
        )| {
            let mut stream = noise;
            for payload in &payloads {
                stream.extend_from_slice(&encode_frame(payload));
            }

            let fresh = || match max_frame_size {
                Some(max) => CobsDeframer::new().with_max_frame_size(max),
                None => CobsDeframer::new(),
            };

            let mut whole = fresh();
            whole.push(&stream);

            let mut split = fresh();
            for chunk in split_at_points(&stream, points) {
                split.push(chunk);
            }

            prop_assert_eq!(split.drain(), whole.drain());
            prop_assert_eq!(split.parsing_error_count(), whole.parsing_error_count());
        });
    }
}
