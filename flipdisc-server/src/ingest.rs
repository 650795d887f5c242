//! Producer boundary
//!
//! Decodes RBM and FDIS messages into frames and submits them to the shared
//! buffer. A bad message is rejected on its own; the stream it came from
//! carries on.

use log::{debug, warn};

use flipdisc_core::config::CanvasSize;
use flipdisc_core::{Canvas, Frame};
use flipdisc_protocol::rbm::RBM_HEADER_SIZE;
use flipdisc_protocol::{DecodeError, FdisFrame, RbmHeader, RbmMessage};

use crate::error::IngestError;
use crate::shared::SharedFrameBuffer;

/// A frame was taken into the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub buffer_size: usize,
    pub buffer_cap: usize,
    pub last_seq: u32,
    /// Sequence number dropped to make room, if the buffer was full
    pub evicted: Option<u32>,
    /// Advisory wait before the next send
    pub retry_after_ms: u64,
}

/// Decode-and-submit front end for one canvas
#[derive(Clone, Copy)]
pub struct Ingest<'a> {
    buffer: &'a SharedFrameBuffer,
    canvas: CanvasSize,
}

impl<'a> Ingest<'a> {
    pub fn new(buffer: &'a SharedFrameBuffer, canvas: CanvasSize) -> Self {
        Self { buffer, canvas }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Decode one RBM message and submit it
    pub fn try_enqueue(&self, bytes: &[u8]) -> Result<Accepted, IngestError> {
        let message = RbmMessage::decode(bytes)?;
        let header = message.header;
        self.check_size(header.width, header.height)?;

        let mut canvas = Canvas::from_packed(header.width, header.height, message.bitmap.to_vec())?;
        if header.invert() {
            canvas.invert();
        }
        let frame = Frame::new(header.seq, canvas).with_duration(header.frame_duration_ms);
        Ok(self.submit(frame))
    }

    /// Decode one FDIS frame and submit it at the server cadence
    pub fn try_enqueue_fdis(&self, bytes: &[u8]) -> Result<Accepted, IngestError> {
        let fdis = FdisFrame::decode(bytes)?;
        self.check_size(fdis.width, fdis.height)?;
        let canvas = Canvas::from_packed(fdis.width, fdis.height, fdis.bitmap.to_vec())?;
        Ok(self.submit(Frame::new(u32::from(fdis.seq), canvas)))
    }

    fn check_size(&self, width: u16, height: u16) -> Result<(), IngestError> {
        if width != self.canvas.width || height != self.canvas.height {
            return Err(IngestError::SizeMismatch {
                width,
                height,
                canvas_width: self.canvas.width,
                canvas_height: self.canvas.height,
            });
        }
        Ok(())
    }

    fn submit(&self, frame: Frame) -> Accepted {
        let seq = frame.seq;
        self.buffer.with(|fb| {
            let outcome = fb.submit(frame);
            if let Some(old) = outcome.evicted {
                debug!("Buffer full, dropped frame {} for {}", old, seq);
            }
            Accepted {
                buffer_size: outcome.len,
                buffer_cap: fb.capacity(),
                last_seq: seq,
                evicted: outcome.evicted,
                retry_after_ms: fb.retry_after().as_millis(),
            }
        })
    }
}

/// Splits a byte stream into back-to-back RBM messages
///
/// Bytes are buffered until a whole message is present. A bad header drops
/// bytes up to the next `"RB"` so the stream can resynchronise.
pub struct RbmStreamParser {
    pending: Vec<u8>,
    max_payload: usize,
}

impl RbmStreamParser {
    /// `max_payload` bounds the bitmap a header may announce
    pub fn new(max_payload: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_payload,
        }
    }

    /// Parser sized for one canvas
    pub fn for_canvas(canvas: CanvasSize) -> Self {
        Self::new(Canvas::packed_len(canvas.width, canvas.height))
    }

    /// Drop any partially received message
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Bytes held for an incomplete message
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete message, or `None` if more bytes are needed
    pub fn next_message(&mut self) -> Option<Result<Vec<u8>, DecodeError>> {
        if self.pending.len() < RBM_HEADER_SIZE {
            return None;
        }
        let header = match RbmHeader::parse(&self.pending) {
            Ok(header) => header,
            Err(e) => {
                self.resync();
                return Some(Err(e));
            }
        };
        let need = header.payload_len();
        if need > self.max_payload {
            // Skip the header; the announced bitmap would never fit the canvas
            self.pending.drain(..RBM_HEADER_SIZE);
            self.resync_from(0);
            return Some(Err(DecodeError::DimensionOutOfRange));
        }
        let total = RBM_HEADER_SIZE + need;
        if self.pending.len() < total {
            return None;
        }
        let message: Vec<u8> = self.pending.drain(..total).collect();
        Some(Ok(message))
    }

    fn resync(&mut self) {
        self.resync_from(1);
    }

    fn resync_from(&mut self, start: usize) {
        let next = self
            .pending
            .windows(2)
            .skip(start)
            .position(|w| w == b"RB")
            .map(|p| p + start);
        match next {
            Some(at) => {
                self.pending.drain(..at);
            }
            None => {
                // A trailing 'R' may be the first half of the next magic
                let keep = self.pending.last() == Some(&b'R');
                self.pending.clear();
                if keep {
                    self.pending.push(b'R');
                }
            }
        }
    }
}

/// Counts from feeding one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkReport {
    pub accepted: usize,
    pub rejected: usize,
    pub evicted: usize,
}

/// Stream ingest: a parser feeding an [`Ingest`]
pub struct IngestStream<'a> {
    ingest: Ingest<'a>,
    parser: RbmStreamParser,
}

impl<'a> IngestStream<'a> {
    pub fn new(ingest: Ingest<'a>) -> Self {
        Self {
            parser: RbmStreamParser::for_canvas(ingest.canvas()),
            ingest,
        }
    }

    /// Feed bytes and submit every message they complete
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> ChunkReport {
        self.parser.feed(chunk);
        let mut report = ChunkReport::default();
        while let Some(next) = self.parser.next_message() {
            let result = next
                .map_err(IngestError::from)
                .and_then(|message| self.ingest.try_enqueue(&message));
            match result {
                Ok(accepted) => {
                    report.accepted += 1;
                    if accepted.evicted.is_some() {
                        report.evicted += 1;
                    }
                }
                Err(e) => {
                    warn!("Rejected ingest message: {}", e);
                    report.rejected += 1;
                }
            }
        }
        report
    }

    /// Read timeout: drop a partial message; returns bytes discarded
    pub fn on_timeout(&mut self) -> usize {
        let dropped = self.parser.pending();
        if dropped > 0 {
            warn!("Ingest read timed out, dropping {} partial bytes", dropped);
            self.parser.reset();
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipdisc_core::BufferConfig;
    use flipdisc_protocol::rbm::RBM_FLAG_INVERT;
    use proptest::prelude::*;

    const CANVAS: CanvasSize = CanvasSize {
        width: 28,
        height: 7,
    };

    fn rbm(seq: u32, fill: u8) -> Vec<u8> {
        let header = RbmHeader::new(28, 7, seq);
        let mut bytes = header.encode().to_vec();
        bytes.extend(std::iter::repeat(fill).take(header.payload_len()));
        bytes
    }

    fn buffer() -> SharedFrameBuffer {
        // 30 fps × 100 ms = 3 slots
        SharedFrameBuffer::new(BufferConfig {
            target_fps: 30,
            buffer_duration_ms: 100,
        })
    }

    #[test]
    fn test_accepts_matching_frame() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        let accepted = ingest.try_enqueue(&rbm(7, 0xF0)).unwrap();
        assert_eq!(accepted.buffer_size, 1);
        assert_eq!(accepted.buffer_cap, 3);
        assert_eq!(accepted.last_seq, 7);
        assert_eq!(accepted.evicted, None);
        assert_eq!(accepted.retry_after_ms, 33);
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        let header = RbmHeader::new(14, 7, 1);
        let mut bytes = header.encode().to_vec();
        bytes.extend(std::iter::repeat(0).take(header.payload_len()));
        assert!(matches!(
            ingest.try_enqueue(&bytes),
            Err(IngestError::SizeMismatch { width: 14, .. })
        ));
        assert!(shared.with(|fb| fb.is_empty()));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        let mut bytes = rbm(1, 0);
        bytes[0] = b'X';
        assert_eq!(
            ingest.try_enqueue(&bytes),
            Err(IngestError::Decode(DecodeError::BadMagicOrVersion))
        );
    }

    #[test]
    fn test_invert_flag_applies() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        let mut header = RbmHeader::new(28, 7, 1);
        header.flags = RBM_FLAG_INVERT;
        let mut bytes = header.encode().to_vec();
        bytes.extend(std::iter::repeat(0).take(header.payload_len()));
        ingest.try_enqueue(&bytes).unwrap();
        let on = shared.with(|fb| fb.peek_next().map(|f| f.canvas.count_on()));
        assert_eq!(on, Some(28 * 7));
    }

    #[test]
    fn test_overflow_keeps_latest() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        for seq in 0..3 {
            ingest.try_enqueue(&rbm(seq, 0)).unwrap();
        }
        let accepted = ingest.try_enqueue(&rbm(3, 0)).unwrap();
        assert_eq!(accepted.evicted, Some(0));
        assert_eq!(accepted.buffer_size, 3);
        assert_eq!(shared.with(|fb| fb.peek_next().map(|f| f.seq)), Some(1));
    }

    #[test]
    fn test_fdis_frame() {
        let shared = buffer();
        let ingest = Ingest::new(&shared, CANVAS);
        let bitmap = vec![0xFF; 28];
        let frame = FdisFrame {
            seq: 42,
            timestamp: 0,
            width: 28,
            height: 7,
            bitmap: &bitmap,
        };
        let mut bytes = vec![0u8; 64];
        let n = frame.encode(&mut bytes).unwrap();
        let accepted = ingest.try_enqueue_fdis(&bytes[..n]).unwrap();
        assert_eq!(accepted.last_seq, 42);
    }

    #[test]
    fn test_stream_splits_back_to_back_messages() {
        let mut stream = Vec::new();
        stream.extend(rbm(1, 0));
        stream.extend(rbm(2, 0));
        let mut parser = RbmStreamParser::for_canvas(CANVAS);

        // Deliver in awkward chunks
        parser.feed(&stream[..10]);
        assert!(parser.next_message().is_none());
        parser.feed(&stream[10..50]);
        let first = parser.next_message().unwrap().unwrap();
        assert_eq!(RbmHeader::parse(&first).unwrap().seq, 1);
        assert!(parser.next_message().is_none());
        parser.feed(&stream[50..]);
        let second = parser.next_message().unwrap().unwrap();
        assert_eq!(RbmHeader::parse(&second).unwrap().seq, 2);
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_stream_resyncs_after_garbage() {
        let mut parser = RbmStreamParser::for_canvas(CANVAS);
        let mut stream = vec![0x00; 20];
        stream.extend(rbm(9, 0));
        parser.feed(&stream);
        assert_eq!(parser.next_message(), Some(Err(DecodeError::BadMagicOrVersion)));
        let message = parser.next_message().unwrap().unwrap();
        assert_eq!(RbmHeader::parse(&message).unwrap().seq, 9);
    }

    #[test]
    fn test_stream_rejects_oversized_header() {
        let mut parser = RbmStreamParser::for_canvas(CANVAS);
        parser.feed(&RbmHeader::new(1024, 1024, 1).encode());
        assert_eq!(parser.next_message(), Some(Err(DecodeError::DimensionOutOfRange)));
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_ingest_stream_reports_and_times_out() {
        let shared = buffer();
        let mut stream = IngestStream::new(Ingest::new(&shared, CANVAS));
        let mut bytes = rbm(1, 0);
        let partial = rbm(2, 0);
        bytes.extend_from_slice(&partial[..20]);

        let report = stream.handle_chunk(&bytes);
        assert_eq!(report.accepted, 1);
        assert_eq!(stream.on_timeout(), 20);
        assert_eq!(stream.on_timeout(), 0);

        // After the reset a fresh message still goes through
        let report = stream.handle_chunk(&rbm(3, 0));
        assert_eq!(report.accepted, 1);
        assert_eq!(shared.with(|fb| fb.len()), 2);
    }

    proptest! {
        #[test]
        fn prop_stream_split_is_chunking_independent(
            count in 1u32..5,
            cuts in proptest::collection::vec(1usize..60, 1..20),
        ) {
            let mut stream = Vec::new();
            for seq in 0..count {
                stream.extend(rbm(seq, seq as u8));
            }

            let mut parser = RbmStreamParser::for_canvas(CANVAS);
            let mut seqs = Vec::new();
            let mut rest = &stream[..];
            let mut cut = cuts.iter().cycle();
            while !rest.is_empty() {
                let n = (*cut.next().unwrap()).min(rest.len());
                parser.feed(&rest[..n]);
                rest = &rest[n..];
                while let Some(message) = parser.next_message() {
                    seqs.push(RbmHeader::parse(&message.unwrap()).unwrap().seq);
                }
            }

            prop_assert_eq!(seqs, (0..count).collect::<Vec<_>>());
            prop_assert_eq!(parser.pending(), 0);
        }
    }
}
