use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ClientError, Result};
use crate::io::ReadBuffer;

/// Maximum frame body. A body of exactly this size means the message
/// continues in the next frame.
pub const MAX_FRAME_SIZE: usize = 0xFF_FF_FF;

const HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
enum ParseState {
    ReadingHeader,
    ReadingBody { remaining: usize, is_last: bool },
}

/// Reassembles logical messages out of the length-prefixed frame stream.
///
/// Frame headers are parsed and excised in place; multi-frame messages
/// end up contiguous in the read buffer's current-message area. Sequence
/// numbers are checked per frame against the expected value.
pub struct MessageReader {
    buffer: ReadBuffer,
    state: ParseState,
    expected_seqnum: u8,
    parsing_active: bool,
    done: bool,
}

impl MessageReader {
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            buffer: ReadBuffer::new(initial_size, max_size),
            state: ParseState::ReadingHeader,
            expected_seqnum: 0,
            parsing_active: false,
            done: false,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
        self.state = ParseState::ReadingHeader;
        self.expected_seqnum = 0;
        self.parsing_active = false;
        self.done = false;
    }

    pub fn max_buffer_size(&self) -> usize {
        self.buffer.max_size()
    }

    /// Whether a complete message is available via [`message`].
    ///
    /// [`message`]: Self::message
    pub fn done(&self) -> bool {
        self.done
    }

    /// The current (complete) message. Valid until the next
    /// `prepare_read` that starts a new message.
    pub fn message(&self) -> &[u8] {
        debug_assert!(self.done);
        self.buffer.current_message()
    }

    /// The sequence number the next frame is expected to carry. After a
    /// message completes this is the value the caller should resume its
    /// own counter from.
    pub fn sequence_number(&self) -> u8 {
        self.expected_seqnum
    }

    /// Starts parsing a new message whose first frame must carry
    /// `seqnum`, discarding the previous message.
    ///
    /// With `keep_state` set, a partially-parsed message (from surplus
    /// bytes of an earlier read) is continued instead.
    ///
    /// Bytes already pending are parsed eagerly: the reader may be
    /// [`done`](Self::done) on return, without any I/O.
    pub fn prepare_read(&mut self, seqnum: u8, keep_state: bool) -> Result<()> {
        if keep_state && self.parsing_active && !self.done {
            return self.parse_pending();
        }

        // Discard the previous message and compact.
        let len = self.buffer.current_message_size();
        self.buffer.move_to_reserved(len);
        self.buffer.remove_reserved();

        self.state = ParseState::ReadingHeader;
        self.expected_seqnum = seqnum;
        self.parsing_active = true;
        self.done = false;

        self.parse_pending()
    }

    /// Makes sure the free area can hold the bytes the parser still
    /// needs (at least one).
    pub fn prepare_buffer(&mut self) -> Result<()> {
        let needed = match self.state {
            ParseState::ReadingHeader => HEADER_SIZE.saturating_sub(self.buffer.pending_size()),
            ParseState::ReadingBody { remaining, .. } => {
                remaining.saturating_sub(self.buffer.pending_size())
            }
        };

        self.buffer.grow_to_fit(needed.max(1))
    }

    /// The free area the transport should read into.
    pub fn free_area(&mut self) -> &mut [u8] {
        self.buffer.free_area()
    }

    /// Records that `n` bytes were read into the free area and resumes
    /// parsing.
    pub fn resume(&mut self, n: usize) -> Result<()> {
        self.buffer.move_to_pending(n);
        self.parse_pending()
    }

    fn parse_pending(&mut self) -> Result<()> {
        while !self.done {
            match self.state {
                ParseState::ReadingHeader => {
                    if self.buffer.pending_size() < HEADER_SIZE {
                        return Ok(());
                    }

                    let header = self.buffer.pending_area();
                    let body_len = LittleEndian::read_u24(header) as usize;
                    let seqnum = header[3];

                    // The header is not part of the message: pull it in,
                    // then excise it.
                    self.buffer.move_to_current_message(HEADER_SIZE);
                    self.buffer.remove_current_message_last(HEADER_SIZE);

                    if seqnum != self.expected_seqnum {
                        return Err(ClientError::SequenceNumberMismatch.into());
                    }

                    self.expected_seqnum = self.expected_seqnum.wrapping_add(1);
                    self.state = ParseState::ReadingBody {
                        remaining: body_len,
                        is_last: body_len != MAX_FRAME_SIZE,
                    };
                }

                ParseState::ReadingBody {
                    ref mut remaining,
                    is_last,
                } => {
                    let take = (*remaining).min(self.buffer.pending_size());
                    self.buffer.move_to_current_message(take);
                    *remaining -= take;

                    if *remaining > 0 {
                        return Ok(());
                    }

                    if is_last {
                        self.done = true;
                    } else {
                        // A full-size frame: the message continues after
                        // the next header.
                        self.state = ParseState::ReadingHeader;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Serializes one message as one or more frames into `out`, starting at
/// `seqnum`. Returns the next sequence number.
///
/// A payload that is an exact multiple of the maximum frame size gets a
/// mandatory zero-length trailer frame.
pub fn write_message(payload: &[u8], out: &mut Vec<u8>, seqnum: u8, max_size: usize) -> Result<u8> {
    if payload.len() > max_size {
        return Err(ClientError::MaxBufferSizeExceeded.into());
    }

    let mut seqnum = seqnum;
    let mut offset = 0;

    loop {
        let chunk = (payload.len() - offset).min(MAX_FRAME_SIZE);

        let mut header = [0_u8; HEADER_SIZE];
        LittleEndian::write_u24(&mut header, chunk as u32);
        header[3] = seqnum;
        seqnum = seqnum.wrapping_add(1);

        out.extend_from_slice(&header);
        out.extend_from_slice(&payload[offset..offset + chunk]);
        offset += chunk;

        if chunk < MAX_FRAME_SIZE {
            return Ok(seqnum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{write_message, MessageReader, MAX_FRAME_SIZE};
    use crate::error::ClientError;

    // Deterministic bytes, long period, cheap.
    fn patterned(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_F491;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn read_message(reader: &mut MessageReader, mut wire: &[u8], seqnum: u8) -> Vec<u8> {
        reader.prepare_read(seqnum, false).unwrap();

        // Feed in uneven chunks to exercise partial reads.
        let mut chunk_len = 1;
        while !reader.done() {
            reader.prepare_buffer().unwrap();
            let free = reader.free_area();
            let n = chunk_len.min(free.len()).min(wire.len());
            assert!(n > 0, "reader wants bytes but the wire is empty");

            free[..n].copy_from_slice(&wire[..n]);
            wire = &wire[n..];
            reader.resume(n).unwrap();

            chunk_len = (chunk_len * 7 + 3) % 8192 + 1;
        }

        assert!(wire.is_empty(), "unconsumed wire bytes");
        reader.message().to_vec()
    }

    #[test]
    fn it_round_trips_messages_at_frame_boundaries() {
        let max = MAX_FRAME_SIZE;

        for &len in &[0, 1, max - 1, max, max + 1, 2 * max, 2 * max + 1] {
            for &seqnum in &[0_u8, 254, 255] {
                let payload = patterned(len);

                let mut wire = Vec::new();
                let next = write_message(&payload, &mut wire, seqnum, usize::MAX).unwrap();

                let frames = (len / max + 1) as u8;
                assert_eq!(next, seqnum.wrapping_add(frames), "len {} seq {}", len, seqnum);

                let mut reader = MessageReader::new(1024, usize::MAX);
                let message = read_message(&mut reader, &wire, seqnum);
                assert_eq!(message, payload, "len {} seq {}", len, seqnum);
                assert_eq!(reader.sequence_number(), next);
            }
        }
    }

    #[test]
    fn it_detects_sequence_number_mismatches() {
        // Two-frame message: flipping any bit of either sequence byte
        // must yield exactly a sequence mismatch.
        let payload = patterned(MAX_FRAME_SIZE + 5);
        let mut wire = Vec::new();
        write_message(&payload, &mut wire, 0, usize::MAX).unwrap();

        let second_header = 4 + MAX_FRAME_SIZE;
        for &seq_byte in &[3_usize, second_header + 3] {
            for bit in 0..8 {
                let mut corrupted = wire.clone();
                corrupted[seq_byte] ^= 1 << bit;

                let mut reader = MessageReader::new(1024, usize::MAX);
                reader.prepare_read(0, false).unwrap();

                let mut result = Ok(());
                let mut rest: &[u8] = &corrupted;
                while !reader.done() && !rest.is_empty() {
                    reader.prepare_buffer().unwrap();
                    let free = reader.free_area();
                    let n = free.len().min(rest.len());
                    free[..n].copy_from_slice(&rest[..n]);
                    rest = &rest[n..];

                    result = reader.resume(n);
                    if result.is_err() {
                        break;
                    }
                }

                let err = result.expect_err("corrupted stream must not parse");
                assert_eq!(err.code(), Some(ClientError::SequenceNumberMismatch));
            }
        }
    }

    #[test]
    fn it_parses_surplus_bytes_without_io() {
        // Two messages delivered in a single read: the second must
        // complete from cached bytes alone.
        let mut wire = Vec::new();
        let next = write_message(b"first", &mut wire, 0, usize::MAX).unwrap();
        write_message(b"second", &mut wire, next, usize::MAX).unwrap();

        let mut reader = MessageReader::new(1024, usize::MAX);
        reader.prepare_read(0, false).unwrap();
        reader.prepare_buffer().unwrap();

        reader.grow_and_feed(&wire);
        assert!(reader.done());
        assert_eq!(reader.message(), b"first");

        reader.prepare_read(1, false).unwrap();
        assert!(reader.done(), "second message should parse without I/O");
        assert_eq!(reader.message(), b"second");
    }

    #[test]
    fn it_enforces_the_read_buffer_limit() {
        let payload = patterned(4096);
        let mut wire = Vec::new();
        write_message(&payload, &mut wire, 0, usize::MAX).unwrap();

        let mut reader = MessageReader::new(16, 128);
        reader.prepare_read(0, false).unwrap();

        let mut rest: &[u8] = &wire;
        let mut result = Ok(());
        while !reader.done() && !rest.is_empty() {
            result = reader.prepare_buffer();
            if result.is_err() {
                break;
            }

            let free = reader.free_area();
            let n = free.len().min(rest.len());
            free[..n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            result = reader.resume(n);
            if result.is_err() {
                break;
            }
        }

        let err = result.expect_err("oversized message must not fit");
        assert_eq!(err.code(), Some(ClientError::MaxBufferSizeExceeded));
    }

    #[test]
    fn it_rejects_writes_past_the_buffer_limit() {
        let mut out = Vec::new();
        let err = write_message(&patterned(64), &mut out, 0, 32).unwrap_err();
        assert_eq!(err.code(), Some(ClientError::MaxBufferSizeExceeded));
    }

    impl MessageReader {
        // Test helper: grow to fit and feed a whole byte run.
        fn grow_and_feed(&mut self, bytes: &[u8]) {
            self.buffer.grow_to_fit(bytes.len()).unwrap();
            self.free_area()[..bytes.len()].copy_from_slice(bytes);
            self.resume(bytes.len()).unwrap();
        }
    }
}
