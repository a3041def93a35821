use crate::error::{ClientError, Result};

/// Buffer type optimized for the reads performed by the protocol.
///
/// A single resizable chunk of memory with four contiguous areas:
///
/// - reserved: messages already parsed that are being kept alive;
/// - current message: the message currently being parsed;
/// - pending: bytes received but not yet parsed into a message;
/// - free: space for the next read.
///
/// Area boundaries move without copying except when the reserved area is
/// discarded or an intermediate frame header is excised.
pub struct ReadBuffer {
    buffer: Vec<u8>,
    max_size: usize,
    current_message_offset: usize,
    pending_offset: usize,
    free_offset: usize,
}

impl ReadBuffer {
    pub fn new(size: usize, max_size: usize) -> Self {
        debug_assert!(size <= max_size);

        Self {
            buffer: vec![0; size],
            max_size,
            current_message_offset: 0,
            pending_offset: 0,
            free_offset: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current_message_offset = 0;
        self.pending_offset = 0;
        self.free_offset = 0;
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn reserved_size(&self) -> usize {
        self.current_message_offset
    }

    pub fn current_message_size(&self) -> usize {
        self.pending_offset - self.current_message_offset
    }

    pub fn pending_size(&self) -> usize {
        self.free_offset - self.pending_offset
    }

    pub fn free_size(&self) -> usize {
        self.buffer.len() - self.free_offset
    }

    pub fn current_message(&self) -> &[u8] {
        &self.buffer[self.current_message_offset..self.pending_offset]
    }

    pub fn pending_area(&self) -> &[u8] {
        &self.buffer[self.pending_offset..self.free_offset]
    }

    pub fn free_area(&mut self) -> &mut [u8] {
        &mut self.buffer[self.free_offset..]
    }

    /// Moves n bytes from the free to the pending area (they've been
    /// read from the transport).
    pub fn move_to_pending(&mut self, len: usize) {
        debug_assert!(len <= self.free_size());
        self.free_offset += len;
    }

    /// Moves n bytes from the pending to the current message area.
    pub fn move_to_current_message(&mut self, len: usize) {
        debug_assert!(len <= self.pending_size());
        self.pending_offset += len;
    }

    /// Removes the last `len` bytes of the current message area, moving
    /// all subsequent bytes backwards. Used to excise frame headers.
    pub fn remove_current_message_last(&mut self, len: usize) {
        debug_assert!(len > 0);
        debug_assert!(len <= self.current_message_size());

        self.buffer
            .copy_within(self.pending_offset..self.free_offset, self.pending_offset - len);
        self.pending_offset -= len;
        self.free_offset -= len;
    }

    /// Moves the current message into the reserved area, keeping it
    /// alive while the next message is parsed.
    pub fn move_to_reserved(&mut self, len: usize) {
        debug_assert!(len <= self.current_message_size());
        self.current_message_offset += len;
    }

    /// Discards the reserved area, moving everything else backwards.
    pub fn remove_reserved(&mut self) {
        if self.reserved_size() > 0 {
            let current_message_size = self.current_message_size();
            let pending_size = self.pending_size();

            self.buffer
                .copy_within(self.current_message_offset..self.free_offset, 0);
            self.current_message_offset = 0;
            self.pending_offset = current_message_size;
            self.free_offset = current_message_size + pending_size;
        }
    }

    /// Makes sure the free area is at least `len` bytes long, growing
    /// the buffer if required.
    pub fn grow_to_fit(&mut self, len: usize) -> Result<()> {
        if self.free_size() < len {
            let new_size = self.buffer.len() + len - self.free_size();
            if new_size > self.max_size {
                return Err(ClientError::MaxBufferSizeExceeded.into());
            }

            self.buffer.resize(new_size, 0);
        }

        Ok(())
    }
}
