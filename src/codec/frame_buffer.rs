//! Message buffer for accumulating partial body reads.
//!
//! Chunk boundaries of a streamed HTTP body carry no meaning, so the reader
//! reassembles complete messages using the protocol's [`Framing`]:
//!
//! - `Delimited`: scan for the delimiter byte.
//! - `LengthPrefixed`: a state machine that first waits for the 4-byte
//!   length, then for that many payload bytes.
//!
//! # Example
//!
//! ```
//! use rapidwire::codec::{Framing, MessageBuffer};
//!
//! let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
//! assert!(buffer.push(b"{\"status\":200,").unwrap().is_empty());
//! let messages = buffer.push(b"\"data\":1}\n{\"st").unwrap();
//! assert_eq!(messages.len(), 1);
//! assert_eq!(buffer.len(), 4);
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::Framing;
use crate::error::{RapidError, Result};

/// Default maximum size of one streamed message (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete message or length prefix.
    WaitingForHeader,
    /// Length prefix parsed, waiting for the payload.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
#[derive(Debug)]
pub struct MessageBuffer {
    buffer: BytesMut,
    framing: Framing,
    state: State,
    /// Bytes at the front of `buffer` already searched for a delimiter.
    scanned: usize,
    max_message_size: usize,
}

impl MessageBuffer {
    /// Create a buffer with the default maximum message size.
    pub fn new(framing: Framing) -> Self {
        Self::with_max_message(framing, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a buffer with a custom maximum message size.
    pub fn with_max_message(framing: Framing, max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            framing,
            state: State::WaitingForHeader,
            scanned: 0,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`RapidError::Protocol`] if a message exceeds the maximum
    /// size.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Take whatever is left once the body has ended.
    ///
    /// A delimited stream may omit the final delimiter; a length-prefixed
    /// stream must not end mid-message.
    pub fn finish(&mut self) -> Result<Option<Bytes>> {
        match (self.framing, self.state) {
            (_, State::WaitingForPayload { remaining }) => Err(RapidError::Protocol(format!(
                "stream ended with {remaining} bytes of a message missing"
            ))),
            (Framing::LengthPrefixed, State::WaitingForHeader) if !self.buffer.is_empty() => Err(
                RapidError::Protocol("stream ended inside a length prefix".to_string()),
            ),
            (Framing::Delimited(_), State::WaitingForHeader)
                if !self.buffer.iter().all(u8::is_ascii_whitespace) =>
            {
                self.scanned = 0;
                Ok(Some(self.buffer.split().freeze()))
            }
            _ => {
                self.clear();
                Ok(None)
            }
        }
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match (self.framing, self.state) {
                (Framing::Delimited(delimiter), _) => {
                    let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == delimiter) else {
                        self.scanned = self.buffer.len();
                        self.check_size(self.buffer.len())?;
                        return Ok(None);
                    };
                    let pos = self.scanned + offset;
                    self.scanned = 0;
                    self.check_size(pos)?;
                    let message = self.buffer.split_to(pos).freeze();
                    self.buffer.advance(1);
                    // Blank lines carry nothing.
                    if !message.iter().all(u8::is_ascii_whitespace) {
                        return Ok(Some(message));
                    }
                }

                (Framing::LengthPrefixed, State::WaitingForHeader) => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let length = self.buffer.get_u32() as usize;
                    self.check_size(length)?;
                    self.state = State::WaitingForPayload { remaining: length };
                }

                (Framing::LengthPrefixed, State::WaitingForPayload { remaining }) => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let message = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(message));
                }
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(RapidError::Protocol(format!(
                "message size {} exceeds maximum {}",
                size, self.max_message_size
            )));
        }
        Ok(())
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
        self.scanned = 0;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixed(payload: &[u8]) -> Vec<u8> {
        Framing::LengthPrefixed.frame(payload).unwrap().to_vec()
    }

    #[test]
    fn test_multiple_lines_in_one_push() {
        let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
        let messages = buffer.push(b"one\ntwo\nthree\n").unwrap();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
        let messages = buffer.push(b"\none\n\r\n").unwrap();
        assert_eq!(messages, vec!["one"]);
    }

    #[test]
    fn test_long_run_of_blank_lines() {
        let mut buffer = MessageBuffer::with_max_message(Framing::Delimited(b'\n'), 8 << 20);
        assert!(buffer.push(&vec![b'\n'; 1_000_000]).unwrap().is_empty());
        assert!(buffer.is_empty());

        let mut data = vec![b'\n'; 100_000];
        data.extend_from_slice(b"after\n");
        assert_eq!(buffer.push(&data).unwrap(), vec!["after"]);
    }

    #[test]
    fn test_large_message_in_small_chunks() {
        let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
        let message = vec![b'x'; 256 * 1024];
        for chunk in message.chunks(16) {
            assert!(buffer.push(chunk).unwrap().is_empty());
        }
        let messages = buffer.push(b"\nnext").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), message.len());
        assert_eq!(buffer.finish().unwrap().unwrap(), "next");
    }

    #[test]
    fn test_finish_returns_unterminated_tail() {
        let mut buffer = MessageBuffer::new(Framing::Delimited(b'\n'));
        buffer.push(b"one\ntail").unwrap();
        assert_eq!(buffer.finish().unwrap().unwrap(), "tail");
        assert!(buffer.finish().unwrap().is_none());
    }

    #[test]
    fn test_fragmented_prefix() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        let bytes = prefixed(b"test");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let messages = buffer.push(&bytes[2..]).unwrap();
        assert_eq!(messages, vec!["test"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        let payload = b"this is a longer payload that will be fragmented";
        let bytes = prefixed(payload);

        let split = LENGTH_PREFIX_SIZE + 10;
        assert!(buffer.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let messages = buffer.push(&bytes[split..]).unwrap();
        assert_eq!(&messages[0][..], payload);
    }

    #[test]
    fn test_empty_message() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        let messages = buffer.push(&prefixed(b"")).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_empty());
    }

    #[test]
    fn test_max_size_validation() {
        let mut buffer = MessageBuffer::with_max_message(Framing::LengthPrefixed, 100);
        let err = buffer.push(&1000u32.to_be_bytes()).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));

        let mut buffer = MessageBuffer::with_max_message(Framing::Delimited(b'\n'), 4);
        assert!(buffer.push(b"toolong").is_err());
    }

    #[test]
    fn test_finish_mid_message_fails() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        buffer.push(&prefixed(b"abcdef")[..6]).unwrap();
        assert!(buffer.finish().is_err());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        let mut bytes = prefixed(b"hi");
        bytes.extend(prefixed(b"there"));

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }
        assert_eq!(all, vec!["hi", "there"]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = MessageBuffer::new(Framing::LengthPrefixed);
        buffer.push(&prefixed(b"test")[..6]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }
}
