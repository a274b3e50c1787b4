//! Byte Stream Framing
//!
//! Turns the raw byte stream of an ELM327-style interpreter into discrete
//! messages. A message ends at the configured terminator or at the `>`
//! ready prompt; the prompt is additionally reported as [`Frame::Ready`].

use crate::encoder::Terminator;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};

/// Maximum bytes buffered without a boundary before the framer gives up
pub const MAX_BUFFER_LEN: usize = 4096;

/// Replacement for control bytes inside a message
pub const PLACEHOLDER: u8 = b'!';

/// Interpreter ready prompt
pub const READY_PROMPT: u8 = b'>';

/// A message received between two framing boundaries.
///
/// The text never contains control bytes: interior ones were replaced by
/// [`PLACEHOLDER`] and the boundary itself was consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawMessage {
    text: String,
    terminated: bool,
}

impl RawMessage {
    /// A message closed by a terminator or prompt
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminated: true,
        }
    }

    /// A partial accumulation drained before its boundary arrived
    pub fn unterminated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminated: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One unit produced by the framer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete, non-empty message
    Message(RawMessage),
    /// The interpreter printed its `>` prompt
    Ready,
    /// Too many bytes without a boundary; the buffer was discarded
    Overflow { len: usize },
}

/// Incremental framer over an interpreter byte stream
#[derive(Debug, Clone)]
pub struct ByteStreamFramer {
    terminator: Terminator,
    buffer: Vec<u8>,
}

impl Default for ByteStreamFramer {
    fn default() -> Self {
        Self::new(Terminator::default())
    }
}

impl ByteStreamFramer {
    pub fn new(terminator: Terminator) -> Self {
        Self {
            terminator,
            buffer: Vec::with_capacity(128),
        }
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Number of bytes waiting for a boundary
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partial accumulation
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Drain a partial accumulation as an unterminated message
    pub fn flush(&mut self) -> Option<RawMessage> {
        self.take_message().map(RawMessage::unterminated)
    }

    /// Feed a chunk of bytes, returning every frame it completes.
    ///
    /// Bytes after the last boundary stay buffered for the next call, so a
    /// message split across chunks frames exactly as if fed at once.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == READY_PROMPT {
                if let Some(text) = self.take_message() {
                    frames.push(Frame::Message(RawMessage::new(text)));
                }
                frames.push(Frame::Ready);
            } else if self.terminator.is_boundary(byte) {
                if let Some(text) = self.take_message() {
                    frames.push(Frame::Message(RawMessage::new(text)));
                }
            } else if byte < 0x20 {
                // Leading control bytes carry nothing
                if !self.buffer.is_empty() {
                    self.buffer.push(PLACEHOLDER);
                }
            } else {
                self.buffer.push(byte);
            }

            if self.buffer.len() > MAX_BUFFER_LEN {
                let len = self.buffer.len();
                warn!("Framing buffer overflow after {} bytes, discarding", len);
                self.buffer.clear();
                frames.push(Frame::Overflow { len });
            }
        }

        frames
    }

    fn take_message(&mut self) -> Option<String> {
        let raw = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();

        let text = raw.trim_matches(|c: char| c == ' ' || c == PLACEHOLDER as char);
        if text.is_empty() {
            return None;
        }
        trace!("Framed message: {}", text);
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn messages(frames: &[Frame]) -> Vec<&str> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Message(m) => Some(m.text()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_message_with_prompt() {
        let mut framer = ByteStreamFramer::default();
        let frames = framer.feed(b"41 0C 1A F8\r\r>");
        assert_eq!(
            frames,
            vec![Frame::Message(RawMessage::new("41 0C 1A F8")), Frame::Ready]
        );
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_split_chunks() {
        let mut framer = ByteStreamFramer::default();
        assert!(framer.feed(b"41 0").is_empty());
        assert_eq!(framer.pending(), 4);
        let frames = framer.feed(b"C 1A F8\r");
        assert_eq!(frames, vec![Frame::Message(RawMessage::new("41 0C 1A F8"))]);
    }

    #[test]
    fn test_prompt_closes_message() {
        let mut framer = ByteStreamFramer::default();
        let frames = framer.feed(b"NO DATA>");
        assert_eq!(
            frames,
            vec![Frame::Message(RawMessage::new("NO DATA")), Frame::Ready]
        );
    }

    #[test]
    fn test_control_bytes_become_placeholder() {
        let mut framer = ByteStreamFramer::new(Terminator::Cr);
        let frames = framer.feed(b"\n\n010C\n41 0C 00 00\n\r");
        assert_eq!(messages(&frames), vec!["010C!41 0C 00 00"]);
    }

    #[test]
    fn test_crlf_both_bytes_are_boundaries() {
        let mut framer = ByteStreamFramer::new(Terminator::CrLf);
        let frames = framer.feed(b"ATRV\r\n12.5V\r\n\r\n>");
        assert_eq!(messages(&frames), vec!["ATRV", "12.5V"]);
        assert_eq!(frames.last(), Some(&Frame::Ready));
    }

    #[test]
    fn test_lf_terminator() {
        let mut framer = ByteStreamFramer::new(Terminator::Lf);
        let frames = framer.feed(b"41 0D 32\n");
        assert_eq!(messages(&frames), vec!["41 0D 32"]);
    }

    #[test]
    fn test_empty_messages_not_emitted() {
        let mut framer = ByteStreamFramer::default();
        let frames = framer.feed(b"\r\r  \r>");
        assert_eq!(frames, vec![Frame::Ready]);
    }

    #[test]
    fn test_overflow_resets_buffer() {
        let mut framer = ByteStreamFramer::default();
        let noise = vec![b'A'; MAX_BUFFER_LEN + 1];
        let frames = framer.feed(&noise);
        assert_eq!(frames, vec![Frame::Overflow { len: MAX_BUFFER_LEN + 1 }]);
        assert_eq!(framer.pending(), 0);

        let frames = framer.feed(b"41 0D 32\r");
        assert_eq!(messages(&frames), vec!["41 0D 32"]);
    }

    #[test]
    fn test_flush_returns_unterminated() {
        let mut framer = ByteStreamFramer::default();
        framer.feed(b"41 0C 1A");
        let partial = framer.flush().unwrap();
        assert_eq!(partial.text(), "41 0C 1A");
        assert!(!partial.is_terminated());
        assert!(framer.flush().is_none());
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut framer = ByteStreamFramer::default();
        framer.feed(b"41 0C");
        framer.reset();
        let frames = framer.feed(b"41 0D 00\r");
        assert_eq!(messages(&frames), vec!["41 0D 00"]);
    }

    #[test]
    fn test_same_message_twice_frames_twice() {
        let mut framer = ByteStreamFramer::default();
        let first = framer.feed(b"41 05 73\r");
        let second = framer.feed(b"41 05 73\r");
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn test_split_anywhere_matches_single_feed(
            msg in "[0-9A-F ]{1,40}",
            split in 0usize..64,
        ) {
            let wire = format!("{}\r>", msg);
            let bytes = wire.as_bytes();
            let at = split.min(bytes.len());

            let mut whole = ByteStreamFramer::default();
            let expected = whole.feed(bytes);

            let mut parts = ByteStreamFramer::default();
            let mut actual = parts.feed(&bytes[..at]);
            actual.extend(parts.feed(&bytes[at..]));

            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn test_messages_never_contain_control_bytes(
            bytes in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let mut framer = ByteStreamFramer::default();
            for frame in framer.feed(&bytes) {
                if let Frame::Message(m) = frame {
                    prop_assert!(!m.is_empty());
                    prop_assert!(m.text().chars().all(|c| c as u32 >= 0x20));
                }
            }
        }
    }
}
