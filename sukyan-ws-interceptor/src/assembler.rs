//! Fragment reassembly for one direction of one WebSocket connection.
//!
//! Control frames (close/ping/pong) are never fragmented and are passed
//! through untouched. Data frames may arrive as a `fin=false` head followed
//! by zero or more continuation frames; the assembler buffers them until the
//! terminating `fin=true` continuation arrives.

use crate::frame::{Frame, OPCODE_CONTINUATION};

/// Messages larger than this are truncated; the original length is kept so
/// callers can tell a message was cut rather than genuinely short.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AssembledMessage {
    pub opcode: u8,
    pub payload: Vec<u8>,
    pub original_len: usize,
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct Assembler {
    opcode: Option<u8>,
    buffer: Vec<u8>,
    original_len: usize,
    truncated: bool,
}

pub enum FeedResult {
    /// The frame was a control frame or did not complete a message.
    Pending,
    Complete(AssembledMessage),
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame into the assembler. Control frames always return
    /// `Pending` and are not buffered -- the caller forwards them directly.
    pub fn feed(&mut self, frame: &Frame) -> FeedResult {
        if frame.is_control() {
            return FeedResult::Pending;
        }

        if self.opcode.is_none() {
            self.opcode = Some(if frame.opcode == OPCODE_CONTINUATION {
                OPCODE_CONTINUATION
            } else {
                frame.opcode
            });
        }

        self.original_len += frame.payload.len();
        if self.buffer.len() < MAX_MESSAGE_BYTES {
            let remaining = MAX_MESSAGE_BYTES - self.buffer.len();
            if frame.payload.len() <= remaining {
                self.buffer.extend_from_slice(&frame.payload);
            } else {
                self.buffer.extend_from_slice(&frame.payload[..remaining]);
                self.truncated = true;
            }
        } else {
            self.truncated = true;
        }

        if !frame.fin {
            return FeedResult::Pending;
        }

        let opcode = self.opcode.take().unwrap_or(frame.opcode);
        let payload = std::mem::take(&mut self.buffer);
        let original_len = self.original_len;
        let truncated = self.truncated;
        self.original_len = 0;
        self.truncated = false;

        FeedResult::Complete(AssembledMessage {
            opcode,
            payload,
            original_len,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{OPCODE_PING, OPCODE_TEXT};

    fn frame(fin: bool, opcode: u8, payload: &[u8]) -> Frame {
        Frame {
            fin,
            rsv1: false,
            opcode,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn single_frame_message_completes_immediately() {
        let mut assembler = Assembler::new();
        match assembler.feed(&frame(true, OPCODE_TEXT, b"hello")) {
            FeedResult::Complete(msg) => {
                assert_eq!(msg.payload, b"hello");
                assert_eq!(msg.opcode, OPCODE_TEXT);
                assert!(!msg.truncated);
            }
            FeedResult::Pending => panic!("expected a completed message"),
        }
    }

    #[test]
    fn fragmented_message_reassembles_across_continuations() {
        let mut assembler = Assembler::new();
        assert!(matches!(
            assembler.feed(&frame(false, OPCODE_TEXT, b"hel")),
            FeedResult::Pending
        ));
        assert!(matches!(
            assembler.feed(&frame(false, OPCODE_CONTINUATION, b"lo ")),
            FeedResult::Pending
        ));
        match assembler.feed(&frame(true, OPCODE_CONTINUATION, b"world")) {
            FeedResult::Complete(msg) => {
                assert_eq!(msg.payload, b"hello world");
                assert_eq!(msg.opcode, OPCODE_TEXT);
            }
            FeedResult::Pending => panic!("expected a completed message"),
        }
    }

    #[test]
    fn control_frame_passes_through_without_affecting_assembly() {
        let mut assembler = Assembler::new();
        assert!(matches!(
            assembler.feed(&frame(false, OPCODE_TEXT, b"hel")),
            FeedResult::Pending
        ));
        assert!(matches!(
            assembler.feed(&frame(true, OPCODE_PING, b"")),
            FeedResult::Pending
        ));
        match assembler.feed(&frame(true, OPCODE_CONTINUATION, b"lo")) {
            FeedResult::Complete(msg) => assert_eq!(msg.payload, b"hello"),
            FeedResult::Pending => panic!("expected a completed message"),
        }
    }

    #[test]
    fn oversized_message_is_truncated_but_reports_original_length() {
        let mut assembler = Assembler::new();
        let chunk = vec![b'a'; MAX_MESSAGE_BYTES];
        assert!(matches!(
            assembler.feed(&frame(false, OPCODE_TEXT, &chunk)),
            FeedResult::Pending
        ));
        match assembler.feed(&frame(true, OPCODE_CONTINUATION, b"overflow")) {
            FeedResult::Complete(msg) => {
                assert_eq!(msg.payload.len(), MAX_MESSAGE_BYTES);
                assert_eq!(msg.original_len, MAX_MESSAGE_BYTES + 8);
                assert!(msg.truncated);
            }
            FeedResult::Pending => panic!("expected a completed message"),
        }
    }
}
