//! Stateful WebSocket MITM interceptor (spec §6): wire-frame parsing,
//! fragment reassembly, and permessage-deflate for both directions of one
//! proxied connection.

pub mod assembler;
pub mod deflate;
pub mod frame;
pub mod headers;

use assembler::{Assembler, AssembledMessage, FeedResult};
use frame::{parse_frame, Frame, FrameError};
use std::sync::Mutex;

/// Tracks both halves of a single WebSocket connection. Each direction gets
/// its own frame buffer and fragment assembler, but both live behind one
/// mutex -- spec §5 calls for a single lock covering the buffer-parse
/// critical section rather than one lock per direction, since the two
/// directions never make progress concurrently on the same connection.
pub struct WsInterceptor {
    state: Mutex<ConnectionState>,
    permessage_deflate: bool,
}

struct ConnectionState {
    client_buf: Vec<u8>,
    client_assembler: Assembler,
    server_buf: Vec<u8>,
    server_assembler: Assembler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// A reassembled, decompressed message ready for detection/recording.
#[derive(Debug, Clone)]
pub struct InterceptedMessage {
    pub direction: Direction,
    pub opcode: u8,
    pub payload: Vec<u8>,
    pub truncated: bool,
}

impl WsInterceptor {
    pub fn new(permessage_deflate: bool) -> Self {
        Self {
            state: Mutex::new(ConnectionState {
                client_buf: Vec::new(),
                client_assembler: Assembler::new(),
                server_buf: Vec::new(),
                server_assembler: Assembler::new(),
            }),
            permessage_deflate,
        }
    }

    /// Feeds freshly-read bytes from one direction into the interceptor,
    /// returning zero or more complete messages. Partial frames remain
    /// buffered for the next call.
    pub fn feed(&self, direction: Direction, bytes: &[u8]) -> Vec<InterceptedMessage> {
        let mut state_guard = self.state.lock().expect("ws interceptor mutex poisoned");
        let state = &mut *state_guard;
        let (buf, assembler) = match direction {
            Direction::ClientToServer => (&mut state.client_buf, &mut state.client_assembler),
            Direction::ServerToClient => (&mut state.server_buf, &mut state.server_assembler),
        };

        buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        loop {
            match parse_frame(buf) {
                Ok((frame, consumed)) => {
                    buf.drain(..consumed);
                    if let Some(message) = self.process_frame(direction, assembler, frame) {
                        out.push(message);
                    }
                }
                Err(FrameError::Incomplete) | Err(FrameError::IncompletePayload { .. }) => break,
            }
        }
        out
    }

    fn process_frame(
        &self,
        direction: Direction,
        assembler: &mut Assembler,
        frame: Frame,
    ) -> Option<InterceptedMessage> {
        let rsv1 = frame.rsv1;
        let is_control = frame.is_control();

        match assembler.feed(&frame) {
            FeedResult::Pending => {
                if is_control {
                    Some(InterceptedMessage {
                        direction,
                        opcode: frame.opcode,
                        payload: frame.payload,
                        truncated: false,
                    })
                } else {
                    None
                }
            }
            FeedResult::Complete(AssembledMessage {
                opcode,
                payload,
                truncated,
                ..
            }) => {
                let payload = if rsv1 && self.permessage_deflate {
                    match deflate::inflate(&payload) {
                        Ok(inflated) => inflated,
                        Err(err) => {
                            log::warn!("permessage-deflate inflate failed, surfacing raw bytes: {err}");
                            payload
                        }
                    }
                } else {
                    payload
                };

                Some(InterceptedMessage {
                    direction,
                    opcode,
                    payload,
                    truncated,
                })
            }
        }
    }
}
