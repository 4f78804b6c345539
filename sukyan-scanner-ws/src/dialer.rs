//! The outbound-connection boundary, mirroring `sukyan-scanner-http`'s
//! `HttpExecutor`: a small trait standing between the scanner's task loop
//! and the real socket, so tests can script a connection's traffic without
//! opening one.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DialerError {
    #[error("failed to open websocket connection: {0}")]
    ConnectFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    RecvFailed(String),
}

#[derive(Debug, Clone)]
pub struct RawWsMessage {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait WsDialer: Send + Sync {
    async fn dial(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn WsSocket>, DialerError>;
}

/// A connected socket, split into independently-ownable halves so the
/// reader loop and the sender can run on separate tasks.
pub trait WsSocket: Send {
    fn split(self: Box<Self>) -> (Box<dyn WsSender>, Box<dyn WsReceiver>);
}

#[async_trait]
pub trait WsSender: Send {
    async fn send_message(&mut self, opcode: u8, payload: Vec<u8>) -> Result<(), DialerError>;
    async fn close(&mut self) -> Result<(), DialerError>;
}

#[async_trait]
pub trait WsReceiver: Send {
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn recv_message(&mut self) -> Result<Option<RawWsMessage>, DialerError>;
}
