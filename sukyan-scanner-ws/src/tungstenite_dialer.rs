//! The live `WsDialer`: dials a fresh `tokio-tungstenite` connection per
//! task, mirroring `sukyan-scanner-http::executor::ReqwestExecutor`'s role
//! as the concrete boundary behind its trait.

use crate::dialer::{DialerError, RawWsMessage, WsDialer, WsReceiver, WsSender, WsSocket};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
pub struct TungsteniteDialer;

#[async_trait]
impl WsDialer for TungsteniteDialer {
    async fn dial(&self, url: &str, headers: &[(String, String)]) -> Result<Box<dyn WsSocket>, DialerError> {
        let mut request = Request::builder()
            .uri(url)
            .header("sec-websocket-key", generate_key())
            .header("sec-websocket-version", "13")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket");
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("sec-websocket-key")
                || name.eq_ignore_ascii_case("sec-websocket-version")
                || name.eq_ignore_ascii_case("connection")
                || name.eq_ignore_ascii_case("upgrade")
            {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request
            .body(())
            .map_err(|e| DialerError::ConnectFailed(e.to_string()))?;

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| DialerError::ConnectFailed(e.to_string()))?;

        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

struct TungsteniteSocket {
    stream: Socket,
}

impl WsSocket for TungsteniteSocket {
    fn split(self: Box<Self>) -> (Box<dyn WsSender>, Box<dyn WsReceiver>) {
        let (sink, stream) = self.stream.split();
        (Box::new(TungsteniteSender { sink }), Box::new(TungsteniteReceiver { stream }))
    }
}

struct TungsteniteSender {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl WsSender for TungsteniteSender {
    async fn send_message(&mut self, opcode: u8, payload: Vec<u8>) -> Result<(), DialerError> {
        let message = match sukyan_types::Opcode::from_u8(opcode) {
            Some(sukyan_types::Opcode::Text) => {
                Message::Text(String::from_utf8_lossy(&payload).into_owned())
            }
            Some(sukyan_types::Opcode::Ping) => Message::Ping(payload),
            Some(sukyan_types::Opcode::Pong) => Message::Pong(payload),
            Some(sukyan_types::Opcode::Close) => Message::Close(None),
            _ => Message::Binary(payload),
        };
        self.sink.send(message).await.map_err(|e| DialerError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), DialerError> {
        self.sink.send(Message::Close(None)).await.map_err(|e| DialerError::SendFailed(e.to_string()))
    }
}

struct TungsteniteReceiver {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl WsReceiver for TungsteniteReceiver {
    async fn recv_message(&mut self) -> Result<Option<RawWsMessage>, DialerError> {
        loop {
            return match self.stream.next().await {
                None => Ok(None),
                Some(Ok(Message::Text(text))) => {
                    Ok(Some(RawWsMessage { opcode: sukyan_types::Opcode::Text as u8, payload: text.into_bytes() }))
                }
                Some(Ok(Message::Binary(data))) => {
                    Ok(Some(RawWsMessage { opcode: sukyan_types::Opcode::Binary as u8, payload: data }))
                }
                Some(Ok(Message::Ping(data))) => {
                    Ok(Some(RawWsMessage { opcode: sukyan_types::Opcode::Ping as u8, payload: data }))
                }
                Some(Ok(Message::Pong(data))) => {
                    Ok(Some(RawWsMessage { opcode: sukyan_types::Opcode::Pong as u8, payload: data }))
                }
                Some(Ok(Message::Close(_))) => Ok(None),
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => Err(DialerError::RecvFailed(e.to_string())),
            };
        }
    }
}
