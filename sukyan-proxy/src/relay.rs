//! Bidirectional raw-byte relay for an upgraded WebSocket tunnel, tapping
//! both directions through a `WsInterceptor` for recording while forwarding
//! bytes unmodified -- the interceptor never rewrites frames, it only
//! observes them (spec §6).

use std::sync::Arc;
use sukyan_common::{new_uuid, WsConnectionId, WsMessageId};
use sukyan_store::Store;
use sukyan_types::{Opcode, WsDirection, WsMessage};
use sukyan_ws_interceptor::frame::{OPCODE_BINARY, OPCODE_CLOSE, OPCODE_PING, OPCODE_PONG};
use sukyan_ws_interceptor::{Direction, InterceptedMessage, WsInterceptor};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_BUFFER_BYTES: usize = 16 * 1024;

pub async fn bridge<A, B>(
    client: A,
    origin: B,
    interceptor: Arc<WsInterceptor>,
    store: Arc<dyn Store>,
    connection_id: WsConnectionId,
) where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut origin_r, mut origin_w) = tokio::io::split(origin);

    let client_to_origin = {
        let interceptor = interceptor.clone();
        let store = store.clone();
        let connection_id = connection_id.clone();
        async move {
            let mut buf = vec![0u8; READ_BUFFER_BYTES];
            loop {
                let n = match client_r.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let messages = interceptor.feed(Direction::ClientToServer, &buf[..n]);
                record_messages(&store, &connection_id, WsDirection::Sent, messages).await;
                if origin_w.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            let _ = origin_w.shutdown().await;
        }
    };

    let origin_to_client = async move {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        loop {
            let n = match origin_r.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let messages = interceptor.feed(Direction::ServerToClient, &buf[..n]);
            record_messages(&store, &connection_id, WsDirection::Received, messages).await;
            if client_w.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
        let _ = client_w.shutdown().await;
    };

    tokio::join!(client_to_origin, origin_to_client);
}

async fn record_messages(
    store: &Arc<dyn Store>,
    connection_id: &WsConnectionId,
    direction: WsDirection,
    messages: Vec<InterceptedMessage>,
) {
    for message in messages {
        if matches!(message.opcode, OPCODE_CLOSE | OPCODE_PING | OPCODE_PONG) {
            continue;
        }
        let is_binary = message.opcode == OPCODE_BINARY;
        let ws_message = WsMessage {
            id: WsMessageId::new(new_uuid()),
            connection_id: connection_id.clone(),
            opcode: Opcode::from_u8(message.opcode).unwrap_or(Opcode::Binary),
            mask: false,
            payload: encode_payload(&message, is_binary),
            is_binary,
            timestamp: sukyan_common::now_millis(),
            direction,
        };
        if let Err(e) = store.create_ws_message(ws_message).await {
            log::warn!("failed to persist intercepted websocket message (continuing): {e}");
        }
    }
}

fn encode_payload(message: &InterceptedMessage, is_binary: bool) -> String {
    if is_binary {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&message.payload)
    } else {
        String::from_utf8_lossy(&message.payload).into_owned()
    }
}
