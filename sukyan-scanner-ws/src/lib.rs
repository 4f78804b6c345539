//! The WebSocket scanner (spec §4.5): every task dials a fresh connection
//! to the captured URL, replays a prefix of the original conversation,
//! sends the payloaded message, and evaluates the observed traffic.

pub mod dialer;
pub mod tungstenite_dialer;

pub use tungstenite_dialer::TungsteniteDialer;

use dialer::{DialerError, RawWsMessage, WsDialer, WsReceiver, WsSender};
use std::sync::Arc;
use std::time::Duration;
use sukyan_common::{new_uuid, HistoryId, ScanId, WorkspaceId, WsConnectionId, WsMessageId};
use sukyan_config::WebSocketScannerConfig;
use sukyan_detect::{evaluate_payload, DetectionContext, PayloadVerdict};
use sukyan_insertion::build_ws_message;
use sukyan_store::{NewIssue, Store};
use sukyan_types::{
    Evidence, InsertionPoint, Issue, Opcode, Payload, WsConnection, WsDirection, WsMessage,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum WsScanError {
    #[error("dial failed: {0}")]
    Dial(#[from] DialerError),
    #[error("store error: {0}")]
    Store(#[from] sukyan_store::StoreError),
    #[error("insertion error: {0}")]
    Insertion(#[from] sukyan_insertion::InsertionError),
}

/// One task: replay `captured[..target_index]` of the sent messages on a
/// fresh connection, then send `captured[target_index]` with `point`
/// mutated to `payload.value`.
pub struct WsScanTask {
    pub url: String,
    pub handshake_headers: Vec<(String, String)>,
    pub captured: Vec<WsMessage>,
    pub target_index: usize,
    pub point: InsertionPoint,
    pub payload: Payload,
    pub upgrade_history_id: Option<HistoryId>,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
}

pub struct WebSocketScanner {
    store: Arc<dyn Store>,
    dialer: Arc<dyn WsDialer>,
    config: WebSocketScannerConfig,
}

impl WebSocketScanner {
    pub fn new(store: Arc<dyn Store>, dialer: Arc<dyn WsDialer>, config: WebSocketScannerConfig) -> Self {
        Self { store, dialer, config }
    }

    pub async fn run(self: Arc<Self>, tasks: Vec<WsScanTask>) -> Vec<Issue> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.worker_pool_size.max(1)));
        let mut set = tokio::task::JoinSet::new();
        for task in tasks {
            let scanner = self.clone();
            let permit = semaphore.clone();
            set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                scanner.execute_task(task).await
            });
        }

        let mut issues = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(Some(issue))) => issues.push(issue),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => log::warn!("websocket scan task failed: {err}"),
                Err(err) => log::warn!("websocket scan task panicked: {err}"),
            }
        }
        issues
    }

    async fn execute_task(&self, task: WsScanTask) -> Result<Option<Issue>, WsScanError> {
        let probe = self
            .probe(&task, &task.payload.value, self.config.observation_window())
            .await?;

        let ctx = DetectionContext {
            response_status: 0,
            response_body: &probe.combined_body,
            response_headers: &[],
            baseline_status: None,
            elapsed: Some(probe.elapsed),
            oob_interaction_seen: false,
        };

        let mut verdict = evaluate_payload(&task.payload, &ctx);
        if task.payload.has_time_based() && verdict.matched {
            verdict = self.revalidate(&task, verdict).await?;
        }

        if !verdict.matched {
            return Ok(None);
        }

        let evidence = probe
            .first_message
            .map(|m| Evidence::WsMessage(m.id))
            .unwrap_or(Evidence::WsConnection(probe.connection_id));

        let issue = self
            .store
            .create_issue(NewIssue {
                evidence,
                code: verdict.issue_code,
                confidence: verdict.confidence,
                details: format!("websocket payload {:?} on point {}", task.payload.value, task.point.name),
                workspace_id: task.workspace_id,
                scan_id: task.scan_id,
            })
            .await?;

        Ok(Some(issue))
    }

    /// Dials a fresh connection, replays `task.captured[..target_index]`,
    /// then sends the target message with `task.point` rewritten to
    /// `payload_value`, observing for `window` before closing (spec §4.5).
    async fn probe(&self, task: &WsScanTask, payload_value: &str, window: Duration) -> Result<WsProbeOutcome, WsScanError> {
        let replay_headers = sukyan_ws_interceptor::headers::strip_handshake_headers(&task.handshake_headers);

        let socket = self.dialer.dial(&task.url, &replay_headers).await?;
        let (mut sender, receiver) = socket.split();

        let connection = self
            .store
            .create_ws_connection(WsConnection {
                id: WsConnectionId::new(new_uuid()),
                url: task.url.clone(),
                request_headers: replay_headers,
                response_headers: Vec::new(),
                status: None,
                workspace_id: Some(task.workspace_id.clone()),
                scan_id: Some(task.scan_id.clone()),
                upgrade_history_id: task.upgrade_history_id.clone(),
                opened_at: now_millis(),
                closed_at: None,
            })
            .await?;

        let (tx, mut rx) = mpsc::channel::<RawWsMessage>(self.config.message_channel_capacity);
        let send_timeout = Duration::from_secs(self.config.message_channel_send_timeout_seconds);
        let reader = tokio::spawn(run_reader(receiver, tx, send_timeout));

        let collector_store = self.store.clone();
        let collector_connection_id = connection.id.clone();
        let collector = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(raw) = rx.recv().await {
                let message = WsMessage {
                    id: WsMessageId::new(new_uuid()),
                    connection_id: collector_connection_id.clone(),
                    opcode: Opcode::from_u8(raw.opcode).unwrap_or(Opcode::Binary),
                    mask: false,
                    payload: encode_payload(&raw),
                    is_binary: raw.opcode == sukyan_ws_interceptor::frame::OPCODE_BINARY,
                    timestamp: now_millis(),
                    direction: WsDirection::Received,
                };
                let _ = collector_store.create_ws_message(message.clone()).await;
                received.push(message);
            }
            received
        });

        for sent in task.captured.iter().take(task.target_index) {
            if sent.direction != WsDirection::Sent {
                continue;
            }
            let _ = sender
                .send_message(sent.opcode as u8, sent.payload_bytes())
                .await;
            tokio::time::sleep(Duration::from_millis(self.config.replay_inter_message_delay_ms)).await;
        }

        let target = task
            .captured
            .get(task.target_index)
            .cloned()
            .unwrap_or_else(empty_text_message);
        let original_payload = target.text().unwrap_or_default();
        let mutated_payload = build_ws_message(original_payload, &task.point, payload_value)?;
        let opcode = target.opcode as u8;

        let sent_at = std::time::Instant::now();
        sender.send_message(opcode, mutated_payload.into_bytes()).await?;

        let deadline = window * 2;
        let _ = timeout(window, tokio::time::sleep(deadline)).await;

        drop(sender.close().await);
        let _ = self
            .store
            .update_ws_connection(WsConnection {
                closed_at: Some(now_millis()),
                ..connection.clone()
            })
            .await;

        reader.abort();
        let received = collector.await.unwrap_or_default();
        let elapsed = sent_at.elapsed();

        let combined_body: String = received
            .iter()
            .filter_map(|m| m.text())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(WsProbeOutcome {
            elapsed,
            combined_body,
            connection_id: connection.id,
            first_message: received.into_iter().next(),
        })
    }

    /// WebSocket time-based revalidation (spec §4.5): stricter than the
    /// HTTP template scanner's because request/response pairing isn't
    /// one-to-one -- up to `revalidation_rounds` rounds, each on a fresh
    /// connection, comparing an unpayloaded probe against the payloaded one
    /// with `+25`/`-35` confidence adjustments.
    async fn revalidate(&self, task: &WsScanTask, verdict: PayloadVerdict) -> Result<PayloadVerdict, WsScanError> {
        let Some(expected_sleep) = task.payload.expected_sleep() else {
            return Ok(verdict);
        };
        let revalidation_window = (expected_sleep + Duration::from_secs(120))
            .clamp(Duration::from_secs(60), Duration::from_secs(300));

        let mut confidence = verdict.confidence as i32;
        let mut original_exceeds_count = 0u32;
        let mut payload_exceeds_count = 0u32;
        let mut attempts = 0u32;

        for round in 1..=self.config.revalidation_rounds {
            attempts += 1;
            let original = self.probe(task, &task.point.value, revalidation_window).await?;
            let payloaded = self.probe(task, &task.payload.value, revalidation_window).await?;

            let original_exceeds = original.elapsed >= expected_sleep;
            let payload_exceeds = payloaded.elapsed >= expected_sleep;

            if payload_exceeds {
                payload_exceeds_count += 1;
                confidence += 25;
            }
            if original_exceeds {
                original_exceeds_count += 1;
                confidence -= 35;
            }
            if payloaded.elapsed < expected_sleep || original.elapsed > payloaded.elapsed {
                confidence -= 35;
            }

            if original_exceeds {
                tokio::time::sleep(Duration::from_secs(30 * round as u64)).await;
            }
        }

        let mut final_verdict = verdict;
        if original_exceeds_count == 0 && payload_exceeds_count > attempts / 2 {
            final_verdict.matched = true;
            final_verdict.confidence = 100;
        } else {
            let clamped = confidence.clamp(0, 100) as u8;
            final_verdict.matched = clamped > 50;
            final_verdict.confidence = clamped;
        }
        Ok(final_verdict)
    }
}

struct WsProbeOutcome {
    elapsed: Duration,
    combined_body: String,
    connection_id: WsConnectionId,
    first_message: Option<WsMessage>,
}

async fn run_reader(mut receiver: Box<dyn WsReceiver>, tx: mpsc::Sender<RawWsMessage>, send_timeout: Duration) {
    loop {
        match receiver.recv_message().await {
            Ok(Some(message)) => {
                if timeout(send_timeout, tx.send(message)).await.is_err() {
                    log::warn!("websocket message channel send timed out, dropping message");
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!("websocket read failed: {err}");
                break;
            }
        }
    }
}

fn encode_payload(raw: &RawWsMessage) -> String {
    if raw.opcode == sukyan_ws_interceptor::frame::OPCODE_TEXT {
        String::from_utf8_lossy(&raw.payload).to_string()
    } else {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&raw.payload)
    }
}

fn empty_text_message() -> WsMessage {
    WsMessage {
        id: WsMessageId::new(new_uuid()),
        connection_id: WsConnectionId::new(new_uuid()),
        opcode: Opcode::Text,
        mask: false,
        payload: String::new(),
        is_binary: false,
        timestamp: now_millis(),
        direction: WsDirection::Sent,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dialer::WsSocket;
    use std::sync::Mutex;
    use sukyan_types::{DetectionCondition, DetectionMethod, InsertionPointType, ValueType};

    struct ScriptedSocket {
        to_send: Vec<RawWsMessage>,
        sent_log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    struct ScriptedSender {
        sent_log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    struct ScriptedReceiver {
        queue: std::collections::VecDeque<RawWsMessage>,
    }

    impl WsSocket for ScriptedSocket {
        fn split(self: Box<Self>) -> (Box<dyn WsSender>, Box<dyn WsReceiver>) {
            (
                Box::new(ScriptedSender {
                    sent_log: self.sent_log.clone(),
                }),
                Box::new(ScriptedReceiver {
                    queue: self.to_send.into(),
                }),
            )
        }
    }

    #[async_trait]
    impl WsSender for ScriptedSender {
        async fn send_message(&mut self, opcode: u8, payload: Vec<u8>) -> Result<(), DialerError> {
            self.sent_log.lock().unwrap().push((opcode, payload));
            Ok(())
        }
        async fn close(&mut self) -> Result<(), DialerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl WsReceiver for ScriptedReceiver {
        async fn recv_message(&mut self) -> Result<Option<RawWsMessage>, DialerError> {
            Ok(self.queue.pop_front())
        }
    }

    struct ScriptedDialer {
        responses: Vec<RawWsMessage>,
        sent_log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    #[async_trait]
    impl WsDialer for ScriptedDialer {
        async fn dial(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> Result<Box<dyn WsSocket>, DialerError> {
            Ok(Box::new(ScriptedSocket {
                to_send: self.responses.clone(),
                sent_log: self.sent_log.clone(),
            }))
        }
    }

    fn point() -> InsertionPoint {
        InsertionPoint::new(
            InsertionPointType::WsJsonField,
            "username".to_string(),
            "alice".to_string(),
            ValueType::String,
            "{\"username\":\"alice\"}".to_string(),
        )
    }

    fn reflection_payload() -> Payload {
        Payload {
            value: "canary-xyz".to_string(),
            issue_code: "ws-reflection".to_string(),
            detection_condition: DetectionCondition::Or,
            detection_methods: vec![DetectionMethod::Reflection {
                literal: "canary-xyz".to_string(),
                confidence: 70,
            }],
            interaction_domain: None,
        }
    }

    fn message(direction: WsDirection, payload: &str) -> WsMessage {
        WsMessage {
            id: WsMessageId::new(new_uuid()),
            connection_id: WsConnectionId::new("c1"),
            opcode: Opcode::Text,
            mask: false,
            payload: payload.to_string(),
            is_binary: false,
            timestamp: 0,
            direction,
        }
    }

    #[tokio::test]
    async fn reflected_payload_in_response_creates_issue() {
        let sent_log = Arc::new(Mutex::new(Vec::new()));
        let dialer = Arc::new(ScriptedDialer {
            responses: vec![RawWsMessage {
                opcode: sukyan_ws_interceptor::frame::OPCODE_TEXT,
                payload: b"{\"echo\":\"canary-xyz\"}".to_vec(),
            }],
            sent_log: sent_log.clone(),
        });
        let store: Arc<dyn Store> = Arc::new(sukyan_store::memory::MemoryStore::new());
        let config = WebSocketScannerConfig {
            observation_window_seconds: 0,
            ..WebSocketScannerConfig::default()
        };
        let scanner = Arc::new(WebSocketScanner::new(store, dialer, config));

        let task = WsScanTask {
            url: "ws://example.com/socket".to_string(),
            handshake_headers: vec![
                ("Connection".to_string(), "Upgrade".to_string()),
                ("Sec-WebSocket-Key".to_string(), "abc".to_string()),
            ],
            captured: vec![message(WsDirection::Sent, "{\"username\":\"alice\"}")],
            target_index: 0,
            point: point(),
            payload: reflection_payload(),
            upgrade_history_id: None,
            workspace_id: WorkspaceId::new("w1"),
            scan_id: ScanId::new("s1"),
        };

        let issues = scanner.run(vec![task]).await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "ws-reflection");

        let sent = sent_log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let sent_body = String::from_utf8_lossy(&sent[0].1);
        assert!(sent_body.contains("canary-xyz"));
    }

    #[tokio::test]
    async fn non_matching_traffic_creates_no_issue() {
        let sent_log = Arc::new(Mutex::new(Vec::new()));
        let dialer = Arc::new(ScriptedDialer {
            responses: vec![RawWsMessage {
                opcode: sukyan_ws_interceptor::frame::OPCODE_TEXT,
                payload: b"{\"ok\":true}".to_vec(),
            }],
            sent_log,
        });
        let store: Arc<dyn Store> = Arc::new(sukyan_store::memory::MemoryStore::new());
        let config = WebSocketScannerConfig {
            observation_window_seconds: 0,
            ..WebSocketScannerConfig::default()
        };
        let scanner = Arc::new(WebSocketScanner::new(store, dialer, config));

        let task = WsScanTask {
            url: "ws://example.com/socket".to_string(),
            handshake_headers: vec![],
            captured: vec![message(WsDirection::Sent, "{\"username\":\"alice\"}")],
            target_index: 0,
            point: point(),
            payload: reflection_payload(),
            upgrade_history_id: None,
            workspace_id: WorkspaceId::new("w1"),
            scan_id: ScanId::new("s1"),
        };

        let issues = scanner.run(vec![task]).await;
        assert!(issues.is_empty());
    }
}
