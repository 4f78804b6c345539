//! The HTTP template scanner (spec §4.4): a bounded worker pool that
//! drives `(history, point, payload)` tasks through the request builder,
//! the network, and the detection pipeline.

pub mod executor;

pub use executor::{ExecutorError, HttpExecutor, HttpOutcome, OutboundRequest, ReqwestExecutor};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sukyan_common::{ScanId, WorkspaceId};
use sukyan_config::TemplateScannerConfig;
use sukyan_detect::{evaluate_payload, DetectionContext, PayloadVerdict};
use sukyan_store::{NewOobTest, Store};
use sukyan_types::{Evidence, HistoryRecord, InsertionPoint, Issue, NewIssue, Payload};

/// One `(history, point, payload)` probe (spec §4.4).
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub history: HistoryRecord,
    pub point: InsertionPoint,
    pub payload: Payload,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
}

pub struct TemplateScanner {
    store: Arc<dyn Store>,
    executor: Arc<dyn HttpExecutor>,
    config: TemplateScannerConfig,
    issues_found: Mutex<HashSet<String>>,
}

impl TemplateScanner {
    pub fn new(store: Arc<dyn Store>, executor: Arc<dyn HttpExecutor>, config: TemplateScannerConfig) -> Self {
        Self {
            store,
            executor,
            config,
            issues_found: Mutex::new(HashSet::new()),
        }
    }

    /// Drives `tasks` through a worker pool bounded by
    /// `config.worker_pool_size`, returning every issue persisted.
    pub async fn run(self: Arc<Self>, tasks: Vec<ScanTask>) -> Vec<Issue> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.worker_pool_size.max(1)));
        let mut set = tokio::task::JoinSet::new();
        for task in tasks {
            let scanner = Arc::clone(&self);
            let permit = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = permit.acquire_owned().await.ok();
                scanner.execute_task(task).await
            });
        }

        let mut issues = Vec::new();
        while let Some(result) = set.join_next().await {
            if let Ok(Some(issue)) = result {
                issues.push(issue);
            }
        }
        issues
    }

    /// Runs steps 1-7 of spec §4.4 for a single task.
    pub async fn execute_task(&self, task: ScanTask) -> Option<Issue> {
        let dedup_key = dedup_key(&task.point, &task.payload);
        if self.config.avoid_repeated_issues && self.issues_found.lock().unwrap().contains(&dedup_key) {
            return None;
        }

        let rebuilt = match sukyan_insertion::build_request(&task.history, &task.point, &task.payload.value) {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                log::warn!("payload generation error, skipping generator for this task: {e}");
                return None;
            }
        };

        if let Some(domain) = &task.payload.interaction_domain {
            let oob = NewOobTest {
                correlation_id: domain.id.clone(),
                interaction_full_id: domain.id.clone(),
                workspace_id: task.workspace_id.clone(),
                scan_id: task.scan_id.clone(),
                issue_code: task.payload.issue_code.clone(),
            };
            if let Err(e) = self.store.create_oob_test(oob).await {
                log::warn!("store error creating OOB test record (continuing): {e}");
            }
        }

        let time_based = task.payload.has_time_based();
        let timeout = if time_based {
            task.payload
                .expected_sleep()
                .map(|sleep| self.config.time_based_timeout(sleep))
                .unwrap_or_else(|| Duration::from_secs(self.config.default_timeout_seconds))
        } else {
            Duration::from_secs(self.config.default_timeout_seconds)
        };

        let outbound = OutboundRequest {
            method: rebuilt.method.clone(),
            url: rebuilt.url.clone(),
            headers: rebuilt.request_headers.clone(),
            body: rebuilt.request_body.clone(),
        };

        let outcome = self.send_with_policy(&outbound, timeout, time_based).await?;
        let body_text = String::from_utf8_lossy(&outcome.body).into_owned();
        let ctx = DetectionContext {
            response_status: outcome.status,
            response_body: &body_text,
            response_headers: &outcome.headers,
            baseline_status: None,
            elapsed: Some(outcome.elapsed),
            oob_interaction_seen: false,
        };

        let mut verdict = evaluate_payload(&task.payload, &ctx);
        if time_based && verdict.matched {
            verdict = self.revalidate(&task, &outbound, verdict).await;
        }

        if !verdict.matched {
            return None;
        }

        if self.config.avoid_repeated_issues {
            self.issues_found.lock().unwrap().insert(dedup_key);
        }

        let new_issue = NewIssue {
            evidence: Evidence::History(task.history.id.clone()),
            code: verdict.issue_code.clone(),
            confidence: verdict.confidence,
            details: compose_details(&task.point, &task.payload, &verdict),
            workspace_id: task.workspace_id,
            scan_id: task.scan_id,
        };

        match self.store.create_issue(new_issue).await {
            Ok(issue) => Some(issue),
            Err(e) => {
                log::warn!("store error creating issue (continuing): {e}");
                None
            }
        }
    }

    /// Sends `request`, retrying transient failures with linear backoff
    /// and applying spec §7's error-handling policy.
    async fn send_with_policy(
        &self,
        request: &OutboundRequest,
        timeout: Duration,
        time_based: bool,
    ) -> Option<HttpOutcome> {
        let mut attempt = 0u32;
        loop {
            match self.executor.execute(request, timeout).await {
                Ok(outcome) => return Some(outcome),
                Err(ExecutorError::HardNetwork(reason)) => {
                    log::warn!("hard network error, skipping task: {reason}");
                    return None;
                }
                Err(ExecutorError::ClientConstruction(reason)) => {
                    log::warn!("client-side construction error, skipping task: {reason}");
                    return None;
                }
                Err(ExecutorError::Timeout) => {
                    if time_based {
                        log::info!("time-based payload timed out after {timeout:?}; treating as evidence");
                        return Some(timeout_as_outcome(timeout));
                    }
                    if attempt >= self.config.max_retries {
                        return None;
                    }
                }
                Err(ExecutorError::TransientNetwork(reason)) => {
                    log::warn!("transient network error on attempt {attempt}: {reason}");
                    if attempt >= self.config.max_retries {
                        return if time_based { Some(timeout_as_outcome(timeout)) } else { None };
                    }
                }
            }
            attempt += 1;
            let backoff = Duration::from_secs(self.config.retry_backoff_seconds * attempt as u64);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Time-based revalidation (spec §4.4): up to `revalidation_rounds`
    /// rounds alternating the original and payloaded request, adjusting
    /// confidence by how consistently the payload -- and not the target
    /// itself -- is slow.
    async fn revalidate(
        &self,
        task: &ScanTask,
        payloaded: &OutboundRequest,
        verdict: PayloadVerdict,
    ) -> PayloadVerdict {
        let expected_sleep = task.payload.expected_sleep().unwrap_or_default();
        let revalidation_timeout = (expected_sleep + Duration::from_secs(120))
            .clamp(Duration::from_secs(60), Duration::from_secs(300));
        let original = OutboundRequest {
            method: task.history.method.clone(),
            url: task.history.url.clone(),
            headers: task.history.request_headers.clone(),
            body: task.history.request_body.clone(),
        };

        let mut confidence = verdict.confidence as i32;
        let mut original_exceeds_count = 0u32;
        let mut payload_exceeds_count = 0u32;
        let mut attempts = 0u32;

        for round in 1..=self.config.revalidation_rounds {
            attempts += 1;
            let original_outcome = self.send_with_policy(&original, revalidation_timeout, true).await;
            let payload_outcome = self.send_with_policy(payloaded, revalidation_timeout, true).await;

            let original_elapsed = original_outcome.map(|o| o.elapsed).unwrap_or_default();
            let payload_elapsed = payload_outcome.map(|o| o.elapsed).unwrap_or_default();

            let original_exceeds = original_elapsed >= expected_sleep;
            let payload_exceeds = payload_elapsed >= expected_sleep;

            if payload_exceeds {
                payload_exceeds_count += 1;
                confidence += 20;
            }
            if original_exceeds {
                original_exceeds_count += 1;
                confidence -= 40;
            }
            if payload_elapsed < expected_sleep || original_elapsed > payload_elapsed {
                confidence -= 40;
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
        final_verdict
    }
}

fn timeout_as_outcome(timeout: Duration) -> HttpOutcome {
    HttpOutcome {
        status: 0,
        headers: Vec::new(),
        body: Vec::new(),
        elapsed: timeout,
    }
}

fn dedup_key(point: &InsertionPoint, payload: &Payload) -> String {
    format!("{:?}::{}::{}", point.point_type, point.name, payload.issue_code)
}

fn compose_details(point: &InsertionPoint, payload: &Payload, verdict: &PayloadVerdict) -> String {
    let mut lines = vec![
        format!("insertion point: {} ({:?})", point.name, point.point_type),
        format!("payload: {}", payload.value),
    ];
    for outcome in &verdict.outcomes {
        lines.push(format!(
            "- [{}] {} (confidence {})",
            if outcome.matched { "matched" } else { "no match" },
            outcome.description,
            outcome.confidence
        ));
    }
    if verdict.issue_code != payload.issue_code {
        lines.push(format!(
            "issue code overridden from {} to {}",
            payload.issue_code, verdict.issue_code
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sukyan_common::HistoryId;
    use sukyan_store::memory::MemoryStore;
    use sukyan_types::{DetectionCondition, DetectionMethod, InsertionBehaviour, InsertionPointType, ValueType};

    struct ScriptedExecutor {
        responses: Vec<Result<HttpOutcome, ExecutorError>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpExecutor for ScriptedExecutor {
        async fn execute(&self, _request: &OutboundRequest, _timeout: Duration) -> Result<HttpOutcome, ExecutorError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx.min(self.responses.len() - 1))
                .cloned()
                .unwrap()
        }
    }

    fn history(url: &str) -> HistoryRecord {
        HistoryRecord {
            id: HistoryId::new("h1"),
            url: url.to_string(),
            method: "GET".to_string(),
            request_headers: vec![],
            request_body: Vec::new(),
            request_content_type: None,
            response_status: None,
            response_headers: vec![],
            response_body: vec![],
            workspace_id: None,
            scan_id: None,
        }
    }

    fn point() -> InsertionPoint {
        InsertionPoint {
            point_type: InsertionPointType::Parameter,
            name: "id".to_string(),
            value: "1".to_string(),
            value_type: ValueType::Integer,
            original_data: "http://t/users?id=1".to_string(),
            behaviour: InsertionBehaviour::default(),
        }
    }

    fn sql_error_payload() -> Payload {
        Payload {
            value: "'".to_string(),
            issue_code: "sql-injection".to_string(),
            detection_condition: DetectionCondition::Or,
            detection_methods: vec![DetectionMethod::ResponseCheck {
                check: sukyan_types::ResponseCheckKind::DatabaseError,
                confidence: 80,
                issue_override: None,
            }],
            interaction_domain: None,
        }
    }

    fn outcome(status: u16, body: &str) -> HttpOutcome {
        HttpOutcome {
            status,
            headers: vec![],
            body: body.as_bytes().to_vec(),
            elapsed: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn url_parameter_sql_error_creates_issue() {
        let store = Arc::new(MemoryStore::default());
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![Ok(outcome(500, "you have an error in your SQL syntax"))],
            calls: AtomicUsize::new(0),
        });
        let scanner = TemplateScanner::new(store.clone(), executor, TemplateScannerConfig::default());

        let task = ScanTask {
            history: history("http://t/users?id=1"),
            point: point(),
            payload: sql_error_payload(),
            workspace_id: WorkspaceId::new("ws1"),
            scan_id: ScanId::new("scan1"),
        };

        let issue = scanner.execute_task(task).await.expect("issue expected");
        assert_eq!(issue.code, "sql-injection");
        assert!(issue.confidence >= 80);
        assert!(issue.details.contains("id"));
    }

    #[tokio::test]
    async fn repeated_issue_on_same_point_is_skipped_when_avoid_repeated_is_set() {
        let store = Arc::new(MemoryStore::default());
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![Ok(outcome(500, "sql syntax error")); 2],
            calls: AtomicUsize::new(0),
        });
        let scanner = TemplateScanner::new(store, executor, TemplateScannerConfig::default());

        let task_a = ScanTask {
            history: history("http://t/users?id=1"),
            point: point(),
            payload: sql_error_payload(),
            workspace_id: WorkspaceId::new("ws1"),
            scan_id: ScanId::new("scan1"),
        };
        let task_b = task_a.clone();

        assert!(scanner.execute_task(task_a).await.is_some());
        assert!(scanner.execute_task(task_b).await.is_none());
    }

    #[tokio::test]
    async fn non_matching_response_creates_no_issue() {
        let store = Arc::new(MemoryStore::default());
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![Ok(outcome(200, "all good"))],
            calls: AtomicUsize::new(0),
        });
        let scanner = TemplateScanner::new(store, executor, TemplateScannerConfig::default());

        let task = ScanTask {
            history: history("http://t/users?id=1"),
            point: point(),
            payload: sql_error_payload(),
            workspace_id: WorkspaceId::new("ws1"),
            scan_id: ScanId::new("scan1"),
        };

        assert!(scanner.execute_task(task).await.is_none());
    }

    #[tokio::test]
    async fn hard_network_error_skips_without_retry() {
        let store = Arc::new(MemoryStore::default());
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![Err(ExecutorError::HardNetwork("connection refused".to_string()))],
            calls: AtomicUsize::new(0),
        });
        let scanner = TemplateScanner::new(store, executor.clone(), TemplateScannerConfig::default());

        let task = ScanTask {
            history: history("http://t/users?id=1"),
            point: point(),
            payload: sql_error_payload(),
            workspace_id: WorkspaceId::new("ws1"),
            scan_id: ScanId::new("scan1"),
        };

        assert!(scanner.execute_task(task).await.is_none());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }
}
