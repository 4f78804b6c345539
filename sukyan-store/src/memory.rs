//! An in-memory `Store` + `Scheduler` used only by tests (SPEC_FULL §2).
//! Not a production backend: no persistence, no indexing beyond linear
//! scans, good enough to exercise the orchestrator and scanners without a
//! database.

use crate::{
    NewOobTest, OobTest, Result, Scheduler, SchedulerResult, Store, StoreError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use sukyan_common::{new_uuid, HistoryId, IssueId, ScanId, WsConnectionId};
use sukyan_types::{
    HistoryFilter, HistoryRecord, Issue, NewIssue, Page, Scan, ScanPhase, ScanStatus, WsConnection,
    WsConnectionFilter, WsMessage, WsMessageFilter,
};

#[derive(Default)]
pub struct MemoryStore {
    history: Mutex<HashMap<String, HistoryRecord>>,
    ws_connections: Mutex<HashMap<String, WsConnection>>,
    ws_messages: Mutex<HashMap<String, WsMessage>>,
    issues: Mutex<Vec<Issue>>,
    scans: Mutex<HashMap<String, Scan>>,
    oob_tests: Mutex<HashMap<String, OobTest>>,
    pending_jobs: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_history(&self, record: HistoryRecord) {
        self.history.lock().unwrap().insert(record.id.as_str().to_string(), record);
    }

    pub fn seed_scan(&self, scan: Scan) {
        self.scans.lock().unwrap().insert(scan.id.as_str().to_string(), scan);
    }

    /// Test hook: set how many jobs `scan_has_pending_jobs` should report.
    pub fn set_pending_jobs(&self, scan_id: &ScanId, count: u64) {
        self.pending_jobs
            .lock()
            .unwrap()
            .insert(scan_id.as_str().to_string(), count);
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_history(&self, record: HistoryRecord) -> Result<HistoryRecord> {
        self.history
            .lock()
            .unwrap()
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn get_history(&self, id: &HistoryId) -> Result<HistoryRecord> {
        self.history
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("history {id}")))
    }

    async fn list_history(&self, filter: HistoryFilter) -> Result<Page<HistoryRecord>> {
        let all: Vec<HistoryRecord> = self
            .history
            .lock()
            .unwrap()
            .values()
            .filter(|h| {
                filter
                    .workspace_id
                    .as_ref()
                    .map_or(true, |w| h.workspace_id.as_ref() == Some(w))
                    && filter
                        .scan_id
                        .as_ref()
                        .map_or(true, |s| h.scan_id.as_ref() == Some(s))
            })
            .cloned()
            .collect();

        let page_size = filter.pagination.page_size.max(1) as usize;
        let start = (filter.pagination.page.saturating_sub(1) as usize) * page_size;
        let items: Vec<HistoryRecord> = all.iter().skip(start).take(page_size).cloned().collect();

        Ok(Page {
            total: all.len() as u64,
            items,
            page: filter.pagination.page,
            page_size: filter.pagination.page_size,
        })
    }

    async fn create_ws_connection(&self, record: WsConnection) -> Result<WsConnection> {
        self.ws_connections
            .lock()
            .unwrap()
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn update_ws_connection(&self, record: WsConnection) -> Result<()> {
        let mut guard = self.ws_connections.lock().unwrap();
        if !guard.contains_key(record.id.as_str()) {
            return Err(StoreError::NotFound(format!("ws connection {}", record.id)));
        }
        guard.insert(record.id.as_str().to_string(), record);
        Ok(())
    }

    async fn list_ws_connections(&self, filter: WsConnectionFilter) -> Result<Vec<WsConnection>> {
        Ok(self
            .ws_connections
            .lock()
            .unwrap()
            .values()
            .filter(|c| {
                filter
                    .workspace_id
                    .as_ref()
                    .map_or(true, |w| c.workspace_id.as_ref() == Some(w))
                    && filter
                        .scan_id
                        .as_ref()
                        .map_or(true, |s| c.scan_id.as_ref() == Some(s))
            })
            .cloned()
            .collect())
    }

    async fn create_ws_message(&self, record: WsMessage) -> Result<WsMessage> {
        self.ws_messages
            .lock()
            .unwrap()
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn list_ws_messages(&self, filter: WsMessageFilter) -> Result<Vec<WsMessage>> {
        let mut items: Vec<WsMessage> = self
            .ws_messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                filter
                    .connection_id
                    .as_ref()
                    .map_or(true, |c| &m.connection_id == c)
                    && filter.direction.map_or(true, |d| m.direction == d)
            })
            .cloned()
            .collect();
        items.sort_by_key(|m| m.timestamp);
        Ok(items)
    }

    async fn create_issue(&self, issue: NewIssue) -> Result<Issue> {
        let record = Issue {
            id: IssueId::new(new_uuid()),
            evidence: issue.evidence,
            code: issue.code,
            confidence: issue.confidence,
            details: issue.details,
            workspace_id: issue.workspace_id,
            scan_id: issue.scan_id,
        };
        self.issues.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Scan> {
        self.scans
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("scan {id}")))
    }

    async fn update_scan(&self, scan: Scan) -> Result<()> {
        self.scans.lock().unwrap().insert(scan.id.as_str().to_string(), scan);
        Ok(())
    }

    async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>> {
        Ok(self
            .scans
            .lock()
            .unwrap()
            .values()
            .filter(|scan| statuses.contains(&scan.status))
            .cloned()
            .collect())
    }

    async fn atomic_set_phase(
        &self,
        id: &ScanId,
        expected: ScanPhase,
        target: ScanPhase,
    ) -> Result<bool> {
        let mut guard = self.scans.lock().unwrap();
        let scan = guard
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("scan {id}")))?;
        if scan.phase == expected {
            scan.phase = target;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn scan_has_pending_jobs(&self, id: &ScanId) -> Result<bool> {
        Ok(self
            .pending_jobs
            .lock()
            .unwrap()
            .get(id.as_str())
            .copied()
            .unwrap_or(0)
            > 0)
    }

    async fn update_scan_job_counts(&self, _id: &ScanId) -> Result<()> {
        Ok(())
    }

    async fn get_scan_job_stats(&self, id: &ScanId) -> Result<HashMap<String, u64>> {
        let mut stats = HashMap::new();
        let pending = self
            .pending_jobs
            .lock()
            .unwrap()
            .get(id.as_str())
            .copied()
            .unwrap_or(0);
        stats.insert("pending".to_string(), pending);
        Ok(stats)
    }

    async fn create_oob_test(&self, record: NewOobTest) -> Result<OobTest> {
        let test = OobTest {
            id: new_uuid(),
            correlation_id: record.correlation_id,
            interaction_full_id: record.interaction_full_id,
            history_id: None,
            workspace_id: record.workspace_id,
            scan_id: record.scan_id,
            issue_code: record.issue_code,
        };
        self.oob_tests
            .lock()
            .unwrap()
            .insert(test.id.clone(), test.clone());
        Ok(test)
    }

    async fn update_oob_test_history_id(&self, id: &str, history_id: HistoryId) -> Result<()> {
        let mut guard = self.oob_tests.lock().unwrap();
        let test = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("oob test {id}")))?;
        test.history_id = Some(history_id);
        Ok(())
    }
}

/// A scheduler stub that records every dispatch instead of enqueuing real
/// jobs, for orchestrator tests.
#[derive(Default)]
pub struct RecordingScheduler {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule_active_scan(&self, scan_id: &ScanId, history_ids: &[HistoryId]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("active_scan({scan_id}, {} ids)", history_ids.len()));
        Ok(())
    }

    async fn schedule_active_scan_with_options(
        &self,
        scan_id: &ScanId,
        history_ids: &[HistoryId],
        excluded_insertion_points: &[String],
    ) -> SchedulerResult<()> {
        self.calls.lock().unwrap().push(format!(
            "active_scan_with_options({scan_id}, {} ids, excluding {:?})",
            history_ids.len(),
            excluded_insertion_points
        ));
        Ok(())
    }

    async fn schedule_websocket_scan(&self, scan_id: &ScanId, connection_ids: &[WsConnectionId]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("websocket_scan({scan_id}, {} ids)", connection_ids.len()));
        Ok(())
    }

    async fn schedule_discovery(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("discovery({scan_id}, {} urls)", urls.len()));
        Ok(())
    }

    async fn schedule_crawl(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("crawl({scan_id}, {} urls)", urls.len()));
        Ok(())
    }

    async fn schedule_site_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("site_behavior({scan_id}, {} urls)", urls.len()));
        Ok(())
    }

    async fn schedule_api_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("api_behavior({scan_id}, {} urls)", urls.len()));
        Ok(())
    }

    async fn schedule_api_scan(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("api_scan({scan_id}, {} urls)", urls.len()));
        Ok(())
    }
}
