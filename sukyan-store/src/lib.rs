//! The store and scheduler contracts spec §6 names as external
//! collaborators. The scan core only ever depends on these traits; the
//! actual persistence layer and job scheduler live outside this workspace.

pub mod memory;
pub mod oob;

use async_trait::async_trait;
use std::collections::HashMap;
use sukyan_common::{HistoryId, ScanId, WsConnectionId};
use sukyan_types::{
    HistoryFilter, HistoryRecord, Issue, Page, Scan, ScanPhase, ScanStatus, WsConnection,
    WsConnectionFilter, WsMessage, WsMessageFilter,
};
pub use sukyan_types::NewIssue;

pub use oob::{NewOobTest, OobTest};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to enqueue job: {0}")]
    EnqueueFailed(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// The persistence contract (spec §6). Implementations own history,
/// WebSocket connections/messages, issues, scans, and OOB test records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a history record captured by the proxy or crawler. Not part
    /// of spec §6's consumed contract (history creation is the proxy's
    /// concern, not the scan core's), but the proxy lives in this workspace
    /// too and needs somewhere to put what it captures.
    async fn create_history(&self, record: HistoryRecord) -> Result<HistoryRecord>;
    async fn get_history(&self, id: &HistoryId) -> Result<HistoryRecord>;
    async fn list_history(&self, filter: HistoryFilter) -> Result<Page<HistoryRecord>>;

    async fn create_ws_connection(&self, record: WsConnection) -> Result<WsConnection>;
    async fn update_ws_connection(&self, record: WsConnection) -> Result<()>;
    async fn list_ws_connections(&self, filter: WsConnectionFilter) -> Result<Vec<WsConnection>>;

    async fn create_ws_message(&self, record: WsMessage) -> Result<WsMessage>;
    async fn list_ws_messages(&self, filter: WsMessageFilter) -> Result<Vec<WsMessage>>;

    async fn create_issue(&self, issue: NewIssue) -> Result<Issue>;

    async fn get_scan(&self, id: &ScanId) -> Result<Scan>;
    async fn update_scan(&self, scan: Scan) -> Result<()>;
    /// Scans the orchestrator's poll tick should consider (spec §4.7 step 1).
    async fn list_scans_by_status(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>>;
    /// Compare-and-set the scan's phase; returns `false` (not an error) if
    /// another caller already advanced it past `expected` (spec §3/§4.7).
    async fn atomic_set_phase(
        &self,
        id: &ScanId,
        expected: ScanPhase,
        target: ScanPhase,
    ) -> Result<bool>;
    async fn scan_has_pending_jobs(&self, id: &ScanId) -> Result<bool>;
    async fn update_scan_job_counts(&self, id: &ScanId) -> Result<()>;
    async fn get_scan_job_stats(&self, id: &ScanId) -> Result<HashMap<String, u64>>;

    async fn create_oob_test(&self, record: NewOobTest) -> Result<OobTest>;
    async fn update_oob_test_history_id(&self, id: &str, history_id: HistoryId) -> Result<()>;
}

/// The job-scheduler contract (spec §6). Every method only reports enqueue
/// failure; execution of the dispatched job is asynchronous and not
/// observed here.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_active_scan(&self, scan_id: &ScanId, history_ids: &[HistoryId]) -> SchedulerResult<()>;
    async fn schedule_active_scan_with_options(
        &self,
        scan_id: &ScanId,
        history_ids: &[HistoryId],
        excluded_insertion_points: &[String],
    ) -> SchedulerResult<()>;
    async fn schedule_websocket_scan(&self, scan_id: &ScanId, connection_ids: &[WsConnectionId]) -> SchedulerResult<()>;
    async fn schedule_discovery(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()>;
    async fn schedule_crawl(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()>;
    async fn schedule_site_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()>;
    async fn schedule_api_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()>;
    async fn schedule_api_scan(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()>;
}
