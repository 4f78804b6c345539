use serde::{Deserialize, Serialize};
use sukyan_common::{HistoryId, IssueId, ScanId, WorkspaceId, WsConnectionId, WsMessageId};

/// The evidence an issue is anchored to. Every issue references exactly one
/// record owned by the same workspace (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Evidence {
    History(HistoryId),
    WsMessage(WsMessageId),
    WsConnection(WsConnectionId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub evidence: Evidence,
    pub code: String,
    pub confidence: u8,
    pub details: String,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
}

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub evidence: Evidence,
    pub code: String,
    pub confidence: u8,
    pub details: String,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
}
