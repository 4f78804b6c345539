use serde::{Deserialize, Serialize};
use sukyan_common::{HistoryId, ScanId, WorkspaceId};

/// A reserved out-of-band correlation id, created fire-and-forget when a
/// payload carries an `interaction_domain` (spec §4.4 step 2). Resolution
/// happens externally; the scan core never polls for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OobTest {
    pub id: String,
    pub correlation_id: String,
    pub interaction_full_id: String,
    pub history_id: Option<HistoryId>,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
    pub issue_code: String,
}

#[derive(Debug, Clone)]
pub struct NewOobTest {
    pub correlation_id: String,
    pub interaction_full_id: String,
    pub workspace_id: WorkspaceId,
    pub scan_id: ScanId,
    pub issue_code: String,
}
