use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use sukyan_common::WorkspaceId;

use crate::generator::ScanMode;

/// The ordered set of phases a scan moves through (spec §3/§4.7). A scan
/// advances strictly monotonically; `next()` returns `None` once complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Crawl,
    Fingerprint,
    SiteBehavior,
    Discovery,
    Nuclei,
    ApiBehavior,
    ActiveScan,
    Websocket,
    Complete,
}

impl ScanPhase {
    pub const ORDER: [ScanPhase; 9] = [
        ScanPhase::Crawl,
        ScanPhase::Fingerprint,
        ScanPhase::SiteBehavior,
        ScanPhase::Discovery,
        ScanPhase::Nuclei,
        ScanPhase::ApiBehavior,
        ScanPhase::ActiveScan,
        ScanPhase::Websocket,
        ScanPhase::Complete,
    ];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|p| *p == self).expect("phase is in ORDER")
    }

    /// The next phase in the fixed sequence, ignoring any skip configuration
    /// (the orchestrator applies skipping; this is pure ordering).
    pub fn next(self) -> Option<ScanPhase> {
        Self::ORDER.get(self.index() + 1).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Pending,
    Crawling,
    Scanning,
    Completed,
    Failed,
}

/// Progress markers the orchestrator persists across ticks (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub scope_domains: HashSet<String>,
    pub fingerprints: HashMap<String, Vec<String>>,
    pub fingerprint_tags: HashSet<String>,
    pub site_behaviors: HashMap<String, String>,
    pub nuclei_completed: bool,
}

/// Per-scan audit-category and phase-enablement toggles (spec §4.7,
/// scenario 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCategories {
    pub websocket: bool,
    pub api: bool,
    pub active: bool,
}

impl Default for AuditCategories {
    fn default() -> Self {
        Self {
            websocket: true,
            api: true,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    pub mode: ScanMode,
    pub audit_categories: AuditCategories,
    pub enable_websocket: bool,
    pub enable_nuclei: bool,
    pub enable_fingerprint: bool,
    pub enable_discovery: bool,
    pub enable_api_behavior: bool,
    pub enable_site_behavior: bool,
    pub api_only: bool,
    pub avoid_repeated_issues: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            mode: ScanMode::Smart,
            audit_categories: AuditCategories::default(),
            enable_websocket: true,
            enable_nuclei: true,
            enable_fingerprint: true,
            enable_discovery: true,
            enable_api_behavior: true,
            enable_site_behavior: true,
            api_only: false,
            avoid_repeated_issues: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: sukyan_common::ScanId,
    pub workspace_id: WorkspaceId,
    pub start_urls: Vec<String>,
    pub options: ScanOptions,
    pub phase: ScanPhase,
    pub status: ScanStatus,
    pub checkpoint: ScanCheckpoint,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Whether a given phase should be attempted for this scan's options,
/// independent of whether the source disables it globally (spec §4.7,
/// "skipping phases disabled by config or scan options").
pub fn phase_enabled(phase: ScanPhase, options: &ScanOptions) -> bool {
    match phase {
        ScanPhase::Crawl => true,
        ScanPhase::Fingerprint => options.enable_fingerprint,
        ScanPhase::SiteBehavior => options.enable_site_behavior,
        ScanPhase::Discovery => options.enable_discovery,
        ScanPhase::Nuclei => options.enable_nuclei,
        ScanPhase::ApiBehavior => options.enable_api_behavior,
        ScanPhase::ActiveScan => options.audit_categories.active,
        ScanPhase::Websocket => options.enable_websocket && options.audit_categories.websocket,
        ScanPhase::Complete => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_fixed() {
        assert_eq!(ScanPhase::Crawl.next(), Some(ScanPhase::Fingerprint));
        assert_eq!(ScanPhase::Websocket.next(), Some(ScanPhase::Complete));
        assert_eq!(ScanPhase::Complete.next(), None);
    }

    #[test]
    fn websocket_disabled_by_audit_category_even_if_globally_enabled() {
        let mut options = ScanOptions::default();
        options.enable_websocket = true;
        options.audit_categories.websocket = false;
        assert!(!phase_enabled(ScanPhase::Websocket, &options));
    }
}
