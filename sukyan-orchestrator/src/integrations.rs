//! External collaborators the orchestrator dispatches phases to but does
//! not implement itself: fingerprinting, retire.js, CDN detection, and
//! nuclei (spec §4.7). Each is a thin async trait so phase dispatch can be
//! tested without the real tool.

use async_trait::async_trait;
use sukyan_common::ScanId;
use sukyan_types::HistoryRecord;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrationError {
    #[error("fingerprint analysis failed: {0}")]
    Fingerprint(String),
    #[error("retire.js scan failed: {0}")]
    RetireJs(String),
    #[error("nuclei invocation failed: {0}")]
    Nuclei(String),
}

/// Header analysis and software fingerprint construction for one base URL's
/// history slice.
#[async_trait]
pub trait FingerprintEngine: Send + Sync {
    async fn analyze_headers(&self, base_url: &str, history: &[HistoryRecord]) -> Vec<String>;
    async fn build_fingerprints(
        &self,
        base_url: &str,
        history: &[HistoryRecord],
    ) -> Result<Vec<String>, IntegrationError>;
}

/// Per-base-URL retire.js invocation. The orchestrator runs up to
/// `retirejs_max_parallel_per_base_url` of these concurrently.
#[async_trait]
pub trait RetireJsScanner: Send + Sync {
    async fn scan(&self, base_url: &str, history: &[HistoryRecord]) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait CdnChecker: Send + Sync {
    async fn is_cdn_fronted(&self, base_url: &str) -> bool;
}

/// Synchronous (from the orchestrator's perspective) nuclei invocation for
/// a whole scan.
#[async_trait]
pub trait NucleiRunner: Send + Sync {
    async fn run(&self, scan_id: &ScanId) -> Result<(), IntegrationError>;
}
