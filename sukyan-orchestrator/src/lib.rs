//! The phase-sequencing orchestrator (spec §4.7): a periodic poll that
//! advances each active scan through the fixed phase order via an atomic
//! compare-and-set, then dispatches the newly-entered phase to the job
//! scheduler and, for a couple of phases, to integrations implemented
//! outside this workspace.

pub mod integrations;

pub use integrations::{CdnChecker, FingerprintEngine, IntegrationError, NucleiRunner, RetireJsScanner};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use sukyan_common::ScanId;
use sukyan_config::OrchestratorConfig;
use sukyan_store::{Scheduler, Store};
use sukyan_types::{phase_enabled, HistoryFilter, HistoryRecord, Pagination, Scan, ScanPhase, ScanStatus};

/// Static file extensions the active-scan phase never fuzzes (spec §4.7,
/// "drop items with ... ignored extensions").
const IGNORED_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot", ".map", ".mp4", ".webm", ".pdf",
];

pub struct Orchestrator {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    config: OrchestratorConfig,
    fingerprint_engine: Option<Arc<dyn FingerprintEngine>>,
    retirejs: Option<Arc<dyn RetireJsScanner>>,
    cdn_checker: Option<Arc<dyn CdnChecker>>,
    nuclei: Option<Arc<dyn NucleiRunner>>,
    /// Keyed by `(scan_id, base_url)`, cleared for a scan on completion
    /// (spec §5, §9 "instance-scoped and cleared on scan completion").
    site_behavior_cache: RwLock<HashMap<(ScanId, String), String>>,
}

/// Everything the orchestrator dispatches a phase to but doesn't implement
/// itself. Any field left `None` makes that phase a no-op dispatch (logged,
/// not an error) -- useful for exercising phases that don't need the
/// integration under test.
#[derive(Default)]
pub struct Integrations {
    pub fingerprint_engine: Option<Arc<dyn FingerprintEngine>>,
    pub retirejs: Option<Arc<dyn RetireJsScanner>>,
    pub cdn_checker: Option<Arc<dyn CdnChecker>>,
    pub nuclei: Option<Arc<dyn NucleiRunner>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        config: OrchestratorConfig,
        integrations: Integrations,
    ) -> Self {
        Self {
            store,
            scheduler,
            config,
            fingerprint_engine: integrations.fingerprint_engine,
            retirejs: integrations.retirejs,
            cdn_checker: integrations.cdn_checker,
            nuclei: integrations.nuclei,
            site_behavior_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Runs the poll loop forever at `config.poll_interval_seconds`. Exits
    /// when `shutdown` resolves (spec §5, "Stop closes its root context; in
    /// flight phase dispatches complete best-effort").
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    log::info!("orchestrator shutting down, in-flight dispatches complete best-effort");
                    return;
                }
            }
        }
    }

    /// One poll tick (spec §4.7 steps 1-5), run over every scan currently
    /// `crawling` or `scanning`.
    pub async fn tick(&self) {
        let scans = match self
            .store
            .list_scans_by_status(&[ScanStatus::Crawling, ScanStatus::Scanning])
            .await
        {
            Ok(scans) => scans,
            Err(e) => {
                log::warn!("failed to list active scans, skipping this tick: {e}");
                return;
            }
        };

        for scan in scans {
            if let Err(e) = self.advance_scan(scan).await {
                log::warn!("error advancing scan: {e}");
            }
        }
    }

    async fn advance_scan(&self, scan: Scan) -> sukyan_store::Result<()> {
        let has_pending = self.store.scan_has_pending_jobs(&scan.id).await?;
        if has_pending {
            return Ok(());
        }

        let Some(next_phase) = next_enabled_phase(scan.phase, &scan, &self.config) else {
            return Ok(());
        };

        let advanced = self
            .store
            .atomic_set_phase(&scan.id, scan.phase, next_phase)
            .await?;
        if !advanced {
            // Another orchestrator already advanced this scan (spec §7:
            // not an error).
            return Ok(());
        }

        let mut scan = scan;
        scan.phase = next_phase;
        self.dispatch_phase(&scan).await;
        Ok(())
    }

    async fn dispatch_phase(&self, scan: &Scan) {
        let result = match scan.phase {
            ScanPhase::Crawl => self.dispatch_crawl(scan).await,
            ScanPhase::Fingerprint => self.dispatch_fingerprint(scan).await,
            ScanPhase::SiteBehavior => {
                self.scheduler
                    .schedule_site_behavior(&scan.id, &scan.start_urls)
                    .await
                    .map_err(Into::into)
            }
            ScanPhase::Discovery => self
                .scheduler
                .schedule_discovery(&scan.id, &scan.start_urls)
                .await
                .map_err(Into::into),
            ScanPhase::Nuclei => self.dispatch_nuclei(scan).await,
            ScanPhase::ApiBehavior => self
                .scheduler
                .schedule_api_behavior(&scan.id, &scan.start_urls)
                .await
                .map_err(Into::into),
            ScanPhase::ActiveScan => self.dispatch_active_scan(scan).await,
            ScanPhase::Websocket => self.dispatch_websocket(scan).await,
            ScanPhase::Complete => self.dispatch_complete(scan).await,
        };

        if let Err(e) = result {
            log::warn!("phase dispatch failed for scan {} phase {:?}: {e}", scan.id, scan.phase);
        }
    }

    async fn dispatch_crawl(&self, scan: &Scan) -> Result<(), DispatchError> {
        if scan.start_urls.is_empty() {
            if !scan.options.api_only {
                log::info!("scan {} has no start URLs and is not api-only; nothing to crawl", scan.id);
            }
            return Ok(());
        }
        self.scheduler.schedule_crawl(&scan.id, &scan.start_urls).await?;
        Ok(())
    }

    /// Pages through the scan's history in `fingerprint_batch_size`
    /// batches, grouped by base URL, and runs header analysis, fingerprint
    /// construction, retire.js, and a CDN check per base URL (spec §4.7).
    async fn dispatch_fingerprint(&self, scan: &Scan) -> Result<(), DispatchError> {
        let Some(engine) = self.fingerprint_engine.clone() else {
            log::info!("no fingerprint engine configured, skipping fingerprint phase");
            return Ok(());
        };

        let mut by_base_url: HashMap<String, Vec<HistoryRecord>> = HashMap::new();
        let mut page = 1u32;
        loop {
            let filter = HistoryFilter {
                workspace_id: Some(scan.workspace_id.clone()),
                scan_id: Some(scan.id.clone()),
                pagination: Pagination {
                    page,
                    page_size: self.config.fingerprint_batch_size as u32,
                },
            };
            let fetched = self.store.list_history(filter).await?;
            if fetched.items.is_empty() {
                break;
            }
            for record in fetched.items {
                if let Some(base) = base_url(&record.url) {
                    by_base_url.entry(base).or_default().push(record);
                }
            }
            if (page as u64 * self.config.fingerprint_batch_size as u64) >= fetched.total {
                break;
            }
            page += 1;
        }

        let mut checkpoint = scan.checkpoint.clone();
        for (base, history) in by_base_url {
            let tags = engine.analyze_headers(&base, &history).await;
            checkpoint.fingerprint_tags.extend(tags);

            match engine.build_fingerprints(&base, &history).await {
                Ok(fingerprints) => {
                    checkpoint
                        .fingerprints
                        .entry(base.clone())
                        .or_default()
                        .extend(fingerprints);
                }
                Err(e) => log::warn!("fingerprint build failed for {base}: {e}"),
            }

            if let Some(retirejs) = &self.retirejs {
                run_retirejs_bounded(
                    retirejs.clone(),
                    &base,
                    &history,
                    self.config.retirejs_max_parallel_per_base_url,
                )
                .await;
            }

            if let Some(cdn_checker) = &self.cdn_checker {
                if cdn_checker.is_cdn_fronted(&base).await {
                    checkpoint.scope_domains.insert(base.clone());
                }
            }
        }

        let mut updated = scan.clone();
        updated.checkpoint = checkpoint;
        self.store.update_scan(updated).await?;
        Ok(())
    }

    async fn dispatch_nuclei(&self, scan: &Scan) -> Result<(), DispatchError> {
        let Some(nuclei) = self.nuclei.clone() else {
            log::info!("no nuclei runner configured, skipping nuclei phase");
            return Ok(());
        };
        nuclei.run(&scan.id).await?;
        let mut updated = scan.clone();
        updated.checkpoint.nuclei_completed = true;
        self.store.update_scan(updated).await?;
        Ok(())
    }

    /// Deduplicates history, drops noise, and schedules full insertion
    /// points for the first occurrence of each normalized path and reduced
    /// (urlpath-excluded) insertion points for the rest (spec §4.7).
    async fn dispatch_active_scan(&self, scan: &Scan) -> Result<(), DispatchError> {
        let filter = HistoryFilter {
            workspace_id: Some(scan.workspace_id.clone()),
            scan_id: Some(scan.id.clone()),
            pagination: Pagination {
                page: 1,
                page_size: u32::MAX,
            },
        };
        let page = self.store.list_history(filter).await?;

        let mut seen_dedup_keys = HashSet::new();
        let mut seen_paths = HashSet::new();
        let mut full_ids = Vec::new();
        let mut reduced_ids = Vec::new();

        for record in page.items {
            if record.response_status == Some(404) || has_ignored_extension(&record.url) {
                continue;
            }
            let dedup_key = (
                record.url.clone(),
                record.method.clone(),
                record.response_status,
                record.request_body.len(),
                record.response_body.len(),
            );
            if !seen_dedup_keys.insert(dedup_key) {
                continue;
            }

            let normalized = normalized_path(&record.url);
            if seen_paths.insert(normalized) {
                full_ids.push(record.id);
            } else {
                reduced_ids.push(record.id);
            }
        }

        if !full_ids.is_empty() {
            self.scheduler.schedule_active_scan(&scan.id, &full_ids).await?;
        }
        if !reduced_ids.is_empty() {
            self.scheduler
                .schedule_active_scan_with_options(&scan.id, &reduced_ids, &["urlpath".to_string()])
                .await?;
        }
        Ok(())
    }

    async fn dispatch_websocket(&self, scan: &Scan) -> Result<(), DispatchError> {
        let connections = self
            .store
            .list_ws_connections(sukyan_types::WsConnectionFilter {
                workspace_id: Some(scan.workspace_id.clone()),
                scan_id: Some(scan.id.clone()),
            })
            .await?;
        let ids: Vec<_> = connections.into_iter().map(|c| c.id).collect();
        if !ids.is_empty() {
            self.scheduler.schedule_websocket_scan(&scan.id, &ids).await?;
        }
        Ok(())
    }

    async fn dispatch_complete(&self, scan: &Scan) -> Result<(), DispatchError> {
        let mut updated = scan.clone();
        updated.status = ScanStatus::Completed;
        updated.completed_at = Some(sukyan_common::now_millis());
        self.store.update_scan(updated).await?;
        self.store.update_scan_job_counts(&scan.id).await?;
        self.site_behavior_cache
            .write()
            .unwrap()
            .retain(|(id, _), _| id != &scan.id);
        Ok(())
    }
}

/// Walks the fixed phase order from `current`, skipping phases disabled by
/// either the scan's options or the orchestrator's own config (spec §4.7
/// step 3: "skipping phases disabled by config or scan options"), and
/// returns the first enabled one. `Complete` is always enabled and
/// terminates the walk.
fn next_enabled_phase(current: ScanPhase, scan: &Scan, config: &OrchestratorConfig) -> Option<ScanPhase> {
    let mut phase = current;
    loop {
        let next = phase.next()?;
        if phase_enabled(next, &scan.options) && config_enables(next, config) {
            return Some(next);
        }
        phase = next;
    }
}

fn config_enables(phase: ScanPhase, config: &OrchestratorConfig) -> bool {
    match phase {
        ScanPhase::Fingerprint => config.enable_fingerprint,
        ScanPhase::SiteBehavior => config.enable_site_behavior,
        ScanPhase::Discovery => config.enable_discovery,
        ScanPhase::Nuclei => config.enable_nuclei,
        ScanPhase::ApiBehavior => config.enable_api_behavior,
        _ => true,
    }
}

async fn run_retirejs_bounded(
    retirejs: Arc<dyn RetireJsScanner>,
    base: &str,
    history: &[HistoryRecord],
    max_parallel: usize,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_parallel.max(1)));
    let mut set = tokio::task::JoinSet::new();
    for chunk in history.chunks(1.max(history.len() / max_parallel.max(1))) {
        let retirejs = retirejs.clone();
        let base = base.to_string();
        let chunk = chunk.to_vec();
        let permit = semaphore.clone();
        set.spawn(async move {
            let _permit = permit.acquire_owned().await.ok();
            if let Err(e) = retirejs.scan(&base, &chunk).await {
                log::warn!("retire.js scan failed for {base}: {e}");
            }
        });
    }
    while set.join_next().await.is_some() {}
}

fn base_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let port_suffix = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    Some(format!("{}://{}{}", parsed.scheme(), parsed.host_str()?, port_suffix))
}

fn normalized_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn has_ignored_extension(url: &str) -> bool {
    let path = normalized_path(url).to_ascii_lowercase();
    IGNORED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] sukyan_store::StoreError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] sukyan_store::SchedulerError),
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_common::{HistoryId, WorkspaceId};
    use sukyan_store::memory::{MemoryStore, RecordingScheduler};
    use sukyan_types::{AuditCategories, ScanCheckpoint, ScanMode, ScanOptions};

    fn scan(phase: ScanPhase, options: ScanOptions) -> Scan {
        Scan {
            id: ScanId::new("s1"),
            workspace_id: WorkspaceId::new("w1"),
            start_urls: vec!["http://t".to_string()],
            options,
            phase,
            status: ScanStatus::Scanning,
            checkpoint: ScanCheckpoint::default(),
            started_at: Some(0),
            completed_at: None,
        }
    }

    fn default_options() -> ScanOptions {
        ScanOptions {
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

    #[test]
    fn phase_skip_jumps_over_disabled_websocket_to_complete() {
        let mut options = default_options();
        options.audit_categories.websocket = false;
        options.enable_websocket = true;
        let scan = scan(ScanPhase::ActiveScan, options);
        assert_eq!(next_enabled_phase(ScanPhase::ActiveScan, &scan, &OrchestratorConfig::default()), Some(ScanPhase::Complete));
    }

    #[test]
    fn phase_skip_is_identity_when_nothing_disabled() {
        let scan = scan(ScanPhase::Crawl, default_options());
        assert_eq!(next_enabled_phase(ScanPhase::Crawl, &scan, &OrchestratorConfig::default()), Some(ScanPhase::Fingerprint));
    }

    #[tokio::test]
    async fn tick_skips_scan_with_pending_jobs() {
        let store = Arc::new(MemoryStore::new());
        store.seed_scan(scan(ScanPhase::Crawl, default_options()));
        store.set_pending_jobs(&ScanId::new("s1"), 3);
        let scheduler = Arc::new(RecordingScheduler::new());
        let orchestrator = Orchestrator::new(store.clone(), scheduler.clone(), OrchestratorConfig::default(), Integrations::default());

        orchestrator.tick().await;

        let updated = store.get_scan(&ScanId::new("s1")).await.unwrap();
        assert_eq!(updated.phase, ScanPhase::Crawl);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn tick_advances_crawl_to_fingerprint() {
        // A scan's `crawl` phase and its initial dispatch are the external
        // caller's job (spec §3: "Scans are created by an external caller");
        // the orchestrator's first move on such a scan is the transition
        // away from it once its jobs drain.
        let store = Arc::new(MemoryStore::new());
        store.seed_scan(scan(ScanPhase::Crawl, default_options()));
        let scheduler = Arc::new(RecordingScheduler::new());
        let orchestrator = Orchestrator::new(store.clone(), scheduler.clone(), OrchestratorConfig::default(), Integrations::default());

        orchestrator.tick().await;

        let updated = store.get_scan(&ScanId::new("s1")).await.unwrap();
        assert_eq!(updated.phase, ScanPhase::Fingerprint);
    }

    #[tokio::test]
    async fn dispatch_crawl_schedules_start_urls() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let orchestrator = Orchestrator::new(store, scheduler.clone(), OrchestratorConfig::default(), Integrations::default());

        orchestrator.dispatch_crawl(&scan(ScanPhase::Crawl, default_options())).await.unwrap();

        assert!(scheduler.calls().iter().any(|c| c.starts_with("crawl(")));
    }

    #[tokio::test]
    async fn concurrent_ticks_advance_a_scan_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        store.seed_scan(scan(ScanPhase::Crawl, default_options()));
        let scheduler = Arc::new(RecordingScheduler::new());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            scheduler.clone(),
            OrchestratorConfig::default(),
            Integrations::default(),
        ));

        let orchestrator_a = orchestrator.clone();
        let orchestrator_b = orchestrator.clone();
        let a = orchestrator_a.tick();
        let b = orchestrator_b.tick();
        tokio::join!(a, b);

        let updated = store.get_scan(&ScanId::new("s1")).await.unwrap();
        assert_eq!(updated.phase, ScanPhase::Fingerprint);
    }

    #[tokio::test]
    async fn active_scan_phase_partitions_full_and_reduced_history() {
        let store = Arc::new(MemoryStore::new());
        store.seed_scan(scan(ScanPhase::ApiBehavior, default_options()));
        for (i, path) in ["/users", "/users", "/orders"].iter().enumerate() {
            store.seed_history(HistoryRecord {
                id: HistoryId::new(format!("h{i}")),
                url: format!("http://t{path}?x={i}"),
                method: "GET".to_string(),
                request_headers: vec![],
                request_body: vec![],
                request_content_type: None,
                response_status: Some(200),
                response_headers: vec![],
                response_body: vec![i as u8],
                workspace_id: Some(WorkspaceId::new("w1")),
                scan_id: Some(ScanId::new("s1")),
            });
        }
        let scheduler = Arc::new(RecordingScheduler::new());
        let orchestrator = Orchestrator::new(store.clone(), scheduler.clone(), OrchestratorConfig::default(), Integrations::default());

        orchestrator.tick().await;

        let calls = scheduler.calls();
        assert!(calls.iter().any(|c| c.starts_with("active_scan(") && c.contains("2 ids")));
        assert!(calls.iter().any(|c| c.starts_with("active_scan_with_options(") && c.contains("1 ids")));
    }
}
