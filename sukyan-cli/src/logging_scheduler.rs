//! A `Scheduler` that logs every dispatch instead of enqueuing a job,
//! standing in for the production job queue the orchestrator is meant to
//! drive (spec §6 treats the scheduler as an external contract) so `sukyan
//! start` does something observable without one wired in.

use async_trait::async_trait;
use sukyan_common::{HistoryId, ScanId, WsConnectionId};
use sukyan_store::{Scheduler, SchedulerResult};

#[derive(Default)]
pub struct LoggingScheduler;

#[async_trait]
impl Scheduler for LoggingScheduler {
    async fn schedule_active_scan(&self, scan_id: &ScanId, history_ids: &[HistoryId]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: active-scan phase dispatched for {} history records (no scheduler configured)", history_ids.len());
        Ok(())
    }

    async fn schedule_active_scan_with_options(
        &self,
        scan_id: &ScanId,
        history_ids: &[HistoryId],
        excluded_insertion_points: &[String],
    ) -> SchedulerResult<()> {
        log::info!(
            "scan {scan_id}: active-scan phase dispatched for {} history records, excluding {:?} (no scheduler configured)",
            history_ids.len(),
            excluded_insertion_points
        );
        Ok(())
    }

    async fn schedule_websocket_scan(&self, scan_id: &ScanId, connection_ids: &[WsConnectionId]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: websocket phase dispatched for {} connections (no scheduler configured)", connection_ids.len());
        Ok(())
    }

    async fn schedule_discovery(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: discovery phase dispatched for {} urls (no scheduler configured)", urls.len());
        Ok(())
    }

    async fn schedule_crawl(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: crawl phase dispatched for {} urls (no scheduler configured)", urls.len());
        Ok(())
    }

    async fn schedule_site_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: site-behavior phase dispatched for {} urls (no scheduler configured)", urls.len());
        Ok(())
    }

    async fn schedule_api_behavior(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: api-behavior phase dispatched for {} urls (no scheduler configured)", urls.len());
        Ok(())
    }

    async fn schedule_api_scan(&self, scan_id: &ScanId, urls: &[String]) -> SchedulerResult<()> {
        log::info!("scan {scan_id}: api-scan phase dispatched for {} urls (no scheduler configured)", urls.len());
        Ok(())
    }
}
