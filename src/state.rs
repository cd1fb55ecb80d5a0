//! # Application State Management
//!
//! State shared by every HTTP request handler:
//! - the loaded configuration (immutable after startup)
//! - the merge flow and the media client behind it
//! - request and merge counters, updated by middleware and handlers
//!
//! ## Arc<RwLock<T>> Pattern
//! Only the metrics change at runtime. They sit behind `Arc<RwLock<_>>` so
//! concurrent requests can update them; everything else is shared through
//! a plain `Arc`.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::merge::{AudioMerger, CleanupOutcome, MergeOutcome, RenderMode};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub merger: Arc<AudioMerger>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Performance and outcome metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Merges currently waiting on the media service
    pub active_merges: u32,

    /// How merge requests ended
    pub merges: MergeCounters,

    /// Key: endpoint name (e.g., "POST /api/merge-audio")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct MergeCounters {
    /// Final asset stored by the media service
    pub materialized: u64,
    /// Render refused; transformation URL returned instead
    pub deferred: u64,
    /// Rejected for missing fields
    pub validation_failures: u64,
    /// Greeting upload refused by the media service
    pub upload_failures: u64,
    /// Transport errors and malformed responses
    pub unexpected_failures: u64,
    /// Greeting destroy calls that failed (response unaffected)
    pub cleanup_failures: u64,
    pub last_cleanup_error: Option<String>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Counts a merge as active until dropped.
pub struct ActiveMerge<'a> {
    state: &'a AppState,
}

impl Drop for ActiveMerge<'_> {
    fn drop(&mut self) {
        let mut metrics = self.state.metrics_mut();
        metrics.active_merges = metrics.active_merges.saturating_sub(1);
    }
}

impl AppState {
    pub fn new(config: AppConfig, merger: AudioMerger) -> Self {
        Self {
            config: Arc::new(config),
            merger: Arc::new(merger),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    // A poisoned lock only means a panic happened mid-update of plain
    // counters; the data is still usable.
    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|e| e.into_inner())
    }

    fn metrics_ref(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record duration and error status for one request to `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn begin_merge(&self) -> ActiveMerge<'_> {
        self.metrics_mut().active_merges += 1;
        ActiveMerge { state: self }
    }

    pub fn record_merge_outcome(&self, outcome: &MergeOutcome) {
        let mut metrics = self.metrics_mut();
        match outcome.render_mode {
            RenderMode::Materialized => metrics.merges.materialized += 1,
            RenderMode::Deferred => metrics.merges.deferred += 1,
        }
        if let CleanupOutcome::Failed(reason) = &outcome.cleanup {
            metrics.merges.cleanup_failures += 1;
            metrics.merges.last_cleanup_error = Some(reason.clone());
        }
    }

    pub fn record_merge_error(&self, err: &AppError) {
        let mut metrics = self.metrics_mut();
        match err {
            AppError::ValidationError(_) => metrics.merges.validation_failures += 1,
            AppError::UploadFailed(_) => metrics.merges.upload_failures += 1,
            AppError::Internal(_) => metrics.merges.unexpected_failures += 1,
            AppError::MethodNotAllowed | AppError::NotFound(_) => {}
        }
    }

    /// Copy of the current metrics, so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_ref().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests::{config_with_credentials, FakeMedia};

    fn state() -> AppState {
        let config = config_with_credentials(false);
        let merger = AudioMerger::new(Arc::new(FakeMedia::new()), &config.media, &config.merge);
        AppState::new(config, merger)
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("POST /api/merge-audio", 100, false);
        state.record_endpoint_request("POST /api/merge-audio", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /api/merge-audio"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_active_merge_guard() {
        let state = state();
        {
            let _first = state.begin_merge();
            let _second = state.begin_merge();
            assert_eq!(state.get_metrics_snapshot().active_merges, 2);
        }
        assert_eq!(state.get_metrics_snapshot().active_merges, 0);
    }

    #[test]
    fn test_merge_error_counters() {
        let state = state();
        state.record_merge_error(&AppError::UploadFailed("x".to_string()));
        state.record_merge_error(&AppError::Internal("y".to_string()));
        state.record_merge_error(&AppError::ValidationError("z".to_string()));
        state.record_merge_error(&AppError::MethodNotAllowed);

        let merges = state.get_metrics_snapshot().merges;
        assert_eq!(merges.upload_failures, 1);
        assert_eq!(merges.unexpected_failures, 1);
        assert_eq!(merges.validation_failures, 1);
    }
}
