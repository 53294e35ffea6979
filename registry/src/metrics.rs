//! Prometheus metrics for registration and sync traffic.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `registration_operations_total{operation,outcome}` - Capacity operations
//!   by name and result (`ok` or the error's wire code)
//! - `sync_requests_total` - Delta sync requests served
//!
//! ## Histograms
//! - `sync_removed_ids` - Size of `removedIds` per sync response
//!
//! # Example
//!
//! ```rust,no_run
//! use rsvp_registry::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... serve traffic ...
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use rsvp_core::error::RegistrationError;
use thiserror::Error;

/// Counter of capacity operations.
pub const REGISTRATION_OPERATIONS_TOTAL: &str = "registration_operations_total";
/// Counter of sync requests.
pub const SYNC_REQUESTS_TOTAL: &str = "sync_requests_total";
/// Histogram of removed ids per sync.
pub const SYNC_REMOVED_IDS: &str = "sync_removed_ids";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
///
/// The handle is `None` when another recorder was already installed in this
/// process (typically a previous test); metrics are still recorded globally.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Register descriptions and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed
    /// for a reason other than a recorder already being present.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(SYNC_REMOVED_IDS.to_string()),
                &[0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1_000.0, 10_000.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = match builder.install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    None
                } else {
                    return Err(MetricsError::Install(err_msg));
                }
            },
        };

        // Descriptions go to whichever recorder is now global.
        register_metrics();
        tracing::info!("Registry metrics registered");
        Ok(Self { handle })
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        REGISTRATION_OPERATIONS_TOTAL,
        "Capacity operations by operation (register, unregister, resize, cancel) and outcome"
    );
    describe_counter!(SYNC_REQUESTS_TOTAL, "Delta sync requests served");
    describe_histogram!(
        SYNC_REMOVED_IDS,
        "Number of removed ids returned per delta sync response"
    );
}

/// Capacity operation metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record the result of one capacity operation.
    pub fn record<T>(operation: &'static str, result: &Result<T, RegistrationError>) {
        let outcome = match result {
            Ok(_) => "ok".to_string(),
            Err(e) => e.code(),
        };
        counter!(REGISTRATION_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
            .increment(1);
    }
}

/// Delta sync metrics recorder.
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record a served sync request.
    #[allow(clippy::cast_precision_loss)] // Bounded by the known-id limit
    pub fn record(removed_ids: usize) {
        counter!(SYNC_REQUESTS_TOTAL).increment(1);
        histogram!(SYNC_REMOVED_IDS).record(removed_ids as f64);
    }
}
