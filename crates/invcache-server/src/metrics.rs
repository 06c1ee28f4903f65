//! Prometheus metrics for the inventory cache.
//!
//! This module provides:
//! - Cache metrics (hit/miss rates per tier, entries)
//! - Invalidation bus metrics (published, received, dropped)

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::config::MetricsConfig;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";

    // Invalidation bus metrics
    pub const INVALIDATIONS_PUBLISHED_TOTAL: &str = "cache_invalidations_published_total";
    pub const INVALIDATIONS_RECEIVED_TOTAL: &str = "cache_invalidations_received_total";
    pub const INVALIDATIONS_DROPPED_TOTAL: &str = "cache_invalidations_dropped_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at startup, inside the tokio runtime.
/// Returns `true` if initialization succeeded, `false` if disabled or
/// already initialized.
pub fn init_metrics(config: &MetricsConfig) -> bool {
    if !config.enabled {
        tracing::debug!("Prometheus metrics disabled");
        return false;
    }

    if let Some(addr) = config.listen {
        return match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => {
                tracing::info!(%addr, "Prometheus exporter listening");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus exporter");
                false
            }
        };
    }

    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: rendered through `render_metrics`
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if the pull-based recorder was not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Set the number of cache entries.
pub fn set_cache_entries(tier: &'static str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier).set(count as f64);
}

// =============================================================================
// Invalidation Metrics
// =============================================================================

pub fn record_invalidation_published(cache_name: &str) {
    counter!(names::INVALIDATIONS_PUBLISHED_TOTAL, "cache" => cache_name.to_string()).increment(1);
}

pub fn record_invalidation_received(cache_name: &str) {
    counter!(names::INVALIDATIONS_RECEIVED_TOTAL, "cache" => cache_name.to_string()).increment(1);
}

/// Record an invalidation that was lost: queue full, send failure or a
/// malformed payload.
pub fn record_invalidation_dropped(reason: &'static str) {
    counter!(names::INVALIDATIONS_DROPPED_TOTAL, "reason" => reason).increment(1);
}
