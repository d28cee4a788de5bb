//! Prometheus metrics for sessions and conversions.
//!
//! Statics are process-wide; hosts register them with their own registry via
//! [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Session Metrics
// =============================================================================

/// Sessions created (input accepted).
pub static SESSIONS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("audioconv_sessions_created_total", "Total sessions created").unwrap()
});

/// Sessions released.
pub static SESSIONS_RELEASED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("audioconv_sessions_released_total", "Total sessions released").unwrap()
});

/// Sessions currently holding resources.
pub static LIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("audioconv_live_sessions", "Sessions created and not yet released").unwrap()
});

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversion attempts by target format and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audioconv_conversions_total", "Total conversion attempts"),
        &["format", "result"], // "success", "failed", "cancelled", "abandoned"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "audioconv_conversion_duration_seconds",
            "Duration of a conversion attempt",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["format"],
    )
    .unwrap()
});

/// Conversion requests rejected before any work started.
pub static CONVERSION_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audioconv_conversion_rejections_total",
            "Conversion requests rejected by the session state machine",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Sessions
        Box::new(SESSIONS_CREATED.clone()),
        Box::new(SESSIONS_RELEASED.clone()),
        Box::new(LIVE_SESSIONS.clone()),
        // Conversions
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSION_REJECTIONS.clone()),
    ]
}
