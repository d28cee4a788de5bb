//! Prometheus registry for the host binary.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Build information, always 1.
pub static BUILD_INFO: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("audioconv_build_info", "Build information"),
        &["version", "engine"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    let collectors = std::iter::once(
        Box::new(BUILD_INFO.clone()) as Box<dyn prometheus::core::Collector>
    )
    .chain(audioconv_core::metrics::all_metrics());

    for metric in collectors {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}
