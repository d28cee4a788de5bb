mod args;
mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audioconv_core::{
    load_config, load_config_from_env, validate_config, would_overwrite, CodecEngine,
    ConversionReport, ConversionService, FfmpegEngine, FormatId, LoggingConfig, SessionId,
    TagMap, TargetFormat,
};

use args::Cli;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("audioconv: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_config_from_env().context("Failed to load config from environment")?,
    };
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config.logging, cli.verbose);
    info!("audioconv {} starting", VERSION);

    let engine = FfmpegEngine::new(config.engine.clone());
    engine
        .validate()
        .await
        .context("The codec engine is not usable")?;
    metrics::BUILD_INFO
        .with_label_values(&[VERSION, engine.name()])
        .set(1);

    let output = cli.output_path();
    check_output(&cli.input, &output, cli.format)?;

    let service = ConversionService::new(Arc::new(engine), config.sessions.clone());
    let id = service
        .try_create_session(&cli.input)
        .await
        .with_context(|| format!("Cannot open {}", cli.input.display()))?;

    let poll = Duration::from_millis(config.host.progress_poll_ms);
    let outcome = drive(&service, id, cli.format, output, cli.tag_map(), poll).await;
    service.release(id).await;

    if cli.metrics {
        print!("{}", metrics::encode_metrics()?);
    }

    let report = outcome?;
    info!(
        "Wrote {} ({} bytes) in {} ms",
        report.output_path.display(),
        report.output_size_bytes,
        report.duration_ms
    );
    println!("{}", report.output_path.display());
    Ok(())
}

/// Refuses an output that would rename or write over the input.
///
/// Unknown format ids are left for the session to reject.
fn check_output(input: &Path, output: &Path, format: FormatId) -> Result<()> {
    if let Some(format) = TargetFormat::from_id(format) {
        if would_overwrite(output, format, input) {
            bail!(
                "Output {} would overwrite the input {}",
                output.display(),
                input.display()
            );
        }
    }
    Ok(())
}

/// Runs the conversion on a worker and logs progress until it finishes.
async fn drive(
    service: &ConversionService,
    id: SessionId,
    format: FormatId,
    output: PathBuf,
    tags: TagMap,
    poll: Duration,
) -> Result<ConversionReport> {
    let mut worker = service.spawn_convert(id, format, output, tags);
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_reported = None;

    let joined = loop {
        tokio::select! {
            joined = &mut worker => break joined,
            _ = ticker.tick() => {
                let percent = service.progress(id);
                if last_reported != Some(percent) {
                    info!(session = %id, "Progress: {}%", percent);
                    last_reported = Some(percent);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, releasing session {}", id);
                service.release(id).await;
            }
        }
    };

    let report = joined
        .context("Conversion worker panicked")?
        .context("Conversion failed")?;
    debug!("Session {} finished at {}%", id, service.progress(id));
    Ok(report)
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        config.filter.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the output path and metrics.
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
