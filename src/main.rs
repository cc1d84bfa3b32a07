//! dubfetch - Video Translation Downloader
//!
//! Entry point: parses arguments, sets up logging, builds the shared
//! clients and runs one pipeline per video link concurrently.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dubfetch::cli::Args;
use dubfetch::config::Config;
use dubfetch::download::ArtifactDownloader;
use dubfetch::host::{run_jobs, RunSummary};
use dubfetch::media::{MediaProcessorFactory, MediaProcessorTrait};
use dubfetch::pipeline::JobPipeline;
use dubfetch::poller::{PollPolicy, TranslationPoller};
use dubfetch::protocol::YandexClient;
use dubfetch::proxy::ProxyConfig;
use dubfetch::service::VideoReference;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so buffered log lines reach the file
    let _log_guard = setup_logging(args.verbose)?;
    info!("Starting dubfetch {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref())?;

    if let Some(path) = &args.save_config {
        config.save_to_file(path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let proxy = match &args.proxy {
        Some(proxy_string) => match ProxyConfig::parse(proxy_string) {
            Ok(proxy) => {
                info!(
                    "Proxy configured: {}:{}",
                    proxy.host,
                    proxy.port.map(|p| p.to_string()).unwrap_or_else(|| "default".to_string())
                );
                Some(proxy)
            }
            Err(e) => {
                warn!("Failed to parse proxy configuration: {}", e);
                None
            }
        },
        None => None,
    };

    if args.force_proxy && proxy.is_none() {
        anyhow::bail!("Operation was interrupted due to the force-proxy option");
    }

    if let Some(output_dir) = &args.output {
        if output_dir.exists() {
            info!("Output directory exists: {}", output_dir.display());
        } else {
            info!("Creating output directory: {}", output_dir.display());
            std::fs::create_dir_all(output_dir)
                .map_err(|e| anyhow::anyhow!("Invalid output directory {}: {}", output_dir.display(), e))?;
        }
    }

    let mut references: Vec<VideoReference> = Vec::new();
    for link in &args.links {
        match VideoReference::parse(link) {
            Ok(reference) if references.contains(&reference) => {
                warn!("Skipping duplicate link: {}", link);
            }
            Ok(reference) => references.push(reference),
            Err(e) => error!("{}", e),
        }
    }

    if references.is_empty() {
        warn!("No supported links to process");
        return Ok(());
    }

    let settings = Arc::new(args.job_settings(proxy.as_ref(), references.len()));
    if settings.merge_video {
        info!(
            "Video merge enabled (original volume {}%, translation volume {}%)",
            settings.merge.original_volume * 100.0,
            settings.merge.translation_volume * 100.0
        );
    }

    let api = YandexClient::new(config.remote.clone(), proxy.as_ref())?;
    let poller = Arc::new(TranslationPoller::new(Arc::new(api), PollPolicy::from(&config.polling)));
    let media: Arc<dyn MediaProcessorTrait> = Arc::from(MediaProcessorFactory::create_processor(
        config.tools.clone(),
        config.media.clone(),
        proxy.clone(),
    ));
    let downloader = Arc::new(ArtifactDownloader::new(&config.remote.user_agent, proxy.as_ref())?);

    if settings.merge_video {
        if let Err(e) = media.check_availability().await {
            warn!("Video merge will not be possible: {}", e);
        }
    }

    let pipeline = Arc::new(JobPipeline::new(settings.clone(), poller, media, downloader));

    let summary = run_jobs(references, |reference| {
        let pipeline = pipeline.clone();
        async move { pipeline.run(reference).await }
    })
    .await;

    print_summary(&summary, args.output.as_deref());
    Ok(())
}

/// Explicit config file, else `config.toml` in the working directory, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

fn print_summary(summary: &RunSummary, output_dir: Option<&Path>) {
    println!();
    for report in &summary.reports {
        let elapsed = (report.finished_at - report.started_at).num_seconds().max(0) as u64;
        println!("{} ({})", report.status_line(), format_duration(elapsed));
    }
    println!();
    println!(
        "Processed {} video(s): {} succeeded, {} partial, {} failed",
        summary.reports.len(),
        summary.succeeded(),
        summary.partial(),
        summary.failed()
    );
    if let Some(dir) = output_dir {
        println!("Output directory: {}", dir.display());
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".dubfetch").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "dubfetch.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("dubfetch.log").display()
    );

    Ok(guard)
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
