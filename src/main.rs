//! CLI entry point for rust_scan
//!
//! Provides command-line access to:
//! - A simulated scan session against the mock camera and a scripted decoder
//! - Preview-size negotiation and scan-region geometry for a given screen
//! - The effective configuration
//!
//! # Usage
//!
//! ```bash
//! rust_scan scan --payloads ",,ABC*123,,4006381333931"
//! rust_scan resolve --screen 480x800 --candidates 320x480,640x960,720x1280
//! rust_scan config
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_scan::config::ScanConfig;
use rust_scan::decode::ScriptedDecoder;
use rust_scan::hardware::mock::MockCamera;
use rust_scan::hardware::{select_camera_resolution, Resolution, SurfaceTarget};
use rust_scan::pipeline::{PipelineConfig, ScanEvent, ScanPipeline};
use rust_scan::region::RegionCache;
use rust_scan::tracing_setup::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rust_scan")]
#[command(about = "Camera barcode scanning pipeline", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulated scan session
    Scan {
        /// Comma separated decoder results, one per frame; an empty item is a miss
        #[arg(long, default_value = ",,ABC123")]
        payloads: String,

        /// Give up after this many seconds without a decoded result
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },

    /// Show the negotiated camera resolution and scan region for a screen
    Resolve {
        /// Screen resolution, e.g. 480x800
        #[arg(long)]
        screen: Option<String>,

        /// Advertised preview sizes, e.g. 320x480,640x960
        #[arg(long)]
        candidates: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ScanConfig::load_from(path),
        None => ScanConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate()?;

    let format: OutputFormat = cli.log_format.parse()?;
    tracing_setup::init(TracingConfig::from_scan_config(&config)?.with_format(format))?;

    match cli.command {
        Commands::Scan {
            payloads,
            timeout_secs,
        } => run_scan(&config, &payloads, Duration::from_secs(timeout_secs)).await,
        Commands::Resolve { screen, candidates } => resolve(&config, screen, candidates),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_scan(config: &ScanConfig, payloads: &str, timeout: Duration) -> Result<()> {
    let items: Vec<&str> = payloads.split(',').map(str::trim).collect();
    let decoder = ScriptedDecoder::from_payloads(&items);
    let camera = Arc::new(MockCamera::new(config.camera.mock_config()));
    let pipeline_config = PipelineConfig::from_config(config);

    println!("Formats: {}", pipeline_config.formats.describe());
    let (pipeline, mut events) = ScanPipeline::spawn(camera, decoder, pipeline_config)?;

    let surface = SurfaceTarget::new("cli-preview", config.camera.screen());
    pipeline.open(surface).await?;
    pipeline.start().await?;

    if let Some(region) = pipeline.status().await?.scan_region {
        println!("Scan region: {} (preview {})", region.display, region.preview);
    }

    let outcome = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                ScanEvent::Decoded { text, symbology } => {
                    println!("Decoded {symbology}: {text}");
                    return Ok(Some(text));
                }
                ScanEvent::NoMatch => println!("No match"),
                ScanEvent::RestartRequested { text } => {
                    println!("Restart requested by payload {text:?}")
                }
                ScanEvent::Error(kind) => bail!("Scan failed: {kind:?}"),
            }
        }
        Ok::<_, anyhow::Error>(None)
    })
    .await;

    let decoded = match outcome {
        Ok(result) => result?,
        Err(_) => None,
    };
    if decoded.is_some() {
        pipeline.accept().await?;
    } else {
        println!("No result within {}s", timeout.as_secs());
    }

    let status = pipeline.status().await?;
    println!(
        "Frames requested: {}, decoded: {}, matches: {}, misses: {}, autofocus requests: {}",
        status.frames_requested,
        status.frames_decoded,
        status.matches,
        status.misses,
        status.autofocus_requests
    );

    pipeline.shutdown().await?;
    Ok(())
}

fn resolve(config: &ScanConfig, screen: Option<String>, candidates: Option<String>) -> Result<()> {
    let screen = match screen {
        Some(s) => s.parse::<Resolution>()?,
        None => config.camera.screen(),
    };
    let candidates = candidates.or_else(|| config.camera.preview_size_values.clone());

    let camera = select_camera_resolution(candidates.as_deref(), screen);
    let region = RegionCache::new(config.region).region(screen, camera);

    println!("Screen resolution: {screen}");
    println!("Camera resolution: {camera}");
    println!("Scan region (display): {}", region.display);
    println!("Scan region (preview): {}", region.preview);
    Ok(())
}
