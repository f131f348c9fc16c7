// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use gtin_scanner::ScannerConfig;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "gtin-scanner")]
#[command(about = "Scan barcodes from a camera or an image file")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/gtin-scanner/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Decode a barcode from an image file
    Image {
        /// Image to decode (PNG, JPEG, BMP, TIFF, WebP...)
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },

    /// Scan with a camera until a barcode is found
    Scan {
        /// Device id to try first (from 'gtin-scanner list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Delay between decode attempts in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Print the result without the interactive terminal view
        #[arg(long)]
        headless: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=gtin_scanner=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ScannerConfig::load_from(path),
        None => ScannerConfig::load(),
    };

    match cli.command {
        Commands::List => cli::list_cameras(&config),
        Commands::Config { write } => {
            let path = cli.config.or_else(ScannerConfig::default_path);
            cli::show_config(&config, path.as_deref(), write)
        }
        Commands::Image { path, json } => cli::decode_image(&config, &path, json),
        Commands::Scan {
            camera,
            interval,
            headless,
        } => {
            if camera.is_some() {
                config.preferred_device_id = camera;
            }
            if let Some(ms) = interval {
                config.poll_interval_ms = ms;
            }
            if headless {
                cli::scan_headless(config)
            } else {
                cli::scan_interactive(config)
            }
        }
    }
}
