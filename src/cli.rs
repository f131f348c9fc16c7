// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Decoding an image file
//! - Scanning with a camera, with or without the terminal view

use gtin_scanner::backends::camera::{V4l2Provider, list_devices};
use gtin_scanner::decode::{DecodedResult, GtinEngine};
use gtin_scanner::{Scanner, ScannerConfig, SessionState};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::info;

fn build_scanner(
    config: &ScannerConfig,
    on_scan: impl Fn(DecodedResult) + Send + Sync + 'static,
) -> Scanner {
    let provider = Arc::new(V4l2Provider::new(config.into()));
    let engine = Arc::new(GtinEngine::with_max_dimension(config.max_decode_dimension));
    Scanner::builder(provider, engine)
        .config(config.clone())
        .on_scan(on_scan)
        .build()
}

fn print_result(result: &DecodedResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", result.text);
    }
    Ok(())
}

/// List all available cameras
pub fn list_cameras(config: &ScannerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let provider = V4l2Provider::new(config.into());
    let cameras = rt.block_on(list_devices(&provider));

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        let preferred = config.preferred_device_id.as_deref() == Some(camera.id.as_str());
        println!(
            "  [{}] {}{}",
            index,
            camera.label,
            if preferred { " (preferred)" } else { "" }
        );
        println!("      Device: {}", camera.id);
        println!("      Facing: {}", camera.facing);
        println!();
    }

    Ok(())
}

/// Print the configuration, optionally saving it
pub fn show_config(
    config: &ScannerConfig,
    path: Option<&Path>,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        let path = path.ok_or("No config directory on this platform")?;
        config.save_to(path)?;
        eprintln!("Config saved: {}", path.display());
    }
    Ok(())
}

/// Decode a barcode from an image file
pub fn decode_image(
    config: &ScannerConfig,
    path: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());

    let rt = tokio::runtime::Runtime::new()?;
    let scanner = build_scanner(config, |_| {});
    let result = rt.block_on(scanner.scan_image(bytes, name))?;

    print_result(&result, json)
}

/// Scan until a barcode is found or Ctrl+C is pressed
pub fn scan_headless(config: ScannerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let scanner = build_scanner(&config, move |result| {
        let _ = sender.send(result);
    });

    // Set up Ctrl+C handler
    let interrupted = Arc::new(Notify::new());
    {
        let scanner = scanner.clone();
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            scanner.stop();
            interrupted.notify_one();
        })?;
    }

    let result = rt.block_on(async {
        scanner.start().await;
        if scanner.state() == SessionState::Error {
            let message = scanner.scan_error().unwrap_or_default();
            return Err::<Option<DecodedResult>, Box<dyn std::error::Error>>(message.into());
        }

        if let Some(device) = scanner.active_device() {
            eprintln!("Scanning with {} (press Ctrl+C to stop)", device.label);
        } else {
            eprintln!("Scanning (press Ctrl+C to stop)");
        }

        tokio::select! {
            result = receiver.recv() => Ok(result),
            _ = interrupted.notified() => Ok(None),
        }
    })?;

    scanner.stop();
    match result {
        Some(result) => print_result(&result, false),
        None => {
            info!("Scan interrupted");
            eprintln!("Stopped.");
            Ok(())
        }
    }
}

/// Scan in the interactive terminal view
pub fn scan_interactive(config: ScannerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    if let Some(result) = gtin_scanner::terminal::run(&rt, config)? {
        print_result(&result, false)?;
    }
    Ok(())
}
