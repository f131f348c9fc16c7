// SPDX-License-Identifier: GPL-3.0-only

//! gtin-scanner - barcode acquisition from cameras and still images
//!
//! # Architecture
//!
//! - [`backends`]: Camera device enumeration and capture streams (V4L2)
//! - [`decode`]: Decode engine contract, EAN-13/UPC-A and QR readers, still-image pipeline
//! - [`scanner`]: Capture session state machine, poll loop, result sink
//! - [`config`]: User configuration handling
//! - [`terminal`]: Interactive terminal front end
//!
//! # Example
//!
//! ```ignore
//! let scanner = Scanner::builder(Arc::new(V4l2Provider::default()), Arc::new(GtinEngine::new()))
//!     .on_scan(|result| println!("{}", result.text))
//!     .build();
//! scanner.start().await;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod decode;
pub mod errors;
pub mod scanner;
pub mod terminal;

// Re-export commonly used types
pub use config::ScannerConfig;
pub use decode::{DecodeEngine, DecodedResult, GtinEngine, QrEngine};
pub use errors::{ScanError, ScanResult};
pub use scanner::{Scanner, SessionState};
