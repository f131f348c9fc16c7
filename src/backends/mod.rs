// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! - [`camera`]: Device enumeration, capture streams, frame conversion

pub mod camera;
