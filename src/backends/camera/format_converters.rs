// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for capture backends
//!
//! Everything is converted to tightly packed RGBA before it reaches the
//! scanner, so decode engines only ever see one layout.

use image::ImageFormat;

/// Convert one YUV sample to RGBA (BT.601)
#[inline]
fn push_yuv(rgba: &mut Vec<u8>, y: f32, u: f32, v: f32) {
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    rgba.extend_from_slice(&[r, g, b, 255]);
}

/// Convert YUYV (YUV 4:2:2) to RGBA
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        push_yuv(&mut rgba, y0, u, v);
        push_yuv(&mut rgba, y1, u, v);

        if rgba.len() >= pixel_count * 4 {
            break;
        }
    }

    rgba.truncate(pixel_count * 4);
    rgba
}

/// Convert UYVY (YUV 4:2:2) to RGBA
///
/// UYVY format: U0 Y0 V0 Y1 - each 4-byte group encodes 2 pixels.
pub fn uyvy_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for chunk in data.chunks_exact(4) {
        let u = chunk[0] as f32 - 128.0;
        let y0 = chunk[1] as f32;
        let v = chunk[2] as f32 - 128.0;
        let y1 = chunk[3] as f32;

        push_yuv(&mut rgba, y0, u, v);
        push_yuv(&mut rgba, y1, u, v);

        if rgba.len() >= pixel_count * 4 {
            break;
        }
    }

    rgba.truncate(pixel_count * 4);
    rgba
}

/// Convert RGB24 to RGBA with full opacity
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    rgba
}

/// Decode one MJPEG frame to RGBA
///
/// Returns the decoded dimensions, which can differ from the negotiated
/// format on some UVC devices.
pub fn mjpeg_to_rgba(data: &[u8]) -> Result<(u32, u32, Vec<u8>), image::ImageError> {
    let rgba = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((width, height, rgba.into_raw()))
}
