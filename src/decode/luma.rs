// SPDX-License-Identifier: GPL-3.0-only

//! Greyscale planes shared by the symbol readers

use super::{DecodeSource, ImageContainer};
use crate::backends::camera::CameraFrame;

/// Tightly packed 8-bit luma, row-major
#[derive(Debug, Clone)]
pub struct LumaPlane {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl LumaPlane {
    /// Load a decode source into a luma plane no larger than `max_dimension`
    ///
    /// Encoded images must already be in a container `image` can read.
    pub fn from_source(source: &DecodeSource, max_dimension: u32) -> Result<Self, String> {
        let decoded;
        let frame = match source {
            DecodeSource::Frame(frame) => frame,
            DecodeSource::Image(image) => {
                let ImageContainer::Raster(format) = image.container else {
                    return Err(format!("{} images must be transcoded first", image.container));
                };
                let rgba = image::load_from_memory_with_format(&image.bytes, format)
                    .map_err(|e| e.to_string())?
                    .to_rgba8();
                let (width, height) = rgba.dimensions();
                decoded = CameraFrame::from_rgba(width, height, rgba.into_raw());
                &decoded
            }
        };

        if !frame.is_well_formed() {
            return Err(format!(
                "frame buffer does not match {}x{}",
                frame.width, frame.height
            ));
        }
        Ok(Self::from_frame(frame, max_dimension))
    }

    /// Reduce a frame to luma, downscaling the longest side to `max_dimension`
    ///
    /// Uses bilinear sampling when downscaling so thin modules survive.
    pub fn from_frame(frame: &CameraFrame, max_dimension: u32) -> Self {
        let max_dimension = max_dimension.max(1);
        let (src_w, src_h) = (frame.width, frame.height);

        if src_w <= max_dimension && src_h <= max_dimension {
            let mut data = Vec::with_capacity((src_w * src_h) as usize);
            for y in 0..src_h {
                for x in 0..src_w {
                    data.push(frame.luma_at(x, y));
                }
            }
            return Self {
                data,
                width: src_w as usize,
                height: src_h as usize,
            };
        }

        let scale =
            (src_w as f32 / max_dimension as f32).max(src_h as f32 / max_dimension as f32);
        let dst_w = ((src_w as f32 / scale) as u32).max(1);
        let dst_h = ((src_h as f32 / scale) as u32).max(1);
        let x_ratio = src_w as f32 / dst_w as f32;
        let y_ratio = src_h as f32 / dst_h as f32;

        let mut data = Vec::with_capacity((dst_w * dst_h) as usize);
        for y in 0..dst_h {
            for x in 0..dst_w {
                let src_x = x as f32 * x_ratio;
                let src_y = y as f32 * y_ratio;

                let x0 = src_x as u32;
                let y0 = src_y as u32;
                let x1 = (x0 + 1).min(src_w - 1);
                let y1 = (y0 + 1).min(src_h - 1);
                let x_frac = src_x - x0 as f32;
                let y_frac = src_y - y0 as f32;

                let p00 = frame.luma_at(x0, y0) as f32;
                let p01 = frame.luma_at(x1, y0) as f32;
                let p10 = frame.luma_at(x0, y1) as f32;
                let p11 = frame.luma_at(x1, y1) as f32;

                let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                    + p01 * x_frac * (1.0 - y_frac)
                    + p10 * (1.0 - x_frac) * y_frac
                    + p11 * x_frac * y_frac;
                data.push(value as u8);
            }
        }

        Self {
            data,
            width: dst_w as usize,
            height: dst_h as usize,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    pub fn column(&self, x: usize) -> Vec<u8> {
        (0..self.height).map(|y| self.get(x, y)).collect()
    }
}
