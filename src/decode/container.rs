// SPDX-License-Identifier: GPL-3.0-only

//! Image container detection

use image::ImageFormat;
use std::path::Path;

/// ISO-BMFF brands used by HEIC/HEIF stills
const HEIF_BRANDS: [&[u8; 4]; 8] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// Container format of an encoded still image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageContainer {
    /// Anything the `image` crate can identify
    Raster(ImageFormat),
    /// HEIC/HEIF, as produced by phone cameras
    Heif,
}

impl ImageContainer {
    pub const PNG: ImageContainer = ImageContainer::Raster(ImageFormat::Png);
    pub const JPEG: ImageContainer = ImageContainer::Raster(ImageFormat::Jpeg);

    /// PNG and JPEG, which every decode engine is expected to read
    pub fn is_standard(&self) -> bool {
        matches!(
            self,
            ImageContainer::Raster(ImageFormat::Png) | ImageContainer::Raster(ImageFormat::Jpeg)
        )
    }

    /// Identify the container from magic bytes, then from the file name
    pub fn sniff(bytes: &[u8], name_hint: Option<&str>) -> Option<Self> {
        if is_heif(bytes) {
            return Some(ImageContainer::Heif);
        }
        if let Ok(format) = image::guess_format(bytes) {
            return Some(ImageContainer::Raster(format));
        }

        let name = name_hint?;
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "heic" | "heif" => Some(ImageContainer::Heif),
            other => ImageFormat::from_extension(other).map(ImageContainer::Raster),
        }
    }
}

impl std::fmt::Display for ImageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageContainer::Raster(format) => {
                let name = format.extensions_str().first().copied().unwrap_or("raster");
                write!(f, "{}", name.to_ascii_uppercase())
            }
            ImageContainer::Heif => write!(f, "HEIC"),
        }
    }
}

/// `....ftyp<brand>` at the start of the file
fn is_heif(bytes: &[u8]) -> bool {
    match (bytes.get(4..8), bytes.get(8..12)) {
        (Some(b"ftyp"), Some(brand)) => HEIF_BRANDS.iter().any(|b| b.as_slice() == brand),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(ImageContainer::sniff(PNG_MAGIC, None), Some(ImageContainer::PNG));
        assert_eq!(
            ImageContainer::sniff(b"\xFF\xD8\xFF\xE0\0\x10JFIF", Some("x.heic")),
            Some(ImageContainer::JPEG)
        );
        assert_eq!(
            ImageContainer::sniff(b"BM\0\0\0\0\0\0\0\0", None),
            Some(ImageContainer::Raster(ImageFormat::Bmp))
        );
    }

    #[test]
    fn test_sniff_heif_brand() {
        let heic = b"\0\0\0\x18ftypheic\0\0\0\0mif1heic";
        assert_eq!(ImageContainer::sniff(heic, None), Some(ImageContainer::Heif));

        // AVIF shares the box layout but is not HEIF
        let avif = b"\0\0\0\x1cftypavif\0\0\0\0avifmif1";
        assert_ne!(ImageContainer::sniff(avif, None), Some(ImageContainer::Heif));
    }

    #[test]
    fn test_sniff_falls_back_to_extension() {
        assert_eq!(
            ImageContainer::sniff(b"????", Some("IMG_0042.HEIC")),
            Some(ImageContainer::Heif)
        );
        assert_eq!(ImageContainer::sniff(b"????", Some("notes.txt")), None);
        assert_eq!(ImageContainer::sniff(b"????", None), None);
    }

    #[test]
    fn test_standard_containers() {
        assert!(ImageContainer::PNG.is_standard());
        assert!(ImageContainer::JPEG.is_standard());
        assert!(!ImageContainer::Heif.is_standard());
        assert!(!ImageContainer::Raster(ImageFormat::Tiff).is_standard());
        assert_eq!(ImageContainer::Heif.to_string(), "HEIC");
        assert_eq!(ImageContainer::PNG.to_string(), "PNG");
    }
}
