//! Image payload loading and transmission.
//!
//! The harness sends images in their on-disk encoding; decoding is the far
//! side's job. What the wrapper needs locally are the pixel dimensions,
//! which are sniffed from the file header for the common formats. The
//! loader is a replaceable closure so tests and exotic deployments can
//! source payloads from somewhere other than the filesystem.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::link::{SutLink, TransmittedImage};

/// An image payload resolved to bytes plus header dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Payload resolver: path in, encoded bytes and dimensions out.
pub type ImageLoadFn = Box<dyn Fn(&Path) -> Result<LoadedImage> + Send + Sync>;

/// Case identity for a path: the bare file name.
#[must_use]
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Read an image file and sniff its dimensions from the header.
pub fn load_image_file(path: &Path) -> Result<LoadedImage> {
    let bytes = fs::read(path).map_err(|e| Error::ImageDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Some((width, height)) = sniff_dimensions(&bytes) else {
        return Err(Error::ImageDecode {
            path: path.to_path_buf(),
            reason: "unrecognized image format".to_string(),
        });
    };
    Ok(LoadedImage {
        bytes,
        width,
        height,
    })
}

/// Sends images to the system under test over a [`SutLink`].
pub struct ImageTransmitter<L> {
    link: L,
    loader: ImageLoadFn,
}

impl<L: SutLink> ImageTransmitter<L> {
    /// Transmitter with the default filesystem loader.
    #[must_use]
    pub fn new(link: L) -> Self {
        Self {
            link,
            loader: Box::new(load_image_file),
        }
    }

    /// Transmitter with a custom payload loader.
    #[must_use]
    pub fn with_loader(link: L, loader: ImageLoadFn) -> Self {
        Self { link, loader }
    }

    /// Resolve `path` to a payload and hand it to the link.
    ///
    /// Returns as soon as the link accepts the image; the reply, if any,
    /// arrives asynchronously through the reply router.
    pub fn send(&self, path: &Path) -> Result<()> {
        let loaded = (self.loader)(path)?;
        let image = TransmittedImage {
            name: image_name(path),
            width: loaded.width,
            height: loaded.height,
            bytes: loaded.bytes,
        };
        debug!(
            name = %image.name,
            width = image.width,
            height = image.height,
            bytes = image.bytes.len(),
            "transmitting image"
        );
        self.link.transmit(&image)
    }
}

fn sniff_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    png_dimensions(data)
        .or_else(|| jpeg_dimensions(data))
        .or_else(|| gif_dimensions(data))
        .or_else(|| bmp_dimensions(data))
        .or_else(|| webp_dimensions(data))
}

fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if data.len() < 24 || data[..8] != MAGIC || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut i = 2;
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            // Lost marker sync; give up rather than misread a length.
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            // Fill byte between segments.
            i += 1;
            continue;
        }
        // Standalone markers carry no length field.
        if matches!(marker, 0x01 | 0xD0..=0xD8) {
            i += 2;
            continue;
        }
        if marker == 0xD9 {
            // EOI before any frame header.
            return None;
        }
        if i + 3 >= data.len() {
            return None;
        }
        let length = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        if length < 2 {
            return None;
        }
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            // SOFn payload: precision u8, height u16, width u16.
            if i + 9 > data.len() {
                return None;
            }
            let height = u32::from(u16::from_be_bytes([data[i + 5], data[i + 6]]));
            let width = u32::from(u16::from_be_bytes([data[i + 7], data[i + 8]]));
            return Some((width, height));
        }
        i += 2 + length;
    }
    None
}

fn gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 10 || !(data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        return None;
    }
    let width = u32::from(u16::from_le_bytes([data[6], data[7]]));
    let height = u32::from(u16::from_le_bytes([data[8], data[9]]));
    Some((width, height))
}

fn bmp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 26 || !data.starts_with(b"BM") {
        return None;
    }
    // BITMAPINFOHEADER stores signed dimensions; negative height means
    // top-down row order.
    let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
    let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
    Some((width.unsigned_abs(), height.unsigned_abs()))
}

fn webp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 30 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return None;
    }
    match &data[12..16] {
        b"VP8 " => {
            let width = u32::from(u16::from_le_bytes([data[26], data[27]]) & 0x3FFF);
            let height = u32::from(u16::from_le_bytes([data[28], data[29]]) & 0x3FFF);
            Some((width, height))
        }
        b"VP8L" => {
            let bits = u32::from_le_bytes([data[21], data[22], data[23], data[24]]);
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        b"VP8X" => {
            let width =
                u32::from(data[24]) | u32::from(data[25]) << 8 | u32::from(data[26]) << 16;
            let height =
                u32::from(data[27]) | u32::from(data[28]) << 8 | u32::from(data[29]) << 16;
            Some((width + 1, height + 1))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Minimal PNG header bytes for the given dimensions.
    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0, 0, 0, 13]); // IHDR length
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&width.to_be_bytes());
        png.extend_from_slice(&height.to_be_bytes());
        png.extend_from_slice(&[8, 2, 0, 0, 0]); // bit depth, color type, etc.
        png
    }

    struct RecordingLink {
        sent: Arc<Mutex<Vec<TransmittedImage>>>,
    }

    impl SutLink for RecordingLink {
        fn transmit(&self, image: &TransmittedImage) -> Result<()> {
            self.sent.lock().unwrap().push(image.clone());
            Ok(())
        }
    }

    #[test]
    fn png_header_dimensions() {
        assert_eq!(sniff_dimensions(&png_bytes(100, 50)), Some((100, 50)));
    }

    #[test]
    fn jpeg_sof_dimensions() {
        let mut jpeg = vec![0xFF, 0xD8];
        // APP0 segment, 16 bytes including the length field.
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        jpeg.extend_from_slice(&[0u8; 14]);
        // SOF0: length, precision, height 240, width 320.
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 8, 0x00, 0xF0, 0x01, 0x40]);
        assert_eq!(sniff_dimensions(&jpeg), Some((320, 240)));
    }

    #[test]
    fn gif_and_bmp_dimensions() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&16u16.to_le_bytes());
        gif.extend_from_slice(&8u16.to_le_bytes());
        assert_eq!(sniff_dimensions(&gif), Some((16, 8)));

        let mut bmp = b"BM".to_vec();
        bmp.resize(18, 0);
        bmp.extend_from_slice(&64i32.to_le_bytes());
        bmp.extend_from_slice(&(-32i32).to_le_bytes()); // top-down rows
        assert_eq!(sniff_dimensions(&bmp), Some((64, 32)));
    }

    #[test]
    fn webp_vp8l_dimensions() {
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0u8; 4]); // riff size, unchecked
        webp.extend_from_slice(b"WEBPVP8L");
        webp.extend_from_slice(&[0u8; 5]); // chunk size + signature byte
        let bits: u32 = (100 - 1) | ((50 - 1) << 14);
        webp.extend_from_slice(&bits.to_le_bytes());
        webp.resize(30, 0);
        assert_eq!(sniff_dimensions(&webp), Some((100, 50)));
    }

    #[test]
    fn unknown_bytes_sniff_to_none() {
        assert_eq!(sniff_dimensions(b"this is not an image"), None);
        assert_eq!(sniff_dimensions(&[]), None);
        // Truncated PNG magic alone is not enough.
        assert_eq!(sniff_dimensions(&[0x89, b'P', b'N', b'G']), None);
    }

    #[test]
    fn load_image_file_reads_bytes_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, png_bytes(100, 50)).unwrap();

        let loaded = load_image_file(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (100, 50));
        assert_eq!(loaded.bytes.len(), png_bytes(100, 50).len());
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let err = load_image_file(Path::new("/nonexistent/shot.png")).unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[test]
    fn unrecognized_format_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, b"plain text pretending to be an image").unwrap();

        let err = load_image_file(&path).unwrap_err();
        match err {
            Error::ImageDecode { reason, .. } => assert!(reason.contains("unrecognized")),
            other => panic!("expected ImageDecode, got {other:?}"),
        }
    }

    #[test]
    fn send_wraps_payload_with_name_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, png_bytes(100, 50)).unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let transmitter = ImageTransmitter::new(RecordingLink {
            sent: Arc::clone(&sent),
        });
        transmitter.send(&path).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "shot.png");
        assert_eq!((sent[0].width, sent[0].height), (100, 50));
        assert!(!sent[0].bytes.is_empty());
    }

    #[test]
    fn send_propagates_decode_failure_without_transmitting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"junk").unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let transmitter = ImageTransmitter::new(RecordingLink {
            sent: Arc::clone(&sent),
        });

        assert!(transmitter.send(&path).is_err());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn custom_loader_bypasses_the_filesystem() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transmitter = ImageTransmitter::with_loader(
            RecordingLink {
                sent: Arc::clone(&sent),
            },
            Box::new(|_path| {
                Ok(LoadedImage {
                    bytes: vec![1, 2, 3],
                    width: 3,
                    height: 1,
                })
            }),
        );

        transmitter.send(Path::new("virtual/cam0.png")).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].name, "cam0.png");
        assert_eq!(sent[0].bytes, vec![1, 2, 3]);
    }
}
