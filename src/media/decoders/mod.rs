// SPDX-License-Identifier: GPL-3.0-only

//! Image decoding for viewfinder frames and captured stills
//!
//! Devices hand back encoded bytes (JPEG for the viewfinder, whatever the
//! image format option says for stills). Decoding is done with the `image`
//! crate into RGBA frames the presentation surface can show.

use crate::backends::camera::types::CameraFrame;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Decode encoded image bytes into an RGBA frame
pub fn decode_frame(bytes: &[u8]) -> Result<CameraFrame, String> {
    if bytes.is_empty() {
        return Err("No image data".to_string());
    }

    let img = image::load_from_memory(bytes).map_err(|e| format!("Failed to decode image: {}", e))?;
    let rgba = img.to_rgba8();
    let width = rgba.width();
    let height = rgba.height();

    debug!(width, height, size = bytes.len(), "Decoded frame");

    Ok(CameraFrame {
        width,
        height,
        stride: width * 4,
        data: Arc::from(rgba.into_raw().into_boxed_slice()),
        captured_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_decode_png() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let frame = decode_frame(bytes.get_ref()).unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.stride, 32);
        assert_eq!(frame.len(), 8 * 4 * 4);
        assert_eq!(&frame.data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_frame(b"definitely not an image").is_err());
        assert!(decode_frame(&[]).is_err());
    }
}
