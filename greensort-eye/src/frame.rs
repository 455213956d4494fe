//! Inbound frame decoding
//!
//! Frames arrive as text: a bare base64 string, a `data:` URL, a JSON string
//! or a JSON object carrying the image under `frame`, `image`, `data` or
//! `img`. Decoding validates the image and measures its brightness.

use crate::error::VisionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use greensort_core::{FrameSize, InferenceConfig};
use image::{DynamicImage, ImageFormat};
use serde_json::Value;

const PAYLOAD_KEYS: [&str; 4] = ["frame", "image", "data", "img"];

/// A validated still image ready for inference
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Encoded image bytes as received
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub size: FrameSize,
    pub mean_luma: f32,
    pub low_light: bool,
}

impl DecodedFrame {
    pub fn mime_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_frame_bytes: usize,
    low_light_threshold: f32,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize, low_light_threshold: f32) -> Self {
        Self {
            max_frame_bytes,
            low_light_threshold,
        }
    }

    pub fn from_config(max_frame_bytes: usize, inference: &InferenceConfig) -> Self {
        Self::new(max_frame_bytes, inference.low_light_threshold)
    }

    /// Decode a frame message into an image
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, VisionError> {
        if text.len() > self.max_frame_bytes {
            return Err(VisionError::FrameTooLarge {
                size: text.len(),
                limit: self.max_frame_bytes,
            });
        }

        let payload = extract_payload(text)?;
        let bytes = STANDARD.decode(strip_data_url(&payload).trim())?;
        self.decode_bytes(bytes)
    }

    /// Validate raw encoded image bytes
    pub fn decode_bytes(&self, bytes: Vec<u8>) -> Result<DecodedFrame, VisionError> {
        if bytes.is_empty() {
            return Err(VisionError::MalformedFrame("empty image".to_string()));
        }
        if bytes.len() > self.max_frame_bytes {
            return Err(VisionError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_bytes,
            });
        }

        let format = image::guess_format(&bytes)?;
        let img = image::load_from_memory_with_format(&bytes, format)?;
        let mean_luma = mean_luma(&img);

        Ok(DecodedFrame {
            size: FrameSize::new(img.width(), img.height()),
            bytes,
            format,
            mean_luma,
            low_light: mean_luma < self.low_light_threshold,
        })
    }
}

/// Pull the base64 image text out of a frame message
pub fn extract_payload(text: &str) -> Result<String, VisionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(VisionError::MalformedFrame("empty frame message".to_string()));
    }

    if !(trimmed.starts_with('{') || trimmed.starts_with('"')) {
        return Ok(trimmed.to_string());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| VisionError::MalformedFrame(format!("invalid JSON: {}", e)))?;

    match value {
        Value::String(s) => Ok(s),
        Value::Object(map) => PAYLOAD_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| VisionError::MalformedFrame("no image field in frame".to_string())),
        _ => Err(VisionError::MalformedFrame("unsupported frame message".to_string())),
    }
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        match payload.find(',') {
            Some(idx) => &payload[idx + 1..],
            None => payload,
        }
    } else {
        payload
    }
}

fn mean_luma(img: &DynamicImage) -> f32 {
    let gray = img.to_luma8();
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let total: u64 = pixels.iter().map(|p| *p as u64).sum();
    total as f32 / pixels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_base64(value: u8) -> String {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 6, Rgb([value, value, value]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        STANDARD.encode(out.into_inner())
    }

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(1024 * 1024, 80.0)
    }

    #[test]
    fn test_extract_payload_shapes() {
        assert_eq!(extract_payload("abc").unwrap(), "abc");
        assert_eq!(extract_payload("\"abc\"").unwrap(), "abc");
        assert_eq!(extract_payload(r#"{"frame":"abc"}"#).unwrap(), "abc");
        assert_eq!(extract_payload(r#"{"img":"abc","x":1}"#).unwrap(), "abc");
        assert!(extract_payload(r#"{"other":"abc"}"#).is_err());
        assert!(extract_payload("   ").is_err());
        assert!(extract_payload("{not json").is_err());
    }

    #[test]
    fn test_decode_bright_png() {
        let frame = decoder().decode(&png_base64(200)).unwrap();
        assert_eq!(frame.size, FrameSize::new(8, 6));
        assert_eq!(frame.format, ImageFormat::Png);
        assert!(!frame.low_light);
        assert!((frame.mean_luma - 200.0).abs() < 1.0);
    }

    #[test]
    fn test_decode_data_url_low_light() {
        let text = format!("data:image/png;base64,{}", png_base64(20));
        let frame = decoder().decode(&text).unwrap();
        assert!(frame.low_light);
        assert_eq!(frame.mime_type(), "image/png");
    }

    #[test]
    fn test_decode_json_object() {
        let text = serde_json::json!({ "image": png_base64(128) }).to_string();
        assert!(decoder().decode(&text).is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        let err = decoder().decode("!!!not-base64!!!").unwrap_err();
        assert!(err.is_frame_rejection());

        // valid base64, not an image
        let err = decoder().decode(&STANDARD.encode(b"hello world")).unwrap_err();
        assert_eq!(err.code(), "malformed_frame");
    }

    #[test]
    fn test_rejects_oversized() {
        let small = FrameDecoder::new(16, 80.0);
        match small.decode(&png_base64(100)) {
            Err(VisionError::FrameTooLarge { limit, .. }) => assert_eq!(limit, 16),
            other => panic!("Expected FrameTooLarge, got {:?}", other),
        }
    }
}
