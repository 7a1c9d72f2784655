use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use tracing::debug;

use crate::{
    error::{Result, SectionError},
    traits::ImageDecoder,
};

/// Decoder for browser-style uploads.
///
/// Accepts `data:<media-type>;base64,<payload>`, bare base64 text, or raw
/// encoded image bytes.
#[derive(Debug, Clone, Default)]
pub struct UploadDecoder;

impl ImageDecoder for UploadDecoder {
    fn decode(&self, payload: &[u8]) -> Result<DynamicImage> {
        if payload.starts_with(b"data:") {
            let text = std::str::from_utf8(payload)
                .map_err(|e| SectionError::MalformedPayload(format!("envelope is not UTF-8: {e}")))?;
            return decode_data_url(text);
        }

        match image::load_from_memory(payload) {
            Ok(image) => Ok(image),
            // Not a known binary format; try it as bare base64 before giving up
            Err(err) => match std::str::from_utf8(payload) {
                Ok(text) if looks_like_base64(text) => decode_base64(text.trim()),
                _ => Err(err.into()),
            },
        }
    }
}

/// Strip a `data:` envelope and decode the embedded image
pub fn decode_data_url(payload: &str) -> Result<DynamicImage> {
    let (header, body) = payload
        .split_once(',')
        .ok_or_else(|| SectionError::MalformedPayload("missing ',' after media type".into()))?;
    if !header.ends_with(";base64") {
        return Err(SectionError::MalformedPayload(format!(
            "only base64 data URLs are supported, got '{header}'"
        )));
    }
    debug!("Decoding upload with header '{}'", header);
    decode_base64(body.trim())
}

fn decode_base64(body: &str) -> Result<DynamicImage> {
    // uploads are often wrapped at 76 columns
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(image::load_from_memory(&bytes)?)
}

fn looks_like_base64(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = GrayImage::from_fn(8, 6, |x, _| Luma([if x < 4 { 0 } else { 255 }]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn test_decode_data_url() {
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
        let image = UploadDecoder.decode(payload.as_bytes()).expect("Should decode");
        assert_eq!((image.width(), image.height()), (8, 6));
    }

    #[test]
    fn test_decode_raw_and_bare_base64() {
        let raw = UploadDecoder.decode(&png_bytes()).expect("raw png");
        assert_eq!(raw.width(), 8);

        let bare = STANDARD.encode(png_bytes());
        let image = UploadDecoder.decode(bare.as_bytes()).expect("bare base64");
        assert_eq!(image.height(), 6);
    }

    #[test]
    fn test_truncated_payload_is_decode_error() {
        let bytes = png_bytes();
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(&bytes[..bytes.len() / 2]));
        let err = UploadDecoder.decode(payload.as_bytes()).expect_err("truncated");
        assert_eq!(err.kind(), FailureKind::Decode);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = UploadDecoder.decode(b"data:image/png,notbase64").expect_err("no base64 marker");
        assert!(matches!(err, SectionError::MalformedPayload(_)));

        let err = UploadDecoder.decode(b"\x00\x01\x02 not an image").expect_err("garbage");
        assert_eq!(err.kind(), FailureKind::Decode);
    }
}
