//! Preparing captured or picked photos for upload to the recognizer.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::{AppError, ErrorKind};
use crate::{
    JPEG_QUALITY, MAX_IMAGE_ALLOC, MAX_IMAGE_BYTES, MAX_IMAGE_DIMENSION, MAX_RECOGNITION_DIMENSION,
};

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("jpeg encoding failed: width={width}, height={height}, reason={reason}")]
    JpegEncode {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("malformed data URL: {reason}")]
    MalformedDataUrl { reason: &'static str },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<ImageProcessingError> for AppError {
    fn from(e: ImageProcessingError) -> Self {
        AppError::new(ErrorKind::ImageProcessing, "the photo could not be read")
            .with_internal(e.to_string())
    }
}

/// Limits applied when decoding and re-encoding a photo.
#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub max_input_bytes: usize,
    pub max_alloc_bytes: u64,
    pub max_dimension: u32,
    pub output_max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_IMAGE_BYTES,
            max_alloc_bytes: MAX_IMAGE_ALLOC,
            max_dimension: MAX_IMAGE_DIMENSION,
            output_max_edge: MAX_RECOGNITION_DIMENSION,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

/// A JPEG ready to be sent inline to the recognizer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImage")
            .field("bytes", &self.jpeg.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl PreparedImage {
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }
}

/// Decodes `raw_bytes`, shrinks it so the long edge fits the configured
/// maximum and re-encodes it as RGB JPEG. Metadata does not survive.
#[instrument(level = "debug", skip(raw_bytes), fields(input_size = raw_bytes.len()))]
pub fn prepare_for_recognition(raw_bytes: &[u8]) -> Result<PreparedImage, ImageProcessingError> {
    prepare_with(&ProcessingConfig::default(), raw_bytes)
}

pub fn prepare_with(
    config: &ProcessingConfig,
    raw_bytes: &[u8],
) -> Result<PreparedImage, ImageProcessingError> {
    let img = decode_image(config, raw_bytes).map_err(|e| {
        warn!(error = %e, "photo decode failed");
        e
    })?;

    let (w, h) = img.dimensions();
    let edge = config.output_max_edge;
    let img = if w > edge || h > edge {
        img.resize(edge, edge, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    let jpeg = encode_jpeg(&img, config.jpeg_quality)?;
    let (width, height) = img.dimensions();
    debug!(
        source_width = w,
        source_height = h,
        width,
        height,
        output_size = jpeg.len(),
        "photo prepared"
    );
    Ok(PreparedImage { jpeg, width, height })
}

/// Extracts the payload of a base64 `data:` URL. A bare base64 string is
/// accepted too.
pub fn decode_data_url(input: &str) -> Result<Vec<u8>, ImageProcessingError> {
    let input = input.trim();
    let payload = match input.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or(ImageProcessingError::MalformedDataUrl { reason: "missing comma" })?;
            if !meta.ends_with(";base64") {
                return Err(ImageProcessingError::MalformedDataUrl {
                    reason: "payload is not base64",
                });
            }
            data
        }
        None => input,
    };

    if payload.is_empty() {
        return Err(ImageProcessingError::EmptyInput);
    }
    Ok(STANDARD.decode(payload)?)
}

fn decode_image(
    config: &ProcessingConfig,
    raw_bytes: &[u8],
) -> Result<DynamicImage, ImageProcessingError> {
    if raw_bytes.is_empty() {
        return Err(ImageProcessingError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(ImageProcessingError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageProcessingError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(ImageProcessingError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    Ok(reader.decode()?)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageProcessingError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    if width == 0 || height == 0 {
        return Err(ImageProcessingError::JpegEncode {
            width,
            height,
            reason: "zero dimension".into(),
        });
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ImageProcessingError::JpegEncode {
            width,
            height,
            reason: e.to_string(),
        })?;
    Ok(out)
}
