use async_trait::async_trait;
use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, ErrorKind};

pub const MAX_IMAGE_SIZE_BYTES: usize = crate::MAX_IMAGE_BYTES;

pub struct Camera<E> {
    context: CapabilityContext<CameraOperation, E>,
}

impl<Ev> Capability<Ev> for Camera<Ev> {
    type Operation = CameraOperation;
    type MappedSelf<MappedEv> = Camera<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Camera::new(self.context.map_event(f))
    }
}

impl<E> Camera<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<CameraOperation, E>) -> Self {
        Self { context }
    }

    pub fn open<F>(&self, facing: CameraFacing, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::Open { facing }, callback);
    }

    pub fn capture<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::Capture, callback);
    }

    pub fn close<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::Close, callback);
    }

    pub fn pick_from_gallery<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::PickFromGallery, callback);
    }

    fn request<F>(&self, operation: CameraOperation, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await;
            ctx.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOperation {
    /// Start the live preview stream.
    Open { facing: CameraFacing },
    /// Grab a still frame from the open preview.
    Capture,
    /// Stop every track of the preview stream.
    Close,
    PickFromGallery,
}

impl Operation for CameraOperation {
    type Output = CameraResult;
}

impl CameraOperation {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Capture => "capture",
            Self::Close => "close",
            Self::PickFromGallery => "pick_from_gallery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl ImageFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
        }
    }

    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }

        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapturedImage {
    data: Vec<u8>,
    format: ImageFormat,
}

impl CapturedImage {
    pub fn new(data: Vec<u8>, format: ImageFormat) -> Result<Self, CameraError> {
        if data.is_empty() {
            return Err(CameraError::InvalidImage {
                reason: "image data is empty".to_string(),
            });
        }

        if data.len() > MAX_IMAGE_SIZE_BYTES {
            return Err(CameraError::ImageTooLarge {
                size: data.len(),
                max: MAX_IMAGE_SIZE_BYTES,
            });
        }

        if let Some(detected) = ImageFormat::from_magic_bytes(&data) {
            if detected != format {
                return Err(CameraError::InvalidImage {
                    reason: format!("format mismatch: declared {format:?} but detected {detected:?}"),
                });
            }
        }

        Ok(Self { data, format })
    }

    /// Builds an image whose format is taken from its header.
    pub fn detect(data: Vec<u8>) -> Result<Self, CameraError> {
        let format = ImageFormat::from_magic_bytes(&data).ok_or_else(|| {
            CameraError::InvalidImage {
                reason: "unrecognized image format".to_string(),
            }
        })?;
        Self::new(data, format)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOutput {
    Opened,
    Photo(CapturedImage),
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("camera preview is not open")]
    NotOpen,

    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("image too large: {size} bytes exceeds maximum of {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("camera not supported on this platform")]
    NotSupported,
}

impl From<CameraError> for AppError {
    fn from(e: CameraError) -> Self {
        let kind = match e {
            CameraError::PermissionDenied => ErrorKind::CameraPermissionDenied,
            CameraError::ImageTooLarge { .. } | CameraError::InvalidImage { .. } => {
                ErrorKind::ImageProcessing
            }
            CameraError::Unavailable { .. }
            | CameraError::NotOpen
            | CameraError::CaptureFailed { .. }
            | CameraError::NotSupported => ErrorKind::Camera,
        };
        AppError::new(kind, e.to_string())
    }
}

pub type CameraResult = Result<CameraOutput, CameraError>;

/// Platform camera behind the [`Camera`] capability. Shells implement the
/// four primitives; `execute` resolves one request.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, facing: CameraFacing) -> CameraResult;
    async fn capture(&self) -> CameraResult;
    async fn close(&self) -> CameraResult;
    async fn pick_from_gallery(&self) -> CameraResult;

    async fn execute(&self, operation: CameraOperation) -> CameraResult {
        match operation {
            CameraOperation::Open { facing } => self.open(facing).await,
            CameraOperation::Capture => self.capture().await,
            CameraOperation::Close => self.close().await,
            CameraOperation::PickFromGallery => self.pick_from_gallery().await,
        }
    }
}

/// Camera for shells without one. Every request fails with `NotSupported`
/// except `close`, which has nothing to release.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(&self, _facing: CameraFacing) -> CameraResult {
        Err(CameraError::NotSupported)
    }

    async fn capture(&self) -> CameraResult {
        Err(CameraError::NotSupported)
    }

    async fn close(&self) -> CameraResult {
        Ok(CameraOutput::Closed)
    }

    async fn pick_from_gallery(&self) -> CameraResult {
        Err(CameraError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01];

    #[test]
    fn test_image_format_detection() {
        assert_eq!(ImageFormat::from_magic_bytes(&JPEG_HEADER), Some(ImageFormat::Jpeg));

        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
        assert_eq!(ImageFormat::from_magic_bytes(&png_header), Some(ImageFormat::Png));

        let webp_header = *b"RIFF\0\0\0\0WEBP";
        assert_eq!(ImageFormat::from_magic_bytes(&webp_header), Some(ImageFormat::WebP));

        assert_eq!(ImageFormat::from_magic_bytes(&[0u8; 12]), None);
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::from_mime_type("IMAGE/JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime_type("image/heic"), None);
    }

    #[test]
    fn test_captured_image_validation() {
        assert!(CapturedImage::new(JPEG_HEADER.to_vec(), ImageFormat::Jpeg).is_ok());
        assert!(matches!(
            CapturedImage::new(vec![], ImageFormat::Jpeg),
            Err(CameraError::InvalidImage { .. })
        ));
        assert!(matches!(
            CapturedImage::new(JPEG_HEADER.to_vec(), ImageFormat::Png),
            Err(CameraError::InvalidImage { .. })
        ));
        assert!(matches!(
            CapturedImage::new(vec![0xFF; MAX_IMAGE_SIZE_BYTES + 1], ImageFormat::Jpeg),
            Err(CameraError::ImageTooLarge { .. })
        ));
        assert_eq!(
            CapturedImage::detect(JPEG_HEADER.to_vec()).unwrap().mime_type(),
            "image/jpeg"
        );
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = CameraError::PermissionDenied.into();
        assert_eq!(err.kind, ErrorKind::CameraPermissionDenied);
        let err: AppError = CameraError::Unavailable {
            reason: "insecure context".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Camera);
    }

    #[tokio::test]
    async fn test_no_camera() {
        assert_eq!(
            NoCamera.execute(CameraOperation::Open { facing: CameraFacing::Back }).await,
            Err(CameraError::NotSupported)
        );
        assert_eq!(NoCamera.execute(CameraOperation::Close).await, Ok(CameraOutput::Closed));
    }
}
