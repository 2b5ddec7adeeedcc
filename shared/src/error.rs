use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::MAX_IMAGE_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigurationMissing,
    Transport,
    Timeout,
    ValidationRejected,
    AccessDenied,
    NotFound,
    InvalidCredentials,
    Busy,
    Deserialization,
    Storage,
    ImageProcessing,
    Camera,
    CameraPermissionDenied,
    SpeechUnavailable,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "CONFIGURATION_MISSING",
            Self::Transport => "TRANSPORT_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::ValidationRejected => "VALIDATION_REJECTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Busy => "BUSY",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Camera => "CAMERA_ERROR",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::SpeechUnavailable => "SPEECH_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Transport | Self::Timeout | Self::Busy | Self::Storage | Self::Camera => {
                ErrorSeverity::Transient
            }

            Self::Deserialization | Self::Internal => ErrorSeverity::Fatal,

            Self::ConfigurationMissing
            | Self::ValidationRejected
            | Self::AccessDenied
            | Self::NotFound
            | Self::InvalidCredentials
            | Self::ImageProcessing
            | Self::CameraPermissionDenied
            | Self::SpeechUnavailable => ErrorSeverity::Permanent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub hint: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            hint: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn configuration_missing(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationMissing, what)
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationRejected, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, message)
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::ConfigurationMissing => {
                format!("Not connected to the cloud: {}", self.message)
            }
            ErrorKind::Transport => {
                "Unable to reach the server. Please check your connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::ValidationRejected | ErrorKind::NotFound => self.message.clone(),
            ErrorKind::AccessDenied => {
                format!("Access restricted by the server: {}", self.message)
            }
            ErrorKind::InvalidCredentials => "Invalid admin credentials.".into(),
            ErrorKind::Busy => "Another operation is still running. Please wait.".into(),
            ErrorKind::Deserialization => {
                "The server sent data the app could not read.".into()
            }
            ErrorKind::Storage => "Unable to save settings on this device.".into(),
            ErrorKind::ImageProcessing => {
                format!(
                    "Unable to process the image. Use a JPEG, PNG or WebP photo under {} MB.",
                    MAX_IMAGE_BYTES / 1_000_000
                )
            }
            ErrorKind::Camera => {
                "Unable to open the camera (check HTTPS or camera access).".into()
            }
            ErrorKind::CameraPermissionDenied => {
                "Camera access is required. Please enable camera permissions in Settings.".into()
            }
            ErrorKind::SpeechUnavailable => {
                "Voice search is not supported on this device.".into()
            }
            ErrorKind::Internal => "An unexpected error occurred. Please try again.".into(),
        }
    }

    /// Maps a non-success HTTP status from a remote service to an error kind.
    /// PostgREST-style JSON bodies contribute their `message`.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::AccessDenied,
            404 | 406 => ErrorKind::NotFound,
            400 | 409 | 422 => ErrorKind::ValidationRejected,
            408 | 504 => ErrorKind::Timeout,
            _ => ErrorKind::Transport,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from_http_status(401, None).kind, ErrorKind::AccessDenied);
        assert_eq!(AppError::from_http_status(403, None).kind, ErrorKind::AccessDenied);
        assert_eq!(AppError::from_http_status(404, None).kind, ErrorKind::NotFound);
        assert_eq!(AppError::from_http_status(422, None).kind, ErrorKind::ValidationRejected);
        assert_eq!(AppError::from_http_status(408, None).kind, ErrorKind::Timeout);
        assert_eq!(AppError::from_http_status(502, None).kind, ErrorKind::Transport);
    }

    #[test]
    fn test_status_body_message() {
        let body = br#"{"code":"42501","message":"permission denied for table cdp_models"}"#;
        let err = AppError::from_http_status(403, Some(body));
        assert_eq!(err.message, "permission denied for table cdp_models");
        assert_eq!(err.context.get("http_status").map(String::as_str), Some("403"));
    }

    #[test]
    fn test_status_without_body() {
        let err = AppError::from_http_status(500, Some(b"<html>oops</html>"));
        assert_eq!(err.message, "HTTP error: 500");
    }

    #[test]
    fn test_severity_follows_kind_unless_overridden() {
        assert_eq!(AppError::transport("down").severity, ErrorSeverity::Transient);
        assert_eq!(AppError::validation("bad").severity, ErrorSeverity::Permanent);
        let err = AppError::transport("down").with_severity(ErrorSeverity::Fatal);
        assert_eq!(err.severity, ErrorSeverity::Fatal);
    }

    #[test]
    fn test_display_includes_internal() {
        let err = AppError::not_found("record missing").with_internal("id=7");
        assert_eq!(err.to_string(), "[NOT_FOUND] record missing (internal: id=7)");
    }

    #[test]
    fn test_access_denied_carries_hint() {
        let err = AppError::access_denied("zero rows deleted").with_hint("check policy");
        assert_eq!(err.hint.as_deref(), Some("check policy"));
        assert!(err.user_facing_message().contains("zero rows deleted"));
    }
}
