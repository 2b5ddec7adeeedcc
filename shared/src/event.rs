use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::{CameraResult, KvResult, RemoteResult, SpeechResult};
use crate::config::CoreSettings;
use crate::recognition::Recognition;
use crate::sync::MutationKind;

/// Typed-in secret. Never shows up in `Debug` output or logs.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditorField {
    Model,
    Dac,
    Laser,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle and sync. The shell sends `Configured` before `AppStarted`.
    Configured(CoreSettings),
    AppStarted,
    FetchRequested,

    // Search
    QueryChanged(String),
    QueryCleared,

    // Session
    LoginOpened,
    LoginCancelled,
    LoginSubmitted { username: String, secret: Secret },
    LogoutRequested,

    // Admin editing. Records are addressed by their view key.
    EditorOpenedNew,
    EditorOpenedFor { key: String },
    EditorFieldChanged { field: EditorField, value: String },
    EditorCancelled,
    EditorSaved,
    DeleteRequested { key: String },
    SeedRequested,

    // Photo recognition
    CameraRequested,
    CaptureRequested,
    CameraCancelled,
    GalleryRequested,
    ImageSelected { bytes: Vec<u8> },
    ImageDataUrlSelected { data_url: String },

    // Voice search
    VoiceSearchRequested,
    VoiceSearchStopped,

    DismissToast,
    AccessHintDismissed,

    // Capability responses
    SessionLoaded(KvResult),
    SessionStored(KvResult),
    PageLoaded { fetch_id: u64, result: RemoteResult },
    MutationCompleted { kind: MutationKind, result: RemoteResult },
    CameraOpened(CameraResult),
    PhotoCaptured(CameraResult),
    GalleryPicked(CameraResult),
    CameraClosed(CameraResult),
    RecognitionCompleted(Recognition),
    SpeechResult(SpeechResult),
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configured(_) => "configured",
            Self::AppStarted => "app_started",
            Self::FetchRequested => "fetch_requested",
            Self::QueryChanged(_) => "query_changed",
            Self::QueryCleared => "query_cleared",
            Self::LoginOpened => "login_opened",
            Self::LoginCancelled => "login_cancelled",
            Self::LoginSubmitted { .. } => "login_submitted",
            Self::LogoutRequested => "logout_requested",
            Self::EditorOpenedNew => "editor_opened_new",
            Self::EditorOpenedFor { .. } => "editor_opened_for",
            Self::EditorFieldChanged { .. } => "editor_field_changed",
            Self::EditorCancelled => "editor_cancelled",
            Self::EditorSaved => "editor_saved",
            Self::DeleteRequested { .. } => "delete_requested",
            Self::SeedRequested => "seed_requested",
            Self::CameraRequested => "camera_requested",
            Self::CaptureRequested => "capture_requested",
            Self::CameraCancelled => "camera_cancelled",
            Self::GalleryRequested => "gallery_requested",
            Self::ImageSelected { .. } => "image_selected",
            Self::ImageDataUrlSelected { .. } => "image_data_url_selected",
            Self::VoiceSearchRequested => "voice_search_requested",
            Self::VoiceSearchStopped => "voice_search_stopped",
            Self::DismissToast => "dismiss_toast",
            Self::AccessHintDismissed => "access_hint_dismissed",
            Self::SessionLoaded(_) => "session_loaded",
            Self::SessionStored(_) => "session_stored",
            Self::PageLoaded { .. } => "page_loaded",
            Self::MutationCompleted { .. } => "mutation_completed",
            Self::CameraOpened(_) => "camera_opened",
            Self::PhotoCaptured(_) => "photo_captured",
            Self::GalleryPicked(_) => "gallery_picked",
            Self::CameraClosed(_) => "camera_closed",
            Self::RecognitionCompleted(_) => "recognition_completed",
            Self::SpeechResult(_) => "speech_result",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::FetchRequested
                | Self::QueryChanged(_)
                | Self::QueryCleared
                | Self::LoginOpened
                | Self::LoginCancelled
                | Self::LoginSubmitted { .. }
                | Self::LogoutRequested
                | Self::EditorOpenedNew
                | Self::EditorOpenedFor { .. }
                | Self::EditorFieldChanged { .. }
                | Self::EditorCancelled
                | Self::EditorSaved
                | Self::DeleteRequested { .. }
                | Self::SeedRequested
                | Self::CameraRequested
                | Self::CaptureRequested
                | Self::CameraCancelled
                | Self::GalleryRequested
                | Self::ImageSelected { .. }
                | Self::ImageDataUrlSelected { .. }
                | Self::VoiceSearchRequested
                | Self::VoiceSearchStopped
                | Self::DismissToast
                | Self::AccessHintDismissed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let event = Event::LoginSubmitted {
            username: "admin".into(),
            secret: Secret::new("1234"),
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("1234"));
    }

    #[test]
    fn responses_are_not_user_initiated() {
        assert!(Event::QueryChanged("cdp".into()).is_user_initiated());
        assert!(!Event::AppStarted.is_user_initiated());
        assert!(!Event::PageLoaded {
            fetch_id: 1,
            result: Ok(crate::capabilities::RemoteOutput::Rows(vec![])),
        }
        .is_user_initiated());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::EditorFieldChanged {
            field: EditorField::Laser,
            value: "KSS-151A".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(serde_json::from_str::<Event>(&json).unwrap(), event);
        assert_eq!(event.name(), "editor_field_changed");
    }
}
