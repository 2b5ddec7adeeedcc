use serde::{Deserialize, Serialize};

use crate::catalog::{Dataset, RecordDraft, RecordId};
use crate::config::CoreSettings;
use crate::event::EditorField;
use crate::session::AdminSession;
use crate::sync::{MutationState, PageCursor};

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

/// Progress of the fetch-all pass. At most one cursor is live; results for
/// any other fetch id are stale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchState {
    pub cursor: Option<PageCursor>,
    pub next_fetch_id: u64,
    /// A write completed while a fetch was running; fetch again afterwards.
    pub refetch_pending: bool,
}

impl FetchState {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.cursor.is_some()
    }

    #[must_use]
    pub fn progress(&self) -> Option<u8> {
        self.cursor.as_ref().and_then(PageCursor::progress)
    }

    #[must_use]
    pub fn is_current(&self, fetch_id: u64) -> bool {
        self.cursor
            .as_ref()
            .is_some_and(|c| c.fetch_id() == fetch_id)
    }

    pub fn next_id(&mut self) -> u64 {
        self.next_fetch_id += 1;
        self.next_fetch_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginState {
    pub open: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorTarget {
    New,
    /// `id` is `None` for a bundled record; saving it inserts a new row.
    Existing { key: String, id: Option<RecordId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorState {
    pub target: EditorTarget,
    pub draft: RecordDraft,
}

impl EditorState {
    #[must_use]
    pub fn new_record() -> Self {
        Self {
            target: EditorTarget::New,
            draft: RecordDraft::default(),
        }
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self.target, EditorTarget::New)
    }

    pub fn set_field(&mut self, field: EditorField, value: String) {
        match field {
            EditorField::Model => self.draft.model = value,
            EditorField::Dac => self.draft.dac = Some(value),
            EditorField::Laser => self.draft.laser = Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    #[default]
    Closed,
    Opening,
    Previewing,
    Capturing,
}

impl CameraState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub settings: CoreSettings,
    pub dataset: Dataset,
    pub query: String,
    pub fetch: FetchState,
    pub session: Option<AdminSession>,
    pub login: LoginState,
    pub editor: Option<EditorState>,
    pub mutation: MutationState,
    pub camera: CameraState,
    pub listening: bool,
    pub recognizing: bool,
    pub active_toast: Option<ToastMessage>,
    /// Row-policy help shown after a write was silently refused.
    pub access_hint: Option<String>,
}

impl Model {
    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.session.as_ref().is_some_and(AdminSession::is_admin)
    }

    /// A fetch or a write is running.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.fetch.is_loading() || self.mutation.is_in_flight()
    }
}
