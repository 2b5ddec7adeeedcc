//! Event handling. `App::update` is synchronous and side-effect free; all
//! I/O is requested through the [`Capabilities`].

use tracing::{debug, info, warn};

use crate::capabilities::{
    CameraError, CameraFacing, CameraOutput, CameraResult, Capabilities, KvError,
    RemoteOperation, RemoteOutput, RemoteResult, SpeechError, SpeechOutput,
};
use crate::catalog::{seed_drafts, Dataset, FallbackReason, RecordDraft};
use crate::error::{AppError, ErrorKind};
use crate::event::Event;
use crate::image_processing::{decode_data_url, prepare_for_recognition};
use crate::model::{CameraState, EditorState, EditorTarget, Model, ToastKind};
use crate::recognition::{Recognition, RecognitionStatus};
use crate::session::{AdminSession, CredentialVerifier, PlaceholderVerifier, SessionContext};
use crate::sync::{
    classify_mutation, delete_operation, insert_operation, resolve_dataset, update_operation,
    MutationKind, MutationState, PageCursor, PageStep, PAGE_SIZE,
};
use crate::view::ViewModel;

pub const FETCH_FAILED_MESSAGE: &str = "Sync failed: using the bundled backup data";
pub const NOT_CONNECTED_MESSAGE: &str = "Not connected to the cloud";
pub const ADMIN_REQUIRED_MESSAGE: &str = "Admin sign-in required";
pub const MISSING_API_KEY_MESSAGE: &str = "Photo recognition is not set up: set API_KEY";
pub const MODEL_NOT_FOUND_MESSAGE: &str = "No CD player model found in the photo. Please try again.";
pub const RECOGNITION_FAILED_MESSAGE: &str = "Photo recognition failed. Please try again.";

pub struct App {
    verifier: Box<dyn CredentialVerifier>,
    session: SessionContext,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

impl Default for App {
    fn default() -> Self {
        Self {
            verifier: Box::new(PlaceholderVerifier),
            session: SessionContext::new(),
        }
    }
}

impl App {
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl CredentialVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(
            event = event.name(),
            user_initiated = event.is_user_initiated(),
            "update"
        );

        match event {
            Event::Configured(settings) => {
                info!(
                    backend = settings.backend_configured,
                    policy = ?settings.empty_table_policy,
                    "core configured"
                );
                model.settings = settings;
                caps.render.render();
            }

            Event::AppStarted => {
                match self.session.key() {
                    Ok(key) => caps
                        .kv
                        .get(key, |r| Event::SessionLoaded(r.map_err(KvError::from))),
                    Err(e) => warn!(error = %e, "cannot build session key"),
                }
                Self::start_fetch(model, caps);
                caps.render.render();
            }

            Event::SessionLoaded(result) => {
                match result {
                    Ok(stored) => {
                        if let Some(session) = self.session.restore(stored) {
                            info!("admin session restored");
                            model.session = Some(session);
                        }
                    }
                    Err(e) => warn!(error = %e, "session load failed"),
                }
                caps.render.render();
            }

            Event::SessionStored(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "session write failed");
                    model.show_toast(AppError::from(e).user_facing_message(), ToastKind::Warning);
                    caps.render.render();
                }
            }

            Event::FetchRequested => {
                if model.fetch.is_loading() {
                    debug!("fetch already running; ignoring request");
                    return;
                }
                Self::start_fetch(model, caps);
                caps.render.render();
            }

            Event::PageLoaded { fetch_id, result } => {
                Self::handle_page(fetch_id, result, model, caps);
            }

            Event::QueryChanged(query) => {
                model.query = query;
                caps.render.render();
            }

            Event::QueryCleared => {
                model.query.clear();
                caps.render.render();
            }

            Event::LoginOpened => {
                model.login.open = true;
                model.login.error = None;
                caps.render.render();
            }

            Event::LoginCancelled => {
                model.login.open = false;
                model.login.error = None;
                caps.render.render();
            }

            Event::LoginSubmitted { username, secret } => {
                if self.verifier.verify(&username, secret.expose()) {
                    let session = AdminSession::admin();
                    let save = self
                        .session
                        .key()
                        .and_then(|key| Ok((key, self.session.encode(&session)?)));
                    match save {
                        Ok((key, value)) => caps.kv.set(key, value, |r| {
                            Event::SessionStored(r.map_err(KvError::from))
                        }),
                        Err(e) => warn!(error = %e, "cannot build session save"),
                    }
                    model.session = Some(session);
                    model.login.open = false;
                    model.login.error = None;
                    model.show_toast("Admin signed in", ToastKind::Success);
                    info!("admin login succeeded");
                } else {
                    let error = AppError::new(ErrorKind::InvalidCredentials, "credentials rejected");
                    model.login.error = Some(error.user_facing_message());
                    warn!("admin login rejected");
                }
                caps.render.render();
            }

            Event::LogoutRequested => {
                match self.session.key() {
                    Ok(key) => caps
                        .kv
                        .delete(key, |r| Event::SessionStored(r.map_err(KvError::from))),
                    Err(e) => warn!(error = %e, "cannot build session key"),
                }
                model.session = None;
                model.editor = None;
                model.show_toast("Signed out of admin", ToastKind::Info);
                info!("admin logged out");
                caps.render.render();
            }

            Event::EditorOpenedNew => {
                if Self::require_admin(model) {
                    model.editor = Some(EditorState::new_record());
                }
                caps.render.render();
            }

            Event::EditorOpenedFor { key } => {
                if Self::require_admin(model) {
                    match model.dataset.find_by_key(&key) {
                        Some(record) => {
                            model.editor = Some(EditorState {
                                target: EditorTarget::Existing {
                                    key: key.clone(),
                                    id: record.id.clone(),
                                },
                                draft: RecordDraft::from_record(record),
                            });
                        }
                        None => {
                            model.show_toast("That record is no longer listed", ToastKind::Error);
                        }
                    }
                }
                caps.render.render();
            }

            Event::EditorFieldChanged { field, value } => {
                if let Some(editor) = model.editor.as_mut() {
                    editor.set_field(field, value);
                    caps.render.render();
                }
            }

            Event::EditorCancelled => {
                model.editor = None;
                caps.render.render();
            }

            Event::EditorSaved => {
                Self::save_editor(model, caps);
                caps.render.render();
            }

            Event::DeleteRequested { key } => {
                Self::delete_record(&key, model, caps);
                caps.render.render();
            }

            Event::SeedRequested => {
                if Self::can_mutate(MutationKind::Seed, model) {
                    let result = insert_operation(&seed_drafts());
                    Self::submit_mutation(MutationKind::Seed, result, model, caps);
                }
                caps.render.render();
            }

            Event::MutationCompleted { kind, result } => {
                Self::handle_mutation(kind, result, model, caps);
                caps.render.render();
            }

            Event::CameraRequested => {
                if model.camera.is_active() {
                    debug!(state = ?model.camera, "camera already active");
                    return;
                }
                model.camera = CameraState::Opening;
                caps.camera.open(CameraFacing::Back, Event::CameraOpened);
                caps.render.render();
            }

            Event::CameraOpened(result) => {
                Self::handle_camera_opened(result, model, caps);
                caps.render.render();
            }

            Event::CaptureRequested => {
                if model.camera != CameraState::Previewing {
                    debug!(state = ?model.camera, "capture requested without a preview");
                    return;
                }
                model.camera = CameraState::Capturing;
                caps.camera.capture(Event::PhotoCaptured);
                caps.render.render();
            }

            Event::PhotoCaptured(result) => {
                Self::close_camera(model, caps);
                match result {
                    Ok(CameraOutput::Photo(image)) => {
                        Self::recognize_bytes(image.data(), model, caps);
                    }
                    Ok(CameraOutput::Cancelled) => debug!("capture cancelled"),
                    Ok(other) => warn!(output = ?other, "unexpected camera output for capture"),
                    Err(e) => Self::camera_failed(&e, model),
                }
                caps.render.render();
            }

            Event::CameraCancelled => {
                if model.camera.is_active() {
                    Self::close_camera(model, caps);
                    caps.render.render();
                }
            }

            Event::CameraClosed(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "camera release failed");
                }
            }

            Event::GalleryRequested => {
                if model.camera.is_active() || model.recognizing {
                    debug!("gallery requested while camera or recognition is busy");
                    return;
                }
                caps.camera.pick_from_gallery(Event::GalleryPicked);
            }

            Event::GalleryPicked(result) => {
                match result {
                    Ok(CameraOutput::Photo(image)) => {
                        Self::recognize_bytes(image.data(), model, caps);
                    }
                    Ok(CameraOutput::Cancelled) => debug!("gallery pick cancelled"),
                    Ok(other) => warn!(output = ?other, "unexpected camera output for gallery"),
                    Err(e) => Self::camera_failed(&e, model),
                }
                caps.render.render();
            }

            Event::ImageSelected { bytes } => {
                Self::recognize_bytes(&bytes, model, caps);
                caps.render.render();
            }

            Event::ImageDataUrlSelected { data_url } => {
                match decode_data_url(&data_url) {
                    Ok(bytes) => Self::recognize_bytes(&bytes, model, caps),
                    Err(e) => {
                        warn!(error = %e, "unreadable data URL");
                        model.show_toast(AppError::from(e).user_facing_message(), ToastKind::Error);
                    }
                }
                caps.render.render();
            }

            Event::RecognitionCompleted(recognition) => {
                Self::handle_recognition(recognition, model);
                caps.render.render();
            }

            Event::VoiceSearchRequested => {
                if model.listening {
                    return;
                }
                model.listening = true;
                caps.speech
                    .listen(model.settings.speech_language.clone(), Event::SpeechResult);
                caps.render.render();
            }

            Event::VoiceSearchStopped => {
                if model.listening {
                    model.listening = false;
                    caps.speech.stop(Event::SpeechResult);
                    caps.render.render();
                }
            }

            Event::SpeechResult(result) => {
                model.listening = false;
                match result {
                    Ok(SpeechOutput::Transcript(text)) => {
                        debug!(chars = text.len(), "voice transcript received");
                        model.query = text;
                    }
                    Ok(SpeechOutput::NoSpeech | SpeechOutput::Stopped) => {}
                    Err(e @ SpeechError::NotSupported) => {
                        model.show_toast(AppError::from(e).user_facing_message(), ToastKind::Error);
                    }
                    Err(e) => {
                        warn!(error = %e, "voice search failed");
                        model.show_toast(format!("Voice search failed: {e}"), ToastKind::Error);
                    }
                }
                caps.render.render();
            }

            Event::DismissToast => {
                model.clear_toast();
                caps.render.render();
            }

            Event::AccessHintDismissed => {
                model.access_hint = None;
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::from(model)
    }
}

impl App {
    fn start_fetch(model: &mut Model, caps: &Capabilities) {
        if !model.settings.backend_configured {
            info!("no backend configured; using bundled data");
            model.dataset = Dataset::fallback(FallbackReason::NotConfigured);
            return;
        }

        let fetch_id = model.fetch.next_id();
        let cursor = PageCursor::new(fetch_id, PAGE_SIZE);
        Self::request_page(fetch_id, &cursor, caps);
        model.fetch.cursor = Some(cursor);
        info!(fetch_id, "fetch started");
    }

    fn request_page(fetch_id: u64, cursor: &PageCursor, caps: &Capabilities) {
        caps.remote.execute(
            RemoteOperation::FetchPage {
                range: cursor.next_range(),
            },
            move |result| Event::PageLoaded { fetch_id, result },
        );
    }

    fn handle_page(fetch_id: u64, result: RemoteResult, model: &mut Model, caps: &Capabilities) {
        if !model.fetch.is_current(fetch_id) {
            debug!(fetch_id, "ignoring page from a superseded fetch");
            return;
        }
        let Some(mut cursor) = model.fetch.cursor.take() else {
            return;
        };

        let page = match result {
            Ok(RemoteOutput::Page(page)) => Ok(page),
            Ok(RemoteOutput::Rows(_)) => Err(AppError::new(
                ErrorKind::Internal,
                "Unexpected response to a page request",
            )),
            Err(e) => Err(e),
        };

        match page {
            Ok(page) => match cursor.accept(page) {
                PageStep::Continue(_) => {
                    debug!(fetch_id, progress = ?cursor.progress(), "page accepted");
                    Self::request_page(fetch_id, &cursor, caps);
                    model.fetch.cursor = Some(cursor);
                }
                PageStep::Complete => {
                    let pages = cursor.pages_received();
                    let skipped = cursor.rows_skipped();
                    let dataset =
                        resolve_dataset(cursor.into_records(), model.settings.empty_table_policy);
                    info!(
                        fetch_id,
                        pages,
                        skipped,
                        records = dataset.len(),
                        source = ?dataset.source(),
                        "fetch completed"
                    );
                    model.dataset = dataset;
                    Self::finish_fetch(model, caps);
                }
            },
            Err(e) => {
                warn!(fetch_id, error = %e, "fetch failed; using bundled data");
                model.dataset = Dataset::fallback(FallbackReason::FetchFailed);
                model.show_toast(FETCH_FAILED_MESSAGE, ToastKind::Error);
                Self::finish_fetch(model, caps);
            }
        }
        caps.render.render();
    }

    fn finish_fetch(model: &mut Model, caps: &Capabilities) {
        if model.fetch.refetch_pending {
            model.fetch.refetch_pending = false;
            debug!("running deferred fetch");
            Self::start_fetch(model, caps);
        }
    }

    /// Starts a fetch, or defers it behind the running one.
    fn refetch(model: &mut Model, caps: &Capabilities) {
        if model.fetch.is_loading() {
            model.fetch.refetch_pending = true;
        } else {
            Self::start_fetch(model, caps);
        }
    }

    fn require_admin(model: &mut Model) -> bool {
        if model.is_admin() {
            true
        } else {
            model.show_toast(ADMIN_REQUIRED_MESSAGE, ToastKind::Error);
            false
        }
    }

    /// Checks shared by every write: admin session, a backend, and no other
    /// write in flight.
    fn can_mutate(kind: MutationKind, model: &mut Model) -> bool {
        if !Self::require_admin(model) {
            return false;
        }
        if !model.settings.backend_configured {
            model.mutation.reject(kind);
            model.show_toast(NOT_CONNECTED_MESSAGE, ToastKind::Error);
            return false;
        }
        if model.mutation.is_in_flight() {
            let busy = AppError::new(ErrorKind::Busy, "a write is already in flight");
            model.show_toast(busy.user_facing_message(), ToastKind::Warning);
            return false;
        }
        true
    }

    fn submit_mutation(
        kind: MutationKind,
        operation: Result<RemoteOperation, AppError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match operation {
            Ok(operation) => {
                info!(kind = ?kind, operation = operation.name(), "write submitted");
                model.mutation = MutationState::InFlight(kind);
                caps.remote
                    .execute(operation, move |result| Event::MutationCompleted { kind, result });
            }
            Err(e) => {
                debug!(kind = ?kind, error = %e, "write rejected locally");
                model.mutation.reject(kind);
                model.show_toast(e.user_facing_message(), ToastKind::Error);
            }
        }
    }

    fn save_editor(model: &mut Model, caps: &Capabilities) {
        let Some(editor) = model.editor.clone() else {
            return;
        };

        let (kind, operation) = match &editor.target {
            EditorTarget::Existing { id: Some(id), .. } => {
                (MutationKind::Update, update_operation(Some(id), &editor.draft))
            }
            EditorTarget::Existing { id: None, .. } | EditorTarget::New => (
                MutationKind::Create,
                insert_operation(std::slice::from_ref(&editor.draft)),
            ),
        };

        if Self::can_mutate(kind, model) {
            Self::submit_mutation(kind, operation, model, caps);
        }
    }

    fn delete_record(key: &str, model: &mut Model, caps: &Capabilities) {
        if !Self::require_admin(model) {
            return;
        }
        let Some(record) = model.dataset.find_by_key(key) else {
            model.show_toast("That record is no longer listed", ToastKind::Error);
            return;
        };

        // Local-only records are refused before anything else is checked.
        let operation = delete_operation(record);
        if operation.is_err() {
            Self::submit_mutation(MutationKind::Delete, operation, model, caps);
            return;
        }
        if Self::can_mutate(MutationKind::Delete, model) {
            Self::submit_mutation(MutationKind::Delete, operation, model, caps);
        }
    }

    fn handle_mutation(
        kind: MutationKind,
        result: RemoteResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match classify_mutation(kind, result) {
            Ok(rows) => {
                info!(kind = ?kind, rows, "write applied");
                model.mutation = MutationState::Applied(kind);
                model.access_hint = None;
                if matches!(kind, MutationKind::Create | MutationKind::Update) {
                    model.editor = None;
                }
                model.show_toast(kind.success_message(), ToastKind::Success);
                Self::refetch(model, caps);
            }
            Err(e) => {
                warn!(kind = ?kind, error = %e, "write failed");
                model.mutation = MutationState::Failed(kind);
                if e.kind == ErrorKind::AccessDenied {
                    model.access_hint = e.hint.clone();
                }
                model.show_toast(
                    format!("{} ({})", kind.failure_prefix(), e.user_facing_message()),
                    ToastKind::Error,
                );
            }
        }
    }

    fn handle_camera_opened(result: CameraResult, model: &mut Model, caps: &Capabilities) {
        match result {
            Ok(CameraOutput::Opened) if model.camera == CameraState::Opening => {
                model.camera = CameraState::Previewing;
            }
            Ok(CameraOutput::Opened) => {
                debug!("preview opened after cancel; releasing");
                caps.camera.close(Event::CameraClosed);
            }
            Ok(other) => {
                debug!(output = ?other, "camera did not open");
                Self::close_camera(model, caps);
            }
            Err(e) => {
                Self::close_camera(model, caps);
                Self::camera_failed(&e, model);
            }
        }
    }

    fn close_camera(model: &mut Model, caps: &Capabilities) {
        model.camera = CameraState::Closed;
        caps.camera.close(Event::CameraClosed);
    }

    fn camera_failed(error: &CameraError, model: &mut Model) {
        warn!(error = %error, "camera failed");
        model.show_toast(
            AppError::from(error.clone()).user_facing_message(),
            ToastKind::Error,
        );
    }

    fn recognize_bytes(bytes: &[u8], model: &mut Model, caps: &Capabilities) {
        if model.recognizing {
            let busy = AppError::new(ErrorKind::Busy, "recognition already running");
            model.show_toast(busy.user_facing_message(), ToastKind::Warning);
            return;
        }
        match prepare_for_recognition(bytes) {
            Ok(image) => {
                model.recognizing = true;
                caps.recognize.identify(image, Event::RecognitionCompleted);
            }
            Err(e) => {
                model.show_toast(AppError::from(e).user_facing_message(), ToastKind::Error);
            }
        }
    }

    fn handle_recognition(recognition: Recognition, model: &mut Model) {
        model.recognizing = false;
        match (recognition.status, recognition.candidate) {
            (RecognitionStatus::Identified, Some(candidate)) => {
                info!(candidate = %candidate, "model identified");
                model.show_toast(format!("Found model: {candidate}"), ToastKind::Success);
                model.query = candidate;
            }
            (RecognitionStatus::MissingCredentials, _) => {
                model.show_toast(MISSING_API_KEY_MESSAGE, ToastKind::Error);
            }
            (RecognitionStatus::ServiceError, _) => {
                model.show_toast(RECOGNITION_FAILED_MESSAGE, ToastKind::Error);
            }
            (RecognitionStatus::NotFound | RecognitionStatus::Identified, _) => {
                model.show_toast(MODEL_NOT_FOUND_MESSAGE, ToastKind::Error);
            }
        }
    }
}
