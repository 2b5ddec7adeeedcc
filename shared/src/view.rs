//! The view model rendered by shells. Derived from [`Model`] on every render;
//! nothing here is cached.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogRecord, DatasetSource};
use crate::model::{CameraState, EditorState, Model, ToastKind, ToastMessage};

pub const EMPTY_FIELD: &str = "-";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordView {
    /// Key to send back in `EditorOpenedFor` / `DeleteRequested`.
    pub key: String,
    pub model: String,
    pub dac: String,
    pub laser: String,
    pub is_local: bool,
}

impl RecordView {
    fn new(key: String, record: &CatalogRecord) -> Self {
        let display = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(EMPTY_FIELD)
                .to_string()
        };
        Self {
            key,
            model: record.model.clone(),
            dac: display(&record.dac),
            laser: display(&record.laser),
            is_local: !record.is_remote(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginView {
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditorView {
    pub is_new: bool,
    pub model: String,
    pub dac: String,
    pub laser: String,
}

impl From<&EditorState> for EditorView {
    fn from(editor: &EditorState) -> Self {
        Self {
            is_new: editor.is_new(),
            model: editor.draft.model.clone(),
            dac: editor.draft.dac.clone().unwrap_or_default(),
            laser: editor.draft.laser.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub query: String,
    pub results: Vec<RecordView>,
    pub result_count: usize,
    pub is_loading: bool,
    /// Only set while a fetch is part-way through (0 < p < 100).
    pub progress: Option<u8>,
    pub connection_label: String,
    pub source: DatasetSource,
    pub is_admin: bool,
    pub can_add: bool,
    pub login: Option<LoginView>,
    pub editor: Option<EditorView>,
    pub camera: CameraState,
    pub is_listening: bool,
    pub is_recognizing: bool,
    pub busy_label: Option<String>,
    pub toast: Option<ToastView>,
    pub access_hint: Option<String>,
}

impl From<&Model> for ViewModel {
    fn from(model: &Model) -> Self {
        let backend = model.settings.backend_configured;
        let results: Vec<RecordView> = model
            .dataset
            .search(&model.query)
            .into_iter()
            .map(|(key, record)| RecordView::new(key, record))
            .collect();

        let is_loading = model.is_loading();
        let fetch_progress = model.fetch.progress();
        let progress = fetch_progress.filter(|p| is_loading && (1..100).contains(p));

        let connection_label = if backend {
            format!("Synced {} records", model.dataset.len())
        } else {
            "Offline mode".to_string()
        };

        let busy_label = if is_loading {
            Some(format!("Syncing Data {}%...", fetch_progress.unwrap_or(0)))
        } else if model.recognizing {
            Some("Gemini AI Scanning...".to_string())
        } else {
            None
        };

        let is_admin = model.is_admin();

        ViewModel {
            query: model.query.clone(),
            result_count: results.len(),
            results,
            is_loading,
            progress,
            connection_label,
            source: model.dataset.source(),
            is_admin,
            can_add: is_admin && backend,
            login: model.login.open.then(|| LoginView {
                error: model.login.error.clone(),
            }),
            editor: model.editor.as_ref().map(EditorView::from),
            camera: model.camera,
            is_listening: model.listening,
            is_recognizing: model.recognizing,
            busy_label,
            toast: model.active_toast.as_ref().map(ToastView::from),
            access_hint: model.access_hint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::capabilities::{Effect, Page, RemoteOutput};
    use crate::catalog::{FallbackReason, RecordId, RemoteRow};
    use crate::config::CoreSettings;
    use crate::event::Event;
    use crate::session::AdminSession;
    use crux_core::testing::AppTester;

    fn backend_model() -> Model {
        Model {
            settings: CoreSettings {
                backend_configured: true,
                ..CoreSettings::default()
            },
            ..Model::default()
        }
    }

    #[test]
    fn test_offline_view() {
        let view = ViewModel::from(&Model::default());
        assert_eq!(view.connection_label, "Offline mode");
        assert_eq!(view.result_count, 10);
        assert_eq!(view.source, DatasetSource::Fallback(FallbackReason::NotConfigured));
        assert!(view.results.iter().all(|r| r.is_local));
        assert!(!view.can_add);
        assert_eq!(view.busy_label, None);
    }

    #[test]
    fn test_query_filters_results() {
        let model = Model {
            query: "cdp-25".into(),
            ..Model::default()
        };
        let view = ViewModel::from(&model);
        assert_eq!(view.result_count, 1);
        assert_eq!(view.results[0].model, "SONY CDP-25");
        assert_eq!(view.results[0].key, "local-0");
    }

    #[test]
    fn test_blank_fields_render_as_dash() {
        let app = AppTester::<App, Effect>::default();
        let mut model = backend_model();
        app.update(Event::FetchRequested, &mut model);
        let fetch_id = model.fetch.cursor.as_ref().unwrap().fetch_id();
        app.update(
            Event::PageLoaded {
                fetch_id,
                result: Ok(RemoteOutput::Page(Page {
                    rows: vec![RemoteRow {
                        id: Some(RecordId::new("7")),
                        model: Some("DENON DCD-1500".into()),
                        dac: Some("  ".into()),
                        laser: None,
                    }],
                    total: Some(1),
                })),
            },
            &mut model,
        );
        let view = app.view(&model);
        assert_eq!(view.connection_label, "Synced 1 records");
        assert_eq!(view.results[0].dac, EMPTY_FIELD);
        assert_eq!(view.results[0].laser, EMPTY_FIELD);
        assert_eq!(view.results[0].key, "7");
        assert!(!view.results[0].is_local);
    }

    #[test]
    fn test_progress_and_busy_label() {
        let app = AppTester::<App, Effect>::default();
        let mut model = backend_model();
        app.update(Event::FetchRequested, &mut model);
        let view = app.view(&model);
        assert!(view.is_loading);
        assert_eq!(view.progress, None);
        assert_eq!(view.busy_label.as_deref(), Some("Syncing Data 0%..."));

        let fetch_id = model.fetch.cursor.as_ref().unwrap().fetch_id();
        let rows = (0..1000)
            .map(|i| RemoteRow {
                id: Some(RecordId::new(i.to_string())),
                model: Some(format!("M{i}")),
                dac: None,
                laser: None,
            })
            .collect();
        app.update(
            Event::PageLoaded {
                fetch_id,
                result: Ok(RemoteOutput::Page(Page { rows, total: Some(2500) })),
            },
            &mut model,
        );
        let view = app.view(&model);
        assert_eq!(view.progress, Some(40));
        assert_eq!(view.busy_label.as_deref(), Some("Syncing Data 40%..."));
    }

    #[test]
    fn test_admin_and_modals() {
        let model = Model {
            session: Some(AdminSession::admin()),
            recognizing: true,
            login: crate::model::LoginState {
                open: true,
                error: Some("Invalid admin credentials.".into()),
            },
            ..backend_model()
        };
        let view = ViewModel::from(&model);
        assert!(view.is_admin);
        assert!(view.can_add);
        assert_eq!(
            view.login,
            Some(LoginView {
                error: Some("Invalid admin credentials.".into())
            })
        );
        assert_eq!(view.busy_label.as_deref(), Some("Gemini AI Scanning..."));
    }
}
