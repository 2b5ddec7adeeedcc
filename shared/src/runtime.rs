//! A Rust shell: runs the Crux core and resolves its effects against real
//! services.

use std::collections::VecDeque;
use std::sync::Arc;

use crux_core::Core as CruxCore;
use tracing::{debug, instrument};

use crate::app::App;
use crate::capabilities::{
    CameraDevice, Effect, KeyValueStore, MemoryKvStore, NoCamera, NoRemote, NoSpeech,
    RemoteTable, SpeechEngine,
};
use crate::config::{CoreSettings, Settings};
use crate::error::AppError;
use crate::event::Event;
use crate::postgrest::PostgrestTable;
use crate::recognition::{GeminiRecognizer, NoRecognizer, Recognizer};
use crate::view::ViewModel;

type RenderCallback = Box<dyn FnMut(&ViewModel) + Send>;

/// Platform services that answer the core's effects.
#[derive(Clone)]
pub struct Services {
    pub remote: Arc<dyn RemoteTable>,
    pub kv: Arc<dyn KeyValueStore>,
    pub recognizer: Arc<dyn Recognizer>,
    pub camera: Arc<dyn CameraDevice>,
    pub speech: Arc<dyn SpeechEngine>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            remote: Arc::new(NoRemote),
            kv: Arc::new(MemoryKvStore::new()),
            recognizer: Arc::new(NoRecognizer),
            camera: Arc::new(NoCamera),
            speech: Arc::new(NoSpeech),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    /// Wires the PostgREST table when a backend is configured and the Gemini
    /// recognizer, which reports missing credentials itself.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let mut services =
            Self::default().with_recognizer(GeminiRecognizer::new(&settings.recognition)?);
        if let Some(backend) = &settings.backend {
            services = services.with_remote(PostgrestTable::new(backend)?);
        }
        Ok(services)
    }

    #[must_use]
    pub fn with_remote(mut self, remote: impl RemoteTable + 'static) -> Self {
        self.remote = Arc::new(remote);
        self
    }

    #[must_use]
    pub fn with_kv(mut self, kv: impl KeyValueStore + 'static) -> Self {
        self.kv = Arc::new(kv);
        self
    }

    #[must_use]
    pub fn with_recognizer(mut self, recognizer: impl Recognizer + 'static) -> Self {
        self.recognizer = Arc::new(recognizer);
        self
    }

    #[must_use]
    pub fn with_camera(mut self, camera: impl CameraDevice + 'static) -> Self {
        self.camera = Arc::new(camera);
        self
    }

    #[must_use]
    pub fn with_speech(mut self, speech: impl SpeechEngine + 'static) -> Self {
        self.speech = Arc::new(speech);
        self
    }
}

/// Owns the Crux core and drives it to quiescence.
///
/// Effects run one at a time in the order they were requested. Effects raised
/// while resolving one join the back of the queue.
pub struct Core {
    core: CruxCore<Effect, App>,
    services: Services,
    on_render: Option<RenderCallback>,
    renders: u64,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("renders", &self.renders)
            .finish_non_exhaustive()
    }
}

impl Core {
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            core: CruxCore::new(),
            services,
            on_render: None,
            renders: 0,
        }
    }

    /// Registers the callback that receives a fresh view model on every
    /// render effect.
    #[must_use]
    pub fn on_render(mut self, callback: impl FnMut(&ViewModel) + Send + 'static) -> Self {
        self.on_render = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.core.view()
    }

    #[must_use]
    pub const fn render_count(&self) -> u64 {
        self.renders
    }

    /// Hands the core its settings, then starts the app.
    pub async fn start(&mut self, settings: CoreSettings) {
        self.dispatch(Event::Configured(settings)).await;
        self.dispatch(Event::AppStarted).await;
    }

    /// Processes `event` and everything it causes, returning once no effect
    /// is left.
    #[instrument(level = "debug", skip(self, event), fields(event = event.name()))]
    pub async fn dispatch(&mut self, event: Event) {
        let mut queue: VecDeque<Effect> = self.core.process_event(event).into();
        while let Some(effect) = queue.pop_front() {
            let next = self.resolve(effect).await;
            if !next.is_empty() {
                debug!(count = next.len(), "effect raised more effects");
            }
            queue.extend(next);
        }
    }

    async fn resolve(&mut self, effect: Effect) -> Vec<Effect> {
        match effect {
            Effect::Render(_) => {
                self.render();
                Vec::new()
            }
            Effect::KeyValue(mut request) => {
                let output = self.services.kv.execute(request.operation.clone()).await;
                self.core.resolve(&mut request, output)
            }
            Effect::Remote(mut request) => {
                let output = self.services.remote.execute(request.operation.clone()).await;
                self.core.resolve(&mut request, output)
            }
            Effect::Recognize(mut request) => {
                let output = self.services.recognizer.identify(&request.operation.image).await;
                self.core.resolve(&mut request, output)
            }
            Effect::Camera(mut request) => {
                let output = self.services.camera.execute(request.operation.clone()).await;
                self.core.resolve(&mut request, output)
            }
            Effect::Speech(mut request) => {
                let output = self.services.speech.execute(request.operation.clone()).await;
                self.core.resolve(&mut request, output)
            }
        }
    }

    fn render(&mut self) {
        self.renders += 1;
        if let Some(callback) = self.on_render.as_mut() {
            let view = self.core.view();
            callback(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DatasetSource, FallbackReason};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_startup_without_backend_renders_fallback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut core = Core::new(Services::default())
            .on_render(move |view| sink.lock().unwrap().push(view.result_count));

        core.start(CoreSettings::default()).await;

        assert!(core.render_count() >= 2);
        assert_eq!(seen.lock().unwrap().last(), Some(&10));
        let view = core.view();
        assert_eq!(view.source, DatasetSource::Fallback(FallbackReason::NotConfigured));
        assert!(!view.is_admin);
    }

    #[tokio::test]
    async fn test_login_survives_restart() {
        let services = Services::default();
        let mut core = Core::new(services.clone());
        core.dispatch(Event::LoginSubmitted {
            username: "admin".into(),
            secret: crate::event::Secret::new("1234"),
        })
        .await;
        assert!(core.view().is_admin);

        let mut restarted = Core::new(services);
        restarted.start(CoreSettings::default()).await;
        assert!(restarted.view().is_admin);
    }

    #[test]
    fn test_services_from_settings_without_backend() {
        let settings = Settings::default();
        assert!(Services::from_settings(&settings).is_ok());
    }
}
