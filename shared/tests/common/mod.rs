#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use crux_core::testing::AppTester;
use crux_core::Request;
use image::{DynamicImage, ImageFormat as EncodedFormat, Rgb, RgbImage};
use shared::capabilities::{
    CameraDevice, CameraFacing, CameraOperation, CameraOutput, CameraResult, CapturedImage, Page,
    PageRange, RemoteOperation, RemoteTable, SpeechEngine, SpeechOutput, SpeechResult,
};
use shared::catalog::RemoteRow;
use shared::image_processing::PreparedImage;
use shared::recognition::{Recognition, Recognizer};
use shared::{
    App, AppConfig, AppError, CoreSettings, Effect, Event, Model, RecordDraft, RecordId,
    Services, Settings, ViewModel,
};

pub fn backend_settings() -> CoreSettings {
    let config = AppConfig::from_json(
        r#"{"supabase_url":"https://abc.supabase.co","supabase_anon_key":"anon-key"}"#,
    )
    .unwrap();
    Settings::from_config(config).unwrap().core()
}

/// Test shell: drives the app through `AppTester` and answers every effect
/// from `services`, feeding completions back until nothing is pending.
pub struct Shell {
    app: AppTester<App, Effect>,
    model: Model,
    services: Services,
    renders: Vec<ViewModel>,
    hold_remote: bool,
    held: Vec<Request<RemoteOperation>>,
}

impl Shell {
    pub fn new(services: Services) -> Self {
        Self::with_app(App::default(), services)
    }

    pub fn with_app(app: App, services: Services) -> Self {
        Self {
            app: AppTester::new(app),
            model: Model::default(),
            services,
            renders: Vec::new(),
            hold_remote: false,
            held: Vec::new(),
        }
    }

    /// Leaves remote requests unanswered until [`Shell::release_remote`].
    #[must_use]
    pub fn holding_remote(mut self) -> Self {
        self.hold_remote = true;
        self
    }

    pub async fn start(&mut self, settings: CoreSettings) {
        self.dispatch(Event::Configured(settings)).await;
        self.dispatch(Event::AppStarted).await;
    }

    pub async fn dispatch(&mut self, event: Event) {
        self.run(VecDeque::from([event]), VecDeque::new()).await;
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn renders(&self) -> &[ViewModel] {
        &self.renders
    }

    pub fn held_remote(&self) -> Vec<RemoteOperation> {
        self.held.iter().map(|r| r.operation.clone()).collect()
    }

    /// Answers the held remote requests and stops holding new ones.
    pub async fn release_remote(&mut self) {
        self.hold_remote = false;
        let mut events = VecDeque::new();
        let mut effects = VecDeque::new();
        for mut request in std::mem::take(&mut self.held) {
            let output = self.services.remote.execute(request.operation.clone()).await;
            let update = self.app.resolve(&mut request, output).expect("remote resolves");
            effects.extend(update.effects);
            events.extend(update.events);
        }
        self.run(events, effects).await;
    }

    async fn run(&mut self, mut events: VecDeque<Event>, mut effects: VecDeque<Effect>) {
        loop {
            while let Some(effect) = effects.pop_front() {
                if let Some((more, completions)) = self.resolve(effect).await {
                    effects.extend(more);
                    events.extend(completions);
                }
            }
            let Some(event) = events.pop_front() else {
                break;
            };
            let update = self.app.update(event, &mut self.model);
            effects.extend(update.effects);
            events.extend(update.events);
        }
    }

    async fn resolve(&mut self, effect: Effect) -> Option<(Vec<Effect>, Vec<Event>)> {
        let update = match effect {
            Effect::Render(_) => {
                self.renders.push(self.app.view(&self.model));
                return None;
            }
            Effect::Remote(request) if self.hold_remote => {
                self.held.push(request);
                return None;
            }
            Effect::Remote(mut request) => {
                let output = self.services.remote.execute(request.operation.clone()).await;
                self.app.resolve(&mut request, output)
            }
            Effect::KeyValue(mut request) => {
                let output = self.services.kv.execute(request.operation.clone()).await;
                self.app.resolve(&mut request, output)
            }
            Effect::Recognize(mut request) => {
                let output = self.services.recognizer.identify(&request.operation.image).await;
                self.app.resolve(&mut request, output)
            }
            Effect::Camera(mut request) => {
                let output = self.services.camera.execute(request.operation.clone()).await;
                self.app.resolve(&mut request, output)
            }
            Effect::Speech(mut request) => {
                let output = self.services.speech.execute(request.operation.clone()).await;
                self.app.resolve(&mut request, output)
            }
        };
        let update = update.expect("effect resolves");
        Some((update.effects, update.events))
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([20, 20, 20]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, EncodedFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn row(id: usize, model: &str) -> RemoteRow {
    RemoteRow {
        id: Some(RecordId::new(id.to_string())),
        model: Some(model.to_string()),
        dac: Some("PCM56P".to_string()),
        laser: Some("KSS-151A".to_string()),
    }
}

/// In-memory table that echoes affected rows the way PostgREST does with
/// `Prefer: return=representation`.
#[derive(Default)]
pub struct FakeRemote {
    rows: Mutex<Vec<RemoteRow>>,
    ops: Mutex<Vec<RemoteOperation>>,
    next_id: Mutex<usize>,
    /// Writes succeed on the wire but affect nothing, like a row policy.
    block_writes: bool,
    fail_fetch: bool,
}

impl FakeRemote {
    pub fn with_rows(count: usize) -> Self {
        let rows = (0..count).map(|i| row(i + 1, &format!("MODEL {}", i + 1))).collect();
        Self {
            rows: Mutex::new(rows),
            next_id: Mutex::new(count + 1),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn blocking_writes(mut self) -> Self {
        self.block_writes = true;
        self
    }

    pub fn ops(&self) -> Vec<RemoteOperation> {
        self.ops.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<PageRange> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                RemoteOperation::FetchPage { range } => Some(range),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<RemoteOperation> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, RemoteOperation::FetchPage { .. }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn record(&self, op: RemoteOperation) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl RemoteTable for FakeRemote {
    async fn fetch_page(&self, range: PageRange) -> Result<Page, AppError> {
        self.record(RemoteOperation::FetchPage { range });
        if self.fail_fetch {
            return Err(AppError::transport("connection reset"));
        }
        let rows = self.rows.lock().unwrap();
        let end = (range.to + 1).min(rows.len());
        let slice = rows.get(range.from..end).map(<[RemoteRow]>::to_vec).unwrap_or_default();
        Ok(Page {
            rows: slice,
            total: Some(rows.len()),
        })
    }

    async fn insert(&self, drafts: &[RecordDraft]) -> Result<Vec<RemoteRow>, AppError> {
        self.record(RemoteOperation::Insert {
            drafts: drafts.to_vec(),
        });
        if self.block_writes {
            return Ok(Vec::new());
        }
        let mut next_id = self.next_id.lock().unwrap();
        let mut rows = self.rows.lock().unwrap();
        let mut echoed = Vec::new();
        for draft in drafts {
            let inserted = RemoteRow {
                id: Some(RecordId::new(next_id.to_string())),
                model: Some(draft.model.clone()),
                dac: draft.dac.clone(),
                laser: draft.laser.clone(),
            };
            *next_id += 1;
            rows.push(inserted.clone());
            echoed.push(inserted);
        }
        Ok(echoed)
    }

    async fn update(&self, id: &RecordId, draft: &RecordDraft) -> Result<Vec<RemoteRow>, AppError> {
        self.record(RemoteOperation::Update {
            id: id.clone(),
            draft: draft.clone(),
        });
        if self.block_writes {
            return Ok(Vec::new());
        }
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .filter(|r| r.id.as_ref() == Some(id))
            .map(|r| {
                r.model = Some(draft.model.clone());
                r.dac = draft.dac.clone();
                r.laser = draft.laser.clone();
                r.clone()
            })
            .collect())
    }

    async fn delete(&self, id: &RecordId) -> Result<Vec<RemoteRow>, AppError> {
        self.record(RemoteOperation::Delete { id: id.clone() });
        if self.block_writes {
            return Ok(Vec::new());
        }
        let mut rows = self.rows.lock().unwrap();
        let (removed, kept): (Vec<_>, Vec<_>) =
            rows.drain(..).partition(|r| r.id.as_ref() == Some(id));
        *rows = kept;
        Ok(removed)
    }
}

/// Camera that opens, hands back `photo` on capture, and logs every call.
pub struct FakeCamera {
    ops: Mutex<Vec<CameraOperation>>,
    photo: Vec<u8>,
    deny_open: bool,
}

impl FakeCamera {
    pub fn new(photo: Vec<u8>) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            photo,
            deny_open: false,
        }
    }

    #[must_use]
    pub fn denying_open(mut self) -> Self {
        self.deny_open = true;
        self
    }

    pub fn ops(&self) -> Vec<CameraOperation> {
        self.ops.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, CameraOperation::Close))
            .count()
    }

    fn photo(&self) -> CameraResult {
        Ok(CameraOutput::Photo(CapturedImage::detect(self.photo.clone())?))
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, facing: CameraFacing) -> CameraResult {
        self.ops.lock().unwrap().push(CameraOperation::Open { facing });
        if self.deny_open {
            return Err(shared::capabilities::CameraError::PermissionDenied);
        }
        Ok(CameraOutput::Opened)
    }

    async fn capture(&self) -> CameraResult {
        self.ops.lock().unwrap().push(CameraOperation::Capture);
        self.photo()
    }

    async fn close(&self) -> CameraResult {
        self.ops.lock().unwrap().push(CameraOperation::Close);
        Ok(CameraOutput::Closed)
    }

    async fn pick_from_gallery(&self) -> CameraResult {
        self.ops.lock().unwrap().push(CameraOperation::PickFromGallery);
        self.photo()
    }
}

pub struct FakeRecognizer {
    reply: Recognition,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl FakeRecognizer {
    pub fn new(reply: Recognition) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Dimensions of every image handed over for recognition.
    pub fn seen(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn identify(&self, image: &PreparedImage) -> Recognition {
        self.seen.lock().unwrap().push((image.width, image.height));
        self.reply.clone()
    }
}

pub struct FakeSpeech {
    transcript: Option<String>,
    languages: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn new(transcript: Option<&str>) -> Self {
        Self {
            transcript: transcript.map(str::to_string),
            languages: Mutex::new(Vec::new()),
        }
    }

    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn listen(&self, language: &str) -> SpeechResult {
        self.languages.lock().unwrap().push(language.to_string());
        Ok(match &self.transcript {
            Some(text) => SpeechOutput::Transcript(text.clone()),
            None => SpeechOutput::NoSpeech,
        })
    }

    async fn stop(&self) -> SpeechResult {
        Ok(SpeechOutput::Stopped)
    }
}
