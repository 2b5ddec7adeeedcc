use async_trait::async_trait;
use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, ErrorKind};

pub const DEFAULT_SPEECH_LANGUAGE: &str = "th-TH";

pub struct Speech<Ev> {
    context: CapabilityContext<SpeechOperation, Ev>,
}

impl<Ev> Capability<Ev> for Speech<Ev> {
    type Operation = SpeechOperation;
    type MappedSelf<MappedEv> = Speech<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Speech::new(self.context.map_event(f))
    }
}

impl<Ev> Speech<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<SpeechOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn listen<F>(&self, language: String, callback: F)
    where
        F: FnOnce(SpeechResult) -> Ev + Send + 'static,
    {
        self.request(SpeechOperation::Listen { language }, callback);
    }

    pub fn stop<F>(&self, callback: F)
    where
        F: FnOnce(SpeechResult) -> Ev + Send + 'static,
    {
        self.request(SpeechOperation::Stop, callback);
    }

    fn request<F>(&self, operation: SpeechOperation, callback: F)
    where
        F: FnOnce(SpeechResult) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await;
            ctx.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpeechOperation {
    /// Listen for a single utterance and return its final transcript.
    Listen { language: String },
    Stop,
}

impl Operation for SpeechOperation {
    type Output = SpeechResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpeechOutput {
    Transcript(String),
    NoSpeech,
    Stopped,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech recognition is not supported on this platform")]
    NotSupported,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("speech recognition failed: {reason}")]
    Failed { reason: String },
}

impl From<SpeechError> for AppError {
    fn from(e: SpeechError) -> Self {
        let kind = match e {
            SpeechError::NotSupported | SpeechError::PermissionDenied => {
                ErrorKind::SpeechUnavailable
            }
            SpeechError::Failed { .. } => ErrorKind::Internal,
        };
        AppError::new(kind, e.to_string())
    }
}

pub type SpeechResult = Result<SpeechOutput, SpeechError>;

/// Platform speech-to-text behind the [`Speech`] capability.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn listen(&self, language: &str) -> SpeechResult;
    async fn stop(&self) -> SpeechResult;

    async fn execute(&self, operation: SpeechOperation) -> SpeechResult {
        match operation {
            SpeechOperation::Listen { language } => self.listen(&language).await,
            SpeechOperation::Stop => self.stop().await,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeech;

#[async_trait]
impl SpeechEngine for NoSpeech {
    async fn listen(&self, _language: &str) -> SpeechResult {
        Err(SpeechError::NotSupported)
    }

    async fn stop(&self) -> SpeechResult {
        Ok(SpeechOutput::Stopped)
    }
}
