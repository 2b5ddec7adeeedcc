//! Side-effect capabilities.
//!
//! `App::update` never performs I/O. It asks a capability for work, Crux
//! hands the shell an [`Effect`] carrying the request, and the shell's answer
//! comes back to the app as an [`Event`].

pub mod camera;
pub mod http;
pub mod kv;
pub mod recognize;
pub mod remote;
pub mod speech;

pub use self::camera::{
    Camera, CameraDevice, CameraError, CameraFacing, CameraOperation, CameraOutput, CameraResult,
    CapturedImage, ImageFormat, NoCamera,
};
pub use self::http::{HttpError, ValidatedUrl};
pub use self::kv::{KeyNamespace, KeyValueStore, KvError, KvKey, KvResult, MemoryKvStore};
pub use self::recognize::{Recognize, RecognizeOperation};
pub use self::remote::{
    NoRemote, Page, PageRange, Remote, RemoteOperation, RemoteOutput, RemoteResult, RemoteTable,
};
pub use self::speech::{
    NoSpeech, Speech, SpeechEngine, SpeechError, SpeechOperation, SpeechOutput, SpeechResult,
};

pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub kv: KeyValue<Event>,
    pub remote: Remote<Event>,
    pub recognize: Recognize<Event>,
    pub camera: Camera<Event>,
    pub speech: Speech<Event>,
}
