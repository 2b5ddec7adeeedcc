// lib.rs - CD player catalog finder core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod image_processing;
pub mod model;
pub mod normalize;
pub mod postgrest;
pub mod recognition;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod view;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::App as CruxApp;
pub use catalog::{CatalogRecord, Dataset, DatasetSource, FallbackReason, RecordDraft, RecordId};
pub use config::{AppConfig, CoreSettings, EmptyTablePolicy, Settings};
pub use error::{AppError, ErrorKind, ErrorSeverity};
pub use event::{EditorField, Event, Secret};
pub use model::Model;
pub use runtime::{Core, Services};
pub use view::ViewModel;

/// Largest photo accepted from the camera or gallery.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Decoder refuses images wider or taller than this.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;
pub const MAX_IMAGE_ALLOC: u64 = 256 * 1024 * 1024;
/// Longest edge of the JPEG sent for recognition.
pub const MAX_RECOGNITION_DIMENSION: u32 = 1600;
pub const JPEG_QUALITY: u8 = 85;
