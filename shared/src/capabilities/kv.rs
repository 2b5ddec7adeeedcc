use async_trait::async_trait;
use crux_kv::error::KeyValueError;
use crux_kv::value::Value;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::{AppError, ErrorKind};

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        let invalid = |reason: &str| KvError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty or whitespace"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains("..") {
            return Err(invalid("key cannot contain path traversal sequences"));
        }
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(invalid("key cannot start with path separator"));
        }
        if key.chars().any(char::is_control) {
            return Err(invalid("key contains control characters"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
}

impl KeyNamespace {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl From<KeyValueError> for KvError {
    fn from(e: KeyValueError) -> Self {
        KvError::Storage {
            message: e.to_string(),
        }
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        let kind = match e {
            KvError::Serialization { .. } => ErrorKind::Deserialization,
            KvError::InvalidKey { .. } => ErrorKind::Internal,
            KvError::ValueTooLarge { .. } | KvError::Storage { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, "Local storage failed").with_internal(e.to_string())
    }
}

/// Stored value for a read, or the previous value for a write or delete.
pub type KvResult = Result<Option<Vec<u8>>, KvError>;

/// Encodes and decodes JSON values of one type under one namespace.
pub struct TypedKvStore<T> {
    namespace: KeyNamespace,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    #[must_use]
    pub fn new(namespace: KeyNamespace) -> Self {
        Self {
            namespace,
            _phantom: PhantomData,
        }
    }

    /// Namespaced storage key for `key`.
    pub fn key(&self, key: &str) -> Result<String, KvError> {
        KvKey::new(self.namespace, key).map(|k| k.raw())
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
        })?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(data)
    }

    pub fn decode(&self, stored: Option<Vec<u8>>) -> Result<Option<T>, KvError> {
        stored
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Platform key/value storage (preferences, keychain, localStorage) that
/// resolves requests from the `KeyValue` capability.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn execute(&self, operation: KeyValueOperation) -> KeyValueResult;
}

/// Process-local store, used by tests and by shells without persistence.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn value(stored: Option<Vec<u8>>) -> Value {
    stored.map_or(Value::None, Value::Bytes)
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn execute(&self, operation: KeyValueOperation) -> KeyValueResult {
        let response = match operation {
            KeyValueOperation::Get { key } => KeyValueResponse::Get {
                value: value(self.entries.read().await.get(&key).cloned()),
            },
            KeyValueOperation::Set { key, value: data } => KeyValueResponse::Set {
                previous: value(self.entries.write().await.insert(key, data)),
            },
            KeyValueOperation::Delete { key } => KeyValueResponse::Delete {
                previous: value(self.entries.write().await.remove(&key)),
            },
            KeyValueOperation::Exists { key } => KeyValueResponse::Exists {
                is_present: self.entries.read().await.contains_key(&key),
            },
            KeyValueOperation::ListKeys { prefix, .. } => KeyValueResponse::ListKeys {
                keys: self
                    .entries
                    .read()
                    .await
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .cloned()
                    .collect(),
                next_cursor: 0,
            },
        };
        KeyValueResult::Ok { response }
    }
}
