//! Runtime configuration.
//!
//! Shells read an [`AppConfig`], either as JSON or from the process
//! environment, and [`Settings::from_config`] turns it into validated values.
//! Keys are held as [`SecretString`] and never logged. The shell keeps the
//! keys for its own network adapters and sends the core only the secret-free
//! [`CoreSettings`] in `Event::Configured`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::http::{HttpError, ValidatedUrl};
use crate::capabilities::speech::DEFAULT_SPEECH_LANGUAGE;
use crate::error::AppError;

pub const DEFAULT_TABLE: &str = "cdp_models";
pub const DEFAULT_RECOGNITION_MODEL: &str = "gemini-3-flash-preview";

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_CATALOG_TABLE: &str = "CATALOG_TABLE";
pub const ENV_RECOGNITION_MODEL: &str = "RECOGNITION_MODEL";
pub const ENV_SPEECH_LANGUAGE: &str = "SPEECH_LANGUAGE";
pub const ENV_EMPTY_TABLE_POLICY: &str = "EMPTY_TABLE_POLICY";

/// What to show when the remote table answers successfully with no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTablePolicy {
    /// Substitute the bundled dataset, tagged as a fallback.
    #[default]
    UseFallback,
    /// Show the empty remote table as it is.
    ShowEmpty,
}

impl EmptyTablePolicy {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "use_fallback" | "fallback" => Ok(Self::UseFallback),
            "show_empty" | "empty" => Ok(Self::ShowEmpty),
            other => Err(ConfigError::InvalidValue {
                name: ENV_EMPTY_TABLE_POLICY,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] HttpError),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::configuration_missing("the app configuration is invalid").with_internal(e.to_string())
    }
}

/// Raw configuration as supplied by the shell. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<SecretString>,
    pub api_key: Option<SecretString>,
    pub catalog_table: Option<String>,
    pub recognition_model: Option<String>,
    pub speech_language: Option<String>,
    pub empty_table_policy: Option<String>,
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every setting through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            supabase_url: get(ENV_SUPABASE_URL),
            supabase_anon_key: get(ENV_SUPABASE_ANON_KEY).map(SecretString::new),
            api_key: get(ENV_API_KEY).map(SecretString::new),
            catalog_table: get(ENV_CATALOG_TABLE),
            recognition_model: get(ENV_RECOGNITION_MODEL),
            speech_language: get(ENV_SPEECH_LANGUAGE),
            empty_table_policy: get(ENV_EMPTY_TABLE_POLICY),
        }
    }
}

/// What the core acts on. Carries no credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSettings {
    pub backend_configured: bool,
    pub speech_language: String,
    pub empty_table_policy: EmptyTablePolicy,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            backend_configured: false,
            speech_language: DEFAULT_SPEECH_LANGUAGE.to_string(),
            empty_table_policy: EmptyTablePolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct BackendSettings {
    pub base_url: ValidatedUrl,
    pub anon_key: SecretString,
    pub table: String,
}

#[derive(Debug)]
pub struct RecognitionSettings {
    pub api_key: Option<SecretString>,
    pub model: String,
}

#[derive(Debug)]
pub struct Settings {
    /// `None` when the backend URL or key is missing; the app then runs on
    /// the bundled dataset.
    pub backend: Option<BackendSettings>,
    pub recognition: RecognitionSettings,
    pub speech_language: String,
    pub empty_table_policy: EmptyTablePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: None,
            recognition: RecognitionSettings {
                api_key: None,
                model: DEFAULT_RECOGNITION_MODEL.to_string(),
            },
            speech_language: DEFAULT_SPEECH_LANGUAGE.to_string(),
            empty_table_policy: EmptyTablePolicy::default(),
        }
    }
}

impl Settings {
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        let table = match config.catalog_table {
            Some(t) => validate_identifier(ENV_CATALOG_TABLE, t.trim())?,
            None => DEFAULT_TABLE.to_string(),
        };

        let anon_key = config
            .supabase_anon_key
            .filter(|k| !k.expose_secret().trim().is_empty());
        let backend = match (config.supabase_url, anon_key) {
            (Some(url), Some(anon_key)) => Some(BackendSettings {
                base_url: ValidatedUrl::new(url)?,
                anon_key,
                table,
            }),
            (None, None) => None,
            (url, _) => {
                tracing::warn!(
                    has_url = url.is_some(),
                    "backend partially configured; running on bundled data"
                );
                None
            }
        };

        let model = match config.recognition_model {
            Some(m) => validate_identifier(ENV_RECOGNITION_MODEL, m.trim())?,
            None => DEFAULT_RECOGNITION_MODEL.to_string(),
        };

        let empty_table_policy = match config.empty_table_policy {
            Some(p) => EmptyTablePolicy::parse(&p)?,
            None => EmptyTablePolicy::default(),
        };

        let speech_language = config
            .speech_language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_SPEECH_LANGUAGE.to_string());

        Ok(Self {
            backend,
            recognition: RecognitionSettings {
                api_key: config.api_key.filter(|k| !k.expose_secret().trim().is_empty()),
                model,
            },
            speech_language,
            empty_table_policy,
        })
    }

    #[must_use]
    pub fn backend_configured(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub fn core(&self) -> CoreSettings {
        CoreSettings {
            backend_configured: self.backend_configured(),
            speech_language: self.speech_language.clone(),
            empty_table_policy: self.empty_table_policy,
        }
    }
}

fn validate_identifier(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let valid = !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(value.to_string())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
    }
}
