//! Identifying a CD player model from a photo.

use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::capabilities::http::{build_client, new_request_id, HttpError};
use crate::config::RecognitionSettings;
use crate::error::AppError;
use crate::image_processing::PreparedImage;

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Sentinel the model is told to answer with when it reads no model number.
pub const NOT_FOUND_REPLY: &str = "NOT_FOUND";

pub const RECOGNITION_PROMPT: &str = "Identify the CD PLAYER brand and model number from this image. \
Look for text on the front panel (e.g., Sony CDP-227ESD, Denon DCD-1500, Technics SL-P1200, \
Marantz CD-63, Pioneer PD-73). Return ONLY the brand and model number as a plain string. \
If no model is found, return 'NOT_FOUND'.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionStatus {
    Identified,
    NotFound,
    MissingCredentials,
    ServiceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recognition {
    pub candidate: Option<String>,
    pub status: RecognitionStatus,
}

impl Recognition {
    #[must_use]
    pub fn identified(candidate: impl Into<String>) -> Self {
        Self {
            candidate: Some(candidate.into()),
            status: RecognitionStatus::Identified,
        }
    }

    #[must_use]
    pub const fn without_candidate(status: RecognitionStatus) -> Self {
        Self {
            candidate: None,
            status,
        }
    }

    /// Interprets the model's raw text reply. Surrounding whitespace and
    /// quotes are ignored, and the not-found sentinel matches in any case.
    #[must_use]
    pub fn from_reply(reply: Option<&str>) -> Self {
        let text = reply
            .map(|r| r.trim().trim_matches(|c| c == '\'' || c == '"').trim())
            .unwrap_or_default();
        if text.is_empty() || text.eq_ignore_ascii_case(NOT_FOUND_REPLY) {
            Self::without_candidate(RecognitionStatus::NotFound)
        } else {
            Self::identified(text)
        }
    }
}

/// Turns a prepared photo into a model-name candidate. Implementations never
/// fail; every problem is folded into [`RecognitionStatus`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn identify(&self, image: &PreparedImage) -> Recognition;
}

/// Recognizer for shells that run without an API key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecognizer;

#[async_trait]
impl Recognizer for NoRecognizer {
    async fn identify(&self, _image: &PreparedImage) -> Recognition {
        Recognition::without_candidate(RecognitionStatus::MissingCredentials)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if any.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

fn request_body(image: &PreparedImage) -> GenerateRequest<'static> {
    GenerateRequest {
        contents: [Content {
            parts: [
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: "image/jpeg",
                        data: image.to_base64(),
                    },
                },
                Part::Text {
                    text: RECOGNITION_PROMPT,
                },
            ],
        }],
    }
}

/// Gemini `generateContent` client.
pub struct GeminiRecognizer {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    endpoint: Url,
}

impl std::fmt::Debug for GeminiRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiRecognizer")
            .field("model", &self.model)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl GeminiRecognizer {
    pub fn new(settings: &RecognitionSettings) -> Result<Self, AppError> {
        let endpoint = Url::parse(&format!("{GEMINI_ENDPOINT}/{}:generateContent", settings.model))
            .map_err(|e| HttpError::InvalidUrl {
                url: settings.model.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client: build_client()?,
            api_key: settings
                .api_key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().clone())),
            model: settings.model.clone(),
            endpoint,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn generate(
        &self,
        key: &SecretString,
        image: &PreparedImage,
        request_id: &str,
    ) -> Result<GenerateResponse, HttpError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", key.expose_secret().as_str())
            .header("x-client-request-id", request_id)
            .json(&request_body(image))
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&e, request_id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.ok().map(|b| b.to_vec());
            return Err(HttpError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
                body,
                request_id: request_id.to_string(),
            });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| HttpError::InvalidResponse {
                reason: e.to_string(),
                request_id: request_id.to_string(),
            })
    }
}

#[async_trait]
impl Recognizer for GeminiRecognizer {
    #[instrument(level = "debug", skip(self, image), fields(model = %self.model, width = image.width, height = image.height))]
    async fn identify(&self, image: &PreparedImage) -> Recognition {
        let Some(key) = &self.api_key else {
            error!("recognition API key is missing; set API_KEY");
            return Recognition::without_candidate(RecognitionStatus::MissingCredentials);
        };

        let request_id = new_request_id();
        let started = Instant::now();
        match self.generate(key, image, &request_id).await {
            Ok(response) => {
                let recognition = Recognition::from_reply(response.text().as_deref());
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    request_id = %request_id,
                    status = ?recognition.status,
                    elapsed_ms,
                    "recognition completed"
                );
                recognition
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "recognition request failed");
                Recognition::without_candidate(RecognitionStatus::ServiceError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> PreparedImage {
        PreparedImage {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn test_reply_classification() {
            assert_eq!(
                Recognition::from_reply(Some("  Sony CDP-227ESD\n")),
                Recognition::identified("Sony CDP-227ESD")
            );
            assert_eq!(
                Recognition::from_reply(Some("NOT_FOUND")).status,
                RecognitionStatus::NotFound
            );
            assert_eq!(
                Recognition::from_reply(Some("'NOT_FOUND'")).status,
                RecognitionStatus::NotFound
            );
            assert_eq!(
                Recognition::from_reply(Some(" \"not_found\"\n")).status,
                RecognitionStatus::NotFound
            );
            assert_eq!(
                Recognition::from_reply(Some("NOT_FOUND yet")),
                Recognition::identified("NOT_FOUND yet")
            );
            assert_eq!(Recognition::from_reply(Some("   ")).candidate, None);
            assert_eq!(
                Recognition::from_reply(None).status,
                RecognitionStatus::NotFound
            );
        }

        #[test]
        fn test_response_text_extraction() {
            let response: GenerateResponse = serde_json::from_str(
                r#"{"candidates":[{"content":{"parts":[{"text":"Denon "},{"text":"DCD-1500"}]}}]}"#,
            )
            .unwrap();
            assert_eq!(response.text().as_deref(), Some("Denon DCD-1500"));

            let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
            assert_eq!(empty.text(), None);

            let blocked: GenerateResponse = serde_json::from_str(r#"{}"#).unwrap();
            assert_eq!(blocked.text(), None);
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_request_body_shape() {
            let body = serde_json::to_value(request_body(&image())).unwrap();
            let parts = &body["contents"][0]["parts"];
            assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
            assert_eq!(parts[0]["inlineData"]["data"], "/9j/2Q==");
            assert_eq!(parts[1]["text"], RECOGNITION_PROMPT);
        }

        #[test]
        fn test_endpoint_uses_model() {
            let recognizer = GeminiRecognizer::new(&RecognitionSettings {
                api_key: Some(SecretString::new("gem-secret".into())),
                model: "gemini-3-flash-preview".into(),
            })
            .unwrap();
            assert_eq!(
                recognizer.endpoint().as_str(),
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
            );
            assert!(!format!("{recognizer:?}").contains("gem-secret"));
        }

        #[tokio::test]
        async fn test_missing_key_short_circuits() {
            let recognizer = GeminiRecognizer::new(&RecognitionSettings {
                api_key: None,
                model: "gemini-3-flash-preview".into(),
            })
            .unwrap();
            assert_eq!(
                recognizer.identify(&image()).await,
                Recognition::without_candidate(RecognitionStatus::MissingCredentials)
            );
            assert_eq!(
                NoRecognizer.identify(&image()).await.status,
                RecognitionStatus::MissingCredentials
            );
        }
    }
}
