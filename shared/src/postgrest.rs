//! PostgREST (Supabase) implementation of [`RemoteTable`].

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Instant;
use url::Url;

use crate::capabilities::http::{build_client, new_request_id, HttpError};
use crate::capabilities::remote::{Page, PageRange, RemoteTable};
use crate::catalog::{RecordDraft, RecordId, RemoteRow};
use crate::config::BackendSettings;
use crate::error::AppError;

const REQUEST_ID_HEADER: &str = "x-client-request-id";

/// Parses the total from a `Content-Range` header such as `0-999/2500` or
/// `*/0`. An unknown total (`0-999/*`) yields `None`.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<usize> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

pub struct PostgrestTable {
    client: reqwest::Client,
    endpoint: Url,
    table: String,
    anon_key: SecretString,
}

impl std::fmt::Debug for PostgrestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestTable")
            .field("endpoint", &self.endpoint.as_str())
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl PostgrestTable {
    pub fn new(settings: &BackendSettings) -> Result<Self, AppError> {
        let endpoint = settings
            .base_url
            .join_path(&["rest", "v1", settings.table.as_str()])?;
        Ok(Self {
            client: build_client()?,
            endpoint,
            table: settings.table.clone(),
            anon_key: SecretString::new(settings.anon_key.expose_secret().clone()),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_with(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in pairs {
                query.append_pair(k, v);
            }
        }
        url
    }

    fn id_filter(id: &RecordId) -> String {
        format!("eq.{id}")
    }

    fn request(&self, method: Method, url: Url, request_id: &str) -> RequestBuilder {
        let key = self.anon_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key.as_str())
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .header(REQUEST_ID_HEADER, request_id)
    }

    async fn send(builder: RequestBuilder, request_id: &str) -> Result<Response, HttpError> {
        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&e, request_id))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(response);
        }

        let body = response.bytes().await.ok().map(|b| b.to_vec());
        Err(HttpError::HttpStatus {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("error").to_string(),
            body,
            request_id: request_id.to_string(),
        })
    }

    async fn rows(response: Response, request_id: &str) -> Result<Vec<RemoteRow>, HttpError> {
        response
            .json::<Vec<RemoteRow>>()
            .await
            .map_err(|e| HttpError::InvalidResponse {
                reason: e.to_string(),
                request_id: request_id.to_string(),
            })
    }

    async fn write(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
        request_id: &str,
    ) -> Result<Vec<RemoteRow>, AppError> {
        let started = Instant::now();
        let builder = builder.header("Prefer", "return=representation");
        let result = match Self::send(builder, request_id).await {
            Ok(response) => Self::rows(response, request_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => {
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(
                    table = %self.table,
                    operation,
                    request_id,
                    affected = rows.len(),
                    elapsed_ms,
                    "remote write completed"
                );
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(table = %self.table, operation, request_id, error = %e, "remote write failed");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl RemoteTable for PostgrestTable {
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.table))]
    async fn fetch_page(&self, range: PageRange) -> Result<Page, AppError> {
        let request_id = new_request_id();
        let url = self.url_with(&[("select", "*"), ("order", "model.asc")]);
        let builder = self
            .request(Method::GET, url, &request_id)
            .header("Range-Unit", "items")
            .header(reqwest::header::RANGE, range.header_value())
            .header("Prefer", "count=exact");

        let response = Self::send(builder, &request_id).await.map_err(|e| {
            tracing::warn!(request_id = %request_id, error = %e, "page request failed");
            AppError::from(e)
        })?;

        let total = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            tracing::debug!(request_id = %request_id, ?total, "range past end of table");
            return Ok(Page { rows: Vec::new(), total });
        }

        let rows = Self::rows(response, &request_id).await?;
        tracing::debug!(request_id = %request_id, received = rows.len(), ?total, "page received");
        Ok(Page { rows, total })
    }

    async fn insert(&self, drafts: &[RecordDraft]) -> Result<Vec<RemoteRow>, AppError> {
        let request_id = new_request_id();
        let builder = self
            .request(Method::POST, self.endpoint.clone(), &request_id)
            .json(drafts);
        self.write("insert", builder, &request_id).await
    }

    async fn update(&self, id: &RecordId, draft: &RecordDraft) -> Result<Vec<RemoteRow>, AppError> {
        let request_id = new_request_id();
        let url = self.url_with(&[("id", &Self::id_filter(id))]);
        let builder = self.request(Method::PATCH, url, &request_id).json(draft);
        self.write("update", builder, &request_id).await
    }

    async fn delete(&self, id: &RecordId) -> Result<Vec<RemoteRow>, AppError> {
        let request_id = new_request_id();
        let url = self.url_with(&[("id", &Self::id_filter(id))]);
        let builder = self.request(Method::DELETE, url, &request_id);
        self.write("delete", builder, &request_id).await
    }
}
