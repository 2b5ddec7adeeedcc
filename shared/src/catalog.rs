//! Catalog records, the bundled fallback list and the search filter.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::AppError;
use crate::normalize::normalize;

/// Opaque remote identifier. PostgREST tables may use integer or uuid keys,
/// so both JSON numbers and strings are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n.to_string())),
            Raw::Text(s) => Ok(Self(s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Remote,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: Option<RecordId>,
    pub model: String,
    pub dac: Option<String>,
    pub laser: Option<String>,
    pub origin: RecordOrigin,
}

impl CatalogRecord {
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.id.is_some() && self.origin == RecordOrigin::Remote
    }

    fn matches(&self, token: &str) -> bool {
        normalize(&self.model).contains(token)
            || self.dac.as_deref().is_some_and(|d| normalize(d).contains(token))
            || self.laser.as_deref().is_some_and(|l| normalize(l).contains(token))
    }
}

/// A row as the remote table returns it. Nothing is trusted until
/// [`RemoteRow::into_record`] has checked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRow {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dac: Option<String>,
    #[serde(default)]
    pub laser: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("row has no id")]
    MissingId,
    #[error("row {id} has no model")]
    MissingModel { id: RecordId },
}

impl RemoteRow {
    pub fn into_record(self) -> Result<CatalogRecord, RowError> {
        let id = self.id.ok_or(RowError::MissingId)?;
        let model = match self.model.map(|m| m.trim().to_string()) {
            Some(m) if !m.is_empty() => m,
            _ => return Err(RowError::MissingModel { id }),
        };

        Ok(CatalogRecord {
            id: Some(id),
            model,
            dac: non_blank(self.dac),
            laser: non_blank(self.laser),
            origin: RecordOrigin::Remote,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Editor contents. Serializes to the column set the remote table accepts,
/// with blank optional fields sent as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub model: String,
    pub dac: Option<String>,
    pub laser: Option<String>,
}

impl RecordDraft {
    pub fn new(
        model: impl Into<String>,
        dac: Option<impl Into<String>>,
        laser: Option<impl Into<String>>,
    ) -> Self {
        Self {
            model: model.into(),
            dac: dac.map(Into::into),
            laser: laser.map(Into::into),
        }
    }

    #[must_use]
    pub fn from_record(record: &CatalogRecord) -> Self {
        Self {
            model: record.model.clone(),
            dac: record.dac.clone(),
            laser: record.laser.clone(),
        }
    }

    /// Trims every field and rejects a draft without a model.
    pub fn validated(&self) -> Result<Self, AppError> {
        let model = self.model.trim();
        if model.is_empty() {
            return Err(AppError::validation("Model name is required"));
        }
        Ok(Self {
            model: model.to_string(),
            dac: non_blank(self.dac.clone()),
            laser: non_blank(self.laser.clone()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NotConfigured,
    EmptyRemote,
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum DatasetSource {
    Remote,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<CatalogRecord>,
    source: DatasetSource,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::fallback(FallbackReason::NotConfigured)
    }
}

impl Dataset {
    #[must_use]
    pub fn remote(records: Vec<CatalogRecord>) -> Self {
        Self {
            records,
            source: DatasetSource::Remote,
        }
    }

    #[must_use]
    pub fn fallback(reason: FallbackReason) -> Self {
        Self {
            records: fallback_records(),
            source: DatasetSource::Fallback(reason),
        }
    }

    #[must_use]
    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    #[must_use]
    pub const fn source(&self) -> DatasetSource {
        self.source
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.source, DatasetSource::Fallback(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stable key the view uses to address a record.
    #[must_use]
    pub fn key_of(&self, index: usize) -> Option<String> {
        let record = self.records.get(index)?;
        Some(match &record.id {
            Some(id) => id.to_string(),
            None => format!("local-{index}"),
        })
    }

    #[must_use]
    pub fn find_by_key(&self, key: &str) -> Option<&CatalogRecord> {
        (0..self.records.len())
            .find(|&i| self.key_of(i).as_deref() == Some(key))
            .and_then(|i| self.records.get(i))
    }

    /// Records matching `query` paired with their view keys.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(String, &CatalogRecord)> {
        let token = normalize(query);
        let blank = query.trim().is_empty();
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| blank || r.matches(&token))
            .filter_map(|(i, r)| self.key_of(i).map(|k| (k, r)))
            .collect()
    }
}

/// Returns the records matching `query`, in their original order.
///
/// A query that is blank after trimming returns everything. Otherwise a record
/// matches when its normalized model, DAC or laser contains the normalized
/// query; a query made only of punctuation normalizes to the empty token and
/// therefore matches every record.
#[must_use]
pub fn filter<'a>(records: &'a [CatalogRecord], query: &str) -> Vec<&'a CatalogRecord> {
    if query.trim().is_empty() {
        return records.iter().collect();
    }
    let token = normalize(query);
    records.iter().filter(|r| r.matches(&token)).collect()
}

const FALLBACK_ROWS: &[(&str, &str, &str)] = &[
    ("SONY CDP-25", "PCM54HP", "KSS-120C"),
    ("SONY CDP-30", "CX20017 – CX23035", "KSS-120C"),
    ("SONY CDP-35", "PCM54HP – CX23035", "KSS-120C"),
    ("SONY CDP-38", "LC7880", "KSS-150A"),
    ("SONY CDP-40", "PCM54HP-J – CX23035", "KSS-120C"),
    ("SONY CDP-45", "PCM54HP", "KSS-121A"),
    ("SONY CDP-48", "LC7880", "KSS-150A"),
    ("SONY CDP-50", "PCM54HP-J", "KSS-121A / KSS-123A"),
    ("SONY CDP-55", "PCM54HP-J", "KSS-121A / KSS-123A"),
    ("SONY CDP-65", "PCM54HP-J", "KSS-121A / KSS-123A"),
];

/// The bundled dataset, every record tagged [`RecordOrigin::LocalFallback`].
#[must_use]
pub fn fallback_records() -> Vec<CatalogRecord> {
    FALLBACK_ROWS
        .iter()
        .map(|(model, dac, laser)| CatalogRecord {
            id: None,
            model: (*model).to_string(),
            dac: Some((*dac).to_string()),
            laser: Some((*laser).to_string()),
            origin: RecordOrigin::LocalFallback,
        })
        .collect()
}

/// The bundled dataset as insertable drafts, used to seed an empty table.
#[must_use]
pub fn seed_drafts() -> Vec<RecordDraft> {
    fallback_records().iter().map(RecordDraft::from_record).collect()
}
