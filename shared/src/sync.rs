//! Fetch-all paging and mutation bookkeeping against the remote table.
//!
//! The actual I/O lives behind [`RemoteTable`](crate::capabilities::remote::RemoteTable);
//! this module decides which page to ask for next, when a fetch is complete,
//! and what a write's response means.

use serde::{Deserialize, Serialize};

use crate::capabilities::remote::{Page, PageRange, RemoteOperation, RemoteOutput, RemoteResult};
use crate::catalog::{CatalogRecord, Dataset, FallbackReason, RecordDraft, RecordId};
use crate::config::EmptyTablePolicy;
use crate::error::{AppError, ErrorKind};

pub const PAGE_SIZE: usize = 1000;

/// Shown next to an access-denied error when a write silently affected no rows.
pub const ROW_POLICY_HINT: &str = "The table's row-level security policy blocked this change. \
Grant the anon role a policy for this operation, for example: \
create policy \"anon write\" on public.cdp_models for all to anon using (true) with check (true);";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Continue(PageRange),
    Complete,
}

/// State of one fetch-all pass. Pages are requested strictly in order, one
/// at a time; results are only accepted for the matching `fetch_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    fetch_id: u64,
    page_size: usize,
    next_offset: usize,
    rows_seen: usize,
    total: Option<usize>,
    pages: usize,
    records: Vec<CatalogRecord>,
    skipped: usize,
}

impl PageCursor {
    #[must_use]
    pub fn new(fetch_id: u64, page_size: usize) -> Self {
        Self {
            fetch_id,
            page_size: page_size.max(1),
            next_offset: 0,
            rows_seen: 0,
            total: None,
            pages: 0,
            records: Vec::new(),
            skipped: 0,
        }
    }

    #[must_use]
    pub const fn fetch_id(&self) -> u64 {
        self.fetch_id
    }

    #[must_use]
    pub fn next_range(&self) -> PageRange {
        PageRange::new(self.next_offset, self.page_size)
    }

    #[must_use]
    pub const fn pages_received(&self) -> usize {
        self.pages
    }

    #[must_use]
    pub const fn rows_skipped(&self) -> usize {
        self.skipped
    }

    /// Folds one page into the cursor. Malformed rows are dropped here but
    /// still count toward the paging arithmetic.
    pub fn accept(&mut self, page: Page) -> PageStep {
        let received = page.rows.len();
        self.pages += 1;
        if page.total.is_some() {
            self.total = page.total;
        }

        for row in page.rows {
            match row.into_record() {
                Ok(record) => self.records.push(record),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(fetch_id = self.fetch_id, error = %e, "skipping malformed row");
                }
            }
        }

        self.rows_seen += received;
        self.next_offset += received;

        let exhausted = received == 0
            || received < self.page_size
            || self.total.is_some_and(|t| self.rows_seen >= t);

        if exhausted {
            PageStep::Complete
        } else {
            PageStep::Continue(self.next_range())
        }
    }

    /// Rounded percentage of the reported total fetched so far, capped at 100.
    /// `None` until the server has reported a total.
    #[must_use]
    pub fn progress(&self) -> Option<u8> {
        let total = self.total?;
        if total == 0 {
            return Some(100);
        }
        let pct = (self.rows_seen * 100 + total / 2) / total;
        Some(u8::try_from(pct.min(100)).unwrap_or(100))
    }

    #[must_use]
    pub fn into_records(self) -> Vec<CatalogRecord> {
        self.records
    }
}

/// Turns a completed fetch into the dataset the view shows.
#[must_use]
pub fn resolve_dataset(records: Vec<CatalogRecord>, policy: EmptyTablePolicy) -> Dataset {
    if records.is_empty() && policy == EmptyTablePolicy::UseFallback {
        Dataset::fallback(FallbackReason::EmptyRemote)
    } else {
        Dataset::remote(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Seed,
}

impl MutationKind {
    #[must_use]
    pub const fn success_message(self) -> &'static str {
        match self {
            Self::Create => "Record added",
            Self::Update => "Record updated",
            Self::Delete => "Record deleted",
            Self::Seed => "Bundled data uploaded",
        }
    }

    #[must_use]
    pub const fn failure_prefix(self) -> &'static str {
        match self {
            Self::Create => "Add failed",
            Self::Update => "Update failed",
            Self::Delete => "Delete failed",
            Self::Seed => "Upload failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum MutationState {
    #[default]
    Idle,
    InFlight(MutationKind),
    /// Remote accepted the write; a re-fetch follows.
    Applied(MutationKind),
    /// Refused locally before any network call.
    Rejected(MutationKind),
    /// Remote error, or a write that affected no rows.
    Failed(MutationKind),
}

impl MutationState {
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::InFlight(_))
    }

    /// Records a write refused before any network call. A write already in
    /// flight keeps its state until its own completion arrives.
    pub fn reject(&mut self, kind: MutationKind) {
        if !self.is_in_flight() {
            *self = Self::Rejected(kind);
        }
    }
}

pub fn insert_operation(drafts: &[RecordDraft]) -> Result<RemoteOperation, AppError> {
    if drafts.is_empty() {
        return Err(AppError::validation("Nothing to insert"));
    }
    let drafts = drafts
        .iter()
        .map(RecordDraft::validated)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RemoteOperation::Insert { drafts })
}

pub fn update_operation(
    id: Option<&RecordId>,
    draft: &RecordDraft,
) -> Result<RemoteOperation, AppError> {
    let id = id.ok_or_else(|| AppError::validation("Cannot update a record without an id"))?;
    Ok(RemoteOperation::Update {
        id: id.clone(),
        draft: draft.validated()?,
    })
}

/// Local-only records have nowhere to be deleted from; refuse before any
/// network call.
pub fn delete_operation(record: &CatalogRecord) -> Result<RemoteOperation, AppError> {
    match &record.id {
        Some(id) => Ok(RemoteOperation::Delete { id: id.clone() }),
        None => Err(AppError::validation(
            "Cannot delete a local-only record. Upload it to the cloud first.",
        )),
    }
}

/// Interprets a write's response, returning the number of affected rows.
///
/// The table echoes affected rows back, so an empty echo means nothing
/// changed: an update found no row, and any other write was filtered out by
/// row-level security.
pub fn classify_mutation(kind: MutationKind, result: RemoteResult) -> Result<usize, AppError> {
    match result? {
        RemoteOutput::Rows(rows) if rows.is_empty() => Err(match kind {
            MutationKind::Update => AppError::not_found("The record no longer exists"),
            MutationKind::Delete | MutationKind::Create | MutationKind::Seed => {
                AppError::access_denied("no rows were affected").with_hint(ROW_POLICY_HINT)
            }
        }),
        RemoteOutput::Rows(rows) => Ok(rows.len()),
        RemoteOutput::Page(_) => Err(AppError::new(
            ErrorKind::Internal,
            "Unexpected response to a write",
        )),
    }
}
