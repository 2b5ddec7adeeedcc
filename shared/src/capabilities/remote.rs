use async_trait::async_trait;
use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::catalog::{RecordDraft, RecordId, RemoteRow};
use crate::error::AppError;

/// Reads and writes rows of the catalog table. The shell resolves each
/// request against a [`RemoteTable`].
pub struct Remote<Ev> {
    context: CapabilityContext<RemoteOperation, Ev>,
}

impl<Ev> Capability<Ev> for Remote<Ev> {
    type Operation = RemoteOperation;
    type MappedSelf<MappedEv> = Remote<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Remote::new(self.context.map_event(f))
    }
}

impl<Ev> Remote<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<RemoteOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn execute<F>(&self, operation: RemoteOperation, make_event: F)
    where
        F: FnOnce(RemoteResult) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await;
            ctx.update_app(make_event(result));
        });
    }
}

/// Inclusive row window, as used by the HTTP `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub from: usize,
    pub to: usize,
}

impl PageRange {
    #[must_use]
    pub fn new(offset: usize, size: usize) -> Self {
        Self {
            from: offset,
            to: offset + size.max(1) - 1,
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.to - self.from + 1
    }

    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{}-{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub rows: Vec<RemoteRow>,
    /// Exact row count of the whole table, when the server reported one.
    pub total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteOperation {
    FetchPage { range: PageRange },
    Insert { drafts: Vec<RecordDraft> },
    Update { id: RecordId, draft: RecordDraft },
    Delete { id: RecordId },
}

impl RemoteOperation {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FetchPage { .. } => "fetch_page",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteOutput {
    Page(Page),
    /// Rows the server returned for a write.
    Rows(Vec<RemoteRow>),
}

pub type RemoteResult = Result<RemoteOutput, AppError>;

impl Operation for RemoteOperation {
    type Output = RemoteResult;
}

/// A single remote table of catalog rows.
///
/// Writes return the affected rows as the server echoes them back, so callers
/// can tell a silent zero-row write from a successful one.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    async fn fetch_page(&self, range: PageRange) -> Result<Page, AppError>;
    async fn insert(&self, drafts: &[RecordDraft]) -> Result<Vec<RemoteRow>, AppError>;
    async fn update(&self, id: &RecordId, draft: &RecordDraft) -> Result<Vec<RemoteRow>, AppError>;
    async fn delete(&self, id: &RecordId) -> Result<Vec<RemoteRow>, AppError>;

    async fn execute(&self, operation: RemoteOperation) -> RemoteResult {
        match operation {
            RemoteOperation::FetchPage { range } => self.fetch_page(range).await.map(RemoteOutput::Page),
            RemoteOperation::Insert { drafts } => self.insert(&drafts).await.map(RemoteOutput::Rows),
            RemoteOperation::Update { id, draft } => {
                self.update(&id, &draft).await.map(RemoteOutput::Rows)
            }
            RemoteOperation::Delete { id } => self.delete(&id).await.map(RemoteOutput::Rows),
        }
    }
}

/// Stand-in when no backend is configured. The core never issues remote
/// operations in that state; this only guards against it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemote;

impl NoRemote {
    fn missing() -> AppError {
        AppError::configuration_missing("no remote table is configured")
    }
}

#[async_trait]
impl RemoteTable for NoRemote {
    async fn fetch_page(&self, _range: PageRange) -> Result<Page, AppError> {
        Err(Self::missing())
    }

    async fn insert(&self, _drafts: &[RecordDraft]) -> Result<Vec<RemoteRow>, AppError> {
        Err(Self::missing())
    }

    async fn update(&self, _id: &RecordId, _draft: &RecordDraft) -> Result<Vec<RemoteRow>, AppError> {
        Err(Self::missing())
    }

    async fn delete(&self, _id: &RecordId) -> Result<Vec<RemoteRow>, AppError> {
        Err(Self::missing())
    }
}
