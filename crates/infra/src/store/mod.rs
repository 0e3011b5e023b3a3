//! Durable state of the pipeline: job queues, account credentials, payments.
//!
//! ## Design
//!
//! - The store is the only shared mutable resource; processors never move a
//!   job forward except through these operations
//! - Every mutation is a narrow per-row write (status, progress, attempts)
//!   or a conflict-skipping bulk insert
//! - Due-set reads are fairness-ordered: never-serviced jobs first, then the
//!   least recently serviced, ties broken by creation time
//!
//! ## Components
//!
//! - [`JobQueue`]: status-keyed read/transition contract shared by all job kinds
//! - [`JobStore`]: the three queues plus kind-specific creation and progress
//! - [`AccountStore`]: credential lookup and refreshed-token write-back
//! - [`PaymentStore`]: batch insert and listing of extracted payments
//! - [`InMemoryStore`] for tests/dev, [`PostgresStore`] for production

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use inboxpay_core::{
    Account, AccountId, AccountJob, AccountJobStatus, DiscoveryJob, DiscoveryJobId,
    DiscoveryJobStatus, ExtractionJob, ExtractionJobId, ExtractionJobStatus, JobKind, JobRecord,
    JobStatus, Payment, SyncMode,
};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn job_not_found(kind: JobKind, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            kind: match kind {
                JobKind::Account => "account job",
                JobKind::Discovery => "discovery job",
                JobKind::Extraction => "extraction job",
            },
            id: id.to_string(),
        }
    }

    pub fn account_not_found(id: AccountId) -> Self {
        Self::NotFound {
            kind: "account",
            id: id.to_string(),
        }
    }
}

/// Read/transition contract of one job kind, keyed by its status type.
///
/// Keying by status lets callers write `store.update_status(id, status, ..)`
/// and have the job kind follow from the status argument.
#[async_trait]
pub trait JobQueue<S: JobStatus>: Send + Sync {
    type Job: JobRecord<Status = S>;

    /// Jobs in `status`, fairness-ordered, at most `limit`.
    async fn list_due(&self, status: S, limit: usize) -> Result<Vec<Self::Job>, StoreError>;

    /// Move a job to `status`, recording `error` (or clearing it).
    ///
    /// Settled statuses stamp `processed_at`; every other status clears it.
    /// Extraction jobs additionally refresh their fairness timestamp.
    async fn update_status(
        &self,
        id: <Self::Job as JobRecord>::Id,
        status: S,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn increment_attempts(
        &self,
        id: <Self::Job as JobRecord>::Id,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// All job queues of the pipeline.
#[async_trait]
pub trait JobStore:
    JobQueue<AccountJobStatus, Job = AccountJob>
    + JobQueue<DiscoveryJobStatus, Job = DiscoveryJob>
    + JobQueue<ExtractionJobStatus, Job = ExtractionJob>
{
    /// Create the account's setup job, or reset an existing one to pending.
    ///
    /// Called when an account is connected or re-authorized; a reset clears
    /// the last error and `processed_at`, restarting the pipeline.
    async fn enqueue_account_job(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<AccountJob, StoreError>;

    async fn get_account_job(&self, account_id: AccountId) -> Result<Option<AccountJob>, StoreError>;

    async fn create_discovery_job(&self, job: &DiscoveryJob) -> Result<(), StoreError>;

    /// Create a discovery job unless the account already has one that has not
    /// reached `synced`. Returns the created job.
    async fn seed_discovery_job(
        &self,
        account_id: AccountId,
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscoveryJob>, StoreError>;

    /// Persist fetched count and next cursor; refreshes the fairness timestamp.
    async fn update_discovery_progress(
        &self,
        id: DiscoveryJobId,
        items_fetched: u32,
        cursor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_discovery_job(&self, id: DiscoveryJobId) -> Result<Option<DiscoveryJob>, StoreError>;

    async fn list_discovery_jobs(&self, account_id: AccountId) -> Result<Vec<DiscoveryJob>, StoreError>;

    /// Insert extraction jobs, silently skipping message identifiers that
    /// already have a job. Returns how many rows were inserted.
    async fn bulk_create_extraction_jobs(&self, jobs: &[ExtractionJob]) -> Result<usize, StoreError>;

    async fn get_extraction_job(&self, id: ExtractionJobId) -> Result<Option<ExtractionJob>, StoreError>;

    async fn list_extraction_jobs(&self, account_id: AccountId) -> Result<Vec<ExtractionJob>, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn update_tokens(
        &self,
        id: AccountId,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert all payments or none.
    async fn bulk_create_payments(&self, payments: &[Payment]) -> Result<usize, StoreError>;

    /// Payments of an account, newest effective date first.
    async fn list_payments(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError>;
}

/// Everything the scheduler and processors need from persistence.
pub trait PipelineStore: JobStore + AccountStore + PaymentStore + 'static {}

impl<T> PipelineStore for T where T: JobStore + AccountStore + PaymentStore + 'static {}
