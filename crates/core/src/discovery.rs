//! Message discovery jobs.
//!
//! A discovery job pages through one account's mailbox, turning message
//! identifiers into extraction jobs. It stays `processing` between pages and
//! moves to `synced` once the provider reports no further page or the
//! per-account cap is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, DiscoveryJobId};
use crate::job::{FairnessKey, JobKind, JobRecord, JobStatus, impl_tag_enum};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryJobStatus {
    Pending,
    Processing,
    /// Historical backfill is done; the account awaits live updates.
    Synced,
    Failed,
}

impl_tag_enum!(DiscoveryJobStatus, "discovery job status", {
    Pending => "pending",
    Processing => "processing",
    Synced => "synced",
    Failed => "failed",
});

impl JobStatus for DiscoveryJobStatus {
    const PENDING: Self = Self::Pending;
    const PROCESSING: Self = Self::Processing;
    const FAILED: Self = Self::Failed;

    fn is_settled(&self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }
}

/// Which slice of the mailbox a discovery job walks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Historical backfill over a fixed window back from now.
    Initial,
    /// Catch-up since the job's last progress.
    Incremental,
    /// Push-triggered sync.
    Webhook,
}

impl_tag_enum!(SyncMode, "sync mode", {
    Initial => "initial",
    Incremental => "incremental",
    Webhook => "webhook",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: DiscoveryJobId,
    pub account_id: AccountId,
    pub status: DiscoveryJobStatus,
    pub sync_mode: SyncMode,
    pub items_fetched: u32,
    /// Provider page token; only meaningful while pending or processing.
    pub cursor: Option<String>,
    /// Fairness timestamp. `None` means never serviced.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DiscoveryJob {
    pub fn new(account_id: AccountId, sync_mode: SyncMode, now: DateTime<Utc>) -> Self {
        Self {
            id: DiscoveryJobId::new(),
            account_id,
            status: DiscoveryJobStatus::Pending,
            sync_mode,
            items_fetched: 0,
            cursor: None,
            last_synced_at: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn initial(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self::new(account_id, SyncMode::Initial, now)
    }

    /// Record a fetched page. Refreshes the fairness timestamp.
    pub fn record_progress(&mut self, items_fetched: u32, cursor: Option<String>, now: DateTime<Utc>) {
        self.items_fetched = items_fetched;
        self.cursor = cursor;
        self.last_synced_at = Some(now);
        self.updated_at = now;
    }

    pub fn has_more_pages(&self) -> bool {
        self.cursor.is_some()
    }
}

impl JobRecord for DiscoveryJob {
    type Id = DiscoveryJobId;
    type Status = DiscoveryJobStatus;

    const KIND: JobKind = JobKind::Discovery;

    fn id(&self) -> DiscoveryJobId {
        self.id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn status(&self) -> DiscoveryJobStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn fairness_key(&self) -> FairnessKey {
        (self.last_synced_at, self.created_at)
    }

    fn apply_status(&mut self, status: DiscoveryJobStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.last_error = error;
        self.updated_at = now;
        self.processed_at = status.is_settled().then_some(now);
    }

    fn bump_attempts(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.updated_at = now;
    }
}
