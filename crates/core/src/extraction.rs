//! Per-message extraction jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, ExtractionJobId};
use crate::job::{FairnessKey, JobKind, JobRecord, JobStatus, impl_tag_enum};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionJobStatus {
    Pending,
    Processing,
    /// A payment was stored, or the message was correctly found to hold none.
    Completed,
    Failed,
}

impl_tag_enum!(ExtractionJobStatus, "extraction job status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl JobStatus for ExtractionJobStatus {
    const PENDING: Self = Self::Pending;
    const PROCESSING: Self = Self::Processing;
    const FAILED: Self = Self::Failed;

    fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One discovered message awaiting extraction. The message identifier is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: ExtractionJobId,
    pub account_id: AccountId,
    pub message_id: String,
    pub status: ExtractionJobStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ExtractionJob {
    pub fn new(account_id: AccountId, message_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ExtractionJobId::new(),
            account_id,
            message_id: message_id.into(),
            status: ExtractionJobStatus::Pending,
            last_synced_at: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}

impl JobRecord for ExtractionJob {
    type Id = ExtractionJobId;
    type Status = ExtractionJobStatus;

    const KIND: JobKind = JobKind::Extraction;

    fn id(&self) -> ExtractionJobId {
        self.id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn status(&self) -> ExtractionJobStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn fairness_key(&self) -> FairnessKey {
        (self.last_synced_at, self.created_at)
    }

    // Every status update moves the job to the back of the round robin.
    fn apply_status(&mut self, status: ExtractionJobStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.last_error = error;
        self.updated_at = now;
        self.last_synced_at = Some(now);
        self.processed_at = status.is_settled().then_some(now);
    }

    fn bump_attempts(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.updated_at = now;
    }
}
