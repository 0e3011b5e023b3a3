//! Connected accounts and the account setup job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, AccountJobId};
use crate::job::{FairnessKey, JobKind, JobRecord, JobStatus, impl_tag_enum};

/// OAuth credentials of a connected mail account.
///
/// The account row itself is owned by the surrounding product; the pipeline
/// only reads it and writes back refreshed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            access_token: None,
            refresh_token: None,
            access_token_expires_at: None,
        }
    }

    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = Some(refresh_token.into());
        self.access_token_expires_at = expires_at;
        self
    }

    /// True when the access token is past expiry or will be within `lookahead`.
    ///
    /// An unknown expiry counts as expired.
    pub fn token_expires_within(&self, now: DateTime<Utc>, lookahead: Duration) -> bool {
        match self.access_token_expires_at {
            Some(expires_at) => now + lookahead >= expires_at,
            None => true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl_tag_enum!(AccountJobStatus, "account job status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl JobStatus for AccountJobStatus {
    const PENDING: Self = Self::Pending;
    const PROCESSING: Self = Self::Processing;
    const FAILED: Self = Self::Failed;

    fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One-shot setup job, at most one per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountJob {
    pub id: AccountJobId,
    pub account_id: AccountId,
    pub status: AccountJobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl AccountJob {
    pub fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountJobId::new(),
            account_id,
            status: AccountJobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    /// Put the job back to pending after the account was re-authorized.
    ///
    /// This restarts the whole pipeline for the account.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.status = AccountJobStatus::Pending;
        self.last_error = None;
        self.processed_at = None;
        self.updated_at = now;
    }
}

impl JobRecord for AccountJob {
    type Id = AccountJobId;
    type Status = AccountJobStatus;

    const KIND: JobKind = JobKind::Account;

    fn id(&self) -> AccountJobId {
        self.id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn status(&self) -> AccountJobStatus {
        self.status
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    // Account jobs drain in plain creation order.
    fn fairness_key(&self) -> FairnessKey {
        (None, self.created_at)
    }

    fn apply_status(&mut self, status: AccountJobStatus, error: Option<String>, now: DateTime<Utc>) {
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
