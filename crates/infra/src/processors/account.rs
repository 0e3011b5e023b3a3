//! Account setup: validate the connected account, then start discovery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use inboxpay_core::{AccountJob, DiscoveryJob, SyncMode};

use crate::store::{PipelineStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountSetupError {
    #[error("account not found")]
    AccountNotFound,

    #[error("account missing access token")]
    MissingAccessToken,

    #[error("failed to create discovery job: {0}")]
    SeedDiscovery(StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AccountProcessor<S> {
    store: Arc<S>,
}

impl<S: PipelineStore> AccountProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Check the account can be synced and seed its initial discovery job.
    ///
    /// Returns the new discovery job, or `None` when the account already has
    /// one in progress.
    pub async fn process(&self, job: &AccountJob, now: DateTime<Utc>) -> Result<Option<DiscoveryJob>, AccountSetupError> {
        let account = self
            .store
            .get_account(job.account_id)
            .await?
            .ok_or(AccountSetupError::AccountNotFound)?;

        if account.access_token.is_none() {
            return Err(AccountSetupError::MissingAccessToken);
        }

        let seeded = self
            .store
            .seed_discovery_job(job.account_id, SyncMode::Initial, now)
            .await
            .map_err(AccountSetupError::SeedDiscovery)?;

        match &seeded {
            Some(discovery) => info!(
                account_id = %job.account_id,
                discovery_job_id = %discovery.id,
                "account setup complete, initial discovery queued"
            ),
            None => info!(
                account_id = %job.account_id,
                "account setup complete, discovery already in progress"
            ),
        }

        Ok(seeded)
    }
}
