//! Access-token resolution shared by the discovery and extraction processors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use inboxpay_core::AccountId;

use crate::external::{SourceError, TokenRefresher};
use crate::store::{AccountStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("account not found")]
    AccountNotFound,

    #[error("account missing tokens")]
    MissingTokens,

    #[error("failed to refresh token: {0}")]
    Refresh(SourceError),

    #[error("failed to update tokens: {0}")]
    Persist(StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hands out a usable access token for an account, refreshing it first when
/// it is expired or about to expire.
pub struct CredentialResolver<S: ?Sized> {
    store: Arc<S>,
    refresher: Arc<dyn TokenRefresher>,
    lookahead: chrono::Duration,
}

impl<S: AccountStore + ?Sized> CredentialResolver<S> {
    pub fn new(store: Arc<S>, refresher: Arc<dyn TokenRefresher>, lookahead: chrono::Duration) -> Self {
        Self {
            store,
            refresher,
            lookahead,
        }
    }

    /// Access token for `account_id`, valid for at least the lookahead window.
    ///
    /// A refreshed token is written back before it is returned.
    pub async fn resolve(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(CredentialError::AccountNotFound)?;

        let (Some(access_token), Some(refresh_token)) = (account.access_token.as_deref(), account.refresh_token.as_deref())
        else {
            return Err(CredentialError::MissingTokens);
        };

        if !account.token_expires_within(now, self.lookahead) {
            return Ok(access_token.to_string());
        }

        debug!(account_id = %account_id, "access token expired, refreshing");
        let refreshed = self
            .refresher
            .refresh(refresh_token)
            .await
            .map_err(CredentialError::Refresh)?;

        let refresh_token = refreshed.refresh_token.as_deref().unwrap_or(refresh_token);
        self.store
            .update_tokens(account_id, &refreshed.access_token, refresh_token, refreshed.expires_at, now)
            .await
            .map_err(CredentialError::Persist)?;

        info!(account_id = %account_id, expires_at = %refreshed.expires_at, "access token refreshed");
        Ok(refreshed.access_token)
    }
}
