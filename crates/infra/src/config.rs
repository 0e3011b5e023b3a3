//! Pipeline tuning knobs.

use std::time::Duration;

/// Scheduler and processor configuration.
///
/// Defaults match production: a 10 s tick, small per-kind batches, 50
/// message identifiers per discovery page and at most 10 000 messages per
/// account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Delay between scheduler ticks.
    pub poll_interval: Duration,
    /// How long an in-flight tick may run after shutdown was requested.
    pub shutdown_grace: Duration,
    /// Per-status due-set limit for account jobs.
    pub account_batch_size: usize,
    /// Per-status due-set limit for discovery jobs. Only the head is processed.
    pub discovery_batch_size: usize,
    /// Per-status due-set limit for extraction jobs.
    pub extraction_batch_size: usize,
    /// Message identifiers requested per discovery page.
    pub discovery_page_size: u32,
    /// Upper bound on messages discovered per account.
    pub max_messages_per_account: u32,
    /// Look-back window of an initial sync, in days.
    pub initial_sync_days: i64,
    /// Tokens expiring within this window are refreshed before use.
    pub token_refresh_lookahead: chrono::Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            account_batch_size: 5,
            discovery_batch_size: 1,
            extraction_batch_size: 3,
            discovery_page_size: 50,
            max_messages_per_account: 10_000,
            initial_sync_days: 365,
            token_refresh_lookahead: chrono::Duration::minutes(5),
        }
    }
}

impl PipelineConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_extraction_batch_size(mut self, size: usize) -> Self {
        self.extraction_batch_size = size;
        self
    }

    pub fn with_discovery_page_size(mut self, size: u32) -> Self {
        self.discovery_page_size = size;
        self
    }

    pub fn with_max_messages_per_account(mut self, cap: u32) -> Self {
        self.max_messages_per_account = cap;
        self
    }
}
