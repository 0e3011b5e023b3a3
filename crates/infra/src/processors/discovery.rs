//! Discovery: page through the mailbox and enqueue one extraction job per message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use inboxpay_core::{DiscoveryJob, ExtractionJob, SyncMode};

use crate::config::PipelineConfig;
use crate::credentials::{CredentialError, CredentialResolver};
use crate::external::{MessageSource, SourceError};
use crate::store::{JobStore, PipelineStore, StoreError};

/// Inbox only, never spam.
pub const BASE_QUERY: &str = "in:inbox -in:spam";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("failed to fetch message ids: {0}")]
    Source(SourceError),

    #[error("failed to create extraction jobs: {0}")]
    EnqueueExtraction(StoreError),

    #[error("failed to update job progress: {0}")]
    Progress(StoreError),
}

/// Provider search query for one discovery job.
///
/// The provider returns newest messages first, so imminent payments are
/// found before old ones.
pub fn build_query(job: &DiscoveryJob, now: DateTime<Utc>, initial_sync_days: i64) -> String {
    let after = match job.sync_mode {
        SyncMode::Initial => Some(now - chrono::Duration::days(initial_sync_days)),
        SyncMode::Incremental => job.last_synced_at,
        SyncMode::Webhook => None,
    };
    match after {
        Some(after) => format!("{BASE_QUERY} after:{}", after.format("%Y/%m/%d")),
        None => BASE_QUERY.to_string(),
    }
}

pub struct DiscoveryProcessor<S> {
    store: Arc<S>,
    credentials: Arc<CredentialResolver<S>>,
    source: Arc<dyn MessageSource>,
    page_size: u32,
    max_messages: u32,
    initial_sync_days: i64,
}

impl<S: PipelineStore> DiscoveryProcessor<S> {
    pub fn new(
        store: Arc<S>,
        credentials: Arc<CredentialResolver<S>>,
        source: Arc<dyn MessageSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            source,
            page_size: config.discovery_page_size,
            max_messages: config.max_messages_per_account,
            initial_sync_days: config.initial_sync_days,
        }
    }

    /// True once the job has nothing left to fetch.
    pub fn is_exhausted(&self, job: &DiscoveryJob) -> bool {
        !job.has_more_pages() || job.items_fetched >= self.max_messages
    }

    /// Fetch one page for `job` and persist the progress.
    ///
    /// Returns the job as it now stands in the store; the caller decides the
    /// next status from it with [`Self::is_exhausted`].
    pub async fn process(&self, job: &DiscoveryJob, now: DateTime<Utc>) -> Result<DiscoveryJob, DiscoveryError> {
        let access_token = self.credentials.resolve(job.account_id, now).await?;

        let remaining = self.max_messages.saturating_sub(job.items_fetched);
        if remaining == 0 {
            info!(
                job_id = %job.id,
                account_id = %job.account_id,
                max_messages = self.max_messages,
                "account reached message cap"
            );
            JobStore::update_discovery_progress(&*self.store, job.id, job.items_fetched, None, now)
                .await
                .map_err(DiscoveryError::Progress)?;
            let mut snapshot = job.clone();
            snapshot.record_progress(job.items_fetched, None, now);
            return Ok(snapshot);
        }
        let page_size = self.page_size.min(remaining);

        let query = build_query(job, now, self.initial_sync_days);
        debug!(job_id = %job.id, query = %query, page_size, cursor = ?job.cursor, "listing message ids");

        let mut page = self
            .source
            .list_message_ids(&access_token, &query, page_size, job.cursor.as_deref())
            .await
            .map_err(DiscoveryError::Source)?;
        page.ids.truncate(page_size as usize);

        if !page.ids.is_empty() {
            let jobs: Vec<ExtractionJob> = page
                .ids
                .iter()
                .map(|message_id| ExtractionJob::new(job.account_id, message_id.clone(), now))
                .collect();
            let inserted = self
                .store
                .bulk_create_extraction_jobs(&jobs)
                .await
                .map_err(DiscoveryError::EnqueueExtraction)?;
            debug!(
                job_id = %job.id,
                discovered = jobs.len(),
                inserted,
                "extraction jobs enqueued"
            );
        }

        // page_size <= remaining, so the sum stays within the cap
        let items_fetched = job.items_fetched + page.ids.len() as u32;
        JobStore::update_discovery_progress(&*self.store, job.id, items_fetched, page.next_cursor.clone(), now)
            .await
            .map_err(DiscoveryError::Progress)?;

        let mut snapshot = job.clone();
        snapshot.record_progress(items_fetched, page.next_cursor, now);

        info!(
            job_id = %job.id,
            account_id = %job.account_id,
            items_fetched,
            has_more = snapshot.has_more_pages(),
            "discovery page processed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::test_support::{FakeMailbox, FakeRefresher, fixed_now};
    use inboxpay_core::{Account, AccountId, ExtractionJobStatus};
    use proptest::prelude::*;

    struct Harness {
        store: Arc<InMemoryStore>,
        mailbox: Arc<FakeMailbox>,
        processor: DiscoveryProcessor<InMemoryStore>,
        account: Account,
    }

    fn harness(mailbox: FakeMailbox, config: PipelineConfig) -> Harness {
        let store = InMemoryStore::arc();
        let account = Account::new(AccountId::new()).with_tokens(
            "access",
            "refresh",
            Some(fixed_now() + chrono::Duration::hours(1)),
        );
        store.put_account(account.clone()).unwrap();
        let mailbox = Arc::new(mailbox);
        let credentials = Arc::new(CredentialResolver::new(
            store.clone(),
            Arc::new(FakeRefresher::ok("new-access", None)),
            config.token_refresh_lookahead,
        ));
        let processor = DiscoveryProcessor::new(store.clone(), credentials, mailbox.clone(), &config);
        Harness {
            store,
            mailbox,
            processor,
            account,
        }
    }

    async fn stored_job(h: &Harness, job: DiscoveryJob) -> DiscoveryJob {
        h.store.create_discovery_job(&job).await.unwrap();
        job
    }

    #[test]
    fn initial_query_looks_back_one_year() {
        let job = DiscoveryJob::initial(AccountId::new(), fixed_now());
        assert_eq!(build_query(&job, fixed_now(), 365), "in:inbox -in:spam after:2024/06/01");
    }

    #[test]
    fn incremental_query_starts_at_last_progress() {
        let mut job = DiscoveryJob::new(AccountId::new(), SyncMode::Incremental, fixed_now());
        assert_eq!(build_query(&job, fixed_now(), 365), BASE_QUERY);

        job.last_synced_at = Some(fixed_now() - chrono::Duration::days(3));
        assert_eq!(build_query(&job, fixed_now(), 365), "in:inbox -in:spam after:2025/05/29");
    }

    #[test]
    fn webhook_query_is_unbounded() {
        let mut job = DiscoveryJob::new(AccountId::new(), SyncMode::Webhook, fixed_now());
        job.last_synced_at = Some(fixed_now());
        assert_eq!(build_query(&job, fixed_now(), 365), BASE_QUERY);
    }

    #[tokio::test]
    async fn last_page_enqueues_messages_and_exhausts_job() {
        let mailbox = FakeMailbox::new().with_page(Some("tok1"), &["a", "b"], None);
        let h = harness(mailbox, PipelineConfig::default());
        let mut job = DiscoveryJob::new(h.account.id, SyncMode::Incremental, fixed_now());
        job.cursor = Some("tok1".into());
        job.items_fetched = 10;
        let job = stored_job(&h, job).await;

        let snapshot = h.processor.process(&job, fixed_now()).await.unwrap();

        assert_eq!(snapshot.items_fetched, 12);
        assert!(snapshot.cursor.is_none());
        assert!(h.processor.is_exhausted(&snapshot));
        assert_eq!(h.store.get_discovery_job(job.id).await.unwrap().unwrap(), snapshot);

        let created = h.store.list_extraction_jobs(h.account.id).await.unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|j| j.status == ExtractionJobStatus::Pending && j.last_synced_at.is_none()));
    }

    #[tokio::test]
    async fn page_with_cursor_keeps_job_open() {
        let mailbox = FakeMailbox::new().with_page(None, &["a", "b", "c"], Some("tok2"));
        let h = harness(mailbox, PipelineConfig::default());
        let job = stored_job(&h, DiscoveryJob::initial(h.account.id, fixed_now())).await;

        let snapshot = h.processor.process(&job, fixed_now()).await.unwrap();

        assert_eq!(snapshot.cursor.as_deref(), Some("tok2"));
        assert_eq!(snapshot.last_synced_at, Some(fixed_now()));
        assert!(!h.processor.is_exhausted(&snapshot));
        let calls = h.mailbox.list_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].access_token, "access");
        assert_eq!(calls[0].page_size, 50);
        assert!(calls[0].query.starts_with("in:inbox -in:spam after:"));
    }

    #[tokio::test]
    async fn rediscovered_messages_are_not_duplicated() {
        let mailbox = FakeMailbox::new()
            .with_page(None, &["a", "b"], Some("tok2"))
            .with_page(Some("tok2"), &["b", "c"], None);
        let h = harness(mailbox, PipelineConfig::default());
        let job = stored_job(&h, DiscoveryJob::initial(h.account.id, fixed_now())).await;

        let first = h.processor.process(&job, fixed_now()).await.unwrap();
        h.processor.process(&first, fixed_now()).await.unwrap();

        assert_eq!(h.store.list_extraction_jobs(h.account.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn page_size_shrinks_to_remaining_capacity() {
        let mailbox = FakeMailbox::new().with_page(Some("tok"), &["a", "b", "c", "d", "e"], Some("more"));
        let h = harness(mailbox, PipelineConfig::default().with_max_messages_per_account(100));
        let mut job = DiscoveryJob::initial(h.account.id, fixed_now());
        job.items_fetched = 97;
        job.cursor = Some("tok".into());
        let job = stored_job(&h, job).await;

        let snapshot = h.processor.process(&job, fixed_now()).await.unwrap();

        assert_eq!(h.mailbox.list_calls()[0].page_size, 3);
        assert_eq!(snapshot.items_fetched, 100);
        assert!(h.processor.is_exhausted(&snapshot));
    }

    #[tokio::test]
    async fn reaching_cap_skips_provider() {
        let h = harness(FakeMailbox::new(), PipelineConfig::default().with_max_messages_per_account(20));
        let mut job = DiscoveryJob::initial(h.account.id, fixed_now());
        job.items_fetched = 20;
        job.cursor = Some("tok".into());
        let job = stored_job(&h, job).await;

        let snapshot = h.processor.process(&job, fixed_now()).await.unwrap();

        assert!(h.mailbox.list_calls().is_empty());
        assert!(h.processor.is_exhausted(&snapshot));
        assert_eq!(snapshot.items_fetched, 20);
        let stored = h.store.get_discovery_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor, None);
        assert_eq!(stored.items_fetched, 20);
        assert_eq!(stored.last_synced_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn provider_failure_is_reported() {
        let mailbox = FakeMailbox::new();
        mailbox.fail_listing(SourceError::Api {
            status: 429,
            body: "slow down".into(),
        });
        let h = harness(mailbox, PipelineConfig::default());
        let job = stored_job(&h, DiscoveryJob::initial(h.account.id, fixed_now())).await;

        let err = h.processor.process(&job, fixed_now()).await.unwrap_err();

        assert!(err.to_string().starts_with("failed to fetch message ids:"));
        let stored = h.store.get_discovery_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.items_fetched, 0);
    }

    #[tokio::test]
    async fn credential_failure_is_reported() {
        let h = harness(FakeMailbox::new(), PipelineConfig::default());
        let mut account = h.account.clone();
        account.refresh_token = None;
        h.store.put_account(account).unwrap();
        let job = stored_job(&h, DiscoveryJob::initial(h.account.id, fixed_now())).await;

        let err = h.processor.process(&job, fixed_now()).await.unwrap_err();

        assert_eq!(err, DiscoveryError::Credential(CredentialError::MissingTokens));
        assert!(h.mailbox.list_calls().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn items_fetched_never_exceeds_cap(
            cap in 1u32..40,
            pages in proptest::collection::vec(0usize..30, 1..6),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let mut mailbox = FakeMailbox::new();
                let mut counter = 0;
                for (i, size) in pages.iter().enumerate() {
                    let ids: Vec<String> = (0..*size).map(|n| format!("m{}", counter + n)).collect();
                    counter += size;
                    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                    let cursor = (i > 0).then(|| format!("p{i}"));
                    let next = (i + 1 < pages.len()).then(|| format!("p{}", i + 1));
                    mailbox = mailbox.with_page(cursor.as_deref(), &ids, next.as_deref());
                }
                let config = PipelineConfig::default()
                    .with_max_messages_per_account(cap)
                    .with_discovery_page_size(10);
                let h = harness(mailbox, config);
                let mut job = stored_job(&h, DiscoveryJob::initial(h.account.id, fixed_now())).await;

                for _ in 0..pages.len() + 1 {
                    let before = job.items_fetched;
                    job = h.processor.process(&job, fixed_now()).await.unwrap();
                    assert!(job.items_fetched >= before);
                    assert!(job.items_fetched <= cap);
                    if h.processor.is_exhausted(&job) {
                        break;
                    }
                }
            });
        }
    }
}
