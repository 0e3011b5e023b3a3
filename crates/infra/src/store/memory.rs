//! In-memory store for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use inboxpay_core::{
    Account, AccountId, AccountJob, AccountJobId, AccountJobStatus, DiscoveryJob, DiscoveryJobId,
    DiscoveryJobStatus, ExtractionJob, ExtractionJobId, ExtractionJobStatus, JobRecord, Payment,
    SyncMode,
};

use super::{AccountStore, JobQueue, JobStore, PaymentStore, StoreError};

/// In-memory implementation of every store trait.
///
/// Mirrors the Postgres semantics, including unique account jobs, unique
/// message identifiers and all-or-nothing payment batches.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    account_jobs: RwLock<HashMap<AccountJobId, AccountJob>>,
    discovery_jobs: RwLock<HashMap<DiscoveryJobId, DiscoveryJob>>,
    extraction_jobs: RwLock<HashMap<ExtractionJobId, ExtractionJob>>,
    payments: RwLock<Vec<Payment>>,
    reject_payment_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or replace an account row.
    pub fn put_account(&self, account: Account) -> Result<(), StoreError> {
        write(&self.accounts)?.insert(account.id, account);
        Ok(())
    }

    /// Make every subsequent payment batch fail with a storage error.
    pub fn reject_payment_writes(&self, reject: bool) {
        self.reject_payment_writes.store(reject, Ordering::SeqCst);
    }

    pub fn account_job_count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.account_jobs)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Storage("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Storage("in-memory store lock poisoned".to_string()))
}

fn list_due_in<J: JobRecord>(
    jobs: &HashMap<J::Id, J>,
    status: J::Status,
    limit: usize,
) -> Vec<J> {
    let mut due: Vec<J> = jobs
        .values()
        .filter(|job| job.status() == status)
        .cloned()
        .collect();
    due.sort_by(|a, b| {
        a.fairness_key()
            .cmp(&b.fairness_key())
            .then_with(|| a.id().cmp(&b.id()))
    });
    due.truncate(limit);
    due
}

fn update_status_in<J: JobRecord>(
    jobs: &mut HashMap<J::Id, J>,
    id: J::Id,
    status: J::Status,
    error: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let job = jobs
        .get_mut(&id)
        .ok_or_else(|| StoreError::job_not_found(J::KIND, id))?;
    job.apply_status(status, error, now);
    Ok(())
}

fn increment_attempts_in<J: JobRecord>(
    jobs: &mut HashMap<J::Id, J>,
    id: J::Id,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let job = jobs
        .get_mut(&id)
        .ok_or_else(|| StoreError::job_not_found(J::KIND, id))?;
    job.bump_attempts(now);
    Ok(())
}

fn sorted_by_creation<J: JobRecord>(mut jobs: Vec<J>) -> Vec<J> {
    jobs.sort_by_key(|job| (job.fairness_key().1, job.id()));
    jobs
}

#[async_trait]
impl JobQueue<AccountJobStatus> for InMemoryStore {
    type Job = AccountJob;

    async fn list_due(&self, status: AccountJobStatus, limit: usize) -> Result<Vec<AccountJob>, StoreError> {
        Ok(list_due_in(&*read(&self.account_jobs)?, status, limit))
    }

    async fn update_status(
        &self,
        id: AccountJobId,
        status: AccountJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        update_status_in(&mut *write(&self.account_jobs)?, id, status, error, now)
    }

    async fn increment_attempts(&self, id: AccountJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        increment_attempts_in(&mut *write(&self.account_jobs)?, id, now)
    }
}

#[async_trait]
impl JobQueue<DiscoveryJobStatus> for InMemoryStore {
    type Job = DiscoveryJob;

    async fn list_due(&self, status: DiscoveryJobStatus, limit: usize) -> Result<Vec<DiscoveryJob>, StoreError> {
        Ok(list_due_in(&*read(&self.discovery_jobs)?, status, limit))
    }

    async fn update_status(
        &self,
        id: DiscoveryJobId,
        status: DiscoveryJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        update_status_in(&mut *write(&self.discovery_jobs)?, id, status, error, now)
    }

    async fn increment_attempts(&self, id: DiscoveryJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        increment_attempts_in(&mut *write(&self.discovery_jobs)?, id, now)
    }
}

#[async_trait]
impl JobQueue<ExtractionJobStatus> for InMemoryStore {
    type Job = ExtractionJob;

    async fn list_due(&self, status: ExtractionJobStatus, limit: usize) -> Result<Vec<ExtractionJob>, StoreError> {
        Ok(list_due_in(&*read(&self.extraction_jobs)?, status, limit))
    }

    async fn update_status(
        &self,
        id: ExtractionJobId,
        status: ExtractionJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        update_status_in(&mut *write(&self.extraction_jobs)?, id, status, error, now)
    }

    async fn increment_attempts(&self, id: ExtractionJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        increment_attempts_in(&mut *write(&self.extraction_jobs)?, id, now)
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn enqueue_account_job(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<AccountJob, StoreError> {
        let mut jobs = write(&self.account_jobs)?;
        if let Some(existing) = jobs.values_mut().find(|job| job.account_id == account_id) {
            existing.reset(now);
            return Ok(existing.clone());
        }
        let job = AccountJob::new(account_id, now);
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_account_job(&self, account_id: AccountId) -> Result<Option<AccountJob>, StoreError> {
        Ok(read(&self.account_jobs)?
            .values()
            .find(|job| job.account_id == account_id)
            .cloned())
    }

    async fn create_discovery_job(&self, job: &DiscoveryJob) -> Result<(), StoreError> {
        let mut jobs = write(&self.discovery_jobs)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("discovery job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn seed_discovery_job(
        &self,
        account_id: AccountId,
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscoveryJob>, StoreError> {
        let mut jobs = write(&self.discovery_jobs)?;
        let active = jobs
            .values()
            .any(|job| job.account_id == account_id && job.status != DiscoveryJobStatus::Synced);
        if active {
            return Ok(None);
        }
        let job = DiscoveryJob::new(account_id, mode, now);
        jobs.insert(job.id, job.clone());
        Ok(Some(job))
    }

    async fn update_discovery_progress(
        &self,
        id: DiscoveryJobId,
        items_fetched: u32,
        cursor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut jobs = write(&self.discovery_jobs)?;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::job_not_found(DiscoveryJob::KIND, id))?;
        job.record_progress(items_fetched, cursor, now);
        Ok(())
    }

    async fn get_discovery_job(&self, id: DiscoveryJobId) -> Result<Option<DiscoveryJob>, StoreError> {
        Ok(read(&self.discovery_jobs)?.get(&id).cloned())
    }

    async fn list_discovery_jobs(&self, account_id: AccountId) -> Result<Vec<DiscoveryJob>, StoreError> {
        let jobs = read(&self.discovery_jobs)?
            .values()
            .filter(|job| job.account_id == account_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(jobs))
    }

    async fn bulk_create_extraction_jobs(&self, new_jobs: &[ExtractionJob]) -> Result<usize, StoreError> {
        let mut jobs = write(&self.extraction_jobs)?;
        let mut inserted = 0;
        for job in new_jobs {
            let duplicate = jobs.values().any(|existing| existing.message_id == job.message_id);
            if duplicate || jobs.contains_key(&job.id) {
                continue;
            }
            jobs.insert(job.id, job.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_extraction_job(&self, id: ExtractionJobId) -> Result<Option<ExtractionJob>, StoreError> {
        Ok(read(&self.extraction_jobs)?.get(&id).cloned())
    }

    async fn list_extraction_jobs(&self, account_id: AccountId) -> Result<Vec<ExtractionJob>, StoreError> {
        let jobs = read(&self.extraction_jobs)?
            .values()
            .filter(|job| job.account_id == account_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(jobs))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.accounts)?.get(&id).cloned())
    }

    async fn update_tokens(
        &self,
        id: AccountId,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut accounts = write(&self.accounts)?;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.access_token = Some(access_token.to_string());
        account.refresh_token = Some(refresh_token.to_string());
        account.access_token_expires_at = Some(expires_at);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn bulk_create_payments(&self, payments: &[Payment]) -> Result<usize, StoreError> {
        if self.reject_payment_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("payment writes rejected".to_string()));
        }
        let mut stored = write(&self.payments)?;
        stored.extend_from_slice(payments);
        Ok(payments.len())
    }

    async fn list_payments(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = read(&self.payments)?
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn insert_discovery(store: &InMemoryStore, job: DiscoveryJob) {
        write(&store.discovery_jobs).unwrap().insert(job.id, job);
    }

    #[tokio::test]
    async fn enqueue_account_job_is_an_upsert() {
        let store = InMemoryStore::new();
        let account_id = AccountId::new();

        let first = store.enqueue_account_job(account_id, at(0)).await.unwrap();
        store
            .update_status(first.id, AccountJobStatus::Failed, Some("missing token".into()), at(1))
            .await
            .unwrap();

        let again = store.enqueue_account_job(account_id, at(2)).await.unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.status, AccountJobStatus::Pending);
        assert_eq!(again.last_error, None);
        assert_eq!(again.processed_at, None);
        assert_eq!(store.account_job_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn bulk_create_skips_duplicate_message_ids() {
        let store = InMemoryStore::new();
        let account_id = AccountId::new();
        let batch = vec![
            ExtractionJob::new(account_id, "a", at(0)),
            ExtractionJob::new(account_id, "b", at(0)),
            ExtractionJob::new(account_id, "a", at(0)),
        ];

        assert_eq!(store.bulk_create_extraction_jobs(&batch).await.unwrap(), 2);

        let rerun = vec![
            ExtractionJob::new(account_id, "b", at(5)),
            ExtractionJob::new(account_id, "c", at(5)),
        ];
        assert_eq!(store.bulk_create_extraction_jobs(&rerun).await.unwrap(), 1);

        let ids: Vec<String> = store
            .list_extraction_jobs(account_id)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.message_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn seed_discovery_job_skips_accounts_with_active_job() {
        let store = InMemoryStore::new();
        let account_id = AccountId::new();

        let seeded = store
            .seed_discovery_job(account_id, SyncMode::Initial, at(0))
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .seed_discovery_job(account_id, SyncMode::Initial, at(1))
            .await
            .unwrap()
            .is_none());

        store
            .update_status(seeded.id, DiscoveryJobStatus::Synced, None, at(2))
            .await
            .unwrap();
        assert!(store
            .seed_discovery_job(account_id, SyncMode::Incremental, at(3))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn extraction_status_update_moves_job_to_back_of_queue() {
        let store = InMemoryStore::new();
        let account_id = AccountId::new();
        let first = ExtractionJob::new(account_id, "first", at(0));
        let second = ExtractionJob::new(account_id, "second", at(1));
        store
            .bulk_create_extraction_jobs(&[first.clone(), second.clone()])
            .await
            .unwrap();

        store
            .update_status(first.id, ExtractionJobStatus::Pending, None, at(10))
            .await
            .unwrap();

        let due = store.list_due(ExtractionJobStatus::Pending, 10).await.unwrap();
        let order: Vec<_> = due.iter().map(|job| job.message_id.as_str()).collect();
        assert_eq!(order, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn unknown_job_update_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_status(DiscoveryJobId::new(), DiscoveryJobStatus::Failed, None, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "discovery job", .. }));
    }

    #[tokio::test]
    async fn update_tokens_writes_back_credentials() {
        let store = InMemoryStore::new();
        let account = Account::new(AccountId::new()).with_tokens("old", "refresh", None);
        store.put_account(account.clone()).unwrap();

        store
            .update_tokens(account.id, "new", "refresh-2", at(3600), at(0))
            .await
            .unwrap();

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(stored.access_token_expires_at, Some(at(3600)));
    }

    proptest! {
        // Null fairness timestamps come first in creation order, then the
        // serviced jobs by ascending timestamp, whatever the insertion order.
        #[test]
        fn due_set_is_fairness_ordered(
            never_serviced in prop::collection::vec(0i64..10_000, 0..8),
            serviced in prop::collection::btree_set(0i64..10_000, 0..8),
            seed in any::<u64>(),
        ) {
            let store = InMemoryStore::new();
            let account_id = AccountId::new();
            let mut jobs = Vec::new();

            for (i, created) in never_serviced.iter().enumerate() {
                jobs.push(DiscoveryJob::initial(account_id, at(*created * 100 + i as i64)));
            }
            for synced in &serviced {
                let mut job = DiscoveryJob::initial(account_id, at(0));
                job.last_synced_at = Some(at(1_000_000 + synced));
                jobs.push(job);
            }

            let mut shuffled = jobs.clone();
            let len = shuffled.len();
            if len > 1 {
                shuffled.rotate_left((seed as usize) % len);
            }
            for job in shuffled {
                insert_discovery(&store, job);
            }

            let limit = jobs.len();
            let due = block_on(JobQueue::<DiscoveryJobStatus>::list_due(
                &store,
                DiscoveryJobStatus::Pending,
                limit,
            ))
            .unwrap();

            let nulls: Vec<_> = due.iter().take_while(|j| j.last_synced_at.is_none()).collect();
            prop_assert_eq!(nulls.len(), never_serviced.len());
            prop_assert!(nulls.windows(2).all(|w| w[0].created_at <= w[1].created_at));

            let stamped: Vec<_> = due[nulls.len()..].iter().map(|j| j.last_synced_at).collect();
            prop_assert!(stamped.iter().all(|t| t.is_some()));
            prop_assert!(stamped.windows(2).all(|w| w[0] < w[1]));
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[tokio::test]
    async fn list_due_respects_limit() {
        let store = InMemoryStore::new();
        let account_id = AccountId::new();
        for i in 0..5 {
            insert_discovery(&store, DiscoveryJob::initial(account_id, at(0) + Duration::seconds(i)));
        }
        let due = store.list_due(DiscoveryJobStatus::Pending, 2).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].created_at, at(0));
    }
}
