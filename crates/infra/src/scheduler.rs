//! The polling loop that moves jobs through the pipeline.
//!
//! ## Tick
//!
//! Each tick sweeps the three job kinds in pipeline order (account,
//! discovery, extraction). A sweep:
//!
//! 1. reads the pending, failed and processing due-sets, each bounded by the
//!    kind's batch size and fairness-ordered by the store
//! 2. concatenates them in that order (discovery keeps only the head)
//! 3. marks every selected job `processing` and bumps its attempts before any
//!    work, so a crash leaves the job visible to the next processing sweep
//! 4. dispatches to the processor and records the outcome
//!
//! The scheduler holds no state between ticks; everything lives in the store.
//! Retries are unbounded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inboxpay_core::{
    AccountJobStatus, DiscoveryJobStatus, ExtractionJobStatus, JobKind, JobRecord, JobStatus,
};

use crate::config::PipelineConfig;
use crate::credentials::CredentialResolver;
use crate::external::{ExtractionOracle, MessageSource, TokenRefresher};
use crate::processors::{AccountProcessor, DiscoveryProcessor, ExtractionProcessor};
use crate::store::{JobQueue, PipelineStore, StoreError};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// Selected jobs left in `processing` with more work to do.
    pub in_progress: usize,
}

/// Outcome counts of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accounts: SweepReport,
    pub discovery: SweepReport,
    pub extraction: SweepReport,
    pub payments: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.accounts.selected == 0 && self.discovery.selected == 0 && self.extraction.selected == 0
    }
}

pub struct Scheduler<S> {
    store: Arc<S>,
    config: PipelineConfig,
    accounts: AccountProcessor<S>,
    discovery: DiscoveryProcessor<S>,
    extraction: ExtractionProcessor<S>,
}

/// Pending, then failed, then processing jobs of one kind.
async fn collect_due<St, Q>(store: &Q, limit: usize) -> Result<Vec<Q::Job>, StoreError>
where
    St: JobStatus,
    Q: JobQueue<St>,
{
    let mut due = Vec::new();
    for status in St::DUE {
        due.extend(store.list_due(status, limit).await?);
    }
    Ok(due)
}

/// Mark jobs `processing` and count the attempt, in the store and in the
/// local snapshots. Write failures are logged; the job is still processed.
async fn mark_in_flight<St, Q>(store: &Q, jobs: &mut [Q::Job], now: DateTime<Utc>)
where
    St: JobStatus,
    Q: JobQueue<St>,
{
    let kind = <Q::Job as JobRecord>::KIND;
    for job in jobs.iter_mut() {
        let id = job.id();
        if let Err(err) = store.update_status(id, St::PROCESSING, None, now).await {
            warn!(kind = %kind, job_id = %id, error = %err, "failed to mark job processing");
        }
        if let Err(err) = store.increment_attempts(id, now).await {
            warn!(kind = %kind, job_id = %id, error = %err, "failed to increment attempts");
        }
        job.apply_status(St::PROCESSING, None, now);
        job.bump_attempts(now);
    }
}

/// Record a settled status; returns whether the write went through.
async fn settle<St, Q>(
    store: &Q,
    id: <Q::Job as JobRecord>::Id,
    status: St,
    error: Option<String>,
    now: DateTime<Utc>,
) -> bool
where
    St: JobStatus,
    Q: JobQueue<St>,
{
    match store.update_status(id, status, error, now).await {
        Ok(()) => true,
        Err(err) => {
            let kind = <Q::Job as JobRecord>::KIND;
            warn!(kind = %kind, job_id = %id, status = %status, error = %err, "failed to record job status");
            false
        }
    }
}

impl<S: PipelineStore> Scheduler<S> {
    pub fn new(
        store: Arc<S>,
        refresher: Arc<dyn TokenRefresher>,
        source: Arc<dyn MessageSource>,
        oracle: Arc<dyn ExtractionOracle>,
        config: PipelineConfig,
    ) -> Self {
        let credentials = Arc::new(CredentialResolver::new(
            store.clone(),
            refresher,
            config.token_refresh_lookahead,
        ));
        Self {
            accounts: AccountProcessor::new(store.clone()),
            discovery: DiscoveryProcessor::new(store.clone(), credentials.clone(), source.clone(), &config),
            extraction: ExtractionProcessor::new(store.clone(), credentials, source, oracle),
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tick immediately, then every `poll_interval` until `cancel` fires.
    ///
    /// A tick already running when `cancel` fires is completed.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(poll_interval = ?self.config.poll_interval, "scheduler started");

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Run one sweep of every job kind.
    ///
    /// A failing sweep is logged and does not stop the sweeps after it.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.sweep_accounts(now).await {
            Ok(sweep) => report.accounts = sweep,
            Err(err) => error!(kind = %JobKind::Account, error = %err, "sweep failed"),
        }
        match self.sweep_discovery(now).await {
            Ok(sweep) => report.discovery = sweep,
            Err(err) => error!(kind = %JobKind::Discovery, error = %err, "sweep failed"),
        }
        match self.sweep_extraction(now).await {
            Ok((sweep, payments)) => {
                report.extraction = sweep;
                report.payments = payments;
            }
            Err(err) => error!(kind = %JobKind::Extraction, error = %err, "sweep failed"),
        }

        if report.is_idle() {
            debug!("tick idle");
        }
        report
    }

    async fn sweep_accounts(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let store = &*self.store;
        let mut jobs = collect_due::<AccountJobStatus, _>(store, self.config.account_batch_size).await?;
        if jobs.is_empty() {
            return Ok(SweepReport::default());
        }
        mark_in_flight::<AccountJobStatus, _>(store, &mut jobs, now).await;

        let mut report = SweepReport {
            selected: jobs.len(),
            ..Default::default()
        };
        for job in &jobs {
            match self.accounts.process(job, now).await {
                Ok(_) => {
                    if settle::<AccountJobStatus, _>(store, job.id, AccountJobStatus::Completed, None, now).await {
                        report.completed += 1;
                    }
                }
                Err(err) => {
                    warn!(job_id = %job.id, account_id = %job.account_id, attempts = job.attempts, error = %err, "account setup failed");
                    if settle::<AccountJobStatus, _>(store, job.id, AccountJobStatus::Failed, Some(err.to_string()), now).await {
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            kind = %JobKind::Account,
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    async fn sweep_discovery(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let store = &*self.store;
        let due = collect_due::<DiscoveryJobStatus, _>(store, self.config.discovery_batch_size).await?;
        // One account at a time bounds memory and provider load.
        let Some(job) = due.into_iter().next() else {
            return Ok(SweepReport::default());
        };
        let mut jobs = [job];
        mark_in_flight::<DiscoveryJobStatus, _>(store, &mut jobs, now).await;
        let [job] = jobs;

        debug!(
            job_id = %job.id,
            account_id = %job.account_id,
            attempts = job.attempts,
            items_fetched = job.items_fetched,
            "discovery job selected"
        );

        let mut report = SweepReport {
            selected: 1,
            ..Default::default()
        };
        match self.discovery.process(&job, now).await {
            Ok(snapshot) if self.discovery.is_exhausted(&snapshot) => {
                if settle::<DiscoveryJobStatus, _>(store, job.id, DiscoveryJobStatus::Synced, None, now).await {
                    report.completed += 1;
                    info!(job_id = %job.id, account_id = %job.account_id, items_fetched = snapshot.items_fetched, "discovery synced");
                }
            }
            Ok(_) => report.in_progress += 1,
            Err(err) => {
                warn!(job_id = %job.id, account_id = %job.account_id, attempts = job.attempts, error = %err, "discovery failed");
                if settle::<DiscoveryJobStatus, _>(store, job.id, DiscoveryJobStatus::Failed, Some(err.to_string()), now).await {
                    report.failed += 1;
                }
            }
        }

        info!(
            kind = %JobKind::Discovery,
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            in_progress = report.in_progress,
            "sweep finished"
        );
        Ok(report)
    }

    async fn sweep_extraction(&self, now: DateTime<Utc>) -> Result<(SweepReport, usize), StoreError> {
        let store = &*self.store;
        let mut jobs = collect_due::<ExtractionJobStatus, _>(store, self.config.extraction_batch_size).await?;
        if jobs.is_empty() {
            return Ok((SweepReport::default(), 0));
        }
        mark_in_flight::<ExtractionJobStatus, _>(store, &mut jobs, now).await;

        let summary = self.extraction.process_batch(&jobs, now).await;
        let report = SweepReport {
            selected: jobs.len(),
            completed: summary.completed,
            failed: summary.failed,
            in_progress: 0,
        };

        info!(
            kind = %JobKind::Extraction,
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            payments = summary.payments,
            "sweep finished"
        );
        Ok((report, summary.payments))
    }
}
