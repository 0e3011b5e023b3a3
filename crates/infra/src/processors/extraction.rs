//! Extraction: fetch each discovered message, ask the model, store payments.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use inboxpay_ai::MessageContent;
use inboxpay_core::{AccountId, ExtractionJob, ExtractionJobId, ExtractionJobStatus, Payment};

use crate::credentials::CredentialResolver;
use crate::external::{ExtractionOracle, MessageSource};
use crate::store::{JobQueue, PaymentStore, PipelineStore};

/// Counts from one extraction batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub completed: usize,
    pub failed: usize,
    pub payments: usize,
}

impl ExtractionSummary {
    fn absorb(&mut self, other: ExtractionSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.payments += other.payments;
    }
}

pub struct ExtractionProcessor<S> {
    store: Arc<S>,
    credentials: Arc<CredentialResolver<S>>,
    source: Arc<dyn MessageSource>,
    oracle: Arc<dyn ExtractionOracle>,
}

impl<S: PipelineStore> ExtractionProcessor<S> {
    pub fn new(
        store: Arc<S>,
        credentials: Arc<CredentialResolver<S>>,
        source: Arc<dyn MessageSource>,
        oracle: Arc<dyn ExtractionOracle>,
    ) -> Self {
        Self {
            store,
            credentials,
            source,
            oracle,
        }
    }

    /// Process a batch that may span several accounts.
    ///
    /// Every job ends `completed` or `failed`; a failure in one account never
    /// touches the jobs of another.
    pub async fn process_batch(&self, jobs: &[ExtractionJob], now: DateTime<Utc>) -> ExtractionSummary {
        let mut by_account: BTreeMap<AccountId, Vec<&ExtractionJob>> = BTreeMap::new();
        for job in jobs {
            by_account.entry(job.account_id).or_default().push(job);
        }

        let mut summary = ExtractionSummary::default();
        for (account_id, account_jobs) in by_account {
            summary.absorb(self.process_account(account_id, &account_jobs, now).await);
        }

        info!(
            jobs = jobs.len(),
            completed = summary.completed,
            failed = summary.failed,
            payments = summary.payments,
            "extraction batch processed"
        );
        summary
    }

    async fn process_account(
        &self,
        account_id: AccountId,
        jobs: &[&ExtractionJob],
        now: DateTime<Utc>,
    ) -> ExtractionSummary {
        let mut summary = ExtractionSummary::default();

        let access_token = match self.credentials.resolve(account_id, now).await {
            Ok(token) => token,
            Err(err) => {
                warn!(account_id = %account_id, error = %err, jobs = jobs.len(), "cannot resolve credentials");
                let message = err.to_string();
                for job in jobs {
                    self.settle(job.id, ExtractionJobStatus::Failed, Some(message.clone()), now, &mut summary)
                        .await;
                }
                return summary;
            }
        };

        let mut fetched: Vec<(&ExtractionJob, MessageContent)> = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.source.fetch_message(&access_token, &job.message_id).await {
                Ok(content) => fetched.push((*job, content)),
                Err(err) => {
                    warn!(job_id = %job.id, message_id = %job.message_id, error = %err, "message fetch failed");
                    self.settle(
                        job.id,
                        ExtractionJobStatus::Failed,
                        Some(format!("failed to fetch message: {err}")),
                        now,
                        &mut summary,
                    )
                    .await;
                }
            }
        }
        if fetched.is_empty() {
            return summary;
        }

        let contents: Vec<MessageContent> = fetched.iter().map(|(_, content)| content.clone()).collect();
        let outcomes = match self.oracle.extract_batch(&contents).await {
            Ok(outcomes) if outcomes.len() == contents.len() => outcomes,
            Ok(outcomes) => {
                let message = format!(
                    "extraction failed: expected {} results, got {}",
                    contents.len(),
                    outcomes.len()
                );
                self.fail_all(&fetched, &message, now, &mut summary).await;
                return summary;
            }
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "extraction oracle failed");
                self.fail_all(&fetched, &format!("extraction failed: {err}"), now, &mut summary)
                    .await;
                return summary;
            }
        };

        let mut payments: Vec<(ExtractionJobId, Payment)> = Vec::new();
        for ((job, _), outcome) in fetched.iter().zip(outcomes) {
            match outcome.candidate.map(|candidate| candidate.validate()) {
                Some(Ok(validated)) => {
                    payments.push((job.id, validated.into_payment(account_id, outcome.raw_response, now)));
                }
                Some(Err(rejection)) => {
                    debug!(job_id = %job.id, reason = %rejection, "candidate rejected, no payment");
                }
                None => debug!(job_id = %job.id, "no payment in message"),
            }
            self.settle(job.id, ExtractionJobStatus::Completed, None, now, &mut summary)
                .await;
        }

        if payments.is_empty() {
            return summary;
        }

        let rows: Vec<Payment> = payments.iter().map(|(_, payment)| payment.clone()).collect();
        match PaymentStore::bulk_create_payments(&*self.store, &rows).await {
            Ok(count) => {
                summary.payments += count;
                info!(account_id = %account_id, payments = count, "payments stored");
            }
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "payment write failed, jobs will be retried");
                let message = format!("failed to store payments: {err}");
                for (job_id, _) in &payments {
                    summary.completed = summary.completed.saturating_sub(1);
                    self.settle(*job_id, ExtractionJobStatus::Failed, Some(message.clone()), now, &mut summary)
                        .await;
                }
            }
        }

        summary
    }

    async fn fail_all(
        &self,
        fetched: &[(&ExtractionJob, MessageContent)],
        message: &str,
        now: DateTime<Utc>,
        summary: &mut ExtractionSummary,
    ) {
        for (job, _) in fetched {
            self.settle(job.id, ExtractionJobStatus::Failed, Some(message.to_string()), now, summary)
                .await;
        }
    }

    /// Record a job's outcome. A failed write leaves the job in `processing`
    /// for the stuck sweep.
    async fn settle(
        &self,
        id: ExtractionJobId,
        status: ExtractionJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
        summary: &mut ExtractionSummary,
    ) {
        match JobQueue::<ExtractionJobStatus>::update_status(&*self.store, id, status, error, now).await {
            Ok(()) => match status {
                ExtractionJobStatus::Completed => summary.completed += 1,
                _ => summary.failed += 1,
            },
            Err(err) => warn!(job_id = %id, status = %status, error = %err, "failed to record job status"),
        }
    }
}
