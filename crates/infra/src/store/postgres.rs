//! Postgres-backed store implementation.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate account job or payment id |
//! | Database (foreign key violation) | `23503` | `Storage` | Job or payment for an unknown account |
//! | Database (check constraint violation) | `23514` | `Storage` | Negative counter, non-positive amount |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! Rows whose status or mode tag is unknown, or whose counters do not fit the
//! domain types, surface as `StoreError::Corrupt`.
//!
//! ## Fairness ordering
//!
//! Discovery and extraction due-sets are read with
//! `ORDER BY last_synced_at ASC NULLS FIRST, created_at ASC, id ASC`, served
//! by the `(status, last_synced_at, created_at, id)` indexes in the reference
//! schema. The primary key makes the order total, so jobs created by one
//! discovery page come back in the same order on every tick.

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use inboxpay_core::{
    Account, AccountId, AccountJob, AccountJobId, AccountJobStatus, DiscoveryJob, DiscoveryJobId,
    DiscoveryJobStatus, ExtractionJob, ExtractionJobId, ExtractionJobStatus, JobKind, JobStatus,
    Payment, PaymentId, SyncMode,
};

use super::{AccountStore, JobQueue, JobStore, PaymentStore, StoreError};

/// Order of discovery and extraction due-set reads.
macro_rules! fairness_order {
    () => {
        "ORDER BY last_synced_at ASC NULLS FIRST, created_at ASC, id ASC"
    };
}

/// Postgres-backed pipeline store.
///
/// `Send + Sync` and cheap to clone; all operations go through the SQLx pool.
/// Every write touches a single row, except the two bulk inserts which run
/// in one transaction each.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// Create a new PostgresStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn ensure_affected(rows_affected: u64, kind: JobKind, id: impl core::fmt::Display) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::job_not_found(kind, id));
    }
    Ok(())
}

#[async_trait]
impl JobQueue<AccountJobStatus> for PostgresStore {
    type Job = AccountJob;

    #[instrument(skip(self), fields(status = %status), err)]
    async fn list_due(&self, status: AccountJobStatus, limit: usize) -> Result<Vec<AccountJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, status, attempts, last_error, created_at, updated_at, processed_at
            FROM account_jobs
            WHERE status = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(status.as_str())
        .bind(to_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_due_account_jobs", e))?;

        rows.iter().map(account_job_from_row).collect()
    }

    #[instrument(skip(self, error), fields(job_id = %id, status = %status), err)]
    async fn update_status(
        &self,
        id: AccountJobId,
        status: AccountJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE account_jobs
            SET status = $1, last_error = $2, updated_at = $3, processed_at = $4
            WHERE id = $5
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(status.is_settled().then_some(now))
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_account_job_status", e))?;

        ensure_affected(result.rows_affected(), JobKind::Account, id)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn increment_attempts(&self, id: AccountJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE account_jobs
            SET attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_account_job_attempts", e))?;

        ensure_affected(result.rows_affected(), JobKind::Account, id)
    }
}

#[async_trait]
impl JobQueue<DiscoveryJobStatus> for PostgresStore {
    type Job = DiscoveryJob;

    #[instrument(skip(self), fields(status = %status), err)]
    async fn list_due(&self, status: DiscoveryJobStatus, limit: usize) -> Result<Vec<DiscoveryJob>, StoreError> {
        let rows = sqlx::query(concat!(
            r#"
            SELECT id, account_id, status, sync_mode, items_fetched, cursor, last_synced_at,
                   attempts, last_error, created_at, updated_at, processed_at
            FROM discovery_jobs
            WHERE status = $1
            "#,
            fairness_order!(),
            " LIMIT $2",
        ))
        .bind(status.as_str())
        .bind(to_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_due_discovery_jobs", e))?;

        rows.iter().map(discovery_job_from_row).collect()
    }

    #[instrument(skip(self, error), fields(job_id = %id, status = %status), err)]
    async fn update_status(
        &self,
        id: DiscoveryJobId,
        status: DiscoveryJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE discovery_jobs
            SET status = $1, last_error = $2, updated_at = $3, processed_at = $4
            WHERE id = $5
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(status.is_settled().then_some(now))
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_discovery_job_status", e))?;

        ensure_affected(result.rows_affected(), JobKind::Discovery, id)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn increment_attempts(&self, id: DiscoveryJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE discovery_jobs
            SET attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_discovery_job_attempts", e))?;

        ensure_affected(result.rows_affected(), JobKind::Discovery, id)
    }
}

#[async_trait]
impl JobQueue<ExtractionJobStatus> for PostgresStore {
    type Job = ExtractionJob;

    #[instrument(skip(self), fields(status = %status), err)]
    async fn list_due(&self, status: ExtractionJobStatus, limit: usize) -> Result<Vec<ExtractionJob>, StoreError> {
        let rows = sqlx::query(concat!(
            r#"
            SELECT id, account_id, message_id, status, last_synced_at, attempts, last_error,
                   created_at, updated_at, processed_at
            FROM extraction_jobs
            WHERE status = $1
            "#,
            fairness_order!(),
            " LIMIT $2",
        ))
        .bind(status.as_str())
        .bind(to_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_due_extraction_jobs", e))?;

        rows.iter().map(extraction_job_from_row).collect()
    }

    #[instrument(skip(self, error), fields(job_id = %id, status = %status), err)]
    async fn update_status(
        &self,
        id: ExtractionJobId,
        status: ExtractionJobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE extraction_jobs
            SET status = $1, last_error = $2, updated_at = $3, last_synced_at = $3, processed_at = $4
            WHERE id = $5
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(status.is_settled().then_some(now))
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_extraction_job_status", e))?;

        ensure_affected(result.rows_affected(), JobKind::Extraction, id)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn increment_attempts(&self, id: ExtractionJobId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE extraction_jobs
            SET attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_extraction_job_attempts", e))?;

        ensure_affected(result.rows_affected(), JobKind::Extraction, id)
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn enqueue_account_job(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<AccountJob, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO account_jobs (id, account_id, status, attempts, last_error, created_at, updated_at, processed_at)
            VALUES ($1, $2, 'pending', 0, NULL, $3, $3, NULL)
            ON CONFLICT (account_id)
            DO UPDATE SET
                status = 'pending',
                last_error = NULL,
                processed_at = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING id, account_id, status, attempts, last_error, created_at, updated_at, processed_at
            "#,
        )
        .bind(AccountJobId::new().as_uuid())
        .bind(account_id.as_uuid())
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("enqueue_account_job", e))?;

        account_job_from_row(&row)
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn get_account_job(&self, account_id: AccountId) -> Result<Option<AccountJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, status, attempts, last_error, created_at, updated_at, processed_at
            FROM account_jobs
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_account_job", e))?;

        row.as_ref().map(account_job_from_row).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, account_id = %job.account_id), err)]
    async fn create_discovery_job(&self, job: &DiscoveryJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO discovery_jobs (
                id, account_id, status, sync_mode, items_fetched, cursor, last_synced_at,
                attempts, last_error, created_at, updated_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.account_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.sync_mode.as_str())
        .bind(to_db_count(job.items_fetched, "items_fetched")?)
        .bind(&job.cursor)
        .bind(job.last_synced_at)
        .bind(to_db_count(job.attempts, "attempts")?)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.processed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_discovery_job", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %account_id, mode = %mode), err)]
    async fn seed_discovery_job(
        &self,
        account_id: AccountId,
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscoveryJob>, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO discovery_jobs (id, account_id, status, sync_mode, items_fetched, attempts, created_at, updated_at)
            SELECT $1, $2, 'pending', $3, 0, 0, $4, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM discovery_jobs WHERE account_id = $2 AND status <> 'synced'
            )
            RETURNING id, account_id, status, sync_mode, items_fetched, cursor, last_synced_at,
                      attempts, last_error, created_at, updated_at, processed_at
            "#,
        )
        .bind(DiscoveryJobId::new().as_uuid())
        .bind(account_id.as_uuid())
        .bind(mode.as_str())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_discovery_job", e))?;

        row.as_ref().map(discovery_job_from_row).transpose()
    }

    #[instrument(skip(self, cursor), fields(job_id = %id, items_fetched), err)]
    async fn update_discovery_progress(
        &self,
        id: DiscoveryJobId,
        items_fetched: u32,
        cursor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE discovery_jobs
            SET items_fetched = $1, cursor = $2, last_synced_at = $3, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(to_db_count(items_fetched, "items_fetched")?)
        .bind(cursor)
        .bind(now)
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_discovery_progress", e))?;

        ensure_affected(result.rows_affected(), JobKind::Discovery, id)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_discovery_job(&self, id: DiscoveryJobId) -> Result<Option<DiscoveryJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, status, sync_mode, items_fetched, cursor, last_synced_at,
                   attempts, last_error, created_at, updated_at, processed_at
            FROM discovery_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_discovery_job", e))?;

        row.as_ref().map(discovery_job_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list_discovery_jobs(&self, account_id: AccountId) -> Result<Vec<DiscoveryJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, status, sync_mode, items_fetched, cursor, last_synced_at,
                   attempts, last_error, created_at, updated_at, processed_at
            FROM discovery_jobs
            WHERE account_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_discovery_jobs", e))?;

        rows.iter().map(discovery_job_from_row).collect()
    }

    #[instrument(skip(self, jobs), fields(job_count = jobs.len()), err)]
    async fn bulk_create_extraction_jobs(&self, jobs: &[ExtractionJob]) -> Result<usize, StoreError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("bulk_create_extraction_jobs.begin", e))?;

        let mut inserted = 0u64;
        for job in jobs {
            let result = sqlx::query(
                r#"
                INSERT INTO extraction_jobs (
                    id, account_id, message_id, status, last_synced_at, attempts,
                    last_error, created_at, updated_at, processed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (message_id) DO NOTHING
                "#,
            )
            .bind(job.id.as_uuid())
            .bind(job.account_id.as_uuid())
            .bind(&job.message_id)
            .bind(job.status.as_str())
            .bind(job.last_synced_at)
            .bind(to_db_count(job.attempts, "attempts")?)
            .bind(&job.last_error)
            .bind(job.created_at)
            .bind(job.updated_at)
            .bind(job.processed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("bulk_create_extraction_jobs.insert", e))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("bulk_create_extraction_jobs.commit", e))?;

        Ok(inserted as usize)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_extraction_job(&self, id: ExtractionJobId) -> Result<Option<ExtractionJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, message_id, status, last_synced_at, attempts, last_error,
                   created_at, updated_at, processed_at
            FROM extraction_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_extraction_job", e))?;

        row.as_ref().map(extraction_job_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list_extraction_jobs(&self, account_id: AccountId) -> Result<Vec<ExtractionJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, message_id, status, last_synced_at, attempts, last_error,
                   created_at, updated_at, processed_at
            FROM extraction_jobs
            WHERE account_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_extraction_jobs", e))?;

        rows.iter().map(extraction_job_from_row).collect()
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, access_token, refresh_token, access_token_expires_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_account", e))?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, access_token, refresh_token), fields(account_id = %id), err)]
    async fn update_tokens(
        &self,
        id: AccountId,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET access_token = $1, refresh_token = $2, access_token_expires_at = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(now)
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_tokens", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    #[instrument(skip(self, payments), fields(payment_count = payments.len()), err)]
    async fn bulk_create_payments(&self, payments: &[Payment]) -> Result<usize, StoreError> {
        if payments.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("bulk_create_payments.begin", e))?;

        for payment in payments {
            sqlx::query(
                r#"
                INSERT INTO payments (
                    id, account_id, merchant, description, amount, currency, date,
                    recurrence, status, category, external_reference, metadata,
                    raw_response, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(payment.id.as_uuid())
            .bind(payment.account_id.as_uuid())
            .bind(&payment.merchant)
            .bind(&payment.description)
            .bind(&payment.amount)
            .bind(&payment.currency)
            .bind(payment.date)
            .bind(&payment.recurrence)
            .bind(&payment.status)
            .bind(&payment.category)
            .bind(&payment.external_reference)
            .bind(&payment.metadata)
            .bind(&payment.raw_response)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("bulk_create_payments.insert", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("bulk_create_payments.commit", e))?;

        Ok(payments.len())
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list_payments(&self, account_id: AccountId) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, merchant, description, amount, currency, date,
                   recurrence, status, category, external_reference, metadata,
                   raw_response, created_at, updated_at
            FROM payments
            WHERE account_id = $1
            ORDER BY date DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_payments", e))?;

        rows.iter().map(payment_from_row).collect()
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        if let sqlx::Error::Database(db_err) = &err {
            return StoreError::Conflict(format!("unique violation in {}: {}", operation, db_err.message()));
        }
    }
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {}", operation)),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {} in {}: {}", index, operation, source))
        }
        other => StoreError::Storage(format!("sqlx error in {}: {}", operation, other)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn to_db_count(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn from_db_count(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {}: {}", column, e)))
}

fn parse_tag<T>(value: String) -> Result<T, StoreError>
where
    T: core::str::FromStr<Err = inboxpay_core::DomainError>,
{
    value.parse().map_err(|e: inboxpay_core::DomainError| StoreError::Corrupt(e.to_string()))
}

fn account_job_from_row(row: &PgRow) -> Result<AccountJob, StoreError> {
    Ok(AccountJob {
        id: AccountJobId::from_uuid(get::<Uuid>(row, "id")?),
        account_id: AccountId::from_uuid(get::<Uuid>(row, "account_id")?),
        status: parse_tag(get::<String>(row, "status")?)?,
        attempts: from_db_count(get::<i32>(row, "attempts")?, "attempts")?,
        last_error: get(row, "last_error")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        processed_at: get(row, "processed_at")?,
    })
}

fn discovery_job_from_row(row: &PgRow) -> Result<DiscoveryJob, StoreError> {
    Ok(DiscoveryJob {
        id: DiscoveryJobId::from_uuid(get::<Uuid>(row, "id")?),
        account_id: AccountId::from_uuid(get::<Uuid>(row, "account_id")?),
        status: parse_tag(get::<String>(row, "status")?)?,
        sync_mode: parse_tag(get::<String>(row, "sync_mode")?)?,
        items_fetched: from_db_count(get::<i32>(row, "items_fetched")?, "items_fetched")?,
        cursor: get(row, "cursor")?,
        last_synced_at: get(row, "last_synced_at")?,
        attempts: from_db_count(get::<i32>(row, "attempts")?, "attempts")?,
        last_error: get(row, "last_error")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        processed_at: get(row, "processed_at")?,
    })
}

fn extraction_job_from_row(row: &PgRow) -> Result<ExtractionJob, StoreError> {
    Ok(ExtractionJob {
        id: ExtractionJobId::from_uuid(get::<Uuid>(row, "id")?),
        account_id: AccountId::from_uuid(get::<Uuid>(row, "account_id")?),
        message_id: get(row, "message_id")?,
        status: parse_tag(get::<String>(row, "status")?)?,
        last_synced_at: get(row, "last_synced_at")?,
        attempts: from_db_count(get::<i32>(row, "attempts")?, "attempts")?,
        last_error: get(row, "last_error")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        processed_at: get(row, "processed_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: AccountId::from_uuid(get::<Uuid>(row, "id")?),
        access_token: get(row, "access_token")?,
        refresh_token: get(row, "refresh_token")?,
        access_token_expires_at: get(row, "access_token_expires_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    Ok(Payment {
        id: PaymentId::from_uuid(get::<Uuid>(row, "id")?),
        account_id: AccountId::from_uuid(get::<Uuid>(row, "account_id")?),
        merchant: get(row, "merchant")?,
        description: get(row, "description")?,
        amount: get::<BigDecimal>(row, "amount")?,
        currency: get(row, "currency")?,
        date: get(row, "date")?,
        recurrence: get(row, "recurrence")?,
        status: get(row, "status")?,
        category: get(row, "category")?,
        external_reference: get(row, "external_reference")?,
        metadata: get(row, "metadata")?,
        raw_response: get(row, "raw_response")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}
