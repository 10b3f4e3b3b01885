//! Durable verification records.
//!
//! One row per record with lifecycle columns queried directly and the
//! document-shaped remainder in a JSON payload. A store-wide `revision`
//! column orders writes for change subscribers.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::feed::{ChangeLog, DEFAULT_POLL_INTERVAL, RecordChange, RecordFeed, RecordSubscription};
use super::metrics::SkillMetrics;
use super::record::{InvalidationReason, VerificationRecord, VerificationSources, VerificationStatus};

/// Async persistence contract for verification records.
///
/// Queries mirror a document store: by `(user_id, status)`, newest first.
/// Every successful write reaches subscribers, including subscribers of
/// other store instances over the same database.
pub trait VerificationStore: Send + Sync {
    fn insert<'a>(
        &'a self,
        record: &'a VerificationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Persist lifecycle changes of existing records in one batch.
    fn update_batch<'a>(
        &'a self,
        records: &'a [VerificationRecord],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn get<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VerificationRecord>>> + Send + 'a>>;

    /// Records of a user in a given status, newest `verified_at` first.
    fn find_by_user_status<'a>(
        &'a self,
        user_id: &'a str,
        status: VerificationStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<VerificationRecord>>> + Send + 'a>>;

    /// Newest record of a user in a given status.
    fn latest_by_user_status<'a>(
        &'a self,
        user_id: &'a str,
        status: VerificationStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VerificationRecord>>> + Send + 'a>>;

    /// All records of a user, newest first.
    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<VerificationRecord>>> + Send + 'a>>;

    /// Follow changes to a user's records made from now on.
    fn subscribe<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RecordSubscription>> + Send + 'a>>;
}

/// SQLite-backed record store using sqlx async pool.
pub struct SqliteVerificationStore {
    pool: SqlitePool,
    feed: RecordFeed,
    poll_interval: Duration,
}

const VERIFICATION_SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS verification_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const VERIFICATION_SCHEMA_VERSION_KEY: &str = "verification_schema_version";
const VERIFICATION_SCHEMA_VERSION: u32 = 2;

const RECORD_COLUMNS: &str = "id, user_id, status, verified_at, invalidated_at, \
                              invalidation_reason, overall_score, payload";

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(VERIFICATION_SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create verification_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM verification_schema_meta WHERE key = $1")
            .bind(VERIFICATION_SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load verification schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid verification schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == VERIFICATION_SCHEMA_VERSION,
            "incompatible verification schema version: stored={parsed}, \
expected={VERIFICATION_SCHEMA_VERSION}. remove the verification DB and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO verification_schema_meta (key, value) VALUES ($1, $2)")
        .bind(VERIFICATION_SCHEMA_VERSION_KEY)
        .bind(VERIFICATION_SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist verification schema version")?;

    Ok(())
}

impl SqliteVerificationStore {
    /// Create a new store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        ensure_schema_version(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS verification_records (
                 id TEXT PRIMARY KEY,
                 user_id TEXT NOT NULL,
                 status TEXT NOT NULL,
                 verified_at TEXT NOT NULL,
                 invalidated_at TEXT,
                 invalidation_reason TEXT,
                 overall_score INTEGER,
                 payload TEXT NOT NULL,
                 revision INTEGER NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_verification_records_user_status
                 ON verification_records(user_id, status, verified_at)",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_verification_records_user_revision
                 ON verification_records(user_id, revision)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            feed: RecordFeed::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// How often subscriptions re-read the database for writes made
    /// elsewhere.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("open verification database {}", path.display()))?;
        Self::new(pool).await
    }

    /// Single-connection in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory verification database")?;
        Self::new(pool).await
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// JSON column holding the document-shaped parts of a record.
#[derive(Serialize, Deserialize)]
struct RecordPayload {
    verified_skills: BTreeSet<String>,
    profile_skills_at_verification: BTreeSet<String>,
    sources: VerificationSources,
    #[serde(default)]
    metrics: Option<SkillMetrics>,
}

fn timestamp_to_str(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn str_to_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .with_context(|| format!("invalid timestamp: {value}"))
}

fn map_record_row(row: &SqliteRow) -> Result<VerificationRecord> {
    let status_raw: String = row.try_get("status")?;
    let verified_at_raw: String = row.try_get("verified_at")?;
    let invalidated_at_raw: Option<String> = row.try_get("invalidated_at")?;
    let reason_raw: Option<String> = row.try_get("invalidation_reason")?;
    let overall_score: Option<i64> = row.try_get("overall_score")?;
    let payload_raw: String = row.try_get("payload")?;

    let payload: RecordPayload =
        serde_json::from_str(&payload_raw).context("deserialize verification payload")?;
    let status = status_raw
        .parse::<VerificationStatus>()
        .map_err(|_| anyhow::anyhow!("unknown verification status: {status_raw}"))?;
    let invalidation_reason = reason_raw
        .map(|raw| {
            raw.parse::<InvalidationReason>()
                .map_err(|_| anyhow::anyhow!("unknown invalidation reason: {raw}"))
        })
        .transpose()?;

    Ok(VerificationRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status,
        verified_skills: payload.verified_skills,
        profile_skills_at_verification: payload.profile_skills_at_verification,
        sources: payload.sources,
        metrics: payload.metrics,
        overall_score: overall_score.and_then(|v| u8::try_from(v).ok()),
        verified_at: str_to_timestamp(&verified_at_raw)?,
        invalidated_at: invalidated_at_raw
            .as_deref()
            .map(str_to_timestamp)
            .transpose()?,
        invalidation_reason,
    })
}

fn payload_json(record: &VerificationRecord) -> Result<String> {
    let payload = RecordPayload {
        verified_skills: record.verified_skills.clone(),
        profile_skills_at_verification: record.profile_skills_at_verification.clone(),
        sources: record.sources.clone(),
        metrics: record.metrics,
    };
    serde_json::to_string(&payload).context("serialize verification payload")
}

const NEXT_REVISION: &str = "(SELECT COALESCE(MAX(revision), 0) + 1 FROM verification_records)";

/// Reads changes straight from the records table, so writes from any
/// connection are visible.
struct SqliteChangeLog {
    pool: SqlitePool,
}

impl ChangeLog for SqliteChangeLog {
    fn head_revision<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(async move {
            let (head,): (i64,) =
                sqlx::query_as("SELECT COALESCE(MAX(revision), 0) FROM verification_records")
                    .fetch_one(&self.pool)
                    .await
                    .context("query verification head revision")?;
            Ok(head)
        })
    }

    fn changes_since<'a>(
        &'a self,
        user_id: &'a str,
        revision: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordChange>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS}, revision
                 FROM verification_records
                 WHERE user_id = $1 AND revision > $2
                 ORDER BY revision ASC"
            ))
            .bind(user_id)
            .bind(revision)
            .fetch_all(&self.pool)
            .await
            .context("query verification record changes")?;

            rows.iter()
                .map(|row| {
                    Ok(RecordChange {
                        revision: row.try_get("revision")?,
                        record: map_record_row(row)?,
                    })
                })
                .collect()
        })
    }
}

impl VerificationStore for SqliteVerificationStore {
    fn insert<'a>(
        &'a self,
        record: &'a VerificationRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "INSERT INTO verification_records
                     (id, user_id, status, verified_at, invalidated_at, invalidation_reason, overall_score, payload, revision)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, {NEXT_REVISION})",
            ))
            .bind(&record.id)
            .bind(&record.user_id)
            .bind(record.status.to_string())
            .bind(timestamp_to_str(record.verified_at))
            .bind(record.invalidated_at.map(timestamp_to_str))
            .bind(record.invalidation_reason.map(|r| r.to_string()))
            .bind(record.overall_score.map(i64::from))
            .bind(payload_json(record)?)
            .execute(&self.pool)
            .await
            .context("insert verification record")?;

            self.feed.publish(record);
            Ok(())
        })
    }

    fn update_batch<'a>(
        &'a self,
        records: &'a [VerificationRecord],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }

            let mut tx = self.pool.begin().await?;
            for record in records {
                let result = sqlx::query(&format!(
                    "UPDATE verification_records
                     SET status = $1, invalidated_at = $2, invalidation_reason = $3,
                         overall_score = $4, payload = $5, revision = {NEXT_REVISION}
                     WHERE id = $6"
                ))
                .bind(record.status.to_string())
                .bind(record.invalidated_at.map(timestamp_to_str))
                .bind(record.invalidation_reason.map(|r| r.to_string()))
                .bind(record.overall_score.map(i64::from))
                .bind(payload_json(record)?)
                .bind(&record.id)
                .execute(&mut *tx)
                .await
                .context("update verification record")?;

                anyhow::ensure!(
                    result.rows_affected() == 1,
                    "verification record {} not found",
                    record.id
                );
            }
            tx.commit().await?;

            for record in records {
                self.feed.publish(record);
            }
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VerificationRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS} FROM verification_records WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("query verification record by id")?;

            row.map(|r| map_record_row(&r)).transpose()
        })
    }

    fn find_by_user_status<'a>(
        &'a self,
        user_id: &'a str,
        status: VerificationStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<VerificationRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS}
                 FROM verification_records
                 WHERE user_id = $1 AND status = $2
                 ORDER BY verified_at DESC"
            ))
            .bind(user_id)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .context("query verification records by user and status")?;

            rows.iter().map(map_record_row).collect()
        })
    }

    fn latest_by_user_status<'a>(
        &'a self,
        user_id: &'a str,
        status: VerificationStatus,
    ) -> Pin<Box<dyn Future<Output = Result<Option<VerificationRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS}
                 FROM verification_records
                 WHERE user_id = $1 AND status = $2
                 ORDER BY verified_at DESC
                 LIMIT 1"
            ))
            .bind(user_id)
            .bind(status.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("query latest verification record")?;

            row.map(|r| map_record_row(&r)).transpose()
        })
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<VerificationRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS}
                 FROM verification_records
                 WHERE user_id = $1
                 ORDER BY verified_at DESC"
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("list verification records")?;

            rows.iter().map(map_record_row).collect()
        })
    }

    fn subscribe<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RecordSubscription>> + Send + 'a>> {
        Box::pin(async move {
            let log: Arc<dyn ChangeLog> = Arc::new(SqliteChangeLog {
                pool: self.pool.clone(),
            });
            self.feed
                .subscribe(user_id, log, self.poll_interval)
                .await
                .context("subscribe to verification record changes")
        })
    }
}
