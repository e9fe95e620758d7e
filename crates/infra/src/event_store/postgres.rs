//! Postgres-backed event store.
//!
//! Tenant isolation, optimistic concurrency and append-only semantics are
//! enforced at the database level. A multi-stream append runs in a single
//! transaction.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `EventStoreError` |
//! |------------|---------------|-------------------|
//! | unique violation | `23505` | `Concurrency` |
//! | check violation | `23514` | `InvalidAppend` |
//! | any other database error | * | `Backend` |
//! | pool closed, IO, decoding | n/a | `Backend` |

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{Span, instrument};

use retailops_core::{AggregateId, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batches};

const SCHEMA: &str = include_str!("../../migrations/0001_events.sql");

/// Postgres-backed append-only event store.
///
/// Every query carries `tenant_id`. The version check reads
/// `MAX(sequence_number)` inside the append transaction; a concurrent writer
/// that slips in between trips the `(tenant_id, aggregate_id,
/// sequence_number)` unique constraint and surfaces as `Concurrency`.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and make sure the `events` table exists.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id, event_count = tracing::field::Empty),
        err
    )]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let events = decode_rows(rows)?;
        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(skip(self), fields(event_count = tracing::field::Empty), err)]
    pub async fn load_all_async(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            ORDER BY tenant_id, aggregate_id, sequence_number
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        let events = decode_rows(rows)?;
        Span::current().record("event_count", events.len());
        Ok(events)
    }

    /// Append every batch in one transaction; any failed check rolls back all.
    #[instrument(
        skip(self, batches),
        fields(stream_count = batches.len(), committed_events = tracing::field::Empty),
        err
    )]
    pub async fn append_streams_async(
        &self,
        batches: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let batches: Vec<_> = batches.into_iter().filter(|b| !b.events.is_empty()).collect();
        if batches.is_empty() {
            return Ok(vec![]);
        }
        validate_batches(&batches)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed = Vec::new();
        for b in batches {
            // Dropping `tx` on an early return rolls the transaction back.
            let (current, existing_type) = check_stream_version(&mut tx, b.tenant_id, b.aggregate_id).await?;

            if let Some(existing) = existing_type {
                if existing != b.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{existing}', attempted append with '{}'",
                        b.aggregate_type
                    )));
                }
            }
            if !b.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    b.aggregate_id, b.expected_version
                )));
            }

            let mut next = current + 1;
            for event in b.events {
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                        event_type, event_version, occurred_at, payload
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(event.event_id)
                .bind(event.tenant_id.as_uuid())
                .bind(event.aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(next as i64)
                .bind(&event.event_type)
                .bind(event.event_version as i32)
                .bind(event.occurred_at)
                .bind(&event.payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        EventStoreError::Concurrency(format!(
                            "concurrent append detected: stream {} sequence {next} already exists",
                            event.aggregate_id
                        ))
                    } else {
                        map_sqlx_error("insert_event", e)
                    }
                })?;

                committed.push(StoredEvent::from_uncommitted(event, next));
                next += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("committed_events", committed.len());
        Ok(committed)
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, EventStoreError>
    where
        F: std::future::Future<Output = Result<T, EventStoreError>>,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            EventStoreError::Backend("PostgresEventStore must be called inside a tokio runtime".to_string())
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

/// `(current_version, aggregate_type)`; `(0, None)` for a missing stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("read_current_version", e))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| map_sqlx_error("read_aggregate_type", e))?;

    Ok((current as u64, aggregate_type))
}

fn decode_rows(rows: Vec<PgRow>) -> Result<Vec<StoredEvent>, EventStoreError> {
    rows.iter()
        .map(|row| {
            StoredEventRow::from_row(row)
                .map(StoredEvent::from)
                .map_err(|e| map_sqlx_error("decode_event_row", e))
        })
        .collect()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => EventStoreError::Backend(format!("connection pool closed in {operation}")),
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for StoredEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}

// The `EventStore` trait is synchronous; calls bridge onto the current tokio
// runtime, which must be multi-threaded.
impl EventStore for PostgresEventStore {
    fn append_streams(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.append_streams_async(batches))
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_stream_async(tenant_id, aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_all_async())
    }
}
