//! `PostgreSQL` implementation of [`EntityStore`].
//!
//! Each [`Transition`] compiles to exactly one `UPDATE ... WHERE <predicate>
//! RETURNING *`. Row-level locking makes the predicate check and the write
//! indivisible, and because every `SET` expression reads the pre-update row,
//! occupancy and status are reconciled in the same statement.
//!
//! `edited_at` is stamped with the database's `clock_timestamp()` (never
//! earlier than the caller's reading), so application hosts with skewed
//! clocks cannot stamp a write behind a watermark. Watermarks trail the same
//! clock by [`PostgresConfig::watermark_lag`], which covers the gap between
//! a statement stamping a row and its commit becoming visible.

use crate::config::{DEFAULT_WATERMARK_LAG, PostgresConfig};
use chrono::{DateTime, Utc};
use rsvp_core::entity_store::{EntityStore, StoreError, StoreFuture};
use rsvp_core::transition::Transition;
use rsvp_core::types::{Event, EventId, EventStatus, ParticipantId};
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

const JOIN_SQL: &str = r"
    UPDATE events
    SET participants = array_append(participants, $2),
        capacity_occupied = capacity_occupied + 1,
        status = CASE WHEN capacity_occupied + 1 >= capacity_total THEN 'Full' ELSE status END,
        edited_at = GREATEST(edited_at, $3, clock_timestamp())
    WHERE id = $1
      AND status = 'Open'
      AND capacity_occupied < capacity_total
      AND NOT (participants @> ARRAY[$2]::TEXT[])
    RETURNING *
";

const LEAVE_SQL: &str = r"
    UPDATE events
    SET participants = array_remove(participants, $2),
        capacity_occupied = capacity_occupied - 1,
        status = CASE
            WHEN status = 'Full' AND capacity_occupied - 1 < capacity_total THEN 'Open'
            ELSE status
        END,
        edited_at = GREATEST(edited_at, $3, clock_timestamp())
    WHERE id = $1
      AND status IN ('Open', 'Full')
      AND participants @> ARRAY[$2]::TEXT[]
    RETURNING *
";

const RESIZE_SQL: &str = r"
    UPDATE events
    SET capacity_total = $2,
        status = CASE
            WHEN status = 'Full' AND capacity_occupied < $2 THEN 'Open'
            WHEN status = 'Open' AND capacity_occupied >= $2 THEN 'Full'
            ELSE status
        END,
        edited_at = GREATEST(edited_at, $3, clock_timestamp())
    WHERE id = $1
      AND $2 >= 1
      AND capacity_occupied <= $2
    RETURNING *
";

const CANCEL_SQL: &str = r"
    UPDATE events
    SET status = 'Cancelled',
        edited_at = GREATEST(edited_at, $2, clock_timestamp())
    WHERE id = $1
      AND status = 'Open'
      AND capacity_occupied > 0
    RETURNING *
";

/// Raw `events` row.
#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    name: String,
    description: Option<String>,
    image: Option<String>,
    capacity_total: i32,
    capacity_occupied: i32,
    participants: Vec<String>,
    status: String,
    edited_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let status: EventStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Serialization(format!("event {}: {e}", row.id)))?;
        Ok(Self {
            capacity_total: from_db_count(row.capacity_total, &row.id)?,
            capacity_occupied: from_db_count(row.capacity_occupied, &row.id)?,
            id: EventId::from(row.id),
            name: row.name,
            description: row.description,
            image: row.image,
            participants: row.participants.into_iter().map(ParticipantId::new).collect(),
            status,
            edited_at: row.edited_at,
        })
    }
}

fn from_db_count(value: i32, id: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("event {id}: negative count {value}")))
}

fn to_db_count(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("count {value} exceeds INTEGER range")))
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

/// `PostgreSQL`-backed entity store.
///
/// # Example
///
/// ```no_run
/// use rsvp_postgres::{PostgresConfig, PostgresEntityStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresEntityStore::connect(&PostgresConfig::new("postgres://localhost/rsvp")).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    pool: PgPool,
    watermark_lag: Duration,
}

impl PostgresEntityStore {
    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot connect.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(db_error("Failed to connect"))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            watermark_lag_ms = config.watermark_lag.as_millis(),
            "PostgreSQL entity store connected"
        );
        Ok(Self::from_pool(pool).with_watermark_lag(config.watermark_lag))
    }

    /// Wrap an existing pool, with the default watermark lag.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            watermark_lag: DEFAULT_WATERMARK_LAG,
        }
    }

    /// Set how far sync watermarks trail the database clock.
    #[must_use]
    pub const fn with_watermark_lag(mut self, lag: Duration) -> Self {
        self.watermark_lag = lag;
        self
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `events` table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn run_transition(
        &self,
        id: &EventId,
        transition: &Transition,
        at: DateTime<Utc>,
    ) -> Result<Option<EventRow>, StoreError> {
        let query = match transition {
            Transition::Join(p) => sqlx::query_as::<_, EventRow>(JOIN_SQL)
                .bind(id.as_str())
                .bind(p.as_str())
                .bind(at),
            Transition::Leave(p) => sqlx::query_as::<_, EventRow>(LEAVE_SQL)
                .bind(id.as_str())
                .bind(p.as_str())
                .bind(at),
            Transition::Resize(total) => sqlx::query_as::<_, EventRow>(RESIZE_SQL)
                .bind(id.as_str())
                .bind(to_db_count(*total)?)
                .bind(at),
            Transition::Cancel => sqlx::query_as::<_, EventRow>(CANCEL_SQL)
                .bind(id.as_str())
                .bind(at),
        };

        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to apply transition"))
    }
}

impl EntityStore for PostgresEntityStore {
    fn insert(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let participants: Vec<String> = event
                .participants
                .iter()
                .map(|p| p.as_str().to_string())
                .collect();

            let result = sqlx::query(
                "INSERT INTO events
                 (id, name, description, image, capacity_total, capacity_occupied,
                  participants, status, edited_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(event.id.as_str())
            .bind(event.name.as_str())
            .bind(event.description.as_deref())
            .bind(event.image.as_deref())
            .bind(to_db_count(event.capacity_total)?)
            .bind(to_db_count(event.capacity_occupied)?)
            .bind(participants)
            .bind(event.status.as_str())
            .bind(event.edited_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(event_id = %event.id, "Event inserted");
                    Ok(())
                },
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    Err(StoreError::Duplicate(event.id))
                },
                Err(e) => Err(db_error("Failed to insert event")(e)),
            }
        })
    }

    fn get(&self, id: &EventId) -> StoreFuture<'_, Option<Event>> {
        let id = id.clone();
        Box::pin(async move {
            sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load event"))?
                .map(Event::try_from)
                .transpose()
        })
    }

    fn apply(
        &self,
        id: &EventId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>> {
        let id = id.clone();
        Box::pin(async move {
            let row = self.run_transition(&id, &transition, at).await?;
            debug!(
                event_id = %id,
                transition = transition.name(),
                applied = row.is_some(),
                "Conditional update"
            );
            row.map(Event::try_from).transpose()
        })
    }

    fn delete_if_empty(&self, id: &EventId) -> StoreFuture<'_, bool> {
        let id = id.clone();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM events WHERE id = $1 AND capacity_occupied = 0")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(db_error("Failed to delete event"))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn changed_since(
        &self,
        participant: &ParticipantId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>> {
        let participant = participant.clone();
        Box::pin(async move {
            sqlx::query_as::<_, EventRow>(
                "SELECT * FROM events
                 WHERE participants @> ARRAY[$1]::TEXT[] AND edited_at > $2
                 ORDER BY edited_at ASC, id ASC",
            )
            .bind(participant.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query changed events"))?
            .into_iter()
            .map(Event::try_from)
            .collect()
        })
    }

    fn relevant_among(
        &self,
        participant: &ParticipantId,
        ids: &[EventId],
    ) -> StoreFuture<'_, Vec<EventId>> {
        let participant = participant.clone();
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT id FROM events
                 WHERE id = ANY($1) AND participants @> ARRAY[$2]::TEXT[]",
            )
            .bind(ids)
            .bind(participant.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query relevant events"))?;

            Ok(rows.into_iter().map(|(id,)| EventId::from(id)).collect())
        })
    }

    fn watermark(&self, now: DateTime<Utc>) -> StoreFuture<'_, DateTime<Utc>> {
        let lag_ms = i64::try_from(self.watermark_lag.as_millis()).unwrap_or(i64::MAX);
        Box::pin(async move {
            let (watermark,): (DateTime<Utc>,) = sqlx::query_as(
                "SELECT LEAST($1::TIMESTAMPTZ, clock_timestamp() - $2::BIGINT * INTERVAL '1 millisecond')",
            )
            .bind(now)
            .bind(lag_ms)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to read watermark"))?;
            Ok(watermark)
        })
    }

    fn page(&self, offset: u64, limit: u32) -> StoreFuture<'_, (Vec<Event>, u64)> {
        Box::pin(async move {
            let offset = i64::try_from(offset)
                .map_err(|_| StoreError::Serialization(format!("offset {offset} out of range")))?;

            let rows = sqlx::query_as::<_, EventRow>(
                "SELECT * FROM events ORDER BY edited_at DESC, id ASC LIMIT $1 OFFSET $2",
            )
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list events"))?;

            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("Failed to count events"))?;

            let events = rows
                .into_iter()
                .map(Event::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok((events, u64::try_from(total).unwrap_or(0)))
        })
    }
}
