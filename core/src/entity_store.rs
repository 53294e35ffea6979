//! Entity store trait: the authoritative record of every event.
//!
//! The store is the only concurrency-control primitive in the system. It must
//! offer per-record atomic conditional updates: [`EntityStore::apply`]
//! evaluates a [`Transition`]'s predicate and mutation as one indivisible
//! step, so two callers racing on the same event are linearised by the store
//! and the loser simply observes `None`.
//!
//! The store also owns the sync watermark. A caller's clock reading taken
//! before a write commits can fall behind a watermark handed to a concurrent
//! sync, so [`EntityStore::watermark`] fences later commits instead of the
//! sync engine reading a clock.
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `rsvp-postgres`): production, one
//!   `UPDATE ... WHERE ... RETURNING` per transition
//! - `InMemoryEntityStore` (in `rsvp-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! store can be shared as `Arc<dyn EntityStore>`.

use crate::transition::Transition;
use crate::types::{Event, EventId, ParticipantId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EntityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors raised by an entity store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An event with this id already exists.
    #[error("Event already exists: {0}")]
    Duplicate(EventId),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored record could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Authoritative event storage with atomic conditional updates.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one handle is shared by every
/// concurrent request handler and no in-process locking is layered on top.
pub trait EntityStore: Send + Sync {
    /// Insert a new event.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: an event with the same id exists
    /// - `Database`: the backend failed
    fn insert(&self, event: Event) -> StoreFuture<'_, ()>;

    /// Load an event by id.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: the backend failed
    fn get(&self, id: &EventId) -> StoreFuture<'_, Option<Event>>;

    /// Atomically apply `transition` if its predicate holds.
    ///
    /// Returns the updated event, or `None` when the event is absent or the
    /// predicate did not hold. In the `None` case nothing was written.
    ///
    /// `at` is the caller's clock reading. The stored `edited_at` is never
    /// earlier than `at` and is strictly later than every
    /// [`watermark`](Self::watermark) returned before the write committed.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: the backend failed
    fn apply(
        &self,
        id: &EventId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>>;

    /// Hard-delete the event if nobody is registered.
    ///
    /// Returns `true` if a record was removed.
    ///
    /// # Errors
    ///
    /// - `Database`: the backend failed
    fn delete_if_empty(&self, id: &EventId) -> StoreFuture<'_, bool>;

    /// Events that list `participant` and were edited strictly after `since`,
    /// oldest edit first.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: the backend failed
    fn changed_since(
        &self,
        participant: &ParticipantId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>>;

    /// The subset of `ids` that still exist and list `participant`.
    ///
    /// # Errors
    ///
    /// - `Database`: the backend failed
    fn relevant_among(
        &self,
        participant: &ParticipantId,
        ids: &[EventId],
    ) -> StoreFuture<'_, Vec<EventId>>;

    /// Watermark for a delta sync that is about to query this store.
    ///
    /// Every write that commits after this call returns is stamped strictly
    /// after the returned instant, so `changed_since(.., watermark)` on a later
    /// sync cannot miss a write the current sync's queries did not see. The
    /// result tracks `now`, the caller's clock reading; a backend may return
    /// an earlier instant, which only causes re-delivery.
    ///
    /// # Errors
    ///
    /// - `Database`: the backend failed
    fn watermark(&self, now: DateTime<Utc>) -> StoreFuture<'_, DateTime<Utc>>;

    /// One page of events, most recently edited first, plus the total count.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: the backend failed
    fn page(&self, offset: u64, limit: u32) -> StoreFuture<'_, (Vec<Event>, u64)>;
}
