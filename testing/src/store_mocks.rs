//! In-memory entity store for fast, deterministic testing.
//!
//! Every operation takes the single store lock, so predicate evaluation and
//! mutation in [`EntityStore::apply`] are atomic with respect to every other
//! caller, the same guarantee a document store's conditional update gives.
//!
//! The lock also guards the commit fence: the latest `edited_at` written or
//! watermark handed out. Each commit is stamped strictly after it.

use chrono::{DateTime, Duration, Utc};
use rsvp_core::entity_store::{EntityStore, StoreError, StoreFuture};
use rsvp_core::transition::Transition;
use rsvp_core::types::{Event, EventId, ParticipantId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Inner {
    events: HashMap<EventId, Event>,
    fence: DateTime<Utc>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            fence: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// `HashMap`-backed [`EntityStore`].
///
/// # Example
///
/// ```
/// use rsvp_testing::InMemoryEntityStore;
/// use rsvp_core::entity_store::EntityStore;
/// use rsvp_core::types::NewEvent;
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEntityStore::new();
/// let event = NewEvent::new("Pottery class", 8).into_event(Utc::now());
/// let id = event.id.clone();
///
/// store.insert(event).await?;
/// assert!(store.get(&id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `events`
    #[must_use]
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let events: HashMap<EventId, Event> =
            events.into_iter().map(|e| (e.id.clone(), e)).collect();
        let fence = events
            .values()
            .map(|e| e.edited_at)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            inner: Arc::new(Mutex::new(Inner { events, fence })),
        }
    }

    /// Number of stored events
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.events.len())
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored event, for assertions
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock()
            .map(|inner| inner.events.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Overwrite a record, bypassing the state machine.
    ///
    /// For arranging states that the public operations cannot reach directly
    /// (e.g. a stale status left by an older writer).
    pub fn force_put(&self, event: Event) {
        if let Ok(mut inner) = self.lock() {
            inner.fence = inner.fence.max(event.edited_at);
            inner.events.insert(event.id.clone(), event);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn insert(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if inner.events.contains_key(&event.id) {
                return Err(StoreError::Duplicate(event.id));
            }
            inner.events.insert(event.id.clone(), event);
            Ok(())
        })
    }

    fn get(&self, id: &EventId) -> StoreFuture<'_, Option<Event>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.lock()?.events.get(&id).cloned()) })
    }

    fn apply(
        &self,
        id: &EventId,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>> {
        let id = id.clone();
        Box::pin(async move {
            let mut guard = self.lock()?;
            let inner = &mut *guard;
            // Microseconds: `TIMESTAMPTZ` resolution.
            let stamp = at.max(inner.fence + Duration::microseconds(1));
            let Some(event) = inner.events.get_mut(&id) else {
                return Ok(None);
            };
            if !transition.try_apply(event, stamp) {
                return Ok(None);
            }
            inner.fence = inner.fence.max(event.edited_at);
            Ok(Some(event.clone()))
        })
    }

    fn delete_if_empty(&self, id: &EventId) -> StoreFuture<'_, bool> {
        let id = id.clone();
        Box::pin(async move {
            let mut inner = self.lock()?;
            match inner.events.get(&id) {
                Some(event) if event.capacity_occupied == 0 => {
                    inner.events.remove(&id);
                    Ok(true)
                },
                _ => Ok(false),
            }
        })
    }

    fn changed_since(
        &self,
        participant: &ParticipantId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>> {
        let participant = participant.clone();
        Box::pin(async move {
            let mut changed: Vec<Event> = self
                .lock()?
                .events
                .values()
                .filter(|e| e.edited_at > since && e.has_participant(&participant))
                .cloned()
                .collect();
            changed.sort_by(|a, b| a.edited_at.cmp(&b.edited_at).then_with(|| a.id.cmp(&b.id)));
            Ok(changed)
        })
    }

    fn relevant_among(
        &self,
        participant: &ParticipantId,
        ids: &[EventId],
    ) -> StoreFuture<'_, Vec<EventId>> {
        let participant = participant.clone();
        let ids = ids.to_vec();
        Box::pin(async move {
            let inner = self.lock()?;
            Ok(ids
                .into_iter()
                .filter(|id| {
                    inner
                        .events
                        .get(id)
                        .is_some_and(|e| e.has_participant(&participant))
                })
                .collect())
        })
    }

    fn watermark(&self, now: DateTime<Utc>) -> StoreFuture<'_, DateTime<Utc>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.fence = inner.fence.max(now);
            Ok(inner.fence)
        })
    }

    fn page(&self, offset: u64, limit: u32) -> StoreFuture<'_, (Vec<Event>, u64)> {
        Box::pin(async move {
            let inner = self.lock()?;
            let total = inner.events.len() as u64;
            let mut all: Vec<&Event> = inner.events.values().collect();
            all.sort_by(|a, b| b.edited_at.cmp(&a.edited_at).then_with(|| a.id.cmp(&b.id)));
            let offset = usize::try_from(offset).unwrap_or(usize::MAX);
            let page = all
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .cloned()
                .collect();
            Ok((page, total))
        })
    }
}
