//! The capacity state machine service.
//!
//! Every write is an optimistic conditional update against the
//! [`EntityStore`]. Only when that attempt does not match does the service
//! read the event back and classify why. If the read shows the operation
//! would now be admissible (someone changed the event in between), the
//! attempt is repeated, at most [`MAX_ATTEMPTS`] times, before giving up with
//! [`RegistrationError::Contended`].

use crate::metrics::RegistrationMetrics;
use rsvp_core::entity_store::{EntityStore, StoreError};
use rsvp_core::environment::Clock;
use rsvp_core::error::{RegistrationError, Result};
use rsvp_core::transition::Transition;
use rsvp_core::types::{
    CancelOutcome, Event, EventId, EventStatus, EventSummary, NewEvent, Page, PageMeta,
    ParticipantId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Conditional-update attempts per operation before reporting contention.
pub const MAX_ATTEMPTS: usize = 3;

/// Result of reading an event back after a conditional update missed.
enum Diagnosis {
    /// The miss is explained by the current state
    Fail(RegistrationError),
    /// The current state would admit the operation; try again
    Retry,
}

/// Register, unregister, resize and cancel-or-delete events.
///
/// Cheap to clone; clones share the store and clock handles. No in-process
/// locking is involved, so one instance can serve any number of concurrent
/// callers.
///
/// # Example
///
/// ```
/// use rsvp_registry::CapacityService;
/// use rsvp_core::environment::SystemClock;
/// use rsvp_core::types::{EventStatus, NewEvent};
/// use rsvp_testing::InMemoryEntityStore;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let service = CapacityService::new(Arc::new(InMemoryEntityStore::new()), Arc::new(SystemClock));
/// let event = service.create(NewEvent::new("Salsa night", 1)).await.unwrap();
///
/// let updated = service.register(&event.id, &"maria".into()).await.unwrap();
/// assert_eq!(updated.status, EventStatus::Full);
/// # }
/// ```
#[derive(Clone)]
pub struct CapacityService {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    page_size: u32,
}

impl CapacityService {
    /// Create a service with the default page size.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Listing page size in use.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    // ═══════════════════════════════════════════════════════════
    // State machine operations
    // ═══════════════════════════════════════════════════════════

    /// Add `participant` to the event, taking one seat.
    ///
    /// The seat that fills the event also flips it to `Full`, in the same
    /// conditional update.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `AlreadyRegistered`: the participant already holds a seat
    /// - `WrongStatus`: the event is `Cancelled` (or otherwise not `Open`)
    /// - `Full`: no seat left
    /// - `Contended`: lost [`MAX_ATTEMPTS`] races in a row
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(event_id = %id, participant = %participant))]
    pub async fn register(&self, id: &EventId, participant: &ParticipantId) -> Result<Event> {
        let result = self
            .attempt(id, Transition::Join(participant.clone()), |event| {
                diagnose_register(event, participant)
            })
            .await;
        RegistrationMetrics::record("register", &result);
        result
    }

    /// Remove `participant` from the event, freeing one seat.
    ///
    /// A `Full` event drops back to `Open` in the same conditional update.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `EventCancelled`: membership of a cancelled event is frozen
    /// - `NotRegistered`: the participant holds no seat
    /// - `Contended`: lost [`MAX_ATTEMPTS`] races in a row
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(event_id = %id, participant = %participant))]
    pub async fn unregister(&self, id: &EventId, participant: &ParticipantId) -> Result<Event> {
        let result = self
            .attempt(id, Transition::Leave(participant.clone()), |event| {
                diagnose_unregister(event, participant)
            })
            .await;
        RegistrationMetrics::record("unregister", &result);
        result
    }

    /// Set a new total capacity, reconciling `Open`/`Full` both ways.
    ///
    /// Occupancy is checked first, so a zero request on an event with
    /// participants reports `BelowOccupancy`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `BelowOccupancy`: more seats are taken than `capacity_total`
    /// - `Validation`: `capacity_total` is zero on an empty event
    /// - `Contended`: lost [`MAX_ATTEMPTS`] races in a row
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(event_id = %id))]
    pub async fn resize(&self, id: &EventId, capacity_total: u32) -> Result<Event> {
        let result = self
            .attempt(id, Transition::Resize(capacity_total), |event| {
                diagnose_resize(event, capacity_total)
            })
            .await;
        RegistrationMetrics::record("resize", &result);
        result
    }

    /// Hard-delete an empty event, or soft-cancel an `Open` one that has
    /// participants.
    ///
    /// `Full` events are not cancellable here and report
    /// `WrongStatus { status: Full }`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `WrongStatus`: non-empty and not `Open`
    /// - `Contended`: lost [`MAX_ATTEMPTS`] races in a row
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(event_id = %id))]
    pub async fn cancel_or_delete(&self, id: &EventId) -> Result<CancelOutcome> {
        let result = self.cancel_or_delete_inner(id).await;
        RegistrationMetrics::record("cancel", &result);
        result
    }

    async fn cancel_or_delete_inner(&self, id: &EventId) -> Result<CancelOutcome> {
        for attempt in 1..=MAX_ATTEMPTS {
            if self.store.delete_if_empty(id).await? {
                info!(event_id = %id, "Empty event deleted");
                return Ok(CancelOutcome::Deleted);
            }

            if self
                .store
                .apply(id, Transition::Cancel, self.clock.now())
                .await?
                .is_some()
            {
                info!(event_id = %id, "Event cancelled");
                return Ok(CancelOutcome::Cancelled);
            }

            match self.store.get(id).await? {
                None => return Err(RegistrationError::NotFound(id.clone())),
                Some(event) if event.status != EventStatus::Open => {
                    return Err(RegistrationError::WrongStatus {
                        status: event.status,
                    });
                },
                // Open again, or emptied since the delete attempt.
                Some(_) => debug!(event_id = %id, attempt, "Cancel raced, retrying"),
            }
        }

        warn!(event_id = %id, "Cancel gave up after repeated contention");
        Err(RegistrationError::Contended)
    }

    /// Optimistic conditional update, then diagnosis on miss.
    async fn attempt<F>(&self, id: &EventId, transition: Transition, diagnose: F) -> Result<Event>
    where
        F: Fn(&Event) -> Diagnosis,
    {
        let operation = transition.name();
        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(updated) = self
                .store
                .apply(id, transition.clone(), self.clock.now())
                .await?
            {
                info!(
                    event_id = %id,
                    operation,
                    occupied = updated.capacity_occupied,
                    total = updated.capacity_total,
                    status = %updated.status,
                    "Transition applied"
                );
                return Ok(updated);
            }

            let Some(current) = self.store.get(id).await? else {
                return Err(RegistrationError::NotFound(id.clone()));
            };

            match diagnose(&current) {
                Diagnosis::Fail(error) => {
                    debug!(event_id = %id, operation, outcome = %error.code(), "Transition refused");
                    return Err(error);
                },
                Diagnosis::Retry => {
                    debug!(event_id = %id, operation, attempt, "State changed since attempt, retrying");
                },
            }
        }

        warn!(event_id = %id, operation, "Gave up after repeated contention");
        Err(RegistrationError::Contended)
    }

    // ═══════════════════════════════════════════════════════════
    // Admin and read paths
    // ═══════════════════════════════════════════════════════════

    /// Create a new `Open`, empty event.
    ///
    /// # Errors
    ///
    /// - `Validation`: empty name, zero capacity, malformed or taken id
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(name = %new_event.name))]
    pub async fn create(&self, new_event: NewEvent) -> Result<Event> {
        new_event.validate().map_err(RegistrationError::Validation)?;
        let event = new_event.into_event(self.clock.now());

        match self.store.insert(event.clone()).await {
            Ok(()) => {
                info!(event_id = %event.id, capacity = event.capacity_total, "Event created");
                Ok(event)
            },
            Err(StoreError::Duplicate(id)) => Err(RegistrationError::Validation(format!(
                "event id {id} is already taken"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Load one event as seen by `viewer`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `Store`: the backend failed
    pub async fn get(&self, id: &EventId, viewer: Option<&ParticipantId>) -> Result<EventSummary> {
        self.store
            .get(id)
            .await?
            .map(|event| event.summary_for(viewer))
            .ok_or_else(|| RegistrationError::NotFound(id.clone()))
    }

    /// One page of events, most recently edited first.
    ///
    /// `page` is 1-based; values below 1 are treated as 1.
    ///
    /// # Errors
    ///
    /// - `Store`: the backend failed
    pub async fn list(&self, page: u32, viewer: Option<&ParticipantId>) -> Result<Page> {
        let page = page.max(1);
        let offset = u64::from(page - 1) * u64::from(self.page_size);
        let (events, total) = self.store.page(offset, self.page_size).await?;

        Ok(Page {
            data: events.iter().map(|e| e.summary_for(viewer)).collect(),
            meta: PageMeta::new(total, page, self.page_size),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Diagnosis
// ═══════════════════════════════════════════════════════════

fn diagnose_register(event: &Event, participant: &ParticipantId) -> Diagnosis {
    if event.has_participant(participant) {
        return Diagnosis::Fail(RegistrationError::AlreadyRegistered);
    }
    match event.status {
        EventStatus::Cancelled => Diagnosis::Fail(RegistrationError::WrongStatus {
            status: EventStatus::Cancelled,
        }),
        _ if event.capacity_occupied >= event.capacity_total => {
            Diagnosis::Fail(RegistrationError::Full)
        },
        EventStatus::Full => Diagnosis::Fail(RegistrationError::WrongStatus {
            status: EventStatus::Full,
        }),
        EventStatus::Open => Diagnosis::Retry,
    }
}

fn diagnose_unregister(event: &Event, participant: &ParticipantId) -> Diagnosis {
    if event.status == EventStatus::Cancelled {
        return Diagnosis::Fail(RegistrationError::EventCancelled);
    }
    if !event.has_participant(participant) {
        return Diagnosis::Fail(RegistrationError::NotRegistered);
    }
    Diagnosis::Retry
}

fn diagnose_resize(event: &Event, capacity_total: u32) -> Diagnosis {
    if event.capacity_occupied > capacity_total {
        return Diagnosis::Fail(RegistrationError::BelowOccupancy {
            requested: capacity_total,
            occupied: event.capacity_occupied,
        });
    }
    if capacity_total < 1 {
        return Diagnosis::Fail(RegistrationError::Validation(
            "capacity total must be at least 1".to_string(),
        ));
    }
    Diagnosis::Retry
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rsvp_core::environment::SystemClock;
    use rsvp_testing::{EventFixture, InMemoryEntityStore, test_clock};

    fn service_with(events: impl IntoIterator<Item = Event>) -> (CapacityService, InMemoryEntityStore) {
        let store = InMemoryEntityStore::with_events(events);
        let service = CapacityService::new(Arc::new(store.clone()), Arc::new(test_clock()));
        (service, store)
    }

    fn fail(d: Diagnosis) -> Option<RegistrationError> {
        match d {
            Diagnosis::Fail(e) => Some(e),
            Diagnosis::Retry => None,
        }
    }

    #[test]
    fn register_diagnosis_order() {
        let now = test_clock().now();
        let full = EventFixture::new("x").capacity(1).joined(["a"]).build(now);
        assert_eq!(
            fail(diagnose_register(&full, &"a".into())),
            Some(RegistrationError::AlreadyRegistered)
        );
        assert_eq!(fail(diagnose_register(&full, &"b".into())), Some(RegistrationError::Full));

        let mut cancelled = EventFixture::new("x").capacity(1).joined(["a"]).build(now);
        cancelled.status = EventStatus::Cancelled;
        assert_eq!(
            fail(diagnose_register(&cancelled, &"b".into())),
            Some(RegistrationError::WrongStatus { status: EventStatus::Cancelled })
        );

        let open = EventFixture::new("x").capacity(3).build(now);
        assert!(fail(diagnose_register(&open, &"b".into())).is_none());
    }

    #[test]
    fn stale_full_status_with_free_seat_names_the_status() {
        let mut stale = EventFixture::new("x").capacity(3).joined(["a"]).build(test_clock().now());
        stale.status = EventStatus::Full;
        assert_eq!(
            fail(diagnose_register(&stale, &"b".into())),
            Some(RegistrationError::WrongStatus { status: EventStatus::Full })
        );
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let (service, _) = service_with(std::iter::empty());
        let err = service.create(NewEvent::new("  ", 3)).await.unwrap_err();
        assert_eq!(err.kind(), rsvp_core::ErrorKind::Validation);

        let err = service.create(NewEvent::new("Yoga", 0)).await.unwrap_err();
        assert_eq!(err.kind(), rsvp_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn create_with_taken_id_is_a_validation_error() {
        let (service, _) = service_with(std::iter::empty());
        let mut new_event = NewEvent::new("Yoga", 3);
        new_event.id = Some("yoga".into());
        service.create(new_event.clone()).await.unwrap();

        let err = service.create(new_event).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Validation(msg) if msg.contains("yoga")));
    }

    #[test]
    fn resize_diagnosis_checks_occupancy_before_the_floor() {
        let now = test_clock().now();
        let one = EventFixture::new("x").capacity(3).joined(["a"]).build(now);
        assert_eq!(
            fail(diagnose_resize(&one, 0)),
            Some(RegistrationError::BelowOccupancy { requested: 0, occupied: 1 })
        );

        let empty = EventFixture::new("x").capacity(3).build(now);
        assert!(matches!(
            fail(diagnose_resize(&empty, 0)),
            Some(RegistrationError::Validation(_))
        ));
        assert!(fail(diagnose_resize(&empty, 2)).is_none());
    }

    #[tokio::test]
    async fn resize_zero_on_missing_event_is_not_found() {
        let (service, _) = service_with(std::iter::empty());
        let err = service.resize(&"missing".into(), 0).await.unwrap_err();
        assert_eq!(err, RegistrationError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn resize_on_missing_event_is_not_found() {
        let (service, _) = service_with(std::iter::empty());
        let err = service.resize(&"missing".into(), 4).await.unwrap_err();
        assert_eq!(err, RegistrationError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn get_reports_viewer_registration() {
        let event = EventFixture::new("Tea").id("tea").joined(["ana"]).build(test_clock().now());
        let (service, _) = service_with([event]);

        let ana = ParticipantId::new("ana");
        assert!(service.get(&"tea".into(), Some(&ana)).await.unwrap().already_registered);
        assert!(!service.get(&"tea".into(), None).await.unwrap().already_registered);
        assert!(matches!(
            service.get(&"nope".into(), None).await,
            Err(RegistrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_clamps_page_and_reports_page_count() {
        let now = test_clock().now();
        let events = (0..25).map(|i| EventFixture::new(format!("E{i}")).build(now));
        let (service, _) = service_with(events);

        let first = service.list(0, None).await.unwrap();
        assert_eq!(first.meta.page, 1);
        assert_eq!(first.meta.limit, 10);
        assert_eq!(first.meta.total, 25);
        assert_eq!(first.meta.page_count, 3);
        assert_eq!(first.data.len(), 10);

        let last = service.list(3, None).await.unwrap();
        assert_eq!(last.data.len(), 5);

        let beyond = service.list(9, None).await.unwrap();
        assert!(beyond.data.is_empty());
    }

    #[tokio::test]
    async fn page_size_is_at_least_one() {
        let service = CapacityService::new(Arc::new(InMemoryEntityStore::new()), Arc::new(SystemClock))
            .with_page_size(0);
        assert_eq!(service.page_size(), 1);
    }
}
