//! # RSVP Testing
//!
//! Testing utilities for the RSVP capacity registry.
//!
//! This crate provides:
//! - An in-memory [`EntityStore`](rsvp_core::EntityStore) with the same
//!   atomicity guarantees as the `PostgreSQL` backend
//! - Deterministic clocks
//! - Event fixtures
//! - proptest strategies for ids and transitions
//!
//! ## Example
//!
//! ```
//! use rsvp_testing::{EventFixture, InMemoryEntityStore, test_clock};
//! use rsvp_core::environment::Clock;
//!
//! let now = test_clock().now();
//! let event = EventFixture::new("Book club").capacity(2).joined(["ana"]).build(now);
//! let store = InMemoryEntityStore::with_events([event]);
//! assert_eq!(store.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use rsvp_core::environment::Clock;

mod store_mocks;

pub use store_mocks::InMemoryEntityStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rsvp_testing::mocks::FixedClock;
    /// use rsvp_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can hold one handle while the
    /// service under test holds another.
    ///
    /// # Example
    ///
    /// ```
    /// use rsvp_testing::mocks::ManualClock;
    /// use rsvp_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let before = clock.now();
    /// clock.advance(Duration::seconds(30));
    /// assert_eq!(clock.now() - before, Duration::seconds(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }

        /// Jump to `time`, forwards or backwards
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut current) = self.time.lock() {
                *current = time;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders for events in arbitrary reachable states.
pub mod fixtures {
    use super::{DateTime, Utc};
    use rsvp_core::transition::Transition;
    use rsvp_core::types::{Event, EventId, NewEvent, ParticipantId};

    /// Builds an [`Event`] by replaying transitions on a fresh one, so the
    /// result always satisfies the entity invariants.
    ///
    /// Steps the state machine refuses are silently skipped.
    #[derive(Debug, Clone)]
    pub struct EventFixture {
        new_event: NewEvent,
        steps: Vec<Transition>,
    }

    impl EventFixture {
        /// Start from an `Open`, empty event with capacity 10
        #[must_use]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                new_event: NewEvent::new(name, 10),
                steps: Vec::new(),
            }
        }

        /// Use a fixed id instead of a generated one
        #[must_use]
        pub fn id(mut self, id: impl Into<EventId>) -> Self {
            self.new_event.id = Some(id.into());
            self
        }

        /// Set the initial total capacity
        #[must_use]
        pub const fn capacity(mut self, total: u32) -> Self {
            self.new_event.capacity_total = total;
            self
        }

        /// Register each participant in order
        #[must_use]
        pub fn joined<I, P>(mut self, participants: I) -> Self
        where
            I: IntoIterator<Item = P>,
            P: Into<ParticipantId>,
        {
            self.steps
                .extend(participants.into_iter().map(|p| Transition::Join(p.into())));
            self
        }

        /// Cancel the event after the registrations so far
        #[must_use]
        pub fn cancelled(mut self) -> Self {
            self.steps.push(Transition::Cancel);
            self
        }

        /// Append an arbitrary transition
        #[must_use]
        pub fn then(mut self, transition: Transition) -> Self {
            self.steps.push(transition);
            self
        }

        /// Build with every timestamp set to `at`
        #[must_use]
        pub fn build(self, at: DateTime<Utc>) -> Event {
            let mut event = self.new_event.into_event(at);
            for step in &self.steps {
                step.try_apply(&mut event, at);
            }
            event
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use rsvp_core::transition::Transition;
    use rsvp_core::types::{EventId, ParticipantId};

    /// Participant drawn from a small pool so collisions are frequent.
    pub fn participant() -> impl Strategy<Value = ParticipantId> {
        prop::sample::select(vec!["ana", "ben", "chloe", "dev", "eli", "fay"])
            .prop_map(ParticipantId::new)
    }

    /// Ids that pass `EventId::from_str`.
    pub fn event_id() -> impl Strategy<Value = EventId> {
        "[a-z0-9][a-z0-9-]{0,30}".prop_map(EventId::new)
    }

    /// Any transition, weighted towards registrations.
    pub fn transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            4 => participant().prop_map(Transition::Join),
            3 => participant().prop_map(Transition::Leave),
            1 => (0u32..8).prop_map(Transition::Resize),
            1 => Just(Transition::Cancel),
        ]
    }
}

// Re-export commonly used items
pub use fixtures::EventFixture;
pub use mocks::{FixedClock, ManualClock, test_clock};
