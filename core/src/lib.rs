//! # RSVP Core
//!
//! Domain types and abstractions for capacity-limited event registration
//! with incremental client synchronisation.
//!
//! ## Core Concepts
//!
//! - **Event**: the capacity-limited entity (`Open` → `Full` → `Open`, or
//!   `Cancelled` for good)
//! - **Transition**: predicate + mutation pair, applied atomically by the store
//! - **Entity store**: authoritative storage offering per-record conditional
//!   updates; the system's only concurrency-control primitive
//! - **Sync**: watermark + known-id set exchange that detects removals without
//!   a tombstone log
//!
//! ## Example
//!
//! ```
//! use rsvp_core::transition::Transition;
//! use rsvp_core::types::{EventStatus, NewEvent, ParticipantId};
//! use chrono::Utc;
//!
//! let mut event = NewEvent::new("Board games night", 1).into_event(Utc::now());
//! let joined = Transition::Join(ParticipantId::new("alice")).try_apply(&mut event, Utc::now());
//!
//! assert!(joined);
//! assert_eq!(event.status, EventStatus::Full);
//! ```

pub use chrono::{DateTime, Utc};

pub mod entity_store;
pub mod environment;
pub mod error;
pub mod sync;
pub mod transition;
pub mod types;

pub use entity_store::{EntityStore, StoreError};
pub use error::{ErrorKind, RegistrationError, Result};
pub use sync::{SyncRequest, SyncResponse};
pub use transition::Transition;
pub use types::{
    CancelOutcome, Event, EventId, EventStatus, EventSummary, NewEvent, Page, PageMeta,
    ParticipantId,
};
