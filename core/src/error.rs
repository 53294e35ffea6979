//! Error taxonomy for registration, capacity and sync operations.
//!
//! Every failure surfaced by the capacity service or the sync engine is one
//! of these variants. An atomic attempt that did not match is never reported
//! as-is; it is diagnosed into a specific entry first.

use crate::entity_store::StoreError;
use crate::types::{EventId, EventStatus};
use thiserror::Error;

/// Result type alias for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Coarse classification of a [`RegistrationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity absent; not retried
    NotFound,
    /// State already reflects the intent, or an incompatible effect won
    Conflict,
    /// Precondition violated; needs corrective user action
    Rejected,
    /// Malformed input, rejected before touching the store
    Validation,
    /// Store or infrastructure failure
    Internal,
}

/// Failures of the capacity state machine and the delta sync engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════

    /// The event does not exist (never did, or was hard-deleted).
    #[error("Event not found: {0}")]
    NotFound(EventId),

    // ═══════════════════════════════════════════════════════════
    // Conflicts
    // ═══════════════════════════════════════════════════════════

    /// The participant is already registered.
    #[error("Participant already registered to this event")]
    AlreadyRegistered,

    /// The event is cancelled; its membership is frozen.
    #[error("Event is cancelled")]
    EventCancelled,

    // ═══════════════════════════════════════════════════════════
    // Rejections
    // ═══════════════════════════════════════════════════════════

    /// The participant is not registered.
    #[error("Participant is not registered to this event")]
    NotRegistered,

    /// The event's status does not allow the operation.
    #[error("Operation not allowed, event status is \"{status}\"")]
    WrongStatus {
        /// Status observed during diagnosis
        status: EventStatus,
    },

    /// No seat left.
    #[error("Event is full")]
    Full,

    /// Requested capacity would strand existing participants.
    #[error("Capacity {requested} is below the {occupied} seats already taken")]
    BelowOccupancy {
        /// Requested total capacity
        requested: u32,
        /// Seats occupied at diagnosis time
        occupied: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════

    /// Malformed id, watermark or capacity input.
    #[error("Invalid input: {0}")]
    Validation(String),

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════

    /// The atomic attempt kept losing to concurrent writers.
    #[error("Event was modified concurrently, please retry")]
    Contended,

    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    /// Taxonomy bucket for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rsvp_core::error::{ErrorKind, RegistrationError};
    /// assert_eq!(RegistrationError::Full.kind(), ErrorKind::Rejected);
    /// assert_eq!(RegistrationError::AlreadyRegistered.kind(), ErrorKind::Conflict);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyRegistered | Self::EventCancelled => ErrorKind::Conflict,
            Self::NotRegistered
            | Self::WrongStatus { .. }
            | Self::Full
            | Self::BelowOccupancy { .. } => ErrorKind::Rejected,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Contended | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable wire code.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rsvp_core::error::RegistrationError;
    /// # use rsvp_core::types::EventStatus;
    /// let err = RegistrationError::WrongStatus { status: EventStatus::Cancelled };
    /// assert_eq!(err.code(), "rejected:status=Cancelled");
    /// ```
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::NotFound(_) => "not-found".to_string(),
            Self::AlreadyRegistered => "conflict:already-registered".to_string(),
            Self::EventCancelled => "conflict:event-cancelled".to_string(),
            Self::NotRegistered => "rejected:not-registered".to_string(),
            Self::WrongStatus { status } => format!("rejected:status={status}"),
            Self::Full => "rejected:full".to_string(),
            Self::BelowOccupancy { .. } => "rejected:below-occupancy".to_string(),
            Self::Validation(_) => "validation".to_string(),
            Self::Contended => "internal:contended".to_string(),
            Self::Store(_) => "internal".to_string(),
        }
    }

    /// Returns `true` if the caller can fix the request and try again.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Rejected | ErrorKind::Validation)
    }
}
