//! The capacity state machine as data.
//!
//! A [`Transition`] carries both halves of an atomic conditional update: the
//! predicate ([`Transition::permits`]) and the mutation
//! ([`Transition::apply`]). Store backends evaluate the two together without
//! interleaving, so the occupancy/status math is never split across round
//! trips and never computed from a stale client-side read.
//!
//! ```text
//!            join (last seat)
//!   ┌──────┐ ───────────────▶ ┌──────┐
//!   │ Open │                  │ Full │
//!   └──────┘ ◀─────────────── └──────┘
//!      │     leave / resize up
//!      │ cancel (occupied > 0)
//!      ▼
//!   ┌───────────┐
//!   │ Cancelled │  terminal
//!   └───────────┘
//! ```

use crate::types::{Event, EventStatus, ParticipantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A state-machine step applied to one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Add a participant, taking one seat
    Join(ParticipantId),
    /// Remove a participant, freeing one seat
    Leave(ParticipantId),
    /// Set a new total capacity
    Resize(u32),
    /// Soft-cancel a non-empty `Open` event
    Cancel,
}

impl Transition {
    /// Short name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "register",
            Self::Leave(_) => "unregister",
            Self::Resize(_) => "resize",
            Self::Cancel => "cancel",
        }
    }

    /// The conditional-update predicate.
    #[must_use]
    pub fn permits(&self, event: &Event) -> bool {
        match self {
            Self::Join(p) => {
                event.status == EventStatus::Open
                    && event.capacity_occupied < event.capacity_total
                    && !event.has_participant(p)
            },
            Self::Leave(p) => {
                matches!(event.status, EventStatus::Open | EventStatus::Full)
                    && event.has_participant(p)
            },
            Self::Resize(total) => *total >= 1 && event.capacity_occupied <= *total,
            Self::Cancel => event.status == EventStatus::Open && event.capacity_occupied > 0,
        }
    }

    /// Apply the mutation, folding status reconciliation into the same step.
    ///
    /// Callers must check [`permits`](Self::permits) first; the in-memory and
    /// `PostgreSQL` stores only call this after the predicate held.
    pub fn apply(&self, event: &mut Event, at: DateTime<Utc>) {
        match self {
            Self::Join(p) => {
                event.participants.push(p.clone());
                event.capacity_occupied += 1;
                if event.capacity_occupied >= event.capacity_total {
                    event.status = EventStatus::Full;
                }
            },
            Self::Leave(p) => {
                event.participants.retain(|existing| existing != p);
                event.capacity_occupied = event.capacity_occupied.saturating_sub(1);
                if event.status == EventStatus::Full
                    && event.capacity_occupied < event.capacity_total
                {
                    event.status = EventStatus::Open;
                }
            },
            Self::Resize(total) => {
                event.capacity_total = *total;
                match event.status {
                    EventStatus::Full if event.capacity_occupied < *total => {
                        event.status = EventStatus::Open;
                    },
                    EventStatus::Open if event.capacity_occupied >= *total => {
                        event.status = EventStatus::Full;
                    },
                    _ => {},
                }
            },
            Self::Cancel => event.status = EventStatus::Cancelled,
        }
        event.edited_at = event.edited_at.max(at);
    }

    /// `permits` then `apply`; returns whether the event changed.
    pub fn try_apply(&self, event: &mut Event, at: DateTime<Utc>) -> bool {
        if !self.permits(event) {
            return false;
        }
        self.apply(event, at);
        true
    }
}
