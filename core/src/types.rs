//! Identifiers, statuses and the `Event` entity.
//!
//! Identifiers are string newtypes. `FromStr` validates input coming from the
//! outside (query strings, request bodies); `new()` and `From<String>` do not
//! and are meant for trusted, application-controlled values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest identifier accepted by `FromStr`.
pub const MAX_ID_LEN: usize = 128;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct ParseIdError(String);

fn validate_id(s: &str) -> Result<(), ParseIdError> {
    if s.is_empty() {
        return Err(ParseIdError("identifier cannot be empty".to_string()));
    }
    if s.trim() != s {
        return Err(ParseIdError(format!(
            "identifier {s:?} has surrounding whitespace"
        )));
    }
    if s.len() > MAX_ID_LEN {
        return Err(ParseIdError(format!(
            "identifier is {} bytes long (max {MAX_ID_LEN})",
            s.len()
        )));
    }
    // Known ids travel as a comma-separated list.
    if s.contains(',') {
        return Err(ParseIdError(format!("identifier {s:?} contains a comma")));
    }
    Ok(())
}

/// Stable identifier of an [`Event`], immutable after creation.
///
/// # Examples
///
/// ```
/// use rsvp_core::types::EventId;
///
/// let id: EventId = "summer-hike".parse().unwrap();
/// assert_eq!(id.as_str(), "summer-hike");
/// assert!("".parse::<EventId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create an `EventId` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random id (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_id(s)?;
        Ok(Self(s.to_string()))
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a participant (the requesting identity during sync).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a `ParticipantId` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_id(s)?;
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Event lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Registrable while occupancy is below capacity
    Open,
    /// Occupancy equals capacity; unregistration still allowed
    Full,
    /// Terminal; membership is frozen
    Cancelled,
}

impl EventStatus {
    /// Name used on the wire and in the `events.status` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Full => "Full",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for status parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for EventStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Full" => Ok(Self::Full),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A capacity-limited event.
///
/// Mutated only through [`Transition`](crate::transition::Transition), which
/// keeps the occupancy and membership invariants intact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stable identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Optional long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Maximum number of participants (>= 1)
    pub capacity_total: u32,
    /// Current number of participants
    pub capacity_occupied: u32,
    /// Registered participants, unique, in registration order
    pub participants: Vec<ParticipantId>,
    /// Lifecycle status
    pub status: EventStatus,
    /// Last time occupancy or status changed
    pub edited_at: DateTime<Utc>,
}

/// A violated entity invariant, as reported by [`Event::check_invariants`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `capacity_total` is zero
    #[error("capacity total must be at least 1")]
    ZeroCapacity,

    /// More participants than seats
    #[error("occupied {occupied} exceeds total {total}")]
    Overbooked {
        /// Occupied seats
        occupied: u32,
        /// Total seats
        total: u32,
    },

    /// Counter and membership disagree
    #[error("occupied {occupied} but {members} participants recorded")]
    MembershipMismatch {
        /// Occupied seats
        occupied: u32,
        /// Length of the participant list
        members: usize,
    },

    /// Same participant listed twice
    #[error("participant {0} listed more than once")]
    DuplicateParticipant(ParticipantId),
}

impl Event {
    /// Whether `participant` is registered.
    #[must_use]
    pub fn has_participant(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    /// Seats still available.
    #[must_use]
    pub const fn free_slots(&self) -> u32 {
        self.capacity_total.saturating_sub(self.capacity_occupied)
    }

    /// Check the occupancy and membership invariants.
    ///
    /// # Errors
    ///
    /// Returns the first invariant found violated.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.capacity_total == 0 {
            return Err(InvariantViolation::ZeroCapacity);
        }
        if self.capacity_occupied > self.capacity_total {
            return Err(InvariantViolation::Overbooked {
                occupied: self.capacity_occupied,
                total: self.capacity_total,
            });
        }
        if self.participants.len() != self.capacity_occupied as usize {
            return Err(InvariantViolation::MembershipMismatch {
                occupied: self.capacity_occupied,
                members: self.participants.len(),
            });
        }
        for (i, p) in self.participants.iter().enumerate() {
            if self.participants[..i].contains(p) {
                return Err(InvariantViolation::DuplicateParticipant(p.clone()));
            }
        }
        Ok(())
    }

    /// Public view of this event for `viewer`.
    #[must_use]
    pub fn summary_for(&self, viewer: Option<&ParticipantId>) -> EventSummary {
        EventSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            image: self.image.clone(),
            capacity_total: self.capacity_total,
            capacity_occupied: self.capacity_occupied,
            status: self.status,
            edited_at: self.edited_at,
            already_registered: viewer.is_some_and(|v| self.has_participant(v)),
        }
    }
}

/// Input to the admin create path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Explicit id, or `None` to mint one
    #[serde(default)]
    pub id: Option<EventId>,
    /// Display name
    pub name: String,
    /// Optional long description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional image URL
    #[serde(default)]
    pub image: Option<String>,
    /// Maximum number of participants
    pub capacity_total: u32,
}

impl NewEvent {
    /// Minimal input: a name and a capacity.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity_total: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            image: None,
            capacity_total,
        }
    }

    /// Check the create-time rules.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the rule that failed.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("event name cannot be empty".to_string());
        }
        if self.capacity_total == 0 {
            return Err("capacity total must be at least 1".to_string());
        }
        if let Some(id) = &self.id {
            validate_id(id.as_str()).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Build the initial `Open`, empty event.
    #[must_use]
    pub fn into_event(self, now: DateTime<Utc>) -> Event {
        Event {
            id: self.id.unwrap_or_else(EventId::generate),
            name: self.name,
            description: self.description,
            image: self.image,
            capacity_total: self.capacity_total,
            capacity_occupied: 0,
            participants: Vec::new(),
            status: EventStatus::Open,
            edited_at: now,
        }
    }
}

/// Event as shown to a client: no participant list, but whether the viewer
/// is one of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    /// Stable identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Optional long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Maximum number of participants
    pub capacity_total: u32,
    /// Current number of participants
    pub capacity_occupied: u32,
    /// Lifecycle status
    pub status: EventStatus,
    /// Last time occupancy or status changed
    pub edited_at: DateTime<Utc>,
    /// Whether the viewer is registered
    pub already_registered: bool,
}

/// What `cancel_or_delete` did.
///
/// Serialises as `{"action":"deleted"}` or `{"action":"cancelled"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum CancelOutcome {
    /// The event was empty and has been removed
    Deleted,
    /// The event had participants and is now `Cancelled`
    Cancelled,
}

/// Pagination metadata of a [`Page`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total number of events
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Page size
    pub limit: u32,
    /// Number of pages
    pub page_count: u64,
}

impl PageMeta {
    /// Metadata for `page` of size `limit` over `total` items.
    #[must_use]
    pub const fn new(total: u64, page: u32, limit: u32) -> Self {
        let page_count = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            total,
            page,
            limit,
            page_count,
        }
    }
}

/// A page of event summaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Summaries on this page
    pub data: Vec<EventSummary>,
    /// Pagination metadata
    pub meta: PageMeta,
}
