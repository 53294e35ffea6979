//! In-process client replica.
//!
//! Mirrors what an intermittently connected client keeps: a cache of the
//! events relevant to it, the watermark of its last successful sync and a
//! queue of unregistrations made while offline. The queue is a plain record;
//! replaying it against the server is left to the caller via
//! [`LocalReplica::drain_pending`].

use chrono::{DateTime, Utc};
use rsvp_core::sync::{SyncRequest, SyncResponse};
use rsvp_core::types::{Event, EventId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// An unregistration recorded while offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUnregister {
    /// Event to leave
    pub event_id: EventId,
    /// When the user asked
    pub queued_at: DateTime<Utc>,
}

/// What one [`LocalReplica::apply`] call changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Events inserted or replaced
    pub upserted: usize,
    /// Cached events dropped
    pub removed: usize,
}

/// Client-side cache reconciled through delta sync.
///
/// # Example
///
/// ```
/// use rsvp_registry::LocalReplica;
///
/// let replica = LocalReplica::new();
/// let request = replica.sync_request();
/// assert!(request.since.is_none());
/// assert_eq!(request.known_ids, Some(vec![]));
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalReplica {
    events: BTreeMap<EventId, Event>,
    watermark: Option<DateTime<Utc>>,
    pending: Vec<PendingUnregister>,
}

impl LocalReplica {
    /// Empty replica that has never synced.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watermark of the last applied response.
    #[must_use]
    pub const fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Cached event by id.
    #[must_use]
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Cached events in id order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Cached ids in id order.
    pub fn ids(&self) -> impl Iterator<Item = &EventId> {
        self.events.keys()
    }

    /// Number of cached events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Next request: the stored watermark plus every cached id.
    #[must_use]
    pub fn sync_request(&self) -> SyncRequest {
        SyncRequest {
            since: self.watermark,
            known_ids: Some(self.events.keys().cloned().collect()),
        }
    }

    /// Apply a sync response.
    ///
    /// Upserts `changed`, drops `removed_ids` and advances the watermark.
    /// Applying the same response twice leaves the replica unchanged, and a
    /// cached copy is never replaced by an older edit of the same event.
    pub fn apply(&mut self, response: SyncResponse) -> ApplyReport {
        let mut report = ApplyReport::default();

        for event in response.changed {
            let newer = self
                .events
                .get(&event.id)
                .is_none_or(|cached| cached.edited_at <= event.edited_at);
            if newer {
                self.events.insert(event.id.clone(), event);
                report.upserted += 1;
            }
        }

        for id in &response.removed_ids {
            if self.events.remove(id).is_some() {
                report.removed += 1;
            }
        }

        self.watermark = Some(
            self.watermark
                .map_or(response.watermark, |current| current.max(response.watermark)),
        );

        debug!(
            upserted = report.upserted,
            removed = report.removed,
            cached = self.events.len(),
            "Sync response applied"
        );
        report
    }

    /// Drop a cached event locally, e.g. after a successful unregister.
    pub fn remove(&mut self, id: &EventId) -> Option<Event> {
        self.events.remove(id)
    }

    /// Record an unregistration to replay once back online.
    ///
    /// Queuing the same event twice keeps the first entry.
    pub fn queue_unregister(&mut self, event_id: EventId, at: DateTime<Utc>) {
        if self.pending.iter().any(|p| p.event_id == event_id) {
            return;
        }
        self.pending.push(PendingUnregister {
            event_id,
            queued_at: at,
        });
    }

    /// Queued unregistrations, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[PendingUnregister] {
        &self.pending
    }

    /// Forget a queued unregistration.
    pub fn cancel_pending(&mut self, event_id: &EventId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| &p.event_id != event_id);
        self.pending.len() != before
    }

    /// Take every queued unregistration, leaving the queue empty.
    pub fn drain_pending(&mut self) -> Vec<PendingUnregister> {
        std::mem::take(&mut self.pending)
    }
}
