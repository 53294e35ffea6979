//! Delta sync engine.
//!
//! Answers "what changed for me since my watermark, and which of the events I
//! cache should I drop?" without a deletion log. Removal detection is a set
//! difference between the ids the client says it holds and the ids that are
//! still relevant to it right now, so it covers hard deletion and lost
//! membership alike.
//!
//! The new watermark comes from [`EntityStore::watermark`] before either
//! query runs. The store stamps every later commit strictly after it, so a
//! write racing with this sync, or landing in the same clock tick, is either
//! in this response or in the next one. Re-delivery is possible; loss is not.

use crate::metrics::SyncMetrics;
use chrono::{DateTime, Utc};
use rsvp_core::entity_store::EntityStore;
use rsvp_core::environment::Clock;
use rsvp_core::error::{RegistrationError, Result};
use rsvp_core::sync::{SyncRequest, SyncResponse};
use rsvp_core::types::{EventId, ParticipantId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Computes [`SyncResponse`]s for one requester at a time.
#[derive(Clone)]
pub struct DeltaSyncEngine {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    max_known_ids: usize,
}

impl DeltaSyncEngine {
    /// Create an engine with the default known-id bound.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_known_ids: crate::config::DEFAULT_MAX_KNOWN_IDS,
        }
    }

    /// Set the largest accepted `known_ids` set.
    #[must_use]
    pub const fn with_max_known_ids(mut self, max_known_ids: usize) -> Self {
        self.max_known_ids = max_known_ids;
        self
    }

    /// Events relevant to `identity` edited after `request.since`, plus the
    /// `request.known_ids` that are no longer relevant.
    ///
    /// A missing `since` means a full resync from the Unix epoch. A missing
    /// `known_ids` opts out of removal detection and yields no removed ids.
    /// Duplicate known ids are reported at most once, in first-seen order.
    ///
    /// # Errors
    ///
    /// - `Validation`: more known ids than the configured bound
    /// - `Store`: the backend failed
    #[tracing::instrument(skip_all, fields(participant = %identity))]
    pub async fn sync(&self, identity: &ParticipantId, request: SyncRequest) -> Result<SyncResponse> {
        let since = request.since.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let known = match request.known_ids {
            Some(ids) => {
                if ids.len() > self.max_known_ids {
                    return Err(RegistrationError::Validation(format!(
                        "{} known ids exceed the limit of {}",
                        ids.len(),
                        self.max_known_ids
                    )));
                }
                Some(dedup_preserving_order(ids))
            },
            None => None,
        };

        let watermark = self.store.watermark(self.clock.now()).await?;
        let changed = self.store.changed_since(identity, since).await?;

        let removed_ids = match known {
            Some(known) if !known.is_empty() => {
                let relevant: HashSet<EventId> = self
                    .store
                    .relevant_among(identity, &known)
                    .await?
                    .into_iter()
                    .collect();
                known
                    .into_iter()
                    .filter(|id| !relevant.contains(id))
                    .collect()
            },
            _ => Vec::new(),
        };

        debug!(
            participant = %identity,
            %since,
            %watermark,
            changed = changed.len(),
            removed = removed_ids.len(),
            "Sync computed"
        );
        SyncMetrics::record(removed_ids.len());

        Ok(SyncResponse {
            watermark,
            changed,
            removed_ids,
        })
    }

    /// [`sync`](Self::sync) with query-string inputs: an RFC 3339 `since`
    /// and a comma-separated id list.
    ///
    /// # Errors
    ///
    /// - `Validation`: unparsable watermark, malformed id, or too many ids
    /// - `Store`: the backend failed
    pub async fn sync_query(
        &self,
        identity: &ParticipantId,
        since: Option<&str>,
        ids_csv: Option<&str>,
    ) -> Result<SyncResponse> {
        let request = SyncRequest::from_query(since, ids_csv)?;
        self.sync(identity, request).await
    }
}

fn dedup_preserving_order(ids: Vec<EventId>) -> Vec<EventId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;
    use rsvp_testing::{EventFixture, InMemoryEntityStore, ManualClock, test_clock};

    fn engine(store: &InMemoryEntityStore, clock: &ManualClock) -> DeltaSyncEngine {
        DeltaSyncEngine::new(Arc::new(store.clone()), Arc::new(clock.clone()))
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let ids: Vec<EventId> = ["b", "a", "b", "c", "a"].into_iter().map(EventId::from).collect();
        let deduped = dedup_preserving_order(ids);
        assert_eq!(
            deduped,
            ["b", "a", "c"].into_iter().map(EventId::from).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn full_resync_returns_every_relevant_event() {
        let t0 = test_clock().now();
        let store = InMemoryEntityStore::with_events([
            EventFixture::new("A").id("a").joined(["me"]).build(t0),
            EventFixture::new("B").id("b").joined(["you"]).build(t0),
        ]);
        let clock = ManualClock::new(t0 + Duration::seconds(1));

        let response = engine(&store, &clock)
            .sync(&"me".into(), SyncRequest::full())
            .await
            .unwrap();

        assert_eq!(response.changed.len(), 1);
        assert_eq!(response.changed[0].id, EventId::from("a"));
        assert!(response.removed_ids.is_empty());
        assert_eq!(response.watermark, t0 + Duration::seconds(1));
    }

    #[tokio::test]
    async fn removed_ids_keep_caller_order_and_collapse_duplicates() {
        let t0 = test_clock().now();
        let store = InMemoryEntityStore::with_events([
            EventFixture::new("Kept").id("kept").joined(["me"]).build(t0),
        ]);
        let clock = ManualClock::new(t0);

        let request = SyncRequest::default()
            .since(t0)
            .known_ids(["z", "kept", "y", "z"].into_iter().map(EventId::from));
        let response = engine(&store, &clock).sync(&"me".into(), request).await.unwrap();

        assert_eq!(
            response.removed_ids,
            vec![EventId::from("z"), EventId::from("y")]
        );
    }

    #[tokio::test]
    async fn too_many_known_ids_is_a_validation_error() {
        let store = InMemoryEntityStore::new();
        let clock = ManualClock::new(test_clock().now());
        let engine = engine(&store, &clock).with_max_known_ids(2);

        let request = SyncRequest::default().known_ids(["a", "b", "c"].into_iter().map(EventId::from));
        let err = engine.sync(&"me".into(), request).await.unwrap_err();

        assert_eq!(err.kind(), rsvp_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn malformed_query_is_rejected_before_the_store() {
        let store = InMemoryEntityStore::new();
        let clock = ManualClock::new(test_clock().now());

        let err = engine(&store, &clock)
            .sync_query(&"me".into(), Some("last tuesday"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), rsvp_core::ErrorKind::Validation);
    }
}
