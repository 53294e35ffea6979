//! A client replica reconciling against the sync engine over several rounds.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::Duration;
use rsvp_core::environment::Clock;
use rsvp_core::types::{EventStatus, NewEvent, ParticipantId};
use rsvp_registry::{CapacityService, DeltaSyncEngine, LocalReplica};
use rsvp_testing::{InMemoryEntityStore, ManualClock, test_clock};
use std::sync::Arc;

fn setup() -> (ManualClock, CapacityService, DeltaSyncEngine) {
    let store = Arc::new(InMemoryEntityStore::new());
    let clock = ManualClock::new(test_clock().now());
    let capacity = CapacityService::new(store.clone(), Arc::new(clock.clone()));
    let sync = DeltaSyncEngine::new(store, Arc::new(clock.clone()));
    (clock, capacity, sync)
}

#[tokio::test]
async fn replica_tracks_server_across_rounds() {
    let (clock, capacity, sync) = setup();
    let me = ParticipantId::new("ana");

    let run = capacity.create(NewEvent::new("Run", 4)).await.unwrap();
    let swim = capacity.create(NewEvent::new("Swim", 4)).await.unwrap();
    clock.advance(Duration::seconds(1));
    capacity.register(&run.id, &me).await.unwrap();
    capacity.register(&swim.id, &me).await.unwrap();
    clock.advance(Duration::seconds(1));

    let mut replica = LocalReplica::new();
    let report = replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(report.upserted, 2);
    assert_eq!(replica.watermark(), Some(clock.now()));

    // Someone else joins Run; I leave Swim.
    clock.advance(Duration::seconds(1));
    capacity.register(&run.id, &"ben".into()).await.unwrap();
    capacity.unregister(&swim.id, &me).await.unwrap();
    clock.advance(Duration::seconds(1));

    let report = replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(report.upserted, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(replica.len(), 1);
    assert_eq!(replica.get(&run.id).unwrap().capacity_occupied, 2);
    assert!(replica.get(&swim.id).is_none());

    // Nothing happened since.
    clock.advance(Duration::seconds(1));
    let report = replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(report.upserted, 0);
    assert_eq!(report.removed, 0);
}

#[tokio::test]
async fn cancelled_event_stays_cached_with_new_status() {
    let (clock, capacity, sync) = setup();
    let me = ParticipantId::new("ana");
    let event = capacity.create(NewEvent::new("Concert", 3)).await.unwrap();
    clock.advance(Duration::seconds(1));
    capacity.register(&event.id, &me).await.unwrap();

    let mut replica = LocalReplica::new();
    replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());

    clock.advance(Duration::seconds(1));
    capacity.cancel_or_delete(&event.id).await.unwrap();
    clock.advance(Duration::seconds(1));

    replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(replica.get(&event.id).unwrap().status, EventStatus::Cancelled);
}

#[tokio::test]
async fn reapplying_a_response_is_harmless() {
    let (clock, capacity, sync) = setup();
    let me = ParticipantId::new("ana");
    let event = capacity.create(NewEvent::new("Brunch", 3)).await.unwrap();
    clock.advance(Duration::seconds(1));
    capacity.register(&event.id, &me).await.unwrap();

    let mut replica = LocalReplica::new();
    let response = sync.sync(&me, replica.sync_request()).await.unwrap();
    replica.apply(response.clone());
    let once = serde_json::to_value(&replica).unwrap();

    replica.apply(response);
    assert_eq!(serde_json::to_value(&replica).unwrap(), once);
}

#[tokio::test]
async fn queued_unregistrations_replay_when_back_online() {
    let (clock, capacity, sync) = setup();
    let me = ParticipantId::new("ana");
    let event = capacity.create(NewEvent::new("Yoga", 3)).await.unwrap();
    clock.advance(Duration::seconds(1));
    capacity.register(&event.id, &me).await.unwrap();

    let mut replica = LocalReplica::new();
    replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());

    // Offline: record the intent only.
    replica.queue_unregister(event.id.clone(), clock.now());
    assert_eq!(replica.len(), 1);

    // Online again.
    clock.advance(Duration::seconds(1));
    for pending in replica.drain_pending() {
        capacity.unregister(&pending.event_id, &me).await.unwrap();
    }
    clock.advance(Duration::seconds(1));

    let report = replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(report.removed, 1);
    assert!(replica.is_empty());
    assert!(replica.pending().is_empty());
}

#[tokio::test]
async fn replica_catches_a_registration_made_in_the_same_tick_as_its_sync() {
    let (_clock, capacity, sync) = setup();
    let me = ParticipantId::new("ana");
    let event = capacity.create(NewEvent::new("Sprint", 3)).await.unwrap();

    let mut replica = LocalReplica::new();
    replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert!(replica.is_empty());

    // Same clock reading as the sync above.
    capacity.register(&event.id, &me).await.unwrap();

    let report = replica.apply(sync.sync(&me, replica.sync_request()).await.unwrap());
    assert_eq!(report.upserted, 1);
    assert_eq!(replica.get(&event.id).unwrap().capacity_occupied, 1);
}
