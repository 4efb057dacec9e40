use std::time::Duration;

use bytes::Bytes;
use murmur_core::{Event, EventKind, SessionHandle, TopicHandle};
use murmur_sessions::SessionError;

use crate::*;

/// Session slots are reused, but a handle to a destroyed session stays dead.
#[tokio::test]
async fn stale_handles_are_rejected_after_slot_reuse() {
    let Net { registry, .. } = net();

    let first = registry.create(config("mem/1", "stale")).await.unwrap();
    assert!(registry.destroy(first).await);
    let second = registry.create(config("mem/2", "stale")).await.unwrap();

    assert_eq!(second.index, first.index);
    assert_eq!(second.generation, first.generation + 1);
    assert!(!registry.is_valid(first));
    assert!(registry.is_valid(second));

    assert!(matches!(
        registry.join(first, "chat").await,
        Err(SessionError::UnknownSession(h)) if h == first
    ));
    assert!(matches!(registry.get(first), Err(SessionError::UnknownSession(_))));
    assert_eq!(registry.find(first, "stale").await, None);
    assert_eq!(registry.name(first, TopicHandle(0)).await, None);
    assert_eq!(registry.local_id(first), None);
    assert!(!registry.leave(first, TopicHandle(0)).await);
    assert!(!registry.publish(first, TopicHandle(0), Bytes::from_static(b"x")).await);
    assert!(!registry.register(first, EventKind::MessageReceived, |_| true));
    assert!(!registry.destroy(first).await);

    // The live session behind the reused slot is untouched.
    assert_eq!(registry.find(second, "stale").await, Some(TopicHandle(0)));
    assert_eq!(registry.count(), 1);
    registry.shutdown_all().await;
}

#[tokio::test]
async fn raw_handles_round_trip_through_the_registry() {
    let Net { registry, .. } = net();
    let handle = registry.create(config("mem/raw", "raw")).await.unwrap();

    let raw = handle.to_raw();
    assert!(registry.is_valid(SessionHandle::from_raw(raw)));
    assert_eq!(handle.to_string().parse::<SessionHandle>().unwrap(), handle);
    registry.shutdown_all().await;
}

/// Destroy leaves every joined topic, then reports the close, then goes
/// quiet.
#[tokio::test]
async fn destroy_reports_left_topics_then_closes() {
    let Net { hub, registry, .. } = net();
    let (s, rec) = open(&registry, config("mem/d", "lobby")).await;

    let a = registry.join(s, "a").await.unwrap();
    let b = registry.join(s, "b").await.unwrap();
    assert!(registry.leave(s, a).await);

    assert!(registry.destroy(s).await);
    let tail: Vec<Event> = rec
        .events()
        .into_iter()
        .filter(|e| matches!(e.kind(), EventKind::TopicLeft | EventKind::SessionClosed))
        .collect();
    assert_eq!(
        tail,
        vec![
            left(s, a.0),
            left(s, 0),
            left(s, b.0),
            Event::SessionClosed { session: s },
        ]
    );

    let before = rec.events().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rec.events().len(), before);
    assert_eq!(hub.node_count().await, 0);
    assert_eq!(registry.count(), 0);
}

/// Two sessions on independent networks never see each other, even under
/// the same rendezvous and topic names.
#[tokio::test]
async fn sessions_on_independent_networks_are_isolated() {
    let first = net();
    let second = net();

    let (a, rec_a) = open(&first.registry, config("mem/shared", "meet")).await;
    let (b, rec_b) = open(&second.registry, config("mem/shared", "meet")).await;

    let ta = first.registry.join(a, "chat").await.unwrap();
    let tb = second.registry.join(b, "chat").await.unwrap();
    assert_eq!(ta, tb);

    assert!(first.registry.publish(a, ta, Bytes::from_static(b"only a")).await);
    rec_a
        .wait_for(|evs| evs.iter().any(|e| matches!(e, Event::MessageReceived { .. })))
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        rec_b.count(|e| matches!(e, Event::MessageReceived { .. } | Event::PeerConnected { .. })),
        0
    );
    assert_eq!(
        rec_a.count(|e| matches!(e, Event::PeerConnected { .. })),
        0
    );

    first.registry.shutdown_all().await;
    second.registry.shutdown_all().await;
}

/// Callbacks registered through the registry replace the bridge binding.
#[tokio::test]
async fn registered_callbacks_replace_earlier_bindings() {
    let Net { registry, .. } = net();
    let (s, rec) = open(&registry, config("mem/r", "lobby")).await;

    let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = seen.clone();
    assert!(registry.register(s, EventKind::TopicJoined, move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        true
    }));

    registry.join(s, "x").await.unwrap();
    registry.join(s, "y").await.unwrap();
    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    // Only the rendezvous join reached the original recorder.
    assert_eq!(rec.count(|e| e.kind() == EventKind::TopicJoined), 1);
    registry.shutdown_all().await;
}
