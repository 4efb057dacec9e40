use bytes::Bytes;
use murmur_core::{Event, TopicHandle};
use murmur_sessions::SessionError;

use crate::*;

/// Topic handles count up in join order and are never handed out twice,
/// even after the topic is left and its name joined again.
#[tokio::test]
async fn handles_are_monotonic_and_tombstones_stay() {
    let Net { registry, .. } = net();
    let (s, rec) = open(&registry, config("mem/t", "lobby")).await;

    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        handles.push(registry.join(s, name).await.unwrap());
    }
    assert_eq!(handles, [TopicHandle(1), TopicHandle(2), TopicHandle(3)]);

    assert!(registry.leave(s, TopicHandle(2)).await);
    assert_eq!(registry.name(s, TopicHandle(2)).await, None);
    assert_eq!(registry.find(s, "b").await, None);

    assert_eq!(registry.join(s, "d").await.unwrap(), TopicHandle(4));
    assert_eq!(registry.join(s, "b").await.unwrap(), TopicHandle(5));
    assert_eq!(registry.find(s, "b").await, Some(TopicHandle(5)));

    let joins: Vec<Event> = rec
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::TopicJoined { .. }))
        .collect();
    let expected: Vec<Event> = (0..=5).map(|t| joined(s, t)).collect();
    assert_eq!(joins, expected);
    registry.shutdown_all().await;
}

#[tokio::test]
async fn leave_is_idempotent() {
    let Net { registry, .. } = net();
    let (s, rec) = open(&registry, config("mem/l", "lobby")).await;
    let t = registry.join(s, "once").await.unwrap();

    assert!(registry.leave(s, t).await);
    assert!(!registry.leave(s, t).await);
    assert!(!registry.leave(s, TopicHandle(99)).await);

    assert_eq!(rec.count(|e| *e == left(s, t.0)), 1);
    registry.shutdown_all().await;
}

#[tokio::test]
async fn names_and_handles_round_trip() {
    let Net { registry, .. } = net();
    let (s, _rec) = open(&registry, config("mem/n", "lobby")).await;

    for name in ["alpha", "beta/with/slashes", "γάμμα"] {
        let t = registry.join(s, name).await.unwrap();
        assert_eq!(registry.name(s, t).await.as_deref(), Some(name));
        assert_eq!(registry.find(s, name).await, Some(t));
    }
    assert_eq!(registry.find(s, "lobby").await, Some(TopicHandle(0)));
    assert_eq!(registry.find(s, "missing").await, None);
    registry.shutdown_all().await;
}

#[tokio::test]
async fn duplicate_join_is_rejected() {
    let Net { registry, .. } = net();
    let (s, _rec) = open(&registry, config("mem/dup", "lobby")).await;

    registry.join(s, "chat").await.unwrap();
    assert!(matches!(
        registry.join(s, "chat").await,
        Err(SessionError::AlreadyJoined(name)) if name == "chat"
    ));
    assert!(matches!(
        registry.join(s, "lobby").await,
        Err(SessionError::AlreadyJoined(_))
    ));
    registry.shutdown_all().await;
}

/// Publishing needs a joined topic and a willing pub/sub engine.
#[tokio::test]
async fn publish_is_gated() {
    let Net { hub, registry, .. } = net();
    let (s, rec) = open(&registry, config("mem/p", "lobby")).await;
    let t = registry.join(s, "news").await.unwrap();

    assert!(registry.publish(s, t, Bytes::from_static(b"one")).await);
    rec.wait_for(|evs| evs.iter().any(|e| matches!(e, Event::MessageReceived { .. })))
        .await;
    assert!(!registry.publish(s, TopicHandle(42), Bytes::from_static(b"two")).await);

    hub.fail_publishes(true).await;
    assert!(!registry.publish(s, t, Bytes::from_static(b"three")).await);
    hub.fail_publishes(false).await;

    assert!(registry.leave(s, t).await);
    assert!(!registry.publish(s, t, Bytes::from_static(b"four")).await);

    let delivered: Vec<Vec<u8>> = rec
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::MessageReceived { message, .. } => Some(message.data),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec![b"one".to_vec()]);
    registry.shutdown_all().await;
}
