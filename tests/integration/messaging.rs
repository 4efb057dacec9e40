use std::time::Duration;

use bytes::Bytes;
use murmur_core::{Event, Identity, MessageRecord, PeerId, SessionHandle};

use crate::*;

fn messages(events: &[Event], topic: &str) -> Vec<MessageRecord> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::MessageReceived { message, .. } if message.topic == topic => {
                Some(message.clone())
            }
            _ => None,
        })
        .collect()
}

/// Two sessions on one network, linked and both subscribed to `chat`.
async fn pair(net: &Net) -> [(SessionHandle, Recorder, PeerId); 2] {
    let (a, rec_a) = open(&net.registry, config("mem/a", "meet")).await;
    let (b, rec_b) = open(&net.registry, config("mem/b", "meet")).await;
    let id_a = net.registry.local_id(a).unwrap();
    let id_b = net.registry.local_id(b).unwrap();

    rec_a
        .wait_for(|evs| {
            evs.iter()
                .any(|e| matches!(e, Event::PeerConnected { peer, .. } if *peer == id_b))
        })
        .await;
    net.registry.join(a, "chat").await.unwrap();
    net.registry.join(b, "chat").await.unwrap();
    [(a, rec_a, id_a), (b, rec_b, id_b)]
}

#[tokio::test]
async fn messages_reach_peers_and_echo_locally() {
    let net = net();
    let [(a, rec_a, id_a), (_b, rec_b, id_b)] = pair(&net).await;
    let chat = net.registry.find(a, "chat").await.unwrap();

    assert!(net.registry.publish(a, chat, Bytes::from_static(b"hello")).await);

    rec_b.wait_for(|evs| !messages(evs, "chat").is_empty()).await;
    rec_a.wait_for(|evs| !messages(evs, "chat").is_empty()).await;

    let remote = &messages(&rec_b.events(), "chat")[0];
    assert_eq!(remote.data, b"hello");
    assert_eq!(remote.from.as_ref(), Some(&id_a));
    assert!(!remote.is_local(&id_b));
    assert_eq!(remote.seqno.len(), 8);

    let echo = &messages(&rec_a.events(), "chat")[0];
    assert!(echo.is_local(&id_a));
    assert_eq!(echo.id, remote.id);

    // The record carries what a receiver needs to check the author.
    let key: [u8; 32] = remote.key.clone().unwrap().try_into().unwrap();
    let mut signed = remote.topic.as_bytes().to_vec();
    signed.extend_from_slice(&remote.seqno);
    signed.extend_from_slice(&remote.data);
    assert!(Identity::verify(&key, &signed, remote.signature.as_ref().unwrap()));

    net.registry.shutdown_all().await;
}

#[tokio::test]
async fn messages_keep_per_topic_order() {
    let net = net();
    let [(a, _rec_a, _), (_b, rec_b, _)] = pair(&net).await;
    let chat = net.registry.find(a, "chat").await.unwrap();

    for i in 0..20u8 {
        assert!(net.registry.publish(a, chat, Bytes::from(vec![i])).await);
    }
    rec_b.wait_for(|evs| messages(evs, "chat").len() == 20).await;

    let order: Vec<u8> = messages(&rec_b.events(), "chat").iter().map(|m| m.data[0]).collect();
    assert_eq!(order, (0..20).collect::<Vec<u8>>());
    net.registry.shutdown_all().await;
}

#[tokio::test]
async fn leaving_stops_delivery() {
    let net = net();
    let [(a, _rec_a, _), (b, rec_b, _)] = pair(&net).await;
    let chat_a = net.registry.find(a, "chat").await.unwrap();
    let chat_b = net.registry.find(b, "chat").await.unwrap();

    assert!(net.registry.publish(a, chat_a, Bytes::from_static(b"before")).await);
    rec_b.wait_for(|evs| messages(evs, "chat").len() == 1).await;

    assert!(net.registry.leave(b, chat_b).await);
    assert_eq!(net.hub.subscriber_count("chat").await, 1);
    assert!(net.registry.publish(a, chat_a, Bytes::from_static(b"after")).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(messages(&rec_b.events(), "chat").len(), 1);
    net.registry.shutdown_all().await;
}

#[tokio::test]
async fn events_serialize_with_a_type_tag() {
    let net = net();
    let (s, rec) = open(&net.registry, config("mem/json", "lobby")).await;
    rec.wait_for(|evs| !evs.is_empty()).await;

    let value = serde_json::to_value(&rec.events()[0]).unwrap();
    assert_eq!(value["type"], "topic_joined");
    assert_eq!(value["topic"], 0);
    assert_eq!(value["session"]["index"], s.index);
    net.registry.shutdown_all().await;
}
