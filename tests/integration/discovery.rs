use std::time::{Duration, Instant};

use murmur_core::{Event, PeerId};
use murmur_sessions::{DiscoveryState, SessionError};

use crate::*;

fn connected(evs: &[Event], peer: &PeerId) -> bool {
    evs.iter()
        .any(|e| matches!(e, Event::PeerConnected { peer: p, .. } if p == peer))
}

fn disconnected(evs: &[Event], peer: &PeerId) -> bool {
    evs.iter()
        .any(|e| matches!(e, Event::PeerDisconnected { peer: p, .. } if p == peer))
}

/// A session nobody else is looking for hits the fatal path quickly.
#[tokio::test]
async fn lone_session_times_out() {
    let Net {
        registry,
        mut fatal,
        ..
    } = net();
    let started = Instant::now();
    let s = registry
        .create(config("mem/alone", "nobody-here").with_timeout_secs(0.1))
        .await
        .unwrap();

    let report = tokio::time::timeout(WAIT, fatal.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.session, s);
    assert!(matches!(report.error, SessionError::DiscoveryTimeout(_)));
    assert!(report.error.is_fatal());
    assert_eq!(
        registry.get(s).unwrap().discovery_state(),
        DiscoveryState::TimedOut
    );
    registry.shutdown_all().await;
}

#[tokio::test]
async fn two_sessions_find_each_other() {
    let Net {
        registry,
        mut fatal,
        ..
    } = net();
    let (a, rec_a) = open(&registry, config("mem/a", "meet")).await;
    let (b, rec_b) = open(&registry, config("mem/b", "meet")).await;
    let id_a = registry.local_id(a).unwrap();
    let id_b = registry.local_id(b).unwrap();

    rec_a.wait_for(|evs| connected(evs, &id_b)).await;
    rec_b.wait_for(|evs| connected(evs, &id_a)).await;

    for (s, rec) in [(a, &rec_a), (b, &rec_b)] {
        rec.wait_for(|evs| evs.contains(&Event::DiscoveryCompleted { session: s }))
            .await;
        let mut watch = registry.get(s).unwrap().watch_discovery();
        let state = *watch
            .wait_for(|st| st.is_terminal())
            .await
            .unwrap();
        assert_eq!(state, DiscoveryState::Connected);
    }
    assert!(fatal.try_recv().is_err());
    registry.shutdown_all().await;
}

/// The tracker reports what changed between polls: `{A}` then `{A,C}`
/// then `{C}` is `+A`, `+C`, `-A`.
#[tokio::test]
async fn peer_changes_are_reported_as_diffs() {
    let Net { hub, registry, .. } = net();
    let (x, rec) = open(&registry, config("mem/x", "diff")).await;
    let (a, _) = open(&registry, config("mem/a", "diff")).await;
    let id_x = registry.local_id(x).unwrap();
    let id_a = registry.local_id(a).unwrap();
    rec.wait_for(|evs| connected(evs, &id_a)).await;

    let (c, _) = open(&registry, config("mem/c", "diff")).await;
    let id_c = registry.local_id(c).unwrap();
    rec.wait_for(|evs| connected(evs, &id_c)).await;

    hub.sever(&id_x, &id_a).await;
    rec.wait_for(|evs| disconnected(evs, &id_a)).await;

    let peer_events: Vec<Event> = rec
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                Event::PeerConnected { .. } | Event::PeerDisconnected { .. }
            )
        })
        .collect();
    assert_eq!(
        peer_events,
        vec![
            Event::PeerConnected {
                session: x,
                peer: id_a.clone()
            },
            Event::PeerConnected {
                session: x,
                peer: id_c.clone()
            },
            Event::PeerDisconnected {
                session: x,
                peer: id_a
            },
        ]
    );
    assert_eq!(
        registry.get(x).unwrap().peers().await.into_iter().collect::<Vec<_>>(),
        vec![id_c]
    );
    registry.shutdown_all().await;
}

/// A bootstrap address links two sessions that never share a rendezvous.
#[tokio::test]
async fn bootstrap_peers_are_dialed() {
    let Net { hub, registry, .. } = net();
    let (a, _) = open(&registry, config("mem/boot-a", "here")).await;
    let (b, _) = open(
        &registry,
        config("mem/boot-b", "there").with_bootstrap_peers(vec!["mem/boot-a".to_string()]),
    )
    .await;
    let id_a = registry.local_id(a).unwrap();
    let id_b = registry.local_id(b).unwrap();

    tokio::time::timeout(WAIT, async {
        while !hub.is_linked(&id_a, &id_b).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    registry.shutdown_all().await;
}
