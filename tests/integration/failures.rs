use std::time::Duration;

use murmur_core::{EventKind, SessionHandle};
use murmur_sessions::{DiscoveryState, FatalReport, SessionError};
use tokio::sync::mpsc;

use crate::*;

async fn next_report(fatal: &mut mpsc::UnboundedReceiver<FatalReport>) -> FatalReport {
    tokio::time::timeout(WAIT, fatal.recv())
        .await
        .expect("no fatal report")
        .expect("fatal channel closed")
}

#[tokio::test]
async fn unreachable_dht_is_fatal() {
    let Net {
        hub,
        registry,
        mut fatal,
    } = net();
    hub.set_dht_down(true).await;

    let s = registry.create(config("mem/dht", "lobby")).await.unwrap();
    let report = next_report(&mut fatal).await;
    assert_eq!(report.session, s);
    assert!(matches!(report.error, SessionError::Bootstrap(_)));
    assert_eq!(
        registry.get(s).unwrap().discovery_state(),
        DiscoveryState::Failed
    );

    // The owner decides what happens next; the session still answers.
    assert!(registry.join(s, "still-here").await.is_ok());
    assert!(registry.destroy(s).await);
}

/// A report raised while `create` is still running names a session the
/// owner can already destroy.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn early_fatal_reports_name_a_destroyable_session() {
    let Net {
        hub,
        registry,
        mut fatal,
    } = net();
    hub.set_dht_down(true).await;

    let owner = registry.clone();
    let closer = tokio::spawn(async move {
        let mut closed = 0;
        while let Some(report) = fatal.recv().await {
            if owner.destroy(report.session).await {
                closed += 1;
            }
        }
        closed
    });

    for i in 0..30 {
        let _ = registry.create(config(&format!("mem/early-{i}"), "lobby")).await;
    }
    tokio::time::timeout(WAIT, async {
        while registry.count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("a session outlived its fatal report");
    assert_eq!(hub.node_count().await, 0);
    closer.abort();
}

#[tokio::test]
async fn broken_subscription_is_fatal() {
    let Net {
        hub,
        registry,
        mut fatal,
    } = net();
    let s = registry.create(config("mem/sub", "lobby")).await.unwrap();
    registry.join(s, "fragile").await.unwrap();
    let id = registry.local_id(s).unwrap();

    hub.break_subscription(&id, "fragile").await;
    let report = next_report(&mut fatal).await;
    assert_eq!(report.session, s);
    assert!(matches!(
        report.error,
        SessionError::Receive { ref topic, .. } if topic == "fragile"
    ));
    registry.shutdown_all().await;
}

#[tokio::test]
async fn rejected_event_is_fatal() {
    let Net {
        registry,
        mut fatal,
        ..
    } = net();
    let s = registry.create(config("mem/rej", "lobby")).await.unwrap();
    assert!(registry.register(s, EventKind::TopicJoined, |_| false));

    registry.join(s, "unwelcome").await.unwrap();
    let report = next_report(&mut fatal).await;
    assert!(matches!(
        report.error,
        SessionError::DispatchRejected(EventKind::TopicJoined)
    ));
    registry.shutdown_all().await;
}

#[tokio::test]
async fn failed_creation_leaves_nothing_behind() {
    let Net { hub, registry, .. } = net();

    let err = registry
        .create(config("mem/key", "lobby").with_key(&[1, 2, 3]))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Identity(_)));
    assert!(err.is_fatal());

    let err = registry.create(config("", "lobby")).await.unwrap_err();
    assert!(matches!(err, SessionError::Network(_)));

    assert_eq!(registry.count(), 0);
    assert_eq!(hub.node_count().await, 0);
    assert!(!registry.is_valid(SessionHandle::new(0, 0)));

    // The address was never taken.
    let s = registry.create(config("mem/key", "lobby")).await.unwrap();
    assert!(registry.is_valid(s));
    registry.shutdown_all().await;
}

#[tokio::test]
async fn soft_errors_are_not_fatal() {
    let Net { registry, .. } = net();
    let s = registry.create(config("mem/soft", "lobby")).await.unwrap();

    let err = registry.join(s, "lobby").await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(!SessionError::UnknownSession(SessionHandle::new(9, 9)).is_fatal());
    assert!(!SessionError::Closed.is_fatal());
    registry.shutdown_all().await;
}
