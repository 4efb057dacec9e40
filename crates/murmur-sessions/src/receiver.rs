//! Message receive loop — one per joined topic.

use std::sync::Arc;

use murmur_core::{Event, MessageRecord, TopicHandle};
use tokio_util::sync::CancellationToken;

use crate::capability::{InboundMessage, Subscription};
use crate::error::SessionError;
use crate::session::Shared;

/// Convert what the pub/sub engine delivered into the host-facing record.
pub fn to_record(message: InboundMessage) -> MessageRecord {
    MessageRecord {
        from: message.source,
        data: message.data,
        seqno: message
            .sequence_number
            .map(|n| n.to_be_bytes().to_vec())
            .unwrap_or_default(),
        topic: message.topic,
        signature: message.signature,
        key: message.key,
        id: message.id,
        received_from: message.propagation_source,
    }
}

/// Drain `subscription` until it ends or `cancel` fires.
pub(crate) async fn run(
    shared: Arc<Shared>,
    topic: TopicHandle,
    name: String,
    mut subscription: Box<dyn Subscription>,
    cancel: CancellationToken,
) {
    let session = shared.handle;
    tracing::debug!(session = %session, topic = %topic, name = %name, "receive loop started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = subscription.next() => next,
        };

        match next {
            Ok(Some(message)) => {
                tracing::trace!(
                    session = %session,
                    topic = %topic,
                    bytes = message.data.len(),
                    from = %message.propagation_source,
                    "message received"
                );
                let event = Event::MessageReceived {
                    session,
                    message: to_record(message),
                };
                if !shared.dispatch(event) {
                    return;
                }
            }
            Ok(None) => break,
            Err(_) if cancel.is_cancelled() => break,
            Err(source) => {
                shared.report(SessionError::Receive {
                    topic: name,
                    source,
                });
                return;
            }
        }
    }
    tracing::debug!(session = %session, topic = %topic, "receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::PeerId;

    #[test]
    fn sequence_number_is_big_endian() {
        let record = to_record(InboundMessage {
            source: Some(PeerId::from("a")),
            data: b"x".to_vec(),
            sequence_number: Some(0x0102),
            topic: "t".into(),
            signature: None,
            key: None,
            id: "id".into(),
            propagation_source: PeerId::from("b"),
        });
        assert_eq!(record.seqno, vec![0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(record.received_from, PeerId::from("b"));
        assert_eq!(record.from, Some(PeerId::from("a")));
    }

    #[test]
    fn missing_sequence_number_is_empty() {
        let record = to_record(InboundMessage {
            source: None,
            data: Vec::new(),
            sequence_number: None,
            topic: "t".into(),
            signature: None,
            key: None,
            id: String::new(),
            propagation_source: PeerId::from("b"),
        });
        assert!(record.seqno.is_empty());
        assert!(record.from.is_none());
    }
}
