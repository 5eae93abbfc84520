//! Outbound adapter: envelopes → broker messages.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error, warn};

use crate::broker::{BrokerClient, BrokerError, Credentials};
use crate::envelope::EnvelopeUpdate;

/// Counters kept over the writer's lifetime.
#[derive(Clone, Debug, Default)]
pub struct WriterStats {
    pub published: usize,
    pub failed: usize,
}

/// Outbound adapter.
///
/// Serializes each envelope's unit and publishes it with durable
/// delivery, fire-and-forget: no acknowledgment is awaited, delivery
/// guarantees are the broker's. A publish failure is recoverable per
/// message — logged, counted, and the rest of the batch proceeds — so a
/// poison message never blocks the outbound stream. Only the handshake
/// at [`setup`](Self::setup) is fatal.
pub struct BrokerWriter<C: BrokerClient> {
    client: C,
    connected: bool,
    published: AtomicUsize,
    failed: AtomicUsize,
}

impl<C: BrokerClient> BrokerWriter<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            connected: false,
            published: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Perform the broker handshake. Failure is fatal and propagates.
    pub fn setup(&mut self, credentials: &Credentials) -> Result<(), BrokerError> {
        if let Err(e) = self.client.connect(credentials) {
            error!(error = %e, "broker handshake failed");
            return Err(e);
        }
        self.connected = true;
        Ok(())
    }

    /// Serialize and publish every envelope in the batch, in order.
    pub fn process(&self, batch: &[EnvelopeUpdate]) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        for update in batch {
            let envelope = &update.envelope;
            let body = match envelope.wire_body() {
                Ok(body) => body,
                Err(err) => {
                    warn!(
                        destination = %envelope.destination(),
                        error = %err,
                        "unit not serializable, message skipped"
                    );
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            match self
                .client
                .publish(envelope.destination(), envelope.headers(), &body, true)
            {
                Ok(()) => {
                    debug!(
                        destination = %envelope.destination(),
                        id = %envelope.unit().meta().id,
                        kind = %update.kind,
                        "message published"
                    );
                    self.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(
                        destination = %envelope.destination(),
                        error = %err,
                        "publish failed, message dropped"
                    );
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::envelope::Envelope;
    use crate::unit::{TextPayload, TypedUnit, UnitMeta};
    use crate::update::UpdateKind;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn envelope_update(text: &str, id: &str) -> EnvelopeUpdate {
        let unit = Arc::new(TypedUnit::new(UnitMeta::new(id), TextPayload::new(text)));
        EnvelopeUpdate {
            envelope: Envelope::new(unit, HashMap::new(), "/topic/out"),
            kind: UpdateKind::Add,
        }
    }

    #[test]
    fn publishes_durable_json_with_request_id() {
        let broker = InMemoryBroker::new();
        let mut writer = BrokerWriter::new(broker.handle());
        writer.setup(&Credentials::new("admin", "admin")).unwrap();

        writer
            .process(&[envelope_update("hello", "w:0")])
            .unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].durable);
        assert_eq!(published[0].destination, "/topic/out");
        let body: serde_json::Value = serde_json::from_str(&published[0].body).unwrap();
        assert_eq!(body["requestID"], "w:0");
        assert_eq!(body["text"], "hello");
        assert_eq!(writer.stats().published, 1);
    }

    #[test]
    fn process_before_setup_is_not_connected() {
        let writer = BrokerWriter::new(InMemoryBroker::new());
        let err = writer.process(&[envelope_update("x", "w:0")]).unwrap_err();
        assert!(matches!(err, BrokerError::NotConnected));
    }

    #[test]
    fn refused_handshake_propagates() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections();
        let mut writer = BrokerWriter::new(broker.handle());
        let err = writer.setup(&Credentials::new("admin", "admin")).unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionFailed(_)));
    }

    #[test]
    fn publishing_twice_yields_two_independent_messages() {
        let broker = InMemoryBroker::new();
        let mut writer = BrokerWriter::new(broker.handle());
        writer.setup(&Credentials::new("admin", "admin")).unwrap();

        let update = envelope_update("again", "w:1");
        writer.process(std::slice::from_ref(&update)).unwrap();
        writer.process(std::slice::from_ref(&update)).unwrap();

        assert_eq!(broker.published().len(), 2);
        assert_eq!(writer.stats().published, 2);
    }
}
