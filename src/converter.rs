//! Envelope conversion: plain pipeline units → broker-bound envelopes.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::broker::BrokerClient;
use crate::envelope::{Envelope, EnvelopeUpdate};
use crate::update::{UpdateBatch, UpdateSink};
use crate::writer::BrokerWriter;

/// Wraps pipeline units into envelopes bound to one fixed
/// destination/headers pair configured at construction time.
///
/// Units the host pipeline flagged as terminal are logged and dropped
/// rather than wrapped: a terminal marker carries no payload the far
/// side needs. Everything else is wrapped 1:1 with its update kind
/// preserved.
pub struct EnvelopeConverter {
    destination: String,
    headers: HashMap<String, String>,
}

impl EnvelopeConverter {
    pub fn new(destination: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            destination: destination.into(),
            headers,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn process(&self, batch: UpdateBatch) -> Vec<EnvelopeUpdate> {
        let mut out = Vec::with_capacity(batch.len());
        for update in batch {
            if update.unit.is_final() {
                info!(id = %update.unit.meta().id, "terminal unit not forwarded");
                continue;
            }
            out.push(EnvelopeUpdate {
                envelope: Envelope::new(
                    update.unit,
                    self.headers.clone(),
                    self.destination.clone(),
                ),
                kind: update.kind,
            });
        }
        out
    }
}

/// The outbound half of the bridge behind one [`UpdateSink`]:
/// converter → writer, so a producer can be wired straight to the broker.
pub struct Outbound<C: BrokerClient> {
    converter: EnvelopeConverter,
    writer: BrokerWriter<C>,
}

impl<C: BrokerClient> Outbound<C> {
    pub fn new(converter: EnvelopeConverter, writer: BrokerWriter<C>) -> Self {
        Self { converter, writer }
    }

    pub fn writer(&self) -> &BrokerWriter<C> {
        &self.writer
    }
}

impl<C: BrokerClient> UpdateSink for Outbound<C> {
    fn emit(&self, batch: UpdateBatch) {
        let envelopes = self.converter.process(batch);
        if let Err(err) = self.writer.process(&envelopes) {
            warn!(error = %err, "outbound batch dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{TextPayload, TypedUnit, UnitMeta};
    use crate::update::UpdateKind;
    use std::sync::Arc;

    fn fixed_headers() -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("session".to_string(), "abc".to_string());
        headers
    }

    #[test]
    fn wraps_units_with_fixed_destination_and_headers() {
        let converter = EnvelopeConverter::new("/topic/out", fixed_headers());
        let mut batch = UpdateBatch::new();
        batch.add(
            Arc::new(TypedUnit::new(UnitMeta::new("p:0"), TextPayload::new("hi"))),
            UpdateKind::Commit,
        );

        let envelopes = converter.process(batch);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].envelope.destination(), "/topic/out");
        assert_eq!(
            envelopes[0].envelope.headers().get("session").map(String::as_str),
            Some("abc")
        );
        // The update kind crosses the converter unchanged.
        assert_eq!(envelopes[0].kind, UpdateKind::Commit);
    }

    #[test]
    fn terminal_units_are_dropped() {
        let converter = EnvelopeConverter::new("/topic/out", HashMap::new());
        let mut batch = UpdateBatch::new();
        batch.add(
            Arc::new(TypedUnit::new(UnitMeta::new("p:0"), TextPayload::terminal())),
            UpdateKind::Add,
        );
        batch.add(
            Arc::new(TypedUnit::new(UnitMeta::new("p:1"), TextPayload::new("kept"))),
            UpdateKind::Add,
        );

        let envelopes = converter.process(batch);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].envelope.unit().meta().id, "p:1");
    }
}
