//! Transport envelopes.
//!
//! An envelope pairs one unit with the broker routing data (destination,
//! headers) needed only for transport. Envelopes exist transiently
//! between the pipeline boundary and the broker boundary; the outbound
//! adapter consumes them and nothing downstream ever sees one.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::unit::Unit;
use crate::update::UpdateKind;

/// Transport wrapper owning exactly one unit plus broker metadata.
#[derive(Clone, Debug)]
pub struct Envelope {
    unit: Arc<dyn Unit>,
    headers: HashMap<String, String>,
    destination: String,
}

impl Envelope {
    pub fn new(
        unit: Arc<dyn Unit>,
        headers: HashMap<String, String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            unit,
            headers,
            destination: destination.into(),
        }
    }

    pub fn unit(&self) -> &Arc<dyn Unit> {
        &self.unit
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Serialize the wrapped unit for the wire.
    ///
    /// The body is the unit's serializable field view with the unit id
    /// re-injected under `requestID`, so receivers can correlate requests
    /// without the internal identity representation leaking.
    pub fn wire_body(&self) -> serde_json::Result<String> {
        let mut fields: Map<String, Value> = self.unit.wire_fields()?;
        fields.insert(
            "requestID".to_string(),
            Value::String(self.unit.meta().id.clone()),
        );
        serde_json::to_string(&Value::Object(fields))
    }
}

/// An envelope paired with the update kind it preserves end-to-end.
#[derive(Clone, Debug)]
pub struct EnvelopeUpdate {
    pub envelope: Envelope,
    pub kind: UpdateKind,
}
