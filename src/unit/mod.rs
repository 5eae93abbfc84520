//! Typed pipeline units.
//!
//! A unit is an immutable-once-created record flowing through the
//! pipeline: an identity, a link to its logical predecessor, a link to
//! the unit that grounds it, and a typed payload. The bridge never
//! mutates a unit after construction; it hands it downstream and its
//! ownership ends there.
//!
//! Concrete unit types are [`TypedUnit<P>`] for some [`Payload`]. A
//! payload declares the stable set of field names it accepts
//! ([`Payload::FIELDS`]); inbound decoding filters wire messages against
//! that set instead of introspecting anything at runtime.

mod audio;
mod gesture;
mod text;

pub use audio::AudioPayload;
pub use gesture::{Animation, GesturePayload, Movement};
pub use text::TextPayload;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Identity and traceability links carried by every unit.
///
/// `previous` and `grounded_in` are non-owning: they record the *ids* of
/// the related units, for traceability only, and never keep those units
/// alive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitMeta {
    /// Unique identifier, formatted `"<source>:<counter>"`.
    pub id: String,
    /// Id of the unit that logically precedes this one.
    pub previous: Option<String>,
    /// Id of the (possibly different-typed) unit that grounds this one.
    pub grounded_in: Option<String>,
}

impl UnitMeta {
    /// Create metadata with no predecessor or grounding link.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            previous: None,
            grounded_in: None,
        }
    }

    /// Set the predecessor link.
    pub fn with_previous(mut self, id: impl Into<String>) -> Self {
        self.previous = Some(id.into());
        self
    }

    /// Set the grounding link.
    pub fn with_grounded_in(mut self, id: impl Into<String>) -> Self {
        self.grounded_in = Some(id.into());
        self
    }
}

/// Object-safe view of a pipeline unit.
///
/// Units cross the bridge as `Arc<dyn Unit>`; consumers that need the
/// typed payload downcast through [`Unit::as_any`].
pub trait Unit: fmt::Debug + Send + Sync {
    /// Identity and traceability links.
    fn meta(&self) -> &UnitMeta;

    /// Stable name of the unit's payload type (e.g. `"text"`).
    fn unit_type(&self) -> &'static str;

    /// Whether the host pipeline flagged this unit as terminal.
    fn is_final(&self) -> bool;

    /// The unit's serializable view: payload fields only.
    ///
    /// Bookkeeping (identity, links, flags) is not part of the payload
    /// struct, so it can never leak onto the wire.
    fn wire_fields(&self) -> serde_json::Result<Map<String, Value>>;

    /// Downcasting hook for pipeline consumers.
    fn as_any(&self) -> &dyn Any;
}

/// Per-type descriptor implemented by every unit payload.
pub trait Payload:
    Serialize + DeserializeOwned + Default + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Stable type name used in logs and diagnostics.
    const KIND: &'static str;

    /// The enumerable set of field names this payload accepts from the
    /// wire. Anything outside this set is silently dropped on decode.
    const FIELDS: &'static [&'static str];

    /// Whether this payload marks a terminal unit.
    fn is_final(&self) -> bool {
        false
    }
}

/// The one concrete [`Unit`] implementation: metadata plus a typed payload.
#[derive(Clone, Debug)]
pub struct TypedUnit<P: Payload> {
    meta: UnitMeta,
    payload: P,
}

impl<P: Payload> TypedUnit<P> {
    pub fn new(meta: UnitMeta, payload: P) -> Self {
        Self { meta, payload }
    }

    /// A unit with a default (empty) payload of this type.
    pub fn empty(meta: UnitMeta) -> Self {
        Self {
            meta,
            payload: P::default(),
        }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Payload> Unit for TypedUnit<P> {
    fn meta(&self) -> &UnitMeta {
        &self.meta
    }

    fn unit_type(&self) -> &'static str {
        P::KIND
    }

    fn is_final(&self) -> bool {
        self.payload.is_final()
    }

    fn wire_fields(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(&self.payload)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Decode seam between a broker destination and a concrete unit type.
///
/// The registry stores one schema per destination; the inbound adapter
/// uses it to turn an already-filtered field map into a unit, or to build
/// an empty fallback unit when a body cannot be decoded at all.
pub trait UnitSchema: Send + Sync {
    /// Stable name of the produced unit type.
    fn kind(&self) -> &'static str;

    /// The field names this type accepts from the wire.
    fn accepted_fields(&self) -> &'static [&'static str];

    /// Build a unit from a filtered field map.
    fn decode(&self, meta: UnitMeta, fields: Map<String, Value>)
        -> serde_json::Result<Arc<dyn Unit>>;

    /// Build a unit with a default payload.
    fn empty(&self, meta: UnitMeta) -> Arc<dyn Unit>;
}

/// [`UnitSchema`] for any [`Payload`] type.
pub struct Schema<P: Payload>(PhantomData<P>);

impl<P: Payload> Schema<P> {
    pub fn new() -> Self {
        Self(PhantomData)
    }

    /// Shared schema handle, ready for registration.
    pub fn shared() -> Arc<dyn UnitSchema> {
        Arc::new(Self::new())
    }
}

impl<P: Payload> Default for Schema<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> UnitSchema for Schema<P> {
    fn kind(&self) -> &'static str {
        P::KIND
    }

    fn accepted_fields(&self) -> &'static [&'static str] {
        P::FIELDS
    }

    fn decode(
        &self,
        meta: UnitMeta,
        fields: Map<String, Value>,
    ) -> serde_json::Result<Arc<dyn Unit>> {
        let payload: P = serde_json::from_value(Value::Object(fields))?;
        Ok(Arc::new(TypedUnit::new(meta, payload)))
    }

    fn empty(&self, meta: UnitMeta) -> Arc<dyn Unit> {
        Arc::new(TypedUnit::<P>::empty(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_links_are_ids_only() {
        let meta = UnitMeta::new("reader:1")
            .with_previous("reader:0")
            .with_grounded_in("asr:7");
        assert_eq!(meta.id, "reader:1");
        assert_eq!(meta.previous.as_deref(), Some("reader:0"));
        assert_eq!(meta.grounded_in.as_deref(), Some("asr:7"));
    }

    #[test]
    fn wire_fields_expose_payload_only() {
        let unit = TypedUnit::new(UnitMeta::new("reader:0"), TextPayload::new("hello"));
        let fields = unit.wire_fields().unwrap();
        assert_eq!(fields.get("text"), Some(&Value::String("hello".into())));
        // Identity and links live in the metadata, never in the wire view.
        assert!(!fields.contains_key("id"));
        assert!(!fields.contains_key("previous"));
        assert!(!fields.contains_key("grounded_in"));
    }

    #[test]
    fn schema_decodes_missing_fields_as_defaults() {
        let schema = Schema::<TextPayload>::new();
        let unit = schema.decode(UnitMeta::new("reader:0"), Map::new()).unwrap();
        let text = unit
            .as_any()
            .downcast_ref::<TypedUnit<TextPayload>>()
            .unwrap();
        assert_eq!(text.payload().text, None);
        assert!(!unit.is_final());
    }

    #[test]
    fn schema_rejects_mistyped_fields() {
        let schema = Schema::<TextPayload>::new();
        let mut fields = Map::new();
        fields.insert("text".into(), Value::Array(vec![]));
        assert!(schema.decode(UnitMeta::new("reader:0"), fields).is_err());
    }
}
