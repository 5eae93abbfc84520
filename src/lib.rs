pub mod broker;
pub mod converter;
pub mod envelope;
pub mod reader;
pub mod registry;
pub mod unit;
pub mod update;
pub mod writer;

pub use broker::{
    BrokerClient, BrokerError, Credentials, Frame, FrameHandler, InMemoryBroker, PublishedFrame,
};
pub use converter::{EnvelopeConverter, Outbound};
pub use envelope::{Envelope, EnvelopeUpdate};
pub use reader::{
    BrokerReader, ReaderError, ReaderState, ReaderStats, DEFAULT_POLL_INTERVAL,
};
pub use registry::{RegistryError, UnitRegistry};
pub use unit::{
    Animation, AudioPayload, GesturePayload, Movement, Payload, Schema, TextPayload, TypedUnit,
    Unit, UnitMeta, UnitSchema,
};
pub use update::{Update, UpdateBatch, UpdateKind, UpdateSink};
pub use writer::{BrokerWriter, WriterStats};
