//! Inbound adapter: broker frames → typed pipeline updates.
//!
//! Frames arrive on the broker client's I/O thread and are queued as-is;
//! a single worker thread decodes each one into a typed unit and emits it
//! downstream as a one-element update batch. A malformed frame is logged
//! and skipped, never letting one bad message stall the ones behind it;
//! only a failed broker handshake at setup is fatal.
//!
//! All destinations funneled through one reader share a single `previous`
//! chain: units from independent destinations interleave into one
//! sequence. This matches the original system and is a known limitation,
//! not a per-stream ordering guarantee.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::broker::{BrokerClient, BrokerError, Credentials, Frame, FrameHandler};
use crate::registry::{RegistryError, UnitRegistry};
use crate::unit::{Payload, Unit, UnitMeta, UnitSchema};
use crate::update::{UpdateBatch, UpdateKind, UpdateSink};

/// Default interval at which the worker wakes to check the stop flag.
///
/// Frames themselves are handed over through a blocking channel, so this
/// bounds shutdown latency only, not inbound latency.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lifecycle of the inbound adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Stopped,
    Connected,
    Subscribed,
    Running,
}

/// Counters reported by the worker on shutdown.
#[derive(Clone, Debug, Default)]
pub struct ReaderStats {
    /// Frames taken off the inbound buffer.
    pub frames_received: usize,
    /// Updates emitted downstream.
    pub units_emitted: usize,
    /// Frames dropped because no unit type is registered for their destination.
    pub unknown_destination: usize,
    /// Frames whose body could not be decoded and degraded to an empty unit.
    pub decode_fallbacks: usize,
    /// Frames dropped for other per-frame failures (e.g. no destination header).
    pub dropped: usize,
}

/// Error type for reader lifecycle operations.
#[derive(Debug)]
pub enum ReaderError {
    Broker(BrokerError),
    Registry(RegistryError),
    /// The call is not valid in the adapter's current state.
    InvalidState {
        expected: &'static str,
        actual: ReaderState,
    },
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Broker(e) => write!(f, "broker error: {}", e),
            ReaderError::Registry(e) => write!(f, "registry error: {}", e),
            ReaderError::InvalidState { expected, actual } => {
                write!(f, "reader must be {} (currently {:?})", expected, actual)
            }
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Broker(e) => Some(e),
            ReaderError::Registry(e) => Some(e),
            ReaderError::InvalidState { .. } => None,
        }
    }
}

impl From<BrokerError> for ReaderError {
    fn from(e: BrokerError) -> Self {
        ReaderError::Broker(e)
    }
}

impl From<RegistryError> for ReaderError {
    fn from(e: RegistryError) -> Self {
        ReaderError::Registry(e)
    }
}

/// Listener installed on the broker client: enqueue and return.
///
/// Runs on the client's I/O thread, so it must never decode or block;
/// the channel send is O(1) and non-blocking.
struct ChannelListener {
    tx: Sender<Frame>,
}

impl FrameHandler for ChannelListener {
    fn on_message(&self, frame: Frame) {
        debug!(
            destination = frame.destination().unwrap_or("<none>"),
            "frame received from broker"
        );
        if self.tx.send(frame).is_err() {
            warn!("inbound buffer closed, frame dropped");
        }
    }

    fn on_error(&self, frame: Frame) {
        // Broker-side errors are non-fatal to the adapter.
        warn!(body = %frame.body, "broker reported an error frame");
    }
}

/// Inbound adapter.
///
/// State machine: `Stopped → Connected → Subscribed → Running → Stopped`.
/// Destinations are registered while stopped, [`setup`](Self::setup)
/// connects and subscribes, [`run`](Self::run) starts the worker, and
/// [`shutdown`](Self::shutdown) stops it cooperatively.
pub struct BrokerReader<C: BrokerClient> {
    client: C,
    registry: UnitRegistry,
    source: String,
    poll_interval: Duration,
    frame_tx: Sender<Frame>,
    frame_rx: Option<Receiver<Frame>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<ReaderStats>>,
    state: ReaderState,
}

impl<C: BrokerClient> BrokerReader<C> {
    pub fn new(client: C) -> Self {
        Self::with_source(client, "broker-reader")
    }

    /// `source` prefixes the id of every unit this reader produces.
    pub fn with_source(client: C, source: impl Into<String>) -> Self {
        let (frame_tx, frame_rx) = channel();
        Self {
            client,
            registry: UnitRegistry::new(),
            source: source.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame_tx,
            frame_rx: Some(frame_rx),
            stop_tx: None,
            handle: None,
            state: ReaderState::Stopped,
        }
    }

    /// Override the stop-flag check interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Bind a destination to the payload type expected from it.
    ///
    /// Rejected once the worker is running; the registry is read-only
    /// from then on.
    pub fn register<P: Payload>(
        &mut self,
        destination: impl Into<String>,
    ) -> Result<(), ReaderError> {
        if self.state == ReaderState::Running {
            return Err(ReaderError::InvalidState {
                expected: "not running",
                actual: self.state,
            });
        }
        self.registry.register_type::<P>(destination)?;
        Ok(())
    }

    /// Connect to the broker and subscribe to every registered destination.
    ///
    /// A failed handshake is fatal: the error is logged and propagated,
    /// and the adapter never reaches `Running`.
    pub fn setup(&mut self, credentials: &Credentials) -> Result<(), ReaderError> {
        if self.state != ReaderState::Stopped {
            return Err(ReaderError::InvalidState {
                expected: "stopped",
                actual: self.state,
            });
        }

        if let Err(e) = self.client.connect(credentials) {
            error!(error = %e, "broker handshake failed");
            return Err(e.into());
        }
        self.state = ReaderState::Connected;

        self.client.set_listener(Arc::new(ChannelListener {
            tx: self.frame_tx.clone(),
        }));

        let destinations: Vec<String> =
            self.registry.destinations().map(str::to_string).collect();
        for destination in destinations {
            self.client.subscribe(&destination)?;
        }
        self.state = ReaderState::Subscribed;
        Ok(())
    }

    /// Start the worker thread, emitting decoded updates into `sink`.
    pub fn run<S: UpdateSink + 'static>(&mut self, sink: S) -> Result<(), ReaderError> {
        if self.state != ReaderState::Subscribed {
            return Err(ReaderError::InvalidState {
                expected: "subscribed",
                actual: self.state,
            });
        }
        let frame_rx = self.frame_rx.take().ok_or(ReaderError::InvalidState {
            expected: "not previously run",
            actual: self.state,
        })?;

        let (stop_tx, stop_rx) = channel();
        let worker = Worker {
            registry: self.registry.clone(),
            source: self.source.clone(),
            sink,
            counter: 0,
            last_unit_id: None,
            stats: ReaderStats::default(),
        };
        let poll_interval = self.poll_interval;
        self.handle = Some(thread::spawn(move || {
            worker.run(frame_rx, stop_rx, poll_interval)
        }));
        self.stop_tx = Some(stop_tx);
        self.state = ReaderState::Running;
        Ok(())
    }

    /// Signal the worker to stop and wait for it to exit.
    ///
    /// The stop flag is observed at the worker's next wake; frames still
    /// buffered at that point are dropped, not drained.
    pub fn shutdown(&mut self) -> ReaderStats {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let stats = self
            .handle
            .take()
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();
        self.state = ReaderState::Stopped;
        stats
    }
}

struct Worker<S: UpdateSink> {
    registry: UnitRegistry,
    source: String,
    sink: S,
    counter: u64,
    last_unit_id: Option<String>,
    stats: ReaderStats,
}

impl<S: UpdateSink> Worker<S> {
    fn run(
        mut self,
        frames: Receiver<Frame>,
        stop: Receiver<()>,
        poll_interval: Duration,
    ) -> ReaderStats {
        loop {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            // Block on the buffer rather than sleep-polling it; the
            // timeout only bounds how long a stop signal can go unseen.
            match frames.recv_timeout(poll_interval) {
                Ok(frame) => {
                    self.stats.frames_received += 1;
                    self.process(frame);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.stats
    }

    /// Turn one frame into at most one update. Every failure here is
    /// per-frame: logged, counted, and the worker moves on.
    fn process(&mut self, frame: Frame) {
        let Some(destination) = frame.destination().map(str::to_string) else {
            warn!("frame without destination header dropped");
            self.stats.dropped += 1;
            return;
        };

        let Some(schema) = self.registry.resolve(&destination) else {
            warn!(destination = %destination, "no unit type registered for destination, frame dropped");
            self.stats.unknown_destination += 1;
            return;
        };
        let schema = Arc::clone(schema);

        let mut meta = UnitMeta::new(format!("{}:{}", self.source, self.counter));
        meta.previous = self.last_unit_id.clone();
        self.counter += 1;

        let unit = match Self::decode_body(&frame.body, schema.as_ref(), meta.clone()) {
            Ok(unit) => unit,
            Err(err) => {
                // Liveness over completeness: a body we cannot decode
                // still yields an empty unit of the target type.
                warn!(destination = %destination, error = %err, "body not decodable, emitting empty unit");
                self.stats.decode_fallbacks += 1;
                schema.empty(meta)
            }
        };

        let kind = match frame.update_type() {
            None => UpdateKind::Add,
            Some(raw) => UpdateKind::from_header(raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognized update_type header, defaulting to ADD");
                UpdateKind::Add
            }),
        };

        debug!(
            destination = %destination,
            id = %unit.meta().id,
            kind = %kind,
            unit_type = unit.unit_type(),
            "unit decoded from frame"
        );
        self.last_unit_id = Some(unit.meta().id.clone());
        self.stats.units_emitted += 1;
        self.sink.emit(UpdateBatch::single(unit, kind));
    }

    /// Parse the body as a JSON object and build a unit from the fields
    /// the target type accepts. Unknown fields are dropped silently by
    /// policy; a non-object body or a mistyped field is an error the
    /// caller degrades to an empty unit.
    fn decode_body(
        body: &str,
        schema: &dyn UnitSchema,
        meta: UnitMeta,
    ) -> serde_json::Result<Arc<dyn Unit>> {
        let parsed: Map<String, Value> = serde_json::from_str(body)?;
        let accepted = schema.accepted_fields();
        let filtered: Map<String, Value> = parsed
            .into_iter()
            .filter(|(key, _)| accepted.contains(&key.as_str()))
            .collect();
        schema.decode(meta, filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Schema, TextPayload, TypedUnit};
    use std::sync::mpsc;

    fn test_worker(sink: mpsc::Sender<UpdateBatch>) -> Worker<mpsc::Sender<UpdateBatch>> {
        let mut registry = UnitRegistry::new();
        registry.register_type::<TextPayload>("/topic/t1").unwrap();
        Worker {
            registry,
            source: "test".to_string(),
            sink,
            counter: 0,
            last_unit_id: None,
            stats: ReaderStats::default(),
        }
    }

    fn frame(destination: &str, body: &str) -> Frame {
        let mut headers = std::collections::HashMap::new();
        headers.insert("destination".to_string(), destination.to_string());
        Frame::new(headers, body)
    }

    #[test]
    fn json_subset_becomes_typed_unit_with_chained_previous() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        worker.process(frame("/topic/t1", r#"{"text":"hello","bogus":1}"#));
        worker.process(frame("/topic/t1", r#"{"text":"world"}"#));

        let first = rx.try_recv().unwrap();
        let update = first.iter().next().unwrap();
        assert_eq!(update.kind, UpdateKind::Add);
        let text = update
            .unit
            .as_any()
            .downcast_ref::<TypedUnit<TextPayload>>()
            .unwrap();
        assert_eq!(text.payload().text.as_deref(), Some("hello"));
        assert_eq!(update.unit.meta().id, "test:0");
        assert_eq!(update.unit.meta().previous, None);
        assert_eq!(update.unit.meta().grounded_in, None);

        let second = rx.try_recv().unwrap();
        let update = second.iter().next().unwrap();
        assert_eq!(update.unit.meta().id, "test:1");
        assert_eq!(update.unit.meta().previous.as_deref(), Some("test:0"));

        assert_eq!(worker.stats.units_emitted, 2);
        assert_eq!(worker.stats.decode_fallbacks, 0);
    }

    #[test]
    fn unresolvable_destination_emits_nothing() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        worker.process(frame("/topic/unknown", r#"{"text":"hello"}"#));

        assert!(rx.try_recv().is_err());
        assert_eq!(worker.stats.unknown_destination, 1);
        assert_eq!(worker.stats.units_emitted, 0);
    }

    #[test]
    fn non_json_body_degrades_to_empty_unit() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        worker.process(frame("/topic/t1", "plain, not json"));

        let batch = rx.try_recv().unwrap();
        let update = batch.iter().next().unwrap();
        let text = update
            .unit
            .as_any()
            .downcast_ref::<TypedUnit<TextPayload>>()
            .unwrap();
        assert_eq!(text.payload().text, None);
        assert_eq!(worker.stats.decode_fallbacks, 1);
        assert_eq!(worker.stats.units_emitted, 1);
    }

    #[test]
    fn update_type_header_selects_kind() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        let mut revoke = frame("/topic/t1", r#"{"text":"x"}"#);
        revoke
            .headers
            .insert("update_type".to_string(), "UpdateType.REVOKE".to_string());
        worker.process(revoke);

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.iter().next().unwrap().kind, UpdateKind::Revoke);
    }

    #[test]
    fn unrecognized_update_type_defaults_to_add() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        let mut odd = frame("/topic/t1", r#"{"text":"x"}"#);
        odd.headers
            .insert("update_type".to_string(), "UpdateType.FLUSH".to_string());
        worker.process(odd);

        // The frame is not dropped; it degrades to an ADD.
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.iter().next().unwrap().kind, UpdateKind::Add);
        assert_eq!(worker.stats.units_emitted, 1);
    }

    #[test]
    fn missing_destination_header_is_dropped() {
        let (tx, rx) = mpsc::channel();
        let mut worker = test_worker(tx);

        worker.process(Frame::new(Default::default(), r#"{"text":"x"}"#));

        assert!(rx.try_recv().is_err());
        assert_eq!(worker.stats.dropped, 1);
    }

    #[test]
    fn decode_body_filters_against_schema_fields() {
        let schema = Schema::<TextPayload>::new();
        let unit = Worker::<mpsc::Sender<UpdateBatch>>::decode_body(
            r#"{"text":"hello","bogus":1,"rate":16000}"#,
            &schema,
            UnitMeta::new("t:0"),
        )
        .unwrap();
        let fields = unit.wire_fields().unwrap();
        assert!(fields.contains_key("text"));
        assert!(!fields.contains_key("bogus"));
        assert!(!fields.contains_key("rate"));
    }
}
