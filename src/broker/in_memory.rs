//! In-process broker for tests and single-process scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::{BrokerClient, BrokerError, Credentials, Frame, FrameHandler};

/// A published message as recorded by [`InMemoryBroker`].
#[derive(Clone, Debug)]
pub struct PublishedFrame {
    pub destination: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub durable: bool,
}

struct Shared {
    subscriptions: RwLock<Vec<(String, Arc<dyn FrameHandler>)>>,
    published: Mutex<Vec<PublishedFrame>>,
    refuse_connections: AtomicBool,
}

/// In-process broker implementing [`BrokerClient`].
///
/// Handles created via [`handle`](InMemoryBroker::handle) share one
/// message space, the way independent client connections share one
/// broker. Delivery is synchronous on the publisher's thread, which
/// stands in for a real client's I/O thread.
///
/// ```
/// use stomp_bridge::{BrokerClient, Credentials, InMemoryBroker};
/// use std::collections::HashMap;
///
/// let mut broker = InMemoryBroker::new();
/// broker.connect(&Credentials::new("admin", "admin")).unwrap();
/// broker
///     .publish("/topic/t1", &HashMap::new(), r#"{"text":"hi"}"#, true)
///     .unwrap();
///
/// let published = broker.published();
/// assert_eq!(published.len(), 1);
/// assert_eq!(published[0].destination, "/topic/t1");
/// ```
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    listener: Option<Arc<dyn FrameHandler>>,
    connected: bool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                subscriptions: RwLock::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                refuse_connections: AtomicBool::new(false),
            }),
            listener: None,
            connected: false,
        }
    }

    /// A fresh, not-yet-connected handle onto the same broker.
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            listener: None,
            connected: false,
        }
    }

    /// Every frame published so far, in publish order.
    pub fn published(&self) -> Vec<PublishedFrame> {
        self.shared.published.lock().unwrap().clone()
    }

    /// Make subsequent connect attempts fail, for exercising fatal paths.
    pub fn refuse_connections(&self) {
        self.shared.refuse_connections.store(true, Ordering::SeqCst);
    }
}

impl BrokerClient for InMemoryBroker {
    fn connect(&mut self, _credentials: &Credentials) -> Result<(), BrokerError> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionFailed(
                "broker refused the handshake".to_string(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, destination: &str) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        let listener = self.listener.clone().ok_or_else(|| {
            BrokerError::SubscribeFailed("no listener installed".to_string())
        })?;
        self.shared
            .subscriptions
            .write()
            .unwrap()
            .push((destination.to_string(), listener));
        Ok(())
    }

    fn publish(
        &self,
        destination: &str,
        headers: &HashMap<String, String>,
        body: &str,
        durable: bool,
    ) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        self.shared.published.lock().unwrap().push(PublishedFrame {
            destination: destination.to_string(),
            headers: headers.clone(),
            body: body.to_string(),
            durable,
        });

        // The broker injects the routing header on delivery.
        let mut frame_headers = headers.clone();
        frame_headers.insert("destination".to_string(), destination.to_string());
        let frame = Frame::new(frame_headers, body);

        for (subscribed, listener) in self.shared.subscriptions.read().unwrap().iter() {
            if subscribed == destination {
                listener.on_message(frame.clone());
            }
        }
        Ok(())
    }

    fn set_listener(&mut self, listener: Arc<dyn FrameHandler>) {
        self.listener = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Collector {
        frames: StdMutex<Vec<Frame>>,
    }

    impl FrameHandler for Collector {
        fn on_message(&self, frame: Frame) {
            self.frames.lock().unwrap().push(frame);
        }

        fn on_error(&self, _frame: Frame) {}
    }

    #[test]
    fn delivers_only_to_matching_subscriptions() {
        let broker = InMemoryBroker::new();
        let collector = Arc::new(Collector {
            frames: StdMutex::new(Vec::new()),
        });

        let mut subscriber = broker.handle();
        subscriber
            .connect(&Credentials::new("admin", "admin"))
            .unwrap();
        subscriber.set_listener(collector.clone());
        subscriber.subscribe("/topic/a").unwrap();

        let mut publisher = broker.handle();
        publisher
            .connect(&Credentials::new("admin", "admin"))
            .unwrap();
        publisher
            .publish("/topic/a", &HashMap::new(), "one", true)
            .unwrap();
        publisher
            .publish("/topic/b", &HashMap::new(), "two", true)
            .unwrap();

        let frames = collector.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "one");
        assert_eq!(frames[0].destination(), Some("/topic/a"));
        // Both publishes are still recorded broker-side.
        assert_eq!(broker.published().len(), 2);
    }

    #[test]
    fn refused_handshake_surfaces_as_connection_failure() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections();

        let mut handle = broker.handle();
        let err = handle
            .connect(&Credentials::new("admin", "admin"))
            .unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionFailed(_)));
    }

    #[test]
    fn publish_requires_connect() {
        let broker = InMemoryBroker::new();
        let err = broker
            .publish("/topic/a", &HashMap::new(), "{}", true)
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotConnected));
    }

    #[test]
    fn subscribe_requires_listener() {
        let broker = InMemoryBroker::new();
        let mut handle = broker.handle();
        handle.connect(&Credentials::new("admin", "admin")).unwrap();
        let err = handle.subscribe("/topic/a").unwrap_err();
        assert!(matches!(err, BrokerError::SubscribeFailed(_)));
    }
}
