// In-process relay hub.
//
// `LocalRelay` models the dumb pub/sub pipe the engine assumes: every frame
// sent by one endpoint is fanned out to every other endpoint whose address
// shares the same base channel, with no inspection and no per-recipient
// filtering. Used by the integration tests and by same-device play; the
// production path is `TcpTransport` against a real relay.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::core::{Error, Result};
use super::{base_channel, Transport, TransportEvent};

struct Endpoint {
    /// Logical address while subscribed; `None` after close.
    address: Option<String>,
    tx: Sender<TransportEvent>,
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<u64, Endpoint>,
    next_id: u64,
}

/// In-process pub/sub relay keyed by channel address.
#[derive(Clone, Default)]
pub struct LocalRelay {
    hub: Arc<Mutex<Hub>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        LocalRelay::default()
    }

    /// Creates a new, unopened endpoint on this relay
    pub fn endpoint(&self) -> LocalTransport {
        let (tx, rx) = mpsc::channel();
        let mut hub = self
            .hub
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = hub.next_id;
        hub.next_id += 1;
        hub.endpoints.insert(id, Endpoint { address: None, tx });
        LocalTransport {
            hub: Arc::clone(&self.hub),
            id,
            rx,
            open: false,
        }
    }

    /// Severs every endpoint subscribed to the given address, as a relay
    /// outage (`normal: false`) or a deliberate shutdown would.
    pub fn sever(&self, address: &str, normal: bool, reason: Option<String>) {
        let mut hub = self
            .hub
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for endpoint in hub.endpoints.values_mut() {
            if endpoint.address.as_deref() == Some(address) {
                endpoint.address = None;
                let _ = endpoint.tx.send(TransportEvent::Closed {
                    normal,
                    reason: reason.clone(),
                });
            }
        }
    }
}

/// One endpoint of a [`LocalRelay`].
pub struct LocalTransport {
    hub: Arc<Mutex<Hub>>,
    id: u64,
    rx: Receiver<TransportEvent>,
    open: bool,
}

impl Transport for LocalTransport {
    fn open(&mut self, address: &str) -> Result<()> {
        let mut hub = self
            .hub
            .lock()
            .map_err(|_| Error::transport("relay hub poisoned"))?;
        let endpoint = hub
            .endpoints
            .get_mut(&self.id)
            .ok_or_else(|| Error::transport("endpoint dropped from relay"))?;
        endpoint.address = Some(address.to_string());
        let _ = endpoint.tx.send(TransportEvent::Opened);
        self.open = true;
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        if !self.open {
            return Err(Error::transport("transport is not open"));
        }
        let hub = self
            .hub
            .lock()
            .map_err(|_| Error::transport("relay hub poisoned"))?;
        let from = hub
            .endpoints
            .get(&self.id)
            .and_then(|endpoint| endpoint.address.clone())
            .ok_or_else(|| Error::transport("transport is not open"))?;
        let channel = base_channel(&from);
        for (id, endpoint) in &hub.endpoints {
            if *id == self.id {
                continue;
            }
            if let Some(address) = &endpoint.address {
                if base_channel(address) == channel {
                    let _ = endpoint.tx.send(TransportEvent::Frame(frame.clone()));
                }
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self, _normal: bool) {
        self.open = false;
        if let Ok(mut hub) = self.hub.lock() {
            if let Some(endpoint) = hub.endpoints.get_mut(&self.id) {
                endpoint.address = None;
            }
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.endpoints.remove(&self.id);
        }
    }
}
