// TCP transport speaking newline-delimited JSON frames.
//
// `open()` spawns a background task that dials the relay, announces the
// logical channel address as its first frame, then shuttles frames both
// ways: outgoing through an unbounded mpsc queue, incoming surfaced as
// `TransportEvent`s drained by `poll()`. The calling thread never blocks on
// the network.
//
// Must be used from within a tokio runtime (the session driver provides
// one). Each `open()` builds a fresh event channel, so a connection that
// dies after being replaced cannot leak stale events into the new session.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::core::{Error, Result};
use crate::protocol::FrameCodec;
use super::{Transport, TransportEvent};

struct Connection {
    outgoing: UnboundedSender<String>,
    events: UnboundedReceiver<TransportEvent>,
}

/// Client transport for a line-framed TCP relay.
pub struct TcpTransport {
    relay_addr: String,
    connection: Option<Connection>,
    open: bool,
}

impl TcpTransport {
    /// Creates a transport that will dial the given relay `host:port`
    pub fn new(relay_addr: impl Into<String>) -> Self {
        TcpTransport {
            relay_addr: relay_addr.into(),
            connection: None,
            open: false,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, address: &str) -> Result<()> {
        self.close(true);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(
            self.relay_addr.clone(),
            address.to_string(),
            outgoing_rx,
            events_tx,
        ));
        self.connection = Some(Connection {
            outgoing: outgoing_tx,
            events: events_rx,
        });
        self.open = true;
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let Some(connection) = &self.connection else {
            return Err(Error::transport("transport is not open"));
        };
        connection
            .outgoing
            .send(frame)
            .map_err(|_| Error::transport("connection task has ended"))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self, _normal: bool) {
        // Dropping the outgoing sender lets the task flush and exit silently.
        self.connection = None;
        self.open = false;
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(connection) = &mut self.connection {
            while let Ok(event) = connection.events.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

async fn run_connection(
    relay_addr: String,
    address: String,
    mut outgoing: UnboundedReceiver<String>,
    events: UnboundedSender<TransportEvent>,
) {
    fn abnormal_close() -> TransportEvent {
        TransportEvent::Closed {
            normal: false,
            reason: None,
        }
    }
    let stream = match TcpStream::connect(&relay_addr).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!("relay connect failed: {err}");
            let _ = events.send(abnormal_close());
            return;
        }
    };
    let mut framed = Framed::new(stream, FrameCodec);
    // The first line subscribes this connection to its channel address.
    if framed.send(address).await.is_err() {
        let _ = events.send(abnormal_close());
        return;
    }
    let _ = events.send(TransportEvent::Opened);
    loop {
        tokio::select! {
            incoming = framed.next() => match incoming {
                Some(Ok(text)) => {
                    let _ = events.send(TransportEvent::Frame(text));
                }
                Some(Err(err)) => {
                    warn!("relay stream error: {err}");
                    let _ = events.send(abnormal_close());
                    break;
                }
                None => {
                    let _ = events.send(abnormal_close());
                    break;
                }
            },
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if framed.send(frame).await.is_err() {
                        let _ = events.send(abnormal_close());
                        break;
                    }
                }
                // Local close: shut the stream down without reporting.
                None => {
                    let _ = framed.close().await;
                    break;
                }
            },
        }
    }
}
