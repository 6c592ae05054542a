//! Peer transport over the relay broker.
//!
//! Each endpoint runs as its own task holding one WebSocket to the broker.
//! Tasks report back through a single event channel so the session sees
//! everything in arrival order.

use futures_util::{SinkExt, StreamExt};
use poolcalc_core::{PeerId, PeerMessage, RelayEvent, RelayRequest};
use poolcalc_session::{
    ConnectionHandle, EndpointHandle, Transport, TransportError, TransportErrorKind,
    TransportEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

enum EndpointCommand {
    Connect {
        conn: ConnectionHandle,
        target: PeerId,
    },
    Send {
        conn: ConnectionHandle,
        data: serde_json::Value,
    },
    Close {
        conn: ConnectionHandle,
    },
}

/// Which endpoint each live connection belongs to.
type Owners = Arc<Mutex<HashMap<ConnectionHandle, EndpointHandle>>>;

pub struct WsTransport {
    url: String,
    handles: Arc<AtomicU64>,
    owners: Owners,
    endpoints: HashMap<EndpointHandle, mpsc::UnboundedSender<EndpointCommand>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            url: url.into(),
            handles: Arc::new(AtomicU64::new(1)),
            owners: Arc::new(Mutex::new(HashMap::new())),
            endpoints: HashMap::new(),
            events,
        }
    }

    fn next_handle(&self) -> u64 {
        self.handles.fetch_add(1, Ordering::Relaxed)
    }

    fn command(&self, endpoint: EndpointHandle, command: EndpointCommand) -> bool {
        self.endpoints
            .get(&endpoint)
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    fn owner(&self, conn: ConnectionHandle) -> Option<EndpointHandle> {
        lock(&self.owners).get(&conn).copied()
    }
}

impl Transport for WsTransport {
    fn create_endpoint(&mut self, preferred: Option<&PeerId>) -> EndpointHandle {
        let endpoint = EndpointHandle(self.next_handle());
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(endpoint, tx);

        let task = EndpointTask {
            endpoint,
            handles: self.handles.clone(),
            owners: self.owners.clone(),
            events: self.events.clone(),
            links: HashMap::new(),
            pending: HashSet::new(),
        };
        let url = self.url.clone();
        let preferred = preferred.map(|id| id.to_string());
        tokio::spawn(async move {
            if let Err(e) = task.run(url, preferred, rx).await {
                tracing::warn!("endpoint {:?} stopped: {}", endpoint, e);
            }
        });
        endpoint
    }

    fn connect(&mut self, endpoint: EndpointHandle, target: &PeerId) -> ConnectionHandle {
        let conn = ConnectionHandle(self.next_handle());
        lock(&self.owners).insert(conn, endpoint);
        let target = target.clone();
        if !self.command(endpoint, EndpointCommand::Connect { conn, target }) {
            tracing::debug!(?endpoint, "connect on a stopped endpoint");
        }
        conn
    }

    fn send(
        &mut self,
        conn: ConnectionHandle,
        message: &PeerMessage,
    ) -> Result<(), TransportError> {
        let endpoint = self
            .owner(conn)
            .ok_or_else(|| TransportError::new(TransportErrorKind::Network, "unknown connection"))?;
        let data = message.to_value();
        if self.command(endpoint, EndpointCommand::Send { conn, data }) {
            Ok(())
        } else {
            Err(TransportError::new(
                TransportErrorKind::Network,
                "endpoint is no longer running",
            ))
        }
    }

    fn close(&mut self, conn: ConnectionHandle) {
        if let Some(endpoint) = lock(&self.owners).remove(&conn) {
            self.command(endpoint, EndpointCommand::Close { conn });
        }
    }

    fn destroy(&mut self, endpoint: EndpointHandle) {
        // Dropping the sender ends the task, which closes the socket.
        self.endpoints.remove(&endpoint);
        lock(&self.owners).retain(|_, owner| *owner != endpoint);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EndpointTask {
    endpoint: EndpointHandle,
    handles: Arc<AtomicU64>,
    owners: Owners,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// broker conn id -> local handle
    links: HashMap<u64, ConnectionHandle>,
    /// Dials sent to the broker that have no `conn_open` yet.
    pending: HashSet<ConnectionHandle>,
}

impl EndpointTask {
    async fn run(
        mut self,
        url: String,
        preferred: Option<String>,
        mut commands: mpsc::UnboundedReceiver<EndpointCommand>,
    ) -> anyhow::Result<()> {
        let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                self.emit(TransportEvent::EndpointError {
                    endpoint: self.endpoint,
                    error: TransportError::new(
                        TransportErrorKind::Network,
                        format!("cannot reach broker at {url}: {e}"),
                    ),
                });
                return Ok(());
            }
        };
        let (mut sink, mut stream) = ws.split();

        let register = RelayRequest::Register { id: preferred };
        sink.send(Message::Text(serde_json::to_string(&register)?.into()))
            .await?;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if let Some(request) = self.request_for(command) {
                        sink.send(Message::Text(serde_json::to_string(&request)?.into()))
                            .await?;
                    }
                }

                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            self.lost(format!("broker connection failed: {e}"));
                            break;
                        }
                        None => {
                            self.lost("broker closed the connection".to_string());
                            break;
                        }
                    };

                    match msg {
                        Message::Text(text) => match serde_json::from_str::<RelayEvent>(&text) {
                            Ok(event) => {
                                if let Some(reply) = self.on_relay_event(event) {
                                    sink.send(Message::Text(serde_json::to_string(&reply)?.into()))
                                        .await?;
                                }
                            }
                            Err(e) => tracing::warn!("Invalid broker message: {}", e),
                        },
                        Message::Close(_) => {
                            self.lost("broker closed the connection".to_string());
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        let _ = sink.close().await;
        Ok(())
    }

    fn request_for(&mut self, command: EndpointCommand) -> Option<RelayRequest> {
        match command {
            EndpointCommand::Connect { conn, target } => {
                self.pending.insert(conn);
                Some(RelayRequest::Connect {
                    target: target.to_string(),
                    request: conn.0,
                })
            }
            EndpointCommand::Send { conn, data } => {
                let Some(broker_conn) = self.broker_conn(conn) else {
                    tracing::debug!(?conn, "dropping message for a connection that is not open");
                    return None;
                };
                Some(RelayRequest::Send {
                    conn: broker_conn,
                    data,
                })
            }
            EndpointCommand::Close { conn } => {
                let Some(broker_conn) = self.broker_conn(conn) else {
                    // Not open yet: the close goes out when `conn_open` arrives.
                    self.pending.remove(&conn);
                    return None;
                };
                self.links.remove(&broker_conn);
                Some(RelayRequest::Close { conn: broker_conn })
            }
        }
    }

    /// Handle one broker event. Returns a request to send back, if any.
    fn on_relay_event(&mut self, event: RelayEvent) -> Option<RelayRequest> {
        let endpoint = self.endpoint;
        match event {
            RelayEvent::Open { id } => self.emit(TransportEvent::EndpointOpen {
                endpoint,
                id: PeerId::new(id),
            }),

            RelayEvent::Error { kind, message } => self.emit(TransportEvent::EndpointError {
                endpoint,
                error: TransportError::new(kind.into(), message),
            }),

            RelayEvent::Connection { conn, peer } => {
                let local = ConnectionHandle(self.handles.fetch_add(1, Ordering::Relaxed));
                self.links.insert(conn, local);
                lock(&self.owners).insert(local, endpoint);
                self.emit(TransportEvent::IncomingConnection {
                    endpoint,
                    conn: local,
                    peer: PeerId::new(peer),
                });
            }

            RelayEvent::ConnOpen { conn, request } => {
                let local = ConnectionHandle(request);
                if !self.pending.remove(&local) || !self.owns(local) {
                    tracing::debug!(?local, "closing a connection released before it opened");
                    return Some(RelayRequest::Close { conn });
                }
                self.links.insert(conn, local);
                self.emit(TransportEvent::ConnectionOpen { conn: local });
            }

            RelayEvent::Data { conn, data } => {
                let &local = self.links.get(&conn)?;
                match PeerMessage::from_value(data) {
                    Ok(message) => self.emit(TransportEvent::ConnectionData {
                        conn: local,
                        message,
                    }),
                    Err(e) => self.emit(TransportEvent::ConnectionError {
                        conn: local,
                        error: TransportError::new(TransportErrorKind::Other, e.to_string()),
                    }),
                }
            }

            RelayEvent::ConnClose { conn } => {
                if let Some(local) = self.links.remove(&conn) {
                    lock(&self.owners).remove(&local);
                    self.emit(TransportEvent::ConnectionClosed { conn: local });
                }
            }
        }
        None
    }

    /// The broker socket is gone; every connection over it is gone too.
    fn lost(&mut self, reason: String) {
        let mut owners = lock(&self.owners);
        for (_, local) in self.links.drain() {
            owners.remove(&local);
            let _ = self.events.send(TransportEvent::ConnectionClosed { conn: local });
        }
        drop(owners);
        self.pending.clear();
        self.emit(TransportEvent::EndpointError {
            endpoint: self.endpoint,
            error: TransportError::new(TransportErrorKind::Network, reason),
        });
    }

    fn owns(&self, local: ConnectionHandle) -> bool {
        lock(&self.owners).get(&local) == Some(&self.endpoint)
    }

    fn broker_conn(&self, local: ConnectionHandle) -> Option<u64> {
        self.links
            .iter()
            .find(|(_, l)| **l == local)
            .map(|(broker, _)| *broker)
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver lives as long as the front end's event loop.
        let _ = self.events.send(event);
    }
}
