//! Endpoint registry and connection routing.
//!
//! `Relay` is pure bookkeeping: every call returns the events to deliver and
//! the server writes them to the right sockets.

use poolcalc_core::{RelayErrorKind, RelayEvent, RelayRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// One WebSocket client of the broker.
pub type ClientId = u64;

/// Events to deliver, in order.
pub type Outbox = Vec<(ClientId, RelayEvent)>;

pub struct Relay {
    next_client: ClientId,
    next_conn: u64,
    /// client -> registered identity
    clients: HashMap<ClientId, Option<String>>,
    ids: HashMap<String, ClientId>,
    /// conn -> (initiator, acceptor)
    conns: HashMap<u64, (ClientId, ClientId)>,
    rng: StdRng,
}

impl Relay {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            next_client: 1,
            next_conn: 1,
            clients: HashMap::new(),
            ids: HashMap::new(),
            conns: HashMap::new(),
            rng,
        }
    }

    pub fn join(&mut self) -> ClientId {
        let client = self.next_client;
        self.next_client += 1;
        self.clients.insert(client, None);
        client
    }

    pub fn handle(&mut self, client: ClientId, request: RelayRequest) -> Outbox {
        match request {
            RelayRequest::Register { id } => self.register(client, id),
            RelayRequest::Connect { target, request } => self.connect(client, target, request),
            RelayRequest::Send { conn, data } => self.send(client, conn, data),
            RelayRequest::Close { conn } => self.close(client, conn),
        }
    }

    /// Drop a client and close every connection it was part of.
    pub fn leave(&mut self, client: ClientId) -> Outbox {
        if let Some(Some(id)) = self.clients.remove(&client) {
            self.ids.remove(&id);
            tracing::info!("{} left", id);
        }

        let mut closed: Vec<u64> = self
            .conns
            .iter()
            .filter(|(_, (a, b))| *a == client || *b == client)
            .map(|(conn, _)| *conn)
            .collect();
        closed.sort_unstable();

        closed
            .into_iter()
            .filter_map(|conn| self.close(client, conn).pop())
            .collect()
    }

    fn register(&mut self, client: ClientId, id: Option<String>) -> Outbox {
        if let Some(Some(current)) = self.clients.get(&client) {
            return error(
                client,
                RelayErrorKind::InvalidId,
                format!("already registered as {current}"),
            );
        }

        let id = match id {
            Some(id) => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return error(client, RelayErrorKind::InvalidId, "id cannot be empty");
                }
                if self.ids.contains_key(&id) {
                    return error(
                        client,
                        RelayErrorKind::UnavailableId,
                        format!("id {id} is taken"),
                    );
                }
                id
            }
            None => self.fresh_id(),
        };

        tracing::info!("client {} registered as {}", client, id);
        self.ids.insert(id.clone(), client);
        self.clients.insert(client, Some(id.clone()));
        vec![(client, RelayEvent::Open { id })]
    }

    fn connect(&mut self, client: ClientId, target: String, request: u64) -> Outbox {
        let Some(Some(from)) = self.clients.get(&client).cloned() else {
            return error(
                client,
                RelayErrorKind::InvalidId,
                "register before connecting",
            );
        };

        let to = match self.ids.get(&target) {
            Some(&to) if to != client => to,
            _ => {
                return error(
                    client,
                    RelayErrorKind::PeerUnavailable,
                    format!("could not connect to peer {target}"),
                );
            }
        };

        let conn = self.next_conn;
        self.next_conn += 1;
        self.conns.insert(conn, (client, to));
        tracing::debug!("{} -> {} opened as conn {}", from, target, conn);

        vec![
            (to, RelayEvent::Connection { conn, peer: from }),
            (client, RelayEvent::ConnOpen { conn, request }),
        ]
    }

    fn send(&mut self, client: ClientId, conn: u64, data: serde_json::Value) -> Outbox {
        match self.other_side(client, conn) {
            Some(other) => vec![(other, RelayEvent::Data { conn, data })],
            None => error(
                client,
                RelayErrorKind::Network,
                format!("unknown connection {conn}"),
            ),
        }
    }

    fn close(&mut self, client: ClientId, conn: u64) -> Outbox {
        let Some(other) = self.other_side(client, conn) else {
            return Vec::new();
        };
        self.conns.remove(&conn);
        tracing::debug!("conn {} closed", conn);
        vec![(other, RelayEvent::ConnClose { conn })]
    }

    fn other_side(&self, client: ClientId, conn: u64) -> Option<ClientId> {
        match self.conns.get(&conn) {
            Some(&(a, b)) if a == client => Some(b),
            Some(&(a, b)) if b == client => Some(a),
            _ => None,
        }
    }

    fn fresh_id(&mut self) -> String {
        loop {
            let id = format!("{:012x}", self.rng.gen_range(0..1u64 << 48));
            if !self.ids.contains_key(&id) {
                return id;
            }
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

fn error(client: ClientId, kind: RelayErrorKind, message: impl Into<String>) -> Outbox {
    vec![(
        client,
        RelayEvent::Error {
            kind,
            message: message.into(),
        },
    )]
}
