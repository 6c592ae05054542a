//! The session coordinator.

use crate::cue::CueSink;
use crate::transport::{
    ConnectionHandle, EndpointHandle, Transport, TransportError, TransportEvent,
};
use poolcalc_core::{
    Command, Cue, GameState, PeerId, PeerMessage, RoomCode, RoomCodeError, apply_command,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Which side of a session this instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not in a session; commands apply locally (practice mode).
    None,
    /// Owns the authoritative state and accepts one remote.
    Host,
    /// Dials a host and mirrors its state.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// Errors from session operations the user invokes directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid room code: {0}")]
    InvalidRoomCode(#[from] RoomCodeError),
    #[error("not joining a session; start as remote first")]
    NotJoining,
}

/// One calculator instance and its peer link.
pub struct Session<T, C> {
    transport: T,
    cues: C,
    rng: StdRng,
    state: GameState,
    role: Role,
    status: ConnectionStatus,
    local_id: Option<PeerId>,
    remote_id: Option<PeerId>,
    endpoint: Option<EndpointHandle>,
    connection: Option<ConnectionHandle>,
}

impl<T: Transport, C: CueSink> Session<T, C> {
    pub fn new(transport: T, cues: C) -> Self {
        Self::with_rng(transport, cues, StdRng::from_entropy())
    }

    /// Use a fixed room code generator; handy for reproducible runs.
    pub fn with_rng(transport: T, cues: C, rng: StdRng) -> Self {
        Self {
            transport,
            cues,
            rng,
            state: GameState::initial(),
            role: Role::None,
            status: ConnectionStatus::Disconnected,
            local_id: None,
            remote_id: None,
            endpoint: None,
            connection: None,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Identity assigned to this instance, once the transport confirms it.
    pub fn local_id(&self) -> Option<&PeerId> {
        self.local_id.as_ref()
    }

    /// Room code this remote dialed.
    pub fn remote_id(&self) -> Option<&PeerId> {
        self.remote_id.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Become the host and register under a random room code.
    pub fn start_host(&mut self) {
        self.release();
        self.state = GameState::initial();
        self.role = Role::Host;
        self.register_room_code();
    }

    /// Become a remote and register under a transport-assigned identity.
    pub fn start_join(&mut self) {
        self.release();
        self.state = GameState::initial();
        self.role = Role::Remote;
        let endpoint = self.transport.create_endpoint(None);
        tracing::debug!(?endpoint, "registering remote endpoint");
        self.endpoint = Some(endpoint);
    }

    /// Dial the host behind `code`. The code must be exactly three characters.
    pub fn connect_to_host(&mut self, code: &str) -> Result<(), SessionError> {
        let code: RoomCode = code.parse()?;
        let endpoint = match (self.role, self.endpoint) {
            (Role::Remote, Some(endpoint)) => endpoint,
            _ => return Err(SessionError::NotJoining),
        };

        if let Some(old) = self.connection.take() {
            self.transport.close(old);
        }
        // Connected again only once the new dial opens.
        self.status = ConnectionStatus::Disconnected;

        let target = PeerId::from(code);
        tracing::info!("connecting to host {}", target);
        let conn = self.transport.connect(endpoint, &target);
        self.connection = Some(conn);
        self.remote_id = Some(target);
        Ok(())
    }

    /// Route a user command: forward it to the host when connected as a
    /// remote, otherwise apply it here.
    pub fn dispatch(&mut self, command: Command) {
        if self.role == Role::Remote && self.is_connected() {
            if let Some(conn) = self.connection {
                tracing::debug!(command = command.name(), "forwarding to host");
                let message = PeerMessage::Command(command);
                if let Err(e) = self.transport.send(conn, &message) {
                    tracing::warn!("failed to forward command: {}", e);
                }
                return;
            }
        }
        self.apply(&command);
    }

    /// Close the link, release the endpoint and return to the menu.
    pub fn disconnect(&mut self) {
        self.release();
        self.state = GameState::initial();
        self.role = Role::None;
        tracing::info!("session ended");
    }

    /// React to one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::EndpointOpen { endpoint, id } => {
                if !self.owns_endpoint(endpoint) {
                    return;
                }
                tracing::info!("registered as {}", id);
                self.local_id = Some(id);
            }

            TransportEvent::EndpointError { endpoint, error } => {
                if !self.owns_endpoint(endpoint) {
                    return;
                }
                self.on_endpoint_error(endpoint, error);
            }

            TransportEvent::IncomingConnection {
                endpoint,
                conn,
                peer,
            } => {
                if !self.owns_endpoint(endpoint) {
                    self.transport.close(conn);
                    return;
                }
                self.on_incoming(conn, peer);
            }

            TransportEvent::ConnectionOpen { conn } => {
                if !self.owns_connection(conn) || self.role != Role::Remote {
                    return;
                }
                tracing::info!("connected to host");
                self.status = ConnectionStatus::Connected;
                self.play(Cue::Connect);
            }

            TransportEvent::ConnectionData { conn, message } => {
                if !self.owns_connection(conn) {
                    return;
                }
                self.on_message(message);
            }

            TransportEvent::ConnectionClosed { conn } => {
                if !self.owns_connection(conn) {
                    return;
                }
                // The handle stays stored; only `disconnect` releases it.
                tracing::info!("peer connection closed");
                self.status = ConnectionStatus::Disconnected;
            }

            TransportEvent::ConnectionError { conn, error } => {
                if self.owns_connection(conn) {
                    tracing::warn!("connection error: {}", error);
                }
            }
        }
    }

    fn register_room_code(&mut self) {
        let candidate = PeerId::random_room_code(&mut self.rng);
        tracing::debug!("requesting room code {}", candidate);
        self.endpoint = Some(self.transport.create_endpoint(Some(&candidate)));
    }

    fn on_endpoint_error(&mut self, endpoint: EndpointHandle, error: TransportError) {
        if error.is_unavailable_id() && self.role == Role::Host {
            tracing::debug!("room code taken, retrying: {}", error);
            self.transport.destroy(endpoint);
            self.endpoint = None;
            self.register_room_code();
        } else {
            tracing::warn!("transport error: {}", error);
        }
    }

    fn on_incoming(&mut self, conn: ConnectionHandle, peer: PeerId) {
        if self.role != Role::Host || self.is_connected() {
            tracing::debug!("refusing extra connection from {}", peer);
            self.transport.close(conn);
            return;
        }

        tracing::info!("remote {} connected", peer);
        if let Some(old) = self.connection.replace(conn) {
            self.transport.close(old);
        }
        self.status = ConnectionStatus::Connected;
        self.play(Cue::Connect);
        self.broadcast();
    }

    fn on_message(&mut self, message: PeerMessage) {
        match (self.role, message) {
            (Role::Host, PeerMessage::Command(command)) => {
                tracing::debug!(command = command.name(), "applying remote command");
                self.apply(&command);
            }
            (Role::Remote, PeerMessage::StateSync(state)) => {
                self.state = state;
            }
            (role, message) => {
                tracing::debug!(?role, ?message, "ignoring message");
            }
        }
    }

    fn apply(&mut self, command: &Command) {
        let outcome = apply_command(&self.state, command);
        if let Some(cue) = outcome.cue {
            self.play(cue);
        }
        self.state = outcome.state;
        self.broadcast();
    }

    /// Push the current state to the remote if this is a connected host.
    fn broadcast(&mut self) {
        if self.role != Role::Host || !self.is_connected() {
            return;
        }
        if let Some(conn) = self.connection {
            let message = PeerMessage::StateSync(self.state.clone());
            if let Err(e) = self.transport.send(conn, &message) {
                tracing::warn!("failed to sync state: {}", e);
            }
        }
    }

    fn play(&mut self, cue: Cue) {
        if let Err(e) = self.cues.play(cue) {
            tracing::warn!("{}", e);
        }
    }

    fn release(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.transport.close(conn);
        }
        if let Some(endpoint) = self.endpoint.take() {
            self.transport.destroy(endpoint);
        }
        self.status = ConnectionStatus::Disconnected;
        self.local_id = None;
        self.remote_id = None;
    }

    fn owns_endpoint(&self, endpoint: EndpointHandle) -> bool {
        let owned = self.endpoint == Some(endpoint);
        if !owned {
            tracing::debug!(?endpoint, "dropping event for released endpoint");
        }
        owned
    }

    fn owns_connection(&self, conn: ConnectionHandle) -> bool {
        let owned = self.connection == Some(conn);
        if !owned {
            tracing::debug!(?conn, "dropping event for released connection");
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::CueError;
    use crate::transport::TransportErrorKind;
    use poolcalc_core::NameSlot;

    #[derive(Default)]
    struct FakeTransport {
        next: u64,
        endpoints: Vec<(EndpointHandle, Option<PeerId>)>,
        dials: Vec<(EndpointHandle, PeerId)>,
        sent: Vec<(ConnectionHandle, PeerMessage)>,
        closed: Vec<ConnectionHandle>,
        destroyed: Vec<EndpointHandle>,
    }

    impl Transport for FakeTransport {
        fn create_endpoint(&mut self, preferred: Option<&PeerId>) -> EndpointHandle {
            self.next += 1;
            let handle = EndpointHandle(self.next);
            self.endpoints.push((handle, preferred.cloned()));
            handle
        }

        fn connect(&mut self, endpoint: EndpointHandle, target: &PeerId) -> ConnectionHandle {
            self.next += 1;
            self.dials.push((endpoint, target.clone()));
            ConnectionHandle(self.next)
        }

        fn send(
            &mut self,
            conn: ConnectionHandle,
            message: &PeerMessage,
        ) -> Result<(), TransportError> {
            self.sent.push((conn, message.clone()));
            Ok(())
        }

        fn close(&mut self, conn: ConnectionHandle) {
            self.closed.push(conn);
        }

        fn destroy(&mut self, endpoint: EndpointHandle) {
            self.destroyed.push(endpoint);
        }
    }

    #[derive(Default)]
    struct RecordedCues(Vec<Cue>);

    impl CueSink for RecordedCues {
        fn play(&mut self, cue: Cue) -> Result<(), CueError> {
            self.0.push(cue);
            Ok(())
        }
    }

    struct BlockedCues;

    impl CueSink for BlockedCues {
        fn play(&mut self, cue: Cue) -> Result<(), CueError> {
            Err(CueError::new(cue, "autoplay blocked"))
        }
    }

    type TestSession = Session<FakeTransport, RecordedCues>;

    fn session() -> TestSession {
        Session::with_rng(
            FakeTransport::default(),
            RecordedCues::default(),
            StdRng::seed_from_u64(42),
        )
    }

    fn last_endpoint(s: &TestSession) -> EndpointHandle {
        s.transport().endpoints.last().unwrap().0
    }

    fn connected_host() -> (TestSession, ConnectionHandle) {
        let mut s = session();
        s.start_host();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::EndpointOpen {
            endpoint,
            id: PeerId::new("123"),
        });
        let conn = ConnectionHandle(100);
        s.handle_event(TransportEvent::IncomingConnection {
            endpoint,
            conn,
            peer: PeerId::new("remote-a"),
        });
        s.transport_mut().sent.clear();
        (s, conn)
    }

    fn connected_remote() -> (TestSession, ConnectionHandle) {
        let mut s = session();
        s.start_join();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::EndpointOpen {
            endpoint,
            id: PeerId::new("c0ffee"),
        });
        s.connect_to_host("123").unwrap();
        let conn = ConnectionHandle(s.transport().next);
        s.handle_event(TransportEvent::ConnectionOpen { conn });
        (s, conn)
    }

    #[test]
    fn offline_commands_apply_locally() {
        let mut s = session();
        s.dispatch(Command::Add1000);
        s.dispatch(Command::Equals);
        assert_eq!(s.role(), Role::None);
        assert_eq!(s.state().pool, 2000);
        assert_eq!(s.cues.0, vec![Cue::Up]);
        assert!(s.transport().sent.is_empty());
    }

    #[test]
    fn host_requests_room_code() {
        let mut s = session();
        s.start_host();
        assert_eq!(s.role(), Role::Host);
        let (_, preferred) = &s.transport().endpoints[0];
        assert!(preferred.as_ref().unwrap().is_room_code());
        assert_eq!(s.local_id(), None);
    }

    #[test]
    fn host_retries_until_room_code_is_free() {
        let mut s = session();
        s.start_host();

        for _ in 0..2 {
            let endpoint = last_endpoint(&s);
            s.handle_event(TransportEvent::EndpointError {
                endpoint,
                error: TransportError::new(TransportErrorKind::UnavailableId, "taken"),
            });
            assert_eq!(s.local_id(), None);
        }

        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::EndpointOpen {
            endpoint,
            id: PeerId::new("815"),
        });

        let t = s.transport();
        assert_eq!(t.endpoints.len(), 3);
        assert!(t.endpoints.iter().all(|(_, p)| p.as_ref().unwrap().is_room_code()));
        assert_eq!(t.destroyed, vec![t.endpoints[0].0, t.endpoints[1].0]);
        assert_eq!(s.local_id(), Some(&PeerId::new("815")));
    }

    #[test]
    fn other_endpoint_errors_change_nothing() {
        let mut s = session();
        s.start_host();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::EndpointError {
            endpoint,
            error: TransportError::new(TransportErrorKind::Network, "lost signaling server"),
        });
        assert_eq!(s.transport().endpoints.len(), 1);
        assert!(s.transport().destroyed.is_empty());
        assert_eq!(s.role(), Role::Host);
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn remote_never_retries_on_collision() {
        let mut s = session();
        s.start_join();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::EndpointError {
            endpoint,
            error: TransportError::new(TransportErrorKind::UnavailableId, "taken"),
        });
        assert_eq!(s.transport().endpoints.len(), 1);
    }

    #[test]
    fn host_accepts_connection_and_syncs() {
        let mut s = session();
        s.start_host();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::IncomingConnection {
            endpoint,
            conn: ConnectionHandle(9),
            peer: PeerId::new("remote-a"),
        });

        assert!(s.is_connected());
        assert_eq!(s.cues.0, vec![Cue::Connect]);
        assert_eq!(
            s.transport().sent,
            vec![(ConnectionHandle(9), PeerMessage::StateSync(GameState::initial()))]
        );
    }

    #[test]
    fn host_refuses_second_remote() {
        let (mut s, conn) = connected_host();
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::IncomingConnection {
            endpoint,
            conn: ConnectionHandle(200),
            peer: PeerId::new("remote-b"),
        });
        assert_eq!(s.transport().closed, vec![ConnectionHandle(200)]);
        s.dispatch(Command::Add1000);
        assert_eq!(s.transport().sent[0].0, conn);
    }

    #[test]
    fn host_broadcasts_every_change() {
        let (mut s, conn) = connected_host();
        s.dispatch(Command::Add1000);
        let expected = apply_command(&GameState::initial(), &Command::Add1000).state;
        assert_eq!(
            s.transport().sent,
            vec![(conn, PeerMessage::StateSync(expected.clone()))]
        );

        s.handle_event(TransportEvent::ConnectionData {
            conn,
            message: PeerMessage::Command(Command::Equals),
        });
        let expected = apply_command(&expected, &Command::Equals).state;
        assert_eq!(s.state(), &expected);
        assert_eq!(
            s.transport().sent.last(),
            Some(&(conn, PeerMessage::StateSync(expected)))
        );
    }

    #[test]
    fn host_ignores_state_sync() {
        let (mut s, conn) = connected_host();
        let mut bogus = GameState::initial();
        bogus.pool = 5;
        s.handle_event(TransportEvent::ConnectionData {
            conn,
            message: PeerMessage::StateSync(bogus),
        });
        assert_eq!(s.state(), &GameState::initial());
    }

    #[test]
    fn host_stops_broadcasting_after_close() {
        let (mut s, conn) = connected_host();
        s.handle_event(TransportEvent::ConnectionClosed { conn });
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
        s.dispatch(Command::Add1000);
        assert!(s.transport().sent.is_empty());
        assert_eq!(s.state().display_value, 2000);
    }

    #[test]
    fn host_accepts_new_remote_after_close() {
        let (mut s, conn) = connected_host();
        s.handle_event(TransportEvent::ConnectionClosed { conn });
        let endpoint = last_endpoint(&s);
        s.handle_event(TransportEvent::IncomingConnection {
            endpoint,
            conn: ConnectionHandle(300),
            peer: PeerId::new("remote-b"),
        });
        assert!(s.is_connected());
        assert!(s.transport().closed.contains(&conn));
    }

    #[test]
    fn connect_requires_three_characters() {
        let mut s = session();
        s.start_join();
        assert_eq!(
            s.connect_to_host("12"),
            Err(SessionError::InvalidRoomCode(RoomCodeError::WrongLength(2)))
        );
        assert_eq!(
            s.connect_to_host(""),
            Err(SessionError::InvalidRoomCode(RoomCodeError::Empty))
        );
        assert!(s.transport().dials.is_empty());
    }

    #[test]
    fn connect_requires_remote_role() {
        let mut s = session();
        assert_eq!(s.connect_to_host("123"), Err(SessionError::NotJoining));
        s.start_host();
        assert_eq!(s.connect_to_host("123"), Err(SessionError::NotJoining));
        assert!(s.transport().dials.is_empty());
    }

    #[test]
    fn remote_opens_connection() {
        let (s, _) = connected_remote();
        assert!(s.is_connected());
        assert_eq!(s.remote_id(), Some(&PeerId::new("123")));
        assert_eq!(s.local_id(), Some(&PeerId::new("c0ffee")));
        assert_eq!(s.cues.0, vec![Cue::Connect]);
        assert_eq!(s.transport().dials[0].1, PeerId::new("123"));
    }

    #[test]
    fn connected_remote_forwards_instead_of_applying() {
        let (mut s, conn) = connected_remote();
        let command = Command::rename(NameSlot::First, "Ploy");
        s.dispatch(command.clone());

        assert_eq!(s.state(), &GameState::initial());
        assert_eq!(s.transport().sent, vec![(conn, PeerMessage::Command(command))]);
        assert_eq!(
            s.transport().sent[0].1.to_value(),
            serde_json::json!({
                "type": "COMMAND",
                "payload": {
                    "command": "UPDATE_NAME",
                    "payload": { "id": "name1", "value": "Ploy" }
                }
            })
        );
    }

    #[test]
    fn remote_mirrors_state_sync() {
        let (mut s, conn) = connected_remote();
        let mut host_state = GameState::initial();
        host_state.player1 = 7000;
        host_state.pool = 3000;
        host_state.name2 = "Nok".to_string();
        s.handle_event(TransportEvent::ConnectionData {
            conn,
            message: PeerMessage::StateSync(host_state.clone()),
        });
        assert_eq!(s.state(), &host_state);
        assert!(s.cues.0.iter().all(|c| *c == Cue::Connect));
    }

    #[test]
    fn remote_close_keeps_handle_and_goes_local() {
        let (mut s, conn) = connected_remote();
        s.handle_event(TransportEvent::ConnectionClosed { conn });
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
        assert_eq!(s.role(), Role::Remote);
        assert_eq!(s.connection, Some(conn));

        s.dispatch(Command::Add1000);
        assert!(s.transport().sent.is_empty());
        assert_eq!(s.state().display_value, 2000);
    }

    #[test]
    fn redial_drops_connected_status_until_open() {
        let (mut s, old) = connected_remote();
        s.connect_to_host("999").unwrap();
        let new = ConnectionHandle(s.transport().next);

        assert_eq!(s.transport().closed, vec![old]);
        assert_eq!(s.status(), ConnectionStatus::Disconnected);

        s.dispatch(Command::Add1000);
        assert!(s.transport().sent.is_empty());
        assert_eq!(s.state().display_value, 2000);

        // A late open for the closed link does not count.
        s.handle_event(TransportEvent::ConnectionOpen { conn: old });
        assert!(!s.is_connected());
        s.handle_event(TransportEvent::ConnectionOpen { conn: new });
        assert!(s.is_connected());
    }

    #[test]
    fn mirrored_extremes_do_not_panic_offline() {
        let (mut s, conn) = connected_remote();
        let mut hostile = GameState::initial();
        hostile.pool = i64::MAX;
        hostile.display_value = 1;
        s.handle_event(TransportEvent::ConnectionData {
            conn,
            message: PeerMessage::StateSync(hostile),
        });
        s.handle_event(TransportEvent::ConnectionClosed { conn });

        s.dispatch(Command::Equals);
        assert_eq!(s.state().pool, i64::MAX);
        assert!(s.state().is_settled());
    }

    #[test]
    fn disconnect_releases_everything() {
        let (mut s, conn) = connected_remote();
        let endpoint = last_endpoint(&s);
        s.disconnect();

        assert_eq!(s.role(), Role::None);
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
        assert_eq!(s.local_id(), None);
        assert_eq!(s.remote_id(), None);
        assert_eq!(s.transport().closed, vec![conn]);
        assert_eq!(s.transport().destroyed, vec![endpoint]);

        s.disconnect();
        assert_eq!(s.transport().closed.len(), 1);
        assert_eq!(s.transport().destroyed.len(), 1);
    }

    #[test]
    fn events_after_disconnect_are_ignored() {
        let (mut s, conn) = connected_remote();
        let endpoint = last_endpoint(&s);
        s.disconnect();

        let mut late = GameState::initial();
        late.pool = 4000;
        s.handle_event(TransportEvent::ConnectionData {
            conn,
            message: PeerMessage::StateSync(late),
        });
        s.handle_event(TransportEvent::ConnectionOpen { conn });
        s.handle_event(TransportEvent::EndpointOpen {
            endpoint,
            id: PeerId::new("late"),
        });

        assert_eq!(s.state(), &GameState::initial());
        assert!(!s.is_connected());
        assert_eq!(s.local_id(), None);
    }

    #[test]
    fn stale_collision_does_not_retry() {
        let mut s = session();
        s.start_host();
        let stale = last_endpoint(&s);
        s.disconnect();
        s.handle_event(TransportEvent::EndpointError {
            endpoint: stale,
            error: TransportError::new(TransportErrorKind::UnavailableId, "taken"),
        });
        assert_eq!(s.transport().endpoints.len(), 1);
        assert_eq!(s.role(), Role::None);
    }

    #[test]
    fn blocked_cues_are_swallowed() {
        let mut s = Session::with_rng(
            FakeTransport::default(),
            BlockedCues,
            StdRng::seed_from_u64(1),
        );
        s.dispatch(Command::Reset);
        assert_eq!(s.state(), &GameState::initial());
    }
}
