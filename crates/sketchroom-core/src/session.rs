//! Room session lifecycle.
//!
//! [`RoomSession`] owns the auth handshake, the realtime channel, the
//! heartbeat, presence, and reconnection. It is poll-driven: the caller
//! pumps [`RoomSession::tick`] from its event loop and drains
//! [`RoomSession::poll_events`]. Everything stateful happens on the
//! caller's thread; the transport does the blocking elsewhere.

use std::mem;
use std::time::{Duration, Instant};

use chrono::Utc;
use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, NetworkError, StateError};
use crate::image::{CanvasImage, ImageId};
use crate::presence::{Presence, PresenceEvent, PresenceTracker};
use crate::protocol::{self, Envelope, Payload};
use crate::stroke::Stroke;
use crate::timers::{TimerKind, TimerQueue};
#[cfg(not(target_arch = "wasm32"))]
use crate::transport::NetTransport;
use crate::transport::{RoomTransport, TokenRequest, TransportEvent};

/// Delay before retrying a dropped connection. Fixed, no backoff.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Ping cadence while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A channel with no pong for this long is treated as dead.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);
/// Coalescing window for cursor broadcasts.
pub const CURSOR_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// What the local user is allowed to do in the room. Enforced by the
/// room service; carried here for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

/// Identity the session joins rooms with.
#[derive(Debug, Clone)]
pub struct LocalUser {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    /// Display color announced with our presence, e.g. `#3366ff`.
    pub color_hex: String,
}

/// Where to reach the auth relay and the room service.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// HTTP endpoint issuing room tokens.
    pub token_endpoint: String,
    /// WebSocket URL of the realtime channel.
    pub realtime_url: String,
}

/// Connection lifecycle. A fresh entry walks `Disconnected ->
/// Connecting -> Authenticating -> Authenticated -> Connected`; after a
/// drop the session waits in `Reconnecting`, then retries from
/// `Connecting`, reusing the issued token. Only `leave_room` ends the
/// lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Authenticated,
    Connected,
    Reconnecting,
    Error,
}

/// Engine-level happenings, drained with [`RoomSession::poll_events`].
///
/// Canvas payloads are surfaced here rather than applied directly; the
/// editor decides how they enter local state and history.
#[derive(Debug)]
pub enum RoomEvent {
    ConnectionChanged(ConnectionState),
    PeerJoined(Presence),
    /// Carries the last-known presence of the departed user.
    PeerLeft(Presence),
    StrokeReceived {
        user_id: String,
        user_name: String,
        stroke: Stroke,
    },
    ImageAdded {
        user_id: String,
        image: CanvasImage,
    },
    ImageTransformed {
        user_id: String,
        id: ImageId,
        transform: Affine,
    },
    ImageRemoved {
        user_id: String,
        id: ImageId,
    },
    CanvasCleared {
        user_id: String,
    },
    /// Non-fatal failure, reported for display. The session keeps
    /// operating in a degraded mode.
    Error(EngineError),
}

/// The room currently joined and its issued credential.
#[derive(Debug)]
struct Session {
    room_id: String,
    token: Option<String>,
}

/// Client side of a collaboration room.
pub struct RoomSession {
    config: RoomConfig,
    user: LocalUser,
    transport: Box<dyn RoomTransport>,
    state: ConnectionState,
    session: Option<Session>,
    tracker: PresenceTracker,
    timers: TimerQueue,
    events: Vec<RoomEvent>,
    local_presence: Presence,
    cursor_dirty: bool,
    channel_open: bool,
}

impl RoomSession {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(config: RoomConfig, user: LocalUser) -> Self {
        Self::with_transport(config, user, Box::new(NetTransport::new()))
    }

    /// Build a session over a caller-supplied transport.
    pub fn with_transport(
        config: RoomConfig,
        user: LocalUser,
        transport: Box<dyn RoomTransport>,
    ) -> Self {
        let mut local_presence = Presence::new(user.user_id.as_str(), user.user_name.as_str());
        local_presence.color_hex = user.color_hex.clone();
        Self {
            config,
            user,
            transport,
            state: ConnectionState::Disconnected,
            session: None,
            tracker: PresenceTracker::new(),
            timers: TimerQueue::new(),
            events: Vec::new(),
            local_presence,
            cursor_dirty: false,
            channel_open: false,
        }
    }

    /// Start the handshake for `room_id`. The outcome arrives through
    /// the event stream; `Err` here means the call itself was invalid.
    pub fn enter_room(&mut self, room_id: &str) -> Result<(), StateError> {
        if let Some(session) = &self.session {
            return Err(StateError::AlreadyInRoom(session.room_id.clone()));
        }
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(StateError::EmptyRoomId);
        }

        log::info!("entering room {room_id} as {}", self.user.user_id);
        self.session = Some(Session {
            room_id: room_id.to_string(),
            token: None,
        });
        self.set_state(ConnectionState::Connecting);
        let request = self.token_request(room_id);
        self.transport
            .request_token(&self.config.token_endpoint, &request);
        self.set_state(ConnectionState::Authenticating);
        Ok(())
    }

    /// Leave the current room: best-effort parting presence, then tear
    /// down the channel and every outstanding timer. Idempotent.
    pub fn leave_room(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        log::info!("leaving room {}", session.room_id);

        if self.channel_open {
            let goodbye = Envelope::new(Payload::PresenceUpdate(Presence::leaving(
                self.user.user_id.as_str(),
                self.user.user_name.as_str(),
            )));
            self.send_raw(&goodbye);
        }

        self.timers.cancel_all();
        self.transport.close();
        self.channel_open = false;
        self.cursor_dirty = false;
        self.tracker.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Broadcast an envelope to the room. Dropped (with a log line, not
    /// an error) unless the session is connected: an edit must never
    /// block on delivery.
    pub fn send(&mut self, envelope: &Envelope) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Authenticated
        ) {
            log::debug!("dropping outbound message while {:?}", self.state);
            return;
        }
        self.send_raw(envelope);
    }

    /// Record a cursor move for broadcast. Moves are coalesced to one
    /// presence update per flush window.
    pub fn update_cursor(&mut self, cursor: Point, is_drawing: bool, now: Instant) {
        self.local_presence.cursor = Some(cursor);
        self.local_presence.is_drawing = is_drawing;
        if !self.cursor_dirty {
            self.cursor_dirty = true;
            self.timers
                .schedule(TimerKind::CursorFlush, CURSOR_FLUSH_INTERVAL, now);
        }
    }

    /// Announce a tool change immediately.
    pub fn update_tool(&mut self, tool: &str, stroke_size: f64, stroke_color: u32) {
        self.local_presence.selected_tool = tool.to_string();
        self.local_presence.stroke_size = stroke_size;
        self.local_presence.stroke_color = stroke_color;
        self.broadcast_presence();
    }

    /// Advance timers and drain the transport. Call once per loop
    /// iteration.
    pub fn tick(&mut self, now: Instant) {
        for kind in self.timers.due(now) {
            self.fire_timer(kind, now);
        }
        for event in self.transport.poll() {
            self.handle_transport(event, now);
        }
    }

    /// Take everything that happened since the last call.
    pub fn poll_events(&mut self) -> Vec<RoomEvent> {
        mem::take(&mut self.events)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn room_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.room_id.as_str())
    }

    pub fn user(&self) -> &LocalUser {
        &self.user
    }

    /// Roster of remote participants.
    pub fn presence(&self) -> &PresenceTracker {
        &self.tracker
    }

    fn token_request(&self, room_id: &str) -> TokenRequest {
        TokenRequest {
            room_id: room_id.to_string(),
            user_id: self.user.user_id.clone(),
            user_name: self.user.user_name.clone(),
            user_role: self.user.role,
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log::debug!("connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.events.push(RoomEvent::ConnectionChanged(next));
    }

    fn fire_timer(&mut self, kind: TimerKind, now: Instant) {
        match kind {
            TimerKind::Reconnect => {
                // a leave since the drop cleared the session and with it
                // the retry
                if self.session.is_some() {
                    self.begin_attempt();
                }
            }
            TimerKind::Heartbeat => {
                if self.state == ConnectionState::Connected {
                    let ping = Envelope::new(Payload::Ping {
                        user_id: self.user.user_id.clone(),
                    });
                    self.send_raw(&ping);
                    self.timers
                        .schedule(TimerKind::Heartbeat, HEARTBEAT_INTERVAL, now);
                }
            }
            TimerKind::Liveness => {
                if self.state == ConnectionState::Connected {
                    log::warn!(
                        "no pong within {}s, dropping channel",
                        LIVENESS_TIMEOUT.as_secs()
                    );
                    self.handle_drop(
                        now,
                        Some(NetworkError::LivenessTimeout(LIVENESS_TIMEOUT.as_secs())),
                    );
                }
            }
            TimerKind::CursorFlush => {
                if self.cursor_dirty {
                    self.cursor_dirty = false;
                    self.broadcast_presence();
                }
            }
        }
    }

    /// Start one connection attempt. With a cached token the new channel
    /// is authenticated directly; otherwise the handshake restarts.
    fn begin_attempt(&mut self) {
        let Some((room_id, token)) = self
            .session
            .as_ref()
            .map(|s| (s.room_id.clone(), s.token.clone()))
        else {
            return;
        };

        self.set_state(ConnectionState::Connecting);
        match token {
            Some(token) => {
                self.set_state(ConnectionState::Authenticating);
                self.transport.open(&self.config.realtime_url, &token);
            }
            None => {
                let request = self.token_request(&room_id);
                self.transport
                    .request_token(&self.config.token_endpoint, &request);
                self.set_state(ConnectionState::Authenticating);
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::TokenIssued { token } => {
                let Some(session) = self.session.as_mut() else {
                    log::debug!("token issued after leaving, ignored");
                    return;
                };
                session.token = Some(token.clone());
                self.set_state(ConnectionState::Authenticated);
                self.transport.open(&self.config.realtime_url, &token);
            }
            TransportEvent::TokenDenied { status, message } => {
                if self.session.is_none() {
                    return;
                }
                self.set_state(ConnectionState::Error);
                match status {
                    // a refused login will not pass on retry
                    Some(code) if (400..500).contains(&code) => {
                        self.events.push(RoomEvent::Error(
                            NetworkError::AuthRejected {
                                status: code,
                                message,
                            }
                            .into(),
                        ));
                    }
                    _ => {
                        self.events
                            .push(RoomEvent::Error(NetworkError::Transport(message).into()));
                        self.schedule_reconnect(now);
                    }
                }
            }
            TransportEvent::Opened => {
                if self.session.is_none() {
                    return;
                }
                self.channel_open = true;
                self.set_state(ConnectionState::Connected);
                self.timers
                    .schedule(TimerKind::Heartbeat, HEARTBEAT_INTERVAL, now);
                self.timers
                    .schedule(TimerKind::Liveness, LIVENESS_TIMEOUT, now);
                self.broadcast_presence();
            }
            TransportEvent::Message(text) => self.handle_frame(&text, now),
            TransportEvent::Closed => {
                if !self.channel_open {
                    log::debug!("stale close event ignored");
                    return;
                }
                self.channel_open = false;
                if self.session.is_some() {
                    self.handle_drop(now, Some(NetworkError::ConnectionLost));
                }
            }
            TransportEvent::Failed(message) => {
                if self.session.is_none() {
                    return;
                }
                self.channel_open = false;
                self.set_state(ConnectionState::Error);
                self.events
                    .push(RoomEvent::Error(NetworkError::Transport(message).into()));
                self.schedule_reconnect(now);
            }
        }
    }

    fn handle_frame(&mut self, text: &str, now: Instant) {
        let envelope = match protocol::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("dropping inbound frame: {err}");
                return;
            }
        };
        // the room service echoes our own broadcasts back
        if envelope.payload.user_id() == self.user.user_id {
            return;
        }

        match envelope.payload {
            Payload::Stroke {
                user_id,
                user_name,
                stroke,
            } => {
                self.events.push(RoomEvent::StrokeReceived {
                    user_id,
                    user_name,
                    stroke: Stroke::from_wire(stroke),
                });
            }
            Payload::ImageAdd { user_id, image } => match CanvasImage::from_wire(&image) {
                Ok(image) => self.events.push(RoomEvent::ImageAdded { user_id, image }),
                Err(err) => log::warn!("dropping undecodable image from {user_id}: {err}"),
            },
            Payload::ImageUpdate {
                user_id,
                id,
                transform,
            } => {
                self.events.push(RoomEvent::ImageTransformed {
                    user_id,
                    id,
                    transform,
                });
            }
            Payload::ImageRemove { user_id, id } => {
                self.events.push(RoomEvent::ImageRemoved { user_id, id });
            }
            Payload::ClearCanvas { user_id } => {
                self.events.push(RoomEvent::CanvasCleared { user_id });
            }
            Payload::PresenceUpdate(presence) => match self.tracker.apply(presence) {
                Some(PresenceEvent::Joined(p)) => self.events.push(RoomEvent::PeerJoined(p)),
                Some(PresenceEvent::Left(p)) => self.events.push(RoomEvent::PeerLeft(p)),
                None => {}
            },
            Payload::Ping { .. } => {
                let reply = Envelope::new(Payload::Pong {
                    user_id: self.user.user_id.clone(),
                });
                self.send_raw(&reply);
            }
            Payload::Pong { .. } => {
                self.timers
                    .schedule(TimerKind::Liveness, LIVENESS_TIMEOUT, now);
            }
        }
    }

    /// Tear down after an unexpected drop and line up one retry.
    fn handle_drop(&mut self, now: Instant, error: Option<NetworkError>) {
        self.transport.close();
        self.channel_open = false;
        self.timers.cancel(TimerKind::Heartbeat);
        self.timers.cancel(TimerKind::Liveness);
        self.timers.cancel(TimerKind::CursorFlush);
        self.cursor_dirty = false;
        self.set_state(ConnectionState::Disconnected);
        if let Some(error) = error {
            self.events.push(RoomEvent::Error(error.into()));
        }
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.session.is_none() {
            return;
        }
        self.timers
            .schedule(TimerKind::Reconnect, RECONNECT_DELAY, now);
        self.set_state(ConnectionState::Reconnecting);
    }

    fn broadcast_presence(&mut self) {
        self.local_presence.last_seen = Utc::now().timestamp_millis();
        let envelope = Envelope::new(Payload::PresenceUpdate(self.local_presence.clone()));
        self.send(&envelope);
    }

    fn send_raw(&mut self, envelope: &Envelope) {
        let text = match protocol::encode(envelope) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("encode failed: {err}");
                return;
            }
        };
        if let Err(err) = self.transport.send(&text) {
            log::warn!("send failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::stroke::Color32;

    #[derive(Default)]
    struct FakeState {
        pending: Vec<TransportEvent>,
        token_requests: Vec<(String, TokenRequest)>,
        opened: Vec<(String, String)>,
        sent: Vec<String>,
        closed: usize,
    }

    /// Transport double shared between the test and the session.
    #[derive(Clone, Default)]
    struct FakeTransport(Rc<RefCell<FakeState>>);

    impl FakeTransport {
        fn emit(&self, event: TransportEvent) {
            self.0.borrow_mut().pending.push(event);
        }

        fn sent(&self) -> Vec<Envelope> {
            self.0
                .borrow()
                .sent
                .iter()
                .map(|text| protocol::decode(text).unwrap())
                .collect()
        }

        fn clear_sent(&self) {
            self.0.borrow_mut().sent.clear();
        }

        fn opened(&self) -> Vec<(String, String)> {
            self.0.borrow().opened.clone()
        }

        fn token_requests(&self) -> usize {
            self.0.borrow().token_requests.len()
        }
    }

    impl RoomTransport for FakeTransport {
        fn request_token(&mut self, endpoint: &str, request: &TokenRequest) {
            self.0
                .borrow_mut()
                .token_requests
                .push((endpoint.to_string(), request.clone()));
        }

        fn open(&mut self, url: &str, token: &str) {
            self.0
                .borrow_mut()
                .opened
                .push((url.to_string(), token.to_string()));
        }

        fn send(&mut self, text: &str) -> Result<(), NetworkError> {
            self.0.borrow_mut().sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.0.borrow_mut().closed += 1;
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            std::mem::take(&mut self.0.borrow_mut().pending)
        }
    }

    fn test_session() -> (RoomSession, FakeTransport) {
        let fake = FakeTransport::default();
        let config = RoomConfig {
            token_endpoint: "https://relay.example.com/api/room-token".to_string(),
            realtime_url: "wss://rooms.example.com/ws".to_string(),
        };
        let user = LocalUser {
            user_id: "local-1".to_string(),
            user_name: "Mina".to_string(),
            role: Role::Editor,
            color_hex: "#3366ff".to_string(),
        };
        let session = RoomSession::with_transport(config, user, Box::new(fake.clone()));
        (session, fake)
    }

    /// Walk the session to `Connected` and discard setup traffic.
    fn connect(session: &mut RoomSession, fake: &FakeTransport, now: Instant) {
        session.enter_room("studio").unwrap();
        fake.emit(TransportEvent::TokenIssued {
            token: "tok-1".to_string(),
        });
        session.tick(now);
        fake.emit(TransportEvent::Opened);
        session.tick(now);
        session.poll_events();
        fake.clear_sent();
    }

    fn states(events: &[RoomEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|event| match event {
                RoomEvent::ConnectionChanged(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn peer_envelope(payload: Payload) -> TransportEvent {
        TransportEvent::Message(protocol::encode(&Envelope::new(payload)).unwrap())
    }

    #[test]
    fn test_enter_room_runs_full_handshake() {
        let (mut session, fake) = test_session();
        let now = Instant::now();

        session.enter_room("studio").unwrap();
        assert_eq!(session.room_id(), Some("studio"));
        {
            let state = fake.0.borrow();
            let (endpoint, request) = &state.token_requests[0];
            assert_eq!(endpoint, "https://relay.example.com/api/room-token");
            assert_eq!(request.room_id, "studio");
            assert_eq!(request.user_id, "local-1");
            assert_eq!(request.user_role, Role::Editor);
        }

        fake.emit(TransportEvent::TokenIssued {
            token: "tok-1".to_string(),
        });
        session.tick(now);
        assert_eq!(
            fake.opened(),
            vec![("wss://rooms.example.com/ws".to_string(), "tok-1".to_string())]
        );

        fake.emit(TransportEvent::Opened);
        session.tick(now);

        let events = session.poll_events();
        assert_eq!(
            states(&events),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Authenticated,
                ConnectionState::Connected,
            ]
        );

        // joining announces our presence
        let sent = fake.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::PresenceUpdate(p) => {
                assert_eq!(p.user_id, "local-1");
                assert_eq!(p.color_hex, "#3366ff");
            }
            other => panic!("expected presence announce, got {other:?}"),
        }
    }

    #[test]
    fn test_enter_room_rejects_double_entry_and_empty_id() {
        let (mut session, _fake) = test_session();
        assert_eq!(session.enter_room("   "), Err(StateError::EmptyRoomId));
        session.enter_room("studio").unwrap();
        assert_eq!(
            session.enter_room("other"),
            Err(StateError::AlreadyInRoom("studio".to_string()))
        );
    }

    #[test]
    fn test_drop_reconnects_once_with_cached_token() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);
        assert_eq!(session.state(), ConnectionState::Connected);

        fake.emit(TransportEvent::Closed);
        session.tick(now);
        let mut observed = states(&session.poll_events());

        // the retry waits out the full fixed delay
        session.tick(now + Duration::from_secs(4));
        assert!(session.poll_events().is_empty());

        session.tick(now + RECONNECT_DELAY);
        observed.extend(states(&session.poll_events()));
        fake.emit(TransportEvent::Opened);
        session.tick(now + RECONNECT_DELAY);
        observed.extend(states(&session.poll_events()));

        assert_eq!(
            observed,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Reconnecting,
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
        );
        // one attempt per drop, reusing the issued token
        assert_eq!(fake.token_requests(), 1);
        let opened = fake.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1].1, "tok-1");
    }

    #[test]
    fn test_auth_rejection_is_terminal() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        session.enter_room("studio").unwrap();
        session.poll_events();

        fake.emit(TransportEvent::TokenDenied {
            status: Some(403),
            message: "forbidden".to_string(),
        });
        session.tick(now);

        let events = session.poll_events();
        assert_eq!(states(&events), vec![ConnectionState::Error]);
        assert!(events.iter().any(|event| matches!(
            event,
            RoomEvent::Error(EngineError::Network(NetworkError::AuthRejected {
                status: 403,
                ..
            }))
        )));

        // a refused login is not retried
        session.tick(now + Duration::from_secs(30));
        assert!(session.poll_events().is_empty());
        assert_eq!(fake.token_requests(), 1);
        assert!(fake.opened().is_empty());
    }

    #[test]
    fn test_upstream_failure_retries_handshake() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        session.enter_room("studio").unwrap();

        fake.emit(TransportEvent::TokenDenied {
            status: Some(502),
            message: "bad gateway".to_string(),
        });
        session.tick(now);
        assert_eq!(session.state(), ConnectionState::Reconnecting);

        // no token was ever issued, so the retry restarts the handshake
        session.tick(now + RECONNECT_DELAY);
        assert_eq!(fake.token_requests(), 2);
        assert_eq!(session.state(), ConnectionState::Authenticating);
    }

    #[test]
    fn test_send_drops_until_connected() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        let envelope = Envelope::new(Payload::ClearCanvas {
            user_id: "local-1".to_string(),
        });

        session.send(&envelope);
        assert!(fake.sent().is_empty());

        connect(&mut session, &fake, now);
        session.send(&envelope);
        assert_eq!(fake.sent().len(), 1);
    }

    #[test]
    fn test_heartbeat_pings_and_silent_channel_drops() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        session.tick(now + HEARTBEAT_INTERVAL);
        let sent = fake.sent();
        assert!(matches!(&sent[0].payload, Payload::Ping { user_id } if user_id == "local-1"));

        // no pong by the liveness deadline: the channel is dead
        session.tick(now + LIVENESS_TIMEOUT);
        let events = session.poll_events();
        assert!(states(&events).contains(&ConnectionState::Disconnected));
        assert!(events.iter().any(|event| matches!(
            event,
            RoomEvent::Error(EngineError::Network(NetworkError::LivenessTimeout(_)))
        )));
    }

    #[test]
    fn test_pong_extends_liveness() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        session.tick(now + Duration::from_secs(30));
        fake.emit(peer_envelope(Payload::Pong {
            user_id: "service".to_string(),
        }));
        session.tick(now + Duration::from_secs(35));

        // the original deadline passes without a drop
        session.tick(now + Duration::from_secs(60));
        assert_eq!(session.state(), ConnectionState::Connected);

        session.tick(now + Duration::from_secs(95));
        assert_eq!(session.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_cursor_broadcasts_coalesce() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        session.update_cursor(Point::new(1.0, 1.0), true, now);
        session.update_cursor(Point::new(2.0, 2.0), true, now + Duration::from_millis(10));
        session.update_cursor(Point::new(3.0, 3.0), true, now + Duration::from_millis(20));
        session.tick(now + Duration::from_millis(49));
        assert!(fake.sent().is_empty());

        session.tick(now + CURSOR_FLUSH_INTERVAL);
        let sent = fake.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::PresenceUpdate(p) => {
                assert_eq!(p.cursor, Some(Point::new(3.0, 3.0)));
                assert!(p.is_drawing);
            }
            other => panic!("expected presence update, got {other:?}"),
        }
    }

    #[test]
    fn test_leave_room_cancels_timers_and_says_goodbye() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);
        session.update_cursor(Point::new(5.0, 5.0), false, now);

        session.leave_room();
        let sent = fake.sent();
        match &sent.last().unwrap().payload {
            Payload::PresenceUpdate(p) => {
                assert_eq!(p.user_id, "local-1");
                assert!(p.left);
            }
            other => panic!("expected parting presence, got {other:?}"),
        }
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.room_id(), None);

        // nothing outstanding fires afterward
        fake.clear_sent();
        session.poll_events();
        session.tick(now + Duration::from_secs(600));
        assert!(session.poll_events().is_empty());
        assert!(fake.sent().is_empty());
        assert_eq!(fake.opened().len(), 1);

        // leaving again is a no-op
        session.leave_room();
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn test_remote_frames_surface_as_events() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        let stroke = Stroke::new(
            vec![Point::new(0.0, 0.0), Point::new(4.0, 4.0)],
            Color32::from_argb_u32(0xff112233),
            2.0,
        );
        fake.emit(peer_envelope(Payload::Stroke {
            user_id: "u2".to_string(),
            user_name: "Noor".to_string(),
            stroke: stroke.to_wire(),
        }));
        fake.emit(peer_envelope(Payload::PresenceUpdate(Presence::new(
            "u2", "Noor",
        ))));
        fake.emit(peer_envelope(Payload::PresenceUpdate(Presence::leaving(
            "u2", "Noor",
        ))));
        session.tick(now);

        let events = session.poll_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            RoomEvent::StrokeReceived { user_id, stroke, .. }
                if user_id == "u2" && stroke.points.len() == 2
        ));
        assert!(matches!(&events[1], RoomEvent::PeerJoined(p) if p.user_id == "u2"));
        assert!(matches!(&events[2], RoomEvent::PeerLeft(p) if p.user_id == "u2"));
        assert!(session.presence().is_empty());
    }

    #[test]
    fn test_own_echo_is_filtered() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        fake.emit(peer_envelope(Payload::ClearCanvas {
            user_id: "local-1".to_string(),
        }));
        session.tick(now);
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn test_inbound_ping_answered_with_pong() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        fake.emit(peer_envelope(Payload::Ping {
            user_id: "service".to_string(),
        }));
        session.tick(now);

        let sent = fake.sent();
        assert!(matches!(&sent[0].payload, Payload::Pong { user_id } if user_id == "local-1"));
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);

        fake.emit(TransportEvent::Message("not json".to_string()));
        fake.emit(TransportEvent::Message(
            r#"{"type":"vote","data":{}}"#.to_string(),
        ));
        session.tick(now);
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn test_stale_close_after_leave_stays_down() {
        let (mut session, fake) = test_session();
        let now = Instant::now();
        connect(&mut session, &fake, now);
        session.leave_room();
        session.poll_events();

        fake.emit(TransportEvent::Closed);
        session.tick(now + Duration::from_secs(1));
        assert!(session.poll_events().is_empty());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
