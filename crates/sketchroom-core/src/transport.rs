//! Network plumbing for the room session.
//!
//! The session talks to the outside world through [`RoomTransport`]: an
//! auth-token request, a realtime text channel, and a polled event
//! stream. The native implementation runs each blocking operation on its
//! own thread so the engine's event loop never waits on the network.

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::session::Role;

/// Body POSTed to the auth endpoint when entering a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_role: Role,
}

/// Raw happenings on the network side, drained by the session each tick.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The auth endpoint accepted the join request.
    TokenIssued { token: String },
    /// The auth endpoint refused the request. `status` is `None` when the
    /// request never reached the endpoint.
    TokenDenied { status: Option<u16>, message: String },
    /// The realtime channel is open.
    Opened,
    /// A text frame arrived on the realtime channel.
    Message(String),
    /// The realtime channel closed, remotely or on request.
    Closed,
    /// The realtime channel could not be opened.
    Failed(String),
}

/// Seam between the session and the network.
///
/// All operations are fire-and-forget; outcomes arrive later through
/// [`RoomTransport::poll`]. Implementations must never block the caller.
pub trait RoomTransport {
    /// POST `request` to the auth endpoint. Resolves to `TokenIssued` or
    /// `TokenDenied`.
    fn request_token(&mut self, endpoint: &str, request: &TokenRequest);

    /// Open the realtime channel, authenticating with `token`. Any
    /// previously open channel is replaced.
    fn open(&mut self, url: &str, token: &str);

    /// Queue a text frame for delivery on the open channel.
    fn send(&mut self, text: &str) -> Result<(), NetworkError>;

    /// Close the realtime channel. Pending events from it are discarded.
    fn close(&mut self);

    /// Drain pending events without blocking.
    fn poll(&mut self) -> Vec<TransportEvent>;
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use tungstenite::{connect, Message};
    use url::Url;

    const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

    #[derive(Deserialize)]
    struct TokenResponse {
        token: String,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    /// Commands sent to the channel thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// [`RoomTransport`] backed by blocking I/O on background threads.
    ///
    /// The token request and the realtime channel each get their own
    /// thread; results come back over std mpsc channels and surface
    /// through `poll`.
    pub struct NetTransport {
        pending: Vec<TransportEvent>,
        token_rx: Option<Receiver<TransportEvent>>,
        cmd_tx: Option<Sender<WsCommand>>,
        channel_rx: Option<Receiver<TransportEvent>>,
        _token_thread: Option<JoinHandle<()>>,
        _channel_thread: Option<JoinHandle<()>>,
    }

    impl NetTransport {
        pub fn new() -> Self {
            Self {
                pending: Vec::new(),
                token_rx: None,
                cmd_tx: None,
                channel_rx: None,
                _token_thread: None,
                _channel_thread: None,
            }
        }
    }

    impl RoomTransport for NetTransport {
        fn request_token(&mut self, endpoint: &str, request: &TokenRequest) {
            let (tx, rx) = channel();
            let endpoint = endpoint.to_string();
            let request = request.clone();
            let handle = thread::spawn(move || {
                let event = fetch_token(&endpoint, &request);
                let _ = tx.send(event);
            });
            self.token_rx = Some(rx);
            self._token_thread = Some(handle);
        }

        fn open(&mut self, url: &str, token: &str) {
            self.close();

            let url = match realtime_url_with_token(url, token) {
                Ok(url) => url,
                Err(message) => {
                    self.pending.push(TransportEvent::Failed(message));
                    return;
                }
            };

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let handle = thread::spawn(move || run_channel(&url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.channel_rx = Some(event_rx);
            self._channel_thread = Some(handle);
        }

        fn send(&mut self, text: &str) -> Result<(), NetworkError> {
            match &self.cmd_tx {
                Some(tx) => tx
                    .send(WsCommand::Send(text.to_string()))
                    .map_err(|e| NetworkError::SendFailed(e.to_string())),
                None => Err(NetworkError::SendFailed("no open channel".to_string())),
            }
        }

        fn close(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            // events from a closed channel no longer concern the session
            self.pending.clear();
            self.channel_rx = None;
            self._channel_thread = None;
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            let mut events = std::mem::take(&mut self.pending);

            let mut token_done = false;
            if let Some(rx) = &self.token_rx {
                loop {
                    match rx.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            token_done = true;
                            break;
                        }
                    }
                }
            }
            if token_done {
                self.token_rx = None;
            }

            let mut channel_done = false;
            if let Some(rx) = &self.channel_rx {
                loop {
                    match rx.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            channel_done = true;
                            break;
                        }
                    }
                }
            }
            if channel_done {
                self.channel_rx = None;
            }

            events
        }
    }

    impl Default for NetTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NetTransport {
        fn drop(&mut self) {
            self.close();
        }
    }

    /// Validate the channel URL and attach the auth token as a query
    /// parameter.
    pub(super) fn realtime_url_with_token(url: &str, token: &str) -> Result<String, String> {
        let mut parsed = Url::parse(url).map_err(|e| format!("invalid channel URL: {e}"))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(format!("invalid channel URL scheme: {}", parsed.scheme()));
        }
        parsed.query_pairs_mut().append_pair("token", token);
        Ok(parsed.into())
    }

    fn fetch_token(endpoint: &str, request: &TokenRequest) -> TransportEvent {
        let client = match reqwest::blocking::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return TransportEvent::TokenDenied {
                    status: None,
                    message: format!("http client setup failed: {e}"),
                }
            }
        };

        match client.post(endpoint).json(request).send() {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    match response.json::<TokenResponse>() {
                        Ok(body) => TransportEvent::TokenIssued { token: body.token },
                        Err(e) => TransportEvent::TokenDenied {
                            status: Some(status),
                            message: format!("unreadable token response: {e}"),
                        },
                    }
                } else {
                    let message = response
                        .json::<ErrorBody>()
                        .map(|body| body.error)
                        .unwrap_or_else(|_| format!("auth endpoint returned {status}"));
                    TransportEvent::TokenDenied {
                        status: Some(status),
                        message,
                    }
                }
            }
            Err(e) => TransportEvent::TokenDenied {
                status: None,
                message: e.to_string(),
            },
        }
    }

    /// Channel thread: pump outbound commands and inbound frames until
    /// either side closes.
    fn run_channel(url: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
        log::info!("channel thread connecting to {url}");

        let (mut socket, response) = match connect(url) {
            Ok(ok) => ok,
            Err(e) => {
                log::error!("channel connect failed: {e}");
                let _ = event_tx.send(TransportEvent::Failed(e.to_string()));
                return;
            }
        };

        log::info!("channel open, status {}", response.status());
        let _ = event_tx.send(TransportEvent::Opened);

        // A short read timeout keeps the loop responsive to outbound
        // commands without spinning.
        match socket.get_mut() {
            tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => {
                log::debug!("TLS stream, relying on WouldBlock/TimedOut reads");
            }
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        log::error!("channel send error: {e}");
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(text)) => {
                    let _ = event_tx.send(TransportEvent::Message(text));
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("channel received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    log::error!("channel read error: {e}");
                    break;
                }
            }
        }

        log::info!("channel thread exiting");
        let _ = event_tx.send(TransportEvent::Closed);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::NetTransport;
