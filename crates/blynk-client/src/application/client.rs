//! `BlynkClient`: the run loop that ties the protocol pieces together.
//!
//! # How `step()` works (for beginners)
//!
//! The client never blocks and never spawns threads.  The embedding
//! application calls [`BlynkClient::step`] from its own loop, passing the
//! current time.  Each call does a bounded amount of work:
//!
//! ```text
//! step(now)
//!  ├─ connected?     flush queued bytes
//!  │                 read everything the socket has ─▶ decode frames ─▶ route
//!  │                 expire pending requests, run the keepalive check
//!  │                 flush again
//!  │                 any error ─▶ tear down (close, reset, schedule reconnect)
//!  └─ disconnected and backoff elapsed?  connect + send LOGIN
//! ```
//!
//! Frame routing:
//!
//! | Inbound frame             | Effect                                        |
//! |---------------------------|-----------------------------------------------|
//! | RESPONSE to LOGIN         | 200 → authenticated, `Connected` fires        |
//! | RESPONSE to PING          | nothing (the receive timer already moved)     |
//! | RESPONSE with unknown id  | logged and ignored                            |
//! | PING from server          | answered with RESPONSE 200                    |
//! | HARDWARE / HARDWARE_SYNC  | parsed and dispatched to handlers             |
//! | anything else             | logged and ignored                            |
//!
//! Errors never escape `step`.  They end the session, fire `Disconnected`
//! if the session had been authenticated, and the next connection attempt
//! happens once the reconnect delay has passed.
//!
//! # Re-entrancy
//!
//! Handlers run inside `step`.  They receive an [`Outbox`] for anything they
//! want to send and cannot reach the client itself.

use std::fmt;
use std::time::{Duration, Instant};

use blynk_core::protocol::command::{status, DEFAULT_RX_BUFFER_SIZE, MAX_WIRE_PAYLOAD};
use blynk_core::{
    encode_frame, try_decode_with_limit, Command, Decoded, Frame, HardwareCommand, KeepaliveAction,
    KeepaliveMonitor, MessageCorrelator, PendingRequest, ProtocolError, ReconnectPolicy, RequestKind,
    VirtualPin,
};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::dispatch::{EventDispatcher, HandlerRegistry, Outbox};
use crate::application::session::{Session, SessionError, SessionState};
use crate::infrastructure::transport::{Transport, TransportError};

/// Unsent bytes beyond this bound end the session.
pub const MAX_OUTBOUND_BYTES: usize = 16 * 1024;

/// Errors returned by the client's send operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session is not authenticated.
    #[error("not connected to the Blynk server")]
    NotConnected,

    /// The frame could not be encoded (for example, the payload is too large).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Runtime settings for a [`BlynkClient`].
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    /// Device auth token sent in the login frame.
    pub auth_token: String,
    pub host: String,
    pub port: u16,
    /// Keepalive period P.  Silence for 2P ends the session.
    pub heartbeat: Duration,
    /// How long to wait for the LOGIN response.
    pub login_timeout: Duration,
    /// How long a PING may stay unanswered before it counts as missed.
    pub ping_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Size of a single socket read.  Inbound payloads may be up to twice this.
    pub rx_buffer_size: usize,
    /// [`Command::Login`] or [`Command::HardwareLogin`].
    pub login_command: Command,
    /// Send the INTERNAL device-info frame after login.
    pub send_device_info: bool,
}

impl ClientConfig {
    /// Creates a config for `auth_token` with default server and timing.
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            host: "blynk.cloud".to_string(),
            port: 80,
            heartbeat: Duration::from_secs(10),
            login_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            login_command: Command::Login,
            send_device_info: true,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("auth_token", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("heartbeat", &self.heartbeat)
            .field("login_timeout", &self.login_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("reconnect", &self.reconnect)
            .field("rx_buffer_size", &self.rx_buffer_size)
            .field("login_command", &self.login_command)
            .field("send_device_info", &self.send_device_info)
            .finish()
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// A Blynk device session over a [`Transport`].
pub struct BlynkClient<T: Transport> {
    config: ClientConfig,
    transport: T,
    session: Session,
    correlator: MessageCorrelator,
    keepalive: KeepaliveMonitor,
    registry: HandlerRegistry,
    /// Bytes received but not yet decoded into a complete frame.
    rx_buf: Vec<u8>,
    /// Scratch space for a single socket read.
    rx_chunk: Vec<u8>,
    /// Encoded frames not yet accepted by the transport.
    tx_buf: Vec<u8>,
    missed_heartbeats: u32,
}

impl<T: Transport> BlynkClient<T> {
    /// Creates a disconnected client.  The first `step` call connects.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let rx_size = config.rx_buffer_size.clamp(1, MAX_WIRE_PAYLOAD);
        Self {
            session: Session::new(config.reconnect),
            correlator: MessageCorrelator::new(config.login_timeout, config.ping_timeout),
            keepalive: KeepaliveMonitor::new(config.heartbeat, Instant::now()),
            registry: HandlerRegistry::new(),
            rx_buf: Vec::with_capacity(rx_size),
            rx_chunk: vec![0; rx_size],
            tx_buf: Vec::new(),
            missed_heartbeats: 0,
            config,
            transport,
        }
    }

    // ── Handler registration ─────────────────────────────────────────────────

    /// Registers the handler fired when the session becomes authenticated.
    pub fn on_connected<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Outbox) + 'static,
    {
        self.registry.on_connected(handler);
    }

    /// Registers the handler fired when an authenticated session ends.
    pub fn on_disconnected<F>(&mut self, handler: F)
    where
        F: FnMut() + 'static,
    {
        self.registry.on_disconnected(handler);
    }

    pub fn on_virtual_write<F>(&mut self, pin: VirtualPin, handler: F)
    where
        F: FnMut(&[String], &mut Outbox) + 'static,
    {
        self.registry.on_virtual_write(pin, handler);
    }

    /// Registers a read handler for `pin`.  A returned value is sent back to
    /// the server as a write to the same pin.
    pub fn on_virtual_read<F>(&mut self, pin: VirtualPin, handler: F)
    where
        F: FnMut(&mut Outbox) -> Option<String> + 'static,
    {
        self.registry.on_virtual_read(pin, handler);
    }

    pub fn on_any_virtual_write<F>(&mut self, handler: F)
    where
        F: FnMut(VirtualPin, &[String], &mut Outbox) + 'static,
    {
        self.registry.on_any_virtual_write(handler);
    }

    pub fn on_any_virtual_read<F>(&mut self, handler: F)
    where
        F: FnMut(VirtualPin, &mut Outbox) -> Option<String> + 'static,
    {
        self.registry.on_any_virtual_read(handler);
    }

    /// Direct access to the registry, e.g. to remove a handler.
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Pings that went unanswered since the last successful login.
    pub fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats
    }

    /// Earliest time of the next connection attempt while disconnected.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.session.next_attempt_at()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Outbound API ─────────────────────────────────────────────────────────

    /// Queues a virtual write of `values` to `pin`.  Sent on the next `step`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] unless authenticated, or
    /// [`ClientError::Protocol`] if the payload exceeds the wire limit.
    pub fn virtual_write<I, V>(&mut self, pin: VirtualPin, values: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        let payload = HardwareCommand::VirtualWrite { pin, values }.to_payload();
        self.queue_user_frame(Command::Hardware, payload)
    }

    /// Asks the server to replay the stored values of `pins` as `vw` frames.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] unless authenticated.
    pub fn sync_virtual(&mut self, pins: &[VirtualPin]) -> Result<(), ClientError> {
        if pins.is_empty() {
            return Ok(());
        }
        let payload = HardwareCommand::VirtualRead { pins: pins.to_vec() }.to_payload();
        self.queue_user_frame(Command::HardwareSync, payload)
    }

    /// Ends the current session.  Reconnection follows after the usual delay.
    pub fn disconnect(&mut self, now: Instant) {
        if self.session.state() != SessionState::Disconnected {
            self.tear_down(SessionError::Requested, now);
        }
    }

    // ── Run loop ─────────────────────────────────────────────────────────────

    /// Advances the session to `now`.  Never blocks.
    ///
    /// Must not be called from inside a handler.
    pub fn step(&mut self, now: Instant) {
        if self.session.state() != SessionState::Disconnected {
            if let Err(reason) = self.pump(now) {
                self.tear_down(reason, now);
            }
        }

        if self.session.reconnect_due(now) {
            self.connect(now);
        }
    }

    fn pump(&mut self, now: Instant) -> Result<(), SessionError> {
        self.flush(now)?;
        self.receive(now)?;
        self.run_timers(now)?;
        self.flush(now)
    }

    fn connect(&mut self, now: Instant) {
        info!("connecting to {}:{}", self.config.host, self.config.port);
        if let Err(e) = self.transport.connect(&self.config.host, self.config.port) {
            self.session.on_connect_failed(now);
            warn!(
                "connection failed: {e}; retrying in {:?}",
                self.retry_in(now)
            );
            return;
        }

        self.rx_buf.clear();
        self.tx_buf.clear();
        self.correlator.reset();
        if !self.session.on_transport_connected() {
            return;
        }
        self.keepalive.reset(now);

        if let Err(reason) = self.send_login(now) {
            self.tear_down(reason, now);
        }
    }

    fn send_login(&mut self, now: Instant) -> Result<(), SessionError> {
        let id = self.correlator.allocate_id();
        let login = Frame::login(self.config.login_command, id, &self.config.auth_token);
        self.enqueue(&login)?;
        self.correlator.register(id, RequestKind::Login, now);
        debug!("login sent (id {id})");
        self.flush(now)
    }

    fn receive(&mut self, now: Instant) -> Result<(), SessionError> {
        loop {
            let n = self.transport.recv(&mut self.rx_chunk)?;
            if n == 0 {
                return Ok(());
            }
            self.rx_buf.extend_from_slice(&self.rx_chunk[..n]);
            self.decode_buffered(now)?;
        }
    }

    fn decode_buffered(&mut self, now: Instant) -> Result<(), SessionError> {
        let max_payload = self.config.rx_buffer_size.saturating_mul(2);
        loop {
            match try_decode_with_limit(&self.rx_buf, max_payload)? {
                Decoded::Incomplete => return Ok(()),
                Decoded::Frame { frame, consumed } => {
                    self.rx_buf.drain(..consumed);
                    self.keepalive.record_recv(now);
                    self.route(frame, now)?;
                }
            }
        }
    }

    fn route(&mut self, frame: Frame, now: Instant) -> Result<(), SessionError> {
        trace!("<< {:?} id {}", frame.command, frame.message_id);
        match frame.command {
            Command::Response => {
                let status = frame.status().unwrap_or_default();
                match self.correlator.resolve(frame.message_id) {
                    Some(PendingRequest { kind: RequestKind::Login, .. }) => self.complete_login(status, now),
                    Some(PendingRequest { kind: RequestKind::Ping, .. }) => {
                        trace!("ping {} answered", frame.message_id);
                        Ok(())
                    }
                    None => {
                        debug!(
                            "response {} (status {status}) matches no pending request",
                            frame.message_id
                        );
                        Ok(())
                    }
                }
            }
            Command::Ping => self.enqueue(&Frame::response(frame.message_id, status::SUCCESS)),
            Command::Hardware | Command::HardwareSync => {
                if self.session.is_authenticated() {
                    self.dispatch_hardware(frame.payload())
                } else {
                    debug!("hardware frame before login ignored");
                    Ok(())
                }
            }
            other => {
                debug!("ignoring {other:?} frame (id {})", frame.message_id);
                Ok(())
            }
        }
    }

    fn complete_login(&mut self, status: u16, now: Instant) -> Result<(), SessionError> {
        if status != status::SUCCESS {
            return Err(SessionError::AuthRejected { status });
        }
        if !self.session.on_login_accepted() {
            return Ok(());
        }
        info!("authenticated with {}:{}", self.config.host, self.config.port);
        self.keepalive.reset(now);
        self.missed_heartbeats = 0;

        if self.config.send_device_info {
            let info = self.device_info_frame();
            self.enqueue(&info)?;
        }

        let mut outbox = Outbox::new();
        EventDispatcher::new(&mut self.registry).connected(&mut outbox);
        self.send_outbox(&mut outbox)
    }

    fn device_info_frame(&mut self) -> Frame {
        let id = self.correlator.allocate_id();
        let heartbeat = self.config.heartbeat.as_secs().to_string();
        let buffer = self.config.rx_buffer_size.to_string();
        Frame::with_fields(
            Command::Internal,
            id,
            &[
                "ver",
                env!("CARGO_PKG_VERSION"),
                "h-beat",
                heartbeat.as_str(),
                "buff-in",
                buffer.as_str(),
                "dev",
                "rust",
            ],
        )
    }

    fn dispatch_hardware(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let mut outbox = Outbox::new();
        if let Err(e) = EventDispatcher::new(&mut self.registry).dispatch_hardware(payload, &mut outbox) {
            warn!("ignoring hardware command: {e}");
        }
        self.send_outbox(&mut outbox)
    }

    fn send_outbox(&mut self, outbox: &mut Outbox) -> Result<(), SessionError> {
        for item in outbox.drain() {
            let id = self.correlator.allocate_id();
            match encode_frame(&item.into_frame(id)) {
                Ok(bytes) => self.tx_buf.extend_from_slice(&bytes),
                Err(e) => warn!("dropping handler output: {e}"),
            }
        }
        Ok(())
    }

    fn run_timers(&mut self, now: Instant) -> Result<(), SessionError> {
        for expired in self.correlator.sweep(now) {
            match expired.kind {
                RequestKind::Login => return Err(SessionError::LoginTimeout(self.config.login_timeout)),
                RequestKind::Ping => {
                    self.missed_heartbeats = self.missed_heartbeats.saturating_add(1);
                    warn!(
                        "ping {} unanswered ({} missed)",
                        expired.message_id, self.missed_heartbeats
                    );
                }
            }
        }

        if !self.session.is_authenticated() {
            return Ok(());
        }

        match self.keepalive.poll(now) {
            KeepaliveAction::Idle => Ok(()),
            KeepaliveAction::ConnectionDead => Err(SessionError::KeepaliveTimeout(self.keepalive.dead_after())),
            KeepaliveAction::SendPing => {
                let id = self.correlator.allocate_id();
                self.enqueue(&Frame::ping(id))?;
                self.correlator.register(id, RequestKind::Ping, now);
                self.keepalive.record_ping(now);
                trace!("ping {id} queued");
                Ok(())
            }
        }
    }

    fn enqueue(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let bytes = encode_frame(frame)?;
        self.tx_buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn queue_user_frame(&mut self, command: Command, payload: Vec<u8>) -> Result<(), ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::NotConnected);
        }
        let id = self.correlator.allocate_id();
        let bytes = encode_frame(&Frame::new(command, id, payload))?;
        self.tx_buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn flush(&mut self, now: Instant) -> Result<(), SessionError> {
        while !self.tx_buf.is_empty() {
            match self.transport.send(&self.tx_buf) {
                Ok(0) => return Err(TransportError::Closed.into()),
                Ok(n) => {
                    self.tx_buf.drain(..n);
                    self.keepalive.record_send(now);
                }
                Err(TransportError::WouldBlock) => break,
                Err(e) => return Err(e.into()),
            }
        }
        if self.tx_buf.len() > MAX_OUTBOUND_BYTES {
            return Err(SessionError::OutboundOverflow(self.tx_buf.len()));
        }
        Ok(())
    }

    fn tear_down(&mut self, reason: SessionError, now: Instant) {
        match &reason {
            SessionError::AuthRejected {
                status: status::INVALID_TOKEN,
            } => error!("login rejected: invalid auth token"),
            SessionError::Requested => info!("{reason}"),
            _ => warn!("session ended: {reason}"),
        }

        self.transport.close();
        self.rx_buf.clear();
        self.tx_buf.clear();
        self.correlator.reset();

        let previous = self.session.on_failure(now);
        info!("reconnecting in {:?}", self.retry_in(now));

        if previous == SessionState::Authenticated {
            EventDispatcher::new(&mut self.registry).disconnected();
        }
    }

    fn retry_in(&self, now: Instant) -> Duration {
        self.session
            .next_attempt_at()
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for BlynkClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlynkClient")
            .field("config", &self.config)
            .field("state", &self.session.state())
            .field("transport", &self.transport)
            .field("pending", &self.correlator.pending_count())
            .field("login_pending", &self.correlator.has_pending(RequestKind::Login))
            .field("heartbeat", &self.keepalive.period())
            .field("last_send", &self.keepalive.last_send())
            .field("last_recv", &self.keepalive.last_recv())
            .field("tx_queued", &self.tx_buf.len())
            .field("missed_heartbeats", &self.missed_heartbeats)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
