//! End-to-end session scenarios driven through `MockTransport`.
//!
//! Each test plays the server: it pushes frames into the mock, calls
//! `step()` with a controlled clock, and inspects what the client sent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use blynk_client::infrastructure::transport::mock::MockTransport;
use blynk_client::{BlynkClient, ClientConfig, SessionState};
use blynk_core::protocol::command::status;
use blynk_core::{Command, Frame, ReconnectPolicy};

const HEARTBEAT: Duration = Duration::from_secs(10);

fn config() -> ClientConfig {
    ClientConfig {
        heartbeat: HEARTBEAT,
        login_timeout: Duration::from_secs(5),
        ping_timeout: Duration::from_secs(15),
        reconnect: ReconnectPolicy::Fixed(Duration::from_secs(3)),
        ..ClientConfig::new("device-token")
    }
}

/// Runs the login handshake at `t0` and returns the authenticated client.
/// The device-info frame sent after login is discarded.
fn login(client: &mut BlynkClient<MockTransport>, t0: Instant) {
    client.step(t0);
    let sent = client.transport_mut().take_sent_frames();
    assert_eq!(sent, vec![Frame::login(Command::Login, 1, "device-token")]);

    client
        .transport_mut()
        .push_frame(&Frame::response(1, status::SUCCESS));
    client.step(t0);
    let sent = client.transport_mut().take_sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command, Command::Internal);
    assert_eq!(client.state(), SessionState::Authenticated);
}

fn hardware(id: u16, fields: &[&str]) -> Frame {
    Frame::with_fields(Command::Hardware, id, fields)
}

// ── Login ─────────────────────────────────────────────────────────────────────

#[test]
fn test_login_success_fires_connected_once() {
    // Arrange
    let t0 = Instant::now();
    let connected = Rc::new(Cell::new(0));
    let counter = Rc::clone(&connected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_connected(move |_| counter.set(counter.get() + 1));

    // Act
    login(&mut client, t0);
    client.step(t0 + Duration::from_millis(10));

    // Assert
    assert_eq!(connected.get(), 1);
    assert!(client.is_connected());
}

#[test]
fn test_login_response_after_unrelated_traffic_is_still_matched() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.step(t0);
    client.transport_mut().take_sent();

    // Act – unrelated frames arrive before the login answer
    client
        .transport_mut()
        .push_frame(&Frame::new(Command::Redirect, 40, b"x".to_vec()));
    client
        .transport_mut()
        .push_frame(&Frame::response(99, status::SUCCESS));
    client
        .transport_mut()
        .push_frame(&Frame::response(1, status::SUCCESS));
    client.step(t0);

    // Assert
    assert_eq!(client.state(), SessionState::Authenticated);
}

#[test]
fn test_login_timeout_returns_to_disconnected_and_retries_after_backoff() {
    // Arrange
    let t0 = Instant::now();
    let connected = Rc::new(Cell::new(false));
    let flag = Rc::clone(&connected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_connected(move |_| flag.set(true));
    client.step(t0);
    client.transport_mut().take_sent();

    // Act – no response within the 5 s login timeout
    client.step(t0 + Duration::from_secs(5));

    // Assert – torn down, nothing fired, retry scheduled 3 s later
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(!connected.get());
    assert_eq!(client.transport().close_calls, 1);

    client.step(t0 + Duration::from_secs(7));
    assert_eq!(client.transport().connect_calls.len(), 1, "backoff not elapsed yet");

    client.step(t0 + Duration::from_secs(8));
    assert_eq!(client.transport().connect_calls.len(), 2);
    assert_eq!(client.state(), SessionState::AwaitingLoginResponse);
    assert_eq!(
        client.transport_mut().take_sent_frames(),
        vec![Frame::login(Command::Login, 1, "device-token")],
        "message ids restart at 1 on every connection"
    );
}

#[test]
fn test_login_frame_split_across_reads_is_reassembled() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.step(t0);
    client.transport_mut().take_sent();

    // Act – the 5-byte RESPONSE arrives in two pieces
    client.transport_mut().push_bytes(&[0, 0, 1]);
    client.step(t0);
    let halfway = client.state();
    client.transport_mut().push_bytes(&[0, 200]);
    client.step(t0);

    // Assert
    assert_eq!(halfway, SessionState::AwaitingLoginResponse);
    assert_eq!(client.state(), SessionState::Authenticated);
}

// ── Hardware commands ─────────────────────────────────────────────────────────

#[test]
fn test_virtual_write_invokes_handler_and_sends_nothing() {
    // Arrange
    let t0 = Instant::now();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_virtual_write(4, move |values, _| sink.borrow_mut().push(values.to_vec()));
    login(&mut client, t0);

    // Act
    client.transport_mut().push_frame(&hardware(5, &["vw", "4", "255"]));
    client.step(t0);

    // Assert
    assert_eq!(*seen.borrow(), vec![vec!["255".to_owned()]]);
    assert!(client.transport_mut().take_sent().is_empty());
}

#[test]
fn test_virtual_read_is_answered_with_write_to_same_pin() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_virtual_read(5, |_| Some("42".to_owned()));
    login(&mut client, t0);

    // Act
    client.transport_mut().push_frame(&hardware(6, &["vr", "5"]));
    client.step(t0);

    // Assert
    let sent = client.transport_mut().take_sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command, Command::Hardware);
    assert_eq!(sent[0].payload(), b"vw\x005\x0042");
}

#[test]
fn test_hardware_sync_frames_are_dispatched_like_hardware() {
    // Arrange
    let t0 = Instant::now();
    let seen = Rc::new(Cell::new(0));
    let counter = Rc::clone(&seen);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_virtual_write(1, move |_, _| counter.set(counter.get() + 1));
    login(&mut client, t0);

    // Act
    client
        .transport_mut()
        .push_frame(&Frame::with_fields(Command::HardwareSync, 7, &["vw", "1", "0"]));
    client.step(t0);

    // Assert
    assert_eq!(seen.get(), 1);
}

#[test]
fn test_unsupported_hardware_operation_keeps_session_alive() {
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    login(&mut client, t0);

    client.transport_mut().push_frame(&hardware(8, &["dw", "13", "1"]));
    client.step(t0);

    assert!(client.is_connected());
}

#[test]
fn test_handler_outbox_is_flushed_in_same_step() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_virtual_write(1, |values, out| out.virtual_write(2, values.iter()));
    login(&mut client, t0);

    // Act
    client.transport_mut().push_frame(&hardware(9, &["vw", "1", "echo"]));
    client.step(t0);

    // Assert
    let sent = client.transport_mut().take_sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload(), b"vw\x002\x00echo");
}

// ── Keepalive ─────────────────────────────────────────────────────────────────

#[test]
fn test_send_silence_for_one_period_emits_exactly_one_ping() {
    // Arrange – the server keeps talking so only the send timer runs out
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    login(&mut client, t0);
    let t1 = t0 + HEARTBEAT;
    client.transport_mut().push_frame(&hardware(10, &["vw", "9", "1"]));

    // Act
    client.step(t1);
    client.step(t1);
    client.step(t1 + Duration::from_millis(1));

    // Assert
    let sent = client.transport_mut().take_sent_frames();
    let pings: Vec<_> = sent.iter().filter(|f| f.command == Command::Ping).collect();
    assert_eq!(pings.len(), 1);
}

#[test]
fn test_ping_response_keeps_session_alive() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    login(&mut client, t0);

    // Act – answer every ping for several periods
    let mut now = t0;
    for _ in 0..5 {
        now += HEARTBEAT;
        client.step(now);
        for frame in client.transport_mut().take_sent_frames() {
            if frame.command == Command::Ping {
                client
                    .transport_mut()
                    .push_frame(&Frame::response(frame.message_id, status::SUCCESS));
            }
        }
        client.step(now);
    }

    // Assert
    assert!(client.is_connected());
    assert_eq!(client.missed_heartbeats(), 0);
}

#[test]
fn test_receive_silence_for_two_periods_fires_disconnected_once() {
    // Arrange
    let t0 = Instant::now();
    let disconnected = Rc::new(Cell::new(0));
    let counter = Rc::clone(&disconnected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_disconnected(move || counter.set(counter.get() + 1));
    login(&mut client, t0);

    // Act – pings go out, nothing comes back
    client.step(t0 + HEARTBEAT);
    client.step(t0 + HEARTBEAT * 2);
    client.step(t0 + HEARTBEAT * 2 + Duration::from_millis(1));

    // Assert
    assert_eq!(client.state(), SessionState::Disconnected);
    assert_eq!(disconnected.get(), 1);
    assert_eq!(client.transport().close_calls, 1);
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[test]
fn test_malformed_bytes_tear_down_and_reconnect() {
    // Arrange
    let t0 = Instant::now();
    let disconnected = Rc::new(Cell::new(0));
    let counter = Rc::clone(&disconnected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_disconnected(move || counter.set(counter.get() + 1));
    login(&mut client, t0);

    // Act – 0xFF is not a command code
    client.transport_mut().push_bytes(&[0xFF, 0, 1, 0, 0]);
    client.step(t0);

    // Assert
    assert_eq!(client.state(), SessionState::Disconnected);
    assert_eq!(disconnected.get(), 1);
    assert_eq!(client.transport().pending_inbound(), 0);

    client.step(t0 + Duration::from_secs(3));
    assert_eq!(client.state(), SessionState::AwaitingLoginResponse);
}

#[test]
fn test_oversized_length_is_fatal() {
    // Arrange
    let t0 = Instant::now();
    let mut client = BlynkClient::new(config(), MockTransport::new());
    login(&mut client, t0);

    // Act – declared payload 4096 > 2 × 1024
    client.transport_mut().push_bytes(&[20, 0, 2, 0x10, 0x00]);
    client.step(t0);

    // Assert
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_recv_error_while_authenticated_fires_disconnected() {
    // Arrange
    let t0 = Instant::now();
    let disconnected = Rc::new(Cell::new(0));
    let counter = Rc::clone(&disconnected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_disconnected(move || counter.set(counter.get() + 1));
    login(&mut client, t0);

    // Act
    client.transport_mut().fail_recv = true;
    client.step(t0);
    client.step(t0);

    // Assert
    assert_eq!(disconnected.get(), 1);
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_refused_connections_retry_forever_with_backoff() {
    // Arrange
    let t0 = Instant::now();
    let mut transport = MockTransport::new();
    transport.refuse_connect = true;
    let mut client = BlynkClient::new(config(), transport);

    // Act – 10 s of steps every 500 ms
    for i in 0..=20 {
        client.step(t0 + Duration::from_millis(500 * i));
    }

    // Assert – attempts at 0, 3, 6, 9 s
    assert_eq!(client.transport().connect_calls.len(), 4);
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_reconnect_resets_missed_heartbeats_and_fires_connected_again() {
    // Arrange
    let t0 = Instant::now();
    let connected = Rc::new(Cell::new(0));
    let counter = Rc::clone(&connected);
    let mut client = BlynkClient::new(config(), MockTransport::new());
    client.on_connected(move |_| counter.set(counter.get() + 1));
    login(&mut client, t0);

    // Act
    client.disconnect(t0);
    let t1 = t0 + Duration::from_secs(3);
    login(&mut client, t1);

    // Assert
    assert_eq!(connected.get(), 2);
    assert_eq!(client.missed_heartbeats(), 0);
    assert_eq!(client.transport().connect_calls.len(), 2);
}
