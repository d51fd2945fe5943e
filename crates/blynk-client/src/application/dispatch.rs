//! Handler registry and event dispatcher.
//!
//! # How handlers are registered (for beginners)
//!
//! The embedding application registers closures against *event keys*:
//!
//! ```text
//! Connected            ─▶ FnMut(&mut Outbox)
//! Disconnected         ─▶ FnMut()
//! VirtualWrite(pin)    ─▶ FnMut(&[String], &mut Outbox)
//! VirtualRead(pin)     ─▶ FnMut(&mut Outbox) -> Option<String>
//! AnyVirtualWrite      ─▶ FnMut(pin, &[String], &mut Outbox)
//! AnyVirtualRead       ─▶ FnMut(pin, &mut Outbox) -> Option<String>
//! ```
//!
//! Each key holds at most one handler; registering again replaces the old
//! one.  An event with no handler is silently ignored.
//!
//! # Why an `Outbox`?
//!
//! Handlers run *inside* `BlynkClient::step`, so they cannot borrow the
//! client to send frames.  Instead each handler receives an [`Outbox`] and
//! queues what it wants to send; the client turns the queue into frames once
//! the handler has returned.  A value returned from a read handler is queued
//! the same way, as a `vw` to the pin that was read.

use std::collections::HashMap;
use std::fmt;

use blynk_core::{Command, Frame, HardwareCommand, HardwareError, VirtualPin};
use tracing::trace;

// ── Event keys ────────────────────────────────────────────────────────────────

/// Identifies the event a handler is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Connected,
    Disconnected,
    VirtualWrite(VirtualPin),
    VirtualRead(VirtualPin),
    /// Every `vw`, after the pin-specific handler.
    AnyVirtualWrite,
    /// Every `vr` for which no pin-specific handler exists.
    AnyVirtualRead,
}

type ConnectedFn = Box<dyn FnMut(&mut Outbox)>;
type DisconnectedFn = Box<dyn FnMut()>;
type WriteFn = Box<dyn FnMut(&[String], &mut Outbox)>;
type ReadFn = Box<dyn FnMut(&mut Outbox) -> Option<String>>;
type AnyWriteFn = Box<dyn FnMut(VirtualPin, &[String], &mut Outbox)>;
type AnyReadFn = Box<dyn FnMut(VirtualPin, &mut Outbox) -> Option<String>>;

enum Handler {
    Connected(ConnectedFn),
    Disconnected(DisconnectedFn),
    VirtualWrite(WriteFn),
    VirtualRead(ReadFn),
    AnyVirtualWrite(AnyWriteFn),
    AnyVirtualRead(AnyReadFn),
}

// ── Outbox ────────────────────────────────────────────────────────────────────

/// Something a handler asked the client to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// HARDWARE `vw pin values...`.
    VirtualWrite { pin: VirtualPin, values: Vec<String> },
    /// HARDWARE_SYNC `vr pins...`: ask the server to replay stored values.
    SyncVirtual { pins: Vec<VirtualPin> },
}

impl Outbound {
    /// Builds the frame that carries this item.
    pub fn into_frame(self, message_id: u16) -> Frame {
        match self {
            Outbound::VirtualWrite { pin, values } => Frame::new(
                Command::Hardware,
                message_id,
                HardwareCommand::VirtualWrite { pin, values }.to_payload(),
            ),
            Outbound::SyncVirtual { pins } => Frame::new(
                Command::HardwareSync,
                message_id,
                HardwareCommand::VirtualRead { pins }.to_payload(),
            ),
        }
    }
}

/// Queue of frames a handler wants sent.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outbound>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a virtual write of `values` to `pin`.
    pub fn virtual_write<I, V>(&mut self, pin: VirtualPin, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.items.push(Outbound::VirtualWrite { pin, values });
    }

    /// Queues a sync request for `pins`.  An empty slice is ignored.
    pub fn sync_virtual(&mut self, pins: &[VirtualPin]) {
        if !pins.is_empty() {
            self.items.push(Outbound::SyncVirtual {
                pins: pins.to_vec(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Removes and returns everything queued so far, in queue order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Outbound> {
        self.items.drain(..)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Mapping from [`EventKey`] to the registered handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKey, Handler>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Outbox) + 'static,
    {
        self.insert(EventKey::Connected, Handler::Connected(Box::new(handler)));
    }

    pub fn on_disconnected<F>(&mut self, handler: F)
    where
        F: FnMut() + 'static,
    {
        self.insert(EventKey::Disconnected, Handler::Disconnected(Box::new(handler)));
    }

    pub fn on_virtual_write<F>(&mut self, pin: VirtualPin, handler: F)
    where
        F: FnMut(&[String], &mut Outbox) + 'static,
    {
        self.insert(EventKey::VirtualWrite(pin), Handler::VirtualWrite(Box::new(handler)));
    }

    pub fn on_virtual_read<F>(&mut self, pin: VirtualPin, handler: F)
    where
        F: FnMut(&mut Outbox) -> Option<String> + 'static,
    {
        self.insert(EventKey::VirtualRead(pin), Handler::VirtualRead(Box::new(handler)));
    }

    pub fn on_any_virtual_write<F>(&mut self, handler: F)
    where
        F: FnMut(VirtualPin, &[String], &mut Outbox) + 'static,
    {
        self.insert(EventKey::AnyVirtualWrite, Handler::AnyVirtualWrite(Box::new(handler)));
    }

    pub fn on_any_virtual_read<F>(&mut self, handler: F)
    where
        F: FnMut(VirtualPin, &mut Outbox) -> Option<String> + 'static,
    {
        self.insert(EventKey::AnyVirtualRead, Handler::AnyVirtualRead(Box::new(handler)));
    }

    /// Removes the handler for `key`.  Returns `true` if one was registered.
    pub fn remove(&mut self, key: EventKey) -> bool {
        self.handlers.remove(&key).is_some()
    }

    pub fn contains(&self, key: EventKey) -> bool {
        self.handlers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn insert(&mut self, key: EventKey, handler: Handler) {
        if self.handlers.insert(key, handler).is_some() {
            trace!("replaced handler for {key:?}");
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Routes parsed events to the handlers in a borrowed [`HandlerRegistry`].
///
/// Handlers must not call back into the `BlynkClient` that is dispatching
/// them; the borrow checker already rules this out for safe code.
pub struct EventDispatcher<'a> {
    registry: &'a mut HandlerRegistry,
}

impl<'a> EventDispatcher<'a> {
    pub fn new(registry: &'a mut HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Parses a HARDWARE (or HARDWARE_SYNC) payload and invokes the matching
    /// handlers.
    ///
    /// Read handler results are queued on `outbox` as `vw` writes to the pin
    /// that was read.
    ///
    /// # Errors
    ///
    /// Returns the [`HardwareError`] if the payload cannot be parsed.  No
    /// handler runs in that case.
    pub fn dispatch_hardware(&mut self, payload: &[u8], outbox: &mut Outbox) -> Result<(), HardwareError> {
        match HardwareCommand::parse(payload)? {
            HardwareCommand::VirtualWrite { pin, values } => {
                self.dispatch_write(pin, &values, outbox);
            }
            HardwareCommand::VirtualRead { pins } => {
                for pin in pins {
                    if let Some(value) = self.dispatch_read(pin, outbox) {
                        outbox.virtual_write(pin, [value]);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fires the `Connected` handler, if any.
    pub fn connected(&mut self, outbox: &mut Outbox) {
        if let Some(Handler::Connected(f)) = self.registry.handlers.get_mut(&EventKey::Connected) {
            f(outbox);
        }
    }

    /// Fires the `Disconnected` handler, if any.
    pub fn disconnected(&mut self) {
        if let Some(Handler::Disconnected(f)) = self.registry.handlers.get_mut(&EventKey::Disconnected) {
            f();
        }
    }

    fn dispatch_write(&mut self, pin: VirtualPin, values: &[String], outbox: &mut Outbox) {
        let handlers = &mut self.registry.handlers;
        let mut handled = false;
        if let Some(Handler::VirtualWrite(f)) = handlers.get_mut(&EventKey::VirtualWrite(pin)) {
            f(values, outbox);
            handled = true;
        }
        if let Some(Handler::AnyVirtualWrite(f)) = handlers.get_mut(&EventKey::AnyVirtualWrite) {
            f(pin, values, outbox);
            handled = true;
        }
        if !handled {
            trace!("no handler for vw on V{pin}");
        }
    }

    fn dispatch_read(&mut self, pin: VirtualPin, outbox: &mut Outbox) -> Option<String> {
        let handlers = &mut self.registry.handlers;
        if let Some(Handler::VirtualRead(f)) = handlers.get_mut(&EventKey::VirtualRead(pin)) {
            return f(outbox);
        }
        if let Some(Handler::AnyVirtualRead(f)) = handlers.get_mut(&EventKey::AnyVirtualRead) {
            return f(pin, outbox);
        }
        trace!("no handler for vr on V{pin}");
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn dispatch(registry: &mut HandlerRegistry, payload: &[u8]) -> (Result<(), HardwareError>, Vec<Outbound>) {
        let mut outbox = Outbox::new();
        let result = EventDispatcher::new(registry).dispatch_hardware(payload, &mut outbox);
        let sent = outbox.drain().collect();
        (result, sent)
    }

    #[test]
    fn test_virtual_write_invokes_pin_handler_with_values() {
        // Arrange
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_write(4, move |values, _| sink.borrow_mut().extend_from_slice(values));

        // Act
        let (result, sent) = dispatch(&mut registry, b"vw\x004\x00255");

        // Assert
        assert!(result.is_ok());
        assert_eq!(*seen.borrow(), vec!["255".to_owned()]);
        assert!(sent.is_empty(), "a write must not produce a reply");
    }

    #[test]
    fn test_virtual_write_without_handler_is_noop() {
        let mut registry = HandlerRegistry::new();
        let (result, sent) = dispatch(&mut registry, b"vw\x009\x001");
        assert!(result.is_ok());
        assert!(sent.is_empty());
    }

    #[test]
    fn test_virtual_read_reply_is_queued_as_write_to_same_pin() {
        // Arrange
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(5, |_| Some("42".to_owned()));

        // Act
        let (result, sent) = dispatch(&mut registry, b"vr\x005");

        // Assert
        assert!(result.is_ok());
        assert_eq!(
            sent,
            vec![Outbound::VirtualWrite {
                pin: 5,
                values: vec!["42".to_owned()]
            }]
        );
    }

    #[test]
    fn test_virtual_read_returning_none_sends_nothing() {
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(5, |_| None);
        let (_, sent) = dispatch(&mut registry, b"vr\x005");
        assert!(sent.is_empty());
    }

    #[test]
    fn test_multi_pin_read_answers_each_pin() {
        // Arrange
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(1, |_| Some("a".to_owned()));
        registry.on_virtual_read(3, |_| Some("c".to_owned()));

        // Act
        let (_, sent) = dispatch(&mut registry, b"vr\x001\x002\x003");

        // Assert – pin 2 has no handler
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1],
            Outbound::VirtualWrite {
                pin: 3,
                values: vec!["c".to_owned()]
            }
        );
    }

    #[test]
    fn test_last_registration_wins() {
        // Arrange
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(7, |_| Some("old".to_owned()));
        registry.on_virtual_read(7, |_| Some("new".to_owned()));

        // Act
        let (_, sent) = dispatch(&mut registry, b"vr\x007");

        // Assert
        assert_eq!(registry.len(), 1);
        assert_eq!(
            sent,
            vec![Outbound::VirtualWrite {
                pin: 7,
                values: vec!["new".to_owned()]
            }]
        );
    }

    #[test]
    fn test_any_write_runs_after_pin_handler() {
        // Arrange
        let order = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&order), Rc::clone(&order));
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_write(2, move |_, _| a.borrow_mut().push("pin"));
        registry.on_any_virtual_write(move |pin, values, _| {
            b.borrow_mut().push(if pin == 2 && values == ["x"] { "any" } else { "wrong" })
        });

        // Act
        dispatch(&mut registry, b"vw\x002\x00x");

        // Assert
        assert_eq!(*order.borrow(), vec!["pin", "any"]);
    }

    #[test]
    fn test_any_read_is_used_only_without_pin_handler() {
        // Arrange
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_read(1, |_| Some("specific".to_owned()));
        registry.on_any_virtual_read(|pin, _| Some(format!("any{pin}")));

        // Act
        let (_, sent) = dispatch(&mut registry, b"vr\x001\x002");

        // Assert
        assert_eq!(
            sent,
            vec![
                Outbound::VirtualWrite {
                    pin: 1,
                    values: vec!["specific".to_owned()]
                },
                Outbound::VirtualWrite {
                    pin: 2,
                    values: vec!["any2".to_owned()]
                },
            ]
        );
    }

    #[test]
    fn test_unparseable_payload_runs_no_handler() {
        // Arrange
        let called = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&called);
        let mut registry = HandlerRegistry::new();
        registry.on_any_virtual_write(move |_, _, _| *flag.borrow_mut() = true);

        // Act
        let (result, _) = dispatch(&mut registry, b"dw\x001\x001");

        // Assert
        assert!(matches!(result, Err(HardwareError::UnsupportedOperation(_))));
        assert!(!*called.borrow());
    }

    #[test]
    fn test_handler_can_queue_writes_and_syncs() {
        // Arrange
        let mut registry = HandlerRegistry::new();
        registry.on_virtual_write(0, |values, out| {
            out.virtual_write(10, values.iter());
            out.sync_virtual(&[1, 2]);
            out.sync_virtual(&[]);
        });

        // Act
        let (_, sent) = dispatch(&mut registry, b"vw\x000\x00on");

        // Assert
        assert_eq!(
            sent,
            vec![
                Outbound::VirtualWrite {
                    pin: 10,
                    values: vec!["on".to_owned()]
                },
                Outbound::SyncVirtual { pins: vec![1, 2] },
            ]
        );
    }

    #[test]
    fn test_lifecycle_handlers_fire() {
        // Arrange
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&log), Rc::clone(&log));
        let mut registry = HandlerRegistry::new();
        registry.on_connected(move |out| {
            a.borrow_mut().push("up");
            out.sync_virtual(&[0]);
        });
        registry.on_disconnected(move || b.borrow_mut().push("down"));
        let mut outbox = Outbox::new();

        // Act
        let mut dispatcher = EventDispatcher::new(&mut registry);
        dispatcher.connected(&mut outbox);
        dispatcher.disconnected();

        // Assert
        assert_eq!(*log.borrow(), vec!["up", "down"]);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_remove_unregisters_handler() {
        let mut registry = HandlerRegistry::new();
        registry.on_disconnected(|| {});
        assert!(registry.contains(EventKey::Disconnected));
        assert!(registry.remove(EventKey::Disconnected));
        assert!(!registry.remove(EventKey::Disconnected));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_outbound_into_frame_uses_matching_command() {
        // Arrange
        let write = Outbound::VirtualWrite {
            pin: 5,
            values: vec!["42".to_owned()],
        };
        let sync = Outbound::SyncVirtual { pins: vec![1, 2] };

        // Act
        let write_frame = write.into_frame(3);
        let sync_frame = sync.into_frame(4);

        // Assert
        assert_eq!(write_frame.command, Command::Hardware);
        assert_eq!(write_frame.payload(), b"vw\x005\x0042");
        assert_eq!(sync_frame.command, Command::HardwareSync);
        assert_eq!(sync_frame.payload(), b"vr\x001\x002");
    }
}
