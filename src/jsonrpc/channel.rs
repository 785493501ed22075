//! The transport seen from the client: send a payload, get told about
//! inbound payloads. Connection lifecycle belongs to whoever owns the channel.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::error::RpcResult;

/// Callback for inbound payloads
///
/// An `Err` means the payload could not be processed (malformed JSON); the
/// channel decides whether to log it, stop reading, or bubble it up.
pub type MessageListener = Box<dyn Fn(&str) -> RpcResult<()>>;

pub(crate) type SharedListener = Rc<RefCell<Option<Rc<dyn Fn(&str) -> RpcResult<()>>>>>;

/// Channel error types
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
}

/// Minimal bidirectional message channel
pub trait Channel {
    /// Transmit one serialized message or batch
    fn send(&self, payload: String) -> Result<(), ChannelError>;

    /// Subscribe to inbound payloads. A later subscription replaces the
    /// earlier one.
    fn on_message(&self, listener: MessageListener);
}

impl<C: Channel + ?Sized> Channel for Rc<C> {
    fn send(&self, payload: String) -> Result<(), ChannelError> {
        (**self).send(payload)
    }

    fn on_message(&self, listener: MessageListener) {
        (**self).on_message(listener)
    }
}

/// In-process channel that records what is sent and lets the owner inject
/// inbound payloads with [`MemoryChannel::deliver`]
#[derive(Default)]
pub struct MemoryChannel {
    sent: RefCell<Vec<String>>,
    listener: SharedListener,
    closed: Cell<bool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads sent so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    /// Drain the recorded payloads
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    /// Hand `payload` to the subscribed listener, as if it arrived from the
    /// remote side. Without a subscriber the payload is discarded.
    pub fn deliver(&self, payload: &str) -> RpcResult<()> {
        let listener = self.listener.borrow().clone();
        match listener {
            Some(listener) => listener(payload),
            None => {
                log::debug!("No listener subscribed, discarding inbound payload");
                Ok(())
            }
        }
    }

    /// Make every later `send` fail with [`ChannelError::Closed`]
    pub fn close(&self) {
        self.closed.set(true);
    }
}

impl Channel for MemoryChannel {
    fn send(&self, payload: String) -> Result<(), ChannelError> {
        if self.closed.get() {
            return Err(ChannelError::Closed);
        }
        self.sent.borrow_mut().push(payload);
        Ok(())
    }

    fn on_message(&self, listener: MessageListener) {
        *self.listener.borrow_mut() = Some(Rc::from(listener));
    }
}
