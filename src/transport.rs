use std::fmt;

use serde_json::Value;

use crate::error::TransportError;

/// The primitive that delivers named messages between the renderer and the
/// host process.
///
/// Messages on a single channel arrive in the order they were sent, nothing is
/// guaranteed across channels. Delivery is assumed to be reliable.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Send `args` on `channel` to the host.
    fn send(&self, channel: &str, args: Vec<Value>) -> Result<(), TransportError>;

    /// Send `args` on `channel` and block the calling thread until the host
    /// replied.
    fn send_sync(&self, channel: &str, args: Vec<Value>) -> Result<Vec<Value>, TransportError>;

    /// Broadcast `args` on `channel` to every frame of the web contents
    /// `web_contents_id`.
    fn send_to_all(
        &self,
        web_contents_id: u64,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<(), TransportError>;
}

/// A message received from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    /// The web contents that sent the message, if known
    pub sender_id: Option<u64>,
    pub args: Vec<Value>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            channel: channel.into(),
            sender_id: None,
            args,
        }
    }

    pub fn with_sender(mut self, sender_id: u64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }
}
