//! Broker collaborator interfaces.
//!
//! The monitor talks to the message broker only through these traits:
//! receive-with-timeout on the subscribe side, publish on the producer side.
//! [`memory::MemoryBroker`] is an in-process implementation; the STOMP
//! transport lives in [`crate::conn`].

pub mod memory;

use std::fmt;
use std::io;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::error::FrameError;
use crate::protocol::{ControlCommand, IpcMessageKind};

/// Property carrying the integer message-kind tag.
pub const PROP_MESSAGE_KIND: &str = "IPCMessageType";
/// Property naming the sending system.
pub const PROP_SYSTEM_ID: &str = "LM_System_ID";
/// Property marking a message as part of the golf sim IPC family.
pub const PROP_MESSAGE_TYPE: &str = "Message Type";
pub const MESSAGE_TYPE_VALUE: &str = "GolfSimIPCMessage";

/// Message body as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Vec<u8>),
    Text(String),
}

/// A broker message with the properties the monitor cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Value of the `IPCMessageType` property, if present and numeric.
    pub kind_tag: Option<i64>,
    /// Value of the `LM_System_ID` property.
    pub system_id: Option<String>,
    pub body: Body,
}

impl Envelope {
    /// A byte message tagged with `kind`.
    pub fn bytes(kind: IpcMessageKind, payload: Vec<u8>) -> Self {
        Self {
            kind_tag: Some(kind.tag()),
            system_id: None,
            body: Body::Bytes(payload),
        }
    }

    /// An outbound control message from `system_id`.
    pub fn control(cmd: &ControlCommand, system_id: &str) -> Self {
        Self {
            kind_tag: Some(IpcMessageKind::ControlMessage.tag()),
            system_id: Some(system_id.to_owned()),
            body: Body::Bytes(cmd.encode()),
        }
    }
}

/// Errors from broker operations.
#[derive(Debug)]
pub enum TransportError {
    /// Socket I/O error.
    Io(io::Error),
    /// Connection closed by the broker (or the in-memory broker dropped us).
    Disconnected,
    /// Broker answered with an ERROR frame.
    Broker(String),
    /// Unexpected frame or handshake sequence.
    Protocol(String),
    /// Endpoint string could not be turned into a socket address.
    InvalidEndpoint(String),
    /// Malformed frame on the wire.
    Frame(FrameError),
    /// Gave up because the caller's cancel flag was set.
    Cancelled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::Disconnected => write!(f, "connection closed by broker"),
            TransportError::Broker(msg) => write!(f, "broker error: {msg}"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            TransportError::InvalidEndpoint(ep) => write!(f, "invalid broker endpoint {ep:?}"),
            TransportError::Frame(e) => write!(f, "frame error: {e}"),
            TransportError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Frame(e) => Some(e),
            TransportError::Disconnected
            | TransportError::Broker(_)
            | TransportError::Protocol(_)
            | TransportError::InvalidEndpoint(_)
            | TransportError::Cancelled => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<FrameError> for TransportError {
    fn from(e: FrameError) -> Self {
        TransportError::Frame(e)
    }
}

/// Subscribe side of the broker.
pub trait Subscriber {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the wait
    /// elapsed with nothing to deliver.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError>;

    /// Release the subscription and its connection.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Publish side of the broker.
pub trait Publisher {
    fn publish(&mut self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Opens subscriptions and producers on the configured topic.
///
/// Opening may involve network round trips. Implementations check `cancel`
/// at least once per poll interval and return [`TransportError::Cancelled`]
/// once it is set.
pub trait Connector {
    type Subscriber: Subscriber;
    type Publisher: Publisher;

    fn subscribe(&self, cancel: &AtomicBool) -> Result<Self::Subscriber, TransportError>;
    fn publisher(&self, cancel: &AtomicBool) -> Result<Self::Publisher, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClubType;

    #[test]
    fn control_envelope_properties() {
        let env = Envelope::control(&ControlCommand::ClubChange(ClubType::Driver), "LM_GUI");
        assert_eq!(env.kind_tag, Some(7));
        assert_eq!(env.system_id.as_deref(), Some("LM_GUI"));
        assert_eq!(env.body, Body::Bytes(vec![0x91, 0x02]));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            TransportError::Broker("no such topic".into()).to_string(),
            "broker error: no such topic"
        );
        let io = TransportError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(std::error::Error::source(&io).is_some());
    }
}
