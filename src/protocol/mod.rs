//! Message kinds and decode dispatch.
//!
//! Every broker message carries an integer `IPCMessageType` tag. Only
//! [`IpcMessageKind::Results`] payloads are decoded into records; control
//! messages (usually our own, echoed back by the topic) are decoded for their
//! code and everything else is passed through untouched.

pub mod control;
pub mod result;

use crate::error::Result;

pub use control::ControlCommand;
pub use result::{ClubType, LaunchResult, ResultKind};

/// Message-kind tag carried as a message property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpcMessageKind {
    Unknown = 0,
    RequestForCamera2Image = 1,
    Camera2Image = 2,
    RequestForCamera2TestStillImage = 3,
    Results = 4,
    Shutdown = 5,
    Camera2ReturnPreImage = 6,
    ControlMessage = 7,
}

impl IpcMessageKind {
    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(Self::Unknown),
            1 => Some(Self::RequestForCamera2Image),
            2 => Some(Self::Camera2Image),
            3 => Some(Self::RequestForCamera2TestStillImage),
            4 => Some(Self::Results),
            5 => Some(Self::Shutdown),
            6 => Some(Self::Camera2ReturnPreImage),
            7 => Some(Self::ControlMessage),
            _ => None,
        }
    }

    pub fn tag(self) -> i64 {
        self as i64
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Results(LaunchResult),
    Control { code: i64 },
    /// Kinds this process does not interpret (camera images, shutdown, ...).
    Other {
        kind: IpcMessageKind,
        payload: Vec<u8>,
    },
}

impl Message {
    /// Decode a payload according to its kind tag.
    pub fn decode(kind: IpcMessageKind, payload: &[u8]) -> Result<Self> {
        match kind {
            IpcMessageKind::Results => Ok(Message::Results(LaunchResult::decode(payload)?)),
            IpcMessageKind::ControlMessage => Ok(Message::Control {
                code: ControlCommand::decode_code(payload)?,
            }),
            other => Ok(Message::Other {
                kind: other,
                payload: payload.to_vec(),
            }),
        }
    }
}
