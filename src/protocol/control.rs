//! Control messages (tag 7, "ControlMessage").
//!
//! Payload is a one-element array holding an integer control code.

use crate::codec::{self, Value};
use crate::error::{DecodeError, Result};
use crate::protocol::result::ClubType;

/// No-op code; iron selection has no control message yet.
pub const CODE_NONE: i64 = 0;
pub const CODE_CLUB_CHANGE_TO_PUTTER: i64 = 1;
pub const CODE_CLUB_CHANGE_TO_DRIVER: i64 = 2;

/// A command sent to the measurement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ClubChange(ClubType),
}

impl ControlCommand {
    pub fn code(&self) -> i64 {
        match self {
            ControlCommand::ClubChange(ClubType::Putter) => CODE_CLUB_CHANGE_TO_PUTTER,
            ControlCommand::ClubChange(ClubType::Driver) => CODE_CLUB_CHANGE_TO_DRIVER,
            ControlCommand::ClubChange(ClubType::Iron | ClubType::NotSelected) => CODE_NONE,
        }
    }

    /// Map a received code back to a command. Code 0 carries no command.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            CODE_CLUB_CHANGE_TO_PUTTER => Some(ControlCommand::ClubChange(ClubType::Putter)),
            CODE_CLUB_CHANGE_TO_DRIVER => Some(ControlCommand::ClubChange(ClubType::Driver)),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2);
        codec::write_array_len(&mut buf, 1);
        codec::write_int(&mut buf, self.code());
        buf
    }

    /// Decode the raw control code from a payload.
    pub fn decode_code(payload: &[u8]) -> Result<i64> {
        let value = codec::read_value(payload)?;
        let items = match &value {
            Value::Array(items) => items,
            other => {
                return Err(DecodeError::NotAnArray {
                    found: other.type_name(),
                });
            }
        };
        let first = items.first().ok_or(DecodeError::TooFewElements { need: 1, got: 0 })?;
        first.as_int().ok_or(DecodeError::FieldType {
            index: 0,
            field: "control_code",
            expected: "integer",
            found: first.type_name(),
        })
    }
}
