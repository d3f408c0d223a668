use std::path::PathBuf;

use thiserror::Error;

/// Errors arising from decoding compact binary values and result records.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload too short for {what}: need {need} bytes, got {got}")]
    UnexpectedEof {
        what: &'static str,
        need: usize,
        got: usize,
    },

    #[error("reserved format byte 0x{byte:02X} at offset {offset}")]
    ReservedFormat { byte: u8, offset: usize },

    #[error("unsupported {what} value (format byte 0x{byte:02X})")]
    UnsupportedFormat { what: &'static str, byte: u8 },

    #[error("arrays nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("unsigned integer {value} does not fit in a signed 64-bit value")]
    IntegerOverflow { value: u64 },

    #[error("invalid string value: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("{count} trailing bytes after top-level value")]
    TrailingBytes { count: usize },

    #[error("expected a top-level array, got {found}")]
    NotAnArray { found: &'static str },

    #[error("record has {got} elements, need at least {need}")]
    TooFewElements { need: usize, got: usize },

    #[error("element {index} ({field}): expected {expected}, got {found}")]
    FieldType {
        index: usize,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Errors from STOMP frame parsing.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame header is not valid UTF-8")]
    HeaderEncoding,

    #[error("empty command line")]
    MissingCommand,

    #[error("malformed header line {line:?}")]
    MalformedHeader { line: String },

    #[error("invalid header escape \\{code}")]
    InvalidEscape { code: char },

    #[error("invalid content-length {value:?}")]
    InvalidContentLength { value: String },

    #[error("frame body not terminated by NUL")]
    MissingNul,

    #[error("incomplete frame ({len} bytes buffered)")]
    Incomplete { len: usize },

    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Errors loading the deployment configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config has no broker endpoint (gs_config.ipc_interface.kWebActiveMQHostAddress)")]
    MissingEndpoint,
}

/// Format bytes as a hex preview like "9B CC 2D ..." for log lines.
pub fn hex_preview(raw: &[u8]) -> String {
    let limit = 24;
    let mut s: String = raw
        .iter()
        .take(limit)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    if raw.len() > limit {
        s.push_str(" ...");
    }
    s
}

pub type Result<T> = std::result::Result<T, DecodeError>;
