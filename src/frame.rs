//! STOMP 1.2 frame parsing, encoding, and stream splitting.
//!
//! Wire format:
//! ```text
//! COMMAND LF
//! (name:value LF)*
//! LF
//! BODY NUL
//! ```
//!
//! Bodies with a `content-length` header may contain NUL bytes. Bare EOLs
//! between frames are heart-beats and are skipped. Header names and values
//! use the 1.2 escapes (`\\`, `\n`, `\r`, `\c`) except on CONNECT and
//! CONNECTED frames.

use crate::error::FrameError;

const NUL: u8 = 0x00;
const LF: u8 = b'\n';
const CR: u8 = b'\r';

pub const CONTENT_LENGTH: &str = "content-length";

/// Upper bound on a buffered, still-incomplete frame.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    /// In wire order; repeated names keep the first value (see [`get`](Self::get)).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Set the body and a matching `content-length` header.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.headers.retain(|(name, _)| name != CONTENT_LENGTH);
        self.headers.push((CONTENT_LENGTH.to_owned(), body.len().to_string()));
        self.body = body;
        self
    }

    /// First value of header `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse exactly one complete frame. Leading heart-beat EOLs are allowed.
    pub fn parse(wire: &[u8]) -> Result<Self, FrameError> {
        match parse_prefix(wire)? {
            Some((frame, _)) => Ok(frame),
            None => Err(FrameError::Incomplete { len: wire.len() }),
        }
    }

    /// Encode into wire bytes, including the trailing NUL.
    pub fn encode(&self) -> Vec<u8> {
        let raw_headers = is_unescaped_command(&self.command);
        let mut wire = Vec::with_capacity(64 + self.body.len());
        wire.extend_from_slice(self.command.as_bytes());
        wire.push(LF);
        for (name, value) in &self.headers {
            if raw_headers {
                wire.extend_from_slice(name.as_bytes());
                wire.push(b':');
                wire.extend_from_slice(value.as_bytes());
            } else {
                wire.extend_from_slice(escape(name).as_bytes());
                wire.push(b':');
                wire.extend_from_slice(escape(value).as_bytes());
            }
            wire.push(LF);
        }
        wire.push(LF);
        wire.extend_from_slice(&self.body);
        wire.push(NUL);
        wire
    }
}

fn is_unescaped_command(command: &str) -> bool {
    command == "CONNECT" || command == "CONNECTED"
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(FrameError::InvalidEscape { code: other }),
            None => return Err(FrameError::InvalidEscape { code: '\\' }),
        }
    }
    Ok(out)
}

/// Number of heart-beat bytes (LF or CRLF) at the start of `buf`.
fn heartbeat_len(buf: &[u8]) -> usize {
    let mut i = 0;
    loop {
        match buf.get(i) {
            Some(&LF) => i += 1,
            Some(&CR) if buf.get(i + 1) == Some(&LF) => i += 2,
            _ => return i,
        }
    }
}

/// Locate the blank line ending the header block.
///
/// Returns `(head_end, body_start)`: the head is `buf[..head_end]` without its
/// final EOL, the body starts at `body_start`.
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == LF {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(&LF), _) => return Some((i, i + 2)),
                (Some(&CR), Some(&LF)) => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Try to parse one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it consumed (heart-beats
/// included), or `None` when more data is needed.
fn parse_prefix(buf: &[u8]) -> Result<Option<(StompFrame, usize)>, FrameError> {
    let start = heartbeat_len(buf);
    let rest = &buf[start..];
    if rest.is_empty() {
        return Ok(None);
    }

    let Some((head_end, body_start)) = find_head_end(rest) else {
        return incomplete(rest.len());
    };

    let head = std::str::from_utf8(&rest[..head_end]).map_err(|_| FrameError::HeaderEncoding)?;
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let command = match lines.next() {
        Some(c) if !c.is_empty() => c.to_owned(),
        _ => return Err(FrameError::MissingCommand),
    };
    let raw_headers = is_unescaped_command(&command);

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or_else(|| FrameError::MalformedHeader {
            line: line.to_owned(),
        })?;
        if raw_headers {
            headers.push((name.to_owned(), value.to_owned()));
        } else {
            headers.push((unescape(name)?, unescape(value)?));
        }
    }

    let content_length = headers
        .iter()
        .find(|(n, _)| n == CONTENT_LENGTH)
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength { value: v.clone() })
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            if len > MAX_FRAME_BYTES {
                return Err(FrameError::TooLarge {
                    limit: MAX_FRAME_BYTES,
                });
            }
            let end = body_start + len;
            match rest.get(end) {
                None => return Ok(None),
                Some(&NUL) => end,
                Some(_) => return Err(FrameError::MissingNul),
            }
        }
        None => match rest[body_start..].iter().position(|&b| b == NUL) {
            Some(pos) => body_start + pos,
            None => return incomplete(rest.len()),
        },
    };

    let frame = StompFrame {
        command,
        headers,
        body: rest[body_start..body_end].to_vec(),
    };
    Ok(Some((frame, start + body_end + 1)))
}

fn incomplete<T>(buffered: usize) -> Result<Option<T>, FrameError> {
    if buffered > MAX_FRAME_BYTES {
        Err(FrameError::TooLarge {
            limit: MAX_FRAME_BYTES,
        })
    } else {
        Ok(None)
    }
}

/// Splits a byte stream into frames. Buffers partial data across calls, so
/// it can be fed TCP segment boundaries.
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
        }
    }

    /// Feed new data and extract any complete frames.
    ///
    /// A malformed frame poisons the stream: the buffer is discarded and the
    /// error returned, and the caller is expected to drop the connection.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<StompFrame>, FrameError> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match parse_prefix(&self.buf) {
                Ok(Some((frame, used))) => {
                    self.buf.drain(..used);
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    self.buf.clear();
                    return Err(e);
                }
            }
        }

        Ok(frames)
    }

    /// Bytes buffered towards the next frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
