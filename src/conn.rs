//! TCP connection to the message broker over STOMP 1.2.
//!
//! Handles the CONNECT handshake, topic subscription, frame splitting, and
//! mapping between STOMP frames and [`Envelope`]s. No retry logic here;
//! the consumer owns reconnect policy.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::frame::{CONTENT_LENGTH, FrameSplitter, StompFrame};
use crate::transport::{
    Body, Connector, Envelope, MESSAGE_TYPE_VALUE, PROP_MESSAGE_KIND, PROP_MESSAGE_TYPE,
    PROP_SYSTEM_ID, Publisher, Subscriber, TransportError,
};

/// STOMP listener port on a stock broker install.
pub const DEFAULT_PORT: u16 = 61613;

/// Budget for TCP connect and for the CONNECTED reply.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Every blocking step while opening a session (dial, handshake read, socket
/// write) is cut into slices no longer than this, with a cancel check between.
pub const DEFAULT_IO_SLICE: Duration = DEFAULT_POLL_INTERVAL;

/// Normalise a configured endpoint to `host:port`.
///
/// Accepts `tcp://host:port`, `stomp://host:port` or bare `host[:port]`.
/// Query strings (`?wireFormat...`) are dropped; a missing port becomes
/// [`DEFAULT_PORT`].
pub fn parse_endpoint(endpoint: &str) -> Result<String, TransportError> {
    let invalid = || TransportError::InvalidEndpoint(endpoint.to_owned());
    let trimmed = endpoint.trim();

    let rest = match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "tcp" && scheme != "stomp" {
                return Err(invalid());
            }
            rest
        }
        None => trimmed,
    };
    let rest = rest.split_once('?').map_or(rest, |(addr, _)| addr);
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() || rest.contains('/') {
        return Err(invalid());
    }

    // Bracketed IPv6 literals carry colons of their own.
    let tail = match rest.strip_prefix('[') {
        Some(v6) => match v6.split_once(']') {
            Some((_, tail)) => tail,
            None => return Err(invalid()),
        },
        None => match rest.rfind(':') {
            Some(0) => return Err(invalid()),
            Some(i) => &rest[i..],
            None => "",
        },
    };
    if tail.is_empty() {
        Ok(format!("{rest}:{DEFAULT_PORT}"))
    } else if has_port(tail) {
        Ok(rest.to_owned())
    } else {
        Err(invalid())
    }
}

/// `tail` is the text after the host, e.g. `:61613`.
fn has_port(tail: &str) -> bool {
    tail.strip_prefix(':')
        .is_some_and(|port| port.parse::<u16>().is_ok())
}

/// Opens STOMP connections to one broker and topic.
#[derive(Debug, Clone)]
pub struct StompConnector {
    addr: String,
    destination: String,
    connect_timeout: Duration,
    io_slice: Duration,
}

impl StompConnector {
    pub fn new(endpoint: &str, topic: &str) -> Result<Self, TransportError> {
        Ok(Self {
            addr: parse_endpoint(endpoint)?,
            destination: format!("/topic/{topic}"),
            connect_timeout: CONNECT_TIMEOUT,
            io_slice: DEFAULT_IO_SLICE,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Longest single blocking step; normally the receive poll interval.
    pub fn with_io_slice(mut self, slice: Duration) -> Self {
        self.io_slice = slice.max(Duration::from_millis(1));
        self
    }

    /// `host:port` this connector dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl Connector for StompConnector {
    type Subscriber = StompConnection;
    type Publisher = StompConnection;

    fn subscribe(&self, cancel: &AtomicBool) -> Result<StompConnection, TransportError> {
        let mut conn = StompConnection::connect(self, cancel)?;
        conn.subscribe()?;
        Ok(conn)
    }

    fn publisher(&self, cancel: &AtomicBool) -> Result<StompConnection, TransportError> {
        StompConnection::connect(self, cancel)
    }
}

/// One STOMP session.
///
/// Synchronous. Callers drive timing via `recv_timeout()`.
pub struct StompConnection {
    stream: TcpStream,
    splitter: FrameSplitter,
    read_buf: [u8; 4096],
    /// Frames split from the TCP stream but not yet consumed.
    pending: VecDeque<StompFrame>,
    destination: String,
}

impl StompConnection {
    /// Dial the broker and complete the CONNECT/CONNECTED exchange.
    ///
    /// Gives up with [`TransportError::Cancelled`] within one I/O slice of
    /// `cancel` being set.
    pub fn connect(
        connector: &StompConnector,
        cancel: &AtomicBool,
    ) -> Result<Self, TransportError> {
        let stream = dial(connector, cancel)?;
        // Small frames; disable Nagle to avoid latency.
        let _ = stream.set_nodelay(true);
        // Outbound frames are a few bytes; a full send buffer means a stuck broker.
        stream.set_write_timeout(Some(connector.io_slice))?;

        let mut conn = Self {
            stream,
            splitter: FrameSplitter::new(),
            read_buf: [0u8; 4096],
            pending: VecDeque::new(),
            destination: connector.destination.clone(),
        };

        let host = connector
            .addr
            .rsplit_once(':')
            .map_or(connector.addr.as_str(), |(h, _)| h);
        let connect = StompFrame::new("CONNECT")
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        conn.send_frame(&connect)?;

        let deadline = Instant::now() + connector.connect_timeout;
        let reply = loop {
            if cancel.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break None;
            }
            if let Some(frame) = conn.recv_frame(remaining.min(connector.io_slice))? {
                break Some(frame);
            }
        };

        match reply {
            Some(f) if f.command == "CONNECTED" => {
                debug!(addr = %connector.addr, version = ?f.get("version"), "broker session open");
                Ok(conn)
            }
            Some(f) if f.command == "ERROR" => Err(broker_error(&f)),
            Some(f) => Err(TransportError::Protocol(format!(
                "expected CONNECTED, got {}",
                f.command
            ))),
            None => Err(TransportError::Protocol(format!(
                "no CONNECTED frame within {:?}",
                connector.connect_timeout
            ))),
        }
    }

    /// Subscribe to the connector's topic with auto-acknowledge.
    pub fn subscribe(&mut self) -> Result<(), TransportError> {
        let frame = StompFrame::new("SUBSCRIBE")
            .with_header("id", "0")
            .with_header("destination", self.destination.as_str())
            .with_header("ack", "auto");
        self.send_frame(&frame)
    }

    pub fn send_frame(&mut self, frame: &StompFrame) -> Result<(), TransportError> {
        self.stream.write_all(&frame.encode())?;
        Ok(())
    }

    /// Block up to `timeout` for the next frame of any kind.
    pub fn recv_frame(&mut self, timeout: Duration) -> Result<Option<StompFrame>, TransportError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.stream.set_read_timeout(Some(remaining))?;
            let n = match self.stream.read(&mut self.read_buf) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => n,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let frames = self.splitter.feed(&self.read_buf[..n])?;
            self.pending.extend(frames);
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            // No complete frame yet; read more.
        }
    }
}

impl Subscriber for StompConnection {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(frame) = self.recv_frame(remaining)? else {
                return Ok(None);
            };
            match frame.command.as_str() {
                "MESSAGE" => return Ok(Some(into_envelope(frame))),
                "ERROR" => return Err(broker_error(&frame)),
                other => debug!(command = other, "ignoring frame"),
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Best effort: the broker may already be gone.
        let _ = self.send_frame(&StompFrame::new("DISCONNECT"));
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Publisher for StompConnection {
    fn publish(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut frame = StompFrame::new("SEND")
            .with_header("destination", self.destination.as_str())
            .with_header(PROP_MESSAGE_TYPE, MESSAGE_TYPE_VALUE);
        if let Some(tag) = envelope.kind_tag {
            frame = frame.with_header(PROP_MESSAGE_KIND, tag.to_string());
        }
        if let Some(id) = &envelope.system_id {
            frame = frame.with_header(PROP_SYSTEM_ID, id.as_str());
        }
        frame = match &envelope.body {
            Body::Bytes(bytes) => frame.with_body(bytes.clone()),
            Body::Text(text) => StompFrame {
                body: text.clone().into_bytes(),
                ..frame
            },
        };
        self.send_frame(&frame)
    }
}

/// TCP connect in I/O slices. Attempts that time out are retried until the
/// connect budget runs out; refusals end the dial after one pass.
fn dial(connector: &StompConnector, cancel: &AtomicBool) -> Result<TcpStream, TransportError> {
    let addrs: Vec<SocketAddr> = connector.addr.to_socket_addrs()?.collect();
    let deadline = Instant::now() + connector.connect_timeout;
    let mut last_err = None;

    'budget: loop {
        let mut timed_out = false;
        for sock in &addrs {
            if cancel.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break 'budget;
            }
            match TcpStream::connect_timeout(sock, remaining.min(connector.io_slice)) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    timed_out |= e.kind() == io::ErrorKind::TimedOut;
                    last_err = Some(e);
                }
            }
        }
        if !timed_out {
            break;
        }
    }

    Err(match last_err {
        Some(e) => e.into(),
        None => TransportError::InvalidEndpoint(connector.addr.clone()),
    })
}

/// A MESSAGE with `content-length` is a byte message; without, a text one.
fn into_envelope(frame: StompFrame) -> Envelope {
    let kind_tag = frame
        .get(PROP_MESSAGE_KIND)
        .and_then(|v| v.trim().parse::<i64>().ok());
    let system_id = frame.get(PROP_SYSTEM_ID).map(str::to_owned);
    let body = if frame.get(CONTENT_LENGTH).is_some() {
        Body::Bytes(frame.body)
    } else {
        Body::Text(String::from_utf8_lossy(&frame.body).into_owned())
    };
    Envelope {
        kind_tag,
        system_id,
        body,
    }
}

fn broker_error(frame: &StompFrame) -> TransportError {
    let msg = match frame.get("message") {
        Some(m) => m.to_owned(),
        None => String::from_utf8_lossy(&frame.body).trim().to_owned(),
    };
    TransportError::Broker(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
