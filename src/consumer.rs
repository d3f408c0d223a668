//! Background receive loop.
//!
//! Pulls envelopes from the topic with a short timeout, filters them by kind
//! and size, decodes results and feeds them to the [`Monitor`]. The shutdown
//! flag is checked every poll interval, including while waiting to reconnect.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_PAYLOAD_BYTES,
    DEFAULT_POLL_INTERVAL, MonitorConfig,
};
use crate::error::hex_preview;
use crate::protocol::{ControlCommand, IpcMessageKind, Message};
use crate::state::{Merge, Monitor};
use crate::transport::{Body, Connector, Envelope, Subscriber, TransportError};

/// Timing and size limits for the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub poll_interval: Duration,
    pub max_payload_bytes: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ConsumerSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            max_payload_bytes: config.max_payload_bytes,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// What happened to one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Decoded result handed to the display state.
    Merged(Merge),
    /// Payload over the size bound; not decoded.
    Oversized,
    /// Payload failed to decode.
    Undecodable,
    /// Text body, unknown tag, or a kind this process does not consume.
    Ignored,
}

pub struct Consumer<C: Connector> {
    connector: C,
    monitor: Arc<Monitor>,
    settings: ConsumerSettings,
    shutdown: Arc<AtomicBool>,
}

impl<C: Connector> Consumer<C> {
    pub fn new(connector: C, monitor: Arc<Monitor>, settings: ConsumerSettings) -> Self {
        Self {
            connector,
            monitor,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`](Self::run) when set.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run until the shutdown flag is set. Transport failures never end the
    /// loop; the subscription is reopened with exponential backoff.
    pub fn run(&self) {
        let mut backoff = self.settings.initial_backoff;
        info!("consumer started");

        while !self.stopping() {
            let mut sub = match self.connector.subscribe(&self.shutdown) {
                Ok(sub) => {
                    info!("subscribed to result topic");
                    backoff = self.settings.initial_backoff;
                    sub
                }
                Err(TransportError::Cancelled) => {
                    debug!("subscribe abandoned for shutdown");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "subscribe failed");
                    self.pause(backoff);
                    backoff = next_backoff(backoff, self.settings.max_backoff);
                    continue;
                }
            };

            let lost = self.pump(&mut sub);
            if let Err(e) = sub.close() {
                debug!(error = %e, "closing subscription");
            }

            if let Some(e) = lost {
                warn!(error = %e, retry_in = ?backoff, "subscription lost; reconnecting");
                self.pause(backoff);
                backoff = next_backoff(backoff, self.settings.max_backoff);
            }
        }

        info!("consumer stopped");
    }

    /// Receive until shutdown (`None`) or a transport failure (`Some`).
    fn pump(&self, sub: &mut C::Subscriber) -> Option<TransportError> {
        while !self.stopping() {
            match sub.recv_timeout(self.settings.poll_interval) {
                Ok(Some(envelope)) => {
                    self.handle(&envelope);
                }
                Ok(None) => {}
                Err(e) => return Some(e),
            }
        }
        None
    }

    /// Filter, decode and apply one envelope.
    pub fn handle(&self, envelope: &Envelope) -> Handled {
        let payload = match &envelope.body {
            Body::Bytes(bytes) => bytes,
            Body::Text(text) => {
                debug!(len = text.len(), "ignoring text message");
                return Handled::Ignored;
            }
        };

        if payload.len() > self.settings.max_payload_bytes {
            warn!(
                len = payload.len(),
                limit = self.settings.max_payload_bytes,
                "dropping oversized message"
            );
            return Handled::Oversized;
        }

        let Some(kind) = envelope.kind_tag.and_then(IpcMessageKind::from_tag) else {
            debug!(tag = ?envelope.kind_tag, "ignoring message with unknown kind");
            return Handled::Ignored;
        };

        match Message::decode(kind, payload) {
            Ok(Message::Results(result)) => {
                Handled::Merged(self.monitor.on_result_received(result))
            }
            Ok(Message::Control { code }) => {
                debug!(
                    code,
                    command = ?ControlCommand::from_code(code),
                    system_id = ?envelope.system_id,
                    "control message on topic"
                );
                Handled::Ignored
            }
            Ok(Message::Other { kind, payload }) => {
                debug!(?kind, len = payload.len(), "ignoring message kind");
                Handled::Ignored
            }
            Err(e) => {
                warn!(?kind, error = %e, raw = %hex_preview(payload), "undecodable message");
                Handled::Undecodable
            }
        }
    }

    /// Sleep for `total`, waking every poll interval to check for shutdown.
    fn pause(&self, total: Duration) {
        let step = self.settings.poll_interval.max(Duration::from_millis(1));
        let deadline = Instant::now() + total;
        while !self.stopping() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(step));
        }
    }
}

impl<C> Consumer<C>
where
    C: Connector + Send + 'static,
{
    /// Run the loop on a named background thread.
    pub fn spawn(self) -> io::Result<ConsumerHandle> {
        let shutdown = self.shutdown_flag();
        let thread = thread::Builder::new()
            .name("result-consumer".into())
            .spawn(move || self.run())?;
        Ok(ConsumerHandle {
            shutdown,
            thread: Some(thread),
        })
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Owner of a spawned consumer thread.
pub struct ConsumerHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the loop and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("consumer thread panicked");
            }
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClubType, LaunchResult, ResultKind};
    use crate::transport::memory::MemoryBroker;

    fn consumer() -> Consumer<MemoryBroker> {
        Consumer::new(
            MemoryBroker::new(),
            Arc::new(Monitor::default()),
            ConsumerSettings {
                max_payload_bytes: 64,
                ..ConsumerSettings::default()
            },
        )
    }

    fn hit() -> LaunchResult {
        LaunchResult {
            speed_mps: 50.0,
            kind: ResultKind::Hit,
            club_type: ClubType::Driver,
            ..Default::default()
        }
    }

    #[test]
    fn settings_from_config() {
        let mut config = MonitorConfig::new("tcp://h:1");
        config.poll_interval = Duration::from_millis(50);
        config.max_payload_bytes = 2048;
        let s = ConsumerSettings::from_config(&config);
        assert_eq!(s.poll_interval, Duration::from_millis(50));
        assert_eq!(s.max_payload_bytes, 2048);
        assert_eq!(s.initial_backoff, DEFAULT_INITIAL_BACKOFF);
        assert_eq!(ConsumerSettings::default().max_payload_bytes, 10_000);
    }

    #[test]
    fn results_are_merged() {
        let c = consumer();
        let env = Envelope::bytes(IpcMessageKind::Results, hit().encode());
        assert_eq!(c.handle(&env), Handled::Merged(Merge::Replaced));
        assert_eq!(c.monitor.snapshot(), hit());
    }

    #[test]
    fn oversized_checked_before_kind() {
        let c = consumer();
        let env = Envelope::bytes(IpcMessageKind::Camera2Image, vec![0u8; 65]);
        assert_eq!(c.handle(&env), Handled::Oversized);

        let exact = Envelope::bytes(IpcMessageKind::Camera2Image, vec![0u8; 64]);
        assert_eq!(c.handle(&exact), Handled::Ignored);
    }

    #[test]
    fn malformed_result_keeps_state() {
        let c = consumer();
        c.handle(&Envelope::bytes(IpcMessageKind::Results, hit().encode()));

        // A bare integer instead of the record array.
        let env = Envelope::bytes(IpcMessageKind::Results, vec![0x05]);
        assert_eq!(c.handle(&env), Handled::Undecodable);
        assert_eq!(c.monitor.snapshot(), hit());
    }

    #[test]
    fn non_result_kinds_ignored() {
        let c = consumer();
        let echo = Envelope::control(&ControlCommand::ClubChange(ClubType::Putter), "LM_GUI");
        assert_eq!(c.handle(&echo), Handled::Ignored);

        let untagged = Envelope {
            kind_tag: None,
            system_id: None,
            body: Body::Bytes(hit().encode()),
        };
        assert_eq!(c.handle(&untagged), Handled::Ignored);

        let unknown = Envelope {
            kind_tag: Some(42),
            ..untagged.clone()
        };
        assert_eq!(c.handle(&unknown), Handled::Ignored);

        let text = Envelope {
            kind_tag: Some(IpcMessageKind::Results.tag()),
            system_id: None,
            body: Body::Text("hello".into()),
        };
        assert_eq!(c.handle(&text), Handled::Ignored);

        assert_eq!(c.monitor.snapshot(), LaunchResult::default());
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let max = Duration::from_secs(30);
        let mut b = DEFAULT_INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(b.as_millis());
            b = next_backoff(b, max);
        }
        assert_eq!(seen, [500, 1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn pause_returns_early_on_shutdown() {
        let c = consumer();
        c.shutdown.store(true, Ordering::Release);
        let start = Instant::now();
        c.pause(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
