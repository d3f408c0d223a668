//! Outbound control path.
//!
//! Club changes are handed to a dedicated `control-publisher` thread over a
//! channel, so the caller never waits on the broker. That thread is the only
//! owner of the producer: it opens it on the first command, reuses it for the
//! rest, and drops it after a failed publish so the next command reopens it.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::protocol::ControlCommand;
use crate::transport::{Connector, Envelope, Publisher, TransportError};

/// Anything that can carry a [`ControlCommand`] to the measurement pipeline.
pub trait ControlSink: Send + Sync {
    /// Queue `cmd` for delivery. Must not block on the network.
    fn send_control(&self, cmd: &ControlCommand) -> Result<(), TransportError>;
}

/// Lazily connected producer on the configured topic.
pub struct LazyPublisher {
    tx: Option<Sender<ControlCommand>>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LazyPublisher {
    /// Start the publisher thread. No connection is made until the first
    /// command arrives.
    pub fn spawn<C>(connector: C, system_id: impl Into<String>) -> io::Result<Self>
    where
        C: Connector + Send + 'static,
        C::Publisher: Send,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            connector,
            system_id: system_id.into(),
            producer: None,
            cancel: Arc::clone(&cancel),
        };
        let thread = thread::Builder::new()
            .name("control-publisher".into())
            .spawn(move || worker.run(rx))?;
        Ok(Self {
            tx: Some(tx),
            cancel,
            thread: Some(thread),
        })
    }
}

impl ControlSink for LazyPublisher {
    fn send_control(&self, cmd: &ControlCommand) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Disconnected)?;
        tx.send(*cmd).map_err(|_| TransportError::Disconnected)
    }
}

impl Drop for LazyPublisher {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        // Closing the channel wakes the worker.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("control publisher thread panicked");
            }
        }
    }
}

struct Worker<C: Connector> {
    connector: C,
    system_id: String,
    producer: Option<C::Publisher>,
    cancel: Arc<AtomicBool>,
}

impl<C: Connector> Worker<C> {
    fn run(mut self, rx: Receiver<ControlCommand>) {
        while let Ok(cmd) = rx.recv() {
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
            match self.publish(&cmd) {
                Ok(()) => {}
                Err(TransportError::Cancelled) => break,
                Err(e) => warn!(error = %e, code = cmd.code(), "control message not sent"),
            }
        }
        debug!("control publisher stopped");
    }

    fn publish(&mut self, cmd: &ControlCommand) -> Result<(), TransportError> {
        let mut producer = match self.producer.take() {
            Some(p) => p,
            None => {
                info!("opening control publisher");
                self.connector.publisher(&self.cancel)?
            }
        };
        debug!(code = cmd.code(), "publishing control message");
        producer.publish(&Envelope::control(cmd, &self.system_id))?;
        self.producer = Some(producer);
        Ok(())
    }
}
