//! In-process broker: every published envelope fans out to every live
//! subscriber on the same [`MemoryBroker`].

use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Connector, Envelope, Publisher, Subscriber, TransportError};

#[derive(Default)]
struct Inner {
    subscribers: Vec<Sender<Envelope>>,
    subscribe_count: usize,
    publisher_count: usize,
}

/// Cloneable handle to a shared in-memory topic.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `envelope` to every live subscriber.
    pub fn deliver(&self, envelope: &Envelope) {
        self.lock()
            .subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
    }

    /// Drop every subscription. Subscribers see
    /// [`TransportError::Disconnected`] once their queue drains.
    pub fn disconnect_all(&self) {
        self.lock().subscribers.clear();
    }

    /// Total subscriptions ever opened.
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribe_count
    }

    /// Total producers ever opened.
    pub fn publisher_count(&self) -> usize {
        self.lock().publisher_count
    }

    /// Subscriptions currently attached.
    pub fn live_subscribers(&self) -> usize {
        self.lock().subscribers.len()
    }
}

pub struct MemorySubscriber {
    rx: Receiver<Envelope>,
}

impl Subscriber for MemorySubscriber {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Envelope>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(env) => Ok(Some(env)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct MemoryPublisher {
    broker: MemoryBroker,
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        self.broker.deliver(envelope);
        Ok(())
    }
}

impl Connector for MemoryBroker {
    type Subscriber = MemorySubscriber;
    type Publisher = MemoryPublisher;

    fn subscribe(&self, _cancel: &AtomicBool) -> Result<MemorySubscriber, TransportError> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        inner.subscribers.push(tx);
        inner.subscribe_count += 1;
        Ok(MemorySubscriber { rx })
    }

    fn publisher(&self, _cancel: &AtomicBool) -> Result<MemoryPublisher, TransportError> {
        self.lock().publisher_count += 1;
        Ok(MemoryPublisher {
            broker: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::IpcMessageKind;

    static LIVE: AtomicBool = AtomicBool::new(false);

    #[test]
    fn fan_out_to_all_subscribers() {
        let broker = MemoryBroker::new();
        let mut a = broker.subscribe(&LIVE).unwrap();
        let mut b = broker.subscribe(&LIVE).unwrap();
        let mut producer = broker.publisher(&LIVE).unwrap();

        let env = Envelope::bytes(IpcMessageKind::Results, vec![0x90]);
        producer.publish(&env).unwrap();

        let wait = Duration::from_millis(10);
        assert_eq!(a.recv_timeout(wait).unwrap(), Some(env.clone()));
        assert_eq!(b.recv_timeout(wait).unwrap(), Some(env));
        assert_eq!(a.recv_timeout(wait).unwrap(), None);
    }

    #[test]
    fn disconnect_after_drain() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&LIVE).unwrap();
        broker.deliver(&Envelope::bytes(IpcMessageKind::Shutdown, vec![]));
        broker.disconnect_all();

        let wait = Duration::from_millis(10);
        assert!(sub.recv_timeout(wait).unwrap().is_some());
        assert!(matches!(
            sub.recv_timeout(wait),
            Err(TransportError::Disconnected)
        ));
        assert_eq!(broker.live_subscribers(), 0);
        assert_eq!(broker.subscribe_count(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe(&LIVE).unwrap();
        drop(sub);
        broker.deliver(&Envelope::bytes(IpcMessageKind::Results, vec![]));
        assert_eq!(broker.live_subscribers(), 0);
    }
}
