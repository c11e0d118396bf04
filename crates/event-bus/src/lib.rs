//! Best-effort fan-out of events to bounded subscriber queues.
//!
//! Publishing never blocks: a subscriber whose queue is full or whose
//! receiver was dropped is removed from the bus and the publisher moves on.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use pagepilot_core_types::CoreError;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus closed")]
    Closed,
}

impl From<BusError> for CoreError {
    fn from(value: BusError) -> Self {
        CoreError::new(value.to_string())
    }
}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Deliver to every live subscriber; returns how many received it.
    fn publish(&self, event: E) -> Result<usize, BusError>;
    fn subscribe(&self) -> Result<mpsc::Receiver<E>, BusError>;
    fn subscriber_count(&self) -> usize;
}

struct Subscriber<E> {
    id: u64,
    sender: mpsc::Sender<E>,
}

struct BusState<E> {
    subscribers: Vec<Subscriber<E>>,
    next_id: u64,
    closed: bool,
}

/// In-process bus; each subscriber gets its own bounded queue.
pub struct InMemoryBus<E>
where
    E: Event,
{
    capacity: usize,
    state: Mutex<BusState<E>>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self::with_capacity(capacity))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BusState {
                subscribers: Vec::new(),
                next_id: 0,
                closed: false,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every subscriber; later publishes and subscribes fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, BusError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state
            .subscribers
            .retain(|subscriber| match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = subscriber.id, "subscriber lagging, dropped");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = subscriber.id, "subscriber went away");
                    false
                }
            });
        Ok(state.subscribers.len())
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<E>, BusError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push(Subscriber { id, sender });
        debug!(subscriber = id, "subscriber registered");
        Ok(receiver)
    }

    fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}
