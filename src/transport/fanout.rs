//! Lossy broadcast of decoded events to subscribers.
//!
//! Each subscriber owns a bounded queue. Broadcasting never waits: when a
//! subscriber's queue is full that event is dropped for that subscriber only,
//! so one slow consumer cannot stall the parse pipeline or starve the others.

use crate::protocol::commands::ServerCommand;
use crate::utils::metrics::Metrics;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// What subscribers receive from a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server assigned this client its peer id.
    PeerAssigned(u16),
    /// A decoded server command.
    Command(ServerCommand),
}

/// Ordered set of subscriber queues. Never pruned automatically.
#[derive(Debug)]
pub struct Subscribers {
    senders: RwLock<Vec<mpsc::Sender<Event>>>,
    metrics: Arc<Metrics>,
}

impl Subscribers {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            senders: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Register a new queue of the given capacity and return its receiving end.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.add(tx);
        rx
    }

    /// Register an existing sender.
    pub fn add(&self, sender: mpsc::Sender<Event>) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
    }

    pub fn len(&self) -> usize {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `event` to every subscriber; returns how many accepted it.
    pub fn broadcast(&self, event: Event) -> usize {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;

        for (index, sender) in senders.iter().enumerate() {
            match sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.event_delivered();
                }
                Err(TrySendError::Full(_)) => {
                    self.metrics.event_dropped();
                    warn!(subscriber = index, "Subscriber queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(subscriber = index, "Subscriber gone, skipping");
                }
            }
        }

        delivered
    }
}
