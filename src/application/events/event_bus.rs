//! In-process broadcast of [`Event`]s
//!
//! Store writes, party lifecycle changes and command resolutions fan out to
//! every subscriber. A subscriber that falls behind loses the oldest
//! messages; the loss is logged and counted in `ocpi_events_lagged_total`.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use super::types::{Event, EventMessage};

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let event_type = event.event_type();
        // Err only means that nobody is listening.
        let receivers = self.sender.send(EventMessage::new(event)).unwrap_or(0);
        trace!(event_type, receivers, "Event published");
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
}

fn lagged(missed: u64) {
    metrics::counter!("ocpi_events_lagged_total").increment(missed);
    warn!(missed, "Event subscriber lagged, oldest events dropped");
}

impl EventSubscriber {
    /// Next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(missed)) => lagged(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(missed)) => lagged(missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::types::{PartyChange, PartyChangedEvent};
    use crate::domain::ocpi::PartyScope;

    fn party_event(change: PartyChange) -> Event {
        Event::PartyChanged(PartyChangedEvent {
            party: PartyScope::parse("NL", "EMS").unwrap(),
            change,
        })
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(party_event(PartyChange::Added));
        let message = subscriber.recv().await.unwrap();
        assert_eq!(message.event.event_type(), "party_changed");
    }

    #[test]
    fn dropped_subscribers_stop_counting() {
        let bus = EventBus::new();
        let subscriber = bus.subscribe();
        drop(subscriber);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(party_event(PartyChange::Added));
    }

    #[test]
    fn lagging_subscriber_skips_to_the_oldest_retained_event() {
        let bus = EventBus::with_capacity(2);
        let mut subscriber = bus.subscribe();
        bus.publish(party_event(PartyChange::Added));
        bus.publish(party_event(PartyChange::Registered));
        bus.publish(party_event(PartyChange::Removed));

        let changes: Vec<PartyChange> = std::iter::from_fn(|| subscriber.try_recv())
            .filter_map(|message| match message.event {
                Event::PartyChanged(e) => Some(e.change),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![PartyChange::Registered, PartyChange::Removed]);
    }
}
