use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed events, one channel per hotel.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a hotel's commits. Creates the channel if needed.
    pub fn subscribe(&self, hotel_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(hotel_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, hotel_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&hotel_id) {
            let _ = sender.send(event.clone());
        }
    }
}
