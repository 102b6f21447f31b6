use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use log::trace;

use crate::alo::ALO_REG_COUNT;
use crate::link::StateSnapshot;

/// Subscription channels of the event surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LinkStatus,
    Ait,
    Alo,
    Discovery,
    Test,
}

/// Per-link notifications published to upper-layer subscribers.
#[derive(Debug, Clone)]
pub struct Event {
    pub module_id: u32,
    pub port_id: u32,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// Current and first-error snapshots of the link.
    LinkStatus {
        current: StateSnapshot,
        error: StateSnapshot,
    },
    /// Opaque atomic payload passing through in transit.
    AitForward { frame: Vec<u8> },
    /// Newly delivered atomic messages on the receive queue.
    AitGot { num_messages: u16 },
    /// Register block after an update.
    AloUpdate {
        flags: u32,
        regs: [u64; ALO_REG_COUNT],
    },
    /// Opaque discovery payload.
    Discovery { payload: Vec<u8> },
    /// Control word seen with a test-injection field.
    Test { msg_raw: u16 },
}

impl EventKind {
    fn channel(&self) -> Channel {
        match self {
            EventKind::LinkStatus { .. } => Channel::LinkStatus,
            EventKind::AitForward { .. } | EventKind::AitGot { .. } => Channel::Ait,
            EventKind::AloUpdate { .. } => Channel::Alo,
            EventKind::Discovery { .. } => Channel::Discovery,
            EventKind::Test { .. } => Channel::Test,
        }
    }
}

/// Fan-out of events to subscribers. Publication is append-only per
/// subscription and must never run under a link lock; callers collect
/// events while locked and hand them over afterwards.
#[derive(Debug, Default)]
pub struct EventHub {
    subs: Mutex<HashMap<Channel, Vec<Sender<Event>>>>,
}

impl EventHub {
    pub fn subscribe(&self, channel: Channel) -> Receiver<Event> {
        let (tx, rx) = channel_pair();
        self.subs.lock().unwrap().entry(channel).or_default().push(tx);
        rx
    }

    pub fn publish(&self, event: Event) {
        let channel = event.kind.channel();
        let mut subs = self.subs.lock().unwrap();
        let Some(senders) = subs.get_mut(&channel) else {
            trace!("no subscribers on {:?}", channel);
            return;
        };
        // Disconnected receivers fall off on the way through.
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn channel_pair() -> (Sender<Event>, Receiver<Event>) {
    channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn got(num: u16) -> Event {
        Event {
            module_id: 0,
            port_id: 1,
            kind: EventKind::AitGot { num_messages: num },
        }
    }

    #[test]
    fn subscribers_see_their_channel_only() {
        let hub = EventHub::default();
        let ait = hub.subscribe(Channel::Ait);
        let status = hub.subscribe(Channel::LinkStatus);

        hub.publish(got(2));

        assert!(matches!(
            ait.try_recv().unwrap().kind,
            EventKind::AitGot { num_messages: 2 }
        ));
        assert!(status.try_recv().is_err());
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let hub = EventHub::default();
        drop(hub.subscribe(Channel::Ait));
        let live = hub.subscribe(Channel::Ait);

        hub.publish(got(1));
        hub.publish(got(2));

        assert!(live.try_recv().is_ok());
        assert!(live.try_recv().is_ok());
    }
}
