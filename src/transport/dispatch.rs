use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{EventKind, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Slot = (SubscriptionId, UnboundedSender<TransportEvent>);

/// Subscribers keyed by the event kinds they asked for.
#[derive(Debug, Default)]
pub(crate) struct HandlerTable {
    next_id: u64,
    slots: HashMap<EventKind, Vec<Slot>>,
}

impl HandlerTable {
    pub(crate) fn register(
        &mut self,
        kinds: &[EventKind],
    ) -> (SubscriptionId, UnboundedReceiver<TransportEvent>) {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in kinds {
            let slots = self.slots.entry(*kind).or_default();
            if !slots.iter().any(|(existing, _)| *existing == id) {
                slots.push((id, tx.clone()));
            }
        }
        (id, rx)
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for slots in self.slots.values_mut() {
            let before = slots.len();
            slots.retain(|(existing, _)| *existing != id);
            removed |= slots.len() != before;
        }
        removed
    }

    /// Delivers to every subscriber of the event's kind, pruning subscribers
    /// whose receiver is gone. Returns how many received it.
    pub(crate) fn dispatch(&mut self, event: &TransportEvent) -> usize {
        let Some(slots) = self.slots.get_mut(&event.kind()) else {
            return 0;
        };
        slots.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        slots.len()
    }

    pub(crate) fn subscriber_count(&self, kind: EventKind) -> usize {
        self.slots.get(&kind).map_or(0, Vec::len)
    }
}
