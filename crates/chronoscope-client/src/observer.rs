//! Listener registry for timeline changes.
//!
//! Listeners are invoked with the new snapshot after the controller has
//! released its lock, so a listener may freely call back into the
//! controller.
//!
//! Snapshots are queued in publication order while the controller still
//! holds its lock and delivered by a single drainer at a time. Listeners
//! therefore see every snapshot, one call at a time, in the order the
//! snapshots were published, even when publishers race or a listener
//! publishes from inside its own callback.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::snapshot::TimelineSnapshot;

type Listener = Arc<dyn Fn(&Arc<TimelineSnapshot>) + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

#[derive(Default)]
struct Delivery {
    pending: VecDeque<Arc<TimelineSnapshot>>,
    draining: bool,
}

/// Registered listeners, called in subscription order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    slots: Mutex<Slots>,
    delivery: Mutex<Delivery>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&Arc<TimelineSnapshot>) + Send + Sync + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let id = slots.next_id;
        slots.next_id = slots.next_id.saturating_add(1);
        slots.listeners.insert(id, Arc::new(listener));
        Subscription {
            registry: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: u64) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Queue a snapshot for delivery. Callers enqueue in publication order.
    pub(crate) fn enqueue(&self, snapshot: Arc<TimelineSnapshot>) {
        self.delivery_slot().pending.push_back(snapshot);
    }

    /// Deliver queued snapshots unless another caller is already draining,
    /// in which case that caller delivers them.
    pub(crate) fn deliver(&self) {
        {
            let mut delivery = self.delivery_slot();
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }
        loop {
            let next = {
                let mut delivery = self.delivery_slot();
                let next = delivery.pending.pop_front();
                if next.is_none() {
                    delivery.draining = false;
                }
                next
            };
            match next {
                Some(snapshot) => self.notify(&snapshot),
                None => break,
            }
        }
    }

    fn delivery_slot(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call every listener. The registry lock is not held during calls.
    fn notify(&self, snapshot: &Arc<TimelineSnapshot>) {
        let listeners: Vec<Listener> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    id: u64,
}

impl Subscription {
    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
