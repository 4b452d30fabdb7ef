//! In-process event broker.
//!
//! Producers call [`EventBroker::dispatch`] from any thread; every matching
//! [`Subscription`] receives a copy. A subscriber that cannot keep up closes
//! itself with [`SubscriptionError::BufferFull`] and the dispatcher carries on.

/// Per-subscriber bounded queue.
pub mod subscription;

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    event::{Event, EventEnvelope, EventFilter},
    types::{ContestId, SubscriptionId},
};

use subscription::Delivery;
pub use subscription::{Subscription, SubscriptionError};

/// Broker seam shared by the driver, manager, keeper and outside producers.
pub trait EventBroker: Send + Sync {
    /// Registers a new subscription. A `buffer_capacity` of 0 means unbounded.
    fn subscribe(&self, filter: EventFilter, buffer_capacity: usize) -> (SubscriptionId, Arc<Subscription>);

    /// Removes a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription_id: SubscriptionId);

    /// Routes `event` to every subscription matching `contest_id`. Never fails.
    fn dispatch(&self, contest_id: ContestId, event: Event);
}

/// Default [`EventBroker`] backed by a reader/writer-locked subscription table.
#[derive(Debug, Default)]
pub struct Broker {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
}

impl Broker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl EventBroker for Broker {
    fn subscribe(&self, filter: EventFilter, buffer_capacity: usize) -> (SubscriptionId, Arc<Subscription>) {
        let subscription = Arc::new(Subscription::new(filter, buffer_capacity));
        let id = subscription.id();

        self.subscriptions.write().insert(id, Arc::clone(&subscription));
        debug!(subscription_id = %id, buffer_capacity, "subscription registered");

        (id, subscription)
    }

    fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let removed = self.subscriptions.write().remove(&subscription_id);

        if let Some(subscription) = removed {
            subscription.terminate();
            debug!(subscription_id = %subscription_id, "subscription removed");
        }
    }

    fn dispatch(&self, contest_id: ContestId, event: Event) {
        let name = event.name();
        let contender_id = event.contender_id();

        let subscriptions = self.subscriptions.read();

        for subscription in subscriptions.values() {
            if !subscription.filter_match(contest_id, contender_id, name) {
                continue;
            }

            let envelope = EventEnvelope {
                name,
                data: event.clone(),
            };

            match subscription.deliver(envelope) {
                Delivery::Queued => {}
                Delivery::Overflowed => {
                    warn!(subscription_id = %subscription.id(), "subscriber fell behind, closing subscription");
                }
                Delivery::Rejected(reason) => {
                    debug!(subscription_id = %subscription.id(), error = %reason, "dropping event for closed subscription");
                }
            }
        }
    }
}
