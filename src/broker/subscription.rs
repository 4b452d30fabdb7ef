//! Bounded FIFO queue feeding one subscriber.

use std::{collections::VecDeque, sync::Arc};

use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    event::{EventEnvelope, EventFilter},
    types::{ContenderId, ContestId, SubscriptionId},
};

/// Why a subscription stopped delivering events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The consumer fell behind and the buffer overflowed.
    #[error("buffer full")]
    BufferFull,
    /// The subscription was closed administratively.
    #[error("subscription terminated")]
    Terminated,
    /// The wait was aborted through its cancellation token.
    #[error("cancelled")]
    Cancelled,
}

/// Outcome of one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// This post found the buffer full and closed the subscription.
    Overflowed,
    /// The subscription was already closed.
    Rejected(SubscriptionError),
}

#[derive(Debug, Default)]
struct State {
    buffer: VecDeque<EventEnvelope>,
    close_reason: Option<SubscriptionError>,
}

/// One subscriber's queue.
///
/// Writers call [`Subscription::post`]; the single reader drains with
/// [`Subscription::await_event`] or [`Subscription::events`]. Queued events
/// are always handed out before the close reason.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    capacity: usize,
    state: Mutex<State>,
    notify: Notify,
}

impl Subscription {
    /// Creates a subscription with a fresh id. A `capacity` of 0 means unbounded.
    pub fn new(filter: EventFilter, capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            filter,
            capacity,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// Subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Filter the broker routes by.
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Close reason, once set.
    pub fn close_reason(&self) -> Option<SubscriptionError> {
        self.state.lock().close_reason
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues `event`.
    ///
    /// Posting into a full buffer closes the subscription with
    /// [`SubscriptionError::BufferFull`]; every later post fails with the
    /// close reason.
    pub fn post(&self, event: EventEnvelope) -> Result<(), SubscriptionError> {
        match self.deliver(event) {
            Delivery::Queued => Ok(()),
            Delivery::Overflowed => Err(SubscriptionError::BufferFull),
            Delivery::Rejected(reason) => Err(reason),
        }
    }

    pub(crate) fn deliver(&self, event: EventEnvelope) -> Delivery {
        {
            let mut state = self.state.lock();

            if let Some(reason) = state.close_reason {
                return Delivery::Rejected(reason);
            }

            if self.capacity != 0 && state.buffer.len() >= self.capacity {
                state.close_reason = Some(SubscriptionError::BufferFull);
                drop(state);
                self.notify.notify_waiters();
                return Delivery::Overflowed;
            }

            state.buffer.push_back(event);
        }

        self.notify.notify_waiters();
        Delivery::Queued
    }

    /// Closes the subscription; queued events remain readable.
    pub fn terminate(&self) {
        {
            let mut state = self.state.lock();
            if state.close_reason.is_none() {
                state.close_reason = Some(SubscriptionError::Terminated);
            }
        }

        self.notify.notify_waiters();
    }

    /// Waits for the next event.
    ///
    /// Returns [`SubscriptionError::Cancelled`] if `cancel` fires first, even
    /// when it was already cancelled on entry.
    pub async fn await_event(&self, cancel: &CancellationToken) -> Result<EventEnvelope, SubscriptionError> {
        loop {
            // Registered before inspecting state so a post in between is not lost.
            let notified = self.notify.notified();

            if cancel.is_cancelled() {
                return Err(SubscriptionError::Cancelled);
            }

            {
                let mut state = self.state.lock();

                if let Some(event) = state.buffer.pop_front() {
                    return Ok(event);
                }

                if let Some(reason) = state.close_reason {
                    return Err(reason);
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Err(SubscriptionError::Cancelled),
            }
        }
    }

    /// Streams events until the subscription closes or `cancel` fires.
    ///
    /// Once the stream has ended it stays exhausted.
    pub fn events(self: &Arc<Self>, cancel: CancellationToken) -> BoxStream<'static, EventEnvelope> {
        stream::unfold((Arc::clone(self), cancel), |(sub, cancel)| async move {
            match sub.await_event(&cancel).await {
                Ok(event) => Some((event, (sub, cancel))),
                Err(_) => None,
            }
        })
        .fuse()
        .boxed()
    }

    /// Applies the subscription filter.
    pub fn filter_match(&self, contest_id: ContestId, contender_id: ContenderId, event_type: &str) -> bool {
        self.filter.matches(contest_id, contender_id, event_type)
    }
}
