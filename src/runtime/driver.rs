//! Per-contest task that owns a score engine.
//!
//! The driver subscribes to the contest's scoring events, buffers them until
//! an engine is installed, replays the buffer after `start`, and from then on
//! feeds every event to the engine from a single task. Dirty scores are
//! published on a fixed interval, and right away after a quiet interval.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures_util::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    broker::EventBroker,
    config::ScoringConfig,
    engine::traits::{Ranker, ScoreEngine, ScoringRules},
    event::{Event, EventEnvelope, EventFilter, ScoreEngineStarted, ScoreEngineStopped, names},
    types::{ContenderId, ContestId, ScoreEngineInstanceId, SubscriptionId},
};

/// Event names a driver subscribes to.
pub const ENGINE_EVENT_TYPES: [&str; 10] = [
    names::CONTENDER_ENTERED,
    names::CONTENDER_SWITCHED_CLASS,
    names::CONTENDER_WITHDREW_FROM_FINALS,
    names::CONTENDER_REENTERED_FINALS,
    names::CONTENDER_DISQUALIFIED,
    names::CONTENDER_REQUALIFIED,
    names::ASCENT_REGISTERED,
    names::ASCENT_DEREGISTERED,
    names::PROBLEM_ADDED,
    names::PROBLEM_UPDATED,
];

type SideQuest = Box<dyn FnOnce(&mut dyn ScoreEngine) + Send>;

/// Driver handoff errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver task has already exited.
    #[error("driver exited before an engine was installed")]
    InstallRejected,
}

/// Configured, not yet running driver for one contest.
pub struct EngineDriver {
    contest_id: ContestId,
    instance_id: ScoreEngineInstanceId,
    broker: Arc<dyn EventBroker>,
    config: ScoringConfig,
}

/// One-shot handoff of the engine into a running driver.
pub struct EngineInstaller {
    tx: oneshot::Sender<Box<dyn ScoreEngine>>,
}

impl EngineInstaller {
    /// Hands `engine` to the driver, which starts it and replays pending events.
    pub fn install(self, engine: Box<dyn ScoreEngine>) -> Result<(), DriverError> {
        self.tx.send(engine).map_err(|_| DriverError::InstallRejected)
    }
}

/// Control surface of a running driver.
pub struct DriverHandle {
    contest_id: ContestId,
    instance_id: ScoreEngineInstanceId,
    running: Arc<AtomicBool>,
    side_quests: mpsc::UnboundedSender<SideQuest>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Contest this driver serves.
    pub fn contest_id(&self) -> ContestId {
        self.contest_id
    }

    /// Instance id, unique per driver.
    pub fn instance_id(&self) -> ScoreEngineInstanceId {
        self.instance_id
    }

    /// True between the engine's `start` and the loop exit.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once the driver task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Queues a rules swap on the driver loop. Returns false, and drops the
    /// rules, when the driver is not running.
    pub fn replace_scoring_rules(&self, rules: Box<dyn ScoringRules>) -> bool {
        self.send_side_quest(Box::new(move |engine: &mut dyn ScoreEngine| {
            engine.replace_scoring_rules(rules)
        }))
    }

    /// Queues a ranker swap on the driver loop. Same contract as
    /// [`DriverHandle::replace_scoring_rules`].
    pub fn replace_ranker(&self, ranker: Box<dyn Ranker>) -> bool {
        self.send_side_quest(Box::new(move |engine: &mut dyn ScoreEngine| engine.replace_ranker(ranker)))
    }

    fn send_side_quest(&self, quest: SideQuest) -> bool {
        if !self.is_running() {
            return false;
        }

        self.side_quests.send(quest).is_ok()
    }

    /// Waits for the driver task to return.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(contest_id = %self.contest_id, instance_id = %self.instance_id, error = %err, "score engine task failed");
        }
    }
}

struct SubscriptionGuard {
    broker: Arc<dyn EventBroker>,
    subscription_id: SubscriptionId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.subscription_id);
    }
}

impl EngineDriver {
    /// Driver for `contest_id`; nothing runs until [`EngineDriver::run`].
    pub fn new(
        contest_id: ContestId,
        instance_id: ScoreEngineInstanceId,
        broker: Arc<dyn EventBroker>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            contest_id,
            instance_id,
            broker,
            config,
        }
    }

    /// Spawns the driver task and returns once it has subscribed.
    pub async fn run(self, cancel: CancellationToken) -> (DriverHandle, EngineInstaller) {
        let contest_id = self.contest_id;
        let instance_id = self.instance_id;

        let (subscribed_tx, subscribed_rx) = oneshot::channel::<()>();
        let (install_tx, install_rx) = oneshot::channel::<Box<dyn ScoreEngine>>();
        let (side_tx, side_rx) = mpsc::unbounded_channel::<SideQuest>();
        let running = Arc::new(AtomicBool::new(false));

        let span = info_span!("score_engine", contest_id = %contest_id, instance_id = %instance_id);
        let task_running = Arc::clone(&running);
        let broker = Arc::clone(&self.broker);

        let task = tokio::spawn(
            async move {
                let outcome = AssertUnwindSafe(self.drive(
                    cancel,
                    subscribed_tx,
                    install_rx,
                    side_rx,
                    Arc::clone(&task_running),
                ))
                .catch_unwind()
                .await;

                task_running.store(false, Ordering::SeqCst);

                if let Err(panic) = outcome {
                    error!(error = %panic_message(&*panic), "score engine panicked");
                }

                broker.dispatch(contest_id, Event::ScoreEngineStopped(ScoreEngineStopped { instance_id }));
                info!("score engine shutting down");
            }
            .instrument(span),
        );

        if subscribed_rx.await.is_err() {
            warn!(contest_id = %contest_id, instance_id = %instance_id, "score engine exited before subscribing");
        }

        (
            DriverHandle {
                contest_id,
                instance_id,
                running,
                side_quests: side_tx,
                task,
            },
            EngineInstaller { tx: install_tx },
        )
    }

    async fn drive(
        self,
        cancel: CancellationToken,
        subscribed_tx: oneshot::Sender<()>,
        mut install_rx: oneshot::Receiver<Box<dyn ScoreEngine>>,
        mut side_rx: mpsc::UnboundedReceiver<SideQuest>,
        running: Arc<AtomicBool>,
    ) {
        let filter = EventFilter::new(self.contest_id, ContenderId::WILDCARD, ENGINE_EVENT_TYPES);
        let (subscription_id, subscription) = self.broker.subscribe(filter, 0);
        let _guard = SubscriptionGuard {
            broker: Arc::clone(&self.broker),
            subscription_id,
        };
        info!(subscription_id = %subscription_id, "score engine subscribed");

        let _ = subscribed_tx.send(());

        self.broker.dispatch(
            self.contest_id,
            Event::ScoreEngineStarted(ScoreEngineStarted {
                instance_id: self.instance_id,
            }),
        );

        let mut events = subscription.events(cancel.clone());
        let mut pending: Vec<EventEnvelope> = Vec::new();

        let mut engine = loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                installed = &mut install_rx => match installed {
                    Ok(engine) => break engine,
                    Err(_) => {
                        warn!("engine installer dropped before installing");
                        return;
                    }
                },
                event = events.next() => match event {
                    Some(event) => pending.push(event),
                    None => {
                        if !cancel.is_cancelled() {
                            warn!("subscription closed unexpectedly");
                        }
                        return;
                    }
                },
            }
        };

        engine.start();
        running.store(true, Ordering::SeqCst);

        if !pending.is_empty() {
            info!(count = pending.len(), "replaying pending events");
        }

        for event in pending.drain(..) {
            handle_event(engine.as_mut(), event);
        }

        let mut ticker = tokio::time::interval(self.config.publish_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Set after a tick that found nothing to publish: the next change goes
        // out immediately instead of waiting for the following tick.
        let mut publish_token = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => handle_event(engine.as_mut(), event),
                    None => {
                        if !cancel.is_cancelled() {
                            warn!(close_reason = ?subscription.close_reason(), "subscription closed unexpectedly");
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    publish_token = self.publish_updated_scores(engine.as_mut()) == 0;
                }
                Some(quest) = side_rx.recv() => quest(engine.as_mut()),
            }

            if publish_token && self.publish_updated_scores(engine.as_mut()) > 0 {
                publish_token = false;
            }
        }

        running.store(false, Ordering::SeqCst);
        self.publish_updated_scores(engine.as_mut());
        engine.stop();
    }

    /// Dispatches each dirty score, then the whole set as one batch.
    fn publish_updated_scores(&self, engine: &mut dyn ScoreEngine) -> usize {
        let scores = engine.get_dirty_scores();

        if scores.is_empty() {
            return 0;
        }

        for score in &scores {
            self.broker.dispatch(self.contest_id, Event::ContenderScoreUpdated(*score));
        }

        let count = scores.len();
        self.broker.dispatch(self.contest_id, Event::ContenderScoresUpdated(scores));
        debug!(count, "published updated scores");

        count
    }
}

fn handle_event(engine: &mut dyn ScoreEngine, event: EventEnvelope) {
    let name = event.name;

    if !engine.handle_event(event.data) {
        debug!(event = name, "discarding unsupported event");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        return (*msg).to_string();
    }

    if let Some(msg) = panic.downcast_ref::<String>() {
        return msg.clone();
    }

    "unknown panic".to_string()
}
