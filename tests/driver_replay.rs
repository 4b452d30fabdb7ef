use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use boulderscore::{
    broker::{Broker, EventBroker, Subscription},
    config::ScoringConfig,
    engine::{BasicRanker, HardestProblems, Ranker, ScoreEngine, ScoringRules},
    event::{
        AscentDeregistered, AscentRegistered, ContenderDisqualified, ContenderEntered, ContenderReenteredFinals,
        ContenderRequalified, ContenderSwitchedClass, ContenderWithdrewFromFinals, Event, EventEnvelope, EventFilter,
        ProblemAdded, ProblemUpdated, names,
    },
    model::Score,
    runtime::EngineDriver,
    types::{CompClassId, ContenderId, ContestId, ProblemId, SubscriptionId},
};

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<&'static str>>>,
    dirty: Arc<Mutex<Vec<Score>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("lock").clone()
    }

    async fn wait_for_calls(&self, n: usize) -> Vec<&'static str> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let calls = self.calls();
                if calls.len() >= n {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("engine calls timed out")
    }
}

struct RecordingEngine {
    recorder: Recorder,
    stall_on_enter: Option<Duration>,
    panic_on_disqualify: bool,
}

impl RecordingEngine {
    fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            stall_on_enter: None,
            panic_on_disqualify: false,
        }
    }

    fn record(&self, call: &'static str) {
        self.recorder.calls.lock().expect("lock").push(call);
    }
}

impl ScoreEngine for RecordingEngine {
    fn start(&mut self) {
        self.record("start");
    }

    fn stop(&mut self) {
        self.record("stop");
    }

    fn replace_scoring_rules(&mut self, _rules: Box<dyn ScoringRules>) {
        self.record("replace_scoring_rules");
    }

    fn replace_ranker(&mut self, _ranker: Box<dyn Ranker>) {
        self.record("replace_ranker");
    }

    fn handle_contender_entered(&mut self, _event: ContenderEntered) {
        self.record("contender_entered");
        if let Some(stall) = self.stall_on_enter {
            std::thread::sleep(stall);
        }
    }

    fn handle_contender_switched_class(&mut self, _event: ContenderSwitchedClass) {
        self.record("contender_switched_class");
    }

    fn handle_contender_withdrew_from_finals(&mut self, _event: ContenderWithdrewFromFinals) {
        self.record("contender_withdrew_from_finals");
    }

    fn handle_contender_reentered_finals(&mut self, _event: ContenderReenteredFinals) {
        self.record("contender_reentered_finals");
    }

    fn handle_contender_disqualified(&mut self, _event: ContenderDisqualified) {
        self.record("contender_disqualified");
        if self.panic_on_disqualify {
            panic!("engine blew up");
        }
    }

    fn handle_contender_requalified(&mut self, _event: ContenderRequalified) {
        self.record("contender_requalified");
    }

    fn handle_ascent_registered(&mut self, _event: AscentRegistered) {
        self.record("ascent_registered");
    }

    fn handle_ascent_deregistered(&mut self, _event: AscentDeregistered) {
        self.record("ascent_deregistered");
    }

    fn handle_problem_added(&mut self, _event: ProblemAdded) {
        self.record("problem_added");
    }

    fn handle_problem_updated(&mut self, _event: ProblemUpdated) {
        self.record("problem_updated");
    }

    fn get_dirty_scores(&mut self) -> Vec<Score> {
        std::mem::take(&mut *self.recorder.dirty.lock().expect("lock"))
    }
}

fn entered(contender: i32) -> Event {
    Event::ContenderEntered(ContenderEntered {
        contender_id: ContenderId(contender),
        comp_class_id: CompClassId(1),
    })
}

fn score(contender: i32, points: i32) -> Score {
    Score {
        timestamp: Utc::now(),
        contender_id: ContenderId(contender),
        score: points,
        placement: 1,
        rank_order: 0,
        finalist: false,
    }
}

async fn next(sub: &Subscription) -> EventEnvelope {
    tokio::time::timeout(Duration::from_secs(2), sub.await_event(&CancellationToken::new()))
        .await
        .expect("event timed out")
        .expect("event")
}

fn watch(broker: &Broker, event_types: &[&str]) -> Arc<Subscription> {
    let filter = EventFilter::new(ContestId(1), ContenderId::WILDCARD, event_types.iter().copied());
    broker.subscribe(filter, 0).1
}

#[tokio::test]
async fn pending_events_replay_in_order_after_start() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), ScoringConfig::default());
    let (handle, installer) = driver.run(cancel.clone()).await;

    broker.dispatch(
        ContestId(1),
        Event::AscentRegistered(AscentRegistered {
            contender_id: ContenderId(1),
            problem_id: ProblemId(1),
            top: true,
            attempts_top: 1,
            zone: true,
            attempts_zone: 1,
        }),
    );
    broker.dispatch(
        ContestId(1),
        Event::AscentDeregistered(AscentDeregistered {
            contender_id: ContenderId(1),
            problem_id: ProblemId(1),
        }),
    );
    broker.dispatch(ContestId(1), entered(1));
    // Other contests never reach this driver.
    broker.dispatch(ContestId(2), entered(2));

    assert!(!handle.is_running());
    assert!(!handle.replace_ranker(Box::new(BasicRanker::new(3))));

    installer.install(Box::new(RecordingEngine::new(&recorder))).expect("install");

    let calls = recorder.wait_for_calls(4).await;
    assert_eq!(
        calls,
        vec!["start", "ascent_registered", "ascent_deregistered", "contender_entered"]
    );
    assert!(handle.is_running());

    cancel.cancel();
    handle.join().await;
    assert_eq!(recorder.calls().last(), Some(&"stop"));
}

#[tokio::test]
async fn publishes_individual_scores_before_the_batch() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();
    let scores = watch(&broker, &[names::CONTENDER_SCORE_UPDATED, names::CONTENDER_SCORES_UPDATED]);

    let config = ScoringConfig {
        publish_interval: Duration::from_millis(10),
        ..ScoringConfig::default()
    };
    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), config);
    let (handle, installer) = driver.run(cancel.clone()).await;
    installer.install(Box::new(RecordingEngine::new(&recorder))).expect("install");
    recorder.wait_for_calls(1).await;

    recorder.dirty.lock().expect("lock").extend([score(1, 100), score(2, 50)]);

    let first = next(&scores).await;
    let second = next(&scores).await;
    let batch = next(&scores).await;

    assert_eq!(first.name, names::CONTENDER_SCORE_UPDATED);
    assert_eq!(second.name, names::CONTENDER_SCORE_UPDATED);
    assert_eq!(batch.name, names::CONTENDER_SCORES_UPDATED);

    let mut individual: Vec<ContenderId> = [first, second]
        .iter()
        .map(|envelope| envelope.data.contender_id())
        .collect();
    individual.sort();
    assert_eq!(individual, vec![ContenderId(1), ContenderId(2)]);

    match batch.data {
        Event::ContenderScoresUpdated(list) => assert_eq!(list.len(), 2),
        other => panic!("unexpected batch payload {other:?}"),
    }

    // Nothing dirty: nothing published.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scores.is_empty());

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn final_publish_on_cancel() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();
    let scores = watch(&broker, &[names::CONTENDER_SCORE_UPDATED]);

    let config = ScoringConfig {
        publish_interval: Duration::from_secs(3600),
        ..ScoringConfig::default()
    };
    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), config);
    let (handle, installer) = driver.run(cancel.clone()).await;
    installer.install(Box::new(RecordingEngine::new(&recorder))).expect("install");
    recorder.wait_for_calls(1).await;

    // Let the immediate first tick pass so the score waits for shutdown.
    tokio::time::sleep(Duration::from_millis(20)).await;
    recorder.dirty.lock().expect("lock").push(score(7, 10));

    cancel.cancel();
    handle.join().await;

    let envelope = next(&scores).await;
    assert_eq!(envelope.data.contender_id(), ContenderId(7));
}

#[tokio::test]
async fn side_quests_run_only_while_running() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), ScoringConfig::default());
    let (handle, installer) = driver.run(cancel.clone()).await;

    assert!(!handle.replace_scoring_rules(Box::new(HardestProblems::new(1))));

    installer.install(Box::new(RecordingEngine::new(&recorder))).expect("install");
    recorder.wait_for_calls(1).await;

    assert!(handle.replace_scoring_rules(Box::new(HardestProblems::new(1))));
    assert!(handle.replace_ranker(Box::new(BasicRanker::new(2))));

    let calls = recorder.wait_for_calls(3).await;
    assert_eq!(calls, vec!["start", "replace_scoring_rules", "replace_ranker"]);

    cancel.cancel();
    handle.join().await;
    assert_eq!(recorder.calls().last(), Some(&"stop"));
}

#[tokio::test]
async fn lifecycle_events_and_unsubscribe() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let lifecycle = watch(&broker, &[names::SCORE_ENGINE_STARTED, names::SCORE_ENGINE_STOPPED]);
    let instance_id = Uuid::new_v4();

    let driver = EngineDriver::new(ContestId(1), instance_id, broker.clone(), ScoringConfig::default());
    let (handle, _installer) = driver.run(cancel.clone()).await;
    assert_eq!(broker.subscription_count(), 2);

    let started = next(&lifecycle).await;
    assert_eq!(started.name, names::SCORE_ENGINE_STARTED);
    assert_eq!(handle.instance_id(), instance_id);

    cancel.cancel();
    handle.join().await;

    let stopped = next(&lifecycle).await;
    match stopped.data {
        Event::ScoreEngineStopped(ev) => assert_eq!(ev.instance_id, instance_id),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(broker.subscription_count(), 1);
}

#[tokio::test]
async fn dropped_installer_ends_the_driver() {
    let broker = Arc::new(Broker::new());
    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), ScoringConfig::default());
    let (handle, installer) = driver.run(CancellationToken::new()).await;

    drop(installer);

    tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("driver did not exit");
    assert_eq!(broker.subscription_count(), 0);
}

/// Broker that bounds every subscription to `capacity`, whatever the
/// subscriber asked for.
struct CappedBroker {
    inner: Broker,
    capacity: usize,
}

impl EventBroker for CappedBroker {
    fn subscribe(&self, filter: EventFilter, _buffer_capacity: usize) -> (SubscriptionId, Arc<Subscription>) {
        self.inner.subscribe(filter, self.capacity)
    }

    fn unsubscribe(&self, subscription_id: SubscriptionId) {
        self.inner.unsubscribe(subscription_id);
    }

    fn dispatch(&self, contest_id: ContestId, event: Event) {
        self.inner.dispatch(contest_id, event);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overflowing_subscription_shuts_the_driver_down() {
    let broker = Arc::new(CappedBroker {
        inner: Broker::new(),
        capacity: 1,
    });
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), ScoringConfig::default());
    let (handle, installer) = driver.run(cancel.clone()).await;

    let mut engine = RecordingEngine::new(&recorder);
    engine.stall_on_enter = Some(Duration::from_millis(200));
    installer.install(Box::new(engine)).expect("install");
    recorder.wait_for_calls(1).await;

    broker.dispatch(ContestId(1), entered(1));
    recorder.wait_for_calls(2).await;
    for contender in 2..=5 {
        broker.dispatch(ContestId(1), entered(contender));
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("driver kept running");

    assert!(!handle.is_running());
    assert!(!cancel.is_cancelled());
    assert_eq!(recorder.calls().last(), Some(&"stop"));
    handle.join().await;
    assert_eq!(broker.inner.subscription_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bounded_default_buffer_does_not_apply_to_the_driver() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();

    let config = ScoringConfig {
        subscription_buffer: 1,
        ..ScoringConfig::default()
    };
    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), config);
    let (handle, installer) = driver.run(cancel.clone()).await;

    let mut engine = RecordingEngine::new(&recorder);
    engine.stall_on_enter = Some(Duration::from_millis(50));
    installer.install(Box::new(engine)).expect("install");
    recorder.wait_for_calls(1).await;

    broker.dispatch(ContestId(1), entered(1));
    recorder.wait_for_calls(2).await;
    for contender in 2..=5 {
        broker.dispatch(ContestId(1), entered(contender));
    }

    let calls = recorder.wait_for_calls(6).await;
    assert_eq!(calls.iter().filter(|c| **c == "contender_entered").count(), 5);
    assert!(handle.is_running());
    assert!(!handle.is_finished());

    cancel.cancel();
    handle.join().await;
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn panicking_engine_is_contained() {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();
    let recorder = Recorder::default();
    let lifecycle = watch(&broker, &[names::SCORE_ENGINE_STOPPED]);

    let driver = EngineDriver::new(ContestId(1), Uuid::new_v4(), broker.clone(), ScoringConfig::default());
    let (handle, installer) = driver.run(cancel.clone()).await;

    let mut engine = RecordingEngine::new(&recorder);
    engine.panic_on_disqualify = true;
    installer.install(Box::new(engine)).expect("install");
    recorder.wait_for_calls(1).await;

    broker.dispatch(
        ContestId(1),
        Event::ContenderDisqualified(ContenderDisqualified {
            contender_id: ContenderId(1),
        }),
    );

    let stopped = next(&lifecycle).await;
    assert_eq!(stopped.name, names::SCORE_ENGINE_STOPPED);

    handle.join().await;
    assert_eq!(broker.subscription_count(), 1);

    // The broker keeps serving other subscribers.
    broker.dispatch(ContestId(1), entered(1));
    assert!(lifecycle.is_empty());
}
