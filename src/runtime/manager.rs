//! Starts, refreshes and stops one engine driver per live contest.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use hashbrown::HashMap;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    broker::EventBroker,
    config::ScoringConfig,
    engine::{BasicRanker, DefaultScoreEngine, HardestProblems},
    model::Contest,
    persist::{PersistError, PersistResult, Repository},
    types::{ContestId, ScoreEngineInstanceId},
};

use super::{
    driver::{DriverError, DriverHandle, EngineDriver},
    hydrator::hydrate_store,
};

/// Manager and control API errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A repository call failed.
    #[error("repository failure during {operation}: {source}")]
    RepositoryFailure {
        /// Repository operation that failed.
        operation: &'static str,
        /// Underlying repository error.
        #[source]
        source: PersistError,
    },
    /// Engine installation failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// The manager loop is gone.
    #[error("manager channel closed")]
    ChannelClosed,
    /// The manager is shutting down.
    #[error("cancelled")]
    Cancelled,
}

enum Command {
    List {
        contest_id: ContestId,
        resp: oneshot::Sender<Vec<ScoreEngineInstanceId>>,
    },
    Start {
        contest_id: ContestId,
        resp: oneshot::Sender<Result<ScoreEngineInstanceId, ManagerError>>,
    },
    Stop {
        instance_id: ScoreEngineInstanceId,
        resp: oneshot::Sender<bool>,
    },
}

/// Cloneable client of a running [`ScoreEngineManager`].
#[derive(Clone)]
pub struct ManagerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ManagerHandle {
    /// Instances currently running for `contest_id`.
    pub async fn list_score_engines(&self, contest_id: ContestId) -> Result<Vec<ScoreEngineInstanceId>, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::List { contest_id, resp: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }

    /// Starts an engine for `contest_id`, or returns the running instance.
    pub async fn start_score_engine(&self, contest_id: ContestId) -> Result<ScoreEngineInstanceId, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { contest_id, resp: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)?
    }

    /// Stops an instance and waits for its driver to exit. Returns false for
    /// unknown instances.
    pub async fn stop_score_engine(&self, instance_id: ScoreEngineInstanceId) -> Result<bool, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stop { instance_id, resp: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }
}

struct EngineHandler {
    driver: DriverHandle,
    cancel: CancellationToken,
    qualifying_problems: u32,
    finalists: u32,
}

/// Starts, refreshes and stops one engine driver per running contest.
pub struct ScoreEngineManager {
    repo: Arc<dyn Repository>,
    broker: Arc<dyn EventBroker>,
    config: ScoringConfig,
    handlers: HashMap<ContestId, EngineHandler>,
}

impl ScoreEngineManager {
    /// Manager reading contests from `repo` and wiring drivers to `broker`.
    pub fn new(repo: Arc<dyn Repository>, broker: Arc<dyn EventBroker>, config: ScoringConfig) -> Self {
        Self {
            repo,
            broker,
            config,
            handlers: HashMap::new(),
        }
    }

    /// Spawns the manager loop. The first poll runs immediately.
    ///
    /// Cancelling `cancel` stops every driver and ends the loop once they
    /// have all exited.
    pub fn spawn(self, cancel: CancellationToken) -> (ManagerHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(64);
        let task = tokio::spawn(self.run(cancel, cmd_rx));
        (ManagerHandle { cmd_tx }, task)
    }

    async fn run(mut self, cancel: CancellationToken, mut cmd_rx: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval.max(std::time::Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.run_periodic_check(&cancel).await {
                        error!(error = %err, "score engine manager failed to complete periodic check");
                    }
                }
                Some(cmd) = cmd_rx.recv() => self.handle_command(cmd, &cancel).await,
            }
        }

        info!(engines = self.handlers.len(), "score engine manager shutting down");

        for handler in self.handlers.values() {
            handler.cancel.cancel();
        }

        let handlers: Vec<EngineHandler> = self.handlers.drain().map(|(_, handler)| handler).collect();
        for handler in handlers {
            handler.driver.join().await;
        }
    }

    async fn handle_command(&mut self, cmd: Command, cancel: &CancellationToken) {
        match cmd {
            Command::List { contest_id, resp } => {
                let _ = resp.send(self.list_score_engines(contest_id));
            }
            Command::Start { contest_id, resp } => {
                let res = self.start_score_engine(contest_id, cancel).await;
                let _ = resp.send(res);
            }
            Command::Stop { instance_id, resp } => {
                let stopped = self.stop_score_engine(instance_id).await;
                let _ = resp.send(stopped);
            }
        }
    }

    fn list_score_engines(&self, contest_id: ContestId) -> Vec<ScoreEngineInstanceId> {
        self.handlers
            .get(&contest_id)
            .filter(|handler| !handler.driver.is_finished())
            .map(|handler| handler.driver.instance_id())
            .into_iter()
            .collect()
    }

    async fn stop_score_engine(&mut self, instance_id: ScoreEngineInstanceId) -> bool {
        let contest_id = self
            .handlers
            .iter()
            .find(|(_, handler)| handler.driver.instance_id() == instance_id)
            .map(|(contest_id, _)| *contest_id);

        let Some(handler) = contest_id.and_then(|id| self.handlers.remove(&id)) else {
            return false;
        };

        info!(contest_id = %handler.driver.contest_id(), instance_id = %instance_id, "stopping score engine");
        handler.cancel.cancel();
        handler.driver.join().await;

        true
    }

    async fn start_score_engine(
        &mut self,
        contest_id: ContestId,
        cancel: &CancellationToken,
    ) -> Result<ScoreEngineInstanceId, ManagerError> {
        self.reap_finished();

        if let Some(handler) = self.handlers.get(&contest_id) {
            return Ok(handler.driver.instance_id());
        }

        let contest = repo_call(&self.repo, "get_contest", move |repo| repo.get_contest(contest_id)).await?;
        self.start_engine_for(contest, cancel).await
    }

    async fn run_periodic_check(&mut self, cancel: &CancellationToken) -> Result<(), ManagerError> {
        self.reap_finished();

        let now = Utc::now();
        let window = TimeDelta::from_std(self.config.start_window).unwrap_or_else(|_| TimeDelta::hours(1));
        let (earliest, latest) = (now - window, now + window);

        let contests = repo_call(&self.repo, "get_contests_running_or_about_to_start", move |repo| {
            repo.get_contests_running_or_about_to_start(earliest, latest)
        })
        .await?;

        for contest in contests {
            if cancel.is_cancelled() {
                return Err(ManagerError::Cancelled);
            }

            if let Some(handler) = self.handlers.get_mut(&contest.id) {
                refresh_handler(handler, &contest);
                continue;
            }

            if let Err(err) = self.start_engine_for(contest.clone(), cancel).await {
                error!(contest_id = %contest.id, error = %err, "failed to start score engine");
            }
        }

        Ok(())
    }

    async fn start_engine_for(
        &mut self,
        contest: Contest,
        cancel: &CancellationToken,
    ) -> Result<ScoreEngineInstanceId, ManagerError> {
        let contest_id = contest.id;
        let instance_id = Uuid::new_v4();

        match contest.time_begin {
            Some(begin) if begin > Utc::now() => info!(
                contest_id = %contest_id,
                qualifying_problems = contest.qualifying_problems,
                finalists = contest.finalists,
                starting_in_secs = (begin - Utc::now()).num_seconds(),
                "spinning up score engine"
            ),
            _ => info!(
                contest_id = %contest_id,
                qualifying_problems = contest.qualifying_problems,
                finalists = contest.finalists,
                "spinning up score engine"
            ),
        }

        let child = cancel.child_token();
        let driver = EngineDriver::new(contest_id, instance_id, Arc::clone(&self.broker), self.config.clone());
        let (handle, installer) = driver.run(child.clone()).await;

        let started = std::time::Instant::now();
        let store = match repo_call(&self.repo, "hydrate", move |repo| hydrate_store(repo, contest_id)).await {
            Ok(store) => store,
            Err(err) => {
                child.cancel();
                handle.join().await;
                return Err(err);
            }
        };
        debug!(contest_id = %contest_id, elapsed_ms = started.elapsed().as_millis() as u64, "score engine store hydration complete");

        let engine = DefaultScoreEngine::new(
            contest_id,
            store,
            Box::new(HardestProblems::new(contest.qualifying_problems)),
            Box::new(BasicRanker::new(contest.finalists)),
        );

        if let Err(err) = installer.install(Box::new(engine)) {
            child.cancel();
            handle.join().await;
            return Err(err.into());
        }

        self.handlers.insert(
            contest_id,
            EngineHandler {
                driver: handle,
                cancel: child,
                qualifying_problems: contest.qualifying_problems,
                finalists: contest.finalists,
            },
        );

        info!(contest_id = %contest_id, instance_id = %instance_id, "score engine started");

        Ok(instance_id)
    }

    fn reap_finished(&mut self) {
        self.handlers.retain(|contest_id, handler| {
            if handler.driver.is_finished() {
                warn!(contest_id = %contest_id, instance_id = %handler.driver.instance_id(), "reaping exited score engine");
                return false;
            }
            true
        });
    }
}

fn refresh_handler(handler: &mut EngineHandler, contest: &Contest) {
    let instance_id = handler.driver.instance_id();

    if contest.qualifying_problems != handler.qualifying_problems
        && handler
            .driver
            .replace_scoring_rules(Box::new(HardestProblems::new(contest.qualifying_problems)))
    {
        info!(contest_id = %contest.id, instance_id = %instance_id, qualifying_problems = contest.qualifying_problems, "updating scoring rules");
        handler.qualifying_problems = contest.qualifying_problems;
    }

    if contest.finalists != handler.finalists
        && handler.driver.replace_ranker(Box::new(BasicRanker::new(contest.finalists)))
    {
        info!(contest_id = %contest.id, instance_id = %instance_id, finalists = contest.finalists, "updating ranker");
        handler.finalists = contest.finalists;
    }
}

async fn repo_call<T, F>(repo: &Arc<dyn Repository>, operation: &'static str, f: F) -> Result<T, ManagerError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Repository) -> PersistResult<T> + Send + 'static,
{
    let repo = Arc::clone(repo);

    tokio::task::spawn_blocking(move || f(repo.as_ref()))
        .await
        .map_err(|err| ManagerError::RepositoryFailure {
            operation,
            source: PersistError::Message(format!("repository task failed: {err}")),
        })?
        .map_err(|source| ManagerError::RepositoryFailure { operation, source })
}
