//! Process-wide cache of the latest score per contender, flushed to the
//! repository in the background.

use std::sync::Arc;

use futures_util::StreamExt;
use hashbrown::HashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    broker::EventBroker,
    config::ScoringConfig,
    event::{Event, EventFilter, names},
    model::Score,
    persist::{PersistResult, Repository},
    types::{ContenderId, ContestId},
};

/// Score lookup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeeperError {
    /// No unsaved score is cached for the contender.
    #[error("score not found")]
    NotFound,
}

#[derive(Debug, Default)]
struct Shared {
    scores: RwLock<HashMap<ContenderId, Score>>,
    persist_requested: Notify,
}

/// Cloneable handle; every clone sees the same scores.
///
/// A score stays in memory until it has been stored. Successfully stored
/// scores, and scores of contenders the repository no longer knows, are
/// evicted; any other failure keeps the score for the next flush.
#[derive(Debug, Clone, Default)]
pub struct ScoreKeeper {
    shared: Arc<Shared>,
}

impl ScoreKeeper {
    /// Empty keeper; call [`ScoreKeeper::spawn`] to start it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest cached score of a contender.
    pub fn get_score(&self, contender_id: ContenderId) -> Result<Score, KeeperError> {
        self.shared
            .scores
            .read()
            .get(&contender_id)
            .copied()
            .ok_or(KeeperError::NotFound)
    }

    /// Number of scores waiting to be stored.
    pub fn len(&self) -> usize {
        self.shared.scores.read().len()
    }

    /// Returns true when every cached score has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asks the keeper task to flush. Never blocks; requests made while a
    /// flush is running coalesce into one more flush.
    pub fn request_persist(&self) {
        self.shared.persist_requested.notify_one();
    }

    /// Subscribes to score updates of every contest and spawns the keeper
    /// task. The subscription is live when this returns.
    pub fn spawn(
        &self,
        broker: Arc<dyn EventBroker>,
        repo: Arc<dyn Repository>,
        config: &ScoringConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let filter = EventFilter::new(ContestId::WILDCARD, ContenderId::WILDCARD, [names::CONTENDER_SCORE_UPDATED]);
        let (subscription_id, subscription) = broker.subscribe(filter, 0);
        info!(subscription_id = %subscription_id, "score keeper subscribed");

        let shared = Arc::clone(&self.shared);
        let period = config.persist_interval.max(std::time::Duration::from_millis(1));

        tokio::spawn(async move {
            let mut events = subscription.events(cancel.clone());
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => match event {
                        Some(envelope) => {
                            if let Event::ContenderScoreUpdated(score) = envelope.data {
                                shared.scores.write().insert(score.contender_id, score);
                            }
                        }
                        None => {
                            if !cancel.is_cancelled() {
                                warn!(close_reason = ?subscription.close_reason(), "score keeper subscription closed unexpectedly");
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => persist_scores(&shared, &repo).await,
                    _ = shared.persist_requested.notified() => persist_scores(&shared, &repo).await,
                }
            }

            broker.unsubscribe(subscription_id);
            persist_scores(&shared, &repo).await;
            info!("score keeper shutting down");
        })
    }
}

async fn persist_scores(shared: &Arc<Shared>, repo: &Arc<dyn Repository>) {
    let snapshot: Vec<Score> = shared.scores.read().values().copied().collect();
    if snapshot.is_empty() {
        return;
    }

    let repo = Arc::clone(repo);
    let outcome = tokio::task::spawn_blocking(move || {
        snapshot
            .into_iter()
            .map(|score| {
                let res = repo.store_score(&score);
                (score, res)
            })
            .collect::<Vec<(Score, PersistResult<()>)>>()
    })
    .await;

    let results = match outcome {
        Ok(results) => results,
        Err(err) => {
            error!(error = %err, "score persistence task failed");
            return;
        }
    };

    let (mut stored, mut dropped, mut failed) = (0usize, 0usize, 0usize);
    let mut scores = shared.scores.write();

    for (score, res) in results {
        match res {
            Ok(()) => stored += 1,
            Err(err) if err.is_not_found() => {
                debug!(contender_id = %score.contender_id, "dropping score of unknown contender");
                dropped += 1;
            }
            Err(err) => {
                warn!(contender_id = %score.contender_id, error = %err, "failed to persist score");
                failed += 1;
                continue;
            }
        }

        // A newer score that arrived during the flush stays for the next one.
        if scores.get(&score.contender_id) == Some(&score) {
            scores.remove(&score.contender_id);
        }
    }

    debug!(stored, dropped, failed, "persisted scores");
}
