//! Repository contract consumed by the engine manager and the score keeper.
//!
//! Calls are blocking; async callers go through `spawn_blocking`.

/// SQLite implementation of [`Repository`].
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    model::{Contender, ContenderTick, Contest, Problem, Score},
    types::ContestId,
};

/// Repository errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,
    /// SQLite driver error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Serialization error.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

impl PersistError {
    /// Returns true for [`PersistError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::NotFound)
    }
}

/// Result alias for repository calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Read access to contest data plus score persistence.
pub trait Repository: Send + Sync + 'static {
    /// Contests whose schedule overlaps `[earliest, latest]`.
    fn get_contests_running_or_about_to_start(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> PersistResult<Vec<Contest>>;

    /// Fails with [`PersistError::NotFound`] for unknown ids.
    fn get_contest(&self, contest_id: ContestId) -> PersistResult<Contest>;
    /// Problems of a contest, ordered by id.
    fn get_problems_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<Problem>>;
    /// Every contender, including those without a class.
    fn get_contenders_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<Contender>>;
    /// Ticks with `points` left at 0.
    fn get_ticks_by_contest(&self, contest_id: ContestId) -> PersistResult<Vec<ContenderTick>>;

    /// Upserts `score`. Fails with [`PersistError::NotFound`] when the
    /// contender no longer exists.
    fn store_score(&self, score: &Score) -> PersistResult<()>;
}
