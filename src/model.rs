//! Contest domain records shared by the engine, the keeper and the repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CompClassId, ContenderId, ContestId, OrganizerId, ProblemId};

/// Contest row as returned by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    /// Contest identifier.
    pub id: ContestId,
    /// Owning organizer.
    pub organizer_id: OrganizerId,
    /// Number of best ticks that count towards a contender's score; 0 counts all.
    pub qualifying_problems: u32,
    /// Number of finalist slots per class.
    pub finalists: u32,
    /// Start of the contest, if scheduled.
    pub time_begin: Option<DateTime<Utc>>,
    /// End of the contest, if scheduled.
    pub time_end: Option<DateTime<Utc>>,
}

/// A competitor as tracked by the score engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contender {
    /// Contender identifier.
    pub id: ContenderId,
    /// Class the contender competes in.
    pub comp_class_id: CompClassId,
    /// Disqualified contenders always score 0.
    pub disqualified: bool,
    /// Withdrawn contenders are never finalists.
    pub withdrawn_from_finals: bool,
    /// Current aggregate score.
    pub score: i32,
}

/// Point values of one problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Problem identifier.
    pub id: ProblemId,
    /// Points for a top.
    pub points_top: i32,
    /// Points for a zone when the top was not reached.
    pub points_zone: i32,
    /// Bonus added to a top reached on the first attempt.
    pub flash_bonus: i32,
}

/// A contender's attempts on one problem.
///
/// At most one tick exists per (contender, problem). `top` implies `zone`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Problem the tick belongs to.
    pub problem_id: ProblemId,
    /// Top reached.
    pub top: bool,
    /// Attempts needed for the top.
    pub attempts_top: u32,
    /// Zone reached.
    pub zone: bool,
    /// Attempts needed for the zone.
    pub attempts_zone: u32,
    /// Points computed against the problem.
    pub points: i32,
}

impl Tick {
    /// Returns true when the top was reached on the first attempt.
    pub fn is_flash(&self) -> bool {
        self.top && self.attempts_top == 1
    }

    /// Recomputes `points` against `problem`.
    pub fn score(&mut self, problem: &Problem) {
        self.points = 0;

        if self.zone {
            self.points = problem.points_zone;
        }

        if self.top {
            self.points = problem.points_top;
        }

        if self.is_flash() {
            self.points = self.points.saturating_add(problem.flash_bonus);
        }
    }
}

/// Tick row owned by a contender, as stored by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderTick {
    /// Owner of the tick.
    pub contender_id: ContenderId,
    /// Tick payload; `points` is recomputed by the engine.
    pub tick: Tick,
}

/// Derived standing of one contender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// Time of the ranking pass that produced this score.
    pub timestamp: DateTime<Utc>,
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// Aggregate score.
    pub score: i32,
    /// 1-based placement; ties share the value. Disqualified contenders get 0.
    pub placement: u32,
    /// 0-based dense position in the ranked list.
    pub rank_order: u32,
    /// Finalist flag.
    pub finalist: bool,
}

impl Score {
    /// Compares everything except the timestamp.
    pub fn same_standing(&self, other: &Score) -> bool {
        self.contender_id == other.contender_id
            && self.score == other.score
            && self.placement == other.placement
            && self.rank_order == other.rank_order
            && self.finalist == other.finalist
    }
}
