//! Contest-scoped domain events, envelopes and subscription filters.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::{
    model::Score,
    types::{CompClassId, ContenderId, ContestId, ProblemId, ScoreEngineInstanceId},
};

/// Stable wire names of every event variant.
pub mod names {
    /// [`super::Event::ContenderEntered`].
    pub const CONTENDER_ENTERED: &str = "CONTENDER_ENTERED";
    /// [`super::Event::ContenderSwitchedClass`].
    pub const CONTENDER_SWITCHED_CLASS: &str = "CONTENDER_SWITCHED_CLASS";
    /// [`super::Event::ContenderWithdrewFromFinals`].
    pub const CONTENDER_WITHDREW_FROM_FINALS: &str = "CONTENDER_WITHDREW_FROM_FINALS";
    /// [`super::Event::ContenderReenteredFinals`].
    pub const CONTENDER_REENTERED_FINALS: &str = "CONTENDER_REENTERED_FINALS";
    /// [`super::Event::ContenderDisqualified`].
    pub const CONTENDER_DISQUALIFIED: &str = "CONTENDER_DISQUALIFIED";
    /// [`super::Event::ContenderRequalified`].
    pub const CONTENDER_REQUALIFIED: &str = "CONTENDER_REQUALIFIED";
    /// [`super::Event::AscentRegistered`].
    pub const ASCENT_REGISTERED: &str = "ASCENT_REGISTERED";
    /// [`super::Event::AscentDeregistered`].
    pub const ASCENT_DEREGISTERED: &str = "ASCENT_DEREGISTERED";
    /// [`super::Event::ProblemAdded`].
    pub const PROBLEM_ADDED: &str = "PROBLEM_ADDED";
    /// [`super::Event::ProblemUpdated`].
    pub const PROBLEM_UPDATED: &str = "PROBLEM_UPDATED";
    /// [`super::Event::ProblemDeleted`].
    pub const PROBLEM_DELETED: &str = "PROBLEM_DELETED";
    /// [`super::Event::ContenderPublicInfoUpdated`].
    pub const CONTENDER_PUBLIC_INFO_UPDATED: &str = "CONTENDER_PUBLIC_INFO_UPDATED";
    /// [`super::Event::ContenderScoreUpdated`].
    pub const CONTENDER_SCORE_UPDATED: &str = "CONTENDER_SCORE_UPDATED";
    /// [`super::Event::ContenderScoresUpdated`].
    pub const CONTENDER_SCORES_UPDATED: &str = "[]CONTENDER_SCORE_UPDATED";
    /// [`super::Event::ScoreEngineStarted`].
    pub const SCORE_ENGINE_STARTED: &str = "SCORE_ENGINE_STARTED";
    /// [`super::Event::ScoreEngineStopped`].
    pub const SCORE_ENGINE_STOPPED: &str = "SCORE_ENGINE_STOPPED";
    /// [`super::Event::Unknown`].
    pub const UNKNOWN: &str = "UNKNOWN";
}

/// A contender registered for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderEntered {
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// Class entered.
    pub comp_class_id: CompClassId,
}

/// A contender moved to another class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderSwitchedClass {
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// New class.
    pub comp_class_id: CompClassId,
}

/// A contender opted out of the finals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderWithdrewFromFinals {
    /// Contender identifier.
    pub contender_id: ContenderId,
}

/// A contender opted back into the finals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderReenteredFinals {
    /// Contender identifier.
    pub contender_id: ContenderId,
}

/// A contender was disqualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderDisqualified {
    /// Contender identifier.
    pub contender_id: ContenderId,
}

/// A disqualification was lifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderRequalified {
    /// Contender identifier.
    pub contender_id: ContenderId,
}

/// A tick was registered or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AscentRegistered {
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// Problem identifier.
    pub problem_id: ProblemId,
    /// Top reached.
    pub top: bool,
    /// Attempts needed for the top.
    pub attempts_top: u32,
    /// Zone reached.
    pub zone: bool,
    /// Attempts needed for the zone.
    pub attempts_zone: u32,
}

/// A tick was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AscentDeregistered {
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// Problem identifier.
    pub problem_id: ProblemId,
}

/// A problem was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemAdded {
    /// Problem identifier.
    pub problem_id: ProblemId,
    /// Points for a top.
    pub points_top: i32,
    /// Points for a zone.
    pub points_zone: i32,
    /// Flash bonus.
    pub flash_bonus: i32,
}

/// A problem's point values changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemUpdated {
    /// Problem identifier.
    pub problem_id: ProblemId,
    /// Points for a top.
    pub points_top: i32,
    /// Points for a zone.
    pub points_zone: i32,
    /// Flash bonus.
    pub flash_bonus: i32,
}

/// A problem was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDeleted {
    /// Problem identifier.
    pub problem_id: ProblemId,
}

/// Public profile of a contender changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContenderPublicInfoUpdated {
    /// Contender identifier.
    pub contender_id: ContenderId,
    /// Current class.
    pub comp_class_id: CompClassId,
    /// Display name.
    pub public_name: String,
    /// Club, if any.
    pub club_name: Option<String>,
    /// Withdrawn from finals.
    pub withdrawn_from_finals: bool,
    /// Disqualified.
    pub disqualified: bool,
}

/// A score engine instance came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEngineStarted {
    /// Engine instance.
    pub instance_id: ScoreEngineInstanceId,
}

/// A score engine instance went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEngineStopped {
    /// Engine instance.
    pub instance_id: ScoreEngineInstanceId,
}

/// Closed set of events carried by the broker.
///
/// Serializes as the bare payload; the variant travels separately as the
/// envelope name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    /// See [`ContenderEntered`].
    ContenderEntered(ContenderEntered),
    /// See [`ContenderSwitchedClass`].
    ContenderSwitchedClass(ContenderSwitchedClass),
    /// See [`ContenderWithdrewFromFinals`].
    ContenderWithdrewFromFinals(ContenderWithdrewFromFinals),
    /// See [`ContenderReenteredFinals`].
    ContenderReenteredFinals(ContenderReenteredFinals),
    /// See [`ContenderDisqualified`].
    ContenderDisqualified(ContenderDisqualified),
    /// See [`ContenderRequalified`].
    ContenderRequalified(ContenderRequalified),
    /// See [`AscentRegistered`].
    AscentRegistered(AscentRegistered),
    /// See [`AscentDeregistered`].
    AscentDeregistered(AscentDeregistered),
    /// See [`ProblemAdded`].
    ProblemAdded(ProblemAdded),
    /// See [`ProblemUpdated`].
    ProblemUpdated(ProblemUpdated),
    /// See [`ProblemDeleted`].
    ProblemDeleted(ProblemDeleted),
    /// See [`ContenderPublicInfoUpdated`].
    ContenderPublicInfoUpdated(ContenderPublicInfoUpdated),
    /// One recomputed standing.
    ContenderScoreUpdated(Score),
    /// All standings changed in one publish pass.
    ContenderScoresUpdated(Vec<Score>),
    /// See [`ScoreEngineStarted`].
    ScoreEngineStarted(ScoreEngineStarted),
    /// See [`ScoreEngineStopped`].
    ScoreEngineStopped(ScoreEngineStopped),
    /// Opaque payload from a producer outside the closed set.
    Unknown(serde_json::Value),
}

impl Event {
    /// Wire name derived from the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ContenderEntered(_) => names::CONTENDER_ENTERED,
            Event::ContenderSwitchedClass(_) => names::CONTENDER_SWITCHED_CLASS,
            Event::ContenderWithdrewFromFinals(_) => names::CONTENDER_WITHDREW_FROM_FINALS,
            Event::ContenderReenteredFinals(_) => names::CONTENDER_REENTERED_FINALS,
            Event::ContenderDisqualified(_) => names::CONTENDER_DISQUALIFIED,
            Event::ContenderRequalified(_) => names::CONTENDER_REQUALIFIED,
            Event::AscentRegistered(_) => names::ASCENT_REGISTERED,
            Event::AscentDeregistered(_) => names::ASCENT_DEREGISTERED,
            Event::ProblemAdded(_) => names::PROBLEM_ADDED,
            Event::ProblemUpdated(_) => names::PROBLEM_UPDATED,
            Event::ProblemDeleted(_) => names::PROBLEM_DELETED,
            Event::ContenderPublicInfoUpdated(_) => names::CONTENDER_PUBLIC_INFO_UPDATED,
            Event::ContenderScoreUpdated(_) => names::CONTENDER_SCORE_UPDATED,
            Event::ContenderScoresUpdated(_) => names::CONTENDER_SCORES_UPDATED,
            Event::ScoreEngineStarted(_) => names::SCORE_ENGINE_STARTED,
            Event::ScoreEngineStopped(_) => names::SCORE_ENGINE_STOPPED,
            Event::Unknown(_) => names::UNKNOWN,
        }
    }

    /// Contender the event is about, or the wildcard value.
    pub fn contender_id(&self) -> ContenderId {
        match self {
            Event::ContenderEntered(ev) => ev.contender_id,
            Event::ContenderSwitchedClass(ev) => ev.contender_id,
            Event::ContenderWithdrewFromFinals(ev) => ev.contender_id,
            Event::ContenderReenteredFinals(ev) => ev.contender_id,
            Event::ContenderDisqualified(ev) => ev.contender_id,
            Event::ContenderRequalified(ev) => ev.contender_id,
            Event::AscentRegistered(ev) => ev.contender_id,
            Event::AscentDeregistered(ev) => ev.contender_id,
            Event::ContenderPublicInfoUpdated(ev) => ev.contender_id,
            Event::ContenderScoreUpdated(score) => score.contender_id,
            _ => ContenderId::WILDCARD,
        }
    }
}

/// Event as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    /// Wire name of `data`.
    pub name: &'static str,
    /// Payload.
    pub data: Event,
}

impl From<Event> for EventEnvelope {
    fn from(data: Event) -> Self {
        Self {
            name: data.name(),
            data,
        }
    }
}

/// Selects which dispatched events reach a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Contest to match; wildcard matches every contest.
    pub contest_id: ContestId,
    /// Contender to match; wildcard matches every contender.
    pub contender_id: ContenderId,
    /// Accepted event names; empty accepts all.
    pub event_types: HashSet<String>,
}

impl EventFilter {
    /// Builds a filter from ids and a list of accepted event names.
    pub fn new<I, S>(contest_id: ContestId, contender_id: ContenderId, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contest_id,
            contender_id,
            event_types: event_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Applies the wildcard and membership rules.
    pub fn matches(&self, contest_id: ContestId, contender_id: ContenderId, event_type: &str) -> bool {
        if !self.contest_id.is_wildcard() && self.contest_id != contest_id {
            return false;
        }

        if !self.contender_id.is_wildcard() && self.contender_id != contender_id {
            return false;
        }

        self.event_types.is_empty() || self.event_types.contains(event_type)
    }
}
