//! Scoring: rules, ranking and the event-driven engine.

/// Basic finalist ranker.
pub mod ranker;
/// Aggregate scoring rules.
pub mod rules;
/// Store-backed score engine.
pub mod scorer;
/// Engine, rules and ranker trait seams.
pub mod traits;

pub use ranker::BasicRanker;
pub use rules::HardestProblems;
pub use scorer::DefaultScoreEngine;
pub use traits::{Ranker, ScoreEngine, ScoringRules};
