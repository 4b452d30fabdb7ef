//! In-memory projection of one running contest.

/// Committed-versus-dirty value tracking.
pub mod diffmap;
/// Contenders, problems, ticks and scores of one contest.
pub mod store;
