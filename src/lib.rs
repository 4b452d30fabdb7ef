//! Live scoring for climbing competitions.
//!
//! Domain events flow through an in-process [`broker::Broker`]. One engine
//! driver per running contest projects them into an in-memory store, ranks
//! each class and publishes changed scores back through the broker, where the
//! [`runtime::ScoreKeeper`] picks them up for reads and persistence.
//!
//! # Examples
//!
//! Scoring a contest in memory with [`engine::DefaultScoreEngine`]:
//! ```
//! use boulderscore::{
//!     core::store::EngineStore,
//!     engine::{BasicRanker, DefaultScoreEngine, HardestProblems, ScoreEngine},
//!     event::{AscentRegistered, ContenderEntered, ProblemAdded},
//!     types::{CompClassId, ContenderId, ContestId, ProblemId},
//! };
//!
//! let mut engine = DefaultScoreEngine::new(
//!     ContestId(1),
//!     EngineStore::new(),
//!     Box::new(HardestProblems::new(5)),
//!     Box::new(BasicRanker::new(3)),
//! );
//! engine.start();
//! engine.handle_problem_added(ProblemAdded {
//!     problem_id: ProblemId(1),
//!     points_top: 100,
//!     points_zone: 50,
//!     flash_bonus: 10,
//! });
//! engine.handle_contender_entered(ContenderEntered {
//!     contender_id: ContenderId(1),
//!     comp_class_id: CompClassId(1),
//! });
//! engine.handle_ascent_registered(AscentRegistered {
//!     contender_id: ContenderId(1),
//!     problem_id: ProblemId(1),
//!     top: true,
//!     attempts_top: 1,
//!     zone: true,
//!     attempts_zone: 1,
//! });
//!
//! let scores = engine.get_dirty_scores();
//! assert_eq!(scores[0].score, 110);
//! assert!(scores[0].finalist);
//! ```
//!
//! Running the manager and keeper against SQLite:
//! ```no_run
//! use std::sync::Arc;
//!
//! use boulderscore::{
//!     broker::Broker,
//!     config::ScoringConfig,
//!     persist::sqlite::SqliteRepository,
//!     runtime::{ScoreEngineManager, ScoreKeeper},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ScoringConfig::from_env().expect("config");
//! let repo = Arc::new(SqliteRepository::open("scores.db").expect("open sqlite"));
//! let broker = Arc::new(Broker::new());
//! let cancel = CancellationToken::new();
//!
//! let keeper = ScoreKeeper::new();
//! let keeper_task = keeper.spawn(broker.clone(), repo.clone(), &config, cancel.clone());
//! let (_manager, manager_task) = ScoreEngineManager::new(repo, broker, config).spawn(cancel.clone());
//!
//! cancel.cancel();
//! manager_task.await.expect("manager");
//! keeper_task.await.expect("keeper");
//! # }
//! ```
#![deny(missing_docs)]

/// Event broker and subscriptions.
pub mod broker;
/// Runtime configuration.
pub mod config;
/// In-memory engine store and diff tracking.
pub mod core;
/// Scoring rules, ranker and score engine.
pub mod engine;
/// Domain events and filters.
pub mod event;
/// Contest domain records.
pub mod model;
/// Repository contract and SQLite implementation.
pub mod persist;
/// Driver, manager and keeper tasks.
pub mod runtime;
/// Server-sent-events framing.
pub mod sse;
/// Identifier types.
pub mod types;
