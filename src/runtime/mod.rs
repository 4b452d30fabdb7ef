//! Long-running tasks: engine drivers, the manager that owns them, and the
//! score keeper.

/// Per-contest engine driver task.
pub mod driver;
/// Engine store hydration from the repository.
pub mod hydrator;
/// Score keeper cache and persistence task.
pub mod keeper;
/// Engine manager loop and control handle.
pub mod manager;

pub use driver::{DriverHandle, EngineDriver, EngineInstaller};
pub use keeper::ScoreKeeper;
pub use manager::{ManagerHandle, ScoreEngineManager};
