use tracing::debug;

use crate::{
    core::store::EngineStore,
    model::Contender,
    persist::{PersistResult, Repository},
    types::ContestId,
};

/// Loads a contest's problems, classed contenders and ticks into a fresh store.
///
/// Contenders without a class have not entered yet and are skipped along
/// with their ticks. Tick points are left for the engine's `start` to compute.
pub fn hydrate_store(repo: &dyn Repository, contest_id: ContestId) -> PersistResult<EngineStore> {
    let mut store = EngineStore::new();

    let problems = repo.get_problems_by_contest(contest_id)?;
    let problem_count = problems.len();
    for problem in problems {
        store.save_problem(problem);
    }

    let contenders = repo.get_contenders_by_contest(contest_id)?;
    let mut contender_count = 0usize;
    for contender in contenders {
        if contender.comp_class_id.is_wildcard() {
            continue;
        }

        store.save_contender(Contender { score: 0, ..contender });
        contender_count += 1;
    }

    let ticks = repo.get_ticks_by_contest(contest_id)?;
    let mut tick_count = 0usize;
    for owned in ticks {
        if store.get_contender(owned.contender_id).is_none() {
            continue;
        }

        store.save_tick(owned.contender_id, owned.tick);
        tick_count += 1;
    }

    debug!(
        contest_id = %contest_id,
        problems = problem_count,
        contenders = contender_count,
        ticks = tick_count,
        "engine store hydrated"
    );

    Ok(store)
}
