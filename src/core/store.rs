use hashbrown::{HashMap, HashSet};

use crate::{
    model::{Contender, Problem, Score, Tick},
    types::{CompClassId, ContenderId, ProblemId},
};

use super::diffmap::DiffMap;

/// Exclusive in-memory projection of one contest.
///
/// Not thread-safe; the engine driver's loop is its only user.
#[derive(Debug)]
pub struct EngineStore {
    contenders: HashMap<ContenderId, Contender>,
    problems: HashMap<ProblemId, Problem>,
    ticks: HashMap<ContenderId, Vec<Tick>>,
    scores: DiffMap<ContenderId, Score>,
}

impl Default for EngineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            contenders: HashMap::new(),
            problems: HashMap::new(),
            ticks: HashMap::new(),
            scores: DiffMap::new(|a: &Score, b: &Score| a.same_standing(b)),
        }
    }

    /// Copy of a contender.
    pub fn get_contender(&self, contender_id: ContenderId) -> Option<Contender> {
        self.contenders.get(&contender_id).copied()
    }

    /// Inserts or replaces a contender.
    pub fn save_contender(&mut self, contender: Contender) {
        self.contenders.insert(contender.id, contender);
    }

    /// Removes a contender together with its ticks.
    pub fn delete_contender(&mut self, contender_id: ContenderId) -> Option<Contender> {
        self.ticks.remove(&contender_id);
        self.contenders.remove(&contender_id)
    }

    /// Contenders of one class, in no particular order.
    pub fn contenders_by_comp_class(&self, comp_class_id: CompClassId) -> impl Iterator<Item = &Contender> + '_ {
        self.contenders
            .values()
            .filter(move |c| c.comp_class_id == comp_class_id)
    }

    /// Every contender, in no particular order.
    pub fn all_contenders(&self) -> impl Iterator<Item = &Contender> + '_ {
        self.contenders.values()
    }

    /// Ids of every contender, sorted.
    pub fn contender_ids(&self) -> Vec<ContenderId> {
        self.contenders.keys().copied().collect()
    }

    /// Distinct classes with at least one contender, in ascending order.
    pub fn comp_class_ids(&self) -> Vec<CompClassId> {
        let set: HashSet<CompClassId> = self.contenders.values().map(|c| c.comp_class_id).collect();
        let mut ids: Vec<CompClassId> = set.into_iter().collect();
        ids.sort();
        ids
    }

    /// Ticks of one contender.
    pub fn ticks(&self, contender_id: ContenderId) -> impl Iterator<Item = &Tick> + '_ {
        self.ticks
            .get(&contender_id)
            .into_iter()
            .flat_map(|ticks| ticks.iter())
    }

    /// Every (owner, tick) pair on `problem_id`.
    pub fn ticks_by_problem(&self, problem_id: ProblemId) -> impl Iterator<Item = (ContenderId, &Tick)> + '_ {
        self.ticks.iter().flat_map(move |(contender_id, ticks)| {
            ticks
                .iter()
                .filter(move |t| t.problem_id == problem_id)
                .map(move |t| (*contender_id, t))
        })
    }

    /// Replaces the contender's tick on the same problem, or appends.
    pub fn save_tick(&mut self, contender_id: ContenderId, tick: Tick) {
        let ticks = self.ticks.entry(contender_id).or_default();

        match ticks.iter_mut().find(|t| t.problem_id == tick.problem_id) {
            Some(existing) => *existing = tick,
            None => ticks.push(tick),
        }
    }

    /// Removes the tick of `contender_id` on `problem_id`, if any.
    pub fn delete_tick(&mut self, contender_id: ContenderId, problem_id: ProblemId) {
        if let Some(ticks) = self.ticks.get_mut(&contender_id) {
            ticks.retain(|t| t.problem_id != problem_id);
        }
    }

    /// Copy of a problem.
    pub fn get_problem(&self, problem_id: ProblemId) -> Option<Problem> {
        self.problems.get(&problem_id).copied()
    }

    /// Inserts or replaces a problem.
    pub fn save_problem(&mut self, problem: Problem) {
        self.problems.insert(problem.id, problem);
    }

    /// Removes a problem. Ticks on it are kept.
    pub fn delete_problem(&mut self, problem_id: ProblemId) -> Option<Problem> {
        self.problems.remove(&problem_id)
    }

    /// Records `score`; equal standings (timestamps aside) are not re-emitted.
    pub fn save_score(&mut self, score: Score) {
        self.scores.set(score.contender_id, score);
    }

    /// Returns and clears the scores changed since the last call.
    pub fn get_dirty_scores(&mut self) -> Vec<Score> {
        self.scores.commit()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn contender(id: i32, class: i32) -> Contender {
        Contender {
            id: ContenderId(id),
            comp_class_id: CompClassId(class),
            ..Contender::default()
        }
    }

    fn tick(problem: i32, points: i32) -> Tick {
        Tick {
            problem_id: ProblemId(problem),
            top: true,
            attempts_top: 1,
            zone: true,
            attempts_zone: 1,
            points,
        }
    }

    #[test]
    fn filter_by_comp_class() {
        let mut store = EngineStore::new();
        store.save_contender(contender(1, 1));
        store.save_contender(contender(2, 2));
        store.save_contender(contender(3, 1));
        store.save_contender(contender(4, 3));

        let mut ids: Vec<i32> = store.contenders_by_comp_class(CompClassId(1)).map(|c| c.id.0).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(store.contenders_by_comp_class(CompClassId(3)).count(), 1);
        assert_eq!(store.contenders_by_comp_class(CompClassId(9)).count(), 0);
    }

    #[test]
    fn comp_class_ids_are_distinct() {
        let mut store = EngineStore::new();
        store.save_contender(contender(1, 2));
        store.save_contender(contender(2, 1));
        store.save_contender(contender(3, 2));

        assert_eq!(store.comp_class_ids(), vec![CompClassId(1), CompClassId(2)]);
    }

    #[test]
    fn save_tick_overwrites_same_problem() {
        let mut store = EngineStore::new();
        let cid = ContenderId(1);

        store.save_tick(cid, tick(1, 10));
        store.save_tick(cid, tick(2, 20));
        store.save_tick(cid, tick(1, 30));

        let points: Vec<i32> = store.ticks(cid).map(|t| t.points).collect();
        assert_eq!(points, vec![30, 20]);

        store.delete_tick(cid, ProblemId(1));
        let left: Vec<ProblemId> = store.ticks(cid).map(|t| t.problem_id).collect();
        assert_eq!(left, vec![ProblemId(2)]);

        assert_eq!(store.ticks(ContenderId(99)).count(), 0);
    }

    #[test]
    fn ticks_by_problem_spans_contenders() {
        let mut store = EngineStore::new();
        store.save_tick(ContenderId(1), tick(7, 10));
        store.save_tick(ContenderId(2), tick(7, 20));
        store.save_tick(ContenderId(2), tick(8, 20));

        let mut owners: Vec<i32> = store.ticks_by_problem(ProblemId(7)).map(|(c, _)| c.0).collect();
        owners.sort();
        assert_eq!(owners, vec![1, 2]);
    }

    #[test]
    fn dirty_scores_ignore_timestamp_only_changes() {
        let mut store = EngineStore::new();
        let score = Score {
            timestamp: Utc::now(),
            contender_id: ContenderId(1),
            score: 100,
            placement: 1,
            rank_order: 0,
            finalist: true,
        };

        store.save_score(score);
        assert_eq!(store.get_dirty_scores().len(), 1);

        store.save_score(Score {
            timestamp: Utc::now() + chrono::Duration::seconds(5),
            ..score
        });
        assert!(store.get_dirty_scores().is_empty());

        store.save_score(Score { score: 200, ..score });
        assert_eq!(store.get_dirty_scores()[0].score, 200);
    }
}
