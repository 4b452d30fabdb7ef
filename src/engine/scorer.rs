use hashbrown::HashSet;
use tracing::debug;

use crate::{
    core::store::EngineStore,
    event::{
        AscentDeregistered, AscentRegistered, ContenderDisqualified, ContenderEntered, ContenderReenteredFinals,
        ContenderRequalified, ContenderSwitchedClass, ContenderWithdrewFromFinals, ProblemAdded, ProblemUpdated,
    },
    model::{Contender, Problem, Score, Tick},
    types::{CompClassId, ContenderId, ContestId},
};

use super::traits::{Ranker, ScoreEngine, ScoringRules};

/// [`ScoreEngine`] over an [`EngineStore`] with pluggable rules and ranker.
pub struct DefaultScoreEngine {
    contest_id: ContestId,
    store: EngineStore,
    rules: Box<dyn ScoringRules>,
    ranker: Box<dyn Ranker>,
}

impl DefaultScoreEngine {
    /// Engine over a hydrated `store`. Call [`ScoreEngine::start`] before
    /// feeding events.
    pub fn new(
        contest_id: ContestId,
        store: EngineStore,
        rules: Box<dyn ScoringRules>,
        ranker: Box<dyn Ranker>,
    ) -> Self {
        Self {
            contest_id,
            store,
            rules,
            ranker,
        }
    }

    /// Contest this engine scores.
    pub fn contest_id(&self) -> ContestId {
        self.contest_id
    }

    /// Read access for tests and diagnostics.
    pub fn store(&self) -> &EngineStore {
        &self.store
    }

    fn score_contender(&mut self, contender_id: ContenderId) {
        let Some(mut contender) = self.store.get_contender(contender_id) else {
            return;
        };

        contender.score = if contender.disqualified {
            0
        } else {
            let points: Vec<i32> = self.store.ticks(contender_id).map(|t| t.points).collect();
            self.rules.calculate_score(&points)
        };

        self.store.save_contender(contender);
    }

    fn score_all_contenders(&mut self) {
        for contender_id in self.store.contender_ids() {
            self.score_contender(contender_id);
        }
    }

    fn rank_comp_class(&mut self, comp_class_id: CompClassId) {
        let contenders: Vec<Contender> = self.store.contenders_by_comp_class(comp_class_id).copied().collect();
        let scores: Vec<Score> = self.ranker.rank_contenders(&contenders);

        for score in scores {
            self.store.save_score(score);
        }
    }

    fn rank_all_comp_classes(&mut self) {
        for comp_class_id in self.store.comp_class_ids() {
            self.rank_comp_class(comp_class_id);
        }
    }

    fn rescore_ticks_on(&mut self, problem: &Problem) -> Vec<ContenderId> {
        let affected: Vec<(ContenderId, Tick)> = self
            .store
            .ticks_by_problem(problem.id)
            .map(|(contender_id, tick)| (contender_id, *tick))
            .collect();

        let mut owners = Vec::with_capacity(affected.len());
        for (contender_id, mut tick) in affected {
            tick.score(problem);
            self.store.save_tick(contender_id, tick);
            owners.push(contender_id);
        }

        owners
    }

    fn update_contender(&mut self, contender_id: ContenderId, update: impl FnOnce(&mut Contender)) -> Option<Contender> {
        let mut contender = self.store.get_contender(contender_id)?;
        update(&mut contender);
        self.store.save_contender(contender);
        Some(contender)
    }
}

impl ScoreEngine for DefaultScoreEngine {
    fn start(&mut self) {
        for contender_id in self.store.contender_ids() {
            let ticks: Vec<Tick> = self.store.ticks(contender_id).copied().collect();

            for mut tick in ticks {
                let Some(problem) = self.store.get_problem(tick.problem_id) else {
                    continue;
                };

                tick.score(&problem);
                self.store.save_tick(contender_id, tick);
            }

            self.score_contender(contender_id);
        }

        self.rank_all_comp_classes();
        debug!(contest_id = %self.contest_id, "score engine started");
    }

    fn stop(&mut self) {
        debug!(contest_id = %self.contest_id, "score engine stopped");
    }

    fn replace_scoring_rules(&mut self, rules: Box<dyn ScoringRules>) {
        self.rules = rules;
        self.score_all_contenders();
        self.rank_all_comp_classes();
    }

    fn replace_ranker(&mut self, ranker: Box<dyn Ranker>) {
        self.ranker = ranker;
        self.rank_all_comp_classes();
    }

    fn handle_contender_entered(&mut self, event: ContenderEntered) {
        let previous = self.store.get_contender(event.contender_id);

        self.store.save_contender(Contender {
            id: event.contender_id,
            comp_class_id: event.comp_class_id,
            ..Contender::default()
        });
        self.score_contender(event.contender_id);

        if let Some(previous) = previous {
            if previous.comp_class_id != event.comp_class_id {
                self.rank_comp_class(previous.comp_class_id);
            }
        }

        self.rank_comp_class(event.comp_class_id);
    }

    fn handle_contender_switched_class(&mut self, event: ContenderSwitchedClass) {
        let Some(contender) = self.store.get_contender(event.contender_id) else {
            return;
        };

        if contender.comp_class_id == event.comp_class_id {
            return;
        }

        let previous_class = contender.comp_class_id;
        self.store.save_contender(Contender {
            comp_class_id: event.comp_class_id,
            ..contender
        });

        self.rank_comp_class(previous_class);
        self.rank_comp_class(event.comp_class_id);
    }

    fn handle_contender_withdrew_from_finals(&mut self, event: ContenderWithdrewFromFinals) {
        if let Some(contender) = self.update_contender(event.contender_id, |c| c.withdrawn_from_finals = true) {
            self.rank_comp_class(contender.comp_class_id);
        }
    }

    fn handle_contender_reentered_finals(&mut self, event: ContenderReenteredFinals) {
        if let Some(contender) = self.update_contender(event.contender_id, |c| c.withdrawn_from_finals = false) {
            self.rank_comp_class(contender.comp_class_id);
        }
    }

    fn handle_contender_disqualified(&mut self, event: ContenderDisqualified) {
        let updated = self.update_contender(event.contender_id, |c| {
            c.disqualified = true;
            c.score = 0;
        });

        if let Some(contender) = updated {
            self.rank_comp_class(contender.comp_class_id);
        }
    }

    fn handle_contender_requalified(&mut self, event: ContenderRequalified) {
        let Some(contender) = self.update_contender(event.contender_id, |c| c.disqualified = false) else {
            return;
        };

        self.score_contender(contender.id);
        self.rank_comp_class(contender.comp_class_id);
    }

    fn handle_ascent_registered(&mut self, event: AscentRegistered) {
        let Some(contender) = self.store.get_contender(event.contender_id) else {
            return;
        };

        let Some(problem) = self.store.get_problem(event.problem_id) else {
            return;
        };

        let mut tick = Tick {
            problem_id: event.problem_id,
            top: event.top,
            attempts_top: event.attempts_top,
            zone: event.zone,
            attempts_zone: event.attempts_zone,
            points: 0,
        };
        tick.score(&problem);
        self.store.save_tick(contender.id, tick);

        if contender.disqualified {
            return;
        }

        self.score_contender(contender.id);
        self.rank_comp_class(contender.comp_class_id);
    }

    fn handle_ascent_deregistered(&mut self, event: AscentDeregistered) {
        let Some(contender) = self.store.get_contender(event.contender_id) else {
            return;
        };

        self.store.delete_tick(contender.id, event.problem_id);

        if contender.disqualified {
            return;
        }

        self.score_contender(contender.id);
        self.rank_comp_class(contender.comp_class_id);
    }

    fn handle_problem_added(&mut self, event: ProblemAdded) {
        self.store.save_problem(Problem {
            id: event.problem_id,
            points_top: event.points_top,
            points_zone: event.points_zone,
            flash_bonus: event.flash_bonus,
        });
    }

    fn handle_problem_updated(&mut self, event: ProblemUpdated) {
        let problem = Problem {
            id: event.problem_id,
            points_top: event.points_top,
            points_zone: event.points_zone,
            flash_bonus: event.flash_bonus,
        };
        self.store.save_problem(problem);

        let mut classes = HashSet::new();
        for contender_id in self.rescore_ticks_on(&problem) {
            let Some(contender) = self.store.get_contender(contender_id) else {
                continue;
            };

            if contender.disqualified {
                continue;
            }

            self.score_contender(contender_id);
            classes.insert(contender.comp_class_id);
        }

        let mut classes: Vec<CompClassId> = classes.into_iter().collect();
        classes.sort();
        for comp_class_id in classes {
            self.rank_comp_class(comp_class_id);
        }
    }

    fn get_dirty_scores(&mut self) -> Vec<Score> {
        self.store.get_dirty_scores()
    }
}
