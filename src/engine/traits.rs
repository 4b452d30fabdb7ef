use crate::{
    event::{
        AscentDeregistered, AscentRegistered, ContenderDisqualified, ContenderEntered, ContenderReenteredFinals,
        ContenderRequalified, ContenderSwitchedClass, ContenderWithdrewFromFinals, Event, ProblemAdded, ProblemUpdated,
    },
    model::{Contender, Score},
};

/// Folds per-problem point values into a contender's aggregate score.
pub trait ScoringRules: Send + 'static {
    /// Aggregate score of one contender given the points of each tick.
    fn calculate_score(&self, points: &[i32]) -> i32;
}

/// Orders the contenders of one class and assigns their standings.
pub trait Ranker: Send + 'static {
    /// Standings for `contenders`, one per contender, in rank order.
    fn rank_contenders(&self, contenders: &[Contender]) -> Vec<Score>;
}

/// Event-driven scoring state machine for one contest.
///
/// Only the engine driver's loop calls into an engine, so implementations
/// need no interior locking.
pub trait ScoreEngine: Send + 'static {
    /// Re-scores every hydrated tick and contender, then ranks every class.
    fn start(&mut self);
    /// Called once when the driver exits.
    fn stop(&mut self);

    /// Swaps the rules and re-scores every contender.
    fn replace_scoring_rules(&mut self, rules: Box<dyn ScoringRules>);
    /// Swaps the ranker and re-ranks every class.
    fn replace_ranker(&mut self, ranker: Box<dyn Ranker>);

    /// Registers or replaces a contender, keeping its ticks.
    fn handle_contender_entered(&mut self, event: ContenderEntered);
    /// Moves a contender to another class.
    fn handle_contender_switched_class(&mut self, event: ContenderSwitchedClass);
    /// Excludes a contender from the finalist slots.
    fn handle_contender_withdrew_from_finals(&mut self, event: ContenderWithdrewFromFinals);
    /// Makes a withdrawn contender eligible for the finals again.
    fn handle_contender_reentered_finals(&mut self, event: ContenderReenteredFinals);
    /// Zeroes the contender's score until requalified.
    fn handle_contender_disqualified(&mut self, event: ContenderDisqualified);
    /// Restores a disqualified contender's score from its ticks.
    fn handle_contender_requalified(&mut self, event: ContenderRequalified);
    /// Adds or replaces the tick on one problem.
    fn handle_ascent_registered(&mut self, event: AscentRegistered);
    /// Removes the tick on one problem.
    fn handle_ascent_deregistered(&mut self, event: AscentDeregistered);
    /// Problems must exist before ticks on them are scored.
    fn handle_problem_added(&mut self, event: ProblemAdded);
    /// Replaces point values and re-scores ticks on the problem.
    fn handle_problem_updated(&mut self, event: ProblemUpdated);

    /// Returns and clears the scores changed since the previous call.
    fn get_dirty_scores(&mut self) -> Vec<Score>;

    /// Routes `event` to its handler. Returns false for variants the engine
    /// does not consume.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::ContenderEntered(ev) => self.handle_contender_entered(ev),
            Event::ContenderSwitchedClass(ev) => self.handle_contender_switched_class(ev),
            Event::ContenderWithdrewFromFinals(ev) => self.handle_contender_withdrew_from_finals(ev),
            Event::ContenderReenteredFinals(ev) => self.handle_contender_reentered_finals(ev),
            Event::ContenderDisqualified(ev) => self.handle_contender_disqualified(ev),
            Event::ContenderRequalified(ev) => self.handle_contender_requalified(ev),
            Event::AscentRegistered(ev) => self.handle_ascent_registered(ev),
            Event::AscentDeregistered(ev) => self.handle_ascent_deregistered(ev),
            Event::ProblemAdded(ev) => self.handle_problem_added(ev),
            Event::ProblemUpdated(ev) => self.handle_problem_updated(ev),
            _ => return false,
        }

        true
    }
}
