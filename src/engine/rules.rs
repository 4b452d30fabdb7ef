use super::traits::ScoringRules;

/// Sums the `number` highest point values; 0 sums all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardestProblems {
    /// How many ticks count.
    pub number: u32,
}

impl HardestProblems {
    /// Counts the best `number` ticks.
    pub fn new(number: u32) -> Self {
        Self { number }
    }
}

impl ScoringRules for HardestProblems {
    fn calculate_score(&self, points: &[i32]) -> i32 {
        if self.number == 0 {
            return points.iter().fold(0i32, |acc, p| acc.saturating_add(*p));
        }

        let mut sorted = points.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        sorted
            .into_iter()
            .take(self.number as usize)
            .fold(0i32, |acc, p| acc.saturating_add(p))
    }
}
