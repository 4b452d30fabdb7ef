use chrono::Utc;

use crate::model::{Contender, Score};

use super::traits::Ranker;

/// Ranks by score with ties sharing a placement, flagging the top
/// `number_of_finalists` eligible contenders (plus ties at the cut) as finalists.
///
/// Disqualified contenders trail the list with placement 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicRanker {
    /// Finalist slots per class.
    pub number_of_finalists: u32,
}

impl BasicRanker {
    /// Ranker with `number_of_finalists` slots.
    pub fn new(number_of_finalists: u32) -> Self {
        Self { number_of_finalists }
    }
}

impl Ranker for BasicRanker {
    fn rank_contenders(&self, contenders: &[Contender]) -> Vec<Score> {
        let now = Utc::now();

        let (mut qualified, mut disqualified): (Vec<&Contender>, Vec<&Contender>) =
            contenders.iter().partition(|c| !c.disqualified);

        qualified.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        disqualified.sort_by_key(|c| c.id);

        let mut scores = Vec::with_capacity(contenders.len());

        let mut previous: Option<i32> = None;
        let mut placement = 0u32;
        let mut gap = 0u32;
        let mut assigned_finalists = 0u32;
        let mut last_finalist_placement = 0u32;

        for (i, contender) in qualified.into_iter().enumerate() {
            match previous {
                None => {
                    placement = 1;
                    gap = 0;
                }
                Some(prev) if prev == contender.score => gap += 1,
                Some(_) => {
                    placement += 1 + gap;
                    gap = 0;
                }
            }

            let mut finalist = false;
            if contender.score > 0 && !contender.withdrawn_from_finals {
                if assigned_finalists < self.number_of_finalists {
                    finalist = true;
                    assigned_finalists += 1;
                    last_finalist_placement = placement;
                } else if placement == last_finalist_placement {
                    finalist = true;
                }
            }

            scores.push(Score {
                timestamp: now,
                contender_id: contender.id,
                score: contender.score,
                placement,
                rank_order: i as u32,
                finalist,
            });

            previous = Some(contender.score);
        }

        for contender in disqualified {
            let rank_order = scores.len() as u32;
            scores.push(Score {
                timestamp: now,
                contender_id: contender.id,
                score: 0,
                placement: 0,
                rank_order,
                finalist: false,
            });
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompClassId, ContenderId};

    fn contender(id: i32, score: i32) -> Contender {
        Contender {
            id: ContenderId(id),
            comp_class_id: CompClassId(1),
            score,
            ..Contender::default()
        }
    }

    #[test]
    fn ties_withdrawals_and_the_finalist_cut() {
        let scores = [500, 400, 300, 200, 100, 100, 100, 50, 50, 0];
        let mut contenders: Vec<Contender> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| contender(i as i32 + 1, *s))
            .collect();
        for id in [2, 3, 6] {
            contenders[id - 1].withdrawn_from_finals = true;
        }
        contenders.reverse();

        let ranked = BasicRanker::new(5).rank_contenders(&contenders);

        let expected = [
            (1, 1, true),
            (2, 2, false),
            (3, 3, false),
            (4, 4, true),
            (5, 5, true),
            (6, 5, false),
            (7, 5, true),
            (8, 8, true),
            (9, 8, true),
            (10, 10, false),
        ];

        assert_eq!(ranked.len(), expected.len());
        for (i, (score, (id, placement, finalist))) in ranked.iter().zip(expected).enumerate() {
            assert_eq!(score.contender_id, ContenderId(id), "position {i}");
            assert_eq!(score.placement, placement, "contender {id}");
            assert_eq!(score.finalist, finalist, "contender {id}");
            assert_eq!(score.rank_order, i as u32);
        }
    }

    #[test]
    fn disqualified_trail_with_placement_zero() {
        let mut dq = contender(1, 0);
        dq.disqualified = true;
        let ranked = BasicRanker::new(3).rank_contenders(&[dq, contender(2, 10), contender(3, 5)]);

        assert_eq!(ranked[0].contender_id, ContenderId(2));
        assert_eq!(ranked[1].contender_id, ContenderId(3));
        assert_eq!(ranked[2].contender_id, ContenderId(1));
        assert_eq!(ranked[2].placement, 0);
        assert_eq!(ranked[2].rank_order, 2);
        assert!(!ranked[2].finalist);
    }

    #[test]
    fn single_timestamp_per_pass() {
        let ranked = BasicRanker::new(1).rank_contenders(&[contender(1, 1), contender(2, 2), contender(3, 3)]);
        assert!(ranked.windows(2).all(|w| w[0].timestamp == w[1].timestamp));
    }

    #[test]
    fn empty_class() {
        assert!(BasicRanker::new(5).rank_contenders(&[]).is_empty());
    }
}
