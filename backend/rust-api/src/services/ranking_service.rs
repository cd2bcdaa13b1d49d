use crate::models::{Ranking, Score};

/// Ranks `points` against earlier scores of the same topic.
///
/// `scores` must be sorted by points descending, as the topic store returns
/// them. Equal scores count as "not worse": the percentile is the share of
/// scores strictly below `points`.
pub fn rank(points: i32, scores: &[Score]) -> Ranking {
    let population = scores.len();
    if population == 0 {
        return Ranking {
            percentile: None,
            population,
        };
    }

    // first index whose score is below `points`
    let position = scores.partition_point(|score| score.points >= points);
    let percentile = ((population - position) * 100 / population) as u32;

    Ranking {
        percentile: Some(percentile),
        population,
    }
}
