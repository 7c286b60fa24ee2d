use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, GameRules};

use crate::error::{EngineError, EngineResult};
use crate::matrix::{build_matrices, Matrices};
use crate::statistical::ranking;

/// Poids fixes du mélange temporel / spatial.
pub const TEMPORAL_WEIGHT: f64 = 0.7;
pub const SPATIAL_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicScore {
    pub number: u8,
    pub score: f64,
    pub score_time: f64,
    pub score_space: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicPrediction {
    pub numbers: Vec<u8>,
    pub scores: Vec<f64>,
    pub details: Vec<AlgorithmicScore>,
}

pub fn predict(draws: &[Draw], rules: &GameRules) -> EngineResult<AlgorithmicPrediction> {
    let matrices = build_matrices(draws, rules);
    predict_with(&matrices, draws, rules)
}

/// Variante sur des matrices déjà construites (cache).
pub fn predict_with(
    matrices: &Matrices,
    draws: &[Draw],
    rules: &GameRules,
) -> EngineResult<AlgorithmicPrediction> {
    let last = draws.last().ok_or(EngineError::InsufficientData {
        needed: 1,
        available: 0,
    })?;
    let sources: Vec<usize> = last
        .balls
        .iter()
        .filter(|&&b| rules.contains(b))
        .map(|&b| (b - 1) as usize)
        .collect();

    let n = rules.size();
    let spatial = matrices.normalized_spatial();
    let mut time_scores = vec![0.0; n];
    let mut space_scores = vec![0.0; n];

    if !sources.is_empty() {
        for j in 0..n {
            time_scores[j] = sources.iter().map(|&i| matrices.temporal[[i, j]]).sum::<f64>()
                / sources.len() as f64;

            let others: Vec<f64> = sources
                .iter()
                .filter(|&&i| i != j)
                .map(|&i| spatial[[i, j]])
                .collect();
            if !others.is_empty() {
                space_scores[j] = others.iter().sum::<f64>() / others.len() as f64;
            }
        }
    }

    let scores: Vec<f64> = time_scores
        .iter()
        .zip(space_scores.iter())
        .map(|(t, s)| TEMPORAL_WEIGHT * t + SPATIAL_WEIGHT * s)
        .collect();
    let order = ranking(&scores);
    let top: Vec<usize> = order.iter().take(rules.pick_count).copied().collect();

    Ok(AlgorithmicPrediction {
        numbers: top.iter().map(|&i| (i + 1) as u8).collect(),
        scores: top.iter().map(|&i| scores[i]).collect(),
        details: order
            .iter()
            .map(|&i| AlgorithmicScore {
                number: (i + 1) as u8,
                score: scores[i],
                score_time: time_scores[i],
                score_space: space_scores[i],
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{draw_with, make_test_draws};

    #[test]
    fn test_empty_log_is_insufficient() {
        let rules = GameRules::default();
        assert!(matches!(
            predict(&[], &rules),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_blend_of_transition_and_cooccurrence() {
        let rules = GameRules::default();
        // 1..5 est toujours suivi de 21..25
        let mut draws = Vec::new();
        for i in 0..6u64 {
            draws.push(draw_with(2 * i + 1, &[1, 2, 3, 4, 5]));
            draws.push(draw_with(2 * i + 2, &[21, 22, 23, 24, 25]));
        }
        draws.push(draw_with(13, &[1, 2, 3, 4, 5]));
        let pred = predict(&draws, &rules).unwrap();

        let detail = |n: u8| pred.details.iter().find(|d| d.number == n).unwrap().clone();
        let follower = detail(21);
        assert!((follower.score_time - 0.2).abs() < 1e-12);
        assert_eq!(follower.score_space, 0.0);
        let companion = detail(3);
        assert_eq!(companion.score_time, 0.0);
        assert_eq!(companion.score_space, 1.0);
        // 0.3 × 1.0 l'emporte sur 0.7 × 0.2
        assert_eq!(pred.numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(detail(10).score, 0.0);
    }

    #[test]
    fn test_details_cover_universe_sorted() {
        let rules = GameRules::default();
        let draws = make_test_draws(30, &rules);
        let pred = predict(&draws, &rules).unwrap();
        assert_eq!(pred.details.len(), 25);
        assert!(pred.details.windows(2).all(|w| w[0].score >= w[1].score));
        for d in &pred.details {
            let blended = TEMPORAL_WEIGHT * d.score_time + SPATIAL_WEIGHT * d.score_space;
            assert!((d.score - blended).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&d.score_space));
        }
    }

    #[test]
    fn test_single_draw_has_no_temporal_mass() {
        let rules = GameRules::default();
        let draws = vec![draw_with(1, &[3, 7, 12, 19, 24])];
        let pred = predict(&draws, &rules).unwrap();
        assert!(pred.details.iter().all(|d| d.score_time == 0.0));
        assert_eq!(pred.numbers.len(), 5);
    }
}
