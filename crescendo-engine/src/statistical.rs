use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, GameRules, ParameterSet};

use crate::error::{check_params, EngineError, EngineResult};
use crate::stats::{frequency, gaps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberScore {
    pub number: u8,
    pub score: f64,
    pub freq: u32,
    pub gap: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalPrediction {
    pub numbers: Vec<u8>,
    pub confidence: f64,
    /// Tous les numéros, triés par score décroissant.
    pub details: Vec<NumberScore>,
}

/// Mise à l'échelle min-max sur [0, 1]. Valeurs toutes égales : 0 partout.
pub(crate) fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range > 0.0 {
        values.iter().map(|v| (v - min) / range).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// score(n) = fw × freq_norm(n) + gw × gap_norm(n) × decay^gap(n)
pub(crate) fn score_numbers(freq: &[u32], gaps: &[u32], params: &ParameterSet) -> Vec<f64> {
    let freq_norm = min_max(&freq.iter().map(|&f| f as f64).collect::<Vec<_>>());
    let gap_norm = min_max(&gaps.iter().map(|&g| g as f64).collect::<Vec<_>>());

    freq_norm
        .iter()
        .zip(gap_norm.iter())
        .zip(gaps.iter())
        .map(|((&f, &g), &raw_gap)| {
            let decay = params.decay_rate.powi(raw_gap.min(i32::MAX as u32) as i32);
            params.freq_weight * f + params.gap_weight * g * decay
        })
        .collect()
}

/// Indices triés par score décroissant, le plus petit numéro d'abord à égalité.
pub(crate) fn ranking(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order
}

/// Écart entre le k-ième et le (k+1)-ième score, rapporté à l'amplitude totale.
pub(crate) fn confidence(scores: &[f64], order: &[usize], k: usize) -> f64 {
    if order.len() <= k || k == 0 {
        return 0.0;
    }
    let top = scores[order[0]];
    let bottom = scores[order[order.len() - 1]];
    let span = top - bottom;
    if span <= 0.0 {
        return 0.0;
    }
    let margin = scores[order[k - 1]] - scores[order[k]];
    (100.0 * margin / span).clamp(0.0, 100.0)
}

pub fn predict(
    draws: &[Draw],
    rules: &GameRules,
    params: &ParameterSet,
    window: usize,
) -> EngineResult<StatisticalPrediction> {
    check_params(params)?;
    let k = rules.pick_count;
    if draws.len() < k + 1 {
        return Err(EngineError::InsufficientData {
            needed: k + 1,
            available: draws.len(),
        });
    }

    let freq = frequency(draws, rules, Some(window));
    let gap_table = gaps(draws, rules);
    let scores = score_numbers(freq.as_slice(), gap_table.as_slice(), params);
    let order = ranking(&scores);

    let numbers = order.iter().take(k).map(|&i| (i + 1) as u8).collect();
    let details = order
        .iter()
        .map(|&i| NumberScore {
            number: (i + 1) as u8,
            score: scores[i],
            freq: freq.as_slice()[i],
            gap: gap_table.as_slice()[i],
        })
        .collect();

    Ok(StatisticalPrediction {
        numbers,
        confidence: confidence(&scores, &order, k),
        details,
    })
}
