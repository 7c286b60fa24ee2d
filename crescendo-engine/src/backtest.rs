use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, GameRules, ParameterSet};

use crate::error::{check_params, EngineError, EngineResult};
use crate::statistical::{ranking, score_numbers};
use crate::stats::{frequency, gaps};

/// Un tirage rejoué : statistiques calculées sur les tirages précédents uniquement.
struct ReplayStep {
    draw_id: u64,
    actual: Vec<u8>,
    /// `None` quand le préfixe est trop court pour prédire.
    tables: Option<(Vec<u32>, Vec<u32>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestStep {
    pub draw_id: u64,
    pub predicted: Vec<u8>,
    pub hits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub params: ParameterSet,
    pub window: usize,
    pub hits: usize,
    pub possible: usize,
    pub accuracy: f64,
    pub steps: Vec<BacktestStep>,
}

/// Rejoue les `window` derniers tirages. Les tables de fréquence et de retard
/// de chaque étape sont calculées une fois et partagées entre les candidats.
pub struct BacktestEvaluator {
    pick_count: usize,
    window: usize,
    steps: Vec<ReplayStep>,
}

impl BacktestEvaluator {
    pub fn new(
        draws: &[Draw],
        rules: &GameRules,
        window: usize,
        prediction_window: usize,
    ) -> EngineResult<Self> {
        if window == 0 || draws.len() < window {
            return Err(EngineError::InsufficientHistory {
                window,
                available: draws.len(),
            });
        }
        let k = rules.pick_count;
        let steps = (draws.len() - window..draws.len())
            .map(|t| {
                let prefix = &draws[..t];
                let tables = (prefix.len() > k).then(|| {
                    (
                        frequency(prefix, rules, Some(prediction_window)).as_slice().to_vec(),
                        gaps(prefix, rules).as_slice().to_vec(),
                    )
                });
                ReplayStep {
                    draw_id: draws[t].draw_id,
                    actual: draws[t].balls.clone(),
                    tables,
                }
            })
            .collect();

        Ok(Self { pick_count: k, window, steps })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn predict_step(&self, step: &ReplayStep, params: &ParameterSet) -> Vec<u8> {
        match &step.tables {
            Some((freq, gap)) => {
                let scores = score_numbers(freq, gap, params);
                ranking(&scores)
                    .into_iter()
                    .take(self.pick_count)
                    .map(|i| (i + 1) as u8)
                    .collect()
            }
            None => Vec::new(),
        }
    }

    fn hits(predicted: &[u8], actual: &[u8]) -> usize {
        predicted.iter().filter(|n| actual.contains(n)).count()
    }

    /// Précision = coups au but / (fenêtre × k).
    pub fn accuracy(&self, params: &ParameterSet) -> EngineResult<f64> {
        check_params(params)?;
        let hits: usize = self
            .steps
            .iter()
            .map(|s| Self::hits(&self.predict_step(s, params), &s.actual))
            .sum();
        Ok(hits as f64 / (self.window * self.pick_count) as f64)
    }

    pub fn report(&self, params: &ParameterSet) -> EngineResult<BacktestReport> {
        check_params(params)?;
        let steps: Vec<BacktestStep> = self
            .steps
            .iter()
            .map(|s| {
                let predicted = self.predict_step(s, params);
                let hits = Self::hits(&predicted, &s.actual);
                BacktestStep { draw_id: s.draw_id, predicted, hits }
            })
            .collect();
        let hits: usize = steps.iter().map(|s| s.hits).sum();
        let possible = self.window * self.pick_count;
        Ok(BacktestReport {
            params: *params,
            window: self.window,
            hits,
            possible,
            accuracy: hits as f64 / possible as f64,
            steps,
        })
    }
}
