use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, ParameterSet, PredictionSnapshot};

use crate::algorithmic::{self, AlgorithmicPrediction};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::matrix::Matrices;
use crate::statistical::{self, StatisticalPrediction};

/// Prédiction combinée des deux modèles pour le prochain tirage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub statistical: StatisticalPrediction,
    pub algorithmic: AlgorithmicPrediction,
    pub next_draw_time: String,
    pub next_draw_at: NaiveDateTime,
}

impl Prediction {
    pub fn snapshot(&self) -> PredictionSnapshot {
        PredictionSnapshot {
            statistical: self.statistical.numbers.clone(),
            algorithmic: self.algorithmic.numbers.clone(),
            confidence: self.statistical.confidence,
        }
    }
}

pub fn predict(
    draws: &[Draw],
    config: &EngineConfig,
    params: &ParameterSet,
    matrices: &Matrices,
    now: NaiveDateTime,
) -> EngineResult<Prediction> {
    let statistical = statistical::predict(draws, &config.rules, params, config.prediction_window)?;
    let algorithmic = algorithmic::predict_with(matrices, draws, &config.rules)?;
    Ok(Prediction {
        statistical,
        algorithmic,
        next_draw_time: config.schedule.next_draw_label(now),
        next_draw_at: config.schedule.next_draw_after(now),
    })
}

/// Prédiction figée pour le tirage qui suit `prefix`. Un historique trop
/// court donne des listes vides plutôt qu'une erreur.
pub fn snapshot_for(
    prefix: &[Draw],
    config: &EngineConfig,
    params: &ParameterSet,
    matrices: &Matrices,
) -> EngineResult<PredictionSnapshot> {
    let (statistical, confidence) =
        match statistical::predict(prefix, &config.rules, params, config.prediction_window) {
            Ok(p) => (p.numbers, p.confidence),
            Err(EngineError::InsufficientData { .. }) => (Vec::new(), 0.0),
            Err(e) => return Err(e),
        };
    let algorithmic = match algorithmic::predict_with(matrices, prefix, &config.rules) {
        Ok(p) => p.numbers,
        Err(EngineError::InsufficientData { .. }) => Vec::new(),
        Err(e) => return Err(e),
    };
    Ok(PredictionSnapshot {
        statistical,
        algorithmic,
        confidence,
    })
}
