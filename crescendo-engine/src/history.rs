use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, GameRules, ParameterSet, PredictionSnapshot};
use crescendo_db::store::{DrawLog, PredictionLedger};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::matrix::MatrixAccumulator;
use crate::prediction::snapshot_for;

/// Gains par rang, du rang le plus haut (tous les numéros trouvés) vers le bas.
const PAYOUT_LADDER: [f64; 5] = [100_000.0, 500.0, 50.0, 7.0, 1.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutTier {
    pub matches: usize,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutTable {
    pub tiers: Vec<PayoutTier>,
}

impl PayoutTable {
    /// Barème ancré sur `pick_count` bons numéros, puis décroissant rang par rang.
    pub fn for_rules(rules: &GameRules) -> Self {
        let tiers = PAYOUT_LADDER
            .iter()
            .enumerate()
            .take_while(|(i, _)| *i < rules.pick_count)
            .map(|(i, &gain)| PayoutTier {
                matches: rules.pick_count - i,
                gain,
            })
            .collect();
        Self { tiers }
    }

    pub fn gain(&self, matches: usize) -> f64 {
        self.tiers
            .iter()
            .find(|t| t.matches == matches)
            .map_or(0.0, |t| t.gain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub draw: Draw,
    pub prediction: Option<PredictionSnapshot>,
    pub matches_count: usize,
    /// Gain réalisé si connu, sinon gain théorique du barème.
    pub gain: f64,
}

/// Derniers tirages, du plus récent au plus ancien, avec leur prédiction figée.
pub fn history(
    draw_log: &dyn DrawLog,
    ledger: &dyn PredictionLedger,
    limit: usize,
    payouts: &PayoutTable,
) -> EngineResult<Vec<HistoryEntry>> {
    let mut draws = draw_log.read_last(limit)?;
    draws.reverse();
    draws
        .into_iter()
        .map(|draw| {
            let prediction = ledger.prediction_for(draw.draw_id)?;
            let matches_count = prediction
                .as_ref()
                .map_or(0, |p| p.statistical.iter().filter(|n| draw.contains(**n)).count());
            let gain = match (draw.gain, &prediction) {
                (Some(g), _) => g,
                (None, Some(_)) => payouts.gain(matches_count),
                (None, None) => 0.0,
            };
            Ok(HistoryEntry {
                draw,
                prediction,
                matches_count,
                gain,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub filled: usize,
}

/// Complète les prédictions manquantes en rejouant l'historique :
/// chaque tirage reçoit la prédiction calculée sur les tirages précédents.
pub fn backfill(
    draw_log: &dyn DrawLog,
    ledger: &dyn PredictionLedger,
    config: &EngineConfig,
    params: &ParameterSet,
) -> EngineResult<BackfillReport> {
    let draws = draw_log.read_all()?;
    let mut acc = MatrixAccumulator::new(&config.rules);
    let mut report = BackfillReport::default();

    for (i, draw) in draws.iter().enumerate() {
        report.scanned += 1;
        if ledger.prediction_for(draw.draw_id)?.is_none() {
            let snapshot = snapshot_for(&draws[..i], config, params, &acc.snapshot())?;
            if ledger.record_prediction(draw.draw_id, &snapshot)? {
                report.filled += 1;
            }
            if report.filled > 0 && report.filled % 100 == 0 {
                log::info!("{} prédictions reconstituées...", report.filled);
            }
        }
        acc.add(draw);
    }

    log::info!(
        "Reconstitution terminée : {} tirages parcourus, {} prédictions ajoutées",
        report.scanned,
        report.filled
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_test_draws;
    use crescendo_db::store::SqliteStore;

    #[test]
    fn test_payout_ladder_for_five_balls() {
        let table = PayoutTable::for_rules(&GameRules::default());
        assert_eq!(table.gain(5), 100_000.0);
        assert_eq!(table.gain(4), 500.0);
        assert_eq!(table.gain(1), 1.0);
        assert_eq!(table.gain(0), 0.0);
    }

    #[test]
    fn test_payout_ladder_for_ten_balls() {
        let rules = GameRules { pick_count: 10, ..GameRules::default() };
        let table = PayoutTable::for_rules(&rules);
        assert_eq!(table.gain(10), 100_000.0);
        assert_eq!(table.gain(9), 500.0);
        assert_eq!(table.gain(6), 1.0);
        assert_eq!(table.gain(5), 0.0);
    }

    #[test]
    fn test_history_newest_first_with_matches() {
        let store = SqliteStore::in_memory().unwrap();
        let rules = GameRules::default();
        let draws = make_test_draws(5, &rules);
        for d in &draws {
            store.append(d).unwrap();
        }
        let mut predicted = draws[4].balls.clone();
        predicted[0] = if predicted.contains(&25) { 24 } else { 25 };
        predicted.sort();
        predicted.dedup();
        let snap = PredictionSnapshot { statistical: predicted, algorithmic: vec![], confidence: 10.0 };
        store.record_prediction(5, &snap).unwrap();

        let entries = history(&store, &store, 3, &PayoutTable::for_rules(&rules)).unwrap();
        assert_eq!(entries.iter().map(|e| e.draw.draw_id).collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(entries[0].matches_count, 4);
        assert_eq!(entries[0].gain, 500.0);
        assert!(entries[1].prediction.is_none());
        assert_eq!(entries[1].gain, 0.0);
    }

    #[test]
    fn test_backfill_fills_missing_only() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        for d in make_test_draws(12, &config.rules) {
            store.append(&d).unwrap();
        }
        let kept = PredictionSnapshot { statistical: vec![1, 2, 3, 4, 5], algorithmic: vec![], confidence: 1.0 };
        store.record_prediction(12, &kept).unwrap();

        let report = backfill(&store, &store, &config, &ParameterSet::default()).unwrap();
        assert_eq!(report.scanned, 12);
        assert_eq!(report.filled, 11);
        assert_eq!(store.prediction_for(12).unwrap(), Some(kept));

        let first = store.prediction_for(1).unwrap().unwrap();
        assert!(first.statistical.is_empty() && first.algorithmic.is_empty());
        let late = store.prediction_for(11).unwrap().unwrap();
        assert_eq!(late.statistical.len(), 5);

        let again = backfill(&store, &store, &config, &ParameterSet::default()).unwrap();
        assert_eq!(again.filled, 0);
    }
}
