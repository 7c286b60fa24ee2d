use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crescendo_db::models::{ParameterSet, MAX_WEIGHT};

use crate::backtest::BacktestEvaluator;
use crate::error::{check_params, EngineError, EngineResult};

pub const DECAY_MIN: f64 = 0.01;
pub const DECAY_MAX: f64 = 0.99;

/// Ramène un candidat dans les bornes admissibles.
pub fn clamp_candidate(p: ParameterSet) -> ParameterSet {
    ParameterSet {
        freq_weight: p.freq_weight.clamp(0.0, MAX_WEIGHT),
        gap_weight: p.gap_weight.clamp(0.0, MAX_WEIGHT),
        decay_rate: p.decay_rate.clamp(DECAY_MIN, DECAY_MAX),
    }
}

fn push_unique(out: &mut Vec<ParameterSet>, p: ParameterSet) {
    let p = clamp_candidate(p);
    let finite = p.freq_weight.is_finite() && p.gap_weight.is_finite() && p.decay_rate.is_finite();
    if finite && !out.contains(&p) {
        out.push(p);
    }
}

/// Génération des candidats, interchangeable sans toucher au backtest.
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn candidates(&self, baseline: &ParameterSet) -> Vec<ParameterSet>;
}

pub struct GridSearch {
    freq: Vec<f64>,
    gap: Vec<f64>,
    decay: Vec<f64>,
}

impl GridSearch {
    pub fn new(freq: Vec<f64>, gap: Vec<f64>, decay: Vec<f64>) -> Self {
        Self { freq, gap, decay }
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn candidates(&self, _baseline: &ParameterSet) -> Vec<ParameterSet> {
        let mut out = Vec::with_capacity(self.freq.len() * self.gap.len() * self.decay.len());
        for &f in &self.freq {
            for &g in &self.gap {
                for &d in &self.decay {
                    push_unique(&mut out, ParameterSet::new(f, g, d));
                }
            }
        }
        out
    }
}

/// Tirage uniforme dans les bornes, reproductible via la graine.
pub struct RandomSearch {
    samples: usize,
    seed: u64,
}

impl RandomSearch {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self { samples, seed }
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn candidates(&self, _baseline: &ParameterSet) -> Vec<ParameterSet> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            let f = rng.random_range(0.0..=MAX_WEIGHT);
            let g = rng.random_range(0.0..=MAX_WEIGHT);
            let d = rng.random_range(DECAY_MIN..=DECAY_MAX);
            push_unique(&mut out, ParameterSet::new(f, g, d));
        }
        out
    }
}

/// Voisinage du jeu actif : ±step sur chaque poids.
pub struct LocalSearch {
    step: f64,
}

impl LocalSearch {
    pub fn new(step: f64) -> Self {
        Self { step }
    }
}

impl SearchStrategy for LocalSearch {
    fn name(&self) -> &'static str {
        "local"
    }

    fn candidates(&self, baseline: &ParameterSet) -> Vec<ParameterSet> {
        let deltas = [-self.step, 0.0, self.step];
        let mut out = Vec::with_capacity(26);
        for &df in &deltas {
            for &dg in &deltas {
                for &dd in &deltas {
                    if df == 0.0 && dg == 0.0 && dd == 0.0 {
                        continue;
                    }
                    push_unique(
                        &mut out,
                        ParameterSet::new(
                            baseline.freq_weight + df,
                            baseline.gap_weight + dg,
                            baseline.decay_rate + dd,
                        ),
                    );
                }
            }
        }
        out.retain(|p| p != baseline);
        out
    }
}

/// Signal d'annulation partagé, consulté entre deux évaluations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub found_better: bool,
    pub current_params: ParameterSet,
    pub current_accuracy: f64,
    pub best_accuracy: f64,
    /// Écart absolu de précision entre le meilleur candidat et le jeu actif.
    pub improvement: f64,
    pub proposed_params: ParameterSet,
    pub strategy: String,
    pub candidates_evaluated: usize,
    pub message: String,
}

pub struct Optimizer {
    strategy: Box<dyn SearchStrategy>,
    min_improvement: f64,
}

impl Optimizer {
    /// Un seuil négatif ou non fini est ramené à 0 : seul un gain strict compte.
    pub fn new(strategy: Box<dyn SearchStrategy>, min_improvement: f64) -> Self {
        let min_improvement = if min_improvement.is_finite() {
            min_improvement.max(0.0)
        } else {
            0.0
        };
        Self {
            strategy,
            min_improvement,
        }
    }

    pub fn min_improvement(&self) -> f64 {
        self.min_improvement
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn run(
        &self,
        evaluator: &BacktestEvaluator,
        baseline: &ParameterSet,
        cancel: &CancelFlag,
    ) -> EngineResult<OptimizationResult> {
        self.run_with_progress(evaluator, baseline, cancel, |_, _| {})
    }

    /// `progress(évalués, total)` est appelé après chaque candidat.
    pub fn run_with_progress<F>(
        &self,
        evaluator: &BacktestEvaluator,
        baseline: &ParameterSet,
        cancel: &CancelFlag,
        progress: F,
    ) -> EngineResult<OptimizationResult>
    where
        F: Fn(usize, usize) + Sync,
    {
        check_params(baseline)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let current_accuracy = evaluator.accuracy(baseline)?;

        let candidates = self.strategy.candidates(baseline);
        if candidates.is_empty() {
            return Err(EngineError::NoCandidates);
        }
        let total = candidates.len();
        let done = std::sync::atomic::AtomicUsize::new(0);

        let scored: Vec<Option<f64>> = candidates
            .par_iter()
            .map(|candidate| {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let accuracy = evaluator.accuracy(candidate)?;
                progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
                Ok(Some(accuracy))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        if cancel.is_cancelled() {
            log::info!("Optimisation annulée après {} candidats", done.load(Ordering::Relaxed));
            return Err(EngineError::Cancelled);
        }

        // Strictement meilleur : à égalité, le premier candidat est conservé
        let mut best: Option<(usize, f64)> = None;
        for (i, acc) in scored.iter().enumerate() {
            if let Some(acc) = *acc {
                if best.map_or(true, |(_, b)| acc > b) {
                    best = Some((i, acc));
                }
            }
        }
        let (best_idx, best_accuracy) = best.ok_or(EngineError::NoCandidates)?;
        let improvement = best_accuracy - current_accuracy;
        let found_better = improvement > 0.0 && improvement > self.min_improvement;

        let (proposed_params, message) = if found_better {
            (
                candidates[best_idx],
                format!(
                    "Nouvelle formule trouvée : précision {:.2}% -> {:.2}% (+{:.2} pts)",
                    current_accuracy * 100.0,
                    best_accuracy * 100.0,
                    improvement * 100.0
                ),
            )
        } else {
            (
                *baseline,
                format!(
                    "La formule actuelle reste la meilleure ({:.2}%, meilleur candidat {:.2}%)",
                    current_accuracy * 100.0,
                    best_accuracy * 100.0
                ),
            )
        };

        log::info!(
            "Optimisation {} : {} candidats, base {:.4}, meilleur {:.4}, amélioration={}",
            self.strategy.name(),
            total,
            current_accuracy,
            best_accuracy,
            found_better
        );

        Ok(OptimizationResult {
            found_better,
            current_params: *baseline,
            current_accuracy,
            best_accuracy,
            improvement,
            proposed_params,
            strategy: self.strategy.name().to_string(),
            candidates_evaluated: total,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{make_steady_draws, make_test_draws};
    use crescendo_db::models::GameRules;

    struct Fixed(Vec<ParameterSet>);

    impl SearchStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn candidates(&self, _baseline: &ParameterSet) -> Vec<ParameterSet> {
            self.0.clone()
        }
    }

    fn evaluator() -> BacktestEvaluator {
        let rules = GameRules::default();
        let draws = make_test_draws(80, &rules);
        BacktestEvaluator::new(&draws, &rules, 50, 20).unwrap()
    }

    #[test]
    fn test_grid_size_and_bounds() {
        let grid = GridSearch::new(vec![0.2, 0.4, 0.6, 0.8], vec![0.2, 0.5, 0.8], vec![0.0, 0.5, 1.0]);
        let c = grid.candidates(&ParameterSet::default());
        assert_eq!(c.len(), 36);
        assert!(c.iter().all(|p| p.validate().is_ok()));
        assert!(c.iter().any(|p| p.decay_rate == DECAY_MIN));
        assert!(c.iter().any(|p| p.decay_rate == DECAY_MAX));
    }

    #[test]
    fn test_random_search_seeded() {
        let a = RandomSearch::new(20, 7).candidates(&ParameterSet::default());
        let b = RandomSearch::new(20, 7).candidates(&ParameterSet::default());
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn test_local_search_excludes_baseline() {
        let base = ParameterSet::new(1.0, 0.5, 0.5);
        let c = LocalSearch::new(0.1).candidates(&base);
        assert!(!c.contains(&base));
        assert!(c.iter().all(|p| p.validate().is_ok()));
        assert!(c.iter().all(|p| p.freq_weight <= 1.0));
    }

    fn steady_evaluator() -> BacktestEvaluator {
        let rules = GameRules::default();
        let draws = make_steady_draws(60, &rules);
        BacktestEvaluator::new(&draws, &rules, 50, 20).unwrap()
    }

    fn gap_heavy() -> ParameterSet {
        ParameterSet::new(0.0, 1.0, 0.99)
    }

    #[test]
    fn test_found_better_implies_improvement() {
        let eval = steady_evaluator();
        let base = gap_heavy();
        let optimizer = Optimizer::new(Box::new(GridSearch::new(
            vec![0.5, 1.0],
            vec![0.0],
            vec![0.5, 0.9],
        )), 0.005);
        let result = optimizer.run(&eval, &base, &CancelFlag::new()).unwrap();
        assert_eq!(result.candidates_evaluated, 4);
        assert_eq!(result.current_accuracy, 0.0);
        assert!(result.found_better);
        assert_eq!(result.best_accuracy, 1.0);
        assert!(result.best_accuracy > result.current_accuracy + optimizer.min_improvement());
        assert_ne!(result.proposed_params, base);
        assert_eq!(result.proposed_params, ParameterSet::new(0.5, 0.0, 0.5));
        assert_eq!(eval.accuracy(&result.proposed_params).unwrap(), result.best_accuracy);
        assert_eq!(result.current_params, base);
    }

    #[test]
    fn test_no_better_keeps_baseline() {
        let eval = evaluator();
        let base = ParameterSet::default();
        let optimizer = Optimizer::new(Box::new(Fixed(vec![base])), 0.005);
        let result = optimizer.run(&eval, &base, &CancelFlag::new()).unwrap();
        assert!(!result.found_better);
        assert_eq!(result.improvement, 0.0);
        assert_eq!(result.proposed_params, base);
    }

    #[test]
    fn test_negative_threshold_never_accepts_equal_or_worse() {
        let eval = steady_evaluator();
        let good = ParameterSet::new(1.0, 0.0, 0.5);
        let optimizer = Optimizer::new(Box::new(Fixed(vec![good])), -1.0);
        assert_eq!(optimizer.min_improvement(), 0.0);
        let same = optimizer.run(&eval, &good, &CancelFlag::new()).unwrap();
        assert!(!same.found_better);
        assert_eq!(same.proposed_params, good);

        let worse = Optimizer::new(Box::new(Fixed(vec![gap_heavy()])), -1.0)
            .run(&eval, &good, &CancelFlag::new())
            .unwrap();
        assert!(!worse.found_better);
        assert!(worse.improvement < 0.0);
        assert_eq!(worse.proposed_params, good);

        let nan = Optimizer::new(Box::new(Fixed(vec![good])), f64::NAN);
        assert_eq!(nan.min_improvement(), 0.0);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let eval = steady_evaluator();
        let a = ParameterSet::new(0.5, 0.0, 0.5);
        // Même classement : seule l'échelle change
        let b = ParameterSet::new(1.0, 0.0, 0.5);
        assert_eq!(eval.accuracy(&a).unwrap(), eval.accuracy(&b).unwrap());
        let optimizer = Optimizer::new(Box::new(Fixed(vec![a, b])), 0.005);
        let result = optimizer.run(&eval, &gap_heavy(), &CancelFlag::new()).unwrap();
        assert!(result.found_better);
        assert!(result.best_accuracy > result.current_accuracy);
        assert_eq!(result.proposed_params, a);
    }

    #[test]
    fn test_empty_strategy() {
        let eval = evaluator();
        let optimizer = Optimizer::new(Box::new(Fixed(vec![])), 0.005);
        assert!(matches!(
            optimizer.run(&eval, &ParameterSet::default(), &CancelFlag::new()),
            Err(EngineError::NoCandidates)
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let eval = evaluator();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let optimizer = Optimizer::new(Box::new(LocalSearch::new(0.1)), 0.005);
        assert!(matches!(
            optimizer.run(&eval, &ParameterSet::default(), &cancel),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_during_evaluation() {
        let eval = evaluator();
        let cancel = CancelFlag::new();
        let optimizer = Optimizer::new(Box::new(LocalSearch::new(0.1)), 0.005);
        let trigger = cancel.clone();
        let result = optimizer.run_with_progress(&eval, &ParameterSet::default(), &cancel, |_, _| {
            trigger.cancel()
        });
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_progress_reports_every_candidate() {
        let eval = evaluator();
        let seen = std::sync::atomic::AtomicUsize::new(0);
        let optimizer = Optimizer::new(Box::new(LocalSearch::new(0.1)), 0.005);
        let result = optimizer
            .run_with_progress(&eval, &ParameterSet::default(), &CancelFlag::new(), |_, _| {
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), result.candidates_evaluated);
    }
}
