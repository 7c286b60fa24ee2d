use serde::{Deserialize, Serialize};

use crescendo_db::models::ParameterSet;
use crescendo_db::store::{DrawLog, ParameterStore};

use crate::active::{ActiveParameters, ApplyOutcome};
use crate::backtest::BacktestEvaluator;
use crate::config::{EngineConfig, StrategyKind};
use crate::error::EngineResult;
use crate::optimizer::{CancelFlag, OptimizationResult, Optimizer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub current_params: ParameterSet,
    pub accuracy_last_50: f64,
    pub window: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub status: ApplyOutcome,
    pub params: ParameterSet,
}

/// Analyse, optimisation et application du jeu actif.
pub struct Expert<'a> {
    pub draws: &'a dyn DrawLog,
    pub store: &'a dyn ParameterStore,
    pub active: &'a ActiveParameters,
    pub config: &'a EngineConfig,
}

impl<'a> Expert<'a> {
    fn evaluator(&self) -> EngineResult<BacktestEvaluator> {
        let draws = self.draws.read_all()?;
        BacktestEvaluator::new(
            &draws,
            &self.config.rules,
            self.config.backtest_window,
            self.config.prediction_window,
        )
    }

    pub fn analyze(&self) -> EngineResult<Analysis> {
        let evaluator = self.evaluator()?;
        let current_params = self.active.get();
        let accuracy = evaluator.accuracy(&current_params)?;
        Ok(Analysis {
            current_params,
            accuracy_last_50: accuracy,
            window: evaluator.window(),
            message: format!(
                "Précision sur les {} derniers tirages : {:.2}%",
                evaluator.window(),
                accuracy * 100.0
            ),
        })
    }

    /// Ne modifie jamais le jeu actif.
    pub fn optimize(
        &self,
        strategy: Option<StrategyKind>,
        cancel: &CancelFlag,
    ) -> EngineResult<OptimizationResult> {
        let evaluator = self.evaluator()?;
        let optimizer = self.optimizer(strategy);
        optimizer.run(&evaluator, &self.active.get(), cancel)
    }

    pub fn optimize_with_progress<F>(
        &self,
        strategy: Option<StrategyKind>,
        cancel: &CancelFlag,
        progress: F,
    ) -> EngineResult<OptimizationResult>
    where
        F: Fn(usize, usize) + Sync,
    {
        let evaluator = self.evaluator()?;
        self.optimizer(strategy)
            .run_with_progress(&evaluator, &self.active.get(), cancel, progress)
    }

    fn optimizer(&self, strategy: Option<StrategyKind>) -> Optimizer {
        let kind = strategy.unwrap_or(self.config.search.strategy);
        Optimizer::new(self.config.search.build(kind), self.config.min_improvement)
    }

    pub fn apply(
        &self,
        expected: Option<ParameterSet>,
        new: ParameterSet,
    ) -> EngineResult<ApplyReport> {
        let status = self.active.apply(self.store, expected, new)?;
        Ok(ApplyReport {
            status,
            params: self.active.get(),
        })
    }
}
