use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crescendo_db::models::GameRules;

use crate::history::PayoutTable;
use crate::optimizer::{GridSearch, LocalSearch, RandomSearch, SearchStrategy};
use crate::schedule::DrawSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Grid,
    Random,
    Local,
}

impl std::str::FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(StrategyKind::Grid),
            "random" => Ok(StrategyKind::Random),
            "local" => Ok(StrategyKind::Local),
            other => bail!("Stratégie inconnue : '{}' (grid, random, local)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: StrategyKind,
    pub freq_grid: Vec<f64>,
    pub gap_grid: Vec<f64>,
    pub decay_grid: Vec<f64>,
    pub random_samples: usize,
    pub seed: u64,
    pub local_step: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Grid,
            freq_grid: vec![0.2, 0.4, 0.6, 0.8],
            gap_grid: vec![0.2, 0.5, 0.8],
            decay_grid: vec![0.5, 0.7, 0.85, 0.95],
            random_samples: 48,
            seed: 42,
            local_step: 0.1,
        }
    }
}

impl SearchConfig {
    pub fn build_strategy(&self) -> Box<dyn SearchStrategy> {
        self.build(self.strategy)
    }

    pub fn build(&self, kind: StrategyKind) -> Box<dyn SearchStrategy> {
        match kind {
            StrategyKind::Grid => Box::new(GridSearch::new(
                self.freq_grid.clone(),
                self.gap_grid.clone(),
                self.decay_grid.clone(),
            )),
            StrategyKind::Random => Box::new(RandomSearch::new(self.random_samples, self.seed)),
            StrategyKind::Local => Box::new(LocalSearch::new(self.local_step)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: GameRules,
    /// Fenêtre des numéros chauds/froids.
    pub stats_window: usize,
    /// Fenêtre de fréquence du prédicteur statistique.
    pub prediction_window: usize,
    pub backtest_window: usize,
    /// Gain minimal de précision pour proposer un nouveau jeu.
    pub min_improvement: f64,
    pub search: SearchConfig,
    pub schedule: DrawSchedule,
    pub payouts: Option<PayoutTable>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            stats_window: 50,
            prediction_window: 20,
            backtest_window: 50,
            min_improvement: 0.005,
            search: SearchConfig::default(),
            schedule: DrawSchedule::default(),
            payouts: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&json)
            .with_context(|| format!("JSON invalide dans {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Charge le fichier s'il existe, sinon la configuration par défaut.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                log::warn!("Configuration {:?} introuvable, valeurs par défaut utilisées", p);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        if self.stats_window == 0 || self.prediction_window == 0 || self.backtest_window == 0 {
            bail!("Les fenêtres doivent contenir au moins un tirage");
        }
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            bail!("min_improvement doit être positif : {}", self.min_improvement);
        }
        if self.schedule.first_hour > self.schedule.last_hour || self.schedule.last_hour > 23 {
            bail!(
                "Horaires de tirage invalides : {}h-{}h",
                self.schedule.first_hour,
                self.schedule.last_hour
            );
        }
        Ok(())
    }

    pub fn payout_table(&self) -> PayoutTable {
        self.payouts
            .clone()
            .unwrap_or_else(|| PayoutTable::for_rules(&self.rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.rules.pool_size, 25);
        assert_eq!(config.backtest_window, 50);
        assert_eq!(config.search.strategy, StrategyKind::Grid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"backtest_window": 30, "search": {"strategy": "random"}}"#).unwrap();
        assert_eq!(config.backtest_window, 30);
        assert_eq!(config.prediction_window, 20);
        assert_eq!(config.search.strategy, StrategyKind::Random);
        assert_eq!(config.search.freq_grid.len(), 4);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let tmp = std::env::temp_dir().join("crescendo_test_config.json");
        let mut config = EngineConfig::default();
        config.min_improvement = 0.01;
        config.save(&tmp).unwrap();
        let loaded = EngineConfig::load(&tmp).unwrap();
        assert_eq!(loaded.min_improvement, 0.01);
        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let config = EngineConfig { backtest_window: 0, ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Grid".parse::<StrategyKind>().unwrap(), StrategyKind::Grid);
        assert_eq!("local".parse::<StrategyKind>().unwrap(), StrategyKind::Local);
        assert!("annealing".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let path = std::env::temp_dir().join("crescendo_absent_config.json");
        let _ = std::fs::remove_file(&path);
        let config = EngineConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.stats_window, 50);
    }
}
