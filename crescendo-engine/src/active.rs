use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crescendo_db::models::ParameterSet;
use crescendo_db::store::ParameterStore;

use crate::error::{check_params, EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Applied,
    /// Le jeu demandé était déjà actif.
    Unchanged,
}

/// Jeu de paramètres actif du processus. Chargé depuis le store au démarrage,
/// rechargé après chaque application, en lecture seule ailleurs.
pub struct ActiveParameters {
    current: RwLock<ParameterSet>,
    apply_lock: Mutex<()>,
}

impl ActiveParameters {
    pub fn load(store: &dyn ParameterStore) -> EngineResult<Self> {
        let params = store.get_active()?;
        log::info!("Paramètres actifs : {}", params);
        Ok(Self {
            current: RwLock::new(params),
            apply_lock: Mutex::new(()),
        })
    }

    pub fn get(&self) -> ParameterSet {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn refresh(&self, store: &dyn ParameterStore) -> EngineResult<ParameterSet> {
        let params = store.get_active()?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = params;
        Ok(params)
    }

    /// Compare-and-set contre `expected` (par défaut le jeu lu par ce processus).
    pub fn apply(
        &self,
        store: &dyn ParameterStore,
        expected: Option<ParameterSet>,
        new: ParameterSet,
    ) -> EngineResult<ApplyOutcome> {
        check_params(&new)?;
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());

        let stored = store.get_active()?;
        if stored == new {
            self.refresh(store)?;
            return Ok(ApplyOutcome::Unchanged);
        }

        let expected = expected.unwrap_or_else(|| self.get());
        if !store.compare_and_set(&expected, &new)? {
            self.refresh(store)?;
            log::warn!("Application refusée : le jeu actif n'est plus {}", expected);
            return Err(EngineError::ConcurrentModification);
        }

        self.refresh(store)?;
        log::info!("Nouveaux paramètres appliqués : {}", new);
        Ok(ApplyOutcome::Applied)
    }
}
