use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Historique insuffisant : {needed} tirages requis, {available} disponibles")]
    InsufficientData { needed: usize, available: usize },

    #[error("Jeu de paramètres invalide : {0}")]
    InvalidParameterSet(String),

    #[error("Le jeu de paramètres actif a changé entre-temps, relisez-le avant de réappliquer")]
    ConcurrentModification,

    #[error("Fenêtre de backtest de {window} tirages pour {available} tirages disponibles")]
    InsufficientHistory { window: usize, available: usize },

    #[error("Aucun candidat à évaluer")]
    NoCandidates,

    #[error("Optimisation annulée")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Identifiant stable exposé aux clients.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::InvalidParameterSet(_) => "invalid_parameter_set",
            EngineError::ConcurrentModification => "concurrent_modification",
            EngineError::InsufficientHistory { .. } => "insufficient_history",
            EngineError::NoCandidates => "no_candidates",
            EngineError::Cancelled => "cancelled",
            EngineError::Store(_) => "storage",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

pub(crate) fn check_params(params: &crescendo_db::models::ParameterSet) -> EngineResult<()> {
    params
        .validate()
        .map_err(|e| EngineError::InvalidParameterSet(e.to_string()))
}
