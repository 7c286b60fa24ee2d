#![deny(unsafe_code)]

pub mod error;

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crescendo_db::models::ParameterSet;
use crescendo_db::store::{DrawLog, SqliteStore};
use crescendo_engine::active::ActiveParameters;
use crescendo_engine::algorithmic::{self, AlgorithmicPrediction};
use crescendo_engine::config::{EngineConfig, StrategyKind};
use crescendo_engine::expert::{Analysis, ApplyReport, Expert};
use crescendo_engine::history::{self, HistoryEntry};
use crescendo_engine::ingest::{self, DrawFeed, RefreshOptions, RefreshReport};
use crescendo_engine::matrix::MatrixCache;
use crescendo_engine::optimizer::{CancelFlag, OptimizationResult};
use crescendo_engine::prediction::{self, Prediction};
use crescendo_engine::stats::{self, StatsReport};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub active: Arc<ActiveParameters>,
    pub matrices: Arc<MatrixCache>,
    pub config: Arc<EngineConfig>,
    pub feed: Option<Arc<dyn DrawFeed>>,
    /// Un seul rafraîchissement à la fois (tâche périodique et `POST /refresh`).
    refresh_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        config: EngineConfig,
        feed: Option<Arc<dyn DrawFeed>>,
    ) -> anyhow::Result<Self> {
        let active = ActiveParameters::load(store.as_ref())?;
        Ok(Self {
            store,
            active: Arc::new(active),
            matrices: Arc::new(MatrixCache::new()),
            config: Arc::new(config),
            feed,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    fn expert(&self) -> Expert<'_> {
        Expert {
            draws: self.store.as_ref(),
            store: self.store.as_ref(),
            active: self.active.as_ref(),
            config: self.config.as_ref(),
        }
    }

    /// Relit le flux et fige la prédiction courante de chaque nouveau tirage.
    pub fn refresh(&self) -> Result<RefreshReport, ApiError> {
        let feed = self.feed.as_ref().ok_or_else(|| {
            ApiError::unavailable("no_feed", "Aucune source de tirages configurée")
        })?;
        let _guard = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        let report = ingest::refresh(
            feed.as_ref(),
            self.store.as_ref(),
            self.store.as_ref(),
            &self.config,
            &self.active.get(),
            RefreshOptions {
                snapshot_predictions: true,
            },
        )?;
        Ok(report)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/predict", get(predict))
        .route("/stats", get(get_stats))
        .route("/matrix", get(matrix))
        .route("/history", get(get_history))
        .route("/expert/analysis", get(expert_analysis))
        .route("/expert/optimize", post(expert_optimize))
        .route("/expert/apply", post(expert_apply))
        .route("/refresh", post(refresh))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Les calculs tournent hors du runtime asynchrone.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Tâche interrompue : {}", e)))?
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: NaiveDateTime,
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online".to_string(),
        timestamp: Local::now().naive_local(),
    })
}

async fn predict(State(state): State<AppState>) -> Result<Json<Prediction>, ApiError> {
    let prediction = blocking(move || {
        let draws = state.store.read_all()?;
        let matrices = state.matrices.get_or_build(&draws, &state.config.rules);
        Ok(prediction::predict(
            &draws,
            &state.config,
            &state.active.get(),
            &matrices,
            Local::now().naive_local(),
        )?)
    })
    .await?;
    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    window: Option<usize>,
}

async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsReport>, ApiError> {
    let window = query.window.unwrap_or(state.config.stats_window);
    if window == 0 {
        return Err(ApiError::bad_request("window doit être positif"));
    }
    let report = blocking(move || {
        let draws = state.store.read_all()?;
        Ok(stats::summarize(&draws, &state.config.rules, window)?)
    })
    .await?;
    Ok(Json(report))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixResponse {
    pub matrix_a: Vec<Vec<f64>>,
    pub matrix_b: Vec<Vec<u32>>,
    pub prediction: AlgorithmicPrediction,
}

async fn matrix(State(state): State<AppState>) -> Result<Json<MatrixResponse>, ApiError> {
    let response = blocking(move || {
        let draws = state.store.read_all()?;
        let matrices = state.matrices.get_or_build(&draws, &state.config.rules);
        let prediction = algorithmic::predict_with(&matrices, &draws, &state.config.rules)?;
        Ok(MatrixResponse {
            matrix_a: matrices.temporal_rows(),
            matrix_b: matrices.spatial_rows(),
            prediction,
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let entries = blocking(move || {
        let payouts = state.config.payout_table();
        Ok(history::history(
            state.store.as_ref(),
            state.store.as_ref(),
            limit,
            &payouts,
        )?)
    })
    .await?;
    Ok(Json(entries))
}

async fn expert_analysis(State(state): State<AppState>) -> Result<Json<Analysis>, ApiError> {
    let analysis = blocking(move || Ok(state.expert().analyze()?)).await?;
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
struct OptimizeQuery {
    strategy: Option<StrategyKind>,
}

/// Lève le signal d'annulation si la requête est abandonnée en cours de route.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn expert_optimize(
    State(state): State<AppState>,
    Query(query): Query<OptimizeQuery>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let cancel = CancelFlag::new();
    let _guard = CancelOnDrop(cancel.clone());
    let result =
        blocking(move || Ok(state.expert().optimize(query.strategy, &cancel)?)).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(flatten)]
    pub params: ParameterSet,
    /// Jeu actif lu par le client avant l'optimisation.
    pub expected: Option<ParameterSet>,
}

async fn expert_apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyReport>, ApiError> {
    let report =
        blocking(move || Ok(state.expert().apply(request.expected, request.params)?)).await?;
    Ok(Json(report))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub status: String,
    pub updated: bool,
    pub inserted: usize,
    pub message: String,
}

async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    let schedule = state.config.schedule;
    let report = blocking(move || state.refresh()).await?;
    Ok(Json(RefreshResponse {
        status: if report.updated { "updated" } else { "current" }.to_string(),
        updated: report.updated,
        inserted: report.inserted,
        message: report.message(&schedule, Local::now().naive_local()),
    }))
}
