use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crescendo_db::db::db_path;
use crescendo_db::store::SqliteStore;
use crescendo_engine::config::EngineConfig;
use crescendo_engine::ingest::{CsvFeed, DrawFeed};
use crescendo_server::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "crescendo-server", version, about = "Service HTTP de prédiction Crescendo")]
struct Cli {
    /// Adresse d'écoute, par exemple 127.0.0.1:8000
    #[arg(long, default_value = "127.0.0.1:8000", env = "CRESCENDO_LISTEN")]
    listen: SocketAddr,
    /// Base SQLite (défaut : data/crescendo.db)
    #[arg(long, env = "CRESCENDO_DB")]
    db: Option<PathBuf>,
    /// Configuration JSON du moteur
    #[arg(long, env = "CRESCENDO_CONFIG")]
    config: Option<PathBuf>,
    /// Flux CSV des tirages relu par /refresh
    #[arg(long, env = "CRESCENDO_FEED")]
    feed: Option<PathBuf>,
    /// Intervalle de rafraîchissement automatique en secondes (0 = désactivé)
    #[arg(long, default_value_t = 60)]
    refresh_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    let path = cli.db.unwrap_or_else(db_path);
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    log::info!("Base : {}", path.display());

    let feed: Option<Arc<dyn DrawFeed>> = cli.feed.as_ref().map(|p| {
        log::info!("Flux de tirages : {}", p.display());
        Arc::new(CsvFeed::new(p, config.rules)) as Arc<dyn DrawFeed>
    });

    let state = AppState::new(Arc::new(store), config, feed)?;

    if state.feed.is_some() && cli.refresh_interval > 0 {
        let scheduled = state.clone();
        let period = Duration::from_secs(cli.refresh_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let worker = scheduled.clone();
                match tokio::task::spawn_blocking(move || worker.refresh()).await {
                    Ok(Ok(report)) if report.updated => {
                        log::info!("Rafraîchissement : {} nouveaux tirages", report.inserted)
                    }
                    Ok(Ok(_)) => log::debug!("Rafraîchissement : rien de nouveau"),
                    Ok(Err(e)) => log::warn!("Rafraîchissement échoué : {}", e),
                    Err(e) => log::error!("Tâche de rafraîchissement interrompue : {}", e),
                }
            }
        });
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    log::info!("crescendo-server à l'écoute sur {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
