mod display;
mod import;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crescendo_db::db::db_path;
use crescendo_db::models::{validate_draw, Draw, GameRules, ParameterSet};
use crescendo_db::store::{DrawLog, PredictionLedger, SqliteStore};
use crescendo_engine::active::{ActiveParameters, ApplyOutcome};
use crescendo_engine::backtest::BacktestEvaluator;
use crescendo_engine::config::{EngineConfig, StrategyKind};
use crescendo_engine::expert::Expert;
use crescendo_engine::ingest::parse_timestamp;
use crescendo_engine::matrix::build_matrices;
use crescendo_engine::optimizer::CancelFlag;
use crescendo_engine::{history, prediction, stats};

use crate::display::{
    display_analysis, display_backfill, display_draws, display_history, display_import_summary,
    display_matrix, display_optimization, display_prediction, display_stats,
};

#[derive(Parser)]
#[command(name = "crescendo", version, about = "Moteur de prédiction Crescendo")]
struct Cli {
    /// Base SQLite (défaut : data/crescendo.db)
    #[arg(long, global = true, env = "CRESCENDO_DB")]
    db: Option<PathBuf>,

    /// Configuration JSON du moteur
    #[arg(long, global = true, env = "CRESCENDO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer les tirages depuis un fichier CSV
    Import {
        /// Chemin vers le fichier CSV
        #[arg(short, long)]
        file: PathBuf,

        /// Figer la prédiction de chaque nouveau tirage
        #[arg(long)]
        snapshots: bool,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages
    List {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: usize,
    },

    /// Ajouter un tirage manuellement
    Add,

    /// Afficher les statistiques (fréquences, retards, parité)
    Stats {
        /// Fenêtre d'analyse (nombre de tirages)
        #[arg(short, long, default_value = "50")]
        window: usize,
    },

    /// Prédire le prochain tirage avec les deux modèles
    Predict,

    /// Afficher une ligne des matrices de transition et de co-occurrence
    Matrix {
        /// Numéro dont afficher la ligne
        #[arg(short, long, default_value = "1")]
        number: u8,
    },

    /// Historique des tirages avec la prédiction figée et le gain
    History {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Précision du jeu de paramètres actif
    Analyze,

    /// Chercher un meilleur jeu de paramètres (jamais appliqué automatiquement)
    Optimize {
        /// Stratégie : grid, random ou local
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Appliquer un jeu de paramètres
    Apply {
        /// Poids de la fréquence
        #[arg(long)]
        freq: f64,

        /// Poids du retard
        #[arg(long)]
        gap: f64,

        /// Taux de décroissance du retard
        #[arg(long)]
        decay: f64,
    },

    /// Reconstituer les prédictions manquantes de l'historique
    Backfill,
}

struct App {
    store: SqliteStore,
    config: EngineConfig,
    active: ActiveParameters,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let config = EngineConfig::load_or_default(cli.config.as_deref())?;
        let path = cli.db.clone().unwrap_or_else(db_path);
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
        let active = ActiveParameters::load(&store)?;
        Ok(Self { store, config, active })
    }

    fn expert(&self) -> Expert<'_> {
        Expert {
            draws: &self.store,
            store: &self.store,
            active: &self.active,
            config: &self.config,
        }
    }

    /// Tous les tirages, ou `None` si la base est vide.
    fn draws(&self) -> Result<Option<Vec<Draw>>> {
        let draws = self.store.read_all()?;
        if draws.is_empty() {
            println!("Base vide. Lancez d'abord : crescendo import --file <CSV>");
            return Ok(None);
        }
        Ok(Some(draws))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Command::DbPath = cli.command {
        println!("{}", cli.db.clone().unwrap_or_else(db_path).display());
        return Ok(());
    }

    let ctx = App::open(&cli)?;
    match cli.command {
        Command::Import { file, snapshots } => cmd_import(&ctx, &file, snapshots),
        Command::DbPath => Ok(()),
        Command::List { last } => cmd_list(&ctx, last),
        Command::Add => cmd_add(&ctx),
        Command::Stats { window } => cmd_stats(&ctx, window),
        Command::Predict => cmd_predict(&ctx),
        Command::Matrix { number } => cmd_matrix(&ctx, number),
        Command::History { limit } => cmd_history(&ctx, limit),
        Command::Analyze => cmd_analyze(&ctx),
        Command::Optimize { strategy } => cmd_optimize(&ctx, strategy.as_deref()),
        Command::Apply { freq, gap, decay } => cmd_apply(&ctx, ParameterSet::new(freq, gap, decay)),
        Command::Backfill => cmd_backfill(&ctx),
    }
}

fn cmd_import(ctx: &App, file: &Path, snapshots: bool) -> Result<()> {
    let report = import::import_csv(&ctx.store, file, &ctx.config, &ctx.active.get(), snapshots)?;
    display_import_summary(&report);
    Ok(())
}

fn cmd_list(ctx: &App, last: usize) -> Result<()> {
    if ctx.store.len()? == 0 {
        println!("Base vide. Lancez d'abord : crescendo import --file <CSV>");
        return Ok(());
    }
    let mut draws = ctx.store.read_last(last)?;
    draws.reverse();
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(ctx: &App, window: usize) -> Result<()> {
    let Some(draws) = ctx.draws()? else {
        return Ok(());
    };
    let report = stats::summarize(&draws, &ctx.config.rules, window)?;
    display_stats(&report);
    Ok(())
}

fn cmd_predict(ctx: &App) -> Result<()> {
    let Some(draws) = ctx.draws()? else {
        return Ok(());
    };
    let matrices = build_matrices(&draws, &ctx.config.rules);
    let now = Local::now().naive_local();
    let prediction = prediction::predict(&draws, &ctx.config, &ctx.active.get(), &matrices, now)?;
    display_prediction(&prediction);
    Ok(())
}

fn cmd_matrix(ctx: &App, number: u8) -> Result<()> {
    if !ctx.config.rules.contains(number) {
        bail!("Numéro hors plage : {} (1-{})", number, ctx.config.rules.pool_size);
    }
    let Some(draws) = ctx.draws()? else {
        return Ok(());
    };
    let matrices = build_matrices(&draws, &ctx.config.rules);
    display_matrix(&matrices, number);
    Ok(())
}

fn cmd_history(ctx: &App, limit: usize) -> Result<()> {
    let payouts = ctx.config.payout_table();
    let entries = history::history(&ctx.store, &ctx.store, limit, &payouts)?;
    display_history(&entries);
    Ok(())
}

fn cmd_analyze(ctx: &App) -> Result<()> {
    let analysis = ctx.expert().analyze()?;
    let draws = ctx.store.read_all()?;
    let evaluator = BacktestEvaluator::new(
        &draws,
        &ctx.config.rules,
        ctx.config.backtest_window,
        ctx.config.prediction_window,
    )?;
    let report = evaluator.report(&analysis.current_params)?;
    let history = ctx.store.parameter_history(10)?;
    display_analysis(&analysis, &report, &history);
    Ok(())
}

fn cmd_optimize(ctx: &App, strategy: Option<&str>) -> Result<()> {
    let kind = strategy.map(str::parse::<StrategyKind>).transpose()?;

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }

    let result = ctx
        .expert()
        .optimize_with_progress(kind, &CancelFlag::new(), |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        });
    pb.finish_and_clear();

    display_optimization(&result?);
    Ok(())
}

fn cmd_apply(ctx: &App, params: ParameterSet) -> Result<()> {
    let report = ctx.expert().apply(None, params)?;
    match report.status {
        ApplyOutcome::Applied => println!("Paramètres appliqués : {}", report.params),
        ApplyOutcome::Unchanged => println!("Ces paramètres sont déjà actifs : {}", report.params),
    }
    Ok(())
}

fn cmd_backfill(ctx: &App) -> Result<()> {
    let report = history::backfill(&ctx.store, &ctx.store, &ctx.config, &ctx.active.get())?;
    display_backfill(&report);
    Ok(())
}

fn cmd_add(ctx: &App) -> Result<()> {
    let rules = ctx.config.rules;
    println!("Ajout d'un tirage manuellement\n");

    let raw_id = prompt("Identifiant du tirage (ex: 2024060313) : ")?;
    let draw_id = raw_id
        .parse::<u64>()
        .with_context(|| format!("Identifiant invalide : '{}'", raw_id))?;
    let drawn_at = parse_timestamp(&prompt("Date et heure (JJ/MM/AAAA HHhMM) : ")?)?;
    let balls = prompt_balls(&rules)?;
    let bonus = prompt_bonus(&rules)?;

    let draw = Draw {
        draw_id,
        drawn_at,
        balls,
        bonus,
        gain: None,
    };
    validate_draw(&draw, &rules)?;

    println!("\nTirage à insérer :");
    display_draws(std::slice::from_ref(&draw));

    let confirm = prompt("\nConfirmer l'insertion ? (o/n) : ")?;
    if confirm.trim().to_lowercase() != "o" {
        println!("Insertion annulée.");
        return Ok(());
    }

    // La prédiction est figée avant que le tirage n'entre dans l'historique
    let known = ctx.store.read_all()?;
    if known.last().is_some_and(|d| draw.draw_id <= d.draw_id) {
        if ctx.store.append(&draw)? {
            println!("Tirage inséré avec succès.");
        } else {
            println!("Ce tirage existe déjà (doublon ignoré).");
        }
        return Ok(());
    }
    let matrices = build_matrices(&known, &rules);
    let snapshot = prediction::snapshot_for(&known, &ctx.config, &ctx.active.get(), &matrices)?;
    if ctx.store.append(&draw)? {
        ctx.store.record_prediction(draw.draw_id, &snapshot)?;
        println!("Tirage inséré avec succès.");
    } else {
        println!("Ce tirage existe déjà (doublon ignoré).");
    }
    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Erreur de lecture")?;
    Ok(input.trim().to_string())
}

fn prompt_balls(rules: &GameRules) -> Result<Vec<u8>> {
    let k = rules.pick_count;
    loop {
        let input = prompt(&format!(
            "{} boules (séparées par des espaces, 1-{}) : ",
            k, rules.pool_size
        ))?;
        let nums: Result<Vec<u8>, _> = input.split_whitespace().map(|s| s.parse::<u8>()).collect();
        match nums {
            Ok(v) if v.len() == k => {
                let mut sorted = v.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.len() == k && v.iter().all(|&b| rules.contains(b)) {
                    return Ok(v);
                }
                println!("Numéros invalides (1-{}, pas de doublons). Réessayez.", rules.pool_size);
            }
            _ => println!("Entrez exactement {} numéros. Réessayez.", k),
        }
    }
}

fn prompt_bonus(rules: &GameRules) -> Result<Option<char>> {
    let letters: String = rules.bonus_letters().collect();
    loop {
        let input = prompt(&format!("Lettre bonus ({}, vide si aucune) : ", letters))?;
        if input.is_empty() {
            return Ok(None);
        }
        match input.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some(c) if input.chars().count() == 1 && letters.contains(c) => return Ok(Some(c)),
            _ => println!("Lettre invalide. Réessayez."),
        }
    }
}
