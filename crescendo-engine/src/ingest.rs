use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crescendo_db::models::{validate_draw, Draw, GameRules, ParameterSet, TIMESTAMP_FORMAT};
use crescendo_db::store::{DrawLog, PredictionLedger};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::matrix::MatrixAccumulator;
use crate::prediction::snapshot_for;
use crate::schedule::DrawSchedule;

/// Lot de tirages lus depuis une source externe.
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub draws: Vec<Draw>,
    pub errors: Vec<String>,
}

/// Source de nouveaux tirages.
pub trait DrawFeed: Send + Sync {
    fn fetch(&self) -> Result<FeedBatch>;
}

pub fn parse_french_decimal(s: &str) -> Result<Option<f64>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let normalized = s.replace(' ', "").replace(',', ".");
    normalized
        .parse::<f64>()
        .map(Some)
        .with_context(|| format!("Impossible de parser le nombre: '{}'", s))
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M", "%d/%m/%Y %Hh%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    bail!("Format de date invalide: '{}'", raw)
}

/// Colonnes : `draw_id;drawn_at;b1;...;bk;bonus[;gain]`.
fn parse_record(record: &csv::StringRecord, rules: &GameRules) -> Result<Draw> {
    let get = |idx: usize| -> Result<String> {
        record
            .get(idx)
            .map(|s| s.trim().to_string())
            .with_context(|| format!("Champ manquant à l'index {}", idx))
    };

    let raw_id = get(0)?;
    let draw_id = raw_id
        .parse::<u64>()
        .with_context(|| format!("Identifiant de tirage invalide: '{}'", raw_id))?;
    let drawn_at = parse_timestamp(&get(1)?)?;

    let k = rules.pick_count;
    let balls = (2..2 + k)
        .map(|idx| {
            let s = get(idx)?;
            s.parse::<u8>()
                .with_context(|| format!("Impossible de parser '{}' (index {})", s, idx))
        })
        .collect::<Result<Vec<u8>>>()?;

    let bonus = match record.get(2 + k).map(str::trim) {
        Some(s) if !s.is_empty() => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c.to_ascii_uppercase()),
                _ => bail!("Lettre bonus invalide: '{}'", s),
            }
        }
        _ => None,
    };
    let gain = match record.get(3 + k) {
        Some(s) => parse_french_decimal(s)?,
        None => None,
    };

    let draw = Draw {
        draw_id,
        drawn_at,
        balls,
        bonus,
        gain,
    };
    validate_draw(&draw, rules)?;
    Ok(draw)
}

/// Flux CSV délimité par `;`, avec ligne d'en-tête.
pub struct CsvFeed {
    path: PathBuf,
    rules: GameRules,
}

impl CsvFeed {
    pub fn new(path: &Path, rules: GameRules) -> Self {
        Self {
            path: path.to_path_buf(),
            rules,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse<R: Read>(reader: R, rules: &GameRules) -> FeedBatch {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(reader);

        let mut batch = FeedBatch::default();
        for (line, record_result) in reader.records().enumerate() {
            let parsed = record_result
                .map_err(anyhow::Error::from)
                .and_then(|record| parse_record(&record, rules));
            match parsed {
                Ok(draw) => batch.draws.push(draw),
                Err(e) => {
                    log::warn!("Ligne {} ignorée : {}", line + 2, e);
                    batch.errors.push(format!("ligne {}: {}", line + 2, e));
                }
            }
        }
        batch
    }
}

impl DrawFeed for CsvFeed {
    fn fetch(&self) -> Result<FeedBatch> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Impossible d'ouvrir {:?}", self.path))?;
        Ok(Self::parse(file, &self.rules))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Fige la prédiction courante avant chaque nouveau tirage.
    pub snapshot_predictions: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub updated: bool,
}

impl RefreshReport {
    pub fn message(&self, schedule: &DrawSchedule, now: NaiveDateTime) -> String {
        if self.updated {
            "Nouvelle prédiction générée avec succès !".to_string()
        } else {
            format!(
                "Il s'agit de la bonne prédiction pour le prochain tirage de {}.",
                schedule.next_draw_label(now)
            )
        }
    }
}

/// Ajoute au journal les tirages nouveaux du flux, dans l'ordre des identifiants.
pub fn refresh(
    feed: &dyn DrawFeed,
    draw_log: &dyn DrawLog,
    ledger: &dyn PredictionLedger,
    config: &EngineConfig,
    params: &ParameterSet,
    options: RefreshOptions,
) -> EngineResult<RefreshReport> {
    let mut batch = feed.fetch()?;
    batch.draws.sort_by_key(|d| d.draw_id);

    let mut report = RefreshReport {
        total: batch.draws.len() + batch.errors.len(),
        errors: batch.errors.len(),
        ..RefreshReport::default()
    };

    let mut known = draw_log.read_all()?;
    let mut acc = if options.snapshot_predictions {
        Some(known.iter().fold(MatrixAccumulator::new(&config.rules), MatrixAccumulator::push))
    } else {
        None
    };

    for draw in batch.draws {
        let latest = known.last().map(|d| d.draw_id);
        if latest.is_some_and(|id| draw.draw_id <= id) {
            match draw_log.append(&draw) {
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    log::warn!("Tirage {} rejeté : {}", draw.draw_id, e);
                    report.errors += 1;
                }
            }
            continue;
        }

        let snapshot = match &acc {
            Some(acc) => Some(snapshot_for(&known, config, params, &acc.snapshot())?),
            None => None,
        };
        if !draw_log.append(&draw)? {
            report.skipped += 1;
            continue;
        }
        if let Some(snapshot) = snapshot {
            ledger.record_prediction(draw.draw_id, &snapshot)?;
        }
        if let Some(acc) = acc.as_mut() {
            acc.add(&draw);
        }
        report.inserted += 1;
        known.push(draw);
    }

    report.updated = report.inserted > 0;
    if report.updated {
        log::info!(
            "{} nouveaux tirages ({} déjà connus, {} erreurs)",
            report.inserted,
            report.skipped,
            report.errors
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_test_draws;
    use crescendo_db::store::SqliteStore;

    struct StaticFeed(Vec<Draw>);

    impl DrawFeed for StaticFeed {
        fn fetch(&self) -> Result<FeedBatch> {
            Ok(FeedBatch { draws: self.0.clone(), errors: vec![] })
        }
    }

    const SAMPLE: &str = "draw_id;drawn_at;b1;b2;b3;b4;b5;bonus;gain\n\
2024060313;2024-06-03 13:00:00;3;7;12;19;24;B;1 250,50\n\
2024060314;03/06/2024 14:00;1;7;15;19;25;a;\n\
2024060315;2024-06-03 15:00:00;1;1;2;3;4;C;\n\
2024060316;2024-06-03 16:00:00;1;2;3;4;26;C;\n\
2024060317;2024-06-03 17:00:00;1;2;3;4;5\n";

    #[test]
    fn test_parse_french_decimal() {
        assert_eq!(parse_french_decimal("109156,50").unwrap(), Some(109156.50));
        assert_eq!(parse_french_decimal("  42,5  ").unwrap(), Some(42.5));
        assert_eq!(parse_french_decimal("").unwrap(), None);
        assert!(parse_french_decimal("abc").is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2024-06-03 13:00:00").unwrap();
        let b = parse_timestamp("03/06/2024 13:00").unwrap();
        let c = parse_timestamp("03/06/2024 13h00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_timestamp("hier").is_err());
    }

    #[test]
    fn test_csv_feed_parsing() {
        let batch = CsvFeed::parse(SAMPLE.as_bytes(), &GameRules::default());
        assert_eq!(batch.draws.len(), 3);
        assert_eq!(batch.errors.len(), 2);
        let first = &batch.draws[0];
        assert_eq!(first.draw_id, 2024060313);
        assert_eq!(first.balls, vec![3, 7, 12, 19, 24]);
        assert_eq!(first.bonus, Some('B'));
        assert_eq!(first.gain, Some(1250.5));
        assert_eq!(batch.draws[1].bonus, Some('A'));
        assert_eq!(batch.draws[1].gain, None);
        assert_eq!(batch.draws[2].bonus, None);
    }

    #[test]
    fn test_csv_feed_rejects_multi_letter_bonus() {
        let csv = "draw_id;drawn_at;b1;b2;b3;b4;b5;bonus\n\
2024060313;2024-06-03 13:00:00;3;7;12;19;24;AB\n\
2024060314;2024-06-03 14:00:00;1;7;15;19;25;b\n";
        let batch = CsvFeed::parse(csv.as_bytes(), &GameRules::default());
        assert_eq!(batch.draws.len(), 1);
        assert_eq!(batch.draws[0].bonus, Some('B'));
        assert_eq!(batch.errors.len(), 1);
        assert!(batch.errors[0].contains("AB"));
    }

    #[test]
    fn test_refresh_inserts_new_and_snapshots() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        let draws = make_test_draws(12, &config.rules);
        for d in &draws[..10] {
            store.append(d).unwrap();
        }

        let feed = StaticFeed(draws.iter().rev().cloned().collect());
        let options = RefreshOptions { snapshot_predictions: true };
        let report = refresh(&feed, &store, &store, &config, &ParameterSet::default(), options).unwrap();
        assert_eq!(report.total, 12);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 10);
        assert!(report.updated);
        assert_eq!(store.len().unwrap(), 12);

        let snap = store.prediction_for(11).unwrap().unwrap();
        let expected = crate::statistical::predict(&draws[..10], &config.rules, &ParameterSet::default(), 20)
            .unwrap();
        assert_eq!(snap.statistical, expected.numbers);
        assert!(store.prediction_for(12).unwrap().is_some());
        assert!(store.prediction_for(10).unwrap().is_none());

        let again = refresh(&feed, &store, &store, &config, &ParameterSet::default(), options).unwrap();
        assert!(!again.updated);
        assert_eq!(again.inserted, 0);
    }

    #[test]
    fn test_refresh_without_snapshots() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        let feed = StaticFeed(make_test_draws(4, &config.rules));
        let report = refresh(&feed, &store, &store, &config, &ParameterSet::default(), RefreshOptions::default())
            .unwrap();
        assert_eq!(report.inserted, 4);
        assert!(store.prediction_for(1).unwrap().is_none());
    }

    #[test]
    fn test_refresh_message() {
        let now = parse_timestamp("2024-06-03 14:10:00").unwrap();
        let schedule = DrawSchedule::default();
        let report = RefreshReport::default();
        assert!(report.message(&schedule, now).ends_with("15h00."));
        let updated = RefreshReport { updated: true, ..RefreshReport::default() };
        assert!(updated.message(&schedule, now).starts_with("Nouvelle prédiction"));
    }
}
