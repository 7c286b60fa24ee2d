use std::path::Path;

use anyhow::{Context, Result};

use crescendo_db::models::ParameterSet;
use crescendo_db::store::SqliteStore;
use crescendo_engine::config::EngineConfig;
use crescendo_engine::ingest::{self, CsvFeed, RefreshOptions, RefreshReport};

/// Importe un fichier CSV dans la base. Avec `snapshots`, chaque nouveau
/// tirage reçoit la prédiction calculée juste avant son insertion.
pub fn import_csv(
    store: &SqliteStore,
    path: &Path,
    config: &EngineConfig,
    params: &ParameterSet,
    snapshots: bool,
) -> Result<RefreshReport> {
    let feed = CsvFeed::new(path, config.rules);
    let options = RefreshOptions {
        snapshot_predictions: snapshots,
    };
    let report = ingest::refresh(&feed, store, store, config, params, options)
        .with_context(|| format!("Import de {:?} impossible", path))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crescendo_db::store::{DrawLog, PredictionLedger};

    const SAMPLE: &str = "\
draw_id;drawn_at;b1;b2;b3;b4;b5;bonus;gain
1;01/01/2024 13h00;1;2;3;4;5;A;
2;01/01/2024 14h00;6;7;8;9;10;b;12,50
3;01/01/2024 15h00;11;12;13;14;15;C;
3;01/01/2024 15h00;11;12;13;14;15;C;
4;01/01/2024 16h00;1;2;3;4;99;D;
";

    fn write_sample(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("crescendo-{}-{}.csv", name, std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_import_counts_inserted_skipped_and_errors() {
        let path = write_sample("counts");
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();

        let report = import_csv(&store, &path, &config, &ParameterSet::default(), false).unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 1);
        assert!(report.updated);
        assert_eq!(store.len().unwrap(), 3);
        assert!(store.prediction_for(1).unwrap().is_none());

        let again = import_csv(&store, &path, &config, &ParameterSet::default(), false).unwrap();
        assert_eq!(again.inserted, 0);
        assert!(!again.updated);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_import_with_snapshots_records_predictions() {
        let path = write_sample("snapshots");
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();

        import_csv(&store, &path, &config, &ParameterSet::default(), true).unwrap();
        let first = store.prediction_for(1).unwrap().unwrap();
        assert!(first.statistical.is_empty());
        assert!(store.prediction_for(3).unwrap().is_some());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_import_missing_file_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        let result = import_csv(
            &store,
            Path::new("/nonexistent/crescendo.csv"),
            &config,
            &ParameterSet::default(),
            false,
        );
        assert!(result.is_err());
    }
}
