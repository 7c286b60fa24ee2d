use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use crate::db;
use crate::models::{Draw, ParameterRecord, ParameterSet, PredictionSnapshot};

/// Journal ordonné des tirages. Ajout seulement.
pub trait DrawLog: Send + Sync {
    fn append(&self, draw: &Draw) -> Result<bool>;
    /// Tous les tirages, du plus ancien au plus récent.
    fn read_all(&self) -> Result<Vec<Draw>>;
    /// Les `n` derniers tirages, du plus ancien au plus récent.
    fn read_last(&self, n: usize) -> Result<Vec<Draw>>;
    fn len(&self) -> Result<usize>;
}

/// Porteur durable du jeu de paramètres actif.
pub trait ParameterStore: Send + Sync {
    fn get_active(&self) -> Result<ParameterSet>;
    fn compare_and_set(&self, expected: &ParameterSet, new: &ParameterSet) -> Result<bool>;
}

/// Prédictions figées au moment de l'enregistrement de chaque tirage.
pub trait PredictionLedger: Send + Sync {
    fn record_prediction(&self, draw_id: u64, snapshot: &PredictionSnapshot) -> Result<bool>;
    fn prediction_for(&self, draw_id: u64) -> Result<Option<PredictionSnapshot>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_db(path)?;
        db::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Verrou de la base empoisonné"))?;
        f(&mut conn)
    }

    pub fn parameter_history(&self, limit: u32) -> Result<Vec<ParameterRecord>> {
        self.with_conn(|conn| db::fetch_parameter_history(conn, limit))
    }

    pub fn active_record(&self) -> Result<Option<ParameterRecord>> {
        self.with_conn(|conn| db::fetch_active_parameters(conn))
    }

    pub fn compare_and_set_with_notes(
        &self,
        expected: &ParameterSet,
        new: &ParameterSet,
        notes: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| db::compare_and_set_parameters(conn, expected, new, notes))
    }
}

impl DrawLog for SqliteStore {
    fn append(&self, draw: &Draw) -> Result<bool> {
        self.with_conn(|conn| db::insert_draw(conn, draw))
    }

    fn read_all(&self) -> Result<Vec<Draw>> {
        self.with_conn(|conn| db::fetch_all_draws(conn))
    }

    fn read_last(&self, n: usize) -> Result<Vec<Draw>> {
        let limit = u32::try_from(n).unwrap_or(u32::MAX);
        self.with_conn(|conn| db::fetch_last_draws(conn, limit))
    }

    fn len(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(db::count_draws(conn)? as usize))
    }
}

impl ParameterStore for SqliteStore {
    fn get_active(&self) -> Result<ParameterSet> {
        Ok(self.active_record()?.map(|r| r.params).unwrap_or_default())
    }

    fn compare_and_set(&self, expected: &ParameterSet, new: &ParameterSet) -> Result<bool> {
        self.compare_and_set_with_notes(expected, new, "Appliqué par l'agent expert")
    }
}

impl PredictionLedger for SqliteStore {
    fn record_prediction(&self, draw_id: u64, snapshot: &PredictionSnapshot) -> Result<bool> {
        self.with_conn(|conn| db::insert_prediction(conn, draw_id, snapshot))
    }

    fn prediction_for(&self, draw_id: u64) -> Result<Option<PredictionSnapshot>> {
        self.with_conn(|conn| db::fetch_prediction(conn, draw_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn draw(id: u64) -> Draw {
        Draw {
            draw_id: id,
            drawn_at: NaiveDateTime::parse_from_str("2024-03-02 15:00:00", TIMESTAMP_FORMAT).unwrap(),
            balls: vec![1, 2, 3, 4, 5],
            bonus: None,
            gain: Some(7.0),
        }
    }

    #[test]
    fn test_draw_log_trait() {
        let store = SqliteStore::in_memory().unwrap();
        for id in 1..=4 {
            assert!(store.append(&draw(id)).unwrap());
        }
        assert_eq!(store.len().unwrap(), 4);
        assert_eq!(store.read_all().unwrap().len(), 4);
        let last = store.read_last(2).unwrap();
        assert_eq!(last.iter().map(|d| d.draw_id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(last[0].gain, Some(7.0));
    }

    #[test]
    fn test_default_active_parameters() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get_active().unwrap(), ParameterSet::default());
    }

    #[test]
    fn test_concurrent_compare_and_set_single_winner() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let baseline = store.get_active().unwrap();
        let candidates = [
            ParameterSet::new(0.2, 0.2, 0.5),
            ParameterSet::new(0.8, 0.8, 0.9),
        ];

        let handles: Vec<_> = candidates
            .iter()
            .map(|c| {
                let store = Arc::clone(&store);
                let c = *c;
                std::thread::spawn(move || store.compare_and_set(&baseline, &c).unwrap())
            })
            .collect();
        let wins: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
        let active = store.get_active().unwrap();
        assert!(candidates.contains(&active));
    }
}
