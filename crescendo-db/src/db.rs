use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;

use crate::models::{Draw, ParameterRecord, ParameterSet, PredictionSnapshot, TIMESTAMP_FORMAT};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    draw_id    INTEGER PRIMARY KEY,
    drawn_at   TEXT NOT NULL,
    balls      TEXT NOT NULL,
    bonus      TEXT,
    gain       REAL
);

CREATE TABLE IF NOT EXISTS parameter_sets (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    freq_weight REAL NOT NULL,
    gap_weight  REAL NOT NULL,
    decay_rate  REAL NOT NULL,
    active      INTEGER NOT NULL DEFAULT 0,
    applied_at  TEXT NOT NULL,
    notes       TEXT NOT NULL DEFAULT ''
);

CREATE UNIQUE INDEX IF NOT EXISTS parameter_sets_single_active
    ON parameter_sets (active) WHERE active = 1;

CREATE TABLE IF NOT EXISTS predictions (
    draw_id   INTEGER PRIMARY KEY,
    snapshot  TEXT NOT NULL
);
";

const DRAW_COLUMNS: &str = "draw_id, drawn_at, balls, bonus, gain";

type DrawRow = (i64, String, String, Option<String>, Option<f64>);

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("crescendo.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

fn encode_balls(balls: &[u8]) -> String {
    balls.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",")
}

fn decode_balls(raw: &str) -> Result<Vec<u8>> {
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<u8>()
                .with_context(|| format!("Boule illisible '{}'", s))
        })
        .collect()
}

fn draw_from_row((draw_id, drawn_at, balls, bonus, gain): DrawRow) -> Result<Draw> {
    Ok(Draw {
        draw_id: draw_id as u64,
        drawn_at: NaiveDateTime::parse_from_str(&drawn_at, TIMESTAMP_FORMAT)
            .with_context(|| format!("Horodatage illisible '{}'", drawn_at))?,
        balls: decode_balls(&balls)?,
        bonus: bonus.and_then(|s| s.chars().next()),
        gain,
    })
}

fn query_draws(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<Vec<DrawRow>, _>>()?;
    rows.into_iter().map(draw_from_row).collect()
}

/// Ajoute un tirage en fin de journal. Retourne `false` si l'identifiant existe déjà ;
/// un identifiant antérieur au dernier tirage enregistré est refusé.
pub fn insert_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    if let Some(latest) = latest_draw_id(conn)? {
        if draw.draw_id < latest {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM draws WHERE draw_id = ?1)",
                [draw.draw_id as i64],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(false);
            }
            bail!(
                "Tirage {} antérieur au dernier tirage enregistré ({})",
                draw.draw_id,
                latest
            );
        }
    }
    let changed = conn.execute(
        "INSERT OR IGNORE INTO draws (draw_id, drawn_at, balls, bonus, gain)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            draw.draw_id as i64,
            draw.drawn_at.format(TIMESTAMP_FORMAT).to_string(),
            encode_balls(&draw.balls),
            draw.bonus.map(|c| c.to_string()),
            draw.gain,
        ],
    ).context("Échec de l'insertion")?;
    Ok(changed > 0)
}

/// Tous les tirages, du plus ancien au plus récent.
pub fn fetch_all_draws(conn: &Connection) -> Result<Vec<Draw>> {
    query_draws(
        conn,
        &format!("SELECT {DRAW_COLUMNS} FROM draws ORDER BY draw_id ASC"),
        [],
    )
}

/// Les `limit` derniers tirages, du plus ancien au plus récent.
pub fn fetch_last_draws(conn: &Connection, limit: u32) -> Result<Vec<Draw>> {
    let mut draws = query_draws(
        conn,
        &format!("SELECT {DRAW_COLUMNS} FROM draws ORDER BY draw_id DESC LIMIT ?1"),
        [limit],
    )?;
    draws.reverse();
    Ok(draws)
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}

pub fn latest_draw_id(conn: &Connection) -> Result<Option<u64>> {
    let id: Option<i64> = conn.query_row("SELECT MAX(draw_id) FROM draws", [], |row| row.get(0))?;
    Ok(id.map(|id| id as u64))
}

pub fn fetch_active_parameters(conn: &Connection) -> Result<Option<ParameterRecord>> {
    let record = conn
        .query_row(
            "SELECT freq_weight, gap_weight, decay_rate, applied_at, notes
             FROM parameter_sets WHERE active = 1",
            [],
            |row| {
                Ok((
                    ParameterSet::new(row.get(0)?, row.get(1)?, row.get(2)?),
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    record
        .map(|(params, applied_at, notes)| {
            Ok(ParameterRecord {
                params,
                active: true,
                applied_at: NaiveDateTime::parse_from_str(&applied_at, TIMESTAMP_FORMAT)
                    .with_context(|| format!("Horodatage illisible '{}'", applied_at))?,
                notes,
            })
        })
        .transpose()
}

/// Remplace le jeu actif par `new` seulement si le jeu actif vaut encore `expected`.
/// Une base sans jeu actif est considérée comme portant `ParameterSet::default()`.
pub fn compare_and_set_parameters(
    conn: &mut Connection,
    expected: &ParameterSet,
    new: &ParameterSet,
    notes: &str,
) -> Result<bool> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Impossible de démarrer la transaction")?;

    let current = tx
        .query_row(
            "SELECT freq_weight, gap_weight, decay_rate FROM parameter_sets WHERE active = 1",
            [],
            |row| Ok(ParameterSet::new(row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .unwrap_or_default();

    if current != *expected {
        return Ok(false);
    }

    tx.execute("UPDATE parameter_sets SET active = 0 WHERE active = 1", [])?;
    tx.execute(
        "INSERT INTO parameter_sets (freq_weight, gap_weight, decay_rate, active, applied_at, notes)
         VALUES (?1, ?2, ?3, 1, ?4, ?5)",
        rusqlite::params![
            new.freq_weight,
            new.gap_weight,
            new.decay_rate,
            Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string(),
            notes,
        ],
    )?;
    tx.commit().context("Échec du commit")?;
    Ok(true)
}

/// Historique des jeux appliqués, le plus récent en tête.
pub fn fetch_parameter_history(conn: &Connection, limit: u32) -> Result<Vec<ParameterRecord>> {
    let mut stmt = conn.prepare(
        "SELECT freq_weight, gap_weight, decay_rate, active, applied_at, notes
         FROM parameter_sets ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok((
                ParameterSet::new(row.get(0)?, row.get(1)?, row.get(2)?),
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(params, active, applied_at, notes)| {
            Ok(ParameterRecord {
                params,
                active,
                applied_at: NaiveDateTime::parse_from_str(&applied_at, TIMESTAMP_FORMAT)
                    .with_context(|| format!("Horodatage illisible '{}'", applied_at))?,
                notes,
            })
        })
        .collect()
}

/// Enregistre la prédiction associée à un tirage. Une prédiction existante n'est jamais écrasée.
pub fn insert_prediction(conn: &Connection, draw_id: u64, snapshot: &PredictionSnapshot) -> Result<bool> {
    let json = serde_json::to_string(snapshot)?;
    let changed = conn.execute(
        "INSERT OR IGNORE INTO predictions (draw_id, snapshot) VALUES (?1, ?2)",
        rusqlite::params![draw_id as i64, json],
    ).context("Échec de l'insertion de la prédiction")?;
    Ok(changed > 0)
}

pub fn fetch_prediction(conn: &Connection, draw_id: u64) -> Result<Option<PredictionSnapshot>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM predictions WHERE draw_id = ?1",
            [draw_id as i64],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| serde_json::from_str(&j).context("Prédiction illisible"))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_draw(id: u64, balls: &[u8]) -> Draw {
        Draw {
            draw_id: id,
            drawn_at: NaiveDateTime::parse_from_str("2024-01-01 13:00:00", TIMESTAMP_FORMAT).unwrap(),
            balls: balls.to_vec(),
            bonus: Some('B'),
            gain: None,
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_count() {
        let conn = memory_db();
        assert_eq!(count_draws(&conn).unwrap(), 0);

        insert_draw(&conn, &test_draw(1, &[1, 2, 3, 4, 5])).unwrap();
        assert_eq!(count_draws(&conn).unwrap(), 1);
        assert_eq!(latest_draw_id(&conn).unwrap(), Some(1));
    }

    #[test]
    fn test_duplicate_ignored() {
        let conn = memory_db();

        let inserted = insert_draw(&conn, &test_draw(1, &[1, 2, 3, 4, 5])).unwrap();
        assert!(inserted);
        let inserted = insert_draw(&conn, &test_draw(1, &[1, 2, 3, 4, 5])).unwrap();
        assert!(!inserted);
        insert_draw(&conn, &test_draw(2, &[1, 2, 3, 4, 5])).unwrap();
        let inserted = insert_draw(&conn, &test_draw(1, &[1, 2, 3, 4, 5])).unwrap();
        assert!(!inserted);
        assert_eq!(count_draws(&conn).unwrap(), 2);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let conn = memory_db();
        insert_draw(&conn, &test_draw(10, &[1, 2, 3, 4, 5])).unwrap();
        assert!(insert_draw(&conn, &test_draw(5, &[1, 2, 3, 4, 5])).is_err());
    }

    #[test]
    fn test_fetch_order() {
        let conn = memory_db();

        insert_draw(&conn, &test_draw(1, &[1, 2, 3, 4, 5])).unwrap();
        insert_draw(&conn, &test_draw(2, &[6, 7, 8, 9, 10])).unwrap();
        insert_draw(&conn, &test_draw(3, &[11, 12, 13, 14, 15])).unwrap();

        let all = fetch_all_draws(&conn).unwrap();
        assert_eq!(all.iter().map(|d| d.draw_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(all[1].balls, vec![6, 7, 8, 9, 10]);
        assert_eq!(all[1].bonus, Some('B'));

        let last = fetch_last_draws(&conn, 2).unwrap();
        assert_eq!(last.iter().map(|d| d.draw_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_compare_and_set() {
        let mut conn = memory_db();
        assert!(fetch_active_parameters(&conn).unwrap().is_none());

        let first = ParameterSet::new(0.6, 0.2, 0.9);
        assert!(compare_and_set_parameters(&mut conn, &ParameterSet::default(), &first, "init").unwrap());
        assert_eq!(fetch_active_parameters(&conn).unwrap().unwrap().params, first);

        // L'ancien jeu n'est plus la référence attendue.
        let second = ParameterSet::new(0.8, 0.5, 0.7);
        assert!(!compare_and_set_parameters(&mut conn, &ParameterSet::default(), &second, "stale").unwrap());
        assert_eq!(fetch_active_parameters(&conn).unwrap().unwrap().params, first);

        assert!(compare_and_set_parameters(&mut conn, &first, &second, "ok").unwrap());
        let history = fetch_parameter_history(&conn, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].active);
        assert!(!history[1].active);
        assert_eq!(history[0].params, second);
    }

    #[test]
    fn test_prediction_roundtrip_not_overwritten() {
        let conn = memory_db();
        let snapshot = PredictionSnapshot {
            statistical: vec![1, 2, 3, 4, 5],
            algorithmic: vec![6, 7, 8, 9, 10],
            confidence: 42.0,
        };
        assert!(insert_prediction(&conn, 7, &snapshot).unwrap());
        let other = PredictionSnapshot { confidence: 1.0, ..snapshot.clone() };
        assert!(!insert_prediction(&conn, 7, &other).unwrap());
        assert_eq!(fetch_prediction(&conn, 7).unwrap(), Some(snapshot));
        assert_eq!(fetch_prediction(&conn, 8).unwrap(), None);
    }
}
