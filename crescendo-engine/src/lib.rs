pub mod active;
pub mod algorithmic;
pub mod backtest;
pub mod config;
pub mod error;
pub mod expert;
pub mod history;
pub mod ingest;
pub mod matrix;
pub mod optimizer;
pub mod prediction;
pub mod schedule;
pub mod statistical;
pub mod stats;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use crescendo_db::models::{Draw, GameRules};

pub use error::{EngineError, EngineResult};

fn test_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(13, 0, 0))
        .unwrap_or_default()
}

/// Tirages synthétiques déterministes : boules distinctes, lettre bonus cyclique.
pub fn make_test_draws(n: usize, rules: &GameRules) -> Vec<Draw> {
    let size = rules.size();
    let step = (size / rules.pick_count).max(1);
    let letters: Vec<char> = rules.bonus_letters().collect();
    (0..n)
        .map(|i| {
            let start = (i * 3) % size;
            Draw {
                draw_id: (i + 1) as u64,
                drawn_at: test_epoch() + Duration::hours(i as i64),
                balls: (0..rules.pick_count)
                    .map(|j| (((start + j * step) % size) + 1) as u8)
                    .collect(),
                bonus: if letters.is_empty() { None } else { Some(letters[i % letters.len()]) },
                gain: None,
            }
        })
        .collect()
}

/// Historique figé : les `k` premiers numéros sortent à chaque tirage.
/// Un jeu centré sur le retard y rate tout, un jeu centré sur la fréquence y voit juste.
pub fn make_steady_draws(n: usize, rules: &GameRules) -> Vec<Draw> {
    let balls: Vec<u8> = (1..=rules.pick_count as u8).collect();
    (0..n).map(|i| draw_with(i as u64 + 1, &balls)).collect()
}

pub fn draw_with(id: u64, balls: &[u8]) -> Draw {
    Draw {
        draw_id: id,
        drawn_at: test_epoch() + Duration::hours(id as i64),
        balls: balls.to_vec(),
        bonus: None,
        gain: None,
    }
}
