use serde::{Deserialize, Serialize};

use crescendo_db::models::{Draw, GameRules};

use crate::error::{EngineError, EngineResult};

/// Fenêtre des statistiques de lettres bonus.
pub const BONUS_WINDOW: usize = 50;

/// Comptage par numéro, indexé par `numéro - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    counts: Vec<u32>,
}

impl FrequencyTable {
    /// `None` hors de `[1, N]`.
    pub fn count(&self, number: u8) -> Option<u32> {
        let idx = usize::from(number).checked_sub(1)?;
        self.counts.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }
}

/// Nombre de tirages écoulés depuis la dernière sortie, indexé par `numéro - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct GapTable {
    gaps: Vec<u32>,
}

impl GapTable {
    /// `None` hors de `[1, N]`.
    pub fn gap(&self, number: u8) -> Option<u32> {
        let idx = usize::from(number).checked_sub(1)?;
        self.gaps.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.gaps
    }
}

/// Fréquences sur les `window` derniers tirages (tout l'historique si `None`).
pub fn frequency(draws: &[Draw], rules: &GameRules, window: Option<usize>) -> FrequencyTable {
    let start = window.map_or(0, |w| draws.len().saturating_sub(w));
    let mut counts = vec![0u32; rules.size()];
    for draw in &draws[start..] {
        for &n in &draw.balls {
            if rules.contains(n) {
                counts[(n - 1) as usize] += 1;
            }
        }
    }
    FrequencyTable { counts }
}

/// Retards par parcours à rebours depuis le tirage le plus récent.
/// Un numéro jamais sorti prend la longueur de l'historique.
pub fn gaps(draws: &[Draw], rules: &GameRules) -> GapTable {
    let never = draws.len() as u32;
    let mut gaps = vec![never; rules.size()];
    for (age, draw) in draws.iter().rev().enumerate() {
        for &n in &draw.balls {
            if rules.contains(n) {
                let idx = (n - 1) as usize;
                if gaps[idx] == never {
                    gaps[idx] = age as u32;
                }
            }
        }
    }
    GapTable { gaps }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberCount {
    pub number: u8,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberGap {
    pub number: u8,
    pub gap: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusStat {
    pub letter: char,
    pub count: u32,
    pub gap: u32,
}

pub fn hot_numbers(freq: &FrequencyTable, k: usize) -> Vec<NumberCount> {
    let mut entries = counts_of(freq);
    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.number.cmp(&b.number)));
    entries.truncate(k);
    entries
}

pub fn cold_numbers(freq: &FrequencyTable, k: usize) -> Vec<NumberCount> {
    let mut entries = counts_of(freq);
    entries.sort_by(|a, b| a.count.cmp(&b.count).then(a.number.cmp(&b.number)));
    entries.truncate(k);
    entries
}

pub fn overdue_numbers(gaps: &GapTable, k: usize) -> Vec<NumberGap> {
    let mut entries: Vec<NumberGap> = gaps
        .as_slice()
        .iter()
        .enumerate()
        .map(|(i, &gap)| NumberGap { number: (i + 1) as u8, gap })
        .collect();
    entries.sort_by(|a, b| b.gap.cmp(&a.gap).then(a.number.cmp(&b.number)));
    entries.truncate(k);
    entries
}

fn counts_of(freq: &FrequencyTable) -> Vec<NumberCount> {
    freq.as_slice()
        .iter()
        .enumerate()
        .map(|(i, &count)| NumberCount { number: (i + 1) as u8, count })
        .collect()
}

pub fn parity(draws: &[Draw]) -> Vec<NamedValue> {
    let (even, odd) = draws
        .iter()
        .flat_map(|d| d.balls.iter())
        .fold((0u32, 0u32), |(even, odd), &b| {
            if b % 2 == 0 { (even + 1, odd) } else { (even, odd + 1) }
        });
    vec![
        NamedValue { name: "Pairs".to_string(), value: even },
        NamedValue { name: "Impairs".to_string(), value: odd },
    ]
}

pub fn decades(draws: &[Draw], rules: &GameRules) -> Vec<NamedValue> {
    rules
        .decades()
        .into_iter()
        .map(|(lo, hi)| NamedValue {
            name: format!("{}-{}", lo, hi),
            value: draws
                .iter()
                .flat_map(|d| d.balls.iter())
                .filter(|&&b| b >= lo && b <= hi)
                .count() as u32,
        })
        .collect()
}

pub fn bonus_stats(draws: &[Draw], rules: &GameRules) -> Vec<BonusStat> {
    let recent = &draws[draws.len().saturating_sub(BONUS_WINDOW)..];
    rules
        .bonus_letters()
        .map(|letter| {
            let count = recent.iter().filter(|d| d.bonus == Some(letter)).count() as u32;
            let gap = draws
                .iter()
                .rev()
                .position(|d| d.bonus == Some(letter))
                .unwrap_or(draws.len()) as u32;
            BonusStat { letter, count, gap }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub window: usize,
    pub hot_numbers: Vec<NumberCount>,
    pub cold_numbers: Vec<NumberCount>,
    pub overdue_numbers: Vec<NumberGap>,
    pub frequency_all: Vec<NumberCount>,
    pub parity_stats: Vec<NamedValue>,
    pub decade_stats: Vec<NamedValue>,
    pub bonus_stats: Vec<BonusStat>,
    pub total_draws: usize,
}

pub fn summarize(draws: &[Draw], rules: &GameRules, window: usize) -> EngineResult<StatsReport> {
    if draws.is_empty() {
        return Err(EngineError::InsufficientData { needed: 1, available: 0 });
    }
    let k = rules.pick_count;
    let windowed = frequency(draws, rules, Some(window));
    let overall = frequency(draws, rules, None);
    let gap_table = gaps(draws, rules);

    Ok(StatsReport {
        window: window.min(draws.len()),
        hot_numbers: hot_numbers(&windowed, k),
        cold_numbers: cold_numbers(&windowed, k),
        overdue_numbers: overdue_numbers(&gap_table, k),
        frequency_all: counts_of(&overall),
        parity_stats: parity(draws),
        decade_stats: decades(draws, rules),
        bonus_stats: bonus_stats(draws, rules),
        total_draws: draws.len(),
    })
}
