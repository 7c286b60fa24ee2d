use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format de stockage des horodatages de tirage.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Borne haute des poids de la formule statistique.
pub const MAX_WEIGHT: f64 = 1.0;

/// Règles du jeu : univers `[1, pool_size]`, `pick_count` boules par tirage
/// et une lettre bonus parmi les `bonus_letter_count` premières lettres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    pub pool_size: u8,
    pub pick_count: usize,
    pub bonus_letter_count: u8,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            pool_size: 25,
            pick_count: 5,
            bonus_letter_count: 5,
        }
    }
}

impl GameRules {
    pub fn size(&self) -> usize {
        self.pool_size as usize
    }

    pub fn numbers(&self) -> impl Iterator<Item = u8> {
        1..=self.pool_size
    }

    pub fn bonus_letters(&self) -> impl Iterator<Item = char> {
        (0..self.bonus_letter_count).map(|i| (b'A' + i) as char)
    }

    pub fn contains(&self, number: u8) -> bool {
        number >= 1 && number <= self.pool_size
    }

    /// Tranches d'affichage : 1-9, 10-19, 20-29... la dernière s'arrête à `pool_size`.
    pub fn decades(&self) -> Vec<(u8, u8)> {
        let max = self.pool_size as u16;
        let mut buckets = vec![(1, 9.min(self.pool_size))];
        let mut start = 10u16;
        while start <= max {
            buckets.push((start as u8, (start + 9).min(max) as u8));
            start += 10;
        }
        buckets
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 2 {
            bail!("Univers trop petit : {}", self.pool_size);
        }
        if self.pick_count == 0 || self.pick_count >= self.size() {
            bail!(
                "Nombre de boules invalide : {} (univers de {})",
                self.pick_count,
                self.pool_size
            );
        }
        if self.bonus_letter_count > 26 {
            bail!("Trop de lettres bonus : {}", self.bonus_letter_count);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub draw_id: u64,
    pub drawn_at: NaiveDateTime,
    pub balls: Vec<u8>,
    pub bonus: Option<char>,
    pub gain: Option<f64>,
}

impl Draw {
    pub fn contains(&self, number: u8) -> bool {
        self.balls.contains(&number)
    }
}

pub fn validate_draw(draw: &Draw, rules: &GameRules) -> Result<()> {
    if draw.balls.len() != rules.pick_count {
        bail!(
            "Tirage {} : {} boules au lieu de {}",
            draw.draw_id,
            draw.balls.len(),
            rules.pick_count
        );
    }
    for &b in &draw.balls {
        if !rules.contains(b) {
            bail!("Boule {} hors limites (1-{})", b, rules.pool_size);
        }
    }
    for i in 0..draw.balls.len() {
        for j in (i + 1)..draw.balls.len() {
            if draw.balls[i] == draw.balls[j] {
                bail!("Boule en double : {}", draw.balls[i]);
            }
        }
    }
    if let Some(letter) = draw.bonus {
        if !rules.bonus_letters().any(|l| l == letter) {
            bail!("Lettre bonus inconnue : {}", letter);
        }
    }
    Ok(())
}

/// Poids de la formule statistique. Un seul jeu est actif à la fois.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub freq_weight: f64,
    pub gap_weight: f64,
    pub decay_rate: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            freq_weight: 0.4,
            gap_weight: 0.5,
            decay_rate: 0.85,
        }
    }
}

impl ParameterSet {
    pub fn new(freq_weight: f64, gap_weight: f64, decay_rate: f64) -> Self {
        Self {
            freq_weight,
            gap_weight,
            decay_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("freq_weight", self.freq_weight), ("gap_weight", self.gap_weight)] {
            if !w.is_finite() || !(0.0..=MAX_WEIGHT).contains(&w) {
                bail!("{} = {} hors de [0, {}]", name, w, MAX_WEIGHT);
            }
        }
        if !self.decay_rate.is_finite() || self.decay_rate <= 0.0 || self.decay_rate >= 1.0 {
            bail!("decay_rate = {} hors de ]0, 1[", self.decay_rate);
        }
        Ok(())
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "freq={:.3} gap={:.3} decay={:.3}",
            self.freq_weight, self.gap_weight, self.decay_rate
        )
    }
}

/// Ligne d'historique du Parameter Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub params: ParameterSet,
    pub active: bool,
    pub applied_at: NaiveDateTime,
    pub notes: String,
}

/// Prédiction courante au moment où un tirage a été enregistré.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub statistical: Vec<u8>,
    pub algorithmic: Vec<u8>,
    pub confidence: f64,
}
