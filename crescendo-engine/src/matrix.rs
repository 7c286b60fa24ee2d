use std::sync::{Arc, RwLock};

use ndarray::Array2;

use crescendo_db::models::{Draw, GameRules};

/// Matrice A (transitions entre tirages consécutifs, lignes stochastiques)
/// et matrice B (co-occurrences dans un même tirage, symétrique).
#[derive(Debug, Clone)]
pub struct Matrices {
    pub temporal: Array2<f64>,
    pub spatial: Array2<u32>,
    pub draw_count: usize,
    pub last_draw_id: Option<u64>,
}

/// Comptes bruts accumulés tirage par tirage.
pub struct MatrixAccumulator {
    rules: GameRules,
    transitions: Array2<f64>,
    spatial: Array2<u32>,
    previous: Option<Vec<usize>>,
    draw_count: usize,
    last_draw_id: Option<u64>,
}

impl MatrixAccumulator {
    pub fn new(rules: &GameRules) -> Self {
        let n = rules.size();
        Self {
            rules: *rules,
            transitions: Array2::zeros((n, n)),
            spatial: Array2::zeros((n, n)),
            previous: None,
            draw_count: 0,
            last_draw_id: None,
        }
    }

    pub fn push(mut self, draw: &Draw) -> Self {
        self.add(draw);
        self
    }

    pub fn add(&mut self, draw: &Draw) {
        let current: Vec<usize> = draw
            .balls
            .iter()
            .filter(|&&b| self.rules.contains(b))
            .map(|&b| (b - 1) as usize)
            .collect();

        for (a, &i) in current.iter().enumerate() {
            for &j in &current[a + 1..] {
                if i != j {
                    self.spatial[[i, j]] += 1;
                    self.spatial[[j, i]] += 1;
                }
            }
        }
        if let Some(prev) = &self.previous {
            for &i in prev {
                for &j in &current {
                    self.transitions[[i, j]] += 1.0;
                }
            }
        }

        self.previous = Some(current);
        self.draw_count += 1;
        self.last_draw_id = Some(draw.draw_id);
    }

    /// Normalise les lignes de A. Une ligne sans transition reste nulle.
    pub fn snapshot(&self) -> Matrices {
        let mut temporal = self.transitions.clone();
        for mut row in temporal.rows_mut() {
            let sum = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|v| v / sum);
            }
        }
        Matrices {
            temporal,
            spatial: self.spatial.clone(),
            draw_count: self.draw_count,
            last_draw_id: self.last_draw_id,
        }
    }
}

/// Construit A et B en une seule passe sur l'historique.
pub fn build_matrices(draws: &[Draw], rules: &GameRules) -> Matrices {
    draws
        .iter()
        .fold(MatrixAccumulator::new(rules), MatrixAccumulator::push)
        .snapshot()
}

impl Matrices {
    pub fn size(&self) -> usize {
        self.temporal.nrows()
    }

    /// B ramenée sur [0, 1] par min-max sur les cases hors diagonale.
    /// Diagonale à 0, matrice nulle si toutes les cases sont égales.
    pub fn normalized_spatial(&self) -> Array2<f64> {
        let n = self.size();
        let mut min = u32::MAX;
        let mut max = 0u32;
        for ((i, j), &v) in self.spatial.indexed_iter() {
            if i != j {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if n < 2 || max <= min {
            return Array2::zeros((n, n));
        }
        let range = (max - min) as f64;
        Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                0.0
            } else {
                (self.spatial[[i, j]] - min) as f64 / range
            }
        })
    }

    pub fn temporal_rows(&self) -> Vec<Vec<f64>> {
        self.temporal.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    pub fn spatial_rows(&self) -> Vec<Vec<u32>> {
        self.spatial.rows().into_iter().map(|r| r.to_vec()).collect()
    }
}

/// Cache des matrices, reconstruit seulement quand l'historique a changé.
#[derive(Default)]
pub struct MatrixCache {
    cached: RwLock<Option<Arc<Matrices>>>,
}

impl MatrixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, draws: &[Draw], rules: &GameRules) -> Arc<Matrices> {
        let last_id = draws.last().map(|d| d.draw_id);
        {
            let guard = self.cached.read().unwrap_or_else(|e| e.into_inner());
            if let Some(m) = guard.as_ref() {
                if m.draw_count == draws.len() && m.last_draw_id == last_id && m.size() == rules.size() {
                    return Arc::clone(m);
                }
            }
        }

        log::debug!("Reconstruction des matrices sur {} tirages", draws.len());
        let built = Arc::new(build_matrices(draws, rules));
        let mut guard = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::clone(&built));
        built
    }

    pub fn invalidate(&self) {
        let mut guard = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}
