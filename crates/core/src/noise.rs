//! Symmetry-breaking perturbation of the order parameters.
//!
//! The generator for each global row is reseeded from `(seed, draw, row)`,
//! so a perturbation depends only on the seed and how many draws preceded
//! it, never on how the grid is split between workers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::field::{VARIANTS, VariantFields};

#[derive(Debug, Clone)]
pub struct NoiseSource {
    amplitude: f64,
    seed: u64,
    draws: u64,
}

impl NoiseSource {
    pub fn new(amplitude: f64, seed: u64) -> Self {
        Self {
            amplitude,
            seed,
            draws: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0.0, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.amplitude > 0.0
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Add `amplitude · U(−1, 1)` to every owned cell of every variant.
    pub fn perturb(&mut self, eta: &mut VariantFields) {
        if !self.is_enabled() {
            return;
        }
        let layout = *eta[0].layout();
        let ny = layout.grid.ny;
        for i in 0..layout.local_n0 {
            let row = (layout.local_0_start + i) as u64;
            let mut rng = StdRng::seed_from_u64(row_seed(self.seed, self.draws, row));
            for j in 0..ny {
                let idx = layout.real_idx(i, j);
                for field in eta.iter_mut().take(VARIANTS) {
                    let r: f64 = rng.random_range(-1.0..=1.0);
                    field.as_mut_slice()[idx] += self.amplitude * r;
                }
            }
        }
        self.draws += 1;
    }
}

fn row_seed(seed: u64, draw: u64, row: u64) -> u64 {
    seed ^ draw
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(row.wrapping_mul(0xC2B2_AE3D_27D4_EB4F))
}

/// Seed taken from the wall clock, for runs that do not pin one.
pub fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_nanos() as u64)
        .unwrap_or(0)
}
