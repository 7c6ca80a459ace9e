//! Wavevectors and the periodic elastic Green's operator.
//!
//! The operator is built once per run for the owned half-spectrum rows:
//!
//! ```text
//! G_ij(k) = [δ_ij / μ − (1 + ν) n_i n_j / (2μ)] / |k|²,   n = k / |k|
//! ```
//!
//! and forced to zero for `|k|² < 4π / (Lx Ly)`. That neighbourhood of
//! `k = 0` holds the rigid-translation mode, which the equilibrium solve
//! cannot determine.

use std::f64::consts::PI;

use log::debug;

use crate::grid::{Grid2D, SlabLayout};
use crate::material::{ElasticModuli, Tensor2};

/// Signed wavenumber of FFT index `index` on an axis of `n` points and length `length`.
///
/// Indices up to `n / 2` are positive frequencies, the rest wrap to negative.
pub fn wavenumber(index: usize, n: usize, length: f64) -> f64 {
    let signed = if index < n / 2 + 1 {
        index as f64
    } else {
        index as f64 - n as f64
    };
    signed * 2.0 * PI / length
}

/// `|k|²` below which the operator is zeroed.
pub fn regularization_radius(grid: &Grid2D) -> f64 {
    4.0 * PI / grid.lx() / grid.ly()
}

/// Wavevector components of the owned half-spectrum rows.
#[derive(Debug, Clone)]
pub struct Wavevectors {
    layout: SlabLayout,
    kx: Vec<f64>,
    ky: Vec<f64>,
}

impl Wavevectors {
    pub fn new(layout: SlabLayout) -> Self {
        let grid = layout.grid;
        let kx = layout
            .rows()
            .map(|x| wavenumber(x, grid.nx, grid.lx()))
            .collect();
        // Half spectrum: only non-negative ky are stored.
        let ky = (0..grid.spectral_ny())
            .map(|j| j as f64 * 2.0 * PI / grid.ly())
            .collect();
        Self { layout, kx, ky }
    }

    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    /// `(kx, ky)` at local spectral row `i`, column `j`.
    #[inline]
    pub fn k(&self, i: usize, j: usize) -> [f64; 2] {
        [self.kx[i], self.ky[j]]
    }

    #[inline]
    pub fn k_squared(&self, i: usize, j: usize) -> f64 {
        self.kx[i] * self.kx[i] + self.ky[j] * self.ky[j]
    }

    /// Iterate `(spectral index, [kx, ky])` over owned wavevectors.
    pub fn iter(&self) -> impl Iterator<Item = (usize, [f64; 2])> + '_ {
        let nyc = self.ky.len();
        self.kx.iter().enumerate().flat_map(move |(i, &kx)| {
            self.ky
                .iter()
                .enumerate()
                .map(move |(j, &ky)| (i * nyc + j, [kx, ky]))
        })
    }
}

#[derive(Debug, Clone)]
pub struct GreensOperator {
    wavevectors: Wavevectors,
    tensors: Vec<Tensor2>,
}

impl GreensOperator {
    pub fn new(layout: SlabLayout, moduli: ElasticModuli) -> Self {
        let wavevectors = Wavevectors::new(layout);
        let radius = regularization_radius(&layout.grid);
        let mut tensors = vec![[[0.0; 2]; 2]; layout.spectral_len()];
        let mut zeroed = 0usize;
        for (idx, k) in wavevectors.iter() {
            let k2 = k[0] * k[0] + k[1] * k[1];
            if k2 < radius {
                zeroed += 1;
                continue;
            }
            tensors[idx] = green_tensor(k, k2, moduli);
        }
        debug!(
            "[greens] rank {} built {} wavevectors ({} regularized, radius={radius:.4e})",
            layout.rank,
            tensors.len(),
            zeroed
        );
        Self {
            wavevectors,
            tensors,
        }
    }

    pub fn wavevectors(&self) -> &Wavevectors {
        &self.wavevectors
    }

    #[inline]
    pub fn tensor(&self, idx: usize) -> &Tensor2 {
        &self.tensors[idx]
    }

    pub fn tensors(&self) -> &[Tensor2] {
        &self.tensors
    }
}

fn green_tensor(k: [f64; 2], k2: f64, moduli: ElasticModuli) -> Tensor2 {
    let ElasticModuli { mu, nu } = moduli;
    let norm = k2.sqrt();
    let n = [k[0] / norm, k[1] / norm];
    let shear = (1.0 + nu) / (2.0 * mu);
    let off = -shear * n[0] * n[1];
    [
        [(1.0 / mu - shear * n[0] * n[0]) / k2, off / k2],
        [off / k2, (1.0 / mu - shear * n[1] * n[1]) / k2],
    ]
}
