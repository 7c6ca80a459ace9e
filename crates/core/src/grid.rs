//! Uniform periodic grid and its 1D slab decomposition.
//!
//! The grid is split along the first axis (`x`, rows) into contiguous
//! blocks, one per worker. Real-space rows are stored with the padding
//! required for in-place real-input transforms: `2 * (ny / 2 + 1)` values
//! per row, of which only the first `ny` are cells.

use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid2D {
    pub nx: usize,
    pub ny: usize,
    #[serde(default = "default_spacing")]
    pub dx: f64,
}

impl Grid2D {
    pub fn new(nx: usize, ny: usize, dx: f64) -> Self {
        Self { nx, ny, dx }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lx(&self) -> f64 {
        self.nx as f64 * self.dx
    }

    pub fn ly(&self) -> f64 {
        self.ny as f64 * self.dx
    }

    /// Number of complex columns kept by the half-spectrum.
    pub fn spectral_ny(&self) -> usize {
        self.ny / 2 + 1
    }

    /// Row stride of real fields, including transform padding.
    pub fn padded_ny(&self) -> usize {
        2 * self.spectral_ny()
    }
}

fn default_spacing() -> f64 {
    1.0
}

/// Balanced contiguous split of `n` items into `parts` blocks.
///
/// The first `n % parts` blocks hold one extra item.
pub fn block_range(n: usize, parts: usize, index: usize) -> Range<usize> {
    assert!(parts > 0, "cannot split into zero blocks");
    assert!(index < parts, "block index {index} out of range for {parts} blocks");
    let base = n / parts;
    let extra = n % parts;
    let start = index * base + index.min(extra);
    let len = base + usize::from(index < extra);
    start..start + len
}

/// The rows of the grid owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlabLayout {
    pub grid: Grid2D,
    pub rank: usize,
    pub size: usize,
    pub local_n0: usize,
    pub local_0_start: usize,
}

impl SlabLayout {
    pub fn new(grid: Grid2D, rank: usize, size: usize) -> Self {
        let rows = block_range(grid.nx, size, rank);
        Self {
            grid,
            rank,
            size,
            local_n0: rows.len(),
            local_0_start: rows.start,
        }
    }

    /// Layout of a single worker owning the whole grid.
    pub fn serial(grid: Grid2D) -> Self {
        Self::new(grid, 0, 1)
    }

    pub fn rows(&self) -> Range<usize> {
        self.local_0_start..self.local_0_start + self.local_n0
    }

    pub fn real_len(&self) -> usize {
        self.local_n0 * self.grid.padded_ny()
    }

    pub fn spectral_len(&self) -> usize {
        self.local_n0 * self.grid.spectral_ny()
    }

    #[inline]
    pub fn real_idx(&self, i: usize, j: usize) -> usize {
        i * self.grid.padded_ny() + j
    }

    #[inline]
    pub fn spectral_idx(&self, i: usize, j: usize) -> usize {
        i * self.grid.spectral_ny() + j
    }

    /// Storage indices of every owned cell (padding excluded), row-major.
    pub fn cells(&self) -> impl Iterator<Item = usize> + '_ {
        let stride = self.grid.padded_ny();
        let ny = self.grid.ny;
        (0..self.local_n0).flat_map(move |i| (0..ny).map(move |j| i * stride + j))
    }

    /// Number of owned cells (padding excluded).
    pub fn owned_cells(&self) -> usize {
        self.local_n0 * self.grid.ny
    }
}
