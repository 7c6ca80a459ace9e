//! Slab-decomposed real-to-complex 2D FFT built on rustfft.
//!
//! Each worker owns a block of rows. The forward transform runs a real FFT
//! along `y` on every owned row, exchanges the half-spectrum so that every
//! worker owns a block of spectral columns, runs complex FFTs along `x`,
//! and exchanges back to the row layout. The inverse retraces those steps
//! and rebuilds the Hermitian upper half of each row before the final
//! complex FFT along `y`.
//!
//! Every row and column transform sees the same values in the same order
//! whatever the worker count, so results are bit-identical across group
//! sizes.

use std::ops::Range;
use std::sync::Arc;

use log::debug;
use mart2d_core::backend::{TransformEngine, check_layout};
use mart2d_core::comm::{Communicator, SerialComm};
use mart2d_core::field::{RealField, SpectralField};
use mart2d_core::grid::{Grid2D, SlabLayout, block_range};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

pub struct SlabFft<C: Communicator> {
    layout: SlabLayout,
    comm: C,
    /// Rows owned by every rank.
    row_blocks: Vec<Range<usize>>,
    /// Spectral columns owned by every rank while transposed.
    column_blocks: Vec<Range<usize>>,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    column_forward: Arc<dyn Fft<f64>>,
    column_inverse: Arc<dyn Fft<f64>>,
    row_buf: Vec<Complex64>,
    /// Owned rows of the half-spectrum, `local_n0 × nyc`.
    half: Vec<Complex64>,
    /// Owned spectral columns, each a contiguous run of `nx` values.
    columns: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl SlabFft<SerialComm> {
    pub fn serial(grid: Grid2D) -> Self {
        Self::new(grid, SerialComm)
    }
}

impl<C: Communicator> SlabFft<C> {
    pub fn new(grid: Grid2D, comm: C) -> Self {
        let (rank, size) = (comm.rank(), comm.size());
        let layout = SlabLayout::new(grid, rank, size);
        let nyc = grid.spectral_ny();
        let row_blocks: Vec<_> = (0..size).map(|r| block_range(grid.nx, size, r)).collect();
        let column_blocks: Vec<_> = (0..size).map(|r| block_range(nyc, size, r)).collect();

        let mut planner = FftPlanner::<f64>::new();
        let row_forward = planner.plan_fft_forward(grid.ny);
        let row_inverse = planner.plan_fft_inverse(grid.ny);
        let column_forward = planner.plan_fft_forward(grid.nx);
        let column_inverse = planner.plan_fft_inverse(grid.nx);
        let scratch_len = [&row_forward, &row_inverse, &column_forward, &column_inverse]
            .iter()
            .map(|fft| fft.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        debug!(
            "[fft] rank {rank}/{size} grid={}x{} rows={:?} columns={:?}",
            grid.nx, grid.ny, row_blocks[rank], column_blocks[rank]
        );

        Self {
            row_buf: vec![Complex64::default(); grid.ny],
            half: vec![Complex64::default(); layout.spectral_len()],
            columns: vec![Complex64::default(); column_blocks[rank].len() * grid.nx],
            scratch: vec![Complex64::default(); scratch_len],
            layout,
            comm,
            row_blocks,
            column_blocks,
            row_forward,
            row_inverse,
            column_forward,
            column_inverse,
        }
    }

    fn rank(&self) -> usize {
        self.layout.rank
    }

    /// Row-distributed half-spectrum → column-distributed. Collective.
    fn rows_to_columns(&mut self, rows: &[Complex64]) {
        let nx = self.layout.grid.nx;
        let nyc = self.layout.grid.spectral_ny();
        let outgoing = self
            .column_blocks
            .iter()
            .map(|cols| {
                let mut block = Vec::with_capacity(self.layout.local_n0 * cols.len());
                for i in 0..self.layout.local_n0 {
                    block.extend_from_slice(&rows[i * nyc + cols.start..i * nyc + cols.end]);
                }
                block
            })
            .collect();
        let incoming = self.comm.all_to_all(outgoing);

        let width = self.column_blocks[self.rank()].len();
        for (src, block) in incoming.iter().enumerate() {
            let src_rows = &self.row_blocks[src];
            debug_assert_eq!(block.len(), src_rows.len() * width);
            for (i, row) in block.chunks_exact(width.max(1)).enumerate().take(src_rows.len()) {
                let x = src_rows.start + i;
                for (c, value) in row.iter().enumerate() {
                    self.columns[c * nx + x] = *value;
                }
            }
        }
    }

    /// Column-distributed half-spectrum → row-distributed. Collective.
    fn columns_to_rows(&mut self, rows: &mut [Complex64]) {
        let nx = self.layout.grid.nx;
        let nyc = self.layout.grid.spectral_ny();
        let width = self.column_blocks[self.rank()].len();
        let outgoing = self
            .row_blocks
            .iter()
            .map(|dst_rows| {
                let mut block = Vec::with_capacity(width * dst_rows.len());
                for c in 0..width {
                    block.extend_from_slice(&self.columns[c * nx + dst_rows.start..c * nx + dst_rows.end]);
                }
                block
            })
            .collect();
        let incoming = self.comm.all_to_all(outgoing);

        let local_n0 = self.layout.local_n0;
        for (src, block) in incoming.iter().enumerate() {
            let src_cols = &self.column_blocks[src];
            debug_assert_eq!(block.len(), src_cols.len() * local_n0);
            for (c, column) in block.chunks_exact(local_n0.max(1)).enumerate().take(src_cols.len()) {
                let j = src_cols.start + c;
                for (i, value) in column.iter().enumerate() {
                    rows[i * nyc + j] = *value;
                }
            }
        }
    }

    fn transform_columns(&mut self, fft: &Arc<dyn Fft<f64>>) {
        let nx = self.layout.grid.nx;
        for column in self.columns.chunks_exact_mut(nx) {
            fft.process_with_scratch(column, &mut self.scratch);
        }
    }
}

impl<C: Communicator> TransformEngine for SlabFft<C> {
    type Comm = C;

    fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    fn comm(&self) -> &C {
        &self.comm
    }

    fn forward(&mut self, input: &RealField, output: &mut SpectralField) {
        check_layout(&self.layout, input.layout(), "forward input");
        check_layout(&self.layout, output.layout(), "forward output");
        let ny = self.layout.grid.ny;
        let nyc = self.layout.grid.spectral_ny();

        let mut half = std::mem::take(&mut self.half);
        for i in 0..self.layout.local_n0 {
            let start = self.layout.real_idx(i, 0);
            for (dst, src) in self.row_buf.iter_mut().zip(&input.as_slice()[start..start + ny]) {
                *dst = Complex64::new(*src, 0.0);
            }
            self.row_forward
                .process_with_scratch(&mut self.row_buf, &mut self.scratch);
            half[i * nyc..(i + 1) * nyc].copy_from_slice(&self.row_buf[..nyc]);
        }

        self.rows_to_columns(&half);
        let fft = Arc::clone(&self.column_forward);
        self.transform_columns(&fft);
        self.columns_to_rows(output.as_mut_slice());
        self.half = half;
    }

    fn inverse(&mut self, input: &SpectralField, output: &mut RealField) {
        check_layout(&self.layout, input.layout(), "inverse input");
        check_layout(&self.layout, output.layout(), "inverse output");
        let ny = self.layout.grid.ny;
        let nyc = self.layout.grid.spectral_ny();

        self.rows_to_columns(input.as_slice());
        let fft = Arc::clone(&self.column_inverse);
        self.transform_columns(&fft);
        let mut half = std::mem::take(&mut self.half);
        self.columns_to_rows(&mut half);

        let out = output.as_mut_slice();
        out.fill(0.0);
        for i in 0..self.layout.local_n0 {
            let row = &half[i * nyc..(i + 1) * nyc];
            self.row_buf[..nyc].copy_from_slice(row);
            for j in nyc..ny {
                self.row_buf[j] = row[ny - j].conj();
            }
            self.row_inverse
                .process_with_scratch(&mut self.row_buf, &mut self.scratch);
            let start = self.layout.real_idx(i, 0);
            for (dst, src) in out[start..start + ny].iter_mut().zip(&self.row_buf) {
                *dst = src.re;
            }
        }
        self.half = half;
    }
}

#[cfg(test)]
mod _tests_simulation;
