//! Owned slab storage for real and spectral fields.
//!
//! Every field is bound to the [`SlabLayout`] it was allocated for. Handing
//! a field to an engine or kernel built for a different layout is a
//! programming error and panics.

use num_complex::Complex64;

use crate::grid::SlabLayout;

/// Number of transformation variants (orientation variants of the product phase).
pub const VARIANTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RealField {
    layout: SlabLayout,
    data: Vec<f64>,
}

impl RealField {
    pub fn zeros(layout: SlabLayout) -> Self {
        Self {
            data: vec![0.0; layout.real_len()],
            layout,
        }
    }

    pub fn from_vec(layout: SlabLayout, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            layout.real_len(),
            "data length must match padded slab size"
        );
        Self { layout, data }
    }

    /// Fill owned cells from a function of global `(row, column)`; padding stays zero.
    pub fn from_fn(layout: SlabLayout, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut field = Self::zeros(layout);
        for i in 0..layout.local_n0 {
            let global_i = layout.local_0_start + i;
            for j in 0..layout.grid.ny {
                let idx = layout.real_idx(i, j);
                field.data[idx] = f(global_i, j);
            }
        }
        field
    }

    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Value at local row `i`, column `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.layout.local_n0 && j < self.layout.grid.padded_ny());
        self.data[self.layout.real_idx(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.layout.local_n0 && j < self.layout.grid.padded_ny());
        let idx = self.layout.real_idx(i, j);
        self.data[idx] = value;
    }

    pub fn fill(&mut self, value: f64) {
        let ny = self.layout.grid.ny;
        for row in self.data.chunks_exact_mut(self.layout.grid.padded_ny()) {
            row[..ny].fill(value);
        }
    }

    pub fn copy_from(&mut self, other: &RealField) {
        assert_eq!(self.layout, other.layout, "field layouts differ");
        self.data.copy_from_slice(&other.data);
    }

    /// Divide every owned cell by `nx * ny`, undoing the unnormalized inverse transform.
    pub fn normalize(&mut self) {
        let area = self.layout.grid.len() as f64;
        let stride = self.layout.grid.padded_ny();
        let ny = self.layout.grid.ny;
        for row in self.data.chunks_exact_mut(stride) {
            for value in &mut row[..ny] {
                *value /= area;
            }
        }
    }

    /// Owned cells only, in row-major order.
    pub fn owned_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.layout.cells().map(move |idx| self.data[idx])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralField {
    layout: SlabLayout,
    data: Vec<Complex64>,
}

impl SpectralField {
    pub fn zeros(layout: SlabLayout) -> Self {
        Self {
            data: vec![Complex64::default(); layout.spectral_len()],
            layout,
        }
    }

    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        assert!(i < self.layout.local_n0 && j < self.layout.grid.spectral_ny());
        self.data[self.layout.spectral_idx(i, j)]
    }
}

/// Symmetric-by-construction 2×2 tensor of real fields, indexed `(i, j)`.
#[derive(Debug, Clone)]
pub struct TensorField {
    components: [[RealField; 2]; 2],
}

impl TensorField {
    pub fn zeros(layout: SlabLayout) -> Self {
        Self {
            components: std::array::from_fn(|_| std::array::from_fn(|_| RealField::zeros(layout))),
        }
    }

    pub fn get(&self, i: usize, j: usize) -> &RealField {
        &self.components[i][j]
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut RealField {
        &mut self.components[i][j]
    }

    /// Copy the `(0, 1)` component into `(1, 0)`.
    pub fn mirror_off_diagonal(&mut self) {
        let (upper, lower) = self.components.split_at_mut(1);
        lower[0][0].data.copy_from_slice(&upper[0][1].data);
    }

    /// Tensor value at storage index `idx`.
    #[inline]
    pub fn at(&self, idx: usize) -> [[f64; 2]; 2] {
        [
            [
                self.components[0][0].data[idx],
                self.components[0][1].data[idx],
            ],
            [
                self.components[1][0].data[idx],
                self.components[1][1].data[idx],
            ],
        ]
    }

    #[inline]
    pub fn set_at(&mut self, idx: usize, value: [[f64; 2]; 2]) {
        for (i, row) in value.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                self.components[i][j].data[idx] = *v;
            }
        }
    }
}

/// One real field per transformation variant.
pub type VariantFields = [RealField; VARIANTS];

pub fn variant_fields(layout: SlabLayout) -> VariantFields {
    std::array::from_fn(|_| RealField::zeros(layout))
}
