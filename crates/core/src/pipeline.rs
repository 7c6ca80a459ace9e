//! Per-iteration field coupling: stress sources → displacement → strain →
//! Laplacian → driving force.
//!
//! All buffers live in [`CouplingWorkspace`] and are recomputed from scratch
//! every iteration. Stages that transform are collectives and must be run
//! in the same order on every worker.

use num_complex::Complex64;

use crate::backend::{TransformEngine, check_layout};
use crate::field::{RealField, SpectralField, TensorField, VARIANTS, VariantFields, variant_fields};
use crate::greens::{GreensOperator, Wavevectors};
use crate::grid::SlabLayout;
use crate::material::{ChemicalCoefficients, ElasticFields, MaterialModel, Tensor2, double_dot};

/// Independent components of a symmetric 2×2 source tensor.
const SOURCE_XX: usize = 0;
const SOURCE_XY: usize = 1;
const SOURCE_YY: usize = 2;

/// Source component holding tensor entry `(j, k)`.
#[inline]
fn source_component(j: usize, k: usize) -> usize {
    // (0,0) -> XX, (0,1)/(1,0) -> XY, (1,1) -> YY
    j + k
}

const STRAIN_XX: usize = 0;
const STRAIN_YY: usize = 1;
const STRAIN_XY: usize = 2;

/// Split of the driving force on one variant in one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrivingForceTerms {
    pub bulk: f64,
    pub gradient: f64,
    pub squeeze: f64,
    pub homogeneous: f64,
    pub heterogeneous: f64,
}

impl DrivingForceTerms {
    pub fn total(&self) -> f64 {
        self.bulk + self.gradient + self.squeeze + self.homogeneous + self.heterogeneous
    }
}

/// Local inputs of the driving force for one cell.
#[derive(Debug, Clone, Copy)]
pub struct CellInputs {
    pub eta: [f64; VARIANTS],
    pub chem: ChemicalCoefficients,
    /// Gradient-energy coefficient.
    pub beta: f64,
    pub lap: [f64; VARIANTS],
    pub sig0: [Tensor2; VARIANTS],
    /// `σ0[p] : ε0[q]`, indexed `[p][q]`.
    pub sigeps: [[f64; VARIANTS]; VARIANTS],
    pub strain: Tensor2,
    pub applied: Tensor2,
}

/// Thermodynamic driving force on variant `p`.
pub fn driving_force_terms(cell: &CellInputs, p: usize) -> DrivingForceTerms {
    let eta = cell.eta;
    let eta_p = eta[p];
    let eta_sum: f64 = eta.iter().map(|e| e * e).sum();
    let ChemicalCoefficients { a, b, c } = cell.chem;

    let bulk = eta_p * (a - b * eta_p * eta_p + c * eta_sum * eta_sum);
    let gradient = -cell.beta * cell.lap[p];
    let squeeze = (0..VARIANTS)
        .map(|q| 2.0 * cell.sigeps[p][q] * eta_p * eta[q] * eta[q])
        .sum();
    let homogeneous = -2.0 * double_dot(&cell.sig0[p], &cell.applied) * eta_p;
    let heterogeneous = -2.0 * eta_p * double_dot(&cell.sig0[p], &cell.strain);

    DrivingForceTerms {
        bulk,
        gradient,
        squeeze,
        homogeneous,
        heterogeneous,
    }
}

#[derive(Debug, Clone)]
pub struct CouplingWorkspace {
    layout: SlabLayout,
    /// `σ0[p] η_p²`, indexed `[p][component]`.
    s0n2: [[RealField; 3]; VARIANTS],
    ks0n2: [[SpectralField; 3]; VARIANTS],
    ku: [SpectralField; 2],
    keps: [SpectralField; 3],
    keta: SpectralField,
    klap: SpectralField,
    pub ux: RealField,
    pub uy: RealField,
    pub strain: TensorField,
    pub lap: VariantFields,
    pub chem: VariantFields,
}

impl CouplingWorkspace {
    pub fn new(layout: SlabLayout) -> Self {
        let real = || RealField::zeros(layout);
        let spectral = || SpectralField::zeros(layout);
        Self {
            layout,
            s0n2: std::array::from_fn(|_| std::array::from_fn(|_| real())),
            ks0n2: std::array::from_fn(|_| std::array::from_fn(|_| spectral())),
            ku: std::array::from_fn(|_| spectral()),
            keps: std::array::from_fn(|_| spectral()),
            keta: spectral(),
            klap: spectral(),
            ux: real(),
            uy: real(),
            strain: TensorField::zeros(layout),
            lap: variant_fields(layout),
            chem: variant_fields(layout),
        }
    }

    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    /// Form `σ0[p] η_p²` and transform each of its 9 independent components.
    pub fn stress_sources<E: TransformEngine>(
        &mut self,
        engine: &mut E,
        elastic: &ElasticFields,
        eta: &VariantFields,
    ) {
        check_layout(engine.layout(), &self.layout, "coupling workspace");
        for p in 0..VARIANTS {
            let sig0 = &elastic.sig0[p];
            let eta_p = eta[p].as_slice();
            for idx in self.layout.cells() {
                let eta_sq = eta_p[idx] * eta_p[idx];
                let sig = sig0.at(idx);
                self.s0n2[p][SOURCE_XX].as_mut_slice()[idx] = sig[0][0] * eta_sq;
                self.s0n2[p][SOURCE_XY].as_mut_slice()[idx] = sig[0][1] * eta_sq;
                self.s0n2[p][SOURCE_YY].as_mut_slice()[idx] = sig[1][1] * eta_sq;
            }
        }
        for p in 0..VARIANTS {
            for component in 0..3 {
                engine.forward(&self.s0n2[p][component], &mut self.ks0n2[p][component]);
            }
        }
    }

    /// Periodic equilibrium solve `û_i = −i Σ_{p,j,l} G_ij k_l ŝ[p]_jl`, then back to real space.
    pub fn displacement<E: TransformEngine>(&mut self, engine: &mut E, greens: &GreensOperator) {
        let minus_i = Complex64::new(0.0, -1.0);
        for (idx, k) in greens.wavevectors().iter() {
            let g = greens.tensor(idx);
            for i in 0..2 {
                let mut acc = Complex64::default();
                for p in 0..VARIANTS {
                    for j in 0..2 {
                        for l in 0..2 {
                            let source = self.ks0n2[p][source_component(j, l)].as_slice()[idx];
                            acc += g[i][j] * k[l] * source;
                        }
                    }
                }
                self.ku[i].as_mut_slice()[idx] = minus_i * acc;
            }
        }
        engine.inverse_normalized(&self.ku[0], &mut self.ux);
        engine.inverse_normalized(&self.ku[1], &mut self.uy);
    }

    /// Symmetric gradient of the displacement by spectral differentiation.
    ///
    /// Must follow [`Self::displacement`] in the same iteration.
    pub fn strain<E: TransformEngine>(&mut self, engine: &mut E, wavevectors: &Wavevectors) {
        let i_unit = Complex64::new(0.0, 1.0);
        for (idx, [kx, ky]) in wavevectors.iter() {
            let ux = self.ku[0].as_slice()[idx];
            let uy = self.ku[1].as_slice()[idx];
            self.keps[STRAIN_XX].as_mut_slice()[idx] = i_unit * kx * ux;
            self.keps[STRAIN_YY].as_mut_slice()[idx] = i_unit * ky * uy;
            self.keps[STRAIN_XY].as_mut_slice()[idx] = 0.5 * i_unit * (ky * ux + kx * uy);
        }
        engine.inverse_normalized(&self.keps[STRAIN_XX], self.strain.get_mut(0, 0));
        engine.inverse_normalized(&self.keps[STRAIN_YY], self.strain.get_mut(1, 1));
        engine.inverse_normalized(&self.keps[STRAIN_XY], self.strain.get_mut(0, 1));
        self.strain.mirror_off_diagonal();
    }

    /// Lattice Laplacian of every variant, using the symbol `−2 (1 − cos |k|)`
    /// in place of `−|k|²`.
    pub fn laplacian<E: TransformEngine>(
        &mut self,
        engine: &mut E,
        wavevectors: &Wavevectors,
        eta: &VariantFields,
    ) {
        for p in 0..VARIANTS {
            engine.forward(&eta[p], &mut self.keta);
            for (idx, [kx, ky]) in wavevectors.iter() {
                let k2 = kx * kx + ky * ky;
                let kmod = 2.0 * (1.0 - k2.sqrt().cos());
                self.klap.as_mut_slice()[idx] = -kmod * self.keta.as_slice()[idx];
            }
            engine.inverse_normalized(&self.klap, &mut self.lap[p]);
        }
    }

    /// Combine bulk, gradient and elastic contributions into `chem`.
    ///
    /// Reads the strain and Laplacian left by the preceding stages.
    pub fn driving_force(
        &mut self,
        model: &MaterialModel,
        elastic: &ElasticFields,
        phi: &RealField,
        eta: &VariantFields,
        applied: &Tensor2,
        beta: f64,
    ) {
        let phi = phi.as_slice();
        for idx in self.layout.cells() {
            let cell = CellInputs {
                eta: std::array::from_fn(|p| eta[p].as_slice()[idx]),
                chem: model.chemical_at(phi[idx]),
                beta,
                lap: std::array::from_fn(|p| self.lap[p].as_slice()[idx]),
                sig0: std::array::from_fn(|p| elastic.sig0[p].at(idx)),
                sigeps: std::array::from_fn(|p| {
                    std::array::from_fn(|q| elastic.sigeps[p][q].as_slice()[idx])
                }),
                strain: self.strain.at(idx),
                applied: *applied,
            };
            for p in 0..VARIANTS {
                self.chem[p].as_mut_slice()[idx] = driving_force_terms(&cell, p).total();
            }
        }
    }
}
