//! Two-end-member material model: eigenstrain variants, isotropic plane
//! stiffness, and the eigenstress/coupling fields interpolated by composition.

use std::f64::consts::PI;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::field::{RealField, TensorField, VARIANTS};

pub type Tensor2 = [[f64; 2]; 2];
pub type Stiffness = [[[[f64; 2]; 2]; 2]; 2];

/// Orientation of the three variants relative to the base eigenstrain.
pub const VARIANT_ANGLES: [f64; VARIANTS] = [0.0, 2.0 * PI / 3.0, -2.0 * PI / 3.0];

pub const MATERIALS: usize = 2;

/// Coefficients of the bulk driving force `η (a − b η² + c (Σ η²)²)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChemicalCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ChemicalCoefficients {
    /// Linear mix between end members at composition `phi`.
    pub fn mix(&self, other: &Self, phi: f64) -> Self {
        Self {
            a: interpolate(phi, self.a, other.a),
            b: interpolate(phi, self.b, other.b),
            c: interpolate(phi, self.c, other.c),
        }
    }
}

/// One end-member material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndMember {
    pub chem: ChemicalCoefficients,
    /// Lattice parameters `(a, b)` of the parent (2H) structure.
    pub lattice_2h: [f64; 2],
    /// Lattice parameters `(a, b)` of the product (T') structure.
    pub lattice_tp: [f64; 2],
    /// Order-parameter magnitude of the fully transformed state.
    pub norm: f64,
}

impl EndMember {
    /// Diagonal eigenstrain from the relative lattice mismatch, scaled by `1 / norm²`
    /// so that `η = norm` carries the full transformation strain.
    pub fn base_eigenstrain(&self) -> Tensor2 {
        let scale = self.norm * self.norm;
        let exx = (self.lattice_tp[0] - self.lattice_2h[0]) / (self.lattice_2h[0] * scale);
        let eyy = (self.lattice_tp[1] - self.lattice_2h[1]) / (self.lattice_2h[1] * scale);
        [[exx, 0.0], [0.0, eyy]]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticModuli {
    /// Shear modulus.
    pub mu: f64,
    /// Poisson ratio.
    pub nu: f64,
}

#[inline]
pub fn interpolate(phi: f64, m0: f64, m1: f64) -> f64 {
    (1.0 - phi) * m0 + phi * m1
}

/// Congruence transform `R T Rᵀ` with the 2D rotation by `theta`.
pub fn rotate(tensor: &Tensor2, theta: f64) -> Tensor2 {
    let (s, c) = theta.sin_cos();
    let r = [[c, -s], [s, c]];
    let mut out = [[0.0; 2]; 2];
    for m in 0..2 {
        for n in 0..2 {
            for i in 0..2 {
                for j in 0..2 {
                    out[m][n] += r[m][i] * r[n][j] * tensor[i][j];
                }
            }
        }
    }
    out
}

/// Eigenstrain of every variant of every material, indexed `[material][variant]`.
pub fn transformation_strains(materials: &[EndMember; MATERIALS]) -> [[Tensor2; VARIANTS]; MATERIALS] {
    std::array::from_fn(|mat| {
        let base = materials[mat].base_eigenstrain();
        std::array::from_fn(|p| rotate(&base, VARIANT_ANGLES[p]))
    })
}

/// Isotropic plane-stress stiffness from shear modulus and Poisson ratio.
pub fn stiffness_tensor(moduli: ElasticModuli) -> Stiffness {
    let ElasticModuli { mu, nu } = moduli;
    let young = 2.0 * mu * (1.0 + nu);
    let c11 = young / (1.0 - nu * nu);
    let c12 = young * nu / (1.0 - nu * nu);

    let mut lam = [[[[0.0; 2]; 2]; 2]; 2];
    lam[0][0][0][0] = c11;
    lam[1][1][1][1] = c11;
    lam[0][0][1][1] = c12;
    lam[1][1][0][0] = c12;
    lam[0][1][0][1] = mu;
    lam[0][1][1][0] = mu;
    lam[1][0][0][1] = mu;
    lam[1][0][1][0] = mu;
    lam
}

/// `σ_ij = λ_ijkl ε_kl`
pub fn contract(lam: &Stiffness, eps: &Tensor2) -> Tensor2 {
    let mut sig = [[0.0; 2]; 2];
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..2 {
                for l in 0..2 {
                    sig[i][j] += lam[i][j][k][l] * eps[k][l];
                }
            }
        }
    }
    sig
}

/// `a : b`
pub fn double_dot(a: &Tensor2, b: &Tensor2) -> f64 {
    a[0][0] * b[0][0] + a[0][1] * b[0][1] + a[1][0] * b[1][0] + a[1][1] * b[1][1]
}

/// Constant-for-the-run material tensors, shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct MaterialModel {
    pub materials: [EndMember; MATERIALS],
    pub moduli: ElasticModuli,
    pub eps_t: [[Tensor2; VARIANTS]; MATERIALS],
    pub stiffness: Stiffness,
}

impl MaterialModel {
    pub fn new(materials: [EndMember; MATERIALS], moduli: ElasticModuli) -> Self {
        let model = Self {
            eps_t: transformation_strains(&materials),
            stiffness: stiffness_tensor(moduli),
            materials,
            moduli,
        };
        model.log_tensors();
        model
    }

    /// Bulk coefficients at composition `phi`.
    #[inline]
    pub fn chemical_at(&self, phi: f64) -> ChemicalCoefficients {
        self.materials[0].chem.mix(&self.materials[1].chem, phi)
    }

    fn log_tensors(&self) {
        for (mat, variants) in self.eps_t.iter().enumerate() {
            for (p, eps) in variants.iter().enumerate() {
                debug!("[material] eps_T[M{mat}][{p}] = {eps:?}");
            }
        }
        debug!(
            "[material] lambda xxxx={:.4e} xxyy={:.4e} xyxy={:.4e}",
            self.stiffness[0][0][0][0], self.stiffness[0][0][1][1], self.stiffness[0][1][0][1]
        );
    }
}

/// Eigenstrain, eigenstress and quartic coupling fields over the owned slab.
///
/// Computed once from the composition field; read-only while stepping.
#[derive(Debug, Clone)]
pub struct ElasticFields {
    pub eps0: [TensorField; VARIANTS],
    pub sig0: [TensorField; VARIANTS],
    /// `σ0[p] : ε0[q]`
    pub sigeps: [[RealField; VARIANTS]; VARIANTS],
}

impl ElasticFields {
    pub fn build(model: &MaterialModel, phi: &RealField) -> Self {
        let layout = *phi.layout();
        let mut eps0: [TensorField; VARIANTS] = std::array::from_fn(|_| TensorField::zeros(layout));
        let mut sig0: [TensorField; VARIANTS] = std::array::from_fn(|_| TensorField::zeros(layout));
        let mut sigeps: [[RealField; VARIANTS]; VARIANTS] =
            std::array::from_fn(|_| std::array::from_fn(|_| RealField::zeros(layout)));

        let phi_values = phi.as_slice();
        for idx in layout.cells() {
            let phi_here = phi_values[idx];
            let mut local_eps = [[[0.0; 2]; 2]; VARIANTS];
            let mut local_sig = [[[0.0; 2]; 2]; VARIANTS];
            for p in 0..VARIANTS {
                for i in 0..2 {
                    for j in 0..2 {
                        local_eps[p][i][j] =
                            interpolate(phi_here, model.eps_t[0][p][i][j], model.eps_t[1][p][i][j]);
                    }
                }
                local_sig[p] = contract(&model.stiffness, &local_eps[p]);
                eps0[p].set_at(idx, local_eps[p]);
                sig0[p].set_at(idx, local_sig[p]);
            }
            for p in 0..VARIANTS {
                for q in 0..VARIANTS {
                    sigeps[p][q].as_mut_slice()[idx] = double_dot(&local_sig[p], &local_eps[q]);
                }
            }
        }

        Self { eps0, sig0, sigeps }
    }
}
