//! Damped second-order update of the order parameters.
//!
//! Each variant follows
//!
//! ```text
//! α⁻² ∂²η/∂t² + γ α⁻² ∂η/∂t = −chem
//! ```
//!
//! discretised with centred differences:
//!
//! ```text
//! η_new = [2η + (γΔt/2 − 1) η_old − (αΔt)² chem] / (1 + γΔt/2)
//! ```

use serde::{Deserialize, Serialize};

use crate::field::{RealField, VARIANTS, VariantFields};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    pub dt: f64,
    /// Damping coefficient.
    pub gamma: f64,
    /// Artificial inertia coefficient.
    pub alpha: f64,
}

impl Integrator {
    /// Advance every owned cell of every variant by one step and shift the
    /// history (`η_old ← η`, `η ← η_new`).
    ///
    /// Returns the largest `|η_new − η|` over the owned cells; never negative.
    pub fn advance(
        &self,
        eta: &mut VariantFields,
        eta_old: &mut VariantFields,
        chem: &VariantFields,
    ) -> f64 {
        let dtg = 0.5 * self.dt * self.gamma;
        let inv_denominator = 1.0 / (1.0 + dtg);
        let dta2 = self.dt * self.dt * self.alpha * self.alpha;

        let mut max_change = 0.0f64;
        for p in 0..VARIANTS {
            max_change = max_change.max(advance_variant(
                &mut eta[p],
                &mut eta_old[p],
                &chem[p],
                dtg,
                inv_denominator,
                dta2,
            ));
        }
        max_change
    }
}

fn advance_variant(
    eta: &mut RealField,
    eta_old: &mut RealField,
    chem: &RealField,
    dtg: f64,
    inv_denominator: f64,
    dta2: f64,
) -> f64 {
    let layout = *eta.layout();
    let chem = chem.as_slice();
    let eta = eta.as_mut_slice();
    let eta_old = eta_old.as_mut_slice();

    let mut max_change = 0.0f64;
    for idx in layout.cells() {
        let current = eta[idx];
        let next = inv_denominator * (2.0 * current + (dtg - 1.0) * eta_old[idx] - dta2 * chem[idx]);
        max_change = max_change.max((next - current).abs());
        eta_old[idx] = current;
        eta[idx] = next;
    }
    max_change
}

/// What to do when the relaxation loop hits its iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonConvergencePolicy {
    /// Stop the run with an error.
    #[default]
    Fail,
    /// Log a warning and treat the last iterate as converged.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxLimits {
    /// The loop continues while the global max change exceeds this.
    pub threshold: f64,
    pub max_iterations: usize,
    pub policy: NonConvergencePolicy,
}
