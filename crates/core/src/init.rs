//! Initial composition and order-parameter fields.
//!
//! The composition `φ` is a sharp seed shape sampled at cell centres in
//! global coordinates, then smoothed with a Gaussian filter applied in
//! spectral space and clamped back to `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::backend::TransformEngine;
use crate::field::{RealField, VariantFields, variant_fields};
use crate::greens::Wavevectors;
use crate::grid::{Grid2D, SlabLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedShape {
    /// Disc at the box centre, radius `size · min(Lx, Ly)`.
    #[default]
    Circle,
    /// Band across y, half-width `size · Lx`, centred in x.
    Stripe,
    /// Band whose centre line follows a triangle wave along y.
    Zigzag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialCondition {
    pub shape: SeedShape,
    pub size: f64,
    pub smoothing_length: f64,
    /// Initial value of every `η_p` and `η_old_p`.
    pub eta: f64,
}

impl SeedShape {
    /// 1 inside the shape, 0 outside.
    pub fn indicator(&self, grid: &Grid2D, size: f64, x: f64, y: f64) -> f64 {
        let (lx, ly) = (grid.lx(), grid.ly());
        let inside = match self {
            SeedShape::Circle => {
                let radius = size * lx.min(ly);
                let (rx, ry) = (x - 0.5 * lx, y - 0.5 * ly);
                rx * rx + ry * ry <= radius * radius
            }
            SeedShape::Stripe => (x - 0.5 * lx).abs() <= size * lx,
            SeedShape::Zigzag => {
                let half_width = 0.5 * size * lx;
                let wavelength = 0.5 * ly;
                let centre = 0.5 * lx + half_width * triangle_wave(y / wavelength);
                (x - centre).abs() <= half_width
            }
        };
        if inside { 1.0 } else { 0.0 }
    }
}

/// Unit-amplitude triangle wave with period 1.
fn triangle_wave(t: f64) -> f64 {
    4.0 * (t - (t + 0.5).floor()).abs() - 1.0
}

/// Seed and smooth the composition field. Collective when smoothing.
pub fn composition<E: TransformEngine>(engine: &mut E, init: &InitialCondition) -> RealField {
    let layout = *engine.layout();
    let grid = layout.grid;
    let mut phi = RealField::from_fn(layout, |i, j| {
        let x = (i as f64 + 0.5) * grid.dx;
        let y = (j as f64 + 0.5) * grid.dx;
        init.shape.indicator(&grid, init.size, x, y)
    });

    if init.smoothing_length > 0.0 {
        let wavevectors = Wavevectors::new(layout);
        let mut spectrum = engine.alloc_spectral();
        engine.forward(&phi, &mut spectrum);
        let width2 = init.smoothing_length * init.smoothing_length;
        for (idx, [kx, ky]) in wavevectors.iter() {
            let k2 = kx * kx + ky * ky;
            spectrum.as_mut_slice()[idx] *= (-0.5 * k2 * width2).exp();
        }
        engine.inverse_normalized(&spectrum, &mut phi);
        let ny = grid.ny;
        for row in phi.as_mut_slice().chunks_exact_mut(grid.padded_ny()) {
            for value in &mut row[..ny] {
                *value = value.clamp(0.0, 1.0);
            }
        }
    }
    phi
}

/// `(η, η_old)` both set to the configured initial value.
pub fn order_parameters(layout: SlabLayout, init: &InitialCondition) -> (VariantFields, VariantFields) {
    let mut eta = variant_fields(layout);
    for field in eta.iter_mut() {
        field.fill(init.eta);
    }
    let eta_old = eta.clone();
    (eta, eta_old)
}
