#![cfg(test)]

use std::f64::consts::PI;

use super::greens::{GreensOperator, Wavevectors, regularization_radius, wavenumber};
use super::grid::{Grid2D, SlabLayout};
use super::material::ElasticModuli;

const MODULI: ElasticModuli = ElasticModuli { mu: 1.2, nu: 0.3 };

#[test]
fn wavenumber_wraps_upper_half_to_negative() {
    let length = 8.0;
    assert_eq!(wavenumber(0, 8, length), 0.0);
    assert!((wavenumber(4, 8, length) - PI).abs() < 1e-14);
    assert!((wavenumber(5, 8, length) + 3.0 * 2.0 * PI / length).abs() < 1e-14);
    assert!((wavenumber(7, 8, length) + 2.0 * PI / length).abs() < 1e-14);
}

#[test]
fn operator_is_symmetric_everywhere() {
    let grid = Grid2D::new(12, 10, 0.7);
    let greens = GreensOperator::new(SlabLayout::serial(grid), MODULI);
    for g in greens.tensors() {
        assert_eq!(g[0][1], g[1][0]);
    }
}

#[test]
fn operator_vanishes_inside_regularization_radius() {
    let grid = Grid2D::new(16, 16, 0.25);
    let layout = SlabLayout::serial(grid);
    let greens = GreensOperator::new(layout, MODULI);
    let radius = regularization_radius(&grid);
    assert_eq!(*greens.tensor(0), [[0.0; 2]; 2]);
    let mut zeroed = 0;
    for (idx, [kx, ky]) in greens.wavevectors().iter() {
        if kx * kx + ky * ky < radius {
            assert_eq!(*greens.tensor(idx), [[0.0; 2]; 2]);
            zeroed += 1;
        } else {
            assert!(greens.tensor(idx)[1][1] != 0.0);
        }
    }
    assert!(zeroed >= 1);
}

#[test]
fn operator_matches_closed_form_along_x() {
    let grid = Grid2D::new(8, 8, 1.0);
    let layout = SlabLayout::serial(grid);
    let greens = GreensOperator::new(layout, MODULI);
    let k = 2.0 * PI / 8.0;
    let g = greens.tensor(layout.spectral_idx(1, 0));
    let (mu, nu) = (MODULI.mu, MODULI.nu);
    assert!((g[0][0] - (1.0 - nu) / (2.0 * mu * k * k)).abs() < 1e-12);
    assert!((g[1][1] - 1.0 / (mu * k * k)).abs() < 1e-12);
    assert_eq!(g[0][1], 0.0);
}

#[test]
fn distributed_rows_match_serial_rows() {
    let grid = Grid2D::new(9, 6, 1.0);
    let serial = GreensOperator::new(SlabLayout::serial(grid), MODULI);
    let nyc = grid.spectral_ny();
    for rank in 0..3 {
        let layout = SlabLayout::new(grid, rank, 3);
        let slab = GreensOperator::new(layout, MODULI);
        let offset = layout.local_0_start * nyc;
        assert_eq!(
            slab.tensors(),
            &serial.tensors()[offset..offset + layout.spectral_len()]
        );
    }
}

#[test]
fn wavevectors_store_only_non_negative_ky() {
    let grid = Grid2D::new(4, 6, 1.0);
    let wavevectors = Wavevectors::new(SlabLayout::new(grid, 1, 2));
    assert_eq!(wavevectors.iter().count(), 2 * 4);
    assert!(wavevectors.iter().all(|(_, [_, ky])| ky >= 0.0));
    // rank 1 owns global rows 2 and 3; row 3 wraps to -1
    assert!((wavevectors.k(1, 0)[0] + 2.0 * PI / 4.0).abs() < 1e-14);
    assert!((wavevectors.k_squared(0, 3) - (PI * PI + PI * PI)).abs() < 1e-12);
}
