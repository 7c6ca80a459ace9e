#![cfg(test)]

use super::field::variant_fields;
use super::grid::{Grid2D, SlabLayout};
use super::integrator::{Integrator, NonConvergencePolicy};

const INTEGRATOR: Integrator = Integrator {
    dt: 0.1,
    gamma: 2.0,
    alpha: 1.5,
};

fn layout() -> SlabLayout {
    SlabLayout::serial(Grid2D::new(3, 4, 1.0))
}

#[test]
fn zero_force_at_rest_stays_put() {
    let layout = layout();
    let mut eta = variant_fields(layout);
    let mut eta_old = variant_fields(layout);
    let chem = variant_fields(layout);
    for _ in 0..100 {
        let change = INTEGRATOR.advance(&mut eta, &mut eta_old, &chem);
        assert_eq!(change, 0.0);
    }
    assert!(eta.iter().all(|f| f.as_slice().iter().all(|v| *v == 0.0)));
}

#[test]
fn uniform_rest_state_has_no_drift() {
    let layout = layout();
    let mut eta = variant_fields(layout);
    for field in eta.iter_mut() {
        field.fill(0.8);
    }
    let mut eta_old = eta.clone();
    let chem = variant_fields(layout);
    for _ in 0..200 {
        INTEGRATOR.advance(&mut eta, &mut eta_old, &chem);
    }
    for value in eta[2].owned_values() {
        assert!((value - 0.8).abs() < 1e-12);
    }
}

#[test]
fn single_step_matches_update_formula() {
    let layout = layout();
    let mut eta = variant_fields(layout);
    let mut eta_old = variant_fields(layout);
    let mut chem = variant_fields(layout);
    eta[1].fill(0.5);
    eta_old[1].fill(0.4);
    chem[1].fill(2.0);

    let change = INTEGRATOR.advance(&mut eta, &mut eta_old, &chem);

    let dtg = 0.5 * 0.1 * 2.0;
    let dta2 = 0.1 * 0.1 * 1.5 * 1.5;
    let expected = (2.0 * 0.5 + (dtg - 1.0) * 0.4 - dta2 * 2.0) / (1.0 + dtg);
    assert!((eta[1].get(2, 3) - expected).abs() < 1e-14);
    assert_eq!(eta_old[1].get(2, 3), 0.5);
    assert!((change - (expected - 0.5).abs()).abs() < 1e-14);
    // padding untouched
    assert_eq!(eta[1].get(0, 4), 0.0);
}

#[test]
fn reported_change_is_the_largest_over_variants() {
    let layout = layout();
    let mut eta = variant_fields(layout);
    let mut eta_old = variant_fields(layout);
    let mut chem = variant_fields(layout);
    chem[0].fill(1.0);
    chem[2].set(1, 1, -10.0);

    let change = INTEGRATOR.advance(&mut eta, &mut eta_old, &chem);

    let scale = 0.1 * 0.1 * 1.5 * 1.5 / (1.0 + 0.1);
    assert!(change >= 0.0);
    assert!((change - 10.0 * scale).abs() < 1e-14);
}

#[test]
fn nonconvergence_policy_defaults_to_fail() {
    assert_eq!(NonConvergencePolicy::default(), NonConvergencePolicy::Fail);
}
