#![cfg(test)]

use super::comm::{Communicator, SerialComm, run_workers};
use super::diagnostics::{area_fraction, count_transformed, global_max_change};
use super::field::{RealField, variant_fields};
use super::grid::{Grid2D, SlabLayout};

fn stripes(layout: SlabLayout) -> [RealField; 3] {
    let mut eta = variant_fields(layout);
    // rows 0-1 transformed in variant 0, row 3 in variant 2 (negative branch)
    eta[0] = RealField::from_fn(layout, |i, _| if i < 2 { 0.9 } else { 0.1 });
    eta[2] = RealField::from_fn(layout, |i, _| if i == 3 { -0.7 } else { 0.5 });
    eta
}

#[test]
fn count_uses_half_norm_threshold_on_magnitude() {
    let grid = Grid2D::new(4, 5, 1.0);
    let eta = stripes(SlabLayout::serial(grid));
    assert_eq!(count_transformed(&eta, 1.0), 2 * 5 + 5);
    // exactly at the threshold does not count
    assert_eq!(count_transformed(&eta, 1.8), 0);
}

#[test]
fn area_fraction_divides_by_cell_count() {
    let grid = Grid2D::new(4, 5, 1.0);
    let eta = stripes(SlabLayout::serial(grid));
    let area = area_fraction(&SerialComm, &eta, 1.0);
    assert!((area - 15.0 / 20.0).abs() < 1e-15);
}

#[test]
fn area_fraction_is_independent_of_worker_count() {
    let grid = Grid2D::new(4, 5, 1.0);
    let serial = area_fraction(&SerialComm, &stripes(SlabLayout::serial(grid)), 1.0);
    for workers in [2, 3, 4] {
        let results = run_workers(workers, |comm| {
            let layout = SlabLayout::new(grid, comm.rank(), comm.size());
            area_fraction(&comm, &stripes(layout), 1.0)
        });
        assert!(results.iter().all(|area| *area == serial));
    }
}

#[test]
fn global_max_change_takes_the_largest() {
    let results = run_workers(3, |comm| global_max_change(&comm, 0.1 * comm.rank() as f64));
    assert!(results.iter().all(|value| (*value - 0.2).abs() < 1e-15));
}

#[test]
fn overlapping_variants_are_counted_once_each() {
    let layout = SlabLayout::serial(Grid2D::new(4, 4, 1.0));
    let mut eta = variant_fields(layout);
    for field in &mut eta {
        *field = RealField::from_fn(layout, |_, _| 0.9);
    }
    let area = area_fraction(&SerialComm, &eta, 1.0);
    assert!((area - 3.0).abs() < 1e-15);
}
