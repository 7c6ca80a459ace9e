#![cfg(test)]

use super::field::{RealField, SpectralField, TensorField, variant_fields};
use super::grid::{Grid2D, SlabLayout};

fn layout() -> SlabLayout {
    SlabLayout::serial(Grid2D::new(3, 4, 1.0))
}

#[test]
fn zeros_allocate_padded_storage() {
    let layout = layout();
    let real = RealField::zeros(layout);
    let spectral = SpectralField::zeros(layout);
    assert_eq!(real.len(), 3 * 6);
    assert_eq!(spectral.len(), 3 * 3);
    assert!(real.as_slice().iter().all(|v| *v == 0.0));
}

#[test]
#[should_panic(expected = "data length must match padded slab size")]
fn from_vec_rejects_mismatched_lengths() {
    let layout = layout();
    let _ = RealField::from_vec(layout, vec![0.0; layout.real_len() - 1]);
}

#[test]
fn from_fn_uses_global_rows_and_leaves_padding_zero() {
    let grid = Grid2D::new(4, 4, 1.0);
    let layout = SlabLayout::new(grid, 1, 2);
    let field = RealField::from_fn(layout, |i, j| (10 * i + j) as f64);
    assert_eq!(field.get(0, 0), 20.0);
    assert_eq!(field.get(1, 3), 33.0);
    assert_eq!(field.get(0, 4), 0.0);
    assert_eq!(field.get(1, 5), 0.0);
}

#[test]
fn fill_and_normalize_touch_owned_cells_only() {
    let layout = layout();
    let mut field = RealField::zeros(layout);
    field.fill(24.0);
    field.normalize();
    for i in 0..3 {
        for j in 0..4 {
            assert_eq!(field.get(i, j), 2.0);
        }
        assert_eq!(field.get(i, 4), 0.0);
        assert_eq!(field.get(i, 5), 0.0);
    }
    assert_eq!(field.owned_values().count(), 12);
}

#[test]
#[should_panic]
fn get_out_of_bounds_panics() {
    let field = RealField::zeros(layout());
    let _ = field.get(3, 0);
}

#[test]
fn mirror_off_diagonal_copies_xy_into_yx() {
    let layout = layout();
    let mut tensor = TensorField::zeros(layout);
    tensor.get_mut(0, 1).fill(1.5);
    tensor.mirror_off_diagonal();
    let idx = layout.real_idx(2, 3);
    assert_eq!(tensor.at(idx), [[0.0, 1.5], [1.5, 0.0]]);
}

#[test]
fn set_at_round_trips_through_at() {
    let layout = layout();
    let mut tensor = TensorField::zeros(layout);
    let value = [[1.0, 2.0], [3.0, 4.0]];
    tensor.set_at(7, value);
    assert_eq!(tensor.at(7), value);
    assert_eq!(tensor.get(1, 0).as_slice()[7], 3.0);
}

#[test]
fn variant_fields_share_layout() {
    let layout = layout();
    let fields = variant_fields(layout);
    assert!(fields.iter().all(|f| *f.layout() == layout));
}
