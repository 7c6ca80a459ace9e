//! Transform engine trait for distributed spectral operations.
//!
//! An engine is constructed for one grid and one worker of a group; it owns
//! its plans and scratch buffers and is passed by reference to every stage
//! that transforms. Both directions are collectives: every worker of the
//! group must call them in the same order.
//!
//! The inverse is unnormalized, so `inverse(forward(x)) == nx * ny * x`.
//! Use [`TransformEngine::inverse_normalized`] to get `x` back.

use crate::comm::Communicator;
use crate::field::{RealField, SpectralField};
use crate::grid::SlabLayout;

pub trait TransformEngine {
    type Comm: Communicator;

    fn layout(&self) -> &SlabLayout;
    fn comm(&self) -> &Self::Comm;

    /// Real-to-complex transform of the owned rows into the owned half-spectrum rows.
    fn forward(&mut self, input: &RealField, output: &mut SpectralField);

    /// Complex-to-real transform; padding columns of `output` are zeroed.
    fn inverse(&mut self, input: &SpectralField, output: &mut RealField);

    fn inverse_normalized(&mut self, input: &SpectralField, output: &mut RealField) {
        self.inverse(input, output);
        output.normalize();
    }

    fn alloc_real(&self) -> RealField {
        RealField::zeros(*self.layout())
    }

    fn alloc_spectral(&self) -> SpectralField {
        SpectralField::zeros(*self.layout())
    }
}

/// Abort on fields allocated for another layout.
#[inline]
pub fn check_layout(engine: &SlabLayout, field: &SlabLayout, what: &str) {
    assert_eq!(
        engine, field,
        "{what} was allocated for a different slab layout than the transform engine"
    );
}
