//! Core physics, field storage and run driver for the 2D martensite
//! phase-field solver.

pub mod backend;
pub mod comm;
pub mod config;
pub mod diagnostics;
pub mod field;
pub mod greens;
pub mod grid;
pub mod init;
pub mod integrator;
pub mod material;
pub mod metrics;
pub mod noise;
pub mod output;
pub mod pipeline;
pub mod simulation;


#[cfg(test)]
mod _tests_diagnostics;
#[cfg(test)]
mod _tests_field;
#[cfg(test)]
mod _tests_greens;
#[cfg(test)]
mod _tests_integrator;
#[cfg(test)]
mod _tests_simulation;
