//! End-to-end runs through the slab engine on worker groups.

#![cfg(test)]

use std::f64::consts::PI;
use std::path::PathBuf;

use mart2d_core::backend::TransformEngine;
use mart2d_core::comm::run_workers;
use mart2d_core::config::SimulationConfig;
use mart2d_core::field::{RealField, VARIANTS, VariantFields};
use mart2d_core::simulation::{NoopObserver, RunSummary, Simulation};

use crate::SlabFft;

/// 64×64 scenario with a double-well chemical energy, so seeded noise grows
/// into transformed regions. The end members differ in lattice parameters.
fn scenario(name: &str) -> SimulationConfig {
    let raw = r#"
Nx = 64
Ny = 64
dx = 1.0
dt = 0.1
mu_el = 1.0
nu_el = 0.3
nsteps = 1
out_freq = 1
epsx = 0.002
epsy = 0.001
gamma = 1.0
alpha = 1.0
beta = 0.5
change_etap_thresh = 1e-5

M0_chem_a = -0.5
M0_chem_b = 0.0
M0_chem_c = 2.0
M1_chem_a = -0.5
M1_chem_b = 0.0
M1_chem_c = 2.0

M0_2H_a = 3.19
M0_2H_b = 5.52
M0_Tp_a = 3.18
M0_Tp_b = 5.71
M1_2H_a = 3.16
M1_2H_b = 5.47
M1_Tp_a = 3.18
M1_Tp_b = 5.67
M0_norm = 1.0
M1_norm = 1.0

max_relax_iterations = 1500
nonconvergence = "warn"
noise_amplitude = 0.003
seed = 2024
"#;
    let mut config: SimulationConfig = raw.parse().expect("scenario config");
    config.output_dir = scratch_dir(name);
    config
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mart2d-cpu-{name}-{}-{}",
        std::process::id(),
        mart2d_core::noise::clock_seed()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn run_group(config: &SimulationConfig, workers: usize) -> Vec<RunSummary> {
    run_workers(workers, |comm| {
        let engine = SlabFft::new(config.grid(), comm);
        let mut sim = Simulation::new(engine, config.clone()).expect("simulation");
        sim.run(None, &mut NoopObserver).expect("run")
    })
}

#[test]
fn area_fraction_does_not_depend_on_worker_count() {
    let one = scenario("one");
    let four = scenario("four");
    let serial = run_group(&one, 1);
    let group = run_group(&four, 4);

    let area = serial[0].area_fractions();
    assert_eq!(area.len(), 1);
    assert_eq!(area[0].0, 1);
    assert!(area[0].1 > 0.0 && area[0].1 < 1.0, "area fraction {}", area[0].1);
    for summary in &group {
        assert_eq!(summary.area_fractions(), area);
        assert_eq!(summary.total_iterations, serial[0].total_iterations);
        assert_eq!(summary.steps[0].max_change, serial[0].steps[0].max_change);
    }

    let log_one = std::fs::read_to_string(one.area_log_path()).expect("log");
    let log_four = std::fs::read_to_string(four.area_log_path()).expect("log");
    assert_eq!(log_one, log_four);
}

/// Non-uniform order parameters at rest, distinct per variant.
fn seed_order<E: TransformEngine>(sim: &mut Simulation<E>) {
    let layout = *sim.eta()[0].layout();
    let grid = layout.grid;
    let seeded: VariantFields = std::array::from_fn(|p| {
        RealField::from_fn(layout, |i, j| {
            let x = 2.0 * PI * i as f64 / grid.nx as f64;
            let y = 2.0 * PI * j as f64 / grid.ny as f64;
            0.05 + 0.1 * (x + p as f64).sin() * y.cos()
        })
    });
    *sim.eta_old_mut() = seeded.clone();
    *sim.eta_mut() = seeded;
}

/// Per-iteration max change and the final global `η`, assembled in rank
/// order from the owned rows of every worker.
fn seeded_trajectory(
    config: &SimulationConfig,
    workers: usize,
    iterations: usize,
) -> (Vec<f64>, Vec<Vec<f64>>) {
    let slabs = run_workers(workers, |comm| {
        let engine = SlabFft::new(config.grid(), comm);
        let mut sim = Simulation::new(engine, config.clone()).expect("simulation");
        let applied = sim.applied_strain(1);
        sim.set_applied(applied);
        seed_order(&mut sim);
        let changes: Vec<f64> = (0..iterations).map(|_| sim.relax_iteration()).collect();
        let eta: Vec<Vec<f64>> = sim
            .eta()
            .iter()
            .map(|field| field.owned_values().collect())
            .collect();
        (changes, eta)
    });

    let changes = slabs[0].0.clone();
    let mut eta = vec![Vec::new(); VARIANTS];
    for (worker_changes, slab) in &slabs {
        assert_eq!(worker_changes, &changes);
        for (global, local) in eta.iter_mut().zip(slab) {
            global.extend_from_slice(local);
        }
    }
    (changes, eta)
}

#[test]
fn seeded_trajectories_match_across_repeats_and_worker_counts() {
    let mut config = scenario("trajectory");
    config.noise_amplitude = 0.0;

    let (changes, eta) = seeded_trajectory(&config, 1, 40);
    assert!(changes[0] > 1e-6);
    assert!(changes.iter().all(|change| *change > 0.0));
    assert_eq!(eta[0].len(), 64 * 64);

    let repeat = seeded_trajectory(&config, 1, 40);
    assert_eq!(repeat, (changes.clone(), eta.clone()));
    for workers in [2, 4] {
        let (group_changes, group_eta) = seeded_trajectory(&config, workers, 40);
        assert_eq!(group_changes, changes, "{workers} workers");
        assert_eq!(group_eta, eta, "{workers} workers");
    }
}

#[test]
fn degenerate_system_stays_at_rest_on_a_group() {
    let mut config = scenario("degenerate");
    config.noise_amplitude = 0.0;
    config.epsx = 0.0;
    config.epsy = 0.0;
    config.beta = 0.0;
    config.m0_chem_a = 0.0;
    config.m0_chem_b = 0.0;
    config.m0_chem_c = 0.0;
    config.m1_chem_a = 0.0;
    config.m1_chem_b = 0.0;
    config.m1_chem_c = 0.0;
    config.m0_tp_a = config.m0_2h_a;
    config.m0_tp_b = config.m0_2h_b;
    config.m1_tp_a = config.m1_2h_a;
    config.m1_tp_b = config.m1_2h_b;
    config.eta_initial = 0.6;

    let drift = run_workers(3, |comm| {
        let engine = SlabFft::new(config.grid(), comm);
        let mut sim = Simulation::new(engine, config.clone()).expect("simulation");
        let mut worst = 0.0f64;
        for _ in 0..25 {
            worst = worst.max(sim.relax_iteration());
        }
        let eta_drift = sim
            .eta()
            .iter()
            .flat_map(|field| field.owned_values())
            .map(|v| (v - 0.6).abs())
            .fold(0.0, f64::max);
        worst.max(eta_drift)
    });
    assert!(drift.iter().all(|d| *d < 1e-12));
}
