//! Run configuration loaded from a flat TOML file.
//!
//! # File Format
//!
//! Physical parameters are top-level keys; optional run controls have
//! defaults. Unknown keys are ignored.
//!
//! ```toml
//! Nx = 64
//! Ny = 64
//! dx = 1.0
//! dt = 0.05
//! mu_el = 1.0
//! nu_el = 0.3
//! nsteps = 10
//! out_freq = 5
//! epsx = 0.0
//! epsy = 0.0
//! gamma = 1.0
//! alpha = 1.0
//! beta = 1.0
//! change_etap_thresh = 1e-4
//!
//! M0_chem_a = 0.5
//! M0_chem_b = 2.0
//! M0_chem_c = 1.0
//! M1_chem_a = -0.5
//! M1_chem_b = 2.0
//! M1_chem_c = 1.0
//!
//! M0_2H_a = 3.19
//! M0_2H_b = 5.52
//! M0_Tp_a = 3.18
//! M0_Tp_b = 5.71
//! M1_2H_a = 3.16
//! M1_2H_b = 5.47
//! M1_Tp_a = 3.18
//! M1_Tp_b = 5.67
//! M0_norm = 1.0
//! M1_norm = 1.0
//!
//! # optional
//! max_relax_iterations = 100000
//! nonconvergence = "fail"
//! noise_amplitude = 0.003
//! seed = 42
//! initial_shape = "circle"
//! output_dir = "out"
//!
//! [metrics]
//! enabled = true
//! output = "out/metrics.jsonl"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::grid::Grid2D;
use crate::init::{InitialCondition, SeedShape};
use crate::integrator::{Integrator, NonConvergencePolicy, RelaxLimits};
use crate::material::{ChemicalCoefficients, ElasticModuli, EndMember, MATERIALS};
use crate::metrics::MetricsConfig;
use crate::noise::clock_seed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(rename = "Nx")]
    pub nx: usize,
    #[serde(rename = "Ny")]
    pub ny: usize,
    pub dx: f64,
    pub dt: f64,
    pub mu_el: f64,
    pub nu_el: f64,
    pub nsteps: usize,
    pub out_freq: usize,
    /// Applied macroscopic strain reached at the last load step.
    pub epsx: f64,
    pub epsy: f64,
    /// Damping coefficient.
    pub gamma: f64,
    /// Artificial inertia coefficient.
    pub alpha: f64,
    /// Gradient-energy coefficient.
    pub beta: f64,
    pub change_etap_thresh: f64,

    #[serde(rename = "M0_chem_a")]
    pub m0_chem_a: f64,
    #[serde(rename = "M0_chem_b")]
    pub m0_chem_b: f64,
    #[serde(rename = "M0_chem_c")]
    pub m0_chem_c: f64,
    #[serde(rename = "M1_chem_a")]
    pub m1_chem_a: f64,
    #[serde(rename = "M1_chem_b")]
    pub m1_chem_b: f64,
    #[serde(rename = "M1_chem_c")]
    pub m1_chem_c: f64,

    #[serde(rename = "M0_2H_a")]
    pub m0_2h_a: f64,
    #[serde(rename = "M0_2H_b")]
    pub m0_2h_b: f64,
    #[serde(rename = "M0_Tp_a")]
    pub m0_tp_a: f64,
    #[serde(rename = "M0_Tp_b")]
    pub m0_tp_b: f64,
    #[serde(rename = "M1_2H_a")]
    pub m1_2h_a: f64,
    #[serde(rename = "M1_2H_b")]
    pub m1_2h_b: f64,
    #[serde(rename = "M1_Tp_a")]
    pub m1_tp_a: f64,
    #[serde(rename = "M1_Tp_b")]
    pub m1_tp_b: f64,
    #[serde(rename = "M0_norm")]
    pub m0_norm: f64,
    #[serde(rename = "M1_norm")]
    pub m1_norm: f64,

    #[serde(default = "default_max_relax_iterations")]
    pub max_relax_iterations: usize,
    #[serde(default)]
    pub nonconvergence: NonConvergencePolicy,
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f64,
    /// Noise seed; drawn from the clock at startup when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub initial_shape: SeedShape,
    #[serde(default = "default_shape_size")]
    pub shape_size: f64,
    /// Gaussian smoothing length of the composition field (defaults to `2 dx`).
    #[serde(default)]
    pub smoothing_length: Option<f64>,
    #[serde(default)]
    pub eta_initial: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Area-fraction log, relative to `output_dir` unless absolute.
    #[serde(default = "default_area_log")]
    pub area_log: PathBuf,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_max_relax_iterations() -> usize {
    100_000
}

fn default_noise_amplitude() -> f64 {
    0.003
}

fn default_shape_size() -> f64 {
    0.25
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_area_log() -> PathBuf {
    PathBuf::from("area_fraction.dat")
}

impl SimulationConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        raw.parse()
    }

    pub fn grid(&self) -> Grid2D {
        Grid2D::new(self.nx, self.ny, self.dx)
    }

    pub fn moduli(&self) -> ElasticModuli {
        ElasticModuli {
            mu: self.mu_el,
            nu: self.nu_el,
        }
    }

    pub fn end_members(&self) -> [EndMember; MATERIALS] {
        [
            EndMember {
                chem: ChemicalCoefficients {
                    a: self.m0_chem_a,
                    b: self.m0_chem_b,
                    c: self.m0_chem_c,
                },
                lattice_2h: [self.m0_2h_a, self.m0_2h_b],
                lattice_tp: [self.m0_tp_a, self.m0_tp_b],
                norm: self.m0_norm,
            },
            EndMember {
                chem: ChemicalCoefficients {
                    a: self.m1_chem_a,
                    b: self.m1_chem_b,
                    c: self.m1_chem_c,
                },
                lattice_2h: [self.m1_2h_a, self.m1_2h_b],
                lattice_tp: [self.m1_tp_a, self.m1_tp_b],
                norm: self.m1_norm,
            },
        ]
    }

    pub fn integrator(&self) -> Integrator {
        Integrator {
            dt: self.dt,
            gamma: self.gamma,
            alpha: self.alpha,
        }
    }

    pub fn relax_limits(&self) -> RelaxLimits {
        RelaxLimits {
            threshold: self.change_etap_thresh,
            max_iterations: self.max_relax_iterations,
            policy: self.nonconvergence,
        }
    }

    pub fn initial_condition(&self) -> InitialCondition {
        InitialCondition {
            shape: self.initial_shape,
            size: self.shape_size,
            smoothing_length: self.smoothing_length.unwrap_or(2.0 * self.dx),
            eta: self.eta_initial,
        }
    }

    /// Pin the noise seed, drawing one from the clock if none is configured.
    ///
    /// Call once before the worker group starts so every worker shares it.
    pub fn with_resolved_seed(mut self) -> Self {
        if self.seed.is_none() {
            self.seed = Some(clock_seed());
        }
        self
    }

    /// Magnitude above which `|η|` counts as transformed (half of it is the threshold).
    pub fn area_norm(&self) -> f64 {
        self.m1_norm
    }

    pub fn area_log_path(&self) -> PathBuf {
        if self.area_log.is_absolute() {
            self.area_log.clone()
        } else {
            self.output_dir.join(&self.area_log)
        }
    }

    /// Reject values no run can proceed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(ConfigError::Invalid("Nx and Ny must be positive".into()));
        }
        if self.nsteps == 0 {
            return Err(ConfigError::Invalid("nsteps must be at least 1".into()));
        }
        if self.out_freq == 0 {
            return Err(ConfigError::Invalid("out_freq must be at least 1".into()));
        }
        for (name, value) in [("dx", self.dx), ("dt", self.dt), ("mu_el", self.mu_el)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive and finite (got {value})"
                )));
            }
        }
        if !(self.nu_el > -1.0 && self.nu_el < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "nu_el must lie in (-1, 1) (got {})",
                self.nu_el
            )));
        }
        for (name, value) in [
            ("M0_2H_a", self.m0_2h_a),
            ("M0_2H_b", self.m0_2h_b),
            ("M1_2H_a", self.m1_2h_a),
            ("M1_2H_b", self.m1_2h_b),
            ("M0_norm", self.m0_norm),
            ("M1_norm", self.m1_norm),
        ] {
            if value == 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        if self.change_etap_thresh < 0.0 {
            return Err(ConfigError::Invalid(
                "change_etap_thresh must be non-negative".into(),
            ));
        }
        if self.noise_amplitude < 0.0 {
            return Err(ConfigError::Invalid(
                "noise_amplitude must be non-negative".into(),
            ));
        }
        if self.max_relax_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_relax_iterations must be at least 1".into(),
            ));
        }
        if !(self.shape_size > 0.0) {
            return Err(ConfigError::Invalid("shape_size must be positive".into()));
        }
        if self.metrics.enabled && self.metrics.output.is_none() {
            return Err(ConfigError::Invalid(
                "metrics.output must be set when metrics are enabled".into(),
            ));
        }
        Ok(())
    }
}

impl FromStr for SimulationConfig {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: SimulationConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
