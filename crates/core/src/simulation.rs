//! Per-worker simulation driver.
//!
//! Each worker of the group owns one [`Simulation`] bound to its slab and
//! its transform engine. The run is a small state machine:
//!
//! ```text
//! LoadStep(s) -> Relax -> Converged -> LoadStep(s + 1) | Done
//! ```
//!
//! Every transition that reduces, transforms or writes is a collective, and
//! every worker takes the same transitions because all branching depends on
//! globally reduced values only.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::TransformEngine;
use crate::comm::Communicator;
use crate::config::{ConfigError, SimulationConfig};
use crate::diagnostics::{area_fraction, global_max_change};
use crate::field::{RealField, VariantFields};
use crate::greens::GreensOperator;
use crate::init::{composition, order_parameters};
use crate::integrator::{Integrator, NonConvergencePolicy, RelaxLimits};
use crate::material::{ElasticFields, MaterialModel, Tensor2};
use crate::metrics::{MetricsEvent, MetricsRecorder};
use crate::noise::NoiseSource;
use crate::output::{AreaLog, OutputError, SnapshotWriter, frame_name};
use crate::pipeline::CouplingWorkspace;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),

    #[error(
        "load step {step} did not converge after {iterations} iterations (max change {max_change:.3e})"
    )]
    NotConverged {
        step: usize,
        iterations: usize,
        max_change: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    LoadStep(usize),
    Relax {
        step: usize,
        iteration: usize,
    },
    Converged {
        step: usize,
        iterations: usize,
        max_change: f64,
        /// False when the iteration cap was hit under the warn policy.
        converged: bool,
    },
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadStepReport {
    pub step: usize,
    pub iterations: usize,
    pub max_change: f64,
    pub area_fraction: f64,
    pub converged: bool,
    /// Output frame written at this step, if any.
    pub frame: Option<usize>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: Vec<LoadStepReport>,
    pub total_iterations: usize,
    pub seed: u64,
    pub duration: Duration,
}

impl RunSummary {
    /// `(step, area_fraction)` pairs as written to the area log.
    pub fn area_fractions(&self) -> Vec<(usize, f64)> {
        self.steps
            .iter()
            .map(|report| (report.step, report.area_fraction))
            .collect()
    }
}

/// Progress callbacks, invoked on every worker.
pub trait RunObserver {
    fn on_iteration(&mut self, _step: usize, _iteration: usize, _max_change: f64) {}
    fn on_load_step(&mut self, _report: &LoadStepReport) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

pub struct Simulation<E: TransformEngine> {
    engine: E,
    config: SimulationConfig,
    model: MaterialModel,
    greens: GreensOperator,
    elastic: ElasticFields,
    phi: RealField,
    eta: VariantFields,
    eta_old: VariantFields,
    workspace: CouplingWorkspace,
    noise: NoiseSource,
    integrator: Integrator,
    limits: RelaxLimits,
    applied: Tensor2,
    phase: Phase,
}

impl<E: TransformEngine> Simulation<E> {
    /// Precompute material fields and the Green's operator, and seed the
    /// composition and order parameters. Collective.
    ///
    /// With noise enabled the seed must already be resolved (see
    /// [`SimulationConfig::with_resolved_seed`]) so all workers agree on it.
    pub fn new(mut engine: E, config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let layout = *engine.layout();
        if layout.grid != config.grid() {
            return Err(ConfigError::Invalid(format!(
                "engine grid {}x{} does not match configured grid {}x{}",
                layout.grid.nx, layout.grid.ny, config.nx, config.ny
            ))
            .into());
        }
        let noise = if config.noise_amplitude > 0.0 {
            let seed = config.seed.ok_or_else(|| {
                ConfigError::Invalid("noise seed must be resolved before the run starts".into())
            })?;
            NoiseSource::new(config.noise_amplitude, seed)
        } else {
            NoiseSource::disabled()
        };

        let model = MaterialModel::new(config.end_members(), config.moduli());
        let greens = GreensOperator::new(layout, config.moduli());
        let init = config.initial_condition();
        let phi = composition(&mut engine, &init);
        let elastic = ElasticFields::build(&model, &phi);
        let (eta, eta_old) = order_parameters(layout, &init);

        Ok(Self {
            workspace: CouplingWorkspace::new(layout),
            integrator: config.integrator(),
            limits: config.relax_limits(),
            applied: [[0.0; 2]; 2],
            phase: Phase::LoadStep(1),
            engine,
            config,
            model,
            greens,
            elastic,
            phi,
            eta,
            eta_old,
            noise,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn model(&self) -> &MaterialModel {
        &self.model
    }

    pub fn greens(&self) -> &GreensOperator {
        &self.greens
    }

    pub fn elastic(&self) -> &ElasticFields {
        &self.elastic
    }

    pub fn phi(&self) -> &RealField {
        &self.phi
    }

    pub fn eta(&self) -> &VariantFields {
        &self.eta
    }

    pub fn eta_mut(&mut self) -> &mut VariantFields {
        &mut self.eta
    }

    pub fn eta_old_mut(&mut self) -> &mut VariantFields {
        &mut self.eta_old
    }

    pub fn workspace(&self) -> &CouplingWorkspace {
        &self.workspace
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn applied(&self) -> &Tensor2 {
        &self.applied
    }

    /// Macroscopic strain applied during load step `step` (1-based).
    pub fn applied_strain(&self, step: usize) -> Tensor2 {
        let ramp = step as f64 / self.config.nsteps as f64;
        [
            [self.config.epsx * ramp, 0.0],
            [0.0, self.config.epsy * ramp],
        ]
    }

    pub fn set_applied(&mut self, applied: Tensor2) {
        self.applied = applied;
    }

    fn is_root(&self) -> bool {
        self.engine.comm().is_root()
    }

    /// One relaxation iteration on the current `η`. Collective.
    ///
    /// Returns the global maximum per-cell change.
    pub fn relax_iteration(&mut self) -> f64 {
        let Self {
            engine,
            config,
            model,
            greens,
            elastic,
            phi,
            eta,
            eta_old,
            workspace,
            noise,
            integrator,
            applied,
            ..
        } = self;

        workspace.stress_sources(engine, elastic, eta);
        workspace.displacement(engine, greens);
        workspace.strain(engine, greens.wavevectors());
        noise.perturb(eta);
        workspace.laplacian(engine, greens.wavevectors(), eta);
        workspace.driving_force(model, elastic, phi, eta, applied, config.beta);
        let local = integrator.advance(eta, eta_old, &workspace.chem);
        global_max_change(engine.comm(), local)
    }

    /// Run every load step, writing snapshots and the area log under the
    /// configured output directory. Collective.
    pub fn run(
        &mut self,
        metrics: Option<&MetricsRecorder>,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary, SimulationError> {
        let run_start = Instant::now();
        let nsteps = self.config.nsteps;
        let out_freq = self.config.out_freq;
        let norm = self.config.area_norm();
        let metrics = metrics.filter(|_| self.is_root());

        let mut snapshots = SnapshotWriter::create(self.engine.comm(), &self.config.output_dir)?;
        snapshots.write(self.engine.comm(), "phi", &self.phi)?;
        let area_log = AreaLog::create(self.engine.comm(), &self.config.area_log_path())?;

        if self.is_root() {
            info!(
                "[setup] grid={}x{} workers={} nsteps={} out_freq={} noise={} seed={}",
                self.config.nx,
                self.config.ny,
                self.engine.comm().size(),
                nsteps,
                out_freq,
                self.noise.amplitude(),
                self.noise.seed()
            );
        }
        if let Some(recorder) = metrics {
            recorder.emit(MetricsEvent::RunStart {
                grid_nx: self.config.nx,
                grid_ny: self.config.ny,
                workers: self.engine.comm().size(),
                nsteps,
                seed: self.noise.seed(),
                noise_amplitude: self.noise.amplitude(),
            });
        }

        let mut reports = Vec::with_capacity(nsteps);
        let mut total_iterations = 0usize;
        let mut frame = 0usize;
        let mut step_start = run_start;
        self.phase = Phase::LoadStep(1);

        loop {
            self.phase = match self.phase {
                Phase::LoadStep(step) => {
                    self.applied = self.applied_strain(step);
                    step_start = Instant::now();
                    if self.is_root() {
                        debug!(
                            "[load] step {step}/{nsteps} epsbar=({:.4e}, {:.4e})",
                            self.applied[0][0], self.applied[1][1]
                        );
                    }
                    Phase::Relax { step, iteration: 0 }
                }
                Phase::Relax { step, iteration } => {
                    let max_change = self.relax_iteration();
                    let iteration = iteration + 1;
                    total_iterations += 1;
                    observer.on_iteration(step, iteration, max_change);
                    if self.is_root() {
                        debug!("[relax] step={step} iter={iteration} max_change={max_change:.10}");
                    }
                    self.next_relax_phase(step, iteration, max_change)?
                }
                Phase::Converged {
                    step,
                    iterations,
                    max_change,
                    converged,
                } => {
                    let area = area_fraction(self.engine.comm(), &self.eta, norm);
                    area_log.append(self.engine.comm(), step, area)?;
                    let written = if step % out_freq == 0 {
                        frame += 1;
                        self.write_frame(&mut snapshots, frame)?;
                        Some(frame)
                    } else {
                        None
                    };

                    let report = LoadStepReport {
                        step,
                        iterations,
                        max_change,
                        area_fraction: area,
                        converged,
                        frame: written,
                        duration: step_start.elapsed(),
                    };
                    if self.is_root() {
                        info!(
                            "[step {step:>4}] iters={iterations} max_change={max_change:.3e} area={area:.10} time={:.2?}",
                            report.duration
                        );
                    }
                    if let Some(recorder) = metrics {
                        recorder.emit(MetricsEvent::LoadStep {
                            step,
                            iterations,
                            max_change,
                            area_fraction: area,
                            converged,
                            duration_ms: report.duration.as_secs_f64() * 1000.0,
                        });
                    }
                    observer.on_load_step(&report);
                    reports.push(report);

                    if step < nsteps {
                        Phase::LoadStep(step + 1)
                    } else {
                        Phase::Done
                    }
                }
                Phase::Done => break,
            };
        }

        let duration = run_start.elapsed();
        if self.is_root() {
            info!(
                "[done] steps={} iterations={} elapsed={:.2?}",
                reports.len(),
                total_iterations,
                duration
            );
        }
        if let Some(recorder) = metrics {
            recorder.emit(MetricsEvent::RunDone {
                steps: reports.len(),
                total_iterations,
                duration_ms: duration.as_secs_f64() * 1000.0,
            });
        }

        Ok(RunSummary {
            steps: reports,
            total_iterations,
            seed: self.noise.seed(),
            duration,
        })
    }

    fn next_relax_phase(
        &self,
        step: usize,
        iteration: usize,
        max_change: f64,
    ) -> Result<Phase, SimulationError> {
        // NaN keeps relaxing until the cap
        if max_change <= self.limits.threshold {
            return Ok(Phase::Converged {
                step,
                iterations: iteration,
                max_change,
                converged: true,
            });
        }
        if iteration < self.limits.max_iterations {
            return Ok(Phase::Relax { step, iteration });
        }
        match self.limits.policy {
            NonConvergencePolicy::Fail => Err(SimulationError::NotConverged {
                step,
                iterations: iteration,
                max_change,
            }),
            NonConvergencePolicy::Warn => {
                if self.is_root() {
                    warn!(
                        "[relax] step {step} hit the cap of {iteration} iterations (max change {max_change:.3e}); continuing"
                    );
                }
                Ok(Phase::Converged {
                    step,
                    iterations: iteration,
                    max_change,
                    converged: false,
                })
            }
        }
    }

    fn write_frame(&self, snapshots: &mut SnapshotWriter, frame: usize) -> Result<(), OutputError> {
        let comm = self.engine.comm();
        let strain = &self.workspace.strain;
        let datasets: [(&str, &RealField); 8] = [
            ("eta0", &self.eta[0]),
            ("eta1", &self.eta[1]),
            ("eta2", &self.eta[2]),
            ("eps_xx", strain.get(0, 0)),
            ("eps_yy", strain.get(1, 1)),
            ("eps_xy", strain.get(0, 1)),
            ("ux", &self.workspace.ux),
            ("uy", &self.workspace.uy),
        ];
        for (group, field) in datasets {
            snapshots.write(comm, &frame_name(group, frame), field)?;
        }
        Ok(())
    }
}
