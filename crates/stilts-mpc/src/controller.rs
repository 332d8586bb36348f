//! The public controller facade.
//!
//! [`CentroidalMpc`] owns the whole cycle: the validated configuration, the
//! planner's phase list, the per-cycle state and reference, the warm-start
//! cache, and the solver backend. One [`advance`](CentroidalMpc::advance)
//! call samples the schedule, assembles the program, solves it, and decodes
//! the output.
//!
//! Call ordering is part of the contract: the phase list and reference must
//! be supplied before the first cycle and persist across cycles, while the
//! state is consumed by each cycle and must be re-supplied every time. The
//! controller clock advances one period per successful cycle only, so a
//! failed cycle can be retried at the same instant.

use nalgebra::Vector3;
use stilts_contacts::ContactPhaseList;
use tracing::{debug, warn};

use crate::config::{ContactGeometry, MpcConfig};
use crate::cost;
use crate::error::{ConfigError, InputError, MpcError, ScheduleError};
use crate::layout::DecisionLayout;
use crate::output::{self, CentroidalMpcOutput};
use crate::problem::CentroidalProblem;
use crate::schedule::{self, HorizonSchedule};
use crate::solver::{NlpSolver, SqpSolver};
use crate::types::{CentroidalState, ReferenceTrajectory};
use crate::warm_start::{WarmStartManager, WarmStartPolicy};

/// Receding-horizon centroidal controller.
pub struct CentroidalMpc {
    config: MpcConfig,
    geometries: Vec<ContactGeometry>,
    solver: Box<dyn NlpSolver>,
    warm_start: WarmStartManager,

    phase_list: Option<ContactPhaseList>,
    reference: Option<ReferenceTrajectory>,
    state: Option<CentroidalState>,

    time: f64,
    output: CentroidalMpcOutput,
    output_valid: bool,
}

impl CentroidalMpc {
    /// Validate `config` and build a controller around the stock SQP
    /// backend.
    pub fn new(config: MpcConfig) -> Result<Self, ConfigError> {
        let solver = Box::new(SqpSolver::new(config.solver_options()));
        Self::with_solver(config, solver)
    }

    /// Validate `config` and build a controller around a caller-supplied
    /// backend.
    pub fn with_solver(
        config: MpcConfig,
        solver: Box<dyn NlpSolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometries = config.geometries()?;
        let policy = if config.is_warm_start_enabled {
            WarmStartPolicy::FromPrevious
        } else {
            WarmStartPolicy::FromNominal
        };
        Ok(Self {
            config,
            geometries,
            solver,
            warm_start: WarmStartManager::new(policy),
            phase_list: None,
            reference: None,
            state: None,
            time: 0.0,
            output: CentroidalMpcOutput::default(),
            output_valid: false,
        })
    }

    /// Replace the nominal contact schedule.
    ///
    /// The list is checked against the configured contact slots up front so
    /// a bad plan fails here rather than mid-cycle.
    pub fn set_contact_phase_list(
        &mut self,
        phase_list: ContactPhaseList,
    ) -> Result<(), ScheduleError> {
        schedule::validate_phase_list(&self.geometries, &phase_list)?;
        self.phase_list = Some(phase_list);
        Ok(())
    }

    /// Supply the measured centroidal state for the next cycle.
    pub fn set_state(&mut self, state: CentroidalState) -> Result<(), InputError> {
        state.validate()?;
        self.state = Some(state);
        Ok(())
    }

    /// Supply the tracking targets. The reference persists across cycles; a
    /// reference shorter than the horizon holds its last sample.
    pub fn set_reference_trajectory(
        &mut self,
        com: Vec<Vector3<f64>>,
        angular_momentum: Vec<Vector3<f64>>,
    ) -> Result<(), InputError> {
        self.reference = Some(ReferenceTrajectory::new(com, angular_momentum)?);
        Ok(())
    }

    /// Run one assemble-solve-decode cycle.
    pub fn advance(&mut self) -> Result<(), MpcError> {
        let state = self.state.take().ok_or(InputError::MissingState)?;
        let phase_list = self
            .phase_list
            .as_ref()
            .ok_or(InputError::MissingPhaseList)?;
        let reference = self.reference.as_ref().ok_or(InputError::MissingReference)?;

        let schedule = HorizonSchedule::build(
            &self.geometries,
            phase_list,
            self.time,
            self.config.sampling_time,
            self.config.knots(),
        )?;
        let layout = DecisionLayout::new(&schedule);
        let objective = cost::assemble(&self.config, &schedule, &layout, reference);
        let problem =
            CentroidalProblem::assemble(&self.config, &schedule, &layout, &state, objective);
        let guess = self.warm_start.initial_guess(&schedule, &layout, &state);

        match self.solver.solve(&problem, &guess) {
            Ok(solution) => {
                debug!(
                    time = self.time,
                    iterations = solution.iterations,
                    objective = solution.objective,
                    variables = layout.num_variables,
                    "cycle solved"
                );
                self.output = output::decode(&schedule, &layout, &solution.primal);
                self.output_valid = true;
                self.warm_start.store(&schedule, &layout, solution.primal);
                self.time += self.config.sampling_time;
                Ok(())
            }
            Err(failure) => {
                warn!(time = self.time, %failure, "cycle failed");
                self.output_valid = false;
                Err(failure.into())
            }
        }
    }

    /// The last published output. Stale after a failed cycle; check
    /// [`is_output_valid`](Self::is_output_valid).
    pub fn output(&self) -> &CentroidalMpcOutput {
        &self.output
    }

    /// True while the output reflects the most recent cycle.
    pub const fn is_output_valid(&self) -> bool {
        self.output_valid
    }

    /// The controller clock (s). Starts at zero and advances one period per
    /// successful cycle.
    pub const fn current_time(&self) -> f64 {
        self.time
    }

    pub const fn config(&self) -> &MpcConfig {
        &self.config
    }
}
