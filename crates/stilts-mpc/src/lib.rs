//! Receding-horizon centroidal MPC for legged locomotion.
//!
//! Given a nominal footstep schedule and the measured centroidal state
//! (CoM position and velocity, angular momentum), the controller computes
//! feasible corner forces and mildly adjusted contact positions that track
//! reference centroidal trajectories. It sits between a footstep planner
//! (which produces the [`stilts_contacts::ContactPhaseList`]) and a
//! whole-body controller (which consumes the forces and adjusted poses).
//!
//! # Pipeline
//!
//! Each [`CentroidalMpc::advance`] call runs one cycle:
//!
//! 1. **Schedule** — sample the phase list over the horizon knots into
//!    per-slot activation flags, nominal poses, and adjustable segments
//! 2. **Layout** — allocate the decision vector; inactive (knot, slot)
//!    pairs own no force variables at all
//! 3. **Cost + Problem** — assemble the quadratic objective, the Euler
//!    dynamics equalities, and the friction/unilaterality/adjustment-box
//!    inequalities
//! 4. **Warm start** — seed the solve from the previous cycle or the
//!    nominal schedule
//! 5. **Solve** — hand the program to the [`NlpSolver`] backend; the stock
//!    backend is a Gauss-Newton SQP over Clarabel conic QPs
//! 6. **Decode** — publish contact forces, upcoming adjusted contacts, and
//!    the CoM trajectory as [`CentroidalMpcOutput`]

pub mod config;
pub mod controller;
pub mod cost;
pub mod error;
pub mod layout;
pub mod output;
pub mod problem;
pub mod schedule;
pub mod solver;
pub mod types;
pub mod warm_start;

pub use config::{ContactGeometry, ContactGeometryConfig, MpcConfig};
pub use controller::CentroidalMpc;
pub use error::{ConfigError, InputError, MpcError, ScheduleError, SolveFailure};
pub use layout::DecisionLayout;
pub use output::CentroidalMpcOutput;
pub use problem::CentroidalProblem;
pub use schedule::{ContactSegment, ContactTimeline, HorizonSchedule};
pub use solver::{NlpSolver, NonlinearProgram, Solution, SolverOptions, SqpSolver};
pub use types::{CentroidalState, ReferenceTrajectory, Wrench};
pub use warm_start::{WarmStartManager, WarmStartPolicy};
