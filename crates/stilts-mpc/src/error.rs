//! Error types for the controller.

use thiserror::Error;

/// Top-level error type for stilts-mpc.
#[derive(Debug, Error)]
pub enum MpcError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Solve failure: {0}")]
    Solve(#[from] SolveFailure),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid sampling_time: {0} (must be > 0)")]
    InvalidSamplingTime(f64),

    #[error("time_horizon {horizon} covers fewer than two knots of sampling_time {dt}")]
    HorizonTooShort { horizon: f64, dt: f64 },

    #[error("Invalid mass: {0} (must be > 0)")]
    InvalidMass(f64),

    #[error("Invalid gravity: {0} (must be > 0)")]
    InvalidGravity(f64),

    #[error("Invalid static_friction_coefficient: {0} (must be > 0)")]
    InvalidFrictionCoefficient(f64),

    #[error("number_of_friction_facets must be at least 3, got {0}")]
    TooFewFrictionFacets(usize),

    #[error("Expected {expected} [[contacts]] groups, got {got}")]
    ContactCountMismatch { expected: usize, got: usize },

    #[error("Contact name must not be empty")]
    EmptyContactName,

    #[error("Duplicate contact name '{0}'")]
    DuplicateContactName(String),

    #[error("Contact '{contact}': number_of_corners must be at least 1")]
    NoCorners { contact: String },

    #[error("Contact '{contact}': number_of_corners is {declared} but {got} corner keys were supplied")]
    CornerCountMismatch {
        contact: String,
        declared: usize,
        got: usize,
    },

    #[error("Contact '{contact}': missing corner_{index}")]
    MissingCorner { contact: String, index: usize },

    #[error("Contact '{contact}': bounding box lower limit exceeds upper limit on axis {axis}")]
    InvalidBoundingBox { contact: String, axis: usize },
}

/// Contact schedule errors.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Contact phase list is empty")]
    EmptyPhaseList,

    #[error("{active} contacts active at {time} s exceed the configured maximum of {maximum}")]
    TooManyActiveContacts {
        time: f64,
        active: usize,
        maximum: usize,
    },

    #[error("Contact '{0}' appears in the schedule but has no configured geometry")]
    UnknownContact(String),
}

/// Per-cycle input errors.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("State contains a non-finite value")]
    NonFiniteState,

    #[error("Reference trajectory is empty")]
    EmptyReference,

    #[error("Reference length mismatch: {com} CoM samples vs {angular_momentum} angular momentum samples")]
    ReferenceLengthMismatch { com: usize, angular_momentum: usize },

    #[error("No state supplied since the last cycle")]
    MissingState,

    #[error("No reference trajectory supplied")]
    MissingReference,

    #[error("No contact phase list supplied")]
    MissingPhaseList,
}

/// Solver failure classification.
///
/// Copy + static messages for cheap propagation out of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SolveFailure {
    #[error("Problem is infeasible")]
    Infeasible,

    #[error("Iteration limit exceeded")]
    IterationLimitExceeded,

    #[error("Numerical failure in the solver")]
    NumericalFailure,
}
