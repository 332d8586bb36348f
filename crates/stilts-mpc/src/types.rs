//! State and reference types consumed by the controller cycle.

use nalgebra::Vector3;

use crate::error::InputError;

/// External wrench applied at the CoM, world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Wrench {
    /// Force (N).
    pub force: Vector3<f64>,
    /// Torque about the CoM (N m).
    pub torque: Vector3<f64>,
}

impl Wrench {
    pub fn new(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self { force, torque }
    }
}

/// Measured centroidal state for one controller cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CentroidalState {
    /// CoM position, world frame (m).
    pub com_position: Vector3<f64>,
    /// CoM velocity, world frame (m/s).
    pub com_velocity: Vector3<f64>,
    /// Angular momentum about the CoM, world frame (kg m^2/s).
    pub angular_momentum: Vector3<f64>,
    /// Measured external disturbance, zero unless set.
    pub external_wrench: Wrench,
}

impl CentroidalState {
    pub fn new(
        com_position: Vector3<f64>,
        com_velocity: Vector3<f64>,
        angular_momentum: Vector3<f64>,
    ) -> Self {
        Self {
            com_position,
            com_velocity,
            angular_momentum,
            external_wrench: Wrench::default(),
        }
    }

    #[must_use]
    pub fn with_external_wrench(mut self, wrench: Wrench) -> Self {
        self.external_wrench = wrench;
        self
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let finite = self.com_position.iter().all(|v| v.is_finite())
            && self.com_velocity.iter().all(|v| v.is_finite())
            && self.angular_momentum.iter().all(|v| v.is_finite())
            && self.external_wrench.force.iter().all(|v| v.is_finite())
            && self.external_wrench.torque.iter().all(|v| v.is_finite());
        if finite {
            Ok(())
        } else {
            Err(InputError::NonFiniteState)
        }
    }
}

/// CoM and angular momentum tracking targets sampled at the controller
/// period.
///
/// Lookups past the end hold the last sample, so a reference shorter than
/// the horizon is extended rather than rejected.
#[derive(Clone, Debug)]
pub struct ReferenceTrajectory {
    com: Vec<Vector3<f64>>,
    angular_momentum: Vec<Vector3<f64>>,
}

impl ReferenceTrajectory {
    /// Build from equally long CoM and angular momentum sequences.
    pub fn new(
        com: Vec<Vector3<f64>>,
        angular_momentum: Vec<Vector3<f64>>,
    ) -> Result<Self, InputError> {
        if com.is_empty() || angular_momentum.is_empty() {
            return Err(InputError::EmptyReference);
        }
        if com.len() != angular_momentum.len() {
            return Err(InputError::ReferenceLengthMismatch {
                com: com.len(),
                angular_momentum: angular_momentum.len(),
            });
        }
        Ok(Self {
            com,
            angular_momentum,
        })
    }

    /// Constant-setpoint reference of `samples` knots.
    pub fn constant(
        com: Vector3<f64>,
        angular_momentum: Vector3<f64>,
        samples: usize,
    ) -> Result<Self, InputError> {
        Self::new(vec![com; samples], vec![angular_momentum; samples])
    }

    /// CoM target at `knot`, holding the last sample past the end.
    pub fn com_at(&self, knot: usize) -> Vector3<f64> {
        self.com[knot.min(self.com.len() - 1)]
    }

    /// Angular momentum target at `knot`, holding the last sample past the
    /// end.
    pub fn angular_momentum_at(&self, knot: usize) -> Vector3<f64> {
        self.angular_momentum[knot.min(self.angular_momentum.len() - 1)]
    }

    pub fn len(&self) -> usize {
        self.com.len()
    }

    pub fn is_empty(&self) -> bool {
        self.com.is_empty()
    }
}
