//! Contact descriptions exchanged with planners and controllers.

use nalgebra::{UnitQuaternion, Vector3};

/// A contact planned by the footstep planner.
///
/// The activation window is half-open: the contact is active on
/// `[activation_time, deactivation_time)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedContact {
    /// Name of the contact (for example `"left_foot"`).
    pub name: String,
    /// Contact origin in world frame (m).
    pub position: Vector3<f64>,
    /// Contact orientation in world frame.
    pub orientation: UnitQuaternion<f64>,
    /// Time at which the contact becomes active (s).
    pub activation_time: f64,
    /// Time at which the contact deactivates (s).
    pub deactivation_time: f64,
}

impl PlannedContact {
    /// A flat contact (identity orientation) active on
    /// `[activation_time, deactivation_time)`.
    pub fn new(
        name: impl Into<String>,
        position: Vector3<f64>,
        activation_time: f64,
        deactivation_time: f64,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            orientation: UnitQuaternion::identity(),
            activation_time,
            deactivation_time,
        }
    }

    /// Replace the orientation.
    #[must_use]
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.orientation = orientation;
        self
    }

    /// True when `time` falls inside the activation window.
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.activation_time && time < self.deactivation_time
    }
}

/// One corner of a contact surface.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactCorner {
    /// Corner offset from the contact origin, in the contact frame (m).
    pub position: Vector3<f64>,
    /// Force applied at the corner, in world frame (N).
    pub force: Vector3<f64>,
}

/// A contact surface described by its corners, with per-corner forces.
///
/// This is the controller-facing view of a contact: the pose comes from the
/// plan, the corner forces from the optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteGeometryContact {
    /// Name of the contact.
    pub name: String,
    /// Contact origin in world frame (m).
    pub position: Vector3<f64>,
    /// Contact orientation in world frame.
    pub orientation: UnitQuaternion<f64>,
    /// Corner points and their assigned forces.
    pub corners: Vec<ContactCorner>,
    /// Whether the contact currently carries load.
    pub is_active: bool,
}

impl DiscreteGeometryContact {
    /// Net force over all corners, world frame (N).
    pub fn total_force(&self) -> Vector3<f64> {
        self.corners
            .iter()
            .fold(Vector3::zeros(), |sum, corner| sum + corner.force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_window_is_half_open() {
        let contact = PlannedContact::new("left_foot", Vector3::zeros(), 1.0, 2.0);

        assert!(!contact.is_active_at(0.999));
        assert!(contact.is_active_at(1.0));
        assert!(contact.is_active_at(1.999));
        assert!(!contact.is_active_at(2.0));
    }

    #[test]
    fn total_force_sums_corners() {
        let contact = DiscreteGeometryContact {
            name: "right_foot".into(),
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            corners: vec![
                ContactCorner {
                    position: Vector3::new(0.1, 0.05, 0.0),
                    force: Vector3::new(1.0, 0.0, 40.0),
                },
                ContactCorner {
                    position: Vector3::new(-0.1, 0.05, 0.0),
                    force: Vector3::new(-1.0, 2.0, 35.0),
                },
            ],
            is_active: true,
        };

        assert_eq!(contact.total_force(), Vector3::new(0.0, 2.0, 75.0));
    }
}
