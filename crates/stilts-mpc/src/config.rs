//! Controller configuration.
//!
//! Loaded from a TOML file or built directly. Required options are the
//! timing (`sampling_time`, `time_horizon`), the robot mass, the number of
//! contact slots, and one `[[contacts]]` geometry group per slot. Every
//! cost weight defaults to zero, which drops the corresponding term from
//! the objective.

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::solver::SolverOptions;

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

const fn default_gravity() -> f64 {
    9.81
}

const fn default_friction_coefficient() -> f64 {
    0.33
}

const fn default_friction_facets() -> usize {
    4
}

fn default_linear_solver() -> String {
    "qdldl".to_string()
}

const fn default_tolerance() -> f64 {
    1e-8
}

const fn default_max_iteration() -> u32 {
    3000
}

// ---------------------------------------------------------------------------
// Contact geometry
// ---------------------------------------------------------------------------

/// One `[[contacts]]` group: the geometry of a single contact slot.
///
/// Corner offsets are given as flat keys `corner_0 .. corner_{n-1}` inside
/// the group, so a four-corner foot reads:
///
/// ```toml
/// [[contacts]]
/// contact_name = "left_foot"
/// bounding_box_lower_limit = [-0.1, -0.05, 0.0]
/// bounding_box_upper_limit = [0.1, 0.05, 0.0]
/// number_of_corners = 4
/// corner_0 = [0.08, 0.03, 0.0]
/// corner_1 = [0.08, -0.03, 0.0]
/// corner_2 = [-0.08, -0.03, 0.0]
/// corner_3 = [-0.08, 0.03, 0.0]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGeometryConfig {
    /// Name matching the planner's contact name.
    pub contact_name: String,
    /// Lower corner of the adjustment box, contact frame (m).
    pub bounding_box_lower_limit: [f64; 3],
    /// Upper corner of the adjustment box, contact frame (m).
    pub bounding_box_upper_limit: [f64; 3],
    /// Number of corner points of the contact surface.
    pub number_of_corners: usize,
    /// Corner offsets collected from the `corner_i` keys of the group.
    #[serde(flatten)]
    pub corners: BTreeMap<String, [f64; 3]>,
}

impl ContactGeometryConfig {
    /// Corner offsets in index order, checked against `number_of_corners`.
    pub fn corner_offsets(&self) -> Result<Vec<Vector3<f64>>, ConfigError> {
        if self.number_of_corners == 0 {
            return Err(ConfigError::NoCorners {
                contact: self.contact_name.clone(),
            });
        }
        if self.corners.len() != self.number_of_corners {
            return Err(ConfigError::CornerCountMismatch {
                contact: self.contact_name.clone(),
                declared: self.number_of_corners,
                got: self.corners.len(),
            });
        }
        let mut offsets = Vec::with_capacity(self.number_of_corners);
        for index in 0..self.number_of_corners {
            let key = format!("corner_{index}");
            let corner = self
                .corners
                .get(&key)
                .ok_or_else(|| ConfigError::MissingCorner {
                    contact: self.contact_name.clone(),
                    index,
                })?;
            offsets.push(Vector3::new(corner[0], corner[1], corner[2]));
        }
        Ok(offsets)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.contact_name.is_empty() {
            return Err(ConfigError::EmptyContactName);
        }
        for axis in 0..3 {
            if self.bounding_box_lower_limit[axis] > self.bounding_box_upper_limit[axis] {
                return Err(ConfigError::InvalidBoundingBox {
                    contact: self.contact_name.clone(),
                    axis,
                });
            }
        }
        self.corner_offsets().map(|_| ())
    }

    /// Resolve into the runtime geometry form.
    pub fn resolve(&self) -> Result<ContactGeometry, ConfigError> {
        self.validate()?;
        Ok(ContactGeometry {
            name: self.contact_name.clone(),
            corners: self.corner_offsets()?,
            bounding_box_lower: Vector3::from(self.bounding_box_lower_limit),
            bounding_box_upper: Vector3::from(self.bounding_box_upper_limit),
        })
    }
}

/// Resolved per-slot contact geometry.
#[derive(Debug, Clone)]
pub struct ContactGeometry {
    /// Name matching the planner's contact name.
    pub name: String,
    /// Corner offsets from the contact origin, contact frame (m).
    pub corners: Vec<Vector3<f64>>,
    /// Lower corner of the adjustment box, contact frame (m).
    pub bounding_box_lower: Vector3<f64>,
    /// Upper corner of the adjustment box, contact frame (m).
    pub bounding_box_upper: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// Controller configuration
// ---------------------------------------------------------------------------

/// Controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Controller period (s).
    pub sampling_time: f64,
    /// Prediction horizon length (s).
    pub time_horizon: f64,
    /// Number of contact slots the controller optimizes over.
    pub number_of_maximum_contacts: usize,
    /// Robot mass (kg).
    pub mass: f64,
    /// Gravitational acceleration magnitude (m/s^2).
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Per-axis CoM tracking weight.
    #[serde(default)]
    pub com_weight: [f64; 3],
    /// Adjustable contact position regularization weight.
    #[serde(default)]
    pub contact_position_weight: f64,
    /// Per-axis corner force rate-of-change weight.
    #[serde(default)]
    pub force_rate_of_change_weight: [f64; 3],
    /// Angular momentum tracking weight.
    #[serde(default)]
    pub angular_momentum_weight: f64,
    /// Force symmetry weight between paired contact slots.
    #[serde(default)]
    pub contact_force_symmetry_weight: f64,

    /// Static friction coefficient of the corner force cones.
    #[serde(default = "default_friction_coefficient")]
    pub static_friction_coefficient: f64,
    /// Number of facets of the linearized friction cone.
    #[serde(default = "default_friction_facets")]
    pub number_of_friction_facets: usize,

    /// Linear system backend forwarded to the solver. The stock build
    /// provides "qdldl".
    #[serde(default = "default_linear_solver")]
    pub linear_solver: String,
    /// Solver convergence tolerance.
    #[serde(default = "default_tolerance")]
    pub ipopt_tolerance: f64,
    /// Solver iteration budget.
    #[serde(default = "default_max_iteration")]
    pub ipopt_max_iteration: u32,
    /// Solver verbosity (0 = silent).
    #[serde(default)]
    pub solver_verbosity: u8,
    /// Seed each cycle from the previous solution instead of the nominal
    /// schedule.
    #[serde(default)]
    pub is_warm_start_enabled: bool,
    /// Enable the solver backend's problem simplification pass.
    #[serde(default)]
    pub is_cse_enabled: bool,

    /// One geometry group per contact slot, in slot order.
    #[serde(default)]
    pub contacts: Vec<ContactGeometryConfig>,
}

impl MpcConfig {
    /// Number of horizon knots, `floor(time_horizon / sampling_time)`.
    pub fn knots(&self) -> usize {
        // The small bias absorbs representation noise in the quotient so a
        // horizon meant to be an exact multiple of the period is not
        // truncated by one knot.
        ((self.time_horizon / self.sampling_time) + 1e-9).floor() as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_time <= 0.0 {
            return Err(ConfigError::InvalidSamplingTime(self.sampling_time));
        }
        if self.knots() < 2 {
            return Err(ConfigError::HorizonTooShort {
                horizon: self.time_horizon,
                dt: self.sampling_time,
            });
        }
        if self.mass <= 0.0 {
            return Err(ConfigError::InvalidMass(self.mass));
        }
        if self.gravity <= 0.0 {
            return Err(ConfigError::InvalidGravity(self.gravity));
        }
        if self.static_friction_coefficient <= 0.0 {
            return Err(ConfigError::InvalidFrictionCoefficient(
                self.static_friction_coefficient,
            ));
        }
        if self.number_of_friction_facets < 3 {
            return Err(ConfigError::TooFewFrictionFacets(
                self.number_of_friction_facets,
            ));
        }
        if self.contacts.len() != self.number_of_maximum_contacts {
            return Err(ConfigError::ContactCountMismatch {
                expected: self.number_of_maximum_contacts,
                got: self.contacts.len(),
            });
        }
        for (index, contact) in self.contacts.iter().enumerate() {
            contact.validate()?;
            let duplicated = self.contacts[..index]
                .iter()
                .any(|other| other.contact_name == contact.contact_name);
            if duplicated {
                return Err(ConfigError::DuplicateContactName(
                    contact.contact_name.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// The geometry group named `name`, if configured.
    pub fn contact(&self, name: &str) -> Option<&ContactGeometryConfig> {
        self.contacts.iter().find(|c| c.contact_name == name)
    }

    /// Resolve every geometry group, in slot order.
    pub fn geometries(&self) -> Result<Vec<ContactGeometry>, ConfigError> {
        self.contacts.iter().map(ContactGeometryConfig::resolve).collect()
    }

    /// Solver pass-through options.
    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            tolerance: self.ipopt_tolerance,
            max_iterations: self.ipopt_max_iteration,
            verbose: self.solver_verbosity > 0,
            linear_solver: self.linear_solver.clone(),
            presolve: self.is_cse_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foot_geometry(name: &str) -> ContactGeometryConfig {
        let mut corners = BTreeMap::new();
        corners.insert("corner_0".to_string(), [0.08, 0.03, 0.0]);
        corners.insert("corner_1".to_string(), [0.08, -0.03, 0.0]);
        corners.insert("corner_2".to_string(), [-0.08, -0.03, 0.0]);
        corners.insert("corner_3".to_string(), [-0.08, 0.03, 0.0]);
        ContactGeometryConfig {
            contact_name: name.to_string(),
            bounding_box_lower_limit: [-0.1, -0.05, 0.0],
            bounding_box_upper_limit: [0.1, 0.05, 0.0],
            number_of_corners: 4,
            corners,
        }
    }

    fn valid_config() -> MpcConfig {
        MpcConfig {
            sampling_time: 0.1,
            time_horizon: 1.0,
            number_of_maximum_contacts: 2,
            mass: 30.0,
            gravity: default_gravity(),
            com_weight: [100.0, 100.0, 1000.0],
            contact_position_weight: 1e3,
            force_rate_of_change_weight: [10.0, 10.0, 10.0],
            angular_momentum_weight: 1e3,
            contact_force_symmetry_weight: 10.0,
            static_friction_coefficient: default_friction_coefficient(),
            number_of_friction_facets: default_friction_facets(),
            linear_solver: default_linear_solver(),
            ipopt_tolerance: default_tolerance(),
            ipopt_max_iteration: default_max_iteration(),
            solver_verbosity: 0,
            is_warm_start_enabled: false,
            is_cse_enabled: false,
            contacts: vec![foot_geometry("left_foot"), foot_geometry("right_foot")],
        }
    }

    // ---- Validation ----

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn knots_floor_the_quotient() {
        let mut config = valid_config();
        // 1.0 / 0.1 = 10 knots.
        assert_eq!(config.knots(), 10);

        // 0.95 / 0.1 -> 9 knots, the partial tail knot is dropped.
        config.time_horizon = 0.95;
        assert_eq!(config.knots(), 9);

        // 1.2 / 0.1 rounds below 12 in floating point; the bias keeps 12.
        config.time_horizon = 1.2;
        assert_eq!(config.knots(), 12);
    }

    #[test]
    fn rejects_nonpositive_sampling_time() {
        let mut config = valid_config();
        config.sampling_time = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSamplingTime(_))
        ));
    }

    #[test]
    fn rejects_single_knot_horizon() {
        let mut config = valid_config();
        config.time_horizon = 0.15;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HorizonTooShort { .. })
        ));
    }

    #[test]
    fn rejects_nonpositive_mass() {
        let mut config = valid_config();
        config.mass = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMass(_))));
    }

    #[test]
    fn rejects_contact_count_mismatch() {
        let mut config = valid_config();
        config.number_of_maximum_contacts = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ContactCountMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn rejects_duplicate_contact_names() {
        let mut config = valid_config();
        config.contacts[1].contact_name = "left_foot".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateContactName(_))
        ));
    }

    #[test]
    fn rejects_flipped_bounding_box() {
        let mut config = valid_config();
        config.contacts[0].bounding_box_lower_limit[1] = 0.2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBoundingBox { axis: 1, .. })
        ));
    }

    #[test]
    fn rejects_corner_count_mismatch() {
        let mut config = valid_config();
        config.contacts[0].number_of_corners = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CornerCountMismatch {
                declared: 3,
                got: 4,
                ..
            })
        ));
    }

    #[test]
    fn rejects_missing_corner_key() {
        let mut config = valid_config();
        let corners = &mut config.contacts[0].corners;
        let offset = corners.remove("corner_2").unwrap();
        corners.insert("corner_9".to_string(), offset);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCorner { index: 2, .. })
        ));
    }

    #[test]
    fn corner_offsets_keep_index_order() {
        let geometry = foot_geometry("left_foot");
        let offsets = geometry.corner_offsets().unwrap();
        assert_eq!(offsets[0], Vector3::new(0.08, 0.03, 0.0));
        assert_eq!(offsets[3], Vector3::new(-0.08, 0.03, 0.0));
    }

    // ---- TOML ----

    const TOML_FULL: &str = r#"
        sampling_time = 0.1
        time_horizon = 1.0
        number_of_maximum_contacts = 1
        mass = 30.0
        com_weight = [100.0, 100.0, 1000.0]
        force_rate_of_change_weight = [10.0, 10.0, 10.0]
        angular_momentum_weight = 1000.0
        ipopt_tolerance = 1e-6
        ipopt_max_iteration = 200
        is_warm_start_enabled = true

        [[contacts]]
        contact_name = "left_foot"
        bounding_box_lower_limit = [-0.1, -0.05, 0.0]
        bounding_box_upper_limit = [0.1, 0.05, 0.0]
        number_of_corners = 2
        corner_0 = [0.08, 0.0, 0.0]
        corner_1 = [-0.08, 0.0, 0.0]
    "#;

    #[test]
    fn deserializes_full_toml() {
        let config: MpcConfig = toml::from_str(TOML_FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.knots(), 10);
        assert_eq!(config.ipopt_max_iteration, 200);
        assert!(config.is_warm_start_enabled);

        let offsets = config.contacts[0].corner_offsets().unwrap();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[1], Vector3::new(-0.08, 0.0, 0.0));
    }

    #[test]
    fn defaults_fill_omitted_options() {
        let config: MpcConfig = toml::from_str(TOML_FULL).unwrap();

        assert_eq!(config.gravity, 9.81);
        assert_eq!(config.static_friction_coefficient, 0.33);
        assert_eq!(config.number_of_friction_facets, 4);
        assert_eq!(config.linear_solver, "qdldl");
        assert_eq!(config.solver_verbosity, 0);
        assert!(!config.is_cse_enabled);

        // Omitted weights default to zero and drop the term.
        assert_eq!(config.contact_position_weight, 0.0);
        assert_eq!(config.contact_force_symmetry_weight, 0.0);
    }

    #[test]
    fn solver_options_mirror_the_config() {
        let mut config = valid_config();
        config.solver_verbosity = 2;
        config.is_cse_enabled = true;

        let options = config.solver_options();
        assert_eq!(options.tolerance, config.ipopt_tolerance);
        assert_eq!(options.max_iterations, config.ipopt_max_iteration);
        assert!(options.verbose);
        assert!(options.presolve);
    }

    #[test]
    fn from_file_round_trip() {
        let dir = std::env::temp_dir().join("stilts_mpc_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("controller.toml");
        std::fs::write(&path, TOML_FULL).unwrap();

        let config = MpcConfig::from_file(&path).unwrap();
        assert_eq!(config.number_of_maximum_contacts, 1);
        assert_eq!(config.contacts[0].contact_name, "left_foot");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn from_file_missing_path_is_io_error() {
        let result = MpcConfig::from_file("/nonexistent/stilts.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
