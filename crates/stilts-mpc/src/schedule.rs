//! Horizon-sampled view of the nominal contact schedule.
//!
//! [`HorizonSchedule::build`] samples the planner's `ContactPhaseList` at
//! every horizon knot and resolves, per contact slot, the activation flags,
//! the nominal poses, and the contact segments whose positions the optimizer
//! may adjust. Knot sampling follows the half-open activation window: a knot
//! exactly at an activation boundary is active, one exactly at a
//! deactivation boundary is not.

use nalgebra::{UnitQuaternion, Vector3};
use stilts_contacts::{ContactPhaseList, PlannedContact};

use crate::config::ContactGeometry;
use crate::error::ScheduleError;

/// One activation window of a contact inside the horizon.
#[derive(Clone, Debug)]
pub struct ContactSegment {
    /// First knot covered by the window (clamped to the horizon).
    pub start_knot: usize,
    /// One past the last covered knot.
    pub end_knot: usize,
    /// The planned contact backing this segment.
    pub nominal: PlannedContact,
    /// Whether the segment position is a decision variable this cycle.
    ///
    /// Segments whose activation time is at or before the cycle start are
    /// already committed and stay pinned to their nominal pose.
    pub adjustable: bool,
}

/// Per-slot schedule over one horizon.
#[derive(Clone, Debug)]
pub struct ContactTimeline {
    /// Contact name, matching the configured geometry.
    pub name: String,
    /// Resolved corner offsets and adjustment box.
    pub geometry: ContactGeometry,
    /// Activation flag per knot.
    pub active: Vec<bool>,
    /// Nominal contact position per knot, from the nearest planned contact.
    pub nominal_position: Vec<Vector3<f64>>,
    /// Nominal contact orientation per knot.
    pub orientation: Vec<UnitQuaternion<f64>>,
    /// Activation windows intersecting the horizon, in time order.
    pub segments: Vec<ContactSegment>,
}

impl ContactTimeline {
    /// Index of the segment covering `knot`, if the slot is active there.
    pub fn segment_at(&self, knot: usize) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| knot >= s.start_knot && knot < s.end_knot)
    }
}

/// The schedule of every configured slot, sampled over one horizon.
#[derive(Clone, Debug)]
pub struct HorizonSchedule {
    /// Cycle start on the controller clock (s).
    pub start_time: f64,
    /// Knot spacing (s).
    pub dt: f64,
    /// Number of knots.
    pub knots: usize,
    /// One timeline per configured slot, in slot order.
    pub timelines: Vec<ContactTimeline>,
}

impl HorizonSchedule {
    /// Sample `phase_list` over `knots` knots starting at `start_time`.
    ///
    /// A configured slot missing from the phase list is valid and simply
    /// never active. The converse, a scheduled contact without configured
    /// geometry, is an error, as is any phase with more active contacts
    /// than there are slots.
    pub fn build(
        geometries: &[ContactGeometry],
        phase_list: &ContactPhaseList,
        start_time: f64,
        dt: f64,
        knots: usize,
    ) -> Result<Self, ScheduleError> {
        validate_phase_list(geometries, phase_list)?;

        let timelines = geometries
            .iter()
            .map(|geometry| build_timeline(geometry, phase_list, start_time, dt, knots))
            .collect();

        Ok(Self {
            start_time,
            dt,
            knots,
            timelines,
        })
    }
}

/// Check a phase list against the configured contact slots.
///
/// Shared by the schedule setter (early rejection) and `HorizonSchedule`
/// construction.
pub fn validate_phase_list(
    geometries: &[ContactGeometry],
    phase_list: &ContactPhaseList,
) -> Result<(), ScheduleError> {
    if phase_list.is_empty() {
        return Err(ScheduleError::EmptyPhaseList);
    }
    for phase in phase_list.phases() {
        if phase.active_contacts.len() > geometries.len() {
            return Err(ScheduleError::TooManyActiveContacts {
                time: phase.begin_time,
                active: phase.active_contacts.len(),
                maximum: geometries.len(),
            });
        }
    }
    for name in phase_list.lists().keys() {
        if !geometries.iter().any(|g| &g.name == name) {
            return Err(ScheduleError::UnknownContact(name.clone()));
        }
    }
    Ok(())
}

fn build_timeline(
    geometry: &ContactGeometry,
    phase_list: &ContactPhaseList,
    start_time: f64,
    dt: f64,
    knots: usize,
) -> ContactTimeline {
    let mut active = Vec::with_capacity(knots);
    let mut nominal_position = Vec::with_capacity(knots);
    let mut orientation = Vec::with_capacity(knots);
    // Index into the contact list of the window covering each knot.
    let mut covering: Vec<Option<usize>> = Vec::with_capacity(knots);

    let list = phase_list.list(&geometry.name);
    for knot in 0..knots {
        let time = start_time + knot as f64 * dt;
        let index = list.and_then(|l| l.iter().position(|c| c.is_active_at(time)));
        covering.push(index);
        active.push(index.is_some());
        match list.and_then(|l| l.nearest(time)) {
            Some(contact) => {
                nominal_position.push(contact.position);
                orientation.push(contact.orientation);
            }
            None => {
                nominal_position.push(Vector3::zeros());
                orientation.push(UnitQuaternion::identity());
            }
        }
    }

    // Group consecutive knots covered by the same planned contact. Grouping
    // by window identity rather than by the activation flag keeps two
    // windows separated by a gap shorter than dt from merging.
    let mut segments = Vec::new();
    let mut knot = 0;
    while knot < knots {
        let Some(index) = covering[knot] else {
            knot += 1;
            continue;
        };
        let start_knot = knot;
        while knot < knots && covering[knot] == Some(index) {
            knot += 1;
        }
        // The covering index only exists when the list does.
        if let Some(nominal) = list.and_then(|l| l.contacts().get(index)) {
            segments.push(ContactSegment {
                start_knot,
                end_knot: knot,
                nominal: nominal.clone(),
                adjustable: nominal.activation_time > start_time,
            });
        }
    }

    ContactTimeline {
        name: geometry.name.clone(),
        geometry: geometry.clone(),
        active,
        nominal_position,
        orientation,
        segments,
    }
}
