//! Primal-solution decoding into the published controller output.

use std::collections::BTreeMap;

use nalgebra::{DVector, Vector3};
use stilts_contacts::{ContactCorner, DiscreteGeometryContact, PlannedContact};

use crate::layout::DecisionLayout;
use crate::schedule::HorizonSchedule;

/// Result of one successful controller cycle.
///
/// Contacts are keyed by their configured name. Slots inactive at the
/// current knot report zero corner forces and `is_active = false`; the
/// zeros are exact, inactive knots carry no force variables at all.
#[derive(Clone, Debug, Default)]
pub struct CentroidalMpcOutput {
    /// Current-knot contact state and corner forces, per contact name.
    pub contacts: BTreeMap<String, DiscreteGeometryContact>,
    /// Solved pose and nominal timing of each upcoming adjustable contact.
    pub next_planned_contacts: BTreeMap<String, PlannedContact>,
    /// Decoded CoM positions over the horizon, world frame (m).
    pub com_trajectory: Vec<Vector3<f64>>,
}

fn vector_at(primal: &DVector<f64>, offset: usize) -> Vector3<f64> {
    Vector3::new(primal[offset], primal[offset + 1], primal[offset + 2])
}

/// Decode `primal` into the published output.
pub fn decode(
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
    primal: &DVector<f64>,
) -> CentroidalMpcOutput {
    let mut output = CentroidalMpcOutput::default();

    for (slot, timeline) in schedule.timelines.iter().enumerate() {
        // Knot-0 contact view. A segment covering the cycle start is always
        // committed, so its pose is the nominal plan.
        let corners = timeline
            .geometry
            .corners
            .iter()
            .enumerate()
            .map(|(corner, offset)| ContactCorner {
                position: *offset,
                force: layout
                    .force(0, slot, corner)
                    .map_or_else(Vector3::zeros, |index| vector_at(primal, index)),
            })
            .collect();
        output.contacts.insert(
            timeline.name.clone(),
            DiscreteGeometryContact {
                name: timeline.name.clone(),
                position: timeline.nominal_position[0],
                orientation: timeline.orientation[0],
                corners,
                is_active: timeline.active[0],
            },
        );

        // Earliest adjustable window becomes the next planned contact.
        let next = timeline.segments.iter().enumerate().find_map(|(index, s)| {
            let offset = layout.segment_position(slot, index)?;
            Some(PlannedContact {
                position: vector_at(primal, offset),
                ..s.nominal.clone()
            })
        });
        if let Some(contact) = next {
            output.next_planned_contacts.insert(timeline.name.clone(), contact);
        }
    }

    output.com_trajectory = layout
        .knots
        .iter()
        .map(|vars| vector_at(primal, vars.com))
        .collect();

    output
}
