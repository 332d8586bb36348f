//! Decision-variable layout for one horizon.
//!
//! Variables are knot-major: each knot owns a CoM position block, a CoM
//! velocity block, an angular momentum block, and one 3-vector force per
//! corner of every slot active at that knot. Inactive slots own no force
//! variables at all, which enforces zero force structurally. The position
//! variables of adjustable contact segments trail the knot blocks.

use crate::schedule::HorizonSchedule;

/// Offsets of one knot's variable blocks.
#[derive(Clone, Debug)]
pub struct KnotVars {
    /// Offset of the CoM position block (3).
    pub com: usize,
    /// Offset of the CoM velocity block (3).
    pub com_velocity: usize,
    /// Offset of the angular momentum block (3).
    pub angular_momentum: usize,
    /// Per slot, the offset of the first corner force, `None` when the slot
    /// is inactive at this knot.
    pub forces: Vec<Option<usize>>,
}

/// Offset of one adjustable segment's position variable.
#[derive(Clone, Copy, Debug)]
pub struct SegmentVar {
    /// Slot index in the schedule.
    pub slot: usize,
    /// Segment index within the slot's timeline.
    pub segment: usize,
    /// Offset of the 3-vector position variable.
    pub offset: usize,
}

/// Flat decision-vector layout for one cycle.
#[derive(Clone, Debug)]
pub struct DecisionLayout {
    /// Per-knot variable blocks.
    pub knots: Vec<KnotVars>,
    /// Adjustable segment position variables, after all knot blocks.
    pub segment_vars: Vec<SegmentVar>,
    /// Total number of scalar decision variables.
    pub num_variables: usize,
    corner_counts: Vec<usize>,
}

impl DecisionLayout {
    /// Allocate variables for `schedule`.
    pub fn new(schedule: &HorizonSchedule) -> Self {
        let corner_counts: Vec<usize> = schedule
            .timelines
            .iter()
            .map(|t| t.geometry.corners.len())
            .collect();

        let mut offset = 0;
        let mut knots = Vec::with_capacity(schedule.knots);
        for knot in 0..schedule.knots {
            let com = offset;
            let com_velocity = offset + 3;
            let angular_momentum = offset + 6;
            offset += 9;

            let mut forces = Vec::with_capacity(schedule.timelines.len());
            for (slot, timeline) in schedule.timelines.iter().enumerate() {
                if timeline.active[knot] {
                    forces.push(Some(offset));
                    offset += 3 * corner_counts[slot];
                } else {
                    forces.push(None);
                }
            }
            knots.push(KnotVars {
                com,
                com_velocity,
                angular_momentum,
                forces,
            });
        }

        let mut segment_vars = Vec::new();
        for (slot, timeline) in schedule.timelines.iter().enumerate() {
            for (segment, s) in timeline.segments.iter().enumerate() {
                if s.adjustable {
                    segment_vars.push(SegmentVar {
                        slot,
                        segment,
                        offset,
                    });
                    offset += 3;
                }
            }
        }

        Self {
            knots,
            segment_vars,
            num_variables: offset,
            corner_counts,
        }
    }

    /// Offset of corner `corner` of `slot` at `knot`, if the slot is active
    /// there.
    pub fn force(&self, knot: usize, slot: usize, corner: usize) -> Option<usize> {
        self.knots[knot].forces[slot].map(|base| base + 3 * corner)
    }

    /// Offset of the position variable of `(slot, segment)`, if adjustable.
    pub fn segment_position(&self, slot: usize, segment: usize) -> Option<usize> {
        self.segment_vars
            .iter()
            .find(|v| v.slot == slot && v.segment == segment)
            .map(|v| v.offset)
    }

    /// Number of corners of `slot`.
    pub fn corner_count(&self, slot: usize) -> usize {
        self.corner_counts[slot]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nalgebra::Vector3;
    use stilts_contacts::{ContactList, ContactPhaseList, PlannedContact};

    use super::*;
    use crate::config::ContactGeometry;
    use crate::schedule::HorizonSchedule;

    fn geometry(name: &str, corners: usize) -> ContactGeometry {
        ContactGeometry {
            name: name.to_string(),
            corners: (0..corners)
                .map(|i| Vector3::new(0.02 * i as f64, 0.0, 0.0))
                .collect(),
            bounding_box_lower: Vector3::new(-0.1, -0.1, 0.0),
            bounding_box_upper: Vector3::new(0.1, 0.1, 0.0),
        }
    }

    fn schedule() -> HorizonSchedule {
        // Slot "a" (2 corners): active on knots 0..3, adjustable again on 4..6.
        // Slot "b" (1 corner): active on all 6 knots.
        let mut lists: BTreeMap<String, ContactList> = BTreeMap::new();
        let mut a = ContactList::new();
        a.add(PlannedContact::new("a", Vector3::zeros(), 0.0, 0.3))
            .unwrap();
        a.add(PlannedContact::new("a", Vector3::zeros(), 0.4, 0.6))
            .unwrap();
        lists.insert("a".into(), a);
        let mut b = ContactList::new();
        b.add(PlannedContact::new("b", Vector3::zeros(), 0.0, 0.6))
            .unwrap();
        lists.insert("b".into(), b);

        HorizonSchedule::build(
            &[geometry("a", 2), geometry("b", 1)],
            &ContactPhaseList::from_lists(lists),
            0.0,
            0.1,
            6,
        )
        .unwrap()
    }

    #[test]
    fn blocks_are_knot_major_and_contiguous() {
        let layout = DecisionLayout::new(&schedule());

        // Knot 0: 9 state vars, then 2 * 3 forces for "a", then 3 for "b".
        assert_eq!(layout.knots[0].com, 0);
        assert_eq!(layout.knots[0].com_velocity, 3);
        assert_eq!(layout.knots[0].angular_momentum, 6);
        assert_eq!(layout.knots[0].forces, vec![Some(9), Some(15)]);
        assert_eq!(layout.knots[1].com, 18);

        assert_eq!(layout.force(0, 0, 1), Some(12));
        assert_eq!(layout.force(0, 1, 0), Some(15));
    }

    #[test]
    fn inactive_slots_own_no_force_variables() {
        let layout = DecisionLayout::new(&schedule());

        // Knot 3 (t = 0.3) sits in the gap of slot "a".
        assert_eq!(layout.knots[3].forces[0], None);
        assert_eq!(layout.force(3, 0, 0), None);
        // Slot "b" stays active; its block directly follows the state vars.
        assert!(layout.knots[3].forces[1].is_some());
    }

    #[test]
    fn segment_variables_trail_the_knot_blocks() {
        let schedule = schedule();
        let layout = DecisionLayout::new(&schedule);

        // Only the second window of "a" (activation 0.4 > 0) is adjustable.
        assert_eq!(layout.segment_vars.len(), 1);
        let var = layout.segment_vars[0];
        assert_eq!(var.slot, 0);
        assert_eq!(var.segment, 1);
        assert_eq!(var.offset, layout.num_variables - 3);

        assert_eq!(layout.segment_position(0, 1), Some(var.offset));
        assert_eq!(layout.segment_position(0, 0), None);
        assert_eq!(layout.segment_position(1, 0), None);
    }

    #[test]
    fn variable_count_matches_the_activation_pattern() {
        let layout = DecisionLayout::new(&schedule());

        // 6 knots * 9 state vars = 54.
        // Slot "a": 2 corners * 3 axes * 5 active knots (0,1,2,4,5) = 30.
        // Slot "b": 1 corner * 3 axes * 6 knots = 18.
        // One adjustable segment position = 3.
        assert_eq!(layout.num_variables, 54 + 30 + 18 + 3);
    }
}
