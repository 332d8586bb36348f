//! Initial-guess construction across receding-horizon cycles.
//!
//! The layout changes whenever the activation pattern shifts through the
//! horizon, so the previous primal cannot be copied wholesale. Instead the
//! cached solution is resampled: state blocks are looked up by absolute knot
//! time, forces by (slot, corner), and segment positions by the activation
//! time of their planned contact. Knots past the cached horizon hold the
//! last cached state.

use nalgebra::DVector;

use crate::layout::DecisionLayout;
use crate::schedule::HorizonSchedule;
use crate::types::CentroidalState;

/// How the next cycle's initial guess is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarmStartPolicy {
    /// All-zero guess, the solver default.
    None,
    /// Previous solution shifted by the elapsed time, nominal fallback.
    FromPrevious,
    /// Measured state held constant, nominal positions, zero forces.
    FromNominal,
}

/// One stored cycle, kept alongside the layout it was solved under.
#[derive(Clone, Debug)]
struct PreviousCycle {
    primal: DVector<f64>,
    layout: DecisionLayout,
    schedule: HorizonSchedule,
}

/// Owns the previous cycle's solution and seeds the next one.
#[derive(Clone, Debug)]
pub struct WarmStartManager {
    policy: WarmStartPolicy,
    previous: Option<PreviousCycle>,
}

impl WarmStartManager {
    pub fn new(policy: WarmStartPolicy) -> Self {
        Self {
            policy,
            previous: None,
        }
    }

    pub const fn policy(&self) -> WarmStartPolicy {
        self.policy
    }

    /// Cache a solved cycle for the next guess.
    pub fn store(
        &mut self,
        schedule: &HorizonSchedule,
        layout: &DecisionLayout,
        primal: DVector<f64>,
    ) {
        self.previous = Some(PreviousCycle {
            primal,
            layout: layout.clone(),
            schedule: schedule.clone(),
        });
    }

    /// Drop any cached solution.
    pub fn clear(&mut self) {
        self.previous = None;
    }

    /// Build the initial guess for the cycle described by `schedule` and
    /// `layout`.
    pub fn initial_guess(
        &self,
        schedule: &HorizonSchedule,
        layout: &DecisionLayout,
        state: &CentroidalState,
    ) -> DVector<f64> {
        match self.policy {
            WarmStartPolicy::None => DVector::zeros(layout.num_variables),
            WarmStartPolicy::FromNominal => nominal_guess(schedule, layout, state),
            WarmStartPolicy::FromPrevious => match &self.previous {
                Some(previous) => shifted_guess(schedule, layout, state, previous),
                None => nominal_guess(schedule, layout, state),
            },
        }
    }
}

/// Measured state at every knot, zero forces, nominal segment positions.
fn nominal_guess(
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
    state: &CentroidalState,
) -> DVector<f64> {
    let mut guess = DVector::zeros(layout.num_variables);
    for vars in &layout.knots {
        for axis in 0..3 {
            guess[vars.com + axis] = state.com_position[axis];
            guess[vars.com_velocity + axis] = state.com_velocity[axis];
            guess[vars.angular_momentum + axis] = state.angular_momentum[axis];
        }
    }
    for var in &layout.segment_vars {
        let nominal = schedule.timelines[var.slot].segments[var.segment]
            .nominal
            .position;
        for axis in 0..3 {
            guess[var.offset + axis] = nominal[axis];
        }
    }
    guess
}

/// Previous solution resampled onto the new horizon.
fn shifted_guess(
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
    state: &CentroidalState,
    previous: &PreviousCycle,
) -> DVector<f64> {
    let mut guess = nominal_guess(schedule, layout, state);
    let prev = &previous.schedule;
    let slots = schedule.timelines.len().min(prev.timelines.len());

    for (knot, vars) in layout.knots.iter().enumerate() {
        let time = schedule.start_time + knot as f64 * schedule.dt;
        let shifted = (time - prev.start_time) / prev.dt;
        let index = shifted.round();
        // A knot time off the previous grid keeps its nominal seed.
        if (shifted - index).abs() > 1e-6 {
            continue;
        }
        let prev_knot = if index < 0.0 {
            continue;
        } else if (index as usize) < prev.knots {
            index as usize
        } else {
            // Tail extension: hold the last solved knot's state.
            let last = &previous.layout.knots[prev.knots - 1];
            for axis in 0..3 {
                guess[vars.com + axis] = previous.primal[last.com + axis];
                guess[vars.com_velocity + axis] = previous.primal[last.com_velocity + axis];
                guess[vars.angular_momentum + axis] =
                    previous.primal[last.angular_momentum + axis];
            }
            continue;
        };

        let prev_vars = &previous.layout.knots[prev_knot];
        for axis in 0..3 {
            guess[vars.com + axis] = previous.primal[prev_vars.com + axis];
            guess[vars.com_velocity + axis] = previous.primal[prev_vars.com_velocity + axis];
            guess[vars.angular_momentum + axis] =
                previous.primal[prev_vars.angular_momentum + axis];
        }
        for slot in 0..slots {
            for corner in 0..layout.corner_count(slot) {
                let (Some(dst), Some(src)) = (
                    layout.force(knot, slot, corner),
                    previous.layout.force(prev_knot, slot, corner),
                ) else {
                    continue;
                };
                for axis in 0..3 {
                    guess[dst + axis] = previous.primal[src + axis];
                }
            }
        }
    }

    // Segment positions survive by the activation time of their window.
    for var in &layout.segment_vars {
        if var.slot >= slots {
            continue;
        }
        let activation = schedule.timelines[var.slot].segments[var.segment]
            .nominal
            .activation_time;
        let matched = prev.timelines[var.slot]
            .segments
            .iter()
            .position(|s| (s.nominal.activation_time - activation).abs() < 1e-9)
            .and_then(|index| previous.layout.segment_position(var.slot, index));
        if let Some(src) = matched {
            for axis in 0..3 {
                guess[var.offset + axis] = previous.primal[src + axis];
            }
        }
    }

    guess
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nalgebra::Vector3;
    use stilts_contacts::{ContactList, ContactPhaseList, PlannedContact};

    use super::*;
    use crate::config::ContactGeometry;

    fn geometry(name: &str) -> ContactGeometry {
        ContactGeometry {
            name: name.to_string(),
            corners: vec![Vector3::new(0.05, 0.0, 0.0)],
            bounding_box_lower: Vector3::new(-0.1, -0.1, 0.0),
            bounding_box_upper: Vector3::new(0.1, 0.1, 0.0),
        }
    }

    /// One foot standing on [0, 0.5), stepping again on [0.7, 2.0).
    fn stepping_phase_list() -> ContactPhaseList {
        let mut list = ContactList::new();
        list.add(PlannedContact::new("foot", Vector3::zeros(), 0.0, 0.5))
            .unwrap();
        list.add(PlannedContact::new(
            "foot",
            Vector3::new(0.2, 0.0, 0.0),
            0.7,
            2.0,
        ))
        .unwrap();
        let mut lists = BTreeMap::new();
        lists.insert("foot".to_string(), list);
        ContactPhaseList::from_lists(lists)
    }

    fn schedule_at(start: f64) -> (HorizonSchedule, DecisionLayout) {
        let schedule = HorizonSchedule::build(
            &[geometry("foot")],
            &stepping_phase_list(),
            start,
            0.1,
            10,
        )
        .unwrap();
        let layout = DecisionLayout::new(&schedule);
        (schedule, layout)
    }

    fn measured() -> CentroidalState {
        CentroidalState::new(
            Vector3::new(0.1, -0.02, 0.5),
            Vector3::new(0.3, 0.0, 0.0),
            Vector3::new(0.0, 0.01, 0.0),
        )
    }

    #[test]
    fn none_policy_yields_zeros() {
        let (schedule, layout) = schedule_at(0.0);
        let manager = WarmStartManager::new(WarmStartPolicy::None);

        let guess = manager.initial_guess(&schedule, &layout, &measured());
        assert_eq!(guess.amax(), 0.0);
        assert_eq!(guess.len(), layout.num_variables);
    }

    #[test]
    fn nominal_guess_holds_the_measured_state() {
        let (schedule, layout) = schedule_at(0.0);
        let manager = WarmStartManager::new(WarmStartPolicy::FromNominal);
        let state = measured();

        let guess = manager.initial_guess(&schedule, &layout, &state);
        for vars in &layout.knots {
            assert_eq!(guess[vars.com], state.com_position.x);
            assert_eq!(guess[vars.com_velocity], state.com_velocity.x);
            assert_eq!(guess[vars.angular_momentum + 1], state.angular_momentum.y);
        }
        // Forces start at zero.
        let force = layout.force(0, 0, 0).unwrap();
        assert_eq!(guess[force + 2], 0.0);
    }

    #[test]
    fn nominal_guess_seeds_adjustable_positions() {
        let (schedule, layout) = schedule_at(0.2);
        let manager = WarmStartManager::new(WarmStartPolicy::FromNominal);

        let guess = manager.initial_guess(&schedule, &layout, &measured());
        let var = layout.segment_vars[0];
        assert_eq!(guess[var.offset], 0.2);
        assert_eq!(guess[var.offset + 1], 0.0);
    }

    #[test]
    fn from_previous_without_history_falls_back_to_nominal() {
        let (schedule, layout) = schedule_at(0.0);
        let previous = WarmStartManager::new(WarmStartPolicy::FromPrevious);
        let nominal = WarmStartManager::new(WarmStartPolicy::FromNominal);
        let state = measured();

        assert_eq!(
            previous.initial_guess(&schedule, &layout, &state),
            nominal.initial_guess(&schedule, &layout, &state)
        );
    }

    #[test]
    fn shifted_guess_aligns_knots_by_absolute_time() {
        let (old_schedule, old_layout) = schedule_at(0.0);
        let mut manager = WarmStartManager::new(WarmStartPolicy::FromPrevious);

        // Mark every stored scalar with its flat index.
        let primal = DVector::from_fn(old_layout.num_variables, |i, _| i as f64);
        manager.store(&old_schedule, &old_layout, primal);

        let (schedule, layout) = schedule_at(0.1);
        let guess = manager.initial_guess(&schedule, &layout, &measured());

        // New knot 0 (t = 0.1) maps onto old knot 1, and so on.
        for knot in 0..layout.knots.len() - 1 {
            let old_vars = &old_layout.knots[knot + 1];
            assert_eq!(guess[layout.knots[knot].com], old_vars.com as f64);
            assert_eq!(
                guess[layout.knots[knot].com_velocity + 2],
                (old_vars.com_velocity + 2) as f64
            );
        }
        // Forces follow the same shift where both knots are active.
        if let (Some(dst), Some(src)) = (layout.force(0, 0, 0), old_layout.force(1, 0, 0)) {
            assert_eq!(guess[dst], src as f64);
        }
    }

    #[test]
    fn shifted_guess_extends_the_tail_with_the_last_state() {
        let (old_schedule, old_layout) = schedule_at(0.0);
        let mut manager = WarmStartManager::new(WarmStartPolicy::FromPrevious);
        let primal = DVector::from_fn(old_layout.num_variables, |i, _| i as f64);
        manager.store(&old_schedule, &old_layout, primal);

        let (schedule, layout) = schedule_at(0.1);
        let guess = manager.initial_guess(&schedule, &layout, &measured());

        // The new last knot (t = 1.0) lies past the old horizon (last knot
        // at t = 0.9) and copies the old last knot's state.
        let tail = &layout.knots[layout.knots.len() - 1];
        let old_last = &old_layout.knots[old_layout.knots.len() - 1];
        assert_eq!(guess[tail.com], old_last.com as f64);
        assert_eq!(
            guess[tail.angular_momentum],
            old_last.angular_momentum as f64
        );
    }

    #[test]
    fn segment_positions_survive_by_activation_time() {
        let (old_schedule, old_layout) = schedule_at(0.0);
        let mut manager = WarmStartManager::new(WarmStartPolicy::FromPrevious);

        let mut primal = DVector::zeros(old_layout.num_variables);
        let old_var = old_layout.segment_vars[0];
        primal[old_var.offset] = 0.27;
        primal[old_var.offset + 1] = -0.04;
        manager.store(&old_schedule, &old_layout, primal);

        // One period later the same touchdown (activation 0.7) is still
        // adjustable; its guess keeps the previously solved position.
        let (schedule, layout) = schedule_at(0.1);
        let guess = manager.initial_guess(&schedule, &layout, &measured());
        let var = layout.segment_vars[0];
        assert_eq!(guess[var.offset], 0.27);
        assert_eq!(guess[var.offset + 1], -0.04);
    }

    #[test]
    fn clear_drops_the_cache() {
        let (schedule, layout) = schedule_at(0.0);
        let mut manager = WarmStartManager::new(WarmStartPolicy::FromPrevious);
        manager.store(&schedule, &layout, DVector::zeros(layout.num_variables));
        manager.clear();

        let nominal = WarmStartManager::new(WarmStartPolicy::FromNominal);
        let state = measured();
        assert_eq!(
            manager.initial_guess(&schedule, &layout, &state),
            nominal.initial_guess(&schedule, &layout, &state)
        );
    }
}
