//! Quadratic objective assembly.
//!
//! All cost terms are quadratic, so the objective is assembled once per
//! cycle as a dense Hessian and gradient pair `0.5 xᵀ P x + qᵀ x`:
//!
//! - CoM tracking: per-axis weighted distance to the reference CoM
//! - Angular momentum tracking: weighted distance to the reference
//! - Contact position regularization: adjustable positions near nominal
//! - Force rate of change: difference between consecutive knots, per corner
//! - Force symmetry: difference between corresponding corners of paired
//!   slots
//!
//! A zero weight drops its term entirely and leaves no Hessian entries
//! behind.

use nalgebra::{DMatrix, DVector};

use crate::config::MpcConfig;
use crate::layout::DecisionLayout;
use crate::schedule::HorizonSchedule;
use crate::types::ReferenceTrajectory;

/// Dense quadratic objective `0.5 xᵀ P x + qᵀ x`.
#[derive(Clone, Debug)]
pub struct QuadraticCost {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
}

/// Add `w * (x_i - r)^2` (up to scale) to the objective.
fn add_tracking(cost: &mut QuadraticCost, index: usize, weight: f64, target: f64) {
    cost.p[(index, index)] += weight;
    cost.q[index] -= weight * target;
}

/// Add `w * (x_j - x_i)^2` (up to scale) to the objective.
fn add_difference(cost: &mut QuadraticCost, i: usize, j: usize, weight: f64) {
    cost.p[(i, i)] += weight;
    cost.p[(j, j)] += weight;
    cost.p[(i, j)] -= weight;
    cost.p[(j, i)] -= weight;
}

/// Assemble the objective for one cycle.
pub fn assemble(
    config: &MpcConfig,
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
    reference: &ReferenceTrajectory,
) -> QuadraticCost {
    let n = layout.num_variables;
    let mut cost = QuadraticCost {
        p: DMatrix::zeros(n, n),
        q: DVector::zeros(n),
    };

    // Tracking terms, per knot.
    for (knot, vars) in layout.knots.iter().enumerate() {
        let com_ref = reference.com_at(knot);
        for axis in 0..3 {
            let weight = config.com_weight[axis];
            if weight != 0.0 {
                add_tracking(&mut cost, vars.com + axis, weight, com_ref[axis]);
            }
        }
        if config.angular_momentum_weight != 0.0 {
            let momentum_ref = reference.angular_momentum_at(knot);
            for axis in 0..3 {
                add_tracking(
                    &mut cost,
                    vars.angular_momentum + axis,
                    config.angular_momentum_weight,
                    momentum_ref[axis],
                );
            }
        }
    }

    // Adjustable contact positions stay near their nominal plan.
    if config.contact_position_weight != 0.0 {
        for var in &layout.segment_vars {
            let nominal = schedule.timelines[var.slot].segments[var.segment]
                .nominal
                .position;
            for axis in 0..3 {
                add_tracking(
                    &mut cost,
                    var.offset + axis,
                    config.contact_position_weight,
                    nominal[axis],
                );
            }
        }
    }

    // Force rate of change between consecutive knots. A knot where the slot
    // is inactive contributes zero force, so activation and deactivation
    // edges are penalized toward a tapered profile.
    if config.force_rate_of_change_weight.iter().any(|&w| w != 0.0) {
        for slot in 0..schedule.timelines.len() {
            for corner in 0..layout.corner_count(slot) {
                for knot in 0..layout.knots.len().saturating_sub(1) {
                    let current = layout.force(knot, slot, corner);
                    let next = layout.force(knot + 1, slot, corner);
                    for axis in 0..3 {
                        let weight = config.force_rate_of_change_weight[axis];
                        if weight == 0.0 {
                            continue;
                        }
                        match (current, next) {
                            (Some(i), Some(j)) => {
                                add_difference(&mut cost, i + axis, j + axis, weight);
                            }
                            (Some(i), None) => {
                                cost.p[(i + axis, i + axis)] += weight;
                            }
                            (None, Some(j)) => {
                                cost.p[(j + axis, j + axis)] += weight;
                            }
                            (None, None) => {}
                        }
                    }
                }
            }
        }
    }

    // Symmetry between paired slots (0, 1), (2, 3), ... at knots where both
    // are active. Slots with differing corner counts have no corner
    // correspondence and are skipped.
    if config.contact_force_symmetry_weight != 0.0 {
        let mut pair = 0;
        while pair + 1 < schedule.timelines.len() {
            let (left, right) = (pair, pair + 1);
            pair += 2;
            if layout.corner_count(left) != layout.corner_count(right) {
                continue;
            }
            for knot in 0..layout.knots.len() {
                for corner in 0..layout.corner_count(left) {
                    let (Some(i), Some(j)) = (
                        layout.force(knot, left, corner),
                        layout.force(knot, right, corner),
                    ) else {
                        continue;
                    };
                    for axis in 0..3 {
                        add_difference(
                            &mut cost,
                            i + axis,
                            j + axis,
                            config.contact_force_symmetry_weight,
                        );
                    }
                }
            }
        }
    }

    cost
}
