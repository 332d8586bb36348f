//! Per-cycle nonlinear program assembly.
//!
//! The centroidal dynamics are discretized with forward Euler over the
//! horizon knots:
//!
//! ```text
//! com_{k+1}  = com_k  + dt * dcom_k
//! dcom_{k+1} = dcom_k + dt * (sum_j f_j / m + g + f_ext / m)
//! L_{k+1}    = L_k    + dt * (sum_j (p_c + R_c c_j - com_k) x f_j + tau_ext)
//! ```
//!
//! The knot-0 state is pinned to the measurement by an extra equality
//! block. Everything is linear except the angular momentum rows, where the
//! contact position and the CoM multiply the corner forces. Those bilinear
//! products are kept as explicit cross terms so the residual and Jacobian
//! can be evaluated exactly at any iterate.
//!
//! Feasibility constraints are all linear:
//!
//! - unilaterality: nonnegative normal force per corner
//! - friction: a facet pyramid around the contact normal per corner
//! - adjustment box: each adjustable position stays inside its
//!   contact-frame bounding box around the nominal pose

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::config::MpcConfig;
use crate::cost::QuadraticCost;
use crate::layout::DecisionLayout;
use crate::schedule::HorizonSchedule;
use crate::solver::NonlinearProgram;
use crate::types::CentroidalState;

/// Skew-symmetric matrix such that `skew(a) * b = a x b`.
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Outward facet directions of the linearized friction cone, contact frame.
///
/// Facet `i` constrains `f . d_i <= 0` with
/// `d_i = (cos th_i, sin th_i, -mu)`, which bounds the tangential force
/// along `th_i` by `mu` times the normal force.
fn friction_facets(mu: f64, count: usize) -> Vec<Vector3<f64>> {
    (0..count)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * i as f64 / count as f64;
            Vector3::new(theta.cos(), theta.sin(), -mu)
        })
        .collect()
}

/// `scale * (x[left..+3] x x[right..+3])` added to equality rows
/// `row..row+3`.
#[derive(Clone, Copy, Debug)]
struct CrossTerm {
    row: usize,
    left: usize,
    right: usize,
    scale: f64,
}

/// Assembled nonlinear program for one cycle.
///
/// Equalities are stored as a linear part `A_eq x - b_eq` plus the bilinear
/// cross terms; inequalities as `A_in x <= b_in`.
pub struct CentroidalProblem {
    objective: QuadraticCost,
    a_eq: DMatrix<f64>,
    b_eq: DVector<f64>,
    cross_terms: Vec<CrossTerm>,
    a_in: DMatrix<f64>,
    b_in: DVector<f64>,
    num_variables: usize,
}

impl CentroidalProblem {
    /// Assemble dynamics, feasibility constraints, and the objective.
    pub fn assemble(
        config: &MpcConfig,
        schedule: &HorizonSchedule,
        layout: &DecisionLayout,
        state: &CentroidalState,
        objective: QuadraticCost,
    ) -> Self {
        let n = layout.num_variables;
        let (a_eq, b_eq, cross_terms) = build_equalities(config, schedule, layout, state);
        let (a_in, b_in) = build_inequalities(config, schedule, layout);
        Self {
            objective,
            a_eq,
            b_eq,
            cross_terms,
            a_in,
            b_in,
            num_variables: n,
        }
    }

    /// Number of equality rows.
    pub fn num_equalities(&self) -> usize {
        self.a_eq.nrows()
    }

    /// Number of inequality rows.
    pub fn num_inequalities(&self) -> usize {
        self.a_in.nrows()
    }
}

impl NonlinearProgram for CentroidalProblem {
    fn num_variables(&self) -> usize {
        self.num_variables
    }

    fn objective(&self) -> &QuadraticCost {
        &self.objective
    }

    fn eval_equalities(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut residual = &self.a_eq * x - &self.b_eq;
        for term in &self.cross_terms {
            let u: Vector3<f64> = x.fixed_rows::<3>(term.left).into();
            let f: Vector3<f64> = x.fixed_rows::<3>(term.right).into();
            let cross = u.cross(&f) * term.scale;
            for axis in 0..3 {
                residual[term.row + axis] += cross[axis];
            }
        }
        residual
    }

    fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jacobian = self.a_eq.clone();
        for term in &self.cross_terms {
            let u: Vector3<f64> = x.fixed_rows::<3>(term.left).into();
            let f: Vector3<f64> = x.fixed_rows::<3>(term.right).into();
            // d(u x f)/du = -skew(f), d(u x f)/df = skew(u).
            let wrt_left = skew(&f) * (-term.scale);
            let wrt_right = skew(&u) * term.scale;
            for r in 0..3 {
                for c in 0..3 {
                    jacobian[(term.row + r, term.left + c)] += wrt_left[(r, c)];
                    jacobian[(term.row + r, term.right + c)] += wrt_right[(r, c)];
                }
            }
        }
        jacobian
    }

    fn inequalities(&self) -> (&DMatrix<f64>, &DVector<f64>) {
        (&self.a_in, &self.b_in)
    }
}

fn build_equalities(
    config: &MpcConfig,
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
    state: &CentroidalState,
) -> (DMatrix<f64>, DVector<f64>, Vec<CrossTerm>) {
    let n = layout.num_variables;
    let knots = layout.knots.len();
    let dt = schedule.dt;
    let inv_mass = 1.0 / config.mass;
    let gravity = Vector3::new(0.0, 0.0, -config.gravity);
    let external_accel = state.external_wrench.force * inv_mass;
    let external_torque = state.external_wrench.torque;

    // 9 rows pin the initial state, 9 per link between consecutive knots.
    let num_rows = 9 * knots;
    let mut a_eq = DMatrix::zeros(num_rows, n);
    let mut b_eq = DVector::zeros(num_rows);
    let mut cross_terms = Vec::new();

    let first = &layout.knots[0];
    for axis in 0..3 {
        a_eq[(axis, first.com + axis)] = 1.0;
        b_eq[axis] = state.com_position[axis];
        a_eq[(3 + axis, first.com_velocity + axis)] = 1.0;
        b_eq[3 + axis] = state.com_velocity[axis];
        a_eq[(6 + axis, first.angular_momentum + axis)] = 1.0;
        b_eq[6 + axis] = state.angular_momentum[axis];
    }

    let mut row = 9;
    for knot in 0..knots - 1 {
        let current = &layout.knots[knot];
        let next = &layout.knots[knot + 1];

        // com_{k+1} - com_k - dt * dcom_k = 0
        for axis in 0..3 {
            a_eq[(row + axis, next.com + axis)] = 1.0;
            a_eq[(row + axis, current.com + axis)] = -1.0;
            a_eq[(row + axis, current.com_velocity + axis)] = -dt;
        }
        row += 3;

        // dcom_{k+1} - dcom_k - dt * (sum_j f_j / m + g + f_ext / m) = 0
        for axis in 0..3 {
            a_eq[(row + axis, next.com_velocity + axis)] = 1.0;
            a_eq[(row + axis, current.com_velocity + axis)] = -1.0;
            b_eq[row + axis] = dt * (gravity[axis] + external_accel[axis]);
        }
        for (slot, timeline) in schedule.timelines.iter().enumerate() {
            if current.forces[slot].is_none() {
                continue;
            }
            for corner in 0..timeline.geometry.corners.len() {
                if let Some(offset) = layout.force(knot, slot, corner) {
                    for axis in 0..3 {
                        a_eq[(row + axis, offset + axis)] = -dt * inv_mass;
                    }
                }
            }
        }
        row += 3;

        // L_{k+1} - L_k - dt * (sum_j (p + R c_j - com_k) x f_j + tau) = 0
        //
        // The constant lever part (pinned position plus rotated corner)
        // lands in the linear coefficients; the com and any adjustable
        // position multiply the force and become cross terms.
        for axis in 0..3 {
            a_eq[(row + axis, next.angular_momentum + axis)] = 1.0;
            a_eq[(row + axis, current.angular_momentum + axis)] = -1.0;
            b_eq[row + axis] = dt * external_torque[axis];
        }
        for (slot, timeline) in schedule.timelines.iter().enumerate() {
            let Some(segment_index) = timeline.segment_at(knot) else {
                continue;
            };
            let segment = &timeline.segments[segment_index];
            let rotation = segment.nominal.orientation;
            let position_var = layout.segment_position(slot, segment_index);

            for (corner, corner_offset) in timeline.geometry.corners.iter().enumerate() {
                let Some(force) = layout.force(knot, slot, corner) else {
                    continue;
                };
                let world_corner = rotation * corner_offset;
                let constant_lever = match position_var {
                    Some(_) => world_corner,
                    None => segment.nominal.position + world_corner,
                };
                let linear = skew(&constant_lever) * (-dt);
                for r in 0..3 {
                    for c in 0..3 {
                        a_eq[(row + r, force + c)] += linear[(r, c)];
                    }
                }
                // -dt * ((p_var - com_k) x f): the com enters with opposite
                // sign to the position variable.
                cross_terms.push(CrossTerm {
                    row,
                    left: current.com,
                    right: force,
                    scale: dt,
                });
                if let Some(position) = position_var {
                    cross_terms.push(CrossTerm {
                        row,
                        left: position,
                        right: force,
                        scale: -dt,
                    });
                }
            }
        }
        row += 3;
    }
    assert_eq!(row, num_rows, "equality row count mismatch");

    (a_eq, b_eq, cross_terms)
}

fn build_inequalities(
    config: &MpcConfig,
    schedule: &HorizonSchedule,
    layout: &DecisionLayout,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = layout.num_variables;
    let facets = friction_facets(
        config.static_friction_coefficient,
        config.number_of_friction_facets,
    );

    // One unilaterality row plus one row per facet for every active corner,
    // and six box rows per adjustable position.
    let active_corners: usize = layout
        .knots
        .iter()
        .map(|vars| {
            vars.forces
                .iter()
                .enumerate()
                .filter(|(_, offset)| offset.is_some())
                .map(|(slot, _)| layout.corner_count(slot))
                .sum::<usize>()
        })
        .sum();
    let num_rows = active_corners * (1 + facets.len()) + 6 * layout.segment_vars.len();

    let mut a_in = DMatrix::zeros(num_rows, n);
    let mut b_in = DVector::zeros(num_rows);
    let mut row = 0;

    for (knot, vars) in layout.knots.iter().enumerate() {
        for (slot, timeline) in schedule.timelines.iter().enumerate() {
            if vars.forces[slot].is_none() {
                continue;
            }
            let rotation = timeline.orientation[knot];
            let normal = rotation * Vector3::z();
            for corner in 0..layout.corner_count(slot) {
                let Some(force) = layout.force(knot, slot, corner) else {
                    continue;
                };
                // Unilaterality: -(R e_z) . f <= 0.
                for axis in 0..3 {
                    a_in[(row, force + axis)] = -normal[axis];
                }
                row += 1;
                // Friction pyramid: (R d_i) . f <= 0.
                for facet in &facets {
                    let world = rotation * facet;
                    for axis in 0..3 {
                        a_in[(row, force + axis)] = world[axis];
                    }
                    row += 1;
                }
            }
        }
    }

    for var in &layout.segment_vars {
        let timeline = &schedule.timelines[var.slot];
        let segment = &timeline.segments[var.segment];
        let rotation = segment.nominal.orientation.to_rotation_matrix();
        let into_local: Matrix3<f64> = rotation.matrix().transpose();
        let local_nominal = into_local * segment.nominal.position;
        let geometry = &timeline.geometry;

        // lower <= R^T (p - p_nom) <= upper, one row per bound and axis.
        for axis in 0..3 {
            for c in 0..3 {
                a_in[(row, var.offset + c)] = into_local[(axis, c)];
            }
            b_in[row] = geometry.bounding_box_upper[axis] + local_nominal[axis];
            row += 1;

            for c in 0..3 {
                a_in[(row, var.offset + c)] = -into_local[(axis, c)];
            }
            b_in[row] = -(geometry.bounding_box_lower[axis] + local_nominal[axis]);
            row += 1;
        }
    }
    assert_eq!(row, num_rows, "inequality row count mismatch");

    (a_in, b_in)
}
