//! Solver port and the shipped SQP backend.
//!
//! The assembled problem has a quadratic objective, linear inequalities,
//! and equalities that are bilinear at worst. [`SqpSolver`] exploits that
//! shape with a Gauss-Newton sequential quadratic program: at each iterate
//! the equalities are linearized and the resulting convex QP over the step
//! `d` is handed to Clarabel,
//!
//! ```text
//! minimize   0.5 dᵀ P d + (P x + q)ᵀ d
//! subject to J(x) d = -c(x)
//!            A_in (x + d) <= b_in
//! ```
//!
//! The step is damped by a backtracking line search on the l1 merit
//! function `f(x) + nu * ||c(x)||_1` (full Gauss-Newton steps overshoot
//! the bilinear terms and oscillate), with the penalty kept above the
//! equality multipliers returned by the QP. The loop stops once the
//! equality residual and the step both stall below the configured
//! tolerance. Alternative backends implement [`NlpSolver`].

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::cost::QuadraticCost;
use crate::error::SolveFailure;

/// Solver-agnostic view of one assembled cycle.
pub trait NonlinearProgram {
    /// Number of scalar decision variables.
    fn num_variables(&self) -> usize;

    /// Quadratic objective data.
    fn objective(&self) -> &QuadraticCost;

    /// Equality residuals `c(x)`, zero at feasibility.
    fn eval_equalities(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Equality Jacobian at `x`.
    fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Linear inequalities `A x <= b`.
    fn inequalities(&self) -> (&DMatrix<f64>, &DVector<f64>);
}

/// Options forwarded from the configuration to the backend.
#[derive(Clone, Debug)]
pub struct SolverOptions {
    /// Convergence tolerance on the equality residual and the step.
    pub tolerance: f64,
    /// Outer iteration budget.
    pub max_iterations: u32,
    /// Print backend progress.
    pub verbose: bool,
    /// Linear system backend. The stock build provides "qdldl".
    pub linear_solver: String,
    /// Enable the backend's problem simplification pass.
    pub presolve: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 3000,
            verbose: false,
            linear_solver: "qdldl".to_string(),
            presolve: false,
        }
    }
}

/// Primal solution of one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Decision vector at the accepted iterate.
    pub primal: DVector<f64>,
    /// Outer iterations spent.
    pub iterations: u32,
    /// Objective value at the accepted iterate.
    pub objective: f64,
}

/// Backend interface driven by the controller.
pub trait NlpSolver {
    fn solve(
        &mut self,
        problem: &dyn NonlinearProgram,
        guess: &DVector<f64>,
    ) -> Result<Solution, SolveFailure>;
}

/// Iteration cap of one inner QP, independent of the outer budget.
const QP_MAX_ITER: u32 = 200;

/// Step-halving budget of the merit line search.
const MAX_BACKTRACKS: u32 = 12;

/// `sum |v_i|`.
fn l1_norm(v: &DVector<f64>) -> f64 {
    v.iter().map(|v| v.abs()).sum()
}

/// `0.5 xᵀ P x + qᵀ x`.
fn objective_value(cost: &QuadraticCost, x: &DVector<f64>) -> f64 {
    0.5 * x.dot(&(&cost.p * x)) + cost.q.dot(x)
}

/// Gauss-Newton SQP over Clarabel conic QPs.
#[derive(Clone, Debug)]
pub struct SqpSolver {
    options: SolverOptions,
}

impl SqpSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Solve one QP subproblem for the step `d`.
    ///
    /// Returns the step and the infinity norm of the equality multipliers,
    /// which the outer loop uses to keep the merit penalty exact.
    fn solve_step(
        &self,
        p_upper: &CscMatrix<f64>,
        gradient: &DVector<f64>,
        jacobian: &DMatrix<f64>,
        residual: &DVector<f64>,
        a_in: &DMatrix<f64>,
        slack: &DVector<f64>,
    ) -> Result<(DVector<f64>, f64), SolveFailure> {
        let num_eq = jacobian.nrows();
        let num_in = a_in.nrows();
        let n = jacobian.ncols();

        let mut constraints = DMatrix::zeros(num_eq + num_in, n);
        constraints.view_mut((0, 0), (num_eq, n)).copy_from(jacobian);
        constraints.view_mut((num_eq, 0), (num_in, n)).copy_from(a_in);

        let mut bounds = DVector::zeros(num_eq + num_in);
        bounds.rows_mut(0, num_eq).copy_from(&(-residual));
        bounds.rows_mut(num_eq, num_in).copy_from(slack);

        let a_csc = dmatrix_to_csc(&constraints);
        let cones = [ZeroConeT(num_eq), NonnegativeConeT(num_in)];

        // The subproblem must be solved tighter than the outer test or the
        // residual check can never pass; the floor keeps the request within
        // Clarabel's achievable precision.
        let qp_tolerance = (self.options.tolerance * 1e-2).max(1e-9);
        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.options.max_iterations.min(QP_MAX_ITER))
            .verbose(self.options.verbose)
            .tol_gap_abs(qp_tolerance)
            .tol_gap_rel(qp_tolerance)
            .tol_feas(qp_tolerance)
            .direct_solve_method(self.options.linear_solver.clone())
            .presolve_enable(self.options.presolve)
            .build()
            .map_err(|_| SolveFailure::NumericalFailure)?;

        let mut qp = DefaultSolver::new(
            p_upper,
            gradient.as_slice(),
            &a_csc,
            bounds.as_slice(),
            &cones,
            settings,
        )
        .map_err(|_| SolveFailure::NumericalFailure)?;
        qp.solve();

        match qp.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible
            | SolverStatus::DualInfeasible
            | SolverStatus::AlmostPrimalInfeasible
            | SolverStatus::AlmostDualInfeasible => return Err(SolveFailure::Infeasible),
            SolverStatus::MaxIterations | SolverStatus::MaxTime => {
                return Err(SolveFailure::IterationLimitExceeded)
            }
            _ => return Err(SolveFailure::NumericalFailure),
        }

        let step = DVector::from_column_slice(&qp.solution.x);
        if !step.iter().all(|v| v.is_finite()) {
            return Err(SolveFailure::NumericalFailure);
        }
        let eq_dual = qp
            .solution
            .z
            .iter()
            .take(num_eq)
            .fold(0.0_f64, |norm, v| norm.max(v.abs()));
        Ok((step, eq_dual))
    }
}

impl NlpSolver for SqpSolver {
    fn solve(
        &mut self,
        problem: &dyn NonlinearProgram,
        guess: &DVector<f64>,
    ) -> Result<Solution, SolveFailure> {
        let cost = problem.objective();
        let (a_in, b_in) = problem.inequalities();
        let p_upper = dmatrix_to_csc_upper_tri(&cost.p);
        let tolerance = self.options.tolerance;

        let mut x = guess.clone();
        let mut last_step = f64::INFINITY;
        let mut penalty = 1.0_f64;

        for iteration in 0..self.options.max_iterations {
            let residual = problem.eval_equalities(&x);
            let residual_norm = residual.amax();
            let step_bound = tolerance * (1.0 + x.amax());
            if residual_norm <= tolerance && last_step <= step_bound {
                let objective = objective_value(cost, &x);
                debug!(iteration, residual = residual_norm, objective, "sqp converged");
                return Ok(Solution {
                    primal: x,
                    iterations: iteration,
                    objective,
                });
            }

            let jacobian = problem.equality_jacobian(&x);
            let gradient = &cost.p * &x + &cost.q;
            let slack = b_in - a_in * &x;

            let (step, eq_dual) =
                self.solve_step(&p_upper, &gradient, &jacobian, &residual, a_in, &slack)?;

            // The penalty must dominate the equality multipliers for the QP
            // step to descend the merit function.
            penalty = penalty.max(2.0 * eq_dual);

            // Backtracking line search on f(x) + nu * ||c(x)||_1. The QP
            // keeps x + d inequality-feasible, and the constraints are
            // linear, so every damped iterate stays feasible too.
            let violation = l1_norm(&residual);
            let merit = objective_value(cost, &x) + penalty * violation;
            let descent = (gradient.dot(&step) - penalty * violation).min(0.0);

            let mut alpha = 1.0_f64;
            for _ in 0..MAX_BACKTRACKS {
                let trial = &x + alpha * &step;
                let trial_merit = objective_value(cost, &trial)
                    + penalty * l1_norm(&problem.eval_equalities(&trial));
                if trial_merit <= merit + 1e-4 * alpha * descent {
                    break;
                }
                alpha *= 0.5;
            }

            last_step = alpha * step.amax();
            x += alpha * &step;

            debug!(
                iteration,
                residual = residual_norm,
                step = last_step,
                alpha,
                "sqp iteration"
            );
        }

        warn!(
            max_iterations = self.options.max_iterations,
            "sqp iteration budget exhausted"
        );
        Err(SolveFailure::IterationLimitExceeded)
    }
}

/// Convert a dense matrix to Clarabel's sparse CSC format.
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert the upper triangle of a symmetric dense matrix to CSC, as
/// Clarabel expects for the quadratic cost.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
