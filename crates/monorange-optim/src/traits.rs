use monorange_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Dense non-linear least-squares problem.
///
/// Implementors supply plain residuals and their Jacobian. The solver sees the
/// robustified versions from [`NllsProblem::residuals`] and
/// [`NllsProblem::jacobian`], where each row is multiplied by the IRLS scale of
/// its unweighted residual. The scales are held constant when differentiating.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// `sqrt(w_i)` per residual row; all ones for plain L2.
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let r = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r);
        r.component_mul(&scales)
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let scales = self.robust_row_scales(&self.residuals_unweighted(x));
        let mut j = self.jacobian_unweighted(x);
        scale_rows(&mut j, &scales);
        j
    }

    /// `0.5 * ||r||^2` of the robustified residuals.
    fn cost(&self, x: &DVector<Real>) -> Real {
        0.5 * self.residuals(x).norm_squared()
    }
}

fn scale_rows(j: &mut DMatrix<Real>, scales: &DVector<Real>) {
    debug_assert_eq!(j.nrows(), scales.len());
    for (i, &s) in scales.iter().enumerate() {
        if s != 1.0 {
            j.row_mut(i).scale_mut(s);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Evaluation budget is `max_iters * (n_params + 1)`.
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub evaluations: usize,
    /// `0.5 * ||r||^2` of the weighted residuals at the solution.
    pub final_cost: Real,
    pub converged: bool,
    pub termination: String,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
