/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Box-constrained minimization.
//!
//! [`Minimizer`] is the capability the optimization driver needs:
//! `minimize(objective, initial, bounds, tolerances) -> outcome`. Any bounded
//! minimizer satisfies it. [`ProjectedLbfgs`] is the bundled implementation,
//! a limited-memory quasi-Newton method on the feasible box:
//!
//! ```text
//! loop:
//!   g   ← forward-difference gradient at x (steps flipped inward at upper bounds)
//!   pg  ← P(x − g) − x                      stop if ‖pg‖∞ ≤ pgtol
//!   d   ← −H·g on free variables            (two-loop recursion, m pairs)
//!   x'  ← P(x + t·d), t halved until Armijo holds on the projected step
//!   stop if (f − f') / max(|f|, |f'|, 1) ≤ factr · ε
//! ```
//!
//! where `P` clamps into the bounds. Hitting the evaluation or iteration cap
//! ends the run with `converged = false`; it is not an error.

use std::collections::VecDeque;
use std::fmt;

use log::debug;

use crate::config::SolverTolerances;
use crate::error::{RankFairError, Result};

/// Armijo sufficient-decrease constant.
const ARMIJO_C1: f64 = 1e-4;

/// Backtracking halvings tried before the line search gives up.
const MAX_BACKTRACKS: usize = 30;

// ─── Bound ───────────────────────────────────────────────────────────────────

/// Optional lower and upper limit on one variable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bound {
    /// Inclusive lower limit, if any.
    pub lower: Option<f64>,
    /// Inclusive upper limit, if any.
    pub upper: Option<f64>,
}

impl Bound {
    /// No limits.
    pub const UNBOUNDED: Bound = Bound { lower: None, upper: None };

    /// The closed unit interval.
    pub const UNIT: Bound = Bound { lower: Some(0.0), upper: Some(1.0) };

    /// Bound with both limits.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower: Some(lower), upper: Some(upper) }
    }

    /// Clamp `x` into the bound.
    pub fn project(&self, x: f64) -> f64 {
        let x = self.lower.map_or(x, |l| x.max(l));
        self.upper.map_or(x, |u| x.min(u))
    }

    fn at_lower(&self, x: f64) -> bool {
        self.lower.is_some_and(|l| x <= l)
    }

    fn at_upper(&self, x: f64) -> bool {
        self.upper.is_some_and(|u| x >= u)
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Why a minimizer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// Projected gradient fell below `pgtol`.
    ProjectedGradient,
    /// Relative loss reduction fell below `factr · ε`.
    RelativeReduction,
    /// `max_evaluations` reached.
    EvaluationLimit,
    /// `max_iterations` reached.
    IterationLimit,
    /// No step along the search direction decreased the loss.
    LineSearchFailed,
}

impl StopReason {
    /// `true` for the two tolerance-based stops.
    pub fn is_converged(self) -> bool {
        matches!(self, Self::ProjectedGradient | Self::RelativeReduction)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProjectedGradient => "projected gradient below tolerance",
            Self::RelativeReduction => "relative reduction below tolerance",
            Self::EvaluationLimit => "evaluation limit reached",
            Self::IterationLimit => "iteration limit reached",
            Self::LineSearchFailed => "line search failed",
        })
    }
}

/// Result of one minimization.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinimizeOutcome {
    /// Best feasible parameters found.
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`.
    pub loss: f64,
    /// Completed iterations.
    pub iterations: usize,
    /// Objective evaluations, including those spent on gradients.
    pub evaluations: usize,
    /// Whether a tolerance, not a cap or a failed search, ended the run.
    pub converged: bool,
    /// Why the run ended.
    pub reason: StopReason,
}

// ─── Minimizer ───────────────────────────────────────────────────────────────

/// A box-constrained minimizer.
pub trait Minimizer {
    /// Minimize `objective` from `initial` subject to `bounds` (one per variable).
    ///
    /// Errors raised by `objective` abort the run and are returned unchanged.
    fn minimize(
        &self,
        objective: &mut dyn FnMut(&[f64]) -> Result<f64>,
        initial: Vec<f64>,
        bounds: &[Bound],
        tolerances: &SolverTolerances,
    ) -> Result<MinimizeOutcome>;
}

// ─── ProjectedLbfgs ──────────────────────────────────────────────────────────

/// Projected limited-memory BFGS with numerical gradients.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectedLbfgs;

impl ProjectedLbfgs {
    /// New solver; all settings come from [`SolverTolerances`].
    pub fn new() -> Self {
        Self
    }
}

/// Objective wrapper that counts calls and refuses to exceed the cap.
struct Budget<'a> {
    objective: &'a mut dyn FnMut(&[f64]) -> Result<f64>,
    used: usize,
    limit: usize,
}

impl Budget<'_> {
    /// `Ok(None)` once the cap is reached.
    fn eval(&mut self, x: &[f64]) -> Result<Option<f64>> {
        if self.used >= self.limit {
            return Ok(None);
        }
        self.used += 1;
        (self.objective)(x).map(Some)
    }

    /// Forward differences, stepping backward where a forward step would leave the box.
    fn gradient(
        &mut self,
        x: &[f64],
        fx: f64,
        bounds: &[Bound],
        step: f64,
    ) -> Result<Option<Vec<f64>>> {
        let mut shifted = x.to_vec();
        let mut grad = vec![0.0; x.len()];
        for i in 0..x.len() {
            let h = if bounds[i].upper.is_some_and(|u| x[i] + step > u) { -step } else { step };
            shifted[i] = x[i] + h;
            let Some(fh) = self.eval(&shifted)? else {
                return Ok(None);
            };
            grad[i] = (fh - fx) / h;
            shifted[i] = x[i];
        }
        Ok(Some(grad))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Variables pinned at a bound with the gradient pushing outward.
fn active_set(x: &[f64], g: &[f64], bounds: &[Bound]) -> Vec<bool> {
    x.iter()
        .zip(g)
        .zip(bounds)
        .map(|((&xi, &gi), b)| (b.at_lower(xi) && gi > 0.0) || (b.at_upper(xi) && gi < 0.0))
        .collect()
}

/// `−H·g` restricted to free variables, by the L-BFGS two-loop recursion.
fn search_direction(
    g: &[f64],
    active: &[bool],
    pairs: &VecDeque<(Vec<f64>, Vec<f64>, f64)>,
) -> Vec<f64> {
    let mut q: Vec<f64> = g.iter().zip(active).map(|(&gi, &a)| if a { 0.0 } else { gi }).collect();
    let mut alphas = Vec::with_capacity(pairs.len());
    for (s, y, rho) in pairs.iter().rev() {
        let a = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y) {
            *qi -= a * yi;
        }
        alphas.push(a);
    }
    let gamma = pairs.back().map_or(1.0, |(s, y, _)| dot(s, y) / dot(y, y));
    for qi in &mut q {
        *qi *= gamma;
    }
    for ((s, y, rho), a) in pairs.iter().zip(alphas.iter().rev()) {
        let b = rho * dot(y, &q);
        for (qi, si) in q.iter_mut().zip(s) {
            *qi += si * (a - b);
        }
    }
    q.iter().zip(active).map(|(&r, &a)| if a { 0.0 } else { -r }).collect()
}

impl Minimizer for ProjectedLbfgs {
    fn minimize(
        &self,
        objective: &mut dyn FnMut(&[f64]) -> Result<f64>,
        initial: Vec<f64>,
        bounds: &[Bound],
        tolerances: &SolverTolerances,
    ) -> Result<MinimizeOutcome> {
        if initial.is_empty() {
            return Err(RankFairError::Empty("initial parameters"));
        }
        if bounds.len() != initial.len() {
            return Err(RankFairError::shape("parameter bounds", initial.len(), bounds.len()));
        }
        if tolerances.memory == 0 {
            return Err(RankFairError::out_of_range("solver memory", "must be at least 1"));
        }

        let project = |v: &mut [f64]| {
            for (vi, b) in v.iter_mut().zip(bounds) {
                *vi = b.project(*vi);
            }
        };
        let mut budget = Budget { objective, used: 0, limit: tolerances.max_evaluations };
        let mut x = initial;
        project(&mut x);

        let finish = |x: Vec<f64>, f: f64, iters: usize, evals: usize, reason: StopReason| {
            debug!("solver stopped after {iters} iterations, {evals} evaluations: {reason}");
            MinimizeOutcome {
                parameters: x,
                loss: f,
                iterations: iters,
                evaluations: evals,
                converged: reason.is_converged(),
                reason,
            }
        };

        let Some(mut f) = budget.eval(&x)? else {
            return Err(RankFairError::out_of_range(
                "evaluation limit",
                "must allow at least one evaluation",
            ));
        };
        let Some(mut g) = budget.gradient(&x, f, bounds, tolerances.gradient_step)? else {
            return Ok(finish(x, f, 0, budget.used, StopReason::EvaluationLimit));
        };

        let mut pairs: VecDeque<(Vec<f64>, Vec<f64>, f64)> =
            VecDeque::with_capacity(tolerances.memory);
        let mut iterations = 0;
        loop {
            let mut pg: Vec<f64> = x.iter().zip(&g).map(|(xi, gi)| xi - gi).collect();
            project(&mut pg);
            for (p, xi) in pg.iter_mut().zip(&x) {
                *p -= xi;
            }
            if inf_norm(&pg) <= tolerances.pgtol {
                return Ok(finish(x, f, iterations, budget.used, StopReason::ProjectedGradient));
            }
            if iterations >= tolerances.max_iterations {
                return Ok(finish(x, f, iterations, budget.used, StopReason::IterationLimit));
            }

            let active = active_set(&x, &g, bounds);
            let mut d = search_direction(&g, &active, &pairs);
            if dot(&d, &g) >= 0.0 {
                // curvature history no longer gives descent; restart from steepest descent
                pairs.clear();
                d = search_direction(&g, &active, &pairs);
            }

            let mut t = if pairs.is_empty() {
                1.0f64.min(1.0 / inf_norm(&d).max(f64::MIN_POSITIVE))
            } else {
                1.0
            };
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let mut trial: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + t * di).collect();
                project(&mut trial);
                let step: Vec<f64> = trial.iter().zip(&x).map(|(a, b)| a - b).collect();
                let Some(ft) = budget.eval(&trial)? else {
                    return Ok(finish(x, f, iterations, budget.used, StopReason::EvaluationLimit));
                };
                if ft <= f + ARMIJO_C1 * dot(&g, &step) {
                    accepted = Some((trial, ft, step));
                    break;
                }
                t *= 0.5;
            }
            let Some((x_new, f_new, s)) = accepted else {
                return Ok(finish(x, f, iterations, budget.used, StopReason::LineSearchFailed));
            };
            iterations += 1;

            let h = tolerances.gradient_step;
            let Some(g_new) = budget.gradient(&x_new, f_new, bounds, h)? else {
                let reason = StopReason::EvaluationLimit;
                return Ok(finish(x_new, f_new, iterations, budget.used, reason));
            };
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > f64::EPSILON * dot(&y, &y) {
                if pairs.len() == tolerances.memory {
                    pairs.pop_front();
                }
                pairs.push_back((s, y, 1.0 / sy));
            }

            let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
            debug!(
                "iteration {iterations}: loss {f_new:.6e}, step {t:.3e}, evaluations {}",
                budget.used
            );
            x = x_new;
            f = f_new;
            g = g_new;
            if reduction <= tolerances.factr * f64::EPSILON {
                return Ok(finish(x, f, iterations, budget.used, StopReason::RelativeReduction));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tight() -> SolverTolerances {
        SolverTolerances::default().with_factr(1e7)
    }

    fn shifted_quadratic(x: &[f64]) -> Result<f64> {
        let c = [1.0, -2.0, 3.0];
        Ok(x.iter().zip(c).map(|(xi, ci)| (xi - ci) * (xi - ci)).sum())
    }

    #[test]
    fn test_unbounded_quadratic() {
        let out = ProjectedLbfgs
            .minimize(&mut shifted_quadratic, vec![0.0; 3], &[Bound::UNBOUNDED; 3], &tight())
            .unwrap();
        assert!(out.converged, "{:?}", out.reason);
        assert_abs_diff_eq!(out.parameters[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.parameters[1], -2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.parameters[2], 3.0, epsilon = 1e-3);
        assert!(out.loss < 1e-5);
    }

    #[test]
    fn test_bounds_are_respected() {
        let bounds = [Bound::new(0.0, 0.5), Bound::UNBOUNDED, Bound::new(0.0, 10.0)];
        let mut seen_outside = false;
        let mut f = |x: &[f64]| {
            if x[0] < 0.0 || x[0] > 0.5 || x[2] < 0.0 || x[2] > 10.0 {
                seen_outside = true;
            }
            shifted_quadratic(x)
        };
        let out = ProjectedLbfgs.minimize(&mut f, vec![5.0, 0.0, -1.0], &bounds, &tight()).unwrap();
        assert!(!seen_outside);
        assert_abs_diff_eq!(out.parameters[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(out.parameters[1], -2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.parameters[2], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_evaluation_cap_is_not_an_error() {
        let mut calls = 0;
        let mut f = |x: &[f64]| {
            calls += 1;
            shifted_quadratic(x)
        };
        let tol = SolverTolerances::default().with_max_evaluations(6);
        let bounds = [Bound::UNBOUNDED; 3];
        let out = ProjectedLbfgs.minimize(&mut f, vec![0.0; 3], &bounds, &tol).unwrap();
        assert_eq!(out.reason, StopReason::EvaluationLimit);
        assert!(!out.converged);
        assert!(out.evaluations <= 6);
        assert_eq!(calls, out.evaluations);
    }

    #[test]
    fn test_iteration_cap() {
        let tol = tight().with_max_iterations(1);
        let out = ProjectedLbfgs
            .minimize(&mut shifted_quadratic, vec![10.0; 3], &[Bound::UNBOUNDED; 3], &tol)
            .unwrap();
        assert!(out.iterations <= 1);
        assert!(out.reason == StopReason::IterationLimit || out.converged);
    }

    #[test]
    fn test_objective_errors_propagate() {
        let mut f = |_: &[f64]| -> Result<f64> { Err(RankFairError::Empty("objective")) };
        let err = ProjectedLbfgs.minimize(&mut f, vec![0.0], &[Bound::UNBOUNDED], &tight());
        assert!(matches!(err, Err(RankFairError::Empty("objective"))));
    }

    #[test]
    fn test_rejects_bound_mismatch() {
        assert!(ProjectedLbfgs
            .minimize(&mut shifted_quadratic, vec![0.0; 3], &[Bound::UNBOUNDED; 2], &tight())
            .is_err());
    }

    #[test]
    fn test_bound_projection() {
        assert_eq!(Bound::UNIT.project(1.5), 1.0);
        assert_eq!(Bound::UNIT.project(-0.5), 0.0);
        assert_eq!(Bound::UNBOUNDED.project(-7.0), -7.0);
    }
}
