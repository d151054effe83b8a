//! Convex per-edge cost functions.
//!
//! Every variant satisfies `apply(0) == 0`, is convex and finite on
//! `x >= 0`, and exposes an inverse of its marginal cost such that
//! `relu(inverse_derivative(y))` minimises `apply(x) - y * x` over `x >= 0`.
//! The dual solver relies on that last property for its lower bound.

use serde::{Deserialize, Serialize};

use crate::error::{McfError, Result};
use crate::matrix::EdgeMatrix;

/// Guard against `ln(0)` in the exponential inverse.
const SMALL_NUMBER: f32 = 1e-7;

/// Scaled flow `c * x` past which the exponential cost continues with its
/// second-order Taylor expansion instead of overflowing.
pub const EXP_TAIL_START: f32 = 20.0;

/// BPR congestion coefficient.
pub const BPR_ALPHA: f32 = 0.15;

/// BPR congestion exponent.
pub const BPR_POWER: i32 = 4;

/// Named cost-function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    /// `c * x^2`
    Quadratic,
    /// `c * |x|^3`
    Cubic,
    /// `exp(c * x) - 1` up to `c * x = EXP_TAIL_START`, then the quadratic
    /// continuation with matching value, slope and curvature. Convex and
    /// finite for every representable flow.
    Exp,
}

impl std::str::FromStr for CostKind {
    type Err = McfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quadratic" | "square" => Ok(CostKind::Quadratic),
            "cubic" | "cube" => Ok(CostKind::Cubic),
            "exp" | "exponential" => Ok(CostKind::Exp),
            other => Err(McfError::config(format!("unknown cost function '{other}'"))),
        }
    }
}

impl std::fmt::Display for CostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostKind::Quadratic => write!(f, "quadratic"),
            CostKind::Cubic => write!(f, "cubic"),
            CostKind::Exp => write!(f, "exp"),
        }
    }
}

/// A cost family together with its scale constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostFunction {
    /// Family.
    #[serde(rename = "name")]
    pub kind: CostKind,
    /// Scale constant, strictly positive.
    pub constant: f32,
}

impl CostFunction {
    /// Create a cost function, rejecting non-positive or non-finite scales.
    pub fn new(kind: CostKind, constant: f32) -> Result<Self> {
        let cost = Self { kind, constant };
        cost.validate()?;
        Ok(cost)
    }

    /// Check the scale constant.
    pub fn validate(&self) -> Result<()> {
        if !self.constant.is_finite() || self.constant <= 0.0 {
            return Err(McfError::config(format!(
                "cost constant must be positive and finite, got {}",
                self.constant
            )));
        }
        Ok(())
    }

    /// Edge cost `c(x)`.
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        let c = self.constant;
        match self.kind {
            CostKind::Quadratic => c * x * x,
            CostKind::Cubic => c * x.abs().powi(3),
            CostKind::Exp => {
                let t = c * x;
                if t <= EXP_TAIL_START {
                    t.exp_m1()
                } else {
                    let d = t - EXP_TAIL_START;
                    EXP_TAIL_START.exp_m1() + EXP_TAIL_START.exp() * (d + 0.5 * d * d)
                }
            }
        }
    }

    /// Marginal cost `c'(x)`.
    #[inline]
    pub fn derivative(&self, x: f32) -> f32 {
        let c = self.constant;
        match self.kind {
            CostKind::Quadratic => 2.0 * c * x,
            CostKind::Cubic => 3.0 * c * x * x.abs(),
            CostKind::Exp => {
                let t = c * x;
                if t <= EXP_TAIL_START {
                    c * t.exp()
                } else {
                    c * EXP_TAIL_START.exp() * (1.0 + t - EXP_TAIL_START)
                }
            }
        }
    }

    /// Inverse of the marginal cost. Values whose preimage lies below zero
    /// come back negative, so callers clamp with `relu`.
    #[inline]
    pub fn inverse_derivative(&self, y: f32) -> f32 {
        let c = self.constant;
        match self.kind {
            CostKind::Quadratic => y / (2.0 * c),
            CostKind::Cubic => y.signum() * (y.abs() / (3.0 * c)).sqrt(),
            CostKind::Exp => {
                let tail_slope = c * EXP_TAIL_START.exp();
                if y <= tail_slope {
                    (y.max(SMALL_NUMBER) / c).ln() / c
                } else {
                    (EXP_TAIL_START + y / tail_slope - 1.0) / c
                }
            }
        }
    }

    /// Congestion-aware cost: `c(x) * (1 + alpha * (x / cap)^power)`.
    ///
    /// Zero at zero, convex in `x`, and grows sharply once `x` approaches
    /// `cap`.
    #[inline]
    pub fn apply_with_capacity(&self, x: f32, capacity: f32) -> f32 {
        let ratio = x / (capacity + SMALL_NUMBER);
        self.apply(x) * (1.0 + BPR_ALPHA * ratio.powi(BPR_POWER))
    }

    /// Total cost `sum_e c(x_e)` over an edge matrix.
    pub fn total<M: EdgeMatrix>(&self, flow: &M) -> f32 {
        flow.sum_edges(|_, _, x| self.apply(x))
    }

    /// Total congestion-aware cost. `capacities` must share the flow's
    /// pattern.
    pub fn total_with_capacities<M: EdgeMatrix>(&self, flow: &M, capacities: &M) -> Result<f32> {
        let costs = flow.zip_map(capacities, |x, cap| self.apply_with_capacity(x, cap))?;
        Ok(costs.sum_edges(|_, _, c| c))
    }
}

impl Default for CostFunction {
    fn default() -> Self {
        Self {
            kind: CostKind::Quadratic,
            constant: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [CostKind; 3] = [CostKind::Quadratic, CostKind::Cubic, CostKind::Exp];

    #[test]
    fn cost_is_zero_at_zero() {
        for kind in ALL {
            for c in [0.1, 1.0, 3.5] {
                let cost = CostFunction::new(kind, c).unwrap();
                assert_eq!(cost.apply(0.0), 0.0, "{kind} with constant {c}");
                assert_eq!(cost.apply_with_capacity(0.0, 2.0), 0.0);
            }
        }
    }

    #[test]
    fn inverse_derivative_inverts_derivative_on_positive_flows() {
        for kind in ALL {
            let cost = CostFunction::new(kind, 0.7).unwrap();
            for x in [0.05f32, 0.5, 1.0, 2.5] {
                let y = cost.derivative(x);
                assert_relative_eq!(cost.inverse_derivative(y), x, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn relu_inverse_is_lagrangian_minimiser() {
        // argmin_{x >= 0} c(x) - y x, checked against a grid search.
        for kind in ALL {
            let cost = CostFunction::new(kind, 1.3).unwrap();
            for y in [-2.0f32, 0.0, 0.5, 1.0, 4.0] {
                let x_star = cost.inverse_derivative(y).max(0.0);
                let best = cost.apply(x_star) - y * x_star;
                for i in 0..400 {
                    let x = i as f32 * 0.01;
                    assert!(
                        best <= cost.apply(x) - y * x + 1e-4,
                        "{kind}: y={y} x*={x_star} beaten by x={x}"
                    );
                }
            }
        }
    }

    #[test]
    fn exp_cost_stays_finite_and_convex_on_large_flows() {
        let cost = CostFunction::new(CostKind::Exp, 2.0).unwrap();
        let xs = [5.0f32, 9.9, 10.0, 10.1, 25.0, 50.0, 1e3, 1e6];
        for &x in &xs {
            assert!(cost.apply(x).is_finite(), "c({x}) overflowed");
            assert!(cost.derivative(x).is_finite());
        }
        // Marginal cost keeps increasing across the tail boundary.
        for pair in xs.windows(2) {
            assert!(cost.derivative(pair[1]) > cost.derivative(pair[0]));
            assert!(cost.apply(pair[1]) > cost.apply(pair[0]));
        }
        // Value and slope are continuous where the tail starts (c * x = 20).
        let edge = EXP_TAIL_START / 2.0;
        assert_relative_eq!(cost.apply(edge + 1e-3), cost.apply(edge), max_relative = 1e-2);
        assert_relative_eq!(
            cost.derivative(edge + 1e-3),
            cost.derivative(edge),
            max_relative = 1e-2
        );
        // The inverse marginal cost still recovers the flow in the tail.
        for x in [12.0f32, 50.0] {
            let y = cost.derivative(x);
            assert_relative_eq!(cost.inverse_derivative(y), x, max_relative = 1e-4);
        }
    }

    #[test]
    fn capacity_cost_exceeds_plain_cost() {
        let cost = CostFunction::default();
        assert!(cost.apply_with_capacity(0.5, 0.5) > cost.apply(0.5));
        assert_relative_eq!(
            cost.apply_with_capacity(0.5, 0.5),
            0.25 * (1.0 + BPR_ALPHA),
            max_relative = 1e-4
        );
    }

    #[test]
    fn names_parse() {
        assert_eq!("Quadratic".parse::<CostKind>().unwrap(), CostKind::Quadratic);
        assert_eq!("exp".parse::<CostKind>().unwrap(), CostKind::Exp);
        assert!("tanh".parse::<CostKind>().is_err());
        assert!(CostFunction::new(CostKind::Cubic, 0.0).is_err());
    }
}
