use crate::errors::{EngineError, EngineResult};
use smallvec::SmallVec;

/// Parameter vector. Inline storage covers the small models used here.
pub type Point = SmallVec<[f64; 4]>;

pub trait Objective {
    fn dim(&self) -> usize;

    fn value(&self, x: &[f64]) -> f64;
}

pub trait BoxConstraints {
    /// Move `x` into the feasible set in place.
    fn project(&self, x: &mut [f64]);

    fn is_feasible(&self, x: &[f64]) -> bool {
        let mut p: Point = x.iter().copied().collect();
        self.project(&mut p);
        p.iter().zip(x).all(|(a, b)| a == b)
    }
}

/// Simple per-coordinate lower/upper bounds.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub lower: Point,
    pub upper: Point,
}

impl Bounds {
    pub fn new(lower: &[f64], upper: &[f64]) -> EngineResult<Self> {
        if lower.len() != upper.len() {
            return Err(EngineError::InvalidArgument(format!(
                "bounds dimension mismatch: {} lower vs {} upper",
                lower.len(),
                upper.len()
            )));
        }
        if let Some(i) = (0..lower.len()).find(|&i| lower[i] > upper[i]) {
            return Err(EngineError::InvalidArgument(format!(
                "bound {i}: lower {} above upper {}",
                lower[i], upper[i]
            )));
        }
        Ok(Self { lower: lower.iter().copied().collect(), upper: upper.iter().copied().collect() })
    }
}

impl BoxConstraints for Bounds {
    fn project(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            if i < self.lower.len() {
                *v = v.clamp(self.lower[i], self.upper[i]);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    /// Simplex objective spread, relative to 1 + |f_best|.
    pub f_tolerance: f64,
    /// Largest coordinate distance of any vertex from the best vertex.
    pub x_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self { f_tolerance: 1e-10, x_tolerance: 1e-6, max_iterations: 5_000 }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Point,
    pub value: f64,
    pub iterations: usize,
}

/// Bounded derivative-free minimization.
///
/// The search is split into three pieces so the algorithm can be swapped
/// without touching the models that use it:
///
///   Objective        f(x) to minimize (non-finite values count as +inf)
///   BoxConstraints   projection of any iterate back into the feasible set
///   ConvergencePolicy  tolerances + hard iteration budget
///
/// `NelderMead` is the default `Minimizer`. Every trial point is projected
/// before it is evaluated, so no infeasible iterate is ever scored.
pub trait Minimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimize from `start`. Fails with `Convergence` when the policy's
    /// tolerances are not met within its iteration budget.
    fn minimize(
        &self,
        objective: &dyn Objective,
        constraints: &dyn BoxConstraints,
        start: &[f64],
        policy: &ConvergencePolicy,
    ) -> EngineResult<Minimum>;
}

/// Nelder-Mead simplex search with projected iterates.
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
    /// Relative size of the initial simplex around the start point.
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self { reflection: 1.0, expansion: 2.0, contraction: 0.5, shrink: 0.5, initial_step: 0.05 }
    }
}

/// Step used for a zero start coordinate.
const ZERO_COORD_STEP: f64 = 0.00025;

impl NelderMead {
    fn initial_simplex(&self, start: &[f64], constraints: &dyn BoxConstraints) -> Vec<Point> {
        let mut x0: Point = start.iter().copied().collect();
        constraints.project(&mut x0);

        let mut simplex = Vec::with_capacity(x0.len() + 1);
        simplex.push(x0.clone());
        for i in 0..x0.len() {
            let mut v = x0.clone();
            v[i] = if v[i] != 0.0 { v[i] * (1.0 + self.initial_step) } else { ZERO_COORD_STEP };
            constraints.project(&mut v);
            // Projection can collapse a vertex onto x0; step the other way instead.
            if v[i] == x0[i] {
                v[i] = if x0[i] != 0.0 { x0[i] * (1.0 - self.initial_step) } else { -ZERO_COORD_STEP };
                constraints.project(&mut v);
            }
            simplex.push(v);
        }
        simplex
    }
}

impl Minimizer for NelderMead {
    fn name(&self) -> &'static str {
        "Nelder-Mead"
    }

    fn minimize(
        &self,
        objective: &dyn Objective,
        constraints: &dyn BoxConstraints,
        start: &[f64],
        policy: &ConvergencePolicy,
    ) -> EngineResult<Minimum> {
        let n = objective.dim();
        if start.len() != n || n == 0 {
            return Err(EngineError::InvalidArgument(format!(
                "start point has {} coordinates, objective expects {n}",
                start.len()
            )));
        }

        let eval = |x: &[f64]| {
            let v = objective.value(x);
            if v.is_finite() { v } else { f64::INFINITY }
        };
        // affine combination a + t * (b - a), projected
        let towards = |a: &Point, b: &Point, t: f64| -> Point {
            let mut p: Point = a.iter().zip(b.iter()).map(|(ai, bi)| ai + t * (bi - ai)).collect();
            constraints.project(&mut p);
            p
        };

        let mut simplex = self.initial_simplex(start, constraints);
        let mut values: Vec<f64> = simplex.iter().map(|p| eval(p)).collect();
        let mut order: Vec<usize> = (0..=n).collect();

        for iteration in 0..policy.max_iterations {
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            let best = order[0];
            let worst = order[n];
            let second_worst = order[n - 1];

            if values[best].is_finite() && converged(&simplex, &values, best, policy) {
                tracing::debug!(
                    minimizer = self.name(),
                    iterations = iteration,
                    value = values[best],
                    "minimizer converged"
                );
                return Ok(Minimum { point: simplex[best].clone(), value: values[best], iterations: iteration });
            }

            let mut centroid: Point = SmallVec::from_elem(0.0, n);
            for &idx in &order[..n] {
                for (c, x) in centroid.iter_mut().zip(simplex[idx].iter()) {
                    *c += x / n as f64;
                }
            }

            let reflected = towards(&centroid, &simplex[worst], -self.reflection);
            let f_reflected = eval(&reflected);

            if f_reflected < values[best] {
                let expanded = towards(&centroid, &reflected, self.expansion);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[worst] = expanded;
                    values[worst] = f_expanded;
                } else {
                    simplex[worst] = reflected;
                    values[worst] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[second_worst] {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
                continue;
            }

            let (contracted, f_limit) = if f_reflected < values[worst] {
                (towards(&centroid, &reflected, self.contraction), f_reflected)
            } else {
                (towards(&centroid, &simplex[worst], self.contraction), values[worst])
            };
            let f_contracted = eval(&contracted);
            if f_contracted < f_limit {
                simplex[worst] = contracted;
                values[worst] = f_contracted;
                continue;
            }

            let anchor = simplex[best].clone();
            for &idx in &order[1..] {
                simplex[idx] = towards(&anchor, &simplex[idx], self.shrink);
                values[idx] = eval(&simplex[idx]);
            }
        }

        Err(EngineError::Convergence(format!(
            "{} did not converge within {} iterations",
            self.name(),
            policy.max_iterations
        )))
    }
}

fn converged(simplex: &[Point], values: &[f64], best: usize, policy: &ConvergencePolicy) -> bool {
    let f_best = values[best];
    let f_spread = values.iter().map(|v| (v - f_best).abs()).fold(0.0, f64::max);
    if f_spread > policy.f_tolerance * (1.0 + f_best.abs()) {
        return false;
    }
    let x_best = &simplex[best];
    let x_spread = simplex
        .iter()
        .flat_map(|p| p.iter().zip(x_best.iter()).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max);
    x_spread <= policy.x_tolerance
}
