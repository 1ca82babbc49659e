use crate::errors::{EngineError, EngineResult};
use crate::models::optimizer::{BoxConstraints, Bounds, ConvergencePolicy, Minimizer, NelderMead, Objective};
use crate::models::stats;
use crate::models::volatility::TRADING_DAYS_PER_YEAR;

/// Minimum number of returns before the three parameters are identifiable.
pub const MIN_GARCH_OBSERVATIONS: usize = 30;

/// Starting point: typical equity-like persistence.
const INITIAL_ALPHA: f64 = 0.10;
const INITIAL_BETA: f64 = 0.85;
/// omega starts at 5% of the sample variance.
const INITIAL_OMEGA_WEIGHT: f64 = 0.05;

/// Search-space cap on alpha + beta. Keeps every iterate strictly stationary.
const MAX_PERSISTENCE: f64 = 0.9999;

/// Lower bound on omega, as a multiple of the sample variance.
const MIN_OMEGA_WEIGHT: f64 = 1e-8;

/// Outlook bands: forecast vs current vol ratio.
const OUTLOOK_UP: f64 = 1.1;
const OUTLOOK_DOWN: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GarchParameters {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl GarchParameters {
    /// Validated constructor. Non-stationary or non-positive-omega triples are rejected.
    pub fn new(omega: f64, alpha: f64, beta: f64) -> EngineResult<Self> {
        if !(omega.is_finite() && alpha.is_finite() && beta.is_finite()) {
            return Err(EngineError::InvalidArgument(format!(
                "garch parameters must be finite: omega={omega} alpha={alpha} beta={beta}"
            )));
        }
        if omega <= 0.0 {
            return Err(EngineError::InvalidArgument(format!("omega must be > 0, got {omega}")));
        }
        if alpha < 0.0 || beta < 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "alpha and beta must be >= 0, got alpha={alpha} beta={beta}"
            )));
        }
        if alpha + beta >= 1.0 {
            return Err(EngineError::InvalidArgument(format!(
                "alpha + beta must be < 1 for stationarity, got {}",
                alpha + beta
            )));
        }
        Ok(Self { omega, alpha, beta })
    }

    #[inline]
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Unconditional variance omega / (1 - alpha - beta).
    #[inline]
    pub fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence())
    }

    /// Periods for a variance shock to decay by half: ln 2 / -ln(alpha + beta).
    pub fn half_life(&self) -> f64 {
        let p = self.persistence();
        if p <= 0.0 {
            0.0
        } else {
            std::f64::consts::LN_2 / -p.ln()
        }
    }
}

/// Forecast conditional volatilities, one per horizon step (return scale).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ForecastPath {
    steps: Vec<f64>,
}

impl ForecastPath {
    #[inline]
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    #[inline]
    pub fn horizon(&self) -> usize {
        self.steps.len()
    }

    /// Vol at the final step.
    pub fn terminal(&self) -> Option<f64> {
        self.steps.last().copied()
    }

    pub fn annualized(&self, periods_per_year: f64) -> Vec<f64> {
        let scale = periods_per_year.sqrt();
        self.steps.iter().map(|v| v * scale).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolOutlook {
    Increase,
    Decrease,
    Stable,
}

/// Reporting view of a fit plus forecast. Vols here are annualized.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GarchForecast {
    pub params: GarchParameters,
    pub horizon: usize,
    pub current_vol: f64,
    pub forecast_vol: f64,
    pub persistence: f64,
    pub half_life: f64,
    pub outlook: VolOutlook,
    pub path: ForecastPath,
}

/// In-sample conditional variance path. Seeded with the mean squared return.
/// Element `t` is the variance the model assigned to `returns[t]`.
pub fn conditional_variances(params: &GarchParameters, returns: &[f64]) -> Vec<f64> {
    if returns.is_empty() {
        return Vec::new();
    }
    let backcast = returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64;
    filter(params.omega, params.alpha, params.beta, returns, backcast)
}

fn filter(omega: f64, alpha: f64, beta: f64, returns: &[f64], seed: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(returns.len());
    let mut var = seed;
    for t in 0..returns.len() {
        if t > 0 {
            let prev = returns[t - 1];
            var = omega + alpha * prev * prev + beta * var;
        }
        out.push(var);
    }
    out
}

/// Negative log-likelihood over x = [omega / scale, alpha, beta].
struct GarchLikelihood<'a> {
    returns: &'a [f64],
    scale: f64,
    backcast: f64,
}

impl Objective for GarchLikelihood<'_> {
    fn dim(&self) -> usize {
        3
    }

    fn value(&self, x: &[f64]) -> f64 {
        let omega = x[0] * self.scale;
        let (alpha, beta) = (x[1], x[2]);
        if omega <= 0.0 || alpha < 0.0 || beta < 0.0 || alpha + beta >= 1.0 {
            return f64::INFINITY;
        }

        let mut nll = 0.0;
        let mut var = self.backcast;
        for (t, &r) in self.returns.iter().enumerate() {
            if t > 0 {
                let prev = self.returns[t - 1];
                var = omega + alpha * prev * prev + beta * var;
            }
            if var <= 0.0 || !var.is_finite() {
                return f64::INFINITY;
            }
            nll += 0.5 * (var.ln() + r * r / var);
        }
        nll
    }
}

/// Box bounds on each coordinate plus the alpha + beta cap.
struct GarchConstraints {
    bounds: Bounds,
}

impl GarchConstraints {
    fn new() -> EngineResult<Self> {
        let bounds = Bounds::new(
            &[MIN_OMEGA_WEIGHT, 0.0, 0.0],
            &[f64::INFINITY, MAX_PERSISTENCE, MAX_PERSISTENCE],
        )?;
        Ok(Self { bounds })
    }
}

impl BoxConstraints for GarchConstraints {
    fn project(&self, x: &mut [f64]) {
        self.bounds.project(x);
        let persistence = x[1] + x[2];
        if persistence > MAX_PERSISTENCE {
            let shrink = MAX_PERSISTENCE / persistence;
            x[1] *= shrink;
            x[2] *= shrink;
        }
    }
}

/// Fits GARCH(1,1) and projects conditional vol forward.
///
///   sigma^2_t = omega + alpha * r^2_{t-1} + beta * sigma^2_{t-1}
///
/// Fitted by maximizing the normal log-likelihood
///
///   L = sum_t -1/2 * ( ln sigma^2_t + r^2_t / sigma^2_t )
///
/// subject to omega > 0, alpha >= 0, beta >= 0, alpha + beta < 1.
///
/// All variance arithmetic is in return scale (per period). Annualization
/// happens only in `ForecastPath::annualized` and `GarchForecast`.
/// The minimizer is pluggable; Nelder-Mead is the default.
#[derive(Debug, Clone)]
pub struct GarchForecaster<M: Minimizer = NelderMead> {
    minimizer: M,
    policy: ConvergencePolicy,
    periods_per_year: f64,
}

impl Default for GarchForecaster<NelderMead> {
    fn default() -> Self {
        Self::new(ConvergencePolicy::default())
    }
}

impl GarchForecaster<NelderMead> {
    pub fn new(policy: ConvergencePolicy) -> Self {
        Self::with_minimizer(NelderMead::default(), policy)
    }
}

impl<M: Minimizer> GarchForecaster<M> {
    pub fn with_minimizer(minimizer: M, policy: ConvergencePolicy) -> Self {
        Self { minimizer, policy, periods_per_year: TRADING_DAYS_PER_YEAR }
    }

    pub fn policy(&self) -> &ConvergencePolicy {
        &self.policy
    }

    /// Maximum-likelihood fit. Never returns a non-stationary triple:
    /// a search that ends outside the stationary region is a `Convergence` error.
    pub fn fit(&self, returns: &[f64]) -> EngineResult<GarchParameters> {
        if returns.len() < MIN_GARCH_OBSERVATIONS {
            return Err(EngineError::InsufficientData(format!(
                "garch fit needs at least {MIN_GARCH_OBSERVATIONS} returns, got {}",
                returns.len()
            )));
        }
        if let Some(i) = returns.iter().position(|r| !r.is_finite()) {
            return Err(EngineError::InvalidData(format!("return {i} is not finite")));
        }

        let variance = stats::sample_variance(returns);
        if !(variance > 0.0) {
            return Err(EngineError::DegenerateInput(
                "garch fit undefined for zero-variance returns".into(),
            ));
        }

        let objective = GarchLikelihood {
            returns,
            scale: variance,
            backcast: returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64,
        };
        let constraints = GarchConstraints::new()?;
        let start = [INITIAL_OMEGA_WEIGHT, INITIAL_ALPHA, INITIAL_BETA];

        let minimum = self.minimizer.minimize(&objective, &constraints, &start, &self.policy)?;
        let x = &minimum.point;
        let params = GarchParameters::new(x[0] * variance, x[1], x[2]).map_err(|e| {
            EngineError::Convergence(format!("{} ended outside the stationary region: {e}", self.minimizer.name()))
        })?;

        tracing::debug!(
            omega = params.omega,
            alpha = params.alpha,
            beta = params.beta,
            log_likelihood = -minimum.value,
            iterations = minimum.iterations,
            "garch fit converged"
        );
        Ok(params)
    }

    /// Multi-step conditional vol forecast.
    ///
    ///   sigma^2_1 = omega + alpha * r^2_T + beta * sigma^2_T
    ///   sigma^2_h = omega + (alpha + beta) * sigma^2_{h-1},  h > 1
    pub fn forecast(&self, params: &GarchParameters, returns: &[f64], horizon: usize) -> EngineResult<ForecastPath> {
        if horizon < 1 {
            return Err(EngineError::InvalidArgument("forecast horizon must be >= 1".into()));
        }
        let variances = conditional_variances(params, returns);
        let (Some(&last_return), Some(&last_var)) = (returns.last(), variances.last()) else {
            return Err(EngineError::InsufficientData(
                "forecast needs at least one in-sample return".into(),
            ));
        };

        let persistence = params.persistence();
        let mut steps = Vec::with_capacity(horizon);
        let mut var = params.omega + params.alpha * last_return * last_return + params.beta * last_var;
        steps.push(var.sqrt());
        for _ in 1..horizon {
            var = params.omega + persistence * var;
            steps.push(var.sqrt());
        }
        Ok(ForecastPath { steps })
    }

    /// Fit, forecast and summarize in annualized terms.
    pub fn summarize(&self, returns: &[f64], horizon: usize) -> EngineResult<GarchForecast> {
        if horizon < 1 {
            return Err(EngineError::InvalidArgument("forecast horizon must be >= 1".into()));
        }
        let params = self.fit(returns)?;
        let path = self.forecast(&params, returns, horizon)?;

        let scale = self.periods_per_year.sqrt();
        let current_var = conditional_variances(&params, returns).last().copied().unwrap_or(0.0);
        let current_vol = current_var.sqrt() * scale;
        let forecast_vol = path.terminal().unwrap_or(0.0) * scale;

        let outlook = if forecast_vol > current_vol * OUTLOOK_UP {
            VolOutlook::Increase
        } else if forecast_vol < current_vol * OUTLOOK_DOWN {
            VolOutlook::Decrease
        } else {
            VolOutlook::Stable
        };

        Ok(GarchForecast {
            params,
            horizon,
            current_vol,
            forecast_vol,
            persistence: params.persistence(),
            half_life: params.half_life(),
            outlook,
            path,
        })
    }
}
