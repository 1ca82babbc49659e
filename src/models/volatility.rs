use crate::errors::{EngineError, EngineResult};
use crate::models::stats;
use crate::series::PriceSeries;
use std::f64::consts::LN_2;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Smallest window for which a sample dispersion is defined.
const MIN_WINDOW: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    CloseToClose,
    Parkinson,
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CloseToClose => write!(f, "close-to-close"),
            Self::Parkinson => write!(f, "parkinson"),
        }
    }
}

/// One realized-vol reading. Produced fresh per call.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct VolEstimate {
    pub annualized_vol: f64,
    pub window: usize,
    pub kind: EstimatorKind,
}

/// Realized volatility estimators over a trailing window.
/// Stateless apart from the annualization factor; every method is pure.
#[derive(Debug, Clone, Copy)]
pub struct RealizedVolEstimator {
    periods_per_year: f64,
}

impl Default for RealizedVolEstimator {
    fn default() -> Self {
        Self { periods_per_year: TRADING_DAYS_PER_YEAR }
    }
}

impl RealizedVolEstimator {
    pub fn new(periods_per_year: f64) -> EngineResult<Self> {
        if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "periods_per_year must be positive, got {periods_per_year}"
            )));
        }
        Ok(Self { periods_per_year })
    }

    #[inline]
    pub fn periods_per_year(&self) -> f64 {
        self.periods_per_year
    }

    /// Sample std-dev of the trailing `window` log-returns, times sqrt(periods/year).
    pub fn close_to_close(&self, prices: &PriceSeries, window: usize) -> EngineResult<VolEstimate> {
        check_window(window)?;
        let returns = prices.log_returns();
        if returns.len() < window {
            return Err(EngineError::InsufficientData(format!(
                "close-to-close needs {window} returns, got {}",
                returns.len()
            )));
        }

        let recent = stats::tail(&returns, window);
        Ok(VolEstimate {
            annualized_vol: stats::sample_std_dev(recent) * self.periods_per_year.sqrt(),
            window,
            kind: EstimatorKind::CloseToClose,
        })
    }

    /// High-low range estimator:
    ///
    /// sigma = sqrt( periods / (4 ln 2) * mean( ln(H/L)^2 ) )
    ///
    /// A bar with high == low contributes exactly zero.
    pub fn parkinson(&self, prices: &PriceSeries, window: usize) -> EngineResult<VolEstimate> {
        check_window(window)?;
        if prices.len() < window {
            return Err(EngineError::InsufficientData(format!(
                "parkinson needs {window} bars, got {}",
                prices.len()
            )));
        }

        let bars = &prices.bars()[prices.len() - window..];
        let mut sum_sq = 0.0;
        for bar in bars {
            if bar.high < bar.low {
                return Err(EngineError::InvalidData(format!(
                    "bar at {}: high {} below low {}",
                    bar.timestamp, bar.high, bar.low
                )));
            }
            let range = (bar.high / bar.low).ln();
            sum_sq += range * range;
        }

        let factor = 1.0 / (4.0 * LN_2);
        let variance = factor * sum_sq / window as f64;
        Ok(VolEstimate {
            annualized_vol: (variance * self.periods_per_year).sqrt(),
            window,
            kind: EstimatorKind::Parkinson,
        })
    }

    /// Annualized close-to-close vol at every point with a full window of returns.
    /// Element `i` covers returns `i..i + window`; length is `returns - window + 1`.
    pub fn rolling_close_to_close(&self, prices: &PriceSeries, window: usize) -> EngineResult<Vec<f64>> {
        check_window(window)?;
        let returns = prices.log_returns();
        if returns.len() < window {
            return Err(EngineError::InsufficientData(format!(
                "rolling vol needs {window} returns, got {}",
                returns.len()
            )));
        }

        let scale = self.periods_per_year.sqrt();
        Ok(returns
            .windows(window)
            .map(|w| stats::sample_std_dev(w) * scale)
            .collect())
    }
}

#[inline]
fn check_window(window: usize) -> EngineResult<()> {
    if window < MIN_WINDOW {
        return Err(EngineError::InsufficientData(format!(
            "window must be at least {MIN_WINDOW}, got {window}"
        )));
    }
    Ok(())
}
