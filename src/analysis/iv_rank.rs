use crate::errors::{EngineError, EngineResult};
use crate::models::stats;

/// Default lookback in observations (one trading year).
pub const DEFAULT_IV_LOOKBACK: usize = 252;

/// Where the current IV sits within its own history.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct IvPercentile {
    /// Percentile with ties at their midpoint, in [0, 100].
    pub rank: f64,
    /// Share of history at or below the current IV, in [0, 100].
    pub percent_rank: f64,
    /// Min-max position of the current IV in the history (50 for a flat history).
    pub iv_rank: f64,
    pub current_iv: f64,
    pub high_iv: f64,
    pub low_iv: f64,
    /// Observations actually used.
    pub lookback: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IvSignal {
    Sell,
    Wait,
    Neutral,
}

/// Cutoffs for the stand-alone IV view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvSignalThresholds {
    pub sell_at_or_above: f64,
    pub wait_at_or_below: f64,
}

impl Default for IvSignalThresholds {
    fn default() -> Self {
        Self { sell_at_or_above: 75.0, wait_at_or_below: 25.0 }
    }
}

impl IvPercentile {
    /// Rich IV favors selling, cheap IV favors waiting.
    pub fn signal(&self, thresholds: &IvSignalThresholds) -> IvSignal {
        if self.rank >= thresholds.sell_at_or_above {
            IvSignal::Sell
        } else if self.rank <= thresholds.wait_at_or_below {
            IvSignal::Wait
        } else {
            IvSignal::Neutral
        }
    }
}

/// Percentile ranker over the trailing `lookback` IV observations.
#[derive(Debug, Clone, Copy)]
pub struct IvPercentileRanker {
    lookback: usize,
}

impl Default for IvPercentileRanker {
    fn default() -> Self {
        Self { lookback: DEFAULT_IV_LOOKBACK }
    }
}

impl IvPercentileRanker {
    pub fn new(lookback: usize) -> EngineResult<Self> {
        if lookback == 0 {
            return Err(EngineError::InvalidArgument("iv lookback must be >= 1".into()));
        }
        Ok(Self { lookback })
    }

    #[inline]
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Deterministic: same history and IV always give the same result.
    pub fn rank(&self, iv_history: &[f64], current_iv: f64) -> EngineResult<IvPercentile> {
        if !current_iv.is_finite() || current_iv <= 0.0 {
            return Err(EngineError::InvalidData(format!(
                "current iv must be positive and finite, got {current_iv}"
            )));
        }
        let window = stats::tail(iv_history, self.lookback);
        if window.is_empty() {
            return Err(EngineError::InsufficientData("iv history is empty".into()));
        }

        let rank = stats::percentile_rank(window, current_iv)?;
        let percent_rank = stats::percent_rank(window, current_iv)?;

        let high_iv = stats::max(window);
        let low_iv = stats::min(window);
        let range = high_iv - low_iv;
        let iv_rank = if range > 0.0 {
            ((current_iv - low_iv) / range * 100.0).clamp(0.0, 100.0)
        } else {
            50.0
        };

        Ok(IvPercentile {
            rank,
            percent_rank,
            iv_rank,
            current_iv,
            high_iv,
            low_iv,
            lookback: window.len(),
        })
    }
}
