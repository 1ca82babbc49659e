use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Duration, Utc};

// ── Price data ──

/// One OHLC bar. Plain data, validated by `PriceSeries::new`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Validated OHLC time series.
///
/// Timestamps are strictly increasing and every price is positive and finite.
/// Immutable once built; estimators only borrow it.
/// An empty series is allowed here and rejected by the estimators that need data.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> EngineResult<Self> {
        for (i, bar) in bars.iter().enumerate() {
            for (name, px) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
            ] {
                if !px.is_finite() || px <= 0.0 {
                    return Err(EngineError::InvalidData(format!(
                        "bar {i}: {name} price must be positive and finite, got {px}"
                    )));
                }
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(EngineError::InvalidData(format!(
                    "bar {i}: timestamp {} is not after {}",
                    bar.timestamp,
                    bars[i - 1].timestamp
                )));
            }
        }
        Ok(Self { bars })
    }

    /// Build a daily series from closes only (open = high = low = close).
    pub fn from_daily_closes(start: DateTime<Utc>, closes: &[f64]) -> EngineResult<Self> {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
            })
            .collect();
        Self::new(bars)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.bars.iter().map(|b| b.timestamp)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Log-returns of consecutive closes. Length is `len() - 1` (or 0).
    /// Recomputed on every call, never cached.
    pub fn log_returns(&self) -> Vec<f64> {
        self.bars
            .windows(2)
            .map(|w| (w[1].close / w[0].close).ln())
            .collect()
    }
}

// ── Implied volatility history ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IvObservation {
    pub timestamp: DateTime<Utc>,
    pub iv: f64,
}

/// Validated (timestamp, IV) history for one ticker.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct IvHistory {
    observations: Vec<IvObservation>,
}

impl IvHistory {
    pub fn new(observations: Vec<IvObservation>) -> EngineResult<Self> {
        for (i, obs) in observations.iter().enumerate() {
            if !obs.iv.is_finite() || obs.iv <= 0.0 {
                return Err(EngineError::InvalidData(format!(
                    "iv observation {i}: must be positive and finite, got {}",
                    obs.iv
                )));
            }
            if i > 0 && obs.timestamp <= observations[i - 1].timestamp {
                return Err(EngineError::InvalidData(format!(
                    "iv observation {i}: timestamp {} is not after {}",
                    obs.timestamp,
                    observations[i - 1].timestamp
                )));
            }
        }
        Ok(Self { observations })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.iv).collect()
    }

    pub fn latest(&self) -> Option<f64> {
        self.observations.last().map(|o| o.iv)
    }
}
