use crate::analysis::iv_rank::{IvPercentileRanker, DEFAULT_IV_LOOKBACK};
use crate::errors::{EngineError, EngineResult};
use crate::models::stats;
use crate::models::volatility::RealizedVolEstimator;
use crate::series::{IvHistory, PriceSeries};

/// Percentile reported when no premium history is available.
const NEUTRAL_PREMIUM_PCT: f64 = 50.0;

/// Windows for the proxy premium distribution (fast HV minus slow HV).
const PROXY_FAST_WINDOW: usize = 10;
const PROXY_SLOW_WINDOW: usize = 30;
const PROXY_MIN_POINTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Sell,
    Neutral,
    Avoid,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Avoid => write!(f, "AVOID"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PremiumSignal {
    pub ticker: String,
    pub iv: f64,
    pub rv: f64,
    pub premium: f64,
    pub premium_pct: f64,
    pub iv_percentile: f64,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScannerConfig {
    /// Realized-vol window in returns.
    pub rv_window: usize,
    /// Trailing premium observations used for premium_pct.
    pub premium_lookback: usize,
    /// Trailing IV observations used for iv_percentile.
    pub iv_lookback: usize,
    pub sell_premium_pct: f64,
    pub sell_iv_percentile: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            rv_window: 20,
            premium_lookback: 252,
            iv_lookback: DEFAULT_IV_LOOKBACK,
            sell_premium_pct: 70.0,
            sell_iv_percentile: 60.0,
        }
    }
}

impl ScannerConfig {
    pub fn classify(&self, premium: f64, premium_pct: f64, iv_percentile: f64) -> Signal {
        if premium < 0.0 {
            Signal::Avoid
        } else if premium_pct >= self.sell_premium_pct && iv_percentile >= self.sell_iv_percentile {
            Signal::Sell
        } else {
            Signal::Neutral
        }
    }
}

/// Everything needed to scan one ticker.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub ticker: String,
    pub current_iv: f64,
    pub prices: PriceSeries,
    pub iv_history: IvHistory,
    pub premium_history: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub ticker: String,
    pub outcome: EngineResult<PremiumSignal>,
}

/// Batch result: one entry per input ticker, in input order.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
}

impl ScanReport {
    pub fn successes(&self) -> impl Iterator<Item = &PremiumSignal> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e.ticker.as_str(), err)))
    }

    /// Successful signals, best selling opportunities (largest premium) first.
    pub fn ranked(&self) -> Vec<&PremiumSignal> {
        let mut out: Vec<_> = self.successes().collect();
        out.sort_by(|a, b| b.premium.total_cmp(&a.premium));
        out
    }
}

/// Volatility risk premium scanner.
///
/// premium     = current IV - realized vol
/// premium_pct = percentile of today's premium within its own history (50 if none)
///
/// Signal policy (thresholds in `ScannerConfig`):
///   AVOID    premium < 0 (IV below RV, no selling edge)
///   SELL     premium_pct >= 70 and iv_percentile >= 60
///   NEUTRAL  otherwise
///
/// Every ticker is scored by a pure function of its own inputs, so a batch can
/// be split across threads with no coordination.
#[derive(Debug, Clone, Copy)]
pub struct PremiumScanner {
    config: ScannerConfig,
    estimator: RealizedVolEstimator,
    ranker: IvPercentileRanker,
}

impl Default for PremiumScanner {
    fn default() -> Self {
        Self {
            config: ScannerConfig::default(),
            estimator: RealizedVolEstimator::default(),
            ranker: IvPercentileRanker::default(),
        }
    }
}

impl PremiumScanner {
    pub fn new(config: ScannerConfig) -> EngineResult<Self> {
        if config.premium_lookback == 0 {
            return Err(EngineError::InvalidArgument("premium lookback must be >= 1".into()));
        }
        for (name, v) in [
            ("sell_premium_pct", config.sell_premium_pct),
            ("sell_iv_percentile", config.sell_iv_percentile),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(EngineError::InvalidArgument(format!("{name} must be in [0, 100], got {v}")));
            }
        }
        Ok(Self {
            config,
            estimator: RealizedVolEstimator::default(),
            ranker: IvPercentileRanker::new(config.iv_lookback)?,
        })
    }

    #[inline]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Full scan for one ticker: realized vol from prices, then `evaluate`.
    pub fn scan(
        &self,
        ticker: &str,
        current_iv: f64,
        prices: &PriceSeries,
        iv_history: &[f64],
        premium_history: Option<&[f64]>,
    ) -> EngineResult<PremiumSignal> {
        let rv = self.estimator.close_to_close(prices, self.config.rv_window)?;
        self.evaluate(ticker, current_iv, rv.annualized_vol, premium_history, iv_history)
    }

    /// Scoring step once realized vol is known.
    pub fn evaluate(
        &self,
        ticker: &str,
        iv: f64,
        rv: f64,
        premium_history: Option<&[f64]>,
        iv_history: &[f64],
    ) -> EngineResult<PremiumSignal> {
        if !rv.is_finite() || rv < 0.0 {
            return Err(EngineError::InvalidData(format!("realized vol must be >= 0, got {rv}")));
        }
        let iv_percentile = self.ranker.rank(iv_history, iv)?.rank;

        let premium = iv - rv;
        let premium_pct = match premium_history {
            Some(history) if !history.is_empty() => {
                stats::percentile_rank(stats::tail(history, self.config.premium_lookback), premium)?
            }
            _ => NEUTRAL_PREMIUM_PCT,
        };

        Ok(PremiumSignal {
            ticker: ticker.to_string(),
            iv,
            rv,
            premium,
            premium_pct,
            iv_percentile,
            signal: self.config.classify(premium, premium_pct, iv_percentile),
        })
    }

    /// Scan every input independently. A failing ticker becomes an error
    /// entry; it never aborts the rest of the batch.
    pub fn scan_many(&self, inputs: &[ScanInput]) -> ScanReport {
        let entries = inputs
            .iter()
            .map(|input| {
                let outcome = self.scan(
                    &input.ticker,
                    input.current_iv,
                    &input.prices,
                    &input.iv_history.values(),
                    input.premium_history.as_deref(),
                );
                if let Err(e) = &outcome {
                    tracing::warn!(ticker = %input.ticker, error = %e, "premium scan failed");
                }
                ScanEntry { ticker: input.ticker.clone(), outcome }
            })
            .collect();
        ScanReport { entries }
    }
}

/// Proxy premium distribution when no real one exists:
/// HV(10) - HV(30), aligned on their common tail.
pub fn proxy_premium_history(estimator: &RealizedVolEstimator, prices: &PriceSeries) -> EngineResult<Vec<f64>> {
    let fast = estimator.rolling_close_to_close(prices, PROXY_FAST_WINDOW)?;
    let slow = estimator.rolling_close_to_close(prices, PROXY_SLOW_WINDOW)?;
    let n = fast.len().min(slow.len());
    if n < PROXY_MIN_POINTS {
        return Err(EngineError::InsufficientData(format!(
            "proxy premium history needs {PROXY_MIN_POINTS} points, got {n}"
        )));
    }
    Ok(stats::tail(&fast, n)
        .iter()
        .zip(stats::tail(&slow, n))
        .map(|(f, s)| f - s)
        .collect())
}
