use crate::analysis::premium::{proxy_premium_history, ScanInput};
use crate::errors::{EngineError, EngineResult};
use crate::models::volatility::RealizedVolEstimator;
use crate::series::{IvHistory, IvObservation, PriceBar, PriceSeries};
use std::path::Path;

/// Window of the realized-vol series used as a stand-in IV history.
pub const PROXY_IV_WINDOW: usize = 20;

/// Already-fetched market data for one batch run.
///
/// Read from a JSON file (bars, optional IV and premium
/// histories per ticker). Loading it is the only I/O the batch job does.
/// Each ticker is validated on its own so one bad ticker never sinks the file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Snapshot {
    pub tickers: Vec<TickerSnapshot>,
}

/// Raw per-ticker record, exactly as found in the file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TickerSnapshot {
    pub ticker: String,
    #[serde(default)]
    pub current_iv: Option<f64>,
    pub bars: Vec<PriceBar>,
    #[serde(default)]
    pub iv_history: Option<Vec<IvObservation>>,
    #[serde(default)]
    pub premium_history: Option<Vec<f64>>,
}

pub async fn load_snapshot(path: &Path) -> EngineResult<Snapshot> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
    let snapshot = parse_snapshot(&raw)?;
    tracing::info!(path = %path.display(), tickers = snapshot.tickers.len(), "snapshot loaded");
    Ok(snapshot)
}

pub fn parse_snapshot(raw: &str) -> EngineResult<Snapshot> {
    Ok(serde_json::from_str(raw)?)
}

impl TickerSnapshot {
    /// Validate into scanner input, filling gaps with proxies:
    ///   no IV history   -> rolling HV(20) series on the bar timestamps
    ///   no current IV   -> latest IV history value
    ///   no premium hist -> HV(10) - HV(30) distribution (omitted if too short)
    pub fn into_scan_input(self, estimator: &RealizedVolEstimator) -> EngineResult<ScanInput> {
        let prices = PriceSeries::new(self.bars)?;

        let iv_history = match self.iv_history {
            Some(observations) if !observations.is_empty() => IvHistory::new(observations)?,
            _ => {
                tracing::debug!(ticker = %self.ticker, "no iv history, using realized vol proxy");
                proxy_iv_history(estimator, &prices)?
            }
        };

        let current_iv = match self.current_iv {
            Some(iv) => iv,
            None => iv_history.latest().ok_or_else(|| {
                EngineError::InsufficientData(format!("{}: no current iv and no iv history", self.ticker))
            })?,
        };

        let premium_history = match self.premium_history {
            Some(history) => Some(history),
            None => proxy_premium_history(estimator, &prices).ok(),
        };

        Ok(ScanInput { ticker: self.ticker, current_iv, prices, iv_history, premium_history })
    }
}

/// Rolling HV(20) readings stamped with the bar that closes each window.
pub fn proxy_iv_history(estimator: &RealizedVolEstimator, prices: &PriceSeries) -> EngineResult<IvHistory> {
    let hv = estimator.rolling_close_to_close(prices, PROXY_IV_WINDOW)?;
    let skip = prices.len() - hv.len();
    let observations = prices
        .timestamps()
        .skip(skip)
        .zip(hv)
        // a flat stretch gives zero HV, which is not a usable IV reading
        .filter(|(_, iv)| *iv > 0.0)
        .map(|(timestamp, iv)| IvObservation { timestamp, iv })
        .collect();
    IvHistory::new(observations)
}
