use crate::analysis::correlation::CorrelationRegime;
use crate::analysis::iv_rank::{IvPercentile, IvSignal};
use crate::analysis::premium::{PremiumSignal, ScanReport, Signal};
use crate::errors::{EngineError, EngineResult};
use crate::models::garch::GarchForecast;
use crate::models::volatility::VolEstimate;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Outcome envelope ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(e: &EngineError) -> Self {
        Self { kind: e.kind(), message: e.to_string() }
    }
}

/// Serialized form of an `EngineResult`: `status` plus either `value` or `error`.
/// An error entry means no result could be computed; it is never a neutral reading.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

impl<T> From<EngineResult<T>> for Outcome<T> {
    fn from(result: EngineResult<T>) -> Self {
        match result {
            Ok(value) => Self { status: Status::Ok, value: Some(value), error: None },
            Err(e) => Self { status: Status::Error, value: None, error: Some(ErrorReport::from(&e)) },
        }
    }
}

// ── Per-ticker output ──

#[derive(Debug, Clone, Serialize)]
pub struct IvView {
    #[serde(flatten)]
    pub percentile: IvPercentile,
    pub signal: IvSignal,
}

/// Everything computed for one ticker. Each section succeeds or fails on its own.
#[derive(Debug, Clone)]
pub struct TickerAnalysis {
    pub close_to_close: EngineResult<VolEstimate>,
    pub parkinson: EngineResult<VolEstimate>,
    pub iv: EngineResult<IvView>,
    pub premium: EngineResult<PremiumSignal>,
    pub garch: EngineResult<GarchForecast>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickerSections {
    pub close_to_close: Outcome<VolEstimate>,
    pub parkinson: Outcome<VolEstimate>,
    pub iv: Outcome<IvView>,
    pub premium: Outcome<PremiumSignal>,
    pub garch: Outcome<GarchForecast>,
}

impl From<TickerAnalysis> for TickerSections {
    fn from(a: TickerAnalysis) -> Self {
        Self {
            close_to_close: a.close_to_close.into(),
            parkinson: a.parkinson.into(),
            iv: a.iv.into(),
            premium: a.premium.into(),
            garch: a.garch.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickerReport {
    pub ticker: String,
    #[serde(flatten)]
    pub outcome: Outcome<TickerSections>,
}

// ── Correlation output ──

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub pair: String,
    #[serde(flatten)]
    pub outcome: Outcome<CorrelationRegime>,
}

// ── Run summary ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalCounts {
    pub sell: usize,
    pub neutral: usize,
    pub avoid: usize,
    pub no_signal: usize,
}

impl SignalCounts {
    pub fn from_scan(scan: &ScanReport) -> Self {
        let mut counts = Self::default();
        for entry in &scan.entries {
            match &entry.outcome {
                Ok(s) => match s.signal {
                    Signal::Sell => counts.sell += 1,
                    Signal::Neutral => counts.neutral += 1,
                    Signal::Avoid => counts.avoid += 1,
                },
                Err(_) => counts.no_signal += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedSignal {
    pub ticker: String,
    pub premium: f64,
    pub premium_pct: f64,
    pub signal: Signal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub signals: SignalCounts,
    /// Successful premium signals, largest premium first.
    pub ranked: Vec<RankedSignal>,
    pub tickers: Vec<TickerReport>,
    pub correlation: Outcome<Vec<PairReport>>,
}

impl RunReport {
    pub fn new(
        generated_at: DateTime<Utc>,
        scan: &ScanReport,
        tickers: Vec<TickerReport>,
        correlation: Outcome<Vec<PairReport>>,
    ) -> Self {
        let ranked = scan
            .ranked()
            .into_iter()
            .map(|s| RankedSignal {
                ticker: s.ticker.clone(),
                premium: s.premium,
                premium_pct: s.premium_pct,
                signal: s.signal,
            })
            .collect();
        Self { generated_at, signals: SignalCounts::from_scan(scan), ranked, tickers, correlation }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::premium::ScanEntry;

    fn signal(ticker: &str, premium: f64, signal: Signal) -> PremiumSignal {
        PremiumSignal {
            ticker: ticker.into(),
            iv: 0.2 + premium,
            rv: 0.2,
            premium,
            premium_pct: 50.0,
            iv_percentile: 50.0,
            signal,
        }
    }

    #[test]
    fn test_error_outcome_is_not_neutral() {
        let out: Outcome<PremiumSignal> = Err(EngineError::InsufficientData("empty iv history".into())).into();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "insufficient_data");
        assert!(json.get("value").is_none());
        assert!(!out.is_ok());
    }

    #[test]
    fn test_ticker_report_shape() {
        let report = TickerReport {
            ticker: "SPY".into(),
            outcome: Err(EngineError::Timeout("SPY exceeded 30s".into())).into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ticker"], "SPY");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "timeout");
    }

    #[test]
    fn test_run_report_ranking_and_counts() {
        let scan = ScanReport {
            entries: vec![
                ScanEntry { ticker: "A".into(), outcome: Ok(signal("A", 0.01, Signal::Neutral)) },
                ScanEntry { ticker: "B".into(), outcome: Ok(signal("B", 0.08, Signal::Sell)) },
                ScanEntry { ticker: "C".into(), outcome: Ok(signal("C", -0.02, Signal::Avoid)) },
                ScanEntry { ticker: "D".into(), outcome: Err(EngineError::InvalidData("bad bar".into())) },
            ],
        };
        let report = RunReport::new(Utc::now(), &scan, Vec::new(), Outcome::from(Ok::<_, EngineError>(Vec::new())));

        assert_eq!(report.signals, SignalCounts { sell: 1, neutral: 1, avoid: 1, no_signal: 1 });
        let order: Vec<_> = report.ranked.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["ranked"][0]["signal"], "SELL");
        assert_eq!(json["correlation"]["status"], "ok");
    }
}
