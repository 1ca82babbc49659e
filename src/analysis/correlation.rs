use crate::errors::{EngineError, EngineResult};
use crate::models::stats;
use crate::series::PriceSeries;

/// Aligned return series for a basket of instruments.
///
/// Every column has the same length and covers the same timestamps.
/// Needs at least two instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    labels: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    pub fn new(labels: Vec<String>, columns: Vec<Vec<f64>>) -> EngineResult<Self> {
        if labels.len() != columns.len() {
            return Err(EngineError::InvalidArgument(format!(
                "{} labels for {} return series",
                labels.len(),
                columns.len()
            )));
        }
        if labels.len() < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "correlation needs at least 2 instruments, got {}",
                labels.len()
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(EngineError::InvalidArgument(format!("duplicate instrument {label}")));
            }
        }
        let len = columns[0].len();
        if let Some(i) = columns.iter().position(|c| c.len() != len) {
            return Err(EngineError::InvalidArgument(format!(
                "misaligned series: {} has {} returns, {} has {len}",
                labels[i],
                columns[i].len(),
                labels[0]
            )));
        }
        if let Some(i) = columns.iter().position(|c| c.iter().any(|r| !r.is_finite())) {
            return Err(EngineError::InvalidData(format!("{} has non-finite returns", labels[i])));
        }
        Ok(Self { labels, columns })
    }

    /// Log-return matrix from price series that share the exact same timestamps.
    pub fn from_prices(series: &[(&str, &PriceSeries)]) -> EngineResult<Self> {
        if let Some((first_label, first)) = series.first() {
            for (label, s) in &series[1..] {
                if s.len() != first.len() || !s.timestamps().eq(first.timestamps()) {
                    return Err(EngineError::InvalidArgument(format!(
                        "{label} is not aligned on the timestamps of {first_label}"
                    )));
                }
            }
        }
        Self::new(
            series.iter().map(|(l, _)| l.to_string()).collect(),
            series.iter().map(|(_, s)| s.log_returns()).collect(),
        )
    }

    /// Observations per instrument.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.labels.iter().position(|l| l == label).map(|i| self.columns[i].as_slice())
    }

    /// Index pairs (i, j), i < j, in input order.
    fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.labels.len();
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairCorrelation {
    pub first: String,
    pub second: String,
    /// Pearson coefficient in [-1, 1], or why it could not be computed.
    pub outcome: EngineResult<f64>,
}

impl PairCorrelation {
    pub fn pair_id(&self) -> String {
        format!("{}/{}", self.first, self.second)
    }
}

/// Pairwise correlations over one trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub window: usize,
    pub pairs: Vec<PairCorrelation>,
}

impl CorrelationMatrix {
    /// Lookup in either order.
    pub fn get(&self, a: &str, b: &str) -> Option<&EngineResult<f64>> {
        self.pairs
            .iter()
            .find(|p| (p.first == a && p.second == b) || (p.first == b && p.second == a))
            .map(|p| &p.outcome)
    }
}

/// Pearson correlation of every pair over the trailing `window` returns.
/// A zero-variance pair is reported as `DegenerateInput` without failing the rest.
pub fn rolling_correlation(matrix: &ReturnMatrix, window: usize) -> EngineResult<CorrelationMatrix> {
    if window < 2 {
        return Err(EngineError::InsufficientData(format!(
            "correlation window must be at least 2, got {window}"
        )));
    }
    if window > matrix.len() {
        return Err(EngineError::InsufficientData(format!(
            "correlation window {window} exceeds {} available returns",
            matrix.len()
        )));
    }

    let pairs = matrix
        .pairs()
        .map(|(i, j)| PairCorrelation {
            first: matrix.labels[i].clone(),
            second: matrix.labels[j].clone(),
            outcome: stats::pearson(
                stats::tail(&matrix.columns[i], window),
                stats::tail(&matrix.columns[j], window),
            ),
        })
        .collect();

    Ok(CorrelationMatrix { window, pairs })
}

/// Same as `rolling_correlation`, over the longer reference window.
#[inline]
pub fn baseline_correlation(matrix: &ReturnMatrix, baseline_window: usize) -> EngineResult<CorrelationMatrix> {
    rolling_correlation(matrix, baseline_window)
}

/// True when the recent correlation moved at least `threshold` away from its baseline.
#[inline]
pub fn detect_breakout(rolling: f64, baseline: f64, threshold: f64) -> bool {
    (rolling - baseline).abs() >= threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CorrelationLevel {
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CorrelationRegime {
    pub pair: String,
    pub rolling: f64,
    pub baseline: f64,
    pub is_breakout: bool,
    pub level: CorrelationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeEntry {
    pub pair: String,
    pub outcome: EngineResult<CorrelationRegime>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationConfig {
    pub rolling_window: usize,
    /// Longest baseline; shorter histories use everything available.
    pub baseline_window: usize,
    /// Fewest returns for which a regime is reported at all.
    pub min_history: usize,
    /// Minimum |rolling - baseline| flagged as a regime break.
    pub breakout_threshold: f64,
    /// Rolling correlation at or above this is a HIGH (low diversification) regime.
    pub high_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            rolling_window: 30,
            baseline_window: 252,
            min_history: 120,
            breakout_threshold: 0.20,
            high_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationMonitor {
    config: CorrelationConfig,
}

impl CorrelationMonitor {
    pub fn new(config: CorrelationConfig) -> EngineResult<Self> {
        if config.rolling_window < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "rolling window must be at least 2, got {}",
                config.rolling_window
            )));
        }
        if config.baseline_window < config.rolling_window {
            return Err(EngineError::InvalidArgument(format!(
                "baseline window {} shorter than rolling window {}",
                config.baseline_window, config.rolling_window
            )));
        }
        if config.min_history < config.rolling_window {
            return Err(EngineError::InvalidArgument(format!(
                "min history {} shorter than rolling window {}",
                config.min_history, config.rolling_window
            )));
        }
        if !(config.breakout_threshold > 0.0 && config.breakout_threshold <= 2.0) {
            return Err(EngineError::InvalidArgument(format!(
                "breakout threshold must be in (0, 2], got {}",
                config.breakout_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&config.high_threshold) {
            return Err(EngineError::InvalidArgument(format!(
                "high threshold must be in [-1, 1], got {}",
                config.high_threshold
            )));
        }
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Returns used for the baseline: the configured window, or the whole
    /// history when that is shorter.
    pub fn effective_baseline(&self, available: usize) -> usize {
        self.config.baseline_window.min(available)
    }

    /// Rolling vs baseline regime for every pair. Too little history fails the
    /// call; per-pair problems (zero variance) become error entries.
    pub fn regimes(&self, matrix: &ReturnMatrix) -> EngineResult<Vec<RegimeEntry>> {
        if matrix.len() < self.config.min_history {
            return Err(EngineError::InsufficientData(format!(
                "correlation regimes need {} returns, got {}",
                self.config.min_history,
                matrix.len()
            )));
        }
        let rolling = rolling_correlation(matrix, self.config.rolling_window)?;
        let baseline = baseline_correlation(matrix, self.effective_baseline(matrix.len()))?;

        let entries = rolling
            .pairs
            .iter()
            .zip(&baseline.pairs)
            .map(|(r, b)| {
                let pair = r.pair_id();
                let outcome = match (&r.outcome, &b.outcome) {
                    (Ok(rolling), Ok(baseline)) => Ok(CorrelationRegime {
                        pair: pair.clone(),
                        rolling: *rolling,
                        baseline: *baseline,
                        is_breakout: detect_breakout(*rolling, *baseline, self.config.breakout_threshold),
                        level: if *rolling >= self.config.high_threshold {
                            CorrelationLevel::High
                        } else {
                            CorrelationLevel::Normal
                        },
                    }),
                    (Err(e), _) | (_, Err(e)) => Err(e.clone()),
                };
                if let Err(e) = &outcome {
                    tracing::warn!(pair = %pair, error = %e, "correlation regime unavailable");
                }
                RegimeEntry { pair, outcome }
            })
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    /// Two series with correlation `rho` in each segment: (length, rho).
    fn correlated(segments: &[(usize, f64)], seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = testutil::rng(seed);
        let mut a = Vec::new();
        let mut b = Vec::new();
        for &(n, rho) in segments {
            for _ in 0..n {
                let z1 = testutil::standard_normal(&mut rng);
                let z2 = testutil::standard_normal(&mut rng);
                a.push(0.01 * z1);
                b.push(0.01 * (rho * z1 + (1.0 - rho * rho).sqrt() * z2));
            }
        }
        (a, b)
    }

    fn matrix(a: Vec<f64>, b: Vec<f64>) -> ReturnMatrix {
        ReturnMatrix::new(vec!["TQQQ".into(), "SOXL".into()], vec![a, b]).unwrap()
    }

    #[test]
    fn test_breakout_rule() {
        assert!(detect_breakout(0.9, 0.5, 0.2));
        assert!(!detect_breakout(0.55, 0.5, 0.2));
        assert!(detect_breakout(0.1, 0.5, 0.2), "drops count too");
    }

    #[test]
    fn test_high_correlation_detected() {
        let (a, b) = correlated(&[(300, 0.95)], 42);
        let corr = rolling_correlation(&matrix(a, b), 60).unwrap();
        let rho = *corr.get("SOXL", "TQQQ").unwrap().as_ref().unwrap();
        assert!(rho > 0.80, "rho={rho}");
    }

    #[test]
    fn test_low_correlation() {
        let (a, b) = correlated(&[(300, 0.10)], 99);
        let corr = rolling_correlation(&matrix(a, b), 60).unwrap();
        let rho = *corr.get("TQQQ", "SOXL").unwrap().as_ref().unwrap();
        assert!(rho.abs() < 0.5, "rho={rho}");
    }

    #[test]
    fn test_regime_break() {
        let (a, b) = correlated(&[(250, 0.10), (30, 0.95)], 5);
        let monitor = CorrelationMonitor::new(CorrelationConfig { baseline_window: 280, ..Default::default() }).unwrap();
        let entries = monitor.regimes(&matrix(a, b)).unwrap();
        assert_eq!(entries.len(), 1);
        let regime = entries[0].outcome.as_ref().unwrap();
        assert_eq!(regime.pair, "TQQQ/SOXL");
        assert!(regime.is_breakout, "rolling={} baseline={}", regime.rolling, regime.baseline);
        assert_eq!(regime.level, CorrelationLevel::High);
    }

    #[test]
    fn test_stable_regime() {
        let (a, b) = correlated(&[(300, 0.30)], 123);
        let entries = CorrelationMonitor::default().regimes(&matrix(a, b)).unwrap();
        let regime = entries[0].outcome.as_ref().unwrap();
        assert_eq!(regime.level, CorrelationLevel::Normal);
        assert!(regime.rolling >= -1.0 && regime.rolling <= 1.0);
    }

    #[test]
    fn test_three_instruments_three_pairs() {
        let (a, b) = correlated(&[(300, 0.7)], 1);
        let (c, _) = correlated(&[(300, 0.7)], 2);
        let m = ReturnMatrix::new(vec!["A".into(), "B".into(), "C".into()], vec![a, b, c]).unwrap();
        let entries = CorrelationMonitor::default().regimes(&m).unwrap();
        let pairs: Vec<_> = entries.iter().map(|e| e.pair.as_str()).collect();
        assert_eq!(pairs, vec!["A/B", "A/C", "B/C"]);
    }

    #[test]
    fn test_degenerate_pair_isolated() {
        let (a, b) = correlated(&[(100, 0.5)], 3);
        let m = ReturnMatrix::new(vec!["A".into(), "B".into(), "FLAT".into()], vec![a, b, vec![0.0; 100]]).unwrap();
        let corr = rolling_correlation(&m, 30).unwrap();
        assert!(corr.get("A", "B").unwrap().is_ok());
        assert!(matches!(corr.get("A", "FLAT").unwrap(), Err(EngineError::DegenerateInput(_))));
        let monitor = CorrelationMonitor::new(CorrelationConfig { min_history: 60, ..Default::default() }).unwrap();
        let entries = monitor.regimes(&m).unwrap();
        assert_eq!(entries.iter().filter(|e| e.outcome.is_ok()).count(), 1);
        assert_eq!(entries.iter().filter(|e| e.outcome.is_err()).count(), 2);
    }

    #[test]
    fn test_misaligned_lengths() {
        let err = ReturnMatrix::new(vec!["A".into(), "B".into()], vec![vec![0.1; 10], vec![0.1; 9]]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_single_instrument_rejected() {
        let err = ReturnMatrix::new(vec!["A".into()], vec![vec![0.1; 10]]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_misaligned_timestamps() {
        let a = testutil::prices_from_returns(&testutil::gbm_returns(50, 0.2, 1));
        let closes = a.closes();
        let shifted = PriceSeries::from_daily_closes(testutil::t0() + chrono::Duration::days(1), &closes).unwrap();
        let err = ReturnMatrix::from_prices(&[("A", &a), ("B", &shifted)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let b = testutil::prices_from_returns(&testutil::gbm_returns(50, 0.2, 2));
        let m = ReturnMatrix::from_prices(&[("A", &a), ("B", &b)]).unwrap();
        assert_eq!(m.len(), 50);
        assert_eq!(m.column("B").unwrap(), b.log_returns().as_slice());
    }

    #[test]
    fn test_window_bounds() {
        let (a, b) = correlated(&[(40, 0.5)], 8);
        let m = matrix(a, b);
        assert!(matches!(rolling_correlation(&m, 1), Err(EngineError::InsufficientData(_))));
        assert!(matches!(baseline_correlation(&m, 41), Err(EngineError::InsufficientData(_))));
        assert!(rolling_correlation(&m, 40).is_ok());
        let err = CorrelationMonitor::default().regimes(&m).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)), "40 returns is under the 120 minimum");
    }

    #[test]
    fn test_one_year_uses_full_history_baseline() {
        // 252 bars -> 251 returns, one short of the default baseline window
        let a = testutil::prices_from_returns(&testutil::gbm_returns(251, 0.2, 21));
        let b = testutil::prices_from_returns(&testutil::gbm_returns(251, 0.3, 22));
        assert_eq!(a.len(), 252);
        let m = ReturnMatrix::from_prices(&[("SPY", &a), ("QQQ", &b)]).unwrap();

        let monitor = CorrelationMonitor::default();
        assert_eq!(monitor.effective_baseline(m.len()), 251);
        let entries = monitor.regimes(&m).unwrap();
        let regime = entries[0].outcome.as_ref().unwrap();
        let full = baseline_correlation(&m, 251).unwrap();
        assert_eq!(Some(&Ok(regime.baseline)), full.get("SPY", "QQQ"));
    }

    #[test]
    fn test_config_validation() {
        assert!(CorrelationMonitor::new(CorrelationConfig { rolling_window: 60, baseline_window: 30, ..Default::default() }).is_err());
        assert!(CorrelationMonitor::new(CorrelationConfig { breakout_threshold: 0.0, ..Default::default() }).is_err());
        assert!(CorrelationMonitor::new(CorrelationConfig { min_history: 10, ..Default::default() }).is_err());
    }
}
