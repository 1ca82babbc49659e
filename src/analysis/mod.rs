pub mod correlation;
pub mod iv_rank;
pub mod premium;

pub use correlation::{
    baseline_correlation, detect_breakout, rolling_correlation, CorrelationConfig, CorrelationLevel,
    CorrelationMatrix, CorrelationMonitor, CorrelationRegime, PairCorrelation, RegimeEntry, ReturnMatrix,
};
pub use iv_rank::{IvPercentile, IvPercentileRanker, IvSignal, IvSignalThresholds};
pub use premium::{
    proxy_premium_history, PremiumScanner, PremiumSignal, ScanEntry, ScanInput, ScanReport, ScannerConfig, Signal,
};
