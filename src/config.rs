use crate::analysis::correlation::CorrelationConfig;
use crate::analysis::premium::ScannerConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::optimizer::ConvergencePolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub snapshot_path: PathBuf,
    pub scanner: ScannerConfig,
    pub correlation: CorrelationConfig,
    pub garch_policy: ConvergencePolicy,
    pub garch_horizon: usize,
    /// Wall-clock budget for one ticker's analysis.
    pub ticker_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let scanner_defaults = ScannerConfig::default();
        let scanner = ScannerConfig {
            rv_window: env_parse_or("RV_WINDOW", scanner_defaults.rv_window)?,
            premium_lookback: env_parse_or("PREMIUM_LOOKBACK", scanner_defaults.premium_lookback)?,
            iv_lookback: env_parse_or("IV_LOOKBACK", scanner_defaults.iv_lookback)?,
            sell_premium_pct: env_parse_or("SELL_PREMIUM_PCT", scanner_defaults.sell_premium_pct)?,
            sell_iv_percentile: env_parse_or("SELL_IV_PERCENTILE", scanner_defaults.sell_iv_percentile)?,
        };

        let corr_defaults = CorrelationConfig::default();
        let correlation = CorrelationConfig {
            rolling_window: env_parse_or("CORR_WINDOW", corr_defaults.rolling_window)?,
            baseline_window: env_parse_or("CORR_BASELINE_WINDOW", corr_defaults.baseline_window)?,
            min_history: env_parse_or("CORR_MIN_HISTORY", corr_defaults.min_history)?,
            breakout_threshold: env_parse_or("CORR_BREAKOUT_THRESHOLD", corr_defaults.breakout_threshold)?,
            high_threshold: env_parse_or("CORR_HIGH_THRESHOLD", corr_defaults.high_threshold)?,
        };

        let policy_defaults = ConvergencePolicy::default();
        let garch_policy = ConvergencePolicy {
            max_iterations: env_parse_or("GARCH_MAX_ITERATIONS", policy_defaults.max_iterations)?,
            f_tolerance: env_parse_or("GARCH_TOLERANCE", policy_defaults.f_tolerance)?,
            ..policy_defaults
        };

        let garch_horizon = env_parse_or("GARCH_HORIZON", 10usize)?;
        if garch_horizon == 0 {
            return Err(EngineError::Config("GARCH_HORIZON: must be >= 1".into()));
        }

        let timeout_secs = env_parse_or("TICKER_TIMEOUT_SECS", 30u64)?;

        Ok(Self {
            snapshot_path: PathBuf::from(env_var("VOL_SNAPSHOT_PATH")?),
            scanner,
            correlation,
            garch_policy,
            garch_horizon,
            ticker_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn env_var(key: &str) -> EngineResult<String> {
    std::env::var(key).map_err(|_| EngineError::Config(format!("missing env var: {key}")))
}

fn env_parse_or<T>(key: &str, default: T) -> EngineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> EngineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("{key}: {e}")))
}
