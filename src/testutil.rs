// ── Deterministic synthetic market data for unit tests ──

use crate::series::{IvHistory, IvObservation, PriceBar, PriceSeries};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Seeded generator; same seed, same data on every platform.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn standard_normal(rng: &mut StdRng) -> f64 {
    StandardNormal.sample(rng)
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
}

/// Daily log-returns of a GBM with annualized volatility `sigma`.
pub fn gbm_returns(n: usize, sigma: f64, seed: u64) -> Vec<f64> {
    let dt: f64 = 1.0 / 252.0;
    let mut rng = rng(seed);
    (0..n)
        .map(|_| -0.5 * sigma * sigma * dt + sigma * dt.sqrt() * standard_normal(&mut rng))
        .collect()
}

/// Returns simulated from a GARCH(1,1) process with normal innovations.
pub fn garch_returns(n: usize, omega: f64, alpha: f64, beta: f64, seed: u64) -> Vec<f64> {
    let mut rng = rng(seed);
    let mut var = omega / (1.0 - alpha - beta);
    let mut out = Vec::with_capacity(n);
    let mut prev = 0.0;
    for i in 0..n {
        if i > 0 {
            var = omega + alpha * prev * prev + beta * var;
        }
        let r = var.sqrt() * standard_normal(&mut rng);
        out.push(r);
        prev = r;
    }
    out
}

/// Close-only price series (open = high = low = close) from log-returns.
pub fn prices_from_returns(returns: &[f64]) -> PriceSeries {
    let mut closes = Vec::with_capacity(returns.len() + 1);
    let mut px = 100.0;
    closes.push(px);
    for r in returns {
        px *= r.exp();
        closes.push(px);
    }
    PriceSeries::from_daily_closes(t0(), &closes).unwrap()
}

/// OHLC series with a random intraday range around each close.
pub fn ohlc_series(n: usize, seed: u64) -> PriceSeries {
    let returns = gbm_returns(n, 0.25, seed);
    let mut rng = rng(seed ^ 0xABCD);
    let mut px = 100.0;
    let bars = returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            px *= r.exp();
            let up = standard_normal(&mut rng).abs() * 0.01 * px;
            let down = standard_normal(&mut rng).abs() * 0.01 * px;
            PriceBar {
                timestamp: t0() + Duration::days(i as i64),
                open: px,
                high: px + up,
                low: (px - down).max(px * 0.5),
                close: px,
            }
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

pub fn iv_history(values: &[f64]) -> IvHistory {
    IvHistory::new(
        values
            .iter()
            .enumerate()
            .map(|(i, &iv)| IvObservation { timestamp: t0() + Duration::days(i as i64), iv })
            .collect(),
    )
    .unwrap()
}
