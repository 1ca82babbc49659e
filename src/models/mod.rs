pub mod garch;
pub mod optimizer;
pub mod stats;
pub mod volatility;

pub use garch::{ForecastPath, GarchForecast, GarchForecaster, GarchParameters, VolOutlook};
pub use optimizer::{BoxConstraints, Bounds, ConvergencePolicy, Minimizer, NelderMead, Objective};
pub use volatility::{EstimatorKind, RealizedVolEstimator, VolEstimate, TRADING_DAYS_PER_YEAR};
