/// Domain-specific error types for the volatility engine.
/// Every single-ticker / single-pair computation fails fast with one of these.
/// Batch operations capture them per item and keep going:
/// - an error entry means "no signal could be computed"
/// - it is never folded into a NEUTRAL result
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("convergence error: {0}")]
    Convergence(String),

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    /// Short stable tag for structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData(_) => "insufficient_data",
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Convergence(_) => "convergence",
            Self::DegenerateInput(_) => "degenerate_input",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Parse(_) => "parse",
            Self::Timeout(_) => "timeout",
            Self::Worker(_) => "worker",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_kind() {
        let e = EngineError::InsufficientData("need 20 returns, got 3".into());
        assert_eq!(e.to_string(), "insufficient data: need 20 returns, got 3");
        assert_eq!(e.kind(), "insufficient_data");
    }

    #[test]
    fn test_json_error_maps_to_parse() {
        let err = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
        let e: EngineError = err.into();
        assert_eq!(e.kind(), "parse");
    }
}
