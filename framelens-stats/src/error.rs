use thiserror::Error;

/// Errors raised by analysis functions when the input cannot be scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A configuration value or argument is out of its valid range
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
