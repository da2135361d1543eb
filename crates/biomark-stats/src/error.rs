use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("{series} has {actual} values, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("empty input: {0}")]
    Empty(&'static str),
    #[error("model did not converge after {0} iterations")]
    NonConvergence(usize),
    #[error("degenerate data: {0}")]
    Degenerate(String),
}
