use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building a network or reading one of the CSV
/// interchange files. Everything here is fatal and surfaced before any
/// optimization work begins; solver non-success is reported through
/// [`crate::milp::SolveStatus`] instead.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}:{line}: expected a number, found `{token}`")]
    Parse {
        file: String,
        line: usize,
        token: String,
    },
    #[error("{file}:{line}: {expected} values expected, found {found}")]
    RowLength {
        file: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("layer {layer}: weight matrix is {rows}x{cols} but the previous layer has {prev} neurons")]
    Dimension {
        layer: usize,
        rows: usize,
        cols: usize,
        prev: usize,
    },
    #[error("layer {layer}: weight matrix has {rows} rows but bias has length {bias}")]
    BiasMismatch {
        layer: usize,
        rows: usize,
        bias: usize,
    },
    #[error("weight file ends inside a block: {0}")]
    TruncatedFile(String),
    #[error("network has no computed layers")]
    EmptyNetwork,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
