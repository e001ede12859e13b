//! Error types for voxelfit

use thiserror::Error;

/// A specific deficiency found when checking a protocol against a model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ProtocolProblem {
    /// A protocol column required by the model is absent.
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },
    /// The protocol has fewer distinct b-value shells than the model needs.
    TooFewShells {
        /// Minimum number of shells required by the model.
        required: usize,
        /// Number of shells found in the protocol.
        found: usize,
    },
    /// The protocol has fewer unweighted measurements than the model needs.
    TooFewUnweighted {
        /// Minimum number of unweighted rows required by the model.
        required: usize,
        /// Number of unweighted rows found in the protocol.
        found: usize,
    },
}

impl std::fmt::Display for ProtocolProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolProblem::MissingColumn { column } => {
                write!(f, "missing protocol column '{column}'")
            }
            ProtocolProblem::TooFewShells { required, found } => {
                write!(f, "model requires at least {required} b-value shell(s), found {found}")
            }
            ProtocolProblem::TooFewUnweighted { required, found } => {
                write!(f, "model requires at least {required} unweighted row(s), found {found}")
            }
        }
    }
}

fn join_problems(problems: &[ProtocolProblem]) -> String {
    problems.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("; ")
}

/// voxelfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A cascade model was passed where only composite models are accepted.
    #[error("model '{0}' is a cascade and cannot be sampled directly")]
    UnsupportedModelKind(String),

    /// The protocol does not satisfy the model's requirements.
    ///
    /// Carries the full list of deficiencies so callers can report every
    /// problem at once instead of one per invocation.
    #[error("insufficient protocol: {}", join_problems(.0))]
    InsufficientProtocol(Vec<ProtocolProblem>),

    /// Initialization was requested but no maps could be resolved.
    #[error("no initialization maps found in {0}")]
    NoInitializationMapsFound(String),

    /// A requested compute device index is outside the enumerated list.
    #[error("invalid device index {index}: {available} device(s) available")]
    InvalidDeviceIndex {
        /// The out-of-range index.
        index: usize,
        /// Number of devices actually available.
        available: usize,
    },

    /// Array or matrix dimensions do not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
