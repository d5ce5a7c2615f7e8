//! Error types shared by every part of the engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A topology or construction mistake, raised before training runs.
    Configuration,
    /// A caller violated the propagate/backpropagate/correct lifecycle.
    Usage,
    /// A numeric strategy was evaluated outside its domain.
    Numeric,
    /// Reading or parsing an external file failed.
    Io,
}

/// Every failure the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} must be greater than zero")]
    ZeroSize { what: &'static str },
    #[error("receptive field must not be empty")]
    EmptyReceptiveField,
    #[error("{what}: expected {expected}, found {found}")]
    SizeConflict {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("receptive field offset #{offset} falls out of bounds on stride #{stride}")]
    ReceptiveFieldOutOfBounds { offset: usize, stride: usize },
    #[error("input position #{position} is never visited by the receptive field")]
    UncoveredInput { position: usize },
    #[error("cannot bind a new input without clearing the current one")]
    InputOverride,
    #[error("cannot bind a new output without clearing the current one")]
    OutputOverride,
    #[error("node {channel}x{position} does not exist in the bound grid")]
    MissingNode { channel: usize, position: usize },
    #[error("output node #{position} does not exist in the bound slice")]
    MissingOutput { position: usize },
    #[error("layer is already claimed as input by another layer")]
    LayerClaimed,
    #[error("layer has no input layer connected")]
    NotConnected,
    #[error("input layer must not own kernels")]
    InputLayerKernels,
    #[error("a network needs at least {0} layers")]
    TooFewLayers(usize),
    #[error("invalid scaling factors: {0}")]
    InvalidFactor(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("noise rate must lie in [0, 1], got {0}")]
    InvalidRate(f64),

    #[error("input must be bound before propagating")]
    InputUnbound,
    #[error("output must be bound before propagating")]
    OutputUnbound,
    #[error("correction requested with no accumulated deltas")]
    NoDeltas,
    #[error("shuffle buffer is empty")]
    EmptyBuffer,
    #[error("scaling factors must be fitted before scaling data")]
    UnfittedScale,
    #[error("data shape {found:?} does not match expected shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("cross-entropy activation must lie in (0, 1), got {0}")]
    CrossEntropyActivation(f64),
    #[error("cross-entropy target must lie in [0, 1], got {0}")]
    CrossEntropyTarget(f64),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the broad class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use self::Error::*;
        match self {
            InputUnbound | OutputUnbound | NoDeltas | EmptyBuffer
            | UnfittedScale | ShapeMismatch { .. } => ErrorKind::Usage,
            CrossEntropyActivation(_) | CrossEntropyTarget(_) => {
                ErrorKind::Numeric
            }
            Io(_) | Json(_) => ErrorKind::Io,
            _ => ErrorKind::Configuration,
        }
    }
}
