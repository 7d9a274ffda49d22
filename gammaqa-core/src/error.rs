use std::path::PathBuf;

use thiserror::Error;

use crate::fluence::grid::Shape;

#[derive(Error, Debug)]
pub enum GammaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error in {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("fluence maps are not co-registered: reference {reference}, evaluated {evaluated}")]
    DimensionMismatch { reference: Shape, evaluated: Shape },

    #[error("no sample above the low-dose threshold; pass rate is undefined")]
    EmptyEvaluableSet,

    #[error("session has no scored beams")]
    EmptySession,

    #[error("invalid gamma parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid fluence map: {0}")]
    InvalidMap(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot derive patient id: {0}")]
    PatientId(String),

    #[error("unknown location {0:?}")]
    UnknownLocation(String),

    #[error("beam {beam} failed: {source}")]
    Beam {
        beam: String,
        #[source]
        source: Box<GammaError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of the persistence step only; the computed result stays valid.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("permission denied writing {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            StoreError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::WriteFailed {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, GammaError>;
