#![forbid(unsafe_code)]

pub mod config;
pub mod decode;
pub mod domain;
pub mod error;
pub mod patient;
pub mod session;

pub mod fluence {
    pub mod grid;
}

pub mod gamma {
    pub mod engine;
    pub mod params;
}

pub mod store {
    pub mod file;
    pub mod render;
    pub mod schema;
}

// Re-exports: stable API surface
pub use config::{Config, Technique};
pub use decode::{DecodedBeam, FluenceFileDecoder, LogDecoder};
pub use domain::{BeamResult, ResultRecord, SessionResult};
pub use error::{GammaError, Result, StoreError};
pub use fluence::grid::{FluenceMap, PixelSpacing};
pub use gamma::engine::{evaluate, evaluate_with_reference_max, gamma_map};
pub use gamma::params::{GammaParameters, Normalization, ThresholdBasis};
pub use patient::patient_id_from_filename;
pub use session::{FailurePolicy, SessionAggregator, aggregate};
pub use store::file::{AppendReport, ResultStore, StoreReadWarning};
