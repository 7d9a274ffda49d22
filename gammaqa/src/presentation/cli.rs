use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use gammaqa_core::{FailurePolicy, Normalization, Technique, ThresholdBasis};

#[derive(Parser)]
#[command(author, version, about = "Fluence gamma QA for delivery logs", long_about = None)]
pub struct Cli {
    /// JSON config file (results file, locations, column widths, presets)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum TechniqueArg {
    Vmat,
    Sbrt,
    Srs,
}

impl From<TechniqueArg> for Technique {
    fn from(t: TechniqueArg) -> Self {
        match t {
            TechniqueArg::Vmat => Technique::Vmat,
            TechniqueArg::Sbrt => Technique::Sbrt,
            TechniqueArg::Srs => Technique::Srs,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum NormalizationArg {
    Local,
    Global,
}

impl From<NormalizationArg> for Normalization {
    fn from(n: NormalizationArg) -> Self {
        match n {
            NormalizationArg::Local => Normalization::Local,
            NormalizationArg::Global => Normalization::Global,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum BasisArg {
    /// Low-dose threshold against each beam's own reference maximum
    Beam,
    /// Low-dose threshold against the maximum over the whole session
    Session,
}

impl From<BasisArg> for ThresholdBasis {
    fn from(b: BasisArg) -> Self {
        match b {
            BasisArg::Beam => ThresholdBasis::PerBeam,
            BasisArg::Session => ThresholdBasis::PerSession,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    /// Fluence files or directories for one patient session
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(long, value_enum)]
    pub technique: TechniqueArg,

    #[arg(long, value_enum, default_value_t = NormalizationArg::Local)]
    pub normalization: NormalizationArg,

    /// Low-dose threshold (%); defaults to the configured value
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long, value_enum, default_value_t = BasisArg::Beam)]
    pub threshold_basis: BasisArg,

    /// Leave failing beams out of the session mean instead of aborting
    #[arg(long)]
    pub exclude_failed: bool,
}

impl SessionArgs {
    pub fn failure_policy(&self) -> FailurePolicy {
        if self.exclude_failed {
            FailurePolicy::ExcludeFailed
        } else {
            FailurePolicy::FailFast
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score a session and print per-beam and session pass rates
    Evaluate {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Score a session and append the result to the results log
    Record {
        #[command(flatten)]
        session: SessionArgs,

        /// Body location (one of `gammaqa locations`)
        #[arg(long)]
        location: String,

        /// Octavius 4D gamma (%) measured independently
        #[arg(long, default_value_t = 0.0)]
        octavius: f64,

        /// Results log path; defaults to the configured file
        #[arg(long)]
        results: Option<PathBuf>,

        /// Submit without asking for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Print the results log as aligned tables
    Show {
        #[arg(long)]
        results: Option<PathBuf>,

        /// Only this sheet
        #[arg(long)]
        sheet: Option<String>,
    },

    /// List the configured body locations
    Locations,
}
