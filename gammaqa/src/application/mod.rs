pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use gammaqa_core::config::Config;
use gammaqa_core::error::Result;
use clap::Parser;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    match cli.command {
        Commands::Evaluate { session } => handlers::handle_evaluate(&cfg, session),
        Commands::Record {
            session,
            location,
            octavius,
            results,
            yes,
        } => handlers::handle_record(&cfg, session, location, octavius, results, yes),
        Commands::Show { results, sheet } => handlers::handle_show(&cfg, results, sheet),
        Commands::Locations => handlers::handle_locations(&cfg),
    }
}
