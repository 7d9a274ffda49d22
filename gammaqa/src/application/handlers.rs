use std::io::Write;
use std::path::PathBuf;

use gammaqa_core::config::Config;
use gammaqa_core::decode::collect_session_files;
use gammaqa_core::domain::now_timestamp;
use gammaqa_core::error::{GammaError, Result};
use gammaqa_core::patient::patient_id_from_path;
use gammaqa_core::store::render::render_sheet;
use gammaqa_core::{
    FluenceFileDecoder, GammaParameters, ResultRecord, ResultStore, SessionAggregator,
    SessionResult, Technique, ThresholdBasis,
};
use tracing::debug;

use crate::presentation::cli::SessionArgs;

fn params_from_args(cfg: &Config, args: &SessionArgs) -> Result<(Technique, GammaParameters)> {
    let technique = Technique::from(args.technique);
    let threshold = args.threshold.unwrap_or(cfg.default_threshold_percent);
    let params = cfg
        .preset(technique)
        .parameters(threshold, args.normalization.into())?
        .with_threshold_basis(args.threshold_basis.into());
    Ok((technique, params))
}

fn print_params(technique: Technique, params: &GammaParameters) {
    println!("Gamma evaluation parameters ({technique}):");
    println!("  Distance to agreement (mm): {:.1}", params.distance_to_agreement_mm());
    println!("  Dose difference (%): {:.2}", params.dose_difference_percent());
    println!("  Threshold (%): {:.1}", params.low_dose_threshold_percent());
    println!("  Resolution (mm): {:.1}", params.resolution_mm());
    println!("  Normalization: {}", params.normalization());
    if params.threshold_basis() == ThresholdBasis::PerSession {
        println!("  Threshold basis: session maximum");
    }
}

fn print_session(session: &SessionResult) {
    println!("Patient ID: {}", session.patient_id);
    for b in &session.beam_results {
        println!("  {}: {:.2}", b.beam_id, b.pass_percentage);
    }
    for x in &session.excluded {
        println!("  {}: excluded ({})", x.beam_id, x.reason);
    }
    println!(
        "Patient gamma passing percentage: {:.2}",
        session.aggregate_pass_percentage
    );
}

fn score(cfg: &Config, args: &SessionArgs) -> Result<(Technique, GammaParameters, SessionResult)> {
    let (technique, params) = params_from_args(cfg, args)?;
    let files = collect_session_files(&args.inputs)?;
    let first = files.first().ok_or(GammaError::EmptySession)?;
    let patient_id = patient_id_from_path(first)?;
    debug!(files = files.len(), patient = %patient_id, "session inputs collected");

    print_params(technique, &params);
    let session = SessionAggregator::new(&FluenceFileDecoder, params)
        .with_policy(args.failure_policy())
        .score_paths(&patient_id, &files)?;
    Ok((technique, params, session))
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn handle_evaluate(cfg: &Config, args: SessionArgs) -> Result<()> {
    let (_, _, session) = score(cfg, &args)?;
    print_session(&session);
    Ok(())
}

pub fn handle_record(
    cfg: &Config,
    args: SessionArgs,
    location: String,
    octavius: f64,
    results: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    cfg.check_location(&location)?;
    let (technique, params, session) = score(cfg, &args)?;
    print_session(&session);

    let record = ResultRecord::from_session(&session, &params, &location, octavius, now_timestamp())?;
    let store = ResultStore::new(results.unwrap_or_else(|| cfg.results_file.clone()))
        .with_column_widths(cfg.column_widths()?);
    let sheet = technique.sheet_name();

    let prompt = format!(
        "Submit {} ({:.2} %) to sheet {sheet:?} in {}?",
        record.patient_id,
        record.gamma_percent,
        store.path().display()
    );
    if !yes && !confirm(&prompt)? {
        eprintln!("record: not submitted");
        return Ok(());
    }

    match store.append(sheet, &record) {
        Ok(report) => {
            for w in &report.warnings {
                eprintln!("warning: {w}");
            }
            eprintln!(
                "record: saved to sheet {:?} in {} ({} rows)",
                report.sheet,
                store.path().display(),
                report.rows_in_sheet
            );
            Ok(())
        }
        Err(e) => {
            // Keep the computed result visible for manual recording.
            let row: Vec<String> = record.to_row().iter().map(|c| c.to_string()).collect();
            eprintln!("record: not saved; result was: {}", row.join(" | "));
            Err(e.into())
        }
    }
}

pub fn handle_show(cfg: &Config, results: Option<PathBuf>, sheet: Option<String>) -> Result<()> {
    let store = ResultStore::new(results.unwrap_or_else(|| cfg.results_file.clone()))
        .with_column_widths(cfg.column_widths()?);
    let snap = store.load();
    for w in &snap.warnings {
        eprintln!("warning: {w}");
    }
    let mut shown = 0;
    for s in &snap.workbook.sheets {
        if sheet.as_deref().is_some_and(|name| name != s.name) {
            continue;
        }
        if shown > 0 {
            println!();
        }
        print!("{}", render_sheet(s));
        shown += 1;
    }
    if shown == 0 {
        eprintln!("show: no records in {}", store.path().display());
    }
    Ok(())
}

pub fn handle_locations(cfg: &Config) -> Result<()> {
    for l in &cfg.locations {
        println!("{l}");
    }
    Ok(())
}
