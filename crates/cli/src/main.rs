mod cli;
mod patients;
mod report;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cgm_core::config::load_dotenv;
use cgm_core::PatternSettings;
use cgm_engine::{BatchRunner, JsonDirSource, SlidingWindowEngine, StandardSummaries};
use cgm_rules::{RuleDiscovery, RuleFilter, RuleRegistry};

use crate::cli::CliArgs;
use crate::patients::read_patient_ids;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = args.resolve_config();
    config.log_summary();

    // Discover rules
    let mut registry = RuleRegistry::new();
    let discovery = args
        .disabled_modules
        .iter()
        .fold(RuleDiscovery::builtin(), |d, module| d.disable(module.as_str()));
    let discovered = discovery
        .discover(&mut registry)
        .context("rule discovery failed")?;
    for (module, error) in discovered.failed_modules() {
        warn!(module, error, "rule module not loaded");
    }
    if registry.is_empty() {
        bail!("no pattern rules are registered");
    }
    info!(rules = registry.len(), "rules registered");

    if args.list_rules {
        return print_rules(&registry);
    }

    let patients_file = args
        .patients
        .as_deref()
        .context("a patient id file is required")?;
    let (Some(start), Some(end)) = (args.start, args.end) else {
        bail!("--start and --end are required");
    };
    if start > end {
        bail!("--start {} is after --end {}", start, end);
    }

    let filter = if args.patterns.is_empty() {
        None
    } else {
        let filter = RuleFilter::new(&args.patterns);
        filter.validate(&registry)?;
        Some(filter)
    };

    let settings = match &config.data.settings_file {
        Some(path) => PatternSettings::load(path)?,
        None => PatternSettings::default(),
    };

    let patient_ids = read_patient_ids(patients_file)?;
    if patient_ids.is_empty() {
        warn!(path = %patients_file.display(), "no patient ids to process");
    }

    let source = JsonDirSource::new(&config.data.data_dir);
    let engine = SlidingWindowEngine::new(
        Arc::new(source),
        Arc::new(registry),
        Arc::new(settings),
        config.window.lookback_days,
    )
    .with_deriver(Arc::new(StandardSummaries::new(config.summary.clone())));

    let runner = BatchRunner::new(engine, config.window.resolved_workers());
    let batch = runner.run(&patient_ids, start, end, filter.as_ref())?;

    for (patient_id, outcome) in batch.failed_patients() {
        warn!(
            patient_id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "patient failed"
        );
    }

    let rendered = report::render(&batch, args.include_all);
    write_report(args.output.as_deref(), &rendered)?;
    info!(
        patients = batch.patients.len(),
        triggered = batch.triggered_count(),
        "done"
    );
    Ok(())
}

fn print_rules(registry: &RuleRegistry) -> Result<()> {
    let mut out = io::stdout().lock();
    for rule in registry.iter() {
        let d = rule.descriptor();
        writeln!(
            out,
            "{:<30} v{:<8} window={:<3} {}",
            d.id, d.version, d.min_window_days, d.name
        )?;
    }
    Ok(())
}

fn write_report(path: Option<&Path>, report: &impl serde::Serialize) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
