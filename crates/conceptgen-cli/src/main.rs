mod run;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use conceptgen_blueprint::{BlueprintError, assemble, load_blueprint};
use conceptgen_core::{Attributes, StoreError};
use conceptgen_engine::{ConceptEngine, ConceptError, ConceptRegistry, ModelLibrary};
use convert_case::{Case, Casing};
use run::{RunContext, RunReport, init_logging, write_report};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("run error: {0}")]
    Run(#[from] run::RunError),
    #[error("blueprint error: {0}")]
    Blueprint(#[from] BlueprintError),
    #[error("concept error: {0}")]
    Concept(#[from] ConceptError),
    #[error("rollback failed: {0}")]
    Rollback(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "conceptgen",
    version,
    about = "Generate connected records from concept blueprints"
)]
struct Cli {
    /// Concept to generate, by slug (person-with-pets) or type name (PersonWithPets).
    name: Option<String>,
    /// List registered concepts instead of generating one.
    #[arg(long, default_value_t = false)]
    list: bool,
    /// Blueprint declaring entities, templates and concepts.
    #[arg(long, default_value = "concepts.toml")]
    blueprint: PathBuf,
    /// Number of concept instances to generate.
    #[arg(long)]
    count: Option<usize>,
    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Append JSON logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Undo every generated change after printing it.
    #[arg(long, default_value_t = false)]
    rollback: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.count == Some(0) {
        return Err(CliError::InvalidConfig(
            "count must be greater than zero".to_string(),
        ));
    }

    let blueprint = load_blueprint(&cli.blueprint)?;
    let assembly = assemble(blueprint)?;

    let slug = match (&cli.name, cli.list) {
        (Some(name), false) => name.to_case(Case::Kebab),
        _ => {
            print_registry(&assembly.registry, None);
            return Ok(());
        }
    };
    let Some(definition) = assembly.registry.find_in_registry(&slug).cloned() else {
        tracing::warn!(event = "concept_unknown", slug = %slug);
        print_registry(&assembly.registry, Some(&slug));
        return Ok(());
    };

    let ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: chrono::Utc::now(),
        blueprint: cli.blueprint.clone(),
        slug,
        concept: definition.name().to_string(),
        count: cli.count.unwrap_or(definition.instance_count()),
    };
    tracing::info!(event = "run_started", run_id = %ctx.run_id, concept = %ctx.concept);
    let timer = Instant::now();

    let mut engine = ConceptEngine::new(definition, assembly.backend());
    engine.create(&Attributes::new(), Some(ctx.count))?;
    let log = engine.action_log();
    let actions = log.len();

    print_library(engine.model_library());

    if cli.rollback {
        let outcome = log.rollback(assembly.store.as_ref())?;
        println!(
            "rolled back: {} restored, {} deleted, {} missing",
            outcome.restored, outcome.deleted, outcome.missing
        );
    }

    let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
    if let Some(path) = &cli.report {
        let report = RunReport::new(
            &ctx,
            engine.model_library(),
            actions,
            cli.rollback,
            duration_ms,
        );
        write_report(path, &report)?;
        tracing::info!(event = "report_written", path = %path.display());
    }

    tracing::info!(
        event = "run_finished",
        status = "success",
        actions,
        duration_ms
    );
    Ok(())
}

fn print_library(library: &ModelLibrary) {
    for (alias, value) in library.iter() {
        println!("{alias}:");
        for record in value.records() {
            println!("  {}", record.id());
        }
    }
}

fn print_registry(registry: &ConceptRegistry, requested: Option<&str>) {
    if let Some(name) = requested {
        eprintln!("concept '{name}' is not registered");
    }
    if registry.is_empty() {
        println!("No concepts registered.");
        return;
    }
    println!("Available concepts:");
    for (slug, name) in registry.registry() {
        println!("  {slug:<24} {name}");
    }
}
