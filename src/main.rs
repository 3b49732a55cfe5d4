use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

use lm_etl::cli::{Command, InitArgs, RootArgs, RunArgs};
use lm_etl::config::{build_pipeline, config_stub, load_config, validate_config, write_config};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Init(args) => cmd_init(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_init(args: InitArgs) -> Result<()> {
    if args.config.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    write_config(&args.config, &config_stub())?;
    println!("Wrote example config to {}", args.config.display());
    println!("Edit the source/sink paths and provider, then: lmetl run --config {} --dry-run", args.config.display());
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    validate_config(&config).context("invalid pipeline config")?;
    let mut pipeline = build_pipeline(&config)?;

    let shutdown = pipeline.shutdown_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %err, "could not install interrupt handler");
    }

    let result = if args.dry_run {
        pipeline.dry_run().context("dry run failed")?
    } else {
        pipeline
            .run()
            .with_context(|| format!("pipeline '{}' halted", config.name))?
    };

    println!(
        "{}: {} succeeded, {} failed, {} total in {:.2}s",
        config.name,
        result.success_count,
        result.failure_count,
        result.total_count,
        result.duration.as_secs_f64()
    );
    if let Some(path) = &result.dead_letter_path {
        println!("Failed rows written to {}", path.display());
    }
    Ok(())
}
