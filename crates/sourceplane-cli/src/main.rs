mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use sourceplane_core::composition::load_compositions;
use sourceplane_core::intent::load_intent;
use sourceplane_core::normalize::normalize;
use sourceplane_core::pipeline::compile_for_environment;
use sourceplane_core::render;
use sourceplane_core::validate::validate_components;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "sourceplane",
    version,
    about = "Sourceplane — schema-driven deployment planner",
    long_about = "Compile a declarative deployment intent and a directory of compositions into a deterministic, topologically ordered workflow plan."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an intent into a workflow plan
    Plan {
        /// Path to the intent document
        #[arg(short, long, default_value = "intent.yaml")]
        intent: PathBuf,

        /// Compositions root directory (may contain a glob wildcard)
        #[arg(short, long, default_value = "compositions")]
        compositions: String,

        /// Restrict planning to a single environment
        #[arg(short, long)]
        environment: Option<String>,

        /// Output file; format is chosen by extension (.yaml/.yml or JSON).
        /// Prints YAML to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress the plan summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Check an intent against its composition schemas without emitting a plan
    Validate {
        /// Path to the intent document
        #[arg(short, long, default_value = "intent.yaml")]
        intent: PathBuf,

        /// Compositions root directory (may contain a glob wildcard)
        #[arg(short, long, default_value = "compositions")]
        compositions: String,
    },

    /// List the compositions discovered under a root
    Compositions {
        /// Compositions root directory (may contain a glob wildcard)
        #[arg(default_value = "compositions")]
        root: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            intent,
            compositions,
            environment,
            output,
            quiet,
        } => cmd_plan(
            &intent,
            &compositions,
            environment.as_deref().unwrap_or(""),
            output.as_deref(),
            quiet,
        ),
        Commands::Validate {
            intent,
            compositions,
        } => cmd_validate(&intent, &compositions),
        Commands::Compositions { root } => cmd_compositions(&root),
    }
}

fn cmd_plan(
    intent: &Path,
    compositions: &str,
    environment: &str,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let plan = compile_for_environment(intent, compositions, environment)
        .with_context(|| format!("planning failed for intent '{}'", intent.display()))?;

    if plan.jobs.is_empty() && !environment.is_empty() {
        eprintln!(
            "{} environment '{}' selected no components",
            "warning:".yellow().bold(),
            environment
        );
    }

    match output {
        Some(path) => {
            render::write_plan(&plan, path)?;
            if !quiet {
                display::print_plan_summary(&plan);
                println!(" {} {}", "Wrote".green().bold(), path.display());
            }
        }
        None => {
            print!("{}", render::to_yaml(&plan)?);
            if !quiet {
                display::print_plan_summary(&plan);
            }
        }
    }

    Ok(())
}

fn cmd_validate(intent: &Path, compositions: &str) -> Result<()> {
    let registry = load_compositions(compositions)?;
    let raw = load_intent(intent)?;
    let normalized = normalize(raw)?;
    validate_components(&normalized, &registry)?;

    println!(
        " {} {} component(s) valid against {} composition(s)",
        "OK".green().bold(),
        normalized.intent.components.len(),
        registry.len()
    );
    Ok(())
}

fn cmd_compositions(root: &str) -> Result<()> {
    let registry = load_compositions(root)?;
    display::print_compositions(&registry);
    Ok(())
}
