//! `format-docx`: apply a declarative rule set to `.docx` files.
//!
//! Exit code 0 when every input was processed, 1 on any failure.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use docx_formatter::batch::{FileOutcome, run_batch};
use docx_formatter::core::action::Action;
use docx_formatter::core::rules::{EnginePreference, Rules};
use docx_formatter::engine::select::select_engine;
use docx_formatter::exit_codes;
use docx_formatter::io::config::{DEFAULT_CONFIG_PATH, FormatterConfig, load_config, write_config};
use docx_formatter::io::rules_file::load_rules;
use docx_formatter::logging;
use docx_formatter::pipeline::PipelineOptions;
use docx_formatter::recipes::RecipeRegistry;

#[derive(Parser)]
#[command(
    name = "format-docx",
    version,
    about = "Apply declarative formatting rules to .docx files"
)]
struct Cli {
    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format one or more documents (paths or glob patterns).
    Run(RunArgs),
    /// Validate a rule file, parsing every selector, action and recipe name.
    Check {
        /// Rule file (.yaml, .yml, .json or .toml).
        rules: PathBuf,
    },
    /// List registered recipes and the capabilities they need.
    Recipes,
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input documents or glob patterns.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Rule file (.yaml, .yml, .json or .toml).
    #[arg(long)]
    rules: PathBuf,

    /// Backend: auto, word or docx. Defaults to the rule set's choice.
    #[arg(long, value_parser = parse_engine)]
    engine: Option<EnginePreference>,

    /// Output directory (default from config, `output`).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write `<stem>.audit.json` next to the outputs.
    #[arg(long)]
    audit: bool,

    /// Apply steps in memory without saving the document.
    #[arg(long)]
    dry_run: bool,

    /// Skip PDF export.
    #[arg(long)]
    no_pdf: bool,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,

        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn parse_engine(value: &str) -> Result<EnginePreference, String> {
    value.parse().map_err(|err: docx_formatter::error::FormatError| err.to_string())
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::FAILURE
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Check { rules } => Ok(cmd_check(&rules)),
        Command::Recipes => {
            cmd_recipes();
            Ok(exit_codes::OK)
        }
        Command::Config {
            command: ConfigCommand::Init { force, config },
        } => {
            cmd_config_init(&config, force)?;
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let rules = match load_rules(&args.rules) {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("{err}");
            return Ok(exit_codes::FAILURE);
        }
    };
    let registry = RecipeRegistry::builtin();
    let options = pipeline_options(&config, args);
    let selection = config.selection_options();

    let report = run_batch(
        &args.inputs,
        &rules,
        &registry,
        &options,
        |preference| select_engine(preference, &selection),
        &mut |input, percent, message| {
            info!(input = %input.display(), percent, status = message, "progress");
        },
    );

    if let Some(err) = &report.expansion_error {
        eprintln!("{err}");
    } else if report.files.is_empty() {
        eprintln!("no input files matched");
    }
    for file in &report.files {
        match file {
            FileOutcome::Done(run) => {
                println!(
                    "{}: {} modification(s) with the {} engine{}",
                    run.input.display(),
                    run.summary.total_modifications,
                    run.engine,
                    if run.dry_run { " (dry run)" } else { "" }
                );
                for warning in &run.warnings {
                    println!("  warning: {warning}");
                }
            }
            FileOutcome::Failed { input, error } => {
                eprintln!("{}: {error}", input.display());
            }
        }
    }
    Ok(report.code())
}

fn pipeline_options(config: &FormatterConfig, args: &RunArgs) -> PipelineOptions {
    PipelineOptions {
        out_dir: args.out.clone().unwrap_or_else(|| config.output.dir.clone()),
        engine: args.engine,
        export_pdf: config.output.pdf && !args.no_pdf,
        audit: config.output.audit || args.audit,
        dry_run: args.dry_run,
        recipe_settings: config.recipe_settings(),
    }
}

fn cmd_check(path: &Path) -> i32 {
    let rules = match load_rules(path) {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("{err}");
            return exit_codes::FAILURE;
        }
    };
    let registry = RecipeRegistry::builtin();
    let mut problems = rules.check();
    problems.extend(unknown_recipes(&rules, &registry));
    if problems.is_empty() {
        println!(
            "{}: ok ({} step(s), engine {})",
            path.display(),
            rules.steps.len(),
            rules.engine
        );
        return exit_codes::OK;
    }
    for problem in &problems {
        eprintln!("{problem}");
    }
    exit_codes::FAILURE
}

fn unknown_recipes(rules: &Rules, registry: &RecipeRegistry) -> Vec<String> {
    let mut problems = Vec::new();
    for step in &rules.steps {
        for raw in &step.actions {
            if let Ok(Action::Recipe(call)) = Action::parse(&raw.key, &raw.config)
                && call.enabled
                && registry.get(&call.name).is_none()
            {
                problems.push(format!("step '{}': unknown recipe '{}'", step.name, call.name));
            }
        }
    }
    problems
}

fn cmd_recipes() {
    let registry = RecipeRegistry::builtin();
    for recipe in registry.iter() {
        let requires: Vec<&str> = recipe.requires().iter().map(|c| c.as_str()).collect();
        let requires = if requires.is_empty() {
            String::new()
        } else {
            format!(" [requires: {}]", requires.join(", "))
        };
        println!("{}{requires}\n    {}", recipe.name(), recipe.description());
    }
}

fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &FormatterConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_flags() {
        let cli = Cli::parse_from([
            "format-docx",
            "run",
            "a.docx",
            "in/*.docx",
            "--rules",
            "rules.yaml",
            "--engine",
            "DOCX",
            "--dry-run",
            "--no-pdf",
            "-v",
        ]);
        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.inputs, vec!["a.docx", "in/*.docx"]);
        assert_eq!(args.engine, Some(EnginePreference::Docx));
        assert!(args.dry_run && args.no_pdf && !args.audit);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_rejects_unknown_engine() {
        let result = Cli::try_parse_from(["format-docx", "run", "a.docx", "--rules", "r.yaml", "--engine", "pages"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_config_init_force() {
        let cli = Cli::parse_from(["format-docx", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Init { force: true, .. }
            }
        ));
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from(["format-docx", "run", "a.docx", "--rules", "r.yaml", "--out", "dist", "--no-pdf", "--audit"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = pipeline_options(&FormatterConfig::default(), &args);
        assert_eq!(options.out_dir, PathBuf::from("dist"));
        assert!(!options.export_pdf);
        assert!(options.audit);
        assert_eq!(options.engine, None);
    }

    #[test]
    fn check_flags_enabled_unknown_recipes_only() {
        let rules = Rules::from_value(serde_json::json!({
            "steps": [{
                "name": "Recipes",
                "select": {"document": true},
                "actions": [
                    {"word_recipe": {"name": "nope"}},
                    {"word_recipe": {"name": "also_nope", "enabled": false}},
                    {"word_recipe": {"name": "remove_all_tabs"}}
                ]
            }]
        }))
        .expect("rules");
        assert_eq!(
            unknown_recipes(&rules, &RecipeRegistry::builtin()),
            vec!["step 'Recipes': unknown recipe 'nope'"]
        );
    }
}
