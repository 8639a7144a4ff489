//! Single-file pipeline: engine, open, pre-snapshot, steps, post-snapshot,
//! compare, save, export, audit, close.
//!
//! Once a document is open it is closed and the engine shut down on every
//! exit path, including step failures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::rules::{EnginePreference, Rules};
use crate::core::snapshot::{self, Snapshot};
use crate::dispatch::{self, StepContext};
use crate::engine::{DocumentHandle, Engine};
use crate::error::FormatError;
use crate::io::audit::{self, AuditRecord};
use crate::recipes::{RecipeRegistry, RecipeSettings};
use crate::resolve;

/// Per-run switches, usually config file values overridden by CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Artifacts go to `<out_dir>/<stem>/`.
    pub out_dir: PathBuf,
    /// Overrides the rule set's engine unless `Auto`.
    pub engine: Option<EnginePreference>,
    pub export_pdf: bool,
    pub audit: bool,
    /// Apply steps in memory but save nothing except the audit.
    pub dry_run: bool,
    pub recipe_settings: RecipeSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            engine: None,
            export_pdf: true,
            audit: false,
            dry_run: false,
            recipe_settings: RecipeSettings::default(),
        }
    }
}

impl PipelineOptions {
    /// CLI engine choice wins unless it is `auto`.
    pub fn engine_for(&self, rules: &Rules) -> EnginePreference {
        match self.engine {
            Some(choice) if choice != EnginePreference::Auto => choice,
            _ => rules.engine,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub name: String,
    pub modifications: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub steps: Vec<StepSummary>,
    pub total_modifications: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub docx: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub audit: Option<PathBuf>,
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub engine: &'static str,
    pub input: PathBuf,
    pub dry_run: bool,
    pub pre: Snapshot,
    pub post: Snapshot,
    pub summary: Summary,
    /// Safety drift, recipe and export warnings.
    pub warnings: Vec<String>,
    pub artifacts: Artifacts,
}

/// Run every step of `rules` against `input`.
///
/// `make_engine` builds the backend for the resolved preference; `progress`
/// receives `(percent, message)` at coarse milestones.
#[instrument(skip_all, fields(input = %input.display(), dry_run = options.dry_run))]
pub fn process(
    input: &Path,
    rules: &Rules,
    registry: &RecipeRegistry,
    options: &PipelineOptions,
    make_engine: impl FnOnce(EnginePreference) -> Result<Box<dyn Engine>, FormatError>,
    progress: &mut dyn FnMut(u8, &str),
) -> Result<RunReport, FormatError> {
    progress(5, "Initializing engine");
    let mut engine = make_engine(options.engine_for(rules))?;
    info!(engine = engine.name(), "engine ready");

    progress(10, &format!("Rules ready: {} step(s)", rules.steps.len()));

    let doc = match engine.open(input) {
        Ok(doc) => doc,
        Err(source) => {
            engine.shutdown();
            return Err(FormatError::Open {
                path: input.to_path_buf(),
                source,
            });
        }
    };
    progress(15, "Document opened");

    let result = run_open(engine.as_mut(), &doc, input, rules, registry, options, progress);

    engine.close(doc);
    engine.shutdown();
    if result.is_ok() {
        progress(100, "Done");
    }
    result
}

fn run_open(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    input: &Path,
    rules: &Rules,
    registry: &RecipeRegistry,
    options: &PipelineOptions,
    progress: &mut dyn FnMut(u8, &str),
) -> Result<RunReport, FormatError> {
    let pre = engine.snapshot(doc).map_err(FormatError::Snapshot)?;
    progress(20, "Pre-run snapshot taken");

    let mut warnings = Vec::new();
    let summary = apply_steps(engine, doc, rules, registry, options, progress)?;
    for step in &summary.steps {
        warnings.extend(step.warnings.iter().cloned());
    }

    let post = engine.snapshot(doc).map_err(FormatError::Snapshot)?;
    let drift = snapshot::compare(&pre, &post, &rules.safety);
    for warning in &drift {
        warn!(warning = %warning, "safety check");
    }
    warnings.extend(drift);
    progress(75, "Snapshots compared");

    let stem = input
        .file_stem()
        .map_or_else(|| "document".into(), |stem| stem.to_string_lossy().into_owned());
    let out_dir = options.out_dir.join(&stem);
    let mut artifacts = Artifacts::default();

    if options.dry_run {
        info!("dry run, skipping save and export");
    } else {
        create_dir(&out_dir)?;
        let docx_path = out_dir.join(format!("{stem}.docx"));
        engine
            .save_as(doc, &docx_path)
            .map_err(|source| FormatError::Save {
                path: docx_path.clone(),
                source,
            })?;
        info!(path = %docx_path.display(), "saved document");
        artifacts.docx = Some(docx_path);
        progress(85, "Document saved");

        if options.export_pdf {
            let pdf_path = out_dir.join(format!("{stem}.pdf"));
            match engine.export_pdf(doc, &pdf_path) {
                Ok(()) => {
                    info!(path = %pdf_path.display(), "exported pdf");
                    artifacts.pdf = Some(pdf_path);
                }
                Err(err) if err.is_not_supported() => {
                    warn!(err = %err, "pdf export skipped");
                    warnings.push(format!("PDF export skipped: {err}"));
                }
                Err(source) => {
                    return Err(FormatError::Save {
                        path: pdf_path,
                        source,
                    });
                }
            }
            progress(90, "PDF export finished");
        }
    }

    let mut report = RunReport {
        engine: engine.name(),
        input: input.to_path_buf(),
        dry_run: options.dry_run,
        pre,
        post,
        summary,
        warnings,
        artifacts,
    };

    if options.audit {
        let audit_path = out_dir.join(format!("{stem}.audit.json"));
        report.artifacts.audit = Some(audit_path.clone());
        write_audit(&audit_path, &report)?;
        progress(95, "Audit written");
    }

    Ok(report)
}

fn apply_steps(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    rules: &Rules,
    registry: &RecipeRegistry,
    options: &PipelineOptions,
    progress: &mut dyn FnMut(u8, &str),
) -> Result<Summary, FormatError> {
    let total = rules.steps.len();
    progress(30, &format!("Applying {total} step(s)"));

    let mut summary = Summary::default();
    for (i, step) in rules.steps.iter().enumerate() {
        let ctx = StepContext {
            step: &step.name,
            safety: &rules.safety,
            registry,
            settings: &options.recipe_settings,
        };
        let ranges = resolve::resolve_step(engine, doc, step)?;
        let mut step_summary = StepSummary {
            name: step.name.clone(),
            ..StepSummary::default()
        };
        for raw in &step.actions {
            let outcome = dispatch::dispatch(engine, doc, &ranges, raw, ctx)?;
            step_summary.modifications += outcome.modifications;
            step_summary.warnings.extend(outcome.warnings);
        }
        info!(
            step = %step.name,
            ranges = ranges.len(),
            modifications = step_summary.modifications,
            "step applied"
        );
        summary.total_modifications += step_summary.modifications;
        summary.steps.push(step_summary);

        let percent = 30 + 40 * (i + 1) / total.max(1);
        let percent = u8::try_from(percent).unwrap_or(70);
        progress(percent, &format!("Step {}/{total}: {}", i + 1, step.name));
    }
    Ok(summary)
}

fn create_dir(dir: &Path) -> Result<(), FormatError> {
    fs::create_dir_all(dir).map_err(|err| FormatError::Artifact {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })
}

fn write_audit(path: &Path, report: &RunReport) -> Result<(), FormatError> {
    let artifact_error = |err: anyhow::Error| FormatError::Artifact {
        path: path.to_path_buf(),
        message: format!("{err:#}"),
    };
    let record = AuditRecord {
        engine: report.engine,
        dry_run: report.dry_run,
        input: report.input.display().to_string(),
        input_sha256: audit::sha256_file(&report.input).map_err(artifact_error)?,
        generated_at: audit::timestamp(),
        pre: &report.pre,
        post: &report.post,
        summary: &report.summary,
        warnings: &report.warnings,
        artifacts: &report.artifacts,
    };
    audit::write_audit(path, &record).map_err(artifact_error)?;
    info!(path = %path.display(), "wrote audit record");
    Ok(())
}
