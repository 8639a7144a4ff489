//! Batch fan-out: the single-file pipeline over every expanded input.
//!
//! Failures do not short-circuit; the batch exit code is the last non-zero
//! per-file code.

use std::path::{Path, PathBuf};

use tracing::{error, info, instrument};

use crate::core::rules::{EnginePreference, Rules};
use crate::engine::Engine;
use crate::error::FormatError;
use crate::exit_codes;
use crate::io::inputs::expand_inputs;
use crate::pipeline::{self, PipelineOptions, RunReport};
use crate::recipes::RecipeRegistry;

/// Per-file outcome of a batch.
#[derive(Debug)]
pub enum FileOutcome {
    Done(Box<RunReport>),
    Failed { input: PathBuf, error: FormatError },
}

impl FileOutcome {
    pub fn code(&self) -> i32 {
        match self {
            Self::Done(_) => exit_codes::OK,
            Self::Failed { .. } => exit_codes::FAILURE,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
    /// Set when the patterns themselves could not be expanded.
    pub expansion_error: Option<String>,
}

impl BatchReport {
    pub fn code(&self) -> i32 {
        if self.expansion_error.is_some() || self.files.is_empty() {
            return exit_codes::FAILURE;
        }
        self.files
            .iter()
            .rev()
            .map(FileOutcome::code)
            .find(|code| *code != exit_codes::OK)
            .unwrap_or(exit_codes::OK)
    }
}

/// Expand `patterns` and process each match sequentially with a fresh engine.
#[instrument(skip_all, fields(patterns = patterns.len()))]
pub fn run_batch(
    patterns: &[String],
    rules: &Rules,
    registry: &RecipeRegistry,
    options: &PipelineOptions,
    mut make_engine: impl FnMut(EnginePreference) -> Result<Box<dyn Engine>, FormatError>,
    progress: &mut dyn FnMut(&Path, u8, &str),
) -> BatchReport {
    let inputs = match expand_inputs(patterns) {
        Ok(inputs) => inputs,
        Err(err) => {
            let message = format!("{err:#}");
            error!(err = %message, "cannot expand inputs");
            return BatchReport {
                files: Vec::new(),
                expansion_error: Some(message),
            };
        }
    };
    if inputs.is_empty() {
        error!("no input files matched");
    }

    let mut report = BatchReport::default();
    for input in inputs {
        let outcome = pipeline::process(
            &input,
            rules,
            registry,
            options,
            &mut make_engine,
            &mut |percent, message| progress(&input, percent, message),
        );
        let outcome = match outcome {
            Ok(run) => {
                info!(input = %input.display(), modifications = run.summary.total_modifications, "processed");
                FileOutcome::Done(Box::new(run))
            }
            Err(err) => {
                error!(input = %input.display(), err = %err, "processing failed");
                FileOutcome::Failed { input, error: err }
            }
        };
        report.files.push(outcome);
    }
    report
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::test_support::RecordingEngine;

    fn rules() -> Rules {
        Rules::from_value(json!({
            "steps": [{"select": {"document": true}, "actions": [{"style_apply": {"name": "Body Text"}}]}]
        }))
        .expect("rules")
    }

    #[test]
    fn no_matches_is_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pattern = format!("{}/*.docx", temp.path().display());
        let report = run_batch(
            &[pattern],
            &rules(),
            &RecipeRegistry::builtin(),
            &PipelineOptions::default(),
            |_| Ok(Box::new(RecordingEngine::new("word")) as Box<dyn Engine>),
            &mut |_, _, _| {},
        );
        assert!(report.files.is_empty());
        assert_eq!(report.code(), exit_codes::FAILURE);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["a.docx", "b.docx", "c.docx"] {
            fs::write(temp.path().join(name), "x").expect("write");
        }
        let options = PipelineOptions {
            out_dir: temp.path().join("out"),
            ..PipelineOptions::default()
        };
        let mut built = 0;
        let pattern = format!("{}/*.docx", temp.path().display());
        let mut seen = Vec::new();
        let report = run_batch(
            &[pattern],
            &rules(),
            &RecipeRegistry::builtin(),
            &options,
            |_| {
                built += 1;
                let engine = RecordingEngine::new("word").paragraph("Text");
                let engine = if built == 2 { engine.failing("apply_style") } else { engine };
                Ok(Box::new(engine) as Box<dyn Engine>)
            },
            &mut |input, percent, _| {
                if percent == 100 {
                    seen.push(input.to_path_buf());
                }
            },
        );

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.files.iter().map(FileOutcome::code).collect::<Vec<_>>(), vec![0, 1, 0]);
        assert_eq!(report.code(), exit_codes::FAILURE);
        assert_eq!(seen.len(), 2);
        assert!(temp.path().join("out").join("c").join("c.docx").exists());
    }
}
