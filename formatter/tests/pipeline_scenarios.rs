//! End-to-end pipeline runs against the docx backend and the recording
//! engine.

use std::path::Path;

use serde_json::{Value, json};

use docx_formatter::core::rules::Rules;
use docx_formatter::engine::docx::DocxEngine;
use docx_formatter::engine::{Engine, ParagraphInfo};
use docx_formatter::error::FormatError;
use docx_formatter::pipeline::{PipelineOptions, RunReport, process};
use docx_formatter::recipes::RecipeRegistry;
use docx_formatter::test_support::{DocxBuilder, RecordingEngine};

fn rules(value: Value) -> Rules {
    Rules::from_value(value).expect("rules")
}

fn options(out: &Path) -> PipelineOptions {
    PipelineOptions {
        out_dir: out.to_path_buf(),
        ..PipelineOptions::default()
    }
}

fn run_docx(input: &Path, rules: &Rules, options: &PipelineOptions) -> Result<RunReport, FormatError> {
    process(
        input,
        rules,
        &RecipeRegistry::builtin(),
        options,
        |_| Ok(Box::new(DocxEngine::new()) as Box<dyn Engine>),
        &mut |_, _| {},
    )
}

fn reopen(path: &Path) -> Vec<ParagraphInfo> {
    let mut engine = DocxEngine::new();
    let doc = engine.open(path).expect("reopen");
    let paragraphs = engine.paragraphs(&doc, None).expect("paragraphs");
    engine.close(doc);
    paragraphs
}

#[test]
fn whole_document_style_apply_touches_every_paragraph() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new()
        .paragraph("One")
        .paragraph("Two")
        .paragraph("Three")
        .write_to(temp.path(), "plain.docx");
    let rules = rules(json!({
        "engine": "docx",
        "steps": [{"name": "Body", "select": {"document": true}, "actions": [{"style_apply": {"name": "Body Text"}}]}]
    }));

    let report = run_docx(&input, &rules, &options(&temp.path().join("out"))).expect("run");

    assert_eq!(report.engine, "docx");
    assert_eq!(report.summary.total_modifications, 3);
    assert_eq!(report.pre.paragraph_count, 3);
    assert_eq!(report.post.paragraph_count, report.pre.paragraph_count);

    let saved = report.artifacts.docx.expect("docx saved");
    assert_eq!(saved, temp.path().join("out").join("plain").join("plain.docx"));
    let styles: Vec<_> = reopen(&saved).into_iter().map(|p| p.style).collect();
    assert!(styles.iter().all(|s| s.as_deref() == Some("Body Text")), "{styles:?}");
}

#[test]
fn dot_to_emdash_recipe_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new()
        .paragraph("1. First item")
        .write_to(temp.path(), "list.docx");
    let rules = rules(json!({
        "steps": [{
            "name": "Dashes",
            "select": {"document": true},
            "actions": [{"word_recipe": {"name": "lists_dot_to_emdash", "params": {"page_start": 1, "page_end": 4}}}]
        }]
    }));

    let first = run_docx(&input, &rules, &options(&temp.path().join("first"))).expect("first run");
    assert_eq!(first.summary.total_modifications, 1);
    let converted = first.artifacts.docx.expect("docx saved");
    assert_eq!(reopen(&converted)[0].text, "1—First item");

    let second = run_docx(&converted, &rules, &options(&temp.path().join("second"))).expect("second run");
    assert_eq!(second.summary.total_modifications, 0);
}

#[test]
fn unknown_recipe_fails_the_step_unless_disabled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new().paragraph("Text").write_to(temp.path(), "a.docx");
    let step = |enabled: bool| {
        rules(json!({
            "steps": [{
                "name": "Custom",
                "select": {"document": true},
                "actions": [{"word_recipe": {"name": "does_not_exist", "enabled": enabled}}]
            }]
        }))
    };

    let err = run_docx(&input, &step(true), &options(temp.path())).expect_err("unknown recipe");
    match err {
        FormatError::UnknownRecipe { step, name, available } => {
            assert_eq!(step, "Custom");
            assert_eq!(name, "does_not_exist");
            assert_eq!(available.len(), RecipeRegistry::builtin().len());
        }
        other => panic!("unexpected error: {other}"),
    }

    let report = run_docx(&input, &step(false), &options(temp.path())).expect("disabled recipe");
    assert_eq!(report.summary.total_modifications, 0);
}

#[test]
fn added_bookmark_is_reported_once_without_failing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("marks.docx");
    std::fs::write(&input, "placeholder").expect("write input");
    let rules = rules(json!({
        "safety": {"require_same_bookmark_count": true},
        "steps": [{
            "name": "Mark",
            "select": {"document": true},
            "actions": [{"bookmark_text": {"name": "signature", "replace_text": "Signed", "allow_text_change": true}}]
        }]
    }));
    let engine = RecordingEngine::new("word").paragraph("Intro").paragraph("Sign here");
    let journal = engine.journal();

    let report = process(
        &input,
        &rules,
        &RecipeRegistry::builtin(),
        &options(&temp.path().join("out")),
        |_| Ok(Box::new(engine) as Box<dyn Engine>),
        &mut |_, _| {},
    )
    .expect("drift does not fail the run");

    let bookmark_warnings: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.contains("Bookmark count changed"))
        .collect();
    assert_eq!(bookmark_warnings, vec!["Bookmark count changed: 0 -> 1"]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.artifacts.docx.is_some());
    assert_eq!((journal.closes(), journal.shutdowns()), (1, 1));
}

#[test]
fn missing_pdf_export_is_a_warning_and_docx_is_still_saved() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new().paragraph("Text").write_to(temp.path(), "report.docx");
    let rules = rules(json!({
        "steps": [{"select": {"by_style": "Normal"}, "actions": [{"paragraph_format": {"alignment": "justify"}}]}]
    }));
    let options = PipelineOptions {
        audit: true,
        ..options(&temp.path().join("out"))
    };

    let report = run_docx(&input, &rules, &options).expect("run");

    assert_eq!(report.artifacts.pdf, None);
    assert!(report.artifacts.docx.as_ref().is_some_and(|p| p.exists()));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("PDF export"), "{:?}", report.warnings);

    let audit_path = report.artifacts.audit.expect("audit path");
    let audit: Value =
        serde_json::from_str(&std::fs::read_to_string(audit_path).expect("read audit")).expect("audit json");
    assert_eq!(audit["engine"], "docx");
    assert_eq!(audit["dry_run"], false);
    assert_eq!(audit["summary"]["total_modifications"], 1);
    assert!(audit["artifacts"]["pdf"].is_null());
}

#[test]
fn empty_selection_is_zero_modifications_not_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new().paragraph("Text").write_to(temp.path(), "a.docx");
    let rules = rules(json!({
        "steps": [
            {"name": "Marks", "select": {"by_bookmark": ["nowhere"]}, "actions": [{"paragraph_format": {"keep_with_next": true}}]},
            {"name": "Headings", "select": {"by_style": ["Heading 9"]}, "actions": [{"style_apply": {"name": "Title"}}]}
        ]
    }));
    let options = PipelineOptions {
        dry_run: true,
        ..options(temp.path())
    };

    let report = run_docx(&input, &rules, &options).expect("run");
    assert_eq!(report.summary.total_modifications, 0);
    assert_eq!(report.pre, report.post);
    assert!(report.warnings.is_empty());
}

#[test]
fn rules_without_steps_leave_the_document_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = DocxBuilder::new()
        .styled_paragraph("Heading1", "Title")
        .paragraph("Body")
        .table(&[&["a", "b"]])
        .write_to(temp.path(), "steady.docx");
    let rules = Rules::default();
    let options = PipelineOptions {
        export_pdf: false,
        ..options(&temp.path().join("out"))
    };
    let mut milestones = Vec::new();

    let report = process(
        &input,
        &rules,
        &RecipeRegistry::builtin(),
        &options,
        |_| Ok(Box::new(DocxEngine::new()) as Box<dyn Engine>),
        &mut |percent, _| milestones.push(percent),
    )
    .expect("run");

    assert_eq!(report.summary.total_modifications, 0);
    assert_eq!(report.pre, report.post);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(milestones.last(), Some(&100));
    let saved = report.artifacts.docx.expect("docx saved");
    let texts: Vec<_> = reopen(&saved).into_iter().map(|p| p.text).collect();
    assert_eq!(texts, ["Title", "Body", "a", "b"]);
}
