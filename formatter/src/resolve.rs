//! Selector resolution: one selector, one backend primitive.
//!
//! Unknown or malformed selectors are [`FormatError::InvalidSelector`]. A
//! selector the backend has no model for degrades to an empty list.

use tracing::debug;

use crate::core::rules::Step;
use crate::core::selector::Selector;
use crate::engine::{DocumentHandle, Engine, EngineResult, Range};
use crate::error::FormatError;

/// Parse the step's selector and resolve it against the open document.
pub fn resolve_step(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    step: &Step,
) -> Result<Vec<Range>, FormatError> {
    let selector = Selector::parse(&step.select).map_err(|detail| FormatError::InvalidSelector {
        step: step.name.clone(),
        detail,
    })?;
    resolve(engine, doc, &step.name, &selector)
}

pub fn resolve(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    step: &str,
    selector: &Selector,
) -> Result<Vec<Range>, FormatError> {
    match primitive(engine, doc, selector) {
        Ok(ranges) => {
            debug!(step, selector = selector.tag(), ranges = ranges.len(), "resolved selector");
            Ok(ranges)
        }
        Err(err) if err.is_not_supported() => {
            debug!(step, selector = selector.tag(), err = %err, "selector not supported, matching nothing");
            Ok(Vec::new())
        }
        Err(source) => Err(FormatError::StepFailure {
            step: step.to_string(),
            action: format!("select {}", selector.tag()),
            source,
        }),
    }
}

fn primitive(engine: &mut dyn Engine, doc: &DocumentHandle, selector: &Selector) -> EngineResult<Vec<Range>> {
    match selector {
        Selector::Document => engine.select_document(doc),
        Selector::ByStyle(styles) => engine.select_by_style(doc, styles),
        Selector::ByRegex(query) => engine.select_by_regex(doc, query),
        Selector::ByBookmark(names) => engine.select_by_bookmark(doc, names),
        Selector::ByContentControl(titles) => engine.select_by_content_control(doc, titles),
        Selector::ByTable(query) => engine.select_by_table(doc, query),
        Selector::ByRange(range) => engine.select_by_range(doc, range),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::test_support::RecordingEngine;

    fn step(select: Value) -> Step {
        let select: Map<String, Value> = select.as_object().cloned().unwrap_or_default();
        Step {
            name: "Lists".to_string(),
            select,
            actions: Vec::new(),
        }
    }

    fn engine() -> RecordingEngine {
        RecordingEngine::new("word")
            .paragraph("1. Intro")
            .paragraph("Body")
            .on_page(2)
            .paragraph("2. Scope")
    }

    #[test]
    fn unknown_tag_is_invalid_selector_naming_step() {
        let mut engine = engine();
        let doc = engine.open(Path::new("a.docx")).expect("open");
        let err = resolve_step(&mut engine, &doc, &step(json!({"by_sytle": ["Normal"]}))).expect_err("typo");
        match err {
            FormatError::InvalidSelector { step, detail } => {
                assert_eq!(step, "Lists");
                assert!(detail.contains("by_sytle"));
            }
            other => panic!("unexpected error: {other}"),
        }
        engine.close(doc);
    }

    #[test]
    fn regex_selector_respects_pages_and_empty_match_is_fine() {
        let mut engine = engine();
        let doc = engine.open(Path::new("a.docx")).expect("open");
        let select = json!({"by_regex": {"pattern": r"^\d+\.", "page_range": "1-1"}});
        assert_eq!(resolve_step(&mut engine, &doc, &step(select)).expect("ranges").len(), 1);

        let none = json!({"by_style": "Heading 9"});
        assert!(resolve_step(&mut engine, &doc, &step(none)).expect("ranges").is_empty());
        engine.close(doc);
    }

    #[test]
    fn backend_failure_is_step_failure() {
        let mut engine = engine().failing("select_document");
        let doc = engine.open(Path::new("a.docx")).expect("open");
        let err = resolve_step(&mut engine, &doc, &step(json!({"document": true}))).expect_err("failure");
        assert!(matches!(err, FormatError::StepFailure { ref action, .. } if action == "select document"));
        engine.close(doc);
    }
}
