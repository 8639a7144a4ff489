//! Em-dash normalisation of list numbers and surrounding spacing.

use crate::engine::{ParagraphInfo, TextEdit};
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult, page_window};

/// Only the start of a paragraph can hold a list number.
const NUMBER_HEAD_CHARS: usize = 60;

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(ListsDotToEmdash);
    registry.register(AddSpaceBeforeEmdash);
    registry.register(RemoveSpacesAroundEmdash);
    Ok(())
}

/// `1. Item` becomes `1—Item`, including numbers produced by list templates.
struct ListsDotToEmdash;

impl Recipe for ListsDotToEmdash {
    fn name(&self) -> &'static str {
        "lists_dot_to_emdash"
    }

    fn description(&self) -> &'static str {
        "Freeze list numbers and turn 'N.' into 'N—' on the leading pages"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let (start, requested_end) = params.page_span(4)?;
        let mut warnings = ctx.warnings();
        let cap = ctx.settings.legacy_page_cap;
        let end = if cap > 0 && requested_end > cap {
            warnings.push(format!(
                "INFO: Page range clamped from {start}-{requested_end} to {start}-{cap}"
            ));
            cap
        } else {
            requested_end
        };
        let pages = ctx.engine.page_count(ctx.doc)?;
        let window = match page_window(start, end, pages) {
            Ok(window) => window,
            Err(early) => return Ok(early),
        };

        let paragraphs = ctx.engine.paragraphs(ctx.doc, Some(window))?;
        let numbered: Vec<_> = paragraphs
            .iter()
            .filter(|p| p.list_level.is_some())
            .map(|p| p.range.clone())
            .collect();
        let frozen = if numbered.is_empty() {
            0
        } else {
            ctx.engine.convert_list_numbers_to_text(ctx.doc, &numbered)?
        };

        let dot = TextEdit::new(r"(\d+)\.", "${1}—").head(NUMBER_HEAD_CHARS).first_only();
        let gap = TextEdit::new("—[ \t]+", "—").head(NUMBER_HEAD_CHARS).first_only();
        let mut count = 0;
        for paragraph in &paragraphs {
            match ctx.engine.replace_text(ctx.doc, &paragraph.range, &dot) {
                Ok(replaced) => count += replaced,
                Err(err) => {
                    warnings.push(format!("paragraph {}: {err}", paragraph.index));
                    continue;
                }
            }
            if let Err(err) = ctx.engine.replace_text(ctx.doc, &paragraph.range, &gap) {
                warnings.push(format!("paragraph {}: {err}", paragraph.index));
            }
        }

        Ok(
            RecipeResult::updated(count, format!("Converted {count} list numbers to em dashes"))
                .with_pages(window)
                .with_warnings(warnings)
                .with_detail("frozen_list_numbers", frozen),
        )
    }
}

/// `1—Text` becomes ` 1—Text`.
struct AddSpaceBeforeEmdash;

fn dash_in_second_position(paragraph: &ParagraphInfo) -> bool {
    let mut chars = paragraph.text.chars();
    matches!((chars.next(), chars.next()), (Some(first), Some('—')) if first != ' ')
}

impl Recipe for AddSpaceBeforeEmdash {
    fn name(&self) -> &'static str {
        "add_space_before_emdash_paragraphs"
    }

    fn description(&self) -> &'static str {
        "Prefix a space to paragraphs whose second character is an em dash"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in ctx.engine.paragraphs(ctx.doc, None)? {
            if !dash_in_second_position(&paragraph) {
                continue;
            }
            match ctx.engine.insert_text_before(ctx.doc, &paragraph.range, " ") {
                Ok(()) => count += 1,
                Err(err) => warnings.push(format!("paragraph {}: {err}", paragraph.index)),
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!("Added leading space to {count} paragraph(s) with em dash at position 2"),
        )
        .with_warnings(warnings))
    }
}

struct RemoveSpacesAroundEmdash;

impl Recipe for RemoveSpacesAroundEmdash {
    fn name(&self) -> &'static str {
        "remove_spaces_around_em_dash"
    }

    fn description(&self) -> &'static str {
        "Remove spaces and non-breaking spaces on either side of em dashes"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let (start, end) = params.page_span(999)?;
        let pages = ctx.engine.page_count(ctx.doc)?;
        let window = match page_window(start, end, pages) {
            Ok(window) => window,
            Err(early) => return Ok(early),
        };
        let edit = TextEdit::new("[ \u{a0}]*—[ \u{a0}]*", "—");
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in ctx.engine.paragraphs(ctx.doc, Some(window))? {
            if !paragraph.text.contains('—') {
                continue;
            }
            match ctx.engine.replace_text(ctx.doc, &paragraph.range, &edit) {
                Ok(replaced) => count += replaced,
                Err(err) => warnings.push(format!("paragraph {}: {err}", paragraph.index)),
            }
        }
        Ok(
            RecipeResult::updated(count, format!("Removed spaces around {count} em dashes"))
                .with_pages(window)
                .with_warnings(warnings),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::recipes::RecipeSettings;
    use crate::recipes::harness::Harness;
    use crate::test_support::DocxBuilder;

    #[test]
    fn plain_number_becomes_em_dash_once() {
        let mut h = Harness::open(DocxBuilder::new().paragraph("1. First item").paragraph("No number"));
        let result = h.run(&ListsDotToEmdash, json!({"page_start": 1, "page_end": 4}));
        assert!(result.ok);
        assert_eq!(result.count_updated, 1);
        assert_eq!(h.texts(), vec!["1—First item", "No number"]);
        assert_eq!(result.page_range.map(|r| r.to_string()).as_deref(), Some("1-1"));

        let again = h.run(&ListsDotToEmdash, json!({}));
        assert_eq!(again.count_updated, 0);
        assert_eq!(h.texts(), vec!["1—First item", "No number"]);
    }

    #[test]
    fn list_numbers_are_frozen_before_conversion() {
        let mut h = Harness::open(
            DocxBuilder::new()
                .numbered_paragraph(0, "First item")
                .numbered_paragraph(0, "Second item"),
        );
        let result = h.run(&ListsDotToEmdash, json!({}));
        assert_eq!(result.count_updated, 2);
        assert_eq!(h.texts(), vec!["1—First item", "2—Second item"]);
        assert_eq!(result.details.get("frozen_list_numbers"), Some(&json!(2)));
    }

    #[test]
    fn page_end_is_capped_with_a_note() {
        let mut h = Harness::open(DocxBuilder::new().paragraph("1. a"));
        let result = h.run(&ListsDotToEmdash, json!({"page_end": 10}));
        assert_eq!(result.warnings, vec!["INFO: Page range clamped from 1-10 to 1-4"]);

        let mut h = Harness::open(DocxBuilder::new().paragraph("1. a")).with_settings(RecipeSettings {
            legacy_page_cap: 0,
            ..RecipeSettings::default()
        });
        let result = h.run(&ListsDotToEmdash, json!({"page_end": 10}));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn start_past_the_cap_is_unsuccessful() {
        let mut h = Harness::open(DocxBuilder::new().paragraph("1. a"));
        let result = h.run(&ListsDotToEmdash, json!({"page_start": 6, "page_end": 8}));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("End page must be >= start page"));
        assert_eq!(h.texts(), vec!["1. a"]);
    }

    #[test]
    fn start_past_the_last_page_changes_nothing() {
        let mut h = Harness::open(DocxBuilder::new().paragraph("1. a"));
        let result = h.run(&ListsDotToEmdash, json!({"page_start": 3, "page_end": 4}));
        assert!(result.ok);
        assert_eq!(result.count_updated, 0);
        assert_eq!(result.description, "Page range 3-4 starts after the last page (1)");
        assert_eq!(h.texts(), vec!["1. a"]);
    }

    #[test]
    fn numbers_beyond_the_head_are_left_alone() {
        let long = format!("{}1. late", "x".repeat(70));
        let mut h = Harness::open(DocxBuilder::new().paragraph(&long));
        assert_eq!(h.run(&ListsDotToEmdash, json!({})).count_updated, 0);
        assert_eq!(h.texts(), vec![long]);
    }

    #[test]
    fn space_goes_before_second_position_dash() {
        let mut h = Harness::open(
            DocxBuilder::new()
                .paragraph("1—Text")
                .paragraph(" 2—Text")
                .paragraph("12—Text"),
        );
        assert_eq!(h.run(&AddSpaceBeforeEmdash, json!({})).count_updated, 1);
        assert_eq!(h.texts(), vec![" 1—Text", " 2—Text", "12—Text"]);
    }

    #[test]
    fn spaces_around_dashes_collapse() {
        let mut h = Harness::open(
            DocxBuilder::new()
                .paragraph("a — b")
                .paragraph("c\u{a0}—d —e")
                .paragraph("f—g"),
        );
        assert_eq!(h.run(&RemoveSpacesAroundEmdash, json!({})).count_updated, 3);
        assert_eq!(h.texts(), vec!["a—b", "c—d—e", "f—g"]);
    }
}
