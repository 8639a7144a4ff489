//! List-template fix-ups: what follows the number, and where number and
//! text sit.
//!
//! List level formats are shared by every paragraph of a list, so a level is
//! usually rewritten once and found already correct for later paragraphs.

use std::ops::RangeInclusive;

use crate::core::action::ParagraphFormat;
use crate::core::pages::PageRange;
use crate::core::units::Length;
use crate::core::warnings::WarningLog;
use crate::engine::{LevelAlignment, ListLevelFormat, ParagraphInfo, TrailingCharacter};
use crate::recipes::spacing::{exclude_patterns, excluded, spacing_format};
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult, page_window};

/// Positions compare equal within this many points.
const TOLERANCE: f64 = 0.1;

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(NoSpaceAfterNumber);
    registry.register(LeftIndentsLevel1To3);
    registry.register(NumericAlignment);
    registry.register(FollowNumberWithNoneLevel2);
    registry.register(FollowNumberWithNoneLevel3);
    Ok(())
}

fn list_paragraphs(
    ctx: &mut RecipeContext<'_>,
    pages: Option<PageRange>,
    levels: RangeInclusive<u8>,
) -> Result<Vec<ParagraphInfo>, RecipeError> {
    Ok(ctx
        .engine
        .paragraphs(ctx.doc, pages)?
        .into_iter()
        .filter(|p| p.list_level.is_some_and(|level| levels.contains(&level)))
        .collect())
}

/// Rewrite the level format of `paragraph` with `change`. Returns whether the
/// format differed; per-paragraph failures go to `warnings`.
fn update_level(
    ctx: &mut RecipeContext<'_>,
    paragraph: &ParagraphInfo,
    warnings: &mut WarningLog,
    change: impl FnOnce(&mut ListLevelFormat),
) -> bool {
    let result = ctx
        .engine
        .list_level_format(ctx.doc, &paragraph.range)
        .and_then(|format| {
            let Some(current) = format else {
                return Ok(false);
            };
            let mut wanted = current.clone();
            change(&mut wanted);
            if wanted == current {
                return Ok(false);
            }
            ctx.engine
                .set_list_level_format(ctx.doc, &paragraph.range, &wanted)
                .map(|()| true)
        });
    match result {
        Ok(changed) => changed,
        Err(err) => {
            warnings.push(format!(
                "list level {} at paragraph {}: {err}",
                paragraph.list_level.unwrap_or_default(),
                paragraph.index
            ));
            false
        }
    }
}

/// Trailing nothing, text flush with the number, no tab stop.
fn follow_with_nothing(format: &mut ListLevelFormat) {
    format.trailing = TrailingCharacter::None;
    format.tab_position = None;
    if !format.text_position.approx_eq(format.number_position, TOLERANCE) {
        format.text_position = format.number_position;
    }
}

struct NoSpaceAfterNumber;

impl Recipe for NoSpaceAfterNumber {
    fn name(&self) -> &'static str {
        "no_space_after_number_all_lists_fix"
    }

    fn description(&self) -> &'static str {
        "Follow every list number with nothing and align text with the number"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in list_paragraphs(ctx, None, 1..=9)? {
            if update_level(ctx, &paragraph, &mut warnings, follow_with_nothing) {
                count += 1;
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!("Updated {count} list paragraphs (removed space after number)"),
        )
        .with_warnings(warnings))
    }
}

struct LeftIndentsLevel1To3;

impl Recipe for LeftIndentsLevel1To3 {
    fn name(&self) -> &'static str {
        "enforce_list_left_indents_level1to3"
    }

    fn description(&self) -> &'static str {
        "Indent list levels 1-3 by 0.3in per level with nothing after the number"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in list_paragraphs(ctx, None, 1..=3)? {
            let level = paragraph.list_level.unwrap_or(1);
            let target = Length::from_inches(f64::from(level) * 0.3);
            let changed = update_level(ctx, &paragraph, &mut warnings, |format| {
                if !format.number_position.approx_eq(target, TOLERANCE) {
                    format.number_position = target;
                }
                if !format.text_position.approx_eq(target, TOLERANCE) {
                    format.text_position = target;
                }
                format.trailing = TrailingCharacter::None;
                format.tab_position = None;
            });
            let indent = ParagraphFormat {
                left_indent: Some(target),
                first_line_indent: Some(Length::ZERO),
                ..ParagraphFormat::default()
            };
            if let Err(err) =
                ctx.engine
                    .apply_paragraph_format(ctx.doc, std::slice::from_ref(&paragraph.range), &indent)
            {
                warnings.push(format!("paragraph {}: {err}", paragraph.index));
            }
            if changed {
                count += 1;
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!("Adjusted {count} list paragraph(s) for Level 1-3 indents"),
        )
        .with_warnings(warnings))
    }
}

struct NumericAlignment;

impl NumericAlignment {
    /// Number column per level, in inches.
    const COLUMNS: [f64; 3] = [0.5, 0.8, 1.1];
    const GAP_INCHES: f64 = 0.1;
}

impl Recipe for NumericAlignment {
    fn name(&self) -> &'static str {
        "enforce_numeric_alignment_all_lists"
    }

    fn description(&self) -> &'static str {
        "Right-align list numbers of levels 1-3 on fixed columns"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in list_paragraphs(ctx, None, 1..=3)? {
            let level = usize::from(paragraph.list_level.unwrap_or(1));
            let column = Self::COLUMNS[level.clamp(1, 3) - 1];
            let number = Length::from_inches(column);
            let text = Length::from_inches(column + Self::GAP_INCHES);
            update_level(ctx, &paragraph, &mut warnings, |format| {
                format.alignment = LevelAlignment::Right;
                format.number_position = number;
                format.text_position = text;
                format.trailing = TrailingCharacter::Tab;
                format.tab_position = None;
            });
            count += 1;
        }
        Ok(RecipeResult::updated(
            count,
            format!("Adjusted numeric alignment in {count} list paragraphs"),
        )
        .with_warnings(warnings))
    }
}

fn window(ctx: &mut RecipeContext<'_>, params: &Params) -> Result<Result<PageRange, RecipeResult>, RecipeError> {
    let (start, end) = params.page_span(9999)?;
    let pages = ctx.engine.page_count(ctx.doc)?;
    Ok(page_window(start, end, pages))
}

struct FollowNumberWithNoneLevel2;

impl Recipe for FollowNumberWithNoneLevel2 {
    fn name(&self) -> &'static str {
        "follow_number_with_none_level2"
    }

    fn description(&self) -> &'static str {
        "Follow level-2 list numbers with nothing within a page range"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let pages = match window(ctx, params)? {
            Ok(pages) => pages,
            Err(early) => return Ok(early),
        };
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in list_paragraphs(ctx, Some(pages), 2..=2)? {
            let before = warnings.len();
            update_level(ctx, &paragraph, &mut warnings, follow_with_nothing);
            if warnings.len() == before {
                count += 1;
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!("Level 2 numbers follow with nothing in {count} paragraph(s)"),
        )
        .with_pages(pages)
        .with_warnings(warnings))
    }
}

struct FollowNumberWithNoneLevel3;

impl Recipe for FollowNumberWithNoneLevel3 {
    fn name(&self) -> &'static str {
        "follow_number_with_none_level3"
    }

    fn description(&self) -> &'static str {
        "Follow level-3 list numbers with nothing and tighten their spacing"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let pages = match window(ctx, params)? {
            Ok(pages) => pages,
            Err(early) => return Ok(early),
        };
        let excludes = exclude_patterns(params, &["AOS", "Appendix", "Schedule"])?;
        let spacing = spacing_format(params)?;
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in list_paragraphs(ctx, Some(pages), 3..=3)? {
            if excluded(&excludes, paragraph.text.trim()) {
                continue;
            }
            let range = std::slice::from_ref(&paragraph.range);
            if let Err(err) = ctx.engine.apply_paragraph_format(ctx.doc, range, &spacing) {
                warnings.push(format!("paragraph {}: {err}", paragraph.index));
                continue;
            }
            let before = warnings.len();
            update_level(ctx, &paragraph, &mut warnings, follow_with_nothing);
            if warnings.len() == before {
                count += 1;
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!("Level 3 numbers follow with nothing in {count} paragraph(s)"),
        )
        .with_pages(pages)
        .with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::recipes::harness::Harness;
    use crate::test_support::DocxBuilder;

    fn lists() -> DocxBuilder {
        DocxBuilder::new()
            .numbered_paragraph(0, "one")
            .numbered_paragraph(1, "one a")
            .numbered_paragraph(2, "one a i")
            .numbered_paragraph(0, "two")
            .paragraph("plain")
    }

    #[test]
    fn nothing_follows_numbers_after_fix() {
        let mut h = Harness::open(lists());
        let result = h.run(&NoSpaceAfterNumber, json!({}));
        // One rewrite per distinct level; the second level-1 item is already fixed.
        assert_eq!(result.count_updated, 3);
        let format = h.level_format(0).expect("level 1");
        assert_eq!(format.trailing, TrailingCharacter::None);
        assert_eq!(format.text_position, format.number_position);
        assert_eq!(format.tab_position, None);
        assert_eq!(h.run(&NoSpaceAfterNumber, json!({})).count_updated, 0);
    }

    #[test]
    fn left_indents_step_by_level() {
        let mut h = Harness::open(lists());
        assert_eq!(h.run(&LeftIndentsLevel1To3, json!({})).count_updated, 3);
        let level2 = h.level_format(1).expect("level 2");
        assert!(level2.number_position.approx_eq(Length::from_inches(0.6), TOLERANCE));
        assert!(level2.text_position.approx_eq(Length::from_inches(0.6), TOLERANCE));
        assert_eq!(h.run(&LeftIndentsLevel1To3, json!({})).count_updated, 0);
        assert_eq!(h.texts()[0], "one");
    }

    #[test]
    fn numbers_right_align_on_columns() {
        let mut h = Harness::open(lists());
        assert_eq!(h.run(&NumericAlignment, json!({})).count_updated, 4);
        let level3 = h.level_format(2).expect("level 3");
        assert_eq!(level3.alignment, LevelAlignment::Right);
        assert!(level3.number_position.approx_eq(Length::from_inches(1.1), TOLERANCE));
        assert!(level3.text_position.approx_eq(Length::from_inches(1.2), TOLERANCE));
        assert_eq!(level3.trailing, TrailingCharacter::Tab);
    }

    #[test]
    fn level2_fix_only_touches_level2() {
        let mut h = Harness::open(lists());
        let result = h.run(&FollowNumberWithNoneLevel2, json!({"page_start": 1, "page_end": 2}));
        assert_eq!(result.count_updated, 1);
        assert_eq!(result.page_range.map(|r| r.to_string()).as_deref(), Some("1-1"));
        assert_eq!(h.level_format(1).expect("level 2").trailing, TrailingCharacter::None);
        assert_eq!(h.level_format(0).expect("level 1").trailing, TrailingCharacter::Tab);

        let inverted = h.run(&FollowNumberWithNoneLevel2, json!({"page_start": 3, "page_end": 2}));
        assert!(!inverted.ok);
    }

    #[test]
    fn level3_fix_skips_excluded_text() {
        let mut h = Harness::open(
            DocxBuilder::new()
                .numbered_paragraph(2, "AOS entry")
                .numbered_paragraph(2, "Body clause"),
        );
        let result = h.run(&FollowNumberWithNoneLevel3, json!({"spacing_after_pt": 2}));
        assert_eq!(result.count_updated, 1);
        assert_eq!(h.level_format(1).expect("level 3").trailing, TrailingCharacter::None);
    }
}
