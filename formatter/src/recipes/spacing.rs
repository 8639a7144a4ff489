//! Paragraph spacing for level-3 headings such as `1.2.3`.

use regex::{Regex, RegexBuilder};

use crate::core::action::{Alignment, ParagraphFormat};
use crate::core::units::Length;
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult};

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(TightenLevel3Spacing);
    Ok(())
}

/// Spacing parameters shared by the level-3 recipes.
pub(super) fn spacing_format(params: &Params) -> Result<ParagraphFormat, RecipeError> {
    let alignment: String = params.get("paragraph_alignment", "left".to_string())?;
    Ok(ParagraphFormat {
        alignment: Some(Alignment::from_name(&alignment)),
        line_spacing: Some(params.get("line_spacing_multiple", 1.0)?),
        space_before: Some(Length::from_points(params.get("spacing_before_pt", 0.0)?)),
        space_after: Some(Length::from_points(params.get("spacing_after_pt", 0.0)?)),
        keep_with_next: Some(params.get("keep_with_next", false)?),
        ..ParagraphFormat::default()
    })
}

/// Case-insensitive patterns from `exclude_patterns`.
pub(super) fn exclude_patterns(params: &Params, default: &[&str]) -> Result<Vec<Regex>, RecipeError> {
    let raw: Vec<String> = params.get(
        "exclude_patterns",
        default.iter().map(|p| (*p).to_string()).collect(),
    )?;
    raw.iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| RecipeError::Param {
                    key: "exclude_patterns".to_string(),
                    message: err.to_string(),
                })
        })
        .collect()
}

pub(super) fn excluded(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(text))
}

struct TightenLevel3Spacing;

impl Recipe for TightenLevel3Spacing {
    fn name(&self) -> &'static str {
        "tighten_level3_spacing"
    }

    fn description(&self) -> &'static str {
        "Tighten spacing of paragraphs numbered like 1.2.3, skipping excluded sections"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let pattern: String = params.get("detect_pattern", r"^(\d+\.\d+\.\d+)".to_string())?;
        let detect = Regex::new(&pattern).map_err(|err| RecipeError::Param {
            key: "detect_pattern".to_string(),
            message: err.to_string(),
        })?;
        let excludes = exclude_patterns(params, &[])?;
        let format = spacing_format(params)?;

        let targets: Vec<_> = ctx
            .engine
            .paragraphs(ctx.doc, None)?
            .into_iter()
            .filter(|p| {
                let text = p.text.trim();
                !text.is_empty() && !excluded(&excludes, text) && detect.is_match(text)
            })
            .map(|p| p.range)
            .collect();
        let count = if targets.is_empty() {
            0
        } else {
            ctx.engine.apply_paragraph_format(ctx.doc, &targets, &format)?
        };
        Ok(RecipeResult::updated(
            count,
            format!("Tightened spacing for {count} level-3 paragraphs"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::recipes::harness::Harness;
    use crate::test_support::DocxBuilder;

    #[test]
    fn only_detected_and_not_excluded_paragraphs_change() {
        let mut h = Harness::open(
            DocxBuilder::new()
                .paragraph("1.2.3 Scope")
                .paragraph("1.2 Parent")
                .paragraph("2.4.1 Schedule of fees")
                .paragraph("   3.1.1 Indented"),
        );
        let result = h.run(
            &TightenLevel3Spacing,
            json!({"exclude_patterns": ["schedule"], "spacing_after_pt": 3}),
        );
        assert_eq!(result.count_updated, 2);
    }

    #[test]
    fn bad_pattern_is_a_parameter_error() {
        let params = Params::new(json!({"detect_pattern": "("}).as_object().cloned().unwrap_or_default());
        let mut h = Harness::open(DocxBuilder::new().paragraph("1.2.3"));
        let mut ctx = crate::recipes::RecipeContext {
            engine: &mut h.engine,
            doc: &h.doc,
            settings: &crate::recipes::RecipeSettings::default(),
        };
        let err = TightenLevel3Spacing.run(&mut ctx, &params).expect_err("bad regex");
        assert!(matches!(err, RecipeError::Param { ref key, .. } if key == "detect_pattern"));
    }

    #[test]
    fn spacing_params_map_to_paragraph_format() {
        let params = Params::new(
            json!({"paragraph_alignment": "Center", "line_spacing_multiple": 1.5, "keep_with_next": true})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        let format = spacing_format(&params).expect("format");
        assert_eq!(format.alignment, Some(Alignment::Center));
        assert_eq!(format.line_spacing, Some(1.5));
        assert_eq!(format.space_before, Some(Length::ZERO));
        assert_eq!(format.keep_with_next, Some(true));
    }
}
