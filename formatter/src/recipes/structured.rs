//! Manually numbered legal lists: `1.`, `(1)` and `(a)` mark levels 1-3.

use crate::core::action::ParagraphFormat;
use crate::core::units::Length;
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult};

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(StructuredListIndents);
    Ok(())
}

struct Level {
    style: &'static str,
    indent_inches: f64,
}

static LEVELS: [Level; 3] = [
    Level {
        style: "List Level 1",
        indent_inches: 0.0,
    },
    Level {
        style: "List Level 2",
        indent_inches: 0.3,
    },
    Level {
        style: "List Level 3",
        indent_inches: 0.6,
    },
];

/// `1.` is level 1, `(1)` level 2, `(a)` level 3.
fn level_of(text: &str) -> Option<&'static Level> {
    let text = text.trim();
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && text[digits..].starts_with('.') {
        return Some(&LEVELS[0]);
    }
    let inner = text.strip_prefix('(')?;
    let close = inner.find(')')?;
    let marker = &inner[..close];
    if !marker.is_empty() && marker.chars().all(|c| c.is_ascii_digit()) {
        Some(&LEVELS[1])
    } else if marker.len() == 1 && marker.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(&LEVELS[2])
    } else {
        None
    }
}

struct StructuredListIndents;

impl Recipe for StructuredListIndents {
    fn name(&self) -> &'static str {
        "enforce_structured_list_indents_with_styles"
    }

    fn description(&self) -> &'static str {
        "Style and indent paragraphs starting with 1., (1) or (a) as list levels 1-3"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        for level in &LEVELS {
            ctx.engine
                .ensure_paragraph_style(ctx.doc, level.style, Length::from_inches(level.indent_inches))?;
        }

        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in ctx.engine.paragraphs(ctx.doc, None)? {
            let Some(level) = level_of(&paragraph.text) else {
                continue;
            };
            let styled = paragraph
                .style
                .as_deref()
                .is_some_and(|style| style.eq_ignore_ascii_case(level.style));
            if styled {
                continue;
            }
            let range = std::slice::from_ref(&paragraph.range);
            let indent = ParagraphFormat {
                left_indent: Some(Length::from_inches(level.indent_inches)),
                first_line_indent: Some(Length::ZERO),
                ..ParagraphFormat::default()
            };
            let applied = ctx
                .engine
                .apply_style(ctx.doc, range, level.style)
                .and_then(|_| ctx.engine.apply_paragraph_format(ctx.doc, range, &indent));
            match applied {
                Ok(_) => count += 1,
                Err(err) => {
                    let head: String = paragraph.text.trim().chars().take(20).collect();
                    warnings.push(format!("paragraph starting '{head}...': {err}"));
                }
            }
        }
        Ok(RecipeResult::updated(
            count,
            format!(
                "Applied indentation and styles to {count} paragraph(s). Levels auto-detected: \
                 1→'List Level 1', 2→'List Level 2', 3→'List Level 3'."
            ),
        )
        .with_warnings(warnings))
    }
}
