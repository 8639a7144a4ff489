//! Arrangement of Sections: the table of sections at the front of an act,
//! laid out as a centred block numbered `N—`.

use crate::core::action::{Alignment, ParagraphFormat};
use crate::core::pages::PageRange;
use crate::core::units::Length;
use crate::engine::{Capability, LevelAlignment, ParagraphInfo, TextEdit, TrailingCharacter};
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult};

const HEADING: &str = "ARRANGEMENT OF SECTIONS";

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(FixAosAllParts);
    Ok(())
}

/// `20A.`, `20B)`, `7 ` and similar hand-typed numbers.
fn looks_like_manual_number(text: &str) -> bool {
    let text = text.trim();
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let rest = &text[digits..];
    let letters = rest
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .take(3)
        .count();
    let rest = &rest[letters..];
    let rest = rest.strip_prefix(['.', ')']).unwrap_or(rest);
    rest.is_empty() || rest.starts_with([' ', '\t'])
}

struct FixAosAllParts;

impl Recipe for FixAosAllParts {
    fn name(&self) -> &'static str {
        "fix_aos_all_parts"
    }

    fn description(&self) -> &'static str {
        "Centre the Arrangement of Sections block and number its items N—"
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::PageLayout]
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError> {
        let block_width_cm: f64 = params.get("block_width_cm", 12.0)?;
        let pages_span: u32 = params.get("pages_span", 3)?;

        let paragraphs = ctx.engine.paragraphs(ctx.doc, None)?;
        let Some(heading) = paragraphs
            .iter()
            .find(|p| p.text.to_uppercase().contains(HEADING))
        else {
            return Ok(RecipeResult::failed("AOS heading not found"));
        };
        let pages = match PageRange::new(heading.page, heading.page.saturating_add(pages_span)) {
            Ok(pages) => pages,
            Err(message) => return Ok(RecipeResult::failed(message)),
        };
        let block: Vec<&ParagraphInfo> = paragraphs.iter().filter(|p| pages.contains(p.page)).collect();
        let Some(first_item) = block
            .iter()
            .find(|p| p.list_level.is_some() || looks_like_manual_number(&p.text))
        else {
            return Ok(RecipeResult::failed("No list items on AOS pages"));
        };

        let text_width = ctx.engine.page_geometry(ctx.doc)?.text_width().points();
        let block_width = Length::from_cm(block_width_cm)
            .points()
            .max(1.0)
            .min(text_width * 0.9);
        let side = (text_width - block_width) / 2.0;

        let mut warnings = ctx.warnings();
        if first_item.list_level.is_some()
            && let Some(mut level) = ctx.engine.list_level_format(ctx.doc, &first_item.range)?
        {
            level.level = 1;
            level.number_format = "%1—".to_string();
            level.trailing = TrailingCharacter::None;
            level.alignment = LevelAlignment::Left;
            level.number_position = Length::ZERO;
            level.text_position = Length::ZERO;
            level.tab_position = None;
            ctx.engine
                .set_list_level_format(ctx.doc, &first_item.range, &level)?;
        }

        let manual = TextEdit::new(r"^([ \t]*\d+[A-Za-z]{0,3})[.)]?[ \t]+", "${1}—").first_only();
        let gap = TextEdit::new("—[ \t]+", "—");
        let layout = ParagraphFormat {
            alignment: Some(Alignment::Left),
            left_indent: Some(Length::from_points(side)),
            right_indent: Some(Length::from_points(side)),
            first_line_indent: Some(Length::ZERO),
            space_before: Some(Length::ZERO),
            space_after: Some(Length::ZERO),
            clear_tab_stops: Some(true),
            ..ParagraphFormat::default()
        };
        let mut touched = 0;
        for paragraph in block {
            let renumbered = match paragraph.list_level {
                Some(1) => Ok(()),
                Some(_) => ctx.engine.set_list_level_number(ctx.doc, &paragraph.range, 1),
                None if looks_like_manual_number(&paragraph.text) => ctx
                    .engine
                    .replace_text(ctx.doc, &paragraph.range, &manual)
                    .and_then(|_| ctx.engine.replace_text(ctx.doc, &paragraph.range, &gap))
                    .map(|_| ()),
                None => Ok(()),
            };
            if let Err(err) = renumbered {
                warnings.push(format!("paragraph {}: {err}", paragraph.index));
            }
            match ctx
                .engine
                .apply_paragraph_format(ctx.doc, std::slice::from_ref(&paragraph.range), &layout)
            {
                Ok(_) => touched += 1,
                Err(err) => warnings.push(format!("paragraph {}: {err}", paragraph.index)),
            }
        }

        Ok(RecipeResult::updated(
            touched,
            format!("Centred {touched} paragraph(s) of the Arrangement of Sections on pages {pages}"),
        )
        .with_pages(pages)
        .with_warnings(warnings)
        .with_detail("aos_pages", pages.to_string())
        .with_detail("items_touched", touched)
        .with_detail("center_width_pts", block_width)
        .with_detail("side_indent_pts", side))
    }
}
