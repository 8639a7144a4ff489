use crate::engine::TextEdit;
use crate::recipes::{Params, Recipe, RecipeContext, RecipeError, RecipeRegistry, RecipeResult};

pub(super) fn register(registry: &mut RecipeRegistry) -> Result<(), String> {
    registry.register(RemoveAllTabs);
    Ok(())
}

struct RemoveAllTabs;

impl Recipe for RemoveAllTabs {
    fn name(&self) -> &'static str {
        "remove_all_tabs"
    }

    fn description(&self) -> &'static str {
        "Delete every tab character in the document body"
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, _params: &Params) -> Result<RecipeResult, RecipeError> {
        let edit = TextEdit::new("\t", "");
        let mut warnings = ctx.warnings();
        let mut count = 0;
        for paragraph in ctx.engine.paragraphs(ctx.doc, None)? {
            if !paragraph.text.contains('\t') {
                continue;
            }
            match ctx.engine.replace_text(ctx.doc, &paragraph.range, &edit) {
                Ok(removed) => count += removed,
                Err(err) => warnings.push(format!("paragraph {}: {err}", paragraph.index)),
            }
        }
        Ok(RecipeResult::updated(count, "All tab characters have been removed from the document")
            .with_warnings(warnings))
    }
}
