//! Action dispatch: one parsed action applied to the ranges a step resolved.
//!
//! Order of checks for every action:
//!
//! 1. parse (`UnknownAction`, or a configuration error for a bad payload);
//! 2. text-change gate for text-mutating actions;
//! 3. for recipes: enabled flag, registry lookup, capability check;
//! 4. an empty range list applies nothing;
//! 5. the engine primitive, whose errors become `StepFailure`.

use tracing::{debug, warn};

use crate::core::action::{Action, ActionParseError, RecipeCall};
use crate::core::rules::{RawAction, Safety};
use crate::engine::{DocumentHandle, Engine, EngineResult, Range};
use crate::error::FormatError;
use crate::recipes::{Params, RecipeContext, RecipeError, RecipeRegistry, RecipeResult, RecipeSettings};

/// Everything a dispatch needs besides the engine and the ranges.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub step: &'a str,
    pub safety: &'a Safety,
    pub registry: &'a RecipeRegistry,
    pub settings: &'a RecipeSettings,
}

/// Result of applying one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// Canonical action key.
    pub action: String,
    pub modifications: usize,
    pub warnings: Vec<String>,
    /// Full recipe result for recipe actions that actually ran.
    pub recipe: Option<RecipeResult>,
}

impl ActionOutcome {
    fn applied(action: &Action, modifications: usize) -> Self {
        Self {
            action: action.key().to_string(),
            modifications,
            ..Self::default()
        }
    }
}

/// Parse `raw` and apply it.
pub fn dispatch(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    ranges: &[Range],
    raw: &RawAction,
    ctx: StepContext<'_>,
) -> Result<ActionOutcome, FormatError> {
    let action = Action::parse(&raw.key, &raw.config).map_err(|err| match err {
        ActionParseError::Unknown(action) => FormatError::UnknownAction {
            step: ctx.step.to_string(),
            action,
        },
        malformed @ ActionParseError::Malformed { .. } => {
            FormatError::Configuration(format!("step '{}': {malformed}", ctx.step))
        }
    })?;
    apply(engine, doc, ranges, &action, ctx)
}

/// Apply an already parsed action.
pub fn apply(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    ranges: &[Range],
    action: &Action,
    ctx: StepContext<'_>,
) -> Result<ActionOutcome, FormatError> {
    if let Some(allowed) = action.text_change_override()
        && !allowed.unwrap_or(ctx.safety.allow_text_changes)
    {
        return Err(FormatError::TextChangeDisallowed {
            step: ctx.step.to_string(),
            action: action.key().to_string(),
        });
    }

    if let Action::Recipe(call) = action {
        return run_recipe(engine, doc, ranges, call, ctx);
    }

    if ranges.is_empty() {
        debug!(step = ctx.step, action = action.key(), "selector matched nothing, skipping action");
        return Ok(ActionOutcome::applied(action, 0));
    }

    let modifications = primitive(engine, doc, ranges, action).map_err(|source| FormatError::StepFailure {
        step: ctx.step.to_string(),
        action: action.key().to_string(),
        source,
    })?;
    debug!(step = ctx.step, action = action.key(), modifications, "applied action");
    Ok(ActionOutcome::applied(action, modifications))
}

fn primitive(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    ranges: &[Range],
    action: &Action,
) -> EngineResult<usize> {
    match action {
        Action::ParagraphFormat(format) => engine.apply_paragraph_format(doc, ranges, format),
        Action::StyleApply(style) => engine.apply_style(doc, ranges, &style.name),
        Action::Numbering(numbering) => engine.apply_numbering(doc, ranges, numbering),
        Action::HeadersFooters(config) => engine.set_headers_footers(doc, config),
        Action::FieldUpdate(config) => engine.update_fields(doc, config),
        Action::FindReplace(config) => engine.find_replace(doc, config),
        Action::PageSetup(config) => engine.apply_page_setup(doc, config),
        Action::SectionBreak(config) => engine.insert_section_break(doc, ranges, config),
        Action::BookmarkText(config) => engine.replace_bookmark_text(doc, config),
        Action::ContentControlText(config) => engine.replace_content_control_text(doc, config),
        Action::TableFormat(config) => engine.format_table(doc, ranges, config),
        Action::InsertImage(config) => engine.insert_image(doc, ranges, config),
        Action::RawCommands(commands) => engine.run_raw_commands(doc, commands),
        Action::Recipe(_) => Ok(0),
    }
}

fn run_recipe(
    engine: &mut dyn Engine,
    doc: &DocumentHandle,
    ranges: &[Range],
    call: &RecipeCall,
    ctx: StepContext<'_>,
) -> Result<ActionOutcome, FormatError> {
    let mut outcome = ActionOutcome {
        action: "word_recipe".to_string(),
        ..ActionOutcome::default()
    };
    if !call.enabled {
        debug!(step = ctx.step, recipe = %call.name, "recipe disabled");
        return Ok(outcome);
    }

    let Some(recipe) = ctx.registry.get(&call.name) else {
        return Err(FormatError::UnknownRecipe {
            step: ctx.step.to_string(),
            name: call.name.clone(),
            available: ctx.registry.names().into_iter().map(str::to_string).collect(),
        });
    };

    let capabilities = engine.capabilities();
    if let Some(missing) = capabilities.first_missing(recipe.requires()) {
        return Err(FormatError::CapabilityMismatch {
            step: ctx.step.to_string(),
            recipe: call.name.clone(),
            engine: engine.name(),
            missing,
        });
    }

    if ranges.is_empty() {
        debug!(step = ctx.step, recipe = %call.name, "selector matched nothing, skipping recipe");
        return Ok(outcome);
    }

    let params = Params::new(call.params.clone());
    let result = {
        let mut recipe_ctx = RecipeContext {
            engine: &mut *engine,
            doc,
            settings: ctx.settings,
        };
        recipe.run(&mut recipe_ctx, &params)
    };
    let result = match result {
        Ok(result) => result,
        Err(RecipeError::Param { key, message }) => {
            RecipeResult::failed(format!("parameter '{key}': {message}"))
        }
        Err(RecipeError::Engine(source)) => {
            return Err(FormatError::StepFailure {
                step: ctx.step.to_string(),
                action: format!("word_recipe {}", call.name),
                source,
            });
        }
    };

    if result.ok {
        outcome.modifications = result.count_updated;
        outcome.warnings.extend(
            result
                .warnings
                .iter()
                .map(|warning| format!("recipe '{}': {warning}", call.name)),
        );
        debug!(
            step = ctx.step,
            recipe = %call.name,
            count_updated = result.count_updated,
            "recipe finished"
        );
    } else {
        let error = result.error.as_deref().unwrap_or("recipe reported failure");
        warn!(step = ctx.step, recipe = %call.name, error, "recipe unsuccessful");
        outcome.warnings.push(format!("recipe '{}': {error}", call.name));
    }
    outcome.recipe = Some(result);
    Ok(outcome)
}
