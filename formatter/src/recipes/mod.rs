//! Named recipes: bespoke fix-ups invoked from rules by string name.
//!
//! Every recipe is written against the [`Engine`] recipe primitives, so one
//! definition runs on either backend. Recipes that need a feature only some
//! backends provide declare it through [`Recipe::requires`]; the dispatcher
//! checks it before calling [`Recipe::run`].
//!
//! The registry is built once at startup from a fixed table of module
//! registrars and is read-only afterwards.

mod aos;
mod emdash;
mod list_levels;
mod spacing;
mod structured;
mod tabs;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::pages::PageRange;
use crate::core::warnings::WarningLog;
use crate::engine::{Capability, DocumentHandle, Engine};
use crate::error::EngineError;

/// Knobs shared by all recipes, taken from the `[recipes]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeSettings {
    /// Hard cap on the end page of page-limited recipes; `0` disables it.
    pub legacy_page_cap: u32,
    pub warning_limit: usize,
}

impl Default for RecipeSettings {
    fn default() -> Self {
        Self {
            legacy_page_cap: 4,
            warning_limit: 10,
        }
    }
}

pub struct RecipeContext<'a> {
    pub engine: &'a mut dyn Engine,
    pub doc: &'a DocumentHandle,
    pub settings: &'a RecipeSettings,
}

impl RecipeContext<'_> {
    pub fn warnings(&self) -> WarningLog {
        WarningLog::new(self.settings.warning_limit)
    }
}

/// Recipe parameters. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Typed value of `key`, or `default` when absent or null.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, RecipeError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| RecipeError::Param {
                key: key.to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// `page_start`/`page_end` with the given default end page.
    pub fn page_span(&self, default_end: u32) -> Result<(u32, u32), RecipeError> {
        Ok((self.get("page_start", 1)?, self.get("page_end", default_end)?))
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Error)]
pub enum RecipeError {
    /// Reported as an unsuccessful result, not a step failure.
    #[error("parameter '{key}': {message}")]
    Param { key: String, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecipeResult {
    pub ok: bool,
    pub count_updated: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<PageRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl RecipeResult {
    pub fn updated(count: usize, description: impl Into<String>) -> Self {
        Self {
            ok: true,
            count_updated: count,
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_pages(mut self, pages: PageRange) -> Self {
        self.page_range = Some(pages);
        self
    }

    pub fn with_warnings(mut self, warnings: WarningLog) -> Self {
        self.warnings.extend(warnings.into_vec());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub trait Recipe: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Capabilities the active engine must provide.
    fn requires(&self) -> &'static [Capability] {
        &[]
    }

    fn run(&self, ctx: &mut RecipeContext<'_>, params: &Params) -> Result<RecipeResult, RecipeError>;
}

/// Registers the recipes one module provides.
pub type Registrar = fn(&mut RecipeRegistry) -> Result<(), String>;

const BUILTIN_MODULES: &[(&str, Registrar)] = &[
    ("emdash", emdash::register),
    ("tabs", tabs::register),
    ("list_levels", list_levels::register),
    ("spacing", spacing::register),
    ("structured", structured::register),
    ("aos", aos::register),
];

#[derive(Clone, Default)]
pub struct RecipeRegistry {
    recipes: BTreeMap<&'static str, Arc<dyn Recipe>>,
}

impl std::fmt::Debug for RecipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.recipes.keys()).finish()
    }
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recipe shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_modules(BUILTIN_MODULES)
    }

    /// Run each registrar in order. A failing module is logged and skipped;
    /// whatever it registered before failing stays registered.
    pub fn from_modules(modules: &[(&str, Registrar)]) -> Self {
        let mut registry = Self::new();
        for (module, registrar) in modules {
            match registrar(&mut registry) {
                Ok(()) => debug!(module = %module, "registered recipe module"),
                Err(err) => warn!(module = %module, err = %err, "recipe module failed to register"),
            }
        }
        registry
    }

    /// First registration of a name wins.
    pub fn register(&mut self, recipe: impl Recipe + 'static) {
        let name = recipe.name();
        if self.recipes.contains_key(name) {
            warn!(recipe = name, "duplicate recipe name ignored");
            return;
        }
        self.recipes.insert(name, Arc::new(recipe));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Recipe>> {
        self.recipes.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.recipes.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Recipe>> + '_ {
        self.recipes.values()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Resolve `page_start..=page_end` against the document, or the result to
/// return without touching it: a failure for an inverted or invalid span, an
/// empty success when the span starts after the last page.
pub(crate) fn page_window(start: u32, end: u32, pages: u32) -> Result<PageRange, RecipeResult> {
    if end < start {
        return Err(RecipeResult::failed("End page must be >= start page"));
    }
    if start > pages.max(1) {
        return Err(RecipeResult::updated(
            0,
            format!("Page range {start}-{end} starts after the last page ({pages})"),
        ));
    }
    PageRange::new(start, end.min(pages.max(start))).map_err(RecipeResult::failed)
}

/// A recipe run against a real docx fixture.
#[cfg(test)]
pub(crate) mod harness {
    use serde_json::Value;
    use tempfile::TempDir;

    use super::{Params, Recipe, RecipeContext, RecipeResult, RecipeSettings};
    use crate::engine::docx::DocxEngine;
    use crate::engine::{DocumentHandle, Engine, ListLevelFormat, ParagraphInfo};
    use crate::test_support::DocxBuilder;

    pub struct Harness {
        _dir: TempDir,
        pub engine: DocxEngine,
        pub doc: DocumentHandle,
        settings: RecipeSettings,
    }

    impl Harness {
        pub fn open(builder: DocxBuilder) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = builder.write_to(dir.path(), "doc.docx");
            let mut engine = DocxEngine::new();
            let doc = engine.open(&path).expect("open");
            Self {
                _dir: dir,
                engine,
                doc,
                settings: RecipeSettings::default(),
            }
        }

        pub fn with_settings(mut self, settings: RecipeSettings) -> Self {
            self.settings = settings;
            self
        }

        pub fn run(&mut self, recipe: &dyn Recipe, params: Value) -> RecipeResult {
            let params = Params::new(params.as_object().cloned().unwrap_or_default());
            let mut ctx = RecipeContext {
                engine: &mut self.engine,
                doc: &self.doc,
                settings: &self.settings,
            };
            recipe.run(&mut ctx, &params).expect("run recipe")
        }

        pub fn paragraphs(&mut self) -> Vec<ParagraphInfo> {
            self.engine.paragraphs(&self.doc, None).expect("paragraphs")
        }

        pub fn texts(&mut self) -> Vec<String> {
            self.paragraphs().into_iter().map(|p| p.text).collect()
        }

        /// Level format of the `n`th (0-based) paragraph.
        pub fn level_format(&mut self, n: usize) -> Option<ListLevelFormat> {
            let range = self.paragraphs()[n].range.clone();
            self.engine.list_level_format(&self.doc, &range).expect("level format")
        }
    }
}
