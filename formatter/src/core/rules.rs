//! Typed rule set: engine preference, safety policy and ordered steps.
//!
//! Selector and action payloads stay raw here. They are parsed into
//! [`Selector`] and [`Action`] when a step runs, so that an unknown tag is
//! reported against the step that carries it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::action::Action;
use crate::core::selector::Selector;
use crate::error::FormatError;

/// Which backend a rule set asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePreference {
    #[default]
    Auto,
    /// Live word-processor automation.
    Word,
    /// In-memory docx object tree.
    Docx,
}

impl EnginePreference {
    pub const NAMES: [&'static str; 3] = ["auto", "word", "docx"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Word => "word",
            Self::Docx => "docx",
        }
    }
}

impl FromStr for EnginePreference {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "word" => Ok(Self::Word),
            "docx" => Ok(Self::Docx),
            other => Err(FormatError::Configuration(format!(
                "engine must be one of: {} (got '{other}')",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for EnginePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural invariants a run is expected to preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Safety {
    pub require_same_paragraph_count: bool,
    pub require_same_bookmark_count: bool,
    pub require_same_inline_shape_count: bool,
    pub allow_text_changes: bool,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            require_same_paragraph_count: true,
            require_same_bookmark_count: true,
            require_same_inline_shape_count: true,
            allow_text_changes: false,
        }
    }
}

/// One entry of a step's action list: a single action key and its config.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAction {
    pub key: String,
    pub config: Value,
}

impl RawAction {
    pub fn new(key: impl Into<String>, config: Value) -> Self {
        Self {
            key: key.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub select: Map<String, Value>,
    pub actions: Vec<RawAction>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rules {
    pub engine: EnginePreference,
    pub safety: Safety,
    pub steps: Vec<Step>,
}

impl Rules {
    /// Build rules from an already-parsed document (YAML, JSON or TOML).
    pub fn from_value(raw: Value) -> Result<Self, FormatError> {
        let Value::Object(mut top) = raw else {
            return Err(config_error("top-level rules must be an object"));
        };

        let engine = match top.remove("engine") {
            None | Some(Value::Null) => EnginePreference::Auto,
            Some(Value::String(name)) => name.parse()?,
            Some(other) => return Err(config_error(format!("engine must be a string, got {other}"))),
        };

        let safety = match top.remove("safety") {
            None | Some(Value::Null) => Safety::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|err| config_error(format!("invalid safety block: {err}")))?,
        };

        let steps_raw = match top.remove("steps") {
            Some(Value::Array(steps)) if !steps.is_empty() => steps,
            _ => return Err(config_error("rules.steps must be a non-empty array")),
        };

        let steps = steps_raw
            .into_iter()
            .enumerate()
            .map(|(i, raw)| parse_step(i + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            engine,
            safety,
            steps,
        })
    }

    /// Parse every selector and action eagerly and collect all problems.
    ///
    /// Recipe names are not checked here; they depend on the registry.
    pub fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for step in &self.steps {
            if let Err(err) = Selector::parse(&step.select) {
                errors.push(format!("step '{}': selector: {err}", step.name));
            }
            for action in &step.actions {
                if let Err(err) = Action::parse(&action.key, &action.config) {
                    errors.push(format!("step '{}': {err}", step.name));
                }
            }
        }
        errors
    }
}

fn parse_step(index: usize, raw: Value) -> Result<Step, FormatError> {
    let Value::Object(mut obj) = raw else {
        return Err(config_error(format!("Step #{index} must be an object")));
    };
    let name = match obj.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        None | Some(Value::Null) => format!("Step #{index}"),
        Some(other) => {
            return Err(config_error(format!(
                "Step #{index}: name must be a non-empty string, got {other}"
            )));
        }
    };

    let select = match obj.remove("select") {
        Some(Value::Object(select)) if !select.is_empty() => select,
        _ => return Err(config_error(format!("step '{name}': select must be a non-empty object"))),
    };

    let actions_raw = match obj.remove("actions") {
        Some(Value::Array(actions)) if !actions.is_empty() => actions,
        _ => return Err(config_error(format!("step '{name}': actions must be a non-empty array"))),
    };

    let mut actions = Vec::with_capacity(actions_raw.len());
    for (i, action) in actions_raw.into_iter().enumerate() {
        let Value::Object(map) = action else {
            return Err(config_error(format!(
                "step '{name}': action #{} must be an object",
                i + 1
            )));
        };
        if map.len() != 1 {
            return Err(config_error(format!(
                "step '{name}': action #{} must have exactly one key, got {}",
                i + 1,
                map.len()
            )));
        }
        if let Some((key, config)) = map.into_iter().next() {
            actions.push(RawAction { key, config });
        }
    }

    Ok(Step {
        name,
        select,
        actions,
    })
}

fn config_error(message: impl Into<String>) -> FormatError {
    FormatError::Configuration(message.into())
}
