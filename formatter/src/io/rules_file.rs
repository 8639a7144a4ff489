//! Rule files: YAML, JSON or TOML, schema-checked, then typed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::rules::Rules;
use crate::error::FormatError;

const RULES_SCHEMA: &str = include_str!("../../schemas/rules.schema.json");

/// Read, validate and type a rule file.
///
/// Every failure is a [`FormatError::Configuration`].
pub fn load_rules(path: &Path) -> Result<Rules, FormatError> {
    let value = read_rules_value(path)
        .map_err(|err| FormatError::Configuration(format!("{err:#}")))?;
    validate_rules_value(&value)?;
    let rules = Rules::from_value(value)?;
    debug!(
        path = %path.display(),
        engine = %rules.engine,
        steps = rules.steps.len(),
        "rules loaded"
    );
    Ok(rules)
}

/// Parse a rule file into a JSON value, choosing the format by extension.
pub fn read_rules_value(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path).with_context(|| format!("read rules {}", path.display()))?;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let value = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("parse yaml {}", path.display()))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("parse json {}", path.display()))?,
        "toml" => {
            let table: toml::Table =
                toml::from_str(&contents).with_context(|| format!("parse toml {}", path.display()))?;
            serde_json::to_value(table).context("convert toml to json")?
        }
        other => bail!(
            "unsupported rules format '{other}' for {} (expected .yaml, .yml, .json or .toml)",
            path.display()
        ),
    };
    Ok(value)
}

/// Check a parsed rule set against the embedded JSON Schema.
pub fn validate_rules_value(value: &Value) -> Result<(), FormatError> {
    let messages = schema_errors(value).map_err(|err| FormatError::Configuration(format!("{err:#}")))?;
    if messages.is_empty() {
        return Ok(());
    }
    Err(FormatError::Configuration(format!(
        "rules schema validation failed:\n- {}",
        messages.join("\n- ")
    )))
}

fn schema_errors(value: &Value) -> Result<Vec<String>> {
    let schema: Value = serde_json::from_str(RULES_SCHEMA).context("parse rules schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("compile rules schema: {err}"))?;
    Ok(compiled
        .iter_errors(value)
        .map(|err| {
            let location = err.instance_path().to_string();
            match step_name(value, &location) {
                Some(step) => format!("step '{step}': {err} (at {location})"),
                None if location.is_empty() => err.to_string(),
                None => format!("{err} (at {location})"),
            }
        })
        .collect())
}

/// Name of the step an instance path like `/steps/2/actions/0` points into.
fn step_name(value: &Value, location: &str) -> Option<String> {
    let index: usize = location.strip_prefix("/steps/")?.split('/').next()?.parse().ok()?;
    let name = value
        .get("steps")?
        .get(index)?
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| format!("Step #{}", index + 1), str::to_string);
    Some(name)
}
