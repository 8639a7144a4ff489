//! Formatter configuration stored in `format-docx.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::engine::live::LiveOptions;
use crate::engine::select::SelectionOptions;
use crate::recipes::RecipeSettings;

pub const DEFAULT_CONFIG_PATH: &str = "format-docx.toml";

/// Formatter configuration (TOML).
///
/// Edited by humans; missing fields take their defaults. CLI flags override
/// whatever is loaded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatterConfig {
    pub output: OutputConfig,
    pub recipes: RecipesConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Artifacts go to `<dir>/<input stem>/`.
    pub dir: PathBuf,
    /// Export a PDF next to the saved document.
    pub pdf: bool,
    /// Write `<stem>.audit.json`.
    pub audit: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            pdf: true,
            audit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecipesConfig {
    /// Last page the dot-to-em-dash recipe may touch; `0` lifts the cap.
    pub legacy_page_cap: u32,
    /// Warnings kept per recipe run before summarising the rest.
    pub warning_limit: usize,
}

impl Default for RecipesConfig {
    fn default() -> Self {
        let settings = RecipeSettings::default();
        Self {
            legacy_page_cap: settings.legacy_page_cap,
            warning_limit: settings.warning_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveConfig {
    /// Automation bridge host command (e.g. `["word-bridge"]`).
    pub command: Vec<String>,
    pub require_windows: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            command: vec!["word-bridge".to_string()],
            require_windows: true,
            shutdown_grace_secs: 10,
        }
    }
}

impl FormatterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output.dir.as_os_str().is_empty() {
            return Err(anyhow!("output.dir must not be empty"));
        }
        if self.recipes.warning_limit == 0 {
            return Err(anyhow!("recipes.warning_limit must be > 0"));
        }
        if self.live.command.is_empty() || self.live.command[0].trim().is_empty() {
            return Err(anyhow!("live.command must be a non-empty array"));
        }
        if self.live.shutdown_grace_secs == 0 {
            return Err(anyhow!("live.shutdown_grace_secs must be > 0"));
        }
        Ok(())
    }

    pub fn recipe_settings(&self) -> RecipeSettings {
        RecipeSettings {
            legacy_page_cap: self.recipes.legacy_page_cap,
            warning_limit: self.recipes.warning_limit,
        }
    }

    pub fn selection_options(&self) -> SelectionOptions {
        SelectionOptions {
            live: LiveOptions {
                command: self.live.command.clone(),
                shutdown_grace: Duration::from_secs(self.live.shutdown_grace_secs),
            },
            require_windows: self.live.require_windows,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FormatterConfig::default()`.
pub fn load_config(path: &Path) -> Result<FormatterConfig> {
    if !path.exists() {
        return Ok(FormatterConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FormatterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate().with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FormatterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FormatterConfig::default());
        assert_eq!(cfg.recipe_settings(), RecipeSettings::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("format-docx.toml");
        let cfg = FormatterConfig::default();
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("format-docx.toml");
        fs::write(&path, "[recipes]\nlegacy_page_cap = 0\n\n[live]\nrequire_windows = false\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.recipes.legacy_page_cap, 0);
        assert_eq!(cfg.recipes.warning_limit, 10);
        assert!(cfg.output.pdf);
        let selection = cfg.selection_options();
        assert!(!selection.require_windows);
        assert_eq!(selection.live.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_bridge_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("format-docx.toml");
        fs::write(&path, "[live]\ncommand = []\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("live.command"));
    }
}
