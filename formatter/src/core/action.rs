//! Action grammar: what a step does to the ranges its selector produced.
//!
//! Each action entry is `{ <key>: <config> }`. [`Action::parse`] maps the key
//! to a typed configuration; an unknown key is [`ActionParseError::Unknown`],
//! a known key with a bad payload is [`ActionParseError::Malformed`].

use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::raw_command::{RawCommand, RawCommandList};
use crate::core::units::Length;

pub const ACTION_KEYS: [&str; 14] = [
    "paragraph_format",
    "style_apply",
    "numbering",
    "headers_footers",
    "field_update",
    "find_replace",
    "page_setup",
    "section_breaks",
    "bookmark_text",
    "content_control_text",
    "table_format",
    "insert_image",
    "raw_word_com",
    "word_recipe",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ActionParseError {
    Unknown(String),
    Malformed { action: String, message: String },
}

impl fmt::Display for ActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(key) => write!(
                f,
                "unknown action '{key}' (expected one of: {})",
                ACTION_KEYS.join(", ")
            ),
            Self::Malformed { action, message } => write!(f, "action '{action}': {message}"),
        }
    }
}

impl std::error::Error for ActionParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    #[serde(alias = "justified", alias = "both")]
    Justify,
}

impl Alignment {
    /// Lenient parse used by recipe parameters; unknown values fall back to left.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Self::Center,
            "right" => Self::Right,
            "justify" | "justified" | "both" => Self::Justify,
            _ => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParagraphFormat {
    pub alignment: Option<Alignment>,
    /// Multiple of single line spacing.
    pub line_spacing: Option<f64>,
    pub space_before: Option<Length>,
    pub space_after: Option<Length>,
    pub left_indent: Option<Length>,
    pub right_indent: Option<Length>,
    pub first_line_indent: Option<Length>,
    pub keep_with_next: Option<bool>,
    pub keep_together: Option<bool>,
    pub page_break_before: Option<bool>,
    pub widow_control: Option<bool>,
    pub clear_tab_stops: Option<bool>,
}

impl ParagraphFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleApply {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RestartAt {
    Number(u32),
    Keyword(RestartKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartKeyword {
    Auto,
    Continue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Numbering {
    /// 1-based outline level.
    pub outline_level: Option<u8>,
    pub list_template: Option<String>,
    pub restart_at: Option<RestartAt>,
    pub list_style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderFooterText {
    pub left: Option<String>,
    pub center: Option<String>,
    pub right: Option<String>,
}

impl HeaderFooterText {
    /// `left<TAB>center<TAB>right`, trailing empty slots dropped.
    pub fn joined(&self) -> String {
        let slots = [&self.left, &self.center, &self.right];
        let last = slots.iter().rposition(|slot| slot.is_some()).map_or(0, |i| i + 1);
        slots[..last]
            .iter()
            .map(|slot| slot.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeadersFooters {
    pub header: Option<HeaderFooterText>,
    pub footer: Option<HeaderFooterText>,
    pub different_first_page: Option<bool>,
    pub different_odd_even: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldUpdate {
    pub update_all_fields: bool,
    pub update_toc: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindReplace {
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub regex: bool,
    /// Word wildcard syntax; only the live backend understands it.
    #[serde(default)]
    pub wildcards: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub match_case: bool,
    #[serde(default)]
    pub allow_text_change: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A3,
    A4,
    A5,
    #[serde(alias = "letter")]
    Letter,
    #[serde(alias = "legal")]
    Legal,
}

impl PaperSize {
    /// Portrait width and height in points.
    pub fn dimensions(self) -> (Length, Length) {
        match self {
            Self::A3 => (Length::from_points(841.9), Length::from_points(1190.55)),
            Self::A4 => (Length::from_points(595.3), Length::from_points(841.9)),
            Self::A5 => (Length::from_points(419.55), Length::from_points(595.3)),
            Self::Letter => (Length::from_inches(8.5), Length::from_inches(11.0)),
            Self::Legal => (Length::from_inches(8.5), Length::from_inches(14.0)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Margins {
    pub top: Option<Length>,
    pub bottom: Option<Length>,
    pub left: Option<Length>,
    pub right: Option<Length>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageSetup {
    pub margins: Option<Margins>,
    pub orientation: Option<Orientation>,
    pub paper_size: Option<PaperSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakType {
    #[default]
    NextPage,
    Continuous,
    EvenPage,
    OddPage,
}

impl BreakType {
    pub fn ooxml(self) -> &'static str {
        match self {
            Self::NextPage => "nextPage",
            Self::Continuous => "continuous",
            Self::EvenPage => "evenPage",
            Self::OddPage => "oddPage",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionBreak {
    pub insert_before_selector: bool,
    #[serde(rename = "type")]
    pub break_type: BreakType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookmarkText {
    pub name: String,
    pub replace_text: String,
    #[serde(default)]
    pub allow_text_change: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentControlText {
    pub title_or_tag: String,
    pub replace_text: String,
    #[serde(default)]
    pub allow_text_change: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableFormat {
    /// 1-based table index; when absent the selected ranges are used.
    pub index: Option<usize>,
    pub style: Option<String>,
    pub autofit: Option<bool>,
    pub header_row: Option<bool>,
    pub banded_rows: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageAnchor {
    #[default]
    Inline,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertImage {
    pub path: PathBuf,
    #[serde(default)]
    pub anchor: ImageAnchor,
    #[serde(default)]
    pub width: Option<Length>,
    #[serde(default)]
    pub height: Option<Length>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeCall {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ParagraphFormat(ParagraphFormat),
    StyleApply(StyleApply),
    Numbering(Numbering),
    HeadersFooters(HeadersFooters),
    FieldUpdate(FieldUpdate),
    FindReplace(FindReplace),
    PageSetup(PageSetup),
    SectionBreak(SectionBreak),
    BookmarkText(BookmarkText),
    ContentControlText(ContentControlText),
    TableFormat(TableFormat),
    InsertImage(InsertImage),
    RawCommands(Vec<RawCommand>),
    Recipe(RecipeCall),
}

impl Action {
    pub fn parse(key: &str, config: &Value) -> Result<Self, ActionParseError> {
        let action = match key {
            "paragraph_format" => Self::ParagraphFormat(payload(key, config)?),
            "style_apply" => Self::StyleApply(payload(key, config)?),
            "numbering" => Self::Numbering(payload(key, config)?),
            "headers_footers" => Self::HeadersFooters(payload(key, config)?),
            "field_update" => Self::FieldUpdate(payload(key, config)?),
            "find_replace" => Self::FindReplace(payload(key, config)?),
            "page_setup" => Self::PageSetup(payload(key, config)?),
            "section_breaks" => Self::SectionBreak(payload(key, config)?),
            "bookmark_text" => Self::BookmarkText(payload(key, config)?),
            "content_control_text" => Self::ContentControlText(payload(key, config)?),
            "table_format" => Self::TableFormat(payload(key, config)?),
            "insert_image" => Self::InsertImage(payload(key, config)?),
            "raw_word_com" | "raw_backend_command" => {
                let list: RawCommandList = payload(key, config)?;
                let commands = list.validate().map_err(|message| ActionParseError::Malformed {
                    action: key.to_string(),
                    message,
                })?;
                Self::RawCommands(commands)
            }
            "word_recipe" | "recipe" | "named_recipe" => Self::Recipe(payload(key, config)?),
            other => return Err(ActionParseError::Unknown(other.to_string())),
        };
        Ok(action)
    }

    /// Canonical action key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ParagraphFormat(_) => "paragraph_format",
            Self::StyleApply(_) => "style_apply",
            Self::Numbering(_) => "numbering",
            Self::HeadersFooters(_) => "headers_footers",
            Self::FieldUpdate(_) => "field_update",
            Self::FindReplace(_) => "find_replace",
            Self::PageSetup(_) => "page_setup",
            Self::SectionBreak(_) => "section_breaks",
            Self::BookmarkText(_) => "bookmark_text",
            Self::ContentControlText(_) => "content_control_text",
            Self::TableFormat(_) => "table_format",
            Self::InsertImage(_) => "insert_image",
            Self::RawCommands(_) => "raw_word_com",
            Self::Recipe(_) => "word_recipe",
        }
    }

    /// For text-mutating actions, the per-action override (if any).
    ///
    /// Returns `None` for actions that never change visible text.
    pub fn text_change_override(&self) -> Option<Option<bool>> {
        match self {
            Self::FindReplace(cfg) => Some(cfg.allow_text_change),
            Self::BookmarkText(cfg) => Some(cfg.allow_text_change),
            Self::ContentControlText(cfg) => Some(cfg.allow_text_change),
            _ => None,
        }
    }
}

fn payload<T: DeserializeOwned>(key: &str, config: &Value) -> Result<T, ActionParseError> {
    let value = if config.is_null() {
        Value::Object(Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(value).map_err(|err| ActionParseError::Malformed {
        action: key.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_paragraph_format_units() {
        let action = Action::parse(
            "paragraph_format",
            &json!({"space_before": "6pt", "left_indent": "0.5in", "alignment": "justified"}),
        )
        .expect("parse");
        let Action::ParagraphFormat(fmt) = action else {
            panic!("wrong variant");
        };
        assert_eq!(fmt.space_before, Some(Length::from_points(6.0)));
        assert_eq!(fmt.left_indent, Some(Length::from_points(36.0)));
        assert_eq!(fmt.alignment, Some(Alignment::Justify));
    }

    #[test]
    fn unknown_key_is_unknown_not_malformed() {
        let err = Action::parse("make_pretty", &json!({})).expect_err("unknown");
        assert_eq!(err, ActionParseError::Unknown("make_pretty".to_string()));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let err = Action::parse("style_apply", &json!({})).expect_err("malformed");
        assert!(matches!(err, ActionParseError::Malformed { .. }));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn recipe_defaults_to_enabled_and_accepts_aliases() {
        for key in ["word_recipe", "recipe", "named_recipe"] {
            let action = Action::parse(key, &json!({"name": "remove_all_tabs"})).expect("parse");
            let Action::Recipe(call) = action else {
                panic!("wrong variant");
            };
            assert!(call.enabled);
            assert!(call.params.is_empty());
        }
    }

    #[test]
    fn text_mutating_actions_expose_override() {
        let replace = Action::parse(
            "find_replace",
            &json!({"find": "a", "replace": "b", "allow_text_change": true}),
        )
        .expect("parse");
        assert_eq!(replace.text_change_override(), Some(Some(true)));

        let style = Action::parse("style_apply", &json!({"name": "Body Text"})).expect("parse");
        assert_eq!(style.text_change_override(), None);
    }

    #[test]
    fn null_config_means_defaults() {
        let action = Action::parse("field_update", &Value::Null).expect("parse");
        assert_eq!(action, Action::FieldUpdate(FieldUpdate::default()));
    }

    #[test]
    fn header_slots_join_with_tabs() {
        let text = HeaderFooterText {
            left: Some("Draft".to_string()),
            center: None,
            right: Some("Page {PAGE}".to_string()),
        };
        assert_eq!(text.joined(), "Draft\t\tPage {PAGE}");
        let center_only = HeaderFooterText {
            left: None,
            center: Some("Title".to_string()),
            right: None,
        };
        assert_eq!(center_only.joined(), "\tTitle");
    }
}
