//! Constrained escape-hatch commands for the live backend.
//!
//! A raw command sets one property on one target object. Targets are a
//! closed set, property paths are checked against an allow-list, and values
//! are typed. Nothing is evaluated dynamically.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_PATH_SEGMENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum RawTarget {
    Document,
    Content,
    PageSetup,
    /// Every section.
    Sections,
    /// One section, 1-based.
    Section(usize),
}

impl RawTarget {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let text = raw.trim();
        let lower = text.to_ascii_lowercase();
        match lower.as_str() {
            "" | "document" | "activedocument" => return Ok(Self::Document),
            "content" => return Ok(Self::Content),
            "pagesetup" | "page_setup" => return Ok(Self::PageSetup),
            "sections" => return Ok(Self::Sections),
            _ => {}
        }
        let index = lower
            .strip_prefix("sections[")
            .or_else(|| lower.strip_prefix("sections("))
            .and_then(|rest| rest.strip_suffix(']').or_else(|| rest.strip_suffix(')')))
            .and_then(|n| n.trim().parse::<usize>().ok())
            .filter(|n| *n > 0);
        index
            .map(Self::Section)
            .ok_or_else(|| format!("unsupported raw command target '{text}'"))
    }

    fn kind(self) -> TargetKind {
        match self {
            Self::Document => TargetKind::Document,
            Self::Content => TargetKind::Content,
            Self::PageSetup => TargetKind::PageSetup,
            Self::Sections | Self::Section(_) => TargetKind::Section,
        }
    }
}

impl fmt::Display for RawTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("Document"),
            Self::Content => f.write_str("Content"),
            Self::PageSetup => f.write_str("PageSetup"),
            Self::Sections => f.write_str("Sections"),
            Self::Section(n) => write!(f, "Sections[{n}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
        }
    }
}

/// A validated raw command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    pub target: RawTarget,
    pub property: String,
    pub value: RawValue,
}

/// Raw command list as written in a rule file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommandList {
    pub commands: Vec<RawCommandEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommandEntry {
    #[serde(default)]
    pub target: String,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Document,
    Content,
    PageSetup,
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Number,
    Text,
}

const PAGE_SETUP_PROPERTIES: [(&str, ValueKind); 11] = [
    ("TopMargin", ValueKind::Number),
    ("BottomMargin", ValueKind::Number),
    ("LeftMargin", ValueKind::Number),
    ("RightMargin", ValueKind::Number),
    ("Gutter", ValueKind::Number),
    ("HeaderDistance", ValueKind::Number),
    ("FooterDistance", ValueKind::Number),
    ("Orientation", ValueKind::Number),
    ("MirrorMargins", ValueKind::Bool),
    ("DifferentFirstPageHeaderFooter", ValueKind::Bool),
    ("OddAndEvenPagesHeaderFooter", ValueKind::Bool),
];

const DOCUMENT_PROPERTIES: [(&str, ValueKind); 7] = [
    ("TrackRevisions", ValueKind::Bool),
    ("ShowRevisions", ValueKind::Bool),
    ("AutoHyphenation", ValueKind::Bool),
    ("HyphenateCaps", ValueKind::Bool),
    ("DefaultTabStop", ValueKind::Number),
    ("ShowGrammaticalErrors", ValueKind::Bool),
    ("ShowSpellingErrors", ValueKind::Bool),
];

const CONTENT_PROPERTIES: [(&str, ValueKind); 6] = [
    ("Font.Name", ValueKind::Text),
    ("Font.Size", ValueKind::Number),
    ("ParagraphFormat.SpaceBefore", ValueKind::Number),
    ("ParagraphFormat.SpaceAfter", ValueKind::Number),
    ("ParagraphFormat.LineSpacing", ValueKind::Number),
    ("LanguageID", ValueKind::Number),
];

fn allowed_kind(target: TargetKind, property: &str) -> Option<ValueKind> {
    let lookup = |table: &[(&str, ValueKind)], name: &str| {
        table
            .iter()
            .find(|(allowed, _)| allowed.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    };
    match target {
        TargetKind::Document => lookup(&DOCUMENT_PROPERTIES, property),
        TargetKind::Content => lookup(&CONTENT_PROPERTIES, property),
        TargetKind::PageSetup => lookup(&PAGE_SETUP_PROPERTIES, property),
        TargetKind::Section => property
            .strip_prefix("PageSetup.")
            .and_then(|rest| lookup(&PAGE_SETUP_PROPERTIES, rest)),
    }
}

fn valid_path(property: &str) -> bool {
    let segments: Vec<&str> = property.split('.').collect();
    segments.len() <= MAX_PATH_SEGMENTS
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric())
        })
}

impl RawCommandList {
    /// Check every entry against the allow-list.
    pub fn validate(&self) -> Result<Vec<RawCommand>, String> {
        if self.commands.is_empty() {
            return Err("commands must be a non-empty list".to_string());
        }
        self.commands
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .validate()
                    .map_err(|err| format!("command #{}: {err}", i + 1))
            })
            .collect()
    }
}

impl RawCommandEntry {
    pub fn validate(&self) -> Result<RawCommand, String> {
        let target = RawTarget::parse(&self.target)?;
        let property = self.property.trim();
        if !valid_path(property) {
            return Err(format!("invalid property path '{property}'"));
        }
        let expected = allowed_kind(target.kind(), property)
            .ok_or_else(|| format!("property '{property}' is not allowed on {target}"))?;
        let value = match (&self.value, expected) {
            (Value::Bool(b), ValueKind::Bool) => RawValue::Bool(*b),
            (Value::Number(n), ValueKind::Number) => RawValue::Number(
                n.as_f64()
                    .ok_or_else(|| format!("value for '{property}' is out of range"))?,
            ),
            (Value::String(s), ValueKind::Text) => RawValue::Text(s.clone()),
            (other, kind) => {
                return Err(format!(
                    "property '{property}' expects a {kind:?} value, got {other}"
                ));
            }
        };
        debug_assert_eq!(value.kind(), expected);
        Ok(RawCommand {
            target,
            property: property.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(target: &str, property: &str, value: Value) -> RawCommandEntry {
        RawCommandEntry {
            target: target.to_string(),
            property: property.to_string(),
            value,
        }
    }

    #[test]
    fn accepts_allow_listed_commands() {
        let cmd = entry("Sections[2]", "PageSetup.TopMargin", json!(72))
            .validate()
            .expect("valid");
        assert_eq!(cmd.target, RawTarget::Section(2));
        assert_eq!(cmd.value, RawValue::Number(72.0));

        let cmd = entry("", "TrackRevisions", json!(true)).validate().expect("valid");
        assert_eq!(cmd.target, RawTarget::Document);
    }

    #[test]
    fn rejects_properties_outside_allow_list() {
        let err = entry("Document", "VBProject.VBComponents", json!("x"))
            .validate()
            .expect_err("not allowed");
        assert!(err.contains("not allowed"));
    }

    #[test]
    fn rejects_expression_like_paths_and_targets() {
        entry("Document", "Close()", json!(true)).validate().expect_err("call");
        entry("Document", "A.B.C.D", json!(true)).validate().expect_err("too deep");
        entry("Application.Quit", "Visible", json!(true))
            .validate()
            .expect_err("target");
        entry("Sections[0]", "PageSetup.TopMargin", json!(1))
            .validate()
            .expect_err("zero index");
    }

    #[test]
    fn rejects_mistyped_values() {
        let err = entry("PageSetup", "TopMargin", json!("72"))
            .validate()
            .expect_err("type");
        assert!(err.contains("Number"));
    }

    #[test]
    fn empty_command_list_is_rejected() {
        let list = RawCommandList { commands: Vec::new() };
        list.validate().expect_err("empty");
    }
}
