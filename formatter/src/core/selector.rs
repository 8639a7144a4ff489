//! Selector grammar: declarative criteria that resolve to ranges.
//!
//! A selector object carries exactly one key. Parsing never guesses: an
//! unknown key or a malformed payload is an error, while a well-formed
//! selector that matches nothing is fine.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::pages::PageRange;

pub const SELECTOR_KEYS: [&str; 7] = [
    "document",
    "by_style",
    "by_regex",
    "by_bookmark",
    "by_content_control",
    "by_table",
    "by_range",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Document,
    ByStyle(Vec<String>),
    ByRegex(RegexQuery),
    ByBookmark(Vec<String>),
    ByContentControl(Vec<String>),
    ByTable(TableQuery),
    ByRange(StructuralRange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexScope {
    #[default]
    #[serde(alias = "paragraph")]
    Paragraphs,
    #[serde(alias = "cell", alias = "tables")]
    Cells,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegexFlag {
    #[serde(rename = "IGNORECASE", alias = "ignorecase", alias = "I")]
    IgnoreCase,
    #[serde(rename = "WHOLE_WORD", alias = "whole_word")]
    WholeWord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexQuery {
    pub pattern: String,
    #[serde(default)]
    pub scope: RegexScope,
    #[serde(default)]
    pub flags: Vec<RegexFlag>,
    #[serde(default)]
    pub page_range: Option<PageRange>,
}

impl RegexQuery {
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        let pattern = if self.flags.contains(&RegexFlag::WholeWord) {
            format!(r"\b(?:{})\b", self.pattern)
        } else {
            self.pattern.clone()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.flags.contains(&RegexFlag::IgnoreCase))
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableQuery {
    /// 1-based table index in document order.
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub contains_text: Option<String>,
}

impl TableQuery {
    pub fn matches(&self, index: usize, style: Option<&str>, text: &str) -> bool {
        if self.index.is_some_and(|wanted| wanted != index) {
            return false;
        }
        if let Some(wanted) = &self.style
            && style.is_none_or(|actual| !actual.eq_ignore_ascii_case(wanted))
        {
            return false;
        }
        if let Some(needle) = &self.contains_text
            && !text.contains(needle.as_str())
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SectionRepr")]
pub enum SectionFilter {
    All,
    /// 1-based section index.
    Index(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SectionRepr {
    Index(usize),
    Text(String),
}

impl TryFrom<SectionRepr> for SectionFilter {
    type Error = String;

    fn try_from(value: SectionRepr) -> Result<Self, Self::Error> {
        match value {
            SectionRepr::Index(0) => Err("section indexes start at 1".to_string()),
            SectionRepr::Index(n) => Ok(Self::Index(n)),
            SectionRepr::Text(text) if text.eq_ignore_ascii_case("all") => Ok(Self::All),
            SectionRepr::Text(text) => text
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Self::Index)
                .ok_or_else(|| format!("section must be 'all' or a 1-based index, got '{text}'")),
        }
    }
}

impl SectionFilter {
    pub fn matches(self, section: usize) -> bool {
        match self {
            Self::All => true,
            Self::Index(n) => n == section,
        }
    }
}

/// Structural position filter. Every given constraint must hold; the result
/// is the list of paragraphs satisfying all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuralRange {
    #[serde(default)]
    pub section: Option<SectionFilter>,
    /// 1-based paragraph indexes in document order.
    #[serde(default)]
    pub paragraph_indexes: Option<Vec<usize>>,
    #[serde(default)]
    pub pages: Option<PageRange>,
}

impl StructuralRange {
    /// `section` and `paragraph` are 1-based.
    pub fn matches(&self, section: usize, paragraph: usize, page: u32) -> bool {
        self.section.is_none_or(|filter| filter.matches(section))
            && self
                .paragraph_indexes
                .as_ref()
                .is_none_or(|indexes| indexes.contains(&paragraph))
            && self.pages.is_none_or(|pages| pages.contains(page))
    }
}

impl Selector {
    pub fn parse(raw: &Map<String, Value>) -> Result<Self, String> {
        if raw.len() != 1 {
            return Err(format!(
                "selector must have exactly one key, got {} ({})",
                raw.len(),
                raw.keys().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        let Some((key, value)) = raw.iter().next() else {
            return Err("selector is empty".to_string());
        };
        match key.as_str() {
            "document" => match value {
                Value::Bool(true) => Ok(Self::Document),
                other => Err(format!("document selector must be true, got {other}")),
            },
            "by_style" => Ok(Self::ByStyle(name_list(key, value)?)),
            "by_regex" => {
                let query: RegexQuery = payload(key, value)?;
                query
                    .compile()
                    .map_err(|err| format!("by_regex: invalid pattern: {err}"))?;
                Ok(Self::ByRegex(query))
            }
            "by_bookmark" => Ok(Self::ByBookmark(name_list(key, value)?)),
            "by_content_control" => Ok(Self::ByContentControl(name_list(key, value)?)),
            "by_table" => Ok(Self::ByTable(payload(key, value)?)),
            "by_range" => {
                let range: StructuralRange = payload(key, value)?;
                if range.section.is_none() && range.paragraph_indexes.is_none() && range.pages.is_none() {
                    return Err("by_range needs section, paragraph_indexes or pages".to_string());
                }
                Ok(Self::ByRange(range))
            }
            other => Err(format!(
                "unknown selector '{other}' (expected one of: {})",
                SELECTOR_KEYS.join(", ")
            )),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::ByStyle(_) => "by_style",
            Self::ByRegex(_) => "by_regex",
            Self::ByBookmark(_) => "by_bookmark",
            Self::ByContentControl(_) => "by_content_control",
            Self::ByTable(_) => "by_table",
            Self::ByRange(_) => "by_range",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|err| format!("{key}: {err}"))
}

fn name_list(key: &str, value: &Value) -> Result<Vec<String>, String> {
    let names = match value {
        Value::String(name) => vec![name.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(format!("{key}: expected a string, got {other}")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(format!("{key}: expected a name or list of names, got {other}")),
    };
    if names.iter().all(|name| name.trim().is_empty()) {
        return Err(format!("{key}: at least one name is required"));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Selector, String> {
        match value {
            Value::Object(map) => Selector::parse(&map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn parses_each_variant() {
        assert_eq!(parse(json!({"document": true})).expect("doc"), Selector::Document);
        assert_eq!(
            parse(json!({"by_style": "Heading 1"})).expect("style"),
            Selector::ByStyle(vec!["Heading 1".to_string()])
        );
        let regex = parse(json!({"by_regex": {"pattern": "^\\d+\\.", "flags": ["IGNORECASE"], "page_range": "1-4"}}))
            .expect("regex");
        match regex {
            Selector::ByRegex(query) => {
                assert_eq!(query.scope, RegexScope::Paragraphs);
                assert_eq!(query.page_range, Some(PageRange { start: 1, end: 4 }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse(json!({"by_table": {"index": 2}})).expect("table").tag(), "by_table");
        assert_eq!(parse(json!({"by_range": {"section": "all"}})).expect("range").tag(), "by_range");
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = parse(json!({"by_sytle": ["Heading 1"]})).expect_err("typo");
        assert!(err.contains("unknown selector 'by_sytle'"));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        parse(json!({"document": false})).expect_err("document false");
        parse(json!({"by_regex": {"scope": "paragraphs"}})).expect_err("missing pattern");
        parse(json!({"by_regex": {"pattern": "("}})).expect_err("bad pattern");
        parse(json!({"by_range": {}})).expect_err("empty range");
        parse(json!({"by_table": {"idx": 1}})).expect_err("unknown field");
        parse(json!({"by_style": [1, 2]})).expect_err("non-string names");
        parse(json!({"document": true, "by_style": "x"})).expect_err("two keys");
    }

    #[test]
    fn whole_word_flag_wraps_pattern() {
        let query = RegexQuery {
            pattern: "cat".to_string(),
            scope: RegexScope::Paragraphs,
            flags: vec![RegexFlag::WholeWord, RegexFlag::IgnoreCase],
            page_range: None,
        };
        let regex = query.compile().expect("compile");
        assert!(regex.is_match("The CAT sat"));
        assert!(!regex.is_match("concatenate"));
    }

    #[test]
    fn structural_range_intersects_constraints() {
        let range = StructuralRange {
            section: Some(SectionFilter::Index(2)),
            paragraph_indexes: None,
            pages: Some(PageRange { start: 3, end: 4 }),
        };
        assert!(range.matches(2, 10, 3));
        assert!(!range.matches(1, 10, 3));
        assert!(!range.matches(2, 10, 5));
    }
}
