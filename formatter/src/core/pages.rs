//! Inclusive, 1-based page ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inclusive page range, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PageRangeRepr", into = "String")]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageRangeRepr {
    Single(u32),
    Text(String),
    Bounds { start: u32, end: u32 },
}

impl TryFrom<PageRangeRepr> for PageRange {
    type Error = String;

    fn try_from(value: PageRangeRepr) -> Result<Self, Self::Error> {
        match value {
            PageRangeRepr::Single(page) => PageRange::new(page, page),
            PageRangeRepr::Text(text) => PageRange::parse(&text),
            PageRangeRepr::Bounds { start, end } => PageRange::new(start, end),
        }
    }
}

impl From<PageRange> for String {
    fn from(value: PageRange) -> Self {
        value.to_string()
    }
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Result<Self, String> {
        if start == 0 {
            return Err("page numbers start at 1".to_string());
        }
        if end < start {
            return Err(format!("end page {end} must be >= start page {start}"));
        }
        Ok(Self { start, end })
    }

    /// Parse `"3"` or `"1-4"`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let text = raw.trim();
        let parse_page = |part: &str| -> Result<u32, String> {
            part.trim()
                .parse()
                .map_err(|_| format!("invalid page range '{raw}'"))
        };
        match text.split_once('-') {
            Some((start, end)) => Self::new(parse_page(start)?, parse_page(end)?),
            None => {
                let page = parse_page(text)?;
                Self::new(page, page)
            }
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    /// Cap the end page, keeping the range non-empty.
    pub fn clamp_end(self, max_end: u32) -> Self {
        let end = self.end.min(max_end).max(self.start);
        Self { end, ..self }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
