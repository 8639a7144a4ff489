//! Backend engine abstraction.
//!
//! An [`Engine`] owns at most one open document at a time. Opening hands out
//! a move-only [`DocumentHandle`]; closing consumes it. Selector primitives
//! return opaque [`Range`] values tied to that engine instance and document,
//! and every primitive rejects ranges it did not issue.
//!
//! Soft features (bookmarks, content controls) default to empty selections.
//! Features with no equivalent in a backend default to
//! [`EngineError::NotSupported`].

pub mod docx;
pub mod live;
pub mod select;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::core::action::{
    BookmarkText, ContentControlText, FieldUpdate, FindReplace, HeadersFooters, InsertImage,
    Numbering, PageSetup, ParagraphFormat, SectionBreak, TableFormat,
};
use crate::core::pages::PageRange;
use crate::core::raw_command::RawCommand;
use crate::core::selector::{RegexQuery, StructuralRange, TableQuery};
use crate::core::snapshot::Snapshot;
use crate::core::units::Length;
use crate::error::EngineError;

pub type EngineResult<T> = Result<T, EngineError>;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Optional feature areas a backend may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Bookmarks,
    ContentControls,
    FieldUpdate,
    PdfExport,
    RawCommands,
    PageLayout,
    ListTemplates,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Self::Bookmarks,
        Self::ContentControls,
        Self::FieldUpdate,
        Self::PdfExport,
        Self::RawCommands,
        Self::PageLayout,
        Self::ListTemplates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bookmarks => "bookmarks",
            Self::ContentControls => "content_controls",
            Self::FieldUpdate => "field_update",
            Self::PdfExport => "pdf_export",
            Self::RawCommands => "raw_commands",
            Self::PageLayout => "page_layout",
            Self::ListTemplates => "list_templates",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().copied().collect())
    }

    pub fn all() -> Self {
        Self::of(&Capability::ALL)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// First capability in `required` this set lacks.
    pub fn first_missing(&self, required: &[Capability]) -> Option<Capability> {
        required.iter().copied().find(|cap| !self.contains(*cap))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    engine: u64,
    document: u64,
}

/// Token for the document an engine currently has open.
///
/// Not `Clone`: [`Engine::close`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentHandle {
    owner: Owner,
    path: PathBuf,
}

impl DocumentHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Backend-specific address inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// 0-based paragraph index in document order.
    Paragraph(usize),
    /// 0-based table index in document order.
    Table(usize),
    Cell {
        table: usize,
        row: usize,
        col: usize,
    },
    /// Token issued by an automation bridge.
    Remote(String),
}

/// Opaque handle into an open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    owner: Owner,
    target: Target,
}

impl Range {
    pub(crate) fn target(&self) -> &Target {
        &self.target
    }
}

/// Issues handles and ranges for one engine instance and checks that
/// handles and ranges passed back belong to it.
#[derive(Debug)]
pub(crate) struct Issuer {
    engine: u64,
    next_document: u64,
    open: Option<u64>,
}

impl Issuer {
    pub(crate) fn new() -> Self {
        Self {
            engine: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            next_document: 1,
            open: None,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub(crate) fn issue(&mut self, path: &Path) -> DocumentHandle {
        let document = self.next_document;
        self.next_document += 1;
        self.open = Some(document);
        DocumentHandle {
            owner: Owner {
                engine: self.engine,
                document,
            },
            path: path.to_path_buf(),
        }
    }

    /// Forget the open document; returns false for a foreign handle.
    pub(crate) fn release(&mut self, doc: &DocumentHandle) -> bool {
        if self.owns(doc) {
            self.open = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, doc: &DocumentHandle) -> EngineResult<()> {
        if self.owns(doc) {
            Ok(())
        } else {
            Err(EngineError::ForeignRange)
        }
    }

    pub(crate) fn range(&self, doc: &DocumentHandle, target: Target) -> Range {
        Range {
            owner: doc.owner,
            target,
        }
    }

    /// Target of a range issued for `doc` by this engine.
    pub(crate) fn resolve<'r>(&self, doc: &DocumentHandle, range: &'r Range) -> EngineResult<&'r Target> {
        self.check(doc)?;
        if range.owner == doc.owner {
            Ok(&range.target)
        } else {
            Err(EngineError::ForeignRange)
        }
    }

    fn owns(&self, doc: &DocumentHandle) -> bool {
        doc.owner.engine == self.engine && self.open == Some(doc.owner.document)
    }
}

/// Paragraph view used by recipes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphInfo {
    pub range: Range,
    /// 1-based position in document order.
    pub index: usize,
    pub text: String,
    pub style: Option<String>,
    /// 1-based list level when the paragraph is numbered.
    pub list_level: Option<u8>,
    /// 1-based page the paragraph ends on (estimated on backends without layout).
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextScope {
    #[default]
    Whole,
    /// Only the first N characters of the paragraph.
    Head(usize),
}

/// Regex edit applied to one paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub pattern: String,
    /// `$1`-style template.
    pub replacement: String,
    pub scope: TextScope,
    pub first_only: bool,
}

/// One planned replacement, byte offsets into the paragraph text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl TextEdit {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            scope: TextScope::Whole,
            first_only: false,
        }
    }

    pub fn head(mut self, chars: usize) -> Self {
        self.scope = TextScope::Head(chars);
        self
    }

    pub fn first_only(mut self) -> Self {
        self.first_only = true;
        self
    }

    pub fn compile(&self) -> EngineResult<Regex> {
        Regex::new(&self.pattern)
            .map_err(|err| EngineError::Failed(format!("invalid edit pattern: {err}")))
    }

    /// Replacements this edit makes in `text`, ascending, non-overlapping.
    /// Matches that change nothing are skipped.
    pub fn plan(&self, regex: &Regex, text: &str) -> Vec<Splice> {
        let limit = match self.scope {
            TextScope::Whole => text.len(),
            TextScope::Head(chars) => text
                .char_indices()
                .nth(chars)
                .map_or(text.len(), |(offset, _)| offset),
        };
        let mut splices = Vec::new();
        for caps in regex.captures_iter(&text[..limit]) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let replacement = expand(&caps, &self.replacement);
            if replacement != whole.as_str() {
                splices.push(Splice {
                    start: whole.start(),
                    end: whole.end(),
                    text: replacement,
                });
            }
            if self.first_only {
                break;
            }
        }
        splices
    }
}

fn expand(caps: &Captures<'_>, template: &str) -> String {
    let mut out = String::new();
    caps.expand(template, &mut out);
    out
}

/// Apply planned splices to a plain string.
pub fn apply_splices(text: &str, splices: &[Splice]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for splice in splices {
        out.push_str(&text[cursor..splice.start]);
        out.push_str(&splice.text);
        cursor = splice.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// What follows a list number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingCharacter {
    Tab,
    Space,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelAlignment {
    Left,
    Center,
    Right,
}

/// Formatting of one level of a list template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListLevelFormat {
    /// 1-based.
    pub level: u8,
    /// Number template such as `%1.` or `%1.%2`.
    pub number_format: String,
    pub trailing: TrailingCharacter,
    pub alignment: LevelAlignment,
    pub number_position: Length,
    pub text_position: Length,
    pub tab_position: Option<Length>,
}

/// Page width and horizontal margins of the first section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub page_width: Length,
    pub left_margin: Length,
    pub right_margin: Length,
}

impl PageGeometry {
    pub fn text_width(&self) -> Length {
        Length::from_points(
            self.page_width.points() - self.left_margin.points() - self.right_margin.points(),
        )
    }
}

/// Common interface implemented by every automation backend.
pub trait Engine {
    /// Short backend name used in logs and audit records.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    // Lifecycle.

    fn open(&mut self, path: &Path) -> EngineResult<DocumentHandle>;

    /// Best-effort; failures are logged, never returned.
    fn close(&mut self, doc: DocumentHandle);

    fn save_as(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()>;

    fn export_pdf(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        let _ = (doc, path);
        Err(EngineError::not_supported(self.name(), "PDF export"))
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> EngineResult<Snapshot>;

    /// Release backend resources. Idempotent.
    fn shutdown(&mut self);

    // Selectors.

    fn select_document(&mut self, doc: &DocumentHandle) -> EngineResult<Vec<Range>>;

    fn select_by_style(&mut self, doc: &DocumentHandle, styles: &[String]) -> EngineResult<Vec<Range>>;

    fn select_by_regex(&mut self, doc: &DocumentHandle, query: &RegexQuery) -> EngineResult<Vec<Range>>;

    fn select_by_bookmark(&mut self, doc: &DocumentHandle, names: &[String]) -> EngineResult<Vec<Range>> {
        let _ = (doc, names);
        Ok(Vec::new())
    }

    fn select_by_content_control(
        &mut self,
        doc: &DocumentHandle,
        titles: &[String],
    ) -> EngineResult<Vec<Range>> {
        let _ = (doc, titles);
        Ok(Vec::new())
    }

    fn select_by_table(&mut self, doc: &DocumentHandle, query: &TableQuery) -> EngineResult<Vec<Range>>;

    fn select_by_range(
        &mut self,
        doc: &DocumentHandle,
        range: &StructuralRange,
    ) -> EngineResult<Vec<Range>>;

    // Actions. Each returns the number of modifications made.

    fn apply_paragraph_format(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        format: &ParagraphFormat,
    ) -> EngineResult<usize>;

    fn apply_style(&mut self, doc: &DocumentHandle, ranges: &[Range], style: &str) -> EngineResult<usize>;

    fn apply_numbering(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        numbering: &Numbering,
    ) -> EngineResult<usize>;

    fn set_headers_footers(&mut self, doc: &DocumentHandle, config: &HeadersFooters) -> EngineResult<usize>;

    fn update_fields(&mut self, doc: &DocumentHandle, config: &FieldUpdate) -> EngineResult<usize> {
        let _ = (doc, config);
        Err(EngineError::not_supported(self.name(), "field and TOC update"))
    }

    fn find_replace(&mut self, doc: &DocumentHandle, config: &FindReplace) -> EngineResult<usize>;

    fn apply_page_setup(&mut self, doc: &DocumentHandle, config: &PageSetup) -> EngineResult<usize>;

    fn insert_section_break(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &SectionBreak,
    ) -> EngineResult<usize>;

    fn replace_bookmark_text(&mut self, doc: &DocumentHandle, config: &BookmarkText) -> EngineResult<usize> {
        let _ = (doc, config);
        Err(EngineError::not_supported(self.name(), "bookmarks"))
    }

    fn replace_content_control_text(
        &mut self,
        doc: &DocumentHandle,
        config: &ContentControlText,
    ) -> EngineResult<usize> {
        let _ = (doc, config);
        Err(EngineError::not_supported(self.name(), "content controls"))
    }

    fn format_table(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &TableFormat,
    ) -> EngineResult<usize>;

    fn insert_image(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &InsertImage,
    ) -> EngineResult<usize>;

    fn run_raw_commands(&mut self, doc: &DocumentHandle, commands: &[RawCommand]) -> EngineResult<usize> {
        let _ = (doc, commands);
        Err(EngineError::not_supported(self.name(), "raw commands"))
    }

    // Recipe primitives.

    fn paragraphs(&mut self, doc: &DocumentHandle, pages: Option<PageRange>) -> EngineResult<Vec<ParagraphInfo>>;

    fn page_count(&mut self, doc: &DocumentHandle) -> EngineResult<u32>;

    fn page_geometry(&mut self, doc: &DocumentHandle) -> EngineResult<PageGeometry>;

    /// Apply a regex edit to one paragraph; returns the number of replacements.
    fn replace_text(&mut self, doc: &DocumentHandle, range: &Range, edit: &TextEdit) -> EngineResult<usize>;

    fn insert_text_before(&mut self, doc: &DocumentHandle, range: &Range, text: &str) -> EngineResult<()>;

    /// Freeze list numbering into literal paragraph text.
    fn convert_list_numbers_to_text(&mut self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<usize>;

    fn list_level_format(&mut self, doc: &DocumentHandle, range: &Range) -> EngineResult<Option<ListLevelFormat>>;

    fn set_list_level_format(
        &mut self,
        doc: &DocumentHandle,
        range: &Range,
        format: &ListLevelFormat,
    ) -> EngineResult<()>;

    /// Move a numbered paragraph to another (1-based) list level.
    fn set_list_level_number(&mut self, doc: &DocumentHandle, range: &Range, level: u8) -> EngineResult<()>;

    /// Create the paragraph style if missing and set its left indent.
    fn ensure_paragraph_style(&mut self, doc: &DocumentHandle, name: &str, left_indent: Length) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_rejects_foreign_and_stale_handles() {
        let mut first = Issuer::new();
        let mut second = Issuer::new();
        let doc = first.issue(Path::new("a.docx"));
        let other = second.issue(Path::new("b.docx"));

        first.check(&doc).expect("own handle");
        assert!(matches!(first.check(&other), Err(EngineError::ForeignRange)));

        let range = second.range(&other, Target::Paragraph(0));
        assert!(first.resolve(&doc, &range).is_err());

        assert!(first.release(&doc));
        assert!(first.check(&doc).is_err());
    }

    #[test]
    fn head_scoped_edit_only_touches_prefix() {
        let edit = TextEdit::new(r"(\d+)\.", "$1—").head(4).first_only();
        let regex = edit.compile().expect("regex");
        let splices = edit.plan(&regex, "12. see 3. below");
        assert_eq!(
            splices,
            vec![Splice {
                start: 0,
                end: 3,
                text: "12—".to_string()
            }]
        );
        assert_eq!(apply_splices("12. see 3. below", &splices), "12— see 3. below");
    }

    #[test]
    fn plan_skips_no_op_matches() {
        let edit = TextEdit::new("—", "—");
        let regex = edit.compile().expect("regex");
        assert!(edit.plan(&regex, "a—b").is_empty());
    }

    #[test]
    fn capabilities_report_first_missing() {
        let caps = Capabilities::of(&[Capability::ListTemplates]);
        assert_eq!(
            caps.first_missing(&[Capability::ListTemplates, Capability::PageLayout]),
            Some(Capability::PageLayout)
        );
        assert_eq!(Capabilities::all().first_missing(&Capability::ALL), None);
    }
}
