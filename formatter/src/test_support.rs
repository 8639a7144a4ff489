//! Test-only fixtures: a `.docx` package builder, a recording fake engine
//! and a scripted automation bridge.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::action::{
    BookmarkText, ContentControlText, FieldUpdate, FindReplace, HeadersFooters, InsertImage,
    Numbering, PageSetup, ParagraphFormat, SectionBreak, TableFormat,
};
use crate::core::pages::PageRange;
use crate::core::raw_command::RawCommand;
use crate::core::selector::{RegexQuery, RegexScope, StructuralRange, TableQuery};
use crate::core::snapshot::Snapshot;
use crate::core::units::Length;
use crate::engine::docx::document::{R_NS, W_NS};
use crate::engine::docx::package::{
    self, CONTENT_TYPES, Package, REL_NUMBERING, REL_OFFICE_DOCUMENT, REL_SETTINGS, REL_STYLES,
    ROOT_RELS,
};
use crate::engine::docx::text;
use crate::engine::docx::xml::{Element, Node};
use crate::engine::live::{Request, Response, Transport};
use crate::engine::{
    Capabilities, Capability, DocumentHandle, Engine, EngineResult, Issuer, LevelAlignment,
    ListLevelFormat, PageGeometry, ParagraphInfo, Range, Target, TextEdit, TrailingCharacter,
    apply_splices,
};
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// .docx fixtures

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const CT_MAIN: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
const CT_NUMBERING: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
const CT_SETTINGS: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

#[derive(Debug, Clone)]
enum Block {
    Paragraph {
        style: Option<String>,
        list_level: Option<u8>,
        text: String,
    },
    PageBreak,
    Table(Vec<Vec<String>>),
}

/// Minimal but well-formed WordprocessingML package: letter pages with 1in
/// margins, a `Normal` default style, `Heading1` and one three-level list
/// (`1.`, `(a)`, `i.`) under `numId` 1.
#[derive(Debug, Clone)]
pub struct DocxBuilder {
    blocks: Vec<Block>,
    numbering: bool,
}

impl Default for DocxBuilder {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            numbering: true,
        }
    }
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paragraph(mut self, text: &str) -> Self {
        self.blocks.push(Block::Paragraph {
            style: None,
            list_level: None,
            text: text.to_string(),
        });
        self
    }

    pub fn styled_paragraph(mut self, style_id: &str, text: &str) -> Self {
        self.blocks.push(Block::Paragraph {
            style: Some(style_id.to_string()),
            list_level: None,
            text: text.to_string(),
        });
        self
    }

    /// Paragraph in list 1 at `ilvl` (0-based).
    pub fn numbered_paragraph(mut self, ilvl: u8, text: &str) -> Self {
        self.blocks.push(Block::Paragraph {
            style: None,
            list_level: Some(ilvl),
            text: text.to_string(),
        });
        self
    }

    /// An empty paragraph holding a hard page break.
    pub fn page_break(mut self) -> Self {
        self.blocks.push(Block::PageBreak);
        self
    }

    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
            .collect();
        self.blocks.push(Block::Table(rows));
        self
    }

    /// Leave out `word/numbering.xml` and its relationship.
    pub fn without_numbering(mut self) -> Self {
        self.numbering = false;
        self
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let mut parts = Package::default();
        parts.put(CONTENT_TYPES, self.content_types().serialize().into_bytes());
        parts.put(ROOT_RELS, root_rels().serialize().into_bytes());
        parts.put("word/document.xml", self.document().serialize().into_bytes());
        parts.put(
            &package::rels_path_for("word/document.xml"),
            self.document_rels().serialize().into_bytes(),
        );
        parts.put("word/styles.xml", STYLES_XML.as_bytes().to_vec());
        parts.put("word/settings.xml", SETTINGS_XML.as_bytes().to_vec());
        if self.numbering {
            parts.put("word/numbering.xml", NUMBERING_XML.as_bytes().to_vec());
        }
        let path = dir.join(name);
        parts.write(&path).expect("write docx fixture");
        path
    }

    fn content_types(&self) -> Element {
        let mut types = Element::new("Types")
            .with_attr("xmlns", CT_NS)
            .with_child(
                Element::new("Default")
                    .with_attr("Extension", "rels")
                    .with_attr("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
            )
            .with_child(
                Element::new("Default")
                    .with_attr("Extension", "xml")
                    .with_attr("ContentType", "application/xml"),
            );
        let mut parts = vec![
            ("/word/document.xml", CT_MAIN),
            ("/word/styles.xml", CT_STYLES),
            ("/word/settings.xml", CT_SETTINGS),
        ];
        if self.numbering {
            parts.push(("/word/numbering.xml", CT_NUMBERING));
        }
        for (part, content_type) in parts {
            types = types.with_child(
                Element::new("Override")
                    .with_attr("PartName", part)
                    .with_attr("ContentType", content_type),
            );
        }
        types
    }

    fn document_rels(&self) -> Element {
        let mut rels = vec![(REL_STYLES, "styles.xml"), (REL_SETTINGS, "settings.xml")];
        if self.numbering {
            rels.push((REL_NUMBERING, "numbering.xml"));
        }
        relationships(&rels)
    }

    fn document(&self) -> Element {
        let mut body = Element::new("w:body");
        for block in &self.blocks {
            let el = match block {
                Block::Paragraph {
                    style,
                    list_level,
                    text,
                } => paragraph(style.as_deref(), *list_level, text),
                Block::PageBreak => Element::new("w:p")
                    .with_child(Element::new("w:r").with_child(Element::new("w:br").with_attr("w:type", "page"))),
                Block::Table(rows) => table(rows),
            };
            body = body.with_child(el);
        }
        body = body.with_child(
            Element::new("w:sectPr")
                .with_child(
                    Element::new("w:pgSz")
                        .with_attr("w:w", "12240")
                        .with_attr("w:h", "15840"),
                )
                .with_child(
                    Element::new("w:pgMar")
                        .with_attr("w:top", "1440")
                        .with_attr("w:right", "1440")
                        .with_attr("w:bottom", "1440")
                        .with_attr("w:left", "1440")
                        .with_attr("w:header", "720")
                        .with_attr("w:footer", "720")
                        .with_attr("w:gutter", "0"),
                ),
        );
        Element::new("w:document")
            .with_attr("xmlns:w", W_NS)
            .with_attr("xmlns:r", R_NS)
            .with_child(body)
    }
}

fn root_rels() -> Element {
    relationships(&[(REL_OFFICE_DOCUMENT, "word/document.xml")])
}

fn relationships(entries: &[(&str, &str)]) -> Element {
    let mut rels = Element::new("Relationships").with_attr("xmlns", RELS_NS);
    for (i, (rel_type, target)) in entries.iter().enumerate() {
        rels = rels.with_child(
            Element::new("Relationship")
                .with_attr("Id", format!("rId{}", i + 1))
                .with_attr("Type", *rel_type)
                .with_attr("Target", *target),
        );
    }
    rels
}

fn paragraph(style: Option<&str>, list_level: Option<u8>, value: &str) -> Element {
    let mut p = Element::new("w:p");
    if style.is_some() || list_level.is_some() {
        let mut ppr = Element::new("w:pPr");
        if let Some(style) = style {
            ppr = ppr.with_child(Element::new("w:pStyle").with_attr("w:val", style));
        }
        if let Some(ilvl) = list_level {
            ppr = ppr.with_child(
                Element::new("w:numPr")
                    .with_child(Element::new("w:ilvl").with_attr("w:val", ilvl.to_string()))
                    .with_child(Element::new("w:numId").with_attr("w:val", "1")),
            );
        }
        p = p.with_child(ppr);
    }
    p.children
        .extend(text::runs_for(value).into_iter().map(Node::Element));
    p
}

fn table(rows: &[Vec<String>]) -> Element {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut grid = Element::new("w:tblGrid");
    for _ in 0..columns {
        grid = grid.with_child(Element::new("w:gridCol").with_attr("w:w", "2000"));
    }
    let mut tbl = Element::new("w:tbl")
        .with_child(
            Element::new("w:tblPr")
                .with_child(Element::new("w:tblW").with_attr("w:w", "0").with_attr("w:type", "auto")),
        )
        .with_child(grid);
    for row in rows {
        let mut tr = Element::new("w:tr");
        for cell in row {
            tr = tr.with_child(Element::new("w:tc").with_child(paragraph(None, None, cell)));
        }
        tbl = tbl.with_child(tr);
    }
    tbl
}

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:outlineLvl w:val="0"/></w:pPr></w:style><w:style w:type="character" w:default="1" w:styleId="DefaultParagraphFont"><w:name w:val="Default Paragraph Font"/></w:style><w:style w:type="table" w:default="1" w:styleId="TableNormal"><w:name w:val="Normal Table"/></w:style></w:styles>"#;

const SETTINGS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:defaultTabStop w:val="720"/></w:settings>"#;

const NUMBERING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:abstractNum w:abstractNumId="0"><w:multiLevelType w:val="hybridMultilevel"/><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl><w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="lowerLetter"/><w:lvlText w:val="(%2)"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="1440" w:hanging="360"/></w:pPr></w:lvl><w:lvl w:ilvl="2"><w:start w:val="1"/><w:numFmt w:val="lowerRoman"/><w:lvlText w:val="%3."/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="2160" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num></w:numbering>"#;

/// Solid-colour PNG of the given pixel size.
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]))
        .save(&path)
        .expect("write png fixture");
    path
}

// ---------------------------------------------------------------------------
// Recording engine

#[derive(Debug, Default)]
struct JournalState {
    calls: Vec<String>,
    closes: usize,
    shutdowns: usize,
}

/// Shared record of what a [`RecordingEngine`] was asked to do. Survives the
/// engine being moved into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalState>>);

impl Journal {
    fn state(&self) -> MutexGuard<'_, JournalState> {
        self.0.lock().expect("journal lock")
    }

    /// Operation names in call order (closes and shutdowns excluded).
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }
}

#[derive(Debug, Clone)]
struct FakeParagraph {
    text: String,
    page: u32,
    style: Option<String>,
    list_level: Option<u8>,
    format: ParagraphFormat,
}

/// In-memory engine over a flat list of paragraphs with explicit pages and
/// list levels. Every primitive is journaled; ops named with
/// [`RecordingEngine::failing`] return [`EngineError::Failed`].
#[derive(Debug)]
pub struct RecordingEngine {
    name: &'static str,
    capabilities: Capabilities,
    issuer: Issuer,
    paragraphs: Vec<FakeParagraph>,
    page: u32,
    levels: BTreeMap<u8, ListLevelFormat>,
    styles: BTreeMap<String, Length>,
    bookmarks: BTreeMap<String, usize>,
    geometry: PageGeometry,
    failing: BTreeSet<&'static str>,
    journal: Journal,
}

impl RecordingEngine {
    /// All capabilities, US letter with 1in margins.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            capabilities: Capabilities::all(),
            issuer: Issuer::new(),
            paragraphs: Vec::new(),
            page: 1,
            levels: BTreeMap::new(),
            styles: BTreeMap::new(),
            bookmarks: BTreeMap::new(),
            geometry: PageGeometry {
                page_width: Length::from_points(612.0),
                left_margin: Length::from_points(72.0),
                right_margin: Length::from_points(72.0),
            },
            failing: BTreeSet::new(),
            journal: Journal::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = Capabilities::of(capabilities);
        self
    }

    /// Page for the paragraphs added after this call.
    pub fn on_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.push(text, None)
    }

    /// Numbered paragraph at a 1-based list level.
    pub fn list_item(self, level: u8, text: &str) -> Self {
        self.push(text, Some(level))
    }

    /// Bookmark spanning the last paragraph added.
    pub fn bookmark(mut self, name: &str) -> Self {
        let index = self.paragraphs.len().saturating_sub(1);
        self.bookmarks.insert(name.to_string(), index);
        self
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    fn push(mut self, text: &str, list_level: Option<u8>) -> Self {
        self.paragraphs.push(FakeParagraph {
            text: text.to_string(),
            page: self.page,
            style: None,
            list_level,
            format: ParagraphFormat::default(),
        });
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.paragraphs.iter().map(|p| p.text.clone()).collect()
    }

    /// List level of the paragraph at 0-based `index`.
    pub fn list_level(&self, index: usize) -> Option<u8> {
        self.paragraphs.get(index).and_then(|p| p.list_level)
    }

    /// Level template written through `set_list_level_format`, if any.
    pub fn level_format(&self, level: u8) -> Option<ListLevelFormat> {
        self.levels.get(&level).cloned()
    }

    pub fn paragraph_format(&self, index: usize) -> &ParagraphFormat {
        &self.paragraphs[index].format
    }

    pub fn style(&self, index: usize) -> Option<&str> {
        self.paragraphs.get(index).and_then(|p| p.style.as_deref())
    }

    fn record(&mut self, op: &'static str) -> EngineResult<()> {
        self.journal.state().calls.push(op.to_string());
        if self.failing.contains(op) {
            return Err(EngineError::Failed(format!("{op} failed")));
        }
        Ok(())
    }

    fn index(&self, doc: &DocumentHandle, range: &Range) -> EngineResult<usize> {
        match self.issuer.resolve(doc, range)? {
            Target::Paragraph(index) if *index < self.paragraphs.len() => Ok(*index),
            other => Err(EngineError::Failed(format!("no paragraph at {other:?}"))),
        }
    }

    fn ranges_where(&self, doc: &DocumentHandle, keep: impl Fn(usize, &FakeParagraph) -> bool) -> Vec<Range> {
        self.paragraphs
            .iter()
            .enumerate()
            .filter(|(i, p)| keep(*i, *p))
            .map(|(i, _)| self.issuer.range(doc, Target::Paragraph(i)))
            .collect()
    }

    fn style_name(paragraph: &FakeParagraph) -> &str {
        paragraph.style.as_deref().unwrap_or("Normal")
    }

    fn default_level(level: u8) -> ListLevelFormat {
        ListLevelFormat {
            level,
            number_format: format!("%{level}."),
            trailing: TrailingCharacter::Tab,
            alignment: LevelAlignment::Left,
            number_position: Length::from_points(18.0),
            text_position: Length::from_points(36.0),
            tab_position: None,
        }
    }

    /// Rendered list label for every paragraph, in document order.
    fn labels(&self) -> Vec<Option<String>> {
        let mut counters = [0u32; 9];
        self.paragraphs
            .iter()
            .map(|p| {
                let level = p.list_level?;
                let slot = usize::from(level.clamp(1, 9)) - 1;
                counters[slot] += 1;
                counters[slot + 1..].fill(0);
                let format = self
                    .levels
                    .get(&level)
                    .cloned()
                    .unwrap_or_else(|| Self::default_level(level));
                let trailing = match format.trailing {
                    TrailingCharacter::Tab => "\t",
                    TrailingCharacter::Space => " ",
                    TrailingCharacter::None => "",
                };
                let label = format
                    .number_format
                    .replace(&format!("%{level}"), &counters[slot].to_string());
                Some(format!("{label}{trailing}"))
            })
            .collect()
    }

    fn edit(&mut self, index: usize, edit: &TextEdit) -> EngineResult<usize> {
        let regex = edit.compile()?;
        let paragraph = &mut self.paragraphs[index];
        let splices = edit.plan(&regex, &paragraph.text);
        if !splices.is_empty() {
            paragraph.text = apply_splices(&paragraph.text, &splices);
        }
        Ok(splices.len())
    }
}

fn merge(into: &mut ParagraphFormat, from: &ParagraphFormat) {
    macro_rules! take {
        ($($field:ident),*) => {
            $(if from.$field.is_some() {
                into.$field = from.$field;
            })*
        };
    }
    take!(
        alignment,
        line_spacing,
        space_before,
        space_after,
        left_indent,
        right_indent,
        first_line_indent,
        keep_with_next,
        keep_together,
        page_break_before,
        widow_control,
        clear_tab_stops
    );
}

impl Engine for RecordingEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn open(&mut self, path: &Path) -> EngineResult<DocumentHandle> {
        self.record("open")?;
        if self.issuer.is_open() {
            return Err(EngineError::Failed("a document is already open".to_string()));
        }
        Ok(self.issuer.issue(path))
    }

    fn close(&mut self, doc: DocumentHandle) {
        self.journal.state().closes += 1;
        self.issuer.release(&doc);
    }

    fn save_as(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        self.record("save_as")?;
        self.issuer.check(doc)?;
        fs::write(path, self.texts().join("\n"))?;
        Ok(())
    }

    fn export_pdf(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        self.record("export_pdf")?;
        self.issuer.check(doc)?;
        if !self.capabilities.contains(Capability::PdfExport) {
            return Err(EngineError::not_supported(self.name, "PDF export"));
        }
        fs::write(path, b"%PDF-1.7\n")?;
        Ok(())
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> EngineResult<Snapshot> {
        self.record("snapshot")?;
        self.issuer.check(doc)?;
        let mut headings = BTreeMap::new();
        for paragraph in &self.paragraphs {
            if let Some(style) = paragraph.style.as_ref().filter(|s| s.starts_with("Heading ")) {
                *headings.entry(style.clone()).or_insert(0) += 1;
            }
        }
        Ok(Snapshot {
            paragraph_count: self.paragraphs.len(),
            bookmark_count: self.bookmarks.len(),
            headings_by_level: headings,
            ..Snapshot::default()
        })
    }

    fn shutdown(&mut self) {
        self.journal.state().shutdowns += 1;
    }

    fn select_document(&mut self, doc: &DocumentHandle) -> EngineResult<Vec<Range>> {
        self.record("select_document")?;
        self.issuer.check(doc)?;
        Ok(self.ranges_where(doc, |_, _| true))
    }

    fn select_by_style(&mut self, doc: &DocumentHandle, styles: &[String]) -> EngineResult<Vec<Range>> {
        self.record("select_by_style")?;
        self.issuer.check(doc)?;
        Ok(self.ranges_where(doc, |_, p| {
            styles
                .iter()
                .any(|style| style.eq_ignore_ascii_case(Self::style_name(p)))
        }))
    }

    fn select_by_regex(&mut self, doc: &DocumentHandle, query: &RegexQuery) -> EngineResult<Vec<Range>> {
        self.record("select_by_regex")?;
        self.issuer.check(doc)?;
        if query.scope == RegexScope::Cells {
            return Ok(Vec::new());
        }
        let regex = query
            .compile()
            .map_err(|err| EngineError::Failed(format!("invalid pattern: {err}")))?;
        Ok(self.ranges_where(doc, |_, p| {
            query.page_range.is_none_or(|pages| pages.contains(p.page)) && regex.is_match(&p.text)
        }))
    }

    fn select_by_bookmark(&mut self, doc: &DocumentHandle, names: &[String]) -> EngineResult<Vec<Range>> {
        self.record("select_by_bookmark")?;
        self.issuer.check(doc)?;
        Ok(names
            .iter()
            .filter_map(|name| self.bookmarks.get(name))
            .map(|index| self.issuer.range(doc, Target::Paragraph(*index)))
            .collect())
    }

    fn select_by_table(&mut self, doc: &DocumentHandle, _query: &TableQuery) -> EngineResult<Vec<Range>> {
        self.record("select_by_table")?;
        self.issuer.check(doc)?;
        Ok(Vec::new())
    }

    fn select_by_range(&mut self, doc: &DocumentHandle, range: &StructuralRange) -> EngineResult<Vec<Range>> {
        self.record("select_by_range")?;
        self.issuer.check(doc)?;
        Ok(self.ranges_where(doc, |i, p| range.matches(1, i + 1, p.page)))
    }

    fn apply_paragraph_format(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        format: &ParagraphFormat,
    ) -> EngineResult<usize> {
        self.record("apply_paragraph_format")?;
        for range in ranges {
            let index = self.index(doc, range)?;
            merge(&mut self.paragraphs[index].format, format);
        }
        Ok(ranges.len())
    }

    fn apply_style(&mut self, doc: &DocumentHandle, ranges: &[Range], style: &str) -> EngineResult<usize> {
        self.record("apply_style")?;
        for range in ranges {
            let index = self.index(doc, range)?;
            self.paragraphs[index].style = Some(style.to_string());
        }
        Ok(ranges.len())
    }

    fn apply_numbering(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        numbering: &Numbering,
    ) -> EngineResult<usize> {
        self.record("apply_numbering")?;
        let level = numbering.outline_level.unwrap_or(1);
        for range in ranges {
            let index = self.index(doc, range)?;
            self.paragraphs[index].list_level = Some(level);
        }
        Ok(ranges.len())
    }

    fn set_headers_footers(&mut self, doc: &DocumentHandle, config: &HeadersFooters) -> EngineResult<usize> {
        self.record("set_headers_footers")?;
        self.issuer.check(doc)?;
        Ok(usize::from(config.header.is_some()) + usize::from(config.footer.is_some()))
    }

    fn update_fields(&mut self, doc: &DocumentHandle, config: &FieldUpdate) -> EngineResult<usize> {
        self.record("update_fields")?;
        self.issuer.check(doc)?;
        if !self.capabilities.contains(Capability::FieldUpdate) {
            return Err(EngineError::not_supported(self.name, "field and TOC update"));
        }
        Ok(usize::from(config.update_all_fields) + usize::from(config.update_toc))
    }

    fn find_replace(&mut self, doc: &DocumentHandle, config: &FindReplace) -> EngineResult<usize> {
        self.record("find_replace")?;
        self.issuer.check(doc)?;
        let mut pattern = if config.regex {
            config.find.clone()
        } else {
            regex::escape(&config.find)
        };
        if config.whole_word {
            pattern = format!(r"\b(?:{pattern})\b");
        }
        if !config.match_case {
            pattern = format!("(?i){pattern}");
        }
        let replacement = if config.regex {
            config.replace.clone()
        } else {
            config.replace.replace('$', "$$")
        };
        let edit = TextEdit::new(pattern, replacement);
        let mut count = 0;
        for index in 0..self.paragraphs.len() {
            count += self.edit(index, &edit)?;
        }
        Ok(count)
    }

    fn apply_page_setup(&mut self, doc: &DocumentHandle, config: &PageSetup) -> EngineResult<usize> {
        self.record("apply_page_setup")?;
        self.issuer.check(doc)?;
        if let Some(margins) = &config.margins {
            if let Some(left) = margins.left {
                self.geometry.left_margin = left;
            }
            if let Some(right) = margins.right {
                self.geometry.right_margin = right;
            }
        }
        Ok(1)
    }

    fn insert_section_break(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        _config: &SectionBreak,
    ) -> EngineResult<usize> {
        self.record("insert_section_break")?;
        for range in ranges {
            self.index(doc, range)?;
        }
        Ok(ranges.len())
    }

    /// Unknown bookmark names are created on the last paragraph, which lets
    /// tests add a bookmark through an action.
    fn replace_bookmark_text(&mut self, doc: &DocumentHandle, config: &BookmarkText) -> EngineResult<usize> {
        self.record("replace_bookmark_text")?;
        self.issuer.check(doc)?;
        if !self.capabilities.contains(Capability::Bookmarks) {
            return Err(EngineError::not_supported(self.name, "bookmarks"));
        }
        let last = self.paragraphs.len().saturating_sub(1);
        let index = *self.bookmarks.entry(config.name.clone()).or_insert(last);
        if let Some(paragraph) = self.paragraphs.get_mut(index) {
            paragraph.text.clone_from(&config.replace_text);
        }
        Ok(1)
    }

    fn replace_content_control_text(
        &mut self,
        doc: &DocumentHandle,
        _config: &ContentControlText,
    ) -> EngineResult<usize> {
        self.record("replace_content_control_text")?;
        self.issuer.check(doc)?;
        if !self.capabilities.contains(Capability::ContentControls) {
            return Err(EngineError::not_supported(self.name, "content controls"));
        }
        Ok(0)
    }

    fn format_table(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        _config: &TableFormat,
    ) -> EngineResult<usize> {
        self.record("format_table")?;
        self.issuer.check(doc)?;
        Ok(ranges.len())
    }

    fn insert_image(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        _config: &InsertImage,
    ) -> EngineResult<usize> {
        self.record("insert_image")?;
        self.issuer.check(doc)?;
        Ok(usize::from(!ranges.is_empty()))
    }

    fn run_raw_commands(&mut self, doc: &DocumentHandle, commands: &[RawCommand]) -> EngineResult<usize> {
        self.record("run_raw_commands")?;
        self.issuer.check(doc)?;
        if !self.capabilities.contains(Capability::RawCommands) {
            return Err(EngineError::not_supported(self.name, "raw commands"));
        }
        Ok(commands.len())
    }

    fn paragraphs(&mut self, doc: &DocumentHandle, pages: Option<PageRange>) -> EngineResult<Vec<ParagraphInfo>> {
        self.record("paragraphs")?;
        self.issuer.check(doc)?;
        Ok(self
            .paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| pages.is_none_or(|pages| pages.contains(p.page)))
            .map(|(i, p)| ParagraphInfo {
                range: self.issuer.range(doc, Target::Paragraph(i)),
                index: i + 1,
                text: p.text.clone(),
                style: Some(Self::style_name(p).to_string()),
                list_level: p.list_level,
                page: p.page,
            })
            .collect())
    }

    fn page_count(&mut self, doc: &DocumentHandle) -> EngineResult<u32> {
        self.record("page_count")?;
        self.issuer.check(doc)?;
        Ok(self.paragraphs.iter().map(|p| p.page).max().unwrap_or(1))
    }

    fn page_geometry(&mut self, doc: &DocumentHandle) -> EngineResult<PageGeometry> {
        self.record("page_geometry")?;
        self.issuer.check(doc)?;
        Ok(self.geometry)
    }

    fn replace_text(&mut self, doc: &DocumentHandle, range: &Range, edit: &TextEdit) -> EngineResult<usize> {
        self.record("replace_text")?;
        let index = self.index(doc, range)?;
        self.edit(index, edit)
    }

    fn insert_text_before(&mut self, doc: &DocumentHandle, range: &Range, value: &str) -> EngineResult<()> {
        self.record("insert_text_before")?;
        let index = self.index(doc, range)?;
        self.paragraphs[index].text.insert_str(0, value);
        Ok(())
    }

    fn convert_list_numbers_to_text(&mut self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<usize> {
        self.record("convert_list_numbers_to_text")?;
        let labels = self.labels();
        let mut count = 0;
        for range in ranges {
            let index = self.index(doc, range)?;
            if let Some(label) = &labels[index] {
                let paragraph = &mut self.paragraphs[index];
                paragraph.text.insert_str(0, label);
                paragraph.list_level = None;
                count += 1;
            }
        }
        Ok(count)
    }

    fn list_level_format(&mut self, doc: &DocumentHandle, range: &Range) -> EngineResult<Option<ListLevelFormat>> {
        self.record("list_level_format")?;
        let index = self.index(doc, range)?;
        Ok(self.paragraphs[index].list_level.map(|level| {
            self.levels
                .get(&level)
                .cloned()
                .unwrap_or_else(|| Self::default_level(level))
        }))
    }

    fn set_list_level_format(
        &mut self,
        doc: &DocumentHandle,
        range: &Range,
        format: &ListLevelFormat,
    ) -> EngineResult<()> {
        self.record("set_list_level_format")?;
        let index = self.index(doc, range)?;
        if self.paragraphs[index].list_level.is_none() {
            return Err(EngineError::Failed("paragraph is not numbered".to_string()));
        }
        self.levels.insert(format.level, format.clone());
        Ok(())
    }

    fn set_list_level_number(&mut self, doc: &DocumentHandle, range: &Range, level: u8) -> EngineResult<()> {
        self.record("set_list_level_number")?;
        let index = self.index(doc, range)?;
        let paragraph = &mut self.paragraphs[index];
        if paragraph.list_level.is_none() {
            return Err(EngineError::Failed("paragraph is not numbered".to_string()));
        }
        paragraph.list_level = Some(level);
        Ok(())
    }

    fn ensure_paragraph_style(&mut self, doc: &DocumentHandle, name: &str, left_indent: Length) -> EngineResult<()> {
        self.record("ensure_paragraph_style")?;
        self.issuer.check(doc)?;
        self.styles.insert(name.to_string(), left_indent);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted bridge

#[derive(Debug, Default)]
struct BridgeState {
    requests: Vec<Request>,
    shutdowns: usize,
}

/// Shared view of the requests a [`ScriptedTransport`] exchanged.
#[derive(Debug, Clone, Default)]
pub struct BridgeLog(Arc<Mutex<BridgeState>>);

impl BridgeLog {
    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.0.lock().expect("bridge log lock")
    }

    pub fn ops(&self) -> Vec<String> {
        self.state().requests.iter().map(|r| r.op.clone()).collect()
    }

    /// First request with the given op.
    pub fn request(&self, op: &str) -> Option<Request> {
        self.state().requests.iter().find(|r| r.op == op).cloned()
    }

    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }
}

type Script = Box<dyn FnMut(&Request) -> Response + Send>;

/// Transport answering each request from a closure instead of a process.
pub struct ScriptedTransport {
    script: Script,
    log: BridgeLog,
    closed: bool,
}

impl ScriptedTransport {
    pub fn new(script: impl FnMut(&Request) -> Response + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            log: BridgeLog::default(),
            closed: false,
        }
    }

    pub fn log(&self) -> BridgeLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&mut self, request: &Request) -> Result<Response, EngineError> {
        if self.closed {
            return Err(EngineError::Bridge("bridge is shut down".to_string()));
        }
        self.log.state().requests.push(request.clone());
        Ok((self.script)(request))
    }

    fn shutdown(&mut self, _quit: &Request, _grace: Duration) {
        if !self.closed {
            self.closed = true;
            self.log.state().shutdowns += 1;
        }
    }
}
