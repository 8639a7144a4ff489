//! In-memory `.docx` backend.
//!
//! Edits the OOXML package directly: no word processor, no rendering.
//! Paragraph pages are estimates (see [`DocxDocument::layout`]). Bookmarks,
//! content controls, field update, PDF export and raw commands have no model
//! here and fall back to the trait defaults.

pub mod document;
pub mod format;
pub mod images;
pub mod numbering;
pub mod package;
pub mod sections;
pub mod text;
pub mod xml;

use std::path::Path;

use tracing::{debug, warn};

use crate::core::action::{
    FindReplace, HeadersFooters, InsertImage, Numbering, PageSetup, ParagraphFormat, SectionBreak,
    TableFormat,
};
use crate::core::pages::PageRange;
use crate::core::selector::{RegexQuery, RegexScope, StructuralRange, TableQuery};
use crate::core::snapshot::Snapshot;
use crate::core::units::Length;
use crate::engine::{
    Capabilities, Capability, DocumentHandle, Engine, EngineResult, Issuer, ListLevelFormat,
    PageGeometry, ParagraphInfo, Range, Target, TextEdit,
};
use crate::error::EngineError;

pub use document::DocxDocument;
use sections::HeaderFooterKind;

const NAME: &str = "docx";

#[derive(Debug)]
pub struct DocxEngine {
    issuer: Issuer,
    document: Option<DocxDocument>,
}

impl Default for DocxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxEngine {
    pub fn new() -> Self {
        Self {
            issuer: Issuer::new(),
            document: None,
        }
    }

    fn document(&self, doc: &DocumentHandle) -> EngineResult<&DocxDocument> {
        self.issuer.check(doc)?;
        self.document.as_ref().ok_or_else(not_open)
    }

    fn document_mut(&mut self, doc: &DocumentHandle) -> EngineResult<&mut DocxDocument> {
        self.issuer.check(doc)?;
        self.document.as_mut().ok_or_else(not_open)
    }

    fn targets<'r>(&self, doc: &DocumentHandle, ranges: &'r [Range]) -> EngineResult<Vec<&'r Target>> {
        ranges
            .iter()
            .map(|range| self.issuer.resolve(doc, range))
            .collect()
    }

    /// Paragraph paths covered by `ranges`.
    fn paths(&self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<Vec<Vec<usize>>> {
        let targets = self.targets(doc, ranges)?;
        self.document(doc)?.paragraphs_for(&targets)
    }

    fn first_path(&self, doc: &DocumentHandle, range: &Range) -> EngineResult<Vec<usize>> {
        self.paths(doc, std::slice::from_ref(range))?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Failed("range addresses no paragraph".to_string()))
    }

    fn paragraph_ranges(&self, doc: &DocumentHandle, indexes: impl IntoIterator<Item = usize>) -> Vec<Range> {
        indexes
            .into_iter()
            .map(|index| self.issuer.range(doc, Target::Paragraph(index)))
            .collect()
    }
}

fn not_open() -> EngineError {
    EngineError::Failed("no document is open".to_string())
}

/// Text of every paragraph under `container`, newline separated.
fn container_text(document: &DocxDocument, container: &[usize]) -> String {
    document
        .paragraph_paths()
        .iter()
        .filter(|path| path.starts_with(container))
        .filter_map(|path| document.element(path).ok())
        .map(text::paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find/replace configuration as a paragraph edit.
fn find_replace_edit(config: &FindReplace) -> EngineResult<TextEdit> {
    if config.wildcards {
        return Err(EngineError::not_supported(NAME, "wildcard find/replace"));
    }
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
        backreference_template(&config.replace)
    } else {
        config.replace.replace('$', "$$")
    };
    Ok(TextEdit::new(pattern, replacement))
}

/// Rewrite `\1` and `\g<name>` group references into the `${1}` and
/// `${name}` forms the regex crate expands. A bare `$` stays literal.
fn backreference_template(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut rest = replace;
    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '$' => out.push_str("$$"),
            '\\' => {
                let digits = rest.len() - rest.trim_start_matches(|d: char| d.is_ascii_digit()).len();
                if digits > 0 {
                    out.push_str(&format!("${{{}}}", &rest[..digits]));
                    rest = &rest[digits..];
                } else if let Some((name, tail)) = rest.strip_prefix("g<").and_then(|r| r.split_once('>')) {
                    out.push_str(&format!("${{{name}}}"));
                    rest = tail;
                } else if let Some(tail) = rest.strip_prefix('\\') {
                    out.push('\\');
                    rest = tail;
                } else if let Some(tail) = rest.strip_prefix('n') {
                    out.push('\n');
                    rest = tail;
                } else if let Some(tail) = rest.strip_prefix('t') {
                    out.push('\t');
                    rest = tail;
                } else {
                    out.push('\\');
                }
            }
            other => out.push(other),
        }
    }
    out
}

impl Engine for DocxEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::ListTemplates])
    }

    fn open(&mut self, path: &Path) -> EngineResult<DocumentHandle> {
        if self.issuer.is_open() {
            return Err(EngineError::Failed("a document is already open".to_string()));
        }
        let document = DocxDocument::open(path)?;
        debug!(path = %path.display(), part = document.main_part(), "opened docx package");
        self.document = Some(document);
        Ok(self.issuer.issue(path))
    }

    fn close(&mut self, doc: DocumentHandle) {
        if self.issuer.release(&doc) {
            self.document = None;
            debug!(path = %doc.path().display(), "closed document");
        } else {
            warn!(path = %doc.path().display(), "close called with a handle this engine does not own");
        }
    }

    fn save_as(&mut self, doc: &DocumentHandle, path: &Path) -> EngineResult<()> {
        self.document_mut(doc)?.save(path)?;
        debug!(path = %path.display(), "saved docx");
        Ok(())
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> EngineResult<Snapshot> {
        Ok(self.document(doc)?.snapshot())
    }

    fn shutdown(&mut self) {
        self.document = None;
    }

    fn select_document(&mut self, doc: &DocumentHandle) -> EngineResult<Vec<Range>> {
        let count = self.document(doc)?.paragraph_paths().len();
        Ok(self.paragraph_ranges(doc, 0..count))
    }

    fn select_by_style(&mut self, doc: &DocumentHandle, styles: &[String]) -> EngineResult<Vec<Range>> {
        let document = self.document(doc)?;
        let wanted = |candidate: &str| styles.iter().any(|style| style.eq_ignore_ascii_case(candidate));
        let mut indexes = Vec::new();
        for (index, path) in document.paragraph_paths().iter().enumerate() {
            let p = document.element(path)?;
            let by_name = document.paragraph_style(p).is_some_and(|name| wanted(&name));
            let by_id = DocxDocument::paragraph_style_id(p).is_some_and(wanted);
            if by_name || by_id {
                indexes.push(index);
            }
        }
        Ok(self.paragraph_ranges(doc, indexes))
    }

    fn select_by_regex(&mut self, doc: &DocumentHandle, query: &RegexQuery) -> EngineResult<Vec<Range>> {
        let regex = query
            .compile()
            .map_err(|err| EngineError::Failed(format!("invalid pattern: {err}")))?;
        let document = self.document(doc)?;
        let layout = document.layout();
        let on_page = |page: u32| query.page_range.is_none_or(|range| range.contains(page));

        match query.scope {
            RegexScope::Paragraphs => {
                let mut indexes = Vec::new();
                for (index, meta) in layout.iter().enumerate() {
                    if on_page(meta.page) && regex.is_match(&text::paragraph_text(document.element(&meta.path)?)) {
                        indexes.push(index);
                    }
                }
                Ok(self.paragraph_ranges(doc, indexes))
            }
            RegexScope::Cells => {
                let mut ranges = Vec::new();
                for (table, table_path) in document.table_paths().iter().enumerate() {
                    let tbl = document.element(table_path)?;
                    for (row, tr) in tbl.children_named("w:tr").enumerate() {
                        for col in 0..tr.children_named("w:tc").count() {
                            let target = Target::Cell { table, row, col };
                            let cell_path = document.container_path(&target)?;
                            let page = layout
                                .iter()
                                .find(|meta| meta.path.starts_with(&cell_path))
                                .map_or(1, |meta| meta.page);
                            if on_page(page) && regex.is_match(&container_text(document, &cell_path)) {
                                ranges.push(self.issuer.range(doc, target));
                            }
                        }
                    }
                }
                Ok(ranges)
            }
        }
    }

    fn select_by_table(&mut self, doc: &DocumentHandle, query: &TableQuery) -> EngineResult<Vec<Range>> {
        let document = self.document(doc)?;
        let mut ranges = Vec::new();
        for (index, path) in document.table_paths().iter().enumerate() {
            let tbl = document.element(path)?;
            let style_id = tbl
                .child("w:tblPr")
                .and_then(|pr| pr.child_val("w:tblStyle"));
            let style_name = style_id.map(|id| document.style_name(id, "table"));
            let text = container_text(document, path);
            if query.matches(index + 1, style_name.as_deref(), &text)
                || query.matches(index + 1, style_id, &text)
            {
                ranges.push(self.issuer.range(doc, Target::Table(index)));
            }
        }
        Ok(ranges)
    }

    fn select_by_range(&mut self, doc: &DocumentHandle, range: &StructuralRange) -> EngineResult<Vec<Range>> {
        let layout = self.document(doc)?.layout();
        let indexes = layout
            .iter()
            .enumerate()
            .filter(|(index, meta)| range.matches(meta.section, index + 1, meta.page))
            .map(|(index, _)| index);
        Ok(self.paragraph_ranges(doc, indexes))
    }

    fn apply_paragraph_format(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        format: &ParagraphFormat,
    ) -> EngineResult<usize> {
        let paths = self.paths(doc, ranges)?;
        self.document_mut(doc)?.apply_paragraph_format(&paths, format)
    }

    fn apply_style(&mut self, doc: &DocumentHandle, ranges: &[Range], style: &str) -> EngineResult<usize> {
        let document = self.document(doc)?;
        let table_style = document.style_id(style, "table").is_some();
        let mut tables = Vec::new();
        let mut paragraphs = Vec::new();
        for target in self.targets(doc, ranges)? {
            match target {
                Target::Table(_) if table_style => tables.push(document.container_path(target)?),
                other => paragraphs.push(other),
            }
        }
        let paths = document.paragraphs_for(&paragraphs)?;
        let document = self.document_mut(doc)?;
        Ok(document.apply_table_style(&tables, style)? + document.apply_paragraph_style(&paths, style)?)
    }

    fn apply_numbering(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        numbering: &Numbering,
    ) -> EngineResult<usize> {
        let paths = self.paths(doc, ranges)?;
        self.document_mut(doc)?.apply_numbering(&paths, numbering)
    }

    fn set_headers_footers(&mut self, doc: &DocumentHandle, config: &HeadersFooters) -> EngineResult<usize> {
        let document = self.document_mut(doc)?;
        let mut count = 0;
        if let Some(header) = &config.header {
            document.write_header_footer(HeaderFooterKind::Header, header)?;
            count += 1;
        }
        if let Some(footer) = &config.footer {
            document.write_header_footer(HeaderFooterKind::Footer, footer)?;
            count += 1;
        }
        if let Some(on) = config.different_first_page {
            count += document.set_different_first_page(on)?;
        }
        if let Some(on) = config.different_odd_even {
            document.set_different_odd_even(on)?;
            count += 1;
        }
        Ok(count)
    }

    fn find_replace(&mut self, doc: &DocumentHandle, config: &FindReplace) -> EngineResult<usize> {
        if config.find.is_empty() {
            return Ok(0);
        }
        let edit = find_replace_edit(config)?;
        let regex = edit.compile()?;
        let document = self.document_mut(doc)?;
        let mut count = 0;
        for path in document.paragraph_paths() {
            count += document.edit_paragraph(&path, &regex, &edit)?;
        }
        Ok(count)
    }

    fn apply_page_setup(&mut self, doc: &DocumentHandle, config: &PageSetup) -> EngineResult<usize> {
        self.document_mut(doc)?.apply_page_setup(config)
    }

    fn insert_section_break(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &SectionBreak,
    ) -> EngineResult<usize> {
        let paths = self.paths(doc, ranges)?;
        self.document_mut(doc)?
            .insert_section_breaks(&paths, config.insert_before_selector, config.break_type)
    }

    fn format_table(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &TableFormat,
    ) -> EngineResult<usize> {
        let document = self.document(doc)?;
        let tables: Vec<Vec<usize>> = match config.index {
            Some(index) => document
                .table_paths()
                .into_iter()
                .nth(index.saturating_sub(1))
                .filter(|_| index > 0)
                .into_iter()
                .collect(),
            None => {
                let mut tables = Vec::new();
                let mut paragraphs = Vec::new();
                for target in self.targets(doc, ranges)? {
                    match target {
                        Target::Table(_) => {
                            let path = document.container_path(target)?;
                            if !tables.contains(&path) {
                                tables.push(path);
                            }
                        }
                        other => paragraphs.push(other),
                    }
                }
                let paths = document.paragraphs_for(&paragraphs)?;
                for table in document.enclosing_tables(&paths) {
                    if !tables.contains(&table) {
                        tables.push(table);
                    }
                }
                tables
            }
        };
        self.document_mut(doc)?.format_table(&tables, config)
    }

    fn insert_image(
        &mut self,
        doc: &DocumentHandle,
        ranges: &[Range],
        config: &InsertImage,
    ) -> EngineResult<usize> {
        let paths = self.paths(doc, ranges)?;
        self.document_mut(doc)?.insert_image(&paths, config)
    }

    fn paragraphs(&mut self, doc: &DocumentHandle, pages: Option<PageRange>) -> EngineResult<Vec<ParagraphInfo>> {
        let document = self.document(doc)?;
        let mut out = Vec::new();
        for (index, meta) in document.layout().into_iter().enumerate() {
            if pages.is_some_and(|pages| !pages.contains(meta.page)) {
                continue;
            }
            let p = document.element(&meta.path)?;
            out.push(ParagraphInfo {
                range: self.issuer.range(doc, Target::Paragraph(index)),
                index: index + 1,
                text: text::paragraph_text(p),
                style: document.paragraph_style(p),
                list_level: document.list_ref(p).map(|list| list.ilvl + 1),
                page: meta.page,
            });
        }
        Ok(out)
    }

    fn page_count(&mut self, doc: &DocumentHandle) -> EngineResult<u32> {
        Ok(self.document(doc)?.page_count())
    }

    fn page_geometry(&mut self, doc: &DocumentHandle) -> EngineResult<PageGeometry> {
        Ok(self.document(doc)?.page_geometry())
    }

    fn replace_text(&mut self, doc: &DocumentHandle, range: &Range, edit: &TextEdit) -> EngineResult<usize> {
        let regex = edit.compile()?;
        let paths = self.paths(doc, std::slice::from_ref(range))?;
        let document = self.document_mut(doc)?;
        let mut count = 0;
        for path in &paths {
            count += document.edit_paragraph(path, &regex, edit)?;
        }
        Ok(count)
    }

    fn insert_text_before(&mut self, doc: &DocumentHandle, range: &Range, text: &str) -> EngineResult<()> {
        let path = self.first_path(doc, range)?;
        self.document_mut(doc)?.insert_text_at_start(&path, text)
    }

    fn convert_list_numbers_to_text(&mut self, doc: &DocumentHandle, ranges: &[Range]) -> EngineResult<usize> {
        let paths = self.paths(doc, ranges)?;
        self.document_mut(doc)?.convert_list_numbers_to_text(&paths)
    }

    fn list_level_format(&mut self, doc: &DocumentHandle, range: &Range) -> EngineResult<Option<ListLevelFormat>> {
        let path = self.first_path(doc, range)?;
        self.document(doc)?.list_level_format(&path)
    }

    fn set_list_level_format(
        &mut self,
        doc: &DocumentHandle,
        range: &Range,
        format: &ListLevelFormat,
    ) -> EngineResult<()> {
        let path = self.first_path(doc, range)?;
        self.document_mut(doc)?.set_list_level_format(&path, format)
    }

    fn set_list_level_number(&mut self, doc: &DocumentHandle, range: &Range, level: u8) -> EngineResult<()> {
        let path = self.first_path(doc, range)?;
        self.document_mut(doc)?.set_list_level_number(&path, level)
    }

    fn ensure_paragraph_style(&mut self, doc: &DocumentHandle, name: &str, left_indent: Length) -> EngineResult<()> {
        self.document_mut(doc)?.ensure_paragraph_style(name, left_indent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::BookmarkText;
    use crate::core::selector::RegexFlag;
    use crate::test_support::DocxBuilder;

    fn open(builder: DocxBuilder) -> (tempfile::TempDir, DocxEngine, DocumentHandle) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = builder.write_to(dir.path(), "in.docx");
        let mut engine = DocxEngine::new();
        let doc = engine.open(&path).expect("open");
        (dir, engine, doc)
    }

    fn texts(engine: &mut DocxEngine, doc: &DocumentHandle) -> Vec<String> {
        engine
            .paragraphs(doc, None)
            .expect("paragraphs")
            .into_iter()
            .map(|info| info.text)
            .collect()
    }

    #[test]
    fn whole_document_styles_every_paragraph() {
        let (dir, mut engine, doc) = open(DocxBuilder::new().paragraph("a").paragraph("b").paragraph("c"));
        let ranges = engine.select_document(&doc).expect("select");
        assert_eq!(ranges.len(), 3);
        let count = engine.apply_style(&doc, &ranges, "Body Text").expect("style");
        assert_eq!(count, 3);

        let styled = engine
            .select_by_style(&doc, &["body text".to_string()])
            .expect("by style");
        assert_eq!(styled.len(), 3);

        let out = dir.path().join("out.docx");
        engine.save_as(&doc, &out).expect("save");
        engine.close(doc);
        let reopened = DocxDocument::open(&out).expect("reopen");
        assert_eq!(reopened.snapshot().paragraph_count, 3);
        assert_eq!(reopened.style_id("Body Text", "paragraph").as_deref(), Some("BodyText"));
    }

    #[test]
    fn regex_selection_honours_page_range() {
        let (_dir, mut engine, doc) = open(
            DocxBuilder::new()
                .paragraph("1. alpha")
                .page_break()
                .paragraph("2. beta")
                .paragraph("gamma"),
        );
        let query = RegexQuery {
            pattern: r"^\d+\.".to_string(),
            scope: RegexScope::Paragraphs,
            flags: Vec::new(),
            page_range: Some(PageRange::new(1, 1).expect("range")),
        };
        let ranges = engine.select_by_regex(&doc, &query).expect("select");
        assert_eq!(ranges.len(), 1);

        let unbounded = RegexQuery {
            page_range: None,
            ..query
        };
        assert_eq!(engine.select_by_regex(&doc, &unbounded).expect("select").len(), 2);
    }

    #[test]
    fn cell_scope_returns_matching_cells() {
        let (_dir, mut engine, doc) = open(
            DocxBuilder::new()
                .paragraph("intro")
                .table(&[&["Name", "Total"], &["a", "42"]]),
        );
        let query = RegexQuery {
            pattern: "total".to_string(),
            scope: RegexScope::Cells,
            flags: vec![RegexFlag::IgnoreCase],
            page_range: None,
        };
        let ranges = engine.select_by_regex(&doc, &query).expect("select");
        assert_eq!(ranges.len(), 1);
        let format = ParagraphFormat {
            keep_with_next: Some(true),
            ..ParagraphFormat::default()
        };
        assert_eq!(engine.apply_paragraph_format(&doc, &ranges, &format).expect("format"), 1);
    }

    #[test]
    fn table_query_and_format_by_index() {
        let (_dir, mut engine, doc) = open(
            DocxBuilder::new()
                .table(&[&["x"]])
                .table(&[&["Revenue", "2024"]]),
        );
        let query = TableQuery {
            contains_text: Some("Revenue".to_string()),
            ..TableQuery::default()
        };
        assert_eq!(engine.select_by_table(&doc, &query).expect("select").len(), 1);

        let config = TableFormat {
            index: Some(2),
            autofit: Some(true),
            ..TableFormat::default()
        };
        assert_eq!(engine.format_table(&doc, &[], &config).expect("format"), 1);
        let missing = TableFormat {
            index: Some(9),
            ..config
        };
        assert_eq!(engine.format_table(&doc, &[], &missing).expect("format"), 0);
    }

    #[test]
    fn structural_range_filters_by_paragraph_index() {
        let (_dir, mut engine, doc) = open(DocxBuilder::new().paragraph("a").paragraph("b").paragraph("c"));
        let range = StructuralRange {
            paragraph_indexes: Some(vec![1, 3]),
            ..StructuralRange::default()
        };
        let ranges = engine.select_by_range(&doc, &range).expect("select");
        assert_eq!(ranges.len(), 2);
        engine
            .insert_text_before(&doc, &ranges[1], "> ")
            .expect("insert");
        assert_eq!(texts(&mut engine, &doc), ["a", "b", "> c"]);
    }

    #[test]
    fn literal_find_replace_escapes_pattern_and_replacement() {
        let (_dir, mut engine, doc) = open(DocxBuilder::new().paragraph("cost (a) $5").paragraph("COST (A)"));
        let config = FindReplace {
            find: "cost (a)".to_string(),
            replace: "price $1".to_string(),
            regex: false,
            wildcards: false,
            whole_word: false,
            match_case: false,
            allow_text_change: None,
        };
        assert_eq!(engine.find_replace(&doc, &config).expect("replace"), 2);
        assert_eq!(texts(&mut engine, &doc), ["price $1 $5", "price $1"]);

        let wildcards = FindReplace {
            wildcards: true,
            ..config
        };
        let err = engine.find_replace(&doc, &wildcards).expect_err("wildcards");
        assert!(err.is_not_supported());
    }

    #[test]
    fn regex_find_replace_expands_backslash_groups() {
        let (_dir, mut engine, doc) = open(DocxBuilder::new().paragraph("2024-05 cost $5").paragraph("no date"));
        let config = FindReplace {
            find: r"(?P<year>\d{4})-(\d{2})".to_string(),
            replace: r"\2/\g<year> \\ $1".to_string(),
            regex: true,
            wildcards: false,
            whole_word: false,
            match_case: true,
            allow_text_change: None,
        };
        assert_eq!(engine.find_replace(&doc, &config).expect("replace"), 1);
        assert_eq!(texts(&mut engine, &doc), [r"05/2024 \ $1 cost $5", "no date"]);
    }

    #[test]
    fn backreference_template_keeps_unknown_escapes() {
        assert_eq!(backreference_template(r"\10x"), "${10}x");
        assert_eq!(backreference_template(r"a\qb"), r"a\qb");
        assert_eq!(backreference_template(r"\g<name"), r"\g<name");
        assert_eq!(backreference_template(r"tab\tend"), "tab\tend");
    }

    #[test]
    fn soft_features_degrade() {
        let (_dir, mut engine, doc) = open(DocxBuilder::new().paragraph("a"));
        assert!(engine.select_by_bookmark(&doc, &["x".to_string()]).expect("select").is_empty());
        let config = BookmarkText {
            name: "x".to_string(),
            replace_text: "y".to_string(),
            allow_text_change: None,
        };
        assert!(engine.replace_bookmark_text(&doc, &config).expect_err("bookmark").is_not_supported());
        assert!(!engine.capabilities().contains(Capability::Bookmarks));
        assert!(engine.capabilities().contains(Capability::ListTemplates));
    }

    #[test]
    fn ranges_from_another_engine_are_rejected() {
        let (_dir, mut first, first_doc) = open(DocxBuilder::new().paragraph("a"));
        let (_dir2, mut second, second_doc) = open(DocxBuilder::new().paragraph("b"));
        let foreign = first.select_document(&first_doc).expect("select");
        let err = second
            .apply_style(&second_doc, &foreign, "Title")
            .expect_err("foreign");
        assert!(matches!(err, EngineError::ForeignRange));
    }

    #[test]
    fn list_levels_are_reported() {
        let (_dir, mut engine, doc) = open(
            DocxBuilder::new()
                .numbered_paragraph(0, "First")
                .numbered_paragraph(1, "Nested")
                .paragraph("plain"),
        );
        let levels: Vec<_> = engine
            .paragraphs(&doc, None)
            .expect("paragraphs")
            .into_iter()
            .map(|info| info.list_level)
            .collect();
        assert_eq!(levels, [Some(1), Some(2), None]);
    }

    #[test]
    fn second_open_is_refused_until_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = DocxBuilder::new().paragraph("a").write_to(dir.path(), "in.docx");
        let mut engine = DocxEngine::new();
        let doc = engine.open(&path).expect("open");
        assert!(engine.open(&path).is_err());
        engine.close(doc);
        let again = engine.open(&path).expect("reopen");
        engine.close(again);
        engine.shutdown();
        engine.shutdown();
    }
}
