//! A `.docx` package opened for editing.
//!
//! Holds the parsed main document part plus the parts the editor touches
//! (relationships, content types, styles, numbering, settings, headers and
//! footers). Only parts marked dirty are re-serialized on save; every other
//! package entry is written back byte for byte.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use regex::Regex;

use crate::core::snapshot::Snapshot;
use crate::engine::docx::numbering::{self, ListRef};
use crate::engine::docx::package::{
    self, CONTENT_TYPES, Package, REL_NUMBERING, REL_OFFICE_DOCUMENT, REL_SETTINGS, REL_STYLES,
    ROOT_RELS,
};
use crate::engine::docx::text;
use crate::engine::docx::xml::{Element, Node};
use crate::engine::{Target, TextEdit};
use crate::error::EngineError;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
const CT_NUMBERING: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
const CT_SETTINGS: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

/// `w:pPr` children in schema order.
pub const PPR_ORDER: [&str; 35] = [
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
];

/// Paragraph children that must stay ahead of content.
const PARAGRAPH_ORDER: [&str; 1] = ["w:pPr"];

pub const STYLE_ORDER: [&str; 22] = [
    "w:name",
    "w:aliases",
    "w:basedOn",
    "w:next",
    "w:link",
    "w:autoRedefine",
    "w:hidden",
    "w:uiPriority",
    "w:semiHidden",
    "w:unhideWhenUsed",
    "w:qFormat",
    "w:locked",
    "w:personal",
    "w:personalCompose",
    "w:personalReply",
    "w:rsid",
    "w:pPr",
    "w:rPr",
    "w:tblPr",
    "w:trPr",
    "w:tcPr",
    "w:tblStylePr",
];

#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub xml: Element,
}

/// Per-paragraph position estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphMeta {
    pub path: Vec<usize>,
    /// 1-based.
    pub section: usize,
    /// 1-based page the paragraph starts on.
    pub page: u32,
}

#[derive(Debug)]
pub struct DocxDocument {
    package: Package,
    main_part: String,
    root: Element,
    rels: Element,
    content_types: Element,
    styles: Option<Part>,
    numbering: Option<Part>,
    settings: Option<Part>,
    parts: BTreeMap<String, Element>,
    dirty: BTreeSet<String>,
    /// Body paragraph paths, cleared whenever the body is edited through `root_mut`.
    paragraph_index: OnceCell<Vec<Vec<usize>>>,
}

impl DocxDocument {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let package = Package::read(path)?;
        let content_types = package.required_xml(CONTENT_TYPES)?;
        let root_rels = package.required_xml(ROOT_RELS)?;
        let main_target = package::find_relationship(&root_rels, REL_OFFICE_DOCUMENT)
            .ok_or_else(|| EngineError::InvalidDocument("no main document relationship".to_string()))?;
        let main_part = package::resolve_target("", main_target);
        let root = package.required_xml(&main_part)?;
        if !root.is("w:document") || root.child("w:body").is_none() {
            return Err(EngineError::InvalidDocument(format!(
                "{main_part} is not a WordprocessingML document"
            )));
        }
        let rels = package
            .xml(&package::rels_path_for(&main_part))?
            .unwrap_or_else(package::empty_rels);
        let styles = load_related(&package, &main_part, &rels, REL_STYLES)?;
        let numbering = load_related(&package, &main_part, &rels, REL_NUMBERING)?;
        let settings = load_related(&package, &main_part, &rels, REL_SETTINGS)?;
        Ok(Self {
            package,
            main_part,
            root,
            rels,
            content_types,
            styles,
            numbering,
            settings,
            parts: BTreeMap::new(),
            dirty: BTreeSet::new(),
            paragraph_index: OnceCell::new(),
        })
    }

    /// Serialize dirty parts and write the package to `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), EngineError> {
        let dirty: Vec<String> = self.dirty.iter().cloned().collect();
        for name in dirty {
            if let Some(xml) = self.part_xml(&name) {
                let data = xml.serialize().into_bytes();
                self.package.put(&name, data);
            }
        }
        self.package.write(path)
    }

    fn part_xml(&self, name: &str) -> Option<&Element> {
        let rels_name = package::rels_path_for(&self.main_part);
        if name == self.main_part {
            return Some(&self.root);
        }
        if name == rels_name {
            return Some(&self.rels);
        }
        if name == CONTENT_TYPES {
            return Some(&self.content_types);
        }
        [&self.styles, &self.numbering, &self.settings]
            .into_iter()
            .flatten()
            .find(|part| part.name == name)
            .map(|part| &part.xml)
            .or_else(|| self.parts.get(name))
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        self.dirty.insert(self.main_part.clone());
        self.paragraph_index.take();
        &mut self.root
    }

    pub fn rels(&self) -> &Element {
        &self.rels
    }

    pub fn rels_mut(&mut self) -> &mut Element {
        self.dirty.insert(package::rels_path_for(&self.main_part));
        &mut self.rels
    }

    pub fn content_types_mut(&mut self) -> &mut Element {
        self.dirty.insert(CONTENT_TYPES.to_string());
        &mut self.content_types
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn put_binary(&mut self, name: &str, data: Vec<u8>) {
        self.package.put(name, data);
    }

    pub fn styles(&self) -> Option<&Element> {
        self.styles.as_ref().map(|part| &part.xml)
    }

    pub fn styles_mut(&mut self) -> &mut Element {
        let part = match self.styles.take() {
            Some(part) => part,
            None => self.create_part(REL_STYLES, "styles.xml", CT_STYLES, "w:styles"),
        };
        self.dirty.insert(part.name.clone());
        &mut self.styles.insert(part).xml
    }

    pub fn numbering(&self) -> Option<&Element> {
        self.numbering.as_ref().map(|part| &part.xml)
    }

    pub fn numbering_mut(&mut self) -> &mut Element {
        let part = match self.numbering.take() {
            Some(part) => part,
            None => self.create_part(REL_NUMBERING, "numbering.xml", CT_NUMBERING, "w:numbering"),
        };
        self.dirty.insert(part.name.clone());
        &mut self.numbering.insert(part).xml
    }

    pub fn settings_mut(&mut self) -> &mut Element {
        let part = match self.settings.take() {
            Some(part) => part,
            None => self.create_part(REL_SETTINGS, "settings.xml", CT_SETTINGS, "w:settings"),
        };
        self.dirty.insert(part.name.clone());
        &mut self.settings.insert(part).xml
    }

    /// New XML part related from the main document.
    pub fn create_part(&mut self, rel_type: &str, file_name: &str, content_type: &str, root: &str) -> Part {
        let dir = self
            .main_part
            .rsplit_once('/')
            .map_or(String::new(), |(dir, _)| format!("{dir}/"));
        let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, "xml"));
        let mut name = format!("{dir}{file_name}");
        if self.package.contains(&name) || self.parts.contains_key(&name) {
            name = self.package.unique_name(&format!("{dir}{stem}"), &format!(".{ext}"));
        }
        let target = name.strip_prefix(&dir).unwrap_or(&name).to_string();
        package::add_relationship(self.rels_mut(), rel_type, &target);
        package::add_override(self.content_types_mut(), &name, content_type);
        self.dirty.insert(name.clone());
        Part {
            name,
            xml: Element::new(root)
                .with_attr("xmlns:w", W_NS)
                .with_attr("xmlns:r", R_NS),
        }
    }

    /// Loaded auxiliary part (header, footer), parsed on first use.
    pub fn part_mut(&mut self, name: &str) -> Result<&mut Element, EngineError> {
        if !self.parts.contains_key(name) {
            let xml = self.package.required_xml(name)?;
            self.parts.insert(name.to_string(), xml);
        }
        self.dirty.insert(name.to_string());
        self.parts
            .get_mut(name)
            .ok_or_else(|| EngineError::InvalidDocument(format!("missing part {name}")))
    }

    pub fn insert_part(&mut self, name: String, xml: Element) {
        self.dirty.insert(name.clone());
        self.parts.insert(name, xml);
    }

    // Paragraphs.

    /// Paths of every body paragraph in document order, table cells included.
    pub fn paragraph_paths(&self) -> Vec<Vec<usize>> {
        self.indexed_paragraphs().to_vec()
    }

    fn indexed_paragraphs(&self) -> &[Vec<usize>] {
        self.paragraph_index
            .get_or_init(|| self.root.find_paths("w:p", &[]))
    }

    pub fn table_paths(&self) -> Vec<Vec<usize>> {
        self.root.find_paths("w:tbl", &[])
    }

    pub fn element(&self, path: &[usize]) -> Result<&Element, EngineError> {
        self.root
            .at(path)
            .ok_or_else(|| EngineError::Failed("range no longer addresses the document".to_string()))
    }

    /// Mutable access below `path`. Edits made here must not add, remove or
    /// move body paragraphs; those go through `root_mut`.
    pub fn element_mut(&mut self, path: &[usize]) -> Result<&mut Element, EngineError> {
        self.dirty.insert(self.main_part.clone());
        self.root
            .at_mut(path)
            .ok_or_else(|| EngineError::Failed("range no longer addresses the document".to_string()))
    }

    /// Section and estimated page of every paragraph.
    ///
    /// Uses the `w:lastRenderedPageBreak` markers Word leaves behind when the
    /// document has any; otherwise counts explicit page breaks,
    /// `w:pageBreakBefore` and non-continuous section breaks.
    pub fn layout(&self) -> Vec<ParagraphMeta> {
        let rendered = self.root.contains_descendant("w:lastRenderedPageBreak");
        let mut page = 1u32;
        let mut section = 1usize;
        let mut out = Vec::new();
        for (index, path) in self.indexed_paragraphs().iter().enumerate() {
            let Some(p) = self.root.at(path) else {
                continue;
            };
            let ppr = p.child("w:pPr");
            let mut start = page;
            if !rendered && index > 0 && flag_on(ppr.and_then(|ppr| ppr.child("w:pageBreakBefore"))) {
                start += 1;
            }
            let mut seen_text = false;
            let mut trailing = 0;
            visit_runs(p, &mut |el| {
                let is_break = if rendered {
                    el.is("w:lastRenderedPageBreak")
                } else {
                    el.is("w:br") && el.attr("w:type") == Some("page")
                };
                if is_break {
                    if seen_text {
                        trailing += 1;
                    } else {
                        start += 1;
                    }
                } else if el.is("w:t") && !el.text().trim().is_empty() {
                    seen_text = true;
                }
            });
            out.push(ParagraphMeta {
                path: path.clone(),
                section,
                page: start,
            });
            page = start + trailing;
            if let Some(sect) = ppr.and_then(|ppr| ppr.child("w:sectPr")) {
                section += 1;
                if !rendered && sect.child_val("w:type") != Some("continuous") {
                    page += 1;
                }
            }
        }
        out
    }

    pub fn page_count(&self) -> u32 {
        self.layout().last().map_or(1, |meta| meta.page)
    }

    /// Paths addressed by range targets, expanding tables and cells to
    /// their paragraphs. Order-preserving, duplicates dropped.
    pub fn paragraphs_for(&self, targets: &[&Target]) -> Result<Vec<Vec<usize>>, EngineError> {
        let all = self.indexed_paragraphs();
        let mut picked: Vec<&Vec<usize>> = Vec::new();
        for target in targets {
            match target {
                Target::Paragraph(index) => picked.push(all.get(*index).ok_or_else(stale)?),
                Target::Table(_) | Target::Cell { .. } => {
                    let container = self.container_path(target)?;
                    picked.extend(all.iter().filter(|path| path.starts_with(&container)));
                }
                Target::Remote(_) => return Err(EngineError::ForeignRange),
            }
        }
        let mut seen = HashSet::new();
        Ok(picked.into_iter().filter(|path| seen.insert(*path)).cloned().collect())
    }

    /// Path of the table or cell a target names.
    pub fn container_path(&self, target: &Target) -> Result<Vec<usize>, EngineError> {
        match target {
            Target::Table(index) => self.table_paths().get(*index).cloned().ok_or_else(stale),
            Target::Cell { table, row, col } => {
                let mut path = self.table_paths().get(*table).cloned().ok_or_else(stale)?;
                let tbl = self.element(&path)?;
                let row_index = nth_child(tbl, "w:tr", *row).ok_or_else(stale)?;
                path.push(row_index);
                let tr = self.element(&path)?;
                let col_index = nth_child(tr, "w:tc", *col).ok_or_else(stale)?;
                path.push(col_index);
                Ok(path)
            }
            Target::Paragraph(index) => self.indexed_paragraphs().get(*index).cloned().ok_or_else(stale),
            Target::Remote(_) => Err(EngineError::ForeignRange),
        }
    }

    /// Apply a regex edit to one paragraph; returns the number of replacements.
    pub fn edit_paragraph(&mut self, path: &[usize], regex: &Regex, edit: &TextEdit) -> Result<usize, EngineError> {
        let current = text::paragraph_text(self.element(path)?);
        let splices = edit.plan(regex, &current);
        if splices.is_empty() {
            return Ok(0);
        }
        text::apply(self.element_mut(path)?, &splices)?;
        Ok(splices.len())
    }

    pub fn insert_text_at_start(&mut self, path: &[usize], value: &str) -> Result<(), EngineError> {
        if value.is_empty() {
            return Ok(());
        }
        let splice = crate::engine::Splice {
            start: 0,
            end: 0,
            text: value.to_string(),
        };
        text::apply(self.element_mut(path)?, &[splice])
    }

    // Styles.

    fn style_element(&self, name_or_id: &str, kind: &str) -> Option<&Element> {
        let styles = self.styles()?;
        let of_kind = || {
            styles
                .children_named("w:style")
                .filter(move |style| style.attr("w:type").unwrap_or("paragraph") == kind)
        };
        of_kind()
            .find(|style| {
                style
                    .child_val("w:name")
                    .is_some_and(|name| name.eq_ignore_ascii_case(name_or_id))
            })
            .or_else(|| of_kind().find(|style| style.attr("w:styleId") == Some(name_or_id)))
    }

    /// Style id for a display name or id, if the style exists.
    pub fn style_id(&self, name_or_id: &str, kind: &str) -> Option<String> {
        self.style_element(name_or_id, kind)
            .and_then(|style| style.attr("w:styleId"))
            .map(str::to_string)
    }

    /// Display name of a style id (the id itself when undefined).
    pub fn style_name(&self, id: &str, kind: &str) -> String {
        let raw = self
            .style_element(id, kind)
            .and_then(|style| style.child_val("w:name"))
            .unwrap_or(id);
        display_name(raw)
    }

    pub fn paragraph_style_id(p: &Element) -> Option<&str> {
        p.child("w:pPr")?.child_val("w:pStyle")
    }

    /// Display name of a paragraph's style; unstyled paragraphs use the
    /// default paragraph style.
    pub fn paragraph_style(&self, p: &Element) -> Option<String> {
        match Self::paragraph_style_id(p) {
            Some(id) => Some(self.style_name(id, "paragraph")),
            None => self.default_style_name("paragraph"),
        }
    }

    fn default_style_name(&self, kind: &str) -> Option<String> {
        self.styles()?
            .children_named("w:style")
            .find(|style| {
                style.attr("w:type") == Some(kind) && flag_attr(style.attr("w:default"))
            })
            .and_then(|style| style.child_val("w:name"))
            .map(display_name)
    }

    /// Id of the named style, registering a plain style of `kind` when the
    /// document does not define it.
    pub fn ensure_style(&mut self, name: &str, kind: &str) -> Result<String, EngineError> {
        if let Some(id) = self.style_id(name, kind) {
            return Ok(id);
        }
        let base: String = name.chars().filter(char::is_ascii_alphanumeric).collect();
        let base = if base.is_empty() { "Custom".to_string() } else { base };
        let taken = |candidate: &str, styles: Option<&Element>| {
            styles.is_some_and(|styles| {
                styles
                    .children_named("w:style")
                    .any(|style| style.attr("w:styleId") == Some(candidate))
            })
        };
        let mut id = base.clone();
        let mut n = 1;
        while taken(&id, self.styles()) {
            n += 1;
            id = format!("{base}{n}");
        }
        let based_on = self.default_style_id(kind);
        let mut style = Element::new("w:style")
            .with_attr("w:type", kind)
            .with_attr("w:customStyle", "1")
            .with_attr("w:styleId", id.clone());
        style.set_child_val("w:name", name, &STYLE_ORDER)?;
        if let Some(base) = based_on {
            style.set_child_val("w:basedOn", base, &STYLE_ORDER)?;
        }
        style.set_flag("w:qFormat", true, &STYLE_ORDER)?;
        self.styles_mut().children.push(Node::Element(style));
        Ok(id)
    }

    fn default_style_id(&self, kind: &str) -> Option<String> {
        self.styles()?
            .children_named("w:style")
            .find(|style| style.attr("w:type") == Some(kind) && flag_attr(style.attr("w:default")))
            .and_then(|style| style.attr("w:styleId"))
            .map(str::to_string)
    }

    /// Mutable style element by id.
    pub fn style_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.styles_mut()
            .elements_mut()
            .find(|style| style.is("w:style") && style.attr("w:styleId") == Some(id))
    }

    // Lists.

    /// List reference inherited through a style's `basedOn` chain.
    fn style_list(&self, id: &str) -> Option<ListRef> {
        let mut current = id.to_string();
        for _ in 0..16 {
            let style = self.style_element(&current, "paragraph")?;
            if let Some(num_pr) = style.child("w:pPr").and_then(|ppr| ppr.child("w:numPr")) {
                return numbering::read_num_pr(num_pr);
            }
            current = style.child_val("w:basedOn")?.to_string();
        }
        None
    }

    /// List level a paragraph is numbered at, if any.
    pub fn list_ref(&self, p: &Element) -> Option<ListRef> {
        let numbering = self.numbering()?;
        let from_style = Self::paragraph_style_id(p).and_then(|id| self.style_list(id));
        let direct = p.child("w:pPr").and_then(|ppr| ppr.child("w:numPr"));
        let list = match direct {
            Some(num_pr) if num_pr.child("w:numId").is_some() => numbering::read_num_pr(num_pr),
            Some(num_pr) => from_style.map(|list| ListRef {
                ilvl: num_pr
                    .child_val("w:ilvl")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(list.ilvl),
                ..list
            }),
            None => from_style,
        }?;
        numbering::level(numbering, list).map(|_| list)
    }

    // Snapshot.

    pub fn snapshot(&self) -> Snapshot {
        let paths = self.indexed_paragraphs();
        let mut headings = BTreeMap::new();
        for path in paths {
            if let Some(p) = self.root.at(path)
                && let Some(style) = Self::paragraph_style_id(p).map(|id| self.style_name(id, "paragraph"))
                && is_heading(&style)
            {
                *headings.entry(style).or_insert(0) += 1;
            }
        }
        let mut bookmark_count = 0;
        self.root.walk(&mut |el| {
            // Word parks its last-edit marker in `_GoBack`.
            if el.is("w:bookmarkStart") && !el.attr("w:name").is_some_and(|name| name.starts_with("_GoBack")) {
                bookmark_count += 1;
            }
        });
        Snapshot {
            paragraph_count: paths.len(),
            bookmark_count,
            inline_shape_count: self.root.count_descendants("wp:inline"),
            content_control_count: self.root.count_descendants("w:sdt"),
            tables_count: self.root.count_descendants("w:tbl"),
            headings_by_level: headings,
        }
    }
}

fn load_related(
    package: &Package,
    main_part: &str,
    rels: &Element,
    rel_type: &str,
) -> Result<Option<Part>, EngineError> {
    let Some(target) = package::find_relationship(rels, rel_type) else {
        return Ok(None);
    };
    let name = package::resolve_target(main_part, target);
    Ok(package.xml(&name)?.map(|xml| Part { name, xml }))
}

fn stale() -> EngineError {
    EngineError::Failed("range no longer addresses the document".to_string())
}

fn nth_child(el: &Element, name: &str, n: usize) -> Option<usize> {
    el.children
        .iter()
        .enumerate()
        .filter(|(_, node)| matches!(node, Node::Element(child) if child.is(name)))
        .nth(n)
        .map(|(index, _)| index)
}

/// Visit run content of a paragraph in order, skipping properties and
/// nested paragraphs.
fn visit_runs<'a>(el: &'a Element, visit: &mut impl FnMut(&'a Element)) {
    for child in el.elements() {
        if child.is("w:pPr") || child.is("w:rPr") || child.is("w:p") {
            continue;
        }
        visit(child);
        visit_runs(child, visit);
    }
}

/// On/off property: present and not explicitly switched off.
pub fn flag_on(el: Option<&Element>) -> bool {
    el.is_some_and(|el| flag_attr(el.attr("w:val").or(Some("1"))))
}

fn flag_attr(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "on"))
}

/// Built-in style names are stored lower-case (`heading 1`); Word shows
/// them capitalized.
pub fn display_name(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_heading(style: &str) -> bool {
    const PREFIX: &str = "heading ";
    style
        .get(..PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(PREFIX))
        && style[PREFIX.len()..].trim().parse::<u8>().is_ok()
}

/// Ensure the paragraph has a `w:pPr` at the front and return it.
pub fn paragraph_properties(p: &mut Element) -> Result<&mut Element, EngineError> {
    p.ensure_child_ordered("w:pPr", &PARAGRAPH_ORDER)
}
