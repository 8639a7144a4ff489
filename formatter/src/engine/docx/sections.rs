//! Section-level editing: page setup, section breaks, headers and footers.

use crate::core::action::{BreakType, HeaderFooterText, Orientation, PageSetup};
use crate::core::units::Length;
use crate::engine::PageGeometry;
use crate::engine::docx::document::{DocxDocument, PPR_ORDER, R_NS, W_NS, paragraph_properties};
use crate::engine::docx::package::{self, REL_FOOTER, REL_HEADER};
use crate::engine::docx::text;
use crate::engine::docx::xml::{Element, Node};
use crate::error::EngineError;

/// `w:sectPr` children in schema order.
const SECT_ORDER: [&str; 22] = [
    "w:headerReference",
    "w:footerReference",
    "w:footnotePr",
    "w:endnotePr",
    "w:type",
    "w:pgSz",
    "w:pgMar",
    "w:paperSrc",
    "w:pgBorders",
    "w:lnNumType",
    "w:pgNumType",
    "w:cols",
    "w:formProt",
    "w:vAlign",
    "w:noEndnote",
    "w:titlePg",
    "w:textDirection",
    "w:bidi",
    "w:rtlGutter",
    "w:docGrid",
    "w:printerSettings",
    "w:sectPrChange",
];

/// Leading `w:settings` children, enough to place `w:evenAndOddHeaders`.
const SETTINGS_ORDER: [&str; 14] = [
    "w:writeProtection",
    "w:view",
    "w:zoom",
    "w:removePersonalInformation",
    "w:removeDateAndTime",
    "w:doNotDisplayPageBoundaries",
    "w:displayBackgroundShape",
    "w:mirrorMargins",
    "w:proofState",
    "w:attachedTemplate",
    "w:defaultTabStop",
    "w:characterSpacingControl",
    "w:evenAndOddHeaders",
    "w:compat",
];

const LETTER_WIDTH_TWIPS: i64 = 12240;
const LETTER_HEIGHT_TWIPS: i64 = 15840;
const DEFAULT_MARGIN_TWIPS: i64 = 1440;

const CT_HEADER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";
const CT_FOOTER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFooterKind {
    Header,
    Footer,
}

impl HeaderFooterKind {
    fn reference(self) -> &'static str {
        match self {
            Self::Header => "w:headerReference",
            Self::Footer => "w:footerReference",
        }
    }

    fn rel_type(self) -> &'static str {
        match self {
            Self::Header => REL_HEADER,
            Self::Footer => REL_FOOTER,
        }
    }

    fn root(self) -> &'static str {
        match self {
            Self::Header => "w:hdr",
            Self::Footer => "w:ftr",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Footer => "footer",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::Header => CT_HEADER,
            Self::Footer => CT_FOOTER,
        }
    }

    fn style(self) -> &'static str {
        match self {
            Self::Header => "Header",
            Self::Footer => "Footer",
        }
    }
}

fn twips(el: Option<&Element>, key: &str) -> Option<i64> {
    el?.attr(key)?.parse().ok()
}

impl DocxDocument {
    /// Every `w:sectPr` in document order; the body gets one if it has none.
    fn section_paths(&mut self) -> Vec<Vec<usize>> {
        let paths = self.root().find_paths("w:sectPr", &[]);
        if !paths.is_empty() {
            return paths;
        }
        let root = self.root_mut();
        if let Some(body) = root.child_mut("w:body") {
            let sect = Element::new("w:sectPr")
                .with_child(
                    Element::new("w:pgSz")
                        .with_attr("w:w", LETTER_WIDTH_TWIPS.to_string())
                        .with_attr("w:h", LETTER_HEIGHT_TWIPS.to_string()),
                )
                .with_child(default_margins());
            body.children.push(Node::Element(sect));
        }
        self.root().find_paths("w:sectPr", &[])
    }

    pub fn page_geometry(&self) -> PageGeometry {
        let first = self
            .root()
            .find_paths("w:sectPr", &[])
            .into_iter()
            .next()
            .and_then(|path| self.root().at(&path));
        let size = first.and_then(|sect| sect.child("w:pgSz"));
        let margins = first.and_then(|sect| sect.child("w:pgMar"));
        PageGeometry {
            page_width: Length::from_twips(twips(size, "w:w").unwrap_or(LETTER_WIDTH_TWIPS)),
            left_margin: Length::from_twips(twips(margins, "w:left").unwrap_or(DEFAULT_MARGIN_TWIPS)),
            right_margin: Length::from_twips(twips(margins, "w:right").unwrap_or(DEFAULT_MARGIN_TWIPS)),
        }
    }

    /// Apply margins, orientation and paper size to every section.
    pub fn apply_page_setup(&mut self, config: &PageSetup) -> Result<usize, EngineError> {
        if config.margins.is_none() && config.orientation.is_none() && config.paper_size.is_none() {
            return Ok(0);
        }
        let paths = self.section_paths();
        for path in &paths {
            let sect = self.element_mut(path)?;
            if config.orientation.is_some() || config.paper_size.is_some() {
                let size = sect.ensure_child_ordered("w:pgSz", &SECT_ORDER)?;
                let (mut width, mut height) = match config.paper_size {
                    Some(paper) => {
                        let (w, h) = paper.dimensions();
                        (w.twips(), h.twips())
                    }
                    None => (
                        twips(Some(&*size), "w:w").unwrap_or(LETTER_WIDTH_TWIPS),
                        twips(Some(&*size), "w:h").unwrap_or(LETTER_HEIGHT_TWIPS),
                    ),
                };
                let landscape = match config.orientation {
                    Some(orientation) => orientation == Orientation::Landscape,
                    None => size.attr("w:orient") == Some("landscape"),
                };
                if landscape != (width > height) {
                    std::mem::swap(&mut width, &mut height);
                }
                size.set_attr("w:w", width.to_string());
                size.set_attr("w:h", height.to_string());
                if landscape {
                    size.set_attr("w:orient", "landscape");
                } else {
                    size.remove_attr("w:orient");
                }
            }
            if let Some(margins) = &config.margins {
                if sect.child("w:pgMar").is_none() {
                    sect.set_child_ordered(default_margins(), &SECT_ORDER);
                }
                let mar = sect.ensure_child_ordered("w:pgMar", &SECT_ORDER)?;
                let sides = [
                    ("w:top", margins.top),
                    ("w:bottom", margins.bottom),
                    ("w:left", margins.left),
                    ("w:right", margins.right),
                ];
                for (side, value) in sides {
                    if let Some(value) = value {
                        mar.set_attr(side, value.twips().to_string());
                    }
                }
            }
        }
        Ok(paths.len())
    }

    /// End a section at, or just before, each selected paragraph.
    ///
    /// The new `w:sectPr` copies the properties of the section it splits;
    /// the section that follows starts with `break_type`.
    pub fn insert_section_breaks(
        &mut self,
        paths: &[Vec<usize>],
        before: bool,
        break_type: BreakType,
    ) -> Result<usize, EngineError> {
        self.section_paths();
        let all = self.paragraph_paths();
        let mut count = 0;
        for path in paths {
            let Some(position) = all.iter().position(|candidate| candidate == path) else {
                continue;
            };
            let Some(end) = (if before { position.checked_sub(1) } else { Some(position) }) else {
                continue;
            };
            let end_path = &all[end];
            if has_section_properties(self.element(end_path)?) {
                continue;
            }
            let Some(governing) = self.governing_section(&all, end) else {
                continue;
            };
            let mut split = self.element(&governing)?.clone();
            split.remove_children("w:headerReference");
            split.remove_children("w:footerReference");
            paragraph_properties(self.element_mut(end_path)?)?.set_child_ordered(split, &PPR_ORDER);
            self.element_mut(&governing)?
                .set_child_val("w:type", break_type.ooxml(), &SECT_ORDER)?;
            count += 1;
        }
        Ok(count)
    }

    /// Path of the `w:sectPr` that closes the section containing paragraph `index`.
    fn governing_section(&self, all: &[Vec<usize>], index: usize) -> Option<Vec<usize>> {
        for path in &all[index..] {
            let p = self.root().at(path)?;
            if let Some(ppr_index) = child_position(p, "w:pPr")
                && let Some(Node::Element(ppr)) = p.children.get(ppr_index)
                && let Some(sect_index) = child_position(ppr, "w:sectPr")
            {
                let mut sect = path.clone();
                sect.extend([ppr_index, sect_index]);
                return Some(sect);
            }
        }
        let body_index = child_position(self.root(), "w:body")?;
        let Node::Element(body) = &self.root().children[body_index] else {
            return None;
        };
        let sect_index = child_position(body, "w:sectPr")?;
        Some(vec![body_index, sect_index])
    }

    /// Write `left\tcenter\tright` into the default header or footer of
    /// every section, creating the part when the document has none.
    pub fn write_header_footer(
        &mut self,
        kind: HeaderFooterKind,
        content: &HeaderFooterText,
    ) -> Result<(), EngineError> {
        let sections = self.section_paths();
        let existing = sections.iter().find_map(|path| {
            let sect = self.root().at(path)?;
            let rid = default_reference(sect, kind)?;
            package::relationship_target(self.rels(), rid)
                .map(|target| package::resolve_target(self.main_part(), target))
        });
        let part_name = match existing {
            Some(name) => name,
            None => self.create_header_footer(kind, &sections)?,
        };

        let style = self.style_id(kind.style(), "paragraph");
        let mut paragraph = Element::new("w:p");
        if let Some(style) = style {
            paragraph
                .ensure_child("w:pPr")?
                .set_child_val("w:pStyle", style, &PPR_ORDER)?;
        }
        for run in field_runs(&content.joined()) {
            paragraph.children.push(Node::Element(run));
        }

        let part = self.part_mut(&part_name)?;
        part.children.retain(|node| {
            !matches!(node, Node::Element(el) if el.is("w:p") || el.is("w:tbl") || el.is("w:sdt"))
        });
        part.children.push(Node::Element(paragraph));
        Ok(())
    }

    fn create_header_footer(
        &mut self,
        kind: HeaderFooterKind,
        sections: &[Vec<usize>],
    ) -> Result<String, EngineError> {
        let dir = self
            .main_part()
            .rsplit_once('/')
            .map_or(String::new(), |(dir, _)| format!("{dir}/"));
        let name = self
            .package()
            .unique_name(&format!("{dir}{}", kind.file_stem()), ".xml");
        let target = name.strip_prefix(&dir).unwrap_or(&name).to_string();
        let rid = package::add_relationship(self.rels_mut(), kind.rel_type(), &target);
        package::add_override(self.content_types_mut(), &name, kind.content_type());
        self.insert_part(
            name.clone(),
            Element::new(kind.root())
                .with_attr("xmlns:w", W_NS)
                .with_attr("xmlns:r", R_NS),
        );
        ensure_namespace(self.root_mut(), "xmlns:r", R_NS);

        for path in sections {
            let sect = self.element_mut(path)?;
            if default_reference(sect, kind).is_some() {
                continue;
            }
            let reference = Element::new(kind.reference())
                .with_attr("w:type", "default")
                .with_attr("r:id", rid.clone());
            let at = match kind {
                HeaderFooterKind::Header => 0,
                HeaderFooterKind::Footer => sect
                    .children
                    .iter()
                    .rposition(|node| {
                        matches!(node, Node::Element(el)
                            if el.is("w:headerReference") || el.is("w:footerReference"))
                    })
                    .map_or(0, |index| index + 1),
            };
            sect.children.insert(at, Node::Element(reference));
        }
        Ok(name)
    }

    /// Set `w:titlePg` on every section.
    pub fn set_different_first_page(&mut self, on: bool) -> Result<usize, EngineError> {
        let paths = self.section_paths();
        for path in &paths {
            self.element_mut(path)?.set_flag("w:titlePg", on, &SECT_ORDER)?;
        }
        Ok(paths.len())
    }

    pub fn set_different_odd_even(&mut self, on: bool) -> Result<(), EngineError> {
        self.settings_mut()
            .set_flag("w:evenAndOddHeaders", on, &SETTINGS_ORDER)
    }
}

fn default_margins() -> Element {
    let margin = DEFAULT_MARGIN_TWIPS.to_string();
    Element::new("w:pgMar")
        .with_attr("w:top", margin.clone())
        .with_attr("w:right", margin.clone())
        .with_attr("w:bottom", margin.clone())
        .with_attr("w:left", margin)
        .with_attr("w:header", "720")
        .with_attr("w:footer", "720")
        .with_attr("w:gutter", "0")
}

fn default_reference(sect: &Element, kind: HeaderFooterKind) -> Option<&str> {
    sect.children_named(kind.reference())
        .find(|reference| reference.attr("w:type").unwrap_or("default") == "default")
        .and_then(|reference| reference.attr("r:id"))
}

fn has_section_properties(p: &Element) -> bool {
    p.child("w:pPr").is_some_and(|ppr| ppr.child("w:sectPr").is_some())
}

fn child_position(el: &Element, name: &str) -> Option<usize> {
    el.children
        .iter()
        .position(|node| matches!(node, Node::Element(child) if child.is(name)))
}

pub fn ensure_namespace(root: &mut Element, prefix: &str, uri: &str) {
    if root.attr(prefix).is_none() {
        root.set_attr(prefix, uri);
    }
}

const FIELDS: [(&str, &str); 2] = [("{PAGE}", " PAGE "), ("{NUMPAGES}", " NUMPAGES ")];

/// Runs for header/footer text with `{PAGE}`/`{NUMPAGES}` as simple fields.
fn field_runs(content: &str) -> Vec<Element> {
    let mut out = Vec::new();
    let mut rest = content;
    loop {
        let next = FIELDS
            .iter()
            .filter_map(|(token, instr)| rest.find(token).map(|at| (at, *token, *instr)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, token, instr)) = next else {
            out.extend(text::runs_for(rest));
            return out;
        };
        out.extend(text::runs_for(&rest[..at]));
        out.push(
            Element::new("w:fldSimple")
                .with_attr("w:instr", instr)
                .with_child(Element::new("w:r").with_child(text::text_element("1".to_string()))),
        );
        rest = &rest[at + token.len()..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Margins, PaperSize};
    use crate::test_support::DocxBuilder;

    fn open(builder: DocxBuilder) -> (tempfile::TempDir, DocxDocument) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = builder.write_to(dir.path(), "doc.docx");
        let doc = DocxDocument::open(&path).expect("open");
        (dir, doc)
    }

    #[test]
    fn landscape_a4_swaps_dimensions() {
        let (_dir, mut doc) = open(DocxBuilder::new().paragraph("x"));
        let config = PageSetup {
            orientation: Some(Orientation::Landscape),
            paper_size: Some(PaperSize::A4),
            margins: Some(Margins {
                left: Some(Length::from_cm(2.0)),
                ..Margins::default()
            }),
        };
        assert_eq!(doc.apply_page_setup(&config).expect("setup"), 1);
        let geometry = doc.page_geometry();
        assert!(geometry.page_width.approx_eq(Length::from_points(841.9), 0.1));
        assert!(geometry.left_margin.approx_eq(Length::from_cm(2.0), 0.1));
    }

    #[test]
    fn header_part_is_created_with_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = DocxBuilder::new().paragraph("x").write_to(dir.path(), "doc.docx");
        let mut doc = DocxDocument::open(&path).expect("open");
        let content = HeaderFooterText {
            left: Some("Report".to_string()),
            right: Some("Page {PAGE} of {NUMPAGES}".to_string()),
            ..HeaderFooterText::default()
        };
        doc.write_header_footer(HeaderFooterKind::Header, &content)
            .expect("header");
        let out = dir.path().join("out.docx");
        doc.save(&out).expect("save");

        let reopened = DocxDocument::open(&out).expect("reopen");
        let header = reopened
            .package()
            .xml("word/header1.xml")
            .expect("parse")
            .expect("header part");
        assert_eq!(header.count_descendants("w:fldSimple"), 2);
        let paragraph = header.child("w:p").expect("paragraph");
        assert_eq!(text::paragraph_text(paragraph), "Report\t\tPage 1 of 1");
        assert!(
            reopened
                .rels()
                .children_named("Relationship")
                .any(|rel| rel.attr("Type") == Some(REL_HEADER))
        );
    }

    #[test]
    fn section_break_splits_governing_section() {
        let (_dir, mut doc) = open(DocxBuilder::new().paragraph("a").paragraph("b").paragraph("c"));
        let paths = doc.paragraph_paths();
        let added = doc
            .insert_section_breaks(&paths[1..2], true, BreakType::Continuous)
            .expect("break");
        assert_eq!(added, 1);
        let layout = doc.layout();
        let sections: Vec<usize> = layout.iter().map(|meta| meta.section).collect();
        assert_eq!(sections, [1, 2, 2]);
        assert_eq!(doc.snapshot().paragraph_count, 3);
    }
}
