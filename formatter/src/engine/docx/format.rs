//! Paragraph, style, list and table formatting on an open docx document.

use std::collections::BTreeSet;

use crate::core::action::{Alignment, Numbering, ParagraphFormat, RestartAt, TableFormat};
use crate::core::units::Length;
use crate::engine::ListLevelFormat;
use crate::engine::docx::document::{DocxDocument, PPR_ORDER, STYLE_ORDER, paragraph_properties};
use crate::engine::docx::numbering::{self, Counters, ListRef, MAX_LEVELS};
use crate::engine::docx::xml::Element;
use crate::engine::TrailingCharacter;
use crate::error::EngineError;

const TABLE_ORDER: [&str; 3] = ["w:tblPr", "w:tblGrid", "w:tr"];

const TBLPR_ORDER: [&str; 17] = [
    "w:tblStyle",
    "w:tblpPr",
    "w:tblOverlap",
    "w:bidiVisual",
    "w:tblStyleRowBandSize",
    "w:tblStyleColBandSize",
    "w:tblW",
    "w:jc",
    "w:tblCellSpacing",
    "w:tblInd",
    "w:tblBorders",
    "w:shd",
    "w:tblLayout",
    "w:tblCellMar",
    "w:tblLook",
    "w:tblCaption",
    "w:tblDescription",
];

const ROW_ORDER: [&str; 3] = ["w:tblPrEx", "w:trPr", "w:tc"];

const TRPR_ORDER: [&str; 2] = ["w:cantSplit", "w:tblHeader"];

/// `w:tblLook` legacy bit values.
const LOOK_BITS: [(&str, u32); 6] = [
    ("w:firstRow", 0x0020),
    ("w:lastRow", 0x0040),
    ("w:firstColumn", 0x0080),
    ("w:lastColumn", 0x0100),
    ("w:noHBand", 0x0200),
    ("w:noVBand", 0x0400),
];

impl DocxDocument {
    pub fn apply_paragraph_format(
        &mut self,
        paths: &[Vec<usize>],
        format: &ParagraphFormat,
    ) -> Result<usize, EngineError> {
        if format.is_empty() {
            return Ok(0);
        }
        for path in paths {
            let ppr = paragraph_properties(self.element_mut(path)?)?;
            write_paragraph_format(ppr, format)?;
        }
        Ok(paths.len())
    }

    pub fn apply_paragraph_style(&mut self, paths: &[Vec<usize>], name: &str) -> Result<usize, EngineError> {
        if paths.is_empty() {
            return Ok(0);
        }
        let id = self.ensure_style(name, "paragraph")?;
        for path in paths {
            let ppr = paragraph_properties(self.element_mut(path)?)?;
            ppr.set_child_val("w:pStyle", id.clone(), &PPR_ORDER)?;
        }
        Ok(paths.len())
    }

    pub fn apply_table_style(&mut self, tables: &[Vec<usize>], name: &str) -> Result<usize, EngineError> {
        if tables.is_empty() {
            return Ok(0);
        }
        let id = self.ensure_style(name, "table")?;
        for path in tables {
            let tbl = self.element_mut(path)?;
            tbl.ensure_child_ordered("w:tblPr", &TABLE_ORDER)?
                .set_child_val("w:tblStyle", id.clone(), &TBLPR_ORDER)?;
        }
        Ok(tables.len())
    }

    pub fn apply_numbering(&mut self, paths: &[Vec<usize>], config: &Numbering) -> Result<usize, EngineError> {
        if paths.is_empty() {
            return Ok(0);
        }
        if config.list_template.is_some() {
            return Err(EngineError::not_supported("docx", "named list templates"));
        }
        if let Some(style) = &config.list_style {
            self.apply_paragraph_style(paths, style)?;
            if config.outline_level.is_none() && config.restart_at.is_none() {
                return Ok(paths.len());
            }
        }

        let level = config.outline_level.unwrap_or(1).clamp(1, MAX_LEVELS);
        let existing = self.list_ref(self.element(&paths[0])?);
        let numbering_defined = self.numbering().and_then(numbering::first_num_id);
        let num_id = match (existing, numbering_defined) {
            (Some(list), _) => list.num_id,
            (None, Some(num_id)) => num_id,
            (None, None) => numbering::add_default_list(self.numbering_mut())?,
        };
        let mut list = ListRef {
            num_id,
            ilvl: level - 1,
        };
        if let Some(RestartAt::Number(start)) = config.restart_at
            && let Some(restarted) = numbering::add_restart(self.numbering_mut(), list, start)
        {
            list.num_id = restarted;
        }
        for path in paths {
            let ppr = paragraph_properties(self.element_mut(path)?)?;
            ppr.set_child_ordered(numbering::num_pr_element(list), &PPR_ORDER);
        }
        Ok(paths.len())
    }

    /// Render list labels into paragraph text and drop the numbering,
    /// keeping the indentation the list level gave the paragraph.
    pub fn convert_list_numbers_to_text(&mut self, paths: &[Vec<usize>]) -> Result<usize, EngineError> {
        let Some(numbering) = self.numbering() else {
            return Ok(0);
        };
        let wanted: BTreeSet<&Vec<usize>> = paths.iter().collect();
        let mut counters = Counters::default();
        let mut plan = Vec::new();
        for path in self.paragraph_paths() {
            let p = self.element(&path)?;
            let Some(list) = self.list_ref(p) else {
                continue;
            };
            let label = counters.next_label(numbering, list);
            if !wanted.contains(&path) {
                continue;
            }
            let Some(lvl) = numbering::level(numbering, list) else {
                continue;
            };
            let suffix = match numbering::read_level_format(lvl, list.ilvl + 1).trailing {
                TrailingCharacter::Tab => "\t",
                TrailingCharacter::Space => " ",
                TrailingCharacter::None => "",
            };
            let text = format!("{}{suffix}", label.unwrap_or_default());
            plan.push((path, text, numbering::level_indent(lvl)));
        }

        for (path, text, indent) in &plan {
            self.insert_text_at_start(path, text)?;
            let ppr = paragraph_properties(self.element_mut(path)?)?;
            ppr.set_child_ordered(
                numbering::num_pr_element(ListRef { num_id: 0, ilvl: 0 }),
                &PPR_ORDER,
            );
            if ppr.child("w:ind").is_none()
                && let Some(ind) = indent.clone()
            {
                ppr.set_child_ordered(ind, &PPR_ORDER);
            }
        }
        Ok(plan.len())
    }

    pub fn list_level_format(&self, path: &[usize]) -> Result<Option<ListLevelFormat>, EngineError> {
        let p = self.element(path)?;
        let (Some(list), Some(numbering)) = (self.list_ref(p), self.numbering()) else {
            return Ok(None);
        };
        Ok(numbering::level(numbering, list).map(|lvl| numbering::read_level_format(lvl, list.ilvl + 1)))
    }

    pub fn set_list_level_format(&mut self, path: &[usize], format: &ListLevelFormat) -> Result<(), EngineError> {
        let list = self.numbered(path)?;
        let target = ListRef {
            ilvl: format.level.clamp(1, MAX_LEVELS) - 1,
            ..list
        };
        let lvl = numbering::level_mut(self.numbering_mut(), target)
            .ok_or_else(|| EngineError::Failed(format!("list {} has no definition", list.num_id)))?;
        numbering::write_level_format(lvl, format)
    }

    pub fn set_list_level_number(&mut self, path: &[usize], level: u8) -> Result<(), EngineError> {
        let list = self.numbered(path)?;
        let moved = ListRef {
            ilvl: level.clamp(1, MAX_LEVELS) - 1,
            ..list
        };
        let ppr = paragraph_properties(self.element_mut(path)?)?;
        ppr.set_child_ordered(numbering::num_pr_element(moved), &PPR_ORDER);
        Ok(())
    }

    fn numbered(&self, path: &[usize]) -> Result<ListRef, EngineError> {
        self.list_ref(self.element(path)?)
            .ok_or_else(|| EngineError::Failed("paragraph is not part of a list".to_string()))
    }

    pub fn ensure_paragraph_style(&mut self, name: &str, left_indent: Length) -> Result<(), EngineError> {
        let id = self.ensure_style(name, "paragraph")?;
        let style = self
            .style_mut(&id)
            .ok_or_else(|| EngineError::Failed(format!("style {name} missing after creation")))?;
        let ind = style
            .ensure_child_ordered("w:pPr", &STYLE_ORDER)?
            .ensure_child_ordered("w:ind", &PPR_ORDER)?;
        ind.remove_attr("w:start");
        ind.set_attr("w:left", left_indent.twips().to_string());
        Ok(())
    }

    pub fn format_table(&mut self, tables: &[Vec<usize>], config: &TableFormat) -> Result<usize, EngineError> {
        if tables.is_empty() {
            return Ok(0);
        }
        if let Some(style) = &config.style {
            self.apply_table_style(tables, style)?;
        }
        for path in tables {
            let tbl = self.element_mut(path)?;
            let tbl_pr = tbl.ensure_child_ordered("w:tblPr", &TABLE_ORDER)?;
            if let Some(autofit) = config.autofit {
                tbl_pr
                    .ensure_child_ordered("w:tblLayout", &TBLPR_ORDER)?
                    .set_attr("w:type", if autofit { "autofit" } else { "fixed" });
            }
            if config.header_row.is_some() || config.banded_rows.is_some() {
                let look = tbl_pr.ensure_child_ordered("w:tblLook", &TBLPR_ORDER)?;
                if let Some(header) = config.header_row {
                    look.set_attr("w:firstRow", if header { "1" } else { "0" });
                }
                if let Some(banded) = config.banded_rows {
                    look.set_attr("w:noHBand", if banded { "0" } else { "1" });
                }
                let bits = LOOK_BITS
                    .iter()
                    .filter(|(attr, _)| look.attr(attr) == Some("1"))
                    .fold(0u32, |acc, (_, bit)| acc | bit);
                look.set_attr("w:val", format!("{bits:04X}"));
            }
            if let Some(header) = config.header_row
                && let Some(first_row) = tbl.child_mut("w:tr")
            {
                first_row
                    .ensure_child_ordered("w:trPr", &ROW_ORDER)?
                    .set_flag("w:tblHeader", header, &TRPR_ORDER)?;
            }
        }
        Ok(tables.len())
    }

    /// Table paths containing each paragraph path (innermost table).
    pub fn enclosing_tables(&self, paths: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let tables = self.table_paths();
        let mut out: Vec<Vec<usize>> = Vec::new();
        for path in paths {
            if let Some(table) = tables
                .iter()
                .filter(|table| path.starts_with(table))
                .max_by_key(|table| table.len())
                && !out.contains(table)
            {
                out.push(table.clone());
            }
        }
        out
    }
}

fn write_paragraph_format(ppr: &mut Element, format: &ParagraphFormat) -> Result<(), EngineError> {
    if let Some(alignment) = format.alignment {
        let jc = match alignment {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "both",
        };
        ppr.set_child_val("w:jc", jc, &PPR_ORDER)?;
    }

    if format.line_spacing.is_some() || format.space_before.is_some() || format.space_after.is_some() {
        let spacing = ppr.ensure_child_ordered("w:spacing", &PPR_ORDER)?;
        if let Some(multiple) = format.line_spacing {
            spacing.set_attr("w:line", ((multiple * 240.0).round() as i64).to_string());
            spacing.set_attr("w:lineRule", "auto");
        }
        if let Some(before) = format.space_before {
            spacing.remove_attr("w:beforeAutospacing");
            spacing.set_attr("w:before", before.twips().to_string());
        }
        if let Some(after) = format.space_after {
            spacing.remove_attr("w:afterAutospacing");
            spacing.set_attr("w:after", after.twips().to_string());
        }
    }

    if format.left_indent.is_some() || format.right_indent.is_some() || format.first_line_indent.is_some() {
        let ind = ppr.ensure_child_ordered("w:ind", &PPR_ORDER)?;
        if let Some(left) = format.left_indent {
            ind.remove_attr("w:start");
            ind.set_attr("w:left", left.twips().to_string());
        }
        if let Some(right) = format.right_indent {
            ind.remove_attr("w:end");
            ind.set_attr("w:right", right.twips().to_string());
        }
        if let Some(first) = format.first_line_indent {
            ind.remove_attr("w:hanging");
            ind.remove_attr("w:firstLine");
            let twips = first.twips();
            if twips < 0 {
                ind.set_attr("w:hanging", (-twips).to_string());
            } else {
                ind.set_attr("w:firstLine", twips.to_string());
            }
        }
    }

    let flags = [
        ("w:keepNext", format.keep_with_next),
        ("w:keepLines", format.keep_together),
        ("w:pageBreakBefore", format.page_break_before),
        ("w:widowControl", format.widow_control),
    ];
    for (name, value) in flags {
        if let Some(on) = value {
            ppr.set_flag(name, on, &PPR_ORDER)?;
        }
    }

    if format.clear_tab_stops == Some(true) {
        ppr.remove_children("w:tabs");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::docx::text::paragraph_text;
    use crate::engine::LevelAlignment;
    use crate::test_support::DocxBuilder;

    fn open(builder: DocxBuilder) -> (tempfile::TempDir, DocxDocument) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = builder.write_to(dir.path(), "doc.docx");
        let doc = DocxDocument::open(&path).expect("open");
        (dir, doc)
    }

    #[test]
    fn paragraph_format_writes_schema_ordered_properties() {
        let (_dir, mut doc) = open(DocxBuilder::new().paragraph("x"));
        let paths = doc.paragraph_paths();
        let format = ParagraphFormat {
            alignment: Some(Alignment::Justify),
            space_after: Some(Length::from_points(6.0)),
            first_line_indent: Some(Length::from_points(-18.0)),
            keep_with_next: Some(true),
            ..ParagraphFormat::default()
        };
        assert_eq!(doc.apply_paragraph_format(&paths, &format).expect("format"), 1);
        let ppr = doc.element(&paths[0]).expect("p").child("w:pPr").expect("pPr");
        let names: Vec<&str> = ppr.elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, ["w:keepNext", "w:spacing", "w:ind", "w:jc"]);
        assert_eq!(ppr.child("w:ind").and_then(|ind| ind.attr("w:hanging")), Some("360"));
        assert_eq!(ppr.child("w:spacing").and_then(|s| s.attr("w:after")), Some("120"));
    }

    #[test]
    fn numbered_paragraphs_convert_to_literal_labels() {
        let (_dir, mut doc) = open(
            DocxBuilder::new()
                .numbered_paragraph(0, "First")
                .numbered_paragraph(1, "Nested")
                .numbered_paragraph(0, "Second"),
        );
        let paths = doc.paragraph_paths();
        assert_eq!(doc.convert_list_numbers_to_text(&paths[1..]).expect("convert"), 2);
        let texts: Vec<String> = paths
            .iter()
            .map(|path| paragraph_text(doc.element(path).expect("p")))
            .collect();
        assert_eq!(texts, ["First", "(a)\tNested", "2.\tSecond"]);
        let second = doc.element(&paths[2]).expect("p");
        assert!(doc.list_ref(second).is_none());
        assert!(second.child("w:pPr").and_then(|ppr| ppr.child("w:ind")).is_some());
    }

    #[test]
    fn list_level_format_round_trips_through_paragraph() {
        let (_dir, mut doc) = open(DocxBuilder::new().numbered_paragraph(0, "Item"));
        let path = doc.paragraph_paths()[0].clone();
        let mut format = doc.list_level_format(&path).expect("read").expect("numbered");
        assert_eq!(format.level, 1);
        format.trailing = TrailingCharacter::None;
        format.alignment = LevelAlignment::Right;
        format.tab_position = None;
        doc.set_list_level_format(&path, &format).expect("write");
        assert_eq!(doc.list_level_format(&path).expect("read"), Some(format));
    }

    #[test]
    fn numbering_without_definitions_creates_a_list() {
        let (_dir, mut doc) = open(DocxBuilder::new().without_numbering().paragraph("a").paragraph("b"));
        let paths = doc.paragraph_paths();
        let config = Numbering {
            outline_level: Some(2),
            ..Numbering::default()
        };
        assert_eq!(doc.apply_numbering(&paths, &config).expect("numbering"), 2);
        let list = doc.list_ref(doc.element(&paths[1]).expect("p")).expect("list");
        assert_eq!(list.ilvl, 1);
    }

    #[test]
    fn table_format_sets_look_and_header() {
        let (_dir, mut doc) = open(DocxBuilder::new().table(&[&["h1", "h2"], &["a", "b"]]));
        let tables = doc.table_paths();
        let config = TableFormat {
            style: Some("Grid Table".to_string()),
            header_row: Some(true),
            banded_rows: Some(false),
            autofit: Some(false),
            ..TableFormat::default()
        };
        assert_eq!(doc.format_table(&tables, &config).expect("table"), 1);
        let tbl = doc.element(&tables[0]).expect("tbl");
        let tbl_pr = tbl.child("w:tblPr").expect("tblPr");
        assert_eq!(tbl_pr.child_val("w:tblStyle"), Some("GridTable"));
        let look = tbl_pr.child("w:tblLook").expect("look");
        assert_eq!(look.attr("w:val"), Some("0220"));
        let header = tbl.child("w:tr").and_then(|tr| tr.child("w:trPr")).and_then(|pr| pr.child("w:tblHeader"));
        assert!(header.is_some());
    }
}
