//! Paragraph text as seen through runs, and in-place splicing of run text.
//!
//! A paragraph's text is the concatenation of its `w:t` elements with each
//! `w:tab` read as `'\t'`. Edits rewrite the `w:t` elements that cover the
//! edited span, so runs outside the span keep their formatting untouched.

use crate::engine::Splice;
use crate::engine::docx::xml::{Element, Node};
use crate::error::EngineError;

/// Elements that never contribute visible paragraph text.
const SKIP: [&str; 5] = ["w:pPr", "w:rPr", "w:p", "mc:Fallback", "w:del"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Text,
    Tab,
}

/// One text-bearing element of a paragraph, with its byte span in the
/// concatenated paragraph text.
#[derive(Debug, Clone)]
struct Segment {
    path: Vec<usize>,
    kind: SegmentKind,
    start: usize,
    end: usize,
}

fn segments(paragraph: &Element) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut prefix = Vec::new();
    collect(paragraph, &mut prefix, &mut offset, &mut out);
    out
}

fn collect(el: &Element, prefix: &mut Vec<usize>, offset: &mut usize, out: &mut Vec<Segment>) {
    for (index, node) in el.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        if SKIP.contains(&child.name.as_str()) {
            continue;
        }
        prefix.push(index);
        let len = match child.name.as_str() {
            "w:t" => Some((SegmentKind::Text, child.text().len())),
            "w:tab" => Some((SegmentKind::Tab, 1)),
            _ => None,
        };
        match len {
            Some((kind, len)) => {
                out.push(Segment {
                    path: prefix.clone(),
                    kind,
                    start: *offset,
                    end: *offset + len,
                });
                *offset += len;
            }
            None => collect(child, prefix, offset, out),
        }
        prefix.pop();
    }
}

/// Visible text of a paragraph.
pub fn paragraph_text(paragraph: &Element) -> String {
    let mut text = String::new();
    append_text(paragraph, &mut text);
    text
}

fn append_text(el: &Element, text: &mut String) {
    for child in el.elements() {
        if SKIP.contains(&child.name.as_str()) {
            continue;
        }
        match child.name.as_str() {
            "w:t" => text.push_str(&child.text()),
            "w:tab" => text.push('\t'),
            _ => append_text(child, text),
        }
    }
}

/// Apply ascending, non-overlapping splices to a paragraph in place.
pub fn apply(paragraph: &mut Element, splices: &[Splice]) -> Result<(), EngineError> {
    for splice in splices.iter().rev() {
        splice_one(paragraph, splice)?;
    }
    Ok(())
}

fn splice_one(paragraph: &mut Element, splice: &Splice) -> Result<(), EngineError> {
    let mut segs = segments(paragraph);
    if find_anchor(&segs, splice.start).is_none() {
        insert_empty_text(paragraph, &segs, splice.start)?;
        segs = segments(paragraph);
    }
    let anchor = find_anchor(&segs, splice.start)
        .ok_or_else(|| EngineError::Failed("no run to hold edited text".to_string()))?;

    // Later segments first so earlier paths stay valid.
    for (index, seg) in segs.iter().enumerate().rev() {
        if index == anchor || seg.end <= splice.start || seg.start >= splice.end {
            continue;
        }
        match seg.kind {
            SegmentKind::Tab => remove_at(paragraph, &seg.path)?,
            SegmentKind::Text => {
                let el = element_at(paragraph, &seg.path)?;
                let text = el.text();
                let from = splice.start.saturating_sub(seg.start);
                let to = splice.end.min(seg.end) - seg.start;
                let kept = format!("{}{}", &text[..from], &text[to..]);
                set_run_text(el, kept);
            }
        }
    }

    let seg = &segs[anchor];
    let el = element_at(paragraph, &seg.path)?;
    let text = el.text();
    let from = splice.start.saturating_sub(seg.start).min(text.len());
    let to = (splice.end.min(seg.end).saturating_sub(seg.start)).clamp(from, text.len());
    let edited = format!("{}{}{}", &text[..from], splice.text, &text[to..]);
    expand_tabs(paragraph, &seg.path, edited)
}

/// Text segment that can hold an edit starting at `offset`.
fn find_anchor(segs: &[Segment], offset: usize) -> Option<usize> {
    segs.iter()
        .position(|seg| seg.kind == SegmentKind::Text && seg.start <= offset && offset <= seg.end)
}

/// Make room for text at `offset` when no `w:t` touches it: a new `w:t`
/// goes right before the first segment at or after the offset, or into a
/// fresh run at the end of the paragraph.
fn insert_empty_text(paragraph: &mut Element, segs: &[Segment], offset: usize) -> Result<(), EngineError> {
    match segs.iter().find(|seg| seg.start >= offset) {
        Some(seg) => {
            let (parent_path, index) = split_path(&seg.path)?;
            let parent = element_at(paragraph, parent_path)?;
            parent
                .children
                .insert(index, Node::Element(text_element(String::new())));
        }
        None => paragraph
            .children
            .push(Node::Element(Element::new("w:r").with_child(text_element(String::new())))),
    }
    Ok(())
}

/// Store `text` at the `w:t` addressed by `path`, turning embedded tabs into
/// sibling `w:tab` elements.
fn expand_tabs(paragraph: &mut Element, path: &[usize], text: String) -> Result<(), EngineError> {
    if !text.contains('\t') {
        set_run_text(element_at(paragraph, path)?, text);
        return Ok(());
    }
    let mut pieces = text.split('\t');
    let first = pieces.next().unwrap_or_default().to_string();
    let rest: Vec<String> = pieces.map(str::to_string).collect();
    set_run_text(element_at(paragraph, path)?, first);

    let (parent_path, index) = split_path(path)?;
    let parent = element_at(paragraph, parent_path)?;
    let mut at = index + 1;
    for piece in rest {
        parent.children.insert(at, Node::Element(Element::new("w:tab")));
        at += 1;
        if !piece.is_empty() {
            parent.children.insert(at, Node::Element(text_element(piece)));
            at += 1;
        }
    }
    Ok(())
}

pub fn text_element(text: String) -> Element {
    let mut el = Element::new("w:t");
    set_run_text(&mut el, text);
    el
}

fn set_run_text(el: &mut Element, text: String) {
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        el.set_attr("xml:space", "preserve");
    }
    if text.is_empty() {
        el.children.clear();
    } else {
        el.set_text(text);
    }
}

/// Runs rendering `text`, tabs as `w:tab`.
pub fn runs_for(text: &str) -> Vec<Element> {
    let mut run = Element::new("w:r");
    for (index, piece) in text.split('\t').enumerate() {
        if index > 0 {
            run.children.push(Node::Element(Element::new("w:tab")));
        }
        if !piece.is_empty() {
            run.children.push(Node::Element(text_element(piece.to_string())));
        }
    }
    if run.children.is_empty() {
        Vec::new()
    } else {
        vec![run]
    }
}

fn split_path(path: &[usize]) -> Result<(&[usize], usize), EngineError> {
    path.split_last()
        .map(|(last, parent)| (parent, *last))
        .ok_or_else(|| EngineError::Failed("empty element path".to_string()))
}

fn element_at<'a>(root: &'a mut Element, path: &[usize]) -> Result<&'a mut Element, EngineError> {
    root.at_mut(path)
        .ok_or_else(|| EngineError::Failed("stale element path".to_string()))
}

fn remove_at(root: &mut Element, path: &[usize]) -> Result<(), EngineError> {
    let (parent_path, index) = split_path(path)?;
    let parent = element_at(root, parent_path)?;
    if index < parent.children.len() {
        parent.children.remove(index);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::docx::xml;
    use crate::engine::{TextEdit, apply_splices};

    fn para(inner: &str) -> Element {
        xml::parse(&format!(
            r#"<w:p xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{inner}</w:p>"#
        ))
        .expect("parse")
    }

    fn edit(paragraph: &mut Element, pattern: &str, replacement: &str) -> String {
        let edit = TextEdit::new(pattern, replacement);
        let regex = edit.compile().expect("regex");
        let before = paragraph_text(paragraph);
        let splices = edit.plan(&regex, &before);
        apply(paragraph, &splices).expect("apply");
        let after = paragraph_text(paragraph);
        assert_eq!(after, apply_splices(&before, &splices));
        after
    }

    #[test]
    fn text_reads_tabs_and_skips_properties() {
        let p = para(
            r#"<w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>1.</w:t><w:tab/><w:t>Item</w:t></w:r>"#,
        );
        assert_eq!(paragraph_text(&p), "1.\tItem");
    }

    #[test]
    fn splice_across_runs_keeps_other_runs() {
        let mut p = para(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>1.</w:t></w:r><w:r><w:t xml:space="preserve"> First item</w:t></w:r>"#,
        );
        assert_eq!(edit(&mut p, r"^(\d+)\. ", "$1—"), "1—First item");
        let bold_run = p.child("w:r").expect("run");
        assert!(bold_run.child("w:rPr").is_some());
    }

    #[test]
    fn splice_removes_tabs() {
        let mut p = para(r#"<w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:tab/></w:r>"#);
        assert_eq!(edit(&mut p, "\t", ""), "ab");
        assert_eq!(p.count_descendants("w:tab"), 0);
    }

    #[test]
    fn replacement_tabs_become_tab_elements() {
        let mut p = para(r#"<w:r><w:t>a-b</w:t></w:r>"#);
        assert_eq!(edit(&mut p, "-", "\t"), "a\tb");
        assert_eq!(p.count_descendants("w:tab"), 1);
    }

    #[test]
    fn insert_into_empty_paragraph_creates_run() {
        let mut p = para(r#"<w:pPr><w:jc w:val="center"/></w:pPr>"#);
        apply(
            &mut p,
            &[Splice {
                start: 0,
                end: 0,
                text: " lead".to_string(),
            }],
        )
        .expect("apply");
        assert_eq!(paragraph_text(&p), " lead");
        let t = p.child("w:r").and_then(|r| r.child("w:t")).expect("t");
        assert_eq!(t.attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn insert_before_leading_tab() {
        let mut p = para(r#"<w:r><w:tab/><w:t>x</w:t></w:r>"#);
        apply(
            &mut p,
            &[Splice {
                start: 0,
                end: 0,
                text: "1.".to_string(),
            }],
        )
        .expect("apply");
        assert_eq!(paragraph_text(&p), "1.\tx");
    }
}
