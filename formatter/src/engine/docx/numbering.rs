//! `word/numbering.xml`: list definitions, level formats and label rendering.
//!
//! A paragraph's `w:numPr` names a `w:num` instance, which points at a
//! `w:abstractNum` holding up to nine `w:lvl` definitions. Counters run per
//! abstract definition; a `w:startOverride` on an instance restarts its level
//! the first time that instance is seen.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::units::Length;
use crate::engine::docx::xml::{Element, Node};
use crate::engine::{LevelAlignment, ListLevelFormat, TrailingCharacter};
use crate::error::EngineError;

const LVL_ORDER: [&str; 12] = [
    "w:start",
    "w:numFmt",
    "w:lvlRestart",
    "w:pStyle",
    "w:isLgl",
    "w:suff",
    "w:lvlText",
    "w:lvlPicBulletId",
    "w:legacy",
    "w:lvlJc",
    "w:pPr",
    "w:rPr",
];

const LVL_PPR_ORDER: [&str; 3] = ["w:tabs", "w:spacing", "w:ind"];

pub const MAX_LEVELS: u8 = 9;

/// `numId`/`ilvl` pair naming one list level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListRef {
    pub num_id: u32,
    /// 0-based.
    pub ilvl: u8,
}

/// Read a `w:numPr` element. `numId` 0 means "numbering removed".
pub fn read_num_pr(num_pr: &Element) -> Option<ListRef> {
    let num_id = num_pr.child_val("w:numId")?.parse::<u32>().ok()?;
    if num_id == 0 {
        return None;
    }
    let ilvl = num_pr
        .child_val("w:ilvl")
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(0)
        .min(MAX_LEVELS - 1);
    Some(ListRef { num_id, ilvl })
}

pub fn num_pr_element(list: ListRef) -> Element {
    Element::new("w:numPr")
        .with_child(Element::new("w:ilvl").with_attr("w:val", list.ilvl.to_string()))
        .with_child(Element::new("w:numId").with_attr("w:val", list.num_id.to_string()))
}

fn num_instance<'a>(numbering: &'a Element, num_id: u32) -> Option<&'a Element> {
    let wanted = num_id.to_string();
    numbering
        .children_named("w:num")
        .find(|num| num.attr("w:numId") == Some(wanted.as_str()))
}

fn abstract_id(numbering: &Element, num_id: u32) -> Option<String> {
    num_instance(numbering, num_id)?
        .child_val("w:abstractNumId")
        .map(str::to_string)
}

fn abstract_index(numbering: &Element, abstract_id: &str) -> Option<usize> {
    numbering.children.iter().position(|node| {
        matches!(node, Node::Element(el)
            if el.is("w:abstractNum") && el.attr("w:abstractNumId") == Some(abstract_id))
    })
}

fn level_in(abstract_num: &Element, ilvl: u8) -> Option<&Element> {
    let wanted = ilvl.to_string();
    abstract_num
        .children_named("w:lvl")
        .find(|lvl| lvl.attr("w:ilvl") == Some(wanted.as_str()))
}

/// Level definition for a list reference, if the numbering part defines it.
pub fn level(numbering: &Element, list: ListRef) -> Option<&Element> {
    let id = abstract_id(numbering, list.num_id)?;
    let index = abstract_index(numbering, &id)?;
    match &numbering.children[index] {
        Node::Element(abstract_num) => level_in(abstract_num, list.ilvl),
        _ => None,
    }
}

/// Mutable level definition, created empty when the abstract list lacks it.
pub fn level_mut(numbering: &mut Element, list: ListRef) -> Option<&mut Element> {
    let id = abstract_id(numbering, list.num_id)?;
    let index = abstract_index(numbering, &id)?;
    let Node::Element(abstract_num) = &mut numbering.children[index] else {
        return None;
    };
    let wanted = list.ilvl.to_string();
    let position = abstract_num.children.iter().position(|node| {
        matches!(node, Node::Element(el) if el.is("w:lvl") && el.attr("w:ilvl") == Some(wanted.as_str()))
    });
    let position = match position {
        Some(position) => position,
        None => {
            abstract_num.children.push(Node::Element(
                Element::new("w:lvl").with_attr("w:ilvl", wanted.clone()),
            ));
            abstract_num.children.len() - 1
        }
    };
    match &mut abstract_num.children[position] {
        Node::Element(lvl) => Some(lvl),
        _ => None,
    }
}

fn twips_attr(el: Option<&Element>, key: &str) -> Option<Length> {
    el?.attr(key)?.parse::<i64>().ok().map(Length::from_twips)
}

pub fn read_level_format(lvl: &Element, level: u8) -> ListLevelFormat {
    let trailing = match lvl.child_val("w:suff") {
        Some("space") => TrailingCharacter::Space,
        Some("nothing") => TrailingCharacter::None,
        _ => TrailingCharacter::Tab,
    };
    let alignment = match lvl.child_val("w:lvlJc") {
        Some("center") => LevelAlignment::Center,
        Some("right" | "end") => LevelAlignment::Right,
        _ => LevelAlignment::Left,
    };
    let ppr = lvl.child("w:pPr");
    let ind = ppr.and_then(|p| p.child("w:ind"));
    let text_position = twips_attr(ind, "w:left")
        .or_else(|| twips_attr(ind, "w:start"))
        .unwrap_or(Length::ZERO);
    let number_position = match (twips_attr(ind, "w:hanging"), twips_attr(ind, "w:firstLine")) {
        (Some(hanging), _) => Length::from_points(text_position.points() - hanging.points()),
        (None, Some(first_line)) => Length::from_points(text_position.points() + first_line.points()),
        (None, None) => text_position,
    };
    let tab_position = ppr
        .and_then(|p| p.child("w:tabs"))
        .and_then(|tabs| {
            tabs.children_named("w:tab")
                .find(|tab| tab.attr("w:val") == Some("num"))
                .or_else(|| tabs.children_named("w:tab").next())
        })
        .and_then(|tab| twips_attr(Some(tab), "w:pos"));
    ListLevelFormat {
        level,
        number_format: lvl.child_val("w:lvlText").unwrap_or_default().to_string(),
        trailing,
        alignment,
        number_position,
        text_position,
        tab_position,
    }
}

pub fn write_level_format(lvl: &mut Element, format: &ListLevelFormat) -> Result<(), EngineError> {
    let suff = match format.trailing {
        TrailingCharacter::Tab => "tab",
        TrailingCharacter::Space => "space",
        TrailingCharacter::None => "nothing",
    };
    lvl.set_child_val("w:suff", suff, &LVL_ORDER)?;
    lvl.set_child_val("w:lvlText", format.number_format.clone(), &LVL_ORDER)?;
    let jc = match format.alignment {
        LevelAlignment::Left => "left",
        LevelAlignment::Center => "center",
        LevelAlignment::Right => "right",
    };
    lvl.set_child_val("w:lvlJc", jc, &LVL_ORDER)?;

    let ppr = lvl.ensure_child_ordered("w:pPr", &LVL_ORDER)?;
    let ind = ppr.ensure_child_ordered("w:ind", &LVL_PPR_ORDER)?;
    let text = format.text_position.twips();
    let number = format.number_position.twips();
    ind.remove_attr("w:start");
    ind.remove_attr("w:hanging");
    ind.remove_attr("w:firstLine");
    ind.set_attr("w:left", text.to_string());
    if text >= number {
        ind.set_attr("w:hanging", (text - number).to_string());
    } else {
        ind.set_attr("w:firstLine", (number - text).to_string());
    }

    ppr.remove_children("w:tabs");
    if let Some(tab) = format.tab_position {
        let tabs = ppr.ensure_child_ordered("w:tabs", &LVL_PPR_ORDER)?;
        tabs.children.push(Node::Element(
            Element::new("w:tab")
                .with_attr("w:val", "num")
                .with_attr("w:pos", tab.twips().to_string()),
        ));
    }
    Ok(())
}

/// Paragraph indentation a list level implies, as a `w:ind` element.
pub fn level_indent(lvl: &Element) -> Option<Element> {
    lvl.child("w:pPr")?.child("w:ind").cloned()
}

/// Append a new decimal outline list and return its `numId`.
pub fn add_default_list(numbering: &mut Element) -> Result<u32, EngineError> {
    let abstract_id = next_id(numbering, "w:abstractNum", "w:abstractNumId");
    let mut abstract_num = Element::new("w:abstractNum")
        .with_attr("w:abstractNumId", abstract_id.to_string())
        .with_child(Element::new("w:multiLevelType").with_attr("w:val", "hybridMultilevel"));
    for ilvl in 0..MAX_LEVELS {
        let mut lvl = Element::new("w:lvl").with_attr("w:ilvl", ilvl.to_string());
        lvl.set_child_val("w:start", "1", &LVL_ORDER)?;
        lvl.set_child_val("w:numFmt", "decimal", &LVL_ORDER)?;
        let step = Length::from_inches(0.25 * f64::from(ilvl + 1));
        write_level_format(
            &mut lvl,
            &ListLevelFormat {
                level: ilvl + 1,
                number_format: format!("%{}.", ilvl + 1),
                trailing: TrailingCharacter::Tab,
                alignment: LevelAlignment::Left,
                number_position: Length::from_points(step.points() - 18.0),
                text_position: step,
                tab_position: None,
            },
        )?;
        abstract_num.children.push(Node::Element(lvl));
    }
    insert_abstract(numbering, abstract_num);
    Ok(add_instance(numbering, abstract_id, None))
}

/// New `w:num` sharing the list's definition, restarting `ilvl` at `start`.
pub fn add_restart(numbering: &mut Element, list: ListRef, start: u32) -> Option<u32> {
    let abstract_id = abstract_id(numbering, list.num_id)?.parse::<u32>().ok()?;
    Some(add_instance(numbering, abstract_id, Some((list.ilvl, start))))
}

fn add_instance(numbering: &mut Element, abstract_id: u32, restart: Option<(u8, u32)>) -> u32 {
    let num_id = next_id(numbering, "w:num", "w:numId");
    let mut num = Element::new("w:num")
        .with_attr("w:numId", num_id.to_string())
        .with_child(Element::new("w:abstractNumId").with_attr("w:val", abstract_id.to_string()));
    if let Some((ilvl, start)) = restart {
        num = num.with_child(
            Element::new("w:lvlOverride")
                .with_attr("w:ilvl", ilvl.to_string())
                .with_child(Element::new("w:startOverride").with_attr("w:val", start.to_string())),
        );
    }
    // w:num elements follow every w:abstractNum.
    let index = numbering
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(el) if el.is("w:numIdMacAtCleanup")))
        .unwrap_or(numbering.children.len());
    numbering.children.insert(index, Node::Element(num));
    num_id
}

fn insert_abstract(numbering: &mut Element, abstract_num: Element) {
    let index = numbering
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(el) if el.is("w:num") || el.is("w:numIdMacAtCleanup")))
        .unwrap_or(numbering.children.len());
    numbering.children.insert(index, Node::Element(abstract_num));
}

fn next_id(numbering: &Element, element: &str, attr: &str) -> u32 {
    numbering
        .children_named(element)
        .filter_map(|el| el.attr(attr)?.parse::<u32>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

pub fn first_num_id(numbering: &Element) -> Option<u32> {
    numbering
        .children_named("w:num")
        .filter_map(|num| num.attr("w:numId")?.parse::<u32>().ok())
        .find(|id| *id != 0)
}

/// Running list counters, fed paragraphs in document order.
#[derive(Debug, Default)]
pub struct Counters {
    by_abstract: BTreeMap<String, [u32; MAX_LEVELS as usize]>,
    seen_instances: BTreeSet<u32>,
}

impl Counters {
    /// Advance the counter for `list` and render its label.
    pub fn next_label(&mut self, numbering: &Element, list: ListRef) -> Option<String> {
        let abstract_id = abstract_id(numbering, list.num_id)?;
        let index = abstract_index(numbering, &abstract_id)?;
        let Node::Element(abstract_num) = &numbering.children[index] else {
            return None;
        };
        let ilvl = usize::from(list.ilvl);
        let start_of = |level: usize| -> u32 {
            u8::try_from(level)
                .ok()
                .and_then(|level| level_in(abstract_num, level))
                .and_then(|lvl| lvl.child_val("w:start"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(1)
        };

        let override_start = if self.seen_instances.insert(list.num_id) {
            start_override(numbering, list)
        } else {
            None
        };
        let counters = self
            .by_abstract
            .entry(abstract_id)
            .or_insert([0; MAX_LEVELS as usize]);
        counters[ilvl] = match override_start {
            Some(start) => start,
            None if counters[ilvl] == 0 => start_of(ilvl),
            None => counters[ilvl] + 1,
        };
        for deeper in counters.iter_mut().skip(ilvl + 1) {
            *deeper = 0;
        }
        for (level, value) in counters.iter_mut().enumerate().take(ilvl) {
            if *value == 0 {
                *value = start_of(level);
            }
        }
        let snapshot = *counters;

        let lvl = level_in(abstract_num, list.ilvl)?;
        let template = lvl.child_val("w:lvlText").unwrap_or_default();
        if lvl.child_val("w:numFmt") == Some("bullet") {
            return Some(template.to_string());
        }
        let mut label = String::new();
        let mut chars = template.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '%'
                && let Some(digit) = chars.peek().and_then(|d| d.to_digit(10))
                && (1..=u32::from(MAX_LEVELS)).contains(&digit)
            {
                chars.next();
                let level = (digit - 1) as usize;
                let format = u8::try_from(level)
                    .ok()
                    .and_then(|level| level_in(abstract_num, level))
                    .and_then(|lvl| lvl.child_val("w:numFmt"))
                    .unwrap_or("decimal");
                label.push_str(&format_number(snapshot[level], format));
            } else {
                label.push(ch);
            }
        }
        Some(label)
    }
}

fn start_override(numbering: &Element, list: ListRef) -> Option<u32> {
    let wanted = list.ilvl.to_string();
    num_instance(numbering, list.num_id)?
        .children_named("w:lvlOverride")
        .find(|o| o.attr("w:ilvl") == Some(wanted.as_str()))?
        .child_val("w:startOverride")?
        .parse()
        .ok()
}

/// Render one counter in an OOXML number format.
pub fn format_number(value: u32, format: &str) -> String {
    match format {
        "lowerLetter" => letters(value).to_lowercase(),
        "upperLetter" => letters(value),
        "lowerRoman" => roman(value).to_lowercase(),
        "upperRoman" => roman(value),
        "decimalZero" if value < 10 => format!("0{value}"),
        "none" => String::new(),
        _ => value.to_string(),
    }
}

/// `A`..`Z`, then `AA`, `BB`, ... as Word renders letter lists.
fn letters(value: u32) -> String {
    if value == 0 {
        return String::new();
    }
    let index = (value - 1) % 26;
    let repeat = (value - 1) / 26 + 1;
    let letter = char::from(b'A' + index as u8);
    std::iter::repeat_n(letter, repeat as usize).collect()
}

fn roman(mut value: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (step, digits) in TABLE {
        while value >= step {
            out.push_str(digits);
            value -= step;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::docx::xml;

    const NUMBERING: &str = r#"<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:abstractNum w:abstractNumId="0">
  <w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:suff w:val="tab"/><w:lvlText w:val="%1."/><w:lvlJc w:val="left"/><w:pPr><w:tabs><w:tab w:val="num" w:pos="720"/></w:tabs><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl>
  <w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="lowerLetter"/><w:lvlText w:val="(%2)"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="1440" w:hanging="360"/></w:pPr></w:lvl>
</w:abstractNum>
<w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
</w:numbering>"#;

    fn numbering() -> Element {
        xml::parse(NUMBERING).expect("parse numbering")
    }

    #[test]
    fn reads_level_geometry() {
        let numbering = numbering();
        let lvl = level(&numbering, ListRef { num_id: 1, ilvl: 0 }).expect("level");
        let format = read_level_format(lvl, 1);
        assert_eq!(format.number_format, "%1.");
        assert_eq!(format.trailing, TrailingCharacter::Tab);
        assert!(format.text_position.approx_eq(Length::from_inches(0.5), 0.01));
        assert!(format.number_position.approx_eq(Length::from_inches(0.25), 0.01));
        assert_eq!(format.tab_position.map(Length::twips), Some(720));
    }

    #[test]
    fn write_then_read_matches() {
        let mut numbering = numbering();
        let list = ListRef { num_id: 1, ilvl: 1 };
        let wanted = ListLevelFormat {
            level: 2,
            number_format: "(%2)".to_string(),
            trailing: TrailingCharacter::None,
            alignment: LevelAlignment::Right,
            number_position: Length::from_twips(1152),
            text_position: Length::from_twips(1152),
            tab_position: None,
        };
        write_level_format(level_mut(&mut numbering, list).expect("lvl"), &wanted).expect("write level");
        let read = read_level_format(level(&numbering, list).expect("lvl"), 2);
        assert_eq!(read, wanted);
    }

    #[test]
    fn labels_follow_counters() {
        let numbering = numbering();
        let mut counters = Counters::default();
        let top = ListRef { num_id: 1, ilvl: 0 };
        let sub = ListRef { num_id: 1, ilvl: 1 };
        let labels: Vec<String> = [top, sub, sub, top, sub]
            .into_iter()
            .filter_map(|list| counters.next_label(&numbering, list))
            .collect();
        assert_eq!(labels, ["1.", "(a)", "(b)", "2.", "(a)"]);
    }

    #[test]
    fn restart_instance_starts_over() {
        let mut numbering = numbering();
        let top = ListRef { num_id: 1, ilvl: 0 };
        let restarted = add_restart(&mut numbering, top, 5).expect("restart");
        let mut counters = Counters::default();
        assert_eq!(counters.next_label(&numbering, top).as_deref(), Some("1."));
        assert_eq!(
            counters
                .next_label(&numbering, ListRef { num_id: restarted, ilvl: 0 })
                .as_deref(),
            Some("5.")
        );
    }

    #[test]
    fn number_formats() {
        assert_eq!(format_number(4, "upperRoman"), "IV");
        assert_eq!(format_number(14, "lowerRoman"), "xiv");
        assert_eq!(format_number(28, "upperLetter"), "BB");
        assert_eq!(format_number(3, "decimal"), "3");
    }

    #[test]
    fn default_list_is_decimal() {
        let mut numbering = numbering();
        let num_id = add_default_list(&mut numbering).expect("default list");
        assert_eq!(num_id, 2);
        let lvl = level(&numbering, ListRef { num_id, ilvl: 2 }).expect("lvl");
        assert_eq!(lvl.child_val("w:lvlText"), Some("%3."));
    }
}
