//! Minimal mutable XML element tree for OOXML parts.
//!
//! Parts are parsed with `quick-xml` into [`Element`] trees, edited in place
//! and serialized back. Qualified names are kept as written (`w:p`), which
//! matches how Office packages are produced in practice.

use std::fmt::Write as _;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use crate::error::EngineError;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|el| el.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |el| el.name == name)
    }

    /// `w:val` of the named child, the common OOXML property shape.
    pub fn child_val(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|el| el.attr("w:val"))
    }

    /// Append `child` if no child of that name exists; return it either way.
    pub fn ensure_child(&mut self, name: &str) -> Result<&mut Element, EngineError> {
        self.ensure_child_ordered(name, &[])
    }

    /// Like [`Element::ensure_child`], inserting a missing child at the
    /// position `order` dictates (schema sequence order).
    pub fn ensure_child_ordered(&mut self, name: &str, order: &[&str]) -> Result<&mut Element, EngineError> {
        let index = match self.child_index(name) {
            Some(index) => index,
            None => {
                let index = self.insertion_index(name, order);
                self.children.insert(index, Node::Element(Element::new(name)));
                index
            }
        };
        match self.children.get_mut(index) {
            Some(Node::Element(el)) => Ok(el),
            _ => Err(EngineError::Failed(format!("cannot address <{name}> under <{}>", self.name))),
        }
    }

    /// Replace (or insert in schema order) the named child.
    pub fn set_child_ordered(&mut self, child: Element, order: &[&str]) {
        match self.child_index(&child.name) {
            Some(index) => self.children[index] = Node::Element(child),
            None => {
                let index = self.insertion_index(&child.name, order);
                self.children.insert(index, Node::Element(child));
            }
        }
    }

    /// Set `w:val` on the named child, creating it in schema order if needed.
    pub fn set_child_val(&mut self, name: &str, value: impl Into<String>, order: &[&str]) -> Result<(), EngineError> {
        self.ensure_child_ordered(name, order)?.set_attr("w:val", value);
        Ok(())
    }

    /// Toggle an OOXML on/off property (`<w:keepNext/>` vs `w:val="0"`).
    pub fn set_flag(&mut self, name: &str, on: bool, order: &[&str]) -> Result<(), EngineError> {
        let el = self.ensure_child_ordered(name, order)?;
        if on {
            el.remove_attr("w:val");
        } else {
            el.set_attr("w:val", "0");
        }
        Ok(())
    }

    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, Node::Element(el) if el.name == name));
        before - self.children.len()
    }

    fn child_index(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.name == name))
    }

    fn insertion_index(&self, name: &str, order: &[&str]) -> usize {
        let Some(rank) = order.iter().position(|n| *n == name) else {
            return self.children.len();
        };
        self.children
            .iter()
            .position(|node| match node {
                Node::Element(el) => order
                    .iter()
                    .position(|n| *n == el.name)
                    .is_some_and(|other| other > rank),
                _ => false,
            })
            .unwrap_or(self.children.len())
    }

    /// Concatenated text nodes directly under this element.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|node| !matches!(node, Node::Text(_)));
        self.children.push(Node::Text(text.into()));
    }

    /// Depth-first pre-order visit of every descendant element.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        for el in self.elements() {
            visit(el);
            el.walk(visit);
        }
    }

    pub fn count_descendants(&self, name: &str) -> usize {
        let mut count = 0;
        self.walk(&mut |el| {
            if el.name == name {
                count += 1;
            }
        });
        count
    }

    pub fn contains_descendant(&self, name: &str) -> bool {
        self.count_descendants(name) > 0
    }

    /// Element addressed by a path of child-node indexes.
    pub fn at(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for index in path {
            current = match current.children.get(*index)? {
                Node::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for index in path {
            current = match current.children.get_mut(*index)? {
                Node::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Paths of descendants named `name`, document order, without descending
    /// into matches or into elements named in `skip`.
    pub fn find_paths(&self, name: &str, skip: &[&str]) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(name, skip, &mut prefix, &mut out);
        out
    }

    fn collect_paths(
        &self,
        name: &str,
        skip: &[&str],
        prefix: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        for (index, node) in self.children.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };
            prefix.push(index);
            if el.name == name {
                out.push(prefix.clone());
            } else if !skip.contains(&el.name.as_str()) {
                el.collect_paths(name, skip, prefix, out);
            }
            prefix.pop();
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(el) => el.write_into(out),
                Node::Text(text) => out.push_str(&escape(text.as_str())),
                Node::Comment(text) => {
                    let _ = write!(out, "<!--{text}-->");
                }
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

/// Parse an XML part into its root element.
pub fn parse(xml: &str) -> Result<Element, EngineError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|err| {
            EngineError::InvalidDocument(format!(
                "xml error at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let el = element_from(&start)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| EngineError::InvalidDocument("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|err| EngineError::InvalidDocument(err.to_string()))?;
                    push_text(parent, &text);
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(
                        String::from_utf8_lossy(&comment.into_inner()).into_owned(),
                    ));
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(EngineError::InvalidDocument("unclosed element".to_string()));
    }
    root.ok_or_else(|| EngineError::InvalidDocument("empty xml part".to_string()))
}

fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, EngineError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|err| EngineError::InvalidDocument(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| EngineError::InvalidDocument(err.to_string()))?;
        el.attrs.push((key, value.into_owned()));
    }
    Ok(el)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_preserve_structure() {
        let xml = r#"<?xml version="1.0"?><w:p a="1"><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r><!--c--><w:br/></w:p>"#;
        let root = parse(xml).expect("parse");
        assert_eq!(root.name, "w:p");
        assert_eq!(root.attr("a"), Some("1"));
        let t = root.at(&[0, 0]).expect("w:t");
        assert_eq!(t.text(), " a & b ");
        let out = root.serialize();
        assert!(out.contains("<w:t xml:space=\"preserve\"> a &amp; b </w:t>"));
        assert!(out.contains("<!--c--><w:br/>"));
        assert_eq!(parse(&out).expect("reparse"), root);
    }

    #[test]
    fn ordered_insert_respects_sequence() {
        let order = ["w:pStyle", "w:keepNext", "w:spacing", "w:ind", "w:jc"];
        let mut ppr = Element::new("w:pPr");
        ppr.ensure_child_ordered("w:jc", &order).expect("jc");
        ppr.ensure_child_ordered("w:pStyle", &order).expect("pStyle");
        ppr.ensure_child_ordered("w:ind", &order).expect("ind");
        let names: Vec<&str> = ppr.elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["w:pStyle", "w:ind", "w:jc"]);
    }

    #[test]
    fn ensure_child_returns_existing_child_past_text_nodes() {
        let mut ppr = parse(r#"<w:pPr> <w:jc w:val="left"/> </w:pPr>"#).expect("parse");
        let jc = ppr.ensure_child("w:jc").expect("existing jc");
        assert_eq!(jc.attr("w:val"), Some("left"));
        ppr.set_child_val("w:jc", "both", &[]).expect("set jc");
        ppr.set_flag("w:keepNext", false, &["w:keepNext", "w:jc"]).expect("keepNext");
        let names: Vec<&str> = ppr.elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["w:keepNext", "w:jc"]);
        assert_eq!(ppr.child_val("w:jc"), Some("both"));
        assert_eq!(ppr.child_val("w:keepNext"), Some("0"));
    }

    #[test]
    fn find_paths_skips_nested_matches() {
        let root = parse("<b><p><p/></p><t><p/></t></b>").expect("parse");
        assert_eq!(root.find_paths("p", &[]), vec![vec![0], vec![1, 0]]);
        assert_eq!(root.find_paths("p", &["t"]), vec![vec![0]]);
    }

    #[test]
    fn rejects_unbalanced_xml() {
        parse("<a><b></a>").expect_err("mismatched");
        parse("").expect_err("empty");
    }
}
