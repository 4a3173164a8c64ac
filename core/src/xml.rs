//! Owned XML element tree used for snapshots and rendered output.
//!
//! Documents are read with `quick_xml` into [`XmlElement`] values, patched in
//! memory, and written back with two-space indentation. Whitespace-only text
//! between elements is not preserved; everything else is.

use std::borrow::Cow;
use std::io::Write;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::DocumentError;

/// Ordered attribute list with upsert semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrBag {
    entries: Vec<(String, String)>,
}

impl AttrBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`, keeping the attribute's position if it exists.
    pub fn upsert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: AttrBag,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: AttrBag::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.upsert(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.upsert(key, value);
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Concatenated text and CDATA content of the direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.name == name)
    }

    /// Index in `children` of the first element named `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(el) if el.name == name))
    }

    /// Index in `children` of the first element whose name is in `names`.
    pub fn position_of_any(&self, names: &[&str]) -> Option<usize> {
        self.children.iter().position(
            |node| matches!(node, XmlNode::Element(el) if names.contains(&el.name.as_str())),
        )
    }

    pub fn insert_child(&mut self, index: usize, child: XmlElement) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Removes every direct child element named `name`, returning them in order.
    pub fn detach_children_named(&mut self, name: &str) -> Vec<XmlElement> {
        let mut detached = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                XmlNode::Element(el) if el.name == name => detached.push(el),
                other => kept.push(other),
            }
        }
        self.children = kept;
        detached
    }

    /// Number of elements in this subtree, this one included, matching `pred`.
    pub fn count_descendants(&self, pred: &dyn Fn(&XmlElement) -> bool) -> usize {
        let own = usize::from(pred(self));
        own + self
            .elements()
            .map(|el| el.count_descendants(pred))
            .sum::<usize>()
    }
}

/// Parses a complete document (or a fragment with a single root element).
pub fn parse_document(text: &str, section: &str) -> Result<XmlElement, DocumentError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from_start(&e, section)?),
            Ok(Event::Empty(e)) => {
                let el = element_from_start(&e, section)?;
                attach(&mut stack, &mut root, el, section)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| DocumentError::xml(section, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, el, section)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| DocumentError::xml(section, e))?;
                    if !text.is_empty() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    parent.children.push(XmlNode::CData(text));
                }
            }
            Ok(Event::Comment(c)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    parent.children.push(XmlNode::Comment(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DocumentError::xml(
                    section,
                    format!("at byte {}: {e}", reader.buffer_position()),
                ));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(DocumentError::xml(
            section,
            format!("element <{}> is never closed", open.name),
        ));
    }
    root.ok_or_else(|| DocumentError::xml(section, "document has no root element"))
}

fn element_from_start(start: &BytesStart<'_>, section: &str) -> Result<XmlElement, DocumentError> {
    let mut el = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::xml(section, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::xml(section, e))?
            .into_owned();
        el.attrs.upsert(key, value);
    }
    Ok(el)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
    section: &str,
) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(el);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(DocumentError::xml(section, "more than one root element")),
    }
}

/// Writes `root` as a UTF-8 document starting with an XML declaration.
pub fn write_document(root: &XmlElement) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| DocumentError::xml("output", e))?;
    write_element(&mut writer, root)?;
    let mut text =
        String::from_utf8(writer.into_inner()).map_err(|e| DocumentError::xml("output", e))?;
    text.push('\n');
    Ok(text)
}

/// Writes `root` without a declaration, for splicing into surrounding text.
pub fn write_fragment(root: &XmlElement) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(|e| DocumentError::xml("output", e))
}

fn write_element<W: Write>(writer: &mut Writer<W>, el: &XmlElement) -> Result<(), DocumentError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in el.attrs.iter() {
        let value = escape_attr_value(value);
        start.push_attribute((key.as_bytes(), value.as_bytes()));
    }

    if el.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| DocumentError::xml(el.name.as_str(), e));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| DocumentError::xml(el.name.as_str(), e))?;
    for child in &el.children {
        let result = match child {
            XmlNode::Element(inner) => {
                write_element(writer, inner)?;
                continue;
            }
            XmlNode::Text(text) => {
                let escaped = escape_text(text);
                writer.write_event(Event::Text(BytesText::from_escaped(escaped.as_ref())))
            }
            XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str()))),
            XmlNode::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
            }
        };
        result.map_err(|e| DocumentError::xml(el.name.as_str(), e))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| DocumentError::xml(el.name.as_str(), e))
}

/// Markup escaping plus character references for whitespace that attribute
/// normalization would otherwise fold into spaces.
fn escape_attr_value(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\r', "&#13;")
            .replace('\n', "&#10;")
            .replace('\t', "&#9;"),
    )
}

/// Text keeps line feeds and tabs literal; carriage returns become references.
fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = escape(text);
    if !escaped.contains('\r') {
        return escaped;
    }
    Cow::Owned(escaped.replace('\r', "&#13;"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_position_and_replaces_value() {
        let mut bag = AttrBag::new();
        bag.upsert("a", "1").upsert("b", "2").upsert("a", "3");
        let pairs: Vec<_> = bag.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
        assert_eq!(bag.remove("a").as_deref(), Some("3"));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn parse_and_write_preserve_structure() {
        let src = r#"<?xml version='1.0' encoding='utf-8' ?>
<datasource name='x' version='18.1'>
  <connection class='federated'>
    <relation name='Custom SQL Query' type='text'>SELECT &quot;a&quot; FROM t</relation>
  </connection>
  <!-- note -->
  <layout dim-ordering='alphabetic' />
</datasource>"#;
        let root = parse_document(src, "test").expect("parse");
        assert_eq!(root.name, "datasource");
        let rel = root
            .child("connection")
            .and_then(|c| c.child("relation"))
            .expect("relation");
        assert_eq!(rel.text(), r#"SELECT "a" FROM t"#);

        let out = write_document(&root).expect("write");
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        let reparsed = parse_document(&out, "test").expect("reparse");
        assert_eq!(root, reparsed);
    }

    #[test]
    fn malformed_input_names_section() {
        let err = parse_document("<a><b></a>", "snapshot").expect_err("mismatched");
        match err {
            DocumentError::Xml { section, .. } => assert_eq!(section, "snapshot"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse_document("", "snapshot").is_err());
    }

    #[test]
    fn detach_children_keeps_other_nodes_in_order() {
        let mut root = XmlElement::new("r")
            .with_child(XmlElement::new("layout"))
            .with_child(XmlElement::new("column"))
            .with_child(XmlElement::new("layout"));
        let detached = root.detach_children_named("layout");
        assert_eq!(detached.len(), 2);
        assert_eq!(root.elements().count(), 1);
        assert_eq!(root.position_of("column"), Some(0));
    }

    #[test]
    fn multi_line_attribute_values_survive_a_rewrite() {
        let src = "<column name='[calc]'><calculation class='tableau' formula='IF [a]&#10;THEN 1&#13;&#10;END&#9;' /></column>";
        let root = parse_document(src, "test").expect("parse");
        let calc = root.child("calculation").expect("calculation");
        assert_eq!(calc.attr("formula"), Some("IF [a]\nTHEN 1\r\nEND\t"));

        let out = write_fragment(&root).expect("write");
        assert!(out.contains("formula=\"IF [a]&#10;THEN 1&#13;&#10;END&#9;\""), "{out}");
        assert_eq!(parse_document(&out, "test").expect("reparse"), root);
    }

    #[test]
    fn carriage_returns_in_text_are_written_as_references() {
        let rel = XmlElement::new("relation")
            .with_attr("type", "text")
            .with_text("SELECT a\r\nFROM t\r\nWHERE b < 2");
        let out = write_fragment(&rel).expect("write");
        assert!(out.contains("SELECT a&#13;\nFROM t&#13;\nWHERE b &lt; 2"), "{out}");
        assert_eq!(parse_document(&out, "test").expect("reparse"), rel);
    }
}
