//! A small owned element tree over `quick-xml`.
//!
//! Documents are read into [`Element`]s, edited, and written back out with
//! two-space indentation. Whitespace-only text between elements is not kept,
//! so reading and re-writing a document we produced gives the same bytes.

use crate::{Error, Result};
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its (possibly prefixed) name, attributes in document order and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A new element declaring `namespace` as its default namespace.
    pub fn with_namespace<T: Into<String>>(name: T, namespace: &str) -> Self {
        let mut element = Self::new(name);
        element.set_attribute("xmlns", namespace);
        element
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|x| x.1)
            .unwrap_or(&self.name)
    }

    /// Default namespace declared on this element.
    pub fn namespace(&self) -> Option<&str> {
        match self.name.split_once(':') {
            Some((prefix, _)) => self.attribute(&format!("xmlns:{prefix}")),
            None => self.attribute("xmlns"),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();

        if let Some(existing) = self.attributes.iter_mut().find(|(k, _)| *k == name) {
            existing.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(x)) => x,
            _ => unreachable!(),
        }
    }

    pub fn add_child<T: Into<String>>(&mut self, name: T) -> &mut Element {
        self.push(Element::new(name))
    }

    /// Add `<name>text</name>`.
    pub fn add_text_child<T: Into<String>, U: AsRef<str>>(&mut self, name: T, text: U) -> &mut Element {
        let child = self.add_child(name);
        child.set_text(text);
        child
    }

    /// Replace all children with a single text node.
    pub fn set_text<T: AsRef<str>>(&mut self, text: T) {
        self.children = vec![Node::Text(text.as_ref().to_owned())];
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|x| match x {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|x| match x {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|x| match x {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |x| x.local_name() == local_name)
    }

    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|x| x.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|x| x.local_name() == local_name)
    }

    pub fn required_child(&self, local_name: &str) -> Result<&Element> {
        self.child(local_name)
            .ok_or_else(|| Error::MissingElement(local_name.to_owned()))
    }

    pub fn string_child(&self, local_name: &str) -> Result<String> {
        Ok(self.required_child(local_name)?.text())
    }

    pub fn optional_string_child(&self, local_name: &str) -> Option<String> {
        self.child(local_name).map(|x| x.text())
    }

    pub fn number_child<T: FromStr>(&self, local_name: &str) -> Result<T> {
        let value = self.string_child(local_name)?;
        value.trim().parse::<T>().map_err(|_| Error::BadValue {
            element: local_name.to_owned(),
            value,
        })
    }

    pub fn optional_number_child<T: FromStr>(&self, local_name: &str) -> Result<Option<T>> {
        match self.child(local_name) {
            Some(_) => self.number_child(local_name).map(Some),
            None => Ok(None),
        }
    }

    /// Insert `child` immediately before the first child element called `before`,
    /// or at the end if there is no such child.
    pub fn insert_before(&mut self, before: &str, child: Element) {
        let index = self
            .children
            .iter()
            .position(|x| matches!(x, Node::Element(e) if e.local_name() == before))
            .unwrap_or(self.children.len());
        self.children.insert(index, Node::Element(child));
    }

    /// Remove all child elements called `local_name`.
    pub fn remove_children(&mut self, local_name: &str) {
        self.children
            .retain(|x| !matches!(x, Node::Element(e) if e.local_name() == local_name));
    }

    /// Depth-first search for the first element matching `predicate`, including `self`.
    pub fn find(&self, predicate: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        if predicate(self) {
            return Some(self);
        }

        self.elements().find_map(|x| x.find(predicate))
    }

    pub fn find_mut(&mut self, predicate: &dyn Fn(&Element) -> bool) -> Option<&mut Element> {
        if predicate(self) {
            return Some(self);
        }

        self.elements_mut().find_map(|x| x.find_mut(predicate))
    }

    /// Namespace declarations in scope at the first element matching `predicate`,
    /// counting those of its ancestors but not its own.
    pub fn namespaces_above(&self, predicate: &dyn Fn(&Element) -> bool) -> Option<BTreeMap<String, String>> {
        fn walk(
            element: &Element,
            predicate: &dyn Fn(&Element) -> bool,
            scope: &BTreeMap<String, String>,
        ) -> Option<BTreeMap<String, String>> {
            if predicate(element) {
                return Some(scope.clone());
            }

            let mut inner = scope.clone();
            for (k, v) in element.namespace_declarations() {
                inner.insert(k.to_owned(), v.to_owned());
            }

            element.elements().find_map(|x| walk(x, predicate, &inner))
        }

        walk(self, predicate, &BTreeMap::new())
    }

    fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| k == "xmlns" || k.starts_with("xmlns:"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = vec![];
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(start_element(&e)?),
                Event::Empty(e) => {
                    let element = start_element(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Xml("unbalanced end tag".to_owned()))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(e) => {
                    let text = e.unescape()?;
                    if let Some(parent) = stack.last_mut()
                        && !text.trim().is_empty()
                    {
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => (),
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml("unexpected end of document".to_owned()));
        }

        root.ok_or_else(|| Error::Xml("document has no root element".to_owned()))
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path).map_err(|e| Error::file("could not read XML file", path, &e))?;
        Self::parse(&xml)
    }

    /// Serialize as a UTF-8 document with an XML declaration and two-space indentation.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write(&mut writer)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Xml(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml()?).map_err(|e| Error::file("could not write XML file", path, &e))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Canonical form of this element, for digesting and signing.
    ///
    /// Follows inclusive canonical XML: namespace declarations in `inherited`
    /// are emitted on this element, attributes are sorted, empty elements are
    /// written as start/end pairs and text is escaped canonically. Elements
    /// for which `exclude` returns true are left out.
    pub fn canonicalize(
        &self,
        inherited: &BTreeMap<String, String>,
        exclude: Option<&dyn Fn(&Element) -> bool>,
    ) -> String {
        let mut out = String::new();
        self.canonicalize_into(&mut out, inherited, &BTreeMap::new(), exclude);
        out
    }

    fn canonicalize_into(
        &self,
        out: &mut String,
        inherited: &BTreeMap<String, String>,
        rendered: &BTreeMap<String, String>,
        exclude: Option<&dyn Fn(&Element) -> bool>,
    ) {
        let mut scope = inherited.clone();
        for (k, v) in self.namespace_declarations() {
            scope.insert(k.to_owned(), v.to_owned());
        }

        // "xmlns" sorts before "xmlns:*" so the default namespace comes first.
        let declarations = scope
            .iter()
            .filter(|(k, v)| rendered.get(*k) != Some(*v))
            .collect::<Vec<_>>();

        let mut attributes = self
            .attributes
            .iter()
            .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
            .collect::<Vec<_>>();
        attributes.sort();

        out.push('<');
        out.push_str(&self.name);
        for (k, v) in declarations {
            out.push_str(&format!(" {k}=\"{}\"", escape_attribute(v)));
        }
        for (k, v) in attributes {
            out.push_str(&format!(" {k}=\"{}\"", escape_attribute(v)));
        }
        out.push('>');

        for child in &self.children {
            match child {
                Node::Element(e) => {
                    if exclude.is_some_and(|f| f(e)) {
                        continue;
                    }
                    e.canonicalize_into(out, &scope, &scope, exclude);
                }
                Node::Text(t) => out.push_str(&escape_text(t)),
            }
        }

        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn start_element(e: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());

    for attribute in e.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            x => out.push(x),
        }
    }
    out
}

fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            x => out.push(x),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Root xmlns="urn:a" xmlns:b="urn:b">
  <Id>urn:uuid:1</Id>
  <b:Thing z="2" a="1">x &amp; y</b:Thing>
  <Empty/>
</Root>
"#;

    #[test]
    fn parse_and_navigate() {
        let root = Element::parse(DOC).unwrap();
        assert_eq!(root.local_name(), "Root");
        assert_eq!(root.namespace(), Some("urn:a"));
        assert_eq!(root.string_child("Id").unwrap(), "urn:uuid:1");
        assert_eq!(root.child("Thing").unwrap().text(), "x & y");
        assert_eq!(root.child("Thing").unwrap().attribute("a"), Some("1"));
        assert!(root.child("Empty").unwrap().children.is_empty());
        assert!(matches!(root.string_child("Nope"), Err(Error::MissingElement(_))));
    }

    #[test]
    fn written_documents_read_back_identically() {
        let root = Element::parse(DOC).unwrap();
        let xml = root.to_xml().unwrap();
        assert_eq!(Element::parse(&xml).unwrap(), root);
        assert_eq!(Element::parse(&xml).unwrap().to_xml().unwrap(), xml);
    }

    #[test]
    fn canonical_form() {
        let root = Element::parse(DOC).unwrap();
        assert_eq!(
            root.canonicalize(&BTreeMap::new(), None),
            r#"<Root xmlns="urn:a" xmlns:b="urn:b"><Id>urn:uuid:1</Id><b:Thing a="1" z="2">x &amp; y</b:Thing><Empty></Empty></Root>"#
        );

        let thing = root.child("Thing").unwrap();
        let scope = root.namespaces_above(&|e| e.local_name() == "Thing").unwrap();
        assert_eq!(
            thing.canonicalize(&scope, None),
            r#"<b:Thing xmlns="urn:a" xmlns:b="urn:b" a="1" z="2">x &amp; y</b:Thing>"#
        );

        let without = root.canonicalize(&BTreeMap::new(), Some(&|e: &Element| e.local_name() == "Thing"));
        assert!(!without.contains("Thing"));
    }
}
