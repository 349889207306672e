//! Generic element tree and the tag-name lookup used by the mapping parser
//!
//! The parser never walks raw documents; it asks for `info`, `controller`,
//! `group`... by name through an [`ElementMap`].

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use crate::error::MappingError;

/// A node of a parsed document: tag name, text content, attributes, ordered children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Raw text content (untrimmed, concatenated across text runs)
    pub text: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Read a tag-based document into its root element
    pub fn parse(document: &str) -> Result<Self, MappingError> {
        let mut reader = Reader::from_str(document);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                MappingError::Document(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(ref e) => {
                    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));
                    read_attributes(e, &mut element)?;
                    stack.push(element);
                },
                Event::Empty(ref e) => {
                    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));
                    read_attributes(e, &mut element)?;
                    attach(&mut stack, &mut root, element)?;
                },
                Event::End(_) => {
                    // quick-xml already verified the end name matches
                    let element = stack.pop().ok_or_else(|| {
                        MappingError::Document("unexpected closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                },
                Event::Text(ref e) => {
                    if let Some(current) = stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| MappingError::Document(e.to_string()))?;
                        current.text.push_str(&text);
                    }
                },
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                },
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype
                _ => {},
            }
        }

        if let Some(open) = stack.last() {
            return Err(MappingError::Document(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.ok_or_else(|| MappingError::Document("document has no root element".to_string()))
    }

    /// Attribute value by name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Trimmed text content
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Keyed view of this element's children
    pub fn flatten(&self) -> ElementMap<'_> {
        flatten(&self.children)
    }
}

fn read_attributes(
    start: &quick_xml::events::BytesStart<'_>,
    element: &mut Element,
) -> Result<(), MappingError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MappingError::Document(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MappingError::Document(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(())
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), MappingError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(MappingError::Document(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

/// Borrowed view of one element: its trimmed text and its own children
#[derive(Debug, Clone, Copy)]
pub struct ElementView<'a> {
    element: &'a Element,
}

impl<'a> ElementView<'a> {
    pub fn text(&self) -> &'a str {
        self.element.trimmed_text()
    }

    pub fn children(&self) -> &'a [Element] {
        &self.element.children
    }

    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.element.attribute(key)
    }

    pub fn flatten(&self) -> ElementMap<'a> {
        flatten(&self.element.children)
    }
}

/// Tag name -> element lookup over a list of siblings
///
/// When a tag occurs more than once the first occurrence is kept, which is
/// what [`Element::child`] returns as well.
#[derive(Debug, Clone, Default)]
pub struct ElementMap<'a> {
    entries: HashMap<&'a str, ElementView<'a>>,
}

impl<'a> ElementMap<'a> {
    pub fn get(&self, name: &str) -> Option<ElementView<'a>> {
        self.entries.get(name).copied()
    }

    /// Trimmed text of a child, `None` if the child is absent
    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.get(name).map(|view| view.text())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the tag-name lookup for a list of sibling elements
pub fn flatten(children: &[Element]) -> ElementMap<'_> {
    let mut entries = HashMap::with_capacity(children.len());
    for child in children {
        entries
            .entry(child.name.as_str())
            .or_insert(ElementView { element: child });
    }
    ElementMap { entries }
}
