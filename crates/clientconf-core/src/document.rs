//! Configuration document tree
//!
//! A document is kept as a generic attributed element tree until the very
//! end of a resolution pass; nothing here knows about any particular schema.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SourceLocation};

/// An element of a configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Element name
    pub name: String,
    /// Attributes (order is preserved for export but carries no meaning)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    /// Child elements in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    /// Text content, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder: append a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Get the text content
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Iterate over the direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Get the last direct child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().rev().find(|c| c.name == name)
    }

    /// Check whether any descendant (not self) has the given name
    pub fn contains_descendant(&self, name: &str) -> bool {
        self.children
            .iter()
            .any(|c| c.name == name || c.contains_descendant(name))
    }

    /// Select elements below this one by path
    ///
    /// Paths are dotted element names, each optionally followed by `[n]` to
    /// pick the n-th of the same-named children, e.g.
    /// `network.cluster-members.address[1]`. The empty path selects `self`.
    pub fn select(&self, path: &str) -> Result<Vec<&Element>> {
        let mut current = vec![self];

        for segment in parse_path(path)? {
            current = match segment {
                PathSegment::Name(name) => {
                    let name = name.as_str();
                    current
                        .into_iter()
                        .flat_map(move |e| e.children.iter().filter(move |c| c.name == name))
                        .collect()
                }
                PathSegment::Index(idx) => current.get(idx).map(|e| vec![*e]).unwrap_or_default(),
            };
            if current.is_empty() {
                break;
            }
        }

        Ok(current)
    }

    /// Render this element as indented XML
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, quick_xml::escape::escape(value.as_str())));
        }

        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                out.push('>');
                out.push_str(&quick_xml::escape::escape(text.as_str()));
                out.push_str(&format!("</{}>\n", self.name));
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    out.push_str(&"  ".repeat(depth + 1));
                    out.push_str(&quick_xml::escape::escape(text.as_str()));
                    out.push('\n');
                }
                for child in &self.children {
                    child.write_xml(out, depth + 1);
                }
                out.push_str(&indent);
                out.push_str(&format!("</{}>\n", self.name));
            }
        }
    }
}

/// The parsed top-level content of one resource
///
/// The parser does not enforce a single root: that is a structural rule
/// checked by the import resolver so it can be reported precisely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    elements: Vec<Element>,
    source: Option<String>,
}

impl Document {
    /// Build a document from already-constructed top-level elements
    pub fn new(elements: Vec<Element>, source: Option<String>) -> Self {
        Self { elements, source }
    }

    /// Parse XML text into a document
    ///
    /// `source` names the resource the text came from and is attached to
    /// parse errors.
    pub fn parse(text: &str, source: Option<&str>) -> Result<Self> {
        let elements = parse_elements(text).map_err(|(message, offset)| {
            let file = source.unwrap_or("<input>").to_string();
            let mut err = Error::parse(message).with_source_location(SourceLocation {
                file,
                line: Some(line_at(text, offset)),
                column: None,
            });
            if let Some(source) = source {
                err = err.with_resource(source);
            }
            err
        })?;

        Ok(Self {
            elements,
            source: source.map(str::to_string),
        })
    }

    /// The top-level elements
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// The first top-level element
    pub fn root(&self) -> Option<&Element> {
        self.elements.first()
    }

    /// The resource identifier this document was read from
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Consume the document, returning its top-level elements
    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }
}

type ParseFailure = (String, usize);

fn parse_elements(text: &str) -> std::result::Result<Vec<Element>, ParseFailure> {
    let mut reader = Reader::from_str(text);

    let mut top_level = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let offset = reader.buffer_position() as usize;
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err((e.to_string(), reader.buffer_position() as usize)),
        };

        match event {
            Event::Start(start) => stack.push(start_element(&start, offset)?),
            Event::Empty(start) => {
                let element = start_element(&start, offset)?;
                attach(element, &mut stack, &mut top_level);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ("unexpected end tag".to_string(), offset))?;
                attach(element, &mut stack, &mut top_level);
            }
            Event::Text(t) => {
                let value = t.unescape().map_err(|e| (e.to_string(), offset))?;
                // Indentation between elements; other text is kept verbatim
                if !value.trim().is_empty() {
                    push_text(&mut stack, &value, offset)?;
                }
            }
            Event::CData(c) => {
                let value = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|e| (e.to_string(), offset))?;
                push_text(&mut stack, &value, offset)?;
            }
            Event::Eof => break,
            // Comments, declarations, processing instructions, DOCTYPE
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err((format!("unclosed element <{}>", open.name), text.len()));
    }

    Ok(top_level)
}

fn start_element(start: &BytesStart<'_>, offset: usize) -> std::result::Result<Element, ParseFailure> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| (e.to_string(), offset))?
        .to_string();
    let mut element = Element::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| (e.to_string(), offset))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| (e.to_string(), offset))?
            .to_string();
        let value = attr.unescape_value().map_err(|e| (e.to_string(), offset))?;
        element.attributes.insert(key, value.into_owned());
    }

    Ok(element)
}

fn attach(element: Element, stack: &mut [Element], top_level: &mut Vec<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => top_level.push(element),
    }
}

fn push_text(stack: &mut [Element], value: &str, offset: usize) -> std::result::Result<(), ParseFailure> {
    match stack.last_mut() {
        Some(current) => {
            current.text.get_or_insert_with(String::new).push_str(value);
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(("text content outside of any element".to_string(), offset)),
    }
}

/// 1-based line number of a byte offset
fn line_at(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    /// A child element name (e.g., "network" in "network.smart-routing")
    Name(String),
    /// An index among same-named elements (e.g., 0 in "address[0]")
    Index(usize),
}

/// Parse a path string into segments
/// Supports: "name", "name.child", "name[0]", "name[0].child"
fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Name(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Name(std::mem::take(&mut current)));
                }
                let index_str: String = chars.by_ref().take_while(|c| *c != ']').collect();
                let idx: usize = index_str.trim().parse().map_err(|_| {
                    Error::parse(format!("Invalid element index in path: {}", index_str))
                })?;
                segments.push(PathSegment::Index(idx));
            }
            ']' => {
                return Err(Error::parse("Unexpected ']' in path"));
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Name(current));
    }

    Ok(segments)
}
