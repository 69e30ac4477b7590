use std::borrow::Cow;
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::PackagingError;

/// Node of an XML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Element.
    Element(Element),
    /// Text content. Escaped when written, characters not allowed in XML are dropped.
    Text(String),
}

/// XML element with attributes and child nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Creates an empty element.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: vec![],
            children: vec![],
        }
    }

    /// Creates an element with text content.
    pub fn text(name: &'static str, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::Text(text.into()));
        element
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((name, value.into()));
        self
    }

    /// Adds a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    /// Adds a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Adds a child element with text content.
    pub fn push_text(&mut self, name: &'static str, text: impl Into<String>) {
        self.push(Element::text(name, text));
    }

    /// Name of the element.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Child nodes.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Writes the element and all its descendants.
    pub fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), PackagingError> {
        let mut start = BytesStart::new(self.name);
        for (name, value) in &self.attributes {
            start.push_attribute((*name, xml_chars(value).as_ref()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write(writer)?,
                Node::Text(text) => writer.write_event(Event::Text(BytesText::new(&xml_chars(text))))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name)))?;

        Ok(())
    }
}

/// Returns true if the character may appear in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..)
}

/// Removes characters that cannot be represented in XML 1.0, even as character references.
fn xml_chars(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_xml_char) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.chars().filter(|c| is_xml_char(*c)).collect())
    }
}
