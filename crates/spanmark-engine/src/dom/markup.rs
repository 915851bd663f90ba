//! Markup loading and serialisation for [`Document`]
//!
//! Reads well-formed XML/XHTML-style markup into the arena (whitespace text is kept
//! verbatim, since it contributes to the flattened text) and writes the tree back out
//! with highlight containers rendered as ordinary elements.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::document::Document;
use super::node::{Element, NodeData, NodeId};
use crate::adapter::TreeAdapter;

#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("Malformed markup: {0}")]
    Xml(String),
    #[error("Unexpected closing tag </{0}>")]
    UnbalancedClose(String),
    #[error("Unclosed element <{0}>")]
    Unclosed(String),
}

impl Document {
    /// Parse markup into a new document using the default highlight class
    pub fn parse_markup(input: &str) -> Result<Self, MarkupError> {
        Self::parse_markup_into(Document::new(), input)
    }

    /// Parse markup into `doc`, appending below its root
    pub fn parse_markup_into(mut doc: Document, input: &str) -> Result<Self, MarkupError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut stack = vec![doc.root()];
        loop {
            let event = reader.read_event().map_err(|e| {
                MarkupError::Xml(format!("at position {}: {e}", reader.error_position()))
            })?;
            match event {
                Event::Start(ref e) => {
                    let element = read_element(e)?;
                    let parent = current(&stack, &doc);
                    let id = doc.create_element(element);
                    doc.append_child(parent, id);
                    stack.push(id);
                }
                Event::Empty(ref e) => {
                    let element = read_element(e)?;
                    let parent = current(&stack, &doc);
                    let id = doc.create_element(element);
                    doc.append_child(parent, id);
                }
                Event::End(ref e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if stack.len() <= 1 {
                        return Err(MarkupError::UnbalancedClose(name));
                    }
                    stack.pop();
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| MarkupError::Xml(e.to_string()))?;
                    if !text.is_empty() {
                        let parent = current(&stack, &doc);
                        doc.append_text(parent, &text);
                    }
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    let parent = current(&stack, &doc);
                    doc.append_text(parent, &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() > 1 {
            let open = stack
                .last()
                .and_then(|id| doc.tag_name(*id))
                .unwrap_or_default()
                .to_string();
            return Err(MarkupError::Unclosed(open));
        }
        Ok(doc)
    }

    /// Serialise the children of the document root
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialise a single subtree
    pub fn node_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeData::Document => {
                for child in self.children(id) {
                    self.write_node(child, out);
                }
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                if !element.classes.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(
                        &element.classes.join(" "),
                    ));
                    out.push('"');
                }
                for (key, value) in &element.attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn current(stack: &[NodeId], doc: &Document) -> NodeId {
    stack.last().copied().unwrap_or_else(|| doc.root())
}

fn read_element(start: &BytesStart<'_>) -> Result<Element, MarkupError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(tag);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarkupError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MarkupError::Xml(e.to_string()))?
            .into_owned();
        if key == "class" {
            element
                .classes
                .extend(value.split_whitespace().map(str::to_string));
        } else {
            element.attributes.push((key, value));
        }
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_builds_elements_and_text() {
        let doc = Document::parse_markup("<div><p>the cat</p><p>the dog</p></div>").unwrap();
        let root = doc.root();
        let div = doc.children(root)[0];
        assert_eq!(doc.tag_name(div), Some("div"));
        let ps = doc.children(div);
        assert_eq!(ps.len(), 2);
        assert_eq!(doc.text_content(ps[1]), "the dog");
    }

    #[test]
    fn test_parse_keeps_whitespace_and_entities() {
        let doc = Document::parse_markup("<p>a &amp; b <b>c</b> d</p>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "a & b c d");
    }

    #[test]
    fn test_parse_splits_class_attribute() {
        let doc = Document::parse_markup(r#"<p class="x y" id="intro">t</p>"#).unwrap();
        let p = doc.children(doc.root())[0];
        let element = doc.element(p).unwrap();
        assert_eq!(element.classes, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(element.attribute("id"), Some("intro"));
    }

    #[test]
    fn test_markup_roundtrip() {
        let source = r#"<div><p class="lead">one &lt;two&gt;</p><br></br></div>"#;
        let doc = Document::parse_markup(source).unwrap();
        assert_eq!(doc.to_markup(), source);
    }

    #[test]
    fn test_unclosed_element_is_rejected() {
        let result = Document::parse_markup("<div><p>text</p>");
        assert!(result.is_err());
    }

    #[test]
    fn test_highlight_serialisation() {
        let mut doc = Document::parse_markup("<p>hello</p>").unwrap();
        let p = doc.children(doc.root())[0];
        let text = doc.children(p)[0];
        doc.wrap(text, &["hl".to_string()]);
        insta::assert_snapshot!(doc.to_markup(), @r#"<p><span class="spanmark hl">hello</span></p>"#);
    }
}
