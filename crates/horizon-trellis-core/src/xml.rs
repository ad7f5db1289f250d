//! XML parsing and serialization for instance data trees.
//!
//! Instance content arrives as XML text (inline in the form definition,
//! fetched from an external source, or restored from persisted state) and is
//! materialized into a [`DataTree`]. Serialization is the inverse, used when
//! an instance is persisted across requests.
//!
//! Comments, processing instructions, and DOCTYPE declarations are not part
//! of the instance data model and are skipped on parse.

use std::fmt;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::tree::{DataTree, NodeId};

/// Errors that can occur while reading instance XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The XML was malformed.
    Parse {
        /// Parser message.
        message: String,
        /// Byte offset where the parser stopped.
        position: u64,
    },
    /// The content held no root element.
    NoRootElement,
    /// Content found after the root element was closed.
    TrailingContent {
        /// Byte offset of the trailing content.
        position: u64,
    },
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message, position } => {
                write!(f, "XML parse error at byte {position}: {message}")
            }
            Self::NoRootElement => write!(f, "XML content has no root element"),
            Self::TrailingContent { position } => {
                write!(f, "Content after the root element at byte {position}")
            }
        }
    }
}

impl std::error::Error for XmlError {}

/// Parse XML text into a [`DataTree`].
pub fn parse(text: &str) -> Result<DataTree, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut tree: Option<DataTree> = None;
    // Open elements, root first. Empty once the root element is closed.
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root_closed = false;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let node = open_element(&mut tree, &stack, &start, root_closed, position)?;
                stack.push(node);
            }
            Ok(Event::Empty(empty)) => {
                open_element(&mut tree, &stack, &empty, root_closed, position)?;
                if stack.is_empty() {
                    // The root itself was an empty element.
                    root_closed = true;
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if stack.is_empty() {
                    root_closed = true;
                }
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map_err(|e| parse_error(position, e))?
                    .to_string();
                if !content.is_empty() {
                    append_text(&mut tree, &stack, &content);
                }
            }
            Ok(Event::CData(cdata)) => {
                let content = String::from_utf8_lossy(&cdata).to_string();
                append_text(&mut tree, &stack, &content);
            }
            // Declarations, comments, PIs: not part of the instance data model.
            Ok(_) => {}
            Err(e) => return Err(parse_error(position, e)),
        }
    }

    tree.ok_or(XmlError::NoRootElement)
}

fn open_element(
    tree: &mut Option<DataTree>,
    stack: &[NodeId],
    start: &BytesStart<'_>,
    root_closed: bool,
    position: u64,
) -> Result<NodeId, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();

    let node = match stack.last() {
        Some(&parent) => {
            let tree = tree.as_mut().expect("open stack implies a tree");
            tree.append_child(parent, name)
                .expect("parse builds a mutable tree")
        }
        None => {
            if root_closed || tree.is_some() {
                return Err(XmlError::TrailingContent { position });
            }
            let new_tree = DataTree::new(name);
            let root = new_tree.root();
            *tree = Some(new_tree);
            root
        }
    };

    let tree = tree.as_mut().expect("element was just opened");
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        tree.set_attribute(node, key, value)
            .expect("parse builds a mutable tree");
    }
    Ok(node)
}

fn append_text(tree: &mut Option<DataTree>, stack: &[NodeId], content: &str) {
    if let (Some(tree), Some(&node)) = (tree.as_mut(), stack.last()) {
        let combined = match tree.value(node) {
            Some("") | None => content.to_string(),
            Some(existing) => format!("{existing}{content}"),
        };
        tree.set_value(node, combined)
            .expect("parse builds a mutable tree");
    }
}

fn parse_error(position: u64, error: quick_xml::Error) -> XmlError {
    XmlError::Parse {
        message: error.to_string(),
        position,
    }
}

/// Serialize a [`DataTree`] to compact XML text.
pub fn serialize(tree: &DataTree) -> String {
    let mut writer = Writer::new(Vec::new());
    write_node(tree, tree.root(), &mut writer);
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

fn write_node(tree: &DataTree, node: NodeId, writer: &mut Writer<Vec<u8>>) {
    let full_name = match tree.namespace_prefix(node) {
        Some(prefix) => format!("{}:{}", prefix, tree.name(node).unwrap_or_default()),
        None => tree.name(node).unwrap_or_default().to_string(),
    };

    let mut start = BytesStart::new(full_name.as_str());
    for (key, value) in tree.attributes(node) {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let value = tree.value(node).unwrap_or_default();
    let children = tree.children(node);

    if children.is_empty() && value.is_empty() {
        let _ = writer.write_event(Event::Empty(start));
    } else {
        let _ = writer.write_event(Event::Start(start));
        if !value.is_empty() {
            let _ = writer.write_event(Event::Text(BytesText::new(value)));
        }
        for &child in children {
            write_node(tree, child, writer);
        }
        let _ = writer.write_event(Event::End(BytesEnd::new(full_name.as_str())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let tree = parse(r#"<order id="1"><item>widget</item><quantity>2</quantity></order>"#)
            .unwrap();
        assert_eq!(tree.name(tree.root()), Some("order"));
        assert_eq!(tree.attribute(tree.root(), "id"), Some("1"));
        let item = tree.find_child(tree.root(), "item").unwrap();
        assert_eq!(tree.value(item), Some("widget"));
    }

    #[test]
    fn test_parse_skips_declaration_and_comments() {
        let tree = parse("<?xml version=\"1.0\"?><!-- note --><root><a/></root>").unwrap();
        assert_eq!(tree.name(tree.root()), Some("root"));
        assert_eq!(tree.children(tree.root()).len(), 1);
    }

    #[test]
    fn test_parse_empty_root() {
        let tree = parse(r#"<root attr="x"/>"#).unwrap();
        assert_eq!(tree.name(tree.root()), Some("root"));
        assert_eq!(tree.attribute(tree.root(), "attr"), Some("x"));
    }

    #[test]
    fn test_parse_namespace_prefix() {
        let tree = parse(r#"<ns:root xmlns:ns="urn:x"><ns:a>v</ns:a></ns:root>"#).unwrap();
        assert_eq!(tree.name(tree.root()), Some("root"));
        assert_eq!(tree.namespace_prefix(tree.root()), Some("ns"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("<root><unclosed></root>").is_err());
        assert!(matches!(parse("   "), Err(XmlError::NoRootElement)));
    }

    #[test]
    fn test_round_trip() {
        let text = r#"<order id="1"><item>widget</item><empty/></order>"#;
        let tree = parse(text).unwrap();
        let serialized = serialize(&tree);
        let reparsed = parse(&serialized).unwrap();
        assert_eq!(reparsed.name(reparsed.root()), Some("order"));
        assert_eq!(
            reparsed.attribute(reparsed.root(), "id"),
            Some("1")
        );
        let item = reparsed.find_child(reparsed.root(), "item").unwrap();
        assert_eq!(reparsed.value(item), Some("widget"));
        assert!(reparsed.find_child(reparsed.root(), "empty").is_some());
    }
}
