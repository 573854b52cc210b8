//! XML element helpers.
//!
//! Records are plain JSON objects so that callers can serialize or inspect
//! them without knowing the provider's schema:
//!
//! - leaf elements become strings
//! - repeated child elements become arrays
//! - attributes are stored under `@name`, mixed text under `#text`

use roxmltree::{Document, Node, ParsingOptions};
use serde_json::{Map, Value};

/// One record or metadata descriptor.
pub type Record = Map<String, Value>;

/// Parse a document, tolerating a BOM, leading whitespace and DTDs.
pub(crate) fn parse_document(body: &str) -> Result<Document<'_>, roxmltree::Error> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    Document::parse_with_options(trimmed, options)
}

/// First child element named `name`.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

/// All child elements named `name`.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Element children, any name.
pub(crate) fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(|c| c.is_element())
}

/// Concatenated text of all descendants (CDATA included), untrimmed.
pub(crate) fn deep_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Direct text children, trimmed.
fn own_text(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Convert an element into a JSON value.
pub(crate) fn element_to_value(node: Node<'_, '_>) -> Value {
    let mut map = Map::new();
    for attr in node.attributes() {
        map.insert(
            format!("@{}", attr.name()),
            Value::String(attr.value().to_string()),
        );
    }

    let mut has_children = false;
    for element in elements(node) {
        has_children = true;
        let key = element.tag_name().name().to_string();
        let value = element_to_value(element);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            },
            None => {
                map.insert(key, value);
            },
        }
    }

    if !has_children {
        let text = own_text(node);
        if map.is_empty() {
            return Value::String(text);
        }
        if !text.is_empty() {
            map.insert("#text".to_string(), Value::String(text));
        }
    }

    Value::Object(map)
}

/// Convert an element into a [`Record`].
pub(crate) fn element_to_record(node: Node<'_, '_>) -> Record {
    match element_to_value(node) {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("#text".to_string(), other);
            map
        },
    }
}
