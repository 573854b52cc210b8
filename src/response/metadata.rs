//! `METADATA-*` tables.

use std::collections::BTreeMap;

use roxmltree::Node;
use serde::Serialize;

use super::data::{compact_rows, split_row, DEFAULT_DELIMITER};
use super::xml::{child, elements, element_to_record, Record};

/// Metadata table kinds the classifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetadataKind {
    /// `METADATA-CLASS`, keyed by `ClassName`
    Class,
    /// `METADATA-RESOURCE`, keyed by `ResourceID`
    Resource,
    /// `METADATA-TABLE`, keyed by `SystemName`
    Table,
}

impl MetadataKind {
    /// Look up the kind for a `METADATA-*` element name.
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "METADATA-CLASS" => Some(Self::Class),
            "METADATA-RESOURCE" => Some(Self::Resource),
            "METADATA-TABLE" => Some(Self::Table),
            _ => None,
        }
    }

    /// Element / `Type=` request value.
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Class => "METADATA-CLASS",
            Self::Resource => "METADATA-RESOURCE",
            Self::Table => "METADATA-TABLE",
        }
    }

    /// Descriptor field the entries are keyed by.
    pub fn key_field(&self) -> &'static str {
        match self {
            Self::Class => "ClassName",
            Self::Resource => "ResourceID",
            Self::Table => "SystemName",
        }
    }
}

/// One metadata table, keyed by the kind's key field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSet {
    /// Which table this is
    pub kind: MetadataKind,
    /// `@Resource` of the table element
    pub resource: Option<String>,
    /// `@Class` of the table element (METADATA-TABLE)
    pub class: Option<String>,
    /// `@Version`
    pub version: Option<String>,
    /// `@Date`
    pub date: Option<String>,
    /// Descriptors keyed by name
    pub entries: BTreeMap<String, Record>,
}

impl MetadataSet {
    /// Build from a `METADATA-*` element in STANDARD-XML or COMPACT form.
    pub(crate) fn from_element(kind: MetadataKind, node: Node<'_, '_>) -> Self {
        let descriptors: Vec<Record> = if let Some(columns) = child(node, "COLUMNS") {
            let columns = split_row(columns.text().unwrap_or_default(), DEFAULT_DELIMITER);
            compact_rows(node, &columns, DEFAULT_DELIMITER)
        } else {
            elements(node).map(element_to_record).collect()
        };

        let key_field = kind.key_field();
        let mut entries = BTreeMap::new();
        for descriptor in descriptors {
            match descriptor.get(key_field).and_then(|v| v.as_str()) {
                Some(key) if !key.is_empty() => {
                    entries.insert(key.to_string(), descriptor);
                },
                _ => tracing::warn!(
                    table = kind.element_name(),
                    key_field,
                    "metadata descriptor without key skipped"
                ),
            }
        }

        Self {
            kind,
            resource: node.attribute("Resource").map(str::to_string),
            class: node.attribute("Class").map(str::to_string),
            version: node.attribute("Version").map(str::to_string),
            date: node.attribute("Date").map(str::to_string),
            entries,
        }
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor by key.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }
}
