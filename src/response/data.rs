//! Search result sets (COMPACT, COMPACT-DECODED and STANDARD-XML).

use roxmltree::Node;
use serde::Serialize;
use serde_json::Value;

use super::xml::{child, children, element_to_record, elements, Record};

/// Default COMPACT delimiter (ASCII tab).
pub const DEFAULT_DELIMITER: char = '\t';

/// Serialization the rows arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataFormat {
    /// Delimited rows with a separate COLUMNS header
    Compact,
    /// Nested `REData` records
    StandardXml,
    /// Only a `COUNT` was requested
    CountOnly,
    /// Server reported no matching records
    NoRecords,
}

/// Ordered result rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSet {
    /// Wire format of the rows
    pub format: DataFormat,
    /// `COUNT/@Records`, when the server sent one
    pub count: Option<u64>,
    /// COMPACT delimiter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// COMPACT column names, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    /// One record per row
    pub records: Vec<Record>,
    /// Server truncated the result (`MAXROWS`)
    pub max_rows: bool,
}

impl DataSet {
    /// Empty set for "no records found".
    pub fn no_records() -> Self {
        Self {
            format: DataFormat::NoRecords,
            count: Some(0),
            delimiter: None,
            columns: Vec::new(),
            records: Vec::new(),
            max_rows: false,
        }
    }

    /// Number of rows returned (not the server-side count).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build from a COMPACT body (`COLUMNS` + `DATA` children of `node`).
    pub(crate) fn from_compact(node: Node<'_, '_>) -> Self {
        let delimiter = delimiter_of(node);
        let columns = child(node, "COLUMNS")
            .map(|c| split_row(c.text().unwrap_or_default(), delimiter))
            .unwrap_or_default();
        let records = compact_rows(node, &columns, delimiter);

        Self {
            format: DataFormat::Compact,
            count: count_of(node),
            delimiter: Some(delimiter),
            columns,
            records,
            max_rows: child(node, "MAXROWS").is_some(),
        }
    }

    /// Build from a STANDARD-XML body (`REData` child of `node`).
    ///
    /// Records are the children of the first container under `REData`
    /// (`REProperties` for property searches), whatever their element name.
    pub(crate) fn from_standard_xml(root: Node<'_, '_>, redata: Node<'_, '_>) -> Self {
        let container = child(redata, "REProperties").or_else(|| elements(redata).next());
        let records = container
            .map(|c| elements(c).map(element_to_record).collect())
            .unwrap_or_default();

        Self {
            format: DataFormat::StandardXml,
            count: count_of(root),
            delimiter: None,
            columns: Vec::new(),
            records,
            max_rows: child(root, "MAXROWS").is_some(),
        }
    }

    /// Build from a body that only carries `COUNT`.
    pub(crate) fn count_only(root: Node<'_, '_>) -> Self {
        Self {
            format: DataFormat::CountOnly,
            count: count_of(root),
            delimiter: None,
            columns: Vec::new(),
            records: Vec::new(),
            max_rows: false,
        }
    }
}

/// `COUNT/@Records`.
pub(crate) fn count_of(node: Node<'_, '_>) -> Option<u64> {
    child(node, "COUNT")
        .and_then(|c| c.attribute("Records"))
        .and_then(|r| r.trim().parse().ok())
}

/// `DELIMITER/@value` is the delimiter's character code in hex (`09` = tab).
fn delimiter_of(node: Node<'_, '_>) -> char {
    child(node, "DELIMITER")
        .and_then(|d| d.attribute("value"))
        .and_then(|v| u32::from_str_radix(v.trim(), 16).ok())
        .and_then(char::from_u32)
        .unwrap_or(DEFAULT_DELIMITER)
}

/// Split one COMPACT line, dropping the leading and trailing delimiter.
pub(crate) fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let line = line.trim_matches(|c: char| c == '\r' || c == '\n');
    let line = line.strip_prefix(delimiter).unwrap_or(line);
    let line = line.strip_suffix(delimiter).unwrap_or(line);
    if line.is_empty() {
        return Vec::new();
    }
    line.split(delimiter).map(str::to_string).collect()
}

/// Zip every `DATA` row with the column names.
pub(crate) fn compact_rows(node: Node<'_, '_>, columns: &[String], delimiter: char) -> Vec<Record> {
    children(node, "DATA")
        .map(|data| {
            let values = split_row(data.text().unwrap_or_default(), delimiter);
            if values.len() > columns.len() {
                tracing::warn!(
                    columns = columns.len(),
                    values = values.len(),
                    "COMPACT row wider than COLUMNS; extra values dropped"
                );
            }
            let mut values = values.into_iter();
            columns
                .iter()
                .map(|column| {
                    let value = values.next().unwrap_or_default();
                    (column.clone(), Value::String(value))
                })
                .collect()
        })
        .collect()
}
