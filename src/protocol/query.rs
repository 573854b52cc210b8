//! Request arguments for the RETS transactions.

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Ordered query-string arguments.
///
/// Setting a key that is already present replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
    pairs: Vec<(String, String)>,
}

impl QueryArgs {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// These arguments layered over `defaults`.
    pub fn merged_over(&self, defaults: &QueryArgs) -> QueryArgs {
        let mut merged = defaults.clone();
        for (key, value) in &self.pairs {
            merged.set(key.clone(), value.clone());
        }
        merged
    }

    /// Append the arguments to `url`'s query string (URL-encoded).
    pub fn apply_to(&self, url: &mut Url) {
        if self.pairs.is_empty() {
            return;
        }
        url.query_pairs_mut()
            .extend_pairs(self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = QueryArgs::new();
        for (key, value) in iter {
            args.set(key, value);
        }
        args
    }
}

/// Search result serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchFormat {
    /// `COMPACT`
    Compact,
    /// `COMPACT-DECODED`
    CompactDecoded,
    /// `STANDARD-XML`
    #[default]
    StandardXml,
}

impl SearchFormat {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchFormat::Compact => "COMPACT",
            SearchFormat::CompactDecoded => "COMPACT-DECODED",
            SearchFormat::StandardXml => "STANDARD-XML",
        }
    }
}

impl fmt::Display for SearchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "COMPACT" => Ok(SearchFormat::Compact),
            "COMPACT-DECODED" => Ok(SearchFormat::CompactDecoded),
            "STANDARD-XML" | "XML" => Ok(SearchFormat::StandardXml),
            _ => Err(format!("Unknown search format: {s}")),
        }
    }
}

/// Search `Count` argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountMode {
    /// `0`: rows only
    None,
    /// `1`: rows and `COUNT`
    #[default]
    WithRecords,
    /// `2`: `COUNT` only
    CountOnly,
}

impl CountMode {
    fn as_str(&self) -> &'static str {
        match self {
            CountMode::None => "0",
            CountMode::WithRecords => "1",
            CountMode::CountOnly => "2",
        }
    }
}

/// Arguments for a Search transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// `SearchType` (resource)
    pub resource: String,
    /// `Class`
    pub class: String,
    /// DMQL2 query, e.g. `(ListPrice=300000+)`
    pub query: String,
    /// Result format
    pub format: SearchFormat,
    /// `Limit`; `None` sends `NONE`
    pub limit: Option<u32>,
    /// `Offset`
    pub offset: Option<u32>,
    /// `Count`
    pub count: CountMode,
    /// `StandardNames`
    pub standard_names: bool,
    /// `Select` field list
    pub select: Option<String>,
    /// Additional raw arguments, applied last
    pub extra: QueryArgs,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            resource: "Property".to_string(),
            class: "A".to_string(),
            query: String::new(),
            format: SearchFormat::StandardXml,
            limit: Some(99),
            offset: None,
            count: CountMode::WithRecords,
            standard_names: false,
            select: None,
            extra: QueryArgs::new(),
        }
    }
}

impl SearchQuery {
    /// Query against `resource`/`class`.
    pub fn new(resource: impl Into<String>, class: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            class: class.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the result format.
    pub fn format(mut self, format: SearchFormat) -> Self {
        self.format = format;
        self
    }

    /// Set `Limit`.
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Set `Count`.
    pub fn count(mut self, count: CountMode) -> Self {
        self.count = count;
        self
    }

    /// Request standard field names.
    pub fn standard_names(mut self, enabled: bool) -> Self {
        self.standard_names = enabled;
        self
    }

    /// Restrict the returned fields.
    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.select = Some(fields.into());
        self
    }

    /// Wire arguments.
    pub fn to_args(&self) -> QueryArgs {
        let mut args = QueryArgs::new()
            .with("SearchType", &self.resource)
            .with("Class", &self.class)
            .with("Query", &self.query)
            .with("QueryType", "DMQL2")
            .with("Format", self.format.as_str())
            .with("Count", self.count.as_str())
            .with(
                "Limit",
                self.limit
                    .map_or_else(|| "NONE".to_string(), |l| l.to_string()),
            )
            .with("StandardNames", if self.standard_names { "1" } else { "0" });
        if let Some(offset) = self.offset {
            args.set("Offset", offset.to_string());
        }
        if let Some(select) = &self.select {
            args.set("Select", select);
        }
        self.extra.merged_over(&args)
    }
}

/// GetMetadata `Type` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataType {
    /// `METADATA-RESOURCE`
    Resource,
    /// `METADATA-CLASS`
    Class,
    /// `METADATA-TABLE`
    Table,
    /// Any other type, sent verbatim
    Other(String),
}

impl MetadataType {
    /// Wire value.
    pub fn as_str(&self) -> &str {
        match self {
            MetadataType::Resource => "METADATA-RESOURCE",
            MetadataType::Class => "METADATA-CLASS",
            MetadataType::Table => "METADATA-TABLE",
            MetadataType::Other(raw) => raw,
        }
    }

    /// Wire arguments for `id`.
    pub fn to_args(&self, id: &str) -> QueryArgs {
        QueryArgs::new()
            .with("Type", self.as_str())
            .with("ID", id)
            .with("Format", "STANDARD-XML")
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments for a GetObject transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRequest {
    /// `Resource`
    pub resource: String,
    /// `Type`, e.g. `Photo`
    pub object_type: String,
    /// Listing or resource key
    pub id: String,
    /// Object number, `*` for all
    pub object_id: String,
    /// Ask for a URL instead of the bytes
    pub location: bool,
}

impl ObjectRequest {
    /// First photo of a listing.
    pub fn photo(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            object_type: "Photo".to_string(),
            id: id.into(),
            object_id: "1".to_string(),
            location: false,
        }
    }

    /// Select the object number.
    pub fn object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = object_id.into();
        self
    }

    /// Request a location URL instead of the payload.
    pub fn location(mut self, location: bool) -> Self {
        self.location = location;
        self
    }

    /// Wire arguments.
    pub fn to_args(&self) -> QueryArgs {
        QueryArgs::new()
            .with("Resource", &self.resource)
            .with("Type", &self.object_type)
            .with("ID", format!("{}:{}", self.id, self.object_id))
            .with("Location", if self.location { "1" } else { "0" })
    }
}
