//! RETS response classifier.
//!
//! Every RETS reply is an XML document with a `RETS` root carrying
//! `ReplyCode` and `ReplyText`. [`parse`] turns such a body into a
//! [`ParsedResponse`] in two passes:
//!
//! 1. Known reply codes are dispatched first, independent of the body shape.
//!    Fatal codes become a [`ParseError`]; query mistakes (unknown field,
//!    bad DMQL2, ...) become [`ResponseBody::Error`] so the session survives.
//! 2. Otherwise the body shape decides, in this order:
//!
//! | Shape                       | Result                          |
//! |-----------------------------|---------------------------------|
//! | `COLUMNS` + `DATA`          | [`ResponseBody::Data`] (COMPACT) |
//! | `REData`                    | [`ResponseBody::Data`] (STANDARD-XML) |
//! | `RETS-RESPONSE`             | [`ResponseBody::Connection`]    |
//! | `METADATA/METADATA-CLASS`   | [`ResponseBody::Classifications`] |
//! | `METADATA/METADATA-RESOURCE`| [`ResponseBody::Resources`]     |
//! | `METADATA/METADATA-TABLE`   | [`ResponseBody::Fields`]        |
//! | `RETS-STATUS`               | [`ResponseBody::Status`]        |
//! | `COUNT` only                | [`ResponseBody::Data`] (count only) |

mod data;
mod metadata;
mod xml;

use std::collections::BTreeMap;
use std::fmt;

use roxmltree::Node;
use serde::Serialize;
use thiserror::Error;

pub use data::{DataFormat, DataSet, DEFAULT_DELIMITER};
pub use metadata::{MetadataKind, MetadataSet};
pub use xml::Record;

use xml::{child, deep_text, parse_document};

/// RETS reply codes with dedicated handling.
pub mod codes {
    /// Operation successful.
    pub const SUCCESS: u32 = 0;
    /// User-Agent authentication required or invalid.
    pub const AUTHENTICATION_REQUIRED: u32 = 20036;
    /// User-Agent not registered with the server.
    pub const AGENT_NOT_REGISTERED: u32 = 20037;
    /// Search referenced an unknown field.
    pub const UNKNOWN_FIELD: u32 = 20200;
    /// Search matched nothing.
    pub const NO_RECORDS_FOUND: u32 = 20201;
    /// Miscellaneous search error.
    pub const MISC_SEARCH_ERROR: u32 = 20203;
    /// DMQL2 query could not be parsed.
    pub const INVALID_QUERY_SYNTAX: u32 = 20206;
    /// Request had no User-Agent header.
    pub const MISSING_USER_AGENT: u32 = 20513;
}

/// A classified RETS reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedResponse {
    /// `ReplyCode` from the `RETS` root
    pub code: u32,
    /// `ReplyText` from the `RETS` root (empty when absent)
    pub text: String,
    /// Classified body
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl ParsedResponse {
    /// Short name of the body variant.
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Check if the reply code is `0`.
    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }
}

/// Body variants; exactly one per parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Login/logout banner as flat key/value pairs
    Connection(BTreeMap<String, String>),
    /// `METADATA-CLASS`, keyed by `ClassName`
    Classifications(MetadataSet),
    /// `METADATA-RESOURCE`, keyed by `ResourceID`
    Resources(MetadataSet),
    /// `METADATA-TABLE`, keyed by `SystemName`
    Fields(MetadataSet),
    /// Search rows
    Data(DataSet),
    /// `RETS-STATUS` with no content
    Status,
    /// Non-fatal reply code
    Error(ReplyError),
}

impl ResponseBody {
    /// Short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Classifications(_) => "classifications",
            Self::Resources(_) => "resources",
            Self::Fields(_) => "fields",
            Self::Data(_) => "data",
            Self::Status => "status",
            Self::Error(_) => "error",
        }
    }
}

/// Recoverable reply categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// 20200
    UnknownField,
    /// 20203
    MiscellaneousSearchError,
    /// 20206
    InvalidQuerySyntax,
    /// Any other non-zero code the body gave no shape for
    Other,
}

impl QueryErrorKind {
    fn from_code(code: u32) -> Self {
        match code {
            codes::UNKNOWN_FIELD => Self::UnknownField,
            codes::MISC_SEARCH_ERROR => Self::MiscellaneousSearchError,
            codes::INVALID_QUERY_SYNTAX => Self::InvalidQuerySyntax,
            _ => Self::Other,
        }
    }
}

/// Structured reply error returned as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyError {
    /// RETS reply code
    pub code: u32,
    /// RETS reply text
    pub text: String,
    /// Category
    pub kind: QueryErrorKind,
    /// Rows the server sent alongside the error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<DataSet>,
}

/// Why a body could not be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Body is not well-formed XML.
    #[error("malformed XML: {0}")]
    XmlSyntax(String),

    /// Top-level element is not `RETS`.
    #[error("missing RETS root element")]
    MissingRetsRoot,

    /// `ReplyCode` absent or not an integer.
    #[error("missing or invalid ReplyCode")]
    MissingReplyCode,

    /// Reply code 20036.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Reply code 20037.
    #[error("user agent not registered")]
    AgentNotRegistered,

    /// Reply code 20513.
    #[error("missing User-Agent header")]
    MissingUserAgentHeader,

    /// `METADATA` child other than CLASS, RESOURCE or TABLE.
    #[error("unknown METADATA sub-type: {0}")]
    UnknownMetadataSubtype(String),

    /// No known body shape matched.
    #[error("unrecognized response shape")]
    UnrecognizedResponseShape,
}

/// Classification failure, with whatever reply code/text was read first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong
    pub kind: ParseErrorKind,
    /// `ReplyCode`, when the root carried a valid one
    pub code: Option<u32>,
    /// `ReplyText`, when present
    pub text: Option<String>,
}

impl ParseError {
    fn bare(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            code: None,
            text: None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match (self.code, self.text.as_deref()) {
            (Some(code), Some(text)) if !text.is_empty() => write!(f, " (reply {code}: {text})"),
            (Some(code), _) => write!(f, " (reply {code})"),
            (None, Some(text)) if !text.is_empty() => write!(f, " ({text})"),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for ParseError {}

/// Classify a RETS response body.
pub fn parse(body: &str) -> Result<ParsedResponse, ParseError> {
    let doc =
        parse_document(body).map_err(|e| ParseError::bare(ParseErrorKind::XmlSyntax(e.to_string())))?;
    let root = doc.root_element();
    if root.tag_name().name() != "RETS" {
        return Err(ParseError::bare(ParseErrorKind::MissingRetsRoot));
    }

    let text = root.attribute("ReplyText").map(str::to_string);
    let code = match root
        .attribute("ReplyCode")
        .and_then(|c| c.trim().parse::<u32>().ok())
    {
        Some(code) => code,
        None => {
            return Err(ParseError {
                kind: ParseErrorKind::MissingReplyCode,
                code: None,
                text,
            })
        },
    };
    let text = text.unwrap_or_default();

    let fatal = |kind| ParseError {
        kind,
        code: Some(code),
        text: Some(text.clone()),
    };

    let body = match code {
        codes::AUTHENTICATION_REQUIRED => {
            return Err(fatal(ParseErrorKind::AuthenticationRequired))
        },
        codes::AGENT_NOT_REGISTERED => return Err(fatal(ParseErrorKind::AgentNotRegistered)),
        codes::MISSING_USER_AGENT => return Err(fatal(ParseErrorKind::MissingUserAgentHeader)),
        codes::NO_RECORDS_FOUND => ResponseBody::Data(DataSet::no_records()),
        codes::UNKNOWN_FIELD | codes::MISC_SEARCH_ERROR | codes::INVALID_QUERY_SYNTAX => {
            ResponseBody::Error(ReplyError {
                code,
                text: text.clone(),
                kind: QueryErrorKind::from_code(code),
                partial: data_shape(root),
            })
        },
        _ => match classify_shape(root) {
            Ok(Some(body)) => body,
            Ok(None) if code != codes::SUCCESS => ResponseBody::Error(ReplyError {
                code,
                text: text.clone(),
                kind: QueryErrorKind::Other,
                partial: None,
            }),
            Ok(None) => return Err(fatal(ParseErrorKind::UnrecognizedResponseShape)),
            Err(kind) => return Err(fatal(kind)),
        },
    };

    tracing::trace!(code, kind = body.kind(), "classified RETS response");

    Ok(ParsedResponse { code, text, body })
}

/// COMPACT or STANDARD-XML rows, if the body has either.
fn data_shape(root: Node<'_, '_>) -> Option<DataSet> {
    if child(root, "COLUMNS").is_some() && child(root, "DATA").is_some() {
        return Some(DataSet::from_compact(root));
    }
    child(root, "REData").map(|redata| DataSet::from_standard_xml(root, redata))
}

fn classify_shape(root: Node<'_, '_>) -> Result<Option<ResponseBody>, ParseErrorKind> {
    if let Some(data) = data_shape(root) {
        return Ok(Some(ResponseBody::Data(data)));
    }

    if let Some(banner) = child(root, "RETS-RESPONSE") {
        return Ok(Some(ResponseBody::Connection(parse_banner(&deep_text(
            banner,
        )))));
    }

    if let Some(table) = child(root, "METADATA").and_then(|m| xml::elements(m).next()) {
        let name = table.tag_name().name();
        let kind = MetadataKind::from_element(name)
            .ok_or_else(|| ParseErrorKind::UnknownMetadataSubtype(name.to_string()))?;
        let set = MetadataSet::from_element(kind, table);
        return Ok(Some(match kind {
            MetadataKind::Class => ResponseBody::Classifications(set),
            MetadataKind::Resource => ResponseBody::Resources(set),
            MetadataKind::Table => ResponseBody::Fields(set),
        }));
    }

    if child(root, "RETS-STATUS").is_some() {
        return Ok(Some(ResponseBody::Status));
    }

    if child(root, "COUNT").is_some() {
        return Ok(Some(ResponseBody::Data(DataSet::count_only(root))));
    }

    Ok(None)
}

/// Split a `RETS-RESPONSE` body into `key=value` pairs.
///
/// Each non-blank line is split on its first `=`; lines without one are skipped.
pub fn parse_banner(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LOGIN: &str = "<RETS ReplyCode=\"0\" ReplyText=\"Operation Successful\">\r\n\
        <RETS-RESPONSE>\r\n\
        MemberName=Acme Realty\r\n\
        User=jdoe,0,IDX Vendor,jdoe\r\n\
        Search=/rets/search\r\n\
        GetMetadata = /rets/getmetadata \r\n\
        MetadataVersion=1.00.000\r\n\
        </RETS-RESPONSE>\r\n\
        </RETS>";

    #[test]
    fn test_login_banner() {
        let parsed = parse(LOGIN).unwrap();
        assert_eq!(parsed.code, 0);
        assert_eq!(parsed.text, "Operation Successful");
        let ResponseBody::Connection(banner) = parsed.body else {
            panic!("expected connection, got {}", parsed.body.kind());
        };
        assert_eq!(banner["MemberName"], "Acme Realty");
        assert_eq!(banner["GetMetadata"], "/rets/getmetadata");
        assert_eq!(banner["User"], "jdoe,0,IDX Vendor,jdoe");
    }

    #[test]
    fn test_banner_splits_on_first_equals() {
        let banner = parse_banner("Login=/rets/login?a=b\n\nno equals here\n = orphan\n");
        assert_eq!(banner.len(), 1);
        assert_eq!(banner["Login"], "/rets/login?a=b");
    }

    #[test]
    fn test_no_records_ignores_body() {
        let xml = "<RETS ReplyCode=\"20201\" ReplyText=\"No Records Found\">\
            <COLUMNS>\tA\t</COLUMNS><DATA>\tx\t</DATA><RETS-STATUS/></RETS>";
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed.kind(), "data");
        let ResponseBody::Data(data) = parsed.body else {
            panic!("expected data");
        };
        assert!(data.is_empty());
        assert_eq!(data.format, DataFormat::NoRecords);
    }

    #[test]
    fn test_fatal_codes_keep_reply() {
        for (code, kind) in [
            (20036, ParseErrorKind::AuthenticationRequired),
            (20037, ParseErrorKind::AgentNotRegistered),
            (20513, ParseErrorKind::MissingUserAgentHeader),
        ] {
            let xml = format!("<RETS ReplyCode=\"{code}\" ReplyText=\"nope\"><RETS-RESPONSE/></RETS>");
            let err = parse(&xml).unwrap_err();
            assert_eq!(err.kind, kind);
            assert_eq!(err.code, Some(code));
            assert_eq!(err.text.as_deref(), Some("nope"));
        }
    }

    #[test]
    fn test_recoverable_codes_are_data() {
        let xml = "<RETS ReplyCode=\"20206\" ReplyText=\"Invalid Query Syntax\"/>";
        let parsed = parse(xml).unwrap();
        let ResponseBody::Error(reply) = parsed.body else {
            panic!("expected error variant");
        };
        assert_eq!(reply.kind, QueryErrorKind::InvalidQuerySyntax);
        assert_eq!(reply.code, 20206);
        assert!(reply.partial.is_none());

        let xml = "<RETS ReplyCode=\"20200\" ReplyText=\"Unknown Field Foo\">\
            <COLUMNS>\tListingID\t</COLUMNS><DATA>\tL1\t</DATA></RETS>";
        let ResponseBody::Error(reply) = parse(xml).unwrap().body else {
            panic!("expected error variant");
        };
        assert_eq!(reply.kind, QueryErrorKind::UnknownField);
        assert_eq!(reply.partial.map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_compact_search() {
        let xml = "<RETS ReplyCode=\"0\" ReplyText=\"Success\">\
            <COUNT Records=\"2\"/><DELIMITER value=\"09\"/>\
            <COLUMNS>\tListingID\tCity\t</COLUMNS>\
            <DATA>\tL1\tAustin\t</DATA><DATA>\tL2\tDallas\t</DATA></RETS>";
        let ResponseBody::Data(data) = parse(xml).unwrap().body else {
            panic!("expected data");
        };
        assert_eq!(data.format, DataFormat::Compact);
        assert_eq!(data.count, Some(2));
        assert_eq!(data.records[1]["City"], "Dallas");
    }

    #[test]
    fn test_standard_xml_search() {
        let xml = r#"<RETS ReplyCode="0" ReplyText="Success">
            <COUNT Records="1"/>
            <REData><REProperties>
                <ResidentialProperty><Listing><ListingID>L1</ListingID></Listing></ResidentialProperty>
            </REProperties></REData>
        </RETS>"#;
        let ResponseBody::Data(data) = parse(xml).unwrap().body else {
            panic!("expected data");
        };
        assert_eq!(data.format, DataFormat::StandardXml);
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0]["Listing"]["ListingID"], "L1");
    }

    fn class_body(names: &[String]) -> String {
        let classes: String = names
            .iter()
            .map(|n| format!("<Class><ClassName>{n}</ClassName><Description>d</Description></Class>"))
            .collect();
        format!(
            "<RETS ReplyCode=\"0\" ReplyText=\"ok\"><METADATA>\
             <METADATA-CLASS Resource=\"Property\">{classes}</METADATA-CLASS></METADATA></RETS>"
        )
    }

    #[test]
    fn test_metadata_variants() {
        let parsed = parse(&class_body(&["RES".into(), "LND".into()])).unwrap();
        let ResponseBody::Classifications(set) = &parsed.body else {
            panic!("expected classifications");
        };
        assert_eq!(set.len(), 2);
        assert_eq!(set.resource.as_deref(), Some("Property"));

        let xml = "<RETS ReplyCode=\"0\"><METADATA><METADATA-RESOURCE>\
            <Resource><ResourceID>Property</ResourceID></Resource>\
            </METADATA-RESOURCE></METADATA></RETS>";
        let parsed = parse(xml).unwrap();
        assert_eq!(parsed.kind(), "resources");
        assert_eq!(parsed.text, "");

        let xml = "<RETS ReplyCode=\"0\"><METADATA><METADATA-TABLE Resource=\"Property\" Class=\"RES\">\
            <Field><SystemName>ListPrice</SystemName></Field>\
            </METADATA-TABLE></METADATA></RETS>";
        assert_eq!(parse(xml).unwrap().kind(), "fields");
    }

    #[test]
    fn test_unknown_metadata_subtype() {
        let xml = "<RETS ReplyCode=\"0\" ReplyText=\"ok\"><METADATA>\
            <METADATA-LOOKUP_TYPE/></METADATA></RETS>";
        let err = parse(xml).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnknownMetadataSubtype("METADATA-LOOKUP_TYPE".to_string())
        );
        assert_eq!(err.code, Some(0));
    }

    #[test]
    fn test_status_and_count_only() {
        let parsed = parse("<RETS ReplyCode=\"0\" ReplyText=\"ok\"><RETS-STATUS ReplyCode=\"0\"/></RETS>")
            .unwrap();
        assert_eq!(parsed.body, ResponseBody::Status);

        let parsed = parse("<RETS ReplyCode=\"0\"><COUNT Records=\"1432\"/></RETS>").unwrap();
        let ResponseBody::Data(data) = parsed.body else {
            panic!("expected data");
        };
        assert_eq!(data.format, DataFormat::CountOnly);
        assert_eq!(data.count, Some(1432));
    }

    #[test]
    fn test_compact_needs_data_rows() {
        // Header without rows falls through to the COUNT check
        let parsed = parse(
            "<RETS ReplyCode=\"0\"><COUNT Records=\"0\"/><COLUMNS>\tListingID\t</COLUMNS></RETS>",
        )
        .unwrap();
        let ResponseBody::Data(data) = parsed.body else {
            panic!("expected data");
        };
        assert_eq!(data.format, DataFormat::CountOnly);
        assert!(data.columns.is_empty());

        let err = parse("<RETS ReplyCode=\"0\"><COLUMNS>\tListingID\t</COLUMNS></RETS>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnrecognizedResponseShape);
    }

    #[test]
    fn test_root_and_code_errors() {
        assert_eq!(
            parse("<html><body>502</body></html>").unwrap_err().kind,
            ParseErrorKind::MissingRetsRoot
        );
        let err = parse("<RETS ReplyText=\"x\"/>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingReplyCode);
        assert_eq!(err.text.as_deref(), Some("x"));
        assert_eq!(
            parse("<RETS ReplyCode=\"0\"/>").unwrap_err().kind,
            ParseErrorKind::UnrecognizedResponseShape
        );
    }

    #[test]
    fn test_unknown_nonzero_code_without_shape() {
        let parsed = parse("<RETS ReplyCode=\"20400\" ReplyText=\"Invalid Resource\"/>").unwrap();
        let ResponseBody::Error(reply) = parsed.body else {
            panic!("expected error variant");
        };
        assert_eq!(reply.kind, QueryErrorKind::Other);
        assert_eq!(reply.code, 20400);
    }

    #[test]
    fn test_malformed_xml() {
        for body in ["", "<RETS ReplyCode=\"0\">", "<RETS><A></B></RETS>", "not xml at all"] {
            let err = parse(body).unwrap_err();
            assert!(matches!(err.kind, ParseErrorKind::XmlSyntax(_)), "{body:?}");
            assert_eq!(err.code, None);
        }
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(parse(LOGIN).unwrap()).unwrap();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"]["MemberName"], "Acme Realty");
    }

    proptest! {
        #[test]
        fn prop_class_count_matches(names in proptest::collection::hash_set("[A-Z]{1,6}", 0..20)) {
            let names: Vec<String> = names.into_iter().collect();
            let ResponseBody::Classifications(set) = parse(&class_body(&names)).unwrap().body else {
                panic!("expected classifications");
            };
            prop_assert_eq!(set.len(), names.len());
            for name in &names {
                prop_assert!(set.get(name).is_some());
            }
        }

        #[test]
        fn prop_parse_is_idempotent(body in "(<RETS ReplyCode=\"[0-9]{1,5}\">)?[<>/A-Z= \t\n]{0,40}(</RETS>)?") {
            prop_assert_eq!(parse(&body), parse(&body));
        }

        #[test]
        fn prop_parse_is_idempotent_for_compact(rows in proptest::collection::vec("[a-z0-9]{0,8}", 1..10)) {
            let data: String = rows.iter().map(|r| format!("<DATA>\t{r}\t</DATA>")).collect();
            let body = format!("<RETS ReplyCode=\"0\"><COLUMNS>\tC\t</COLUMNS>{data}</RETS>");
            let first = parse(&body).unwrap();
            prop_assert_eq!(&first, &parse(&body).unwrap());
            let ResponseBody::Data(set) = first.body else {
                panic!("expected data");
            };
            prop_assert_eq!(set.len(), rows.len());
        }
    }
}
