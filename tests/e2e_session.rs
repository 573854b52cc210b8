//! End-to-end session tests.
//!
//! A small mock RETS server (axum) enforces HTTP Digest with `qop=auth`, the
//! session cookie and the User-Agent digest, so these tests exercise the
//! whole stack: settings, reqwest transport, digest headers, cookie
//! replay, response classification and the 401 re-login path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use md5::{Digest, Md5};
use rets::{
    connect, AgentSettings, Capability, DataFormat, ObjectRequest, ResponseBody, RetsError,
    SearchFormat, SearchQuery, Session, SessionEvent, SessionState, Settings,
};

const REALM: &str = "rets@mock.test";
const USER: &str = "jdoe";
const PASS: &str = "secret";
const AGENT: &str = "MockAgent/1.0";
const AGENT_PASS: &str = "agentpass";

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Mock server state
struct MockRets {
    nonce: String,
    session_id: Mutex<String>,
    logins: AtomicUsize,
    expire_session: AtomicBool,
    nonce_counts: Mutex<Vec<String>>,
    ua_checked: AtomicUsize,
}

impl MockRets {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string(),
            session_id: Mutex::new(String::new()),
            logins: AtomicUsize::new(0),
            expire_session: AtomicBool::new(false),
            nonce_counts: Mutex::new(Vec::new()),
            ua_checked: AtomicUsize::new(0),
        })
    }

    fn challenge(&self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                format!(
                    r#"Digest realm="{REALM}", nonce="{}", opaque="5ccc069c403ebaf9f0171e9517f40e41", qop="auth""#,
                    self.nonce
                ),
            )],
            "<html>Unauthorized</html>",
        )
            .into_response()
    }

    /// Verify the Digest and User-Agent headers against `uri`.
    fn verify(&self, headers: &HeaderMap, uri: &Uri) -> bool {
        let Some(auth) = header_str(headers, "authorization") else {
            return false;
        };
        let params = digest_params(auth);
        let expected_uri = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        if params.get("uri").map(String::as_str) != Some(expected_uri)
            || params.get("nonce") != Some(&self.nonce)
            || params.get("username").map(String::as_str) != Some(USER)
        {
            return false;
        }

        let nc = params.get("nc").cloned().unwrap_or_default();
        let ha1 = md5_hex(&format!("{USER}:{REALM}:{PASS}"));
        let ha2 = md5_hex(&format!("GET:{expected_uri}"));
        let response = md5_hex(&format!(
            "{ha1}:{}:{nc}:{}:auth:{ha2}",
            self.nonce,
            params.get("cnonce").cloned().unwrap_or_default()
        ));
        if params.get("response") != Some(&response) {
            return false;
        }

        if let Some(ua) = header_str(headers, "rets-ua-authorization") {
            let version = header_str(headers, "rets-version").unwrap_or_default();
            let session = cookie_value(headers, "RETS-Session-ID").unwrap_or_default();
            let a1 = md5_hex(&format!("{AGENT}:{AGENT_PASS}"));
            let expected = md5_hex(&format!("{a1}::{session}:{version}"));
            if ua != format!("Digest {expected}") {
                return false;
            }
            self.ua_checked.fetch_add(1, Ordering::SeqCst);
        }

        self.nonce_counts.lock().unwrap().push(nc);
        true
    }

    fn session_valid(&self, headers: &HeaderMap) -> bool {
        if self.expire_session.swap(false, Ordering::SeqCst) {
            return false;
        }
        let current = self.session_id.lock().unwrap().clone();
        !current.is_empty() && cookie_value(headers, "RETS-Session-ID").as_deref() == Some(&current)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, "cookie")?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

fn digest_params(header: &str) -> HashMap<String, String> {
    header
        .trim_start_matches("Digest ")
        .split(", ")
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

fn xml(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/xml"),
            (header::SERVER, "MockRETS/0.1"),
        ],
        body,
    )
        .into_response()
}

async fn login(State(state): State<Arc<MockRets>>, headers: HeaderMap, uri: Uri) -> Response {
    if !state.verify(&headers, &uri) {
        return state.challenge();
    }
    let count = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let session_id = format!("session{count}");
    *state.session_id.lock().unwrap() = session_id.clone();

    let banner = "<RETS ReplyCode=\"0\" ReplyText=\"Operation Successful\">\r\n\
        <RETS-RESPONSE>\r\n\
        MemberName=Acme Realty\r\n\
        User=jdoe,0,IDX Vendor,jdoe\r\n\
        Broker=ACME\r\n\
        MetadataVersion=1.00.000\r\n\
        MinMetadataVersion=1.00.000\r\n\
        TimeoutSeconds=1800\r\n\
        Search=/rets/search\r\n\
        GetMetadata=/rets/getmetadata\r\n\
        GetObject=/rets/getobject\r\n\
        Logout=/rets/logout\r\n\
        </RETS-RESPONSE>\r\n\
        </RETS>";

    (
        [
            (header::SET_COOKIE, format!("RETS-Session-ID={session_id}; path=/")),
            (header::CONTENT_TYPE, "text/xml".to_string()),
            (header::HeaderName::from_static("rets-version"), "RETS/1.7.2".to_string()),
        ],
        banner,
    )
        .into_response()
}

async fn search(
    State(state): State<Arc<MockRets>>,
    Query(args): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if !state.verify(&headers, &uri) || !state.session_valid(&headers) {
        return state.challenge();
    }

    let query = args.get("Query").cloned().unwrap_or_default();
    if query.contains("Bogus") {
        return xml("<RETS ReplyCode=\"20206\" ReplyText=\"Invalid Query Syntax\"/>".to_string());
    }
    if query.contains("Nothing") {
        return xml("<RETS ReplyCode=\"20201\" ReplyText=\"No Records Found\"/>".to_string());
    }
    if args.get("Count").map(String::as_str) == Some("2") {
        return xml("<RETS ReplyCode=\"0\" ReplyText=\"ok\"><COUNT Records=\"42\"/></RETS>".to_string());
    }

    match args.get("Format").map(String::as_str) {
        Some("STANDARD-XML") => xml(
            "<RETS ReplyCode=\"0\" ReplyText=\"ok\"><COUNT Records=\"1\"/><REData><REProperties>\
             <ResidentialProperty><Listing><ListingID>L1</ListingID><ListPrice>350000</ListPrice></Listing></ResidentialProperty>\
             </REProperties></REData></RETS>"
                .to_string(),
        ),
        _ => xml(format!(
            "<RETS ReplyCode=\"0\" ReplyText=\"ok\"><COUNT Records=\"2\"/><DELIMITER value=\"09\"/>\
             <COLUMNS>\tListingID\tListPrice\t</COLUMNS>\
             <DATA>\tL1\t350000\t</DATA><DATA>\tL2\t{}\t</DATA></RETS>",
            args.get("Class").cloned().unwrap_or_default()
        )),
    }
}

async fn metadata(
    State(state): State<Arc<MockRets>>,
    Query(args): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if !state.verify(&headers, &uri) || !state.session_valid(&headers) {
        return state.challenge();
    }
    let body = match args.get("Type").map(String::as_str) {
        Some("METADATA-RESOURCE") => "<METADATA-RESOURCE Version=\"1.00.000\">\
             <Resource><ResourceID>Property</ResourceID></Resource>\
             <Resource><ResourceID>Agent</ResourceID></Resource></METADATA-RESOURCE>"
            .to_string(),
        Some("METADATA-CLASS") => format!(
            "<METADATA-CLASS Resource=\"{}\"><Class><ClassName>RES</ClassName></Class>\
             <Class><ClassName>LND</ClassName></Class><Class><ClassName>COM</ClassName></Class>\
             </METADATA-CLASS>",
            args.get("ID").cloned().unwrap_or_default()
        ),
        Some("METADATA-TABLE") => "<METADATA-TABLE Resource=\"Property\" Class=\"RES\">\
             <Field><SystemName>ListPrice</SystemName><DataType>Decimal</DataType></Field>\
             </METADATA-TABLE>"
            .to_string(),
        _ => "<METADATA-LOOKUP_TYPE/>".to_string(),
    };
    xml(format!(
        "<RETS ReplyCode=\"0\" ReplyText=\"ok\"><METADATA>{body}</METADATA></RETS>"
    ))
}

async fn object(
    State(state): State<Arc<MockRets>>,
    Query(args): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if !state.verify(&headers, &uri) || !state.session_valid(&headers) {
        return state.challenge();
    }
    let id = args.get("ID").cloned().unwrap_or_default();
    if id.starts_with("missing") {
        return xml("<RETS ReplyCode=\"20403\" ReplyText=\"No Object Found\"/>".to_string());
    }
    let (content_id, object_id) = id.split_once(':').unwrap_or((id.as_str(), "1"));
    (
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::HeaderName::from_static("content-id"), content_id.to_string()),
            (header::HeaderName::from_static("object-id"), object_id.to_string()),
        ],
        vec![0xFF_u8, 0xD8, 0xFF, 0xE0],
    )
        .into_response()
}

async fn logout(State(state): State<Arc<MockRets>>, headers: HeaderMap, uri: Uri) -> Response {
    if !state.verify(&headers, &uri) {
        return state.challenge();
    }
    state.session_id.lock().unwrap().clear();
    xml("<RETS ReplyCode=\"0\" ReplyText=\"Logged out\"><RETS-RESPONSE>\nConnectTime=12\n</RETS-RESPONSE></RETS>".to_string())
}

async fn spawn_mock() -> (SocketAddr, Arc<MockRets>) {
    let state = MockRets::new();
    let router = Router::new()
        .route("/rets/login", get(login))
        .route("/rets/search", get(search))
        .route("/rets/getmetadata", get(metadata))
        .route("/rets/getobject", get(object))
        .route("/rets/logout", get(logout))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (addr, state)
}

fn settings_for(addr: SocketAddr) -> Settings {
    let mut settings =
        Settings::from_login_url(&format!("http://{addr}/rets/login"), USER, PASS).unwrap();
    settings.agent = AgentSettings {
        user: AGENT.to_string(),
        password: Some(AGENT_PASS.to_string()),
    };
    settings
}

#[tokio::test]
async fn test_full_session() {
    let (addr, server) = spawn_mock().await;
    let mut session = connect(settings_for(addr)).await.unwrap();

    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.provider().name.as_deref(), Some("Acme Realty"));
    assert_eq!(session.provider().user_id(), Some("jdoe"));
    assert_eq!(session.session_id(), Some("session1"));
    assert_eq!(session.metadata_info().timeout_seconds, Some(1800));
    assert_eq!(session.rets_version(), "RETS/1.7.2");
    assert_eq!(session.server_info().content_type.as_deref(), Some("text/xml"));
    assert!(session.capabilities().contains(Capability::GetObject));
    assert!(!session.capabilities().contains(Capability::ChangePassword));

    let result = session
        .search(SearchQuery::new("Property", "RES", "(ListPrice=300000+)").format(SearchFormat::Compact))
        .await
        .unwrap();
    assert_eq!(result.code, 0);
    assert_eq!(result.data.format, DataFormat::Compact);
    assert_eq!(result.data.count, Some(2));
    assert_eq!(result.data.records[1]["ListPrice"], "RES");

    let result = session.search(SearchQuery::default()).await.unwrap();
    assert_eq!(result.data.format, DataFormat::StandardXml);
    assert_eq!(result.data.records[0]["Listing"]["ListPrice"], "350000");

    let resources = session.get_resources().await.unwrap();
    assert_eq!(resources.len(), 2);
    let classes = session.get_classifications(None).await.unwrap();
    assert_eq!(classes.len(), 3);
    assert_eq!(classes.resource.as_deref(), Some("Property"));
    let fields = session.get_table("Property", "RES").await.unwrap();
    assert_eq!(fields.get("ListPrice").unwrap()["DataType"], "Decimal");

    let photo = session
        .get_object(ObjectRequest::photo("Property", "L1").object_id("3"))
        .await
        .unwrap();
    assert_eq!(photo.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(photo.content_id.as_deref(), Some("L1"));
    assert_eq!(photo.object_id.as_deref(), Some("3"));
    assert_eq!(&photo.body[..2], &[0xFF, 0xD8]);

    let parsed = session.logout().await.unwrap().unwrap();
    assert!(matches!(parsed.body, ResponseBody::Connection(_)));
    assert_eq!(session.state(), SessionState::Closed);

    // login + 2 searches + 3 metadata + object + logout
    let counts = server.nonce_counts.lock().unwrap().clone();
    let expected: Vec<String> = (1..=8).map(|n| format!("{n:08}")).collect();
    assert_eq!(counts, expected);
    assert_eq!(server.ua_checked.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_stale_session_relogs_once() {
    let (addr, server) = spawn_mock().await;
    let mut session = connect(settings_for(addr)).await.unwrap();
    let mut events = session.subscribe();

    server.expire_session.store(true, Ordering::SeqCst);
    let result = session.search(SearchQuery::default()).await.unwrap();

    assert_eq!(result.data.len(), 1);
    assert_eq!(server.logins.load(Ordering::SeqCst), 2);
    assert_eq!(session.session_id(), Some("session2"));
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Connected { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::RequestComplete {
            capability: Capability::Search,
            kind: "data"
        }
    ));
}

#[tokio::test]
async fn test_query_errors_and_edge_results() {
    let (addr, _server) = spawn_mock().await;
    let mut session = connect(settings_for(addr)).await.unwrap();

    let result = session
        .search(SearchQuery::new("Property", "RES", "(Bogus=)"))
        .await
        .unwrap();
    assert_eq!(result.code, 20206);
    assert!(result.query_error.is_some());
    assert_eq!(session.state(), SessionState::Authenticated);

    let result = session
        .search(SearchQuery::new("Property", "RES", "(Nothing=1)"))
        .await
        .unwrap();
    assert_eq!(result.code, 20201);
    assert!(result.data.is_empty());
    assert!(result.query_error.is_none());

    let result = session
        .search(SearchQuery::default().count(rets::CountMode::CountOnly))
        .await
        .unwrap();
    assert_eq!(result.data.format, DataFormat::CountOnly);
    assert_eq!(result.data.count, Some(42));

    let err = session
        .get_object(ObjectRequest::photo("Property", "missing"))
        .await
        .unwrap_err();
    assert_eq!(err.reply_code(), Some(20403));

    let err = session
        .get_metadata(rets::MetadataType::Other("METADATA-LOOKUP_TYPE".into()), "Property:*")
        .await
        .unwrap_err();
    assert!(matches!(err, RetsError::Parse(_)));
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_wrong_password_fails_login() {
    let (addr, server) = spawn_mock().await;
    let mut settings = settings_for(addr);
    settings.pass = "wrong".to_string();

    let mut session = Session::new(settings).unwrap();
    let mut events = session.subscribe();
    let err = session.login().await.unwrap_err();

    assert_eq!(err.http_status(), Some(401));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.capabilities().is_empty());
    assert_eq!(server.logins.load(Ordering::SeqCst), 0);
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::ConnectionError {
            http_status: Some(401),
            ..
        }
    ));
}

#[tokio::test]
async fn test_shared_session_serializes_requests() {
    let (addr, server) = spawn_mock().await;
    let shared = rets::connect_shared(settings_for(addr)).await.unwrap();

    let mut handles = vec![];
    for _ in 0..5 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            let mut session = shared.lock().await;
            session.search(SearchQuery::default()).await.map(|r| r.data.len())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    let counts = server.nonce_counts.lock().unwrap().clone();
    let expected: Vec<String> = (1..=6).map(|n| format!("{n:08}")).collect();
    assert_eq!(counts, expected);
}
