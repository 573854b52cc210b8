//! RETS session state machine.
//!
//! Owns everything that is per-conversation: the digest challenge and nonce
//! counter, the cookie jar, the capability URLs from the login banner and
//! the request id / version echoed in the User-Agent digest.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use reqwest::Url;
use serde::Serialize;
use tokio::sync::broadcast;

use super::capabilities::{Capability, CapabilityUrls, MetadataInfo, ProviderInfo, ServerInfo};
use super::events::SessionEvent;
use super::query::{MetadataType, ObjectRequest, QueryArgs, SearchQuery};
use super::SESSION_COOKIE;
use crate::auth::{
    compose_authorization, compute_vendor_digest, generate_cnonce, parse_auth_params,
    ua_authorization_header, AuthError, Challenge, Credentials, NonceCounter,
};
use crate::config::Settings;
use crate::error::{Result, RetsError};
use crate::response::{self, DataSet, MetadataSet, ParsedResponse, ReplyError, ResponseBody};
use crate::transport::{
    CookieJar, HeaderList, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    TransportError,
};

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 64;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No login attempted yet
    Unauthenticated,
    /// Login handshake in progress
    Authenticating,
    /// Logged in, idle
    Authenticated,
    /// Logged in, request in flight
    Requesting,
    /// Login failed; may be retried with [`Session::login`]
    Failed,
    /// Closed; terminal
    Closed,
}

impl SessionState {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Requesting => "requesting",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a Search transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// RETS reply code
    pub code: u32,
    /// RETS reply text
    pub text: String,
    /// Rows (empty when the query failed or matched nothing)
    pub data: DataSet,
    /// Recoverable query error reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_error: Option<ReplyError>,
}

/// Payload of a GetObject transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectResponse {
    /// `Content-Type`
    pub content_type: Option<String>,
    /// `Content-ID`
    pub content_id: Option<String>,
    /// `Object-ID`
    pub object_id: Option<String>,
    /// `Location`, when a URL was requested
    pub location: Option<String>,
    /// Raw body (image bytes or a multipart document)
    pub body: Bytes,
}

/// One authenticated conversation with a RETS server.
///
/// All operations take `&mut self`, so a session never has more than one
/// exchange in flight. Share it between tasks with
/// [`SharedSession`](crate::SharedSession).
pub struct Session<T: HttpTransport = ReqwestTransport> {
    settings: Settings,
    transport: T,
    credentials: Credentials,
    state: SessionState,
    challenge: Option<Challenge>,
    basic_realm: Option<String>,
    nonce_count: NonceCounter,
    cnonce: String,
    cookies: CookieJar,
    version: String,
    request_id: Option<String>,
    capabilities: CapabilityUrls,
    provider: ProviderInfo,
    metadata: MetadataInfo,
    server: ServerInfo,
    events: broadcast::Sender<SessionEvent>,
}

impl Session<ReqwestTransport> {
    /// Session over the default reqwest transport.
    pub fn new(settings: Settings) -> Result<Self> {
        let transport = ReqwestTransport::new(&settings.transport)?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: HttpTransport> Session<T> {
    /// Session over a caller-supplied transport.
    pub fn with_transport(settings: Settings, transport: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials: Credentials::new(&settings.user, &settings.pass),
            version: settings.version_header(),
            request_id: settings.request_id.clone(),
            settings,
            transport,
            state: SessionState::Unauthenticated,
            challenge: None,
            basic_realm: None,
            nonce_count: NonceCounter::new(),
            cnonce: generate_cnonce(),
            cookies: CookieJar::new(),
            capabilities: CapabilityUrls::default(),
            provider: ProviderInfo::default(),
            metadata: MetadataInfo::default(),
            server: ServerInfo::default(),
            events,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if logged in
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Requesting
        )
    }

    /// Connection settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Capability URLs from the last successful login
    pub fn capabilities(&self) -> &CapabilityUrls {
        &self.capabilities
    }

    /// Member identity from the login banner
    pub fn provider(&self) -> &ProviderInfo {
        &self.provider
    }

    /// Metadata descriptors from the login banner
    pub fn metadata_info(&self) -> &MetadataInfo {
        &self.metadata
    }

    /// Server identification headers
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Value of the `RETS-Session-ID` cookie
    pub fn session_id(&self) -> Option<&str> {
        self.cookies.get(SESSION_COOKIE)
    }

    /// Cookies replayed on every request
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Current `RETS-Request-ID`
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Protocol version sent in `RETS-Version` (updated from responses)
    pub fn rets_version(&self) -> &str {
        &self.version
    }

    /// Last digest nonce-count issued (0 before the first authenticated request)
    pub fn nonce_count(&self) -> u32 {
        self.nonce_count.current()
    }

    /// Realm of a `Basic` challenge the server offered, if any
    pub fn basic_challenge(&self) -> Option<&str> {
        self.basic_realm.as_deref()
    }

    /// Transport in use
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Run the login handshake.
    ///
    /// Allowed from any state but [`SessionState::Closed`]. On failure the
    /// session is [`SessionState::Failed`] and holds no capability URLs.
    pub async fn login(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(RetsError::SessionClosed);
        }

        self.state = SessionState::Authenticating;
        self.capabilities = CapabilityUrls::default();

        match self.handshake().await {
            Ok(banner) => {
                self.capabilities = CapabilityUrls::from_banner(&banner);
                self.provider = ProviderInfo::from_banner(&banner);
                self.metadata = MetadataInfo::from_banner(&banner);
                self.state = SessionState::Authenticated;

                tracing::info!(
                    member = self.provider.name.as_deref().unwrap_or("-"),
                    capabilities = self.capabilities.len(),
                    "RETS login successful"
                );
                self.emit(SessionEvent::Connected {
                    member_name: self.provider.name.clone(),
                });
                Ok(())
            },
            Err(err) => {
                self.state = SessionState::Failed;
                tracing::warn!("RETS login failed: {err}");
                self.emit(login_failure_event(&err));
                Err(err)
            },
        }
    }

    /// Probe, answer the challenge, and classify the banner.
    async fn handshake(&mut self) -> Result<std::collections::BTreeMap<String, String>> {
        let url = self.settings.login_url()?;
        self.challenge = None;

        let response = match self.exchange(&url, false).await {
            Ok(response) => response,
            Err(RetsError::Transport(TransportError::Connection {
                status: 401,
                headers,
                ..
            })) => {
                self.challenge = Some(self.select_challenge(&headers)?);
                self.exchange(&url, true).await?
            },
            Err(err) => return Err(err),
        };

        let parsed = response::parse(&response.body_text())?;
        match parsed.body {
            ResponseBody::Connection(banner) if parsed.code == response::codes::SUCCESS => {
                Ok(banner)
            },
            ResponseBody::Connection(_) | ResponseBody::Error(_) => Err(RetsError::LoginRejected {
                code: parsed.code,
                text: parsed.text,
            }),
            other => Err(RetsError::UnexpectedResponse {
                expected: "connection",
                found: other.kind(),
                code: parsed.code,
                text: parsed.text,
            }),
        }
    }

    /// Pick the Digest challenge out of the `WWW-Authenticate` headers.
    fn select_challenge(&mut self, headers: &HeaderList) -> Result<Challenge> {
        let mut failure = AuthError::MalformedChallenge("missing WWW-Authenticate".to_string());
        for value in headers.get_all("WWW-Authenticate") {
            match Challenge::parse(Some(value)) {
                Ok(challenge) => return Ok(challenge),
                Err(err @ AuthError::UnsupportedScheme(_)) => {
                    self.basic_realm = Some(basic_realm(value));
                    failure = err;
                },
                Err(err) => {
                    if !matches!(failure, AuthError::UnsupportedScheme(_)) {
                        failure = err;
                    }
                },
            }
        }
        Err(failure.into())
    }

    /// Log in again after the server dropped the session.
    async fn reauthenticate(&mut self) -> Result<()> {
        tracing::info!("RETS session rejected (401); logging in again");
        self.cookies.clear();
        self.login().await
    }

    /// Perform one GET, updating session state from the response headers.
    async fn exchange(&mut self, url: &Url, authorize: bool) -> Result<HttpResponse> {
        let headers = self.request_headers(url, authorize)?;
        let request = HttpRequest::get(url.as_str()).with_headers(headers);

        match self.transport.send(request).await {
            Ok(response) => {
                self.absorb_headers(&response.headers);
                Ok(response)
            },
            Err(err) => {
                if let TransportError::Connection { headers, .. } = &err {
                    self.absorb_headers(headers);
                }
                Err(err.into())
            },
        }
    }

    fn request_headers(&mut self, url: &Url, authorize: bool) -> Result<HeaderList> {
        let mut headers = HeaderList::new()
            .with("User-Agent", &self.settings.agent.user)
            .with("RETS-Version", &self.version)
            .with("Accept", "*/*");

        if let Some(cookie) = self.cookies.header_value() {
            headers.push("Cookie", cookie);
        }
        if let Some(request_id) = &self.request_id {
            headers.push("RETS-Request-ID", request_id);
        }
        if self.settings.send_session_header {
            if let Some(session_id) = self.session_id() {
                headers.push("RETS-Session-ID", session_id);
            }
        }
        if let Some(agent_password) = &self.settings.agent.password {
            let digest = compute_vendor_digest(
                self.settings.ua_digest,
                &self.settings.agent.user,
                agent_password,
                self.request_id.as_deref().unwrap_or_default(),
                self.session_id().unwrap_or_default(),
                &self.version,
            );
            headers.push("RETS-UA-Authorization", ua_authorization_header(&digest));
        }

        if authorize {
            let challenge = match &self.challenge {
                Some(challenge) => challenge,
                None if self.basic_realm.is_some() => {
                    return Err(AuthError::UnsupportedScheme("Basic".to_string()).into())
                },
                None => {
                    return Err(AuthError::MalformedChallenge(
                        "no challenge received".to_string(),
                    )
                    .into())
                },
            };
            let uri = match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            };
            let nc = self.nonce_count.next_nonce_count();
            headers.push(
                "Authorization",
                compose_authorization(
                    challenge,
                    &self.credentials,
                    "GET",
                    &uri,
                    &nc,
                    &self.cnonce,
                ),
            );
        }

        Ok(headers)
    }

    fn absorb_headers(&mut self, headers: &HeaderList) {
        self.cookies.absorb(headers.set_cookies());
        if let Some(version) = headers.get("RETS-Version") {
            let version = version.trim();
            if !version.is_empty() && version != self.version {
                tracing::debug!(version, "server RETS version");
                self.version = version.to_string();
            }
        }
        if let Some(request_id) = headers.get("RETS-Request-ID") {
            self.request_id = Some(request_id.trim().to_string());
        }
        self.server.update(headers);
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Authenticated | SessionState::Requesting => Ok(()),
            SessionState::Closed => Err(RetsError::SessionClosed),
            other => Err(RetsError::NotAuthenticated(other.to_string())),
        }
    }

    fn capability_url(&self, capability: Capability, args: &QueryArgs) -> Result<Url> {
        let location = self
            .capabilities
            .get(capability)
            .ok_or_else(|| RetsError::UnknownCapability(capability.to_string()))?;
        let mut url = self.settings.resolve(location)?;
        args.apply_to(&mut url);
        Ok(url)
    }

    /// Issue a capability request, re-authenticating once on HTTP 401.
    async fn dispatch(&mut self, capability: Capability, args: &QueryArgs) -> Result<HttpResponse> {
        self.ensure_ready()?;
        let mut url = self.capability_url(capability, args)?;
        let mut retried = false;

        self.state = SessionState::Requesting;
        tracing::debug!(%capability, "RETS request");

        loop {
            match self.exchange(&url, true).await {
                Ok(response) => {
                    self.state = SessionState::Authenticated;
                    return Ok(response);
                },
                Err(RetsError::Transport(err)) if err.is_unauthorized() && !retried => {
                    retried = true;
                    self.reauthenticate().await?;
                    url = self.capability_url(capability, args)?;
                    self.state = SessionState::Requesting;
                },
                Err(err) => {
                    self.state = SessionState::Authenticated;
                    self.emit(SessionEvent::RequestError {
                        capability,
                        message: err.to_string(),
                    });
                    return Err(err);
                },
            }
        }
    }

    /// Call a capability with `args` and classify the reply.
    pub async fn request(&mut self, capability: Capability, args: QueryArgs) -> Result<ParsedResponse> {
        let response = self.dispatch(capability, &args).await?;

        match response::parse(&response.body_text()) {
            Ok(parsed) => {
                self.emit(SessionEvent::RequestComplete {
                    capability,
                    kind: parsed.kind(),
                });
                Ok(parsed)
            },
            Err(err) => {
                tracing::warn!(%capability, "unparseable RETS response: {err}");
                self.emit(SessionEvent::RequestParseError {
                    capability,
                    message: err.to_string(),
                });
                Err(err.into())
            },
        }
    }

    /// [`request`](Self::request), giving up locally when `cancel` completes first.
    ///
    /// The server may still process the request; RETS has no cancel transaction.
    pub async fn request_with_cancel<F>(
        &mut self,
        capability: Capability,
        args: QueryArgs,
        cancel: F,
    ) -> Result<ParsedResponse>
    where
        F: Future<Output = ()>,
    {
        // A cancel can land mid re-login, after login() cleared the banner
        let state = self.state;
        let challenge = self.challenge.clone();
        let capabilities = self.capabilities.clone();
        let provider = self.provider.clone();
        let metadata = self.metadata.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancel => None,
            result = self.request(capability, args) => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                if matches!(
                    self.state,
                    SessionState::Requesting | SessionState::Authenticating
                ) {
                    self.state = state;
                    self.challenge = challenge;
                    self.capabilities = capabilities;
                    self.provider = provider;
                    self.metadata = metadata;
                }
                self.emit(SessionEvent::RequestError {
                    capability,
                    message: RetsError::Cancelled.to_string(),
                });
                Err(RetsError::Cancelled)
            },
        }
    }

    /// Run a Search.
    ///
    /// "No records found" is an empty result, and unknown-field / bad-query
    /// replies come back in [`SearchResult::query_error`].
    pub async fn search(&mut self, query: SearchQuery) -> Result<SearchResult> {
        let parsed = self.request(Capability::Search, query.to_args()).await?;
        match parsed.body {
            ResponseBody::Data(data) => Ok(SearchResult {
                code: parsed.code,
                text: parsed.text,
                data,
                query_error: None,
            }),
            ResponseBody::Error(reply) => Ok(SearchResult {
                code: parsed.code,
                text: parsed.text,
                data: reply.partial.clone().unwrap_or_else(DataSet::no_records),
                query_error: Some(reply),
            }),
            other => Err(RetsError::UnexpectedResponse {
                expected: "data",
                found: other.kind(),
                code: parsed.code,
                text: parsed.text,
            }),
        }
    }

    /// Fetch one metadata table.
    pub async fn get_metadata(&mut self, metadata_type: MetadataType, id: &str) -> Result<ParsedResponse> {
        let parsed = self
            .request(Capability::GetMetadata, metadata_type.to_args(id))
            .await?;
        match parsed.body {
            ResponseBody::Classifications(_)
            | ResponseBody::Resources(_)
            | ResponseBody::Fields(_)
            | ResponseBody::Error(_) => Ok(parsed),
            ref other => Err(RetsError::UnexpectedResponse {
                expected: "metadata",
                found: other.kind(),
                code: parsed.code,
                text: parsed.text.clone(),
            }),
        }
    }

    /// `METADATA-RESOURCE` for all resources.
    pub async fn get_resources(&mut self) -> Result<MetadataSet> {
        let parsed = self.get_metadata(MetadataType::Resource, "0").await?;
        expect_table(parsed, "resources", |body| match body {
            ResponseBody::Resources(set) => Ok(set),
            other => Err(other),
        })
    }

    /// `METADATA-CLASS` for `resource` (default `Property`).
    pub async fn get_classifications(&mut self, resource: Option<&str>) -> Result<MetadataSet> {
        let parsed = self
            .get_metadata(MetadataType::Class, resource.unwrap_or("Property"))
            .await?;
        expect_table(parsed, "classifications", |body| match body {
            ResponseBody::Classifications(set) => Ok(set),
            other => Err(other),
        })
    }

    /// `METADATA-TABLE` for `resource:class`.
    pub async fn get_table(&mut self, resource: &str, class: &str) -> Result<MetadataSet> {
        let parsed = self
            .get_metadata(MetadataType::Table, &format!("{resource}:{class}"))
            .await?;
        expect_table(parsed, "fields", |body| match body {
            ResponseBody::Fields(set) => Ok(set),
            other => Err(other),
        })
    }

    /// Fetch an object (photo, document) or its location.
    pub async fn get_object(&mut self, request: ObjectRequest) -> Result<ObjectResponse> {
        let capability = Capability::GetObject;
        let response = self.dispatch(capability, &request.to_args()).await?;
        let header = |name: &str| response.headers.get(name).map(str::to_string);
        let content_type = header("Content-Type");

        let is_xml = content_type
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().contains("xml"));
        if is_xml {
            match response::parse(&response.body_text()) {
                Ok(parsed) if !parsed.is_success() => {
                    self.emit(SessionEvent::RequestComplete {
                        capability,
                        kind: parsed.kind(),
                    });
                    return Err(RetsError::UnexpectedResponse {
                        expected: "object",
                        found: parsed.kind(),
                        code: parsed.code,
                        text: parsed.text,
                    });
                },
                Err(err) if err.code.is_some() => {
                    self.emit(SessionEvent::RequestParseError {
                        capability,
                        message: err.to_string(),
                    });
                    return Err(err.into());
                },
                _ => {},
            }
        }

        self.emit(SessionEvent::RequestComplete {
            capability,
            kind: "object",
        });

        Ok(ObjectResponse {
            content_id: header("Content-ID"),
            object_id: header("Object-ID"),
            location: header("Location"),
            content_type,
            body: response.body,
        })
    }

    /// Call Logout (when advertised) and close the session.
    ///
    /// The session is closed even when the Logout call fails.
    pub async fn logout(&mut self) -> Result<Option<ParsedResponse>> {
        let result = if self.is_authenticated() && self.capabilities.contains(Capability::Logout) {
            self.request(Capability::Logout, QueryArgs::new())
                .await
                .map(Some)
        } else {
            Ok(None)
        };
        self.close();
        result
    }

    /// Close the session. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.capabilities = CapabilityUrls::default();
        self.challenge = None;
        self.cookies.clear();
        tracing::debug!("RETS session closed");
        self.emit(SessionEvent::Closed);
    }
}

impl<T: HttpTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("host", &self.settings.host)
            .field("user", &self.settings.user)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn expect_table(
    parsed: ParsedResponse,
    expected: &'static str,
    select: impl FnOnce(ResponseBody) -> std::result::Result<MetadataSet, ResponseBody>,
) -> Result<MetadataSet> {
    let (code, text) = (parsed.code, parsed.text);
    select(parsed.body).map_err(|other| RetsError::UnexpectedResponse {
        expected,
        found: other.kind(),
        code,
        text,
    })
}

fn basic_realm(header: &str) -> String {
    let params = header.trim().split_once(char::is_whitespace).map_or("", |(_, p)| p);
    parse_auth_params(params)
        .into_iter()
        .find(|(key, _)| key == "realm")
        .map(|(_, value)| value)
        .unwrap_or_default()
}

fn login_failure_event(err: &RetsError) -> SessionEvent {
    match err {
        RetsError::Transport(transport) if transport.is_reset() => SessionEvent::ConnectionClosed {
            message: err.to_string(),
        },
        RetsError::Parse(_) | RetsError::UnexpectedResponse { .. } => {
            SessionEvent::ConnectionParseError {
                message: err.to_string(),
            }
        },
        _ => SessionEvent::ConnectionError {
            message: err.to_string(),
            http_status: err.http_status(),
            reply_code: err.reply_code(),
        },
    }
}
