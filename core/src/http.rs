//! HTTP message model shared by every layer of the engine.
//!
//! # Design
//! `Request` is the caller-facing description of an exchange. It is owned by
//! the caller and is treated as immutable once a task has translated it.
//! `Response` is the parsed head of a reply paired with the URL that was
//! actually requested. Bodies never live on `Response`; they flow through a
//! drain or a delegate instead.
//!
//! `HeaderMap` keeps insertion order and compares names case-insensitively.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

/// HTTP method of a `Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
    Options,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }

    /// Parse a method token. Tokens are case-sensitive, as on the wire.
    pub fn from_token(token: &str) -> Option<Self> {
        let method = match token {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "PATCH" => HttpMethod::Patch,
            "OPTIONS" => HttpMethod::Options,
            "TRACE" => HttpMethod::Trace,
            "CONNECT" => HttpMethod::Connect,
            _ => return None,
        };
        Some(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header collection with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any entry with the same name.
    ///
    /// The stored name is canonicalised (`x-test` becomes `X-Test`).
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => {
                self.entries[i] = (canonical_name(name), value);
            }
            None => self.entries.push((canonical_name(name), value)),
        }
    }

    /// Add `value` to `name`, comma-joining onto an existing value.
    pub fn append(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) => {
                let existing = &mut self.entries[i].1;
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((canonical_name(name), value.to_string())),
        }
    }

    /// Add a header exactly as it was received, keeping its casing.
    /// Repeated names are comma-joined onto the first occurrence.
    pub fn insert_raw(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) => {
                let existing = &mut self.entries[i].1;
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, with their stored casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

/// Capitalise each dash-separated word of a header name.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

type StreamOpener = dyn Fn() -> std::io::Result<Box<dyn Read + Send>> + Send + Sync;

/// A pull-based request body.
///
/// Holds an opener rather than an open reader so the same body can be
/// streamed again when a caller retries. Two `BodyStream`s are equal only if
/// they share the same opener.
#[derive(Clone)]
pub struct BodyStream {
    opener: Arc<StreamOpener>,
}

impl BodyStream {
    pub fn new<F>(opener: F) -> Self
    where
        F: Fn() -> std::io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            opener: Arc::new(opener),
        }
    }

    /// Stream a copy of `data`. Mostly useful in tests.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self::new(move || Ok(Box::new(std::io::Cursor::new(data.clone())) as Box<dyn Read + Send>))
    }

    pub fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        (self.opener)()
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.opener) as *const ()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("opener", &self.identity())
            .finish()
    }
}

impl PartialEq for BodyStream {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for BodyStream {}

/// Request payload: a fixed buffer or a stream, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bytes(Bytes),
    Stream(BodyStream),
}

/// How a request may use cached responses. Carried through to the transport
/// untouched; this engine keeps no cache of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    UseProtocol,
    ReloadIgnoringCache,
    ReturnCacheElseLoad,
    ReturnCacheDontLoad,
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A caller-owned description of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    main_document_url: Option<Url>,
    method: HttpMethod,
    headers: HeaderMap,
    body: Option<RequestBody>,
    timeout: Duration,
    cache_policy: CachePolicy,
    allows_cellular: bool,
    handles_cookies: bool,
    uses_pipelining: bool,
}

impl Request {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            main_document_url: None,
            method: HttpMethod::Get,
            headers: HeaderMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            cache_policy: CachePolicy::default(),
            allows_cellular: true,
            handles_cookies: true,
            uses_pipelining: false,
        }
    }

    /// Parse `url` and build a GET request for it.
    pub fn get(url: &str) -> Result<Self, crate::SessionError> {
        Url::parse(url)
            .map(Self::new)
            .map_err(|e| crate::SessionError::InvalidUrl(format!("{url}: {e}")))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn main_document_url(&self) -> Option<&Url> {
        self.main_document_url.as_ref()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn allows_cellular(&self) -> bool {
        self.allows_cellular
    }

    pub fn handles_cookies(&self) -> bool {
        self.handles_cookies
    }

    pub fn uses_pipelining(&self) -> bool {
        self.uses_pipelining
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    pub fn with_body_stream(mut self, stream: BodyStream) -> Self {
        self.set_body_stream(stream);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn set_main_document_url(&mut self, url: Option<Url>) {
        self.main_document_url = url;
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        self.method = method;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    /// Install a fixed body, dropping any body stream.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(RequestBody::Bytes(body.into()));
    }

    /// Install a body stream, dropping any fixed body.
    pub fn set_body_stream(&mut self, stream: BodyStream) {
        self.body = Some(RequestBody::Stream(stream));
    }

    pub fn clear_body(&mut self) {
        self.body = None;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.cache_policy = policy;
    }

    pub fn set_allows_cellular(&mut self, allow: bool) {
        self.allows_cellular = allow;
    }

    pub fn set_handles_cookies(&mut self, handle: bool) {
        self.handles_cookies = handle;
    }

    pub fn set_uses_pipelining(&mut self, pipeline: bool) {
        self.uses_pipelining = pipeline;
    }

    fn body_stream_identity(&self) -> Option<*const ()> {
        match &self.body {
            Some(RequestBody::Stream(s)) => Some(s.identity()),
            _ => None,
        }
    }
}

// Identity covers where and how a request goes, not its payload.
impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.main_document_url == other.main_document_url
            && self.method == other.method
            && self.body_stream_identity() == other.body_stream_identity()
            && self.allows_cellular == other.allows_cellular
            && self.handles_cookies == other.handles_cookies
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.main_document_url.hash(state);
        self.method.hash(state);
        self.body_stream_identity().hash(state);
        self.allows_cellular.hash(state);
        self.handles_cookies.hash(state);
    }
}

/// Parsed response head, paired with the URL it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status_code: u16,
    pub version: String,
    pub reason: String,
    pub headers: HeaderMap,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
