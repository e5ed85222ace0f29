//! Conversion of a caller's `Request` into what the transport sends.
//!
//! # Design
//! Translation happens once, synchronously, when a task is resumed. Any
//! failure here fails the transfer before the transport sees it. The
//! timeout becomes an absolute deadline taken at that moment, so time spent
//! waiting for the transport to pick the request up counts against it.

use std::time::{Duration, Instant};

use bytes::Bytes;
use url::Url;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::http::{BodyStream, HeaderMap, HttpMethod, Request, RequestBody, DEFAULT_TIMEOUT};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Where deadlines land when `started_at + timeout` does not fit in an
/// `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The methods the transport can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl WireMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireMethod::Get => "GET",
            WireMethod::Post => "POST",
            WireMethod::Put => "PUT",
            WireMethod::Delete => "DELETE",
            WireMethod::Head => "HEAD",
        }
    }
}

impl TryFrom<HttpMethod> for WireMethod {
    type Error = SessionError;

    fn try_from(method: HttpMethod) -> Result<Self, Self::Error> {
        match method {
            HttpMethod::Get => Ok(WireMethod::Get),
            HttpMethod::Post => Ok(WireMethod::Post),
            HttpMethod::Put => Ok(WireMethod::Put),
            HttpMethod::Delete => Ok(WireMethod::Delete),
            HttpMethod::Head => Ok(WireMethod::Head),
            other => Err(SessionError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl From<WireMethod> for HttpMethod {
    fn from(method: WireMethod) -> Self {
        match method {
            WireMethod::Get => HttpMethod::Get,
            WireMethod::Post => HttpMethod::Post,
            WireMethod::Put => HttpMethod::Put,
            WireMethod::Delete => HttpMethod::Delete,
            WireMethod::Head => HttpMethod::Head,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WireBody {
    Empty,
    Fixed(Bytes),
    Streamed(BodyStream),
}

impl WireBody {
    /// Byte count when it is known up front.
    pub fn known_length(&self) -> Option<u64> {
        match self {
            WireBody::Empty => Some(0),
            WireBody::Fixed(b) => Some(b.len() as u64),
            WireBody::Streamed(_) => None,
        }
    }
}

impl From<WireBody> for Option<RequestBody> {
    fn from(body: WireBody) -> Self {
        match body {
            WireBody::Empty => None,
            WireBody::Fixed(b) => Some(RequestBody::Bytes(b)),
            WireBody::Streamed(s) => Some(RequestBody::Stream(s)),
        }
    }
}

/// A request as handed to the transport.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: WireMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: WireBody,
    pub deadline: Instant,
}

impl WireRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Applies session-wide header defaults while translating requests.
#[derive(Debug, Clone, Default)]
pub struct RequestTranslator {
    user_agent: Option<String>,
    additional_headers: HeaderMap,
}

impl RequestTranslator {
    pub fn new(config: &SessionConfig) -> Self {
        let additional_headers = config
            .additional_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Self {
            user_agent: config.user_agent.clone(),
            additional_headers,
        }
    }

    /// Translate `request` for a transfer starting at `started_at`.
    pub fn translate(&self, request: &Request, started_at: Instant) -> Result<WireRequest, SessionError> {
        let method = WireMethod::try_from(request.method())?;
        let url = request.url().clone();
        if url.host_str().is_none() {
            return Err(SessionError::InvalidUrl(format!("{url}: missing host")));
        }

        let mut headers = self.additional_headers.clone();
        for (name, value) in request.headers().iter() {
            headers.set(name, value);
        }
        if let Some(agent) = &self.user_agent {
            if !headers.contains("user-agent") {
                headers.set("user-agent", agent.as_str());
            }
        }

        let body = match request.body() {
            None => WireBody::Empty,
            Some(RequestBody::Bytes(b)) => WireBody::Fixed(b.clone()),
            Some(RequestBody::Stream(s)) => WireBody::Streamed(s.clone()),
        };
        if method == WireMethod::Post && request.body().is_some() && !headers.contains("content-type") {
            headers.set("content-type", FORM_URLENCODED);
        }

        let timeout = match request.timeout() {
            Duration::ZERO => DEFAULT_TIMEOUT,
            t => t,
        };
        let deadline = saturating_deadline(started_at, timeout);

        Ok(WireRequest {
            method,
            url,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
            deadline,
        })
    }
}

/// `started_at + timeout`, clamped to a far-future instant on overflow.
fn saturating_deadline(started_at: Instant, timeout: Duration) -> Instant {
    started_at
        .checked_add(timeout)
        .or_else(|| started_at.checked_add(FAR_FUTURE))
        .unwrap_or(started_at)
}

/// Translate with no session defaults.
pub fn translate(request: &Request, started_at: Instant) -> Result<WireRequest, SessionError> {
    RequestTranslator::default().translate(request, started_at)
}
