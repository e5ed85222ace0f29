//! Incremental parsing of HTTP/1.1 message heads.
//!
//! # Design
//! Lines are fed one at a time as they come off the wire. `ParsedHeader`
//! only accumulates text; the first empty line turns it into a
//! `CompleteHeader`, which can then be interpreted as either a response head
//! (`<VERSION> <STATUS> <REASON>`) or a request head
//! (`<METHOD> <URI> <VERSION>`). The grammar is applied literally: bare LF
//! line endings, stray CRs and whitespace before the colon are rejected
//! rather than repaired.

use url::Url;

use crate::error::ParseError;
use crate::http::{HeaderMap, HttpMethod, Response};

/// Header lines received so far, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHeader {
    lines: Vec<String>,
}

/// Result of feeding one line to a `ParsedHeader`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOutcome {
    Partial(ParsedHeader),
    Complete(CompleteHeader),
}

/// A header block terminated by an empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteHeader {
    lines: Vec<String>,
}

impl ParsedHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw line, with or without its trailing CRLF.
    ///
    /// An empty line completes the block; the empty line itself is not kept.
    pub fn append_line(mut self, raw: &[u8]) -> Result<HeaderOutcome, ParseError> {
        let line = decode_line(raw)?;
        if line.is_empty() {
            return Ok(HeaderOutcome::Complete(CompleteHeader { lines: self.lines }));
        }
        self.lines.push(line.to_string());
        Ok(HeaderOutcome::Partial(self))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Result<&str, ParseError> {
    let raw = raw.strip_suffix(b"\r\n").unwrap_or(raw);
    let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidLine)?;
    if line.contains(['\r', '\n']) {
        return Err(ParseError::InvalidLine);
    }
    Ok(line)
}

impl CompleteHeader {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Interpret the block as a response head for a request sent to `url`.
    pub fn parse_response(&self, url: Url) -> Result<Response, ParseError> {
        let (status_line, rest) = self
            .lines
            .split_first()
            .ok_or(ParseError::IncompleteHeader)?;
        let (version, status_code, reason) =
            parse_status_line(status_line).ok_or(ParseError::IncompleteHeader)?;
        let headers = parse_fields(rest).ok_or(ParseError::IncompleteHeader)?;
        Ok(Response {
            url,
            status_code,
            version: version.to_string(),
            reason: reason.to_string(),
            headers,
        })
    }

    /// Interpret the block as a request head.
    ///
    /// Origin-form targets are resolved against the `Host` header.
    pub fn parse_request(&self) -> Result<RequestHead, ParseError> {
        let (request_line, rest) = self.lines.split_first().ok_or(ParseError::InvalidMethod)?;
        let mut tokens = request_line.split(' ');
        let method = tokens
            .next()
            .and_then(HttpMethod::from_token)
            .ok_or(ParseError::InvalidMethod)?;
        let target = tokens.next().filter(|t| !t.is_empty()).ok_or(ParseError::InvalidUri)?;
        let version = tokens
            .next()
            .filter(|v| is_http_version(v))
            .ok_or(ParseError::InvalidUri)?;
        if tokens.next().is_some() {
            return Err(ParseError::InvalidUri);
        }

        let headers = parse_fields(rest).ok_or(ParseError::IncompleteHeader)?;
        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(_) if target.starts_with('/') => {
                let host = headers.get("host").ok_or(ParseError::InvalidUri)?;
                Url::parse(&format!("http://{host}{target}")).map_err(|_| ParseError::InvalidUri)?
            }
            Err(_) => return Err(ParseError::InvalidUri),
        };

        Ok(RequestHead {
            method,
            url,
            version: version.to_string(),
            headers,
        })
    }
}

/// The start line and headers of a request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: HttpMethod,
    pub url: Url,
    pub version: String,
    pub headers: HeaderMap,
}

fn is_http_version(token: &str) -> bool {
    token
        .strip_prefix("HTTP/")
        .and_then(|v| v.split_once('.'))
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        })
}

/// `HTTP/1.1 200 OK` into its parts. The reason phrase may be empty.
fn parse_status_line(line: &str) -> Option<(&str, u16, &str)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().filter(|v| is_http_version(v))?;
    let code = parts.next()?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let status = code.parse().ok()?;
    let reason = parts.next().unwrap_or("");
    Some((version, status, reason))
}

fn parse_fields(lines: &[String]) -> Option<HeaderMap> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line.split_once(':')?;
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace()) {
            return None;
        }
        headers.insert_raw(name, value.trim_matches([' ', '\t']));
    }
    Some(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &[&[u8]]) -> Result<HeaderOutcome, ParseError> {
        let mut header = ParsedHeader::new();
        let mut outcome = None;
        for line in lines {
            match header.append_line(line)? {
                HeaderOutcome::Partial(next) => {
                    header = next;
                    outcome = Some(HeaderOutcome::Partial(header.clone()));
                }
                complete @ HeaderOutcome::Complete(_) => return Ok(complete),
            }
        }
        Ok(outcome.unwrap_or(HeaderOutcome::Partial(header)))
    }

    fn complete(lines: &[&[u8]]) -> CompleteHeader {
        match feed(lines).unwrap() {
            HeaderOutcome::Complete(c) => c,
            HeaderOutcome::Partial(p) => panic!("expected complete, got {p:?}"),
        }
    }

    fn url() -> Url {
        Url::parse("http://h/echo").unwrap()
    }

    #[test]
    fn non_empty_line_is_partial() {
        let outcome = ParsedHeader::new().append_line(b"HTTP/1.1 200 OK\r\n").unwrap();
        match outcome {
            HeaderOutcome::Partial(h) => assert_eq!(h.lines(), ["HTTP/1.1 200 OK"]),
            HeaderOutcome::Complete(_) => panic!("should not complete"),
        }
    }

    #[test]
    fn empty_line_completes() {
        let c = complete(&[b"HTTP/1.1 200 OK", b"A: b", b""]);
        assert_eq!(c.lines().len(), 2);
    }

    #[test]
    fn undecodable_bytes_are_invalid_line() {
        let err = ParsedHeader::new().append_line(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err, ParseError::InvalidLine);
    }

    #[test]
    fn bare_lf_is_invalid_line() {
        let err = ParsedHeader::new().append_line(b"A: b\n").unwrap_err();
        assert_eq!(err, ParseError::InvalidLine);
    }

    #[test]
    fn not_found_without_headers() {
        let response = complete(&[b"HTTP/1.1 404 Not Found\r\n", b"\r\n"])
            .parse_response(url())
            .unwrap();
        assert_eq!(response.status_code, 404);
        assert_eq!(response.reason, "Not Found");
        assert!(response.headers.is_empty());
        assert_eq!(response.url, url());
    }

    #[test]
    fn header_values_keep_case_and_lookup_ignores_it() {
        let response = complete(&[b"HTTP/1.1 200 OK", b"X-Test: MixedCase", b"content-type:  text/plain ", b""])
            .parse_response(url())
            .unwrap();
        assert_eq!(response.header("x-test"), Some("MixedCase"));
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        let names: Vec<_> = response.headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["X-Test", "content-type"]);
    }

    #[test]
    fn repeated_response_headers_are_joined() {
        let response = complete(&[b"HTTP/1.1 200 OK", b"Vary: a", b"vary: b", b""])
            .parse_response(url())
            .unwrap();
        assert_eq!(response.header("VARY"), Some("a, b"));
    }

    #[test]
    fn status_without_reason() {
        let response = complete(&[b"HTTP/1.0 204", b""]).parse_response(url()).unwrap();
        assert_eq!(response.status_code, 204);
        assert_eq!(response.version, "HTTP/1.0");
        assert_eq!(response.reason, "");
    }

    #[test]
    fn malformed_status_line_is_incomplete_header() {
        for line in [&b"HTTP/1.1 abc OK"[..], b"garbage", b"HTTP/1.1 2000 OK", b"HTTP 200 OK"] {
            let err = complete(&[line, b""]).parse_response(url()).unwrap_err();
            assert_eq!(err, ParseError::IncompleteHeader, "{:?}", String::from_utf8_lossy(line));
        }
    }

    #[test]
    fn empty_block_is_incomplete_header() {
        let err = complete(&[b""]).parse_response(url()).unwrap_err();
        assert_eq!(err, ParseError::IncompleteHeader);
    }

    #[test]
    fn header_without_colon_is_incomplete_header() {
        let err = complete(&[b"HTTP/1.1 200 OK", b"NoColon", b""])
            .parse_response(url())
            .unwrap_err();
        assert_eq!(err, ParseError::IncompleteHeader);
    }

    #[test]
    fn request_line_parses_against_host() {
        let head = complete(&[b"POST /echo?x=1 HTTP/1.1", b"Host: example.com:8080", b""])
            .parse_request()
            .unwrap();
        assert_eq!(head.method, HttpMethod::Post);
        assert_eq!(head.url.as_str(), "http://example.com:8080/echo?x=1");
        assert_eq!(head.version, "HTTP/1.1");
    }

    #[test]
    fn request_line_errors() {
        let cases: [(&[u8], ParseError); 5] = [
            (b"FETCH / HTTP/1.1", ParseError::InvalidMethod),
            (b"get / HTTP/1.1", ParseError::InvalidMethod),
            (b"GET", ParseError::InvalidUri),
            (b"GET / HTTP/1.1 extra", ParseError::InvalidUri),
            (b"GET / NOTHTTP", ParseError::InvalidUri),
        ];
        for (line, expected) in cases {
            let err = complete(&[line, b"Host: h", b""]).parse_request().unwrap_err();
            assert_eq!(err, expected, "{:?}", String::from_utf8_lossy(line));
        }
    }

    #[test]
    fn origin_form_without_host_is_invalid_uri() {
        let err = complete(&[b"GET / HTTP/1.1", b""]).parse_request().unwrap_err();
        assert_eq!(err, ParseError::InvalidUri);
    }
}
