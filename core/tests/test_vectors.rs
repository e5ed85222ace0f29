//! Check head parsing and request translation against JSON vectors stored
//! in `test-vectors/`.
//!
//! Each vector file lists raw inputs with either the expected parse result
//! or the expected error. Header expectations are checked by name, so
//! ordering differences never produce false negatives.

use std::time::{Duration, Instant};

use serde_json::Value;
use session_core::drain::DataDrain;
use session_core::header::{HeaderOutcome, ParsedHeader};
use session_core::transfer::TransferState;
use session_core::translate::translate;
use session_core::{HttpMethod, ParseError, Request, SessionError};
use url::Url;

fn cases(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn strings(value: &Value) -> Vec<&str> {
    value.as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Response heads
// ---------------------------------------------------------------------------

fn feed_response(lines: &[&str]) -> Result<session_core::Response, SessionError> {
    let url = Url::parse("http://example.com/resource").unwrap();
    let mut state = TransferState::new(url, DataDrain::Ignore);
    for line in lines {
        state = state.by_appending_header_line(line.as_bytes())?;
    }
    state
        .response()
        .cloned()
        .ok_or(SessionError::Parse(ParseError::IncompleteHeader))
}

#[test]
fn response_head_vectors() {
    for case in cases(include_str!("../../test-vectors/response_heads.json")) {
        let name = case["name"].as_str().unwrap();
        let result = feed_response(&strings(&case["lines"]));

        if let Some(error) = case["error"].as_str() {
            match result {
                Err(SessionError::Parse(e)) => assert_eq!(format!("{e:?}"), error, "{name}"),
                other => panic!("{name}: expected {error}, got {other:?}"),
            }
            continue;
        }

        let response = result.unwrap_or_else(|e| panic!("{name}: {e}"));
        let expected = &case["expected"];
        assert_eq!(u64::from(response.status_code), expected["status"].as_u64().unwrap(), "{name}");
        assert_eq!(response.version, expected["version"].as_str().unwrap(), "{name}");
        assert_eq!(response.reason, expected["reason"].as_str().unwrap(), "{name}");
        let headers = expected["headers"].as_object().unwrap();
        assert_eq!(response.headers.len(), headers.len(), "{name}");
        for (header, value) in headers {
            assert_eq!(response.header(header), value.as_str(), "{name}: {header}");
        }
        assert_eq!(response.url.as_str(), "http://example.com/resource", "{name}");
    }
}

// ---------------------------------------------------------------------------
// Request heads
// ---------------------------------------------------------------------------

#[test]
fn request_head_vectors() {
    for case in cases(include_str!("../../test-vectors/request_heads.json")) {
        let name = case["name"].as_str().unwrap();
        let mut header = ParsedHeader::new();
        let mut complete = None;
        for line in strings(&case["lines"]).into_iter().chain([""]) {
            match header.append_line(line.as_bytes()).unwrap() {
                HeaderOutcome::Partial(next) => header = next,
                HeaderOutcome::Complete(done) => {
                    complete = Some(done);
                    break;
                }
            }
        }
        let result = complete.unwrap().parse_request();

        if let Some(error) = case["error"].as_str() {
            let e = result.expect_err(name);
            assert_eq!(format!("{e:?}"), error, "{name}");
            continue;
        }

        let head = result.unwrap_or_else(|e| panic!("{name}: {e}"));
        let expected = &case["expected"];
        assert_eq!(head.method.as_str(), expected["method"].as_str().unwrap(), "{name}");
        assert_eq!(head.url.as_str(), expected["url"].as_str().unwrap(), "{name}");
        assert_eq!(head.version, expected["version"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

fn build_request(input: &Value) -> Request {
    let method = HttpMethod::from_token(input["method"].as_str().unwrap()).unwrap();
    let mut request = Request::get(input["url"].as_str().unwrap())
        .unwrap()
        .with_method(method);
    for pair in input["headers"].as_array().unwrap() {
        let pair = strings(pair);
        request.add_header(pair[0], pair[1]);
    }
    if let Some(body) = input["body"].as_str() {
        request.set_body(body.to_string());
    }
    if let Some(secs) = input["timeout_secs"].as_u64() {
        request.set_timeout(Duration::from_secs(secs));
    }
    request
}

#[test]
fn translation_vectors() {
    for case in cases(include_str!("../../test-vectors/translation.json")) {
        let name = case["name"].as_str().unwrap();
        let request = build_request(&case["input"]);
        let started_at = Instant::now();
        let result = translate(&request, started_at);

        if let Some(error) = case["error"].as_str() {
            let e = result.expect_err(name);
            assert_eq!(e.to_string(), error, "{name}");
            continue;
        }

        let wire = result.unwrap_or_else(|e| panic!("{name}: {e}"));
        let expected = &case["expected"];
        assert_eq!(wire.method.as_str(), expected["method"].as_str().unwrap(), "{name}");
        for (header, value) in expected["headers"].as_object().unwrap() {
            assert_eq!(wire.header(header), value.as_str(), "{name}: {header}");
        }
        for header in strings(&expected["absent"]) {
            assert_eq!(wire.header(header), None, "{name}: {header}");
        }
        assert_eq!(wire.body.known_length(), Some(expected["body_len"].as_u64().unwrap_or(0)), "{name}");
        let timeout = Duration::from_secs(expected["timeout_secs"].as_u64().unwrap());
        assert_eq!(wire.deadline, started_at + timeout, "{name}");
    }
}
