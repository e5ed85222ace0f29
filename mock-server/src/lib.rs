use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/headers` saw of a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestReport {
    pub method: String,
    pub path: String,
    /// Lower-cased names; repeated headers are comma-joined.
    pub headers: BTreeMap<String, String>,
    pub body_len: usize,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default = "default_chunks")]
    pub chunks: usize,
    #[serde(default = "default_chunk_size")]
    pub size: usize,
}

fn default_chunks() -> usize {
    4
}

fn default_chunk_size() -> usize {
    16
}

#[derive(Debug, Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/headers", any(report))
        .route("/status/{code}", any(status))
        .route("/bytes/{len}", get(fixed_bytes))
        .route("/stream", get(stream))
        .route("/slow", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Body back as-is; `x-*` request headers are mirrored onto the response.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Response {
    let mut out = HeaderMap::new();
    for (name, value) in &headers {
        if name.as_str().starts_with("x-") {
            out.append(name.clone(), value.clone());
        }
    }
    if let Ok(value) = HeaderValue::from_str(method.as_str()) {
        out.insert(HeaderName::from_static("x-echo-method"), value);
    }
    (StatusCode::OK, out, body).into_response()
}

async fn report(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<RequestReport> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        seen.entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }
    Json(RequestReport {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers: seen,
        body_len: body.len(),
    })
}

async fn status(Path(code): Path<u16>) -> Result<Response, StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    if status.is_informational() || matches!(code, 204 | 304) {
        return Ok(status.into_response());
    }
    Ok((status, format!("status {code}")).into_response())
}

/// `len` bytes cycling through `a..=z`, sent with a `Content-Length`.
async fn fixed_bytes(Path(len): Path<usize>) -> Vec<u8> {
    pattern(len)
}

/// `chunks` pieces of `size` bytes each, sent with chunked encoding.
async fn stream(Query(params): Query<StreamParams>) -> Response {
    let pieces: Vec<Result<Bytes, std::io::Error>> = (0..params.chunks)
        .map(|i| Ok(Bytes::from(vec![b'a' + (i % 26) as u8; params.size])))
        .collect();
    Body::from_stream(futures_util::stream::iter(pieces)).into_response()
}

async fn slow(Query(params): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "done"
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}
