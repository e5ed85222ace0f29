//! Plain-text HTTP/1.1 transport over tokio.
//!
//! One connection per transfer, closed when the response ends. The response
//! head is parsed line by line through a `TransferState`; bodies framed by
//! `Content-Length`, chunked encoding or connection close are forwarded to
//! the bridge chunk by chunk as they are read.
//!
//! The transport owns its runtime. `shutdown` cancels in-flight transfers
//! (they finish with `TransportError::Shutdown`) and stops the runtime.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::body::{spawn_pump, BodyWriter};
use crate::bridge::DelegateBridge;
use crate::config::SessionConfig;
use crate::drain::DataDrain;
use crate::error::{ParseError, SessionError, TransportError};
use crate::header::RequestHead;
use crate::http::{BodyStream, HeaderMap, RequestBody, Response};
use crate::transfer::{TransferPhase, TransferState};
use crate::translate::{WireMethod, WireRequest};
use crate::transport::{TransferHandle, Transport};

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 4 * 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Names the transport writes itself; request copies are dropped.
const FRAMING_HEADERS: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

#[derive(Debug, Clone, Copy)]
struct Settings {
    read_buffer_size: usize,
    upload_chunk_size: usize,
}

pub struct Http1Transport {
    runtime: Mutex<Option<Runtime>>,
    shutdown: CancellationToken,
    settings: Settings,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(e: io::Error) -> SessionError {
    TransportError::Io(e).into()
}

impl Http1Transport {
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("session-transport")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            shutdown: CancellationToken::new(),
            settings: Settings {
                read_buffer_size: config.read_buffer_size.max(1),
                upload_chunk_size: config.upload_chunk_size.max(1),
            },
        })
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Transport for Http1Transport {
    fn execute(&self, request: WireRequest, mut bridge: DelegateBridge) -> TransferHandle {
        let token = self.shutdown.child_token();
        let handle = TransferHandle::new(token.clone());

        let runtime = lock(&self.runtime);
        if let Some(rt) = runtime.as_ref() {
            rt.spawn(run_transfer(request, bridge, token, self.shutdown.clone(), self.settings));
            return handle;
        }
        drop(runtime);

        bridge.on_error(TransportError::Shutdown.into());
        bridge.on_finished();
        handle
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
        let Some(runtime) = lock(&self.runtime).take() else {
            return;
        };
        tracing::debug!("shutting down http/1.1 transport");
        // Blocking on shutdown is not allowed from inside a runtime.
        if tokio::runtime::Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

impl Drop for Http1Transport {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = lock(&self.runtime).take() {
            runtime.shutdown_background();
        }
    }
}

async fn run_transfer(
    request: WireRequest,
    mut bridge: DelegateBridge,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    settings: Settings,
) {
    let deadline = tokio::time::Instant::from_std(request.deadline);
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            let error = if shutdown.is_cancelled() {
                TransportError::Shutdown
            } else {
                TransportError::Cancelled
            };
            Err(error.into())
        }
        result = tokio::time::timeout_at(deadline, exchange(&request, &mut bridge, settings)) => {
            result.unwrap_or_else(|_| Err(TransportError::Timeout.into()))
        }
    };
    if let Err(e) = outcome {
        bridge.on_error(e);
    }
    bridge.on_finished();
}

async fn exchange(
    request: &WireRequest,
    bridge: &mut DelegateBridge,
    settings: Settings,
) -> Result<(), SessionError> {
    let url = &request.url;
    if url.scheme() != "http" {
        return Err(TransportError::Protocol(format!("unsupported scheme {}", url.scheme())).into());
    }
    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidUrl(url.to_string()))?;
    let addr = format!("{host}:{}", url.port_or_known_default().unwrap_or(80));
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;

    let mut state = TransferState::new(url.clone(), DataDrain::Ignore);
    if let Some(body) = Option::<RequestBody>::from(request.body.clone()) {
        state = state.by_setting_body_source(body);
    }

    let (head, sent) = encode_head(request, state.body_source());
    stream.write_all(&head).await.map_err(io_error)?;
    bridge.on_request_head_sent(sent);

    match state.body_source() {
        None => {}
        Some(RequestBody::Bytes(b)) => {
            if !b.is_empty() {
                stream.write_all(b).await.map_err(io_error)?;
                bridge.on_request_body_part_sent(b.len() as u64);
            }
        }
        Some(RequestBody::Stream(s)) => upload(&mut stream, s.clone(), bridge, settings).await?,
    }
    stream.flush().await.map_err(io_error)?;

    let mut reader = BufReader::with_capacity(settings.read_buffer_size, stream);
    let (state, response) = read_head(&mut reader, state, url).await?;
    let framing = if request.method == WireMethod::Head || matches!(response.status_code, 204 | 304) {
        Framing::None
    } else {
        Framing::of(&response.headers)?
    };
    bridge.on_response_head_received(response);

    let state = read_body(&mut reader, state, framing, bridge, settings).await?;
    let done = state.finish()?;
    tracing::trace!(url = %url, status = done.response.status_code, bytes = done.body_bytes, "exchange complete");
    Ok(())
}

/// Serialise the request head, and describe what was sent.
fn encode_head(request: &WireRequest, body: Option<&RequestBody>) -> (Vec<u8>, RequestHead) {
    let url = &request.url;
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut headers = HeaderMap::new();
    headers.set("host", host_header(url));
    for (name, value) in &request.headers {
        if FRAMING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        headers.append(name, value);
    }
    match body {
        Some(RequestBody::Bytes(b)) => headers.set("content-length", b.len().to_string()),
        Some(RequestBody::Stream(_)) => headers.set("transfer-encoding", "chunked"),
        None if matches!(request.method, WireMethod::Post | WireMethod::Put) => {
            headers.set("content-length", "0")
        }
        None => {}
    }
    headers.set("connection", "close");

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(request.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");

    let sent = RequestHead {
        method: request.method.into(),
        url: url.clone(),
        version: "HTTP/1.1".to_string(),
        headers,
    };
    (out, sent)
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Stream the body with chunked encoding, one pump chunk at a time.
async fn upload(
    stream: &mut TcpStream,
    body: BodyStream,
    bridge: &mut DelegateBridge,
    settings: Settings,
) -> Result<(), SessionError> {
    let (writer, mut rx) = BodyWriter::channel();
    let pump = spawn_pump(body, writer, settings.upload_chunk_size);

    while let Some(write) = rx.recv().await {
        let terminal = write.is_terminal();
        let len = write.chunk.len() as u64;
        match write_chunk(stream, &write.chunk).await {
            Ok(()) => write.complete(Ok(())),
            Err(e) => {
                write.complete(Err(io::Error::new(e.kind(), e.to_string())));
                return Err(io_error(e));
            }
        }
        if terminal {
            break;
        }
        bridge.on_request_body_part_sent(len);
    }
    drop(rx);

    match pump.await {
        Ok(result) => result.map(|total| tracing::trace!(bytes = total, "request body uploaded")),
        Err(e) => Err(TransportError::Protocol(format!("request body pump failed: {e}")).into()),
    }
}

async fn write_chunk(stream: &mut TcpStream, chunk: &[u8]) -> io::Result<()> {
    if chunk.is_empty() {
        return stream.write_all(b"0\r\n\r\n").await;
    }
    stream.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
    stream.write_all(chunk).await?;
    stream.write_all(b"\r\n").await
}

/// Read header lines until a final (non-1xx) response head completes.
async fn read_head<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    mut state: TransferState,
    url: &Url,
) -> Result<(TransferState, Response), SessionError> {
    let mut head_bytes = 0;
    loop {
        let mut line = Vec::new();
        let limit = (MAX_HEAD_BYTES - head_bytes + 1) as u64;
        let n = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await
            .map_err(io_error)?;
        if n == 0 && state.phase() == TransferPhase::AwaitingHeaders {
            return Err(TransportError::ConnectionClosed.into());
        }
        head_bytes += n;
        if head_bytes > MAX_HEAD_BYTES {
            return Err(TransportError::Protocol("response head too large".to_string()).into());
        }
        if !line.ends_with(b"\n") {
            return Err(ParseError::IncompleteHeader.into());
        }

        state = state.by_appending_header_line(&line)?;
        if let Some(response) = state.response() {
            if (100..200).contains(&response.status_code) && response.status_code != 101 {
                tracing::trace!(status = response.status_code, "skipping interim response");
                state = TransferState::new(url.clone(), DataDrain::Ignore);
                head_bytes = 0;
                continue;
            }
            let response = response.clone();
            return Ok((state, response));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    None,
    Length(u64),
    Chunked,
    UntilClose,
}

impl Framing {
    fn of(headers: &HeaderMap) -> Result<Self, SessionError> {
        if let Some(coding) = headers.get("transfer-encoding") {
            let last = coding.rsplit(',').next().unwrap_or("").trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(Framing::Chunked);
            }
            return Ok(Framing::UntilClose);
        }
        match headers.get("content-length") {
            Some(len) => len
                .trim()
                .parse()
                .map(Framing::Length)
                .map_err(|_| TransportError::Protocol(format!("bad content-length {len:?}")).into()),
            None => Ok(Framing::UntilClose),
        }
    }
}

fn deliver(
    state: TransferState,
    bridge: &mut DelegateBridge,
    chunk: &[u8],
) -> Result<TransferState, SessionError> {
    let state = state.by_appending_body_data(chunk)?;
    bridge.on_response_body_part_received(Bytes::copy_from_slice(chunk));
    Ok(state)
}

async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    mut state: TransferState,
    framing: Framing,
    bridge: &mut DelegateBridge,
    settings: Settings,
) -> Result<TransferState, SessionError> {
    let mut buf = vec![0u8; settings.read_buffer_size];
    match framing {
        Framing::None => {}
        Framing::Length(len) => {
            state = read_exact_into(reader, state, len, &mut buf, bridge).await?;
        }
        Framing::UntilClose => loop {
            let n = reader.read(&mut buf).await.map_err(io_error)?;
            if n == 0 {
                break;
            }
            state = deliver(state, bridge, &buf[..n])?;
        },
        Framing::Chunked => loop {
            let size = parse_chunk_size(&read_line(reader, MAX_CHUNK_LINE_BYTES).await?)?;
            if size == 0 {
                // Trailers are read and dropped.
                let mut trailer_bytes = 0;
                loop {
                    let line = read_line(reader, MAX_HEAD_BYTES - trailer_bytes).await?;
                    if line == b"\r\n" {
                        break;
                    }
                    trailer_bytes += line.len();
                }
                break;
            }
            state = read_exact_into(reader, state, size, &mut buf, bridge).await?;
            if read_line(reader, MAX_CHUNK_LINE_BYTES).await? != b"\r\n" {
                return Err(TransportError::Protocol("chunk not followed by CRLF".to_string()).into());
            }
        },
    }
    Ok(state)
}

async fn read_exact_into<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    mut state: TransferState,
    len: u64,
    buf: &mut [u8],
    bridge: &mut DelegateBridge,
) -> Result<TransferState, SessionError> {
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await.map_err(io_error)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed.into());
        }
        remaining -= n as u64;
        state = deliver(state, bridge, &buf[..n])?;
    }
    Ok(state)
}

/// One LF-terminated line of at most `max` bytes.
async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>, max: usize) -> Result<Vec<u8>, SessionError> {
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(max as u64)
        .read_until(b'\n', &mut line)
        .await
        .map_err(io_error)?;
    if !line.ends_with(b"\n") {
        if n >= max {
            return Err(TransportError::Protocol("chunk framing line too long".to_string()).into());
        }
        return Err(TransportError::ConnectionClosed.into());
    }
    Ok(line)
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, SessionError> {
    let bad = || SessionError::from(TransportError::Protocol("bad chunk size line".to_string()));
    let text = std::str::from_utf8(line).map_err(|_| bad())?;
    let size = text.trim_end_matches("\r\n").split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16).map_err(|_| bad())
}
