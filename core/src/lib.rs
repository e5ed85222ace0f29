//! HTTP session engine: tasks, delegates and a plain HTTP/1.1 transport.
//!
//! # Overview
//! A `Session` creates `DataTask`s from `Request`s. Resuming a task
//! translates the request, hands it to a `Transport`, and routes the
//! transport's callbacks through a `DelegateBridge` to one of three
//! reporting modes: live delegate events, a buffered completion handler, or
//! a download written straight to a file.
//!
//! # Design
//! - Response heads are parsed incrementally (`header`) inside an immutable
//!   per-transfer state value (`transfer`); each step consumes the old state.
//! - Streamed request bodies are pulled on a blocking thread and pushed to
//!   the transport one acknowledged chunk at a time (`body`), so memory use
//!   stays at one chunk regardless of body size.
//! - Every transfer ends with exactly one terminal notification, whether it
//!   succeeded, failed, was cancelled, timed out, or its transport went away.
//! - The library logs through `tracing` and never installs a subscriber.

pub mod body;
pub mod bridge;
pub mod config;
pub mod delegate;
pub mod drain;
pub mod error;
pub mod header;
pub mod http;
pub mod http1;
pub mod session;
pub mod task;
pub mod transfer;
pub mod translate;
pub mod transport;

pub use bytes::Bytes;

pub use bridge::{BridgeMode, DelegateBridge};
pub use config::SessionConfig;
pub use delegate::{CompletionHandler, DataTaskDelegate, Delegate, DownloadHandler, TaskDelegate};
pub use error::{ParseError, SessionError, TransportError};
pub use header::RequestHead;
pub use http::{BodyStream, CachePolicy, HeaderMap, HttpMethod, Request, RequestBody, Response};
pub use http1::Http1Transport;
pub use session::Session;
pub use task::{DataTask, TaskState};
pub use transport::{TransferHandle, Transport};
