//! Adapter from transport callbacks to task notifications.
//!
//! # Design
//! One `DelegateBridge` exists per transfer attempt. The transport calls it
//! from a single task at a time, in wire order:
//! head sent, body parts sent, head received, body parts received, then an
//! optional error followed by `on_finished`.
//!
//! The bridge reaches its task through a `Weak` handle so an in-flight
//! transfer never keeps a dropped task alive. When the task is gone,
//! notifications that need it are silently dropped. Completion and download
//! handlers are owned by the bridge and always run.
//!
//! `on_finished` is the only terminal signal. It consumes the mode, so later
//! calls (and the drop guard) are no-ops.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Weak;

use bytes::Bytes;
use uuid::Uuid;

use crate::delegate::{CompletionHandler, Delegate, DownloadHandler};
use crate::drain::DataDrain;
use crate::error::{ParseError, SessionError, TransportError};
use crate::header::RequestHead;
use crate::http::Response;
use crate::task::{DataTask, TaskInner};

/// How a transfer reports back, fixed when the transfer starts.
pub enum BridgeMode {
    /// Forward every event live to the task's delegate.
    FullDelegate(Delegate),
    /// Collect the body in memory; report once at the end.
    CompletionHandler(CompletionHandler),
    /// Write the body to `destination`; report once at the end.
    DownloadCompletion {
        destination: PathBuf,
        handler: DownloadHandler,
    },
}

impl BridgeMode {
    fn name(&self) -> &'static str {
        match self {
            BridgeMode::FullDelegate(_) => "delegate",
            BridgeMode::CompletionHandler(_) => "completion",
            BridgeMode::DownloadCompletion { .. } => "download",
        }
    }
}

impl std::fmt::Debug for BridgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct DelegateBridge {
    task: Weak<TaskInner>,
    task_id: Uuid,
    mode: Option<BridgeMode>,
    last_head_sent: Option<RequestHead>,
    response: Option<Response>,
    drain: DataDrain,
    bytes_sent: u64,
    error: Option<SessionError>,
}

impl DelegateBridge {
    pub(crate) fn new(task: Weak<TaskInner>, task_id: Uuid, mode: BridgeMode) -> Self {
        let drain = match mode {
            BridgeMode::CompletionHandler(_) => DataDrain::in_memory(),
            // Delegates have already seen the bytes; downloads open their
            // file once a response arrives.
            BridgeMode::FullDelegate(_) | BridgeMode::DownloadCompletion { .. } => DataDrain::Ignore,
        };
        Self {
            task,
            task_id,
            mode: Some(mode),
            last_head_sent: None,
            response: None,
            drain,
            bytes_sent: 0,
            error: None,
        }
    }

    /// A bridge with no owning task. Only handler-based modes report.
    pub fn detached(mode: BridgeMode) -> Self {
        Self::new(Weak::new(), Uuid::nil(), mode)
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn last_head_sent(&self) -> Option<&RequestHead> {
        self.last_head_sent.as_ref()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn is_finished(&self) -> bool {
        self.mode.is_none()
    }

    fn task(&self) -> Option<DataTask> {
        self.task.upgrade().map(DataTask::from_inner)
    }

    pub fn on_request_head_sent(&mut self, head: RequestHead) {
        tracing::trace!(task_id = %self.task_id, method = %head.method, url = %head.url, "request head sent");
        self.last_head_sent = Some(head);
    }

    pub fn on_request_body_part_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
        let Some(task) = self.task() else {
            return;
        };
        task.inner().set_bytes_sent(self.bytes_sent);
        if let Some(BridgeMode::FullDelegate(delegate)) = &self.mode {
            let expected = task.count_of_bytes_expected_to_send();
            delegate.did_send_body_data(&task, bytes, self.bytes_sent, expected);
        }
    }

    /// Record the response head, addressed to the URL the request head went to.
    pub fn on_response_head_received(&mut self, mut response: Response) {
        if let Some(head) = &self.last_head_sent {
            response.url = head.url.clone();
        }
        tracing::debug!(task_id = %self.task_id, status = response.status_code, url = %response.url, "response head received");

        let download_file = match &self.mode {
            Some(BridgeMode::DownloadCompletion { destination, .. }) => Some(File::create(destination)),
            _ => None,
        };
        match download_file {
            Some(Ok(file)) => self.drain = DataDrain::ToFile(file),
            Some(Err(e)) => self.on_error(SessionError::Io(e)),
            None => {}
        }

        if let Some(BridgeMode::FullDelegate(delegate)) = &self.mode {
            if let (Some(task), Some(data)) = (self.task(), delegate.data()) {
                data.did_receive_response(&task, &response);
            }
        }
        self.response = Some(response);
    }

    pub fn on_response_body_part_received(&mut self, chunk: Bytes) {
        let task = self.task();
        if let Some(task) = &task {
            task.inner().add_bytes_received(chunk.len() as u64);
        }
        match &self.mode {
            Some(BridgeMode::FullDelegate(delegate)) => {
                if let (Some(task), Some(data)) = (&task, delegate.data()) {
                    data.did_receive_data(task, &chunk);
                }
            }
            Some(_) => {
                if let Err(e) = self.drain.append(&chunk) {
                    self.on_error(SessionError::Io(e));
                }
            }
            None => {}
        }
    }

    /// Record a failure. The first one recorded is the one reported.
    pub fn on_error(&mut self, error: SessionError) {
        tracing::debug!(task_id = %self.task_id, error = %error, "transfer error recorded");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Deliver the terminal notification. Later calls do nothing.
    pub fn on_finished(&mut self) {
        let Some(mode) = self.mode.take() else {
            return;
        };
        let task = self.task();
        if let Some(task) = &task {
            task.inner().mark_completed();
        }

        let response = self.response.take();
        let mut error = self.error.take();
        if error.is_none() && response.is_none() {
            error = Some(ParseError::IncompleteHeader.into());
        }
        let mut drain = std::mem::replace(&mut self.drain, DataDrain::Ignore);

        match &error {
            None => tracing::debug!(task_id = %self.task_id, mode = mode.name(), bytes_sent = self.bytes_sent, "transfer finished"),
            Some(e) => tracing::warn!(task_id = %self.task_id, mode = mode.name(), error = %e, "transfer failed"),
        }

        match mode {
            BridgeMode::FullDelegate(delegate) => {
                if let Some(task) = &task {
                    delegate.did_complete(task, error.as_ref());
                }
            }
            BridgeMode::CompletionHandler(handler) => handler(drain.into_bytes(), response, error),
            BridgeMode::DownloadCompletion { destination, handler } => {
                if error.is_none() {
                    if let Err(e) = drain.flush() {
                        error = Some(SessionError::Io(e));
                    }
                }
                let path = error.is_none().then_some(destination);
                handler(path, response, error)
            }
        }
    }
}

// A transport that drops a transfer without finishing it still owes the
// task its terminal notification.
impl Drop for DelegateBridge {
    fn drop(&mut self) {
        if self.mode.is_some() {
            self.on_error(TransportError::Shutdown.into());
            self.on_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use url::Url;

    use crate::http::{HeaderMap, HttpMethod};

    type Outcome = (Bytes, Option<Response>, Option<SessionError>);

    fn completion_bridge() -> (DelegateBridge, Arc<Mutex<Vec<Outcome>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let bridge = DelegateBridge::detached(BridgeMode::CompletionHandler(Box::new(
            move |body, response, error| sink.lock().unwrap().push((body, response, error)),
        )));
        (bridge, calls)
    }

    fn head(url: &str) -> RequestHead {
        RequestHead {
            method: HttpMethod::Get,
            url: Url::parse(url).unwrap(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
        }
    }

    fn response(status: u16) -> Response {
        Response {
            url: Url::parse("http://placeholder/").unwrap(),
            status_code: status,
            version: "HTTP/1.1".to_string(),
            reason: String::new(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn completion_handler_gets_concatenated_body_once() {
        let (mut bridge, calls) = completion_bridge();
        bridge.on_request_head_sent(head("http://h/echo"));
        bridge.on_response_head_received(response(200));
        bridge.on_response_body_part_received(Bytes::from_static(b"He"));
        bridge.on_response_body_part_received(Bytes::from_static(b"llo"));
        bridge.on_finished();
        bridge.on_finished();
        drop(bridge);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (body, response, error) = &calls[0];
        assert_eq!(body, "Hello");
        assert_eq!(response.as_ref().unwrap().url.as_str(), "http://h/echo");
        assert!(error.is_none());
    }

    #[test]
    fn empty_body_is_fine() {
        let (mut bridge, calls) = completion_bridge();
        bridge.on_response_head_received(response(204));
        bridge.on_finished();
        let calls = calls.lock().unwrap();
        assert!(calls[0].0.is_empty());
        assert_eq!(calls[0].1.as_ref().unwrap().status_code, 204);
        assert!(calls[0].2.is_none());
    }

    #[test]
    fn error_is_delivered_with_partial_results() {
        let (mut bridge, calls) = completion_bridge();
        bridge.on_response_head_received(response(200));
        bridge.on_response_body_part_received(Bytes::from_static(b"par"));
        bridge.on_error(TransportError::ConnectionClosed.into());
        bridge.on_error(TransportError::Timeout.into());
        bridge.on_finished();

        let calls = calls.lock().unwrap();
        let (body, response, error) = &calls[0];
        assert_eq!(body, "par");
        assert!(response.is_some());
        assert!(matches!(error, Some(SessionError::Transport(TransportError::ConnectionClosed))));
    }

    #[test]
    fn finishing_without_head_is_an_error() {
        let (mut bridge, calls) = completion_bridge();
        bridge.on_finished();
        let calls = calls.lock().unwrap();
        assert!(calls[0].1.is_none());
        assert!(matches!(calls[0].2, Some(SessionError::Parse(ParseError::IncompleteHeader))));
    }

    #[test]
    fn dropping_unfinished_bridge_reports_shutdown() {
        let (bridge, calls) = completion_bridge();
        drop(bridge);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0].2, Some(SessionError::Transport(TransportError::Shutdown))));
    }

    #[test]
    fn bytes_sent_accumulate() {
        let (mut bridge, _calls) = completion_bridge();
        bridge.on_request_body_part_sent(10);
        bridge.on_request_body_part_sent(5);
        assert_eq!(bridge.bytes_sent(), 15);
        bridge.on_finished();
    }

    #[test]
    fn download_writes_body_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("body.bin");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut bridge = DelegateBridge::detached(BridgeMode::DownloadCompletion {
            destination: destination.clone(),
            handler: Box::new(move |path, response, error| sink.lock().unwrap().push((path, response, error))),
        });
        bridge.on_response_head_received(response(200));
        bridge.on_response_body_part_received(Bytes::from_static(b"file "));
        bridge.on_response_body_part_received(Bytes::from_static(b"contents"));
        bridge.on_finished();

        let calls = calls.lock().unwrap();
        let (path, response, error) = &calls[0];
        assert_eq!(path.as_deref(), Some(destination.as_path()));
        assert!(response.is_some());
        assert!(error.is_none());
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "file contents");
    }

    #[test]
    fn download_failure_has_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("missing-dir").join("body.bin");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut bridge = DelegateBridge::detached(BridgeMode::DownloadCompletion {
            destination,
            handler: Box::new(move |path: Option<PathBuf>, _response: Option<Response>, error: Option<SessionError>| {
                sink.lock().unwrap().push((path, error))
            }),
        });
        bridge.on_response_head_received(response(200));
        bridge.on_response_body_part_received(Bytes::from_static(b"lost"));
        bridge.on_finished();

        let calls = calls.lock().unwrap();
        assert!(calls[0].0.is_none());
        assert!(matches!(calls[0].1, Some(SessionError::Io(_))));
    }
}
