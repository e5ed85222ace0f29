//! The caller-facing entry point: a configured factory for tasks.
//!
//! # Design
//! A `Session` shares one transport and one header translator between all
//! tasks it creates. Tasks come back suspended; nothing touches the network
//! until `DataTask::resume`.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::bridge::BridgeMode;
use crate::config::SessionConfig;
use crate::delegate::{Delegate, DownloadHandler};
use crate::error::SessionError;
use crate::http::{Request, Response};
use crate::http1::Http1Transport;
use crate::task::DataTask;
use crate::translate::RequestTranslator;
use crate::transport::Transport;

pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    translator: RequestTranslator,
}

impl Session {
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let translator = RequestTranslator::new(&config);
        Self {
            config,
            transport,
            translator,
        }
    }

    /// A session backed by its own HTTP/1.1 transport.
    pub fn with_http1(config: SessionConfig) -> Result<Self, SessionError> {
        let transport = Http1Transport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A GET request for `url` carrying the session's defaults.
    pub fn request(&self, url: &str) -> Result<Request, SessionError> {
        let url = Url::parse(url).map_err(|e| SessionError::InvalidUrl(format!("{url}: {e}")))?;
        let mut request = Request::new(url);
        request.set_timeout(self.config.timeout());
        request.set_cache_policy(self.config.cache_policy);
        request.set_allows_cellular(self.config.allow_cellular);
        request.set_handles_cookies(self.config.handle_cookies);
        request.set_uses_pipelining(self.config.allow_pipelining);
        Ok(request)
    }

    /// A task reporting every event to `delegate` as it happens.
    pub fn data_task(&self, request: Request, delegate: Delegate) -> DataTask {
        self.task(request, BridgeMode::FullDelegate(delegate))
    }

    /// A task that buffers the body and calls `handler` once at the end.
    pub fn data_task_with_completion<F>(&self, request: Request, handler: F) -> DataTask
    where
        F: FnOnce(Bytes, Option<Response>, Option<SessionError>) + Send + 'static,
    {
        self.task(request, BridgeMode::CompletionHandler(Box::new(handler)))
    }

    /// A task that writes the body to `destination` and calls `handler` once
    /// at the end. The file is created (or truncated) when the response head
    /// arrives.
    pub fn download_task<F>(&self, request: Request, destination: impl Into<PathBuf>, handler: F) -> DataTask
    where
        F: FnOnce(Option<PathBuf>, Option<Response>, Option<SessionError>) + Send + 'static,
    {
        let handler: DownloadHandler = Box::new(handler);
        self.task(
            request,
            BridgeMode::DownloadCompletion {
                destination: destination.into(),
                handler,
            },
        )
    }

    /// Shut the transport down. Tasks resumed afterwards fail with
    /// `TransportError::Shutdown`.
    pub fn shutdown(&self) {
        tracing::debug!("session shutting down");
        self.transport.shutdown();
    }

    fn task(&self, request: Request, mode: BridgeMode) -> DataTask {
        let task = DataTask::new(request, mode, Arc::clone(&self.transport), self.translator.clone());
        tracing::trace!(task_id = %task.task_identifier(), url = %task.original_request().url(), "task created");
        task
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("config", &self.config).finish()
    }
}
