//! Tasks: the caller's handle on one transfer.
//!
//! # Design
//! A `DataTask` is a cheap clone of a shared inner record. The record keeps
//! the original request, byte counters and the cancel handle of the running
//! transfer. The transfer's bridge only holds a weak reference to it, so
//! dropping every `DataTask` clone lets the record go even mid-transfer.
//!
//! A task runs at most once. `resume` on a running or completed task and
//! `cancel` on a completed one are no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::bridge::{BridgeMode, DelegateBridge};
use crate::delegate::Delegate;
use crate::error::TransportError;
use crate::http::Request;
use crate::translate::RequestTranslator;
use crate::transport::{TransferHandle, Transport};

const UNKNOWN_LENGTH: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Suspended,
    Running,
    /// `cancel` reached a running transfer; the transport has not yet
    /// delivered its terminal callbacks.
    Canceling,
    Completed,
}

pub struct TaskInner {
    id: Uuid,
    original_request: Request,
    delegate: Option<Delegate>,
    transport: Arc<dyn Transport>,
    translator: RequestTranslator,
    state: Mutex<TaskState>,
    mode: Mutex<Option<BridgeMode>>,
    handle: Mutex<Option<TransferHandle>>,
    bytes_sent: AtomicU64,
    bytes_expected_to_send: AtomicU64,
    bytes_received: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskInner {
    pub(crate) fn set_bytes_sent(&self, total: u64) {
        self.bytes_sent.store(total, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn mark_completed(&self) {
        *lock(&self.state) = TaskState::Completed;
        lock(&self.handle).take();
    }
}

#[derive(Clone)]
pub struct DataTask {
    inner: Arc<TaskInner>,
}

impl DataTask {
    pub(crate) fn new(
        request: Request,
        mode: BridgeMode,
        transport: Arc<dyn Transport>,
        translator: RequestTranslator,
    ) -> Self {
        let delegate = match &mode {
            BridgeMode::FullDelegate(delegate) => Some(delegate.clone()),
            _ => None,
        };
        Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                original_request: request,
                delegate,
                transport,
                translator,
                state: Mutex::new(TaskState::Suspended),
                mode: Mutex::new(Some(mode)),
                handle: Mutex::new(None),
                bytes_sent: AtomicU64::new(0),
                bytes_expected_to_send: AtomicU64::new(UNKNOWN_LENGTH),
                bytes_received: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<TaskInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &TaskInner {
        &self.inner
    }

    pub fn task_identifier(&self) -> Uuid {
        self.inner.id
    }

    pub fn original_request(&self) -> &Request {
        &self.inner.original_request
    }

    pub fn timeout_interval(&self) -> Duration {
        self.inner.original_request.timeout()
    }

    pub fn delegate(&self) -> Option<&Delegate> {
        self.inner.delegate.as_ref()
    }

    pub fn state(&self) -> TaskState {
        *lock(&self.inner.state)
    }

    pub fn count_of_bytes_sent(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::Relaxed)
    }

    /// `None` until the task has started, or when the body is streamed.
    pub fn count_of_bytes_expected_to_send(&self) -> Option<u64> {
        match self.inner.bytes_expected_to_send.load(Ordering::Relaxed) {
            UNKNOWN_LENGTH => None,
            n => Some(n),
        }
    }

    pub fn count_of_bytes_received(&self) -> u64 {
        self.inner.bytes_received.load(Ordering::Relaxed)
    }

    /// Start the transfer.
    ///
    /// A request that cannot be translated fails here, on the calling
    /// thread, before the transport is involved.
    pub fn resume(&self) {
        {
            let mut state = lock(&self.inner.state);
            if *state != TaskState::Suspended {
                return;
            }
            *state = TaskState::Running;
        }
        let Some(mut bridge) = self.take_bridge() else {
            return;
        };

        let wire = match self
            .inner
            .translator
            .translate(&self.inner.original_request, Instant::now())
        {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!(task_id = %self.inner.id, error = %e, "request translation failed");
                bridge.on_error(e);
                bridge.on_finished();
                return;
            }
        };

        if let Some(n) = wire.body.known_length() {
            self.inner.bytes_expected_to_send.store(n, Ordering::Relaxed);
        }
        tracing::debug!(task_id = %self.inner.id, method = wire.method.as_str(), url = %wire.url, "starting transfer");

        let handle = self.inner.transport.execute(wire, bridge);
        let state = lock(&self.inner.state);
        match *state {
            // Finished before we got here; nothing left to cancel.
            TaskState::Completed => {}
            // Cancelled while the transport was being handed the request.
            TaskState::Canceling => handle.cancel(),
            TaskState::Suspended | TaskState::Running => *lock(&self.inner.handle) = Some(handle),
        }
    }

    /// Cancel the transfer. Safe to call any number of times, before or
    /// after it finishes.
    pub fn cancel(&self) {
        let previous = {
            let mut state = lock(&self.inner.state);
            let previous = *state;
            if previous == TaskState::Running {
                *state = TaskState::Canceling;
            }
            previous
        };

        match previous {
            TaskState::Completed => {}
            TaskState::Running | TaskState::Canceling => {
                if let Some(handle) = lock(&self.inner.handle).as_ref() {
                    tracing::debug!(task_id = %self.inner.id, "cancelling transfer");
                    handle.cancel();
                }
            }
            TaskState::Suspended => {
                if let Some(mut bridge) = self.take_bridge() {
                    bridge.on_error(TransportError::Cancelled.into());
                    bridge.on_finished();
                }
            }
        }
    }

    /// Alias of `cancel`.
    pub fn stop_loading(&self) {
        self.cancel();
    }

    fn take_bridge(&self) -> Option<DelegateBridge> {
        let mode = lock(&self.inner.mode).take()?;
        Some(DelegateBridge::new(Arc::downgrade(&self.inner), self.inner.id, mode))
    }
}

impl std::fmt::Debug for DataTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTask")
            .field("id", &self.inner.id)
            .field("url", &self.inner.original_request.url().as_str())
            .field("state", &self.state())
            .finish()
    }
}
