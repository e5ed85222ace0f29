//! Notification contracts a task can report through.
//!
//! # Design
//! A task's delegate is one of a fixed set of capability sets. Which set it
//! is gets decided when the delegate is attached, by the `Delegate` variant,
//! so the bridge never has to ask a delegate at runtime what it supports.
//! Every method has an empty default so implementors only write the ones
//! they care about.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::SessionError;
use crate::http::Response;
use crate::task::DataTask;

/// Task-level events: upload progress and completion.
pub trait TaskDelegate: Send + Sync {
    /// `total_expected` is `None` when the body length is not known up front.
    fn did_send_body_data(
        &self,
        _task: &DataTask,
        _bytes_sent: u64,
        _total_bytes_sent: u64,
        _total_expected: Option<u64>,
    ) {
    }

    /// Called exactly once per transfer; `error` is `None` on success.
    fn did_complete(&self, _task: &DataTask, _error: Option<&SessionError>) {}
}

/// Data-task events on top of the task-level ones.
pub trait DataTaskDelegate: TaskDelegate {
    fn did_receive_response(&self, _task: &DataTask, _response: &Response) {}

    /// Called once per received chunk, in arrival order.
    fn did_receive_data(&self, _task: &DataTask, _data: &Bytes) {}
}

/// A delegate together with the capability set it subscribes to.
#[derive(Clone)]
pub enum Delegate {
    Task(Arc<dyn TaskDelegate>),
    DataTask(Arc<dyn DataTaskDelegate>),
}

impl Delegate {
    pub fn task(delegate: Arc<dyn TaskDelegate>) -> Self {
        Delegate::Task(delegate)
    }

    pub fn data_task(delegate: Arc<dyn DataTaskDelegate>) -> Self {
        Delegate::DataTask(delegate)
    }

    pub(crate) fn did_send_body_data(&self, task: &DataTask, sent: u64, total: u64, expected: Option<u64>) {
        match self {
            Delegate::Task(d) => d.did_send_body_data(task, sent, total, expected),
            Delegate::DataTask(d) => d.did_send_body_data(task, sent, total, expected),
        }
    }

    pub(crate) fn did_complete(&self, task: &DataTask, error: Option<&SessionError>) {
        match self {
            Delegate::Task(d) => d.did_complete(task, error),
            Delegate::DataTask(d) => d.did_complete(task, error),
        }
    }

    /// The data-task half, when this delegate subscribed to it.
    pub(crate) fn data(&self) -> Option<&Arc<dyn DataTaskDelegate>> {
        match self {
            Delegate::DataTask(d) => Some(d),
            Delegate::Task(_) => None,
        }
    }
}

impl std::fmt::Debug for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delegate::Task(_) => f.write_str("Delegate::Task"),
            Delegate::DataTask(_) => f.write_str("Delegate::DataTask"),
        }
    }
}

/// Receives `(body, response, error)` once when a transfer ends.
pub type CompletionHandler = Box<dyn FnOnce(Bytes, Option<Response>, Option<SessionError>) + Send>;

/// Receives `(file, response, error)` once when a download ends. The path
/// is only set when the body was written out completely.
pub type DownloadHandler = Box<dyn FnOnce(Option<PathBuf>, Option<Response>, Option<SessionError>) + Send>;
