//! The seam between the session engine and whatever moves bytes.
//!
//! # Design
//! A transport takes a translated request plus the bridge for that
//! transfer, and drives the bridge's callbacks as the exchange progresses.
//! It must call them from one place at a time, in wire order, and must end
//! every transfer with `on_finished` (possibly after `on_error`), including
//! cancelled and timed-out ones.
//!
//! Transports are constructed explicitly and passed to a `Session`; there is
//! no process-wide instance.

use tokio_util::sync::CancellationToken;

use crate::bridge::DelegateBridge;
use crate::translate::WireRequest;

pub trait Transport: Send + Sync {
    /// Start executing `request`. Never blocks on the exchange itself.
    ///
    /// `request.deadline` is absolute; missing it ends the transfer with
    /// `TransportError::Timeout`.
    fn execute(&self, request: WireRequest, bridge: DelegateBridge) -> TransferHandle;

    /// Stop accepting transfers and wind down in-flight ones. Later calls to
    /// `execute` fail their transfer with `TransportError::Shutdown`.
    fn shutdown(&self);
}

/// Cancels one in-flight transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    token: CancellationToken,
}

impl TransferHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Request cancellation. Repeated calls, and calls after the transfer
    /// has finished, do nothing.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
