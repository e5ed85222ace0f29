//! Per-exchange state threaded through every received event.
//!
//! # Design
//! Transitions take the state by value and hand back the successor, so a
//! stale snapshot can never be fed another event. Header lines produce a
//! genuinely new value. Body chunks mutate the drain the state exclusively
//! owns (memory buffer or open file) and hand the same state back.
//!
//! Terminal states are reached by consuming the state: `finish` yields a
//! `CompletedTransfer`, and any error ends the transfer with the state
//! dropped. Neither can be fed further events.
//!
//! `Http1Transport` builds its states with `DataDrain::Ignore`: the body a
//! task keeps (in memory or on disk) is retained by the task's
//! `DelegateBridge`, which picks the drain from the task's mode. A state's
//! own drain only retains bytes for callers that drive a `TransferState`
//! directly.

use bytes::Bytes;
use url::Url;

use crate::drain::DataDrain;
use crate::error::{ParseError, SessionError};
use crate::header::{HeaderOutcome, ParsedHeader};
use crate::http::{RequestBody, Response};

/// Where a live transfer is in its exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    AwaitingHeaders,
    HeaderInProgress(usize),
    HeadersComplete,
    BodyStreaming,
}

#[derive(Debug)]
pub struct TransferState {
    url: Url,
    header: ParsedHeader,
    response: Option<Response>,
    body_source: Option<RequestBody>,
    drain: DataDrain,
    body_bytes: u64,
}

impl TransferState {
    pub fn new(url: Url, drain: DataDrain) -> Self {
        Self {
            url,
            header: ParsedHeader::new(),
            response: None,
            body_source: None,
            drain,
            body_bytes: 0,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        match (&self.response, self.body_bytes) {
            (Some(_), 0) => TransferPhase::HeadersComplete,
            (Some(_), _) => TransferPhase::BodyStreaming,
            (None, _) if self.header.is_empty() => TransferPhase::AwaitingHeaders,
            (None, _) => TransferPhase::HeaderInProgress(self.header.len()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn body_source(&self) -> Option<&RequestBody> {
        self.body_source.as_ref()
    }

    pub fn drain(&self) -> &DataDrain {
        &self.drain
    }

    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// Feed one header line. The line that completes the block parses the
    /// response head.
    pub fn by_appending_header_line(self, line: &[u8]) -> Result<Self, SessionError> {
        if self.response.is_some() {
            return Err(SessionError::InvalidState("header line after headers completed"));
        }
        let Self {
            url,
            header,
            body_source,
            drain,
            ..
        } = self;

        match header.append_line(line)? {
            HeaderOutcome::Partial(header) => Ok(Self {
                url,
                header,
                response: None,
                body_source,
                drain,
                body_bytes: 0,
            }),
            HeaderOutcome::Complete(complete) => {
                let response = complete.parse_response(url.clone())?;
                tracing::trace!(url = %url, status = response.status_code, "response head complete");
                Ok(Self {
                    url,
                    header: ParsedHeader::new(),
                    response: Some(response),
                    body_source,
                    drain,
                    body_bytes: 0,
                })
            }
        }
    }

    /// Push a body chunk into the drain.
    pub fn by_appending_body_data(mut self, chunk: &[u8]) -> Result<Self, SessionError> {
        if self.response.is_none() {
            return Err(SessionError::InvalidState("body data before headers completed"));
        }
        self.drain.append(chunk)?;
        self.body_bytes += chunk.len() as u64;
        Ok(self)
    }

    /// Replace the outbound body source, e.g. to re-arm an upload.
    pub fn by_setting_body_source(self, source: RequestBody) -> Self {
        Self {
            body_source: Some(source),
            ..self
        }
    }

    /// End the transfer. Fails if the header block never completed.
    pub fn finish(mut self) -> Result<CompletedTransfer, SessionError> {
        let response = self
            .response
            .take()
            .ok_or(SessionError::Parse(ParseError::IncompleteHeader))?;
        self.drain.flush()?;
        Ok(CompletedTransfer {
            response,
            body: self.drain.into_bytes(),
            body_bytes: self.body_bytes,
        })
    }
}

/// Terminal success: the response head plus whatever the drain retained.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub response: Response,
    /// Retained body; empty unless the drain was in memory.
    pub body: Bytes,
    /// Body bytes seen, whatever the drain.
    pub body_bytes: u64,
}
