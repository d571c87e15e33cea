//! # Call Lifecycle
//!
//! A call is `Active` from the moment the dispatcher hands out its handle, and ends in one of
//! `Completed`, `Failed`, `Cancelled` or `TimedOut`. The terminal status lives in a single-assignment slot shared by every half of the call: the first writer
//! wins and every later reader sees the same `Status`.
use crate::status::StatusCode;
use std::sync::Arc;
use tokio::sync::watch;
use tonic::{Code, Status};
use tracing::debug;

/// The interaction shape of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Active,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        self != CallState::Active
    }

    pub fn from_status(status: &Status) -> Self {
        match StatusCode::from(status) {
            StatusCode::Ok => CallState::Completed,
            StatusCode::Cancelled => CallState::Cancelled,
            StatusCode::DeadlineExceeded => CallState::TimedOut,
            _ => CallState::Failed,
        }
    }
}

/// Returned by an outbound operation on a call that already reached a terminal state, carrying
/// that state's status (`OK` included).
#[derive(Debug, Clone, thiserror::Error)]
#[error("call already terminated with {}: {}", .0.code(), .0.message())]
pub struct CallTerminated(pub Status);

impl CallTerminated {
    pub fn status(&self) -> &Status {
        &self.0
    }

    pub fn code(&self) -> StatusCode {
        StatusCode::from(&self.0)
    }
}

/// Shared handle over the terminal-status slot of one call.
#[derive(Debug, Clone)]
pub(crate) struct CallHandle {
    inner: Arc<CallInner>,
}

#[derive(Debug)]
struct CallInner {
    method: String,
    shape: Shape,
    terminal: watch::Sender<Option<Status>>,
}

impl CallHandle {
    pub(crate) fn new(method: String, shape: Shape) -> Self {
        let (terminal, _) = watch::channel(None);
        debug!(%method, ?shape, "call started");
        Self {
            inner: Arc::new(CallInner {
                method,
                shape,
                terminal,
            }),
        }
    }

    /// Records the terminal status. Returns the status that won, which is `status` only if the
    /// slot was still empty.
    pub(crate) fn finish(&self, status: Status) -> Status {
        let mut won = false;
        self.inner.terminal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            debug!(
                method = %self.inner.method,
                shape = ?self.inner.shape,
                code = ?status.code(),
                "call finished"
            );
            *slot = Some(status.clone());
            won = true;
            true
        });

        if won {
            status
        } else {
            self.terminal().unwrap_or(status)
        }
    }

    pub(crate) fn terminal(&self) -> Option<Status> {
        self.inner.terminal.borrow().clone()
    }

    /// Waits until some half of the call records a terminal status.
    pub(crate) async fn wait_terminal(&self) -> Status {
        let mut receiver = self.inner.terminal.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or_else(|| Status::internal("empty terminal slot")),
            // The sender lives inside `self`, it cannot be dropped while we wait.
            Err(_) => Status::internal("call state dropped"),
        }
    }

    pub(crate) fn state(&self) -> CallState {
        match self.inner.terminal.borrow().as_ref() {
            Some(status) => CallState::from_status(status),
            None => CallState::Active,
        }
    }
}

/// Maps a terminal status to the end-of-stream result seen by a reader.
pub(crate) fn end_of_stream<T>(status: Status) -> Result<Option<T>, Status> {
    if status.code() == Code::Ok {
        Ok(None)
    } else {
        Err(status)
    }
}

/// Result of an outbound operation once the call has ended, successfully or not.
pub(crate) fn after_terminal(status: Status) -> Result<(), CallTerminated> {
    Err(CallTerminated(status))
}
