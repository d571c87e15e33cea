//! # Call Context
//!
//! A [`CallContext`] carries the optional deadline and the cancellation token of one call.
//! The caller builds it before dispatching; the deadline travels to the callee in the standard
//! `grpc-timeout` header, where [`CallContext::from_request`] rebuilds an equivalent context
//! for the handler.
//!
//! Handlers check the context at safe points with [`CallContext::check`], or race their work
//! against it with [`CallContext::run`].
use crate::status::ServiceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::metadata::MetadataMap;
use tracing::debug;

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Deadline and cancellation signal of a single call.
///
/// Cloning shares the cancellation token. Use [`CallContext::child`] to derive a context that
/// observes the parent's cancellation without being able to cancel it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    /// A context without deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the call to finish within `timeout` from now.
    ///
    /// A timeout too large to be represented as an instant leaves the context unbounded.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => {
                debug!(?timeout, "timeout out of range, no deadline attached");
                self
            }
        }
    }

    /// Attaches an absolute deadline. If the context already has an earlier one, it is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derives a context for a nested call: same deadline, cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// Rebuilds the caller's context on the callee side from the request metadata.
    pub fn from_request<T>(request: &tonic::Request<T>) -> Self {
        Self::from_metadata(request.metadata())
    }

    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                let parsed = parse_grpc_timeout(value);
                if parsed.is_none() {
                    debug!(value, "ignoring malformed grpc-timeout header");
                }
                parsed
            });

        match timeout {
            Some(timeout) => Self::new().with_timeout(timeout),
            None => Self::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels the context when the returned guard is dropped.
    ///
    /// Caller-side handles hold one so that dropping the handle cancels the call.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Safe-point check: fails once the deadline has passed or the call was cancelled.
    pub fn check(&self) -> Result<(), ServiceError> {
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(deadline_exceeded());
        }
        if self.token.is_cancelled() {
            return Err(cancelled());
        }
        Ok(())
    }

    /// Resolves with the terminal reason as soon as the deadline passes or the call is cancelled.
    /// Never resolves for a context without deadline that is never cancelled.
    pub async fn done(&self) -> ServiceError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => deadline_exceeded(),
                    _ = self.token.cancelled() => cancelled(),
                }
            }
            None => {
                self.token.cancelled().await;
                cancelled()
            }
        }
    }

    /// Runs `work` unless the context terminates first.
    pub async fn run<T, F>(&self, work: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            result = work => result,
        }
    }

    /// Sleeps for `duration`, waking up early with an error if the context terminates.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ServiceError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

fn deadline_exceeded() -> ServiceError {
    ServiceError::DeadlineExceeded("the call deadline has passed".to_string())
}

fn cancelled() -> ServiceError {
    ServiceError::Cancelled("the call was cancelled".to_string())
}

/// Parses a `grpc-timeout` header value: at most 8 ASCII digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u` or `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}
