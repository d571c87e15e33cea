//! # Streaming Handles
//!
//! Caller-side handles returned by the [`super::client::CallDispatcher`] for streamed calls.
//!
//! Every handle of a call shares its terminal-status slot. Whichever half observes the end of
//! the call first (response, failure, deadline, cancellation or a broken transport) records
//! the status there, and the other half reports the same status from its next operation, so a
//! call is never left half-open.
use crate::call::{CallHandle, CallState, CallTerminated, after_terminal, end_of_stream};
use crate::context::CallContext;
use futures_util::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::DropGuard;
use tonic::{Code, Status, Streaming};

pub(crate) fn ok_status() -> Status {
    Status::new(Code::Ok, "")
}

/// The terminal status of the call, recording the context's reason first if it already ended.
fn terminated(call: &CallHandle, context: &CallContext) -> Option<Status> {
    call.terminal().or_else(|| {
        context
            .check()
            .err()
            .map(|reason| call.finish(reason.to_status()))
    })
}

/// Responses of a server streaming call.
pub struct ServerStream<Res> {
    inner: Streaming<Res>,
    context: CallContext,
    call: CallHandle,
}

impl<Res> ServerStream<Res> {
    pub(crate) fn new(inner: Streaming<Res>, context: CallContext, call: CallHandle) -> Self {
        Self {
            inner,
            context,
            call,
        }
    }

    /// Waits for the next response.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Res))` - The next response, in the order the callee produced them.
    /// * `Ok(None)` - The callee ended the sequence with `OK`.
    /// * `Err(Status)` - The call failed, timed out or was cancelled.
    pub async fn message(&mut self) -> Result<Option<Res>, Status> {
        if let Some(status) = terminated(&self.call, &self.context) {
            return end_of_stream(status);
        }

        let next = tokio::select! {
            biased;
            reason = self.context.done() => Err(reason.to_status()),
            next = self.inner.message() => next,
        };

        match next {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => end_of_stream(self.call.finish(ok_status())),
            Err(status) => end_of_stream(self.call.finish(status)),
        }
    }

    /// Cancels the call. The next [`ServerStream::message`] returns `CANCELLED`.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }

    /// Adapts the handle into a `Stream` that yields every response and, if the call fails,
    /// one final `Err(Status)`.
    pub fn into_stream(self) -> impl Stream<Item = Result<Res, Status>> {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.message().await {
                Ok(Some(message)) => Some((Ok(message), Some(stream))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
    }
}

/// Caller side of a client streaming call.
///
/// [`ClientStreamCall::close_and_receive`] consumes the handle, so no message can be submitted
/// after the end of input has been signalled. Dropping the handle without closing cancels the call.
pub struct ClientStreamCall<Req, Res> {
    outbound: mpsc::Sender<Req>,
    response: JoinHandle<Result<Res, Status>>,
    call: CallHandle,
    context: CallContext,
    guard: DropGuard,
}

impl<Req, Res> ClientStreamCall<Req, Res> {
    pub(crate) fn new(
        outbound: mpsc::Sender<Req>,
        response: JoinHandle<Result<Res, Status>>,
        call: CallHandle,
        context: CallContext,
    ) -> Self {
        let guard = context.drop_guard();
        Self {
            outbound,
            response,
            call,
            context,
            guard,
        }
    }

    /// Submits one message. Waits only while the outbound buffer is full.
    ///
    /// Fails with [`CallTerminated`] once the call has ended.
    pub async fn send(&self, message: Req) -> Result<(), CallTerminated> {
        if let Some(status) = terminated(&self.call, &self.context) {
            return after_terminal(status);
        }

        tokio::select! {
            biased;
            status = self.call.wait_terminal() => after_terminal(status),
            sent = self.outbound.send(message) => match sent {
                Ok(()) => Ok(()),
                // The request stream is gone, so the call task is about to record why.
                Err(_) => after_terminal(self.call.wait_terminal().await),
            },
        }
    }

    /// Signals the end of input and waits for the single response or the failure status.
    pub async fn close_and_receive(self) -> Result<Res, Status> {
        let Self {
            outbound,
            response,
            call,
            guard,
            ..
        } = self;
        drop(outbound);

        let outcome = match response.await {
            Ok(outcome) => outcome,
            Err(err) => Err(call.finish(Status::internal(format!("call task failed: {err}")))),
        };
        guard.disarm();
        outcome
    }

    pub fn cancel(&self) {
        self.context.cancel();
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }
}

/// Sending half of a bidirectional call.
///
/// Dropping it (or calling [`BidiSender::close`]) ends the outbound sequence without affecting
/// the receiving half.
pub struct BidiSender<Req> {
    outbound: mpsc::Sender<Req>,
    call: CallHandle,
    context: CallContext,
    _guard: Arc<DropGuard>,
}

/// Receiving half of a bidirectional call.
pub struct BidiReceiver<Res> {
    inbound: mpsc::UnboundedReceiver<Res>,
    call: CallHandle,
    context: CallContext,
    _guard: Arc<DropGuard>,
}

impl<Req> BidiSender<Req> {
    /// Builds both halves. The call is cancelled once both of them are dropped.
    pub(crate) fn pair<Res>(
        outbound: mpsc::Sender<Req>,
        inbound: mpsc::UnboundedReceiver<Res>,
        call: CallHandle,
        context: CallContext,
    ) -> (BidiSender<Req>, BidiReceiver<Res>) {
        let guard = Arc::new(context.drop_guard());
        let receiver = BidiReceiver {
            inbound,
            call: call.clone(),
            context: context.clone(),
            _guard: guard.clone(),
        };
        let sender = BidiSender {
            outbound,
            call,
            context,
            _guard: guard,
        };
        (sender, receiver)
    }

    /// Submits one message, preserving submission order.
    ///
    /// Once the call has ended, including a callee that completed with `OK` while the caller was
    /// still sending, this returns [`CallTerminated`] with the terminal status.
    pub async fn send(&self, message: Req) -> Result<(), CallTerminated> {
        if let Some(status) = terminated(&self.call, &self.context) {
            return after_terminal(status);
        }

        tokio::select! {
            biased;
            status = self.call.wait_terminal() => after_terminal(status),
            sent = self.outbound.send(message) => match sent {
                Ok(()) => Ok(()),
                Err(_) => after_terminal(self.call.wait_terminal().await),
            },
        }
    }

    /// Ends the outbound sequence. The receiving half keeps going until the callee ends its own.
    pub fn close(self) {}

    pub fn cancel(&self) {
        self.context.cancel();
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }
}

impl<Res> BidiReceiver<Res> {
    /// Waits for the next response.
    ///
    /// Responses that arrived before the call ended are delivered before the terminal status.
    pub async fn message(&mut self) -> Result<Option<Res>, Status> {
        match self.inbound.recv().await {
            Some(message) => Ok(Some(message)),
            // The pump records the terminal status before releasing the queue.
            None => end_of_stream(self.call.wait_terminal().await),
        }
    }

    pub fn cancel(&self) {
        self.context.cancel();
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }

    /// Adapts the half into a `Stream`, ending with one `Err(Status)` if the call fails.
    pub fn into_stream(self) -> impl Stream<Item = Result<Res, Status>> {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut receiver = state?;
            match receiver.message().await {
                Ok(Some(message)) => Some((Ok(message), Some(receiver))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
    }
}
