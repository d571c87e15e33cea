//! # Response Sink
//!
//! Handler-side plumbing for streamed responses. A handler producing a response sequence
//! writes into a [`ResponseSink`]; the paired receiver is what gets returned to `tonic` as the
//! response stream. Every write is a safe point: once the call context terminates, or the
//! transport drops the stream because the caller went away, the next write fails and the
//! handler stops producing.
use crate::context::CallContext;
use crate::status::ServiceError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Status, Streaming};

/// Response stream type handed back to `tonic`.
pub type ResponseStream<T> = ReceiverStream<Result<T, Status>>;

pub struct ResponseSink<T> {
    tx: mpsc::Sender<Result<T, Status>>,
    context: CallContext,
}

impl<T> ResponseSink<T> {
    pub fn channel(context: CallContext, capacity: usize) -> (Self, ResponseStream<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, context }, ReceiverStream::new(rx))
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Safe point for work between two responses: fails once the context has terminated or the
    /// caller stopped listening.
    pub fn check(&self) -> Result<(), ServiceError> {
        self.context.check()?;
        if self.tx.is_closed() {
            return Err(caller_gone());
        }
        Ok(())
    }

    /// Emits one response, waiting while the transport applies backpressure.
    pub async fn send(&self, item: T) -> Result<(), ServiceError> {
        self.context.check()?;
        tokio::select! {
            biased;
            reason = self.context.done() => Err(reason),
            _ = self.tx.closed() => Err(caller_gone()),
            sent = self.tx.send(Ok(item)) => sent.map_err(|_| caller_gone()),
        }
    }

    /// Waits between two responses. A zero delay does not yield.
    pub async fn pace(&self, delay: Duration) -> Result<(), ServiceError> {
        if delay.is_zero() {
            return self.context.check();
        }
        self.context.sleep(delay).await
    }

    /// Ends the sequence with a failure status. No response follows it.
    ///
    /// A sequence cut short by the deadline or a cancellation must end this way, otherwise the
    /// transport closes it with `OK`.
    pub async fn fail(self, err: ServiceError) {
        // Nothing to do if the caller is gone already.
        let _ = self.tx.send(Err(Status::from(err))).await;
    }
}

/// Reads the next message of an inbound request stream, racing it against the call context.
pub async fn recv_inbound<T>(
    context: &CallContext,
    inbound: &mut Streaming<T>,
) -> Result<Option<T>, ServiceError> {
    context.run(async { inbound.message().await.map_err(ServiceError::from) }).await
}

fn caller_gone() -> ServiceError {
    ServiceError::Cancelled("the caller stopped listening".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_send_fails_once_receiver_is_dropped() {
        let (sink, stream) = ResponseSink::<u32>::channel(CallContext::new(), 1);
        drop(stream);

        let err = sink.send(1).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::Cancelled);
    }

    #[tokio::test]
    async fn test_fail_ends_the_stream_with_status() {
        let (sink, mut stream) = ResponseSink::<u32>::channel(CallContext::new(), 4);

        sink.send(7).await.unwrap();
        sink.fail(ServiceError::Internal("boom".to_string())).await;

        assert_eq!(stream.next().await.unwrap().unwrap(), 7);
        let status = stream.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_check_notices_the_caller_leaving() {
        let (sink, stream) = ResponseSink::<u32>::channel(CallContext::new(), 1);
        assert!(sink.check().is_ok());

        drop(stream);

        let err = sink.check().unwrap_err();
        assert_eq!(err.code(), StatusCode::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_stops_at_deadline() {
        let context = CallContext::new().with_timeout(Duration::from_millis(100));
        let (sink, _stream) = ResponseSink::<u32>::channel(context, 1);

        let err = sink.pace(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::DeadlineExceeded);
    }
}
