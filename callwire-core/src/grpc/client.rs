//! # Call Dispatcher
//!
//! This module wraps a standard `tonic` client to drive typed calls of the four shapes. It is
//! agnostic to the transport: any `GrpcService` works, which is how the integration tests run
//! the generated servers in-process.
//!
//! ## How it works
//!
//! * **Unary / Server Streaming**: the single request is attached when the call becomes active.
//!   The call is raced against its [`CallContext`], so a deadline or a cancellation ends it with
//!   `DEADLINE_EXCEEDED` / `CANCELLED` even if the callee never answers.
//! * **Client Streaming / Bidirectional**: the call runs in its own task fed by an outbound
//!   queue. The caller gets handles from [`super::streaming`] that can send and receive
//!   without blocking each other.
//!
//! The deadline of the context is forwarded to the callee as the `grpc-timeout` header.
use super::method::{Bidirectional, ClientStreaming, Method, ServerStreaming, Unary};
use super::streaming::{BidiReceiver, BidiSender, ClientStreamCall, ServerStream, ok_status};
use crate::{BoxError, call::CallHandle, context::CallContext};
use http_body::Body as HttpBody;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    Status,
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

/// Capacity of the outbound queue of streamed calls. `send` waits once it is full.
pub const OUTBOUND_BUFFER: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Per-call settings: deadline/cancellation and custom metadata.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Parent context. Every call runs on a child of it, so cancelling one call never
    /// cancels the caller's scope, while cancelling the scope cancels the call.
    pub context: CallContext,
    /// Custom gRPC metadata (headers) to attach to the request.
    pub headers: Vec<(String, String)>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.context = self.context.with_timeout(timeout);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Drives calls of every shape against a single endpoint.
#[derive(Debug, Clone)]
pub struct CallDispatcher<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> CallDispatcher<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(Res))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - The call ended with a failure status (including deadline and cancellation).
    /// * `Err(GrpcRequestError)` - Failed to build the request or the transport was not ready.
    pub async fn unary<Req, Res>(
        &mut self,
        method: &Method<Req, Res, Unary>,
        message: Req,
        options: CallOptions,
    ) -> Result<Result<Res, Status>, GrpcRequestError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Res: prost::Message + Default + Send + Sync + 'static,
    {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let context = options.context.child();
        let request = build_request(message, &options.headers, &context)?;
        let call = CallHandle::new(method.to_string(), method.shape());

        let outcome = race(
            &context,
            self.client.unary(request, method.path(), method.codec()),
        )
        .await
        .map(tonic::Response::into_inner);

        Ok(settle(&call, outcome))
    }

    /// Performs a Server Streaming call (Single Request -> Stream of Responses).
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(ServerStream))` - The callee accepted the call; responses follow on the stream.
    /// * `Ok(Err(Status))` - The call failed before the first response.
    /// * `Err(GrpcRequestError)` - Failed to build the request or the transport was not ready.
    pub async fn server_streaming<Req, Res>(
        &mut self,
        method: &Method<Req, Res, ServerStreaming>,
        message: Req,
        options: CallOptions,
    ) -> Result<Result<ServerStream<Res>, Status>, GrpcRequestError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Res: prost::Message + Default + Send + Sync + 'static,
    {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let context = options.context.child();
        let request = build_request(message, &options.headers, &context)?;
        let call = CallHandle::new(method.to_string(), method.shape());

        let opened = race(
            &context,
            self.client
                .server_streaming(request, method.path(), method.codec()),
        )
        .await;

        match opened {
            Ok(response) => Ok(Ok(ServerStream::new(response.into_inner(), context, call))),
            Err(status) => Ok(Err(call.finish(status))),
        }
    }

    /// Starts a Client Streaming call (Stream of Requests -> Single Response).
    ///
    /// The call runs in a background task; use [`ClientStreamCall::send`] to submit messages and
    /// [`ClientStreamCall::close_and_receive`] to end the input and wait for the response.
    pub async fn client_streaming<Req, Res>(
        &mut self,
        method: &Method<Req, Res, ClientStreaming>,
        options: CallOptions,
    ) -> Result<ClientStreamCall<Req, Res>, GrpcRequestError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Res: prost::Message + Default + Send + Sync + 'static,
    {
        let context = options.context.child();
        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let request = build_request(ReceiverStream::new(rx), &options.headers, &context)?;
        let call = CallHandle::new(method.to_string(), method.shape());

        let mut client = self.client.clone();
        let (path, codec) = (method.path(), method.codec());
        let (task_call, task_context) = (call.clone(), context.clone());

        let response = tokio::spawn(async move {
            let outcome = race(&task_context, async {
                ready(&mut client).await?;
                client.client_streaming(request, path, codec).await
            })
            .await
            .map(tonic::Response::into_inner);

            settle(&task_call, outcome)
        });

        Ok(ClientStreamCall::new(outbound, response, call, context))
    }

    /// Starts a Bidirectional Streaming call (Stream of Requests -> Stream of Responses).
    ///
    /// Returns two independent halves that can be moved to different tasks. Responses are
    /// pumped into an unbounded inbound queue by a background task, so a caller that never
    /// reads still completes its send sequence.
    pub async fn bidirectional<Req, Res>(
        &mut self,
        method: &Method<Req, Res, Bidirectional>,
        options: CallOptions,
    ) -> Result<(BidiSender<Req>, BidiReceiver<Res>), GrpcRequestError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Res: prost::Message + Default + Send + Sync + 'static,
    {
        let context = options.context.child();
        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let request = build_request(ReceiverStream::new(rx), &options.headers, &context)?;
        let call = CallHandle::new(method.to_string(), method.shape());

        let mut client = self.client.clone();
        let (path, codec) = (method.path(), method.codec());
        let (task_call, task_context) = (call.clone(), context.clone());

        tokio::spawn(async move {
            let opened = race(&task_context, async {
                ready(&mut client).await?;
                client.streaming(request, path, codec).await
            })
            .await;

            let mut responses = match opened {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    task_call.finish(status);
                    return;
                }
            };

            loop {
                match race(&task_context, responses.message()).await {
                    Ok(Some(message)) => {
                        // The receiving half may be gone; keep draining so the callee can
                        // finish consuming the outbound sequence.
                        let _ = inbound_tx.send(message);
                    }
                    Ok(None) => {
                        task_call.finish(ok_status());
                        break;
                    }
                    Err(status) => {
                        task_call.finish(status);
                        break;
                    }
                }
            }
        });

        Ok(BidiSender::pair(outbound, inbound, call, context))
    }
}

async fn ready<S>(client: &mut tonic::client::Grpc<S>) -> Result<(), Status>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
{
    client.ready().await.map_err(|e| {
        let e: BoxError = e.into();
        Status::unavailable(format!("client was not ready: {e}"))
    })
}

/// Runs `work` unless the call context terminates first.
async fn race<T, F>(context: &CallContext, work: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    if let Err(reason) = context.check() {
        return Err(reason.to_status());
    }
    tokio::select! {
        biased;
        reason = context.done() => Err(reason.to_status()),
        result = work => result,
    }
}

/// Records the outcome in the call's terminal slot and returns what the caller must observe.
fn settle<T>(call: &CallHandle, outcome: Result<T, Status>) -> Result<T, Status> {
    match outcome {
        Ok(value) => {
            call.finish(ok_status());
            Ok(value)
        }
        Err(status) => Err(call.finish(status)),
    }
}

fn build_request<T>(
    payload: T,
    headers: &[(String, String)],
    context: &CallContext,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key =
            MetadataKey::from_str(k).map_err(|source| GrpcRequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(v).map_err(|source| {
            GrpcRequestError::InvalidMetadataValue {
                key: k.clone(),
                source,
            }
        })?;
        request.metadata_mut().insert(key, val);
    }
    if let Some(remaining) = context.remaining() {
        request.set_timeout(remaining);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_rejects_invalid_header_key() {
        let headers = vec![("bad key".to_string(), "value".to_string())];
        let err = build_request((), &headers, &CallContext::new()).unwrap_err();
        assert!(matches!(err, GrpcRequestError::InvalidMetadataKey { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_request_forwards_deadline() {
        let context = CallContext::new().with_timeout(Duration::from_secs(1));
        let headers = vec![("x-request-id".to_string(), "abc".to_string())];

        let request = build_request((), &headers, &context).unwrap();

        assert!(request.metadata().get("grpc-timeout").is_some());
        assert_eq!(
            request.metadata().get("x-request-id").unwrap().to_str().unwrap(),
            "abc"
        );
    }
}
