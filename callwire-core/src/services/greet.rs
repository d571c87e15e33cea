//! # Greet Service
//!
//! Greetings over the four call shapes, plus a deliberately slow operation that honours the
//! caller's deadline.
use crate::context::CallContext;
use crate::grpc::sink::{ResponseSink, ResponseStream, recv_inbound};
use crate::proto::GreetService;
use crate::proto::greet::v1::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse, Greeting,
    LongGreetRequest, LongGreetResponse,
};
use crate::status::ServiceError;
use std::time::Duration;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument};

const RESPONSE_BUFFER: usize = 16;

pub mod methods {
    use crate::grpc::method::{Bidirectional, ClientStreaming, Method, ServerStreaming, Unary};
    use crate::proto::greet::v1::*;

    pub const SERVICE: &str = "greet.v1.GreetService";

    pub const GREET: Method<GreetRequest, GreetResponse, Unary> = Method::new(SERVICE, "Greet");
    pub const GREET_MANY_TIMES: Method<GreetManyTimesRequest, GreetManyTimesResponse, ServerStreaming> =
        Method::new(SERVICE, "GreetManyTimes");
    pub const LONG_GREET: Method<LongGreetRequest, LongGreetResponse, ClientStreaming> =
        Method::new(SERVICE, "LongGreet");
    pub const GREET_EVERYONE: Method<GreetEveryoneRequest, GreetEveryoneResponse, Bidirectional> =
        Method::new(SERVICE, "GreetEveryone");
    pub const GREET_WITH_DEADLINE: Method<GreetWithDeadlineRequest, GreetWithDeadlineResponse, Unary> =
        Method::new(SERVICE, "GreetWithDeadline");
}

/// Tunables of the greet service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetSettings {
    /// Number of responses of `GreetManyTimes`.
    pub repeat: u32,
    /// Delay between two `GreetManyTimes` responses.
    pub pacing: Duration,
    /// Work steps performed by `GreetWithDeadline`.
    pub deadline_steps: u32,
    /// Duration of one work step.
    pub deadline_step: Duration,
}

impl Default for GreetSettings {
    fn default() -> Self {
        Self {
            repeat: 10,
            pacing: Duration::from_millis(1000),
            deadline_steps: 3,
            deadline_step: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct GreetServiceImpl {
    settings: GreetSettings,
}

impl GreetServiceImpl {
    pub fn new(settings: GreetSettings) -> Self {
        Self { settings }
    }
}

fn first_name(greeting: Option<Greeting>) -> Result<String, ServiceError> {
    greeting
        .map(|greeting| greeting.first_name)
        .ok_or_else(|| ServiceError::InvalidArgument("missing greeting".to_string()))
}

#[tonic::async_trait]
impl GreetService for GreetServiceImpl {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    #[instrument(skip_all)]
    async fn greet(&self, request: Request<GreetRequest>) -> Result<Response<GreetResponse>, Status> {
        let name = first_name(request.into_inner().greeting)?;
        info!(%name, "Greet invoked");

        Ok(Response::new(GreetResponse {
            result: format!("Hello {name}"),
        }))
    }

    #[instrument(skip_all)]
    async fn greet_many_times(
        &self,
        request: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, Status> {
        let context = CallContext::from_request(&request);
        let name = first_name(request.into_inner().greeting)?;
        info!(%name, "GreetManyTimes invoked");

        let GreetSettings { repeat, pacing, .. } = self.settings;
        let (sink, stream) = ResponseSink::channel(context, RESPONSE_BUFFER);
        tokio::spawn(async move {
            for i in 0..repeat {
                if i > 0
                    && let Err(err) = sink.pace(pacing).await
                {
                    return sink.fail(err).await;
                }
                let result = format!("Hello {name} number {i}");
                if let Err(err) = sink.send(GreetManyTimesResponse { result }).await {
                    debug!(%err, "greeting stopped");
                    return sink.fail(err).await;
                }
            }
        });

        Ok(Response::new(stream))
    }

    #[instrument(skip_all)]
    async fn long_greet(
        &self,
        request: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, Status> {
        let context = CallContext::from_request(&request);
        let mut inbound = request.into_inner();
        info!("LongGreet invoked");

        let mut result = String::new();
        while let Some(LongGreetRequest { greeting }) = recv_inbound(&context, &mut inbound).await? {
            let name = first_name(greeting)?;
            result.push_str(&format!("Hello {name}! "));
        }

        Ok(Response::new(LongGreetResponse { result }))
    }

    #[instrument(skip_all)]
    async fn greet_everyone(
        &self,
        request: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, Status> {
        let context = CallContext::from_request(&request);
        let mut inbound = request.into_inner();
        info!("GreetEveryone invoked");

        let (sink, stream) = ResponseSink::channel(context, RESPONSE_BUFFER);
        tokio::spawn(async move {
            loop {
                let next = recv_inbound(sink.context(), &mut inbound).await;
                let greeting = match next {
                    Ok(Some(GreetEveryoneRequest { greeting })) => greeting,
                    Ok(None) => return,
                    Err(err) => return sink.fail(err).await,
                };
                let name = match first_name(greeting) {
                    Ok(name) => name,
                    Err(err) => return sink.fail(err).await,
                };
                let result = format!("hello {name}! ");
                if let Err(err) = sink.send(GreetEveryoneResponse { result }).await {
                    debug!(%err, "greeting stopped");
                    return sink.fail(err).await;
                }
            }
        });

        Ok(Response::new(stream))
    }

    #[instrument(skip_all)]
    async fn greet_with_deadline(
        &self,
        request: Request<GreetWithDeadlineRequest>,
    ) -> Result<Response<GreetWithDeadlineResponse>, Status> {
        let context = CallContext::from_request(&request);
        let name = first_name(request.into_inner().greeting)?;
        info!(%name, deadline = ?context.remaining(), "GreetWithDeadline invoked");

        for step in 0..self.settings.deadline_steps {
            context.check()?;
            debug!(step, "working");
            context.sleep(self.settings.deadline_step).await?;
        }

        Ok(Response::new(GreetWithDeadlineResponse {
            result: format!("Hello {name}"),
        }))
    }
}
