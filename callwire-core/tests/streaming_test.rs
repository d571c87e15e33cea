use callwire_core::grpc::sink::{ResponseSink, ResponseStream};
use callwire_core::proto::greet::v1::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse, Greeting,
    LongGreetRequest, LongGreetResponse,
};
use callwire_core::proto::{CalculatorServiceServer, GreetService, GreetServiceServer};
use callwire_core::proto::calculator::v1::FindMaximumRequest;
use callwire_core::services::calculator::{self, CalculatorServiceImpl};
use callwire_core::services::greet::{self, GreetServiceImpl};
use callwire_core::{CallContext, CallDispatcher, CallOptions, CallState, StatusCode};
use std::time::Duration;
use tonic::{Request, Response, Status, Streaming};

fn greeting(first_name: &str) -> Option<Greeting> {
    Some(Greeting {
        first_name: first_name.to_string(),
        last_name: String::new(),
    })
}

fn greet_dispatcher() -> CallDispatcher<GreetServiceServer<GreetServiceImpl>> {
    CallDispatcher::new(GreetServiceServer::new(GreetServiceImpl::default()))
}

#[tokio::test]
async fn test_send_after_failure_reports_terminal_status() {
    let mut client = greet_dispatcher();

    let call = client
        .client_streaming(&greet::methods::LONG_GREET, CallOptions::new())
        .await
        .unwrap();

    // A message without greeting makes the callee fail straight away.
    call.send(LongGreetRequest { greeting: None }).await.unwrap();

    let mut terminated = None;
    for _ in 0..10_000 {
        match call.send(LongGreetRequest { greeting: greeting("Ada") }).await {
            Ok(()) => tokio::task::yield_now().await,
            Err(err) => {
                terminated = Some(err);
                break;
            }
        }
    }

    let err = terminated.expect("sending never observed the failure");
    assert_eq!(err.code(), StatusCode::InvalidArgument);
    assert_eq!(call.state(), CallState::Failed);

    let status = call.close_and_receive().await.unwrap_err();
    assert_eq!(StatusCode::from(&status), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_bidi_caller_that_never_reads_still_sends_everything() {
    let mut client = greet_dispatcher();

    let (sender, mut receiver) = client
        .bidirectional(&greet::methods::GREET_EVERYONE, CallOptions::new())
        .await
        .unwrap();

    for i in 0..500 {
        let name = format!("guest-{i}");
        sender
            .send(GreetEveryoneRequest { greeting: greeting(&name) })
            .await
            .unwrap();
    }
    sender.close();

    let mut received = 0;
    while let Some(response) = receiver.message().await.unwrap() {
        assert_eq!(response.result, format!("hello guest-{received}! "));
        received += 1;
    }
    assert_eq!(received, 500);
}

#[tokio::test]
async fn test_closing_send_side_keeps_receive_side_open() {
    let mut client =
        CallDispatcher::new(CalculatorServiceServer::new(CalculatorServiceImpl::new()));

    let (sender, mut receiver) = client
        .bidirectional(&calculator::methods::FIND_MAXIMUM, CallOptions::new())
        .await
        .unwrap();

    sender.send(FindMaximumRequest { number: 3 }).await.unwrap();
    sender.send(FindMaximumRequest { number: 9 }).await.unwrap();
    drop(sender);

    assert_eq!(receiver.message().await.unwrap().unwrap().maximum, 3);
    assert_eq!(receiver.message().await.unwrap().unwrap().maximum, 9);
    assert!(receiver.message().await.unwrap().is_none());
    assert_eq!(receiver.state(), CallState::Completed);
}

#[tokio::test]
async fn test_cancel_bidi_terminates_both_halves() {
    let mut client = greet_dispatcher();

    let (sender, mut receiver) = client
        .bidirectional(&greet::methods::GREET_EVERYONE, CallOptions::new())
        .await
        .unwrap();

    sender
        .send(GreetEveryoneRequest { greeting: greeting("Ada") })
        .await
        .unwrap();
    assert!(receiver.message().await.unwrap().is_some());

    sender.cancel();

    let status = receiver.message().await.unwrap_err();
    assert_eq!(StatusCode::from(&status), StatusCode::Cancelled);

    let err = sender
        .send(GreetEveryoneRequest { greeting: greeting("Grace") })
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Cancelled);
    assert_eq!(sender.state(), CallState::Cancelled);
}

#[tokio::test]
async fn test_cancelling_one_call_leaves_the_scope_alone() {
    let mut client = greet_dispatcher();
    let scope = CallContext::new();
    let options = CallOptions::new().with_context(scope.clone());

    let (first, mut first_rx) = client
        .bidirectional(&greet::methods::GREET_EVERYONE, options.clone())
        .await
        .unwrap();
    let (second, mut second_rx) = client
        .bidirectional(&greet::methods::GREET_EVERYONE, options)
        .await
        .unwrap();

    first.cancel();
    assert!(first_rx.message().await.is_err());
    assert!(!scope.is_cancelled());

    second
        .send(GreetEveryoneRequest { greeting: greeting("Ada") })
        .await
        .unwrap();
    assert_eq!(
        second_rx.message().await.unwrap().unwrap().result,
        "hello Ada! "
    );

    scope.cancel();
    let status = second_rx.message().await.unwrap_err();
    assert_eq!(StatusCode::from(&status), StatusCode::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_client_stream_deadline() {
    let mut client = greet_dispatcher();
    let options = CallOptions::new().with_timeout(Duration::from_millis(200));

    let call = client
        .client_streaming(&greet::methods::LONG_GREET, options)
        .await
        .unwrap();
    call.send(LongGreetRequest { greeting: greeting("Ada") })
        .await
        .unwrap();

    // The caller never closes its input, so only the deadline can end the call.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = call
        .send(LongGreetRequest { greeting: greeting("Grace") })
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::DeadlineExceeded);

    let status = call.close_and_receive().await.unwrap_err();
    assert_eq!(StatusCode::from(&status), StatusCode::DeadlineExceeded);
}

#[tokio::test]
async fn test_server_stream_as_stream() {
    use greet::GreetSettings;
    use tokio_stream::StreamExt;

    let settings = GreetSettings {
        repeat: 3,
        pacing: Duration::ZERO,
        ..GreetSettings::default()
    };
    let mut client = CallDispatcher::new(GreetServiceServer::new(GreetServiceImpl::new(settings)));

    let stream = client
        .server_streaming(
            &greet::methods::GREET_MANY_TIMES,
            GreetManyTimesRequest { greeting: greeting("Ada") },
            CallOptions::new(),
        )
        .await
        .unwrap()
        .unwrap();

    let results: Vec<_> = stream
        .into_stream()
        .map(|item| item.unwrap().result)
        .collect()
        .await;

    assert_eq!(
        results,
        vec!["Hello Ada number 0", "Hello Ada number 1", "Hello Ada number 2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_server_stream() {
    let mut client = greet_dispatcher();

    let mut stream = client
        .server_streaming(
            &greet::methods::GREET_MANY_TIMES,
            GreetManyTimesRequest { greeting: greeting("Ada") },
            CallOptions::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        stream.message().await.unwrap().unwrap().result,
        "Hello Ada number 0"
    );

    stream.cancel();

    let status = stream.message().await.unwrap_err();
    assert_eq!(StatusCode::from(&status), StatusCode::Cancelled);
    assert_eq!(stream.state(), CallState::Cancelled);
}

/// Ends every `GreetEveryone` call with `OK` right away, whatever the caller still sends.
struct ImmediateGreeter;

#[tonic::async_trait]
impl GreetService for ImmediateGreeter {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    async fn greet(&self, _: Request<GreetRequest>) -> Result<Response<GreetResponse>, Status> {
        Err(Status::unimplemented("greet"))
    }

    async fn greet_many_times(
        &self,
        _: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, Status> {
        Err(Status::unimplemented("greet_many_times"))
    }

    async fn long_greet(
        &self,
        _: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, Status> {
        Err(Status::unimplemented("long_greet"))
    }

    async fn greet_everyone(
        &self,
        _: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, Status> {
        let (_sink, stream) = ResponseSink::channel(CallContext::new(), 1);
        Ok(Response::new(stream))
    }

    async fn greet_with_deadline(
        &self,
        _: Request<GreetWithDeadlineRequest>,
    ) -> Result<Response<GreetWithDeadlineResponse>, Status> {
        Err(Status::unimplemented("greet_with_deadline"))
    }
}

#[tokio::test]
async fn test_bidi_send_after_ok_completion_is_rejected() {
    let mut client = CallDispatcher::new(GreetServiceServer::new(ImmediateGreeter));

    let (sender, mut receiver) = client
        .bidirectional(&greet::methods::GREET_EVERYONE, CallOptions::new())
        .await
        .unwrap();

    assert!(receiver.message().await.unwrap().is_none());
    assert_eq!(receiver.state(), CallState::Completed);

    let err = sender
        .send(GreetEveryoneRequest { greeting: greeting("Ada") })
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Ok);
    assert_eq!(sender.state(), CallState::Completed);
}
