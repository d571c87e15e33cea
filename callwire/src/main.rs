//! # Callwire CLI Entry Point
//!
//! The main executable of `callwire`. It either runs the server or performs one call:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the
//!    `tracing` subscriber (filtered by `RUST_LOG`, `info` by default).
//! 2. **Serve**: Loads the [`ServerConfig`], applies the flag overrides and serves every
//!    service until ctrl-c.
//! 3. **Call**: Connects to the server and drives the requested operation with the call shape
//!    it declares, printing each response as JSON as soon as it arrives.
//!
//! Any failure is printed to standard error and the process exits with status 1.

mod cli;
mod formatter;

use anyhow::Context;
use callwire_core::client::{ClientOptions, connect};
use callwire_core::config::{ServerConfig, TlsConfig};
use callwire_core::grpc::method::{Bidirectional, ClientStreaming, Method, ServerStreaming, Unary};
use callwire_core::prost::Message;
use callwire_core::proto::blog::v1::{
    Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
    UpdateBlogRequest,
};
use callwire_core::proto::calculator::v1::{
    ComputeAverageRequest, FindMaximumRequest, PrimeNumberDecompositionRequest, SquareRootRequest,
    SumRequest,
};
use callwire_core::proto::greet::v1::{
    GreetEveryoneRequest, GreetManyTimesRequest, GreetRequest, GreetWithDeadlineRequest,
    Greeting, LongGreetRequest,
};
use callwire_core::server::GrpcServerBuilder;
use callwire_core::services::{ServiceSet, blog, calculator, greet};
use callwire_core::store::InMemoryStore;
use callwire_core::{CallDispatcher, CallOptions};
use clap::Parser;
use cli::{BlogCommand, BlogFields, CalcCommand, CallArgs, Cli, Commands, GreetCommand, ServeArgs, Target};
use formatter::FormattedString;
use serde::Serialize;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Cli::parse();

    let outcome = match args.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Call(args) => call(args).await,
    };

    if let Err(err) = outcome {
        eprintln!("{}", FormattedString::from(err));
        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    if let Some(addr) = args.addr {
        config.listen_addr = addr;
    }
    if let (Some(cert_path), Some(key_path)) = (args.tls_cert, args.tls_key) {
        config.tls = Some(TlsConfig {
            cert_path,
            key_path,
        });
    }
    if args.no_reflection {
        config.reflection = false;
    }

    let store = Arc::new(InMemoryStore::new());
    let services = ServiceSet::from_config(&config, store);

    GrpcServerBuilder::from_config(&config)?
        .serve(services, shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Failed to listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn call(args: CallArgs) -> anyhow::Result<()> {
    let ca_certificate = args
        .ca
        .as_ref()
        .map(std::fs::read)
        .transpose()
        .context("Failed to read the CA file")?;

    let options = ClientOptions {
        ca_certificate,
        domain_name: args.domain,
        connect_timeout: Some(CONNECT_TIMEOUT),
    };
    let mut dispatcher = connect(&args.url, options).await?;

    // The deadline starts once connected.
    let mut call_options = CallOptions::new();
    if let Some(timeout) = args.timeout {
        call_options = call_options.with_timeout(timeout);
    }
    for (key, value) in args.headers {
        call_options = call_options.with_header(key, value);
    }

    let client = &mut dispatcher;
    match args.target {
        Target::Calc { op } => run_calc(client, op, call_options).await,
        Target::Greet { op } => run_greet(client, op, call_options).await,
        Target::Blog { op } => run_blog(client, op, call_options).await,
    }
}

async fn run_calc(
    client: &mut CallDispatcher,
    op: CalcCommand,
    options: CallOptions,
) -> anyhow::Result<()> {
    use calculator::methods;

    match op {
        CalcCommand::Sum { first, second } => {
            unary(client, &methods::SUM, SumRequest { first, second }, options).await
        }
        CalcCommand::Primes { number } => {
            let request = PrimeNumberDecompositionRequest { number };
            server_streaming(client, &methods::PRIME_NUMBER_DECOMPOSITION, request, options).await
        }
        CalcCommand::Average { numbers } => {
            let requests = numbers.into_iter().map(|number| ComputeAverageRequest { number });
            client_streaming(client, &methods::COMPUTE_AVERAGE, requests.collect(), options).await
        }
        CalcCommand::Max { numbers } => {
            let requests = numbers.into_iter().map(|number| FindMaximumRequest { number });
            bidirectional(client, &methods::FIND_MAXIMUM, requests.collect(), options).await
        }
        CalcCommand::Sqrt { number } => {
            unary(client, &methods::SQUARE_ROOT, SquareRootRequest { number }, options).await
        }
    }
}

fn greeting(first_name: String) -> Option<Greeting> {
    Some(Greeting {
        first_name,
        last_name: String::new(),
    })
}

async fn run_greet(
    client: &mut CallDispatcher,
    op: GreetCommand,
    options: CallOptions,
) -> anyhow::Result<()> {
    use greet::methods;

    match op {
        GreetCommand::Hello { name } => {
            let request = GreetRequest { greeting: greeting(name) };
            unary(client, &methods::GREET, request, options).await
        }
        GreetCommand::Many { name } => {
            let request = GreetManyTimesRequest { greeting: greeting(name) };
            server_streaming(client, &methods::GREET_MANY_TIMES, request, options).await
        }
        GreetCommand::Long { names } => {
            let requests = names
                .into_iter()
                .map(|name| LongGreetRequest { greeting: greeting(name) });
            client_streaming(client, &methods::LONG_GREET, requests.collect(), options).await
        }
        GreetCommand::Everyone { names } => {
            let requests = names
                .into_iter()
                .map(|name| GreetEveryoneRequest { greeting: greeting(name) });
            bidirectional(client, &methods::GREET_EVERYONE, requests.collect(), options).await
        }
        GreetCommand::Deadline { name } => {
            let request = GreetWithDeadlineRequest { greeting: greeting(name) };
            unary(client, &methods::GREET_WITH_DEADLINE, request, options).await
        }
    }
}

fn blog_from(id: String, fields: BlogFields) -> Option<Blog> {
    Some(Blog {
        id,
        author_id: fields.author,
        title: fields.title,
        content: fields.content,
    })
}

async fn run_blog(
    client: &mut CallDispatcher,
    op: BlogCommand,
    options: CallOptions,
) -> anyhow::Result<()> {
    use blog::methods;

    match op {
        BlogCommand::Create(fields) => {
            let request = CreateBlogRequest { blog: blog_from(String::new(), fields) };
            unary(client, &methods::CREATE_BLOG, request, options).await
        }
        BlogCommand::Read { id } => {
            unary(client, &methods::READ_BLOG, ReadBlogRequest { blog_id: id }, options).await
        }
        BlogCommand::Update { id, fields } => {
            let request = UpdateBlogRequest { blog: blog_from(id, fields) };
            unary(client, &methods::UPDATE_BLOG, request, options).await
        }
        BlogCommand::Delete { id } => {
            unary(client, &methods::DELETE_BLOG, DeleteBlogRequest { blog_id: id }, options).await
        }
        BlogCommand::List => {
            server_streaming(client, &methods::LIST_BLOG, ListBlogRequest {}, options).await
        }
    }
}

fn print_message<T: Serialize>(message: &T) -> anyhow::Result<()> {
    let value = serde_json::to_value(message).context("Failed to render the response")?;
    println!("{}", FormattedString::from(value));
    Ok(())
}

async fn unary<Req, Res>(
    client: &mut CallDispatcher,
    method: &Method<Req, Res, Unary>,
    request: Req,
    options: CallOptions,
) -> anyhow::Result<()>
where
    Req: Message + Send + Sync + 'static,
    Res: Message + Default + Serialize + Send + Sync + 'static,
{
    let response = client.unary(method, request, options).await??;
    print_message(&response)
}

async fn server_streaming<Req, Res>(
    client: &mut CallDispatcher,
    method: &Method<Req, Res, ServerStreaming>,
    request: Req,
    options: CallOptions,
) -> anyhow::Result<()>
where
    Req: Message + Send + Sync + 'static,
    Res: Message + Default + Serialize + Send + Sync + 'static,
{
    let mut stream = client.server_streaming(method, request, options).await??;
    while let Some(response) = stream.message().await? {
        print_message(&response)?;
    }
    Ok(())
}

async fn client_streaming<Req, Res>(
    client: &mut CallDispatcher,
    method: &Method<Req, Res, ClientStreaming>,
    requests: Vec<Req>,
    options: CallOptions,
) -> anyhow::Result<()>
where
    Req: Message + Send + Sync + 'static,
    Res: Message + Default + Serialize + Send + Sync + 'static,
{
    let call = client.client_streaming(method, options).await?;
    for request in requests {
        // The terminal status is reported by `close_and_receive`.
        if call.send(request).await.is_err() {
            break;
        }
    }
    let response = call.close_and_receive().await?;
    print_message(&response)
}

async fn bidirectional<Req, Res>(
    client: &mut CallDispatcher,
    method: &Method<Req, Res, Bidirectional>,
    requests: Vec<Req>,
    options: CallOptions,
) -> anyhow::Result<()>
where
    Req: Message + Send + Sync + 'static,
    Res: Message + Default + Serialize + Send + Sync + 'static,
{
    let (sender, mut receiver) = client.bidirectional(method, options).await?;

    let send_task = tokio::spawn(async move {
        for request in requests {
            if sender.send(request).await.is_err() {
                return;
            }
        }
        sender.close();
    });

    while let Some(response) = receiver.message().await? {
        print_message(&response)?;
    }
    send_task.await.context("The send task failed")?;
    Ok(())
}
