//! # Callwire Core
//!
//! `callwire-core` is the call layer behind the `callwire` server and CLI. It drives the four
//! gRPC call shapes (unary, server streaming, client streaming and bidirectional streaming)
//! with deadlines, cancellation and a closed status taxonomy, and it hosts the three demo
//! services that exercise them.
//!
//! ## Key Components
//!
//! * **[`CallDispatcher`]:** Runs typed calls against any `GrpcService`, either a real
//!   [`tonic::transport::Channel`] or an in-process server.
//! * **[`CallContext`]:** Deadline plus cancellation token attached to a call on both ends.
//! * **[`StatusCode`] & [`ServiceError`]:** The closed error taxonomy and its mapping onto
//!   `tonic::Status`.
//! * **[`services`]:** Calculator, greet and blog (CRUD over a [`store::DocumentStore`]) services.
//! * **[`server`] & [`client`]:** Transport setup, optionally over TLS.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `tonic` and the generated schemas so that consumers
//! use compatible versions of these underlying dependencies.
pub mod call;
pub mod client;
pub mod config;
pub mod context;
pub mod grpc;
pub mod server;
pub mod services;
pub mod status;
pub mod store;

pub use call::{CallState, CallTerminated, Shape};
pub use context::CallContext;
pub use grpc::client::{CallDispatcher, CallOptions};
pub use status::{ServiceError, StatusCode};

// Re-exports
pub use callwire_proto as proto;
pub use prost;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
