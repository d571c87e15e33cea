//! # Typed gRPC Call Layer
//!
//! This module contains the building blocks for performing and serving calls of the four
//! gRPC shapes.
//!
//! * [`method`]: Static descriptors binding an operation path to its message types and shape.
//! * [`client`]: The [`client::CallDispatcher`], which drives calls on the caller side.
//! * [`streaming`]: Caller-side handles for streamed calls.
//! * [`sink`]: Callee-side helpers used by handlers that produce or consume streams.
pub mod client;
pub mod method;
pub mod sink;
pub mod streaming;
