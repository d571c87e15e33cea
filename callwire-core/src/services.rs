//! # Services
//!
//! Handler implementations of the three services served by `callwire`, and the static
//! [`crate::grpc::method::Method`] descriptors callers use to reach them (`<service>::methods`).
pub mod blog;
pub mod calculator;
pub mod greet;

use crate::config::ServerConfig;
use crate::store::DocumentStore;
use blog::BlogServiceImpl;
use calculator::CalculatorServiceImpl;
use greet::GreetServiceImpl;
use std::sync::Arc;

/// Every service served on one endpoint.
pub struct ServiceSet<S> {
    pub calculator: CalculatorServiceImpl,
    pub greet: GreetServiceImpl,
    pub blog: BlogServiceImpl<S>,
}

impl<S: DocumentStore> ServiceSet<S> {
    pub fn from_config(config: &ServerConfig, store: Arc<S>) -> Self {
        Self {
            calculator: CalculatorServiceImpl::new(),
            greet: GreetServiceImpl::new(config.greet_settings()),
            blog: BlogServiceImpl::new(store).with_list_pacing(config.list_pacing()),
        }
    }
}
