//! # Client Connection
//!
//! Opens a [`Channel`] to a `callwire` server and wraps it in a [`CallDispatcher`].
//!
//! ```rust,no_run
//! use callwire_core::client::{ClientOptions, connect};
//! use callwire_core::services::calculator::methods;
//! use callwire_core::proto::calculator::v1::SumRequest;
//! use callwire_core::CallOptions;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dispatcher = connect("http://localhost:50051", ClientOptions::default()).await?;
//! let request = SumRequest { first: 3, second: 10 };
//! let response = dispatcher.unary(&methods::SUM, request, CallOptions::new()).await??;
//! assert_eq!(response.result, 13);
//! # Ok(())
//! # }
//! ```
use crate::grpc::client::CallDispatcher;
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info};

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ClientConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Invalid TLS configuration: {0}")]
    Tls(#[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// PEM trust bundle used to verify the server. Enables TLS.
    pub ca_certificate: Option<Vec<u8>>,
    /// Name checked against the server certificate, when it differs from the URL host.
    pub domain_name: Option<String>,
    pub connect_timeout: Option<Duration>,
}

/// Connects to the server at `url` (e.g. `http://localhost:50051`).
pub async fn connect(
    url: &str,
    options: ClientOptions,
) -> Result<CallDispatcher<Channel>, ClientConnectError> {
    info!(url, "Connecting to gRPC server");

    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(|e| ClientConnectError::InvalidUrl(url.to_string(), e))?;

    if let Some(ca) = options.ca_certificate {
        debug!("Configuring TLS for client");
        let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));
        if let Some(domain) = options.domain_name {
            tls = tls.domain_name(domain);
        }
        endpoint = endpoint.tls_config(tls).map_err(ClientConnectError::Tls)?;
    }

    if let Some(timeout) = options.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| ClientConnectError::ConnectionFailed(url.to_string(), e))?;

    debug!("gRPC client connected");
    Ok(CallDispatcher::new(channel))
}
