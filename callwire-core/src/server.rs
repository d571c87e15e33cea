//! # Server
//!
//! Serves a [`ServiceSet`] on a single endpoint, optionally over TLS and with the gRPC
//! reflection service, until a shutdown signal resolves.
use crate::config::ServerConfig;
use crate::proto::{BlogServiceServer, CalculatorServiceServer, FILE_DESCRIPTOR_SET, GreetServiceServer};
use crate::services::ServiceSet;
use crate::store::DocumentStore;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to read TLS file '{0}': {1}")]
    ReadTlsFile(PathBuf, #[source] std::io::Error),
    #[error("Invalid TLS configuration: {0}")]
    Tls(#[source] tonic::transport::Error),
    #[error("Failed to build the reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
    #[error("Transport error: {0}")]
    Transport(#[source] tonic::transport::Error),
}

pub struct GrpcServerBuilder {
    addr: SocketAddr,
    identity: Option<Identity>,
    reflection: bool,
}

impl GrpcServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        debug!(?addr, "Creating gRPC server builder");
        Self {
            addr,
            identity: None,
            reflection: false,
        }
    }

    /// Builds a server from its configuration, reading the TLS identity from disk if configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let mut builder = Self::new(config.listen_addr).with_reflection(config.reflection);

        if let Some(tls) = &config.tls {
            let cert = std::fs::read(&tls.cert_path)
                .map_err(|e| ServerError::ReadTlsFile(tls.cert_path.clone(), e))?;
            let key = std::fs::read(&tls.key_path)
                .map_err(|e| ServerError::ReadTlsFile(tls.key_path.clone(), e))?;
            builder = builder.with_tls(cert, key);
        }

        Ok(builder)
    }

    /// Serves over TLS with the given PEM encoded certificate chain and private key.
    pub fn with_tls(mut self, cert_pem: impl AsRef<[u8]>, key_pem: impl AsRef<[u8]>) -> Self {
        debug!("Enabling TLS for gRPC server");
        self.identity = Some(Identity::from_pem(cert_pem, key_pem));
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves `services` until `shutdown` resolves, then drains in-flight calls.
    pub async fn serve<S, F>(self, services: ServiceSet<S>, shutdown: F) -> Result<(), ServerError>
    where
        S: DocumentStore,
        F: Future<Output = ()> + Send,
    {
        let mut server = Server::builder();

        let tls = self.identity.is_some();
        if let Some(identity) = self.identity {
            server = server
                .tls_config(ServerTlsConfig::new().identity(identity))
                .map_err(ServerError::Tls)?;
        }

        let reflection = if self.reflection {
            Some(
                tonic_reflection::server::Builder::configure()
                    .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                    .build_v1()?,
            )
        } else {
            None
        };

        info!(addr = %self.addr, tls, reflection = self.reflection, "Starting gRPC server");

        server
            .add_service(CalculatorServiceServer::new(services.calculator))
            .add_service(GreetServiceServer::new(services.greet))
            .add_service(BlogServiceServer::new(services.blog))
            .add_optional_service(reflection)
            .serve_with_shutdown(self.addr, shutdown)
            .await
            .map_err(ServerError::Transport)?;

        info!("gRPC server stopped");
        Ok(())
    }
}
