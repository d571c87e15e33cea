//! # Method Descriptors
//!
//! A [`Method`] is the call surface of one operation: the HTTP/2 path
//! (`/package.Service/Method`), the request and response schemas and the declared shape.
//! The shape is a type parameter so that a descriptor can only be passed to the dispatcher
//! entry point that matches it.
use crate::call::Shape;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tonic_prost::ProstCodec;

/// Marker for request/response calls.
#[derive(Debug, Clone, Copy)]
pub struct Unary;
/// Marker for one-request/many-responses calls.
#[derive(Debug, Clone, Copy)]
pub struct ServerStreaming;
/// Marker for many-requests/one-response calls.
#[derive(Debug, Clone, Copy)]
pub struct ClientStreaming;
/// Marker for many-requests/many-responses calls.
#[derive(Debug, Clone, Copy)]
pub struct Bidirectional;

pub trait CallShape {
    const SHAPE: Shape;
}

impl CallShape for Unary {
    const SHAPE: Shape = Shape::Unary;
}

impl CallShape for ServerStreaming {
    const SHAPE: Shape = Shape::ServerStreaming;
}

impl CallShape for ClientStreaming {
    const SHAPE: Shape = Shape::ClientStreaming;
}

impl CallShape for Bidirectional {
    const SHAPE: Shape = Shape::Bidirectional;
}

/// Descriptor of a remote operation.
pub struct Method<Req, Res, K> {
    service: &'static str,
    name: &'static str,
    _marker: PhantomData<fn(Req, K) -> Res>,
}

impl<Req, Res, K> Method<Req, Res, K> {
    /// # Arguments
    ///
    /// * `service` - Fully qualified service name (e.g. `calculator.v1.CalculatorService`).
    /// * `name` - Method name as declared in the proto file (e.g. `Sum`).
    pub const fn new(service: &'static str, name: &'static str) -> Self {
        Self {
            service,
            name,
            _marker: PhantomData,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The HTTP/2 path of the operation.
    pub fn path(&self) -> http::uri::PathAndQuery {
        let path = format!("/{}/{}", self.service, self.name);
        http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
    }
}

impl<Req, Res, K: CallShape> Method<Req, Res, K> {
    pub fn shape(&self) -> Shape {
        K::SHAPE
    }
}

impl<Req, Res, K> Method<Req, Res, K>
where
    Req: prost::Message + Send + 'static,
    Res: prost::Message + Default + Send + 'static,
{
    /// The protobuf codec for this operation's schemas.
    pub fn codec(&self) -> ProstCodec<Req, Res> {
        ProstCodec::default()
    }
}

impl<Req, Res, K> Clone for Method<Req, Res, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Res, K> Copy for Method<Req, Res, K> {}

impl<Req, Res, K> fmt::Debug for Method<Req, Res, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.name)
    }
}

impl<Req, Res, K> fmt::Display for Method<Req, Res, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: Method<(), (), Bidirectional> = Method::new("test.v1.PingService", "Ping");

    #[test]
    fn test_method_path_and_shape() {
        assert_eq!(PING.path().as_str(), "/test.v1.PingService/Ping");
        assert_eq!(PING.shape(), Shape::Bidirectional);
        assert_eq!(PING.to_string(), "test.v1.PingService/Ping");
    }
}
