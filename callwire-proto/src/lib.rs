//! # Callwire Protocol Schemas
//!
//! Generated message types and server traits for the three services exposed by `callwire`.
//! Each package is versioned (`*.v1`) and the schema of every call is fixed at compile time.
//!
//! The encoded `FileDescriptorSet` is exported as [`FILE_DESCRIPTOR_SET`] so the server can
//! register the gRPC reflection service.

pub mod calculator {
    pub mod v1 {
        tonic::include_proto!("calculator.v1");
    }
}

pub mod greet {
    pub mod v1 {
        tonic::include_proto!("greet.v1");
    }
}

pub mod blog {
    pub mod v1 {
        tonic::include_proto!("blog.v1");
    }
}

pub use blog::v1::blog_service_server::{BlogService, BlogServiceServer};
pub use calculator::v1::calculator_service_server::{CalculatorService, CalculatorServiceServer};
pub use greet::v1::greet_service_server::{GreetService, GreetServiceServer};

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
