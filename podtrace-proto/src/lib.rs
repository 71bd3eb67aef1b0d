//! CRI protocol bindings for podtrace
//!
//! Defines:
//! - `RuntimeService` - the CRI runtime surface the observer consumes
//!   (`ListContainers`, `ContainerStatus`)
//! - Request, response, and container descriptor message types
//!
//! Generated from `proto/runtime.proto`, a subset of the upstream CRI
//! definition with matching field numbers. The server side is generated too
//! so in-process fakes can stand in for a real runtime.

pub mod v1 {
    tonic::include_proto!("runtime.v1");
}

pub use v1::runtime_service_client::RuntimeServiceClient;
pub use v1::runtime_service_server::{RuntimeService, RuntimeServiceServer};
pub use v1::*;
