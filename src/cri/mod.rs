//! Thin client for the node's container runtime (CRI)
//!
//! Exposes the minimum runtime surface the topology observer needs: list the
//! containers currently running, and fetch the host pid of a container's init
//! process from the verbose status info.

pub mod client;

pub use client::RuntimeClient;
