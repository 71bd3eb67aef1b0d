use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime label carrying the pod name of an orchestrated container.
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
/// Runtime label carrying the pod's kubernetes namespace.
pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
/// Runtime label carrying the container name within the pod.
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

/// A running container correlated across the kubernetes API, the CRI, and
/// procfs.
///
/// Only constructed once `id`, `pid`, and `pid_namespace` are all known;
/// partial records never leave the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Runtime-assigned container id, unique per node per lifetime.
    pub id: String,
    /// Pod name, from the runtime's kubernetes labels.
    pub pod: String,
    /// Kubernetes namespace of the pod.
    pub namespace: String,
    /// Container name within the pod.
    pub name: String,
    /// Image reference string.
    pub image: String,
    /// Full runtime label map.
    pub labels: HashMap<String, String>,
    /// Host pid of the container's init process.
    pub pid: i32,
    /// Inode number of the container's kernel PID namespace.
    pub pid_namespace: u64,
}

/// Lifecycle kind of an [`ObservationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Stop,
}

/// A container lifecycle event published on the observer's outbound sink.
///
/// The observer does not deduplicate: consumers treat a `Start` for an
/// already-known container and a `Stop` for an unknown one as no-ops, keyed
/// by `(container.id, container.pid_namespace)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub kind: EventKind,
    pub container: Container,
}

impl ObservationEvent {
    pub fn start(container: Container) -> Self {
        Self {
            kind: EventKind::Start,
            container,
        }
    }

    pub fn stop(container: Container) -> Self {
        Self {
            kind: EventKind::Stop,
            container,
        }
    }
}
