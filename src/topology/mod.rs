//! Pod topology observation
//!
//! Correlates pod lifecycle events from the kubernetes API with container
//! metadata from the CRI and publishes `Start`/`Stop` observation events for
//! the kernel-side tracer to act on.

pub mod informer;
pub mod kubernetes;
pub mod types;

pub use informer::{PodEvent, PodInformer};
pub use kubernetes::{KubernetesConfig, KubernetesTopology};
pub use types::{Container, EventKind, ObservationEvent};

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A source of container topology.
///
/// [`KubernetesTopology`] is the production implementation; the trait exists
/// so non-orchestrated sources (plain-docker scanning, test fakes) can be
/// substituted.
#[async_trait]
pub trait Topology: Send {
    /// Open the channels to the underlying data sources. Misconfiguration
    /// is fatal here; transient unavailability is not.
    async fn connect(&mut self) -> Result<()>;

    /// Snapshot of every running container currently known to the source.
    async fn containers(&self) -> Result<Vec<Container>>;

    /// Watch the source until `shutdown` fires, publishing lifecycle events
    /// onto `events`. The sink is owned by the caller and is never closed by
    /// the observer; a full sink exerts backpressure on the watch.
    async fn run(
        &mut self,
        shutdown: CancellationToken,
        events: &mpsc::Sender<ObservationEvent>,
    ) -> Result<()>;

    /// Release both channels. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
