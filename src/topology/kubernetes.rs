//! Kubernetes topology observer
//!
//! Watches pod lifecycle events from the kubernetes API and matches them
//! with information from the underlying CRI, which is managed by the
//! kubelet. The CRI is queried for the host pid of every container in a
//! matching pod, and procfs for the pid namespace the kernel-side tracer
//! filters on.
//!
//! The observer keeps no pod or container state of its own: all pod state
//! lives in the informer cache and the container set is re-queried from the
//! runtime on every callback. Duplicate events caused by watch re-lists are
//! expected and absorbed by consumer idempotence.

use crate::cri::RuntimeClient;
use crate::pidns;
use crate::topology::informer::{PodEvent, PodInformer};
use crate::topology::types::{
    Container, ObservationEvent, CONTAINER_NAME_LABEL, POD_NAME_LABEL, POD_NAMESPACE_LABEL,
};
use crate::topology::Topology;
use crate::{PodtraceError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher;
use kube::{Client, Config};
use log::{debug, info, warn};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for a [`KubernetesTopology`].
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// Path to the CRI runtime's Unix socket.
    pub runtime_socket: PathBuf,
    /// Path to a kubeconfig file; `None` means in-cluster service-account
    /// credentials (or whatever the environment provides).
    pub kubeconfig: Option<PathBuf>,
    /// Restrict the pod watch to a single namespace; `None` watches all.
    pub namespace: Option<String>,
    /// Server-side label selector applied to the pod watch.
    pub label_selector: Option<String>,
    /// Server-side field selector applied to the pod watch.
    pub field_selector: Option<String>,
    /// Prefix under which `<pid>/ns/pid` is readable, `/proc` by default.
    pub proc_root: PathBuf,
}

impl KubernetesConfig {
    pub fn new(runtime_socket: impl Into<PathBuf>) -> Self {
        Self {
            runtime_socket: runtime_socket.into(),
            kubeconfig: None,
            namespace: None,
            label_selector: None,
            field_selector: None,
            proc_root: PathBuf::from("/proc"),
        }
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }
}

/// Topology observer backed by the kubernetes API and the CRI.
pub struct KubernetesTopology {
    config: KubernetesConfig,
    runtime: RuntimeClient,
    kube: Option<Client>,
}

impl KubernetesTopology {
    pub fn new(config: KubernetesConfig) -> Self {
        let runtime = RuntimeClient::new(config.runtime_socket.clone());
        Self {
            config,
            runtime,
            kube: None,
        }
    }

    pub fn config(&self) -> &KubernetesConfig {
        &self.config
    }

    async fn connect_kube(&mut self) -> Result<()> {
        let config = match &self.config.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    PodtraceError::ConfigInvalid(format!(
                        "bad kubeconfig '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        PodtraceError::ConfigInvalid(format!(
                            "bad kubeconfig '{}': {}",
                            path.display(),
                            e
                        ))
                    })?
            }
            None => Config::infer().await.map_err(|e| {
                PodtraceError::ConfigInvalid(format!("could not infer kubernetes config: {}", e))
            })?,
        };

        let client = Client::try_from(config)
            .map_err(|e| PodtraceError::Kubernetes(format!("failed to create client: {}", e)))?;
        self.kube = Some(client);
        Ok(())
    }

    fn pod_api(&self) -> Result<Api<Pod>> {
        let client = self
            .kube
            .clone()
            .ok_or_else(|| PodtraceError::Kubernetes("not connected".to_string()))?;

        Ok(match &self.config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        })
    }

    fn watch_config(&self) -> watcher::Config {
        let mut config = watcher::Config::default();
        if let Some(selector) = &self.config.label_selector {
            config = config.labels(selector);
        }
        if let Some(selector) = &self.config.field_selector {
            config = config.fields(selector);
        }
        config
    }

    async fn run_with_informer(
        &self,
        informer: &mut PodInformer,
        shutdown: CancellationToken,
        events: &mpsc::Sender<ObservationEvent>,
    ) -> Result<()> {
        let worker = async {
            while let Some(event) = informer.next().await {
                self.handle_pod_event(event, events).await;
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => debug!("topology observer cancelled"),
            _ = worker => warn!("pod watch stream ended"),
        }

        Ok(())
    }

    pub(crate) async fn handle_pod_event(
        &self,
        event: PodEvent,
        events: &mpsc::Sender<ObservationEvent>,
    ) {
        match event {
            PodEvent::Added(pod) => {
                for container in self.containers_for_pod(&pod).await {
                    info!(
                        "adding {}.{}.{}",
                        container.name, container.pod, container.namespace
                    );
                    self.emit(events, ObservationEvent::start(container)).await;
                }
            }
            PodEvent::Updated { old, new } => {
                // the runtime is the source of truth for container identity
                // and pod updates frequently correspond to container
                // restarts, so drop everything attributed to the old pod and
                // re-announce against the current runtime view
                for container in self.containers_for_pod(&old).await {
                    info!(
                        "(update) removing {}.{}.{}",
                        container.name, container.pod, container.namespace
                    );
                    self.emit(events, ObservationEvent::stop(container)).await;
                }

                debug!(
                    "(update) old_phase={:?} new_phase={:?}",
                    pod_phase(&old),
                    pod_phase(&new)
                );

                if pod_phase(&new) == Some("Running") {
                    for container in self.containers_for_pod(&new).await {
                        info!(
                            "(update) adding {}.{}.{}",
                            container.name, container.pod, container.namespace
                        );
                        self.emit(events, ObservationEvent::start(container)).await;
                    }
                }
            }
            PodEvent::Deleted(pod) => {
                for container in self.containers_for_pod(&pod).await {
                    info!(
                        "removing {}.{}.{}",
                        container.name, container.pod, container.namespace
                    );
                    self.emit(events, ObservationEvent::stop(container)).await;
                }
            }
        }
    }

    async fn emit(&self, events: &mpsc::Sender<ObservationEvent>, event: ObservationEvent) {
        // the sink belongs to the caller; a dropped receiver is not our
        // shutdown signal
        if events.send(event).await.is_err() {
            debug!("event sink dropped, discarding observation event");
        }
    }

    /// Containers the runtime currently reports for the pod's identity.
    ///
    /// A runtime failure here is scoped to this callback; the next pod event
    /// (or watch re-list) is the natural retry.
    async fn containers_for_pod(&self, pod: &Pod) -> Vec<Container> {
        let (Some(namespace), Some(name)) = (
            pod.metadata.namespace.as_deref(),
            pod.metadata.name.as_deref(),
        ) else {
            warn!("pod event without name/namespace metadata, skipping");
            return Vec::new();
        };

        match self.cri_containers(Some((namespace, name))).await {
            Ok(containers) => containers,
            Err(PodtraceError::Cancelled) => Vec::new(),
            Err(e) => {
                warn!(
                    "failed to fetch CRI containers matching pod {}/{}: {}",
                    namespace, name, e
                );
                Vec::new()
            }
        }
    }

    /// Running containers from the CRI, with pod, kubernetes namespace, and
    /// kernel pid namespace resolved.
    ///
    /// With `matching` set, only containers whose kubernetes labels agree
    /// with the `(namespace, pod)` identity are returned. Per-container
    /// failures (no pid in the status info, the process exiting under us)
    /// skip that container and never abort the rest.
    async fn cri_containers(&self, matching: Option<(&str, &str)>) -> Result<Vec<Container>> {
        let descriptors = self.runtime.list_running().await?;
        let mut containers = Vec::new();

        for descriptor in descriptors {
            let podtrace_proto::Container {
                id,
                image_ref,
                labels,
                ..
            } = descriptor;

            let pod = labels.get(POD_NAME_LABEL).cloned().unwrap_or_default();
            let namespace = labels.get(POD_NAMESPACE_LABEL).cloned().unwrap_or_default();
            let name = labels.get(CONTAINER_NAME_LABEL).cloned().unwrap_or_default();

            if let Some((want_namespace, want_pod)) = matching {
                if pod.is_empty() || namespace.is_empty() {
                    // non-orchestrated containers on the same node carry no
                    // kubernetes labels
                    warn!(
                        "no kubernetes namespace/pod labels on container '{}', skipping",
                        id
                    );
                    continue;
                }
                if namespace != want_namespace || pod != want_pod {
                    continue;
                }
            }

            let pid = match self.runtime.container_pid(&id).await {
                Ok(pid) => pid,
                Err(e @ PodtraceError::Cancelled) => return Err(e),
                Err(e) => {
                    warn!("could not fetch pid for container '{}' ({}), skipping", id, e);
                    continue;
                }
            };

            let pid_namespace = match pidns::pid_namespace(&self.config.proc_root, pid) {
                Ok(inode) => inode,
                Err(e @ PodtraceError::ProcNotFound { .. }) => {
                    debug!(
                        "pid namespace for container '{}' unavailable ({}), skipping",
                        id, e
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "could not resolve pid namespace for container '{}' ({}), skipping",
                        id, e
                    );
                    continue;
                }
            };

            containers.push(Container {
                id,
                pod,
                namespace,
                name,
                image: image_ref,
                labels,
                pid,
                pid_namespace,
            });
        }

        Ok(containers)
    }
}

#[async_trait]
impl Topology for KubernetesTopology {
    async fn connect(&mut self) -> Result<()> {
        validate_runtime_socket(&self.config.runtime_socket)?;
        self.runtime.connect().await?;
        self.connect_kube().await?;
        Ok(())
    }

    async fn containers(&self) -> Result<Vec<Container>> {
        self.cri_containers(None).await
    }

    async fn run(
        &mut self,
        shutdown: CancellationToken,
        events: &mpsc::Sender<ObservationEvent>,
    ) -> Result<()> {
        if self.kube.is_none() {
            self.connect_kube().await?;
        }

        let mut informer = PodInformer::new(self.pod_api()?, self.watch_config());
        self.run_with_informer(&mut informer, shutdown, events)
            .await
    }

    async fn close(&mut self) -> Result<()> {
        self.runtime.close().await;
        self.kube = None;
        Ok(())
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn validate_runtime_socket(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PodtraceError::ConfigInvalid(format!("runtime socket '{}': {}", path.display(), e))
    })?;

    if !metadata.file_type().is_socket() {
        return Err(PodtraceError::ConfigInvalid(format!(
            "runtime socket '{}' is not a unix socket",
            path.display()
        )));
    }

    Ok(())
}
