//! CRI runtime client over a local Unix socket
//!
//! The kubelet-managed runtime (containerd, CRI-O, ...) serves the CRI gRPC
//! API on a local stream socket. The channel is created lazily on first use
//! and shared by all callers; tonic multiplexes concurrent RPCs over it.

use crate::{PodtraceError, Result};
use hyper_util::rt::TokioIo;
use podtrace_proto::{
    ContainerFilter, ContainerState, ContainerStateValue, ContainerStatusRequest,
    ListContainersRequest, RuntimeServiceClient,
};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

type CriClient = RuntimeServiceClient<Channel>;

/// Client for the runtime's local CRI endpoint.
pub struct RuntimeClient {
    socket: PathBuf,
    channel: Mutex<Option<CriClient>>,
}

impl RuntimeClient {
    /// Create a client for the given socket path. No connection is made
    /// until the first RPC (or an explicit [`RuntimeClient::connect`]).
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            channel: Mutex::new(None),
        }
    }

    /// Eagerly open the channel to the runtime socket.
    pub async fn connect(&self) -> Result<()> {
        let mut channel = self.channel.lock().await;
        if channel.is_none() {
            *channel = Some(Self::dial(&self.socket).await?);
        }
        Ok(())
    }

    /// Drop the channel. Idempotent; a later RPC reconnects lazily.
    pub async fn close(&self) {
        *self.channel.lock().await = None;
    }

    /// List all containers the runtime reports as running.
    pub async fn list_running(&self) -> Result<Vec<podtrace_proto::Container>> {
        let mut client = self.client().await?;

        // only containers marked running are of interest; the filter is
        // applied server-side
        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..Default::default()
            }),
        };

        let response = client
            .list_containers(request)
            .await
            .map_err(|e| rpc_error("ListContainers", e))?;

        Ok(response.into_inner().containers)
    }

    /// Fetch the host pid of a container's init process.
    ///
    /// The verbose `ContainerStatus` response carries a runtime-specific
    /// `info` map whose `"info"` entry is a JSON document; its top-level
    /// `pid` field is the host pid. A missing or non-numeric pid is
    /// [`PodtraceError::NoPid`], which callers treat as a skippable
    /// per-container failure.
    pub async fn container_pid(&self, id: &str) -> Result<i32> {
        let mut client = self.client().await?;

        let request = ContainerStatusRequest {
            container_id: id.to_string(),
            verbose: true,
        };

        let response = client
            .container_status(request)
            .await
            .map_err(|e| rpc_error("ContainerStatus", e))?
            .into_inner();

        let no_pid = || PodtraceError::NoPid { id: id.to_string() };

        let raw = response.info.get("info").ok_or_else(no_pid)?;
        let info: serde_json::Value = serde_json::from_str(raw).map_err(|_| no_pid())?;
        let pid = info
            .get("pid")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(no_pid)?;

        if pid <= 0 {
            return Err(no_pid());
        }

        Ok(pid as i32)
    }

    /// Clone the shared client, dialing the socket first if needed.
    async fn client(&self) -> Result<CriClient> {
        let mut channel = self.channel.lock().await;
        if let Some(client) = channel.as_ref() {
            return Ok(client.clone());
        }

        let client = Self::dial(&self.socket).await?;
        *channel = Some(client.clone());
        Ok(client)
    }

    async fn dial(socket: &Path) -> Result<CriClient> {
        let path = socket.to_path_buf();

        // the endpoint URI is required by tonic but never resolved; the
        // connector below dials the Unix socket directly
        let channel = Endpoint::from_static("http://[::]")
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    let stream = UnixStream::connect(path).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| {
                PodtraceError::RuntimeUnavailable(format!(
                    "failed to connect to runtime socket '{}': {}",
                    socket.display(),
                    e
                ))
            })?;

        Ok(RuntimeServiceClient::new(channel))
    }
}

fn rpc_error(op: &str, status: tonic::Status) -> PodtraceError {
    if status.code() == tonic::Code::Cancelled {
        PodtraceError::Cancelled
    } else {
        PodtraceError::RuntimeUnavailable(format!("{} failed: {}", op, status))
    }
}
