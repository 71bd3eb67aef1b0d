//! podtrace - node-local pod topology observer
//!
//! The observer runs on each Kubernetes node and:
//! - Watches the API server for pod lifecycle events
//! - Matches pods with containers reported by the CRI runtime
//! - Resolves each container's host pid and kernel PID namespace
//! - Publishes Start/Stop observation events for the tracer to consume
//!
//! This binary prints the events as JSON lines; a real deployment wires the
//! sink into the kernel-side tracer instead.

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use podtrace::topology::{KubernetesConfig, KubernetesTopology, Topology};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the outbound event channel. A slow consumer exerts
/// backpressure on the pod watch rather than dropping events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "podtrace")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Observe pod/container topology on a Kubernetes node", long_about = None)]
struct Args {
    #[arg(long, help = "Path to the CRI runtime's unix socket")]
    runtime_socket: PathBuf,

    #[arg(long, help = "Path to a kubeconfig file (default: in-cluster)")]
    kubeconfig: Option<PathBuf>,

    #[arg(short, long, help = "Only watch pods in this namespace")]
    namespace: Option<String>,

    #[arg(long, help = "Label selector applied to the pod watch")]
    label_selector: Option<String>,

    #[arg(long, help = "Field selector applied to the pod watch")]
    field_selector: Option<String>,

    #[arg(long, default_value = "/proc", help = "Root of the host procfs")]
    proc_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config =
        KubernetesConfig::new(args.runtime_socket).with_proc_root(args.proc_root);
    if let Some(kubeconfig) = args.kubeconfig {
        config = config.with_kubeconfig(kubeconfig);
    }
    if let Some(namespace) = args.namespace {
        config = config.with_namespace(namespace);
    }
    if let Some(selector) = args.label_selector {
        config = config.with_label_selector(selector);
    }
    if let Some(selector) = args.field_selector {
        config = config.with_field_selector(selector);
    }

    let mut topology = KubernetesTopology::new(config);
    topology.connect().await?;

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("failed to serialize event: {}", e),
            }
        }
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    info!("podtrace v{} watching pods", podtrace::VERSION);

    if let Err(e) = topology.run(shutdown, &event_tx).await {
        error!("topology observer terminated: {}", e);
    }

    topology.close().await?;

    // we own the sink; dropping our sender is what lets the printer drain
    // and exit
    drop(event_tx);
    let _ = printer.await;

    info!("podtrace stopped");
    Ok(())
}
