use podtrace::error::PodtraceError;
use podtrace::topology::KubernetesConfig;
use std::path::PathBuf;

#[test]
fn test_error_types() {
    let err = PodtraceError::NoPid {
        id: "0123abcd".to_string(),
    };
    assert!(err.to_string().contains("0123abcd"));

    let err = PodtraceError::ProcMalformed {
        pid: 42,
        target: "net:[4026531840]".to_string(),
    };
    assert!(err.to_string().contains("42"));
    assert!(err.to_string().contains("net:[4026531840]"));
}

#[test]
fn test_config_defaults() {
    let config = KubernetesConfig::new("/run/containerd/containerd.sock");

    assert_eq!(
        config.runtime_socket,
        PathBuf::from("/run/containerd/containerd.sock")
    );
    assert_eq!(config.proc_root, PathBuf::from("/proc"));
    assert!(config.kubeconfig.is_none());
    assert!(config.namespace.is_none());
    assert!(config.label_selector.is_none());
    assert!(config.field_selector.is_none());
}

#[test]
fn test_config_builders() {
    let config = KubernetesConfig::new("/run/crio/crio.sock")
        .with_namespace("payments")
        .with_label_selector("app=api")
        .with_field_selector("spec.nodeName=node-1")
        .with_proc_root("/host/proc");

    assert_eq!(config.namespace.as_deref(), Some("payments"));
    assert_eq!(config.label_selector.as_deref(), Some("app=api"));
    assert_eq!(
        config.field_selector.as_deref(),
        Some("spec.nodeName=node-1")
    );
    assert_eq!(config.proc_root, PathBuf::from("/host/proc"));
}

#[test]
fn test_version_const() {
    assert!(!podtrace::VERSION.is_empty());
}
