//! Reachability checks for the infrastructure an evaluation depends on.
//!
//! Tasks mutate and inspect a set of shared services (code hosting, chat,
//! file sharing, project management) that must be up before a run starts,
//! and scoring needs a container daemon. These probes report on both
//! without failing.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::environment::ContainerRuntime;

/// A shared service reachable over HTTP on a fixed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProbe {
    pub name: &'static str,
    pub port: u16,
}

impl ServiceProbe {
    pub fn url(&self, hostname: &str) -> String {
        format!("http://{}:{}", hostname, self.port)
    }
}

/// Services every task environment expects. Plane is routed through the
/// same proxy port as GitLab.
pub const SHARED_SERVICES: &[ServiceProbe] = &[
    ServiceProbe {
        name: "GitLab",
        port: 8091,
    },
    ServiceProbe {
        name: "RocketChat",
        port: 3000,
    },
    ServiceProbe {
        name: "OwnCloud",
        port: 8092,
    },
    ServiceProbe {
        name: "Plane",
        port: 8091,
    },
];

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Answered with a status below 500.
    Reachable { http_status: u16 },
    ServerError { http_status: u16 },
    TimedOut,
    Unreachable { reason: String },
}

impl ProbeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }

    fn describe(&self) -> String {
        match self {
            Self::Reachable { http_status } => format!("accessible (HTTP {http_status})"),
            Self::ServerError { http_status } => format!("returned HTTP {http_status}"),
            Self::TimedOut => "timeout (service slow or not responding)".to_string(),
            Self::Unreachable { reason } => format!("unreachable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub status: ProbeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub hostname: String,
    pub services: Vec<ServiceStatus>,
    /// `None` when the daemon answered, else the failure reason.
    pub daemon_error: Option<String>,
}

impl PreflightReport {
    pub fn all_ok(&self) -> bool {
        self.daemon_error.is_none() && self.services.iter().all(|s| s.status.is_ok())
    }

    /// Human-readable summary, one line per check.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Checking services at hostname: {}", self.hostname)];
        for service in &self.services {
            let mark = if service.status.is_ok() { "✓" } else { "✗" };
            lines.push(format!(
                "{mark} {:<12} ({:<28}) - {}",
                service.name,
                service.url,
                service.status.describe()
            ));
        }
        match &self.daemon_error {
            None => lines.push("✓ Container daemon - accessible".to_string()),
            Some(reason) => lines.push(format!("✗ Container daemon - {reason}")),
        }
        lines.join("\n")
    }
}

/// GETs a URL and classifies the answer.
pub async fn probe_url(client: &Client, url: &str, timeout: Duration) -> ProbeStatus {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            if code < 500 {
                ProbeStatus::Reachable { http_status: code }
            } else {
                ProbeStatus::ServerError { http_status: code }
            }
        }
        Err(e) if e.is_timeout() => ProbeStatus::TimedOut,
        Err(e) => ProbeStatus::Unreachable {
            reason: e.to_string(),
        },
    }
}

/// Probes every shared service on `hostname`.
pub async fn check_services(
    client: &Client,
    hostname: &str,
    timeout: Duration,
) -> Vec<ServiceStatus> {
    let mut results = Vec::with_capacity(SHARED_SERVICES.len());
    for service in SHARED_SERVICES {
        let url = service.url(hostname);
        let status = probe_url(client, &url, timeout).await;
        if status.is_ok() {
            debug!(service = service.name, url = %url, "Service reachable");
        } else {
            warn!(service = service.name, url = %url, status = ?status, "Service not reachable");
        }
        results.push(ServiceStatus {
            name: service.name.to_string(),
            url,
            status,
        });
    }
    results
}

/// Pings the container daemon, returning the failure reason if any.
pub async fn check_daemon(runtime: &dyn ContainerRuntime, timeout: Duration) -> Option<String> {
    match tokio::time::timeout(timeout, runtime.ping()).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("no answer within {}s", timeout.as_secs())),
    }
}

/// Runs every check. `runtime` is `None` when no daemon connection could be
/// established at all.
pub async fn run_preflight(
    client: &Client,
    hostname: &str,
    runtime: Option<&dyn ContainerRuntime>,
    timeout: Duration,
) -> PreflightReport {
    let services = check_services(client, hostname, timeout).await;
    let daemon_error = match runtime {
        Some(runtime) => check_daemon(runtime, Duration::from_secs(5)).await,
        None => Some("not connected".to_string()),
    };

    let report = PreflightReport {
        hostname: hostname.to_string(),
        services,
        daemon_error,
    };
    info!(all_ok = report.all_ok(), "Preflight finished");
    report
}
