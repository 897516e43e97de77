//! Launch configuration for isolated task instances.
//!
//! `LaunchSpec` enumerates everything a runtime needs to start a disposable
//! instance: network mode, host aliases, mounts, environment and timeout.
//! Host-specific differences are applied once through `HostPlatform`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Hostname under which task images expect the shared services.
pub const SERVICES_HOST_ALIAS: &str = "the-agent-company.com";

/// Platform forced on hosts that cannot run the images natively.
pub const EMULATED_PLATFORM: &str = "linux/amd64";

/// Network attachment of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Host,
    Bridge,
    None,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Bridge => "bridge",
            Self::None => "none",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra `/etc/hosts` entry inside the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAlias {
    pub hostname: String,
    /// IP address or the special `host-gateway` value.
    pub target: String,
}

impl HostAlias {
    pub fn new(hostname: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            target: target.into(),
        }
    }

    /// Docker `--add-host` form.
    pub fn to_entry(&self) -> String {
        format!("{}:{}", self.hostname, self.target)
    }
}

/// A host directory mounted into the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host.into(),
            container_path: container.into(),
            read_only: true,
        }
    }

    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host.into(),
            container_path: container.into(),
            read_only: false,
        }
    }

    /// Mounts a host directory at the same path inside the instance.
    pub fn mirrored(path: impl Into<PathBuf>, read_only: bool) -> Self {
        let path = path.into();
        Self {
            host_path: path.clone(),
            container_path: path,
            read_only,
        }
    }

    /// Docker bind string: `host:container:ro|rw`.
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path.display(),
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Everything needed to start one disposable instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Fixed instance name, used for cleanup.
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub network: NetworkMode,
    pub host_aliases: Vec<HostAlias>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    /// Target platform, e.g. `linux/amd64`.
    pub platform: Option<String>,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            network: NetworkMode::Bridge,
            host_aliases: Vec::new(),
            mounts: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(60),
            platform: None,
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    pub fn with_host_alias(mut self, alias: HostAlias) -> Self {
        self.host_aliases.push(alias);
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Adds an environment variable. Empty values are dropped.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.env.push((key.into(), value));
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// `KEY=value` pairs.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn binds(&self) -> Vec<String> {
        self.mounts.iter().map(Mount::to_bind).collect()
    }

    pub fn extra_hosts(&self) -> Vec<String> {
        self.host_aliases.iter().map(HostAlias::to_entry).collect()
    }

    /// Equivalent `docker run` arguments, for logs and manual reproduction.
    /// Secret-looking values are masked.
    pub fn docker_run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--name".to_string(), self.name.clone()];

        if let Some(platform) = &self.platform {
            args.push("--platform".to_string());
            args.push(platform.clone());
        }
        if self.network != NetworkMode::Bridge {
            args.push("--network".to_string());
            args.push(self.network.to_string());
        }
        for host in self.extra_hosts() {
            args.push("--add-host".to_string());
            args.push(host);
        }
        for bind in self.binds() {
            args.push("-v".to_string());
            args.push(bind);
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            if is_secret(key) {
                args.push(format!("{key}=***"));
            } else {
                args.push(format!("{key}={value}"));
            }
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET")
}

/// Host characteristics that change how instances must be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub is_mac: bool,
    pub is_arm: bool,
}

impl HostPlatform {
    pub fn detect() -> Self {
        Self {
            is_mac: std::env::consts::OS == "macos",
            is_arm: matches!(std::env::consts::ARCH, "aarch64" | "arm"),
        }
    }

    pub fn linux_x86() -> Self {
        Self {
            is_mac: false,
            is_arm: false,
        }
    }

    /// Platform to request when images must be emulated.
    pub fn forced_platform(&self) -> Option<&'static str> {
        self.is_arm.then_some(EMULATED_PLATFORM)
    }

    /// Applies host-specific networking and platform settings.
    ///
    /// Linux with host networking joins the host network. macOS cannot, so
    /// the services hostname is mapped to the host gateway instead.
    pub fn configure(&self, mut spec: LaunchSpec, use_host_network: bool) -> LaunchSpec {
        if let Some(platform) = self.forced_platform() {
            spec = spec.with_platform(platform);
        }
        if self.is_mac {
            spec.network = NetworkMode::Bridge;
            spec = spec.with_host_alias(HostAlias::new(SERVICES_HOST_ALIAS, "host-gateway"));
        } else if use_host_network {
            spec.network = NetworkMode::Host;
        }
        spec
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_binds() {
        assert_eq!(
            Mount::read_write("/tmp/workspace", "/workspace").to_bind(),
            "/tmp/workspace:/workspace:rw"
        );
        assert_eq!(Mount::mirrored("/runs/1", true).to_bind(), "/runs/1:/runs/1:ro");
    }

    #[test]
    fn test_empty_env_values_are_dropped() {
        let spec = LaunchSpec::new("c", "img")
            .with_env("SERVER_HOSTNAME", "localhost")
            .with_env("LITELLM_API_KEY", "");
        assert_eq!(spec.env_list(), vec!["SERVER_HOSTNAME=localhost"]);
    }

    #[test]
    fn test_linux_uses_host_network() {
        let spec = HostPlatform::linux_x86().configure(LaunchSpec::new("c", "img"), true);
        assert_eq!(spec.network, NetworkMode::Host);
        assert!(spec.host_aliases.is_empty());
        assert!(spec.platform.is_none());
    }

    #[test]
    fn test_linux_without_host_network_stays_bridged() {
        let spec = HostPlatform::linux_x86().configure(LaunchSpec::new("c", "img"), false);
        assert_eq!(spec.network, NetworkMode::Bridge);
    }

    #[test]
    fn test_mac_arm_maps_gateway_and_platform() {
        let mac = HostPlatform {
            is_mac: true,
            is_arm: true,
        };
        let spec = mac.configure(LaunchSpec::new("c", "img"), true);
        assert_eq!(spec.network, NetworkMode::Bridge);
        assert_eq!(spec.extra_hosts(), vec!["the-agent-company.com:host-gateway"]);
        assert_eq!(spec.platform.as_deref(), Some("linux/amd64"));
    }

    #[test]
    fn test_docker_run_args_mask_secrets() {
        let spec = LaunchSpec::new("tac_eval_x", "img:1")
            .with_network(NetworkMode::Host)
            .with_mount(Mount::read_write("/a", "/b"))
            .with_env("LITELLM_API_KEY", "sk-123")
            .with_env("SERVER_HOSTNAME", "localhost")
            .with_command(["bash", "-c", "true"]);
        let args = spec.docker_run_args();

        assert_eq!(&args[..3], ["run", "--name", "tac_eval_x"]);
        assert!(args.windows(2).any(|w| w == ["--network", "host"]));
        assert!(args.contains(&"LITELLM_API_KEY=***".to_string()));
        assert!(args.contains(&"SERVER_HOSTNAME=localhost".to_string()));
        assert!(!args.iter().any(|a| a.contains("sk-123")));
        assert_eq!(args.last().map(String::as_str), Some("true"));
    }
}
