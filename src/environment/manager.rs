//! Environment manager.
//!
//! Owns the lifecycle of per-task instances: making sure an image is
//! present, extracting the task instruction, and running the scoring pass.
//! Every instance operation runs under its own timeout, and a timed-out
//! instance is force-removed by name before returning.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::instructions::InstructionCache;
use super::launch::{HostPlatform, LaunchSpec, Mount};
use super::runtime::{ContainerRuntime, InstanceOutput};
use crate::error::EnvironmentError;
use crate::scoring::ScoreResult;

/// Path of the instruction file inside every task image.
pub const INSTRUCTION_PATH: &str = "/instruction/task.md";

/// Instruction used when extraction fails.
pub const FALLBACK_INSTRUCTION: &str = "Complete the task in /instruction/task.md";

/// Shared key the scoring harness needs to decrypt its checker code.
pub const DECRYPTION_KEY: &str = "theagentcompany is all you need";

/// Model used by LLM-backed checkers when none is configured.
pub const DEFAULT_CHECKER_MODEL: &str = "openai/gpt-4o";

/// Timeouts and host options for instance operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Local image presence check.
    pub check_timeout: Duration,
    pub pull_timeout: Duration,
    pub extract_timeout: Duration,
    /// Initialization plus scoring, combined.
    pub score_timeout: Duration,
    pub use_host_network: bool,
    /// Host directory exposed to checkers as `/workspace`.
    pub workspace_dir: PathBuf,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(120),
            extract_timeout: Duration::from_secs(30),
            score_timeout: Duration::from_secs(900),
            use_host_network: true,
            workspace_dir: PathBuf::from("/tmp/workspace"),
        }
    }
}

impl EnvironmentConfig {
    pub fn with_score_timeout(mut self, timeout: Duration) -> Self {
        self.score_timeout = timeout;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_host_network(mut self, enabled: bool) -> Self {
        self.use_host_network = enabled;
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }
}

/// Credentials for the model used by LLM-backed checkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for LlmCredentials {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_CHECKER_MODEL.to_string(),
        }
    }
}

/// Where the shared services live and how checkers reach a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerContext {
    pub server_hostname: String,
    pub llm: LlmCredentials,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self {
            server_hostname: "localhost".to_string(),
            llm: LlmCredentials::default(),
        }
    }
}

impl ServerContext {
    /// Environment injected into scoring instances.
    pub fn scoring_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SERVER_HOSTNAME", self.server_hostname.clone()),
            ("LITELLM_API_KEY", self.llm.api_key.clone().unwrap_or_default()),
            ("LITELLM_BASE_URL", self.llm.base_url.clone().unwrap_or_default()),
            ("LITELLM_MODEL", self.llm.model.clone()),
            ("DECRYPTION_KEY", DECRYPTION_KEY.to_string()),
        ]
    }
}

/// Inputs of one scoring pass.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub task_id: &'a str,
    pub image: &'a str,
    pub transcript_path: &'a Path,
    pub output_path: &'a Path,
    pub server: &'a ServerContext,
}

/// How an instruction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSource {
    Cache,
    Extracted,
    Fallback,
}

/// Manages isolated task instances through a container runtime.
pub struct EnvironmentManager {
    runtime: Arc<dyn ContainerRuntime>,
    platform: HostPlatform,
    config: EnvironmentConfig,
    instructions: Arc<InstructionCache>,
    active: Mutex<Option<String>>,
}

impl EnvironmentManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: EnvironmentConfig) -> Self {
        Self {
            runtime,
            platform: HostPlatform::detect(),
            config,
            instructions: Arc::new(InstructionCache::in_memory()),
            active: Mutex::new(None),
        }
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_instruction_cache(mut self, cache: Arc<InstructionCache>) -> Self {
        self.instructions = cache;
        self
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn instructions(&self) -> &InstructionCache {
        &self.instructions
    }

    /// Name of the instance currently running, if any.
    pub fn active_instance(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active(&self, name: Option<String>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    /// Makes sure an image is available locally, pulling it if needed.
    ///
    /// Never fails: any problem is logged and reported as `false`.
    pub async fn ensure_image(&self, image: &str) -> bool {
        match tokio::time::timeout(self.config.check_timeout, self.runtime.image_present(image))
            .await
        {
            Ok(Ok(true)) => {
                debug!(image, "Image already present");
                return true;
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                warn!(image, error = %e, "Cannot inspect image, container runtime unavailable");
                return false;
            }
            Err(_) => {
                warn!(image, "Local image check timed out, trying to pull");
            }
        }

        info!(image, "Pulling image");
        let started = Instant::now();
        let pull = self
            .runtime
            .pull_image(image, self.platform.forced_platform());
        match tokio::time::timeout(self.config.pull_timeout, pull).await {
            Ok(Ok(())) => {
                info!(image, elapsed_secs = started.elapsed().as_secs_f64(), "Pulled image");
                true
            }
            Ok(Err(e)) => {
                warn!(image, error = %e, "Image pull failed");
                false
            }
            Err(_) => {
                warn!(
                    image,
                    timeout_secs = self.config.pull_timeout.as_secs(),
                    "Image pull timed out"
                );
                false
            }
        }
    }

    fn instruction_spec(&self, image: &str) -> LaunchSpec {
        let spec = LaunchSpec::new(format!("tac_instruction_{}", std::process::id()), image)
            .with_command(["cat", INSTRUCTION_PATH])
            .with_timeout(self.config.extract_timeout);
        match self.platform.forced_platform() {
            Some(platform) => spec.with_platform(platform),
            None => spec,
        }
    }

    /// Reads the instruction file from a disposable instance of `image`.
    pub async fn try_extract_instruction(&self, image: &str) -> Result<String, EnvironmentError> {
        let spec = self.instruction_spec(image);
        let output = self.run_instance(&spec, "Instruction extraction").await?;

        if !output.is_success() {
            return Err(EnvironmentError::NonZeroExit {
                code: output.exit_code,
                output: output.tail(500),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(EnvironmentError::MalformedArtifact(format!(
                "{INSTRUCTION_PATH} is empty"
            )));
        }

        info!(image, chars = output.stdout.len(), "Extracted task instruction");
        Ok(output.stdout)
    }

    /// Like [`try_extract_instruction`](Self::try_extract_instruction), but
    /// substitutes a generic instruction on failure.
    pub async fn extract_instruction(&self, image: &str) -> String {
        match self.try_extract_instruction(image).await {
            Ok(text) => text,
            Err(e) => {
                warn!(image, error = %e, "Using fallback instruction");
                FALLBACK_INSTRUCTION.to_string()
            }
        }
    }

    /// Instruction for a task: cached if available, else extracted.
    pub async fn instruction_for(&self, task_id: &str, image: &str) -> (String, InstructionSource) {
        if let Some(text) = self.instructions.get(task_id) {
            debug!(task_id, chars = text.len(), "Using precomputed instruction");
            return (text, InstructionSource::Cache);
        }

        match self.try_extract_instruction(image).await {
            Ok(text) => (text, InstructionSource::Extracted),
            Err(e) => {
                warn!(task_id, error = %e, "Instruction extraction failed, using fallback");
                (FALLBACK_INSTRUCTION.to_string(), InstructionSource::Fallback)
            }
        }
    }

    /// Instance name used for scoring a task.
    pub fn scoring_instance_name(task_id: &str) -> String {
        let safe: String = task_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("tac_eval_{safe}_{}", std::process::id())
    }

    /// Shell script run inside the scoring instance.
    ///
    /// Points the services hostname at the configured server, skips the
    /// destructive reset step (the subject already changed the services),
    /// then runs the checker.
    pub fn scoring_script(transcript_path: &Path, output_path: &Path) -> String {
        [
            "echo '=== Setting up hostname resolution ==='".to_string(),
            "SERVICE_IP=$(getent hosts ${SERVER_HOSTNAME:-localhost} | awk '{print $1}' || echo 'host-gateway')".to_string(),
            "echo \"$SERVICE_IP the-agent-company.com\" >> /etc/hosts".to_string(),
            "echo '=== Skipping reset.sh (external agent mode) ==='".to_string(),
            "echo '=== Starting eval.py ==='".to_string(),
            format!(
                "python_default /utils/eval.py --trajectory_path {} --result_path {}",
                shell_quote(transcript_path),
                shell_quote(output_path)
            ),
            "echo '=== Evaluation completed ==='".to_string(),
        ]
        .join(" && ")
    }

    /// Launch configuration of a scoring pass. Paths must be absolute.
    pub fn scoring_spec(&self, request: &ScoreRequest<'_>) -> LaunchSpec {
        let mut spec = LaunchSpec::new(Self::scoring_instance_name(request.task_id), request.image)
            .with_timeout(self.config.score_timeout)
            .with_mount(Mount::read_write(&self.config.workspace_dir, "/workspace"));

        let transcript_dir = request.transcript_path.parent().unwrap_or(Path::new("/"));
        let output_dir = request.output_path.parent().unwrap_or(Path::new("/"));
        if transcript_dir == output_dir {
            spec = spec.with_mount(Mount::mirrored(output_dir, false));
        } else {
            spec = spec
                .with_mount(Mount::mirrored(transcript_dir, true))
                .with_mount(Mount::mirrored(output_dir, false));
        }

        for (key, value) in request.server.scoring_env() {
            spec = spec.with_env(key, value);
        }

        let spec = spec.with_command([
            "bash".to_string(),
            "-c".to_string(),
            Self::scoring_script(request.transcript_path, request.output_path),
        ]);
        self.platform.configure(spec, self.config.use_host_network)
    }

    /// Runs the scoring pass for a task and parses its score artifact.
    ///
    /// Errors mean "could not score", never "scored zero".
    pub async fn score(&self, request: &ScoreRequest<'_>) -> Result<ScoreResult, EnvironmentError> {
        let transcript_path = absolute(request.transcript_path)?;
        let output_path = absolute(request.output_path)?;
        let request = ScoreRequest {
            transcript_path: &transcript_path,
            output_path: &output_path,
            ..*request
        };

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.config.workspace_dir).await {
            debug!(error = %e, "Could not create workspace directory");
        }

        let spec = self.scoring_spec(&request);
        let started = Instant::now();
        let output = self.run_instance(&spec, "Scoring").await?;
        info!(
            task_id = request.task_id,
            exit_code = output.exit_code,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Scoring instance finished"
        );

        if !output.is_success() {
            return Err(EnvironmentError::NonZeroExit {
                code: output.exit_code,
                output: output.tail(500),
            });
        }

        let contents = match tokio::fs::read_to_string(&output_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnvironmentError::MissingArtifact(
                    output_path.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        ScoreResult::parse_artifact(&contents)
    }

    /// Runs an instance under its timeout, tracking it as active.
    async fn run_instance(
        &self,
        spec: &LaunchSpec,
        operation: &str,
    ) -> Result<InstanceOutput, EnvironmentError> {
        // A previous run may have left an instance with the same fixed name.
        self.cleanup(&spec.name).await;
        self.set_active(Some(spec.name.clone()));

        let result = tokio::time::timeout(spec.timeout, self.runtime.run(spec)).await;
        self.set_active(None);

        match result {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    name = %spec.name,
                    timeout_secs = spec.timeout.as_secs(),
                    "{operation} timed out, removing instance"
                );
                self.cleanup(&spec.name).await;
                Err(EnvironmentError::Timeout {
                    operation: operation.to_string(),
                    seconds: spec.timeout.as_secs(),
                })
            }
        }
    }

    /// Force-removes an instance by name. Safe to call when nothing runs.
    pub async fn cleanup(&self, name: &str) -> bool {
        match self.runtime.remove(name).await {
            Ok(()) => true,
            Err(e) => {
                debug!(name, error = %e, "Instance cleanup failed");
                false
            }
        }
    }

    /// Removes the currently running instance, if any. Returns its name.
    pub async fn cleanup_active(&self) -> Option<String> {
        let name = self.active.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        info!(name = %name, "Removing active instance");
        self.cleanup(&name).await;
        Some(name)
    }
}

/// Single-quotes a path for `bash -c`.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn absolute(path: &Path) -> Result<PathBuf, EnvironmentError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::launch::NetworkMode;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted runtime recording every call.
    #[derive(Default)]
    struct FakeRuntime {
        present: Mutex<HashSet<String>>,
        pull_fails: bool,
        run_delay: Option<Duration>,
        exit_code: i64,
        stdout: String,
        /// Written to the `--result_path` of scoring runs.
        artifact: Option<String>,
        pulls: AtomicUsize,
        runs: Mutex<Vec<LaunchSpec>>,
        removed: Mutex<Vec<String>>,
    }

    fn result_path_arg(script: &str) -> Option<&str> {
        let rest = script.split("--result_path ").nth(1)?;
        rest.split(" && ").next().map(|p| p.trim_matches('\''))
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn ping(&self) -> Result<(), EnvironmentError> {
            Ok(())
        }

        async fn image_present(&self, image: &str) -> Result<bool, EnvironmentError> {
            Ok(self.present.lock().unwrap().contains(image))
        }

        async fn pull_image(&self, image: &str, _: Option<&str>) -> Result<(), EnvironmentError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.pull_fails {
                return Err(EnvironmentError::ImagePull {
                    image: image.to_string(),
                    reason: "network unreachable".to_string(),
                });
            }
            self.present.lock().unwrap().insert(image.to_string());
            Ok(())
        }

        async fn run(&self, spec: &LaunchSpec) -> Result<InstanceOutput, EnvironmentError> {
            self.runs.lock().unwrap().push(spec.clone());
            if let Some(delay) = self.run_delay {
                tokio::time::sleep(delay).await;
            }
            if let (Some(artifact), Some(script)) = (&self.artifact, spec.command.get(2)) {
                if let Some(path) = result_path_arg(script) {
                    std::fs::write(path, artifact).unwrap();
                }
            }
            Ok(InstanceOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }

        async fn remove(&self, name: &str) -> Result<(), EnvironmentError> {
            self.removed.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn manager(runtime: FakeRuntime) -> (Arc<FakeRuntime>, EnvironmentManager) {
        let runtime = Arc::new(runtime);
        let manager = EnvironmentManager::new(runtime.clone(), EnvironmentConfig::default())
            .with_platform(HostPlatform::linux_x86());
        (runtime, manager)
    }

    #[tokio::test]
    async fn test_ensure_image_pulls_once() {
        let (runtime, manager) = manager(FakeRuntime::default());
        assert!(manager.ensure_image("img:1").await);
        assert!(manager.ensure_image("img:1").await);
        assert_eq!(runtime.pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_image_pull_failure_is_false() {
        let (_, manager) = manager(FakeRuntime {
            pull_fails: true,
            ..Default::default()
        });
        assert!(!manager.ensure_image("img:1").await);
    }

    #[tokio::test]
    async fn test_extract_instruction_success() {
        let (runtime, manager) = manager(FakeRuntime {
            stdout: "Send a hello message to #general".to_string(),
            ..Default::default()
        });
        let text = manager.extract_instruction("img:1").await;
        assert_eq!(text, "Send a hello message to #general");

        let runs = runtime.runs.lock().unwrap();
        assert_eq!(runs[0].command, vec!["cat", INSTRUCTION_PATH]);
        assert!(manager.active_instance().is_none());
    }

    #[tokio::test]
    async fn test_extract_instruction_falls_back() {
        let (_, manager) = manager(FakeRuntime {
            exit_code: 1,
            ..Default::default()
        });
        assert_eq!(manager.extract_instruction("img:1").await, FALLBACK_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_instruction_for_prefers_cache() {
        let (runtime, manager) = manager(FakeRuntime::default());
        manager.instructions().insert("hr-mass-survey", "cached text");

        let (text, source) = manager.instruction_for("hr-mass-survey", "img:1").await;
        assert_eq!(text, "cached text");
        assert_eq!(source, InstructionSource::Cache);
        assert!(runtime.runs.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_timeout_removes_instance() {
        let (runtime, manager) = manager(FakeRuntime {
            run_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let err = manager
            .try_extract_instruction("img:1")
            .await
            .expect_err("should time out");
        assert!(matches!(err, EnvironmentError::Timeout { seconds: 30, .. }));

        // once before launch, once after the timeout
        assert_eq!(runtime.removed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_scoring_spec_shares_directory_mount() {
        let (_, manager) = manager(FakeRuntime::default());
        let server = ServerContext::default();
        let request = ScoreRequest {
            task_id: "pm-send-hello-message",
            image: "img:1",
            transcript_path: Path::new("/runs/1/traj_pm-send-hello-message.json"),
            output_path: Path::new("/runs/1/result_pm-send-hello-message.json"),
            server: &server,
        };
        let spec = manager.scoring_spec(&request);

        assert_eq!(spec.network, NetworkMode::Host);
        assert_eq!(
            spec.binds(),
            vec!["/tmp/workspace:/workspace:rw", "/runs/1:/runs/1:rw"]
        );
        assert!(spec
            .env_list()
            .contains(&format!("DECRYPTION_KEY={DECRYPTION_KEY}")));
        assert!(spec.env_list().contains(&"LITELLM_MODEL=openai/gpt-4o".to_string()));
        assert!(!spec.env_list().iter().any(|e| e.starts_with("LITELLM_API_KEY=")));
        assert_eq!(spec.timeout, Duration::from_secs(900));
        assert!(spec.command[2]
            .contains("--trajectory_path '/runs/1/traj_pm-send-hello-message.json'"));
        assert!(spec.command[2].contains("Skipping reset.sh"));
    }

    #[test]
    fn test_scoring_spec_separate_directories() {
        let (_, manager) = manager(FakeRuntime::default());
        let server = ServerContext::default();
        let request = ScoreRequest {
            task_id: "t",
            image: "img:1",
            transcript_path: Path::new("/data/trajectories/t.json"),
            output_path: Path::new("/runs/1/result_t.json"),
            server: &server,
        };
        let binds = manager.scoring_spec(&request).binds();
        assert!(binds.contains(&"/data/trajectories:/data/trajectories:ro".to_string()));
        assert!(binds.contains(&"/runs/1:/runs/1:rw".to_string()));
    }

    #[tokio::test]
    async fn test_score_parses_artifact() {
        let dir = TempDir::new().expect("tempdir");
        let (_, manager) = manager(FakeRuntime {
            artifact: Some(
                r#"{"checkpoints":[{"total":1,"result":1}],"final_score":{"total":1,"result":1}}"#
                    .to_string(),
            ),
            ..Default::default()
        });
        let manager = EnvironmentManager {
            config: EnvironmentConfig::default().with_workspace_dir(dir.path().join("ws")),
            ..manager
        };

        let transcript = dir.path().join("traj_t.json");
        let output = dir.path().join("result_t.json");
        let server = ServerContext::default();
        let score = manager
            .score(&ScoreRequest {
                task_id: "t",
                image: "img:1",
                transcript_path: &transcript,
                output_path: &output,
                server: &server,
            })
            .await
            .expect("score");

        assert_eq!(score.achieved(), 1);
        assert_eq!(score.possible(), 1);
    }

    #[tokio::test]
    async fn test_score_missing_artifact() {
        let dir = TempDir::new().expect("tempdir");
        let (_, manager) = manager(FakeRuntime::default());
        let manager = EnvironmentManager {
            config: EnvironmentConfig::default().with_workspace_dir(dir.path().join("ws")),
            ..manager
        };

        let transcript = dir.path().join("traj_t.json");
        let output = dir.path().join("result_t.json");
        let server = ServerContext::default();
        let err = manager
            .score(&ScoreRequest {
                task_id: "t",
                image: "img:1",
                transcript_path: &transcript,
                output_path: &output,
                server: &server,
            })
            .await
            .expect_err("no artifact");
        assert!(matches!(err, EnvironmentError::MissingArtifact(_)));
    }

    #[tokio::test]
    async fn test_score_non_zero_exit() {
        let dir = TempDir::new().expect("tempdir");
        let (_, manager) = manager(FakeRuntime {
            exit_code: 2,
            stdout: "=== Starting eval.py ===".to_string(),
            ..Default::default()
        });
        let manager = EnvironmentManager {
            config: EnvironmentConfig::default().with_workspace_dir(dir.path().join("ws")),
            ..manager
        };

        let transcript = dir.path().join("traj_t.json");
        let output = dir.path().join("result_t.json");
        let server = ServerContext::default();
        let err = manager
            .score(&ScoreRequest {
                task_id: "t",
                image: "img:1",
                transcript_path: &transcript,
                output_path: &output,
                server: &server,
            })
            .await
            .expect_err("non-zero exit");
        assert!(matches!(err, EnvironmentError::NonZeroExit { code: 2, .. }));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (runtime, manager) = manager(FakeRuntime::default());
        assert!(manager.cleanup("tac_eval_x").await);
        assert!(manager.cleanup("tac_eval_x").await);
        assert!(manager.cleanup_active().await.is_none());
        assert_eq!(runtime.removed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_scoring_script_quotes_paths() {
        let script = EnvironmentManager::scoring_script(
            Path::new("/runs/my run/traj_t.json"),
            Path::new("/runs/it's; rm -rf/result_t.json"),
        );
        assert!(script.contains("--trajectory_path '/runs/my run/traj_t.json'"));
        assert!(script.contains(r"--result_path '/runs/it'\''s; rm -rf/result_t.json'"));
    }

    #[tokio::test]
    async fn test_score_with_spaces_in_output_dir() {
        let dir = TempDir::new().expect("tempdir");
        let run_dir = dir.path().join("run output");
        let (_, manager) = manager(FakeRuntime {
            artifact: Some(r#"{"checkpoints":[{"total":2,"result":1}]}"#.to_string()),
            ..Default::default()
        });
        let manager = EnvironmentManager {
            config: EnvironmentConfig::default().with_workspace_dir(dir.path().join("ws")),
            ..manager
        };

        let transcript = run_dir.join("traj_t.json");
        let output = run_dir.join("result_t.json");
        let server = ServerContext::default();
        let score = manager
            .score(&ScoreRequest {
                task_id: "t",
                image: "img:1",
                transcript_path: &transcript,
                output_path: &output,
                server: &server,
            })
            .await
            .expect("score");
        assert_eq!(score.final_score, crate::scoring::Checkpoint::new(2, 1));
    }

    #[test]
    fn test_scoring_instance_name_is_sanitized() {
        let name = EnvironmentManager::scoring_instance_name("odd task/name");
        assert!(name.starts_with("tac_eval_odd_task_name_"));
    }
}
