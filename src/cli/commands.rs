//! CLI command definitions for tac-evaluator.
//!
//! Each subcommand wires the library components together: task selection,
//! the Docker-backed environment manager and the A2A transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{TaskCatalog, ALL_SUBSET};
use crate::environment::{
    precompute_instructions, ContainerRuntime, DockerRuntime, EnvironmentConfig,
    EnvironmentManager, InstructionCache, LlmCredentials, ServerContext, DEFAULT_CHECKER_MODEL,
    INSTRUCTIONS_FILE,
};
use crate::evaluator::config::trajectories_dir;
use crate::evaluator::{
    parse_request_file, run_directory, EvaluationRequest, Evaluator, EvaluatorConfig,
    DEFAULT_DATA_DIR,
};
use crate::preflight::{run_preflight, DEFAULT_PROBE_TIMEOUT};
use crate::selection::{SelectionRequest, TaskSelector};
use crate::server::{self, AgentCard, EvaluationService, ServeConfig, DEFAULT_HOST, DEFAULT_PORT};
use crate::transcript::TranscriptArchive;
use crate::transport::{A2aClient, AgentTransport, ReadinessPolicy};

const DEFAULT_CHECK_MESSAGE: &str = "Hello! Please reply with a short greeting.";

/// Evaluation harness for conversational agents on containerized tasks.
#[derive(Parser)]
#[command(name = "tac-evaluator")]
#[command(about = "Evaluate an A2A agent against containerized benchmark tasks")]
#[command(version)]
#[command(
    long_about = "tac-evaluator sends each selected task's instruction to an agent, records the exchange, and scores it inside the task's container image.\n\nExample usage:\n  tac-evaluator evaluate --agent-url http://localhost:9002 --subset pm --max-tasks 3"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate an agent on a selection of tasks.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Serve the evaluator as an A2A agent that runs evaluations on request.
    Serve(ServeArgs),

    /// Wait for an agent to come up and exchange one message with it.
    CheckAgent(CheckAgentArgs),

    /// Check that the shared services and the container daemon are reachable.
    CheckServices(CheckServicesArgs),

    /// Extract task instructions ahead of time into the data directory.
    Precompute(PrecomputeArgs),

    /// Store a recorded transcript for replay in later evaluations.
    AddTrajectory(AddTrajectoryArgs),

    /// List catalogued tasks, subsets or categories.
    #[command(alias = "ls")]
    ListTasks(ListTasksArgs),

    /// Force-remove task instances by name.
    Cleanup(CleanupArgs),
}

/// Arguments for `tac-evaluator evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Base URL of the agent under evaluation.
    #[arg(short = 'a', long, env = "WHITE_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Comma-separated task ids to evaluate. Overrides --subset.
    #[arg(short = 't', long, value_delimiter = ',')]
    pub tasks: Vec<String>,

    /// Named subset (a category, "working" or "all").
    #[arg(short = 's', long)]
    pub subset: Option<String>,

    /// Evaluate at most this many tasks, sampled at random.
    #[arg(short = 'n', long)]
    pub max_tasks: Option<usize>,

    /// Seed for the task sample.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Request file: a tagged message or a YAML/JSON document.
    #[arg(short = 'r', long)]
    pub request_file: Option<PathBuf>,

    /// Run output directory. A fresh temporary directory is used if omitted.
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Context id shared by every task's session.
    #[arg(long)]
    pub context_id: Option<String>,

    /// Output JSON to stdout instead of a text report.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Settings shared by every evaluation run, local or requested.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Directory holding precomputed instructions and transcripts.
    #[arg(long, env = "TAC_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Hostname of the shared services.
    #[arg(long, env = "SERVER_HOSTNAME", default_value = "localhost")]
    pub server_hostname: String,

    /// API key for LLM-backed checkers.
    #[arg(long, env = "LITELLM_API_KEY", hide_env_values = true)]
    pub litellm_api_key: Option<String>,

    /// Base URL for LLM-backed checkers.
    #[arg(long, env = "LITELLM_BASE_URL")]
    pub litellm_base_url: Option<String>,

    /// Model for LLM-backed checkers.
    #[arg(long, env = "LITELLM_MODEL", default_value = DEFAULT_CHECKER_MODEL)]
    pub litellm_model: String,

    /// Record transcripts but do not run scoring instances.
    #[arg(long, env = "SKIP_DOCKER_EVAL")]
    pub skip_scoring: bool,

    /// Do not attach scoring instances to the host network.
    #[arg(long)]
    pub no_host_network: bool,

    /// Timeout in seconds for each task's exchange with the agent.
    #[arg(long, default_value = "900")]
    pub send_timeout: u64,
}

impl RunArgs {
    fn server_context(&self) -> ServerContext {
        ServerContext {
            server_hostname: self.server_hostname.clone(),
            llm: LlmCredentials {
                api_key: self.litellm_api_key.clone().filter(|k| !k.is_empty()),
                base_url: self.litellm_base_url.clone().filter(|u| !u.is_empty()),
                model: self.litellm_model.clone(),
            },
        }
    }

    /// Docker-backed environment manager with the precomputed instructions.
    async fn environment(&self) -> anyhow::Result<Arc<EnvironmentManager>> {
        let runtime = DockerRuntime::connect().context("Failed to set up Docker client")?;
        let config = EnvironmentConfig::default().with_host_network(!self.no_host_network);
        Ok(Arc::new(
            EnvironmentManager::new(Arc::new(runtime), config)
                .with_instruction_cache(load_instruction_cache(&self.data_dir).await),
        ))
    }

    fn evaluator_config(&self, agent_url: impl Into<String>, output_dir: &Path) -> EvaluatorConfig {
        EvaluatorConfig::new(agent_url, output_dir)
            .with_server(self.server_context())
            .with_data_dir(&self.data_dir)
            .with_skip_scoring(self.skip_scoring)
            .with_send_timeout(Duration::from_secs(self.send_timeout))
    }
}

/// Arguments for `tac-evaluator serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short = 'p', long, env = "AGENT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Public host advertised in the agent card instead of host:port.
    #[arg(long, env = "CLOUDRUN_HOST")]
    pub public_host: Option<String>,

    /// Advertise an https URL in the agent card.
    #[arg(long, env = "HTTPS_ENABLED")]
    pub https: bool,

    /// Parent directory of per-request run directories. Temporary
    /// directories are used if omitted.
    #[arg(short = 'o', long)]
    pub output_root: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for `tac-evaluator check-agent`.
#[derive(Parser, Debug)]
pub struct CheckAgentArgs {
    /// Base URL of the agent.
    #[arg(short = 'a', long, env = "WHITE_AGENT_URL")]
    pub agent_url: String,

    /// Message to send once the agent is ready.
    #[arg(short = 'm', long, default_value = DEFAULT_CHECK_MESSAGE)]
    pub message: String,

    /// Readiness probes before giving up.
    #[arg(long, default_value = "30")]
    pub attempts: u32,

    /// Timeout in seconds for the reply.
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

/// Arguments for `tac-evaluator check-services`.
#[derive(Parser, Debug)]
pub struct CheckServicesArgs {
    /// Hostname of the shared services.
    #[arg(long, env = "SERVER_HOSTNAME", default_value = "localhost")]
    pub server_hostname: String,

    /// Per-service timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `tac-evaluator precompute`.
#[derive(Parser, Debug)]
pub struct PrecomputeArgs {
    /// Comma-separated task ids. Overrides --subset.
    #[arg(short = 't', long, value_delimiter = ',')]
    pub tasks: Vec<String>,

    /// Subset to precompute.
    #[arg(short = 's', long, default_value = ALL_SUBSET)]
    pub subset: String,

    /// Directory receiving task_instructions.json.
    #[arg(long, env = "TAC_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `tac-evaluator add-trajectory`.
#[derive(Parser, Debug)]
pub struct AddTrajectoryArgs {
    /// Transcript JSON file to import.
    pub path: PathBuf,

    /// Task id to store it under. Inferred from the file when omitted.
    #[arg(long)]
    pub task_id: Option<String>,

    #[arg(long, env = "TAC_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}

/// Arguments for `tac-evaluator list-tasks`.
#[derive(Parser, Debug)]
pub struct ListTasksArgs {
    /// Subset to list. Defaults to every task.
    #[arg(short = 's', long)]
    pub subset: Option<String>,

    /// List categories and subsets with their sizes instead of task ids.
    #[arg(long)]
    pub summary: bool,

    /// Output JSON to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `tac-evaluator cleanup`.
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Instance names to remove.
    #[arg(required = true)]
    pub names: Vec<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Evaluate(args) => run_evaluate_command(args).await,
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::CheckAgent(args) => run_check_agent_command(args).await,
        Commands::CheckServices(args) => run_check_services_command(args).await,
        Commands::Precompute(args) => run_precompute_command(args).await,
        Commands::AddTrajectory(args) => run_add_trajectory_command(args).await,
        Commands::ListTasks(args) => run_list_tasks_command(args),
        Commands::Cleanup(args) => run_cleanup_command(args).await,
    }
}

// ============================================================================
// Evaluate
// ============================================================================

/// Builds the request from a request file and/or flags. Flags (and their
/// environment variables) win over the file.
fn resolve_request(args: &EvaluateArgs) -> anyhow::Result<EvaluationRequest> {
    let mut request = match &args.request_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request file {}", path.display()))?;
            parse_request_file(&contents, args.agent_url.as_deref())
                .with_context(|| format!("Invalid request file {}", path.display()))?
        }
        None => EvaluationRequest {
            agent_url: args
                .agent_url
                .clone()
                .context("An agent URL is required (--agent-url or WHITE_AGENT_URL)")?,
            selection: SelectionRequest::default(),
        },
    };

    if let Some(url) = args.agent_url.as_ref().filter(|url| !url.is_empty()) {
        request.agent_url = url.clone();
    }
    if !args.tasks.is_empty() {
        request.selection.task_names = args.tasks.clone();
    }
    if args.subset.is_some() {
        request.selection.subset = args.subset.clone();
    }
    if args.max_tasks.is_some() {
        request.selection.max_tasks = args.max_tasks;
    }
    if args.seed.is_some() {
        request.selection.seed = args.seed;
    }

    Ok(request)
}

async fn load_instruction_cache(data_dir: &Path) -> Arc<InstructionCache> {
    let cache = InstructionCache::new(data_dir.join(INSTRUCTIONS_FILE));
    if let Err(e) = cache.load().await {
        warn!(error = %e, "Ignoring unreadable instruction cache");
    }
    Arc::new(cache)
}

async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let request = resolve_request(&args)?;
    let selection = TaskSelector::new(TaskCatalog::builtin()).select(&request.selection);
    if selection.is_empty() {
        bail!("No tasks selected");
    }

    let output_dir =
        run_directory(args.output_dir.clone()).context("Failed to create run directory")?;
    info!(
        agent_url = %request.agent_url,
        tasks = selection.len(),
        output_dir = %output_dir.display(),
        "Prepared evaluation run"
    );

    let environment = args.run.environment().await?;
    let config = args.run.evaluator_config(request.agent_url.clone(), &output_dir);
    let evaluator = Evaluator::new(config, environment.clone(), Arc::new(A2aClient::new()));

    let outcome = tokio::select! {
        result = evaluator.evaluate(&selection, args.context_id.as_deref()) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, removing active instance");
            if let Some(name) = environment.cleanup_active().await {
                info!(name = %name, "Removed active instance");
            }
            bail!("Evaluation interrupted");
        }
    };
    let report = outcome.context("Evaluation aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", report.render());
    }

    Ok(())
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let serve_config = ServeConfig {
        host: args.host.clone(),
        port: args.port,
        public_host: args.public_host.clone(),
        https: args.https,
    };

    let environment = args.run.environment().await?;
    let template = args.run.evaluator_config("", Path::new(""));
    let mut service = EvaluationService::new(
        environment.clone(),
        Arc::new(A2aClient::new()),
        template,
        AgentCard::evaluator(serve_config.card_url()),
    );
    if let Some(root) = &args.output_root {
        service = service.with_output_root(root);
    }

    let listener = tokio::net::TcpListener::bind(serve_config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", serve_config.bind_addr()))?;
    println!("Evaluator agent listening on {}", serve_config.bind_addr());
    println!("Agent card URL: {}", serve_config.card_url());

    tokio::select! {
        result = server::serve(listener, service) => result.context("Server error")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, removing active instance");
            if let Some(name) = environment.cleanup_active().await {
                info!(name = %name, "Removed active instance");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Agent and service checks
// ============================================================================

async fn run_check_agent_command(args: CheckAgentArgs) -> anyhow::Result<()> {
    let client = A2aClient::new();
    let policy = ReadinessPolicy::default().with_max_attempts(args.attempts);

    println!("Waiting for agent at {}...", args.agent_url);
    if !client.wait_ready(&args.agent_url, &policy).await {
        bail!(
            "Agent at {} did not become ready after {} attempts",
            args.agent_url,
            args.attempts
        );
    }

    match client.agent_card(&args.agent_url, policy.per_attempt_timeout).await {
        Ok(card) => {
            let name = card.get("name").and_then(|n| n.as_str()).unwrap_or("unnamed");
            println!("✓ Agent ready: {name}");
        }
        Err(e) => warn!(error = %e, "Agent card unreadable"),
    }

    let response = client
        .send(
            &args.agent_url,
            &args.message,
            None,
            Duration::from_secs(args.timeout),
        )
        .await
        .context("Agent did not answer")?;

    println!("\n=== Agent Reply ===");
    println!("{}", response.reply_text());
    Ok(())
}

async fn run_check_services_command(args: CheckServicesArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let runtime = match DockerRuntime::connect() {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            warn!(error = %e, "Docker client unavailable");
            None
        }
    };

    let report = run_preflight(
        &client,
        &args.server_hostname,
        runtime.as_ref().map(|r| r as &dyn ContainerRuntime),
        Duration::from_secs(args.timeout),
    )
    .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }

    if !report.all_ok() {
        bail!("Some services are not accessible");
    }
    Ok(())
}

// ============================================================================
// Data preparation
// ============================================================================

async fn run_precompute_command(args: PrecomputeArgs) -> anyhow::Result<()> {
    let request = SelectionRequest::new()
        .with_task_names(args.tasks.clone())
        .with_subset(args.subset.clone());
    let selection = TaskSelector::new(TaskCatalog::builtin()).select(&request);

    let runtime = DockerRuntime::connect().context("Failed to set up Docker client")?;
    let manager = EnvironmentManager::new(Arc::new(runtime), EnvironmentConfig::default())
        .with_instruction_cache(load_instruction_cache(&args.data_dir).await);

    info!(tasks = selection.len(), "Precomputing task instructions");
    let report = precompute_instructions(&manager, &selection).await;
    manager
        .instructions()
        .save()
        .await
        .context("Failed to write instruction cache")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n=== Precompute Results ===");
        println!("Stored:  {}", report.stored.len());
        println!("Failed:  {}", report.failed.len());
        println!("Cached:  {}", manager.instructions().len());
        for task_id in &report.failed {
            println!("  ✗ {task_id}");
        }
    }

    Ok(())
}

async fn run_add_trajectory_command(args: AddTrajectoryArgs) -> anyhow::Result<()> {
    if !args.path.is_file() {
        bail!("Transcript file does not exist: {}", args.path.display());
    }

    let archive = TranscriptArchive::new(trajectories_dir(&args.data_dir));
    let (task_id, dest) = archive
        .import(&args.path, args.task_id.as_deref())
        .await
        .with_context(|| format!("Failed to import {}", args.path.display()))?;

    if !TaskCatalog::builtin().contains(&task_id) {
        warn!(task_id = %task_id, "Task is not in the catalog");
    }

    println!("✓ Stored transcript for {task_id} at {}", dest.display());
    Ok(())
}

// ============================================================================
// Catalog and maintenance
// ============================================================================

#[derive(Serialize)]
struct GroupSize<'a> {
    name: &'a str,
    tasks: usize,
}

fn run_list_tasks_command(args: ListTasksArgs) -> anyhow::Result<()> {
    let catalog = TaskCatalog::builtin();

    if args.summary {
        let categories: Vec<_> = catalog
            .categories()
            .map(|name| GroupSize {
                name,
                tasks: catalog.category_tasks(name).map_or(0, <[String]>::len),
            })
            .collect();
        let subsets: Vec<_> = catalog
            .subset_names()
            .map(|name| GroupSize {
                name,
                tasks: catalog.subset(name).map_or(0, <[String]>::len),
            })
            .collect();

        if args.json {
            let value = serde_json::json!({ "categories": categories, "subsets": subsets });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("=== Categories ===");
            for group in &categories {
                println!("  {:<12} {}", group.name, group.tasks);
            }
            println!("\n=== Subsets ===");
            for group in &subsets {
                println!("  {:<12} {}", group.name, group.tasks);
            }
        }
        return Ok(());
    }

    let subset = args.subset.as_deref().unwrap_or(ALL_SUBSET);
    let tasks: Vec<_> = catalog
        .subset_strict(subset)?
        .iter()
        .map(|id| catalog.descriptor(id))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        for task in &tasks {
            println!("{:<50} {}", task.id, task.image_ref);
        }
    }
    Ok(())
}

async fn run_cleanup_command(args: CleanupArgs) -> anyhow::Result<()> {
    let runtime = DockerRuntime::connect().context("Failed to set up Docker client")?;
    let manager = EnvironmentManager::new(Arc::new(runtime), EnvironmentConfig::default());

    let mut failures = 0;
    for name in &args.names {
        if manager.cleanup(name).await {
            println!("✓ Removed {name}");
        } else {
            println!("✗ Could not remove {name}");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} instance(s) could not be removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_with_options() {
        let args = vec![
            "tac-evaluator",
            "evaluate",
            "--agent-url",
            "http://localhost:9002",
            "-t",
            "pm-send-hello-message,sde-create-new-repo",
            "-n",
            "1",
            "--seed",
            "42",
            "-o",
            "/tmp/run",
            "-j",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.agent_url.as_deref(), Some("http://localhost:9002"));
                assert_eq!(args.tasks, vec!["pm-send-hello-message", "sde-create-new-repo"]);
                assert_eq!(args.max_tasks, Some(1));
                assert_eq!(args.seed, Some(42));
                assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/run")));
                assert_eq!(args.run.send_timeout, 900);
                assert!(args.json);
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_evaluate_alias() {
        let cli = Cli::try_parse_from(["tac-evaluator", "eval", "-a", "http://agent", "-s", "hr"])
            .expect("should parse with alias");
        assert!(matches!(cli.command, Commands::Evaluate(_)));
    }

    #[test]
    fn test_cleanup_requires_names() {
        assert!(Cli::try_parse_from(["tac-evaluator", "cleanup"]).is_err());
        let cli = Cli::try_parse_from(["tac-evaluator", "cleanup", "tac_eval_x_1"])
            .expect("should parse");
        match cli.command {
            Commands::Cleanup(args) => assert_eq!(args.names, vec!["tac_eval_x_1"]),
            _ => panic!("Expected Cleanup command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["tac-evaluator", "list-tasks", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_resolve_request_from_flags() {
        let cli = Cli::try_parse_from([
            "tac-evaluator",
            "evaluate",
            "-a",
            "http://agent",
            "-s",
            "finance",
            "-n",
            "2",
        ])
        .expect("should parse");
        let Commands::Evaluate(args) = cli.command else {
            panic!("Expected Evaluate command");
        };

        let request = resolve_request(&args).expect("resolve");
        assert_eq!(request.agent_url, "http://agent");
        assert_eq!(request.selection.subset.as_deref(), Some("finance"));
        assert_eq!(request.selection.max_tasks, Some(2));
    }

    #[test]
    fn test_flags_override_request_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("request.yaml");
        std::fs::write(&path, "agent_url: http://from-file\ntask_subset: hr\nmax_tasks: 5\n")
            .expect("write");

        let cli = Cli::try_parse_from([
            "tac-evaluator",
            "evaluate",
            "-r",
            path.to_str().expect("utf-8 path"),
            "-n",
            "1",
        ])
        .expect("should parse");
        let Commands::Evaluate(args) = cli.command else {
            panic!("Expected Evaluate command");
        };

        let request = resolve_request(&args).expect("resolve");
        assert_eq!(request.agent_url, "http://from-file");
        assert_eq!(request.selection.subset.as_deref(), Some("hr"));
        assert_eq!(request.selection.max_tasks, Some(1));
    }

    #[test]
    fn test_agent_url_flag_overrides_request_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("request.txt");
        std::fs::write(
            &path,
            "<white_agent_url>http://from-file</white_agent_url>\n\
             <evaluation_config>{\"task_subset\": \"pm\"}</evaluation_config>\n",
        )
        .expect("write");

        let cli = Cli::try_parse_from([
            "tac-evaluator",
            "evaluate",
            "-r",
            path.to_str().expect("utf-8 path"),
            "-a",
            "http://from-flag",
        ])
        .expect("should parse");
        let Commands::Evaluate(args) = cli.command else {
            panic!("Expected Evaluate command");
        };

        let request = resolve_request(&args).expect("resolve");
        assert_eq!(request.agent_url, "http://from-flag");
        assert_eq!(request.selection.subset.as_deref(), Some("pm"));
    }

    #[test]
    fn test_serve_options() {
        let cli = Cli::try_parse_from([
            "tac-evaluator",
            "serve",
            "-p",
            "9101",
            "--public-host",
            "eval.example.org",
            "--https",
            "--skip-scoring",
        ])
        .expect("should parse");
        let Commands::Serve(args) = cli.command else {
            panic!("Expected Serve command");
        };

        assert_eq!(args.port, 9101);
        assert!(args.run.skip_scoring);
        let config = ServeConfig {
            host: args.host,
            port: args.port,
            public_host: args.public_host,
            https: args.https,
        };
        assert_eq!(config.card_url(), "https://eval.example.org");
    }
}
