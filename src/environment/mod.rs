//! Isolated task environments.
//!
//! Each benchmark task ships as a container image bundling its instruction
//! and its scoring checker. This module pulls those images, reads the
//! instruction out of a disposable instance, and runs the checker against a
//! recorded transcript.

pub mod instructions;
pub mod launch;
pub mod manager;
pub mod runtime;

pub use instructions::{
    precompute_instructions, InstructionCache, PrecomputeReport, INSTRUCTIONS_FILE,
};
pub use launch::{HostAlias, HostPlatform, LaunchSpec, Mount, NetworkMode};
pub use manager::{
    EnvironmentConfig, EnvironmentManager, InstructionSource, LlmCredentials, ScoreRequest,
    ServerContext, DEFAULT_CHECKER_MODEL, FALLBACK_INSTRUCTION,
};
pub use runtime::{ContainerRuntime, DockerRuntime, InstanceOutput};
