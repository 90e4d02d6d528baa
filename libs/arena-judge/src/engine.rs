/// Sandbox Runtime Adapter - runs one program in one disposable container
///
/// **Core Responsibility:**
/// Execute program text in a fresh environment and return its combined
/// output, within a time budget.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (Docker)
/// - Engine does NOT know what a test case is
/// - Engine does NOT compare outputs
///
/// **Failure classes:**
/// - Backend unreachable -> `SandboxError::Unavailable`
/// - Container could not be created/started -> `SandboxError::Provisioning`
/// - Budget exceeded -> `SandboxError::Timeout`
/// - Non-zero exit -> NOT an error; the output is returned with its exit code

use crate::error::SandboxError;
use crate::metrics;
use arena_common::languages::LanguageConfig;
use arena_common::types::strip_nul;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Programs above this size are refused before reaching Docker
const MAX_PROGRAM_BYTES: usize = 1024 * 1024;

/// Raw result of one sandbox run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// stdout and stderr, interleaved, NUL-free
    pub output: String,
    pub exit_code: i64,
    pub execution_time_ms: u64,
}

impl ExecutionOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can run a program in isolation
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `program` with the interpreter and image configured for `language`.
    ///
    /// Implementations must release the environment before returning,
    /// whatever the outcome.
    async fn execute(
        &self,
        language: &LanguageConfig,
        program: &str,
        budget: Duration,
    ) -> Result<ExecutionOutput, SandboxError>;
}

/// Container cleanup guard - removes the container on drop unless it was
/// already removed explicitly. Covers cancellation of the executing future.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
            armed: true,
        }
    }

    /// Remove the container now and disarm the guard
    async fn remove(mut self) {
        self.armed = false;
        remove_container(&self.docker, &self.container_id).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker = self.docker.clone();
        let container_id = std::mem::take(&mut self.container_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_container(&docker, &container_id).await;
                });
            }
            Err(_) => {
                warn!(container_id = %container_id, "No runtime available, container leaked");
            }
        }
    }
}

async fn remove_container(docker: &Docker, container_id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    match docker.remove_container(container_id, Some(options)).await {
        Ok(()) => debug!(container_id = %container_id, "Container removed"),
        Err(e) => warn!(container_id = %container_id, error = %e, "Failed to remove container"),
    }
}

/// Docker-backed sandbox
///
/// One container per execution, created from the language's base image,
/// network disabled, optional memory/CPU caps from the language config.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Build a client for the local Docker daemon. No request is sent yet.
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        Ok(Self::with_client(docker))
    }

    /// Use an already configured client, e.g. a remote daemon over HTTP
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check the daemon answers
    pub async fn ping(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::Unavailable(e.to_string()))
    }

    /// Pull the image when it is not cached locally
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    fn container_config(language: &LanguageConfig, program: &str) -> Config<String> {
        let host_config = bollard::models::HostConfig {
            memory: language
                .memory_limit_mb
                .map(|mb| i64::from(mb) * 1024 * 1024),
            nano_cpus: language
                .cpu_limit
                .map(|cpus| (f64::from(cpus) * 1_000_000_000.0) as i64),
            ..Default::default()
        };

        Config {
            image: Some(language.image.clone()),
            cmd: Some(language.command(program)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Block until the container stops and return its exit code
    async fn wait_for_exit(&self, container_id: &str) -> Result<i64, SandboxError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(container_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as errors
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::Wait(e.to_string())),
            None => Err(SandboxError::Wait("no wait response from container".to_string())),
        }
    }

    /// Combined stdout/stderr of a stopped container
    async fn read_output(&self, container_id: &str) -> Result<String, SandboxError> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        });

        let mut combined = String::new();
        let mut logs = self.docker.logs(container_id, options);
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    combined.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(SandboxError::Wait(e.to_string())),
            }
        }
        Ok(strip_nul(&combined))
    }

    /// Start, wait within budget, collect output. Removal is the caller's job.
    async fn run_container(
        &self,
        container_id: &str,
        budget: Duration,
    ) -> Result<(String, i64), SandboxError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;

        match tokio::time::timeout(budget, self.wait_for_exit(container_id)).await {
            Ok(exit) => {
                let exit_code = exit?;
                let output = self.read_output(container_id).await?;
                Ok((output, exit_code))
            }
            Err(_) => {
                warn!(
                    container_id = %container_id,
                    budget_ms = budget.as_millis() as u64,
                    "Execution timed out, killing container"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                }
                Err(SandboxError::Timeout(budget))
            }
        }
    }

    async fn execute_in_container(
        &self,
        language: &LanguageConfig,
        program: &str,
        budget: Duration,
    ) -> Result<(String, i64), SandboxError> {
        self.ensure_image(&language.image).await?;

        let container_name = format!("arena-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(create_options), Self::container_config(language, program))
            .await?;

        // Armed before anything else can fail
        let guard = ContainerGuard::new(self.docker.clone(), container.id.clone());
        let result = self.run_container(&container.id, budget).await;
        guard.remove().await;

        result
    }
}

#[async_trait]
impl Sandbox for DockerEngine {
    async fn execute(
        &self,
        language: &LanguageConfig,
        program: &str,
        budget: Duration,
    ) -> Result<ExecutionOutput, SandboxError> {
        if program.len() > MAX_PROGRAM_BYTES {
            return Err(SandboxError::Provisioning(format!(
                "program exceeds maximum size of {} bytes",
                MAX_PROGRAM_BYTES
            )));
        }

        let start_time = Instant::now();
        let result = self.execute_in_container(language, program, budget).await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        let outcome = match &result {
            Ok((_, 0)) => "ok",
            Ok(_) => "runtime_error",
            Err(SandboxError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::SANDBOX_EXECUTIONS.with_label_values(&[outcome]).inc();

        let (output, exit_code) = result?;
        debug!(
            exit_code = exit_code,
            execution_ms = execution_time_ms,
            output_bytes = output.len(),
            "Container finished"
        );

        Ok(ExecutionOutput {
            output,
            exit_code,
            execution_time_ms,
        })
    }
}
