//! Backend that hands each request to an external program.
//!
//! The request is written as JSON to the program's stdin. Exit status zero is success; anything
//! else fails the attempt with the program's stderr in the message.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{LoomError, Result};
use crate::generation::{BackgroundRemover, GenerationRequest, ImageBackend, RemoveBackgroundRequest};

/// Shell commands run for each request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub generate: String,
    pub remove_background: String,
    pub env: Vec<(String, String)>,
    /// Timeout in milliseconds (default: 120000)
    pub timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            generate: String::new(),
            remove_background: String::new(),
            env: Vec::new(),
            timeout_ms: 120_000,
        }
    }
}

impl CommandConfig {
    pub fn new(generate: impl Into<String>) -> Self {
        Self {
            generate: generate.into(),
            ..Default::default()
        }
    }

    pub fn remove_background(mut self, command: impl Into<String>) -> Self {
        self.remove_background = command.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandBackend {
    config: CommandConfig,
}

impl CommandBackend {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    async fn execute(&self, label: &str, command: &str, payload: &[u8]) -> Result<()> {
        if command.trim().is_empty() {
            return Err(LoomError::Backend(format!("no {} command configured", label)));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(payload).await
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LoomError::Backend(format!(
                    "{} command timed out after {}ms",
                    label, self.config.timeout_ms
                )));
            }
        };

        if output.status.success() {
            tracing::debug!(label, "Backend command succeeded");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut message = format!("{} command failed with exit code: {:?}", label, output.status.code());
        if !stderr.trim().is_empty() {
            message.push_str(&format!(": {}", stderr.trim()));
        }
        Err(LoomError::Backend(message))
    }
}

#[async_trait]
impl ImageBackend for CommandBackend {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<()> {
        let payload = serde_json::to_vec(request)?;
        self.execute("generate", &self.config.generate, &payload).await
    }
}

#[async_trait]
impl BackgroundRemover for CommandBackend {
    async fn remove_background(&self, request: &RemoveBackgroundRequest) -> Result<()> {
        let payload = serde_json::to_vec(request)?;
        self.execute("remove-background", &self.config.remove_background, &payload)
            .await
    }
}
