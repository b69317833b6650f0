//! Local inference through a `llama-cli` subprocess.
//!
//! The chat is flattened into a single prompt; llama.cpp diagnostics are
//! stripped from stdout before the text is returned.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::provider::{LlmError, LlmProvider, Message, Role};

const ERROR_MARKERS: &[&str] = &["error:", "Error:", "fatal:"];
const DIAGNOSTIC_PREFIXES: &[&str] = &["llama_", "main:", "system_info:"];

pub struct LocalProvider {
    binary: String,
    model: PathBuf,
}

impl LocalProvider {
    pub fn new(binary: String, model: PathBuf) -> Self {
        Self { binary, model }
    }

    /// The inference process is killed if the calling task is dropped.
    fn command(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model)
            .args(["--temp", &temperature.to_string()])
            .args(["-n", &max_tokens.to_string()])
            .args(["-p", prompt])
            .args(["--simple-io", "--no-display-prompt"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Flatten a system + user exchange into the prompt layout the local models
/// were tuned on.
pub fn render_prompt(messages: &[Message]) -> String {
    let system = join_role(messages, Role::System);
    let user = join_role(messages, Role::User);
    format!("### System:\n{system}\n\n### User Input:\n{user}\n\n### Assistant:")
}

fn join_role(messages: &[Message], role: Role) -> String {
    messages
        .iter()
        .filter(|m| m.role == role)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drop llama.cpp log lines that leak into stdout.
pub fn clean_output(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !DIAGNOSTIC_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn stderr_reports_error(stderr: &str) -> bool {
    ERROR_MARKERS.iter().any(|m| stderr.contains(m))
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let prompt = render_prompt(&messages);
        debug!(binary = %self.binary, model = %self.model.display(), "running local inference");

        let output = self
            .command(&prompt, temperature, max_tokens)
            .output()
            .await
            .map_err(|e| LlmError::Process(format!("failed to spawn {}: {e}", self.binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stderr_reports_error(&stderr) {
            error!(stderr = %stderr, "local LLM inference error");
            return Err(LlmError::Process(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(LlmError::Process(format!(
                "{} exited with {}",
                self.binary, output.status
            )));
        }

        Ok(clean_output(&stdout))
    }
}
