//! Shell command execution, mirroring the teacher's
//! `command::run_komodo_command` helper (called throughout
//! `bin/periphery/src/api/docker.rs` for `docker ...` invocations). Here it
//! backs the nginx `validate`/`reload` calls (spec.md §4.7).

use std::path::Path;

use tokio::process::Command;

/// Outcome of a shell command, named `Log` in the teacher (`update::Log`);
/// named directly for what it holds here.
#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub stage: String,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn context(&self) -> String {
    if self.success {
      self.stdout.clone()
    } else {
      format!("stdout: {}\nstderr: {}", self.stdout, self.stderr)
    }
  }
}

/// Runs `sh -c <command>`, optionally in `working_dir`, and never panics —
/// a failed spawn is reported as a failed [`CommandOutput`], same as the
/// teacher's helper, so callers can push it onto an update log uniformly.
pub async fn run_command(
  stage: &str,
  working_dir: Option<&Path>,
  command: impl Into<String>,
) -> CommandOutput {
  let command = command.into();
  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(&command);
  if let Some(dir) = working_dir {
    cmd.current_dir(dir);
  }

  match cmd.output().await {
    Ok(output) => CommandOutput {
      stage: stage.to_string(),
      success: output.status.success(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    },
    Err(e) => CommandOutput {
      stage: stage.to_string(),
      success: false,
      stdout: String::new(),
      stderr: format!("failed to spawn command: {e:#}"),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn runs_and_captures_stdout() {
    let out = run_command("echo", None, "echo hello").await;
    assert!(out.success);
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn failed_command_is_not_success() {
    let out = run_command("fail", None, "exit 1").await;
    assert!(!out.success);
  }
}
