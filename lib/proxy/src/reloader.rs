use std::path::PathBuf;

use glinr_command::run_command;
use serde::Serialize;
use tokio::{fs, sync::Mutex};

/// Serializes reloads process-wide (spec.md §5: "only one reload is in
/// flight at a time").
pub struct Reloader {
  config_path: PathBuf,
  backup_path: PathBuf,
  tmp_path: PathBuf,
  validate_cmd: String,
  reload_cmd: String,
  state: Mutex<ReloadState>,
}

#[derive(Default, Clone)]
struct ReloadState {
  last_apply_time: Option<i64>,
  last_error: Option<String>,
  config_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadStatus {
  pub healthy: bool,
  pub last_apply_time: Option<i64>,
  pub last_error: Option<String>,
  pub config_hash: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
  #[error("failed to write config: {0}")]
  Io(#[from] std::io::Error),
  #[error("config validation failed: {0}")]
  ValidationFailed(String),
  #[error("reload command failed, backup restored: {0}")]
  ReloadFailed(String),
}

impl Reloader {
  pub fn new(
    config_path: PathBuf,
    validate_cmd: impl Into<String>,
    reload_cmd: impl Into<String>,
  ) -> Self {
    let backup_path = append_suffix(&config_path, ".backup");
    let tmp_path = append_suffix(&config_path, ".tmp");
    Self {
      config_path,
      backup_path,
      tmp_path,
      validate_cmd: validate_cmd.into(),
      reload_cmd: reload_cmd.into(),
      state: Mutex::new(ReloadState::default()),
    }
  }

  /// Write-validate-reload-or-restore (spec.md §4.7 "Reload"). A no-op
  /// when `new_hash` equals the last applied hash (spec.md §8 "Hash-gated
  /// reload").
  pub async fn reload(
    &self,
    new_config: &str,
    new_hash: &str,
    now_ms: i64,
  ) -> Result<(), ReloadError> {
    let mut state = self.state.lock().await;

    if state.config_hash.as_deref() == Some(new_hash) {
      return Ok(());
    }

    let had_active = fs::try_exists(&self.config_path).await.unwrap_or(false);
    if had_active {
      fs::copy(&self.config_path, &self.backup_path).await?;
    }

    fs::write(&self.tmp_path, new_config).await?;
    fs::rename(&self.tmp_path, &self.config_path).await?;

    let validate = run_command("nginx validate", None, &self.validate_cmd).await;
    if !validate.success {
      self.restore_backup(had_active).await?;
      let message = validate.context();
      state.last_error = Some(message.clone());
      return Err(ReloadError::ValidationFailed(message));
    }

    let reload = run_command("nginx reload", None, &self.reload_cmd).await;
    if !reload.success {
      self.restore_backup(had_active).await?;
      // Recovery attempt: reload again with the restored (known-good) config.
      let _ = run_command("nginx reload (recovery)", None, &self.reload_cmd).await;
      let message = reload.context();
      state.last_error = Some(message.clone());
      return Err(ReloadError::ReloadFailed(message));
    }

    state.last_apply_time = Some(now_ms);
    state.last_error = None;
    state.config_hash = Some(new_hash.to_string());
    Ok(())
  }

  pub async fn validate(&self) -> bool {
    run_command("nginx validate", None, &self.validate_cmd)
      .await
      .success
  }

  pub async fn status(&self) -> ReloadStatus {
    let state = self.state.lock().await;
    ReloadStatus {
      healthy: state.last_error.is_none(),
      last_apply_time: state.last_apply_time,
      last_error: state.last_error.clone(),
      config_hash: state.config_hash.clone(),
    }
  }

  async fn restore_backup(&self, had_active: bool) -> Result<(), ReloadError> {
    if had_active {
      fs::copy(&self.backup_path, &self.config_path).await?;
    } else {
      let _ = fs::remove_file(&self.config_path).await;
    }
    Ok(())
  }
}

fn append_suffix(path: &std::path::Path, suffix: &str) -> PathBuf {
  let mut s = path.as_os_str().to_os_string();
  s.push(suffix);
  PathBuf::from(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("glinrd-test-{}-{name}", std::process::id()))
  }

  #[tokio::test]
  async fn reload_rolls_back_on_validation_failure() {
    let config_path = temp_path("nginx.conf");
    let _ = fs::remove_file(&config_path).await;
    fs::write(&config_path, "old content").await.unwrap();

    let reloader = Reloader::new(config_path.clone(), "false", "true");
    let err = reloader.reload("new content", "hash1", 1000).await.unwrap_err();
    assert!(matches!(err, ReloadError::ValidationFailed(_)));

    let restored = fs::read_to_string(&config_path).await.unwrap();
    assert_eq!(restored, "old content");

    let _ = fs::remove_file(&config_path).await;
    let _ = fs::remove_file(append_suffix(&config_path, ".backup")).await;
  }

  #[tokio::test]
  async fn reload_is_noop_when_hash_unchanged() {
    let config_path = temp_path("nginx2.conf");
    let _ = fs::remove_file(&config_path).await;
    let reloader = Reloader::new(config_path.clone(), "true", "true");
    reloader.reload("content", "hash-a", 1000).await.unwrap();
    // Same hash again: no-op, returns Ok without touching validate/reload.
    reloader.reload("content-changed-but-same-hash", "hash-a", 2000).await.unwrap();
    let status = reloader.status().await;
    assert_eq!(status.last_apply_time, Some(1000));

    let _ = fs::remove_file(&config_path).await;
    let _ = fs::remove_file(append_suffix(&config_path, ".backup")).await;
  }
}
