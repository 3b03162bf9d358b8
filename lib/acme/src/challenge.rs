use std::path::{Path, PathBuf};

use tokio::fs;

/// Writer for the HTTP-01 challenge directory shared with the proxy
/// (spec.md §5 "Shared resources": the proxy reads, ACME writes; writes
/// go into unique per-token filenames).
pub struct ChallengeDir {
  root: PathBuf,
}

impl ChallengeDir {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn token_path(&self, token: &str) -> PathBuf {
    self.root.join(".well-known").join("acme-challenge").join(token)
  }

  pub async fn write(&self, token: &str, key_authorization: &str) -> std::io::Result<()> {
    let path = self.token_path(token);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::write(&path, key_authorization).await
  }

  pub async fn remove(&self, token: &str) {
    let _ = fs::remove_file(self.token_path(token)).await;
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn writes_and_removes_token_file() {
    let dir = tempfile_dir();
    let challenges = ChallengeDir::new(&dir);
    challenges.write("tok123", "tok123.keyauth").await.unwrap();
    let path = challenges.token_path("tok123");
    assert_eq!(fs::read_to_string(&path).await.unwrap(), "tok123.keyauth");
    challenges.remove("tok123").await;
    assert!(!path.exists());
  }

  fn tempfile_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("glinr-acme-test-{}", std::process::id()));
    dir
  }
}
