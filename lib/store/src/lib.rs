//! Durable store over a single on-disk file (spec.md §4.1): "Transactional
//! single-writer key-value over relational rows". Backed by `rusqlite`
//! (adopted from `examples/other_examples/manifests/gotempsh-temps`; the
//! teacher's own `database` lib wraps MongoDB, which is not a single local
//! file and has no source in the retrieval pack to generalize from).
//!
//! All access is serialized through one [`tokio::sync::Mutex`]-guarded
//! connection — the literal "single-writer" requirement — exposed as typed
//! CRUD methods per entity, split into one `impl` block per module the way
//! the teacher splits `resource::server`/`resource::build`/... per entity.

use std::{path::Path, time::Duration};

use rusqlite::Connection;
use tokio::sync::Mutex;

pub mod entities;
mod error;

mod audit;
pub mod build;
pub mod certificate;
pub mod domain;
mod job;
mod metric;
mod project;
pub mod route;
pub mod service;
mod token;

pub use error::{StoreError, StoreResult};
use glinr_crypto::MasterKey;
use std::sync::Arc;

/// Default deadline applied to Store operations (spec.md §4.1: "All reads
/// accept a timeout and fail with `ErrTimeout` if exceeded").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cheaply `Clone`-able handle: the guarded connection lives behind an
/// `Arc`, mirroring the teacher's `OnceLock`-backed global accessor
/// (`state::db()`) without requiring a process-global static — every
/// subsystem (governor, prober, job queue, HTTP handlers) holds its own
/// clone of the same handle.
#[derive(Clone)]
pub struct Store {
  conn: Arc<Mutex<Connection>>,
  pub master_key: MasterKey,
}

impl Store {
  pub async fn open(
    path: &Path,
    master_key: MasterKey,
  ) -> anyhow::Result<Self> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    let store = Self {
      conn: Arc::new(Mutex::new(conn)),
      master_key,
    };
    store.migrate().await?;
    Ok(store)
  }

  pub fn open_in_memory(master_key: MasterKey) -> anyhow::Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    let store = Self {
      conn: Arc::new(Mutex::new(conn)),
      master_key,
    };
    store.migrate_sync()?;
    Ok(store)
  }

  async fn migrate(&self) -> anyhow::Result<()> {
    self.migrate_sync()
  }

  fn migrate_sync(&self) -> anyhow::Result<()> {
    let conn = self.conn.blocking_lock();
    conn.execute_batch(SCHEMA)?;
    Ok(())
  }

  /// Runs `f` against the guarded connection, racing it against
  /// [`DEFAULT_TIMEOUT`] as spec.md §4.1 requires of all Store reads.
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
  where
    F: FnOnce(&Connection) -> StoreResult<T> + Send,
    T: Send,
  {
    let fut = async {
      let conn = self.conn.lock().await;
      f(&conn)
    };
    match tokio::time::timeout(DEFAULT_TIMEOUT, fut).await {
      Ok(result) => result,
      Err(_) => Err(StoreError::Timeout(DEFAULT_TIMEOUT)),
    }
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  slug TEXT NOT NULL UNIQUE,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS services (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  image TEXT NOT NULL,
  env TEXT NOT NULL DEFAULT '[]',
  ports TEXT NOT NULL DEFAULT '[]',
  volumes TEXT NOT NULL DEFAULT '[]',
  desired_state TEXT NOT NULL,
  status TEXT NOT NULL,
  container_id TEXT,
  health_check_type TEXT NOT NULL,
  health_path TEXT,
  health_status TEXT NOT NULL,
  restart_count INTEGER NOT NULL DEFAULT 0,
  restart_window_at INTEGER,
  last_exit_code INTEGER,
  crash_looping INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE(project_id, name)
);

CREATE TABLE IF NOT EXISTS routes (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
  domain TEXT NOT NULL,
  path TEXT,
  port INTEGER NOT NULL,
  tls INTEGER NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS certificates (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT NOT NULL,
  cert_type TEXT NOT NULL,
  issuer TEXT,
  not_before INTEGER,
  not_after INTEGER,
  status TEXT NOT NULL,
  pem_cert TEXT,
  pem_chain TEXT,
  pem_key_enc TEXT,
  pem_key_nonce TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_certificates_domain ON certificates(domain);

CREATE TABLE IF NOT EXISTS dns_providers (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  provider_type TEXT NOT NULL,
  config_json_enc TEXT NOT NULL,
  config_json_nonce TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS domains (
  domain TEXT PRIMARY KEY,
  provider_id INTEGER REFERENCES dns_providers(id),
  auto_manage INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS domain_verifications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT NOT NULL,
  method TEXT NOT NULL,
  challenge TEXT NOT NULL,
  status TEXT NOT NULL,
  last_checked_at INTEGER,
  created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_domain_verifications_domain ON domain_verifications(domain);

CREATE TABLE IF NOT EXISTS tokens (
  name TEXT PRIMARY KEY,
  hash TEXT NOT NULL,
  salt TEXT NOT NULL,
  role TEXT NOT NULL,
  last_used_at INTEGER,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
  id TEXT PRIMARY KEY,
  job_type TEXT NOT NULL,
  data TEXT NOT NULL,
  status TEXT NOT NULL,
  progress INTEGER NOT NULL DEFAULT 0,
  error TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS builds (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL,
  service_id INTEGER NOT NULL DEFAULT 0,
  git_url TEXT NOT NULL,
  git_ref TEXT NOT NULL,
  commit_sha TEXT,
  image_tag TEXT,
  context_path TEXT NOT NULL,
  dockerfile TEXT NOT NULL,
  status TEXT NOT NULL,
  triggered_by TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_entries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  timestamp INTEGER NOT NULL,
  actor TEXT NOT NULL,
  action TEXT NOT NULL,
  target_type TEXT NOT NULL,
  target_id TEXT NOT NULL,
  meta TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS historical_metrics (
  timestamp INTEGER PRIMARY KEY,
  cpu_percent REAL NOT NULL,
  memory_used INTEGER NOT NULL,
  memory_total INTEGER NOT NULL,
  disk_used INTEGER NOT NULL,
  disk_total INTEGER NOT NULL,
  net_rx INTEGER NOT NULL,
  net_tx INTEGER NOT NULL
);
"#;

#[cfg(test)]
mod tests {
  use super::*;

  pub fn test_store() -> Store {
    Store::open_in_memory(MasterKey::generate()).unwrap()
  }

  #[tokio::test]
  async fn migrates_clean() {
    let _store = test_store();
  }
}
