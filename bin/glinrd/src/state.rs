//! Process-wide shared components, grounded on the teacher's
//! `bin/core/src/state.rs`: one `OnceLock` per component, `get_or_init`
//! for pure defaults, `set`-once-and-panic-on-reinit for components that
//! need async or fallible construction at startup. Call sites reach these
//! directly (`state::store()`, `state::engine()`, ...) the way the
//! teacher's handlers reach `db_client()` / `server_status_cache()`,
//! rather than threading an axum `State<T>` extractor through the router.

use std::{
  sync::{Arc, OnceLock},
  time::Instant,
};

use glinr_acme::{AcmeClient, CertificatePipeline, ChallengeDir};
use glinr_cache::KeyedLocks;
use glinr_dns::DnsResolver;
use glinr_engine::{Engine, NetworkFabric};
use glinr_proxy::Reloader;
use glinr_store::Store;

use crate::{auth::ratelimit::AuthRateLimiter, jobqueue::JobQueue};

static STORE: OnceLock<Store> = OnceLock::new();

pub fn store() -> &'static Store {
  STORE.get().expect("store accessed before initialized")
}

pub fn init_store(store: Store) {
  STORE
    .set(store)
    .unwrap_or_else(|_| panic!("store initialized more than once"));
}

/// Test-only accessor: the same process-wide [`STORE`] slot, lazily
/// backed by an in-memory database on first use so lifecycle tests can
/// exercise `store()`/`service_locks()` call sites without a real
/// `main()` bootstrap. Later tests in the same binary share the one
/// instance `get_or_init` created first — harmless as long as each test
/// uses its own project/service names.
#[cfg(test)]
pub fn test_store() -> &'static Store {
  STORE.get_or_init(|| {
    Store::open_in_memory(glinr_crypto::MasterKey::generate()).expect("in-memory store for tests")
  })
}

static ENGINE: OnceLock<Arc<dyn Engine>> = OnceLock::new();

pub fn engine() -> &'static Arc<dyn Engine> {
  ENGINE.get().expect("engine accessed before initialized")
}

pub fn init_engine(engine: Arc<dyn Engine>) {
  ENGINE
    .set(engine)
    .unwrap_or_else(|_| panic!("engine initialized more than once"));
}

pub fn network_fabric() -> &'static NetworkFabric {
  static FABRIC: OnceLock<NetworkFabric> = OnceLock::new();
  FABRIC.get_or_init(|| NetworkFabric::new(engine().clone()))
}

static RELOADER: OnceLock<Arc<Reloader>> = OnceLock::new();

pub fn reloader() -> &'static Arc<Reloader> {
  RELOADER.get().expect("reloader accessed before initialized")
}

pub fn init_reloader(reloader: Arc<Reloader>) {
  RELOADER
    .set(reloader)
    .unwrap_or_else(|_| panic!("reloader initialized more than once"));
}

static CHALLENGE_DIR: OnceLock<Arc<ChallengeDir>> = OnceLock::new();

pub fn challenge_dir() -> &'static Arc<ChallengeDir> {
  CHALLENGE_DIR
    .get()
    .expect("challenge_dir accessed before initialized")
}

pub fn init_challenge_dir(dir: Arc<ChallengeDir>) {
  CHALLENGE_DIR
    .set(dir)
    .unwrap_or_else(|_| panic!("challenge_dir initialized more than once"));
}

static DNS_RESOLVER: OnceLock<Arc<DnsResolver>> = OnceLock::new();

pub fn dns_resolver() -> &'static Arc<DnsResolver> {
  DNS_RESOLVER
    .get()
    .expect("dns_resolver accessed before initialized")
}

pub fn init_dns_resolver(resolver: Arc<DnsResolver>) {
  DNS_RESOLVER
    .set(resolver)
    .unwrap_or_else(|_| panic!("dns_resolver initialized more than once"));
}

/// `None` when the process has no ACME directory wired (spec.md §4.9,
/// §9 "ACME not wired"): manual/custom certificates keep working, issuance
/// and renewal of `acme`-typed certificates return `not-implemented`.
static ACME_CLIENT: OnceLock<Option<Arc<dyn AcmeClient>>> = OnceLock::new();

pub fn acme_client() -> Option<&'static Arc<dyn AcmeClient>> {
  ACME_CLIENT
    .get()
    .expect("acme_client accessed before initialized")
    .as_ref()
}

pub fn init_acme_client(client: Option<Arc<dyn AcmeClient>>) {
  ACME_CLIENT
    .set(client)
    .unwrap_or_else(|_| panic!("acme_client initialized more than once"));
}

static CERT_PIPELINE: OnceLock<Option<Arc<CertificatePipeline>>> = OnceLock::new();

pub fn cert_pipeline() -> Option<&'static Arc<CertificatePipeline>> {
  CERT_PIPELINE
    .get()
    .expect("cert_pipeline accessed before initialized")
    .as_ref()
}

pub fn init_cert_pipeline(pipeline: Option<Arc<CertificatePipeline>>) {
  CERT_PIPELINE
    .set(pipeline)
    .unwrap_or_else(|_| panic!("cert_pipeline initialized more than once"));
}

static JOB_QUEUE: OnceLock<JobQueue> = OnceLock::new();

pub fn job_queue() -> &'static JobQueue {
  JOB_QUEUE.get().expect("job_queue accessed before initialized")
}

pub fn init_job_queue(queue: JobQueue) {
  JOB_QUEUE
    .set(queue)
    .unwrap_or_else(|_| panic!("job_queue initialized more than once"));
}

/// Per-service mutex registry serializing lifecycle writes (spec.md §5
/// "All writes for a single service ... are serialized by a per-service
/// mutex").
pub fn service_locks() -> &'static KeyedLocks<i64> {
  static LOCKS: OnceLock<KeyedLocks<i64>> = OnceLock::new();
  LOCKS.get_or_init(KeyedLocks::default)
}

pub fn auth_rate_limiter() -> &'static AuthRateLimiter {
  static LIMITER: OnceLock<AuthRateLimiter> = OnceLock::new();
  LIMITER.get_or_init(AuthRateLimiter::default)
}

/// Process start, for `GET /v1/health`'s `uptime` field (spec.md §9
/// "Global mutable state is limited to ... the startup time (uptime)").
pub fn started_at() -> Instant {
  static STARTED_AT: OnceLock<Instant> = OnceLock::new();
  *STARTED_AT.get_or_init(Instant::now)
}
