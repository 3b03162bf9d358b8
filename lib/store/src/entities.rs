//! Durable row types (spec.md §3). Field-for-field with the spec's data
//! model; `created_at`/`updated_at` as Unix-ms integers (teacher's
//! `komodo_timestamp()` convention, reimplemented as [`now_ms`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub fn now_ms() -> i64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub id: i64,
  pub name: String,
  pub slug: String,
  pub created_at: i64,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DesiredState {
  Running,
  Stopped,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceStatus {
  Created,
  Running,
  Stopped,
  Exited,
  Dead,
  Starting,
  Stopping,
  Error,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthCheckType {
  Http,
  Tcp,
  Postgres,
  Mysql,
  Redis,
  None,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
  Unknown,
  Ok,
  Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
  pub host: u16,
  pub container: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMode {
  Ro,
  Rw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMapping {
  pub host: String,
  pub container: String,
  pub mode: VolumeMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
  pub id: i64,
  pub project_id: i64,
  pub name: String,
  pub image: String,
  pub env: IndexMap<String, String>,
  pub ports: Vec<PortMapping>,
  pub volumes: Vec<VolumeMapping>,
  pub desired_state: DesiredState,
  pub status: ServiceStatus,
  pub container_id: Option<String>,
  pub health_check_type: HealthCheckType,
  pub health_path: Option<String>,
  pub health_status: HealthStatus,
  pub restart_count: i64,
  pub restart_window_at: Option<i64>,
  pub last_exit_code: Option<i32>,
  pub crash_looping: bool,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
  pub id: i64,
  pub service_id: i64,
  pub domain: String,
  pub path: Option<String>,
  pub port: u16,
  pub tls: bool,
  pub created_at: i64,
}

impl Route {
  pub fn path_or_root(&self) -> &str {
    self.path.as_deref().unwrap_or("")
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CertificateType {
  Manual,
  Acme,
  Custom,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CertificateStatus {
  Active,
  Expired,
  Failed,
  Renewing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
  pub id: i64,
  pub domain: String,
  pub cert_type: CertificateType,
  pub issuer: Option<String>,
  pub not_before: Option<i64>,
  pub not_after: Option<i64>,
  pub status: CertificateStatus,
  pub pem_cert: Option<String>,
  pub pem_chain: Option<String>,
  /// AEAD ciphertext, hex.
  pub pem_key_enc: Option<String>,
  /// AEAD nonce, hex.
  pub pem_key_nonce: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
  pub domain: String,
  pub provider_id: Option<i64>,
  pub auto_manage: bool,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationMethod {
  #[strum(serialize = "TXT")]
  #[serde(rename = "TXT")]
  Txt,
  #[strum(serialize = "A")]
  #[serde(rename = "A")]
  A,
  #[strum(serialize = "CNAME")]
  #[serde(rename = "CNAME")]
  Cname,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationStatus {
  Pending,
  Verified,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainVerification {
  pub id: i64,
  pub domain: String,
  pub method: VerificationMethod,
  pub challenge: String,
  pub status: VerificationStatus,
  pub last_checked_at: Option<i64>,
  pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsProvider {
  pub id: i64,
  pub provider_type: String,
  /// Decrypted JSON config (API credentials included). Only ever surfaced
  /// to authorized callers (spec.md §4.1).
  pub config_json: serde_json::Value,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  Admin,
  Deployer,
  Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
  pub name: String,
  #[serde(skip_serializing)]
  pub hash: String,
  #[serde(skip_serializing)]
  pub salt: String,
  pub role: Role,
  pub last_used_at: Option<i64>,
  pub created_at: i64,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
  Build,
  CertIssue,
  CertRenew,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
  Queued,
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  pub job_type: JobType,
  pub data: serde_json::Value,
  pub status: JobStatus,
  pub progress: u8,
  pub error: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
  pub id: i64,
  pub project_id: i64,
  /// 0 when not bound to a service (spec.md §3).
  pub service_id: i64,
  pub git_url: String,
  pub git_ref: String,
  pub commit_sha: Option<String>,
  pub image_tag: Option<String>,
  pub context_path: String,
  pub dockerfile: String,
  pub status: JobStatus,
  pub triggered_by: String,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
  ServiceDeploy,
  ServiceStart,
  ServiceStop,
  ServiceRestart,
  ServiceCrashloopStop,
  ServiceCrashloopUnlock,
  RouteCreate,
  RouteDelete,
  CertificateIssue,
  CertificateRenew,
  CertificateUpload,
  DomainVerifyIssue,
  DomainVerifyCheck,
  NginxReload,
  TokenCreate,
  TokenDelete,
  ProjectCreate,
  ProjectDelete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id: i64,
  pub timestamp: i64,
  pub actor: String,
  pub action: AuditAction,
  pub target_type: String,
  pub target_id: String,
  pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalMetric {
  pub timestamp: i64,
  pub cpu_percent: f64,
  pub memory_used: i64,
  pub memory_total: i64,
  pub disk_used: i64,
  pub disk_total: i64,
  pub net_rx: i64,
  pub net_tx: i64,
}
