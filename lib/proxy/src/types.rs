/// One route as seen by the renderer (spec.md §4.7 input:
/// `routes_with_service`).
#[derive(Debug, Clone)]
pub struct RouteInput {
  pub domain: String,
  pub path: String,
  pub service_id: i64,
  pub port: u16,
  pub tls: bool,
}

/// An active certificate for a domain, keyed externally by
/// `certs_by_domain`. `cert_path`/`key_path` are the on-disk paths the
/// renderer emits verbatim into `ssl_certificate`/`ssl_certificate_key`.
#[derive(Debug, Clone)]
pub struct CertInput {
  pub cert_path: String,
  pub key_path: String,
}
