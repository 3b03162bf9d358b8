use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::types::{CertInput, RouteInput};

/// Fixed strong cipher list (spec.md §4.7). Kept as one constant so two
/// renders of the same input are always byte-identical.
const TLS_CIPHERS: &str =
  "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305";

pub struct RenderOutput {
  pub config: String,
  pub hash_hex: String,
}

/// Renders the full reverse-proxy configuration (spec.md §4.7). Grouping
/// and ordering are fully determined by the input, never by iteration
/// order of a hash map, so two renders of the same logical input are
/// byte-identical (spec.md §8 "Proxy determinism").
pub fn render(
  routes: &[RouteInput],
  certs_by_domain: &std::collections::HashMap<String, CertInput>,
  challenge_dir: &str,
) -> RenderOutput {
  let mut by_domain: BTreeMap<&str, Vec<&RouteInput>> = BTreeMap::new();
  for route in routes {
    by_domain.entry(route.domain.as_str()).or_default().push(route);
  }

  let mut config = String::new();
  for (domain, mut domain_routes) in by_domain {
    domain_routes.sort_by(|a, b| a.path.cmp(&b.path));
    let cert = certs_by_domain.get(domain);
    let wants_tls = domain_routes.iter().any(|r| r.tls);
    config.push_str(&render_domain(domain, &domain_routes, cert, wants_tls, challenge_dir));
  }

  let hash_hex = hex::encode(Sha256::digest(config.as_bytes()));
  RenderOutput { config, hash_hex }
}

fn render_domain(
  domain: &str,
  routes: &[&RouteInput],
  cert: Option<&CertInput>,
  wants_tls: bool,
  challenge_dir: &str,
) -> String {
  let mut out = String::new();

  out.push_str(&format!("# server: {domain}\n"));
  for route in routes {
    let upstream = upstream_name(route.service_id, route.port);
    out.push_str(&format!(
      "upstream {upstream} {{ server 127.0.0.1:{}; }}\n",
      route.port
    ));
  }

  match (wants_tls, cert) {
    (true, Some(cert)) => {
      out.push_str(&render_https_block(domain, routes, cert));
      out.push_str(&render_http_redirect_block(domain, challenge_dir));
    }
    (true, None) => {
      // Fail closed on TLS, open on plain HTTP (spec.md §4.7).
      out.push_str(&render_plain_http_block(domain, routes, challenge_dir, true));
    }
    (false, _) => {
      out.push_str(&render_plain_http_block(domain, routes, challenge_dir, false));
    }
  }

  out
}

fn upstream_name(service_id: i64, port: u16) -> String {
  format!("svc_{service_id}_{port}")
}

fn acme_challenge_location(challenge_dir: &str) -> String {
  format!(
    "  location /.well-known/acme-challenge/ {{\n    root {challenge_dir};\n  }}\n"
  )
}

fn render_https_block(domain: &str, routes: &[&RouteInput], cert: &CertInput) -> String {
  let mut out = String::new();
  out.push_str(&format!("server {{\n  listen 443 ssl;\n  server_name {domain};\n"));
  out.push_str(&format!("  ssl_certificate {};\n", cert.cert_path));
  out.push_str(&format!("  ssl_certificate_key {};\n", cert.key_path));
  out.push_str("  ssl_protocols TLSv1.2 TLSv1.3;\n");
  out.push_str(&format!("  ssl_ciphers {TLS_CIPHERS};\n"));
  out.push_str(
    "  add_header Strict-Transport-Security \"max-age=63072000; includeSubDomains\" always;\n",
  );
  out.push_str("  add_header X-Content-Type-Options nosniff always;\n");
  out.push_str("  add_header X-Frame-Options DENY always;\n");
  out.push_str("  add_header X-XSS-Protection \"1; mode=block\" always;\n");
  for route in routes {
    out.push_str(&render_proxy_location(route, true));
  }
  out.push_str("}\n");
  out
}

fn render_http_redirect_block(domain: &str, challenge_dir: &str) -> String {
  let mut out = String::new();
  out.push_str(&format!("server {{\n  listen 80;\n  server_name {domain};\n"));
  out.push_str(&acme_challenge_location(challenge_dir));
  out.push_str("  location / {\n    return 301 https://$host$request_uri;\n  }\n}\n");
  out
}

fn render_plain_http_block(
  domain: &str,
  routes: &[&RouteInput],
  challenge_dir: &str,
  deny_https: bool,
) -> String {
  let mut out = String::new();
  out.push_str(&format!("server {{\n  listen 80;\n  server_name {domain};\n"));
  out.push_str(&acme_challenge_location(challenge_dir));
  for route in routes {
    out.push_str(&render_proxy_location(route, false));
  }
  out.push_str("}\n");
  if deny_https {
    out.push_str(&format!(
      "server {{\n  listen 443 ssl default_server;\n  server_name {domain};\n  ssl_reject_handshake on;\n  return 503;\n}}\n"
    ));
  }
  out
}

fn render_proxy_location(route: &RouteInput, https: bool) -> String {
  let path = if route.path.is_empty() { "/" } else { &route.path };
  let upstream = upstream_name(route.service_id, route.port);
  let scheme = if https { "https" } else { "http" };
  format!(
    "  location {path} {{\n    proxy_pass http://{upstream};\n    proxy_set_header Host $host;\n    proxy_set_header X-Real-IP $remote_addr;\n    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n    proxy_set_header X-Forwarded-Proto {scheme};\n  }}\n"
  )
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn route(domain: &str, path: &str, service_id: i64, port: u16, tls: bool) -> RouteInput {
    RouteInput {
      domain: domain.to_string(),
      path: path.to_string(),
      service_id,
      port,
      tls,
    }
  }

  #[test]
  fn deterministic_across_reordering() {
    let a = vec![
      route("b.test", "/", 2, 80, false),
      route("a.test", "/api", 1, 8080, false),
      route("a.test", "/", 1, 80, false),
    ];
    let mut shuffled = a.clone();
    shuffled.swap(0, 2);
    let certs = HashMap::new();
    let out1 = render(&a, &certs, "/data/challenges");
    let out2 = render(&shuffled, &certs, "/data/challenges");
    assert_eq!(out1.config, out2.config);
    assert_eq!(out1.hash_hex, out2.hash_hex);
  }

  #[test]
  fn tls_without_cert_fails_closed() {
    let routes = vec![route("secure.test", "/", 1, 80, true)];
    let certs = HashMap::new();
    let out = render(&routes, &certs, "/data/challenges");
    assert!(out.config.contains("return 503"));
    assert!(!out.config.contains("ssl_certificate "));
  }

  #[test]
  fn tls_with_cert_redirects_http() {
    let routes = vec![route("secure.test", "/", 1, 80, true)];
    let mut certs = HashMap::new();
    certs.insert(
      "secure.test".to_string(),
      CertInput {
        cert_path: "/data/certs/secure.test/fullchain.pem".to_string(),
        key_path: "/data/certs/secure.test/privkey.pem".to_string(),
      },
    );
    let out = render(&routes, &certs, "/data/challenges");
    assert!(out.config.contains("ssl_certificate /data/certs/secure.test/fullchain.pem"));
    assert!(out.config.contains("return 301 https://"));
    assert!(out.config.contains("/.well-known/acme-challenge/"));
  }

  #[test]
  fn always_exposes_acme_challenge_path() {
    let routes = vec![route("plain.test", "/", 1, 80, false)];
    let certs = HashMap::new();
    let out = render(&routes, &certs, "/data/challenges");
    assert!(out.config.contains("/.well-known/acme-challenge/"));
  }
}
