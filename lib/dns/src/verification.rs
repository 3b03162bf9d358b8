use std::net::{Ipv4Addr, Ipv6Addr};

use glinr_crypto::random_hex_token;

use crate::resolver::DnsResolver;

/// Namespace prefix for the TXT challenge record (spec.md §4.8:
/// `_<ns>-verify.<domain>`).
const NS: &str = "glinr";

/// Externally reachable target the platform terminates on (spec.md
/// glossary "Public edge"); read once at startup from `PUBLIC_EDGE_*`.
#[derive(Debug, Clone, Default)]
pub struct PublicEdge {
  pub host: Option<String>,
  pub ipv4: Option<Ipv4Addr>,
  pub ipv6: Option<Ipv6Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Txt,
  A,
  Cname,
}

pub struct IssuedVerification {
  pub method: Method,
  pub token: String,
  pub txt_name: String,
  /// What the A/CNAME record should point to, when applicable.
  pub target_hint: Option<String>,
}

/// Picks CNAME if a public edge hostname is configured, else A if an IPv4
/// is configured, else TXT (spec.md §4.8 "Issuing a verification").
pub fn choose_method(edge: &PublicEdge) -> Method {
  if edge.host.is_some() {
    Method::Cname
  } else if edge.ipv4.is_some() {
    Method::A
  } else {
    Method::Txt
  }
}

pub fn txt_challenge_name(domain: &str) -> String {
  format!("_{NS}-verify.{domain}")
}

pub fn issue(domain: &str, edge: &PublicEdge) -> IssuedVerification {
  let method = choose_method(edge);
  let target_hint = match method {
    Method::Cname => edge.host.clone(),
    Method::A => edge.ipv4.map(|ip| ip.to_string()),
    Method::Txt => None,
  };
  IssuedVerification {
    method,
    token: random_hex_token(),
    txt_name: txt_challenge_name(domain),
    target_hint,
  }
}

/// Checks a previously issued verification (spec.md §4.8 "Checking a
/// verification"): the TXT token must always be present; if a public edge
/// target is configured, the A/AAAA/CNAME must additionally match exactly.
pub async fn check(
  resolver: &DnsResolver,
  domain: &str,
  token: &str,
  edge: &PublicEdge,
) -> bool {
  let txt_name = txt_challenge_name(domain);
  let txt_records = resolver.lookup_txt(&txt_name).await;
  let txt_ok = txt_records.iter().any(|record| record.contains(token));
  if !txt_ok {
    return false;
  }

  if let Some(host) = &edge.host {
    let cnames = resolver.lookup_cname(domain).await;
    return cnames.iter().any(|c| c == host);
  }
  if let Some(ipv4) = edge.ipv4 {
    let addrs = resolver.lookup_a(domain).await;
    return addrs.contains(&ipv4);
  }
  if let Some(ipv6) = edge.ipv6 {
    let addrs = resolver.lookup_aaaa(domain).await;
    return addrs.contains(&ipv6);
  }

  true
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn method_prefers_cname_then_a_then_txt() {
    assert_eq!(
      choose_method(&PublicEdge {
        host: Some("edge.glinr.dev".to_string()),
        ..Default::default()
      }),
      Method::Cname
    );
    assert_eq!(
      choose_method(&PublicEdge {
        ipv4: Some("203.0.113.1".parse().unwrap()),
        ..Default::default()
      }),
      Method::A
    );
    assert_eq!(choose_method(&PublicEdge::default()), Method::Txt);
  }

  #[test]
  fn txt_challenge_name_matches_namespace_convention() {
    assert_eq!(txt_challenge_name("ex.test"), "_glinr-verify.ex.test");
  }
}
