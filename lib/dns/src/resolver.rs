use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_resolver::{TokioAsyncResolver, config::{ResolverConfig, ResolverOpts}};

/// Thin wrapper over `hickory-resolver`'s async resolver, returning empty
/// vectors instead of erroring on NXDOMAIN (a missing record is a normal,
/// expected outcome while polling for verification).
pub struct DnsResolver {
  inner: TokioAsyncResolver,
}

impl DnsResolver {
  pub fn new() -> anyhow::Result<Self> {
    let inner = TokioAsyncResolver::tokio(
      ResolverConfig::default(),
      ResolverOpts::default(),
    );
    Ok(Self { inner })
  }

  pub async fn lookup_txt(&self, name: &str) -> Vec<String> {
    match self.inner.txt_lookup(name).await {
      Ok(lookup) => lookup
        .iter()
        .map(|txt| {
          txt
            .txt_data()
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect::<String>()
        })
        .collect(),
      Err(_) => Vec::new(),
    }
  }

  pub async fn lookup_a(&self, name: &str) -> Vec<Ipv4Addr> {
    match self.inner.ipv4_lookup(name).await {
      Ok(lookup) => lookup.iter().map(|r| r.0).collect(),
      Err(_) => Vec::new(),
    }
  }

  pub async fn lookup_aaaa(&self, name: &str) -> Vec<Ipv6Addr> {
    match self.inner.ipv6_lookup(name).await {
      Ok(lookup) => lookup.iter().map(|r| r.0).collect(),
      Err(_) => Vec::new(),
    }
  }

  pub async fn lookup_cname(&self, name: &str) -> Vec<String> {
    match self.inner.lookup(name, hickory_resolver::proto::rr::RecordType::CNAME).await {
      Ok(lookup) => lookup
        .iter()
        .filter_map(|r| r.as_cname().map(|c| c.to_string().trim_end_matches('.').to_string()))
        .collect(),
      Err(_) => Vec::new(),
    }
  }
}
