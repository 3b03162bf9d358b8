use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
  #[error("dns provider request failed: {0}")]
  Request(String),
  #[error("dns provider rejected the request: {0}")]
  Rejected(String),
  #[error("dns provider config invalid: {0}")]
  Config(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability interface over a DNS provider (spec.md §9 "Dynamic dispatch
/// ... ACME provider, and DNS provider is expressed as capability
/// interfaces"). One implementation per supported provider `type`.
#[async_trait]
pub trait DnsProvider: Send + Sync {
  async fn create_txt_record(
    &self,
    name: &str,
    value: &str,
  ) -> ProviderResult<()>;

  async fn create_a_record(&self, name: &str, ipv4: &str) -> ProviderResult<()>;

  async fn create_cname_record(&self, name: &str, target: &str) -> ProviderResult<()>;

  async fn delete_record(&self, name: &str, record_type: &str) -> ProviderResult<()>;
}

/// `config_json` shape for `provider_type = "cloudflare"`.
#[derive(Debug, Deserialize)]
struct CloudflareConfig {
  api_token: String,
  zone_id: String,
}

pub struct CloudflareProvider {
  client: reqwest::Client,
  api_token: String,
  zone_id: String,
}

impl CloudflareProvider {
  pub fn from_config(config_json: &Value) -> ProviderResult<Self> {
    let config: CloudflareConfig = serde_json::from_value(config_json.clone())
      .map_err(|e| ProviderError::Config(e.to_string()))?;
    Ok(Self {
      client: reqwest::Client::new(),
      api_token: config.api_token,
      zone_id: config.zone_id,
    })
  }

  async fn create_record(
    &self,
    record_type: &str,
    name: &str,
    content: &str,
  ) -> ProviderResult<()> {
    let url = format!(
      "https://api.cloudflare.com/client/v4/zones/{}/dns_records",
      self.zone_id
    );
    let body = serde_json::json!({
      "type": record_type,
      "name": name,
      "content": content,
      "ttl": 120,
    });
    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.api_token)
      .json(&body)
      .send()
      .await
      .map_err(|e| ProviderError::Request(e.to_string()))?;
    if !response.status().is_success() {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      return Err(ProviderError::Rejected(format!("{status}: {text}")));
    }
    Ok(())
  }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
  async fn create_txt_record(&self, name: &str, value: &str) -> ProviderResult<()> {
    self.create_record("TXT", name, value).await
  }

  async fn create_a_record(&self, name: &str, ipv4: &str) -> ProviderResult<()> {
    self.create_record("A", name, ipv4).await
  }

  async fn create_cname_record(&self, name: &str, target: &str) -> ProviderResult<()> {
    self.create_record("CNAME", name, target).await
  }

  async fn delete_record(&self, name: &str, record_type: &str) -> ProviderResult<()> {
    let list_url = format!(
      "https://api.cloudflare.com/client/v4/zones/{}/dns_records?type={}&name={}",
      self.zone_id, record_type, name
    );
    let response = self
      .client
      .get(&list_url)
      .bearer_auth(&self.api_token)
      .send()
      .await
      .map_err(|e| ProviderError::Request(e.to_string()))?;
    #[derive(Deserialize)]
    struct Listed {
      result: Vec<ListedRecord>,
    }
    #[derive(Deserialize)]
    struct ListedRecord {
      id: String,
    }
    let listed: Listed = response
      .json()
      .await
      .map_err(|e| ProviderError::Request(e.to_string()))?;
    for record in listed.result {
      let delete_url = format!(
        "https://api.cloudflare.com/client/v4/zones/{}/dns_records/{}",
        self.zone_id, record.id
      );
      self
        .client
        .delete(&delete_url)
        .bearer_auth(&self.api_token)
        .send()
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))?;
    }
    Ok(())
  }
}
