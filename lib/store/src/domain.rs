use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Domain, DnsProvider, DomainVerification, VerificationMethod, VerificationStatus, now_ms},
};

impl Store {
  pub async fn upsert_domain(
    &self,
    domain: &str,
    provider_id: Option<i64>,
    auto_manage: bool,
  ) -> StoreResult<Domain> {
    let domain = domain.to_string();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO domains (domain, provider_id, auto_manage) VALUES (?1,?2,?3)
           ON CONFLICT(domain) DO UPDATE SET provider_id = excluded.provider_id,
           auto_manage = excluded.auto_manage",
          params![domain, provider_id, auto_manage],
        )?;
        get_domain_tx(conn, &domain)
      })
      .await
  }

  pub async fn get_domain(&self, domain: &str) -> StoreResult<Domain> {
    let domain = domain.to_string();
    self.with_conn(move |conn| get_domain_tx(conn, &domain)).await
  }

  /// Persists a new verification attempt (spec.md §4.8 "Issuing a
  /// verification"). Only the newest row per domain is authoritative
  /// (spec.md §3), enforced by callers always reading via
  /// [`Store::latest_verification`].
  pub async fn create_domain_verification(
    &self,
    domain: &str,
    method: VerificationMethod,
    challenge: &str,
  ) -> StoreResult<DomainVerification> {
    let domain = domain.to_string();
    let challenge = challenge.to_string();
    self
      .with_conn(move |conn| {
        let created_at = now_ms();
        conn.execute(
          "INSERT INTO domain_verifications (domain, method, challenge, status, last_checked_at, created_at)
           VALUES (?1,?2,?3,?4,NULL,?5)",
          params![
            domain,
            method.to_string(),
            challenge,
            VerificationStatus::Pending.to_string(),
            created_at,
          ],
        )?;
        let id = conn.last_insert_rowid();
        get_verification_tx(conn, id)
      })
      .await
  }

  pub async fn latest_verification(
    &self,
    domain: &str,
  ) -> StoreResult<Option<DomainVerification>> {
    let domain = domain.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            &format!(
              "{SELECT_VERIFICATION} WHERE domain = ?1 ORDER BY id DESC LIMIT 1"
            ),
            params![domain],
            row_to_verification,
          )
          .optional()
          .map_err(StoreError::from)
      })
      .await
  }

  pub async fn set_verification_status(
    &self,
    id: i64,
    status: VerificationStatus,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE domain_verifications SET status = ?1, last_checked_at = ?2 WHERE id = ?3",
          params![status.to_string(), now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("domain_verification {id}")));
        }
        Ok(())
      })
      .await
  }

  pub async fn create_dns_provider(
    &self,
    provider_type: &str,
    config_json: &serde_json::Value,
  ) -> StoreResult<DnsProvider> {
    let provider_type = provider_type.to_string();
    let plaintext = serde_json::to_vec(config_json)
      .map_err(|e| StoreError::Other(e.into()))?;
    let encrypted = self
      .master_key
      .encrypt(&plaintext)
      .map_err(StoreError::Other)?;
    let config_json = config_json.clone();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO dns_providers (provider_type, config_json_enc, config_json_nonce) VALUES (?1,?2,?3)",
          params![provider_type, encrypted.ciphertext_hex, encrypted.nonce_hex],
        )?;
        let id = conn.last_insert_rowid();
        Ok(DnsProvider {
          id,
          provider_type,
          config_json,
        })
      })
      .await
  }

  /// Decrypted config is surfaced here — callers are the cert/DNS pipeline,
  /// authorized internal components (spec.md §4.1 "Reads surface decrypted
  /// plaintext only to authorized callers").
  pub async fn get_dns_provider(&self, id: i64) -> StoreResult<DnsProvider> {
    let master_key = self.master_key.clone();
    self
      .with_conn(move |conn| {
        let (provider_type, ciphertext_hex, nonce_hex): (String, String, String) = conn
          .query_row(
            "SELECT provider_type, config_json_enc, config_json_nonce FROM dns_providers WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?
          .ok_or_else(|| StoreError::NotFound(format!("dns_provider {id}")))?;
        let plaintext = master_key
          .decrypt(&ciphertext_hex, &nonce_hex)
          .map_err(StoreError::Other)?;
        let config_json = serde_json::from_slice(&plaintext)
          .map_err(|e| StoreError::Other(e.into()))?;
        Ok(DnsProvider {
          id,
          provider_type,
          config_json,
        })
      })
      .await
  }
}

fn get_domain_tx(conn: &rusqlite::Connection, domain: &str) -> StoreResult<Domain> {
  conn
    .query_row(
      "SELECT domain, provider_id, auto_manage FROM domains WHERE domain = ?1",
      params![domain],
      row_to_domain,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("domain {domain}")))
}

fn row_to_domain(row: &Row) -> rusqlite::Result<Domain> {
  Ok(Domain {
    domain: row.get(0)?,
    provider_id: row.get(1)?,
    auto_manage: row.get(2)?,
  })
}

const SELECT_VERIFICATION: &str = "SELECT id, domain, method, challenge, status, last_checked_at, created_at
  FROM domain_verifications";

fn get_verification_tx(
  conn: &rusqlite::Connection,
  id: i64,
) -> StoreResult<DomainVerification> {
  conn
    .query_row(
      &format!("{SELECT_VERIFICATION} WHERE id = ?1"),
      params![id],
      row_to_verification,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("domain_verification {id}")))
}

fn row_to_verification(row: &Row) -> rusqlite::Result<DomainVerification> {
  let method: String = row.get(2)?;
  let status: String = row.get(4)?;
  Ok(DomainVerification {
    id: row.get(0)?,
    domain: row.get(1)?,
    method: method.parse().unwrap_or(VerificationMethod::Txt),
    challenge: row.get(3)?,
    status: status.parse().unwrap_or(VerificationStatus::Failed),
    last_checked_at: row.get(5)?,
    created_at: row.get(6)?,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use crate::{entities::VerificationMethod, tests::test_store};

  #[tokio::test]
  async fn verification_latest_wins() {
    let store = test_store();
    store
      .create_domain_verification("ex.test", VerificationMethod::A, "tok1")
      .await
      .unwrap();
    let second = store
      .create_domain_verification("ex.test", VerificationMethod::Txt, "tok2")
      .await
      .unwrap();
    let latest = store.latest_verification("ex.test").await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.challenge, "tok2");
  }

  #[tokio::test]
  async fn dns_provider_roundtrips_encrypted() {
    let store = test_store();
    let created = store
      .create_dns_provider("cloudflare", &json!({"api_token": "shh"}))
      .await
      .unwrap();
    let fetched = store.get_dns_provider(created.id).await.unwrap();
    assert_eq!(fetched.config_json["api_token"], "shh");
  }
}
