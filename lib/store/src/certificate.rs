use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Certificate, CertificateStatus, CertificateType, now_ms},
};

pub struct NewCertificate {
  pub domain: String,
  pub cert_type: CertificateType,
  pub issuer: Option<String>,
  pub not_before: Option<i64>,
  pub not_after: Option<i64>,
  pub pem_cert: Option<String>,
  pub pem_chain: Option<String>,
  pub pem_key_enc: Option<String>,
  pub pem_key_nonce: Option<String>,
}

impl Store {
  /// Inserts a new `active` certificate for `domain`, atomically expiring
  /// whatever certificate was previously `active` for that domain (spec.md
  /// §3 "Exactly one active certificate per domain"; §8 "Certificate
  /// exclusivity").
  pub async fn issue_certificate(
    &self,
    new: NewCertificate,
  ) -> StoreResult<Certificate> {
    self
      .with_conn(move |conn| {
        let now = now_ms();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
          "UPDATE certificates SET status = ?1, updated_at = ?2
           WHERE domain = ?3 AND status = ?4",
          params![
            CertificateStatus::Expired.to_string(),
            now,
            new.domain,
            CertificateStatus::Active.to_string(),
          ],
        )?;
        tx.execute(
          "INSERT INTO certificates (
            domain, cert_type, issuer, not_before, not_after, status,
            pem_cert, pem_chain, pem_key_enc, pem_key_nonce,
            created_at, updated_at
          ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?11)",
          params![
            new.domain,
            new.cert_type.to_string(),
            new.issuer,
            new.not_before,
            new.not_after,
            CertificateStatus::Active.to_string(),
            new.pem_cert,
            new.pem_chain,
            new.pem_key_enc,
            new.pem_key_nonce,
            now,
          ],
        )?;
        let id = tx.last_insert_rowid();
        let cert = get_certificate_tx(&tx, id)?;
        tx.commit()?;
        Ok(cert)
      })
      .await
  }

  pub async fn get_certificate(&self, id: i64) -> StoreResult<Certificate> {
    self
      .with_conn(move |conn| get_certificate_tx(conn, id))
      .await
  }

  pub async fn get_active_certificate(
    &self,
    domain: &str,
  ) -> StoreResult<Option<Certificate>> {
    let domain = domain.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            &format!(
              "{SELECT_CERT} WHERE domain = ?1 AND status = ?2"
            ),
            params![domain, CertificateStatus::Active.to_string()],
            row_to_certificate,
          )
          .optional()
          .map_err(StoreError::from)
      })
      .await
  }

  pub async fn list_certificates(&self) -> StoreResult<Vec<Certificate>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_CERT} ORDER BY id"))?;
        let rows = stmt
          .query_map([], row_to_certificate)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// spec.md §4.1 `ListCertsExpiringSoon`, §8 "Renewal window": exactly the
  /// set of `active` certs with `not_after <= now + within`.
  pub async fn list_certs_expiring_soon(
    &self,
    within_ms: i64,
  ) -> StoreResult<Vec<Certificate>> {
    self
      .with_conn(move |conn| {
        let threshold = now_ms() + within_ms;
        let mut stmt = conn.prepare(&format!(
          "{SELECT_CERT} WHERE status = ?1 AND not_after IS NOT NULL AND not_after <= ?2 ORDER BY not_after"
        ))?;
        let rows = stmt
          .query_map(
            params![CertificateStatus::Active.to_string(), threshold],
            row_to_certificate,
          )?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn set_certificate_status(
    &self,
    id: i64,
    status: CertificateStatus,
  ) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE certificates SET status = ?1, updated_at = ?2 WHERE id = ?3",
          params![status.to_string(), now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("certificate {id}")));
        }
        Ok(())
      })
      .await
  }

  pub async fn delete_certificate(&self, id: i64) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected =
          conn.execute("DELETE FROM certificates WHERE id = ?1", params![id])?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("certificate {id}")));
        }
        Ok(())
      })
      .await
  }
}

const SELECT_CERT: &str = "SELECT id, domain, cert_type, issuer, not_before, not_after,
  status, pem_cert, pem_chain, pem_key_enc, pem_key_nonce, created_at, updated_at
  FROM certificates";

fn get_certificate_tx(
  conn: &rusqlite::Connection,
  id: i64,
) -> StoreResult<Certificate> {
  conn
    .query_row(
      &format!("{SELECT_CERT} WHERE id = ?1"),
      params![id],
      row_to_certificate,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("certificate {id}")))
}

fn row_to_certificate(row: &Row) -> rusqlite::Result<Certificate> {
  let cert_type: String = row.get(2)?;
  let status: String = row.get(6)?;
  Ok(Certificate {
    id: row.get(0)?,
    domain: row.get(1)?,
    cert_type: cert_type.parse().unwrap_or(CertificateType::Manual),
    issuer: row.get(3)?,
    not_before: row.get(4)?,
    not_after: row.get(5)?,
    status: status.parse().unwrap_or(CertificateStatus::Failed),
    pem_cert: row.get(7)?,
    pem_chain: row.get(8)?,
    pem_key_enc: row.get(9)?,
    pem_key_nonce: row.get(10)?,
    created_at: row.get(11)?,
    updated_at: row.get(12)?,
  })
}

#[cfg(test)]
mod tests {
  use super::NewCertificate;
  use crate::{entities::CertificateType, tests::test_store};

  fn new_cert(domain: &str, not_after: i64) -> NewCertificate {
    NewCertificate {
      domain: domain.to_string(),
      cert_type: CertificateType::Manual,
      issuer: Some("test".to_string()),
      not_before: Some(0),
      not_after: Some(not_after),
      pem_cert: Some("cert".to_string()),
      pem_chain: Some("chain".to_string()),
      pem_key_enc: Some("enc".to_string()),
      pem_key_nonce: Some("nonce".to_string()),
    }
  }

  #[tokio::test]
  async fn exclusivity_on_reissue() {
    let store = test_store();
    let first = store
      .issue_certificate(new_cert("a.test", 1_000_000))
      .await
      .unwrap();
    let second = store
      .issue_certificate(new_cert("a.test", 2_000_000))
      .await
      .unwrap();
    let all = store.list_certificates().await.unwrap();
    let active: Vec<_> = all
      .iter()
      .filter(|c| c.domain == "a.test" && c.status == crate::entities::CertificateStatus::Active)
      .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
    let expired = all.iter().find(|c| c.id == first.id).unwrap();
    assert_eq!(expired.status, crate::entities::CertificateStatus::Expired);
  }

  #[tokio::test]
  async fn expiring_soon_window() {
    let store = test_store();
    let now = crate::entities::now_ms();
    store
      .issue_certificate(new_cert("soon.test", now + 10 * 24 * 3_600_000))
      .await
      .unwrap();
    store
      .issue_certificate(new_cert("later.test", now + 90 * 24 * 3_600_000))
      .await
      .unwrap();
    let expiring = store
      .list_certs_expiring_soon(30 * 24 * 3_600_000)
      .await
      .unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].domain, "soon.test");
  }
}
