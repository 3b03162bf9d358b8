use rusqlite::{Row, params};

use crate::{
  Store, StoreResult,
  entities::{AuditAction, AuditEntry, now_ms},
};

impl Store {
  pub async fn record_audit(
    &self,
    actor: &str,
    action: AuditAction,
    target_type: &str,
    target_id: &str,
    meta: serde_json::Value,
  ) -> StoreResult<AuditEntry> {
    let actor = actor.to_string();
    let target_type = target_type.to_string();
    let target_id = target_id.to_string();
    self
      .with_conn(move |conn| {
        let timestamp = now_ms();
        let meta_json = serde_json::to_string(&meta)
          .map_err(|e| crate::StoreError::Other(e.into()))?;
        conn.execute(
          "INSERT INTO audit_entries (timestamp, actor, action, target_type, target_id, meta)
           VALUES (?1,?2,?3,?4,?5,?6)",
          params![timestamp, actor, action.to_string(), target_type, target_id, meta_json],
        )?;
        let id = conn.last_insert_rowid();
        Ok(AuditEntry {
          id,
          timestamp,
          actor,
          action,
          target_type,
          target_id,
          meta,
        })
      })
      .await
  }

  /// Most recent first, capped at `limit` rows.
  pub async fn list_audit_entries(&self, limit: i64) -> StoreResult<Vec<AuditEntry>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, timestamp, actor, action, target_type, target_id, meta
           FROM audit_entries ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(params![limit], row_to_audit_entry)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }
}

fn row_to_audit_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
  let action: String = row.get(3)?;
  let meta_json: String = row.get(6)?;
  Ok(AuditEntry {
    id: row.get(0)?,
    timestamp: row.get(1)?,
    actor: row.get(2)?,
    action: action.parse().unwrap_or(AuditAction::ServiceDeploy),
    target_type: row.get(4)?,
    target_id: row.get(5)?,
    meta: serde_json::from_str(&meta_json).unwrap_or(serde_json::Value::Null),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use crate::{entities::AuditAction, tests::test_store};

  #[tokio::test]
  async fn record_and_list_newest_first() {
    let store = test_store();
    store
      .record_audit("admin", AuditAction::ProjectCreate, "project", "1", json!({}))
      .await
      .unwrap();
    store
      .record_audit("admin", AuditAction::ServiceDeploy, "service", "2", json!({"image": "nginx"}))
      .await
      .unwrap();
    let entries = store.list_audit_entries(10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::ServiceDeploy);
  }
}
