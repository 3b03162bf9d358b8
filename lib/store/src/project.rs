use rusqlite::{OptionalExtension, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Project, now_ms},
};

impl Store {
  pub async fn create_project(&self, name: &str, slug: &str) -> StoreResult<Project> {
    let name = name.to_string();
    let slug = slug.to_string();
    self
      .with_conn(move |conn| {
        let created_at = now_ms();
        conn.execute(
          "INSERT INTO projects (name, slug, created_at) VALUES (?1, ?2, ?3)",
          params![name, slug, created_at],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Project {
          id,
          name,
          slug,
          created_at,
        })
      })
      .await
  }

  pub async fn get_project(&self, id: i64) -> StoreResult<Project> {
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            "SELECT id, name, slug, created_at FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
          )
          .optional()?
          .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
      })
      .await
  }

  pub async fn list_projects(&self) -> StoreResult<Vec<Project>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, name, slug, created_at FROM projects ORDER BY id",
        )?;
        let rows = stmt
          .query_map([], row_to_project)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// Deletion cascades to services/routes via `ON DELETE CASCADE`
  /// (spec.md §3: "Deletion cascades to services, routes, network").
  /// The network itself is an out-of-band side effect the caller (the
  /// lifecycle layer) must perform before or after this call.
  pub async fn delete_project(&self, id: i64) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected =
          conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("project {id}")));
        }
        Ok(())
      })
      .await
  }
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
  Ok(Project {
    id: row.get(0)?,
    name: row.get(1)?,
    slug: row.get(2)?,
    created_at: row.get(3)?,
  })
}

#[cfg(test)]
mod tests {
  use crate::tests::test_store;

  #[tokio::test]
  async fn create_get_list_delete() {
    let store = test_store();
    let p = store.create_project("proj-a", "proj-a").await.unwrap();
    let fetched = store.get_project(p.id).await.unwrap();
    assert_eq!(fetched.name, "proj-a");
    assert_eq!(store.list_projects().await.unwrap().len(), 1);
    store.delete_project(p.id).await.unwrap();
    assert!(store.get_project(p.id).await.is_err());
  }

  #[tokio::test]
  async fn duplicate_name_conflicts() {
    let store = test_store();
    store.create_project("dup", "dup").await.unwrap();
    let err = store.create_project("dup", "dup-2").await.unwrap_err();
    assert!(matches!(err, crate::StoreError::Conflict(_)));
  }
}
