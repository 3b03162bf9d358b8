use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Build, JobStatus, now_ms},
};

pub struct NewBuild {
  pub project_id: i64,
  pub service_id: i64,
  pub git_url: String,
  pub git_ref: String,
  pub context_path: String,
  pub dockerfile: String,
  pub triggered_by: String,
}

impl Store {
  pub async fn create_build(&self, new: NewBuild) -> StoreResult<Build> {
    self
      .with_conn(move |conn| {
        let now = now_ms();
        conn.execute(
          "INSERT INTO builds (
            project_id, service_id, git_url, git_ref, commit_sha, image_tag,
            context_path, dockerfile, status, triggered_by, created_at, updated_at
          ) VALUES (?1,?2,?3,?4,NULL,NULL,?5,?6,?7,?8,?9,?9)",
          params![
            new.project_id,
            new.service_id,
            new.git_url,
            new.git_ref,
            new.context_path,
            new.dockerfile,
            JobStatus::Queued.to_string(),
            new.triggered_by,
            now,
          ],
        )?;
        let id = conn.last_insert_rowid();
        get_build_tx(conn, id)
      })
      .await
  }

  pub async fn get_build(&self, id: i64) -> StoreResult<Build> {
    self.with_conn(move |conn| get_build_tx(conn, id)).await
  }

  pub async fn list_builds(&self, service_id: i64) -> StoreResult<Vec<Build>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_BUILD} WHERE service_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map(params![service_id], row_to_build)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn set_build_status(
    &self,
    id: i64,
    status: JobStatus,
    commit_sha: Option<&str>,
    image_tag: Option<&str>,
  ) -> StoreResult<()> {
    let commit_sha = commit_sha.map(str::to_string);
    let image_tag = image_tag.map(str::to_string);
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE builds SET status = ?1, commit_sha = COALESCE(?2, commit_sha),
           image_tag = COALESCE(?3, image_tag), updated_at = ?4 WHERE id = ?5",
          params![status.to_string(), commit_sha, image_tag, now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("build {id}")));
        }
        Ok(())
      })
      .await
  }
}

const SELECT_BUILD: &str = "SELECT id, project_id, service_id, git_url, git_ref, commit_sha,
  image_tag, context_path, dockerfile, status, triggered_by, created_at, updated_at FROM builds";

fn get_build_tx(conn: &rusqlite::Connection, id: i64) -> StoreResult<Build> {
  conn
    .query_row(&format!("{SELECT_BUILD} WHERE id = ?1"), params![id], row_to_build)
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("build {id}")))
}

fn row_to_build(row: &Row) -> rusqlite::Result<Build> {
  let status: String = row.get(9)?;
  Ok(Build {
    id: row.get(0)?,
    project_id: row.get(1)?,
    service_id: row.get(2)?,
    git_url: row.get(3)?,
    git_ref: row.get(4)?,
    commit_sha: row.get(5)?,
    image_tag: row.get(6)?,
    context_path: row.get(7)?,
    dockerfile: row.get(8)?,
    status: status.parse().unwrap_or(JobStatus::Failed),
    triggered_by: row.get(10)?,
    created_at: row.get(11)?,
    updated_at: row.get(12)?,
  })
}

#[cfg(test)]
mod tests {
  use super::NewBuild;
  use crate::{entities::JobStatus, tests::test_store};

  #[tokio::test]
  async fn create_and_transition() {
    let store = test_store();
    let project = store.create_project("proj-a", "proj-a").await.unwrap();
    let build = store
      .create_build(NewBuild {
        project_id: project.id,
        service_id: 0,
        git_url: "https://example.com/repo.git".to_string(),
        git_ref: "main".to_string(),
        context_path: ".".to_string(),
        dockerfile: "Dockerfile".to_string(),
        triggered_by: "admin".to_string(),
      })
      .await
      .unwrap();
    store
      .set_build_status(build.id, JobStatus::Succeeded, Some("abc123"), Some("img:abc123"))
      .await
      .unwrap();
    let build = store.get_build(build.id).await.unwrap();
    assert_eq!(build.status, JobStatus::Succeeded);
    assert_eq!(build.commit_sha.as_deref(), Some("abc123"));
  }
}
