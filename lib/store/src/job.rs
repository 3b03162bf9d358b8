use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Job, JobStatus, JobType, now_ms},
};

impl Store {
  pub async fn create_job(
    &self,
    id: &str,
    job_type: JobType,
    data: serde_json::Value,
  ) -> StoreResult<Job> {
    let id = id.to_string();
    self
      .with_conn(move |conn| {
        let now = now_ms();
        let data_json =
          serde_json::to_string(&data).map_err(|e| StoreError::Other(e.into()))?;
        conn.execute(
          "INSERT INTO jobs (id, job_type, data, status, progress, error, created_at, updated_at)
           VALUES (?1,?2,?3,?4,0,NULL,?5,?5)",
          params![id, job_type.to_string(), data_json, JobStatus::Queued.to_string(), now],
        )?;
        Ok(Job {
          id,
          job_type,
          data,
          status: JobStatus::Queued,
          progress: 0,
          error: None,
          created_at: now,
          updated_at: now,
        })
      })
      .await
  }

  pub async fn get_job(&self, id: &str) -> StoreResult<Job> {
    let id = id.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(&format!("{SELECT_JOB} WHERE id = ?1"), params![id], row_to_job)
          .optional()?
          .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
      })
      .await
  }

  pub async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
    self
      .with_conn(move |conn| {
        let mut stmt =
          conn.prepare(&format!("{SELECT_JOB} ORDER BY created_at"))?;
        let rows = stmt
          .query_map([], row_to_job)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// `progress` must move monotonically 0 -> 100 (spec.md §4.6); the
  /// caller (the worker) is responsible for respecting that, the Store
  /// just persists it.
  pub async fn set_job_progress(
    &self,
    id: &str,
    status: JobStatus,
    progress: u8,
  ) -> StoreResult<()> {
    let id = id.to_string();
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE jobs SET status = ?1, progress = ?2, updated_at = ?3 WHERE id = ?4",
          params![status.to_string(), progress, now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("job {id}")));
        }
        Ok(())
      })
      .await
  }

  pub async fn fail_job(&self, id: &str, error: &str) -> StoreResult<()> {
    let id = id.to_string();
    let error = error.to_string();
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
          params![JobStatus::Failed.to_string(), error, now_ms(), id],
        )?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("job {id}")));
        }
        Ok(())
      })
      .await
  }
}

const SELECT_JOB: &str =
  "SELECT id, job_type, data, status, progress, error, created_at, updated_at FROM jobs";

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
  let job_type: String = row.get(1)?;
  let data_json: String = row.get(2)?;
  let status: String = row.get(3)?;
  Ok(Job {
    id: row.get(0)?,
    job_type: job_type.parse().unwrap_or(JobType::Build),
    data: serde_json::from_str(&data_json).unwrap_or(serde_json::Value::Null),
    status: status.parse().unwrap_or(JobStatus::Failed),
    progress: row.get(4)?,
    error: row.get(5)?,
    created_at: row.get(6)?,
    updated_at: row.get(7)?,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use crate::{
    entities::{JobStatus, JobType},
    tests::test_store,
  };

  #[tokio::test]
  async fn lifecycle() {
    let store = test_store();
    store
      .create_job("job-1", JobType::CertIssue, json!({"domain": "ex.test"}))
      .await
      .unwrap();
    store
      .set_job_progress("job-1", JobStatus::Running, 50)
      .await
      .unwrap();
    let job = store.get_job("job-1").await.unwrap();
    assert_eq!(job.progress, 50);
    store
      .set_job_progress("job-1", JobStatus::Succeeded, 100)
      .await
      .unwrap();
    let job = store.get_job("job-1").await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
  }
}
