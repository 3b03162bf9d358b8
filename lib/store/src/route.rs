use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Route, now_ms},
};

pub struct NewRoute {
  pub service_id: i64,
  pub domain: String,
  pub path: Option<String>,
  pub port: u16,
  pub tls: bool,
}

impl Store {
  pub async fn create_route(&self, new: NewRoute) -> StoreResult<Route> {
    self
      .with_conn(move |conn| {
        let created_at = now_ms();
        conn.execute(
          "INSERT INTO routes (service_id, domain, path, port, tls, created_at)
           VALUES (?1,?2,?3,?4,?5,?6)",
          params![
            new.service_id,
            new.domain,
            new.path,
            new.port,
            new.tls,
            created_at
          ],
        )?;
        let id = conn.last_insert_rowid();
        get_route_tx(conn, id)
      })
      .await
  }

  pub async fn get_route(&self, id: i64) -> StoreResult<Route> {
    self.with_conn(move |conn| get_route_tx(conn, id)).await
  }

  pub async fn list_routes(&self, service_id: i64) -> StoreResult<Vec<Route>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_ROUTE} WHERE service_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(params![service_id], row_to_route)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// All routes across all services, used to feed the proxy generator
  /// (spec.md §4.1 `GetAllRoutes`).
  pub async fn get_all_routes(&self) -> StoreResult<Vec<Route>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_ROUTE} ORDER BY id"))?;
        let rows = stmt
          .query_map([], row_to_route)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn delete_route(&self, id: i64) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        let affected =
          conn.execute("DELETE FROM routes WHERE id = ?1", params![id])?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("route {id}")));
        }
        Ok(())
      })
      .await
  }
}

const SELECT_ROUTE: &str =
  "SELECT id, service_id, domain, path, port, tls, created_at FROM routes";

fn get_route_tx(conn: &rusqlite::Connection, id: i64) -> StoreResult<Route> {
  conn
    .query_row(&format!("{SELECT_ROUTE} WHERE id = ?1"), params![id], row_to_route)
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("route {id}")))
}

fn row_to_route(row: &Row) -> rusqlite::Result<Route> {
  Ok(Route {
    id: row.get(0)?,
    service_id: row.get(1)?,
    domain: row.get(2)?,
    path: row.get(3)?,
    port: row.get(4)?,
    tls: row.get(5)?,
    created_at: row.get(6)?,
  })
}

#[cfg(test)]
mod tests {
  use indexmap::IndexMap;

  use super::NewRoute;
  use crate::{entities::HealthCheckType, service::NewService, tests::test_store};

  #[tokio::test]
  async fn create_and_list() {
    let store = test_store();
    let project = store.create_project("proj-a", "proj-a").await.unwrap();
    let service = store
      .create_service(NewService {
        project_id: project.id,
        name: "api".to_string(),
        image: "nginx".to_string(),
        env: IndexMap::new(),
        ports: vec![],
        volumes: vec![],
        health_check_type: HealthCheckType::None,
        health_path: None,
      })
      .await
      .unwrap();
    store
      .create_route(NewRoute {
        service_id: service.id,
        domain: "api.example.com".to_string(),
        path: None,
        port: 80,
        tls: true,
      })
      .await
      .unwrap();
    let routes = store.list_routes(service.id).await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(store.get_all_routes().await.unwrap().len(), 1);
  }
}
