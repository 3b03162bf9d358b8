use rusqlite::{Row, params};

use crate::{Store, StoreResult, entities::HistoricalMetric};

impl Store {
  pub async fn record_metric(&self, metric: HistoricalMetric) -> StoreResult<()> {
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO historical_metrics (
            timestamp, cpu_percent, memory_used, memory_total, disk_used, disk_total, net_rx, net_tx
          ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
          params![
            metric.timestamp,
            metric.cpu_percent,
            metric.memory_used,
            metric.memory_total,
            metric.disk_used,
            metric.disk_total,
            metric.net_rx,
            metric.net_tx,
          ],
        )?;
        Ok(())
      })
      .await
  }

  pub async fn list_metrics_since(&self, since: i64) -> StoreResult<Vec<HistoricalMetric>> {
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT timestamp, cpu_percent, memory_used, memory_total, disk_used, disk_total, net_rx, net_tx
           FROM historical_metrics WHERE timestamp >= ?1 ORDER BY timestamp",
        )?;
        let rows = stmt
          .query_map(params![since], row_to_metric)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// Retention trim: drops rows older than `retain_since`, keeping the
  /// historical series bounded.
  pub async fn trim_metrics(&self, retain_since: i64) -> StoreResult<u64> {
    self
      .with_conn(move |conn| {
        let affected = conn.execute(
          "DELETE FROM historical_metrics WHERE timestamp < ?1",
          params![retain_since],
        )?;
        Ok(affected as u64)
      })
      .await
  }
}

fn row_to_metric(row: &Row) -> rusqlite::Result<HistoricalMetric> {
  Ok(HistoricalMetric {
    timestamp: row.get(0)?,
    cpu_percent: row.get(1)?,
    memory_used: row.get(2)?,
    memory_total: row.get(3)?,
    disk_used: row.get(4)?,
    disk_total: row.get(5)?,
    net_rx: row.get(6)?,
    net_tx: row.get(7)?,
  })
}

#[cfg(test)]
mod tests {
  use crate::{entities::HistoricalMetric, tests::test_store};

  fn sample(timestamp: i64) -> HistoricalMetric {
    HistoricalMetric {
      timestamp,
      cpu_percent: 12.5,
      memory_used: 1024,
      memory_total: 4096,
      disk_used: 2048,
      disk_total: 8192,
      net_rx: 100,
      net_tx: 200,
    }
  }

  #[tokio::test]
  async fn record_list_and_trim() {
    let store = test_store();
    store.record_metric(sample(1_000)).await.unwrap();
    store.record_metric(sample(2_000)).await.unwrap();
    assert_eq!(store.list_metrics_since(0).await.unwrap().len(), 2);
    let trimmed = store.trim_metrics(1_500).await.unwrap();
    assert_eq!(trimmed, 1);
    assert_eq!(store.list_metrics_since(0).await.unwrap().len(), 1);
  }
}
