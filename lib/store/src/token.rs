use rusqlite::{OptionalExtension, Row, params};

use crate::{
  Store, StoreError, StoreResult,
  entities::{Role, Token, now_ms},
};

impl Store {
  pub async fn create_token(
    &self,
    name: &str,
    hash: &str,
    salt: &str,
    role: Role,
  ) -> StoreResult<Token> {
    let name = name.to_string();
    let hash = hash.to_string();
    let salt = salt.to_string();
    self
      .with_conn(move |conn| {
        let created_at = now_ms();
        conn.execute(
          "INSERT INTO tokens (name, hash, salt, role, last_used_at, created_at)
           VALUES (?1,?2,?3,?4,NULL,?5)",
          params![name, hash, salt, role.to_string(), created_at],
        )?;
        Ok(Token {
          name,
          hash,
          salt,
          role,
          last_used_at: None,
          created_at,
        })
      })
      .await
  }

  pub async fn get_token(&self, name: &str) -> StoreResult<Token> {
    let name = name.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            &format!("{SELECT_TOKEN} WHERE name = ?1"),
            params![name],
            row_to_token,
          )
          .optional()?
          .ok_or_else(|| StoreError::NotFound(format!("token {name}")))
      })
      .await
  }

  pub async fn list_tokens(&self) -> StoreResult<Vec<Token>> {
    self
      .with_conn(move |conn| {
        let mut stmt =
          conn.prepare(&format!("{SELECT_TOKEN} ORDER BY created_at"))?;
        let rows = stmt
          .query_map([], row_to_token)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  pub async fn touch_token(&self, name: &str) -> StoreResult<()> {
    let name = name.to_string();
    self
      .with_conn(move |conn| {
        conn.execute(
          "UPDATE tokens SET last_used_at = ?1 WHERE name = ?2",
          params![now_ms(), name],
        )?;
        Ok(())
      })
      .await
  }

  pub async fn delete_token(&self, name: &str) -> StoreResult<()> {
    let name = name.to_string();
    self
      .with_conn(move |conn| {
        let affected =
          conn.execute("DELETE FROM tokens WHERE name = ?1", params![name])?;
        if affected == 0 {
          return Err(StoreError::NotFound(format!("token {name}")));
        }
        Ok(())
      })
      .await
  }

  /// Used for quota checks (spec.md §4.1).
  pub async fn token_count(&self) -> StoreResult<i64> {
    self
      .with_conn(move |conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?)
      })
      .await
  }

  /// Constant-time compare of a salted hash against every stored token
  /// (spec.md §4.1 `VerifyToken`). Touches `last_used_at` on success.
  pub async fn verify_token(&self, plain: &str) -> StoreResult<(String, Role)> {
    let candidates = self.list_tokens().await?;
    let mut matched = None;
    for token in candidates {
      let hash = glinr_crypto::hash_token(plain, &token.salt);
      if glinr_crypto::constant_time_eq(hash.as_bytes(), token.hash.as_bytes()) {
        matched = Some((token.name, token.role));
      }
    }
    let (name, role) = matched.ok_or_else(|| StoreError::NotFound("token".to_string()))?;
    self.touch_token(&name).await?;
    Ok((name, role))
  }
}

const SELECT_TOKEN: &str =
  "SELECT name, hash, salt, role, last_used_at, created_at FROM tokens";

fn row_to_token(row: &Row) -> rusqlite::Result<Token> {
  let role: String = row.get(3)?;
  Ok(Token {
    name: row.get(0)?,
    hash: row.get(1)?,
    salt: row.get(2)?,
    role: role.parse().unwrap_or(Role::Viewer),
    last_used_at: row.get(4)?,
    created_at: row.get(5)?,
  })
}

#[cfg(test)]
mod tests {
  use crate::{entities::Role, tests::test_store};

  #[tokio::test]
  async fn create_list_count_delete() {
    let store = test_store();
    store
      .create_token("admin", "hash", "salt", Role::Admin)
      .await
      .unwrap();
    assert_eq!(store.token_count().await.unwrap(), 1);
    store.touch_token("admin").await.unwrap();
    let token = store.get_token("admin").await.unwrap();
    assert!(token.last_used_at.is_some());
    store.delete_token("admin").await.unwrap();
    assert_eq!(store.token_count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn verify_token_matches_plain_against_salted_hash() {
    let store = test_store();
    let salt = "pepper";
    let hash = glinr_crypto::hash_token("s3cr3t", salt);
    store
      .create_token("deployer", &hash, salt, Role::Deployer)
      .await
      .unwrap();

    let (name, role) = store.verify_token("s3cr3t").await.unwrap();
    assert_eq!(name, "deployer");
    assert_eq!(role, Role::Deployer);
    assert!(store.get_token("deployer").await.unwrap().last_used_at.is_some());

    assert!(store.verify_token("wrong").await.is_err());
  }
}
