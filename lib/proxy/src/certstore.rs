use std::path::{Path, PathBuf};

use tokio::fs;

/// On-disk locations for a domain's certificate material (spec.md §6
/// "Persisted state layout": `certs/<domain>/{fullchain.pem, privkey.pem}`).
/// Shared by every writer (issuance, manual upload) and every reader
/// ([`crate::render`]'s callers) so the rendered `ssl_certificate`
/// directives always resolve to paths something actually wrote.
pub fn cert_paths(certs_dir: &Path, domain: &str) -> (PathBuf, PathBuf) {
  let dir = certs_dir.join(domain);
  (dir.join("fullchain.pem"), dir.join("privkey.pem"))
}

/// Writes the fullchain certificate and private key for `domain` under
/// `certs_dir`, with the permissions spec.md §5 mandates: 0644 on the
/// cert, 0600 on the key. Called on ACME issuance and manual certificate
/// upload, always before the next proxy reload, so `nginx -t` has real
/// files to validate against (spec.md §8 scenario 3).
pub async fn write_cert_files(
  certs_dir: &Path,
  domain: &str,
  pem_cert: &str,
  pem_chain: Option<&str>,
  pem_key: &str,
) -> std::io::Result<()> {
  let (cert_path, key_path) = cert_paths(certs_dir, domain);
  if let Some(parent) = cert_path.parent() {
    fs::create_dir_all(parent).await?;
  }

  let fullchain = match pem_chain {
    Some(chain) if !chain.is_empty() => format!("{pem_cert}\n{chain}"),
    _ => pem_cert.to_string(),
  };

  fs::write(&cert_path, fullchain).await?;
  fs::write(&key_path, pem_key).await?;

  set_permissions(&cert_path, 0o644).await?;
  set_permissions(&key_path, 0o600).await?;
  Ok(())
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tmp_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("glinr-certstore-test-{}-{name}", std::process::id()));
    dir
  }

  #[tokio::test]
  async fn writes_fullchain_and_key_with_required_permissions() {
    let certs_dir = tmp_dir("basic");
    let _ = fs::remove_dir_all(&certs_dir).await;

    write_cert_files(&certs_dir, "api.example.com", "LEAF", Some("CHAIN"), "KEY")
      .await
      .unwrap();

    let (cert_path, key_path) = cert_paths(&certs_dir, "api.example.com");
    assert_eq!(fs::read_to_string(&cert_path).await.unwrap(), "LEAF\nCHAIN");
    assert_eq!(fs::read_to_string(&key_path).await.unwrap(), "KEY");

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let cert_mode = fs::metadata(&cert_path).await.unwrap().permissions().mode() & 0o777;
      let key_mode = fs::metadata(&key_path).await.unwrap().permissions().mode() & 0o777;
      assert_eq!(cert_mode, 0o644);
      assert_eq!(key_mode, 0o600);
    }

    let _ = fs::remove_dir_all(&certs_dir).await;
  }

  #[tokio::test]
  async fn omits_chain_separator_when_chain_absent() {
    let certs_dir = tmp_dir("nochain");
    let _ = fs::remove_dir_all(&certs_dir).await;

    write_cert_files(&certs_dir, "solo.test", "LEAF-ONLY", None, "KEY")
      .await
      .unwrap();

    let (cert_path, _) = cert_paths(&certs_dir, "solo.test");
    assert_eq!(fs::read_to_string(&cert_path).await.unwrap(), "LEAF-ONLY");

    let _ = fs::remove_dir_all(&certs_dir).await;
  }

  /// spec.md §8 scenario 3: after a manual certificate upload, a render
  /// that references the written paths must actually validate — the
  /// files the config points at have to exist on disk, not just in the
  /// Store.
  #[tokio::test]
  async fn render_after_manual_upload_validates_against_real_files() {
    use crate::{RouteInput, Reloader, render};
    use std::collections::HashMap;

    let base = tmp_dir("manual-upload-e2e");
    let _ = fs::remove_dir_all(&base).await;
    let certs_dir = base.join("certs");

    write_cert_files(&certs_dir, "api.example.com", "LEAF", Some("CHAIN"), "KEY")
      .await
      .unwrap();

    let (cert_path, key_path) = cert_paths(&certs_dir, "api.example.com");
    assert!(cert_path.exists());
    assert!(key_path.exists());

    let routes = vec![RouteInput {
      domain: "api.example.com".to_string(),
      path: "/".to_string(),
      service_id: 1,
      port: 80,
      tls: true,
    }];
    let mut certs = HashMap::new();
    certs.insert(
      "api.example.com".to_string(),
      crate::CertInput {
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
      },
    );
    let output = render(&routes, &certs, &base.join("challenges").to_string_lossy());
    assert!(output.config.contains(&cert_path.to_string_lossy().to_string()));

    let config_path = base.join("nginx.conf");
    let reloader = Reloader::new(config_path, "true", "true");
    reloader.reload(&output.config, &output.hash_hex, 1000).await.unwrap();
    let status = reloader.status().await;
    assert!(status.healthy);

    let _ = fs::remove_dir_all(&base).await;
  }
}
