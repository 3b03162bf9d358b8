//! At-rest AEAD encryption for Store secret fields (spec.md §4.1
//! "Secret encryption"): `pem_key_enc` and DNS provider `config_json`.
//!
//! Grounded on the teacher's key-handling idiom in `lib/noise/src/key`
//! (a small wrapper type per key shape, `anyhow::Context` everywhere,
//! base64 text encoding of binary material) but built on `aes-gcm` rather
//! than the teacher's Noise/X25519 stack, since that stack authenticates a
//! transport handshake, not data at rest — adopted instead from
//! `examples/other_examples/manifests/gotempsh-temps`, which encrypts
//! equivalent secret fields with `aes-gcm`.

use aes_gcm::{
  Aes256Gcm, Key, Nonce,
  aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::Context;
use base64::{Engine as _, prelude::BASE64_STANDARD};

const NONCE_LEN: usize = 12;

/// The 32-byte AEAD master key, read once from `MASTER_ENCRYPTION_KEY` at
/// startup (spec.md §5 "global mutable state ... the AEAD master key") and
/// never persisted.
#[derive(Clone)]
pub struct MasterKey(Key<Aes256Gcm>);

impl MasterKey {
  /// Parses a base64-encoded 32-byte key, as documented for
  /// `MASTER_ENCRYPTION_KEY` in spec.md §6.
  pub fn from_base64(encoded: &str) -> anyhow::Result<Self> {
    let bytes = BASE64_STANDARD
      .decode(encoded.trim())
      .context("MASTER_ENCRYPTION_KEY is not valid base64")?;
    if bytes.len() != 32 {
      anyhow::bail!(
        "MASTER_ENCRYPTION_KEY must decode to exactly 32 bytes, got {}",
        bytes.len()
      );
    }
    Ok(Self(*Key::<Aes256Gcm>::from_slice(&bytes)))
  }

  /// Generates a fresh random key; used in tests and first-run bootstrap.
  pub fn generate() -> Self {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Self(*Key::<Aes256Gcm>::from_slice(&bytes))
  }

  /// Encrypts `plaintext`, returning (ciphertext, nonce) both hex-encoded
  /// for storage alongside the Store row (spec.md: "nonce stored alongside
  /// ciphertext").
  pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Encrypted> {
    let cipher = Aes256Gcm::new(&self.0);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
      .encrypt(nonce, plaintext)
      .map_err(|e| anyhow::anyhow!("AEAD encryption failed: {e}"))?;
    Ok(Encrypted {
      ciphertext_hex: hex::encode(ciphertext),
      nonce_hex: hex::encode(nonce_bytes),
    })
  }

  pub fn encrypt_str(&self, plaintext: &str) -> anyhow::Result<Encrypted> {
    self.encrypt(plaintext.as_bytes())
  }

  /// Decrypts a value previously produced by [`MasterKey::encrypt`].
  pub fn decrypt(
    &self,
    ciphertext_hex: &str,
    nonce_hex: &str,
  ) -> anyhow::Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&self.0);
    let nonce_bytes =
      hex::decode(nonce_hex).context("Invalid nonce encoding")?;
    if nonce_bytes.len() != NONCE_LEN {
      anyhow::bail!("Invalid nonce length");
    }
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext =
      hex::decode(ciphertext_hex).context("Invalid ciphertext encoding")?;
    cipher
      .decrypt(nonce, ciphertext.as_slice())
      .map_err(|e| anyhow::anyhow!("AEAD decryption failed: {e}"))
  }

  pub fn decrypt_string(
    &self,
    ciphertext_hex: &str,
    nonce_hex: &str,
  ) -> anyhow::Result<String> {
    let bytes = self.decrypt(ciphertext_hex, nonce_hex)?;
    String::from_utf8(bytes).context("Decrypted value was not valid UTF-8")
  }
}

pub struct Encrypted {
  pub ciphertext_hex: String,
  pub nonce_hex: String,
}

/// Generates a 32-byte random hex token (spec.md §4.8 domain verification
/// challenge token).
pub fn random_hex_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Constant-time comparison for token verification (spec.md §4.1
/// `VerifyToken`: "constant-time compare of a salted hash").
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut diff = 0u8;
  for (x, y) in a.iter().zip(b.iter()) {
    diff |= x ^ y;
  }
  diff == 0
}

/// Salted hash of a plaintext token, for storage as `Token.hash`.
pub fn hash_token(plain: &str, salt: &str) -> String {
  use sha2::{Digest, Sha256};
  let mut hasher = Sha256::new();
  hasher.update(salt.as_bytes());
  hasher.update(plain.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encrypt_decrypt_roundtrip() {
    let key = MasterKey::generate();
    let enc = key.encrypt_str("super-secret-value").unwrap();
    let plain = key
      .decrypt_string(&enc.ciphertext_hex, &enc.nonce_hex)
      .unwrap();
    assert_eq!(plain, "super-secret-value");
  }

  #[test]
  fn different_nonces_each_call() {
    let key = MasterKey::generate();
    let a = key.encrypt_str("same input").unwrap();
    let b = key.encrypt_str("same input").unwrap();
    assert_ne!(a.nonce_hex, b.nonce_hex);
    assert_ne!(a.ciphertext_hex, b.ciphertext_hex);
  }

  #[test]
  fn wrong_key_fails_to_decrypt() {
    let key_a = MasterKey::generate();
    let key_b = MasterKey::generate();
    let enc = key_a.encrypt_str("data").unwrap();
    assert!(key_b.decrypt(&enc.ciphertext_hex, &enc.nonce_hex).is_err());
  }

  #[test]
  fn constant_time_eq_matches() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"ab"));
  }

  #[test]
  fn hash_token_is_deterministic_per_salt() {
    let h1 = hash_token("plain", "salt1");
    let h2 = hash_token("plain", "salt1");
    let h3 = hash_token("plain", "salt2");
    assert_eq!(h1, h2);
    assert_ne!(h1, h3);
  }

  #[test]
  fn random_hex_token_is_32_bytes() {
    let t = random_hex_token();
    assert_eq!(t.len(), 64);
    assert!(hex::decode(&t).is_ok());
  }
}
