//! Authenticated symmetric encryption for host passwords at rest.
//! The key never leaves this module; plaintext only exists
//! transiently, in memory, while a connect is in flight.

use std::sync::OnceLock;

use aes_gcm::{
  aead::{Aead, AeadCore, KeyInit, OsRng},
  Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context};
use fleet_client::error::{ErrorKind, FleetError, WithErrorKind};

use crate::config::core_config;

fn cipher() -> &'static Aes256Gcm {
  static CIPHER: OnceLock<Aes256Gcm> = OnceLock::new();
  CIPHER.get_or_init(|| {
    let key_material = std::fs::read(&core_config().credential_key_path)
      .unwrap_or_else(|e| {
        panic!(
          "failed to read credential key at {} | {e:#}",
          core_config().credential_key_path
        )
      });
    if key_material.len() != 32 {
      panic!(
        "credential key at {} must be exactly 32 bytes, got {}",
        core_config().credential_key_path,
        key_material.len()
      );
    }
    let key = Key::<Aes256Gcm>::from_slice(&key_material);
    Aes256Gcm::new(key)
  })
}

/// Encrypts `password`, returning a base64 blob of `nonce || ciphertext`.
pub fn encrypt_password(password: &str) -> fleet_client::FleetResult<String> {
  let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
  let ciphertext = cipher()
    .encrypt(&nonce, password.as_bytes())
    .map_err(|e| anyhow!("encryption failure: {e}"))
    .kind(ErrorKind::Internal)?;
  let mut combined = nonce.to_vec();
  combined.extend_from_slice(&ciphertext);
  Ok(data_encoding::BASE64.encode(&combined))
}

/// Decrypts a blob produced by [`encrypt_password`]. A decryption
/// failure (tampered ciphertext or wrong key) is fatal for the
/// credential -- never falls back to returning plaintext.
pub fn decrypt_password(ciphertext: &str) -> fleet_client::FleetResult<String> {
  let combined = data_encoding::BASE64
    .decode(ciphertext.as_bytes())
    .context("credential ciphertext is not valid base64")
    .kind(ErrorKind::Internal)?;
  if combined.len() < 12 {
    return Err(FleetError::new(ErrorKind::Internal, anyhow!("credential ciphertext too short")));
  }
  let (nonce_bytes, ciphertext) = combined.split_at(12);
  let nonce = Nonce::from_slice(nonce_bytes);
  let plaintext = cipher()
    .decrypt(nonce, ciphertext)
    .map_err(|e| anyhow!("credential decryption failed: {e}"))
    .kind(ErrorKind::Internal)?;
  String::from_utf8(plaintext)
    .context("decrypted credential is not valid utf8")
    .kind(ErrorKind::Internal)
}
