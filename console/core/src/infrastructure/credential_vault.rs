// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Credential Vault - password-encrypted API key storage
//!
//! The key is derived with PBKDF2-HMAC-SHA256 (600 000 rounds, 16-byte random
//! salt) and the secret sealed with AES-256-GCM under a 12-byte random IV. The
//! resulting [`EncryptedSecret`] is persisted as JSON; the decrypted key only
//! lives in memory for the current session.
//!
//! Key derivation is deliberately slow. Call from a blocking context
//! (`spawn_blocking`) when running inside an async task.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use tracing::{debug, info};

use crate::domain::credential::{ApiKeySource, EncryptedSecret, VaultError};

pub const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub struct CredentialVault {
    path: PathBuf,
    iterations: u32,
    session: RwLock<Option<String>>,
}

impl CredentialVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_iterations(path, PBKDF2_ITERATIONS)
    }

    pub(crate) fn with_iterations(path: impl Into<PathBuf>, iterations: u32) -> Self {
        Self {
            path: path.into(),
            iterations,
            session: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encrypt(&self, plaintext: &str, password: &str) -> Result<EncryptedSecret, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let cipher = self.cipher(password, &salt)?;
        let data = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        Ok(EncryptedSecret {
            salt: STANDARD.encode(salt),
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(data),
        })
    }

    pub fn decrypt(&self, secret: &EncryptedSecret, password: &str) -> Result<String, VaultError> {
        let salt = decode("salt", &secret.salt)?;
        let iv = decode("iv", &secret.iv)?;
        let data = decode("data", &secret.data)?;
        if iv.len() != IV_LEN {
            return Err(VaultError::Malformed(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }

        let cipher = self.cipher(password, &salt)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), data.as_slice())
            .map_err(|_| VaultError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
    }

    /// Encrypt and persist `api_key`, then keep it unlocked for this session.
    pub fn store_api_key(&self, api_key: &str, password: &str) -> Result<(), VaultError> {
        let secret = self.encrypt(api_key, password)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&secret)?)?;
        restrict_permissions(&self.path)?;

        *self.session.write() = Some(api_key.to_string());
        info!(path = ?self.path, "API key encrypted and stored");
        Ok(())
    }

    /// Decrypt the stored key into the session.
    pub fn unlock(&self, password: &str) -> Result<String, VaultError> {
        let secret = self.load()?;
        let api_key = self.decrypt(&secret, password)?;
        *self.session.write() = Some(api_key.clone());
        debug!("Vault unlocked for this session");
        Ok(api_key)
    }

    pub fn load(&self) -> Result<EncryptedSecret, VaultError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VaultError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub fn session_api_key(&self) -> Option<String> {
        self.session.read().clone()
    }

    pub fn has_encrypted(&self) -> bool {
        self.path.is_file()
    }

    pub fn has_session(&self) -> bool {
        self.session.read().is_some()
    }

    /// Forget the session key, keep the file.
    pub fn lock(&self) {
        *self.session.write() = None;
    }

    /// Forget the session key and delete the stored ciphertext.
    pub fn clear(&self) -> Result<(), VaultError> {
        self.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = ?self.path, "Stored API key removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn cipher(&self, password: &str, salt: &[u8]) -> Result<Aes256Gcm, VaultError> {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut key);
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Encrypt)
    }
}

impl ApiKeySource for CredentialVault {
    fn api_key(&self) -> Option<String> {
        self.session_api_key()
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, VaultError> {
    STANDARD
        .decode(value)
        .map_err(|e| VaultError::Malformed(format!("{}: {}", field, e)))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
