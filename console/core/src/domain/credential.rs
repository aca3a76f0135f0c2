// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Credential contracts shared by the vault and the generation adapter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Password-encrypted secret as persisted on disk. All fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub salt: String,
    pub iv: String,
    pub data: String,
}

/// Supplies the API key for an outbound generation call.
///
/// Read per call so a key unlocked mid-session takes effect without rebuilding
/// the client.
pub trait ApiKeySource: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Fixed key, used by tests and by `GEMINI_API_KEY` style overrides.
#[derive(Debug, Clone)]
pub struct StaticApiKey(pub String);

impl ApiKeySource for StaticApiKey {
    fn api_key(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Decryption failed: wrong password or corrupted data")]
    Decrypt,

    #[error("Encryption failed")]
    Encrypt,

    #[error("No encrypted API key is stored")]
    NotFound,

    #[error("Malformed vault document: {0}")]
    Malformed(String),

    #[error("Vault I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
