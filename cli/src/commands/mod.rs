// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Aether CLI

pub mod agent;
pub mod config;
pub mod console;
pub mod patch;
pub mod propose;
pub mod scenario;
pub mod vault;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::console::ConsoleArgs;
pub use self::patch::PatchCommand;
pub use self::scenario::ScenarioCommand;
pub use self::vault::VaultCommand;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use aether_core::application::console::Console;
use aether_core::domain::console_config::ConsoleConfig;
use aether_core::domain::credential::VaultError;

pub const PASSWORD_ENV: &str = "AETHER_VAULT_PASSWORD";

pub fn load_config(config_path: Option<PathBuf>) -> Result<ConsoleConfig> {
    let config =
        ConsoleConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

pub fn load_console(config_path: Option<PathBuf>) -> Result<Console> {
    Console::new(load_config(config_path)?)
}

/// Password from `AETHER_VAULT_PASSWORD`, else an interactive prompt.
pub fn vault_password(confirm: bool) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    let mut prompt = dialoguer::Password::new().with_prompt("Vault password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    prompt.interact().context("Failed to read password")
}

/// Make the stored API key available to the generation client.
pub fn unlock_vault(console: &Console) -> Result<()> {
    let vault = console.vault();
    if vault.has_session() {
        return Ok(());
    }
    if !vault.has_encrypted() {
        bail!("No API key stored. Run `aether vault set-key` first.");
    }
    let password = vault_password(false)?;
    // Key derivation is CPU heavy
    tokio::task::block_in_place(|| vault.unlock(&password)).map_err(|e| match e {
        VaultError::Decrypt => anyhow::anyhow!("Wrong vault password"),
        other => anyhow::Error::new(other).context("Failed to unlock vault"),
    })?;
    Ok(())
}

/// Render a catalog entry as `yaml` or `json`.
pub fn to_document<T: Serialize>(value: &T, format: &str) -> Result<String> {
    match format {
        "yaml" => serde_yaml::to_string(value).context("Failed to serialize as YAML"),
        "json" => serde_json::to_string_pretty(value).context("Failed to serialize as JSON"),
        _ => bail!("Invalid output format: '{}'. Use 'yaml' or 'json'", format),
    }
}
