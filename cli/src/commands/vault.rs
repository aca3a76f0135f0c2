// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Credential vault commands
//!
//! Commands: set-key, status, clear

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aether_core::infrastructure::credential_vault::CredentialVault;

use crate::commands::{load_config, vault_password};

#[derive(Subcommand)]
pub enum VaultCommand {
    /// Encrypt and store a generation API key
    SetKey {
        /// API key (prompted when omitted)
        #[arg(long, env = "AETHER_API_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Show whether a key is stored, optionally checking the password
    Status {
        /// Try to decrypt the stored key
        #[arg(long)]
        verify: bool,
    },

    /// Delete the stored key
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_command(command: VaultCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let vault = CredentialVault::new(config.spec.vault.path.clone());

    match command {
        VaultCommand::SetKey { key } => set_key(&vault, key),
        VaultCommand::Status { verify } => status(&vault, verify),
        VaultCommand::Clear { yes } => clear(&vault, yes),
    }
}

fn set_key(vault: &CredentialVault, key: Option<String>) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => dialoguer::Password::new()
            .with_prompt("Gemini API key")
            .interact()
            .context("Failed to read API key")?,
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("API key must not be empty");
    }

    let password = vault_password(true)?;
    tokio::task::block_in_place(|| vault.store_api_key(key, &password))
        .context("Failed to store API key")?;

    println!(
        "{}",
        format!("✓ API key encrypted and stored at {}", vault.path().display()).green()
    );
    Ok(())
}

fn status(vault: &CredentialVault, verify: bool) -> Result<()> {
    println!("Vault file: {}", vault.path().display());
    if !vault.has_encrypted() {
        println!("{}", "No API key stored".yellow());
        return Ok(());
    }
    println!("{}", "✓ Encrypted API key present".green());

    if verify {
        let password = vault_password(false)?;
        match tokio::task::block_in_place(|| vault.unlock(&password)) {
            Ok(key) => println!(
                "{}",
                format!("✓ Password accepted (key ends with ...{})", key_suffix(&key)).green()
            ),
            Err(e) => println!("{}", format!("✗ Could not unlock: {}", e).red()),
        }
    }
    Ok(())
}

fn clear(vault: &CredentialVault, yes: bool) -> Result<()> {
    if !vault.has_encrypted() {
        println!("{}", "No API key stored".yellow());
        return Ok(());
    }
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Delete the stored API key?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            return Ok(());
        }
    }
    vault.clear().context("Failed to delete stored key")?;
    println!("{}", "✓ Stored API key removed".green());
    Ok(())
}

fn key_suffix(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}
