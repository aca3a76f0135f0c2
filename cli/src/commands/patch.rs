// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Patch catalog commands
//!
//! Commands: list, show, preview

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::commands::{load_console, to_document};
use crate::render::{log_line, print_agents, print_patch};

#[derive(Subcommand)]
pub enum PatchCommand {
    /// List predefined patches
    List,

    /// Show a patch and its diffs
    Show {
        /// Patch id
        #[arg(value_name = "PATCH_ID")]
        patch_id: String,

        /// Print the raw definition (yaml or json)
        #[arg(short, long, value_name = "FORMAT")]
        output: Option<String>,
    },

    /// Apply a patch to a fresh session and show the effect
    Preview {
        /// Patch id
        #[arg(value_name = "PATCH_ID")]
        patch_id: String,
    },
}

pub async fn handle_command(command: PatchCommand, config_path: Option<PathBuf>) -> Result<()> {
    let console = load_console(config_path)?;

    match command {
        PatchCommand::List => {
            let patches = console.catalog().patches();
            println!("{} patches available:", patches.len());
            println!("{:<12} {:<28} {:<14} {}", "ID", "NAME", "CATEGORY", "DIFFS");
            for patch in patches {
                println!(
                    "{:<12} {:<28} {:<14} {}",
                    patch.id,
                    patch.name.bold(),
                    format!("{:?}", patch.category).to_lowercase(),
                    patch.diffs.len()
                );
            }
            Ok(())
        }
        PatchCommand::Show { patch_id, output } => {
            let Some(patch) = console.catalog().patch(&patch_id) else {
                bail!("Unknown patch '{}'", patch_id);
            };
            match output {
                Some(format) => println!("{}", to_document(patch, &format)?),
                None => print_patch(patch),
            }
            Ok(())
        }
        PatchCommand::Preview { patch_id } => {
            console.apply_patch(&patch_id)?;

            let store = console.store().lock();
            for entry in store.logs() {
                println!("{}", log_line(entry));
            }
            println!();
            print_agents(store.agents());
            Ok(())
        }
    }
}
