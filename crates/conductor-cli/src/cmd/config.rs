use super::load_config;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use conductor_core::config::WarnLevel;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Check,

    /// Print the effective config, defaults included
    Show,

    /// List profiles and the tasks each one enables
    Profiles,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(root, json),
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Profiles => profiles(root, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    if json {
        print_json(&config)
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// profiles
// ---------------------------------------------------------------------------

fn profiles(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;

    let mut entries = Vec::new();
    for (name, profile) in &config.profiles {
        let tasks = match profile.task_config() {
            Ok(tc) => tc
                .tasks
                .iter()
                .map(|k| k.engine_name().to_string())
                .collect::<Vec<_>>()
                .join(","),
            Err(e) => format!("invalid: {e}"),
        };
        entries.push((name.clone(), profile, tasks));
    }

    if json {
        let value: Vec<_> = entries
            .iter()
            .map(|(name, profile, tasks)| {
                serde_json::json!({
                    "name": name,
                    "description": profile.description,
                    "tasks": tasks,
                    "emulator": profile.emulator,
                })
            })
            .collect();
        return print_json(&value);
    }

    let rows = entries
        .into_iter()
        .map(|(name, profile, tasks)| {
            vec![
                name,
                tasks,
                profile.emulator.clone().unwrap_or_else(|| "-".into()),
                profile.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["PROFILE", "TASKS", "EMULATOR", "DESCRIPTION"], rows);
    Ok(())
}
