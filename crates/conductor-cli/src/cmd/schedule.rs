use super::{load_config, orchestrator};
use crate::output::{print_json, print_table};
use conductor_core::config::WarnLevel;
use maa_driver::Scheduler;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn run(root: &Path, list: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    if list {
        return list_entries(&config, json);
    }

    anyhow::ensure!(
        !config.schedules.is_empty(),
        "no schedules configured in .conductor/config.yaml"
    );
    for warning in config.validate() {
        if warning.level == WarnLevel::Error {
            tracing::warn!("config: {}", warning.message);
        }
    }

    let orchestrator = Arc::new(orchestrator(root, &config)?);
    let scheduler = Scheduler::from_config(Arc::clone(&orchestrator), &config);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, stopping scheduler");
                    cancel.cancel();
                    orchestrator.stop();
                }
            })
        };
        scheduler.run(cancel).await;
        interrupt.abort();
    });
    Ok(())
}

fn list_entries(config: &conductor_core::config::Config, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&config.schedules);
    }
    if config.schedules.is_empty() {
        println!("No schedules configured.");
        return Ok(());
    }
    let rows = config
        .schedules
        .iter()
        .map(|entry| {
            let days = if entry.days.is_empty() {
                "daily".to_string()
            } else {
                entry
                    .days
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            vec![
                entry.name.clone(),
                entry.profile.clone(),
                entry.time.format("%H:%M").to_string(),
                days,
                if entry.enabled { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "PROFILE", "TIME", "DAYS", "ENABLED"], rows);
    Ok(())
}
