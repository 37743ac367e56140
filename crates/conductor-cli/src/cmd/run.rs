use super::{load_config, orchestrator, Target};
use crate::output::{print_json, print_table};
use maa_driver::RunReport;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    root: &Path,
    target: Target,
    address: Option<String>,
    emulator: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let mut request = target.request(&config)?;
    if let Some(address) = address {
        request = request.with_address(address);
    }
    if let Some(id) = emulator {
        anyhow::ensure!(
            config.emulators.contains_key(&id),
            "unknown emulator '{id}': declare it under emulators in config.yaml"
        );
        request = request.with_emulator(id);
    }

    let orchestrator = Arc::new(orchestrator(root, &config)?);
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async move {
        let stopper = Arc::clone(&orchestrator);
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping the run");
                stopper.stop();
            }
        });
        let report = orchestrator.run(request).await;
        interrupt.abort();
        report
    });

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.outcome.is_success() {
        anyhow::bail!("{}", report.summary());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if !report.transitions.is_empty() {
        let rows = report
            .transitions
            .iter()
            .map(|t| {
                vec![
                    t.at.format("%H:%M:%S").to_string(),
                    t.from.to_string(),
                    t.to.to_string(),
                ]
            })
            .collect();
        print_table(&["AT", "FROM", "TO"], rows);
        println!();
    }

    for task in &report.tasks_finished {
        println!("  finished: {task}");
    }
    for failure in &report.tasks_failed {
        println!("  failed:   {} ({})", failure.task, failure.reason);
    }
    if let Some(e) = &report.restore_error {
        println!("  restore:  {e}");
    }
    if let Some(elapsed) = report.elapsed() {
        println!("  elapsed:  {}s", elapsed.as_secs());
    }
    if report.outcome.is_success() {
        println!("{}", report.summary());
    }
}
