use super::Target;
use crate::output::{print_json, print_table};
use anyhow::Context;
use conductor_core::config::Config;
use conductor_core::engine_config::EngineDocuments;
use conductor_core::params::ParamEnum;
use serde_json::{json, Value};
use std::path::Path;

pub fn run(root: &Path, target: Target, json: bool) -> anyhow::Result<()> {
    // Inline builds work without an initialized project.
    let config = match (&target, Config::load(root)) {
        (_, Ok(config)) => Some(config),
        (Target::Inline(_), Err(_)) => None,
        (Target::Profile(_), Err(e)) => {
            return Err(e).context("failed to load .conductor/config.yaml")
        }
    };
    let request = target.request(&config.clone().unwrap_or_default())?;
    let queue = request.config.task_queue(&existing_queue(config.as_ref()));

    if json {
        return print_json(&json!({
            "label": request.label,
            "config": request.config,
            "completion_markers": request.config.completion_markers(),
            "task_queue": queue,
        }));
    }

    let rows = queue
        .iter()
        .map(|entry| {
            let field = |key: &str| entry.get(key).and_then(Value::as_str).unwrap_or("");
            let enabled = entry.get("IsEnable").and_then(Value::as_bool).unwrap_or(false);
            vec![
                field("Name").to_string(),
                field("TaskType").to_string(),
                if enabled { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "TYPE", "ENABLED"], rows);

    println!("\npost action: {}", request.config.post_action.as_str());
    for name in &request.config.ignored_params {
        println!("warning: parameter '{name}' matched no task and was ignored");
    }
    Ok(())
}

/// The task queue currently in the engine's configuration, used as the
/// template for untouched keys. Empty when no engine is configured.
fn existing_queue(config: Option<&Config>) -> Vec<Value> {
    let Some(layout) = config.and_then(|c| c.engine.layout().ok()) else {
        return Vec::new();
    };
    match EngineDocuments::load(&layout) {
        Ok(docs) => docs.task_queue().cloned().unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "engine configuration unreadable, using fresh queue");
            Vec::new()
        }
    }
}
