use anyhow::Context;
use conductor_core::config::Config;
use conductor_core::profile::Profile;
use conductor_core::{io, paths};
use serde_json::json;
use std::path::Path;

pub fn run(root: &Path, engine: Option<&Path>) -> anyhow::Result<()> {
    println!("Initializing conductor in: {}", root.display());

    for dir in [paths::conductor_dir(root), paths::backups_dir(root)] {
        io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let data = serde_yaml::to_string(&starter_config(engine))?;
    let written = io::write_if_missing(&paths::config_path(root), data.as_bytes())
        .context("failed to write config.yaml")?;
    if written {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    if engine.is_none() {
        println!("\nSet engine.path in {} before running.", paths::CONFIG_FILE);
    }
    Ok(())
}

/// Default settings plus one example profile.
fn starter_config(engine: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.engine.path = engine.map(Path::to_path_buf);

    let mut daily = Profile {
        description: Some("Daily chores: sanity on 1-7, then the base routine".into()),
        tasks: ["recruit", "infrast", "mall", "award"]
            .into_iter()
            .map(String::from)
            .collect(),
        ..Profile::default()
    };
    daily.params.insert("stage".into(), json!("1-7"));
    config.profiles.insert("daily".into(), daily);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::TaskKind;
    use tempfile::TempDir;

    #[test]
    fn starter_profile_builds() {
        let config = starter_config(None);
        let tasks = config.profile("daily").unwrap().task_config().unwrap();
        assert!(tasks.is_enabled(TaskKind::Fight));
        assert!(tasks.is_enabled(TaskKind::Award));
    }

    #[test]
    fn init_keeps_existing_config() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), Some(Path::new("/opt/maa"))).unwrap();
        run(dir.path(), None).unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.engine.path.as_deref(), Some(Path::new("/opt/maa")));
    }
}
