use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use conductor_core::io::{copy_tree, remove_tree_if_exists};
use conductor_core::Result;

// ─── ConfigBackup ─────────────────────────────────────────────────────────

/// Snapshot of the engine's configuration directory taken before a run
/// stages its own settings.
///
/// [`restore`](ConfigBackup::restore) puts the snapshot back and deletes any
/// staged file that did not exist beforehand. It is idempotent. If the
/// backup is dropped without a successful restore, the drop restores on a
/// best-effort basis.
#[derive(Debug)]
pub struct ConfigBackup {
    source: PathBuf,
    store: PathBuf,
    /// Files present in `source` at snapshot time, relative to it.
    files: BTreeSet<PathBuf>,
    /// Files a run may write, relative to `source`.
    staged: Vec<PathBuf>,
    restored: bool,
}

impl ConfigBackup {
    /// Copy `source` into `store`. `staged` lists the files, relative to
    /// `source`, the run is about to write.
    pub fn snapshot(source: &Path, store: &Path, staged: &[PathBuf]) -> Result<Self> {
        remove_tree_if_exists(store)?;
        let files = if source.is_dir() {
            copy_tree(source, store)?
        } else {
            std::fs::create_dir_all(store)?;
            Vec::new()
        };
        tracing::debug!(
            source = %source.display(),
            store = %store.display(),
            files = files.len(),
            "engine config backed up"
        );
        Ok(Self {
            source: source.to_path_buf(),
            store: store.to_path_buf(),
            files: files.into_iter().collect(),
            staged: staged.to_vec(),
            restored: false,
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Put the snapshot back. On failure the backup directory is kept so
    /// the files can be recovered by hand.
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        if !self.files.is_empty() {
            copy_tree(&self.store, &self.source)?;
        }
        for rel in &self.staged {
            if self.files.contains(rel) {
                continue;
            }
            match std::fs::remove_file(self.source.join(rel)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        remove_tree_if_exists(&self.store)?;
        self.restored = true;
        tracing::debug!(source = %self.source.display(), "engine config restored");
        Ok(())
    }
}

impl Drop for ConfigBackup {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        match self.restore() {
            Ok(()) => tracing::warn!(
                source = %self.source.display(),
                "engine config restored on drop"
            ),
            Err(e) => tracing::error!(
                source = %self.source.display(),
                backup = %self.store.display(),
                error = %e,
                "failed to restore engine config; backup left in place"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged() -> Vec<PathBuf> {
        vec![PathBuf::from("gui.json"), PathBuf::from("gui.new.json")]
    }

    #[test]
    fn restore_round_trips_contents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("config");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("gui.json"), r#"{"a":1}"#).unwrap();
        std::fs::write(source.join("gui.new.json"), r#"{"b":2}"#).unwrap();

        let store = dir.path().join("backups/run-1");
        let mut backup = ConfigBackup::snapshot(&source, &store, &staged()).unwrap();

        std::fs::write(source.join("gui.json"), r#"{"a":"changed"}"#).unwrap();
        std::fs::write(source.join("gui.new.json"), r#"{"b":"changed"}"#).unwrap();
        backup.restore().unwrap();

        assert_eq!(
            std::fs::read_to_string(source.join("gui.json")).unwrap(),
            r#"{"a":1}"#
        );
        assert_eq!(
            std::fs::read_to_string(source.join("gui.new.json")).unwrap(),
            r#"{"b":2}"#
        );
        assert!(!store.exists());
        assert!(backup.is_restored());
    }

    #[test]
    fn restore_removes_files_that_did_not_exist() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("config");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("gui.json"), "{}").unwrap();

        let store = dir.path().join("backup");
        let mut backup = ConfigBackup::snapshot(&source, &store, &staged()).unwrap();
        std::fs::write(source.join("gui.new.json"), "{\"staged\":true}").unwrap();
        backup.restore().unwrap();

        assert!(source.join("gui.json").exists());
        assert!(!source.join("gui.new.json").exists());
    }

    #[test]
    fn restore_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("config");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("gui.json"), "original").unwrap();

        let mut backup =
            ConfigBackup::snapshot(&source, &dir.path().join("backup"), &staged()).unwrap();
        backup.restore().unwrap();
        std::fs::write(source.join("gui.json"), "edited after restore").unwrap();
        backup.restore().unwrap();

        assert_eq!(
            std::fs::read_to_string(source.join("gui.json")).unwrap(),
            "edited after restore"
        );
    }

    #[test]
    fn missing_source_dir_restores_to_absent_files() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("config");
        let mut backup =
            ConfigBackup::snapshot(&source, &dir.path().join("backup"), &staged()).unwrap();

        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("gui.json"), "{}").unwrap();
        backup.restore().unwrap();

        assert!(!source.join("gui.json").exists());
    }

    #[test]
    fn drop_restores_unrestored_backup() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("config");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("gui.json"), "original").unwrap();

        {
            let _backup =
                ConfigBackup::snapshot(&source, &dir.path().join("backup"), &staged()).unwrap();
            std::fs::write(source.join("gui.json"), "staged").unwrap();
        }

        assert_eq!(
            std::fs::read_to_string(source.join("gui.json")).unwrap(),
            "original"
        );
    }
}
