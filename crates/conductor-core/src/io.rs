use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents the engine from ever reading a half-written configuration file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// Recursively copy the regular files under `src` into `dst`, creating `dst`.
///
/// Returns the copied paths relative to `src`, sorted. Existing files in `dst`
/// are overwritten; files that exist only in `dst` are left alone.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    copy_tree_inner(src, dst, Path::new(""), &mut copied)?;
    copied.sort();
    Ok(copied)
}

fn copy_tree_inner(src: &Path, dst: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    std::fs::create_dir_all(dst.join(rel))?;
    for entry in std::fs::read_dir(src.join(rel))? {
        let entry = entry?;
        let name = rel.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree_inner(src, dst, &name, out)?;
        } else if file_type.is_file() {
            let data = std::fs::read(entry.path())?;
            atomic_write(&dst.join(&name), &data)?;
            out.push(name);
        }
    }
    Ok(())
}

/// Remove a directory tree if it exists. Returns true if something was removed.
pub fn remove_tree_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gui.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/gui.json");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn write_if_missing_skips_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, b"original").unwrap();
        assert!(!write_if_missing(&path, b"new").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("config");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("gui.json"), "a").unwrap();
        std::fs::write(src.join("nested/extra.json"), "b").unwrap();

        let dst = dir.path().join("backup");
        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(
            copied,
            vec![PathBuf::from("gui.json"), PathBuf::from("nested/extra.json")]
        );
        assert_eq!(std::fs::read_to_string(dst.join("gui.json")).unwrap(), "a");
        assert_eq!(
            std::fs::read_to_string(dst.join("nested/extra.json")).unwrap(),
            "b"
        );
    }

    #[test]
    fn copy_tree_of_empty_dir_creates_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("empty");
        std::fs::create_dir_all(&src).unwrap();
        let dst = dir.path().join("out");
        assert!(copy_tree(&src, &dst).unwrap().is_empty());
        assert!(dst.is_dir());
    }

    #[test]
    fn remove_tree_if_exists_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("gone");
        std::fs::create_dir_all(target.join("x")).unwrap();
        assert!(remove_tree_if_exists(&target).unwrap());
        assert!(!remove_tree_if_exists(&target).unwrap());
    }
}
