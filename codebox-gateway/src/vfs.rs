//! Disk-side half of the per-user virtual filesystem (§4.G). The gateway
//! is the disk- and docker-facing process, so it owns on-disk content
//! directly; `codebox_protocol::tree::FileTree` owns the structural/order
//! half and is kept in the backend's key/value store. Every operation
//! here has a tree-side counterpart that the caller (`session::Session`)
//! is responsible for keeping in lockstep, per the invariant that disk
//! and tree never diverge (§3).

use std::fs;
use std::path::{Path, PathBuf};

use codebox_protocol::tree::ValidPath;
use codebox_protocol::user::storage_dir_name_for_id;

/// Resolves `<base>/user_<ID>/`, matching the source's
/// `UserStorage.user_folder_name`.
pub fn user_root(base: &Path, user_id: u64) -> PathBuf {
    base.join(storage_dir_name_for_id(user_id))
}

pub fn ensure_user_root(base: &Path, user_id: u64) -> std::io::Result<PathBuf> {
    let root = user_root(base, user_id);
    fs::create_dir_all(&root)?;
    Ok(root)
}

pub fn create_file(root: &Path, path: &ValidPath) -> std::io::Result<()> {
    fs::write(root.join(path.as_disk_relative()), b"")
}

pub fn create_dir(root: &Path, path: &ValidPath) -> std::io::Result<()> {
    fs::create_dir(root.join(path.as_disk_relative()))
}

pub fn delete(root: &Path, path: &ValidPath) -> std::io::Result<()> {
    let full = root.join(path.as_disk_relative());
    if full.is_dir() {
        fs::remove_dir(&full)
    } else {
        fs::remove_file(&full)
    }
}

pub fn read_file(root: &Path, path: &ValidPath) -> std::io::Result<String> {
    fs::read_to_string(root.join(path.as_disk_relative()))
}

pub fn write_file(root: &Path, path: &ValidPath, content: &str) -> std::io::Result<()> {
    fs::write(root.join(path.as_disk_relative()), content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = ensure_user_root(dir.path(), 5).unwrap();
        assert!(root.ends_with("user_005"));

        let path = ValidPath::parse("a.py").unwrap();
        create_file(&root, &path).unwrap();
        write_file(&root, &path, "print('hi')").unwrap();
        assert_eq!(read_file(&root, &path).unwrap(), "print('hi')");
    }

    #[test]
    fn create_dir_then_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = ensure_user_root(dir.path(), 5).unwrap();

        create_dir(&root, &ValidPath::parse("sub").unwrap()).unwrap();
        let nested = ValidPath::parse("sub/b.py").unwrap();
        create_file(&root, &nested).unwrap();
        write_file(&root, &nested, "x = 1").unwrap();
        assert_eq!(read_file(&root, &nested).unwrap(), "x = 1");
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = ensure_user_root(dir.path(), 5).unwrap();
        let path = ValidPath::parse("a.py").unwrap();
        create_file(&root, &path).unwrap();
        delete(&root, &path).unwrap();
        assert!(read_file(&root, &path).is_err());
    }
}
