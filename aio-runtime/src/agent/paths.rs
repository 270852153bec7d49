//! Path safety and atomic writes shared by every agent capability.

use aio_core::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Names are restricted to `[A-Za-z0-9_\-@.]+` plus the required suffix.
pub fn validate_name(name: &str, required_suffix: &str) -> Result<()> {
    if name.is_empty() || !name.ends_with(required_suffix) {
        return Err(Error::invalid_argument(format!(
            "'{name}' must end with '{required_suffix}'"
        )));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '.'));
    if !valid {
        return Err(Error::invalid_argument(format!(
            "'{name}' contains characters outside [A-Za-z0-9_-@.]"
        )));
    }
    Ok(())
}

/// Resolves `name` under `root`, rejecting any path that would escape
/// `root` via a reverse walk (`..` components, or an absolute path).
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(Error::invalid_argument(format!("'{name}' escapes its managed root")));
    }
    Ok(root.join(candidate))
}

/// Atomically writes `content` to `dest`: a same-directory temp file
/// with a random suffix, fsync, chmod, then rename over `dest`.
/// Failure at any step removes the temp file.
pub async fn atomic_write(dest: &Path, content: &[u8], mode: u32) -> Result<()> {
    let dir = dest.parent().ok_or_else(|| Error::invalid_argument("destination has no parent directory"))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::internal(format!("mkdir -p {}: {e}", dir.display())))?;

    let suffix: u64 = rand::random();
    let tmp_path = dir.join(format!(".{}.{suffix:x}.tmp", dest.file_name().unwrap_or_default().to_string_lossy()));

    let result = write_and_rename(&tmp_path, dest, content, mode).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_and_rename(tmp_path: &Path, dest: &Path, content: &[u8], mode: u32) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|e| Error::internal(format!("create {}: {e}", tmp_path.display())))?;
    file.write_all(content)
        .await
        .map_err(|e| Error::internal(format!("write {}: {e}", tmp_path.display())))?;
    file.sync_all().await.map_err(|e| Error::internal(format!("fsync {}: {e}", tmp_path.display())))?;

    set_mode(tmp_path, mode).await?;

    tokio::fs::rename(tmp_path, dest)
        .await
        .map_err(|e| Error::internal(format!("rename {} -> {}: {e}", tmp_path.display(), dest.display())))?;
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms)
        .await
        .map_err(|e| Error::internal(format!("chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// All mutating agent operations refuse to run on non-Linux hosts.
pub fn require_linux() -> Result<()> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        Err(Error::failed_precondition("agent mutating operations require a linux host"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_wrong_suffix() {
        assert!(validate_name("", ".conf").is_err());
        assert!(validate_name("app.service", ".conf").is_err());
    }

    #[test]
    fn rejects_bad_characters() {
        assert!(validate_name("app$.conf", ".conf").is_err());
        assert!(validate_name("my-app_v2@edge.conf", ".conf").is_ok());
    }

    #[test]
    fn resolve_within_rejects_traversal() {
        let root = Path::new("/etc/nginx/conf.d");
        assert!(resolve_within(root, "../../etc/passwd").is_err());
        assert!(resolve_within(root, "/etc/passwd").is_err());
        assert_eq!(resolve_within(root, "app.conf").unwrap(), root.join("app.conf"));
    }

    #[tokio::test]
    async fn atomic_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.conf");
        atomic_write(&dest, b"server {}", 0o644).await.unwrap();
        let read_back = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(read_back, b"server {}");
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A destination whose parent cannot be created (file in the way).
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let dest = blocker.join("app.conf");
        assert!(atomic_write(&dest, b"x", 0o644).await.is_err());
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["blocker".to_string()]);
    }
}
