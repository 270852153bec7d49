//! SSL material deployment.

use super::paths::{self, atomic_write};
use aio_core::{Error, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_MODE: u32 = 0o600;

pub async fn deploy_certificate(
    base_path: &str,
    fullchain_name: &str,
    privkey_name: &str,
    fullchain_pem: &str,
    privkey_pem: &str,
    file_mode: u32,
) -> Result<(PathBuf, PathBuf)> {
    paths::require_linux()?;
    let base = Path::new(base_path);
    tokio::fs::create_dir_all(base)
        .await
        .map_err(|e| Error::internal(format!("mkdir -p {}: {e}", base.display())))?;

    // No fixed suffix is mandated for cert/key file names, but they
    // still go through the same name-character and root-escape checks
    // every other managed root enforces.
    paths::validate_name(fullchain_name, "")?;
    paths::validate_name(privkey_name, "")?;
    let fullchain_path = paths::resolve_within(base, fullchain_name)?;
    let privkey_path = paths::resolve_within(base, privkey_name)?;

    let mode = if file_mode == 0 { DEFAULT_FILE_MODE } else { file_mode };

    atomic_write(&fullchain_path, fullchain_pem.as_bytes(), mode).await?;
    atomic_write(&privkey_path, privkey_pem.as_bytes(), mode).await?;

    Ok((fullchain_path, privkey_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deploys_both_files_with_default_mode() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("live/example.com");
        let (fullchain, privkey) = deploy_certificate(
            base.to_str().unwrap(),
            "fullchain.pem",
            "privkey.pem",
            "FULLCHAIN",
            "PRIVKEY",
            0,
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read_to_string(&fullchain).await.unwrap(), "FULLCHAIN");
        assert_eq!(tokio::fs::read_to_string(&privkey).await.unwrap(), "PRIVKEY");
    }

    #[tokio::test]
    async fn rejects_names_that_escape_the_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("live/example.com");
        let err = deploy_certificate(
            base.to_str().unwrap(),
            "../../../etc/ssh/foo",
            "privkey.pem",
            "FULLCHAIN",
            "PRIVKEY",
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!base.join("../../../etc/ssh/foo").exists());
    }
}
