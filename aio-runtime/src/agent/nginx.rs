//! Nginx conf.d management: validate-then-activate with rollback.

use super::command::{self, DEFAULT_TIMEOUT};
use super::paths::{self, atomic_write};
use aio_core::{Error, Result};
use std::path::PathBuf;

pub const NAME_SUFFIX: &str = ".conf";
pub const DEFAULT_MODE: u32 = 0o644;

pub struct NginxEngine {
    pub root: PathBuf,
    pub validator: (String, Vec<String>),
    pub reload_cmd: (String, Vec<String>),
}

impl Default for NginxEngine {
    fn default() -> Self {
        NginxEngine {
            root: PathBuf::from("/etc/nginx/conf.d"),
            validator: ("nginx".to_string(), vec!["-t".to_string()]),
            reload_cmd: ("nginx".to_string(), vec!["-s".to_string(), "reload".to_string()]),
        }
    }
}

impl NginxEngine {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        paths::validate_name(name, NAME_SUFFIX)?;
        paths::resolve_within(&self.root, name)
    }

    pub async fn validate(&self) -> Result<(bool, String)> {
        let argv: Vec<&str> = self.validator.1.iter().map(String::as_str).collect();
        let out = command::run(&self.validator.0, &argv, DEFAULT_TIMEOUT).await?;
        let combined = format!("{}{}", out.stdout, out.stderr);
        Ok((out.status_ok, combined))
    }

    pub async fn reload(&self) -> Result<String> {
        let argv: Vec<&str> = self.reload_cmd.1.iter().map(String::as_str).collect();
        let out = command::run(&self.reload_cmd.0, &argv, DEFAULT_TIMEOUT).await?;
        if !out.status_ok {
            return Err(Error::internal(format!("nginx reload failed: {}", out.stderr)));
        }
        Ok(format!("{}{}", out.stdout, out.stderr))
    }

    pub async fn put(&self, name: &str, content: &str, validate: bool, reload: bool) -> Result<PathBuf> {
        paths::require_linux()?;
        let path = self.resolve(name)?;
        let previous = tokio::fs::read(&path).await.ok();

        atomic_write(&path, content.as_bytes(), DEFAULT_MODE).await?;

        if validate {
            let (ok, output) = self.validate().await?;
            if !ok {
                let rollback = match &previous {
                    Some(bytes) => atomic_write(&path, bytes, DEFAULT_MODE).await,
                    None => tokio::fs::remove_file(&path).await.map_err(|e| Error::internal(e.to_string())),
                };
                return Err(match rollback {
                    Ok(()) => Error::failed_precondition(format!("nginx validation failed: {output}")),
                    Err(e) => Error::internal(format!("nginx validation failed: {output}; rollback also failed: {e}")),
                });
            }
        }
        if reload {
            self.reload().await?;
        }
        Ok(path)
    }

    pub async fn delete(&self, name: &str, validate: bool, reload: bool) -> Result<()> {
        paths::require_linux()?;
        let path = self.resolve(name)?;
        let previous = tokio::fs::read(&path)
            .await
            .map_err(|_| Error::not_found(format!("nginx config '{name}'")))?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::internal(format!("remove {}: {e}", path.display())))?;

        if validate {
            let (ok, output) = self.validate().await?;
            if !ok {
                return Err(match atomic_write(&path, &previous, DEFAULT_MODE).await {
                    Ok(()) => Error::failed_precondition(format!("nginx validation failed: {output}")),
                    Err(e) => Error::internal(format!("nginx validation failed: {output}; rollback also failed: {e}")),
                });
            }
        }
        if reload {
            self.reload().await?;
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| Error::not_found(format!("nginx config '{name}'")))?;
        String::from_utf8(bytes).map_err(|e| Error::internal(format!("non-utf8 nginx config: {e}")))
    }

    pub async fn list(&self, keyword: Option<&str>) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::internal(format!("read_dir {}: {e}", self.root.display())))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::internal(format!("read_dir entry: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(NAME_SUFFIX) {
                continue;
            }
            if keyword.is_some_and(|k| !name.contains(k)) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_root(root: PathBuf) -> NginxEngine {
        NginxEngine {
            root,
            validator: ("true".to_string(), vec![]),
            reload_cmd: ("true".to_string(), vec![]),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_root(dir.path().to_path_buf());
        engine.put("app.conf", "server {}", true, false).await.unwrap();
        assert_eq!(engine.get("app.conf").await.unwrap(), "server {}");
    }

    #[tokio::test]
    async fn failed_validation_rolls_back_to_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_root(dir.path().to_path_buf());
        engine.put("app.conf", "v1", false, false).await.unwrap();

        engine.validator = ("false".to_string(), vec![]);
        let err = engine.put("app.conf", "v2-bad", true, false).await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
        assert_eq!(engine.get("app.conf").await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn failed_validation_on_new_file_leaves_it_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_root(dir.path().to_path_buf());
        engine.validator = ("false".to_string(), vec![]);
        let err = engine.put("new.conf", "v1", true, false).await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
        assert!(engine.get("new.conf").await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_keyword_and_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_root(dir.path().to_path_buf());
        engine.put("api.conf", "a", false, false).await.unwrap();
        engine.put("web.conf", "b", false, false).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "x").await.unwrap();

        let all = engine.list(None).await.unwrap();
        assert_eq!(all, vec!["api.conf".to_string(), "web.conf".to_string()]);

        let filtered = engine.list(Some("api")).await.unwrap();
        assert_eq!(filtered, vec!["api.conf".to_string()]);
    }

    #[test]
    fn resolve_rejects_wrong_suffix_and_traversal() {
        let engine = engine_with_root(PathBuf::from("/etc/nginx/conf.d"));
        assert!(engine.resolve("app.service").is_err());
        assert!(engine.resolve("../evil.conf").is_err());
    }
}
