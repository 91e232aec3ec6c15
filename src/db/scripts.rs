//! Stored SQL scripts.
//!
//! Data sources reference scripts by name. `FileScriptSource` reads them from a
//! directory and keeps them in a moka cache; every lookup compares the cached
//! modification time with the file on disk, so edited scripts are picked up
//! without a restart. Entries nobody asks for are evicted after the idle TTL.

use crate::config::DEFAULT_SCRIPT_CACHE_CAPACITY;
use crate::error::{ExportError, ExportResult};
use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::debug;

/// Source of SQL script text by name.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn load(&self, name: &str) -> ExportResult<String>;
}

/// Scripts held in memory.
#[derive(Debug, Default, Clone)]
pub struct StaticScripts {
    scripts: HashMap<String, String>,
}

impl StaticScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), sql.into());
        self
    }
}

#[async_trait]
impl ScriptSource for StaticScripts {
    async fn load(&self, name: &str) -> ExportResult<String> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| missing_script(name))
    }
}

fn missing_script(name: &str) -> ExportError {
    ExportError::data_fetch(
        format!("Script '{}' not found", name),
        "Check the script name in the data source and the scripts directory",
    )
}

#[derive(Clone)]
struct CachedScript {
    modified: Option<SystemTime>,
    sql: Arc<str>,
}

/// Scripts loaded from `<dir>/<name>`; `.sql` is appended when missing.
pub struct FileScriptSource {
    dir: PathBuf,
    cache: Cache<String, CachedScript>,
}

impl FileScriptSource {
    pub fn new(dir: impl Into<PathBuf>, idle_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(DEFAULT_SCRIPT_CACHE_CAPACITY)
            .time_to_idle(idle_ttl)
            .build();

        Self {
            dir: dir.into(),
            cache,
        }
    }

    /// Map a script name to a path inside the scripts directory.
    ///
    /// Names must be relative and may not climb out of the directory.
    fn script_path(&self, name: &str) -> ExportResult<PathBuf> {
        let name = name.trim();
        let invalid = name.is_empty()
            || Path::new(name)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if invalid {
            return Err(ExportError::data_fetch(
                format!("Invalid script name '{}'", name),
                "Use a file name relative to the scripts directory",
            ));
        }

        let file_name = if name.ends_with(".sql") {
            name.to_string()
        } else {
            format!("{}.sql", name)
        };
        Ok(self.dir.join(file_name))
    }
}

#[async_trait]
impl ScriptSource for FileScriptSource {
    async fn load(&self, name: &str) -> ExportResult<String> {
        let path = self.script_path(name)?;
        let key = path.to_string_lossy().into_owned();

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.cache.invalidate(&key).await;
                return Err(missing_script(name));
            }
            Err(e) => {
                return Err(ExportError::data_fetch(
                    format!("Failed to read script '{}': {}", name, e),
                    "Check permissions on the scripts directory",
                ));
            }
        };
        let modified = metadata.modified().ok();

        if let Some(cached) = self.cache.get(&key).await {
            if cached.modified.is_some() && cached.modified == modified {
                debug!(script = %name, "Script cache hit");
                return Ok(cached.sql.to_string());
            }
            debug!(script = %name, "Script changed on disk, reloading");
        }

        let sql = fs::read_to_string(&path).await.map_err(|e| {
            ExportError::data_fetch(
                format!("Failed to read script '{}': {}", name, e),
                "Check that the script is readable UTF-8 text",
            )
        })?;

        self.cache
            .insert(
                key,
                CachedScript {
                    modified,
                    sql: Arc::from(sql.as_str()),
                },
            )
            .await;
        debug!(script = %name, path = %path.display(), "Script loaded");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn write_script(path: &Path, sql: &str, mtime_secs: u64) {
        std::fs::write(path, sql).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_static_scripts() {
        let scripts = StaticScripts::new().with_script("orders", "SELECT 1");
        assert_eq!(scripts.load("orders").await.unwrap(), "SELECT 1");
        assert!(scripts.load("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_file_script_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_script(&dir.path().join("orders.sql"), "SELECT id FROM orders", 1_000);

        let source = FileScriptSource::new(dir.path(), Duration::from_secs(60));
        assert_eq!(source.load("orders").await.unwrap(), "SELECT id FROM orders");
        assert_eq!(source.load("orders.sql").await.unwrap(), "SELECT id FROM orders");
    }

    #[tokio::test]
    async fn test_file_script_reloads_when_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.sql");
        write_script(&path, "SELECT 1", 1_000);

        let source = FileScriptSource::new(dir.path(), Duration::from_secs(60));
        assert_eq!(source.load("orders").await.unwrap(), "SELECT 1");

        write_script(&path, "SELECT 2", 2_000);
        assert_eq!(source.load("orders").await.unwrap(), "SELECT 2");
    }

    #[tokio::test]
    async fn test_file_script_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileScriptSource::new(dir.path(), Duration::from_secs(60));
        let err = source.load("nope").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_file_script_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileScriptSource::new(dir.path(), Duration::from_secs(60));
        assert!(source.load("../secret").await.is_err());
        assert!(source.load("/etc/passwd").await.is_err());
        assert!(source.load("  ").await.is_err());
    }
}
