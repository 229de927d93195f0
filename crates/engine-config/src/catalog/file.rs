use crate::{catalog::JobCatalog, error::ConfigurationError, validation::validate_job};
use async_trait::async_trait;
use model::execution::job::JobSpec;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

struct CachedJob {
    spec: JobSpec,
    modified: SystemTime,
}

/// One `<job>.json` per job in a directory.
///
/// Definitions are cached and re-read when the file's modification time is newer
/// than the cached one, so edits are picked up by the next run without a restart.
pub struct FileJobCatalog {
    dir: PathBuf,
    cache: RwLock<HashMap<String, CachedJob>>,
}

impl FileJobCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !name.starts_with('.');
        valid.then(|| self.dir.join(format!("{name}.json")))
    }

    async fn load(&self, name: &str, path: &Path) -> Result<JobSpec, ConfigurationError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigurationError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let spec: JobSpec =
            serde_json::from_str(&content).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if spec.name != name {
            return Err(ConfigurationError::Invalid {
                job: name.to_string(),
                reason: format!("file declares job name '{}'", spec.name),
            });
        }

        validate_job(&spec)?;
        Ok(spec)
    }
}

#[async_trait]
impl JobCatalog for FileJobCatalog {
    async fn job(&self, name: &str) -> Result<JobSpec, ConfigurationError> {
        let path = self
            .path_for(name)
            .ok_or_else(|| ConfigurationError::UnknownJob(name.to_string()))?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigurationError::UnknownJob(name.to_string()));
            }
            Err(source) => return Err(ConfigurationError::Io { path, source }),
        };
        let modified = metadata
            .modified()
            .map_err(|source| ConfigurationError::Io {
                path: path.clone(),
                source,
            })?;

        if let Some(cached) = self.cache.read().await.get(name)
            && cached.modified >= modified
        {
            debug!(job = %name, "Using cached job definition");
            return Ok(cached.spec.clone());
        }

        let spec = self.load(name, &path).await?;
        info!(job = %name, path = %path.display(), "Loaded job definition");

        self.cache.write().await.insert(
            name.to_string(),
            CachedJob {
                spec: spec.clone(),
                modified,
            },
        );
        Ok(spec)
    }

    async fn job_names(&self) -> Result<Vec<String>, ConfigurationError> {
        let io_err = |source| ConfigurationError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}
