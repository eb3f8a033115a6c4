use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes one JSON artifact per model exchange into a fixed directory.
#[derive(Debug, Clone)]
pub struct DebugLogStore {
    dir: PathBuf,
}

impl DebugLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serializes `record` to a new file and returns its path.
    ///
    /// The directory is created on demand. File names combine a microsecond timestamp with
    /// a random suffix, and the file is opened with `create_new`, so an existing artifact
    /// is never overwritten.
    pub fn store<T: Serialize + ?Sized>(&self, record: &T) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create debug log dir {}", self.dir.display()))?;

        let body = serde_json::to_vec_pretty(record).context("failed to serialize debug log")?;

        let path = self.dir.join(file_name());
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create debug log {}", path.display()))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("failed to write debug log {}", path.display()))?;

        tracing::debug!(event = "debug_log.stored", path = %path.display(), bytes = body.len());
        Ok(path)
    }
}

fn file_name() -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("debug_log_{}_{}.json", ts, &suffix[..8])
}
