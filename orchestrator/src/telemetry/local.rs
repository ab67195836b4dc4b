use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::TelemetryError;

const FILE_PREFIX: &str = "trip_planner";

/// Append-only JSONL files, one per UTC day.
#[derive(Debug, Clone)]
pub struct LocalLog {
    dir: PathBuf,
}

impl LocalLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}_{}.jsonl", date.format("%Y%m%d")))
    }

    /// Writes the record as one complete line in a single write call.
    pub async fn append<T: Serialize>(&self, record: &T, date: NaiveDate) -> Result<(), TelemetryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(date))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
