//! Per-artifact stage status records.
//!
//! Each expensive artifact gets a small `<artifact>.status.json` sidecar
//! recording whether its producing stage is in progress, done or failed.
//! This removes the ambiguity of empty sentinel files between "started
//! and crashed" and "genuinely empty result".

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Lifecycle of an artifact-producing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    Done,
    Failed,
}

/// Status record persisted next to an artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub stage: String,
    pub status: StageStatus,
    /// ISO 8601 timestamp of the last status transition.
    pub updated: String,
}

impl StatusRecord {
    /// The sidecar path for an artifact.
    #[must_use]
    pub fn path_for(artifact: &Path) -> PathBuf {
        let mut name = artifact
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        name.push_str(".status.json");
        artifact.with_file_name(name)
    }

    /// Reads the status for an artifact, `NotStarted` when no sidecar
    /// exists or it cannot be parsed.
    #[must_use]
    pub fn load(artifact: &Path) -> StageStatus {
        let path = Self::path_for(artifact);
        fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<Self>(&s).ok())
            .map_or(StageStatus::NotStarted, |r| r.status)
    }

    /// Writes the status sidecar for an artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar cannot be written.
    pub fn store(artifact: &Path, stage: &str, status: StageStatus) -> std::io::Result<()> {
        let record = Self {
            stage: stage.to_string(),
            status,
            updated: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(Self::path_for(artifact), json)
    }

    /// Removes the sidecar, ignoring a missing file.
    pub fn clear(artifact: &Path) {
        let _ = fs::remove_file(Self::path_for(artifact));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sidecar_reads_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("households.csv");
        assert_eq!(StatusRecord::load(&artifact), StageStatus::NotStarted);
    }

    #[test]
    fn store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("households.csv");
        StatusRecord::store(&artifact, "prep", StageStatus::InProgress).unwrap();
        assert_eq!(StatusRecord::load(&artifact), StageStatus::InProgress);
        StatusRecord::store(&artifact, "prep", StageStatus::Done).unwrap();
        assert_eq!(StatusRecord::load(&artifact), StageStatus::Done);
        StatusRecord::clear(&artifact);
        assert_eq!(StatusRecord::load(&artifact), StageStatus::NotStarted);
    }
}
