//! Persistence of analysis results in a cnidarium key/value store.
//!
//! One record per explore, keyed by `analysis/{model}/{explore}` under a
//! fixed namespace. Writes carry an optional expected version so concurrent
//! writers do not clobber each other; reading the current version and
//! passing it back is the caller's job.

use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::AnalysisResult;

const ANALYSIS_PREFIX: &str = "analysis";

fn analysis_key(model: &str, explore: &str) -> String {
    format!("{}/{}/{}", ANALYSIS_PREFIX, model, explore)
}

/// A persisted analysis result with its optimistic-concurrency version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub result: AnalysisResult,
    pub version: u64,
    pub saved_at: i64,
}

/// The stored version moved between read and write.
#[derive(Debug, Error)]
#[error("version conflict for '{key}': expected {expected}, found {found}")]
pub struct VersionConflict {
    pub key: String,
    pub expected: u64,
    pub found: u64,
}

pub struct ArtifactStore {
    storage: Storage,
}

impl ArtifactStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let storage = Storage::load(data_dir.to_path_buf(), vec![ANALYSIS_PREFIX.to_string()])
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }

    /// Upsert the latest analysis for an explore. When `expected_version` is
    /// given it must match the stored version (0 when nothing is stored yet);
    /// a mismatch fails with [`VersionConflict`] and writes nothing. Returns
    /// the new version.
    pub async fn save(
        &self,
        model: &str,
        explore: &str,
        result: &AnalysisResult,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        let key = analysis_key(model, explore);
        let current_version = self
            .load(model, explore)
            .await?
            .map(|stored| stored.version)
            .unwrap_or(0);

        if let Some(expected) = expected_version {
            if expected != current_version {
                return Err(VersionConflict {
                    key,
                    expected,
                    found: current_version,
                }
                .into());
            }
        }

        let record = StoredAnalysis {
            result: result.clone(),
            version: current_version + 1,
            saved_at: chrono::Utc::now().timestamp(),
        };

        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            key.clone(),
            serde_json::to_vec(&record).context("serialize analysis")?,
        );
        self.storage.commit(delta).await?;

        debug!(key = %key, version = record.version, "analysis stored");
        Ok(record.version)
    }

    /// Load the stored analysis for an explore, if any.
    pub async fn load(&self, model: &str, explore: &str) -> Result<Option<StoredAnalysis>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&analysis_key(model, explore)).await? else {
            return Ok(None);
        };
        Ok(Some(
            serde_json::from_slice(&bytes).context("deserialize stored analysis")?,
        ))
    }

    /// All stored analyses for a model, newest first.
    pub async fn list(&self, model: &str) -> Result<Vec<StoredAnalysis>> {
        let snapshot = self.storage.latest_snapshot();
        let prefix = format!("{}/{}/", ANALYSIS_PREFIX, model);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((_key, value)) => match serde_json::from_slice::<StoredAnalysis>(&value) {
                    Ok(stored) => results.push(stored),
                    Err(e) => warn!(error = %e, "skipping undecodable stored analysis"),
                },
                Err(e) => {
                    warn!("Error reading analysis stream: {}", e);
                }
            }
        }

        results.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(results)
    }

    /// Remove the stored analysis for an explore.
    pub async fn delete(&self, model: &str, explore: &str) -> Result<()> {
        let key = analysis_key(model, explore);
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.delete(key.clone());
        self.storage.commit(delta).await?;
        debug!(key = %key, "analysis deleted");
        Ok(())
    }
}
