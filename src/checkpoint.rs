//! Crawl checkpointer (C8): deterministic job-id derivation and resumable
//! crawl snapshots persisted as JSON under a per-user data directory.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub status: u16,
    pub content_length: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    pub job_id: String,
    pub start_url: String,
    pub completed: HashMap<String, CompletedEntry>,
    pub pending: Vec<String>,
    pub discovered: Vec<String>,
    pub options: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub last_checkpoint: DateTime<Utc>,
    pub max_pages: u64,
}

/// Stable digest of `(startUrl, canonicalized options JSON)`: deterministic
/// (equal inputs produce equal ids) and distinguishing (different inputs
/// produce different ids with cryptographic probability).
#[must_use]
pub fn generate_job_id(start_url: &str, options: &serde_json::Value) -> String {
    let canonical = canonicalize_json(options);
    let mut hasher = Sha256::new();
    hasher.update(start_url.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Produces a stable string form of `value` with object keys sorted
/// recursively, so key-order differences in the input do not change the id.
fn canonicalize_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted = serde_json::Map::new();
                for (k, v) in entries {
                    sorted.insert(k.clone(), sort(v));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

pub struct Checkpointer {
    root: PathBuf,
}

impl Checkpointer {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default root: `~/.webpeel/checkpoints/`.
    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".webpeel")
            .join("checkpoints")
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }

    /// Persists `checkpoint`. Failures are non-fatal (logged) per section 4.8.
    pub async fn save(&self, checkpoint: &CrawlCheckpoint) {
        if let Err(err) = self.try_save(checkpoint).await {
            warn!(job_id = %checkpoint.job_id, %err, "checkpoint save failed");
        }
    }

    async fn try_save(&self, checkpoint: &CrawlCheckpoint) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let body = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(self.path_for(&checkpoint.job_id), body).await?;
        Ok(())
    }

    pub async fn load(&self, job_id: &str) -> Option<CrawlCheckpoint> {
        let body = tokio::fs::read(self.path_for(job_id)).await.ok()?;
        serde_json::from_slice(&body).ok()
    }

    /// Idempotent: deleting a missing checkpoint is not an error.
    pub async fn delete(&self, job_id: &str) {
        match tokio::fs::remove_file(self.path_for(job_id)).await {
            Ok(()) | Err(_) => {}
        }
    }

    pub async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else { return ids };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    ids.push(stem.to_string());
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_job_id_is_16_hex_chars() {
        let id = generate_job_id("https://example.com", &serde_json::json!({"maxPages": 10}));
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn equal_inputs_produce_equal_ids() {
        let a = generate_job_id("https://example.com", &serde_json::json!({"maxPages": 10}));
        let b = generate_job_id("https://example.com", &serde_json::json!({"maxPages": 10}));
        assert_eq!(a, b);
    }

    #[test]
    fn changing_options_changes_the_id() {
        let a = generate_job_id("https://example.com", &serde_json::json!({"maxPages": 10}));
        let b = generate_job_id("https://example.com", &serde_json::json!({"maxPages": 20}));
        assert_ne!(a, b);
    }

    #[test]
    fn key_order_does_not_change_the_id() {
        let a = generate_job_id("https://example.com", &serde_json::json!({"a": 1, "b": 2}));
        let b = generate_job_id("https://example.com", &serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_completed_map_and_orderings() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().to_path_buf());

        let mut completed = HashMap::new();
        completed.insert(
            "https://example.com/a".to_string(),
            CompletedEntry { status: 200, content_length: 123, timestamp: Utc::now() },
        );

        let checkpoint = CrawlCheckpoint {
            job_id: "abc123".to_string(),
            start_url: "https://example.com".to_string(),
            completed,
            pending: vec!["https://example.com/b".into(), "https://example.com/c".into()],
            discovered: vec!["https://example.com/d".into()],
            options: serde_json::json!({"maxPages": 5}),
            started_at: Utc::now(),
            last_checkpoint: Utc::now(),
            max_pages: 5,
        };

        checkpointer.save(&checkpoint).await;
        let loaded = checkpointer.load("abc123").await.unwrap();

        assert_eq!(loaded.completed.len(), checkpoint.completed.len());
        assert_eq!(loaded.pending, checkpoint.pending);
        assert_eq!(loaded.discovered, checkpoint.discovered);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().to_path_buf());
        checkpointer.delete("missing").await;
        checkpointer.delete("missing").await;
    }
}
