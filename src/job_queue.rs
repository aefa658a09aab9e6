//! In-memory async job lifecycle (C7): crawl/batch/extract jobs, progress,
//! cancellation, expiry, and the event feed that `webhook.rs` delivers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::webhook::{WebhookConfig, WebhookEvent, WebhookSender};

const ACTIVE_TTL: Duration = Duration::from_secs(25 * 60 * 60);
const TERMINAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Crawl,
    Batch,
    Extract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub total: u64,
    pub completed: u64,
    pub credits_used: u64,
    pub data: Vec<serde_json::Value>,
    pub error: Option<String>,
    pub webhook: Option<WebhookConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Job {
    fn new(id: Uuid, job_type: JobType, webhook: Option<WebhookConfig>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            total: 0,
            completed: 0,
            credits_used: 0,
            data: Vec::new(),
            error: None,
            webhook,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::from_std(ACTIVE_TTL).expect("fits in range"),
        }
    }

    /// `progress = round(100 * completed / total)`, rounded half-up via
    /// integer arithmetic (`(2*n + d) / (2*d)` avoids floating point).
    fn recompute_progress(&mut self) {
        if self.total > 0 {
            let numerator = u128::from(self.completed) * 200 + u128::from(self.total);
            let denominator = u128::from(self.total) * 2;
            self.progress = ((numerator / denominator).min(100)) as u8;
        }
    }
}

/// A patch applied via `JobQueue::update`; absent fields leave the job
/// field unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub credits_used: Option<u64>,
    pub push_data: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

pub struct JobQueue {
    jobs: Arc<DashMap<Uuid, Job>>,
    webhook: Arc<WebhookSender>,
    sweeper: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl JobQueue {
    #[must_use]
    pub fn new(webhook: Arc<WebhookSender>) -> Self {
        Self { jobs: Arc::new(DashMap::new()), webhook, sweeper: tokio::sync::Mutex::new(None) }
    }

    /// Starts the hourly expiry sweeper.
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                this.clean_expired();
            }
        });
        *self.sweeper.lock().await = Some(handle);
    }

    pub fn create(&self, job_type: JobType, webhook: Option<WebhookConfig>) -> Job {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job = Job::new(id, job_type, webhook.clone(), now);
        self.jobs.insert(id, job.clone());

        if let Some(cfg) = &webhook {
            self.webhook.enqueue(cfg.clone(), id, WebhookEvent::Started, None);
        }
        job
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|j| j.clone())
    }

    pub fn update(&self, id: Uuid, patch: JobPatch) -> Option<Job> {
        let mut entry = self.jobs.get_mut(&id)?;
        let now = Utc::now();

        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(total) = patch.total {
            entry.total = total;
        }
        if let Some(completed) = patch.completed {
            entry.completed = completed;
        }
        if let Some(credits) = patch.credits_used {
            entry.credits_used = credits;
        }
        if let Some(item) = patch.push_data {
            entry.data.push(item);
        }
        if let Some(error) = patch.error {
            entry.error = Some(error);
        }

        entry.recompute_progress();
        entry.updated_at = now;

        if entry.status.is_terminal() {
            entry.expires_at = now + chrono::Duration::from_std(TERMINAL_TTL).expect("fits in range");
        }

        let snapshot = entry.clone();
        drop(entry);

        if let Some(cfg) = &snapshot.webhook {
            let event = match snapshot.status {
                JobStatus::Completed => Some(WebhookEvent::Completed),
                JobStatus::Failed => Some(WebhookEvent::Failed),
                JobStatus::Processing => Some(WebhookEvent::Page),
                _ => None,
            };
            if let Some(event) = event {
                self.webhook.enqueue(cfg.clone(), id, event, snapshot.data.last().cloned());
            }
        }

        Some(snapshot)
    }

    /// Cancels from `{queued, processing}` only; returns `false` for
    /// terminal states or an unknown job (at most one concurrent cancel on
    /// the same job observes `true`, guaranteed by `DashMap`'s per-shard
    /// locking on `get_mut`).
    pub fn cancel(&self, id: Uuid) -> bool {
        let Some(mut entry) = self.jobs.get_mut(&id) else { return false };
        if entry.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        entry.status = JobStatus::Cancelled;
        entry.updated_at = now;
        entry.expires_at = now + chrono::Duration::from_std(TERMINAL_TTL).expect("fits in range");
        true
    }

    #[must_use]
    pub fn list(&self, filter: ListFilter) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| filter.job_type.map(|t| t == j.job_type).unwrap_or(true))
            .filter(|j| filter.status.map(|s| s == j.status).unwrap_or(true))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        jobs
    }

    /// Removes jobs whose `expires_at` is in the past.
    pub fn clean_expired(&self) {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|e| e.expires_at < now)
            .map(|e| *e.key())
            .collect();
        for id in &expired {
            self.jobs.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired jobs");
        }
    }

    /// Explicit teardown: stops the sweeper and drops all jobs.
    pub async fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.jobs.clear();
        info!("job queue destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(WebhookSender::new(reqwest::Client::new())))
    }

    #[test]
    fn progress_matches_completed_over_total() {
        let q = queue();
        let job = q.create(JobType::Crawl, None);
        q.update(job.id, JobPatch { total: Some(10), completed: Some(3), ..Default::default() });
        let updated = q.get(job.id).unwrap();
        assert_eq!(updated.progress, 30);
    }

    #[test]
    fn progress_rounds_to_nearest_not_floor() {
        let q = queue();
        let job = q.create(JobType::Crawl, None);
        q.update(job.id, JobPatch { total: Some(3), completed: Some(2), ..Default::default() });
        let updated = q.get(job.id).unwrap();
        assert_eq!(updated.progress, 67);
    }

    #[test]
    fn cancel_from_queued_succeeds_once() {
        let q = queue();
        let job = q.create(JobType::Batch, None);
        assert!(q.cancel(job.id));
        assert!(!q.cancel(job.id));
    }

    #[test]
    fn cancel_from_terminal_state_fails() {
        let q = queue();
        let job = q.create(JobType::Extract, None);
        q.update(job.id, JobPatch { status: Some(JobStatus::Completed), ..Default::default() });
        assert!(!q.cancel(job.id));
    }

    #[test]
    fn terminal_transition_resets_expiry_to_24h() {
        let q = queue();
        let job = q.create(JobType::Crawl, None);
        let before = q.get(job.id).unwrap().expires_at;
        q.update(job.id, JobPatch { status: Some(JobStatus::Completed), ..Default::default() });
        let after = q.get(job.id).unwrap().expires_at;
        assert!(after < before);
    }

    #[test]
    fn list_orders_by_created_at_descending() {
        let q = queue();
        let first = q.create(JobType::Crawl, None);
        let second = q.create(JobType::Crawl, None);
        let listed = q.list(ListFilter::default());
        assert_eq!(listed.first().map(|j| j.id), Some(second.id));
        assert_eq!(listed.last().map(|j| j.id), Some(first.id));
    }
}
