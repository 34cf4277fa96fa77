//! Durable job queue: primary job table plus an availability-ordered index.
//!
//! The jobs table is keyed by canonical job id. The secondary index holds one
//! entry per queued job, keyed `pad(available_at) || "-" || id`, so the first
//! index key is always the next eligible job. Claims remove the index entry
//! and flip the job to processing inside one atomic group; two overlapping
//! claims can never both win, because the group's conditional delete commits
//! for exactly one of them. First submissions create the record through a
//! conditional insert in the same group as the index entry, so overlapping
//! submissions of one id cannot each plant an index entry; claim additionally
//! refuses (and drops) any index entry whose job is not queued.

use std::sync::Arc;

use serde_json::Value;

use crate::config::DEFAULT_TIMESTAMP_PAD_LENGTH;
use crate::core::job::{Job, JobStatus};
use crate::core::types::{now_ms, JobId};
use crate::storage::{
    ordered_key, parse_key_suffix, parse_key_timestamp, StorageError, Store, WriteBatch,
};

/// Table holding job records keyed by canonical id.
const JOBS_TABLE: &str = "jobs";
/// Ordered secondary index over queued jobs.
const INDEX_TABLE: &str = "queue-index";

/// Result of a submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The created, reset, or already-present job record.
    pub job: Job,
    /// True when a live record already existed and nothing was mutated.
    pub is_duplicate: bool,
}

/// The durable job queue.
pub struct Queue {
    store: Arc<dyn Store>,
    pad_width: usize,
}

impl Queue {
    /// Create a queue over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pad_width: DEFAULT_TIMESTAMP_PAD_LENGTH,
        }
    }

    /// Set the timestamp pad width used for index keys.
    pub fn with_pad_width(mut self, width: usize) -> Self {
        self.pad_width = width;
        self
    }

    /// Submit a research request.
    ///
    /// Deduplicates on the canonical id: a live record (any status but
    /// failed) is returned as-is with `is_duplicate = true`. A failed record
    /// is reset to a fresh queued job; otherwise a new record is created.
    pub async fn submit(&self, name: &str) -> Result<SubmitOutcome, StorageError> {
        self.submit_at(name, now_ms()).await
    }

    /// [`Queue::submit`] with an explicit current timestamp.
    pub async fn submit_at(&self, name: &str, now: u64) -> Result<SubmitOutcome, StorageError> {
        let id = JobId::from_name(name);
        let existing = self.load(&id).await?;
        if let Some(job) = &existing {
            if job.status != JobStatus::Failed {
                return Ok(SubmitOutcome {
                    job: job.clone(),
                    is_duplicate: true,
                });
            }
        }

        let job = Job::new(name, now);
        let mut batch = WriteBatch::new();
        if existing.is_some() {
            // Resetting a failed record. A racing reset can leave an extra
            // index entry behind; claim drops it when it finds the job no
            // longer queued.
            batch.put(JOBS_TABLE, job.id.as_str(), encode(&job)?);
        } else {
            // First submission: the conditional insert serializes concurrent
            // creators, so only one index entry can ever land.
            batch.insert(JOBS_TABLE, job.id.as_str(), encode(&job)?);
        }
        batch.put(
            INDEX_TABLE,
            self.index_key(now, &job.id),
            job.id.as_str().as_bytes().to_vec(),
        );
        match self.store.apply(batch).await {
            Ok(()) => Ok(SubmitOutcome {
                job,
                is_duplicate: false,
            }),
            Err(StorageError::Conflict(_)) => {
                // Lost the creation race; hand back the winner's record.
                match self.load(&id).await? {
                    Some(job) => Ok(SubmitOutcome {
                        job,
                        is_duplicate: true,
                    }),
                    None => Err(StorageError::Conflict(id.as_str().to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Claim the next eligible job, if any.
    ///
    /// Reads the index head; when its availability timestamp has passed, the
    /// job flips to processing and the index entry is removed, atomically.
    /// An index entry pointing at a missing job, or at a job that is no
    /// longer queued, is dropped (self-healing) and the call returns `None`.
    pub async fn claim(&self) -> Result<Option<Job>, StorageError> {
        self.claim_at(now_ms()).await
    }

    /// [`Queue::claim`] with an explicit current timestamp.
    pub async fn claim_at(&self, now: u64) -> Result<Option<Job>, StorageError> {
        let head = self.store.scan(INDEX_TABLE, "", Some(1)).await?;
        let Some((key, _)) = head.into_iter().next() else {
            return Ok(None);
        };

        let Some(available_at) = parse_key_timestamp(&key, self.pad_width) else {
            // Corrupt index key: treat like an orphan and drop it.
            self.drop_index_entry(&key).await?;
            return Ok(None);
        };
        // The head is the least key; nothing later in order is eligible
        // either.
        if available_at > now {
            return Ok(None);
        }

        let Some(id) = parse_key_suffix(&key, self.pad_width).map(JobId::new) else {
            self.drop_index_entry(&key).await?;
            return Ok(None);
        };

        let Some(mut job) = self.load(&id).await? else {
            self.drop_index_entry(&key).await?;
            return Ok(None);
        };

        // An index entry must point at a queued job. Anything else is a
        // stale leftover (a racing reset, a healed duplicate) and must not
        // hand the job out a second time.
        if job.status != JobStatus::Queued {
            self.drop_index_entry(&key).await?;
            return Ok(None);
        }

        job.mark_processing();
        let mut batch = WriteBatch::new();
        batch.take(INDEX_TABLE, key);
        batch.put(JOBS_TABLE, id.as_str(), encode(&job)?);
        match self.store.apply(batch).await {
            Ok(()) => Ok(Some(job)),
            // Another claimant removed the head first.
            Err(StorageError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record a successful processing result.
    pub async fn complete(&self, id: &JobId, body: Value) -> Result<Option<Job>, StorageError> {
        let Some(mut job) = self.load(id).await? else {
            return Ok(None);
        };
        job.mark_completed(body);
        self.store.put(JOBS_TABLE, id.as_str(), encode(&job)?).await?;
        Ok(Some(job))
    }

    /// Re-queue a job for another attempt at `next_available_at`.
    ///
    /// Increments the retry count and re-inserts the index entry atomically
    /// with the job update.
    pub async fn retry(
        &self,
        id: &JobId,
        next_available_at: u64,
    ) -> Result<Option<Job>, StorageError> {
        let Some(mut job) = self.load(id).await? else {
            return Ok(None);
        };
        job.mark_requeued(next_available_at);

        let mut batch = WriteBatch::new();
        batch.put(JOBS_TABLE, id.as_str(), encode(&job)?);
        batch.put(
            INDEX_TABLE,
            self.index_key(next_available_at, id),
            id.as_str().as_bytes().to_vec(),
        );
        self.store.apply(batch).await?;
        Ok(Some(job))
    }

    /// Mark a job permanently failed. The record is retained (no index
    /// entry) until resubmission resets it.
    pub async fn fail(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        let Some(mut job) = self.load(id).await? else {
            return Ok(None);
        };
        job.mark_failed();
        self.store.put(JOBS_TABLE, id.as_str(), encode(&job)?).await?;
        Ok(Some(job))
    }

    /// Point read of a job record.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        self.load(id).await
    }

    fn index_key(&self, available_at: u64, id: &JobId) -> String {
        ordered_key(available_at, id.as_str(), self.pad_width)
    }

    async fn drop_index_entry(&self, key: &str) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.take(INDEX_TABLE, key);
        match self.store.apply(batch).await {
            // Someone else already removed it; healed either way.
            Ok(()) | Err(StorageError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn load(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        match self.store.get(JOBS_TABLE, id.as_str()).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn encode(job: &Job) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(job).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Job, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
