//! Bounded history of settled operations
//!
//! Two collections (completed, failed), each limited by a count cap and a
//! maximum entry age. Eviction is oldest-settled-first and purely
//! diagnostic: it never touches already-settled caller handles.

use crate::error::QueueError;
use crate::types::{Json, OperationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Terminal outcome stored for a settled operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistoryOutcome {
    /// Operation resolved with a value
    Completed { result: Json },
    /// Operation rejected terminally
    Failed { error: String, category: String },
}

/// Diagnostic record of one settled operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Operation identifier
    pub id: OperationId,
    /// Terminal outcome
    pub outcome: HistoryOutcome,
    /// Wall time spent across all attempts
    pub execution_time_ms: u64,
    /// Retry attempts consumed before settling
    pub retry_count: u32,
    /// Caller metadata carried from enqueue
    pub metadata: Json,
    /// When the operation settled
    pub settled_at: DateTime<Utc>,
}

/// Bounded store of completed and failed operations
#[derive(Debug)]
pub(crate) struct HistoryStore {
    completed: VecDeque<HistoryEntry>,
    failed: VecDeque<HistoryEntry>,
    max_size: usize,
    max_age: Duration,
}

impl HistoryStore {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            completed: VecDeque::new(),
            failed: VecDeque::new(),
            max_size,
            max_age,
        }
    }

    /// Record a successful settle
    pub fn record_completed(
        &mut self,
        id: OperationId,
        result: Json,
        execution_time_ms: u64,
        retry_count: u32,
        metadata: Json,
    ) {
        self.completed.push_back(HistoryEntry {
            id,
            outcome: HistoryOutcome::Completed { result },
            execution_time_ms,
            retry_count,
            metadata,
            settled_at: Utc::now(),
        });
        Self::enforce_cap(&mut self.completed, self.max_size);
    }

    /// Record a terminal failure
    pub fn record_failed(
        &mut self,
        id: OperationId,
        error: &QueueError,
        execution_time_ms: u64,
        retry_count: u32,
        metadata: Json,
    ) {
        self.failed.push_back(HistoryEntry {
            id,
            outcome: HistoryOutcome::Failed {
                error: error.to_string(),
                category: error.category().to_string(),
            },
            execution_time_ms,
            retry_count,
            metadata,
            settled_at: Utc::now(),
        });
        Self::enforce_cap(&mut self.failed, self.max_size);
    }

    /// Evict entries past either bound, oldest-settled-first
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::from_std(self.max_age).unwrap_or_default();
        let mut evicted = 0;
        for store in [&mut self.completed, &mut self.failed] {
            while store.front().is_some_and(|e| e.settled_at < cutoff) {
                store.pop_front();
                evicted += 1;
            }
            while store.len() > self.max_size {
                store.pop_front();
                evicted += 1;
            }
        }
        evicted
    }

    /// Most recent completed entries, newest first
    pub fn recent_completed(&self, limit: usize) -> Vec<HistoryEntry> {
        self.completed.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent failed entries, newest first
    pub fn recent_failed(&self, limit: usize) -> Vec<HistoryEntry> {
        self.failed.iter().rev().take(limit).cloned().collect()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    fn enforce_cap(store: &mut VecDeque<HistoryEntry>, max_size: usize) {
        while store.len() > max_size {
            store.pop_front();
        }
    }
}
