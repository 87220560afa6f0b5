//! In-memory `CdnClient` used for dry runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CdnError;
use crate::traits::{CdnClient, InvalidationHandle, InvalidationStatus};

/// One invalidation accepted by [`MemoryCdnClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvalidation {
    pub id: String,
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub caller_reference: String,
}

#[derive(Debug, Default)]
struct MemoryCdnState {
    submissions: Vec<RecordedInvalidation>,
    /// id -> status polls served
    polls: HashMap<String, u32>,
    /// Remaining injected submit failures and the error they return.
    failures: Option<(u32, CdnError)>,
    create_calls: u32,
    status_calls: u32,
}

/// CDN kept in process memory.
///
/// Submissions with a caller reference already seen return the original
/// handle, mirroring the CDN's idempotency. An invalidation reports
/// `Completed` once it has been polled `complete_after_polls` times.
#[derive(Debug)]
pub struct MemoryCdnClient {
    state: Mutex<MemoryCdnState>,
    complete_after_polls: u32,
}

impl Default for MemoryCdnClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryCdnState::default()),
            complete_after_polls: 1,
        }
    }
}

impl MemoryCdnClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete_after_polls(mut self, polls: u32) -> Self {
        self.complete_after_polls = polls;
        self
    }

    /// Make the next `times` submissions fail with `error`.
    pub fn fail_submissions(&self, times: u32, error: CdnError) {
        self.lock().failures = Some((times, error));
    }

    /// Accepted invalidations, in submission order.
    pub fn submissions(&self) -> Vec<RecordedInvalidation> {
        self.lock().submissions.clone()
    }

    /// Number of create calls, including failed ones.
    pub fn create_calls(&self) -> u32 {
        self.lock().create_calls
    }

    pub fn status_calls(&self) -> u32 {
        self.lock().status_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryCdnState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CdnClient for MemoryCdnClient {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<InvalidationHandle, CdnError> {
        let mut state = self.lock();
        state.create_calls += 1;

        if let Some((remaining, error)) = state.failures.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }

        if paths.is_empty() {
            return Err(CdnError::EmptyBatch);
        }

        if let Some(existing) = state
            .submissions
            .iter()
            .find(|s| s.distribution_id == distribution_id && s.caller_reference == caller_reference)
        {
            return Ok(InvalidationHandle {
                distribution_id: existing.distribution_id.clone(),
                id: existing.id.clone(),
            });
        }

        let id: String = format!("I{:06}", state.submissions.len() + 1);
        state.submissions.push(RecordedInvalidation {
            id: id.clone(),
            distribution_id: distribution_id.to_string(),
            paths: paths.to_vec(),
            caller_reference: caller_reference.to_string(),
        });

        Ok(InvalidationHandle {
            distribution_id: distribution_id.to_string(),
            id,
        })
    }

    async fn get_invalidation_status(
        &self,
        handle: &InvalidationHandle,
    ) -> Result<InvalidationStatus, CdnError> {
        let complete_after_polls: u32 = self.complete_after_polls;
        let mut state = self.lock();
        state.status_calls += 1;

        let known: bool = state
            .submissions
            .iter()
            .any(|s| s.distribution_id == handle.distribution_id && s.id == handle.id);
        if !known {
            return Err(CdnError::NotFound {
                distribution_id: handle.distribution_id.clone(),
                id: handle.id.clone(),
            });
        }

        let polls: &mut u32 = state.polls.entry(handle.id.clone()).or_insert(0);
        *polls += 1;
        if *polls >= complete_after_polls {
            Ok(InvalidationStatus::Completed)
        } else {
            Ok(InvalidationStatus::InProgress)
        }
    }
}
