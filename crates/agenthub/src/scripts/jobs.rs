//! Tracking-id registry for running scripts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;

/// Progress reported for a job that has not said anything yet.
pub const DEFAULT_PROGRESS: &str = r#"{"now":"0","currentLabel":"Warming up"}"#;

#[derive(Debug)]
struct JobState {
    generation: u64,
    progress: Option<String>,
}

/// Running jobs keyed by tracking id. Cloning shares the table.
#[derive(Clone, Default)]
pub struct ScriptJobs {
    jobs: Arc<DashMap<String, JobState>>,
    next_generation: Arc<AtomicU64>,
}

impl ScriptJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tracking_id` as running. Starting an id that is already
    /// running replaces it; the older guard then leaves the newer job alone.
    pub fn start(&self, tracking_id: &str) -> JobGuard {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.jobs.insert(
            tracking_id.to_string(),
            JobState {
                generation,
                progress: None,
            },
        );
        debug!("Script job {} started", tracking_id);
        JobGuard {
            tracking_id: tracking_id.to_string(),
            generation,
            jobs: self.clone(),
        }
    }

    /// Record the latest progress JSON. Unknown ids are ignored.
    pub fn set_progress(&self, tracking_id: &str, progress: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(tracking_id) {
            job.progress = Some(progress.into());
        }
    }

    /// Last progress JSON for `tracking_id`, or [`DEFAULT_PROGRESS`].
    pub fn progress(&self, tracking_id: &str) -> String {
        self.jobs
            .get(tracking_id)
            .and_then(|job| job.progress.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROGRESS.to_string())
    }

    pub fn is_running(&self, tracking_id: &str) -> bool {
        self.jobs.contains_key(tracking_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for ScriptJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptJobs")
            .field("running", &self.len())
            .finish()
    }
}

/// Releases its tracking id when dropped.
pub struct JobGuard {
    tracking_id: String,
    generation: u64,
    jobs: ScriptJobs,
}

impl JobGuard {
    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        if self
            .jobs
            .jobs
            .remove_if(&self.tracking_id, |_, job| job.generation == generation)
            .is_some()
        {
            debug!("Script job {} released", self.tracking_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_defaults_until_reported() {
        let jobs = ScriptJobs::new();
        assert_eq!(jobs.progress("t1"), DEFAULT_PROGRESS);

        let guard = jobs.start("t1");
        assert_eq!(jobs.progress("t1"), DEFAULT_PROGRESS);
        jobs.set_progress("t1", r#"{"now":"40"}"#);
        assert_eq!(jobs.progress("t1"), r#"{"now":"40"}"#);

        drop(guard);
        assert!(jobs.is_empty());
        assert_eq!(jobs.progress("t1"), DEFAULT_PROGRESS);
    }

    #[test]
    fn test_set_progress_for_unknown_job_is_ignored() {
        let jobs = ScriptJobs::new();
        jobs.set_progress("ghost", "{}");
        assert!(!jobs.is_running("ghost"));
    }

    #[test]
    fn test_stale_guard_keeps_restarted_job() {
        let jobs = ScriptJobs::new();
        let first = jobs.start("t1");
        let second = jobs.start("t1");
        assert_eq!(second.tracking_id(), "t1");

        drop(first);
        assert!(jobs.is_running("t1"));
        drop(second);
        assert!(!jobs.is_running("t1"));
    }
}
