use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use wishlist_server::background_jobs::{BaseJob, JobBase, JobContext, JobError};

/// Job that returns its label, or fails with a fixed message.
#[derive(Debug)]
pub struct RecordingJob {
    base: JobBase<String>,
    label: String,
    fail_with: Option<String>,
    runs: AtomicUsize,
}

impl RecordingJob {
    pub fn new(base: JobBase<String>, label: &str) -> Self {
        Self {
            base,
            label: label.to_string(),
            fail_with: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing(base: JobBase<String>, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(base, message)
        }
    }

    pub fn times_run(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl PartialEq for RecordingJob {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

#[async_trait]
impl BaseJob for RecordingJob {
    type Output = String;

    fn base(&self) -> &JobBase<String> {
        &self.base
    }

    async fn perform(&self, _ctx: &JobContext) -> Result<String, JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(JobError::ExecutionFailed(message.clone())),
            None => Ok(self.label.clone()),
        }
    }
}
