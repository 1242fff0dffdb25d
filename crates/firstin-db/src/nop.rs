use std::time::Duration;

use firstin_core::{PollError, SeenStore};

/// No-op store used by the one-shot check command. Nothing is ever marked
/// seen, so every matching job appears new on each poll; `is_empty` reports
/// false so a check run exercises the real notify path instead of silently
/// seeding.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopStore;

impl NopStore {
    pub fn new() -> Self {
        Self
    }
}

impl SeenStore for NopStore {
    async fn has_seen(&self, _job_id: &str) -> Result<bool, PollError> {
        Ok(false)
    }

    async fn mark_seen(&self, _job_id: &str) -> Result<(), PollError> {
        Ok(())
    }

    async fn prune(&self, _older_than: Duration) -> Result<u64, PollError> {
        Ok(0)
    }

    async fn is_empty(&self) -> Result<bool, PollError> {
        Ok(false)
    }
}
