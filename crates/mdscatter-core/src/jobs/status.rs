use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag checked by dispatchers at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    Finished,
    Failed,
    Aborted,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Started { n_steps: usize },
    Progress { completed: usize, n_steps: usize },
    /// Link state between coordinator and workers; `false` means lost.
    Communication { connected: bool },
    Finished,
    Failed { message: String },
    Aborted,
}

/// Progress and lifecycle of one running job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    token: CancellationToken,
    state: JobState,
    n_steps: usize,
    completed: usize,
    interval: usize,
    events: Vec<StatusEvent>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl JobStatus {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            state: JobState::Created,
            n_steps: 0,
            completed: 0,
            interval: 1,
            events: Vec::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    /// Progress is reported every `rate` fraction of the steps.
    pub fn start(&mut self, n_steps: usize, rate: f64) {
        self.state = JobState::Running;
        self.n_steps = n_steps;
        self.completed = 0;
        let rate = if rate.is_finite() && rate > 0.0 { rate.min(1.0) } else { 1.0 };
        self.interval = ((n_steps as f64 * rate).ceil() as usize).max(1);
        tracing::info!(n_steps, "job started");
        self.events.push(StatusEvent::Started { n_steps });
    }

    /// One more step was combined.
    pub fn update(&mut self) {
        self.completed += 1;
        if self.completed % self.interval == 0 || self.completed == self.n_steps {
            tracing::debug!(completed = self.completed, n_steps = self.n_steps, "job progress");
            self.events.push(StatusEvent::Progress {
                completed: self.completed,
                n_steps: self.n_steps,
            });
        }
    }

    pub fn finish(&mut self) {
        self.state = JobState::Finished;
        tracing::info!(completed = self.completed, "job finished");
        self.events.push(StatusEvent::Finished);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.state = JobState::Failed;
        tracing::error!(%message, "job failed");
        self.events.push(StatusEvent::Failed { message });
    }

    pub fn abort(&mut self) {
        self.state = JobState::Aborted;
        tracing::warn!(completed = self.completed, n_steps = self.n_steps, "job aborted");
        self.events.push(StatusEvent::Aborted);
    }

    pub fn communication(&mut self, connected: bool) {
        if !connected {
            tracing::error!("lost communication with workers");
        }
        self.events.push(StatusEvent::Communication { connected });
    }

    /// Cooperative cancellation check.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn progress(&self) -> f64 {
        if self.n_steps == 0 {
            return 0.0;
        }
        self.completed as f64 / self.n_steps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::{CancellationToken, JobState, JobStatus, StatusEvent};

    #[test]
    fn progress_events_fire_at_the_configured_rate() {
        let mut status = JobStatus::default();
        status.start(10, 0.25);
        for _ in 0..10 {
            status.update();
        }
        status.finish();
        let progress: Vec<usize> = status
            .events()
            .iter()
            .filter_map(|event| match event {
                StatusEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![3, 6, 9, 10]);
        assert_eq!(status.state(), JobState::Finished);
        assert_eq!(status.progress(), 1.0);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let status = JobStatus::new(token.clone());
        assert!(!status.is_stopped());
        token.cancel();
        assert!(status.is_stopped());
    }

    #[test]
    fn communication_loss_is_recorded() {
        let mut status = JobStatus::default();
        status.start(2, 1.0);
        status.communication(false);
        status.fail("worker vanished");
        assert!(status.events().contains(&StatusEvent::Communication { connected: false }));
        assert_eq!(status.state(), JobState::Failed);
    }
}
