use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::foundation::core::{AdaptationMethod, GridSpec, QualityLevel};
use crate::foundation::error::{GridmojiError, GridmojiResult};

/// Validated per-job options. Together with the source digest these key the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct JobOptions {
    pub grid: GridSpec,
    pub method: AdaptationMethod,
    pub quality: QualityLevel,
    #[serde(default)]
    pub remove_background: bool,
}

impl JobOptions {
    pub fn new(grid: GridSpec, method: AdaptationMethod, quality: QualityLevel) -> Self {
        Self {
            grid,
            method,
            quality,
            remove_background: false,
        }
    }

    pub fn with_background_removal(mut self, on: bool) -> Self {
        self.remove_background = on;
        self
    }
}

/// One unit of work as submitted by a caller.
///
/// The grid arrives unvalidated; it is checked in [`JobStage::Validating`] before the source is
/// touched.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub source: Arc<[u8]>,
    pub grid_x: u32,
    pub grid_y: u32,
    pub method: AdaptationMethod,
    pub quality: QualityLevel,
    pub remove_background: bool,
    /// Overrides the pipeline's default deadline.
    pub timeout: Option<Duration>,
}

impl JobRequest {
    pub fn new(source: impl Into<Arc<[u8]>>, opts: JobOptions) -> Self {
        Self {
            source: source.into(),
            grid_x: opts.grid.x(),
            grid_y: opts.grid.y(),
            method: opts.method,
            quality: opts.quality,
            remove_background: opts.remove_background,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate the request parameters.
    pub fn options(&self) -> GridmojiResult<JobOptions> {
        Ok(JobOptions {
            grid: GridSpec::new(self.grid_x, self.grid_y)?,
            method: self.method,
            quality: self.quality,
            remove_background: self.remove_background,
        })
    }
}

/// Lifecycle of one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Validating,
    Decoding,
    /// Video only.
    Sampling,
    Adapting,
    Partitioning,
    Normalizing,
    CacheWriting,
    Complete,
    Failed,
}

impl JobStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Decoding => "decoding",
            Self::Sampling => "sampling",
            Self::Adapting => "adapting",
            Self::Partitioning => "partitioning",
            Self::Normalizing => "normalizing",
            Self::CacheWriting => "cache_writing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `next` may directly follow `self`.
    pub fn can_enter(self, next: JobStage) -> bool {
        use JobStage::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Validating, Decoding)
                | (Validating, Complete)
                | (Decoding, Sampling)
                | (Decoding, Adapting)
                | (Sampling, Adapting)
                | (Adapting, Partitioning)
                | (Partitioning, Normalizing)
                | (Normalizing, CacheWriting)
                | (CacheWriting, Complete)
        )
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives a job through [`JobStage`]s against a fixed deadline.
#[derive(Debug)]
pub(crate) struct JobTracker {
    started: Instant,
    deadline: Instant,
    stage: JobStage,
    visited: Vec<JobStage>,
}

impl JobTracker {
    pub(crate) fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            stage: JobStage::Validating,
            visited: vec![JobStage::Validating],
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn stage(&self) -> JobStage {
        self.stage
    }

    pub(crate) fn visited(&self) -> &[JobStage] {
        &self.visited
    }

    /// Fail with a timeout if the deadline has passed while in the current stage.
    pub(crate) fn check(&self) -> GridmojiResult<()> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(GridmojiError::timeout(self.stage, now - self.started));
        }
        Ok(())
    }

    /// Move to `next`. Non-terminal stages are only entered before the deadline.
    pub(crate) fn enter(&mut self, next: JobStage) -> GridmojiResult<()> {
        if !self.stage.can_enter(next) {
            return Err(GridmojiError::processing(format!(
                "illegal job transition {} -> {next}",
                self.stage
            )));
        }
        if !next.is_terminal() {
            self.check()?;
        }
        tracing::debug!(from = %self.stage, to = %next, "job stage");
        self.stage = next;
        self.visited.push(next);
        Ok(())
    }

    /// Record the terminal failure. Idempotent once terminal.
    pub(crate) fn fail(&mut self) {
        if self.stage.can_enter(JobStage::Failed) {
            tracing::debug!(from = %self.stage, "job failed");
            self.stage = JobStage::Failed;
            self.visited.push(JobStage::Failed);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/job.rs"]
mod tests;
