//! Stage-by-stage progress reporting.

use std::sync::Mutex;
use tracing::info;

/// Row counts for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub input: usize,
    pub output: usize,
    pub failed: usize,
}

impl StageCounts {
    pub fn new(input: usize, output: usize, failed: usize) -> Self {
        Self {
            input,
            output,
            failed,
        }
    }
}

/// Receives progress from the pipeline.
pub trait StageReporter: Send + Sync {
    fn record_stage(&self, name: &str, counts: StageCounts);
}

/// Emits one `info` event per stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StageReporter for TracingReporter {
    fn record_stage(&self, name: &str, counts: StageCounts) {
        info!(
            stage = name,
            input = counts.input,
            output = counts.output,
            failed = counts.failed,
            "stage complete"
        );
    }
}

/// Keeps every reported stage in order, for inspection after a run.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    stages: Mutex<Vec<(String, StageCounts)>>,
}

impl RecordingReporter {
    pub fn stages(&self) -> Vec<(String, StageCounts)> {
        self.stages
            .lock()
            .map(|stages| stages.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<StageCounts> {
        self.stages()
            .into_iter()
            .find(|(stage, _)| stage == name)
            .map(|(_, counts)| counts)
    }
}

impl StageReporter for RecordingReporter {
    fn record_stage(&self, name: &str, counts: StageCounts) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push((name.to_string(), counts));
        }
    }
}
