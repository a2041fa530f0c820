//! Progress Reporting
//!
//! Synchronous observer invoked from the single pipeline flow, plus the
//! percentage plan that keeps reported values strictly increasing.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Receives `(percentage, message)` updates
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percentage: u8, message: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn on_progress(&self, percentage: u8, message: &str) {
        self(percentage, message);
    }
}

/// Observer that discards updates
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _percentage: u8, _message: &str) {}
}

/// Inclusive percentage span assigned to one stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRange {
    pub start: u8,
    pub end: u8,
}

impl ProgressRange {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Percentage for `step` out of `steps` (0-based, `steps - 1` maps to `end`)
    fn at(self, step: u8, steps: u8) -> u8 {
        if steps <= 1 {
            return self.end;
        }
        let span = u16::from(self.end.saturating_sub(self.start));
        let offset = span * u16::from(step) / u16::from(steps - 1);
        self.start + u8::try_from(offset).unwrap_or(u8::MAX - self.start)
    }
}

/// Persistence checkpoints, reported in this order on every path
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Fetching,
    Converting,
    Uploading,
    Finalizing,
}

impl Checkpoint {
    pub const ALL: [Self; 4] = [
        Self::Fetching,
        Self::Converting,
        Self::Uploading,
        Self::Finalizing,
    ];

    const fn index(self) -> u8 {
        match self {
            Self::Fetching => 0,
            Self::Converting => 1,
            Self::Uploading => 2,
            Self::Finalizing => 3,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::Fetching => "Fetching your artwork...",
            Self::Converting => "Preparing image...",
            Self::Uploading => "Saving your masterpiece...",
            Self::Finalizing => "Finalizing...",
        }
    }
}

/// Emits each checkpoint exactly once, in order, within a range
///
/// Reaching a later checkpoint first emits any skipped ones; reaching an
/// earlier or already emitted checkpoint is ignored. A retry that starts over
/// at `Fetching` therefore never moves the percentage backwards.
pub struct CheckpointTracker<'a> {
    observer: &'a dyn ProgressObserver,
    range: ProgressRange,
    reached: Option<Checkpoint>,
}

impl<'a> CheckpointTracker<'a> {
    pub fn new(observer: &'a dyn ProgressObserver, range: ProgressRange) -> Self {
        Self {
            observer,
            range,
            reached: None,
        }
    }

    pub fn reach(&mut self, checkpoint: Checkpoint) {
        for cp in Checkpoint::ALL {
            if cp > checkpoint {
                break;
            }
            if self.reached.is_some_and(|r| cp <= r) {
                continue;
            }
            let steps = u8::try_from(Checkpoint::ALL.len()).unwrap_or(u8::MAX);
            self.observer
                .on_progress(self.range.at(cp.index(), steps), cp.message());
            self.reached = Some(cp);
        }
    }

    /// Emit any outstanding checkpoints through `Finalizing`
    pub fn finish(&mut self) {
        self.reach(Checkpoint::Finalizing);
    }

    pub const fn reached(&self) -> Option<Checkpoint> {
        self.reached
    }
}

/// Percentage plan for a whole pipeline run
///
/// Values must be strictly increasing across stages; 100 is reserved for
/// the final `Done` report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPlan {
    generating: ProgressRange,
    persisting: ProgressRange,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            generating: ProgressRange::new(10, 40),
            persisting: ProgressRange::new(50, 95),
        }
    }
}

impl ProgressPlan {
    pub fn new(generating: ProgressRange, persisting: ProgressRange) -> Result<Self> {
        let steps = u8::try_from(Checkpoint::ALL.len()).unwrap_or(u8::MAX);
        if generating.start >= generating.end {
            return Err(PipelineError::Config("generating range must be increasing".into()));
        }
        if persisting.start <= generating.end {
            return Err(PipelineError::Config(
                "persisting range must start after generating range".into(),
            ));
        }
        if persisting.end.saturating_sub(persisting.start) < steps - 1 {
            return Err(PipelineError::Config(format!(
                "persisting range must span at least {} points",
                steps - 1
            )));
        }
        if persisting.end >= 100 {
            return Err(PipelineError::Config("100 is reserved for completion".into()));
        }

        Ok(Self {
            generating,
            persisting,
        })
    }

    pub const fn generating(&self) -> ProgressRange {
        self.generating
    }

    pub const fn persisting(&self) -> ProgressRange {
        self.persisting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_tracker_emits_each_checkpoint_once() {
        let seen = Mutex::new(Vec::new());
        let observer = |pct: u8, msg: &str| seen.lock().unwrap().push((pct, msg.to_string()));

        let mut tracker = CheckpointTracker::new(&observer, ProgressRange::new(20, 80));
        tracker.reach(Checkpoint::Fetching);
        tracker.reach(Checkpoint::Converting);
        tracker.reach(Checkpoint::Fetching);
        tracker.reach(Checkpoint::Converting);
        tracker.finish();

        let seen = seen.into_inner().unwrap();
        let pcts: Vec<u8> = seen.iter().map(|(p, _)| *p).collect();
        assert_eq!(pcts, vec![20, 40, 60, 80]);
        assert_eq!(seen[2].1, Checkpoint::Uploading.message());
    }

    #[test]
    fn test_plan_rejects_overlap() {
        assert!(ProgressPlan::new(ProgressRange::new(10, 50), ProgressRange::new(40, 90)).is_err());
        assert!(ProgressPlan::new(ProgressRange::new(10, 40), ProgressRange::new(50, 100)).is_err());
        assert!(ProgressPlan::new(ProgressRange::new(10, 40), ProgressRange::new(50, 51)).is_err());
        assert!(ProgressPlan::new(ProgressRange::new(5, 30), ProgressRange::new(35, 90)).is_ok());
    }
}
