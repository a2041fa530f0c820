use std::time::Duration;

use crate::progress::{Checkpoint, CheckpointTracker};

use super::Placement;

/// Terminal strategy: keep the provider URL as-is
///
/// Never fails. Still walks the remaining checkpoints with a short pause
/// between them so progress reads the same on every path.
#[derive(Clone, Debug)]
pub struct PassThrough {
    pacing: Duration,
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

impl PassThrough {
    pub const fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub const fn name(&self) -> &'static str {
        "pass-through"
    }

    pub async fn resolve(&self, source_url: &str, progress: &mut CheckpointTracker<'_>) -> Placement {
        for checkpoint in [Checkpoint::Converting, Checkpoint::Uploading] {
            progress.reach(checkpoint);
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Placement {
            url: source_url.to_string(),
            is_permanent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressRange;
    use crate::testing::Recorder;

    #[tokio::test]
    async fn test_resolves_to_source_url() {
        let recorder = Recorder::default();
        let mut tracker = CheckpointTracker::new(&recorder, ProgressRange::new(10, 40));

        let placement = PassThrough::new(Duration::ZERO)
            .resolve("https://gen.example/x.png", &mut tracker)
            .await;

        assert_eq!(placement.url, "https://gen.example/x.png");
        assert!(!placement.is_permanent);
        assert_eq!(recorder.percentages(), vec![10, 20, 30]);
    }
}
