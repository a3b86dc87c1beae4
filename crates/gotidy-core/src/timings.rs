//! Wall-clock accounting for normalizer stages.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::coordinator::Stage;

/// Measures one stage. The duration always lands in the stage report; it is
/// logged at info level only when timings were requested.
pub(crate) struct StageTimer {
    stage: Stage,
    started: Instant,
    announce: bool,
}

impl StageTimer {
    pub(crate) fn start(stage: Stage, announce: bool) -> Self {
        Self {
            stage,
            started: Instant::now(),
            announce,
        }
    }

    pub(crate) fn stop(self) -> u64 {
        let elapsed_ms = millis(self.started.elapsed());
        if self.announce {
            info!(stage = ?self.stage, elapsed_ms, "stage timing");
        } else {
            debug!(stage = ?self.stage, elapsed_ms, "stage finished");
        }
        elapsed_ms
    }
}

/// Whole milliseconds, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
