//! Frame timing.

use std::time::{Duration, Instant};

use tracing::info;

/// Measures the wall time of one section of work at a time.
#[derive(Clone, Copy, Debug)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Create a stopwatch, started now.
    pub fn new() -> Stopwatch {
        Stopwatch {
            started: Instant::now(),
        }
    }

    /// Restart timing from now.
    pub fn start(&mut self) {
        self.started = Instant::now();
    }

    /// Get the time since the stopwatch was last started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Get the frame rate implied by the elapsed time, treating it as one
    /// frame.
    pub fn fps(&self) -> f64 {
        fps(self.elapsed())
    }

    /// Log the elapsed time and the implied frame rate.
    pub fn report(&self, label: &str) -> Duration {
        let elapsed = self.elapsed();
        info!(label, elapsed_ns = elapsed.as_nanos() as u64, fps = fps(elapsed), "elapsed");
        elapsed
    }
}

impl Default for Stopwatch {
    fn default() -> Stopwatch {
        Stopwatch::new()
    }
}

fn fps(elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        1.0 / seconds
    } else {
        f64::INFINITY
    }
}
