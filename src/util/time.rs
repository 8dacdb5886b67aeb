//! Time utilities for the simulation loop

use std::time::{Duration, Instant};

/// Process start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const DEFAULT_TICK_RATE: u32 = 60; // 60 ticks per second

/// Wall-clock length of one tick
pub fn tick_interval(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)))
}

/// A simple timer for measuring elapsed game time between ticks
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Milliseconds since the last lap, restarting the timer
    pub fn lap_ms(&mut self) -> u32 {
        let elapsed = self.elapsed_ms().min(u64::from(u32::MAX)) as u32;
        self.reset();
        elapsed
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lap_restarts_the_timer() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.lap_ms() >= 5);
        assert!(timer.elapsed_ms() < 5);
    }

    #[test]
    fn tick_interval_matches_rate() {
        assert_eq!(tick_interval(60), Duration::from_micros(16_666));
        assert_eq!(tick_interval(0), Duration::from_secs(1));
    }
}
