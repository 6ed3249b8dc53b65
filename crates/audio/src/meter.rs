//! Output level metering for UI visualisation.

use std::collections::VecDeque;
use tokio::time::Instant;

/// Tracks the RMS of slices by their scheduled play window and reports a
/// peak-hold level for whatever is audible at a given instant.
#[derive(Debug)]
pub struct VolumeMeter {
    windows: VecDeque<(Instant, Instant, f32)>,
    level: f32,
    decay: f32,
}

impl VolumeMeter {
    /// `decay` is the factor applied to the held level per sample when it falls.
    pub fn new(decay: f32) -> Self {
        Self {
            windows: VecDeque::new(),
            level: 0.0,
            decay: decay.clamp(0.0, 1.0),
        }
    }

    /// Records that a slice with the given RMS plays during `[start, end)`.
    pub fn record(&mut self, start: Instant, end: Instant, rms: f32) {
        self.windows.push_back((start, end, rms));
    }

    /// Level audible at `now`, smoothed against the previous sample.
    pub fn sample(&mut self, now: Instant) -> f32 {
        while self.windows.front().is_some_and(|(_, end, _)| *end <= now) {
            self.windows.pop_front();
        }
        let current = self
            .windows
            .iter()
            .find(|(start, end, _)| *start <= now && now < *end)
            .map(|(_, _, rms)| *rms)
            .unwrap_or(0.0);
        self.level = current.max(self.level * self.decay);
        if self.level < 1e-4 {
            self.level = 0.0;
        }
        self.level
    }

    pub fn reset(&mut self) {
        self.windows.clear();
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reports_level_of_audible_window() {
        let start = Instant::now();
        let mut meter = VolumeMeter::new(0.5);
        meter.record(start, start + Duration::from_millis(20), 0.8);
        meter.record(
            start + Duration::from_millis(20),
            start + Duration::from_millis(40),
            0.2,
        );

        assert_eq!(meter.sample(start + Duration::from_millis(5)), 0.8);
        // Falls with decay rather than snapping to the quieter slice.
        assert_eq!(meter.sample(start + Duration::from_millis(25)), 0.4);
        assert_eq!(meter.sample(start + Duration::from_millis(30)), 0.2);
    }

    #[test]
    fn test_decays_to_silence_after_playback() {
        let start = Instant::now();
        let mut meter = VolumeMeter::new(0.1);
        meter.record(start, start + Duration::from_millis(10), 1.0);
        assert_eq!(meter.sample(start), 1.0);
        let mut level = 1.0;
        for step in 1..10 {
            level = meter.sample(start + Duration::from_millis(10 * step));
        }
        assert_eq!(level, 0.0);
    }

    #[test]
    fn test_reset() {
        let start = Instant::now();
        let mut meter = VolumeMeter::new(0.9);
        meter.record(start, start + Duration::from_secs(1), 0.6);
        assert!(meter.sample(start) > 0.0);
        meter.reset();
        assert_eq!(meter.sample(start), 0.0);
    }
}
