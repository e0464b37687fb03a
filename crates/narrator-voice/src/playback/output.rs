//! Audio output seam used by the playback engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PlaybackError;
use crate::framing::DecodedAudio;

/// Invoked once when a source plays through to its end.
pub type EndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Creates the output lazily, on the first `play()`.
pub type OutputFactory =
    Box<dyn Fn() -> Result<Box<dyn AudioOutput>, PlaybackError> + Send + Sync + 'static>;

/// An audio device plus one playing source.
///
/// # Contract
///
/// - `on_ended` fires at most once, only on natural completion, never from
///   inside a method of this trait, and never after the source was replaced
///   by `start` or removed by `stop`.
/// - [`now`](Self::now) is a monotonic clock that stands still while the
///   output is suspended.
pub trait AudioOutput: Send {
    /// Output clock in seconds.
    fn now(&self) -> f64;

    /// Replace the current source with `audio` starting `offset` seconds in.
    /// Resumes a suspended output.
    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset: f64,
        rate: f32,
        on_ended: EndedCallback,
    ) -> Result<(), PlaybackError>;

    /// Drop the current source without firing its callback.
    fn stop(&mut self);

    fn suspend(&mut self);

    fn resume(&mut self);

    fn set_rate(&mut self, rate: f32);

    fn set_volume(&mut self, volume: f32);
}

/// Wall clock that can be suspended, mirroring a device clock that stops
/// while the output is paused.
#[derive(Debug, Clone)]
pub struct OutputClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Default for OutputClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock {
    /// A running clock at zero.
    pub fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }
    }

    pub fn now(&self) -> f64 {
        let running = self.running_since.map_or(Duration::ZERO, |t| t.elapsed());
        (self.accumulated + running).as_secs_f64()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn suspend(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_stands_still_while_suspended() {
        let mut clock = OutputClock::new();
        std::thread::sleep(Duration::from_millis(5));
        clock.suspend();
        let frozen = clock.now();
        assert!(frozen > 0.0);

        std::thread::sleep(Duration::from_millis(10));
        assert!((clock.now() - frozen).abs() < f64::EPSILON);
        assert!(!clock.is_running());

        clock.resume();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > frozen);
    }

    #[test]
    fn repeated_suspend_and_resume_are_idempotent() {
        let mut clock = OutputClock::new();
        clock.suspend();
        let frozen = clock.now();
        clock.suspend();
        assert!((clock.now() - frozen).abs() < f64::EPSILON);
        clock.resume();
        clock.resume();
        assert!(clock.is_running());
    }
}
