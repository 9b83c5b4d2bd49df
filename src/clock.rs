//! Time keeping for [`ScanChain::run_program`](crate::engine::ScanChain::run_program).
//!
//! The engine asks a [`Clock`] how long it has been waiting.  With `std`, [`StdClock`] reads the
//! monotonic clock, so time spent talking to the adapter counts too.  Without a time source,
//! [`PollCounter`] adds up the poll intervals the engine slept through.
use core::time::Duration;

pub trait Clock {
    /// Start measuring from now.
    fn restart(&mut self);
    /// Time since the last [`Clock::restart`].
    fn elapsed(&self) -> Duration;
    /// The engine just slept for `slept`.
    fn slept(&mut self, _slept: Duration) {}
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn restart(&mut self) {
        (**self).restart()
    }

    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn slept(&mut self, slept: Duration) {
        (**self).slept(slept)
    }
}

/// Counts only the time slept between polls.
#[derive(Clone, Copy, Debug, Default)]
pub struct PollCounter {
    elapsed: Duration,
}

impl Clock for PollCounter {
    fn restart(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn slept(&mut self, slept: Duration) {
        self.elapsed += slept;
    }
}

/// Wall clock time from [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn restart(&mut self) {
        self.start = std::time::Instant::now();
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_counter_sums_sleeps() {
        let mut clock = PollCounter::default();
        clock.slept(Duration::from_micros(100));
        clock.slept(Duration::from_micros(250));
        assert_eq!(clock.elapsed(), Duration::from_micros(350));
        clock.restart();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_clock_counts_time_without_sleeps() {
        let mut clock = StdClock::default();
        clock.restart();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.elapsed() >= Duration::from_millis(2));
    }
}
