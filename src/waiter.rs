use crate::probe::HealthProbe;
use std::time::{Duration, Instant};

pub const DEFAULT_INCREMENT: Duration = Duration::from_millis(100);

/// Sleeps in fixed increments, giving up early once the probe reports the
/// connection broken.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    increment: Duration,
}

impl Default for Waiter {
    fn default() -> Self {
        Waiter {
            increment: DEFAULT_INCREMENT,
        }
    }
}

impl Waiter {
    pub fn new(increment: Duration) -> Self {
        Waiter {
            increment: increment.max(Duration::from_millis(1)),
        }
    }

    pub fn increment(&self) -> Duration {
        self.increment
    }

    /// Returns the time actually waited, at most `duration` plus one increment.
    pub fn wait(&self, duration: Duration, probe: &impl HealthProbe) -> Duration {
        let start = Instant::now();

        while start.elapsed() < duration {
            let step = self.increment.min(duration - start.elapsed().min(duration));
            std::thread::sleep(step);

            if probe.is_broken() {
                break;
            }
        }

        start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::NullProbe;
    use crate::test::mocks::ScriptedProbe;

    #[test]
    fn healthy_connection_waits_full_duration() {
        let waiter = Waiter::new(Duration::from_millis(10));
        let requested = Duration::from_millis(120);

        let elapsed = waiter.wait(requested, &NullProbe);

        assert!(elapsed >= requested);
        assert!(elapsed < requested + Duration::from_millis(10) + Duration::from_millis(50));
    }

    #[test]
    fn zero_duration_returns_immediately() {
        let probe = ScriptedProbe::closed_after(0);

        let elapsed = Waiter::default().wait(Duration::ZERO, &probe);

        assert!(elapsed < Duration::from_millis(5));
        assert_eq!(probe.calls(), 0);
    }

    #[test]
    fn broken_connection_cuts_wait_short() {
        let waiter = Waiter::new(Duration::from_millis(10));
        let probe = ScriptedProbe::closed_after(3);
        let requested = Duration::from_secs(2);

        let elapsed = waiter.wait(requested, &probe);

        assert!(elapsed < requested);
        assert!(probe.is_broken());
    }

    #[test]
    fn increment_has_a_floor() {
        assert_eq!(Waiter::new(Duration::ZERO).increment(), Duration::from_millis(1));
    }
}
