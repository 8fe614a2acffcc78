use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Get current wall-clock timestamp in milliseconds (packet stamping only)
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Monotonic server clock shared by history recording and hit claim
/// verification. Seconds since server start; never goes backwards, which
/// keeps timestamps comparable across all actors and all clients.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    started: Instant,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = ServerClock::new();
        let mut previous = clock.now();

        for _ in 0..100 {
            let now = clock.now();
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn test_clock_advances() {
        let clock = ServerClock::new();
        let before = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > before);
    }

    #[test]
    fn test_wall_timestamp_is_plausible() {
        let t1 = get_timestamp();
        std::thread::sleep(Duration::from_millis(1));
        let t2 = get_timestamp();
        assert!(t2 >= t1);
        // Sometime after 2020.
        assert!(t1 > 1_577_836_800_000);
    }
}
