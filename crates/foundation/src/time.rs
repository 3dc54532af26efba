/// Host-supplied monotonic time in seconds.
///
/// All timers in the workspace take time as an argument instead of reading a
/// clock, so event sequences can be replayed exactly in tests.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64); // seconds

impl Time {
    pub fn from_millis(ms: u64) -> Self {
        Time(ms as f64 / 1000.0)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn after(self, seconds: f64) -> Self {
        Time(self.0 + seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn millis_convert_to_seconds() {
        assert_eq!(Time::from_millis(400), Time(0.4));
        assert_eq!(Time(1.0).after(0.25), Time(1.25));
        assert!(Time(0.5) < Time(0.75));
    }
}
