use foundation::time::Time;

/// Trailing-edge debounce timer.
///
/// Each `arm` replaces any pending deadline, so a burst of events yields a
/// single firing `window` seconds after the last one. There is no leading
/// edge. The timer never reads a clock; the host passes `now` in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Debouncer {
    window_s: f64,
    deadline: Option<Time>,
}

impl Debouncer {
    pub fn new(window_s: f64) -> Self {
        Self {
            window_s: window_s.max(0.0),
            deadline: None,
        }
    }

    pub fn from_millis(window_ms: u64) -> Self {
        Self::new(window_ms as f64 / 1000.0)
    }

    pub fn window_s(&self) -> f64 {
        self.window_s
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Time> {
        self.deadline
    }

    /// (Re)start the window at `now`.
    pub fn arm(&mut self, now: Time) {
        self.deadline = Some(now.after(self.window_s));
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Returns `true` exactly once per settled burst, when `now` has reached
    /// the deadline. Disarms on firing.
    pub fn fire(&mut self, now: Time) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// A debouncer that carries the most recent value of the burst.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    timer: Debouncer,
    latest: Option<T>,
}

impl<T> Debounced<T> {
    pub fn new(window_s: f64) -> Self {
        Self {
            timer: Debouncer::new(window_s),
            latest: None,
        }
    }

    pub fn from_millis(window_ms: u64) -> Self {
        Self {
            timer: Debouncer::from_millis(window_ms),
            latest: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn deadline(&self) -> Option<Time> {
        self.timer.deadline()
    }

    pub fn push(&mut self, now: Time, value: T) {
        self.latest = Some(value);
        self.timer.arm(now);
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.timer.cancel();
        self.latest.take()
    }

    /// Yields the last pushed value once the burst has settled.
    pub fn poll(&mut self, now: Time) -> Option<T> {
        if self.timer.fire(now) {
            return self.latest.take();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Debounced, Debouncer};
    use foundation::time::Time;

    #[test]
    fn fires_once_after_window() {
        let mut d = Debouncer::new(0.4);
        d.arm(Time(0.0));
        assert!(!d.fire(Time(0.39)));
        assert!(d.fire(Time(0.4)));
        assert!(!d.fire(Time(1.0)));
        assert!(!d.is_armed());
    }

    #[test]
    fn rearming_pushes_deadline_out() {
        let mut d = Debouncer::from_millis(400);
        d.arm(Time(0.0));
        d.arm(Time(0.3));
        assert!(!d.fire(Time(0.5)));
        assert!(d.fire(Time(0.7)));
    }

    #[test]
    fn cancel_suppresses_firing() {
        let mut d = Debouncer::new(0.1);
        assert!(!d.cancel());
        d.arm(Time(0.0));
        assert!(d.cancel());
        assert!(!d.fire(Time(5.0)));
    }

    #[test]
    fn burst_yields_latest_value_once() {
        let mut d = Debounced::from_millis(800);
        for (i, t) in [0.0, 0.1, 0.2, 0.3].into_iter().enumerate() {
            d.push(Time(t), i);
        }
        assert_eq!(d.poll(Time(1.0)), None);
        assert_eq!(d.poll(Time(1.1)), Some(3));
        assert_eq!(d.poll(Time(2.0)), None);
        assert!(!d.is_pending());
    }
}
