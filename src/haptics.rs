//! Proximity buzz as a software PWM: a fixed fast tick accumulates time and a pulse fires
//! each time the accumulated time reaches the current interval.

const TICK_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct HapticPulser {
    tick_secs: f64,
    interval_secs: Option<f64>,
    /// Wall time not yet consumed by whole ticks
    pending: f64,
    /// Ticks accumulated toward the next pulse, in seconds
    counter: f64,
}

impl HapticPulser {
    pub fn new(tick_secs: f64) -> Self {
        Self { tick_secs, interval_secs: None, pending: 0.0, counter: 0.0 }
    }

    pub fn interval(&self) -> Option<f64> {
        self.interval_secs
    }

    pub fn is_running(&self) -> bool {
        self.interval_secs.is_some()
    }

    /// Change the pulse interval; `None` invalidates the timer
    pub fn set_interval(&mut self, interval_secs: Option<f64>) {
        if interval_secs.is_none() {
            self.stop();
            return;
        }
        if self.interval_secs.is_none() {
            self.pending = 0.0;
            self.counter = 0.0;
        }
        self.interval_secs = interval_secs;
    }

    pub fn stop(&mut self) {
        self.interval_secs = None;
        self.pending = 0.0;
        self.counter = 0.0;
    }

    /// Advance wall time by `dt` seconds and return the number of pulses fired
    pub fn advance(&mut self, dt: f64) -> u32 {
        let Some(interval) = self.interval_secs else {
            return 0;
        };
        if !(dt.is_finite() && dt > 0.0) {
            return 0;
        }

        self.pending += dt;
        let mut pulses = 0;
        while self.pending + TICK_EPSILON >= self.tick_secs {
            self.pending -= self.tick_secs;
            self.counter += self.tick_secs;
            if self.counter + TICK_EPSILON >= interval {
                self.counter = 0.0;
                pulses += 1;
            }
        }
        pulses
    }
}
