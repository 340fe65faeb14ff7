/// Bounds how fast a value may change between control cycles.
///
/// Rates are in units per second; the limiter is stepped with the cycle
/// period, so it carries the previous output across cycles and has to be
/// reset whenever its owner restarts.
#[derive(Debug, Clone)]
pub struct SlewRateLimiter {
    rate_per_sec: f64,
    previous: f64,
}

impl SlewRateLimiter {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec: rate_per_sec.abs(),
            previous: 0.0,
        }
    }

    /// Moves toward `target` by at most `rate · dt_secs`
    pub fn calculate(&mut self, target: f64, dt_secs: f64) -> f64 {
        let max_step = self.rate_per_sec * dt_secs.max(0.0);
        let step = (target - self.previous).clamp(-max_step, max_step);
        self.previous += step;
        self.previous
    }

    pub fn reset(&mut self, value: f64) {
        self.previous = value;
    }

    pub fn value(&self) -> f64 {
        self.previous
    }
}

/// Bounds the change of a 2D vector per cycle.
///
/// The step from the previous output is clamped in length, so reversing
/// direction ramps through zero instead of flipping in one cycle.
#[derive(Debug, Clone)]
pub struct PlanarSlewLimiter {
    rate_per_sec: f64,
    previous: (f64, f64),
}

impl PlanarSlewLimiter {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec: rate_per_sec.abs(),
            previous: (0.0, 0.0),
        }
    }

    /// Moves toward `target` by a step no longer than `rate · dt_secs`
    pub fn calculate(&mut self, target: (f64, f64), dt_secs: f64) -> (f64, f64) {
        let max_step = self.rate_per_sec * dt_secs.max(0.0);
        let (dx, dy) = (target.0 - self.previous.0, target.1 - self.previous.1);
        let length = dx.hypot(dy);
        let scale = if length > max_step { max_step / length } else { 1.0 };
        self.previous = (self.previous.0 + dx * scale, self.previous.1 + dy * scale);
        self.previous
    }

    pub fn reset(&mut self, value: (f64, f64)) {
        self.previous = value;
    }

    pub fn value(&self) -> (f64, f64) {
        self.previous
    }
}
