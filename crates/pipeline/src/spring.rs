//! Pointer spring simulation.
//!
//! Raw pointer samples arrive at event rate; the renderer runs at display
//! rate. [`PointerSpring`] bridges the two: it keeps a critically-damped
//! second-order integrator easing a position toward the latest sample, and a
//! delta-based velocity estimate of the raw samples. The eased position feeds
//! the glow/shape uniforms while the raw velocity drives size reactivity.

use std::time::Instant;

/// Longest integration step accepted by [`PointerSpring::advance`]; a stalled
/// event loop resumes with one clamped step instead of an energy spike.
const MAX_STEP_SECONDS: f32 = 0.1;

/// Spring coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringConfig {
    /// Stiffness in 1/s^2. Higher values track the pointer more tightly.
    pub stiffness: f32,
    /// 1.0 is critical damping (no overshoot); below 1.0 oscillates.
    pub damping_ratio: f32,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stiffness: 170.0,
            damping_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracking {
    target: [f32; 2],
    position: [f32; 2],
    velocity: [f32; 2],
    raw_velocity: [f32; 2],
    last_sample: Instant,
}

/// Two-state pointer follower: uninitialized until the first sample, tracking
/// afterwards.
#[derive(Debug, Clone)]
pub struct PointerSpring {
    config: SpringConfig,
    tracking: Option<Tracking>,
}

impl PointerSpring {
    pub fn new(config: SpringConfig) -> Self {
        Self {
            config,
            tracking: None,
        }
    }

    /// Whether at least one sample has been observed.
    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    /// Feeds a raw pointer sample.
    ///
    /// The first sample initializes position and target in place and reports
    /// zero velocity; a derivative needs two points. Later samples estimate
    /// velocity as displacement over elapsed milliseconds, clamped to zero
    /// when the elapsed time is not positive or the quotient is not finite.
    pub fn push_sample(&mut self, position: [f32; 2], at: Instant) {
        match self.tracking.as_mut() {
            None => {
                self.tracking = Some(Tracking {
                    target: position,
                    position,
                    velocity: [0.0, 0.0],
                    raw_velocity: [0.0, 0.0],
                    last_sample: at,
                });
            }
            Some(tracking) => {
                let elapsed_ms = at
                    .checked_duration_since(tracking.last_sample)
                    .map(|d| d.as_secs_f32() * 1_000.0)
                    .unwrap_or(0.0);
                let previous = tracking.target;
                tracking.raw_velocity = if elapsed_ms > 0.0 {
                    let vx = (position[0] - previous[0]) / elapsed_ms;
                    let vy = (position[1] - previous[1]) / elapsed_ms;
                    if vx.is_finite() && vy.is_finite() {
                        [vx, vy]
                    } else {
                        [0.0, 0.0]
                    }
                } else {
                    [0.0, 0.0]
                };
                tracking.target = position;
                tracking.last_sample = at;
            }
        }
    }

    /// Integrates the spring over `dt_seconds` toward the latest target.
    ///
    /// Semi-implicit Euler; the step is clamped so a stalled loop cannot
    /// inject a huge impulse.
    pub fn advance(&mut self, dt_seconds: f32) {
        let Some(tracking) = self.tracking.as_mut() else {
            return;
        };
        let dt = dt_seconds.clamp(0.0, MAX_STEP_SECONDS);
        if dt <= 0.0 {
            return;
        }
        let k = self.config.stiffness.max(0.0);
        let c = 2.0 * self.config.damping_ratio.max(0.0) * k.sqrt();
        for axis in 0..2 {
            let displacement = tracking.target[axis] - tracking.position[axis];
            let accel = k * displacement - c * tracking.velocity[axis];
            tracking.velocity[axis] += accel * dt;
            tracking.position[axis] += tracking.velocity[axis] * dt;
        }
    }

    /// Eased position, or `None` before the first sample.
    pub fn eased_position(&self) -> Option<[f32; 2]> {
        self.tracking.map(|t| t.position)
    }

    /// Latest raw sample position (the spring target).
    pub fn target(&self) -> Option<[f32; 2]> {
        self.tracking.map(|t| t.target)
    }

    /// Delta-based velocity estimate of the raw samples, units per
    /// millisecond. Zero until two samples with positive elapsed time exist.
    pub fn raw_velocity(&self) -> [f32; 2] {
        self.tracking
            .map(|t| t.raw_velocity)
            .unwrap_or([0.0, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spring() -> PointerSpring {
        PointerSpring::new(SpringConfig::default())
    }

    #[test]
    fn uninitialized_until_first_sample() {
        let mut s = spring();
        assert!(!s.is_tracking());
        assert_eq!(s.eased_position(), None);
        s.push_sample([3.0, 4.0], Instant::now());
        assert!(s.is_tracking());
        assert_eq!(s.eased_position(), Some([3.0, 4.0]));
        assert_eq!(s.raw_velocity(), [0.0, 0.0]);
    }

    #[test]
    fn estimates_velocity_in_units_per_millisecond() {
        let mut s = spring();
        let t0 = Instant::now();
        s.push_sample([0.0, 0.0], t0);
        s.push_sample([16.0, 0.0], t0 + Duration::from_millis(16));
        let [vx, vy] = s.raw_velocity();
        assert!((vx - 1.0).abs() < 1e-4);
        assert!(vy.abs() < 1e-6);
    }

    #[test]
    fn zero_elapsed_sample_clamps_velocity() {
        let mut s = spring();
        let t0 = Instant::now();
        s.push_sample([0.0, 0.0], t0);
        s.push_sample([500.0, 500.0], t0);
        assert_eq!(s.raw_velocity(), [0.0, 0.0]);
    }

    #[test]
    fn out_of_order_sample_clamps_velocity() {
        let mut s = spring();
        let t0 = Instant::now() + Duration::from_millis(100);
        s.push_sample([0.0, 0.0], t0);
        s.push_sample([50.0, 0.0], t0 - Duration::from_millis(50));
        assert_eq!(s.raw_velocity(), [0.0, 0.0]);
    }

    #[test]
    fn eases_toward_target_without_overshoot() {
        let mut s = spring();
        let t0 = Instant::now();
        s.push_sample([0.0, 0.0], t0);
        s.push_sample([100.0, 0.0], t0 + Duration::from_millis(8));

        let mut last_x = 0.0;
        for _ in 0..600 {
            s.advance(1.0 / 120.0);
            let [x, _] = s.eased_position().unwrap();
            assert!(x >= last_x - 1e-3, "critical damping must not overshoot back");
            assert!(x <= 100.0 + 1e-2, "must not overshoot past the target");
            last_x = x;
        }
        assert!((last_x - 100.0).abs() < 1.0, "settled at {last_x}");
    }

    #[test]
    fn advance_before_first_sample_is_a_noop() {
        let mut s = spring();
        s.advance(1.0);
        assert_eq!(s.eased_position(), None);
    }

    #[test]
    fn huge_step_is_clamped() {
        let mut s = spring();
        let t0 = Instant::now();
        s.push_sample([0.0, 0.0], t0);
        s.push_sample([10.0, 0.0], t0 + Duration::from_millis(8));
        s.advance(30.0);
        let [x, _] = s.eased_position().unwrap();
        assert!(x.is_finite());
        assert!(x.abs() < 1_000.0);
    }
}
