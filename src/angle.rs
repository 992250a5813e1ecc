use anyhow::Result;
use tracing::{debug, trace};

use crate::{
    ANGLE_RANGE_MAX, Axis,
    config::{AxisConfig, PulseRange},
    hardware::PwmOutput,
};

/// clamp an angle to `[min, max]`, further restricted to the mechanical range
///
/// never panics, an inverted range collapses onto its lower bound
pub fn clamp_angle(angle: i32, min: i32, max: i32) -> i32 {
    let low = min.clamp(0, ANGLE_RANGE_MAX);
    let high = max.clamp(low, ANGLE_RANGE_MAX);
    angle.clamp(low, high)
}

/// map an angle to a servo duty-cycle value
///
/// # Arguments
///
/// * `angle` - requested angle in degrees, clamped to `[min, max]`
/// * `min`, `max` - allowed range of the channel
/// * `pulse` - duty-cycle values for 0° and 180°
///
/// # Returns
///
/// * the duty-cycle, linearly interpolated over [0, 180] degrees
///
pub fn angle_to_duty(angle: i32, min: i32, max: i32, pulse: PulseRange) -> u16 {
    let clamped = clamp_angle(angle, min, max);
    let low = f64::from(pulse.min.min(pulse.max));
    let high = f64::from(pulse.max.max(pulse.min));
    let duty = (f64::from(clamped) / f64::from(ANGLE_RANGE_MAX)) * (high - low) + low;
    trace!("angle {} (clamped {}) -> duty {:.2}", angle, clamped, duty);
    duty.round() as u16
}

/// one servo of the mount together with its commanded angle
#[derive(Debug, Clone)]
pub struct Actuator {
    axis: Axis,
    channel: u8,
    min: i32,
    max: i32,
    pulse: PulseRange,
    /// last commanded angle, always inside `[min, max]`
    angle: i32,
}

impl Actuator {
    pub fn new(axis: Axis, config: &AxisConfig, pulse: PulseRange) -> Self {
        Actuator {
            axis,
            channel: config.channel,
            min: config.min,
            max: config.max,
            pulse,
            angle: clamp_angle(config.home, config.min, config.max),
        }
    }

    /// clamp `angle`, write the resulting duty-cycle to the channel and remember the angle
    pub fn set_angle<P: PwmOutput + ?Sized>(&mut self, pwm: &mut P, angle: i32) -> Result<u16> {
        let duty = angle_to_duty(angle, self.min, self.max, self.pulse);
        pwm.set_duty(self.channel, duty)?;
        self.angle = clamp_angle(angle, self.min, self.max);
        debug!("{} servo at {}° (duty {:#06X})", self.axis, self.angle, duty);
        Ok(duty)
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPwm;

    const PULSE: PulseRange = PulseRange {
        min: 0x1000,
        max: 0x3000,
    };

    #[test]
    fn test_endpoints() {
        assert_eq!(angle_to_duty(0, 0, 180, PULSE), 0x1000);
        assert_eq!(angle_to_duty(180, 0, 180, PULSE), 0x3000);
        assert_eq!(angle_to_duty(90, 0, 180, PULSE), 0x2000);
        // 45 / 180 * 0x2000 + 0x1000
        assert_eq!(angle_to_duty(45, 0, 180, PULSE), 0x1800);
    }

    #[test]
    fn test_rounding() {
        // 1 / 180 * 8192 = 45.51 -> 46
        assert_eq!(angle_to_duty(1, 0, 180, PULSE), 0x1000 + 46);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(
            angle_to_duty(20, 30, 150, PULSE),
            angle_to_duty(30, 30, 150, PULSE)
        );
        assert_eq!(
            angle_to_duty(170, 30, 150, PULSE),
            angle_to_duty(150, 30, 150, PULSE)
        );
        assert_eq!(angle_to_duty(-400, -90, 400, PULSE), PULSE.min);
        assert_eq!(angle_to_duty(400, -90, 400, PULSE), PULSE.max);
        assert_eq!(clamp_angle(50, 120, 60), 120);
    }

    #[test]
    fn test_bounded_and_monotonic() {
        for (min, max) in [(0, 180), (30, 150), (90, 90), (0, 45)] {
            let mut previous = 0;
            for angle in -20..=200 {
                let duty = angle_to_duty(angle, min, max, PULSE);
                assert!(duty >= PULSE.min && duty <= PULSE.max, "duty {:#X}", duty);
                assert!(duty >= previous, "not monotonic at {}", angle);
                previous = duty;
            }
            assert_eq!(
                angle_to_duty(min - 10, min, max, PULSE),
                angle_to_duty(min, min, max, PULSE)
            );
        }
    }

    #[test]
    fn test_actuator_writes_channel() -> Result<()> {
        let config = AxisConfig {
            channel: 3,
            min: 30,
            max: 150,
            step: 30,
            home: 200,
        };
        let mut pwm = MockPwm::new();
        let mut actuator = Actuator::new(Axis::Tilt, &config, PULSE);
        assert_eq!(actuator.angle(), 150);
        let duty = actuator.set_angle(&mut pwm, 10)?;
        assert_eq!(actuator.angle(), 30);
        assert_eq!(duty, angle_to_duty(30, 0, 180, PULSE));
        assert_eq!(pwm.writes(), vec![(3, duty)]);
        Ok(())
    }
}
