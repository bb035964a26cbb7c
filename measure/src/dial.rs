//! Dial scales for the speed gauge
//!
//! Each scale maps a throughput value onto a needle position in `[0, 1]`
//! through a fixed table of breakpoints with linear interpolation between
//! neighbours. Breakpoints are strictly increasing in both value and
//! fraction, so the mapping is monotonically non-decreasing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DialScale {
    #[default]
    Scale1000,
    Scale500,
    Scale100,
}

/// (speed, fraction) breakpoints
const BREAKPOINTS_1000: &[(f64, f64)] = &[
    (0.0, 0.0),
    (10.0, 0.1),
    (50.0, 0.3),
    (100.0, 0.5),
    (300.0, 0.75),
    (1000.0, 1.0),
];

const BREAKPOINTS_500: &[(f64, f64)] = &[
    (0.0, 0.0),
    (10.0, 0.12),
    (20.0, 0.24),
    (50.0, 0.42),
    (100.0, 0.63),
    (200.0, 0.84),
    (300.0, 1.0),
];

const BREAKPOINTS_100: &[(f64, f64)] = &[
    (0.0, 0.0),
    (1.0, 0.08),
    (5.0, 0.23),
    (10.0, 0.38),
    (20.0, 0.55),
    (30.0, 0.70),
    (50.0, 0.87),
    (75.0, 0.95),
    (100.0, 1.0),
];

/// (speed, angle in degrees) labels drawn around the dial
const MARKS_1000: &[(u32, f64)] = &[
    (0, 150.0),
    (10, 170.0),
    (20, 190.0),
    (50, 220.0),
    (100, 260.0),
    (200, 300.0),
    (300, 330.0),
    (600, 360.0),
    (1000, 390.0),
];

const MARKS_500: &[(u32, f64)] = &[
    (0, 150.0),
    (10, 175.0),
    (20, 200.0),
    (50, 235.0),
    (100, 280.0),
    (200, 325.0),
    (300, 360.0),
    (600, 390.0),
];

const MARKS_100: &[(u32, f64)] = &[
    (0, 150.0),
    (1, 165.0),
    (5, 195.0),
    (10, 225.0),
    (20, 265.0),
    (30, 295.0),
    (50, 335.0),
    (75, 365.0),
    (100, 390.0),
];

impl DialScale {
    pub const ALL: [DialScale; 3] = [DialScale::Scale1000, DialScale::Scale500, DialScale::Scale100];

    pub fn max_value(self) -> f64 {
        match self {
            DialScale::Scale1000 => 1000.0,
            DialScale::Scale500 => 500.0,
            DialScale::Scale100 => 100.0,
        }
    }

    pub fn breakpoints(self) -> &'static [(f64, f64)] {
        match self {
            DialScale::Scale1000 => BREAKPOINTS_1000,
            DialScale::Scale500 => BREAKPOINTS_500,
            DialScale::Scale100 => BREAKPOINTS_100,
        }
    }

    pub fn marks(self) -> &'static [(u32, f64)] {
        match self {
            DialScale::Scale1000 => MARKS_1000,
            DialScale::Scale500 => MARKS_500,
            DialScale::Scale100 => MARKS_100,
        }
    }

    /// Needle position in `[0, 1]` for `speed`
    ///
    /// The speed is clamped to `[0, max_value]` first. Speeds past the last
    /// breakpoint sit at full deflection.
    pub fn progress(self, speed: f64) -> f64 {
        let points = self.breakpoints();
        let speed = if speed.is_nan() {
            0.0
        } else {
            speed.clamp(0.0, self.max_value())
        };

        let (last_value, last_fraction) = points[points.len() - 1];
        if speed >= last_value {
            return last_fraction;
        }

        for pair in points.windows(2) {
            let (lo_value, lo_fraction) = pair[0];
            let (hi_value, hi_fraction) = pair[1];
            if speed == hi_value {
                return hi_fraction;
            }
            if speed < hi_value {
                let t = (speed - lo_value) / (hi_value - lo_value);
                return lo_fraction + (hi_fraction - lo_fraction) * t;
            }
        }

        last_fraction
    }
}

impl fmt::Display for DialScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.max_value() as u32)
    }
}

impl TryFrom<u32> for DialScale {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1000 => Ok(DialScale::Scale1000),
            500 => Ok(DialScale::Scale500),
            100 => Ok(DialScale::Scale100),
            other => Err(format!("Unsupported dial scale {}. Use: 1000, 500, 100", other)),
        }
    }
}

impl From<DialScale> for u32 {
    fn from(scale: DialScale) -> Self {
        scale.max_value() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_endpoints() {
        for scale in DialScale::ALL {
            assert_eq!(scale.progress(0.0), 0.0, "{}", scale);
            assert_eq!(scale.progress(scale.max_value()), 1.0, "{}", scale);
            assert_eq!(scale.progress(-5.0), 0.0);
            assert_eq!(scale.progress(scale.max_value() * 3.0), 1.0);
            assert_eq!(scale.progress(f64::NAN), 0.0);
        }
    }

    #[test]
    fn test_progress_is_monotonic() {
        for scale in DialScale::ALL {
            let mut previous = 0.0;
            let mut speed = 0.0;
            while speed <= scale.max_value() * 1.2 {
                let p = scale.progress(speed);
                assert!(p >= previous, "{}: progress({}) = {} < {}", scale, speed, p, previous);
                assert!((0.0..=1.0).contains(&p));
                previous = p;
                speed += 0.125;
            }
        }
    }

    #[test]
    fn test_breakpoints_strictly_increasing() {
        for scale in DialScale::ALL {
            for pair in scale.breakpoints().windows(2) {
                assert!(pair[1].0 > pair[0].0);
                assert!(pair[1].1 > pair[0].1);
            }
            for pair in scale.marks().windows(2) {
                assert!(pair[1].0 > pair[0].0);
                assert!(pair[1].1 > pair[0].1);
            }
        }
    }

    #[test]
    fn test_progress_interpolates() {
        assert!((DialScale::Scale1000.progress(5.0) - 0.05).abs() < 1e-12);
        assert!((DialScale::Scale1000.progress(75.0) - 0.4).abs() < 1e-12);
        assert!((DialScale::Scale100.progress(15.0) - 0.465).abs() < 1e-12);
        // 300 Mbit/s already pegs the 500 dial
        assert_eq!(DialScale::Scale500.progress(400.0), 1.0);
    }

    #[test]
    fn test_scale_from_config_value() {
        assert_eq!(DialScale::try_from(500).unwrap(), DialScale::Scale500);
        assert!(DialScale::try_from(250).is_err());
        assert_eq!(u32::from(DialScale::Scale100), 100);
    }
}
