//! Throughput display units
//!
//! All throughput inside the pipeline is kept in Mbit/s (the base unit).
//! Conversion here is purely multiplicative and never rounds; rounding
//! happens only in [`format_speed`].

use crate::dial::DialScale;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    /// Mbit/s (base unit)
    #[default]
    Mbit,
    /// MB/s, 1 MB/s = 8 Mbit/s
    Mbyte,
    /// KB/s, 1 Mbit/s = 125 KB/s
    Kbyte,
}

impl DisplayUnit {
    pub fn label(self) -> &'static str {
        match self {
            DisplayUnit::Mbit => "Mbit/s",
            DisplayUnit::Mbyte => "MB/s",
            DisplayUnit::Kbyte => "KB/s",
        }
    }

    /// Convert a base-unit (Mbit/s) value into this unit
    pub fn convert_from_mbit(self, mbit: f64) -> f64 {
        match self {
            DisplayUnit::Mbit => mbit,
            DisplayUnit::Mbyte => mbit / 8.0,
            DisplayUnit::Kbyte => mbit * 125.0,
        }
    }

    /// Convert a value expressed in this unit back to Mbit/s
    pub fn convert_to_mbit(self, value: f64) -> f64 {
        match self {
            DisplayUnit::Mbit => value,
            DisplayUnit::Mbyte => value * 8.0,
            DisplayUnit::Kbyte => value / 125.0,
        }
    }

    /// Converted speed used for the dial needle, clamped to the scale maximum
    pub fn dial_speed(self, mbit: f64, scale: DialScale) -> f64 {
        self.convert_from_mbit(mbit).min(scale.max_value())
    }
}

/// Convert `value` from one unit to another
pub fn convert(value: f64, from: DisplayUnit, to: DisplayUnit) -> f64 {
    if from == to {
        return value;
    }
    to.convert_from_mbit(from.convert_to_mbit(value))
}

/// Format a base-unit speed for display in `unit` (two decimals)
pub fn format_speed(mbit: f64, unit: DisplayUnit) -> String {
    format!("{:.2} {}", unit.convert_from_mbit(mbit), unit.label())
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DisplayUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mbit" | "mbit/s" | "mbps" => Ok(DisplayUnit::Mbit),
            "mbyte" | "mb/s" | "mb" => Ok(DisplayUnit::Mbyte),
            "kbyte" | "kb/s" | "kb" => Ok(DisplayUnit::Kbyte),
            other => Err(format!("Unknown unit '{}'. Use: mbit, mbyte, kbyte", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_factors() {
        assert_eq!(DisplayUnit::Mbyte.convert_from_mbit(8.0), 1.0);
        assert_eq!(DisplayUnit::Kbyte.convert_from_mbit(1.0), 125.0);
        assert_eq!(convert(1.0, DisplayUnit::Mbyte, DisplayUnit::Kbyte), 1000.0);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        for x in [0.001, 0.5, 1.0, 3.3, 87.654321, 940.0, 123_456.789] {
            let there = convert(x, DisplayUnit::Mbit, DisplayUnit::Mbyte);
            let back = convert(there, DisplayUnit::Mbyte, DisplayUnit::Mbit);
            assert!((back - x).abs() <= x * 1e-12, "{} -> {}", x, back);

            let there = convert(x, DisplayUnit::Mbit, DisplayUnit::Kbyte);
            let back = convert(there, DisplayUnit::Kbyte, DisplayUnit::Mbit);
            assert!((back - x).abs() <= x * 1e-12, "{} -> {}", x, back);
        }
    }

    #[test]
    fn test_conversion_does_not_round() {
        let v = DisplayUnit::Mbyte.convert_from_mbit(1.0);
        assert_eq!(v, 0.125);
        assert_eq!(format_speed(2.0, DisplayUnit::Mbyte), "0.25 MB/s");
    }

    #[test]
    fn test_dial_speed_clamps_to_scale() {
        assert_eq!(DisplayUnit::Mbit.dial_speed(250.0, DialScale::Scale100), 100.0);
        assert_eq!(DisplayUnit::Mbyte.dial_speed(400.0, DialScale::Scale100), 50.0);
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!("MB/s".parse::<DisplayUnit>().unwrap(), DisplayUnit::Mbyte);
        assert_eq!("kbyte".parse::<DisplayUnit>().unwrap(), DisplayUnit::Kbyte);
        assert!("furlongs".parse::<DisplayUnit>().is_err());
    }
}
