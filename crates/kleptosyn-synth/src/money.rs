//! Exact currency amounts.
//!
//! Amounts live in integer minor units. Conversions from sampled `f64`
//! values go through one configured rounding rule so bleed-off chains are
//! reproducible to the cent.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub i64);

impl Amount {
    pub fn minor(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half to even (banker's rounding).
    #[default]
    HalfEven,
    HalfUp,
    TowardZero,
}

impl RoundingMode {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            RoundingMode::HalfEven => value.round_ties_even(),
            RoundingMode::HalfUp => value.round(),
            RoundingMode::TowardZero => value.trunc(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundingConfig {
    #[serde(default = "default_minor_unit_digits")]
    pub minor_unit_digits: u32,
    #[serde(default)]
    pub mode: RoundingMode,
}

fn default_minor_unit_digits() -> u32 {
    2
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            minor_unit_digits: default_minor_unit_digits(),
            mode: RoundingMode::default(),
        }
    }
}

impl RoundingConfig {
    fn scale(&self) -> f64 {
        10f64.powi(self.minor_unit_digits as i32)
    }

    /// Major units to exact minor units.
    pub fn to_minor(&self, major: f64) -> Amount {
        Amount(self.mode.apply(major * self.scale()) as i64)
    }

    pub fn to_major(&self, amount: Amount) -> f64 {
        amount.0 as f64 / self.scale()
    }

    /// The forwarded amount after a hop keeps `fraction` of `incoming`.
    pub fn bleed(&self, incoming: Amount, fraction: f64) -> Amount {
        Amount(self.mode.apply(incoming.0 as f64 * (1.0 - fraction)) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bleed_chain_matches_closed_form() {
        let r = RoundingConfig::default();
        let mut a = r.to_minor(100_000.0);
        assert_eq!(a, Amount(10_000_000));
        let mut hops = vec![a];
        for _ in 0..3 {
            a = r.bleed(a, 0.1);
            hops.push(a);
        }
        assert_eq!(hops, vec![Amount(10_000_000), Amount(9_000_000), Amount(8_100_000), Amount(7_290_000)]);
        assert_eq!(a, r.to_minor(100_000.0 * 0.9f64.powi(3)));
    }

    #[test]
    fn rounding_modes_differ_on_ties() {
        let half_even = RoundingConfig::default();
        let half_up = RoundingConfig {
            mode: RoundingMode::HalfUp,
            ..RoundingConfig::default()
        };
        let trunc = RoundingConfig {
            mode: RoundingMode::TowardZero,
            ..RoundingConfig::default()
        };
        assert_eq!(half_even.bleed(Amount(5), 0.5), Amount(2));
        assert_eq!(half_up.bleed(Amount(5), 0.5), Amount(3));
        assert_eq!(trunc.bleed(Amount(7), 0.5), Amount(3));
    }

    #[test]
    fn zero_digit_currency() {
        let r = RoundingConfig {
            minor_unit_digits: 0,
            ..RoundingConfig::default()
        };
        assert_eq!(r.to_minor(1234.6), Amount(1235));
        assert_eq!(r.to_major(Amount(1235)), 1235.0);
    }
}
