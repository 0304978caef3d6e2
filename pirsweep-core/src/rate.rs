//! Fixed-point decimal used for injection rates.
//!
//! Rates travel to the simulator as command line text, so the way they are
//! written down matters as much as their value. `Rate` keeps an integer
//! count of `10^-precision` units together with the precision itself. All
//! parsing and formatting is done on those integers, which makes the
//! textual form independent of the host locale: the decimal separator is
//! always a period.
//!
//! Every rate can be brought to `MAX_PRECISION` digits without leaving
//! `u64`; constructors reject unit counts for which that doesn't hold.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;

use crate::error::{Error, Result};

/// Largest supported number of fractional digits.
pub const MAX_PRECISION: u8 = 6;

/// Non-negative decimal with a fixed number of fractional digits.
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    units: u64,
    precision: u8,
}

impl Rate {
    /// Creates a new rate from a count of `10^-precision` units.
    ///
    /// # Example
    ///
    /// ```
    /// # use pirsweep::Rate;
    /// assert_eq!(Rate::new(5, 3).unwrap().to_string(), "0.005");
    /// ```
    pub fn new(units: u64, precision: u8) -> Result<Rate> {
        check_precision(precision)?;
        check_units(units, precision)?;
        Ok(Rate { units, precision })
    }

    /// Unchecked constructor for constants known to be within the supported
    /// precision.
    pub(crate) const fn from_units(units: u64, precision: u8) -> Rate {
        Rate { units, precision }
    }

    /// Converts a float, rounding it to the given number of fractional
    /// digits.
    pub fn from_f64(value: f64, precision: u8) -> Result<Rate> {
        if !value.is_finite() || value < 0. {
            return Err(Error::ParseRateError(format!(
                "rate must be a finite non-negative number, got {}",
                value
            )));
        }
        check_precision(precision)?;
        let scaled = (value * pow10(precision) as f64).round();
        if scaled > max_units(precision) as f64 {
            return Err(Error::ParseRateError(format!("rate too large: {}", value)));
        }
        Rate::new(scaled as u64, precision)
    }

    pub fn units(&self) -> u64 {
        self.units
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Returns the same value expressed with a different number of
    /// fractional digits. Dropping digits rounds half away from zero, which
    /// fails for the few values at the very top of the range.
    pub fn with_precision(&self, precision: u8) -> Result<Rate> {
        let precision = precision.min(MAX_PRECISION);
        Rate::new(rescale(self.units, self.precision, precision), precision)
    }

    /// Formats the rate with exactly `precision` fractional digits.
    pub fn format_with(&self, precision: u8) -> String {
        let precision = precision.min(MAX_PRECISION);
        let units = rescale(self.units, self.precision, precision);
        if precision == 0 {
            format!("{}", units)
        } else {
            let scale = pow10(precision);
            format!(
                "{}.{:0width$}",
                units / scale,
                units % scale,
                width = precision as usize
            )
        }
    }

    /// Approximate value, only meant for reporting.
    pub fn to_f64(&self) -> f64 {
        self.units as f64 / pow10(self.precision) as f64
    }

    /// Brings two rates to a common precision, returning their unit counts.
    pub(crate) fn aligned(&self, other: &Rate) -> (u64, u64, u8) {
        let precision = self.precision.max(other.precision);
        (
            rescale(self.units, self.precision, precision),
            rescale(other.units, other.precision, precision),
            precision,
        )
    }
}

fn pow10(exp: u8) -> u64 {
    10u64.pow(exp as u32)
}

/// Largest unit count at `precision` that still fits once scaled to
/// `MAX_PRECISION` digits.
fn max_units(precision: u8) -> u64 {
    u64::MAX / pow10(MAX_PRECISION - precision)
}

fn check_precision(precision: u8) -> Result<()> {
    if precision > MAX_PRECISION {
        return Err(Error::ParseRateError(format!(
            "precision of {} digits exceeds the maximum of {}",
            precision, MAX_PRECISION
        )));
    }
    Ok(())
}

fn check_units(units: u64, precision: u8) -> Result<()> {
    if units > max_units(precision) {
        return Err(Error::ParseRateError(format!(
            "{} units at precision {} is out of range",
            units, precision
        )));
    }
    Ok(())
}

/// Both precisions are at most `MAX_PRECISION` and `units` is within
/// `max_units(from)`, so scaling up can't overflow. Rounding is done in
/// `u128` as `units + div / 2` may not fit otherwise.
fn rescale(units: u64, from: u8, to: u8) -> u64 {
    if to >= from {
        units * pow10(to - from)
    } else {
        let div = pow10(from - to) as u128;
        ((units as u128 + div / 2) / div) as u64
    }
}

impl PartialEq for Rate {
    fn eq(&self, other: &Rate) -> bool {
        let (a, b, _) = self.aligned(other);
        a == b
    }
}

impl Eq for Rate {}

impl PartialOrd for Rate {
    fn partial_cmp(&self, other: &Rate) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rate {
    fn cmp(&self, other: &Rate) -> Ordering {
        let (a, b, _) = self.aligned(other);
        a.cmp(&b)
    }
}

impl fmt::Display for Rate {
    /// Uses the rate's own precision unless one is given in the format
    /// string, e.g. `{:.2}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = match f.precision() {
            Some(p) => p.min(MAX_PRECISION as usize) as u8,
            None => self.precision,
        };
        f.write_str(&self.format_with(precision))
    }
}

impl FromStr for Rate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Rate> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseRateError("empty string".to_string()));
        }
        if s.contains(',') {
            return Err(Error::ParseRateError(format!(
                "\"{}\": decimal separator must be a period",
                s
            )));
        }
        let (int_part, frac_part) = match s.find('.') {
            Some(idx) => (&s[..idx], &s[idx + 1..]),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::ParseRateError(format!("\"{}\": no digits", s)));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(Error::ParseRateError(format!(
                "\"{}\": expected a non-negative decimal number",
                s
            )));
        }
        if frac_part.len() > MAX_PRECISION as usize {
            return Err(Error::ParseRateError(format!(
                "\"{}\": more than {} fractional digits",
                s, MAX_PRECISION
            )));
        }
        let precision = frac_part.len() as u8;
        let int_units: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse()?
        };
        let frac_units: u64 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse()?
        };
        let units = int_units
            .checked_mul(pow10(precision))
            .and_then(|u| u.checked_add(frac_units))
            .filter(|u| *u <= max_units(precision))
            .ok_or_else(|| Error::ParseRateError(format!("\"{}\": value too large", s)))?;
        Ok(Rate { units, precision })
    }
}

impl serde::Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct RateVisitor;

impl<'de> Visitor<'de> for RateVisitor {
    type Value = Rate;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-negative decimal number or a string holding one")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> core::result::Result<Rate, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> core::result::Result<Rate, E> {
        // shortest round-trip representation keeps the digits as written
        format!("{}", value).parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> core::result::Result<Rate, E> {
        if value < 0 {
            return Err(E::custom(format!("rate must be non-negative, got {}", value)));
        }
        Rate::new(value as u64, 0).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> core::result::Result<Rate, E> {
        Rate::new(value, 0).map_err(E::custom)
    }
}

impl<'de> serde::Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Rate, D::Error> {
        deserializer.deserialize_any(RateVisitor)
    }
}

#[test]
fn parse_keeps_written_precision() {
    let rate: Rate = "0.005".parse().unwrap();
    assert_eq!(rate.units(), 5);
    assert_eq!(rate.precision(), 3);
    assert_eq!(rate.to_string(), "0.005");

    let rate: Rate = ".5".parse().unwrap();
    assert_eq!(rate.to_string(), "0.5");
    let rate: Rate = "2".parse().unwrap();
    assert_eq!(rate.to_string(), "2");
}

#[test]
fn parse_rejects_comma_separator() {
    assert!("0,01".parse::<Rate>().is_err());
    assert!("".parse::<Rate>().is_err());
    assert!(".".parse::<Rate>().is_err());
    assert!("-0.1".parse::<Rate>().is_err());
    assert!("1e-3".parse::<Rate>().is_err());
}

#[test]
fn format_with_rounds_half_up() {
    let rate: Rate = "0.005".parse().unwrap();
    assert_eq!(rate.format_with(2), "0.01");
    assert_eq!(format!("{:.2}", rate), "0.01");
    assert_eq!(format!("{:.4}", rate), "0.0050");
    let rate: Rate = "0.124".parse().unwrap();
    assert_eq!(rate.format_with(2), "0.12");
    let rate: Rate = "1.5".parse().unwrap();
    assert_eq!(rate.format_with(0), "2");
}

#[test]
fn equality_ignores_precision() {
    let a: Rate = "0.01".parse().unwrap();
    let b: Rate = "0.010".parse().unwrap();
    assert_eq!(a, b);
    assert!(a < "0.011".parse::<Rate>().unwrap());
}

#[test]
fn from_f64_rounds_to_precision() {
    assert_eq!(Rate::from_f64(0.1 + 0.2, 2).unwrap().to_string(), "0.30");
    assert!(Rate::from_f64(-0.5, 2).is_err());
    assert!(Rate::from_f64(f64::NAN, 2).is_err());
}

#[test]
fn deserialize_from_float_and_string() {
    #[derive(Deserialize)]
    struct Holder {
        a: Rate,
        b: Rate,
        c: Rate,
    }
    let holder: Holder = toml::from_str("a = 0.005\nb = \"0.20\"\nc = 1").unwrap();
    assert_eq!(holder.a.to_string(), "0.005");
    assert_eq!(holder.b.to_string(), "0.20");
    assert_eq!(holder.c.to_string(), "1");
}

#[test]
fn out_of_range_units_are_rejected() {
    // fits in u64 at one digit but not once brought to six
    assert!("18446744073710.5".parse::<Rate>().is_err());
    assert!("18446744073709.5".parse::<Rate>().is_ok());
    assert!("18446744073.709551615".parse::<Rate>().is_err());
    assert!(Rate::new(u64::MAX, 0).is_err());
    assert!(Rate::new(u64::MAX, MAX_PRECISION).is_ok());
    assert!(Rate::new(1, MAX_PRECISION + 1).is_err());
    assert!(Rate::from_f64(1e300, 2).is_err());

    #[derive(Debug, Deserialize)]
    struct Holder {
        a: Rate,
    }
    assert!(toml::from_str::<Holder>("a = 18446744073710").is_err());
    assert!(toml::from_str::<Holder>("a = 18446744073709").is_ok());
}

#[test]
fn largest_rates_format_and_compare() {
    let max = u64::MAX;
    let top = Rate::new(max, MAX_PRECISION).unwrap();
    // rounding up at the top of the range must not overflow
    assert_eq!(format!("{:.0}", top), (max / 1_000_000 + 1).to_string());
    assert!(top.with_precision(0).is_err());

    let whole = Rate::new(max / 1_000_000, 0).unwrap();
    assert!(whole < top);
    assert_eq!(whole, Rate::new(max / 1_000_000 * 1_000_000, MAX_PRECISION).unwrap());
    assert_eq!(whole.format_with(2), format!("{}.00", max / 1_000_000));
    assert_eq!(whole.with_precision(MAX_PRECISION).unwrap(), whole);
}
