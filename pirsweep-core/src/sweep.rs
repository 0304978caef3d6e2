//! Sweep specifications.
//!
//! A sweep is the ordered set of injection rates the driver goes through.
//! It's either generated from an inclusive arithmetic progression or given
//! as an explicit list of values.

use crate::error::{Error, Result};
use crate::rate::Rate;

/// Lowest number of fractional digits used when displaying sweep values.
pub const MIN_DISPLAY_PRECISION: u8 = 2;

/// Upper bound on the number of values a single sweep can produce.
pub const MAX_SWEEP_LEN: u64 = 100_000;

/// Describes how the sequence of injection rates is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SweepSpec {
    /// Inclusive progression `start, start + step, ...` up to `end`.
    Arithmetic { start: Rate, step: Rate, end: Rate },
    /// Literal values, used verbatim and in the given order.
    List { values: Vec<Rate> },
}

impl SweepSpec {
    /// Uniform-arrival sweep: 0.01 to 0.20 in steps of 0.01.
    pub fn uniform() -> SweepSpec {
        SweepSpec::Arithmetic {
            start: Rate::from_units(1, 2),
            step: Rate::from_units(1, 2),
            end: Rate::from_units(20, 2),
        }
    }

    /// Poisson-arrival sweep over a short list of low rates.
    pub fn poisson() -> SweepSpec {
        SweepSpec::List {
            values: vec![
                Rate::from_units(5, 3),
                Rate::from_units(1, 2),
                Rate::from_units(2, 2),
                Rate::from_units(3, 2),
                Rate::from_units(5, 2),
            ],
        }
    }

    /// Number of fractional digits used when displaying values of this
    /// sweep.
    pub fn precision(&self) -> u8 {
        let written = match self {
            SweepSpec::Arithmetic { start, step, end } => start
                .precision()
                .max(step.precision())
                .max(end.precision()),
            SweepSpec::List { values } => values.iter().map(|v| v.precision()).max().unwrap_or(0),
        };
        written.max(MIN_DISPLAY_PRECISION)
    }

    /// Computes the ordered sequence of rates.
    ///
    /// Arithmetic sweeps are generated on integers scaled to the common
    /// precision of the three constants, so the end value is included
    /// exactly when it lies on the progression. A start beyond the end
    /// yields an empty sequence.
    pub fn values(&self) -> Result<Vec<Rate>> {
        match self {
            SweepSpec::Arithmetic { start, step, end } => {
                if step.is_zero() {
                    return Err(Error::InvalidSweep("step must be greater than zero".to_string()));
                }
                let precision = self.precision();
                let start_units = start.with_precision(precision)?.units();
                let step_units = step.with_precision(precision)?.units();
                let end_units = end.with_precision(precision)?.units();

                if start_units > end_units {
                    warn!(
                        "sweep start ({}) is past its end ({}), nothing to run",
                        start, end
                    );
                    return Ok(Vec::new());
                }

                let count = (end_units - start_units) / step_units + 1;
                if count > MAX_SWEEP_LEN {
                    return Err(Error::InvalidSweep(format!(
                        "sweep would produce {} values, the limit is {}",
                        count, MAX_SWEEP_LEN
                    )));
                }
                trace!(
                    "generating {} values from {} to {} (step {})",
                    count,
                    start,
                    end,
                    step
                );
                (0..count)
                    .map(|i| Rate::new(start_units + i * step_units, precision))
                    .collect()
            }
            SweepSpec::List { values } => {
                if values.len() as u64 > MAX_SWEEP_LEN {
                    return Err(Error::InvalidSweep(format!(
                        "sweep lists {} values, the limit is {}",
                        values.len(),
                        MAX_SWEEP_LEN
                    )));
                }
                Ok(values.clone())
            }
        }
    }
}

#[test]
fn uniform_sweep_has_twenty_values() {
    let values = SweepSpec::uniform().values().unwrap();
    assert_eq!(values.len(), 20);
    assert_eq!(values.first().unwrap().to_string(), "0.01");
    assert_eq!(values.last().unwrap().to_string(), "0.20");
    for pair in values.windows(2) {
        let diff = pair[1].to_f64() - pair[0].to_f64();
        assert!((diff - 0.01).abs() < 1e-9);
    }
}

#[test]
fn poisson_list_is_used_verbatim() {
    let values = SweepSpec::poisson().values().unwrap();
    let strings: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    assert_eq!(strings, vec!["0.005", "0.01", "0.02", "0.03", "0.05"]);
    assert_eq!(SweepSpec::poisson().precision(), 3);
}

#[test]
fn end_off_progression_is_excluded() {
    let spec = SweepSpec::Arithmetic {
        start: "0.1".parse().unwrap(),
        step: "0.3".parse().unwrap(),
        end: "1".parse().unwrap(),
    };
    let strings: Vec<String> = spec.values().unwrap().iter().map(|v| v.to_string()).collect();
    assert_eq!(strings, vec!["0.10", "0.40", "0.70", "1.00"]);

    let spec = SweepSpec::Arithmetic {
        start: "0.1".parse().unwrap(),
        step: "0.25".parse().unwrap(),
        end: "0.5".parse().unwrap(),
    };
    let strings: Vec<String> = spec.values().unwrap().iter().map(|v| v.to_string()).collect();
    assert_eq!(strings, vec!["0.10", "0.35"]);
}

#[test]
fn zero_step_is_rejected() {
    let spec = SweepSpec::Arithmetic {
        start: "0.1".parse().unwrap(),
        step: "0".parse().unwrap(),
        end: "1".parse().unwrap(),
    };
    assert!(spec.values().is_err());
}

#[test]
fn start_past_end_is_empty() {
    let spec = SweepSpec::Arithmetic {
        start: "0.5".parse().unwrap(),
        step: "0.01".parse().unwrap(),
        end: "0.2".parse().unwrap(),
    };
    assert!(spec.values().unwrap().is_empty());
}

#[test]
fn deserialize_from_toml() {
    let spec: SweepSpec =
        toml::from_str("kind = \"arithmetic\"\nstart = 0.01\nstep = 0.01\nend = 0.05").unwrap();
    assert_eq!(spec.values().unwrap().len(), 5);
    let spec: SweepSpec = toml::from_str("kind = \"list\"\nvalues = [0.3, 0.1]").unwrap();
    let strings: Vec<String> = spec.values().unwrap().iter().map(|v| v.to_string()).collect();
    assert_eq!(strings, vec!["0.3", "0.1"]);
}
