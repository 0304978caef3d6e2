//! Driver configuration.
//!
//! Configuration can be read from a `toml` file, built from one of the
//! named presets, or put together by hand. Every field has a default, so an
//! empty file describes the uniform sweep against `./noxim`.
//!
//! ```toml
//! simulator = "./bin/noxim"
//! arrival = "poisson"
//! on_failure = "abort"
//!
//! [sweep]
//! kind = "list"
//! values = [0.005, 0.01, 0.02]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::sweep::SweepSpec;
use crate::{DEFAULT_SIMULATOR, PRESETS, PRESET_POISSON, PRESET_UNIFORM};

/// What to do when a single simulator run doesn't succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log a warning and carry on with the next sweep value.
    Ignore,
    /// Stop the sweep right after the failed run.
    Abort,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Ignore
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(FailurePolicy::Ignore),
            "abort" => Ok(FailurePolicy::Abort),
            _ => Err(Error::Other(format!(
                "unknown failure policy: {} (expected \"ignore\" or \"abort\")",
                s
            ))),
        }
    }
}

/// Serializable configuration for the sweep driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Path to the simulator binary.
    #[serde(default = "default_simulator")]
    pub simulator: PathBuf,
    /// Arrival process label passed as the last simulator argument.
    #[serde(default)]
    pub arrival: Option<String>,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Directory the results file is created in.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    // kept last, tables have to follow plain values in toml
    #[serde(default = "SweepSpec::uniform")]
    pub sweep: SweepSpec,
}

fn default_simulator() -> PathBuf {
    PathBuf::from(DEFAULT_SIMULATOR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            simulator: default_simulator(),
            arrival: None,
            on_failure: FailurePolicy::default(),
            output_dir: default_output_dir(),
            sweep: SweepSpec::uniform(),
        }
    }
}

impl DriverConfig {
    /// Creates config from one of the built-in presets.
    ///
    /// * `uniform` sweeps 0.01 to 0.20 in steps of 0.01
    /// * `poisson` goes through a fixed list of low rates, with the
    ///   `poisson` arrival label
    pub fn preset(name: &str) -> Result<DriverConfig> {
        match name {
            PRESET_UNIFORM => Ok(DriverConfig::default()),
            PRESET_POISSON => Ok(DriverConfig {
                sweep: SweepSpec::poisson(),
                arrival: Some(PRESET_POISSON.to_string()),
                ..DriverConfig::default()
            }),
            _ => Err(Error::UnknownPreset(format!(
                "{} (available: {})",
                name,
                PRESETS.join(", ")
            ))),
        }
    }

    /// Reads config from a `toml` file at the given path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<DriverConfig> {
        let path = path.as_ref();
        debug!("reading driver config from: {}", path.display());
        let file_str = fs::read_to_string(path)?;
        DriverConfig::from_str(&file_str)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Other(e.to_string()))
    }
}

impl FromStr for DriverConfig {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[test]
fn empty_config_is_uniform_preset() {
    let config: DriverConfig = "".parse().unwrap();
    assert_eq!(config, DriverConfig::preset("uniform").unwrap());
    assert_eq!(config.simulator, PathBuf::from("./noxim"));
    assert_eq!(config.on_failure, FailurePolicy::Ignore);
}

#[test]
fn poisson_preset_carries_label() {
    let config = DriverConfig::preset("poisson").unwrap();
    assert_eq!(config.arrival.as_deref(), Some("poisson"));
    assert_eq!(config.sweep, SweepSpec::poisson());
    assert!(DriverConfig::preset("bursty").is_err());
}

#[test]
fn parse_full_config() {
    let config: DriverConfig = r#"
        simulator = "/opt/noxim/bin/noxim"
        arrival = "poisson"
        on_failure = "abort"
        output_dir = "out"

        [sweep]
        kind = "list"
        values = [0.005, 0.01]
    "#
    .parse()
    .unwrap();
    assert_eq!(config.simulator, PathBuf::from("/opt/noxim/bin/noxim"));
    assert_eq!(config.on_failure, FailurePolicy::Abort);
    assert_eq!(config.output_dir, PathBuf::from("out"));
    assert_eq!(config.sweep.values().unwrap().len(), 2);
}

#[test]
fn unknown_policy_is_rejected() {
    assert!("on_failure = \"retry\"".parse::<DriverConfig>().is_err());
    assert!("retry".parse::<FailurePolicy>().is_err());
}

#[test]
fn config_survives_toml_round_trip() {
    let config = DriverConfig::preset("poisson").unwrap();
    let text = config.to_toml_string().unwrap();
    let parsed: DriverConfig = text.parse().unwrap();
    assert_eq!(parsed, config);
}
