//! This library implements an injection-rate sweep driver for the `noxim`
//! network-on-chip simulator.
//!
//! Programming interface is centered around the [`Driver`] structure. A
//! [`Driver`] is built from a [`DriverConfig`], which describes which
//! simulator binary to call, what sweep of injection rates (PIR values) to
//! go through and what to do when a single simulator run fails. Calling
//! [`Driver::run`] with a path to a simulator configuration file then
//! invokes the simulator once per sweep value, strictly in order, appending
//! everything it prints to a fresh `results_<name>.txt` file.
//!
//! # Rates and locales
//!
//! Injection rates are represented with [`Rate`], a fixed-point decimal.
//! Both parsing and formatting of rates are done on integers, so the values
//! passed to the simulator never depend on the locale of the host machine.
//!
//! # Runners
//!
//! Actual process spawning sits behind the [`SimRunner`] trait. The
//! provided [`ProcessRunner`] calls out to the external binary, while other
//! implementations can be used to substitute the simulator, for example in
//! tests.
//!
//! ## Example
//!
//! ```ignore
//! use pirsweep::{Driver, DriverConfig, ProcessRunner};
//! use std::io;
//!
//! pub fn main() {
//!     let config = DriverConfig::preset("uniform").unwrap();
//!     let runner = ProcessRunner::new(&config.simulator);
//!     let mut driver = Driver::new(config, runner, io::stdout());
//!     driver.run("configs/mesh_8x4.yaml").unwrap();
//! }
//! ```
//!
//! # Routing tables
//!
//! Apart from the driver, the [`routing`] module can generate routing
//! tables for meshes extended with long-range shortcut links, in the format
//! accepted by the simulator's table-based routing.
//!
//! [`Driver`]: driver/struct.Driver.html
//! [`Driver::run`]: driver/struct.Driver.html#method.run
//! [`DriverConfig`]: config/struct.DriverConfig.html
//! [`Rate`]: rate/struct.Rate.html
//! [`SimRunner`]: runner/trait.SimRunner.html
//! [`ProcessRunner`]: runner/struct.ProcessRunner.html
//! [`routing`]: routing/index.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use config::{DriverConfig, FailurePolicy};
pub use driver::{Driver, SweepReport};
pub use error::{Error, Result};
pub use rate::Rate;
pub use runner::{Invocation, ProcessRunner, RunStatus, SimRunner};
pub use sweep::SweepSpec;

pub mod config;
pub mod driver;
pub mod error;
pub mod output;
pub mod rate;
pub mod routing;
pub mod runner;
pub mod sweep;

/// Default path to the simulator binary, relative to the working directory.
pub const DEFAULT_SIMULATOR: &str = "./noxim";

/// Prefix of every results file name.
pub const RESULTS_FILE_PREFIX: &str = "results_";
/// Extension stripped from the simulator configuration file name.
pub const CONFIG_FILE_EXTENSION: &str = ".yaml";

/// Names of the built-in driver presets.
pub const PRESETS: &[&str] = &[PRESET_UNIFORM, PRESET_POISSON];
pub const PRESET_UNIFORM: &str = "uniform";
pub const PRESET_POISSON: &str = "poisson";
