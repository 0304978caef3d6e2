//! Sweep driver.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{DriverConfig, FailurePolicy};
use crate::error::{Error, Result};
use crate::output::{self, ResultsFile};
use crate::rate::Rate;
use crate::runner::{Invocation, RunStatus, SimRunner};

/// Summary of a finished sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub output_path: PathBuf,
    /// Status of every run, in sweep order.
    pub runs: Vec<(Rate, RunStatus)>,
}

impl SweepReport {
    pub fn failed_runs(&self) -> impl Iterator<Item = &(Rate, RunStatus)> {
        self.runs.iter().filter(|(_, status)| !status.is_success())
    }
}

/// Drives the simulator through a sweep of injection rates.
///
/// Runs are strictly sequential: the banner for a value is written, the
/// simulator is run to completion, and only then the next value is
/// processed. Banners and progress messages are also written to `console`.
pub struct Driver<R: SimRunner, W: Write> {
    config: DriverConfig,
    runner: R,
    console: W,
}

impl<R: SimRunner, W: Write> Driver<R, W> {
    pub fn new(config: DriverConfig, runner: R, console: W) -> Self {
        Driver {
            config,
            runner,
            console,
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.runner, self.console)
    }

    /// Runs the whole sweep against the simulator config at the given path.
    ///
    /// The results file is recreated before the first run. Unsuccessful
    /// simulator runs are handled according to the configured
    /// [`FailurePolicy`].
    ///
    /// [`FailurePolicy`]: ../config/enum.FailurePolicy.html
    pub fn run(&mut self, config_path: impl AsRef<Path>) -> Result<SweepReport> {
        let config_path = config_path.as_ref();
        let output_path = output::output_path_for(config_path, &self.config.output_dir)?;
        if !config_path.exists() {
            warn!(
                "simulator config not found at {}, passing it on anyway",
                config_path.display()
            );
        }

        let precision = self.config.sweep.precision();
        let values = self.config.sweep.values()?;
        info!(
            "starting sweep of {} values using config {}, results go to {}",
            values.len(),
            config_path.display(),
            output_path.display()
        );

        let mut results = ResultsFile::create(&output_path)?;
        let mut runs = Vec::with_capacity(values.len());

        for pir in values {
            if self.runner.interrupted() {
                return Err(Error::Interrupted(pir));
            }
            results.write_banner(&pir.format_with(precision), &mut self.console)?;

            let invocation = Invocation {
                config_path: config_path.to_path_buf(),
                pir,
                arrival: self.config.arrival.clone(),
            };
            let status = self.runner.run(&invocation, results.sink()?)?;
            if self.runner.interrupted() {
                // simulator died from the same signal that interrupted us
                return Err(Error::Interrupted(pir));
            }

            if !status.is_success() {
                warn!("simulator run for pir = {} failed: {}", pir, status);
                if let RunStatus::SpawnFailed(e) = &status {
                    results.write_note(&format!("failed to start simulator: {}", e))?;
                }
                if self.config.on_failure == FailurePolicy::Abort {
                    return Err(Error::SimulatorFailed(pir, status.to_string()));
                }
            }

            writeln!(self.console, "Completed PIR = {:.2}", pir)?;
            runs.push((pir, status));
        }

        writeln!(
            self.console,
            "Execution complete. Results saved to {}",
            output_path.display()
        )?;
        let report = SweepReport { output_path, runs };
        let failed = report.failed_runs().count();
        if failed > 0 {
            warn!("{} of {} simulator runs failed", failed, report.runs.len());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;

    use super::*;
    use crate::output::banner;
    use crate::sweep::SweepSpec;

    /// Stands in for the simulator, printing a line per run.
    #[derive(Default)]
    struct FakeRunner {
        seen: Vec<Invocation>,
        fail_on: Vec<String>,
        /// Run that gets killed together with the driver.
        interrupt_on: Option<String>,
        interrupted: bool,
    }

    impl SimRunner for FakeRunner {
        fn interrupted(&self) -> bool {
            self.interrupted
        }

        fn run(&mut self, invocation: &Invocation, mut stdout: File) -> Result<RunStatus> {
            writeln!(stdout, "sim output for {}", invocation.pir)?;
            self.seen.push(invocation.clone());
            if self.interrupt_on.as_deref() == Some(invocation.pir.to_string().as_str()) {
                self.interrupted = true;
                Ok(RunStatus::Failed(None))
            } else if self.fail_on.contains(&invocation.pir.to_string()) {
                Ok(RunStatus::Failed(Some(1)))
            } else {
                Ok(RunStatus::Success)
            }
        }
    }

    fn list_config(values: &[&str], dir: &Path) -> DriverConfig {
        DriverConfig {
            sweep: SweepSpec::List {
                values: values.iter().map(|v| v.parse().unwrap()).collect(),
            },
            output_dir: dir.to_path_buf(),
            ..DriverConfig::default()
        }
    }

    #[test]
    fn banners_precede_each_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = list_config(&["0.01", "0.02", "0.03"], dir.path());
        let mut driver = Driver::new(config, FakeRunner::default(), Vec::new());

        let report = driver.run("configs/bar.yaml").unwrap();
        assert_eq!(report.output_path, dir.path().join("results_bar.txt"));
        assert_eq!(report.runs.len(), 3);

        let text = fs::read_to_string(&report.output_path).unwrap();
        let expected = format!(
            "{}sim output for 0.01\n{}sim output for 0.02\n{}sim output for 0.03\n",
            banner("0.01"),
            banner("0.02"),
            banner("0.03")
        );
        assert_eq!(text, expected);

        let (runner, console) = driver.into_parts();
        let console = String::from_utf8(console).unwrap();
        assert!(console.starts_with(&banner("0.01")));
        assert!(console.contains("Completed PIR = 0.02\n"));
        assert!(console.ends_with(&format!(
            "Execution complete. Results saved to {}\n",
            report.output_path.display()
        )));

        let pirs: Vec<String> = runner.seen.iter().map(|i| i.pir.to_string()).collect();
        assert_eq!(pirs, vec!["0.01", "0.02", "0.03"]);
        assert!(runner
            .seen
            .iter()
            .all(|i| i.config_path == Path::new("configs/bar.yaml") && i.arrival.is_none()));
    }

    #[test]
    fn banner_uses_sweep_precision() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            output_dir: dir.path().to_path_buf(),
            ..DriverConfig::preset("poisson").unwrap()
        };
        let mut driver = Driver::new(config, FakeRunner::default(), Vec::new());
        let report = driver.run("poisson.yaml").unwrap();

        let text = fs::read_to_string(&report.output_path).unwrap();
        assert!(text.contains("RUNNING FOR PIR = 0.005\n"));
        assert!(text.contains("RUNNING FOR PIR = 0.010\n"));

        let (runner, console) = driver.into_parts();
        // flag values stay as listed
        assert_eq!(runner.seen[1].pir.to_string(), "0.01");
        assert_eq!(runner.seen[1].arrival.as_deref(), Some("poisson"));
        let console = String::from_utf8(console).unwrap();
        assert!(console.contains("Completed PIR = 0.01\n"));
        assert!(console.contains("Completed PIR = 0.05\n"));
    }

    #[test]
    fn rerun_truncates_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        let config = list_config(&["0.01"], dir.path());
        let mut driver = Driver::new(config, FakeRunner::default(), Vec::new());

        let first = driver.run("bar.yaml").unwrap();
        let first_text = fs::read_to_string(&first.output_path).unwrap();
        let second = driver.run("other/bar.yaml").unwrap();
        assert_eq!(first.output_path, second.output_path);
        assert_eq!(
            fs::read_to_string(&second.output_path).unwrap(),
            first_text
        );
    }

    #[test]
    fn failures_are_ignored_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = list_config(&["0.01", "0.02", "0.03"], dir.path());
        let runner = FakeRunner {
            fail_on: vec!["0.02".to_string()],
            ..FakeRunner::default()
        };
        let mut driver = Driver::new(config, runner, Vec::new());
        let report = driver.run("bar.yaml").unwrap();
        assert_eq!(report.runs.len(), 3);
        assert_eq!(report.failed_runs().count(), 1);
        assert_eq!(report.runs[1].1, RunStatus::Failed(Some(1)));
    }

    #[test]
    fn abort_policy_stops_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            on_failure: FailurePolicy::Abort,
            ..list_config(&["0.01", "0.02", "0.03"], dir.path())
        };
        let runner = FakeRunner {
            fail_on: vec!["0.02".to_string()],
            ..FakeRunner::default()
        };
        let mut driver = Driver::new(config, runner, Vec::new());
        match driver.run("bar.yaml") {
            Err(Error::SimulatorFailed(pir, _)) => assert_eq!(pir.to_string(), "0.02"),
            r => panic!("expected simulator failure, got {:?}", r),
        }
        let (runner, _) = driver.into_parts();
        assert_eq!(runner.seen.len(), 2);
        let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
        assert!(!text.contains("RUNNING FOR PIR = 0.03"));
    }

    #[test]
    fn interrupt_stops_before_next_banner() {
        let dir = tempfile::tempdir().unwrap();
        let config = list_config(&["0.01", "0.02", "0.03"], dir.path());
        let runner = FakeRunner {
            interrupt_on: Some("0.02".to_string()),
            ..FakeRunner::default()
        };
        let mut driver = Driver::new(config, runner, Vec::new());
        match driver.run("bar.yaml") {
            Err(Error::Interrupted(pir)) => assert_eq!(pir.to_string(), "0.02"),
            r => panic!("expected interruption, got {:?}", r),
        }

        let (runner, console) = driver.into_parts();
        assert_eq!(runner.seen.len(), 2);
        let console = String::from_utf8(console).unwrap();
        assert!(console.contains("Completed PIR = 0.01\n"));
        assert!(!console.contains("Completed PIR = 0.02"));
        assert!(!console.contains("RUNNING FOR PIR = 0.03"));
        let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
        assert!(!text.contains("RUNNING FOR PIR = 0.03"));
    }

    #[test]
    fn invalid_sweep_leaves_no_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            sweep: SweepSpec::Arithmetic {
                start: "0.1".parse().unwrap(),
                step: "0".parse().unwrap(),
                end: "0.2".parse().unwrap(),
            },
            output_dir: dir.path().to_path_buf(),
            ..DriverConfig::default()
        };
        let mut driver = Driver::new(config, FakeRunner::default(), Vec::new());
        assert!(driver.run("bar.yaml").is_err());
        assert!(!dir.path().join("results_bar.txt").exists());
    }

    #[test]
    fn missing_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = list_config(&["0.01", "0.02"], &dir.path().join("results"));
        let mut driver = Driver::new(config, FakeRunner::default(), std::io::sink());
        let report = driver.run("mesh.yaml").unwrap();
        assert_eq!(report.output_path, dir.path().join("results/results_mesh.txt"));
        let text = fs::read_to_string(&report.output_path).unwrap();
        assert_eq!(text.matches("RUNNING FOR PIR").count(), 2);
    }

    #[test]
    fn uniform_preset_runs_twenty_times() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            output_dir: dir.path().to_path_buf(),
            ..DriverConfig::preset("uniform").unwrap()
        };
        let mut driver = Driver::new(config, FakeRunner::default(), std::io::sink());
        let report = driver.run("mesh.yaml").unwrap();
        assert_eq!(report.runs.len(), 20);
        assert_eq!(report.runs[19].0.to_string(), "0.20");
    }
}
