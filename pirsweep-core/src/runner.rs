//! Simulator invocation.
//!
//! The driver hands each run over to a [`SimRunner`]. [`ProcessRunner`] is
//! the implementation used in practice: it spawns the simulator binary,
//! points its standard output at the results file and blocks until it
//! exits, while watching a shared flag that's lowered on interrupt.
//!
//! [`SimRunner`]: trait.SimRunner.html
//! [`ProcessRunner`]: struct.ProcessRunner.html

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rate::Rate;

/// Interval at which a running simulator is checked on.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the interrupt flag after the simulator was killed by
/// a signal. A terminal Ctrl-C reaches the child and the driver at the same
/// time, and the child can be gone before the flag is lowered.
pub const INTERRUPT_GRACE: Duration = Duration::from_millis(100);

/// Single simulator run.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Path to the simulator's own config file, passed as `-config`.
    pub config_path: PathBuf,
    /// Injection rate, passed as `-pir`.
    pub pir: Rate,
    /// Optional arrival process label, appended as the last argument.
    pub arrival: Option<String>,
}

impl Invocation {
    /// Simulator arguments: `-config <path> -pir <value> [label]`.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-config"),
            self.config_path.clone().into_os_string(),
            OsString::from("-pir"),
            OsString::from(self.pir.to_string()),
        ];
        if let Some(label) = &self.arrival {
            args.push(OsString::from(label));
        }
        args
    }
}

/// Outcome of a single simulator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Process exited unsuccessfully. Exit code is missing if it was
    /// terminated by a signal.
    Failed(Option<i32>),
    /// Process could not be started at all.
    SpawnFailed(String),
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        *self == RunStatus::Success
    }
}

impl From<ExitStatus> for RunStatus {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            RunStatus::Success
        } else {
            RunStatus::Failed(status.code())
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed(Some(code)) => write!(f, "exited with code {}", code),
            RunStatus::Failed(None) => write!(f, "terminated by signal"),
            RunStatus::SpawnFailed(e) => write!(f, "failed to start: {}", e),
        }
    }
}

/// Executes simulator runs.
pub trait SimRunner {
    /// Runs the simulator once, blocking until it's done. Everything the
    /// simulator prints to standard output goes to `stdout`.
    ///
    /// Returned errors are fatal to the whole sweep, failures of the
    /// simulator itself are reported through [`RunStatus`].
    ///
    /// [`RunStatus`]: enum.RunStatus.html
    fn run(&mut self, invocation: &Invocation, stdout: File) -> Result<RunStatus>;

    /// Whether the sweep was interrupted and should not go on.
    fn interrupted(&self) -> bool {
        false
    }
}

/// Runs the simulator as an external process.
pub struct ProcessRunner {
    program: PathBuf,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl AsRef<Path>) -> ProcessRunner {
        ProcessRunner {
            program: program.as_ref().to_path_buf(),
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Uses the given flag to decide whether to keep going. Once the flag
    /// is lowered the current simulator process is killed.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> ProcessRunner {
        self.running = running;
        self
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn wait(&self, child: &mut Child, pir: Rate) -> Result<RunStatus> {
        loop {
            if !self.is_running() {
                warn!("interrupted, killing simulator process {}", child.id());
                // the child may have exited on its own in the meantime
                if let Err(e) = child.kill() {
                    debug!("failed killing simulator process: {}", e);
                }
                child.wait()?;
                return Err(Error::Interrupted(pir));
            }
            match child.try_wait()? {
                Some(status) => {
                    if status.code().is_none() && self.is_running() {
                        trace!("simulator killed by a signal, checking for interrupt");
                        thread::sleep(INTERRUPT_GRACE);
                    }
                    if !self.is_running() {
                        return Err(Error::Interrupted(pir));
                    }
                    return Ok(status.into());
                }
                None => thread::sleep(self.poll_interval),
            }
        }
    }
}

impl SimRunner for ProcessRunner {
    fn interrupted(&self) -> bool {
        !self.is_running()
    }

    fn run(&mut self, invocation: &Invocation, stdout: File) -> Result<RunStatus> {
        if !self.is_running() {
            return Err(Error::Interrupted(invocation.pir));
        }
        let args = invocation.args();
        debug!("running: {} {:?}", self.program.display(), args);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            // simulator parses the rate with the C library
            .env("LC_ALL", "C")
            .env("LC_NUMERIC", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout));

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(
                    "failed to start simulator at {}: {}",
                    self.program.display(),
                    e
                );
                return Ok(RunStatus::SpawnFailed(e.to_string()));
            }
        };
        trace!("simulator started with pid {}", child.id());
        self.wait(&mut child, invocation.pir)
    }
}

#[test]
fn args_follow_simulator_flags() {
    let mut invocation = Invocation {
        config_path: PathBuf::from("configs/mesh.yaml"),
        pir: "0.005".parse().unwrap(),
        arrival: None,
    };
    let expected: Vec<OsString> = ["-config", "configs/mesh.yaml", "-pir", "0.005"]
        .iter()
        .map(OsString::from)
        .collect();
    assert_eq!(invocation.args(), expected);

    invocation.arrival = Some("poisson".to_string());
    assert_eq!(invocation.args().last(), Some(&OsString::from("poisson")));
    assert_eq!(invocation.args().len(), 5);
}

#[cfg(all(test, unix))]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn process_runner_appends_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let sim = write_script(dir.path(), "sim", "echo \"args: $*\"\necho \"locale: $LC_NUMERIC\"");
    let out_path = dir.path().join("out.txt");
    let out = File::create(&out_path).unwrap();

    let mut runner = ProcessRunner::new(&sim);
    let status = runner
        .run(
            &Invocation {
                config_path: PathBuf::from("a.yaml"),
                pir: "0.01".parse().unwrap(),
                arrival: Some("poisson".to_string()),
            },
            out,
        )
        .unwrap();
    assert_eq!(status, RunStatus::Success);
    let text = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(text, "args: -config a.yaml -pir 0.01 poisson\nlocale: C\n");
}

#[cfg(unix)]
#[test]
fn process_runner_reports_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let sim = write_script(dir.path(), "sim", "exit 3");
    let out = File::create(dir.path().join("out.txt")).unwrap();
    let status = ProcessRunner::new(&sim)
        .run(
            &Invocation {
                config_path: PathBuf::from("a.yaml"),
                pir: "0.01".parse().unwrap(),
                arrival: None,
            },
            out,
        )
        .unwrap();
    assert_eq!(status, RunStatus::Failed(Some(3)));
    assert!(!status.is_success());
}

#[test]
fn missing_binary_is_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = File::create(dir.path().join("out.txt")).unwrap();
    let status = ProcessRunner::new(dir.path().join("no-such-noxim"))
        .run(
            &Invocation {
                config_path: PathBuf::from("a.yaml"),
                pir: "0.01".parse().unwrap(),
                arrival: None,
            },
            out,
        )
        .unwrap();
    match status {
        RunStatus::SpawnFailed(_) => (),
        s => panic!("expected spawn failure, got {:?}", s),
    }
}

#[cfg(unix)]
#[test]
fn lowered_flag_kills_running_simulator() {
    use std::time::Instant;

    let dir = tempfile::tempdir().unwrap();
    let sim = write_script(dir.path(), "sim", "exec sleep 30");
    let out = File::create(dir.path().join("out.txt")).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let mut runner = ProcessRunner::new(&sim).with_running_flag(running.clone());
    let flag = running.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        flag.store(false, Ordering::SeqCst);
    });

    let start = Instant::now();
    let result = runner.run(
        &Invocation {
            config_path: PathBuf::from("a.yaml"),
            pir: "0.01".parse().unwrap(),
            arrival: None,
        },
        out,
    );
    handle.join().unwrap();
    match result {
        Err(Error::Interrupted(_)) => (),
        r => panic!("expected interruption, got {:?}", r),
    }
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn signal_exit_before_flag_is_interruption() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let sim = write_script(
        dir.path(),
        "sim",
        &format!("touch {}\nkill -KILL $$", marker.display()),
    );
    let out = File::create(dir.path().join("out.txt")).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let mut runner = ProcessRunner::new(&sim).with_running_flag(running.clone());
    let flag = running.clone();
    let handle = thread::spawn(move || {
        while !marker.exists() {
            thread::sleep(Duration::from_millis(1));
        }
        flag.store(false, Ordering::SeqCst);
    });

    let result = runner.run(
        &Invocation {
            config_path: PathBuf::from("a.yaml"),
            pir: "0.01".parse().unwrap(),
            arrival: None,
        },
        out,
    );
    handle.join().unwrap();
    match result {
        Err(Error::Interrupted(_)) => (),
        r => panic!("expected interruption, got {:?}", r),
    }
    assert!(runner.interrupted());
}

#[cfg(unix)]
#[test]
fn signal_exit_without_interrupt_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let sim = write_script(dir.path(), "sim", "kill -KILL $$");
    let out = File::create(dir.path().join("out.txt")).unwrap();
    let mut runner = ProcessRunner::new(&sim);
    let status = runner
        .run(
            &Invocation {
                config_path: PathBuf::from("a.yaml"),
                pir: "0.01".parse().unwrap(),
                arrival: None,
            },
            out,
        )
        .unwrap();
    assert_eq!(status, RunStatus::Failed(None));
    assert!(!runner.interrupted());
}
