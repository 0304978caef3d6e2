//! Runs the `pirsweep` binary against a stand-in simulator.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn pirsweep(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pirsweep"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

/// Writes an executable shell script acting as the simulator.
#[cfg(unix)]
fn fake_sim(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-noxim");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn missing_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = pirsweep(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: pirsweep"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn poisson_sweep_collects_output_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let sim = fake_sim(dir.path(), "echo \"sim $*\"");
    fs::create_dir(dir.path().join("foo")).unwrap();
    fs::write(dir.path().join("results_bar.txt"), "stale\n").unwrap();

    let output = pirsweep(
        dir.path(),
        &["--sim", sim.to_str().unwrap(), "--sweep", "poisson", "foo/bar.yaml"],
    );
    assert_eq!(output.status.code(), Some(0));

    let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
    assert!(!text.contains("stale"));
    let expected_order = [
        "RUNNING FOR PIR = 0.005",
        "sim -config foo/bar.yaml -pir 0.005 poisson",
        "RUNNING FOR PIR = 0.010",
        "sim -config foo/bar.yaml -pir 0.01 poisson",
        "RUNNING FOR PIR = 0.050",
        "sim -config foo/bar.yaml -pir 0.05 poisson",
    ];
    let mut last = 0;
    for needle in expected_order.iter() {
        let pos = text[last..]
            .find(needle)
            .unwrap_or_else(|| panic!("\"{}\" missing or out of order in:\n{}", needle, text));
        last += pos + needle.len();
    }
    assert_eq!(text.matches("RUNNING FOR PIR").count(), 5);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RUNNING FOR PIR = 0.020"));
    assert!(stdout.contains("Completed PIR = 0.03"));
    assert!(stdout.contains("Execution complete"));
}

#[cfg(unix)]
#[test]
fn failures_continue_unless_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let sim = fake_sim(dir.path(), "echo failing\nexit 1");
    let sim = sim.to_str().unwrap();

    let output = pirsweep(dir.path(), &["--sim", sim, "bar.yaml"]);
    assert_eq!(output.status.code(), Some(0));
    let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
    assert_eq!(text.matches("RUNNING FOR PIR").count(), 20);

    let output = pirsweep(dir.path(), &["--sim", sim, "--on-failure", "abort", "bar.yaml"]);
    assert_eq!(output.status.code(), Some(2));
    let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
    assert_eq!(text.matches("RUNNING FOR PIR").count(), 1);
    assert!(text.contains("failing"));
}

#[cfg(unix)]
#[test]
fn driver_config_file_sets_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let sim = fake_sim(dir.path(), "echo \"$4\"");
    fs::write(
        dir.path().join("driver.toml"),
        format!(
            "simulator = \"{}\"\noutput_dir = \"out/pir\"\n\n[sweep]\nkind = \"arithmetic\"\nstart = 0.1\nstep = 0.05\nend = 0.2\n",
            sim.display()
        ),
    )
    .unwrap();

    let output = pirsweep(dir.path(), &["-c", "driver.toml", "mesh.yaml"]);
    assert_eq!(output.status.code(), Some(0));
    let text = fs::read_to_string(dir.path().join("out/pir/results_mesh.txt")).unwrap();
    let rates: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with('=') && !l.starts_with("RUNNING"))
        .collect();
    assert_eq!(rates, vec!["0.10", "0.15", "0.20"]);
}

/// Whether a process with the given pid is still around.
#[cfg(unix)]
fn is_alive(pid: &str) -> bool {
    Command::new("kill")
        .args(&["-0", pid])
        .stderr(Stdio::null())
        .status()
        .unwrap()
        .success()
}

#[cfg(unix)]
#[test]
fn terminating_driver_kills_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let sim = fake_sim(dir.path(), "echo $$ > sim.pid.tmp\nmv sim.pid.tmp sim.pid\nexec sleep 30");
    let mut driver = Command::new(env!("CARGO_BIN_EXE_pirsweep"))
        .current_dir(dir.path())
        .args(&["--sim", sim.to_str().unwrap(), "bar.yaml"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let pid_path = dir.path().join("sim.pid");
    let start = Instant::now();
    while !pid_path.exists() {
        assert!(start.elapsed() < Duration::from_secs(10), "simulator never started");
        thread::sleep(Duration::from_millis(10));
    }
    let sim_pid = fs::read_to_string(&pid_path).unwrap().trim().to_string();
    assert!(is_alive(&sim_pid));

    let status = Command::new("kill")
        .args(&["-TERM", &driver.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let start = Instant::now();
    let code = loop {
        if let Some(status) = driver.try_wait().unwrap() {
            break status.code();
        }
        if start.elapsed() > Duration::from_secs(10) {
            driver.kill().unwrap();
            panic!("driver did not exit after SIGTERM");
        }
        thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(code, Some(2));
    assert!(!is_alive(&sim_pid));

    let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
    assert_eq!(text.matches("RUNNING FOR PIR").count(), 1);
}

#[test]
fn missing_simulator_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = pirsweep(dir.path(), &["--sim", "./no-such-noxim", "bar.yaml"]);
    assert_eq!(output.status.code(), Some(0));
    let text = fs::read_to_string(dir.path().join("results_bar.txt")).unwrap();
    assert_eq!(text.matches("failed to start simulator").count(), 20);
}

#[test]
fn table_prints_default_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let output = pirsweep(dir.path(), &["table"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows.len(), 32);
    assert_eq!(rows[0].split(' ').count(), 32);
    assert_eq!(rows[0].split(' ').last(), Some("5"));

    let output = pirsweep(dir.path(), &["table", "--width", "2", "--height", "1"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "4 1\n3 4\n");
}
