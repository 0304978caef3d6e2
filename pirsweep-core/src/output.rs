//! Results file handling.
//!
//! Every driver invocation produces a single text file holding banners and
//! raw simulator output, in sweep order. The file is recreated at the start
//! of each invocation and only ever appended to afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::{CONFIG_FILE_EXTENSION, RESULTS_FILE_PREFIX};

/// Line framing each banner.
pub const DELIMITER: &str = "==========================================";

/// Derives the results file path for the given simulator config path.
///
/// The directory part is dropped, and so is a trailing `.yaml`, so that
/// `foo/bar.yaml` becomes `<dir>/results_bar.txt`. Other extensions are
/// left in place.
pub fn output_path_for(config_path: impl AsRef<Path>, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let config_path = config_path.as_ref();
    let file_name = config_path
        .file_name()
        .ok_or_else(|| {
            Error::Other(format!(
                "config path has no file name: {}",
                config_path.display()
            ))
        })?
        .to_string_lossy();
    let base = match file_name.strip_suffix(CONFIG_FILE_EXTENSION) {
        Some(stem) if !stem.is_empty() => stem,
        _ => file_name.as_ref(),
    };
    Ok(dir
        .as_ref()
        .join(format!("{}{}.txt", RESULTS_FILE_PREFIX, base)))
}

/// Renders the banner announcing a single run.
pub fn banner(pir: &str) -> String {
    format!(
        "{delim}\nRUNNING FOR PIR = {pir}\n{delim}\n",
        delim = DELIMITER,
        pir = pir
    )
}

/// Append-only results file.
pub struct ResultsFile {
    path: PathBuf,
    file: File,
}

impl ResultsFile {
    /// Creates a fresh, empty results file, removing whatever was at the
    /// path before. Missing parent directories are created.
    pub fn create(path: impl AsRef<Path>) -> Result<ResultsFile> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                debug!("creating output directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        if path.exists() {
            debug!("removing previous results file: {}", path.display());
            fs::remove_file(&path)?;
        }
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;
        Ok(ResultsFile { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the banner for a run to the file and mirrors it to the
    /// console.
    pub fn write_banner<W: Write>(&mut self, pir: &str, console: &mut W) -> Result<()> {
        let text = banner(pir);
        self.file.write_all(text.as_bytes())?;
        self.file.flush()?;
        console.write_all(text.as_bytes())?;
        console.flush()?;
        Ok(())
    }

    /// Appends arbitrary text, used for messages about failed runs.
    pub fn write_note(&mut self, note: &str) -> Result<()> {
        writeln!(self.file, "{}", note)?;
        self.file.flush()?;
        Ok(())
    }

    /// Returns a handle sharing the append position, for use as a child
    /// process's standard output.
    pub fn sink(&self) -> Result<File> {
        Ok(self.file.try_clone()?)
    }
}

#[test]
fn output_path_drops_directory_and_extension() {
    let path = output_path_for("foo/bar.yaml", ".").unwrap();
    assert_eq!(path, Path::new(".").join("results_bar.txt"));
    let path = output_path_for("/abs/dir/mesh_8x4.yaml", "out").unwrap();
    assert_eq!(path, Path::new("out").join("results_mesh_8x4.txt"));
}

#[test]
fn output_path_keeps_other_extensions() {
    let path = output_path_for("cfg/bar.yml", ".").unwrap();
    assert_eq!(path, Path::new(".").join("results_bar.yml.txt"));
    let path = output_path_for("bar", ".").unwrap();
    assert_eq!(path, Path::new(".").join("results_bar.txt"));
    assert!(output_path_for("..", ".").is_err());
}

#[test]
fn create_truncates_previous_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results_bar.txt");
    fs::write(&path, "stale content\n").unwrap();

    let mut results = ResultsFile::create(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "");

    let mut console = Vec::new();
    results.write_banner("0.01", &mut console).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, banner("0.01"));
    assert_eq!(String::from_utf8(console).unwrap(), text);
    assert!(text.contains("RUNNING FOR PIR = 0.01"));
}

#[test]
fn sink_appends_after_banner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results_x.txt");
    let mut results = ResultsFile::create(&path).unwrap();
    results.write_banner("0.02", &mut std::io::sink()).unwrap();
    let mut sink = results.sink().unwrap();
    sink.write_all(b"sim output\n").unwrap();
    results.write_note("done").unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, format!("{}sim output\ndone\n", banner("0.02")));
}

#[test]
fn create_makes_missing_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path_for("mesh.yaml", dir.path().join("results/nested")).unwrap();
    let mut results = ResultsFile::create(&path).unwrap();
    results.write_note("first").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");

    // plain file name, no parent to create
    let results = ResultsFile::create(dir.path().join("results_top.txt")).unwrap();
    assert!(results.path().exists());
}
