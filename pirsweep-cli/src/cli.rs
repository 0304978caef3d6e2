//! Application definition.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use pirsweep::routing::{self, RoutingTable, Shortcut};
use pirsweep::{Driver, DriverConfig, FailurePolicy, ProcessRunner, PRESETS};

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

pub const EXIT_SUCCESS: i32 = 0;
/// Required argument was not provided.
pub const EXIT_USAGE: i32 = 1;
/// Sweep could not be completed.
pub const EXIT_FAILURE: i32 = 2;

pub const USAGE: &str = "Usage: pirsweep [OPTIONS] <config-file.yaml>\n\
                         Run `pirsweep --help` for more information.";

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("pirsweep")
        .setting(AppSettings::ArgsNegateSubcommands)
        .setting(AppSettings::VersionlessSubcommands)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run the noxim simulator over a sweep of packet injection rates.\n\
                Output of every run is collected in results_<config-name>.txt")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))
        .arg(Arg::with_name("config")
            .value_name("config-file.yaml")
            .help("Simulator config file, passed on with every run"))
        .arg(Arg::with_name("sim")
            .display_order(1)
            .long("sim")
            .short("s")
            .takes_value(true)
            .value_name("path")
            .help("Path to the simulator binary [default: ./noxim]"))
        .arg(Arg::with_name("sweep")
            .display_order(2)
            .long("sweep")
            .takes_value(true)
            .value_name("preset")
            .possible_values(PRESETS)
            .help("Use one of the built-in sweeps [default: uniform]"))
        .arg(Arg::with_name("driver-config")
            .display_order(3)
            .long("driver-config")
            .short("c")
            .takes_value(true)
            .value_name("path")
            .help("Read driver settings from a toml file"))
        .arg(Arg::with_name("arrival")
            .display_order(4)
            .long("arrival")
            .short("a")
            .takes_value(true)
            .value_name("label")
            .help("Arrival process label appended to the simulator arguments"))
        .arg(Arg::with_name("on-failure")
            .display_order(5)
            .long("on-failure")
            .takes_value(true)
            .value_name("policy")
            .possible_values(&["ignore", "abort"])
            .help("What to do when a simulator run fails [default: ignore]"))
        .arg(Arg::with_name("output-dir")
            .display_order(6)
            .long("output-dir")
            .short("o")
            .takes_value(true)
            .value_name("dir")
            .help("Directory to create the results file in [default: .]"))

        // table subcommand
        .subcommand(SubCommand::with_name("table")
            .display_order(10)
            .about("Generate a routing table for a mesh with shortcut links")
            .long_about("Generate a routing table for a mesh with shortcut links.\n\n\
            Rows are source nodes, columns destination nodes, values output \n\
            ports (0-3 north, east, south, west, 4 local). Shortcuts take \n\
            precedence over XY routing. Without any --shortcut arguments the \n\
            default 8x4 mesh uses its four built-in shortcuts.")
            .arg(Arg::with_name("width")
                .long("width")
                .takes_value(true)
                .value_name("nodes")
                .default_value("8")
                .help("Number of mesh columns"))
            .arg(Arg::with_name("height")
                .long("height")
                .takes_value(true)
                .value_name("nodes")
                .default_value("4")
                .help("Number of mesh rows"))
            .arg(Arg::with_name("shortcut")
                .long("shortcut")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("a:b:port")
                .help("Shortcut link between nodes a and b using the given port"))
            .arg(Arg::with_name("no-shortcuts")
                .long("no-shortcuts")
                .conflicts_with("shortcut")
                .help("Plain XY routing, without any shortcuts"))
            .arg(Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .value_name("path")
                .help("Write the table to a file instead of standard output"))
        )
}

/// Runs based on specified subcommand, returning the exit code.
pub fn start(matches: ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        ("table", Some(m)) => start_table(m),
        _ => start_sweep(&matches),
    }
}

fn start_sweep(matches: &ArgMatches) -> Result<i32> {
    let config_path = match matches.value_of_os("config") {
        Some(p) => PathBuf::from(p),
        None => {
            println!("{}", USAGE);
            return Ok(EXIT_USAGE);
        }
    };

    setup_log_verbosity(matches);

    let config = driver_config(matches)?;
    debug!("driver config: {:?}", config);

    // lowering the flag kills the simulator process currently running
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed setting interrupt handler")?;

    let runner = ProcessRunner::new(&config.simulator).with_running_flag(running);
    let mut driver = Driver::new(config, runner, io::stdout());
    let report = driver.run(&config_path)?;

    let failed = report.failed_runs().count();
    if failed > 0 {
        info!(
            "{} runs failed: {}",
            failed,
            report
                .failed_runs()
                .map(|(pir, _)| pir.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(EXIT_SUCCESS)
}

/// Puts together driver config from the config file, the selected preset
/// and individual options, in that order of precedence from lowest.
fn driver_config(matches: &ArgMatches) -> Result<DriverConfig> {
    let mut config = match matches.value_of("driver-config") {
        Some(path) => DriverConfig::from_file(path)
            .with_context(|| format!("failed reading driver config at {}", path))?,
        None => DriverConfig::default(),
    };
    if let Some(preset) = matches.value_of("sweep") {
        let preset = DriverConfig::preset(preset)?;
        config.sweep = preset.sweep;
        config.arrival = preset.arrival;
    }
    if let Some(sim) = matches.value_of_os("sim") {
        config.simulator = PathBuf::from(sim);
    }
    if let Some(arrival) = matches.value_of("arrival") {
        config.arrival = Some(arrival.to_string());
    }
    if let Some(policy) = matches.value_of("on-failure") {
        config.on_failure = policy.parse::<FailurePolicy>()?;
    }
    if let Some(dir) = matches.value_of_os("output-dir") {
        config.output_dir = PathBuf::from(dir);
    }
    Ok(config)
}

fn start_table(matches: &ArgMatches) -> Result<i32> {
    setup_log_verbosity(matches);

    let width = parse_dimension(matches, "width")?;
    let height = parse_dimension(matches, "height")?;
    let shortcuts = match matches.values_of("shortcut") {
        Some(values) => values
            .map(|s| s.parse::<Shortcut>())
            .collect::<pirsweep::Result<Vec<_>>>()?,
        None if matches.is_present("no-shortcuts") => Vec::new(),
        None if width == routing::DEFAULT_WIDTH && height == routing::DEFAULT_HEIGHT => {
            routing::default_shortcuts()
        }
        None => Vec::new(),
    };
    debug!("{}x{} mesh with shortcuts: {:?}", width, height, shortcuts);

    let table = RoutingTable::xy(width, height, &shortcuts)?;
    match matches.value_of("output") {
        Some(path) => {
            fs::write(path, table.to_string())
                .with_context(|| format!("failed writing routing table to {}", path))?;
            info!("routing table written to {}", path);
        }
        None => print!("{}", table),
    }
    Ok(EXIT_SUCCESS)
}

fn parse_dimension(matches: &ArgMatches, name: &str) -> Result<usize> {
    let value = matches
        .value_of(name)
        .ok_or_else(|| Error::msg(format!("missing {}", name)))?;
    value
        .parse::<usize>()
        .with_context(|| format!("invalid {}: {}", name, value))
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    if let Err(e) = TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed) {
        eprintln!("failed setting up logger: {:?}", e);
    }
}
