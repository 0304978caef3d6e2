//! Command line program for running `noxim` injection-rate sweeps.

#[macro_use]
extern crate log;

extern crate anyhow;
extern crate clap;
extern crate colored;

pub mod cli;

use std::io::{self, Write};
use std::process;

use colored::*;

fn main() {
    // Run the program based on user input
    let code = match cli::start(cli::app().get_matches()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                eprintln!("Caused by:\n{}", e.root_cause())
            }
            cli::EXIT_FAILURE
        }
    };
    let _ = io::stdout().flush();
    process::exit(code);
}
