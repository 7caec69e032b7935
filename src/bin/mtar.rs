use std::{
    ffi::OsString,
    io::{self, BufWriter, Write},
    process::ExitCode,
};

use anyhow::Result;
use clap::{CommandFactory, Parser};

use mtar::{
    archive::TarWriter,
    builder::{Archiver, RunContext},
    cmdline::{self, USAGE},
    identity::SystemIdentities,
};

/// mtar
///
/// Writes a tar file built from SRC[:DEST[:OPTS]] mappings to standard output.
///
/// Only describes the command: arguments are processed left to right by [`cmdline::process`],
/// so `--`, `-h` and `-V` keep their meaning there.
#[derive(Debug, Parser)]
#[clap(name = "mtar", version)]
struct App {}

fn run(args: Vec<OsString>) -> Result<()> {
    let out = BufWriter::new(io::stdout().lock());
    let mut archiver = Archiver::new(TarWriter::new(out), SystemIdentities, RunContext::new());
    cmdline::process(&mut archiver, args)?;
    archiver.finish()?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| writeln!(buf, "mtar: {}", record.args()))
        .init();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    if args.first().is_some_and(|arg| arg == "--version") {
        print!("{}", App::command().render_version());
        return ExitCode::SUCCESS;
    }
    if cmdline::wants_usage(&args) {
        eprint!("{USAGE}");
        return ExitCode::from(2);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mtar: {err:#}");
            ExitCode::FAILURE
        }
    }
}
