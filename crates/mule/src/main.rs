// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

// The command-line front end:
//
//     mule [-htvV] [-i path ...] <object-file>
//
// Include paths are searched in order: the current directory, the
// `-i` options, then the colon-separated entries of MULE_PATH.

use std::path::PathBuf;
use std::process::ExitCode;

use mule_context::loader::SearchPaths;
use mule_context::Machine;
use mule_processor::clock::SystemClock;
use mule_processor::interpreter::run_program;
use mule_processor::terminal::StdioTerminal;
use mule_processor::{Interpreter, Services};

const USAGE: &str = "\
USAGE: mule [-htvV] [-i path ...] <object-file>

  -h        show this help and exit
  -v        verbose: report loading progress and the module table
  -t        trace every executed instruction (implies -v)
  -V        show the version and exit
  -i path   add an include path (may be repeated)

The environment variable MULE_PATH may hold additional include
paths, separated by colons.";

struct Options {
    verbose: bool,
    trace: bool,
    include: Vec<PathBuf>,
    file_name: String,
}

enum ParsedCommand {
    Run(Options),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<ParsedCommand, String> {
    let mut verbose = false;
    let mut trace = false;
    let mut include = Vec::new();
    let mut file_name = None;

    let mut index = 0;
    while index < args.len() {
        let arg = &args[index];
        match arg.as_str() {
            "-h" => return Ok(ParsedCommand::Help),
            "-V" => return Ok(ParsedCommand::Version),
            "-v" => verbose = true,
            "-t" => {
                trace = true;
                verbose = true;
            }
            "-i" => {
                index += 1;
                let path = args
                    .get(index)
                    .ok_or_else(|| "option -i needs a path".to_owned())?;
                include.push(PathBuf::from(path));
            }
            _ if arg.starts_with('-') => {
                return Err(format!("unknown option \"{}\"", arg));
            }
            _ => {
                if file_name.is_some() {
                    return Err("more than one object file given".to_owned());
                }
                file_name = Some(arg.clone());
            }
        }
        index += 1;
    }

    let file_name = file_name.ok_or_else(|| "no object file given".to_owned())?;
    Ok(ParsedCommand::Run(Options {
        verbose,
        trace,
        include,
        file_name,
    }))
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(ParsedCommand::Help) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(ParsedCommand::Version) => {
            println!("mule {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Ok(ParsedCommand::Run(options)) => options,
        Err(message) => {
            eprintln!("mule: {}", message);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let mut machine = Machine::new(SearchPaths::build(&options.include));
    machine.verbose = options.verbose;
    machine.trace = options.trace;

    let mut services = Services::new(Box::new(StdioTerminal::new()), Box::new(SystemClock));
    let interpreter = Interpreter::new();

    let result = run_program(&interpreter, &mut machine, &mut services, &options.file_name);
    services.terminal.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("mule: {}", error);
            ExitCode::FAILURE
        }
    }
}
