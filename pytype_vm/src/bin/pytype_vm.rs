#![deny(clippy::expect_used)]
//! Infer a `.pyi` stub for a compiled module
//!
//! The input is a code object serialized as JSON, with instructions grouped
//! into blocks.
//!
//! Usage:
//!   pytype-vm module.json                  # print the inferred stub
//!   pytype-vm --check module.json          # print diagnostics only
//!   pytype-vm --config opts.toml -o out.pyi module.json

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use pytype_vm::bytecode::JsonCodeProvider;
use pytype_vm::{Options, VirtualMachine};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn usage() -> ! {
    eprintln!("Usage: pytype-vm [--config FILE] [--check] [--output FILE] [--verbose] <code.json>");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut input_file = None;
    let mut config_file = None;
    let mut output_file = None;
    let mut check_only = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_file = Some(path.clone()),
                    None => usage(),
                }
            }
            "-o" | "--output" => {
                i += 1;
                match args.get(i) {
                    Some(path) => output_file = Some(path.clone()),
                    None => usage(),
                }
            }
            "--check" => check_only = true,
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => usage(),
            arg if !arg.starts_with('-') => input_file = Some(arg.to_string()),
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                usage();
            }
        }
        i += 1;
    }

    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install logger: {}", e);
    }

    let input_file = input_file.unwrap_or_else(|| {
        eprintln!("Error: input file required");
        usage();
    });

    let mut options = match &config_file {
        Some(path) => Options::load(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => Options::default(),
    };
    if options.input.is_none() {
        options.input = Some(input_file.clone());
    }

    let source = fs::read_to_string(&input_file).unwrap_or_else(|e| {
        eprintln!("Error: failed to read input file '{}': {}", input_file, e);
        process::exit(1);
    });

    let mut vm = VirtualMachine::from_source(&JsonCodeProvider, &source, options)
        .and_then(|mut vm| vm.analyze_all_defs().map(|()| vm))
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });

    let output = if check_only {
        vm.context().errorlog.to_string()
    } else {
        let unit = vm.infer_stub().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });
        for diagnostic in vm.context().errorlog.diagnostics() {
            eprintln!("{}", diagnostic);
        }
        pytype_vm_pytd::print_unit(&unit)
    };

    match output_file {
        Some(path) => fs::write(&path, output).unwrap_or_else(|e| {
            eprintln!("Error: failed to write '{}': {}", path, e);
            process::exit(1);
        }),
        None => print!("{}", output),
    }
}
