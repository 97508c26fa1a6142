//! Virtual machine runner.
//!
//! Assembles a source file and executes it to completion.
//!
//! # Usage
//! ```text
//! corevm <program.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program.asm`: Assembly source file to run
//!
//! # Options
//! - `-g, --debug`: Step instruction by instruction, showing the register
//!   file after each step (press enter to continue)
//! - `--memory <bytes>`: Working-memory size (defaults to 64 KiB)
//!
//! In debug mode registers written by the last instruction are highlighted
//! and marked with `*`.

use corevm::assembler::assemble_file;
use corevm::interpreter::Interpreter;
use corevm::memory::DEFAULT_MEMORY_SIZE;
use corevm::{error, info};
use std::env;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut debug = false;
    let mut memory_size = DEFAULT_MEMORY_SIZE;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--debug" | "-g" => {
                debug = true;
                i += 1;
            }
            "--memory" => {
                i += 1;
                if i >= args.len() {
                    error!("--memory requires an argument");
                    process::exit(1);
                }
                memory_size = args[i].parse::<usize>().unwrap_or_else(|_| {
                    error!("Invalid memory size: '{}' is not a valid number", args[i]);
                    process::exit(1);
                });
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let program = match assemble_file(input_path) {
        Ok(p) => p,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    let mut vm = Interpreter::with_memory_size(&program, memory_size);

    let result = if debug {
        vm.run_with_hook(0, |vm| {
            render_registers(vm);
            wait_for_enter();
        })
    } else {
        vm.run(0)
    };

    match result {
        Ok(acc) => {
            render_registers(&vm);
            info!("Execution finished, ACC = {:#010x}", acc);
        }
        Err(e) => {
            render_registers(&vm);
            error!("Execution failed: {}", e);
            process::exit(1);
        }
    }
}

/// Prints the register file, highlighting registers written by the last
/// instruction.
fn render_registers(vm: &Interpreter<'_>) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    for (reg, value, modified) in vm.registers().snapshot() {
        let mut spec = ColorSpec::new();
        if modified {
            spec.set_fg(Some(Color::Green)).set_bold(true);
        }
        let _ = stdout.set_color(&spec);
        let marker = if modified { '*' } else { ' ' };
        let _ = writeln!(stdout, "{:>4}{} {:#010x}", reg.mnemonic(), marker, value);
        let _ = stdout.reset();
    }
    let _ = writeln!(stdout);
}

fn wait_for_enter() {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

const USAGE: &str = "\
Virtual Machine Runner

USAGE:
    {program} <program.asm> [OPTIONS]

ARGS:
    <program.asm>    Assembly source file to run

OPTIONS:
    -g, --debug         Step through the program, showing registers
    --memory <bytes>    Working-memory size (defaults to 65536)
    -h, --help          Print this help message

EXAMPLES:
    # Run a program
    {program} program.asm

    # Step through a program
    {program} program.asm --debug
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
