use std::{fs, io::{self, BufRead, Write}, path::{Path, PathBuf}, process::ExitCode};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use lox::{Config, VM};

const EX_USAGE: u8 = 64;
const EX_IOERR: u8 = 74;
const EX_CONFIG: u8 = 78;

#[derive(Parser)]
#[command(name = "lox")]
#[command(about = "A bytecode interpreter for the Lox language", long_about = None)]
struct Cli {
    /// Script to run. Starts a REPL when omitted.
    script: Option<PathBuf>,

    /// TOML file with interpreter limits and debug flags
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every instruction before it executes
    #[arg(long)]
    trace: bool,

    /// Log the disassembly of every compiled function
    #[arg(long)]
    print_code: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(EX_USAGE);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .without_time()
        .init();

    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::from(EX_CONFIG);
            }
        },
        None => Config::default(),
    };
    if cli.trace || cli.print_code {
        config.debug.master = true;
        config.debug.trace_execution |= cli.trace;
        config.debug.print_code |= cli.print_code;
    }

    let mut vm = VM::new(config);
    match cli.script {
        Some(path) => run_file(&mut vm, &path),
        None => repl(&mut vm),
    }
}

fn repl(vm: &mut VM) -> ExitCode {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(EX_IOERR);
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Unable to read input: {}", e);
                return ExitCode::from(EX_IOERR);
            }
            None => {
                println!();
                return ExitCode::SUCCESS;
            }
        };
        match line.trim() {
            "quit" | "q" => return ExitCode::SUCCESS,
            "" => continue,
            _ => {}
        }
        if let Err(e) = vm.interpret(&line) {
            eprintln!("{}", e);
        }
    }
}

fn run_file(vm: &mut VM, path: &Path) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Unable to read file '{}': {}", path.display(), e);
            return ExitCode::from(EX_IOERR);
        }
    };

    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
