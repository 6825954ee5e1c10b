use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tabulae::diagnostics::format_diagnostic;
use tabulae::interpreter::{Error, Interpreter};

/// Tabulae - a small language for building and querying tables
#[derive(Parser, Debug)]
#[command(name = "tabulae")]
#[command(about = "Run Tabulae scripts or start a REPL", long_about = None)]
struct Args {
    /// Disable ANSI colour in error diagnostics
    #[arg(long)]
    no_color: bool,

    /// Script to run (.tadb); starts a REPL when omitted
    script: Option<PathBuf>,
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    // TABULAE_LOG wins over RUST_LOG; default to WARN if neither is set
    let filter = EnvFilter::try_from_env("TABULAE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn flush_output(interp: &mut Interpreter) {
    for line in interp.take_output() {
        println!("{line}");
    }
}

fn report_error(error: &Error, filename: &str, source: &str, colored: bool) {
    eprint!("{}", format_diagnostic(error, filename, source, colored));
}

fn print_tables(interp: &Interpreter) {
    let env = interp.environment();
    if env.tables().next().is_none() {
        println!("No tables defined");
        return;
    }
    for (name, table) in env.tables() {
        println!(
            "{name} [{}] ({} rows)",
            table.columns().join(", "),
            table.row_count()
        );
    }
}

fn interpret_from_file(path: &Path, colored: bool) -> bool {
    if path.extension().map_or(true, |ext| ext != "tadb") {
        eprintln!("Error: Tabulae files must have .tadb extension");
        return false;
    }

    let mut interp = Interpreter::new();
    let result = interp.run_file(path);

    // lines printed before a failure are still shown
    flush_output(&mut interp);

    match result {
        Ok(()) => true,
        Err(error) => {
            let source = std::fs::read_to_string(path).unwrap_or_default();
            report_error(&error, &path.display().to_string(), &source, colored);
            false
        }
    }
}

fn interpret_from_prompt(colored: bool) -> bool {
    let mut interp = Interpreter::new();
    let stdin = std::io::stdin();
    let mut input = String::new();

    println!("Tabulae REPL (type 'exit' to quit)");

    loop {
        print!(">>> ");
        if let Err(error) = std::io::stdout().flush() {
            eprintln!("Error writing prompt: {error}");
            return false;
        }

        // clear previous input
        input.clear();

        match stdin.read_line(&mut input) {
            Ok(0) => return true, // EOF
            Ok(_) => (),
            Err(error) => {
                eprintln!("Error reading line: {error}");
                return false;
            }
        }

        let line = input.trim();
        match line {
            "" => continue,
            "exit" => return true,
            ":tables" => {
                print_tables(&interp);
                continue;
            }
            _ => (),
        }

        let result = interp.run(line);
        flush_output(&mut interp);
        if let Err(error) = result {
            report_error(&error, "<repl>", line, colored);
        }

        if interp.should_exit() {
            println!("Exiting due to runfile command");
            return true;
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let colored = !args.no_color;
    let result = match &args.script {
        Some(script) => interpret_from_file(script, colored),
        None => interpret_from_prompt(colored),
    };

    if result {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
