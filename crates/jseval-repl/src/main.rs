//! jseval CLI entry point.
//!
//! Usage:
//!   jseval                     # Interactive REPL
//!   jseval -c <code>           # Evaluate code and exit
//!   jseval script.js           # Evaluate a file

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jseval_kernel::{EvalConfig, Evaluator, Status};
use jseval_repl::format::{detect_context, format_record};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            jseval_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("jseval {} ({})", env!("CARGO_PKG_VERSION"), env!("JSEVAL_GIT_HASH"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let code = args.get(2).context("-c requires a code argument")?;
            evaluate_once(code)
        }

        Some(path) if !path.starts_with('-') => run_script(path),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'jseval --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"jseval v{}

Usage:
  jseval                       Interactive REPL
  jseval -c <code>             Evaluate code and exit
  jseval <script.js>           Evaluate a script file

Options:
  -c <code>                    Evaluate a code string and exit
  -h, --help                   Show this help
  -V, --version                Show version

Exit status is 0 when the code produced a value or no value, 1 on a
syntax, compile or runtime error.

Environment:
  RUST_LOG                     Log filter, e.g. RUST_LOG=jseval::console=info

Examples:
  jseval -c '1 + 1'
  jseval -c 'for (let i = 0; i < 3; i++) {{ i }}'
  jseval report.js
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Evaluate a script file.
fn run_script(path: &str) -> Result<ExitCode> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {path}"))?;

    // Skip shebang if present
    let source = if source.starts_with("#!") {
        source.lines().skip(1).collect::<Vec<_>>().join("\n")
    } else {
        source
    };

    evaluate_once(&source)
}

/// Evaluate `source`, print the terminal record and map it to an exit code.
fn evaluate_once(source: &str) -> Result<ExitCode> {
    let runtime = jseval_repl::build_runtime()?;
    let evaluator = Evaluator::new(EvalConfig::named("cli"), jseval_repl::default_bindings());
    let records = jseval_repl::evaluate_blocking(&runtime, &evaluator, source)?;

    let context = detect_context();
    let terminal = records
        .iter()
        .find(|r| r.status.is_terminal())
        .context("evaluation ended without a terminal record")?;
    let output = format_record(terminal, context).unwrap_or_default();

    match terminal.status {
        Status::Success => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Status::NoReturnValue => {
            eprintln!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!("{output}");
            Ok(ExitCode::FAILURE)
        }
    }
}
