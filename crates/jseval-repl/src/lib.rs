//! jseval REPL: interactive evaluation of script snippets.
//!
//! This REPL provides an interactive interface to the jseval evaluator.
//! It handles:
//! - Meta-commands: `/help`, `/quit`, `/bindings`, `/rewrite`, `/ast`
//! - Evaluation through the staged pipeline, one task per line
//! - Result formatting for terminals and pipes
//! - Command history via rustyline

pub mod format;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use jseval_kernel::{BindingTable, EvalConfig, Evaluator, StageRecord, StaticDirectory};

use format::{detect_context, format_record, format_rewritten, OutputContext};

/// Worker stack size. Evaluation recurses once per nested call in the
/// script; a larger stack means it rarely needs to grow a new segment.
pub const EVAL_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Build the runtime evaluations run on.
pub fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(EVAL_STACK_SIZE)
        .build()
        .context("Failed to create tokio runtime")
}

/// The bindings every front end gets: `add100` and `getUser`.
pub fn default_bindings() -> BindingTable {
    BindingTable::standard(Arc::new(StaticDirectory::new()))
}

/// Run `source` to completion on `runtime`, returning every stage record.
///
/// The evaluation runs as a task on a worker thread, not on the caller's
/// thread, so it gets [`EVAL_STACK_SIZE`].
pub fn evaluate_blocking(runtime: &Runtime, evaluator: &Evaluator, source: &str) -> Result<Vec<StageRecord>> {
    let _guard = runtime.enter();
    let mut task = evaluator.spawn(source);
    runtime.block_on(async move {
        let mut records = Vec::new();
        while let Some(record) = task.records.recv().await {
            records.push(record);
        }
        task.handle.await.context("evaluation task failed")?;
        Ok::<_, anyhow::Error>(records)
    })
}

/// Result from meta-command handling.
#[derive(Debug)]
enum MetaResult {
    /// Continue with optional output
    Continue(Option<String>),
    /// Exit the REPL (caller should save history and exit)
    Exit,
}

/// REPL configuration and state.
pub struct Repl {
    evaluator: Evaluator,
    runtime: Runtime,
    context: OutputContext,
    show_rewritten: bool,
    show_ast: bool,
}

impl Repl {
    /// Create a new REPL with the standard bindings.
    pub fn new() -> Result<Self> {
        Self::with_config(EvalConfig::repl(), default_bindings())
    }

    /// Create a new REPL with a custom configuration and bindings.
    pub fn with_config(config: EvalConfig, bindings: BindingTable) -> Result<Self> {
        Ok(Self {
            evaluator: Evaluator::new(config, bindings),
            runtime: build_runtime()?,
            context: detect_context(),
            show_rewritten: false,
            show_ast: false,
        })
    }

    /// Override the detected output context.
    pub fn with_output_context(mut self, context: OutputContext) -> Self {
        self.context = context;
        self
    }

    /// Process a single line of input.
    /// Returns Ok(None) for empty input, Ok(Some(output)) for output to display,
    /// or the `__REPL_EXIT__` error to signal the REPL should exit.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();

        if trimmed.starts_with('/') {
            return match self.handle_meta_command(trimmed) {
                MetaResult::Continue(output) => Ok(output),
                MetaResult::Exit => Err(anyhow::anyhow!("__REPL_EXIT__")),
            };
        }

        if let Some(meta_result) = self.try_bare_command(trimmed) {
            return match meta_result {
                MetaResult::Continue(output) => Ok(output),
                MetaResult::Exit => Err(anyhow::anyhow!("__REPL_EXIT__")),
            };
        }

        if trimmed.is_empty() {
            return Ok(None);
        }

        if self.show_ast {
            return Ok(Some(match self.evaluator.prepare(trimmed) {
                Ok(prepared) => format!("{:#?}", prepared.program),
                Err(err) => err.to_string(),
            }));
        }

        let records = evaluate_blocking(&self.runtime, &self.evaluator, trimmed)?;
        let mut sections = Vec::new();
        if self.show_rewritten {
            if let Some(rewritten) = records.iter().rev().find_map(|r| r.rewritten.as_deref()) {
                sections.push(format_rewritten(rewritten, self.context));
            }
        }
        sections.extend(records.iter().filter_map(|r| format_record(r, self.context)));
        Ok(Some(sections.join("\n")))
    }

    /// Handle a meta-command (starts with /).
    fn handle_meta_command(&mut self, cmd: &str) -> MetaResult {
        let command = cmd.split_whitespace().next().unwrap_or("");

        match command {
            "/quit" | "/q" | "/exit" => MetaResult::Exit,
            "/help" | "/h" | "/?" => MetaResult::Continue(Some(HELP_TEXT.to_string())),
            "/rewrite" => {
                self.show_rewritten = !self.show_rewritten;
                MetaResult::Continue(Some(format!(
                    "Formatted code display: {}",
                    if self.show_rewritten { "ON" } else { "OFF" }
                )))
            }
            "/ast" => {
                self.show_ast = !self.show_ast;
                MetaResult::Continue(Some(format!(
                    "AST mode: {}",
                    if self.show_ast { "ON" } else { "OFF" }
                )))
            }
            "/bindings" => {
                let bindings = self.evaluator.bindings().describe();
                if bindings.is_empty() {
                    MetaResult::Continue(Some("(no bindings)".to_string()))
                } else {
                    let mut output = String::from("Bindings:\n");
                    for (name, deferred) in bindings {
                        let kind = if deferred { " (deferred)" } else { "" };
                        output.push_str(&format!("  {name}{kind}\n"));
                    }
                    MetaResult::Continue(Some(output.trim_end().to_string()))
                }
            }
            _ => MetaResult::Continue(Some(format!(
                "Unknown command: {}\nType /help or help for available commands.",
                command
            ))),
        }
    }

    /// Try to handle a bare meta-command (without leading /).
    /// Returns Some(result) if it was a recognized command, None otherwise.
    fn try_bare_command(&mut self, cmd: &str) -> Option<MetaResult> {
        match cmd {
            "quit" | "exit" => Some(self.handle_meta_command("/quit")),
            "help" => Some(self.handle_meta_command("/help")),
            _ => None,
        }
    }
}

const HELP_TEXT: &str = r#"jseval REPL

Meta Commands (use with or without /):
  help, /help, /?   Show this help
  quit, /quit, /q   Exit the REPL

Slash-only commands:
  /bindings         List the bindings scripts receive
  /rewrite          Toggle display of the formatted (rewritten) code
  /ast              Toggle AST display mode (shows the rewritten tree
                    instead of evaluating)

Evaluation:
  The value of the last statement is the result; `return` also works.
  Top-level `await` is allowed.

Bindings:
  add100(x)         x + 100
  getUser(id)       Promise for a user, rejects with "Unknown User"

Examples:
  1 + 1                           # 2
  let xs = [1, 2, 3]; xs.map(x => x * 2)
  for (let i = 0; i < 3; i++) { i }   # 2, from the last iteration
  await Promise.resolve(add100(1))
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the REPL.
pub fn run() -> Result<()> {
    println!("jseval v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("Failed to create editor")?;

    let history_path = directories::BaseDirs::new()
        .map(|b| b.data_dir().join("jseval").join("history.txt"));
    if let Some(ref path) = history_path {
        if let Err(e) = rl.load_history(path) {
            // Only log if it's not a "file not found" error (expected on first run)
            let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::new()?;
    println!();

    loop {
        match rl.readline("js> ") {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }

                match repl.process_line(&line) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) if e.to_string() == "__REPL_EXIT__" => {
                        save_history(&mut rl, &history_path);
                        return Ok(());
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);

    Ok(())
}
