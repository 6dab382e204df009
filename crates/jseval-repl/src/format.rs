//! Output formatting for the REPL.
//!
//! Stage records are rendered differently for different audiences:
//!
//! - **Interactive** → Colored headings, progress lines suppressed
//! - **Piped** → Plain text, results only on stdout

use std::io::IsTerminal;

use owo_colors::OwoColorize;

use jseval_kernel::{StageRecord, Status};

/// Where output is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContext {
    Interactive,
    Piped,
}

/// Detect the output context based on terminal state.
pub fn detect_context() -> OutputContext {
    if std::io::stdout().is_terminal() && colors_enabled() {
        OutputContext::Interactive
    } else {
        OutputContext::Piped
    }
}

/// Respect `NO_COLOR` and `TERM=dumb`.
fn colors_enabled() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    !std::env::var("TERM").map(|t| t == "dumb").unwrap_or(false)
}

/// Format a terminal record: the result for successes, a heading plus
/// the diagnostic for failures.
///
/// Returns `None` for records that are not terminal.
pub fn format_record(record: &StageRecord, context: OutputContext) -> Option<String> {
    if !record.status.is_terminal() {
        return None;
    }
    let interactive = context == OutputContext::Interactive;
    Some(match record.status {
        Status::Success => record.result.clone().unwrap_or_default(),
        Status::NoReturnValue if interactive => record.message.dimmed().to_string(),
        Status::NoReturnValue => record.message.clone(),
        status => {
            let heading = format!("✗ {}", status.label());
            if interactive {
                format!("{}\n{}", heading.red().bold(), record.message)
            } else {
                format!("{heading}\n{}", record.message)
            }
        }
    })
}

/// Format the rewritten source under a heading.
pub fn format_rewritten(rewritten: &str, context: OutputContext) -> String {
    let heading = "── formatted code ──";
    let body = rewritten.trim_end();
    match context {
        OutputContext::Interactive => format!("{}\n{}", heading.cyan(), body),
        OutputContext::Piped => format!("{heading}\n{body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: Status, message: &str, result: Option<&str>) -> StageRecord {
        StageRecord {
            code: "x".to_string(),
            rewritten: Some("var __ret;\n__ret = x;\nreturn __ret;\n".to_string()),
            status,
            message: message.to_string(),
            result: result.map(str::to_string),
        }
    }

    #[test]
    fn test_success_shows_result_only() {
        let output = format_record(&record(Status::Success, "Evaluated", Some("[ 1, 2 ]")), OutputContext::Piped);
        assert_eq!(output.as_deref(), Some("[ 1, 2 ]"));
    }

    #[test]
    fn test_progress_records_are_skipped() {
        assert!(format_record(&record(Status::Running, "Running...", None), OutputContext::Piped).is_none());
    }

    #[test]
    fn test_failure_has_heading() {
        let output = format_record(
            &record(Status::RuntimeError, "ReferenceError: x is not defined", None),
            OutputContext::Piped,
        );
        assert_eq!(
            output.as_deref(),
            Some("✗ Execution failure\nReferenceError: x is not defined")
        );
    }

    #[test]
    fn test_rewritten_piped() {
        let output = format_rewritten("return 1;\n", OutputContext::Piped);
        assert_eq!(output, "── formatted code ──\nreturn 1;");
    }

    #[test]
    fn test_detect_context_not_terminal() {
        // In test environment, stdout is typically not a terminal
        assert_eq!(detect_context(), OutputContext::Piped);
    }
}
