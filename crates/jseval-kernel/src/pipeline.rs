//! The evaluation pipeline: parse, rewrite, emit, compile, run, report.
//!
//! Each request runs strictly in sequence through its stages. A failing
//! stage completes the request with its classified outcome; nothing is
//! retried and there is no timeout.

use std::borrow::Cow;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::ast::Program;
use crate::compiler::Compiler;
use crate::config::EvalConfig;
use crate::emit::emit_program;
use crate::host::{substitute_mentions, BindingTable};
use crate::interpreter::Interpreter;
use crate::parser::{parse_program, SyntaxError};
use crate::rewrite::rewrite_program;
use crate::stage::{Outcome, Stage, StageRecord};

/// A parsed and rewritten request, ready to compile.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// The rewritten tree.
    pub program: Program,
    /// The rewritten tree printed back to source.
    pub rewritten: String,
}

/// A running evaluation started by [`Evaluator::spawn`].
pub struct EvalTask {
    /// Stage records, in order; closes after the terminal record.
    pub records: mpsc::UnboundedReceiver<StageRecord>,
    /// Resolves to the outcome.
    pub handle: JoinHandle<Outcome>,
}

/// Runs requests against a fixed configuration and binding table.
///
/// Cheap to clone: bindings are shared handles.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvalConfig,
    bindings: BindingTable,
    compiler: Compiler,
}

impl Evaluator {
    pub fn new(config: EvalConfig, bindings: BindingTable) -> Self {
        Self {
            config,
            bindings,
            compiler: Compiler::new(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Apply mention substitution when enabled.
    pub fn preprocess<'a>(&self, source: &'a str) -> Cow<'a, str> {
        if self.config.substitute_mentions {
            substitute_mentions(source)
        } else {
            Cow::Borrowed(source)
        }
    }

    /// Parse and rewrite `source` without compiling or running it.
    pub fn prepare(&self, source: &str) -> Result<Prepared, SyntaxError> {
        let program = parse_program(&self.preprocess(source))?;
        let program = rewrite_program(&program);
        let rewritten = emit_program(&program);
        Ok(Prepared { program, rewritten })
    }

    /// Evaluate `source`, discarding stage records.
    pub async fn evaluate(&self, source: &str) -> Outcome {
        self.evaluate_streaming(source, &mut |_| {}).await
    }

    /// Evaluate `source`, passing each stage record to `on_stage` as it happens.
    ///
    /// The last record passed is always the terminal one, and its outcome is
    /// also returned.
    #[tracing::instrument(level = "info", skip(self, source, on_stage), fields(evaluator = %self.config.name, input_len = source.len()))]
    pub async fn evaluate_streaming(
        &self,
        source: &str,
        on_stage: &mut (dyn FnMut(&StageRecord) + Send),
    ) -> Outcome {
        let inspect = self.config.inspect_options();
        let mut report = |rewritten: Option<&str>, stage: &Stage| {
            tracing::debug!(status = %stage.status(), "stage");
            on_stage(&StageRecord::new(source, rewritten, stage, &inspect));
        };

        report(None, &Stage::Parsing);
        let prepared = match self.prepare(source) {
            Ok(prepared) => prepared,
            Err(err) => {
                let outcome = Outcome::SyntaxError(err);
                report(None, &Stage::Completed(outcome.clone()));
                return outcome;
            }
        };
        let rewritten = Some(prepared.rewritten.as_str());

        report(rewritten, &Stage::Compiling);
        let unit = match self.compiler.compile(&prepared.rewritten, &self.bindings.names()) {
            Ok(unit) => unit,
            Err(err) => {
                let outcome = Outcome::CompileError(err);
                report(rewritten, &Stage::Completed(outcome.clone()));
                return outcome;
            }
        };

        report(rewritten, &Stage::Running);
        let outcome = match self.bindings.resolve().await {
            Ok(args) => {
                let interpreter = Interpreter::new(self.config.interpreter_options());
                Outcome::from(interpreter.invoke(&unit, args).await)
            }
            Err(exc) => {
                tracing::debug!(error = %exc, "binding resolution failed");
                Outcome::from(Err(exc))
            }
        };
        report(rewritten, &Stage::Completed(outcome.clone()));
        outcome
    }

    /// Run `source` as its own task, streaming records over a channel.
    pub fn spawn(&self, source: impl Into<String>) -> EvalTask {
        let (tx, records) = mpsc::unbounded_channel();
        let evaluator = self.clone();
        let source = source.into();
        let span = tracing::info_span!("eval_task", evaluator = %self.config.name);
        let handle = tokio::spawn(
            async move {
                evaluator
                    .evaluate_streaming(&source, &mut |record| {
                        // A dropped receiver only means nobody is watching.
                        let _ = tx.send(record.clone());
                    })
                    .await
            }
            .instrument(span),
        );
        EvalTask { records, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Status;

    fn evaluator() -> Evaluator {
        Evaluator::new(EvalConfig::default(), BindingTable::new())
    }

    #[test]
    fn prepare_rewrites_the_tail() {
        let prepared = evaluator().prepare("1 + 1").expect("prepare");
        assert_eq!(prepared.rewritten, "var __ret;\n__ret = 1 + 1;\nreturn __ret;\n");
    }

    #[tokio::test]
    async fn records_follow_stage_order() {
        let mut statuses = Vec::new();
        let outcome = evaluator()
            .evaluate_streaming("1 + 1", &mut |r| statuses.push(r.status))
            .await;
        assert!(matches!(outcome, Outcome::Success(_)));
        assert_eq!(
            statuses,
            vec![Status::Parsing, Status::Compiling, Status::Running, Status::Success]
        );
    }

    #[tokio::test]
    async fn syntax_error_stops_after_parsing() {
        let mut statuses = Vec::new();
        let outcome = evaluator()
            .evaluate_streaming("(", &mut |r| statuses.push(r.status))
            .await;
        assert!(matches!(outcome, Outcome::SyntaxError(_)));
        assert_eq!(statuses, vec![Status::Parsing, Status::SyntaxError]);
    }

    #[tokio::test]
    async fn spawned_task_streams_records() {
        let mut task = evaluator().spawn("let x = 1; x + 1");
        let mut statuses = Vec::new();
        while let Some(record) = task.records.recv().await {
            statuses.push(record.status);
        }
        let outcome = task.handle.await.expect("task");
        assert_eq!(statuses.last(), Some(&Status::Success));
        assert_eq!(outcome.into_result().expect("value").map(|v| v.to_js_string()), Some("2".to_string()));
    }
}
