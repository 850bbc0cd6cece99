use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::extract::{extract, CodeBlock, CodeBlocks};
use crate::registry::{CommandRegistry, LanguageCommand};
use crate::runner::{ProcessError, ProcessRunner, SubprocessRunner};
use crate::sink::{MemorySink, ReportSink, LOG_TARGET};

/// Info string attribute that opts a block out of linting.
pub const NOLINT_ATTRIBUTE: &str = "nolint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LintStatus {
    Skipped,
    Ok,
    Failed,
    ToolMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintOutcome {
    pub document_id: String,
    pub line_number: usize,
    pub language: String,
    pub status: LintStatus,
    /// Linter output for `Failed`, the reason for `ToolMissing`, empty otherwise.
    pub diagnostic_text: String,
}

impl LintOutcome {
    fn new(block: &CodeBlock, status: LintStatus, diagnostic_text: String) -> Self {
        Self {
            document_id: block.document_id.clone(),
            line_number: block.line_number,
            language: block.language.clone(),
            status,
            diagnostic_text,
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self.status, LintStatus::Failed | LintStatus::ToolMissing)
    }

    /// `{document}:{line}: {language} ({status})`
    pub fn location(&self) -> String {
        format!(
            "{}:{}: {} ({:?})",
            self.document_id, self.line_number, self.language, self.status
        )
    }
}

/// Outcomes of a lint run, in document order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub outcomes: Vec<LintOutcome>,
}

impl LintReport {
    pub fn count(&self, status: LintStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn problems(&self) -> impl Iterator<Item = &LintOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_problem())
    }

    pub fn has_problems(&self) -> bool {
        self.problems().next().is_some()
    }

    pub fn for_document<'a>(&'a self, document_id: &'a str) -> impl Iterator<Item = &'a LintOutcome> {
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.document_id == document_id)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} code block(s) linted: {} ok, {} failed, {} tool missing, {} skipped",
            self.outcomes.len(),
            self.count(LintStatus::Ok),
            self.count(LintStatus::Failed),
            self.count(LintStatus::ToolMissing),
            self.count(LintStatus::Skipped),
        )
    }
}

/// Pipes every code block whose language has a registered command into that
/// command and classifies the result.
///
/// The registry is read-only once the linter is built, so one linter can
/// serve many documents at once.
pub struct CodeLinter<R: ProcessRunner = SubprocessRunner> {
    registry: Arc<CommandRegistry>,
    runner: R,
    version: String,
}

impl<R: ProcessRunner> CodeLinter<R> {
    pub fn new(registry: impl Into<Arc<CommandRegistry>>, runner: R) -> Self {
        Self {
            registry: registry.into(),
            runner,
            version: crate::VERSION.to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn extract_blocks<'a>(&self, document_id: &'a str, markdown: &'a str) -> CodeBlocks<'a> {
        extract(document_id, markdown)
    }

    /// Lints one block. Returns `None` when its language is not registered,
    /// in which case nothing is reported either.
    pub fn lint_block(&self, block: &CodeBlock, sink: &dyn ReportSink) -> Option<LintOutcome> {
        let command = self.registry.lookup(&block.language)?;

        if block.has_attribute(NOLINT_ATTRIBUTE) {
            let outcome = LintOutcome::new(block, LintStatus::Skipped, String::new());
            self.report_outcome(&outcome, sink);
            return Some(outcome);
        }

        // Reported before invoking, so a hanging linter shows up in the log.
        sink.info(&format!(
            "[Line {}] linting {}",
            block.line_number, block.language
        ));

        let argv = command.argv();
        log::debug!(target: LOG_TARGET, "{:?}", argv);
        log::debug!(target: LOG_TARGET, "{}", block.source_text);

        let outcome = match self.runner.run(&argv, block.source_text.as_bytes()) {
            Ok(output) if output.success() => {
                LintOutcome::new(block, LintStatus::Ok, String::new())
            }
            Ok(output) => LintOutcome::new(
                block,
                LintStatus::Failed,
                output.combined_output_lossy().into_owned(),
            ),
            Err(error) => {
                log::debug!(target: LOG_TARGET, "{}: {}", command.command_line, error);
                LintOutcome::new(block, LintStatus::ToolMissing, missing_tool_message(command, &error))
            }
        };
        self.report_outcome(&outcome, sink);
        Some(outcome)
    }

    /// Emits the line that follows a lint invocation.
    pub fn report_outcome(&self, outcome: &LintOutcome, sink: &dyn ReportSink) {
        match outcome.status {
            LintStatus::Skipped => sink.info(&format!(
                "[Line {}] skipping {}",
                outcome.line_number, outcome.language
            )),
            LintStatus::Ok => sink.info("OK"),
            LintStatus::Failed => sink.warn(&format!(
                "Problem in {}: {}",
                outcome.language,
                outcome.diagnostic_text.trim_end()
            )),
            LintStatus::ToolMissing => sink.warn(&outcome.diagnostic_text),
        }
    }

    /// Lints every block of one document in order. No block can stop the
    /// ones after it.
    pub fn run_lint(
        &self,
        document_id: &str,
        markdown: &str,
        sink: &dyn ReportSink,
    ) -> Vec<LintOutcome> {
        if self.registry.is_empty() {
            return Vec::new();
        }
        log::debug!(target: LOG_TARGET, "linting {}", document_id);
        self.extract_blocks(document_id, markdown)
            .filter_map(|block| self.lint_block(&block, sink))
            .collect()
    }

    /// Lints documents in parallel. Each document reports into its own
    /// buffer; the buffers are replayed to `sink` in input order, each one
    /// headed by the document it belongs to.
    pub fn lint_documents<I, M>(&self, documents: &[(I, M)], sink: &dyn ReportSink) -> LintReport
    where
        I: AsRef<str> + Sync,
        M: AsRef<str> + Sync,
    {
        let per_document: Vec<(Vec<LintOutcome>, MemorySink)> = documents
            .par_iter()
            .map(|(document_id, markdown)| {
                let buffer = MemorySink::new();
                let outcomes = self.run_lint(document_id.as_ref(), markdown.as_ref(), &buffer);
                (outcomes, buffer)
            })
            .collect();

        let mut outcomes = Vec::new();
        for ((document_id, _), (document_outcomes, buffer)) in documents.iter().zip(per_document) {
            if !buffer.is_empty() {
                sink.info(&format!("checking {}", document_id.as_ref()));
                buffer.replay(sink);
            }
            outcomes.extend(document_outcomes);
        }
        LintReport { outcomes }
    }
}

fn missing_tool_message(command: &LanguageCommand, error: &ProcessError) -> String {
    match error {
        ProcessError::NotFound { .. }
        | ProcessError::SpawnFailed { .. }
        | ProcessError::EmptyCommand => {
            format!("command: {} does not exist!", command.command_line)
        }
        ProcessError::TimedOut { timeout, .. } => {
            format!("command: {} timed out after {:?}", command.command_line, timeout)
        }
        ProcessError::Io { source, .. } => {
            format!("command: {} failed: {}", command.command_line, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::registry::CommandRegistry;
    use crate::runner::{ProcessError, ProcessOutput, ProcessRunner};
    use crate::sink::MemorySink;

    use super::{CodeLinter, LintStatus};

    const DOCUMENT: &str = include_str!("../tests/fixtures/index.md");

    type Respond = fn(&[String], &[u8]) -> Result<ProcessOutput, ProcessError>;

    /// Records every invocation and answers with `respond`.
    struct FakeRunner {
        calls: Mutex<Vec<(Vec<String>, Vec<u8>)>>,
        respond: Respond,
    }

    impl FakeRunner {
        fn new(respond: Respond) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond,
            }
        }

        fn calls(&self) -> Vec<(Vec<String>, Vec<u8>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, argv: &[String], input: &[u8]) -> Result<ProcessOutput, ProcessError> {
            self.calls
                .lock()
                .unwrap()
                .push((argv.to_vec(), input.to_vec()));
            (self.respond)(argv, input)
        }
    }

    fn exit(code: i32, output: &str) -> Result<ProcessOutput, ProcessError> {
        Ok(ProcessOutput {
            exit_code: Some(code),
            combined_output: output.as_bytes().to_vec(),
        })
    }

    /// Fails the blocks of the fixture that are deliberately broken.
    fn lint_fixture(_argv: &[String], input: &[u8]) -> Result<ProcessOutput, ProcessError> {
        let input = String::from_utf8_lossy(input);
        if input.contains("\"key\": }") {
            exit(1, "Expecting value: line 1 column 9 (char 8)\n")
        } else if input.contains("[unclosed") {
            exit(1, "2:6 error syntax error: expected ',' or ']'\n")
        } else {
            exit(0, "")
        }
    }

    fn linter(entries: &[(&str, &str)], respond: Respond) -> CodeLinter<FakeRunner> {
        let registry = CommandRegistry::from_entries(entries.iter().copied()).unwrap();
        CodeLinter::new(registry, FakeRunner::new(respond))
    }

    fn lines_of(outcomes: &[super::LintOutcome]) -> Vec<(usize, LintStatus)> {
        outcomes
            .iter()
            .map(|outcome| (outcome.line_number, outcome.status))
            .collect()
    }

    #[test]
    pub fn test_empty_registry_lints_nothing() {
        let linter = linter(&[], lint_fixture);
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);
        assert!(outcomes.is_empty());
        assert!(!sink.status().contains("linting"));
        assert!(linter.runner().calls().is_empty());
    }

    #[test]
    pub fn test_lints_json() {
        let linter = linter(&[("json", "python -m json.tool")], lint_fixture);
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);

        assert_eq!(
            lines_of(&outcomes),
            vec![
                (6, LintStatus::Ok),
                (14, LintStatus::Failed),
                (34, LintStatus::Ok)
            ]
        );
        assert!(!outcomes[1].diagnostic_text.is_empty());
        assert!(outcomes[0].diagnostic_text.is_empty());

        let status = sink.status();
        assert!(status.contains("[Line 6] linting json"));
        assert!(status.contains("[Line 14] linting json"));
        assert!(status.contains("[Line 34] linting json"));
        assert!(!status.contains("[Line 10] linting"));
        assert!(!status.contains("[Line 18] linting yaml"));
        assert!(!status.contains("[Line 38] linting"));
        assert_eq!(sink.warnings().matches("Problem in json").count(), 1);
        assert!(sink
            .warnings()
            .contains("Problem in json: Expecting value: line 1 column 9 (char 8)"));
    }

    #[test]
    pub fn test_passes_exact_argv_and_source() {
        let linter = linter(&[("json", "python  -m json.tool")], lint_fixture);
        linter.run_lint("index", DOCUMENT, &MemorySink::new());

        let calls = linter.runner().calls();
        assert_eq!(calls.len(), 3);
        for (argv, _) in &calls {
            assert_eq!(argv, &vec!["python", "-m", "json.tool"]);
        }
        assert_eq!(calls[0].1, b"{\"key\": \"value\"}\n");
        assert_eq!(calls[1].1, b"{\"key\": }\n");
    }

    #[test]
    pub fn test_lints_json_and_yaml() {
        let linter = linter(
            &[("yaml", "yamllint -"), ("json", "python -m json.tool")],
            lint_fixture,
        );
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);

        assert_eq!(
            lines_of(&outcomes),
            vec![
                (6, LintStatus::Ok),
                (14, LintStatus::Failed),
                (18, LintStatus::Ok),
                (26, LintStatus::Failed),
                (34, LintStatus::Ok)
            ]
        );
        assert!(sink.status().contains("[Line 18] linting yaml"));
        assert!(sink.status().contains("[Line 26] linting yaml"));
        assert!(!sink.status().contains("[Line 10]"));
        assert!(!sink.status().contains("[Line 38]"));
        assert!(sink.warnings().contains("Problem in yaml"));
        assert!(sink.warnings().contains("Problem in json"));
    }

    #[test]
    pub fn test_ok_emits_no_warning() {
        let linter = linter(&[("json", "jq .")], |_, _| exit(0, "pretty output"));
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);
        assert!(outcomes.iter().all(|outcome| outcome.status == LintStatus::Ok));
        assert_eq!(sink.warnings(), "");
        assert_eq!(sink.status().matches("OK").count(), 3);
    }

    #[test]
    pub fn test_log_order() {
        let linter = linter(&[("yaml", "yamllint -")], lint_fixture);
        let sink = MemorySink::new();
        linter.run_lint("index", DOCUMENT, &sink);
        let lines: Vec<String> = sink.lines().into_iter().map(|(_, line)| line).collect();
        assert_eq!(lines[0], "[Line 18] linting yaml");
        assert_eq!(lines[1], "OK");
        assert_eq!(lines[2], "[Line 26] linting yaml");
        assert!(lines[3].starts_with("Problem in yaml: 2:6 error"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    pub fn test_missing_tool_does_not_stop_document() {
        let linter = linter(&[("json", "does-not-exist-tool")], |argv, _| {
            Err(ProcessError::NotFound {
                program: argv[0].clone(),
            })
        });
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|outcome| outcome.status == LintStatus::ToolMissing));
        assert!(sink
            .warnings()
            .contains("command: does-not-exist-tool does not exist!"));
        assert!(!sink.warnings().contains("Problem in"));
    }

    #[test]
    pub fn test_io_and_timeout_errors_are_recovered() {
        let linter = linter(&[("json", "slow-linter --strict")], |_, input| {
            if input.starts_with(b"[") {
                Err(ProcessError::TimedOut {
                    program: "slow-linter".into(),
                    timeout: Duration::from_millis(100),
                })
            } else {
                Err(ProcessError::Io {
                    program: "slow-linter".into(),
                    source: io::Error::from(io::ErrorKind::BrokenPipe),
                })
            }
        });
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("index", DOCUMENT, &sink);

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|outcome| outcome.is_problem()));
        assert!(outcomes[2]
            .diagnostic_text
            .contains("command: slow-linter --strict timed out after 100ms"));
        assert!(outcomes[0]
            .diagnostic_text
            .starts_with("command: slow-linter --strict failed:"));
    }

    #[test]
    pub fn test_nolint_attribute_skips_block() {
        let document = "```json,nolint\n{\"key\": }\n```\n\n```json\n{}\n```\n";
        let linter = linter(&[("json", "jq .")], lint_fixture);
        let sink = MemorySink::new();
        let outcomes = linter.run_lint("doc", document, &sink);

        assert_eq!(
            lines_of(&outcomes),
            vec![(1, LintStatus::Skipped), (5, LintStatus::Ok)]
        );
        assert_eq!(linter.runner().calls().len(), 1);
        assert!(sink.status().contains("[Line 1] skipping json"));
        assert!(!sink.status().contains("[Line 1] linting"));
    }

    #[test]
    pub fn test_idempotent() {
        let linter = linter(&[("yaml", "yamllint -"), ("json", "jq .")], lint_fixture);
        let first_sink = MemorySink::new();
        let second_sink = MemorySink::new();
        let first = linter.run_lint("index", DOCUMENT, &first_sink);
        let second = linter.run_lint("index", DOCUMENT, &second_sink);
        assert_eq!(first, second);
        assert_eq!(first_sink.lines(), second_sink.lines());
    }

    #[test]
    pub fn test_lint_documents_keeps_input_order() {
        let linter = linter(&[("json", "jq .")], lint_fixture);
        let documents: Vec<(String, String)> = (0..8)
            .map(|index| (format!("chapter-{index}.md"), DOCUMENT.to_string()))
            .collect();
        let report = linter.lint_documents(&documents, &MemorySink::new());

        assert_eq!(report.outcomes.len(), 24);
        let order: Vec<&str> = report
            .outcomes
            .iter()
            .map(|outcome| outcome.document_id.as_str())
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(report.for_document("chapter-3.md").count(), 3);
        assert_eq!(report.count(LintStatus::Failed), 8);
        assert!(report.has_problems());
        assert_eq!(
            report.summary(),
            "24 code block(s) linted: 16 ok, 8 failed, 0 tool missing, 0 skipped"
        );
    }

    #[test]
    pub fn test_lint_documents_names_each_document() {
        let linter = linter(&[("json", "python -m json.tool")], lint_fixture);
        let documents = [
            ("a.md", "```json\n{\"key\": }\n```\n"),
            ("b.md", "```json\n{\"key\": }\n```\n"),
            ("prose.md", "# No code here\n"),
        ];
        let sink = MemorySink::new();
        let report = linter.lint_documents(&documents, &sink);

        let lines: Vec<String> = sink.lines().into_iter().map(|(_, line)| line).collect();
        let failure = "Problem in json: Expecting value: line 1 column 9 (char 8)";
        assert_eq!(
            lines,
            vec![
                "checking a.md",
                "[Line 1] linting json",
                failure,
                "checking b.md",
                "[Line 1] linting json",
                failure,
            ]
        );
        let locations: Vec<String> = report.problems().map(|outcome| outcome.location()).collect();
        assert_eq!(locations, vec!["a.md:1: json (Failed)", "b.md:1: json (Failed)"]);
    }

    #[test]
    pub fn test_version_is_explicit() {
        let linter = linter(&[], lint_fixture);
        assert_eq!(linter.version(), crate::VERSION);
        assert_eq!(linter.with_version("1.0.5").version(), "1.0.5");
    }
}
