use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use mdbook::book::Book;
use mdbook::preprocess::{Preprocessor, PreprocessorContext};

use crate::lint::{CodeLinter, LintReport};
use crate::registry::{CommandRegistry, ConfigurationError};
use crate::runner::SubprocessRunner;
use crate::sink::{LogSink, ReportSink, LOG_TARGET};
use crate::utils::chapters;

pub const PREPROCESSOR_NAME: &str = "codelinter";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CodeLinterConfig {
    /// Language tag to command line, e.g. `json = "python -m json.tool"`.
    #[serde(default)]
    pub languages: BTreeMap<String, String>,
    /// Milliseconds a linter may run before it is killed. Absent or zero
    /// waits forever.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl CodeLinterConfig {
    /// Reads either a `[preprocessor.codelinter]` table of a `book.toml` or a
    /// standalone file holding the same keys at the top level.
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).with_context(|| "Invalid TOML")?;
        let nested = table
            .get("preprocessor")
            .and_then(|preprocessors| preprocessors.get(PREPROCESSOR_NAME))
            .cloned();
        let section = nested.unwrap_or(toml::Value::Table(table));
        section
            .try_into()
            .with_context(|| format!("Could not deserialize [preprocessor.{PREPROCESSOR_NAME}]"))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|&millis| millis > 0)
            .map(Duration::from_millis)
    }

    pub fn create_registry(&self) -> Result<CommandRegistry, ConfigurationError> {
        CommandRegistry::from_entries(
            self.languages
                .iter()
                .map(|(language, command_line)| (language.as_str(), command_line.as_str())),
        )
    }

    /// Validates every entry; nothing is linted with a broken configuration.
    pub fn create_linter(&self) -> Result<CodeLinter, ConfigurationError> {
        let runner = SubprocessRunner {
            timeout: self.timeout(),
        };
        Ok(CodeLinter::new(self.create_registry()?, runner))
    }
}

/// Lints the code blocks of every chapter and hands the book back untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeLinterPreprocessor;

impl CodeLinterPreprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn lint_book(
        &self,
        config: &CodeLinterConfig,
        book: &Book,
        sink: &dyn ReportSink,
    ) -> Result<LintReport> {
        let linter = config
            .create_linter()
            .with_context(|| format!("Invalid [preprocessor.{PREPROCESSOR_NAME}] configuration"))?;
        log::info!(
            target: LOG_TARGET,
            "{} {}: linting {}",
            PREPROCESSOR_NAME,
            linter.version(),
            linter.registry().languages().join(", ")
        );
        let documents = chapters(book);
        let report = linter.lint_documents(&documents, sink);
        for outcome in report.problems() {
            sink.warn(&outcome.location());
        }
        Ok(report)
    }
}

impl Preprocessor for CodeLinterPreprocessor {
    fn name(&self) -> &str {
        PREPROCESSOR_NAME
    }

    fn supports_renderer(&self, _renderer: &str) -> bool {
        true
    }

    fn run(&self, context: &PreprocessorContext, book: Book) -> Result<Book> {
        let key = format!("preprocessor.{}", self.name());
        let config = context
            .config
            .get_deserialized_opt::<CodeLinterConfig, _>(key)
            .with_context(|| "Could not deserialize [preprocessor.codelinter]")?
            .unwrap_or_default();
        if config.languages.is_empty() {
            log::debug!(target: LOG_TARGET, "no languages configured");
            return Ok(book);
        }
        let report = self.lint_book(&config, &book, &LogSink)?;
        log::info!(target: LOG_TARGET, "{}", report.summary());
        Ok(book)
    }
}
