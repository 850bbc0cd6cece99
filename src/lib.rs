//! This is a preprocessor for the [rust-lang mdbook](https://github.com/rust-lang/mdBook) project. It pipes fenced code blocks into external command line tools (linters) and reports whether each tool accepted the block.
//!
//! # Getting started
//!
//! ```sh
//! cargo install mdbook-codelinter
//! ```
//!
//! You also have to activate the preprocessor and map languages to linters, put this in your `book.toml` file:
//!
//! ```toml
//! [preprocessor.codelinter]
//! after = ["links"]
//!
//! [preprocessor.codelinter.languages]
//! json = "python -m json.tool"
//! yaml = "yamllint -"
//! ```
//!
//! # How to
//!
//! Let's say a chapter contains:
//!
//! ````markdown
//! # Title
//!
//! ```json
//! {"key": "value"}
//! ```
//!
//! ```json
//! {"key": }
//! ```
//! ````
//!
//! While building the book, the preprocessor runs `python -m json.tool` once per block, writes the block to its standard input and logs:
//!
//! ```text
//! [Line 3] linting json
//! OK
//! [Line 7] linting json
//! Problem in json: Expecting value: line 1 column 9 (char 8)
//! ```
//!
//! The book itself is never modified.
//!
//! # Details
//!
//! - The command line is split on whitespace and run directly, never through a shell. Quotes are not interpreted.
//! - Standard output and standard error of the tool are merged, in the order they were written.
//! - Blocks whose language is not configured are ignored silently.
//! - A block can opt out with the `nolint` attribute: ```` ```json,nolint ````.
//! - A missing tool is reported as `command: <cmd> does not exist!` and the remaining blocks are still linted.
//! - `timeout = <milliseconds>` kills tools that hang. Without it, a tool may run forever.
//! - With `after = ["links"]` the chapters are linted after `{{#include}}` expansion, so reported line numbers count lines of the expanded chapter, not of the source file.
//! - Progress lines are grouped per chapter under a `checking <chapter>` line, and every problem is repeated at the end as `<chapter>:<line>: <language> (<status>)`.
//!
//! The same engine is available outside of mdbook:
//!
//! ```sh
//! mdbook-codelinter check --config book.toml src/*.md
//! ```
//!
pub mod codelinter;
pub mod extract;
pub mod lint;
pub mod registry;
pub mod runner;
pub mod sink;
mod utils;

pub use codelinter::{CodeLinterConfig, CodeLinterPreprocessor};
pub use extract::{extract, CodeBlock};
pub use lint::{CodeLinter, LintOutcome, LintReport, LintStatus};
pub use registry::{CommandRegistry, ConfigurationError, LanguageCommand};
pub use runner::{ProcessError, ProcessOutput, ProcessRunner, SubprocessRunner};
pub use sink::{LogSink, MemorySink, ReportSink};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
