use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdbook::preprocess::{CmdPreprocessor, Preprocessor};

use mdbook_codelinter::{CodeLinterConfig, CodeLinterPreprocessor, LogSink};

#[derive(Parser)]
#[command(name = "mdbook-codelinter", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a renderer is supported by this preprocessor
    Supports { renderer: String },
    /// Lint the code blocks of markdown files without mdbook
    Check {
        /// book.toml, or a file with `languages` and `timeout` at the top level
        #[arg(short, long, default_value = "book.toml")]
        config: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let preprocessor = CodeLinterPreprocessor::new();
    let result = match cli.command {
        Some(Commands::Supports { renderer }) => {
            Ok(if preprocessor.supports_renderer(&renderer) { 0 } else { 1 })
        }
        Some(Commands::Check {
            config,
            json,
            files,
        }) => check(&config, &files, json),
        None => handle_preprocessing(&preprocessor).map(|_| 0),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("{:?}", e);
            process::exit(1);
        }
    }
}

fn handle_preprocessing(preprocessor: &dyn Preprocessor) -> Result<()> {
    let (context, book) = CmdPreprocessor::parse_input(io::stdin())?;

    if context.mdbook_version != mdbook::MDBOOK_VERSION {
        log::warn!(
            "The {} plugin was built against version {} of mdbook, \
             but we're being called from version {}",
            preprocessor.name(),
            mdbook::MDBOOK_VERSION,
            context.mdbook_version
        );
    }

    let processed_book = preprocessor.run(&context, book)?;
    serde_json::to_writer(io::stdout(), &processed_book)?;
    Ok(())
}

fn check(config_path: &Path, files: &[PathBuf], json: bool) -> Result<i32> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Could not read {}", config_path.display()))?;
    let config = CodeLinterConfig::from_toml(&content)?;
    let linter = config.create_linter()?;

    let documents = files
        .iter()
        .map(|file| {
            let markdown = fs::read_to_string(file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            Ok((file.display().to_string(), markdown))
        })
        .collect::<Result<Vec<_>>>()?;

    let report = linter.lint_documents(&documents, &LogSink);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for outcome in report.problems() {
            println!("{}", outcome.location());
        }
        println!("{}", report.summary());
    }

    Ok(if report.has_problems() { 1 } else { 0 })
}
