use std::collections::HashMap;

use thiserror::Error;

/// Raised while building the registry, before any document is linted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("empty command configured for language `{language}`")]
    EmptyCommand { language: String },
    #[error("empty language tag configured for command `{command_line}`")]
    EmptyLanguage { command_line: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCommand {
    pub language: String,
    pub command_line: String,
}

impl LanguageCommand {
    pub fn new(
        language: impl Into<String>,
        command_line: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let language = language.into();
        let command_line = command_line.into();
        if command_line.split_whitespace().next().is_none() {
            return Err(ConfigurationError::EmptyCommand { language });
        }
        if language.trim().is_empty() {
            return Err(ConfigurationError::EmptyLanguage { command_line });
        }
        Ok(Self {
            language,
            command_line,
        })
    }

    /// Splits the command line on whitespace. Quotes are not interpreted:
    /// `sh -c "a b"` yields `["sh", "-c", "\"a", "b\""]`.
    pub fn argv(&self) -> Vec<String> {
        self.command_line
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    pub fn program(&self) -> &str {
        self.command_line
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }
}

/// Language tag to linter command. Read-only once linting starts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandRegistry {
    commands: HashMap<String, LanguageCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, L, C>(entries: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        let mut registry = Self::new();
        for (language, command_line) in entries {
            registry.register(language, command_line)?;
        }
        Ok(registry)
    }

    /// Registers `command_line` for `language`, replacing any previous entry.
    pub fn register(
        &mut self,
        language: impl Into<String>,
        command_line: impl Into<String>,
    ) -> Result<(), ConfigurationError> {
        let command = LanguageCommand::new(language, command_line)?;
        self.commands.insert(command.language.clone(), command);
        Ok(())
    }

    pub fn lookup(&self, language: &str) -> Option<&LanguageCommand> {
        if language.is_empty() {
            return None;
        }
        self.commands.get(language)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered language tags, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}
