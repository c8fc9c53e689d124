//! Build script parsing.
//!
//! A build script is newline-delimited text. Lines starting with `#` are
//! comments, a trailing `\` continues the statement on the next line, and
//! blank lines are skipped. No directive validation happens here; see
//! [`crate::directive`].

use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nut_common::{NutError, NutResult};

use crate::directive::Directive;

/// One logical instruction: a keyword followed by argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    line: usize,
    keyword: String,
    args: Vec<String>,
}

impl Statement {
    fn from_text(line: usize, text: &str) -> Self {
        let mut words = text.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_string();
        Self {
            line,
            keyword,
            args: words.map(str::to_string).collect(),
        }
    }

    /// Line (1-based) where the statement starts.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Leading keyword, as written.
    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Argument tokens after the keyword.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A parsed build script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    statements: Vec<Statement>,
}

impl Script {
    /// Parse a script from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader fails or the last statement ends in an
    /// unterminated continuation.
    pub fn parse<R: BufRead>(reader: R) -> NutResult<Self> {
        let mut statements = Vec::new();
        // Start line and accumulated text of a continued statement.
        let mut pending: Option<(usize, String)> = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;

            if line.starts_with('#') {
                tracing::debug!(line = number, "Skipping comment");
                continue;
            }

            if line.ends_with('\\') {
                tracing::debug!(line = number, "Continuing statement");
                let part = line.trim_end_matches('\\');
                match &mut pending {
                    Some((_, text)) => join(text, part),
                    None => pending = Some((number, part.to_string())),
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let statement = match pending.take() {
                Some((start, mut text)) => {
                    join(&mut text, &line);
                    Statement::from_text(start, &text)
                }
                None => Statement::from_text(number, &line),
            };
            tracing::debug!(line = statement.line, statement = %statement, "Parsed statement");
            statements.push(statement);
        }

        if let Some((line, _)) = pending {
            return Err(NutError::UnterminatedContinuation { line });
        }

        Ok(Self { statements })
    }

    /// Parse a script held in memory.
    ///
    /// # Errors
    ///
    /// See [`Script::parse`].
    pub fn parse_str(content: &str) -> NutResult<Self> {
        Self::parse(content.as_bytes())
    }

    /// Parse a script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_file(path: &Path) -> NutResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Statements in file order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Classify every statement, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns the first unknown or malformed directive.
    pub fn directives(&self) -> NutResult<Vec<Directive>> {
        self.statements.iter().map(Directive::try_from).collect()
    }
}

fn join(acc: &mut String, part: &str) {
    if !acc.is_empty() {
        acc.push(' ');
    }
    acc.push_str(part);
}
