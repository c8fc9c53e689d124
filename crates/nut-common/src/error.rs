//! Error types shared by the nut crates.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`NutError`].
pub type NutResult<T> = Result<T, NutError>;

/// Errors raised while parsing a build script or building an image.
#[derive(Error, Diagnostic, Debug)]
pub enum NutError {
    /// A continuation line was never terminated before end of input.
    #[error("Unterminated line continuation starting at line {line}")]
    #[diagnostic(
        code(nut::parse::unterminated),
        help("The last statement ends with '\\'; add the line that completes it")
    )]
    UnterminatedContinuation {
        /// Line where the pending statement started.
        line: usize,
    },

    /// Statement keyword is not a known directive.
    #[error("Line {line}: unknown directive '{keyword}'")]
    #[diagnostic(code(nut::parse::unknown_directive))]
    UnknownDirective {
        /// The unrecognized keyword.
        keyword: String,
        /// Line where the statement started.
        line: usize,
    },

    /// Directive has the wrong shape (usually argument count).
    #[error("Line {line}: invalid {directive} directive: {message}")]
    #[diagnostic(code(nut::parse::invalid_directive))]
    InvalidDirective {
        /// Directive keyword.
        directive: String,
        /// Line where the statement started.
        line: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A directive needs a container but no FROM has run yet.
    #[error("No container has been created yet, {directive} requires a FROM directive first")]
    #[diagnostic(code(nut::build::no_container))]
    NoContainer {
        /// The directive (or build phase) that needed the container.
        directive: String,
    },

    /// FROM appeared more than once.
    #[error("Container already built. Multiple FROM declaration?")]
    #[diagnostic(code(nut::build::duplicate_from))]
    DuplicateFrom,

    /// CMD or ENTRYPOINT appeared more than once.
    #[error("Entrypoint/CMD is already defined. Probably multiple declaration")]
    #[diagnostic(
        code(nut::build::duplicate_entrypoint),
        help("CMD and ENTRYPOINT set the same field; keep only one of them")
    )]
    DuplicateEntrypoint,

    /// LABEL argument without '='.
    #[error("Invalid LABEL '{label}', labels must have '=' in them")]
    #[diagnostic(code(nut::build::invalid_label))]
    InvalidLabel {
        /// The offending argument.
        label: String,
    },

    /// Command inside the container exited non-zero.
    #[error("Failed to execute command: '{command}'. Exit code: {exit_code}")]
    #[diagnostic(code(nut::build::command_failed))]
    CommandFailed {
        /// Command text.
        command: String,
        /// Exit code reported by the runtime.
        exit_code: i32,
    },

    /// Copying files between host and container failed.
    #[error("Failed to copy {from} to {to}: {message}")]
    #[diagnostic(code(nut::build::copy))]
    Copy {
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
        /// Underlying cause.
        message: String,
    },

    /// Runtime driver operation failed.
    #[error("Container runtime failed to {operation}: {message}")]
    #[diagnostic(code(nut::driver::failed))]
    Driver {
        /// Driver operation (clone, start, attach, ...).
        operation: String,
        /// Underlying cause, usually tool stderr.
        message: String,
    },

    /// Container is not defined in the runtime.
    #[error("Container is not present: {name}")]
    #[diagnostic(code(nut::driver::not_present))]
    ContainerNotPresent {
        /// Container name.
        name: String,
    },

    /// Invalid container name.
    #[error("Invalid container name: {name}")]
    #[diagnostic(
        code(nut::container::invalid_name),
        help("Names must start with an alphanumeric character and contain only alphanumerics, '-', '_' or '.', up to 64 characters")
    )]
    InvalidContainerName {
        /// The invalid name.
        name: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(nut::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(nut::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(nut::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl From<serde_yaml::Error> for NutError {
    fn from(err: serde_yaml::Error) -> Self {
        NutError::Serialization(err.to_string())
    }
}

impl NutError {
    /// Build a [`NutError::Driver`] from an operation name and a cause.
    pub fn driver(operation: impl Into<String>, message: impl ToString) -> Self {
        NutError::Driver {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
