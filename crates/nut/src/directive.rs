//! Build directives.
//!
//! Statements are classified into the closed [`Directive`] set before any
//! container work starts, so a typo'd keyword or a directive with the wrong
//! number of arguments fails the build up front.

use std::fmt;

use nut_common::{NutError, NutResult};

use crate::script::Statement;

/// A single build instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `FROM <image>`
    From {
        /// Base image reference.
        image: String,
    },
    /// `RUN <command>...`
    Run {
        /// Command tokens.
        command: Vec<String>,
    },
    /// `ENV <key>=<value>...` or `ENV <key> <value>...`
    Env {
        /// `KEY=VALUE` entries in order.
        vars: Vec<String>,
    },
    /// `WORKDIR <path>`
    Workdir {
        /// Working directory.
        path: String,
    },
    /// `ADD <src> <dest>`
    Add {
        /// Host source path.
        src: String,
        /// Container destination path.
        dest: String,
    },
    /// `COPY <src> <dest>`
    Copy {
        /// Host source path.
        src: String,
        /// Container destination path.
        dest: String,
    },
    /// `LABEL <key>=<value>...`
    Label {
        /// Raw arguments, validated when applied.
        entries: Vec<String>,
    },
    /// `EXPOSE <port>...`
    Expose {
        /// Raw port arguments, parsed when applied.
        ports: Vec<String>,
    },
    /// `MAINTAINER <name>...`
    Maintainer {
        /// Maintainer entry.
        name: String,
    },
    /// `USER <user>`
    User {
        /// User name.
        user: String,
    },
    /// `VOLUME ...`, accepted and ignored.
    Volume,
    /// `STOPSIGNAL ...`, accepted and ignored.
    StopSignal,
    /// `CMD ...`
    Cmd {
        /// Command vector.
        args: Vec<String>,
    },
    /// `ENTRYPOINT ...`
    Entrypoint {
        /// Command vector.
        args: Vec<String>,
    },
}

impl Directive {
    /// Canonical keyword of the directive.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::From { .. } => "FROM",
            Self::Run { .. } => "RUN",
            Self::Env { .. } => "ENV",
            Self::Workdir { .. } => "WORKDIR",
            Self::Add { .. } => "ADD",
            Self::Copy { .. } => "COPY",
            Self::Label { .. } => "LABEL",
            Self::Expose { .. } => "EXPOSE",
            Self::Maintainer { .. } => "MAINTAINER",
            Self::User { .. } => "USER",
            Self::Volume => "VOLUME",
            Self::StopSignal => "STOPSIGNAL",
            Self::Cmd { .. } => "CMD",
            Self::Entrypoint { .. } => "ENTRYPOINT",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl TryFrom<&Statement> for Directive {
    type Error = NutError;

    fn try_from(statement: &Statement) -> NutResult<Self> {
        let keyword = statement.keyword().to_ascii_uppercase();
        let args = statement.args();
        let invalid = |message: &str| NutError::InvalidDirective {
            directive: keyword.clone(),
            line: statement.line(),
            message: message.to_string(),
        };

        let directive = match keyword.as_str() {
            "FROM" => match args {
                [image] => Self::From {
                    image: image.clone(),
                },
                _ => return Err(invalid("expected a single image reference")),
            },
            "RUN" => {
                if args.is_empty() {
                    return Err(invalid("requires a command"));
                }
                Self::Run {
                    command: args.to_vec(),
                }
            }
            "ENV" => Self::Env {
                vars: env_pairs(args).map_err(|m| invalid(&m))?,
            },
            "WORKDIR" => match args {
                [path] => Self::Workdir { path: path.clone() },
                _ => return Err(invalid("expected a single path")),
            },
            "ADD" | "COPY" => match args {
                [src, dest] => {
                    let (src, dest) = (src.clone(), dest.clone());
                    if keyword == "ADD" {
                        Self::Add { src, dest }
                    } else {
                        Self::Copy { src, dest }
                    }
                }
                _ => return Err(invalid("expected a source and a destination")),
            },
            "LABEL" => {
                if args.is_empty() {
                    return Err(invalid("requires at least one key=value pair"));
                }
                Self::Label {
                    entries: args.to_vec(),
                }
            }
            "EXPOSE" => {
                if args.is_empty() {
                    return Err(invalid("requires at least one port"));
                }
                Self::Expose {
                    ports: args.to_vec(),
                }
            }
            "MAINTAINER" => {
                if args.is_empty() {
                    return Err(invalid("requires a name"));
                }
                Self::Maintainer {
                    name: args.join(" "),
                }
            }
            "USER" => match args {
                [user] => Self::User { user: user.clone() },
                _ => return Err(invalid("expected a single user")),
            },
            "VOLUME" => Self::Volume,
            "STOPSIGNAL" => Self::StopSignal,
            "CMD" | "ENTRYPOINT" => {
                if args.is_empty() {
                    return Err(invalid("requires a command"));
                }
                let args = command_vector(args);
                if keyword == "CMD" {
                    Self::Cmd { args }
                } else {
                    Self::Entrypoint { args }
                }
            }
            _ => {
                return Err(NutError::UnknownDirective {
                    keyword: statement.keyword().to_string(),
                    line: statement.line(),
                });
            }
        };

        Ok(directive)
    }
}

/// Fold ENV tokens into `KEY=VALUE` entries.
///
/// A token containing `=` is taken as is; any other token is a key whose
/// value is the next token.
fn env_pairs(args: &[String]) -> Result<Vec<String>, String> {
    if args.is_empty() {
        return Err("requires at least one variable".to_string());
    }

    let mut vars = Vec::with_capacity(args.len());
    let mut tokens = args.iter();
    while let Some(token) = tokens.next() {
        if token.contains('=') {
            vars.push(token.clone());
        } else {
            let value = tokens
                .next()
                .ok_or_else(|| format!("variable '{token}' has no value"))?;
            vars.push(format!("{token}={value}"));
        }
    }
    Ok(vars)
}

/// Decode the JSON exec form (`["a", "b"]`), falling back to raw tokens.
fn command_vector(args: &[String]) -> Vec<String> {
    let joined = args.join(" ");
    if joined.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(&joined) {
            Ok(exec) => return exec,
            Err(e) => {
                tracing::debug!(command = %joined, error = %e, "Not an exec form array, using shell form");
            }
        }
    }
    args.to_vec()
}
