//! Error taxonomy for the console query language.
//!
//! Syntax, reference and recursion errors are exceptional: they unwind the
//! query being evaluated. Everything else is an ordinary return value that the
//! evaluator folds into its pass/fail flag.

use thiserror::Error;

/// Malformed query text.
///
/// `offset` and `length` are counted in characters so the error can be
/// rendered with a caret underline (see [`SyntaxError::render`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at {offset}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub length: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            length,
        }
    }

    /// Render the offending line of `source` with a caret underline.
    ///
    /// ```
    /// use bevy_console_script::core::parse;
    ///
    /// let err = parse("echo )").unwrap_err();
    /// assert_eq!(err.render("echo )"), "echo )\n     ^");
    /// ```
    pub fn render(&self, source: &str) -> String {
        render_span(source, self.offset, self.length)
    }
}

/// Dereferencing a variable that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reference error at {offset}: {message}")]
pub struct ReferenceError {
    pub message: String,
    pub offset: usize,
    pub length: usize,
}

impl ReferenceError {
    pub fn undefined(name: &str, offset: usize) -> Self {
        Self {
            message: format!("'{}' is not defined", name),
            offset,
            // `{` + name + `}`
            length: name.chars().count() + 2,
        }
    }

    /// Render the offending line of `source` with a caret underline.
    pub fn render(&self, source: &str) -> String {
        render_span(source, self.offset, self.length)
    }
}

/// Failure returned by a command handler.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::CommandError;
///
/// let err: CommandError = "Usage: kick <player>".into();
/// assert_eq!(err.to_string(), "Usage: kick <player>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CommandError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<RegistryError> for CommandError {
    fn from(err: RegistryError) -> Self {
        Self::new(err.to_string())
    }
}

/// A failed invocation, as reported to the diagnostic output.
///
/// These never unwind; the evaluator turns them into its error flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("{name}: {source}")]
    Command { name: String, source: CommandError },
    #[error("Unknown command or variable: '{0}'")]
    EntityNotFound(String),
    #[error("Missing command name before arguments")]
    MissingName,
}

/// Variable store failures. Always returned, never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Unknown variable: '{0}'")]
    NotFound(String),
    #[error("Cannot set '{0}': variable is read-only")]
    ReadOnly(String),
    #[error("Cannot set '{0}': variable is cheat-protected")]
    Cheat(String),
    #[error("Cannot set '{0}': variable is replicated from the server")]
    Replicated(String),
    #[error("Cannot set '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("Invalid variable name: '{0}'")]
    InvalidName(String),
    #[error("Built-in variable '{name}' may not use the reserved prefix '{prefix}'")]
    ReservedPrefix { name: String, prefix: &'static str },
    #[error("User variable '{name}' must start with '{prefix}'")]
    UserPrefixRequired { name: String, prefix: &'static str },
    #[error("Variable '{0}' is already declared")]
    AlreadyDeclared(String),
    #[error("Cannot remove built-in variable '{0}'")]
    BuiltinRemoval(String),
}

/// Command, alias and bind registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid name: '{0}'")]
    InvalidName(String),
    #[error("'{0}' not found")]
    NotFound(String),
}

/// Errors that abort a whole query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("recursion limit of {limit} exceeded while expanding '{name}'")]
    RecursionLimit { name: String, limit: usize },
    /// An error raised inside an alias body. Offsets in `source` point
    /// into `body`, not into the query that invoked the alias.
    #[error("in '{name}': {source}")]
    Expansion {
        name: String,
        body: String,
        source: Box<QueryError>,
    },
}

impl QueryError {
    /// Human readable report, including a caret line when the error points
    /// into `source`.
    pub fn report(&self, source: &str) -> String {
        match self {
            QueryError::Syntax(err) => format!("{}\n{}", err, err.render(source)),
            QueryError::Reference(err) => format!("{}\n{}", err, err.render(source)),
            QueryError::RecursionLimit { .. } => self.to_string(),
            QueryError::Expansion { name, body, source } => {
                format!("in '{}':\n{}", name, source.report(body))
            }
        }
    }

    /// Attach alias context to an error raised while evaluating `body`.
    ///
    /// Recursion limits pass through unchanged so a runaway expansion is
    /// reported once, not once per level.
    pub fn within(self, name: &str, body: &str) -> Self {
        match self {
            QueryError::RecursionLimit { .. } => self,
            source => QueryError::Expansion {
                name: name.to_string(),
                body: body.to_string(),
                source: Box::new(source),
            },
        }
    }
}

fn render_span(source: &str, offset: usize, length: usize) -> String {
    let mut line_start = 0;
    let mut line = String::new();
    for (i, c) in source.chars().enumerate() {
        if c == '\n' {
            if i >= offset {
                break;
            }
            line_start = i + 1;
            line.clear();
        } else {
            line.push(c);
        }
    }

    let column = offset.saturating_sub(line_start);
    format!("{}\n{}{}", line, " ".repeat(column), "^".repeat(length.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_line() {
        let err = SyntaxError::new("unterminated string", 5, 4);
        assert_eq!(err.render("echo \"abc"), "echo \"abc\n     ^^^^");
    }

    #[test]
    fn test_render_picks_offending_line() {
        let source = "echo a\necho )";
        let err = SyntaxError::new("unmatched ')'", 12, 1);
        assert_eq!(err.render(source), "echo )\n     ^");
    }

    #[test]
    fn test_reference_error_length_covers_braces() {
        let err = ReferenceError::undefined("bar", 10);
        assert_eq!(err.length, 5);
        assert!(err.message.contains("bar"));
    }

    #[test]
    fn test_invocation_error_messages() {
        let err = InvocationError::EntityNotFound("nope".into());
        assert_eq!(err.to_string(), "Unknown command or variable: 'nope'");

        let err = InvocationError::Command {
            name: "kick".into(),
            source: CommandError::new("no such player"),
        };
        assert_eq!(err.to_string(), "kick: no such player");
    }

    #[test]
    fn test_expansion_report_renders_against_body() {
        let inner = QueryError::Reference(ReferenceError::undefined("x", 5));
        let err = inner.within("greet", "echo {x}");
        assert_eq!(
            err.report("greet"),
            "in 'greet':\nreference error at 5: 'x' is not defined\necho {x}\n     ^^^"
        );

        let limit = QueryError::RecursionLimit { name: "loop".into(), limit: 4 };
        assert_eq!(limit.clone().within("loop", "loop"), limit);
    }

    #[test]
    fn test_store_errors_are_flag_specific() {
        let a = StoreError::ReadOnly("x".into()).to_string();
        let b = StoreError::Cheat("x".into()).to_string();
        let c = StoreError::Replicated("x".into()).to_string();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
