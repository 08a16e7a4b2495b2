//! Console command (ConCommand) implementation.
//!
//! ConCommands are named commands that execute functions when invoked.

use std::sync::Arc;

use super::console::Console;
use super::error::CommandError;

/// Arguments passed to a command handler, after variable substitution.
#[derive(Debug, Clone)]
pub struct CommandArgs<'a> {
    name: &'a str,
    args: &'a [String],
    constant: bool,
}

impl<'a> CommandArgs<'a> {
    pub fn new(name: &'a str, args: &'a [String]) -> Self {
        Self {
            name,
            args,
            constant: true,
        }
    }

    pub(crate) fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    /// Name the command was invoked as.
    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Whether no argument referenced a variable.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(String::as_str)
    }

    #[inline]
    pub fn get_or(&self, index: usize, default: &'a str) -> &'a str {
        self.get(index).unwrap_or(default)
    }

    /// Get a required argument, or a usage error.
    pub fn require(&self, index: usize, usage: &str) -> Result<&'a str, CommandError> {
        self.get(index)
            .ok_or_else(|| CommandError::new(format!("Usage: {} {}", self.name, usage)))
    }

    /// Try to parse an argument as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, index: usize) -> Option<T> {
        self.get(index).and_then(|s| s.parse().ok())
    }

    pub fn parse_or<T: std::str::FromStr>(&self, index: usize, default: T) -> T {
        self.parse(index).unwrap_or(default)
    }

    #[inline]
    pub fn as_slice(&self) -> &'a [String] {
        self.args
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> {
        self.args.iter().map(String::as_str)
    }

    pub fn join(&self, separator: &str) -> String {
        self.args.join(separator)
    }

    /// Join arguments starting from an index.
    pub fn join_from(&self, start: usize, separator: &str) -> String {
        self.args.get(start..).unwrap_or(&[]).join(separator)
    }
}

impl std::ops::Index<usize> for CommandArgs<'_> {
    type Output = str;

    fn index(&self, index: usize) -> &Self::Output {
        &self.args[index]
    }
}

/// Result of running a command. An `Err` sets the evaluator's error flag.
pub type CommandResult = Result<(), CommandError>;

/// Type alias for command handler functions.
///
/// Handlers receive the resolved arguments and the console that is running
/// them, so they can read and assign variables or run nested queries.
pub type CommandHandler = Arc<dyn Fn(&CommandArgs, &mut Console) -> CommandResult + Send + Sync>;

/// A console command with a handler function.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::{ConCommand, CommandError};
///
/// let kick = ConCommand::new("kick", |args, _console| {
///     let player = args.require(0, "<player>")?;
///     if player == "host" {
///         return Err(CommandError::new("cannot kick the host"));
///     }
///     Ok(())
/// })
/// .description("Kick a player");
///
/// assert_eq!(kick.name(), "kick");
/// ```
#[derive(Clone)]
pub struct ConCommand {
    name: Box<str>,
    description: &'static str,
    handler: CommandHandler,
    /// The other half of a `+name` / `-name` pair.
    partner: Option<Box<str>>,
}

impl ConCommand {
    pub fn new<F>(name: impl Into<Box<str>>, handler: F) -> Self
    where
        F: Fn(&CommandArgs, &mut Console) -> CommandResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: "",
            handler: Arc::new(handler),
            partner: None,
        }
    }

    pub fn description(mut self, desc: &'static str) -> Self {
        self.description = desc;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn get_description(&self) -> &'static str {
        self.description
    }

    #[inline]
    pub fn partner(&self) -> Option<&str> {
        self.partner.as_deref()
    }

    pub(crate) fn set_partner(&mut self, partner: Option<Box<str>>) {
        self.partner = partner;
    }

    /// A cheap handle to the handler, so it can run while the console that
    /// owns this command is borrowed mutably.
    #[inline]
    pub fn handler(&self) -> CommandHandler {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for ConCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConCommand")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("partner", &self.partner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_args_basic() {
        let values = strings(&["hello", "world"]);
        let args = CommandArgs::new("echo", &values);
        assert_eq!(args.len(), 2);
        assert_eq!(args.get(0), Some("hello"));
        assert_eq!(args.get(1), Some("world"));
        assert_eq!(args.get(2), None);
        assert_eq!(&args[1], "world");
        assert!(args.is_constant());
    }

    #[test]
    fn test_command_args_parse() {
        let values = strings(&["42"]);
        let args = CommandArgs::new("set", &values);
        assert_eq!(args.parse::<i32>(0), Some(42));
        assert_eq!(args.parse::<i32>(1), None);
        assert_eq!(args.parse_or::<i32>(1, 0), 0);
    }

    #[test]
    fn test_command_args_join() {
        let values = strings(&["hello", "world"]);
        let args = CommandArgs::new("echo", &values);
        assert_eq!(args.join(" "), "hello world");
        assert_eq!(args.join_from(1, " "), "world");
        assert_eq!(args.join_from(5, " "), "");
    }

    #[test]
    fn test_command_args_require() {
        let values = Vec::new();
        let args = CommandArgs::new("kick", &values);
        let err = args.require(0, "<player>").unwrap_err();
        assert_eq!(err.message, "Usage: kick <player>");
    }

    #[test]
    fn test_concommand_creation() {
        let cmd = ConCommand::new("test", |_args, _console| Ok(()))
            .description("A test command");

        assert_eq!(cmd.name(), "test");
        assert_eq!(cmd.get_description(), "A test command");
        assert_eq!(cmd.partner(), None);
    }
}
