//! Messages exchanged between the console and the rest of the app.
//!
//! Queries and key presses flow in; output lines and variable changes flow
//! out once the query that produced them has finished.

use bevy::prelude::*;

/// A query submitted for evaluation.
///
/// ```ignore
/// fn respawn_button(mut queries: MessageWriter<ConsoleInputEvent>) {
///     queries.write(ConsoleInputEvent::new("sv_cheats 1 & (god; noclip) | echo denied"));
/// }
/// ```
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct ConsoleInputEvent {
    pub query: String,
}

impl ConsoleInputEvent {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into() }
    }
}

/// A bound key went down or came up.
///
/// Pressing runs the bound query. Releasing runs the `-name` counterpart of
/// a `+name` bind and is ignored for anything else.
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct ConsoleKeyEvent {
    pub key: String,
    pub pressed: bool,
}

impl ConsoleKeyEvent {
    pub fn press(key: impl Into<String>) -> Self {
        Self { key: key.into(), pressed: true }
    }

    pub fn release(key: impl Into<String>) -> Self {
        Self { key: key.into(), pressed: false }
    }
}

/// One entry of console output.
///
/// Error reports for syntax and reference errors span several lines: the
/// message, the offending query and a caret underline.
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOutputEvent {
    pub message: String,
    pub level: ConsoleOutputLevel,
}

/// Kind of an output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleOutputLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Echo of a submitted query.
    Command,
    /// Value printed by a read, such as `"sv_gravity" = "800"`.
    Result,
}

impl ConsoleOutputLevel {
    /// Short tag for plain-text frontends.
    pub fn tag(self) -> &'static str {
        match self {
            ConsoleOutputLevel::Debug => "[DEBUG]",
            ConsoleOutputLevel::Info => "[INFO]",
            ConsoleOutputLevel::Warn => "[WARN]",
            ConsoleOutputLevel::Error => "[ERROR]",
            ConsoleOutputLevel::Command => "[$]",
            ConsoleOutputLevel::Result => "[>]",
        }
    }
}

impl ConsoleOutputEvent {
    pub fn new(level: ConsoleOutputLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Error, message)
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Command, message)
    }

    pub fn result(message: impl Into<String>) -> Self {
        Self::new(ConsoleOutputLevel::Result, message)
    }

    /// Lines of the message, each prefixed with the level tag on the first
    /// line and padding on the rest, so caret underlines stay aligned.
    pub fn tagged_lines(&self) -> impl Iterator<Item = String> + '_ {
        let tag = self.level.tag();
        let pad = " ".repeat(tag.len());
        self.message.lines().enumerate().map(move |(i, line)| {
            if i == 0 {
                format!("{} {}", tag, line)
            } else {
                format!("{} {}", pad, line)
            }
        })
    }
}

/// A variable changed value.
///
/// Sent once per real change, after the query that made it. Reassigning
/// the current value sends nothing.
///
/// ```ignore
/// fn apply_gravity(mut changes: MessageReader<ConVarChangedEvent>, mut gravity: ResMut<Gravity>) {
///     for change in changes.read().filter(|c| &*c.name == "sv_gravity") {
///         gravity.0 = change.new_value.parse().unwrap_or(gravity.0);
///     }
/// }
/// ```
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct ConVarChangedEvent {
    pub name: Box<str>,
    pub old_value: String,
    pub new_value: String,
}

impl ConVarChangedEvent {
    pub fn new(
        name: impl Into<Box<str>>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Registers the console's messages.
pub struct ConsoleEventsPlugin;

impl Plugin for ConsoleEventsPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ConsoleInputEvent>()
            .add_message::<ConsoleKeyEvent>()
            .add_message::<ConsoleOutputEvent>()
            .add_message::<ConVarChangedEvent>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_lines_keep_caret_aligned() {
        let event = ConsoleOutputEvent::error("syntax error at 5: unmatched ')'\necho )\n     ^");
        let lines: Vec<_> = event.tagged_lines().collect();
        assert_eq!(
            lines,
            [
                "[ERROR] syntax error at 5: unmatched ')'",
                "        echo )",
                "             ^",
            ]
        );
    }

    #[test]
    fn test_key_event_constructors() {
        assert!(ConsoleKeyEvent::press("mouse1").pressed);
        assert_eq!(ConsoleKeyEvent::release("mouse1").key, "mouse1");
    }
}
