//! Query evaluation.
//!
//! The walk is iterative. Entering a group remembers where to resume after
//! it (the group's `next`) on a continuation stack. When the next step in a
//! chain is refused by its operator, evaluation falls back to the most
//! recent continuation, tested against the same rule. Aliases and variable
//! assignments re-enter evaluation one level deeper.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::ast::{Clause, Invocation, NodeId, Query, quote};
use super::concommand::{CommandArgs, ConCommand};
use super::console::Console;
use super::error::{CommandError, InvocationError, QueryError};
use super::parser::parse;
use super::resolve::resolve_arguments;

impl Console {
    /// Evaluate a parsed query.
    ///
    /// Returns `Ok(true)` if no invocation failed. Syntax and reference
    /// errors, and exceeding [`ConsoleSettings::max_depth`], abort the whole
    /// query with an `Err`.
    ///
    /// [`ConsoleSettings::max_depth`]: super::ConsoleSettings::max_depth
    pub fn evaluate(&mut self, query: &Query) -> Result<bool, QueryError> {
        self.descend(query, || query.to_string())
    }

    fn descend(&mut self, query: &Query, name: impl FnOnce() -> String) -> Result<bool, QueryError> {
        let limit = self.settings().max_depth;
        if self.depth >= limit {
            return Err(QueryError::RecursionLimit { name: name(), limit });
        }
        if self.depth == 0 {
            self.steps = 0;
        }

        self.depth += 1;
        let result = self.walk(query);
        self.depth -= 1;
        result
    }

    fn walk(&mut self, query: &Query) -> Result<bool, QueryError> {
        let mut stack = Vec::new();
        let mut error = false;
        let mut failed = false;

        let mut current = advance(query, Some(query.root()), &mut stack, error);
        while let Some(id) = current {
            self.steps += 1;
            if self.steps == self.settings().iteration_warning {
                let steps = self.steps;
                self.warn(format!(
                    "Query has run {} invocations, check for a runaway alias",
                    steps
                ));
            }

            let node = query.node(id);
            current = match &node.clause {
                Clause::Group { subchain } => advance(query, Some(*subchain), &mut stack, error),
                Clause::Command(invocation) => {
                    error = self.invoke(invocation)?;
                    failed |= error;
                    advance(query, node.next, &mut stack, error)
                }
            };
        }
        Ok(!failed)
    }

    /// Run one invocation. Returns the new error flag.
    fn invoke(&mut self, invocation: &Invocation) -> Result<bool, QueryError> {
        let name = invocation.name.as_str();
        if name.is_empty() {
            if invocation.args.is_empty() {
                return Ok(false);
            }
            self.report(InvocationError::MissingName);
            return Ok(true);
        }

        if let Some(handler) = self.commands().get(name).map(ConCommand::handler) {
            let resolved = resolve_arguments(&invocation.args, self.vars())?;
            let args = CommandArgs::new(name, &resolved.values).with_constant(resolved.constant);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&args, &mut *self)))
                .unwrap_or_else(|payload| {
                    Err(CommandError::new(format!("panicked: {}", panic_message(payload.as_ref()))))
                });
            if let Some((source, err)) = self.pending.take() {
                return Err(err.within(name, &source));
            }
            return Ok(match outcome {
                Ok(()) => false,
                Err(source) => {
                    self.report(InvocationError::Command {
                        name: name.to_string(),
                        source,
                    });
                    true
                }
            });
        }

        if let Some(body) = self.aliases().get(name).map(str::to_string) {
            if !invocation.args.is_empty() {
                self.warn(format!(
                    "Alias '{}' takes no arguments, ignoring {}",
                    name,
                    invocation.args.len()
                ));
            }
            let query = self
                .parse(&body)
                .map_err(|err| QueryError::from(err).within(name, &body))?;
            let passed = self
                .descend(&query, || name.to_string())
                .map_err(|err| err.within(name, &body))?;
            return Ok(!passed);
        }

        if self.vars().has(name) {
            if invocation.args.is_empty() {
                let value = self.get_string(name).unwrap_or_default();
                self.result(format!("\"{}\" = \"{}\"", name, value));
                return Ok(false);
            }
            let resolved = resolve_arguments(&invocation.args, self.vars())?;
            let source = format!("assign {} {}", name, quote(&resolved.values.join(" ")));
            let query = parse(&source)?;
            let passed = self.descend(&query, || name.to_string())?;
            return Ok(!passed);
        }

        self.report(InvocationError::EntityNotFound(name.to_string()));
        Ok(true)
    }

    fn report(&mut self, err: InvocationError) {
        self.error(err.to_string());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pick the next node to visit, starting from `candidate`.
///
/// A group's continuation is pushed as soon as the group is considered, so
/// it is still reachable when the group itself is skipped.
fn advance(
    query: &Query,
    mut candidate: Option<NodeId>,
    stack: &mut Vec<NodeId>,
    error: bool,
) -> Option<NodeId> {
    loop {
        let id = match candidate.take() {
            Some(id) => id,
            None => stack.pop()?,
        };
        let node = query.node(id);
        if let (Clause::Group { .. }, Some(next)) = (&node.clause, node.next) {
            stack.push(next);
        }
        if node.op.allows(error) {
            return Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConVar, ConVarFlags, ConsoleOutputLevel, ConsoleSettings};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// A console with recording commands `a`..`d`, `fail` and `say`.
    fn recording_console(settings: ConsoleSettings) -> (Console, Log) {
        let mut console = Console::new(settings);
        crate::builtins::register_builtins(&mut console);
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c", "d"] {
            let log = Arc::clone(&log);
            console
                .register_cmd(ConCommand::new(name, move |args, _| {
                    log.lock().unwrap().push(args.name().to_string());
                    Ok(())
                }))
                .unwrap();
        }

        let fail_log = Arc::clone(&log);
        console
            .register_cmd(ConCommand::new("fail", move |_, _| {
                fail_log.lock().unwrap().push("fail".to_string());
                Err(CommandError::new("failed on purpose"))
            }))
            .unwrap();

        let say_log = Arc::clone(&log);
        console
            .register_cmd(ConCommand::new("say", move |args, _| {
                let constant = if args.is_constant() { "const" } else { "dyn" };
                say_log
                    .lock()
                    .unwrap()
                    .push(format!("say[{}]:{}", constant, args.join("|")));
                Ok(())
            }))
            .unwrap();

        (console, log)
    }

    fn run(console: &mut Console, log: &Log, source: &str) -> (bool, Vec<String>) {
        log.lock().unwrap().clear();
        let passed = console.execute(source);
        let visited = log.lock().unwrap().clone();
        (passed, visited)
    }

    #[test]
    fn test_sequence_runs_everything() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, "a; b; c");
        assert!(passed);
        assert_eq!(visited, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flat_chain_is_right_associative() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, "fail & b; c");
        assert!(!passed);
        assert_eq!(visited, vec!["fail"]);
    }

    #[test]
    fn test_failed_guard_skips_group_and_resumes_after_it() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (_, visited) = run(&mut console, &log, "fail & (b; c); d");
        assert_eq!(visited, vec!["fail", "d"]);

        let (passed, visited) = run(&mut console, &log, "a & (b; c); d");
        assert!(passed);
        assert_eq!(visited, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_fallback_chaining() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, "fail | b");
        assert!(!passed);
        assert_eq!(visited, vec!["fail", "b"]);

        let (passed, visited) = run(&mut console, &log, "a | b");
        assert!(passed);
        assert_eq!(visited, vec!["a"]);
    }

    #[test]
    fn test_nested_groups_resume_outer_continuation() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (_, visited) = run(&mut console, &log, "a & (fail | (b; c)) & d");
        assert_eq!(visited, vec!["a", "fail", "b", "c", "d"]);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let query = "a; fail | (b & c); d";
        let (_, first) = run(&mut console, &log, query);
        let (_, second) = run(&mut console, &log, query);
        assert_eq!(first, second);
    }

    #[test]
    fn test_alias_result_drives_chaining() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.aliases_mut().set("bad", "fail").unwrap();
        console.aliases_mut().set("good", "a; b").unwrap();

        let (_, visited) = run(&mut console, &log, "(bad & c) | d");
        assert_eq!(visited, vec!["fail", "d"]);

        let (passed, visited) = run(&mut console, &log, "good & c");
        assert!(passed);
        assert_eq!(visited, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_alias_is_re_expanded_on_each_use() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.aliases_mut().set("x", "a").unwrap();
        run(&mut console, &log, "x");
        console.aliases_mut().set("x", "b").unwrap();
        let (_, visited) = run(&mut console, &log, "x");
        assert_eq!(visited, vec!["b"]);
    }

    #[test]
    fn test_alias_extra_arguments_warn() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.aliases_mut().set("x", "a").unwrap();
        let (passed, visited) = run(&mut console, &log, "x 1 2");
        assert!(passed);
        assert_eq!(visited, vec!["a"]);
        let output = console.drain_output();
        assert!(output.iter().any(|o| o.level == ConsoleOutputLevel::Warn));
    }

    #[test]
    fn test_cvar_read_and_assign() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.register_var(ConVar::new("sv_gravity", 800.0f32)).unwrap();

        assert!(console.execute("sv_gravity"));
        let output = console.drain_output();
        assert_eq!(output[0].level, ConsoleOutputLevel::Result);
        assert_eq!(output[0].message, "\"sv_gravity\" = \"800\"");

        let (passed, _) = run(&mut console, &log, "sv_gravity 400");
        assert!(passed);
        assert_eq!(console.get::<f32>("sv_gravity"), Some(400.0));
    }

    #[test]
    fn test_cvar_assign_joins_and_escapes_arguments() {
        let (mut console, _) = recording_console(ConsoleSettings::default());
        console.register_var(ConVar::new("motd", String::new())).unwrap();

        assert!(console.execute(r#"motd hello "\{braces} and \"quotes\"""#));
        assert_eq!(
            console.get::<String>("motd"),
            Some(r#"hello {braces} and "quotes""#.to_string())
        );
    }

    #[test]
    fn test_locked_cvar_assignment_fails() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console
            .register_var(ConVar::new("sv_version", 3i32).flags(ConVarFlags::READ_ONLY))
            .unwrap();

        let (passed, visited) = run(&mut console, &log, "sv_version 4 | a");
        assert!(!passed);
        assert_eq!(visited, vec!["a"]);
        assert_eq!(console.get::<i32>("sv_version"), Some(3));
    }

    #[test]
    fn test_unknown_entity() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, "nope | a");
        assert!(!passed);
        assert_eq!(visited, vec!["a"]);
        let output = console.drain_output();
        assert_eq!(output[0].message, "Unknown command or variable: 'nope'");
    }

    #[test]
    fn test_quoted_name_reports_missing_name() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, r#""x" y | a"#);
        assert!(!passed);
        assert_eq!(visited, vec!["a"]);
        let output = console.drain_output();
        assert_eq!(output[0].message, InvocationError::MissingName.to_string());
    }

    #[test]
    fn test_interpolation_and_constancy() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.register_var(ConVar::new("bar", "X".to_string())).unwrap();

        let (_, visited) = run(&mut console, &log, r#"say ok "foo {bar} baz""#);
        assert_eq!(visited, vec!["say[dyn]:ok|foo X baz"]);

        let (_, visited) = run(&mut console, &log, "say plain");
        assert_eq!(visited, vec!["say[const]:plain"]);
    }

    #[test]
    fn test_reference_error_unwinds_query() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let source = r#"a; say ok "foo {bar} baz"; b"#;
        let (passed, visited) = run(&mut console, &log, source);
        assert!(!passed);
        assert_eq!(visited, vec!["a"]);

        let output = console.drain_output();
        assert_eq!(output.len(), 1);
        assert!(output[0].message.contains("'bar' is not defined"));
        assert!(output[0].message.ends_with("\n               ^^^^^"));
    }

    #[test]
    fn test_recursive_alias_fails_cleanly() {
        let (mut console, log) = recording_console(ConsoleSettings {
            max_depth: 8,
            ..ConsoleSettings::default()
        });
        console.aliases_mut().set("loop", "a; loop").unwrap();

        let (passed, visited) = run(&mut console, &log, "loop; b");
        assert!(!passed);
        assert_eq!(visited.len(), 7);
        assert!(!visited.contains(&"b".to_string()));

        let errors: Vec<_> = console
            .drain_output()
            .into_iter()
            .filter(|o| o.level == ConsoleOutputLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "recursion limit of 8 exceeded while expanding 'loop'");
    }

    #[test]
    fn test_iteration_warning_does_not_abort() {
        let (mut console, log) = recording_console(ConsoleSettings {
            iteration_warning: 3,
            ..ConsoleSettings::default()
        });
        let (passed, visited) = run(&mut console, &log, "a; a; a; a; a");
        assert!(passed);
        assert_eq!(visited.len(), 5);

        let warnings = console
            .drain_output()
            .into_iter()
            .filter(|o| o.level == ConsoleOutputLevel::Warn)
            .count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_alias_body_syntax_error_points_into_body() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console.aliases_mut().set("broken", "a )").unwrap();

        let (passed, visited) = run(&mut console, &log, "broken; b");
        assert!(!passed);
        assert!(visited.is_empty());
        let output = console.drain_output();
        assert!(output[0].message.starts_with("in 'broken':"));
        assert!(output[0].message.ends_with("a )\n  ^"));
    }

    #[test]
    fn test_handler_execute_error_aborts_outer_query() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console
            .register_cmd(ConCommand::new("run", |args, console| {
                console.execute(args.get_or(0, ""));
                Ok(())
            }))
            .unwrap();

        let (passed, visited) = run(&mut console, &log, r#"run "a; echo )"; b"#);
        assert!(!passed);
        assert_eq!(visited, Vec::<String>::new());
        let output = console.drain_output();
        assert_eq!(output.len(), 1);
        assert!(output[0].message.starts_with("in 'run':"));
    }

    #[test]
    fn test_panicking_handler_is_reported() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        console
            .register_cmd(ConCommand::new("boom", |_, _| panic!("kaboom")))
            .unwrap();

        let (passed, visited) = run(&mut console, &log, "boom | a");
        assert!(!passed);
        assert_eq!(visited, vec!["a"]);
        let output = console.drain_output();
        assert_eq!(output[0].message, "boom: panicked: kaboom");
    }

    #[test]
    fn test_empty_query_is_noop() {
        let (mut console, log) = recording_console(ConsoleSettings::default());
        let (passed, visited) = run(&mut console, &log, "   # nothing");
        assert!(passed);
        assert!(visited.is_empty());
        assert!(console.drain_output().is_empty());
    }
}
