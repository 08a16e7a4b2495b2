//! The console context.
//!
//! [`Console`] owns everything a query can touch: variables, commands,
//! aliases, key bindings, the parse cache and the diagnostic output buffer.
//! Separate instances share nothing, so tests and multiple consoles don't
//! need global setup or teardown.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::log::{debug, error, info, warn};
use bevy::prelude::Resource;

use super::ast::Query;
use super::binds::BindTable;
use super::concommand::ConCommand;
use super::convar::{ConVar, ConVarValue};
use super::error::{QueryError, RegistryError, StoreError, SyntaxError};
use super::events::{ConVarChangedEvent, ConsoleOutputEvent, ConsoleOutputLevel};
use super::parser::QueryCache;
use super::registry::{AliasRegistry, CommandRegistry};
use super::store::{ConVarMeta, SetOutcome, VariableStore};

/// Tunables for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    /// Maximum nesting of alias expansions and synthesized assignments.
    /// Exceeding it aborts the whole query.
    pub max_depth: usize,
    /// Number of visited nodes, across all nesting levels of one query,
    /// after which a warning is emitted. Evaluation keeps going.
    pub iteration_warning: usize,
    /// Number of parsed queries kept in the cache. Zero disables caching.
    pub cache_capacity: usize,
    /// Number of undrained output lines, and separately of undrained
    /// change events, kept before the oldest are dropped.
    pub buffer_capacity: usize,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            max_depth: 32,
            iteration_warning: 1000,
            cache_capacity: 256,
            buffer_capacity: 4096,
        }
    }
}

/// A console instance.
///
/// Output lines and variable change events are buffered until drained
/// with [`Console::drain_output`] and [`Console::drain_changes`]. The
/// plugin drains both every frame. A console used on its own should drain
/// them too; otherwise only the newest
/// [`ConsoleSettings::buffer_capacity`] entries of each are kept.
///
/// # Examples
///
/// ```
/// use bevy_console_script::prelude::*;
///
/// let mut console = Console::with_builtins();
/// console.register_var(ConVar::new("sv_gravity", 800.0f32)).unwrap();
///
/// assert!(console.execute("sv_gravity 400 & echo gravity is {sv_gravity}"));
/// assert_eq!(console.get::<f32>("sv_gravity"), Some(400.0));
///
/// let output = console.drain_output();
/// assert_eq!(output.last().unwrap().message, "gravity is 400");
/// ```
#[derive(Resource)]
pub struct Console {
    vars: VariableStore,
    commands: CommandRegistry,
    aliases: AliasRegistry,
    binds: BindTable,
    cache: QueryCache,
    output: VecDeque<ConsoleOutputEvent>,
    settings: ConsoleSettings,
    pub(super) depth: usize,
    pub(super) steps: usize,
    /// Error from a query a handler ran through [`Console::execute`], with
    /// that query's source. Re-raised once the handler returns.
    pub(super) pending: Option<(String, QueryError)>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(ConsoleSettings::default())
    }
}

impl Console {
    /// Create an empty console with no commands registered.
    pub fn new(settings: ConsoleSettings) -> Self {
        Self {
            vars: VariableStore::new(),
            commands: CommandRegistry::new(),
            aliases: AliasRegistry::new(),
            binds: BindTable::new(),
            cache: QueryCache::with_capacity(settings.cache_capacity),
            output: VecDeque::new(),
            settings,
            depth: 0,
            steps: 0,
            pending: None,
        }
    }

    #[inline]
    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    #[inline]
    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    #[inline]
    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    #[inline]
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    #[inline]
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    #[inline]
    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    #[inline]
    pub fn aliases_mut(&mut self) -> &mut AliasRegistry {
        &mut self.aliases
    }

    #[inline]
    pub fn binds(&self) -> &BindTable {
        &self.binds
    }

    #[inline]
    pub fn binds_mut(&mut self) -> &mut BindTable {
        &mut self.binds
    }

    // Output

    /// Queue a line of output. Every line is also written to the log.
    pub fn print(&mut self, event: ConsoleOutputEvent) {
        match event.level {
            ConsoleOutputLevel::Debug => debug!("[console] {}", event.message),
            ConsoleOutputLevel::Warn => warn!("[console] {}", event.message),
            ConsoleOutputLevel::Error => error!("[console] {}", event.message),
            ConsoleOutputLevel::Info | ConsoleOutputLevel::Command | ConsoleOutputLevel::Result => {
                info!("[console] {}", event.message)
            }
        }
        if self.output.len() >= self.settings.buffer_capacity {
            self.output.pop_front();
        }
        self.output.push_back(event);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.print(ConsoleOutputEvent::info(message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.print(ConsoleOutputEvent::warn(message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.print(ConsoleOutputEvent::error(message));
    }

    pub fn result(&mut self, message: impl Into<String>) {
        self.print(ConsoleOutputEvent::result(message));
    }

    /// Take the output queued since the last call.
    pub fn drain_output(&mut self) -> Vec<ConsoleOutputEvent> {
        self.output.drain(..).collect()
    }

    /// Take the variable change events queued since the last call.
    pub fn drain_changes(&mut self) -> Vec<ConVarChangedEvent> {
        self.vars.drain_changes()
    }

    // Registration

    /// Register a built-in variable.
    ///
    /// Returns `Ok(true)` if newly registered, `Ok(false)` if it replaced an
    /// existing variable.
    pub fn register_var<T: ConVarValue>(&mut self, cvar: ConVar<T>) -> Result<bool, StoreError> {
        self.vars.register_var(cvar)
    }

    /// Register a command.
    ///
    /// Returns `Ok(true)` if newly registered, `Ok(false)` if it replaced an
    /// existing command.
    pub fn register_cmd(&mut self, cmd: ConCommand) -> Result<bool, RegistryError> {
        self.commands.register(cmd)
    }

    /// Register a `+base` / `-base` command pair.
    pub fn register_pair(
        &mut self,
        base: &str,
        press: ConCommand,
        release: ConCommand,
    ) -> Result<(), RegistryError> {
        self.commands.register_pair(base, press, release)
    }

    // Variables

    pub fn get<T: ConVarValue>(&self, name: &str) -> Option<T> {
        self.vars.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.vars.get_string(name)
    }

    /// Assign a variable from host code.
    ///
    /// Same rules as an assignment from a query, including flag checks and
    /// write-through.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<SetOutcome, StoreError> {
        let outcome = self.vars.set(name, raw, true);
        self.vars.keep_recent_changes(self.settings.buffer_capacity);
        outcome
    }

    /// Subscribe to changes of a variable.
    pub fn on_change<F>(&mut self, name: &str, listener: F) -> Result<(), StoreError>
    where
        F: Fn(&str, &str, &ConVarMeta) + Send + Sync + 'static,
    {
        self.vars.on_change(name, listener)
    }

    /// Tell the persist hook that an alias or bind was edited.
    pub(crate) fn persist_edit(&self, name: &str, value: &str) {
        self.vars.persist(name, value);
    }

    // Queries

    /// Parse `source`, reusing a cached parse when there is one.
    pub fn parse(&mut self, source: &str) -> Result<Arc<Query>, SyntaxError> {
        self.cache.get_or_parse(source)
    }

    /// Parse and evaluate a query, reporting any error to the output.
    ///
    /// Returns `true` if no invocation failed. When called from a command
    /// handler, a syntax, reference or recursion error is not reported here
    /// but aborts the query that ran the handler.
    pub fn execute(&mut self, source: &str) -> bool {
        self.run(source, false)
    }

    /// Like [`Console::execute`], but syntax and reference errors are
    /// reported here even inside a command handler, so the handler can move
    /// on to its next query. Exceeding the depth limit still aborts the
    /// query that ran the handler.
    pub fn execute_line(&mut self, source: &str) -> bool {
        self.run(source, true)
    }

    fn run(&mut self, source: &str, contained: bool) -> bool {
        if self.pending.is_some() {
            return false;
        }
        let outcome = self
            .parse(source)
            .map_err(QueryError::from)
            .and_then(|query| self.evaluate(&query));
        if self.depth == 0 {
            self.vars.keep_recent_changes(self.settings.buffer_capacity);
        }
        match outcome {
            Ok(passed) => passed,
            Err(err)
                if self.depth > 0
                    && (!contained || matches!(err, QueryError::RecursionLimit { .. })) =>
            {
                self.pending = Some((source.to_string(), err));
                false
            }
            Err(err) => {
                self.error(err.report(source));
                false
            }
        }
    }

    // Binds

    /// Run the query bound to `key`.
    ///
    /// Returns `false` if nothing is bound or the query failed.
    pub fn press(&mut self, key: &str) -> bool {
        let Some(query) = self.binds.query_for(key).map(str::to_string) else {
            debug!("Console: '{}' is not bound", key);
            return false;
        };
        self.execute(&query)
    }

    /// Release `key`.
    ///
    /// When the key is bound to a single `+name` invocation, the matching
    /// `-name` is run. Any other binding does nothing on release.
    pub fn release(&mut self, key: &str) -> bool {
        let Some(source) = self.binds.query_for(key).map(str::to_string) else {
            return false;
        };
        let Ok(query) = self.parse(&source) else {
            return false;
        };
        let Some(release) = query.single_press().map(|press| format!("-{}", &press[1..])) else {
            return false;
        };
        if !self.commands.contains(&release) && !self.aliases.contains(&release) {
            return false;
        }
        self.execute(&release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CommandError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_console_output_buffer() {
        let mut console = Console::default();
        console.info("hello");
        console.warn("careful");

        let output = console.drain_output();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0], ConsoleOutputEvent::info("hello"));
        assert_eq!(output[1].level, ConsoleOutputLevel::Warn);
        assert!(console.drain_output().is_empty());
    }

    #[test]
    fn test_console_buffers_are_capped() {
        let mut console = Console::new(ConsoleSettings {
            buffer_capacity: 3,
            ..ConsoleSettings::default()
        });
        console.register_var(ConVar::new("cl_fov", 90i32)).unwrap();
        for i in 0..5 {
            console.info(format!("line {}", i));
            console.set("cl_fov", &(100 + i).to_string()).unwrap();
        }

        let output: Vec<_> = console.drain_output().into_iter().map(|o| o.message).collect();
        assert_eq!(output, ["line 2", "line 3", "line 4"]);

        let changes = console.drain_changes();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].new_value, "102");
        assert_eq!(changes[2].new_value, "104");
    }

    #[test]
    fn test_console_syntax_error_is_reported() {
        let mut console = Console::default();
        assert!(!console.execute("echo )"));

        let output = console.drain_output();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].level, ConsoleOutputLevel::Error);
        assert!(output[0].message.ends_with("echo )\n     ^"));
    }

    #[test]
    fn test_console_press_release() {
        let mut console = Console::default();
        let pressed = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pressed);
        let press = ConCommand::new("+jump", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let counter = Arc::clone(&released);
        let release = ConCommand::new("-jump", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        console.register_pair("jump", press, release).unwrap();
        console.binds_mut().bind("space", "+jump");

        assert!(console.press("space"));
        assert!(console.release("space"));
        assert!(!console.press("enter"));
        assert_eq!(pressed.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_console_release_ignores_compound_binds() {
        let mut console = Console::default();
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        console.register_pair(
            "duck",
            ConCommand::new("+duck", |_, _| Ok(())),
            ConCommand::new("-duck", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ).unwrap();
        console.binds_mut().bind("ctrl", "+duck; +duck");

        assert!(!console.release("ctrl"));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_console_command_error_sets_result() {
        let mut console = Console::default();
        console
            .register_cmd(ConCommand::new("fail", |_, _| Err(CommandError::new("nope"))))
            .unwrap();

        assert!(!console.execute("fail"));
        let output = console.drain_output();
        assert_eq!(output[0].message, "fail: nope");
    }
}
