//! A scriptable developer console for Bevy.
//!
//! Inspired by the Source Engine console, bevy_console_script provides:
//!
//! - **Queries**: `;` sequences, `&` / `|` conditional chaining, `( )`
//!   grouping, quoting and `{name}` interpolation
//! - **ConVar**: Typed console variables with constraints and flags
//! - **ConCommand**: Console commands with handlers, including `+`/`-` pairs
//! - **Aliases** and **key binds** that expand to queries
//! - **Console**: A resource owning all of the above and evaluating queries
//!
//! # Features
//!
//! - `persist`: RON configuration persistence (exec, host_writeconfig)
//! - `full`: Enable everything
//!
//! # Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_console_script::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(ConsolePlugin)
//!         .add_systems(Startup, setup_console)
//!         .run();
//! }
//!
//! fn setup_console(mut console: ResMut<Console>) {
//!     console
//!         .register_var(
//!             ConVar::new("sv_gravity", 800.0f32)
//!                 .description("World gravity")
//!                 .flags(ConVarFlags::ARCHIVE),
//!         )
//!         .unwrap();
//!
//!     console
//!         .register_cmd(
//!             ConCommand::new("noclip", |_, console| {
//!                 console.info("Noclip toggled!");
//!                 Ok(())
//!             })
//!             .description("Toggle noclip mode"),
//!         )
//!         .unwrap();
//!
//!     console.execute("alias +fly \"noclip\"; alias -fly \"noclip\"; bind f +fly");
//! }
//! ```

use bevy::prelude::*;

pub mod builtins;
pub mod core;

#[cfg(feature = "persist")]
pub mod persist;

pub use builtins::register_builtins;
pub use core::{
    AliasRegistry, BindTable, CommandArgs, CommandError, CommandHandler, CommandRegistry,
    CommandResult, ConCommand, ConVar, ConVarChangedEvent, ConVarDyn, ConVarFlags, ConVarMeta,
    ConVarValue, Console, ConsoleEventsPlugin, ConsoleInputEvent, ConsoleKeyEvent,
    ConsoleOutputEvent, ConsoleOutputLevel, ConsoleSettings, Query, QueryError, SyntaxError, VariableStore, parse,
};

#[cfg(feature = "persist")]
pub use persist::{ConfigError, ConfigPath, ConsoleConfigFile};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::ConsolePlugin;
    pub use crate::core::{
        CommandArgs, CommandError, CommandResult, ConCommand, ConVar, ConVarChangedEvent,
        ConVarFlags, ConVarValue, Console, ConsoleInputEvent, ConsoleKeyEvent,
        ConsoleOutputEvent, ConsoleOutputLevel, ConsoleSettings,
    };
}

/// Main console plugin.
///
/// Inserts a [`Console`] resource with the built-in commands, evaluates
/// every [`ConsoleInputEvent`], runs binds for every [`ConsoleKeyEvent`]
/// and forwards the resulting output and variable changes as messages.
#[derive(Default)]
pub struct ConsolePlugin;

impl Plugin for ConsolePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Console>()
            .add_plugins(core::ConsoleEventsPlugin);

        app.add_systems(Startup, register_builtin_commands);

        // 1. execute_console_input: evaluate queued queries
        // 2. handle_key_events: run binds
        // 3. send_pending_outputs: forward buffered output and changes
        app.add_systems(
            Update,
            (execute_console_input, handle_key_events, send_pending_outputs).chain(),
        );

        #[cfg(feature = "persist")]
        {
            app.init_resource::<persist::ConfigPath>()
                .init_resource::<persist::ConfigDirty>()
                .add_systems(
                    Startup,
                    persist::setup_persistence.after(register_builtin_commands),
                )
                .add_systems(Update, persist::save_dirty_config.after(send_pending_outputs));
        }
    }
}

fn register_builtin_commands(mut console: ResMut<Console>) {
    builtins::register_builtins(&mut console);
    debug!("Console: {} commands registered", console.commands().len());
}

/// Evaluate each submitted query in order.
fn execute_console_input(
    mut console: ResMut<Console>,
    mut input_events: MessageReader<ConsoleInputEvent>,
) {
    for event in input_events.read() {
        let source = event.query.trim();
        if source.is_empty() {
            continue;
        }
        console.print(ConsoleOutputEvent::command(format!("$ {}", source)));
        console.execute(source);
    }
}

fn handle_key_events(mut console: ResMut<Console>, mut key_events: MessageReader<ConsoleKeyEvent>) {
    for event in key_events.read() {
        if event.pressed {
            console.press(&event.key);
        } else {
            console.release(&event.key);
        }
    }
}

fn send_pending_outputs(
    mut console: ResMut<Console>,
    mut output_events: MessageWriter<ConsoleOutputEvent>,
    mut change_events: MessageWriter<ConVarChangedEvent>,
) {
    for output in console.drain_output() {
        output_events.write(output);
    }
    for change in console.drain_changes() {
        change_events.write(change);
    }
}
