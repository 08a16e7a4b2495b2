//! Headless console example.
//!
//! Drives the console through messages without any UI: variables,
//! commands, conditional chains, aliases and key binds.
//!
//! Run with: `cargo run --example headless`

use bevy::prelude::*;
use bevy_console_script::prelude::*;

fn main() {
    App::new()
        .add_plugins(MinimalPlugins)
        .add_plugins(ConsolePlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (send_test_queries.run_if(run_once), process_outputs, quit))
        .run();
}

fn setup(mut console: ResMut<Console>) {
    let vars = [
        console.register_var(
            ConVar::new("sv_gravity", 800.0f32)
                .description("World gravity (units/s^2)")
                .flags(ConVarFlags::ARCHIVE)
                .min(0.0)
                .max(2000.0),
        ),
        console.register_var(
            ConVar::new("sv_maxplayers", 32i32)
                .description("Maximum players")
                .flags(ConVarFlags::READ_ONLY),
        ),
    ];
    for result in vars {
        if let Err(e) = result {
            error!("{}", e);
        }
    }

    let greet = ConCommand::new("greet", |args, console| {
        let name = args.get_or(0, "World");
        console.info(format!("Hello, {}!", name));
        Ok(())
    })
    .description("Greet someone");

    let press = ConCommand::new("+attack", |_, console| {
        console.info("attack started");
        Ok(())
    });
    let release = ConCommand::new("-attack", |_, console| {
        console.info("attack stopped");
        Ok(())
    });

    if let Err(e) = console.register_cmd(greet) {
        error!("{}", e);
    }
    if let Err(e) = console.register_pair("attack", press, release) {
        error!("{}", e);
    }

    console.binds_mut().bind("mouse1", "+attack");
    println!("Console initialized. Registered: sv_gravity, sv_maxplayers, greet, +attack/-attack");
}

/// Send some test queries programmatically.
fn send_test_queries(
    mut events: MessageWriter<ConsoleInputEvent>,
    mut keys: MessageWriter<ConsoleKeyEvent>,
) {
    println!("\n--- Sending test queries ---");

    // Read and assign a variable
    events.write(ConsoleInputEvent::new("sv_gravity"));
    events.write(ConsoleInputEvent::new("sv_gravity 1000 & echo gravity is now {sv_gravity}"));

    // Locked variables refuse assignment, so the fallback runs
    events.write(ConsoleInputEvent::new("sv_maxplayers 64 | echo maxplayers is locked"));

    // Commands, sequences and groups
    events.write(ConsoleInputEvent::new("greet Developer; (missing & echo skipped) | echo recovered"));

    // Aliases expand to queries
    events.write(ConsoleInputEvent::new("alias hi \"greet alias; echo from {sv_gravity}\"; hi"));

    // Binds run queries on press and the paired command on release
    keys.write(ConsoleKeyEvent::press("mouse1"));
    keys.write(ConsoleKeyEvent::release("mouse1"));
}

/// Process and print console output messages.
fn process_outputs(mut events: MessageReader<ConsoleOutputEvent>) {
    for event in events.read() {
        for line in event.tagged_lines() {
            println!("{}", line);
        }
    }
}

fn quit(mut frames: Local<u32>, mut exit: MessageWriter<AppExit>) {
    *frames += 1;
    if *frames > 2 {
        exit.write(AppExit::Success);
    }
}
