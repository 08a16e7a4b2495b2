//! Built-in console commands.

use crate::core::{
    CommandArgs, CommandError, CommandResult, ConCommand, ConVar, ConVarFlags, ConVarValue,
    Console, ConsoleOutputEvent, SetOutcome, quote,
};

/// Register every built-in command on `console`.
///
/// Variable assignment (`name value`) is carried out through `assign`, so a
/// console without it can read variables but not write them.
pub fn register_builtins(console: &mut Console) {
    let commands = [
        ConCommand::new("assign", assign).description("Assign a value to a variable"),
        ConCommand::new("echo", echo).description("Print text to console"),
        ConCommand::new("alias", alias).description("Create, show or list aliases"),
        ConCommand::new("unalias", unalias).description("Remove an alias and its +/- forms"),
        ConCommand::new("declare", declare).description("Declare a user variable"),
        ConCommand::new("undeclare", undeclare).description("Remove a user variable"),
        ConCommand::new("toggle", toggle).description("Toggle a variable or cycle it through values"),
        ConCommand::new("reset", reset).description("Reset a variable to its default value"),
        ConCommand::new("cvarlist", cvarlist).description("List console variables"),
        ConCommand::new("cmdlist", cmdlist).description("List console commands"),
        ConCommand::new("help", help).description("Show help for a command, alias or variable"),
        ConCommand::new("find", find).description("Search commands and variables by name or description"),
        ConCommand::new("differences", differences).description("Show variables with non-default values"),
        ConCommand::new("bind", bind).description("Bind a key to a query, or show a binding"),
        ConCommand::new("unbind", unbind).description("Remove a key binding"),
        ConCommand::new("unbind_all", unbind_all).description("Remove every key binding"),
    ];

    for cmd in commands {
        if let Err(err) = console.register_cmd(cmd) {
            bevy::log::error!("Console: failed to register built-in: {}", err);
        }
    }
}

impl Console {
    /// Create a console with the built-in commands registered.
    pub fn with_builtins() -> Self {
        let mut console = Console::default();
        register_builtins(&mut console);
        console
    }
}

fn assign(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let name = args.require(0, "<variable> <value>")?;
    if args.len() < 2 {
        return Err(CommandError::new("Usage: assign <variable> <value>"));
    }
    let value = args.join_from(1, " ");
    if let SetOutcome::Changed { new, .. } = console.vars_mut().set(name, &value, true)? {
        console.print(ConsoleOutputEvent::debug(format!("{} = \"{}\"", name, new)));
    }
    Ok(())
}

fn echo(args: &CommandArgs, console: &mut Console) -> CommandResult {
    console.info(args.join(" "));
    Ok(())
}

fn alias(args: &CommandArgs, console: &mut Console) -> CommandResult {
    match args.get(0) {
        None => {
            if console.aliases().is_empty() {
                console.info("No aliases defined");
                return Ok(());
            }
            let lines: Vec<String> = console
                .aliases()
                .iter()
                .map(|(name, body)| format!("  {} -> {}", name, body))
                .collect();
            console.info("Aliases:");
            for line in lines {
                console.info(line);
            }
        }
        Some(name) if args.len() == 1 => {
            let body = console
                .aliases()
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| CommandError::new(format!("Alias '{}' not found", name)))?;
            console.result(format!("{} -> {}", name, body));
        }
        Some(name) => {
            let body = query_from(args, 1);
            if let Err(err) = console.parse(&body) {
                return Err(CommandError::new(format!("{}\n{}", err, err.render(&body))));
            }
            console.aliases_mut().set(name, body.as_str())?;
            console.persist_edit(name, &body);
        }
    }
    Ok(())
}

fn unalias(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let name = args.require(0, "<alias>")?;
    let removed = console.aliases_mut().remove_paired(name)?;
    for name in &removed {
        console.persist_edit(name, "");
    }
    console.info(format!("Removed {}", removed.join(", ")));
    Ok(())
}

fn declare(args: &CommandArgs, console: &mut Console) -> CommandResult {
    const USAGE: &str = "<name> [bool|int|float|string] [value]";
    let name = args.require(0, USAGE)?;

    let (kind, value_from) = match args.get(1) {
        Some(kind @ ("bool" | "int" | "float" | "string")) => (kind, 2),
        _ => ("string", 1),
    };
    let value = (args.len() > value_from).then(|| args.join_from(value_from, " "));
    let value = value.as_deref();

    let store = console.vars_mut();
    let declared = match kind {
        "bool" => store.declare(ConVar::new(name, parse_default(value, false)?)),
        "int" => store.declare(ConVar::new(name, parse_default(value, 0i64)?)),
        "float" => store.declare(ConVar::new(name, parse_default(value, 0.0f64)?)),
        _ => store.declare(ConVar::new(name, value.unwrap_or_default().to_string())),
    };
    declared.map_err(CommandError::from)
}

fn parse_default<T: ConVarValue>(value: Option<&str>, fallback: T) -> Result<T, CommandError> {
    match value {
        Some(raw) => T::cast(raw).map_err(CommandError::new),
        None => Ok(fallback),
    }
}

fn undeclare(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let name = args.require(0, "<name>")?;
    console.vars_mut().remove(name)?;
    Ok(())
}

fn toggle(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let name = args.require(0, "<variable> [value...]")?;
    let current = console
        .get_string(name)
        .ok_or_else(|| CommandError::new(format!("Unknown variable: '{}'", name)))?;

    let next = if args.len() > 1 {
        // Cycle through the given values, starting over from the first one
        // when the current value isn't among them.
        let values: Vec<&str> = args.iter().skip(1).collect();
        let position = values.iter().position(|v| *v == current);
        let index = position.map_or(0, |i| (i + 1) % values.len());
        values[index].to_string()
    } else if let Some(value) = console.get::<bool>(name) {
        (!value).format()
    } else if let Some(value) = console.get::<i32>(name) {
        (if value == 0 { "1" } else { "0" }).to_string()
    } else if let Some(value) = console.get::<i64>(name) {
        (if value == 0 { "1" } else { "0" }).to_string()
    } else {
        return Err(CommandError::new(format!(
            "Cannot toggle '{}': not a boolean or integer",
            name
        )));
    };

    console.vars_mut().set(name, &next, true)?;
    console.info(format!("{} = \"{}\"", name, next));
    Ok(())
}

fn reset(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let name = args.require(0, "<variable>")?;
    console.vars_mut().reset(name, true)?;
    let value = console.get_string(name).unwrap_or_default();
    console.info(format!("{} reset to \"{}\"", name, value));
    Ok(())
}

fn cvarlist(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let prefix = args.get_or(0, "");
    let lines: Vec<String> = console
        .vars()
        .vars()
        .filter(|(name, meta)| name.starts_with(prefix) && !meta.flags.contains(ConVarFlags::HIDDEN))
        .map(|(name, meta)| {
            let modified = if meta.is_modified() { "*" } else { "" };
            format!("{}{} = \"{}\"", name, modified, meta.get_string())
        })
        .collect();

    let count = lines.len();
    for line in lines {
        console.info(line);
    }
    console.info(format!("{} convars", count));
    Ok(())
}

fn cmdlist(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let prefix = args.get_or(0, "");
    let lines: Vec<String> = console
        .commands()
        .prefix_iter(prefix)
        .map(|(name, cmd)| match cmd.get_description() {
            "" => name.to_string(),
            desc => format!("{} - {}", name, desc),
        })
        .collect();

    let count = lines.len();
    for line in lines {
        console.info(line);
    }
    console.info(format!("{} commands", count));
    Ok(())
}

fn help(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let Some(name) = args.get(0) else {
        let names: Vec<String> = console.commands().iter().map(|(name, _)| format!("  {}", name)).collect();
        console.info("Commands:");
        for name in names {
            console.info(name);
        }
        console.info("Use 'help <name>' for details, 'cvarlist' for variables");
        return Ok(());
    };

    let mut lines = Vec::new();
    if let Some(cmd) = console.commands().get(name) {
        let desc = cmd.get_description();
        lines.push(format!("{} - {}", name, if desc.is_empty() { "No description" } else { desc }));
        if let Some(partner) = cmd.partner() {
            lines.push(format!("  Paired with: {}", partner));
        }
    } else if let Some(body) = console.aliases().get(name) {
        lines.push(format!("{} - alias for: {}", name, body));
    } else if let Some(meta) = console.vars().get_meta(name) {
        let desc = if meta.description.is_empty() { "No description" } else { meta.description };
        lines.push(format!("{} - {}", name, desc));
        lines.push(format!("  Type: {}", meta.type_name()));
        lines.push(format!("  Current: {}", meta.get_string()));
        lines.push(format!("  Default: {}", meta.default_string()));
    } else {
        return Err(CommandError::new(format!("Unknown command or variable: '{}'", name)));
    }

    for line in lines {
        console.info(line);
    }
    Ok(())
}

fn find(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let term = args.require(0, "<search term>")?;

    let mut lines: Vec<(String, String)> = console
        .commands()
        .search(term)
        .into_iter()
        .map(|(name, cmd)| (name.to_string(), describe("cmd", name, cmd.get_description())))
        .collect();
    lines.extend(
        console
            .vars()
            .search(term)
            .into_iter()
            .map(|(name, meta)| (name.to_string(), describe("var", name, meta.description))),
    );
    lines.sort();

    let count = lines.len();
    for (_, line) in lines {
        console.info(line);
    }
    console.info(format!("{} results", count));
    Ok(())
}

fn describe(kind: &str, name: &str, desc: &str) -> String {
    if desc.is_empty() {
        format!("[{}] {}", kind, name)
    } else {
        format!("[{}] {} - {}", kind, name, desc)
    }
}

fn differences(_args: &CommandArgs, console: &mut Console) -> CommandResult {
    let lines: Vec<String> = console
        .vars()
        .modified_vars()
        .map(|(name, meta)| {
            format!("{} = \"{}\" (default: \"{}\")", name, meta.get_string(), meta.default_string())
        })
        .collect();

    if lines.is_empty() {
        console.info("No modified convars");
        return Ok(());
    }
    let count = lines.len();
    for line in lines {
        console.info(line);
    }
    console.info(format!("{} modified convars", count));
    Ok(())
}

fn bind(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let key = args.require(0, "<key> [query]")?;
    if args.len() == 1 {
        let query = console
            .binds()
            .query_for(key)
            .map(str::to_string)
            .ok_or_else(|| CommandError::new(format!("'{}' is not bound", key)))?;
        console.result(format!("\"{}\" = \"{}\"", key, query));
        return Ok(());
    }

    let query = query_from(args, 1);
    if let Err(err) = console.parse(&query) {
        return Err(CommandError::new(format!("{}\n{}", err, err.render(&query))));
    }
    console.binds_mut().bind(key, query.as_str());
    console.persist_edit(key, &query);
    Ok(())
}

fn unbind(args: &CommandArgs, console: &mut Console) -> CommandResult {
    let key = args.require(0, "<key>")?;
    console
        .binds_mut()
        .unbind(key)
        .ok_or_else(|| CommandError::new(format!("'{}' is not bound", key)))?;
    console.persist_edit(key, "");
    Ok(())
}

fn unbind_all(_args: &CommandArgs, console: &mut Console) -> CommandResult {
    if !console.binds().is_empty() {
        console.binds_mut().unbind_all();
        console.persist_edit("unbind_all", "");
    }
    Ok(())
}

/// Rebuild a query from the arguments starting at `from`.
///
/// A single argument is taken as the whole query. With several, the first
/// is the command name and the rest are quoted wherever the parser would
/// otherwise split or reinterpret them.
fn query_from(args: &CommandArgs, from: usize) -> String {
    match &args.as_slice()[from..] {
        [query] => query.clone(),
        [name, rest @ ..] => {
            let mut query = name.clone();
            for arg in rest {
                query.push(' ');
                if needs_quoting(arg) {
                    query.push_str(&quote(arg));
                } else {
                    query.push_str(arg);
                }
            }
            query
        }
        [] => String::new(),
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || arg.chars().any(|c| {
            c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')' | '"' | '\\' | '{' | '}' | '#')
        })
}
