//! Persistence layer for console configuration.
//!
//! Provides RON-based save/load for ARCHIVE convars, aliases and key binds.
//! The console itself never touches the disk: the plugin installs a persist
//! hook that marks the config dirty, and a system writes it back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{CommandError, ConCommand, Console};

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "console.ron";

/// Serializable console configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConsoleConfigFile {
    /// ConVar values (name -> string value).
    #[serde(default)]
    pub convars: BTreeMap<String, String>,
    /// Aliases (name -> query).
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Key binds (key -> query).
    #[serde(default)]
    pub binds: BTreeMap<String, String>,
}

impl ConsoleConfigFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;

        ron::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// Save config to a RON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::Io(parent.display().to_string(), e.to_string()))?;
            }
        }

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let contents = ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))
    }

    /// Snapshot the persistent parts of a console.
    pub fn from_console(console: &Console) -> Self {
        Self {
            convars: console
                .vars()
                .archive_vars()
                .map(|(name, meta)| (name.to_string(), meta.get_string()))
                .collect(),
            aliases: console
                .aliases()
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
            binds: console
                .binds()
                .iter()
                .map(|(key, query)| (key.to_string(), query.to_string()))
                .collect(),
        }
    }

    /// Apply this config to a console.
    ///
    /// Values are assigned without write-through, so loading a config
    /// doesn't mark it dirty. Entries that fail to apply are skipped with a
    /// warning. Returns the number of entries applied.
    pub fn apply(&self, console: &mut Console) -> usize {
        let mut applied = 0;
        for (name, value) in &self.convars {
            match console.vars_mut().set(name, value, false) {
                Ok(_) => {
                    debug!("Loaded convar: {} = \"{}\"", name, value);
                    applied += 1;
                }
                Err(e) => warn!("Failed to load convar '{}': {}", name, e),
            }
        }
        for (name, body) in &self.aliases {
            match console.aliases_mut().set(name, body.as_str()) {
                Ok(_) => applied += 1,
                Err(e) => warn!("Failed to load alias '{}': {}", name, e),
            }
        }
        for (key, query) in &self.binds {
            console.binds_mut().bind(key, query.as_str());
            applied += 1;
        }
        applied
    }
}

/// Errors that can occur during config operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// IO error (path, message).
    #[error("IO error for '{0}': {1}")]
    Io(String, String),
    /// Parse error (path, message).
    #[error("Parse error for '{0}': {1}")]
    Parse(String, String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Resource tracking the config file path.
#[derive(Resource, Debug, Clone)]
pub struct ConfigPath(pub PathBuf);

impl Default for ConfigPath {
    fn default() -> Self {
        Self(PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

/// Set by the persist hook when an ARCHIVE variable, an alias or a bind
/// changes.
#[derive(Resource, Debug, Clone, Default)]
pub struct ConfigDirty(Arc<AtomicBool>);

impl ConfigDirty {
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Save the persistent parts of `console` to `path`.
pub fn save_config(console: &Console, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    ConsoleConfigFile::from_console(console).save(path)
}

/// Load `path` into `console`, if it exists. Returns the number of entries
/// applied.
pub fn load_config(console: &mut Console, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(0);
    }
    Ok(ConsoleConfigFile::load(path)?.apply(console))
}

/// Register `host_writeconfig` and `exec`.
pub fn register_persist_commands(console: &mut Console, default_path: PathBuf) {
    let writeconfig = ConCommand::new("host_writeconfig", move |args, console| {
        let path = args.get(0).map(PathBuf::from).unwrap_or_else(|| default_path.clone());
        save_config(console, &path).map_err(|e| CommandError::new(e.to_string()))?;
        console.info(format!("Saved config to '{}'", path.display()));
        Ok(())
    })
    .description("Save ARCHIVE convars, aliases and binds to the config file");

    let exec = ConCommand::new("exec", |args, console| {
        let filename = args.require(0, "<filename>")?;
        let contents = fs::read_to_string(filename)
            .map_err(|e| CommandError::new(format!("Failed to read '{}': {}", filename, e)))?;

        let mut failed = 0;
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !console.execute_line(line) {
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(CommandError::new(format!("{} line(s) of '{}' failed", failed, filename)));
        }
        Ok(())
    })
    .description("Run a file of queries, one per line");

    for cmd in [writeconfig, exec] {
        if let Err(err) = console.register_cmd(cmd) {
            error!("Console: failed to register '{}'", err);
        }
    }
}

/// Mark `dirty` whenever an ARCHIVE convar, an alias or a bind changes.
pub fn track_changes(console: &mut Console, dirty: &ConfigDirty) {
    let flag = dirty.clone();
    console.vars_mut().set_persist_hook(move |name, value| {
        debug!("Persisted entry changed: {} = \"{}\"", name, value);
        flag.mark();
    });
}

/// Startup system: register the persistence commands, install the persist
/// hook and load the config file.
pub fn setup_persistence(
    mut console: ResMut<Console>,
    config_path: Res<ConfigPath>,
    dirty: Res<ConfigDirty>,
) {
    let path = &config_path.0;
    register_persist_commands(&mut console, path.clone());

    track_changes(&mut console, &dirty);

    if !path.exists() {
        info!("No config file found at '{}', using defaults", path.display());
        return;
    }

    match load_config(&mut console, path) {
        Ok(count) => info!("Loaded {} entries from '{}'", count, path.display()),
        Err(e) => error!("Failed to load config: {}", e),
    }
}

/// Write the config back once something archived has changed.
pub fn save_dirty_config(console: Res<Console>, config_path: Res<ConfigPath>, dirty: Res<ConfigDirty>) {
    if !dirty.take() {
        return;
    }
    match save_config(&console, &config_path.0) {
        Ok(()) => debug!("Saved config to '{}'", config_path.0.display()),
        Err(e) => error!("Failed to save config: {}", e),
    }
}
