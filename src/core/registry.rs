//! Command and alias registries.
//!
//! Both are ordered maps so listings come out sorted and prefix scans are a
//! range query.

use std::collections::BTreeMap;
use std::ops::Bound;

use bevy::log::{debug, warn};

use super::concommand::ConCommand;
use super::error::RegistryError;
use super::parser::{is_valid_name, is_valid_paired_name};

/// Registered console commands.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::{CommandRegistry, ConCommand};
///
/// let mut commands = CommandRegistry::new();
/// commands.register_pair(
///     "attack",
///     ConCommand::new("+attack", |_, _| Ok(())),
///     ConCommand::new("-attack", |_, _| Ok(())),
/// ).unwrap();
///
/// assert_eq!(commands.partner("+attack"), Some("-attack"));
/// ```
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<Box<str>, ConCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command.
    ///
    /// Returns `Ok(true)` if newly registered, `Ok(false)` if it replaced an
    /// existing command (a warning is logged).
    pub fn register(&mut self, cmd: ConCommand) -> Result<bool, RegistryError> {
        if !is_valid_name(cmd.name()) {
            return Err(RegistryError::InvalidName(cmd.name().to_string()));
        }
        Ok(self.insert(cmd))
    }

    /// Register an invertible `+base` / `-base` pair, linking each half to
    /// the other.
    pub fn register_pair(
        &mut self,
        base: &str,
        mut press: ConCommand,
        mut release: ConCommand,
    ) -> Result<(), RegistryError> {
        if !is_valid_name(base) {
            return Err(RegistryError::InvalidName(base.to_string()));
        }
        let press_name = format!("+{}", base);
        let release_name = format!("-{}", base);
        for (cmd, expected) in [(&press, &press_name), (&release, &release_name)] {
            if cmd.name() != expected.as_str() || !is_valid_paired_name(cmd.name()) {
                return Err(RegistryError::InvalidName(cmd.name().to_string()));
            }
        }

        press.set_partner(Some(release_name.into()));
        release.set_partner(Some(press_name.into()));
        self.insert(press);
        self.insert(release);
        Ok(())
    }

    fn insert(&mut self, cmd: ConCommand) -> bool {
        let name: Box<str> = cmd.name().into();
        let is_duplicate = self.unlink(&name).is_some();
        if is_duplicate {
            warn!("Console: Overwriting existing command '{}'", name);
        }
        self.commands.insert(name, cmd);
        !is_duplicate
    }

    /// Remove a command, clearing its partner's back-reference.
    pub fn remove(&mut self, name: &str) -> Result<ConCommand, RegistryError> {
        self.unlink(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn unlink(&mut self, name: &str) -> Option<ConCommand> {
        let removed = self.commands.remove(name)?;
        if let Some(partner) = removed.partner() {
            if let Some(other) = self.commands.get_mut(partner) {
                debug!("Console: unlinking '{}' from '{}'", partner, name);
                other.set_partner(None);
            }
        }
        Some(removed)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&ConCommand> {
        self.commands.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// The other half of a `+`/`-` pair.
    pub fn partner(&self, name: &str) -> Option<&str> {
        self.commands.get(name)?.partner()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate over all commands in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConCommand)> {
        self.commands.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Iterate over all commands whose name starts with `prefix`.
    pub fn prefix_iter<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a ConCommand)> {
        self.commands
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_ref(), v))
    }

    /// Find commands whose name or description contains `query`.
    pub fn search(&self, query: &str) -> Vec<(&str, &ConCommand)> {
        let query_lower = query.to_lowercase();
        self.iter()
            .filter(|(name, cmd)| {
                name.to_lowercase().contains(&query_lower)
                    || cmd.get_description().to_lowercase().contains(&query_lower)
            })
            .collect()
    }
}

/// User-defined aliases: name to raw query text.
///
/// Bodies are stored unparsed and parsed (through the console's cache) each
/// time the alias runs, so redefining an alias takes effect immediately.
#[derive(Debug, Default, Clone)]
pub struct AliasRegistry {
    aliases: BTreeMap<Box<str>, String>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine an alias. Names may carry a leading `+` or `-`.
    ///
    /// Returns the previous body, if any.
    pub fn set(&mut self, name: &str, body: impl Into<String>) -> Result<Option<String>, RegistryError> {
        if !is_valid_paired_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        Ok(self.aliases.insert(name.into(), body.into()))
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<String, RegistryError> {
        self.aliases
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Remove `x`, `+x` and `-x`, given any one of them.
    ///
    /// Returns the names that were removed, or `NotFound` if none existed.
    pub fn remove_paired(&mut self, name: &str) -> Result<Vec<String>, RegistryError> {
        let base = name.trim_start_matches(['+', '-']);
        let removed: Vec<String> = [base.to_string(), format!("+{}", base), format!("-{}", base)]
            .into_iter()
            .filter(|form| self.aliases.remove(form.as_str()).is_some())
            .collect();
        if removed.is_empty() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.aliases.clear();
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Iterate over all aliases in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> ConCommand {
        ConCommand::new(name, |_, _| Ok(()))
    }

    #[test]
    fn test_registry_cmd() {
        let mut registry = CommandRegistry::new();
        assert_eq!(registry.register(noop("test").description("Test command")), Ok(true));
        assert!(registry.contains("test"));
        assert_eq!(registry.get("test").unwrap().get_description(), "Test command");
    }

    #[test]
    fn test_registry_rejects_bad_names() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register(noop("bad name")).is_err());
        assert!(registry.register(noop("+attack")).is_err());
        assert!(registry.register(noop("")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_detection() {
        let mut registry = CommandRegistry::new();
        assert_eq!(registry.register(noop("test_cmd")), Ok(true));
        assert_eq!(registry.register(noop("test_cmd")), Ok(false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_pair_links_both_halves() {
        let mut registry = CommandRegistry::new();
        registry.register_pair("jump", noop("+jump"), noop("-jump")).unwrap();
        assert_eq!(registry.partner("+jump"), Some("-jump"));
        assert_eq!(registry.partner("-jump"), Some("+jump"));

        assert!(registry.register_pair("duck", noop("+duck"), noop("-jump")).is_err());
        assert!(!registry.contains("+duck"));
    }

    #[test]
    fn test_overwrite_clears_partner() {
        let mut registry = CommandRegistry::new();
        registry.register_pair("jump", noop("+jump"), noop("-jump")).unwrap();

        registry.remove("-jump").unwrap();
        assert_eq!(registry.partner("+jump"), None);

        registry.register_pair("duck", noop("+duck"), noop("-duck")).unwrap();
        registry.insert(noop("+duck"));
        assert_eq!(registry.partner("-duck"), None);
        assert_eq!(registry.partner("+duck"), None);
    }

    #[test]
    fn test_clear_leaves_no_back_references() {
        let mut registry = CommandRegistry::new();
        registry.register_pair("attack", noop("+attack"), noop("-attack")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.partner("+attack"), None);
        assert_eq!(registry.partner("-attack"), None);
    }

    #[test]
    fn test_registry_prefix_iter() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("sv_restart")).unwrap();
        registry.register(noop("sv_kick")).unwrap();
        registry.register(noop("cl_disconnect")).unwrap();

        let names: Vec<_> = registry.prefix_iter("sv_").map(|(name, _)| name).collect();
        assert_eq!(names, vec!["sv_kick", "sv_restart"]);
        assert_eq!(registry.prefix_iter("cl_").count(), 1);
        assert_eq!(registry.prefix_iter("zz").count(), 0);
    }

    #[test]
    fn test_registry_search() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("kick").description("Kick a player")).unwrap();
        registry.register(noop("quit").description("Exit the game")).unwrap();

        assert_eq!(registry.search("KICK").len(), 1);
        assert_eq!(registry.search("player").len(), 1);
        assert!(registry.search("nothing").is_empty());
    }

    #[test]
    fn test_alias_set_get_remove() {
        let mut aliases = AliasRegistry::new();
        assert_eq!(aliases.set("greet", "echo hi"), Ok(None));
        assert_eq!(aliases.set("greet", "echo hello"), Ok(Some("echo hi".to_string())));
        assert_eq!(aliases.get("greet"), Some("echo hello"));
        assert!(aliases.set("bad name", "echo").is_err());

        assert_eq!(aliases.remove("greet"), Ok("echo hello".to_string()));
        assert_eq!(aliases.remove("greet"), Err(RegistryError::NotFound("greet".into())));
    }

    #[test]
    fn test_alias_remove_paired() {
        let mut aliases = AliasRegistry::new();
        aliases.set("+strafe", "echo in").unwrap();
        aliases.set("-strafe", "echo out").unwrap();
        aliases.set("other", "echo").unwrap();

        let removed = aliases.remove_paired("-strafe").unwrap();
        assert_eq!(removed, vec!["+strafe".to_string(), "-strafe".to_string()]);
        assert_eq!(aliases.len(), 1);
        assert!(aliases.remove_paired("strafe").is_err());
    }
}
