//! Variable store: built-in and user-declared ConVars.
//!
//! Built-ins are registered by the host at startup. User variables are
//! declared at runtime and must carry the [`USER_PREFIX`], which built-ins
//! may not use, so the two sets never collide.

use std::collections::{BTreeMap, HashMap};

use bevy::log::{debug, warn};

use super::convar::{ConVar, ConVarDyn, ConVarFlags, ConVarValue};
use super::error::StoreError;
use super::events::ConVarChangedEvent;
use super::parser::is_valid_name;

/// Prefix reserved for user-declared variables.
pub const USER_PREFIX: &str = "uv_";

/// Called with `(new_value, old_value, variable)` after a value changes.
pub type ChangeListener = Box<dyn Fn(&str, &str, &ConVarMeta) + Send + Sync>;

/// Called with `(name, new_value)` after an ARCHIVE variable changes through
/// a write-through assignment, and after an alias or bind is edited from a
/// query. An empty value means the entry was removed.
pub type PersistHook = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Metadata for a type-erased ConVar.
pub struct ConVarMeta {
    pub name: Box<str>,
    pub description: &'static str,
    pub flags: ConVarFlags,
    /// Declared at runtime rather than registered by the host.
    pub user: bool,
    value: Box<dyn ConVarDyn>,
}

impl ConVarMeta {
    pub fn from_convar<T: ConVarValue>(cvar: ConVar<T>, user: bool) -> Self {
        Self {
            name: cvar.name().into(),
            description: cvar.get_description(),
            flags: cvar.get_flags(),
            user,
            value: Box::new(cvar),
        }
    }

    pub fn get_string(&self) -> String {
        self.value.get_string()
    }

    pub fn default_string(&self) -> String {
        self.value.default_string()
    }

    pub fn is_modified(&self) -> bool {
        self.value.is_modified()
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    /// Try to downcast to a specific ConVar type.
    pub fn downcast_ref<T: ConVarValue>(&self) -> Option<&ConVar<T>> {
        self.value.as_any().downcast_ref()
    }
}

impl std::fmt::Debug for ConVarMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConVarMeta")
            .field("name", &self.name)
            .field("value", &self.get_string())
            .field("flags", &self.flags)
            .field("user", &self.user)
            .finish()
    }
}

/// Outcome of a successful [`VariableStore::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// The value was cast to what was already stored; nothing happened.
    Unchanged,
    Changed { old: String, new: String },
}

/// Typed, flag-gated variable store with change notification.
///
/// # Examples
///
/// ```
/// use bevy_console_script::core::{ConVar, ConVarFlags, VariableStore};
///
/// let mut store = VariableStore::new();
/// store.register_var(ConVar::new("sv_gravity", 800.0f32)).unwrap();
/// store.register_var(ConVar::new("sv_version", 7i32).flags(ConVarFlags::READ_ONLY)).unwrap();
///
/// store.set("sv_gravity", "400", true).unwrap();
/// assert_eq!(store.get::<f32>("sv_gravity"), Some(400.0));
/// assert!(store.set("sv_version", "8", true).is_err());
/// ```
#[derive(Default)]
pub struct VariableStore {
    builtins: BTreeMap<Box<str>, ConVarMeta>,
    user: BTreeMap<Box<str>, ConVarMeta>,
    listeners: HashMap<Box<str>, Vec<ChangeListener>>,
    persist_hook: Option<PersistHook>,
    changes: Vec<ConVarChangedEvent>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in variable.
    ///
    /// Returns `Ok(true)` if newly registered, `Ok(false)` if it replaced an
    /// existing built-in (a warning is logged).
    pub fn register_var<T: ConVarValue>(&mut self, cvar: ConVar<T>) -> Result<bool, StoreError> {
        let name = cvar.name();
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if name.starts_with(USER_PREFIX) {
            return Err(StoreError::ReservedPrefix {
                name: name.to_string(),
                prefix: USER_PREFIX,
            });
        }

        let meta = ConVarMeta::from_convar(cvar, false);
        let is_duplicate = self.builtins.contains_key(&meta.name);
        if is_duplicate {
            warn!("Console: Overwriting existing variable '{}'", meta.name);
        }
        self.builtins.insert(meta.name.clone(), meta);
        Ok(!is_duplicate)
    }

    /// Declare a user variable. The name must start with [`USER_PREFIX`].
    pub fn declare<T: ConVarValue>(&mut self, cvar: ConVar<T>) -> Result<(), StoreError> {
        let name = cvar.name();
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if !name.starts_with(USER_PREFIX) || name.len() == USER_PREFIX.len() {
            return Err(StoreError::UserPrefixRequired {
                name: name.to_string(),
                prefix: USER_PREFIX,
            });
        }
        if self.has(name) {
            return Err(StoreError::AlreadyDeclared(name.to_string()));
        }

        debug!("Console: declared user variable '{}'", name);
        let meta = ConVarMeta::from_convar(cvar, true);
        self.user.insert(meta.name.clone(), meta);
        Ok(())
    }

    /// Remove a user variable and its listeners.
    pub fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        if self.builtins.contains_key(name) {
            return Err(StoreError::BuiltinRemoval(name.to_string()));
        }
        if self.user.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.listeners.remove(name);
        Ok(())
    }

    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.builtins.contains_key(name) || self.user.contains_key(name)
    }

    pub fn get_meta(&self, name: &str) -> Option<&ConVarMeta> {
        self.builtins.get(name).or_else(|| self.user.get(name))
    }

    fn get_meta_mut(&mut self, name: &str) -> Option<&mut ConVarMeta> {
        match self.builtins.get_mut(name) {
            Some(meta) => Some(meta),
            None => self.user.get_mut(name),
        }
    }

    /// Get a variable's typed value.
    pub fn get<T: ConVarValue>(&self, name: &str) -> Option<T> {
        self.get_meta(name)?.downcast_ref::<T>().map(ConVar::get)
    }

    /// Get a variable's value as a string.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_meta(name).map(ConVarMeta::get_string)
    }

    /// Assign a raw string to a variable.
    ///
    /// Locked variables (READ_ONLY, CHEAT, REPLICATED) are refused without
    /// touching anything. Assigning the current value is a silent no-op. On a
    /// real change, listeners run, a change event is queued and, when
    /// `write_through` is set and the variable is ARCHIVE, the persist hook
    /// is called.
    pub fn set(&mut self, name: &str, raw: &str, write_through: bool) -> Result<SetOutcome, StoreError> {
        let meta = self
            .get_meta_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        check_unlocked(meta)?;

        let old = meta.get_string();
        let changed = meta.value.set_string(raw).map_err(|reason| StoreError::InvalidValue {
            name: name.to_string(),
            reason,
        })?;
        if !changed {
            return Ok(SetOutcome::Unchanged);
        }

        let new = meta.get_string();
        self.notify(name, &old, &new, write_through);
        Ok(SetOutcome::Changed { old, new })
    }

    /// Reset a variable to its default value.
    ///
    /// Locked variables are refused, like [`VariableStore::set`].
    pub fn reset(&mut self, name: &str, write_through: bool) -> Result<SetOutcome, StoreError> {
        let meta = self
            .get_meta_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        check_unlocked(meta)?;

        let old = meta.get_string();
        if !meta.value.reset() {
            return Ok(SetOutcome::Unchanged);
        }
        let new = meta.get_string();
        self.notify(name, &old, &new, write_through);
        Ok(SetOutcome::Changed { old, new })
    }

    fn notify(&mut self, name: &str, old: &str, new: &str, write_through: bool) {
        let Some(meta) = self.get_meta(name) else {
            return;
        };

        if let Some(listeners) = self.listeners.get(name) {
            for listener in listeners {
                listener(new, old, meta);
            }
        }

        if write_through && meta.flags.contains(ConVarFlags::ARCHIVE) {
            if let Some(hook) = &self.persist_hook {
                hook(name, new);
            }
        }

        self.changes.push(ConVarChangedEvent::new(name, old, new));
    }

    /// Subscribe to changes of an existing variable.
    pub fn on_change<F>(&mut self, name: &str, listener: F) -> Result<(), StoreError>
    where
        F: Fn(&str, &str, &ConVarMeta) + Send + Sync + 'static,
    {
        if !self.has(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.listeners
            .entry(name.into())
            .or_default()
            .push(Box::new(listener));
        Ok(())
    }

    /// Install the hook called after write-through changes of ARCHIVE variables.
    pub fn set_persist_hook<F>(&mut self, hook: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.persist_hook = Some(Box::new(hook));
    }

    /// Run the persist hook for an entry that isn't a variable.
    pub(crate) fn persist(&self, name: &str, value: &str) {
        if let Some(hook) = &self.persist_hook {
            hook(name, value);
        }
    }

    /// Drop all but the newest `keep` queued change events.
    pub fn keep_recent_changes(&mut self, keep: usize) {
        let len = self.changes.len();
        if len > keep {
            debug!("Console: dropping {} undrained change events", len - keep);
            self.changes.drain(..len - keep);
        }
    }

    /// Take the change events queued since the last call.
    pub fn drain_changes(&mut self) -> Vec<ConVarChangedEvent> {
        std::mem::take(&mut self.changes)
    }

    pub fn len(&self) -> usize {
        self.builtins.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty() && self.user.is_empty()
    }

    /// Iterate over all variables, built-ins first, each set in name order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &ConVarMeta)> {
        self.builtins
            .iter()
            .chain(self.user.iter())
            .map(|(k, v)| (k.as_ref(), v))
    }

    /// Iterate over user-declared variables.
    pub fn user_vars(&self) -> impl Iterator<Item = (&str, &ConVarMeta)> {
        self.user.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Iterate over all variables with non-default values.
    pub fn modified_vars(&self) -> impl Iterator<Item = (&str, &ConVarMeta)> {
        self.vars().filter(|(_, meta)| meta.is_modified())
    }

    /// Iterate over all variables with the ARCHIVE flag.
    pub fn archive_vars(&self) -> impl Iterator<Item = (&str, &ConVarMeta)> {
        self.vars().filter(|(_, meta)| meta.flags.contains(ConVarFlags::ARCHIVE))
    }

    /// Find visible variables whose name or description contains `query`.
    pub fn search(&self, query: &str) -> Vec<(&str, &ConVarMeta)> {
        let query_lower = query.to_lowercase();
        self.vars()
            .filter(|(_, meta)| !meta.flags.contains(ConVarFlags::HIDDEN))
            .filter(|(name, meta)| {
                name.to_lowercase().contains(&query_lower)
                    || meta.description.to_lowercase().contains(&query_lower)
            })
            .collect()
    }
}

fn check_unlocked(meta: &ConVarMeta) -> Result<(), StoreError> {
    let name = || meta.name.to_string();
    if meta.flags.contains(ConVarFlags::READ_ONLY) {
        Err(StoreError::ReadOnly(name()))
    } else if meta.flags.contains(ConVarFlags::CHEAT) {
        Err(StoreError::Cheat(name()))
    } else if meta.flags.contains(ConVarFlags::REPLICATED) {
        Err(StoreError::Replicated(name()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store.register_var(ConVar::new("sv_gravity", 800.0f32).description("World gravity")).unwrap();
        store.register_var(ConVar::new("cl_fov", 90i32).flags(ConVarFlags::ARCHIVE)).unwrap();
        store.register_var(ConVar::new("sv_version", 3i32).flags(ConVarFlags::READ_ONLY)).unwrap();
        store.register_var(ConVar::new("sv_noclip", false).flags(ConVarFlags::CHEAT)).unwrap();
        store.register_var(ConVar::new("sv_tickrate", 64i32).flags(ConVarFlags::REPLICATED)).unwrap();
        store
    }

    #[test]
    fn test_store_get_set() {
        let mut store = store();
        assert_eq!(store.get::<f32>("sv_gravity"), Some(800.0));
        assert_eq!(store.get::<i32>("sv_gravity"), None);
        assert_eq!(store.get_string("cl_fov"), Some("90".to_string()));

        let outcome = store.set("cl_fov", "100", false).unwrap();
        assert_eq!(
            outcome,
            SetOutcome::Changed { old: "90".into(), new: "100".into() }
        );
        assert_eq!(store.get::<i32>("cl_fov"), Some(100));
    }

    #[test]
    fn test_store_set_unknown_and_invalid() {
        let mut store = store();
        assert_eq!(
            store.set("nope", "1", false),
            Err(StoreError::NotFound("nope".into()))
        );
        assert!(matches!(
            store.set("cl_fov", "wide", false),
            Err(StoreError::InvalidValue { .. })
        ));
        assert_eq!(store.get::<i32>("cl_fov"), Some(90));
    }

    #[test]
    fn test_store_locked_flags() {
        let mut store = store();
        let fired = Arc::new(AtomicUsize::new(0));
        for name in ["sv_version", "sv_noclip", "sv_tickrate"] {
            let counter = Arc::clone(&fired);
            store.on_change(name, move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }).unwrap();
        }

        assert_eq!(store.set("sv_version", "4", true), Err(StoreError::ReadOnly("sv_version".into())));
        assert_eq!(store.set("sv_noclip", "1", true), Err(StoreError::Cheat("sv_noclip".into())));
        assert_eq!(store.set("sv_tickrate", "128", true), Err(StoreError::Replicated("sv_tickrate".into())));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(store.get::<i32>("sv_version"), Some(3));
        assert!(store.drain_changes().is_empty());
    }

    #[test]
    fn test_store_unchanged_value_is_silent() {
        let mut store = store();
        let fired = Arc::new(AtomicUsize::new(0));
        let persisted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        store.on_change("cl_fov", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
        let counter = Arc::clone(&persisted);
        store.set_persist_hook(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(store.set("cl_fov", "90", true), Ok(SetOutcome::Unchanged));
        assert_eq!(store.set("cl_fov", " 90", true), Ok(SetOutcome::Unchanged));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(persisted.load(Ordering::SeqCst), 0);
        assert!(store.drain_changes().is_empty());
    }

    #[test]
    fn test_store_listener_and_write_through() {
        let mut store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let persisted = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        store.on_change("cl_fov", move |new, old, meta| {
            log.lock().unwrap().push((meta.name.to_string(), old.to_string(), new.to_string()));
        }).unwrap();
        let log = Arc::clone(&persisted);
        store.set_persist_hook(move |name, value| {
            log.lock().unwrap().push(format!("{}={}", name, value));
        });

        store.set("cl_fov", "110", true).unwrap();
        // Not ARCHIVE: no write-through.
        store.set("sv_gravity", "100", true).unwrap();
        // Write-through disabled.
        store.set("cl_fov", "100", false).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("cl_fov".to_string(), "90".to_string(), "110".to_string()),
                ("cl_fov".to_string(), "110".to_string(), "100".to_string()),
            ]
        );
        assert_eq!(*persisted.lock().unwrap(), vec!["cl_fov=110".to_string()]);
        assert_eq!(store.drain_changes().len(), 3);
    }

    #[test]
    fn test_store_declare_once() {
        let mut store = store();
        store.declare(ConVar::new("uv_test", "first".to_string())).unwrap();
        assert_eq!(
            store.declare(ConVar::new("uv_test", "second".to_string())),
            Err(StoreError::AlreadyDeclared("uv_test".into()))
        );
        assert_eq!(store.get_string("uv_test"), Some("first".to_string()));
        assert!(store.get_meta("uv_test").unwrap().user);
    }

    #[test]
    fn test_store_declare_requires_prefix() {
        let mut store = store();
        assert!(matches!(
            store.declare(ConVar::new("score", 0i32)),
            Err(StoreError::UserPrefixRequired { .. })
        ));
        assert!(matches!(
            store.declare(ConVar::new("uv_", 0i32)),
            Err(StoreError::UserPrefixRequired { .. })
        ));
        assert!(matches!(
            store.declare(ConVar::new("uv_bad name", 0i32)),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.register_var(ConVar::new("uv_builtin", 0i32)),
            Err(StoreError::ReservedPrefix { .. })
        ));
    }

    #[test]
    fn test_store_remove() {
        let mut store = store();
        store.declare(ConVar::new("uv_tmp", 1i32)).unwrap();
        store.on_change("uv_tmp", |_, _, _| {}).unwrap();

        assert_eq!(store.remove("sv_gravity"), Err(StoreError::BuiltinRemoval("sv_gravity".into())));
        assert!(store.has("sv_gravity"));

        store.remove("uv_tmp").unwrap();
        assert!(!store.has("uv_tmp"));
        assert_eq!(store.remove("uv_tmp"), Err(StoreError::NotFound("uv_tmp".into())));
    }

    #[test]
    fn test_store_duplicate_builtin_overwrites() {
        let mut store = VariableStore::new();
        assert_eq!(store.register_var(ConVar::new("test_var", 42i32)), Ok(true));
        assert_eq!(store.register_var(ConVar::new("test_var", 100i32)), Ok(false));
        assert_eq!(store.get::<i32>("test_var"), Some(100));
    }

    #[test]
    fn test_store_reset_and_listings() {
        let mut store = store();
        store.set("sv_gravity", "10", false).unwrap();
        assert_eq!(store.modified_vars().count(), 1);
        assert_eq!(store.archive_vars().count(), 1);

        store.reset("sv_gravity", false).unwrap();
        assert_eq!(store.modified_vars().count(), 0);
        assert_eq!(store.reset("sv_gravity", false), Ok(SetOutcome::Unchanged));
        assert!(store.reset("sv_version", false).is_err());

        let found = store.search("gravity");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "sv_gravity");
    }
}
