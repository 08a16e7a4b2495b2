//! Key bindings: key name to query text.

use std::collections::{BTreeMap, BTreeSet};

/// Key to query bindings with a reverse index from query to keys.
#[derive(Debug, Default, Clone)]
pub struct BindTable {
    by_key: BTreeMap<Box<str>, String>,
    by_query: BTreeMap<String, BTreeSet<Box<str>>>,
}

impl BindTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `query`, replacing any previous binding.
    ///
    /// Key names are case-insensitive. Returns the previous query, if any.
    pub fn bind(&mut self, key: &str, query: impl Into<String>) -> Option<String> {
        let key = normalize(key);
        let query = query.into();
        let previous = self.unbind(&key);
        self.by_query
            .entry(query.clone())
            .or_default()
            .insert(key.clone());
        self.by_key.insert(key, query);
        previous
    }

    /// Remove the binding of `key`, returning its query.
    pub fn unbind(&mut self, key: &str) -> Option<String> {
        let key = normalize(key);
        let query = self.by_key.remove(&key)?;
        if let Some(keys) = self.by_query.get_mut(&query) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_query.remove(&query);
            }
        }
        Some(query)
    }

    pub fn unbind_all(&mut self) {
        self.by_key.clear();
        self.by_query.clear();
    }

    pub fn query_for(&self, key: &str) -> Option<&str> {
        self.by_key.get(&normalize(key)).map(String::as_str)
    }

    /// Keys bound to exactly this query text, in name order.
    pub fn keys_for(&self, query: &str) -> impl Iterator<Item = &str> {
        self.by_query
            .get(query)
            .into_iter()
            .flat_map(|keys| keys.iter().map(|k| k.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_key.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }
}

fn normalize(key: &str) -> Box<str> {
    key.to_ascii_lowercase().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let mut binds = BindTable::new();
        assert_eq!(binds.bind("W", "+forward"), None);
        binds.bind("up", "+forward");

        assert_eq!(binds.query_for("w"), Some("+forward"));
        assert_eq!(binds.keys_for("+forward").collect::<Vec<_>>(), vec!["up", "w"]);
    }

    #[test]
    fn test_rebind_updates_reverse_index() {
        let mut binds = BindTable::new();
        binds.bind("space", "+jump");
        assert_eq!(binds.bind("space", "+duck"), Some("+jump".to_string()));
        assert_eq!(binds.keys_for("+jump").count(), 0);
        assert_eq!(binds.keys_for("+duck").collect::<Vec<_>>(), vec!["space"]);
    }

    #[test]
    fn test_unbind_all_empties_both_directions() {
        let mut binds = BindTable::new();
        binds.bind("a", "echo a");
        binds.bind("b", "echo a");
        assert_eq!(binds.unbind("a"), Some("echo a".to_string()));
        assert_eq!(binds.keys_for("echo a").collect::<Vec<_>>(), vec!["b"]);

        binds.unbind_all();
        assert!(binds.is_empty());
        assert_eq!(binds.keys_for("echo a").count(), 0);
        assert_eq!(binds.unbind("b"), None);
    }
}
