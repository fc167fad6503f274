//! Various utility functions/macros used throughout the kernel
use std::collections::HashMap;

/// convenient way to return an error if a condition isn't true
macro_rules! require {
    ( $cond:expr, $err:expr ) => {
        if !($cond) {
            return Err($err);
        }
    };
}

pub(crate) use require;

/// A string-keyed map whose lookups ignore ASCII case. The original spelling of each key is kept
/// for iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInsensitiveMap<V> {
    entries: HashMap<String, (String, V)>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, replacing any entry whose key differs only in case.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(original key, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for CaseInsensitiveMap<V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("Region", "us".to_string());
        assert_eq!(map.get("region").map(String::as_str), Some("us"));
        assert_eq!(map.get("REGION").map(String::as_str), Some("us"));
        assert!(map.get("regions").is_none());
    }

    #[test]
    fn insert_replaces_differently_cased_key() {
        let mut map: CaseInsensitiveMap<i32> = [("a", 1)].into_iter().collect();
        assert_eq!(map.insert("A", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![("A", &2)]);
    }
}
