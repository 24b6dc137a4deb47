use std::collections::HashMap;

/// String-keyed table with unique keys.
///
/// Lookups are hashed, iteration follows insertion order so that
/// listings built from a table are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Table {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry.
    ///
    /// If the key is already present the table is left untouched
    /// and the rejected value is handed back.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: V) -> Result<(), V> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(value);
        }

        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    /// Inserts or overwrites, an existing key keeps its position.
    pub fn replace<K: Into<String>>(&mut self, key: K, value: V) -> Option<V> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        Some(&mut self.entries[slot].1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_keeps_first() {
        let mut table = Table::new();
        assert_eq!(table.insert("LOOP", 100), Ok(()));
        assert_eq!(table.insert("LOOP", 200), Err(200));
        assert_eq!(table.get("LOOP"), Some(&100));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn absent_key_is_not_found() {
        let table: Table<u16> = Table::new();
        assert_eq!(table.get("MISSING"), None);
        assert!(!table.contains("MISSING"));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn iteration_follows_insertion() {
        let mut table = Table::new();
        for (i, name) in ["Z", "A", "M"].into_iter().enumerate() {
            table.insert(name, i).unwrap();
        }
        let keys: Vec<&str> = table.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut table = Table::new();
        table.insert("a", 1).unwrap();
        table.insert("b", 2).unwrap();
        assert_eq!(table.replace("a", 10), Some(1));
        assert_eq!(table.replace("c", 3), None);
        if let Some(b) = table.get_mut("b") {
            *b += 1;
        }

        let values: Vec<i32> = table.values().copied().collect();
        assert_eq!(values, vec![10, 3, 3]);
    }
}
