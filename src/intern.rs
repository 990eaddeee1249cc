//! Dense integer ids for hashable values.
//!
//! Compiled grammars refer to nonterminals by their position in an
//! [`Interner`], so chart cells can hold small integers instead of symbols.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Bidirectional map between values and dense ids `0..len`.
#[derive(Clone, Debug)]
pub struct Interner<T> {
    to_id: FxHashMap<T, usize>,
    items: Vec<T>,
}

impl<T> Default for Interner<T> {
    fn default() -> Self {
        Interner {
            to_id: FxHashMap::default(),
            items: Vec::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Interner<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value, returning its id. Ids are assigned in first-seen order.
    pub fn intern(&mut self, value: &T) -> usize {
        if let Some(&id) = self.to_id.get(value) {
            return id;
        }
        let id = self.items.len();
        self.to_id.insert(value.clone(), id);
        self.items.push(value.clone());
        id
    }

    /// Look up an id without interning.
    pub fn get(&self, value: &T) -> Option<usize> {
        self.to_id.get(value).copied()
    }

    /// The value for an id.
    pub fn resolve(&self, id: usize) -> &T {
        &self.items[id]
    }

    pub fn contains(&self, value: &T) -> bool {
        self.to_id.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values in id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone + Eq + Hash> FromIterator<T> for Interner<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut interner = Interner::new();
        for value in iter {
            interner.intern(&value);
        }
        interner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = Interner::new();
        let a = table.intern(&Symbol::new("A"));
        let b = table.intern(&Symbol::new("B"));
        let a2 = table.intern(&Symbol::new("A"));

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(b), &Symbol::new("B"));
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let table: Interner<Symbol> = ["X", "Y", "X", "Z"].into_iter().map(Symbol::new).collect();

        assert_eq!(table.get(&Symbol::new("X")), Some(0));
        assert_eq!(table.get(&Symbol::new("Z")), Some(2));
        assert_eq!(table.get(&Symbol::new("W")), None);
        let names: Vec<String> = table.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["X", "Y", "Z"]);
    }
}
