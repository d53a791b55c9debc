use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// Append-only string table shared by every compile in the process. Symbols
/// never move once inserted, so concurrent compiles can share it freely.
///
/// Strings are never freed. Each distinct spelling is stored once, so the
/// table is bounded by the identifiers and literals the process has ever
/// parsed, not by the number of compiles. Lookups that only ask whether a
/// name is in use go through [`InternedSymbol::existing`] and do not grow it.
#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Vec<&'static str>>,
    indices: RwLock<HashMap<&'static str, u32>>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let strings = self.strings.read().unwrap();

        strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut indices = self.indices.write().unwrap();

        // Another thread may have inserted it between the two locks
        if let Some(index) = indices.get(string) {
            return *index;
        }

        let mut strings = self.strings.write().unwrap();
        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = strings.len() as u32;

        strings.push(leaked);
        indices.insert(leaked, index);
        index
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        let indices = self.indices.read().unwrap();

        indices.get(string).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An interned identifier
///
/// Equality and hashing are by table index. Ordering is by index too, which
/// is insertion order and therefore NOT stable across compiles; anything that
/// must be reproducible sorts by [`InternedSymbol::value`] instead.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        let index = INTERNING_TABLE.insert_if_absent(value);

        Self(index)
    }

    /// The symbol of `value` if anything interned it already
    pub fn existing(value: &str) -> Option<Self> {
        INTERNING_TABLE.index_of(value).map(Self)
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE.get(self.0).expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_spellings_share_one_entry() {
        let table = InterningTable::default();

        let first = table.insert_if_absent("amount");
        for _ in 0..100 {
            assert_eq!(table.insert_if_absent("amount"), first);
        }
        table.insert_if_absent("weights");

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(first), Some("amount"));
        assert_eq!(table.index_of("missing"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn looking_up_a_name_does_not_intern_it() {
        let spelling = "never_parsed_component_name_w";

        assert_eq!(InternedSymbol::existing(spelling), None);
        assert_eq!(INTERNING_TABLE.index_of(spelling), None);

        let symbol = InternedSymbol::new(spelling);
        assert_eq!(InternedSymbol::existing(spelling), Some(symbol));
    }
}
