//! Node attribute side-table

use crate::types::TypeRef;

/// Attribute keys. Attributes are never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    Preprocessed,
    Predefined,
    /// Cached static type of an expression.
    TypeOf,
    /// Cached type-value of a type expression.
    TypeValue,
    /// Iota of a const spec inside a const group.
    Iota,
    /// Names of a loop block that must live in heap cells.
    HeapCaptures,
    /// Marks a name defined by a for/range header.
    LoopVar,
    CoverageIndex,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Flag,
    Type(TypeRef),
    Int(i64),
}

/// A small ordered map; nodes rarely carry more than a handful of entries.
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    entries: Vec<(AttrKey, AttrValue)>,
}

impl Attrs {
    pub fn get(&self, key: AttrKey) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn has(&self, key: AttrKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn set(&mut self, key: AttrKey, value: AttrValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn del(&mut self, key: AttrKey) {
        self.entries.retain(|(k, _)| *k != key);
    }

    pub fn int(&self, key: AttrKey) -> Option<i64> {
        match self.get(key) {
            Some(AttrValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_set_get_del() {
        let mut a = Attrs::default();
        assert!(!a.has(AttrKey::Iota));
        a.set(AttrKey::Iota, AttrValue::Int(3));
        a.set(AttrKey::Iota, AttrValue::Int(4));
        assert_eq!(a.int(AttrKey::Iota), Some(4));
        assert_eq!(a.len(), 1);
        a.del(AttrKey::Iota);
        assert!(a.is_empty());
    }
}
