//! PDF dictionary implementation

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io::{self, Write};

use super::object::write_name;
use super::{Object, ObjectId};

/// PDF dictionary object
///
/// Keys are kept sorted so that serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<String, Object>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get value by key
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.entries.get(key)
    }

    /// Get mutable value by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    /// Get integer value
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    /// Get string value
    pub fn get_string(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Object::as_string)
    }

    /// Get name value
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Object::as_name)
    }

    /// Get boolean value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Object::as_bool)
    }

    /// Get array value
    pub fn get_array(&self, key: &str) -> Option<&[Object]> {
        self.get(key).and_then(Object::as_array)
    }

    /// Get nested dictionary value
    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        match self.get(key) {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }
    }

    /// Get reference value
    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Object::as_reference)
    }

    /// Check `/Type` against a name
    pub fn is_type(&self, name: &str) -> bool {
        self.get_name("Type") == Some(name)
    }

    /// Set value
    pub fn set(&mut self, key: &str, value: impl Into<Object>) {
        self.entries.insert(key.to_string(), value.into());
    }

    /// Remove value
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Object> {
        self.entries.iter()
    }

    pub fn values(&self) -> btree_map::Values<'_, String, Object> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, String, Object> {
        self.entries.values_mut()
    }

    /// Write dictionary to output
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(b"<<")?;
        for (key, value) in &self.entries {
            write_name(out, key)?;
            out.write_all(b" ")?;
            value.write_to(out)?;
        }
        out.write_all(b">>")
    }
}

impl FromIterator<(String, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Object)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
