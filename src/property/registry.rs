// SPDX-License-Identifier: GPL-3.0-only

//! Ordered property registry with change diffing.
//!
//! The registry holds the status properties the engine announced, keyed by
//! `Property::key`. Every mutator returns the list of changes it produced,
//! in the order listeners must see them.
//!
//! # Notification contract
//!
//! | Operation             | `Replaced`                  | `Changed(key)`             |
//! |-----------------------|-----------------------------|----------------------------|
//! | `register`            | only if the sequence differs | once per new entry, always |
//! | `update` (same value) | -                           | -                          |
//! | `update` (in place)   | -                           | once                       |
//! | `update` (new key)    | once                        | once                       |
//! | `remove` (present)    | once                        | once, with the removed key |
//!
//! `register` re-announces every entry even when nothing changed, so
//! consumers that cache per-key UI always get a full refresh signal.

use super::{Property, decode_many, decode_one};

/// A change produced by a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// The set or order of properties changed.
    Replaced,
    /// The property with this key was added, changed, removed or re-announced.
    Changed(String),
}

/// Ordered collection of properties with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRegistry {
    entries: Vec<Property>,
}

impl PropertyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole registry with the decoded `entries`.
    ///
    /// Invalid entries are dropped; of several entries sharing a key only
    /// the first is kept.
    pub fn register<S: AsRef<str>>(&mut self, entries: &[S]) -> Vec<RegistryChange> {
        let mut parsed: Vec<Property> = Vec::with_capacity(entries.len());
        for prop in decode_many(entries) {
            if parsed.iter().any(|existing| existing.key == prop.key) {
                tracing::debug!("Ignoring duplicate property key {:?}", prop.key);
                continue;
            }
            parsed.push(prop);
        }

        let mut changes = Vec::with_capacity(parsed.len() + 1);
        if parsed != self.entries {
            changes.push(RegistryChange::Replaced);
        }
        self.entries = parsed;
        changes.extend(
            self.entries
                .iter()
                .map(|prop| RegistryChange::Changed(prop.key.clone())),
        );
        changes
    }

    /// Inserts or replaces a single property from its wire form.
    pub fn update(&mut self, raw: &str) -> Vec<RegistryChange> {
        let Some(prop) = decode_one(raw) else {
            tracing::debug!("Ignoring malformed property update: {:?}", raw);
            return Vec::new();
        };

        let key = prop.key.clone();
        match self.position(&key) {
            Some(index) if self.entries[index] == prop => Vec::new(),
            Some(index) => {
                self.entries[index] = prop;
                vec![RegistryChange::Changed(key)]
            }
            None => {
                self.entries.push(prop);
                vec![RegistryChange::Replaced, RegistryChange::Changed(key)]
            }
        }
    }

    /// Removes the property with `key`, if any.
    pub fn remove(&mut self, key: &str) -> Vec<RegistryChange> {
        let Some(index) = self.position(key) else {
            return Vec::new();
        };
        self.entries.remove(index);
        vec![
            RegistryChange::Replaced,
            RegistryChange::Changed(key.to_string()),
        ]
    }

    /// Finds the property with `key`.
    ///
    /// The registry holds tens of entries at most, so a linear scan is used.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&Property> {
        self.entries.iter().find(|prop| prop.key == key)
    }

    /// Iterates the properties in registry order.
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.entries.iter()
    }

    /// Number of registered properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no property is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|prop| prop.key == key)
    }
}

impl<'a> IntoIterator for &'a PropertyRegistry {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
