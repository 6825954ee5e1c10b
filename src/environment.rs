use crate::value::{Scalar, Table, Value};
use std::collections::BTreeMap;

/// The single flat namespace shared by scalars and tables.
///
/// There are no nested scopes. Query predicates shadow names with
/// `bind_all` and undo it with `restore`; `runfile` clones the whole
/// environment and puts the clone back afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: BTreeMap<String, Value>,
}

/// Bindings displaced by `Environment::bind_all`, in binding order.
#[must_use]
#[derive(Debug)]
pub struct SavedBindings(Vec<(String, Option<Value>)>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        match self.values.get(name) {
            Some(Value::Table(table)) => Some(table),
            _ => None,
        }
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        match self.values.get_mut(name) {
            Some(Value::Table(table)) => Some(table),
            _ => None,
        }
    }

    /// Binds `name`, overwriting any previous value. Returns the previous value.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|name| name.as_str())
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.values.iter().filter_map(|(name, value)| match value {
            Value::Table(table) => Some((name.as_str(), table)),
            Value::Scalar(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Binds each name to its scalar, remembering what was there before.
    pub fn bind_all<'a>(
        &mut self,
        bindings: impl IntoIterator<Item = (&'a String, &'a Scalar)>,
    ) -> SavedBindings {
        let saved = bindings
            .into_iter()
            .map(|(name, scalar)| {
                let previous = self.define(name.clone(), scalar.clone());
                (name.clone(), previous)
            })
            .collect();
        SavedBindings(saved)
    }

    /// Undoes `bind_all`: previously bound names get their old value back,
    /// previously unbound names are removed.
    pub fn restore(&mut self, saved: SavedBindings) {
        for (name, previous) in saved.0.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.values.insert(name, value);
                }
                None => {
                    self.values.remove(&name);
                }
            }
        }
    }
}
