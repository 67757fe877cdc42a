//! The per-invocation resolution context.
//!
//! Maps aspect names to the value currently bound, the priority it was bound
//! at, and how many times it has been read. One context lives for exactly one
//! top-level `call`; nested calls reached during that evaluation share it.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};

use crate::aspect::Priority;
use crate::error::{Error, Result};
use crate::value::Value;

/// One bound name. Keeping value, priority and usage together means no name
/// can ever have a value without the other two.
#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    priority: Priority,
    usages: usize,
}

/// Mutable name → value/priority/usage bookkeeping.
#[derive(Debug, Default)]
pub struct Context {
    bindings: BTreeMap<String, Binding>,
    /// First value each aspect name resolved to during this evaluation.
    resolved: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value` at `priority`.
    ///
    /// Lower priority than the stored binding is ignored. Equal priority with
    /// a different value is a conflict. Replacing a binding nobody has read
    /// yet is only allowed for default registrations. Defaults start with a
    /// usage count of one, so they are never reported as unused.
    pub fn add(&mut self, name: &str, value: Value, priority: Priority, is_default: bool) -> Result<()> {
        // An absent name behaves as if bound at `Low`, which keeps `Ignore`
        // registrations out entirely.
        let stored = self
            .bindings
            .get(name)
            .map(|b| b.priority)
            .unwrap_or(Priority::Low);
        if priority < stored {
            trace!(name, %priority, %stored, "Lower-priority binding ignored");
            return Ok(());
        }

        if let Some(existing) = self.bindings.get(name) {
            if priority == existing.priority && !existing.value.same(&value) {
                return Err(Error::ConflictingBinding {
                    name: name.to_string(),
                    priority,
                });
            }
            if existing.usages == 0 {
                if !is_default {
                    return Err(Error::UnusedArgument(name.to_string()));
                }
                if priority > existing.priority {
                    warn!(
                        name,
                        replaced = %existing.value,
                        by = %value,
                        %priority,
                        "Unread binding replaced by a higher-priority default"
                    );
                }
            }
        }

        debug!(name, %value, %priority, is_default, "Binding registered");
        self.bindings.insert(
            name.to_string(),
            Binding {
                value,
                priority,
                usages: if is_default { 1 } else { 0 },
            },
        );
        Ok(())
    }

    /// Add every entry of `values` at one priority.
    pub fn extend<'a>(
        &mut self,
        values: impl IntoIterator<Item = (&'a str, &'a Value)>,
        priority: Priority,
        is_default: bool,
    ) -> Result<()> {
        for (name, value) in values {
            self.add(name, value.clone(), priority, is_default)?;
        }
        Ok(())
    }

    /// Read a binding, counting the read as a use.
    pub fn get(&mut self, name: &str) -> Option<Value> {
        let binding = self.bindings.get_mut(name)?;
        binding.usages += 1;
        Some(binding.value.clone())
    }

    /// Reject the invocation if any binding was never read.
    pub fn finalize(&self) -> Result<()> {
        match self.bindings.iter().find(|(_, b)| b.usages == 0) {
            Some((name, _)) => Err(Error::UnusedArgument(name.clone())),
            None => Ok(()),
        }
    }

    /// Remember what `name` resolved to; a later different value is fatal.
    pub(crate) fn record_resolution(&mut self, name: &str, value: &Value) -> Result<()> {
        match self.resolved.get(name) {
            Some(first) if !first.same(value) => Err(Error::InconsistentAspectValue {
                name: name.to_string(),
                first: first.to_string(),
                second: value.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.resolved.insert(name.to_string(), value.clone());
                Ok(())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Current value without counting a use.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(|b| &b.value)
    }

    pub fn priority_of(&self, name: &str) -> Option<Priority> {
        self.bindings.get(name).map(|b| b.priority)
    }

    pub fn usages_of(&self, name: &str) -> Option<usize> {
        self.bindings.get(name).map(|b| b.usages)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            bindings: self
                .bindings
                .iter()
                .map(|(name, b)| BindingSnapshot {
                    name: name.clone(),
                    value: b.value.clone(),
                    priority: b.priority,
                    usages: b.usages,
                })
                .collect(),
        }
    }
}

/// Read-only copy of a context, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub bindings: Vec<BindingSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingSnapshot {
    pub name: String,
    pub value: Value,
    pub priority: Priority,
    pub usages: usize,
}

impl ContextSnapshot {
    pub fn get(&self, name: &str) -> Option<&BindingSnapshot> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }
}
