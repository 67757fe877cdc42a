//! Aspects: named deferred parameter placeholders.
//!
//! An aspect sits in a signature as a parameter default. It stays anonymous
//! until the engine binds it to the parameter slot it was declared in; from
//! then on every deferred call declaring an aspect of the same name reads
//! one shared value out of the [`Context`](crate::context::Context).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::context::Context;
use crate::error::{BindingError, Result};
use crate::value::Value;

/// Precedence of a binding, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Never registered automatically; lets any other declaration win.
    Ignore = -1,
    Low = 0,
    Normal = 1,
    Increased = 2,
    /// Caller-supplied overrides.
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Ignore => "ignore",
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::Increased => "increased",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Priority::Ignore),
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "increased" => Ok(Priority::Increased),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

struct AspectInner {
    name: OnceLock<String>,
    default: Value,
    priority: Priority,
}

/// A deferred parameter placeholder.
///
/// Clones share one instance, so binding a clone binds them all.
#[derive(Clone)]
pub struct Aspect(Arc<AspectInner>);

impl Aspect {
    /// Aspect with a default value; priority is `Normal`, or `Ignore` for a
    /// null default.
    pub fn new(default: impl Into<Value>) -> Self {
        let default = default.into();
        let priority = if default.is_null() {
            Priority::Ignore
        } else {
            Priority::Normal
        };
        Self::with_priority(default, priority)
    }

    pub fn with_priority(default: impl Into<Value>, priority: Priority) -> Self {
        Self(Arc::new(AspectInner {
            name: OnceLock::new(),
            default: default.into(),
            priority,
        }))
    }

    /// Aspect without a default; its value must come from elsewhere.
    pub fn unset() -> Self {
        Self::new(Value::null())
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.get().map(String::as_str)
    }

    pub fn default_value(&self) -> &Value {
        &self.0.default
    }

    pub fn priority(&self) -> Priority {
        self.0.priority
    }

    /// Whether both handles are the same aspect instance.
    pub fn ptr_eq(&self, other: &Aspect) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Assign the aspect's name. Binding again under the same name is a
    /// no-op; binding under a different name fails.
    pub fn bind(&self, name: &str) -> Result<&Self> {
        let bound = self.0.name.get_or_init(|| name.to_string());
        if bound != name {
            return Err(BindingError::AspectRebound {
                bound: bound.clone(),
                requested: name.to_string(),
            }
            .into());
        }
        Ok(self)
    }

    /// Name the aspect after `slot` unless it already carries a name, and
    /// return the effective name.
    pub(crate) fn name_or_bind(&self, slot: &str) -> &str {
        self.0.name.get_or_init(|| slot.to_string())
    }

    /// Register this aspect's default into the context, unless ignored.
    pub(crate) fn register_default(&self, context: &mut Context) -> Result<()> {
        let name = self.require_name()?;
        if self.priority() == Priority::Ignore {
            return Ok(());
        }
        context.add(name, self.default_value().clone(), self.priority(), true)
    }

    /// Read the aspect's value out of the context, falling back to its
    /// default. Fails if the name already resolved to another value during
    /// this evaluation.
    pub fn resolve(&self, context: &mut Context) -> Result<Value> {
        let name = self.require_name()?;
        let value = context
            .get(name)
            .unwrap_or_else(|| self.default_value().clone());
        context.record_resolution(name, &value)?;
        Ok(value)
    }

    fn require_name(&self) -> Result<&str> {
        self.name()
            .ok_or_else(|| BindingError::UnnamedAspect(format!("{self:?}")).into())
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("name", &self.name())
            .field("default", &self.0.default)
            .field("priority", &self.0.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn priority_order() {
        assert!(Priority::Ignore < Priority::Low);
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::Increased);
        assert!(Priority::Increased < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn default_priority_depends_on_default() {
        assert_eq!(Aspect::new(1).priority(), Priority::Normal);
        assert_eq!(Aspect::unset().priority(), Priority::Ignore);
        assert_eq!(
            Aspect::with_priority(7, Priority::Increased).priority(),
            Priority::Increased
        );
    }

    #[test]
    fn bind_is_idempotent_for_same_name() {
        let aspect = Aspect::new(1);
        assert!(aspect.name().is_none());
        aspect.bind("inc").unwrap();
        aspect.bind("inc").unwrap();
        assert_eq!(aspect.name(), Some("inc"));
    }

    #[test]
    fn rebinding_to_another_name_fails() {
        let aspect = Aspect::new(1);
        aspect.bind("inc").unwrap();
        let err = aspect.bind("step").unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::AspectRebound { .. })));
        assert_eq!(aspect.name(), Some("inc"));
    }

    #[test]
    fn clones_share_binding() {
        let aspect = Aspect::new(1);
        let clone = aspect.clone();
        aspect.bind("inc").unwrap();
        assert_eq!(clone.name(), Some("inc"));
        assert!(clone.ptr_eq(&aspect));
    }

    #[test]
    fn resolve_prefers_context_then_default() {
        let aspect = Aspect::new(1);
        aspect.bind("inc").unwrap();

        let mut context = Context::new();
        assert_eq!(aspect.resolve(&mut context).unwrap().as_i64(), Some(1));

        let mut context = Context::new();
        context.add("inc", Value::int(2), Priority::High, false).unwrap();
        assert_eq!(aspect.resolve(&mut context).unwrap().as_i64(), Some(2));
        assert_eq!(context.usages_of("inc"), Some(1));
    }

    #[test]
    fn unnamed_aspect_cannot_resolve() {
        let mut context = Context::new();
        let err = Aspect::new(1).resolve(&mut context).unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::UnnamedAspect(_))));
    }

    #[test]
    fn inconsistent_resolution_is_rejected() {
        let aspect = Aspect::new(1);
        aspect.bind("inc").unwrap();
        let mut context = Context::new();
        aspect.resolve(&mut context).unwrap();

        context.add("inc", Value::int(9), Priority::Critical, true).unwrap();
        let err = aspect.resolve(&mut context).unwrap_err();
        assert!(matches!(err, Error::InconsistentAspectValue { .. }));
    }

    #[test]
    fn ignored_default_is_not_registered() {
        let aspect = Aspect::with_priority(5, Priority::Ignore);
        aspect.bind("permutation").unwrap();
        let mut context = Context::new();
        aspect.register_default(&mut context).unwrap();
        assert!(!context.contains("permutation"));
    }
}
