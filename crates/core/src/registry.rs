//! Named operations and bulk registration of deferred versions.
//!
//! An [`OperationRegistry`] is the binding location callers look operations
//! up in. A [`LazifyScope`] swaps selected entries for deferred wrappers and
//! restores the originals when it goes out of scope, however it is left.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::cache::ResultCache;
use crate::error::{BindingError, Result};
use crate::operation::{Deferred, Operation, defer};
use crate::pending::PendingCall;
use crate::term::{Args, Term};

/// A registry entry.
#[derive(Clone, Debug)]
pub enum Callable {
    /// Runs as soon as it is invoked.
    Eager(Operation),
    /// Invoking it builds a deferred call.
    Deferred(Deferred),
}

impl Callable {
    pub fn operation(&self) -> &Operation {
        match self {
            Callable::Eager(op) => op,
            Callable::Deferred(d) => d.operation(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Callable::Deferred(_))
    }

    /// Run an eager entry now; for a deferred entry return the node.
    pub fn invoke(&self, args: impl Into<Args>) -> Result<Term> {
        match self {
            Callable::Eager(op) => PendingCall::new(op.clone(), args).eval().map(Term::Value),
            Callable::Deferred(d) => Ok(Term::Pending(d.pending(args))),
        }
    }
}

/// A name → operation table.
#[derive(Default)]
pub struct OperationRegistry {
    entries: RwLock<HashMap<String, Callable>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Callable>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Callable>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an eager operation under its own name, replacing any entry.
    pub fn register(&self, operation: Operation) {
        debug!(name = operation.name(), "Operation registered");
        self.write()
            .insert(operation.name().to_string(), Callable::Eager(operation));
    }

    /// Register an already-deferred operation under its own name.
    pub fn register_deferred(&self, deferred: Deferred) {
        debug!(name = deferred.name(), "Deferred operation registered");
        self.write()
            .insert(deferred.name().to_string(), Callable::Deferred(deferred));
    }

    pub fn get(&self, name: &str) -> Option<Callable> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Invoke the entry registered as `name`.
    pub fn invoke(&self, name: &str, args: impl Into<Args>) -> Result<Term> {
        let callable = self
            .get(name)
            .ok_or_else(|| BindingError::UnknownOperation(name.to_string()))?;
        callable.invoke(args)
    }

    /// Open a scope in which entries can be swapped for deferred wrappers.
    pub fn lazify(&self) -> LazifyScope<'_> {
        LazifyScope {
            registry: self,
            originals: Vec::new(),
        }
    }

    fn swap(&self, name: &str, wrap: impl FnOnce(Operation) -> Deferred) -> Result<(Callable, Deferred)> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| BindingError::UnknownOperation(name.to_string()))?;
        let operation = match entry {
            Callable::Eager(op) => op.clone(),
            Callable::Deferred(_) => {
                return Err(BindingError::AlreadyLazified(name.to_string()).into());
            }
        };
        let deferred = wrap(operation);
        let original = std::mem::replace(entry, Callable::Deferred(deferred.clone()));
        Ok((original, deferred))
    }
}

/// Scope returned by [`OperationRegistry::lazify`].
pub struct LazifyScope<'r> {
    registry: &'r OperationRegistry,
    originals: Vec<(String, Callable)>,
}

impl LazifyScope<'_> {
    /// Replace `name` with a deferred wrapper for the rest of the scope.
    pub fn lazify(&mut self, name: &str) -> Result<Deferred> {
        self.substitute(name, defer)
    }

    /// Like [`lazify`](Self::lazify), memoizing in `cache`.
    pub fn lazify_cached(&mut self, name: &str, cache: &ResultCache) -> Result<Deferred> {
        self.substitute(name, |op| Deferred::cached_in(op, cache))
    }

    fn substitute(&mut self, name: &str, wrap: impl FnOnce(Operation) -> Deferred) -> Result<Deferred> {
        if self.originals.iter().any(|(n, _)| n == name) {
            return Err(BindingError::AlreadyLazified(name.to_string()).into());
        }
        let (original, deferred) = self.registry.swap(name, wrap)?;
        info!(name, "Operation lazified");
        self.originals.push((name.to_string(), original));
        Ok(deferred)
    }

    /// Names substituted so far, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.originals.iter().map(|(n, _)| n.as_str())
    }
}

impl Drop for LazifyScope<'_> {
    fn drop(&mut self) {
        let mut entries = self.registry.write();
        for (name, original) in self.originals.drain(..).rev() {
            info!(name = name.as_str(), "Operation restored");
            entries.insert(name, original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::Aspect;
    use crate::error::Error;
    use crate::pending::Overrides;
    use crate::signature::Signature;

    fn registry() -> OperationRegistry {
        let registry = OperationRegistry::new();
        registry.register(Operation::new(
            "scale",
            Signature::new().required("x").optional("factor", Aspect::new(2)),
            |args| Ok(args.value("x")?.mul(args.get("factor")?)?.into()),
        ));
        registry.register(Operation::new(
            "square",
            Signature::new().required("x"),
            |args| {
                let x = args.value("x")?;
                Ok(x.mul(&x)?.into())
            },
        ));
        registry
    }

    #[test]
    fn eager_entries_run_immediately() {
        let registry = registry();
        let term = registry.invoke("square", [3]).unwrap();
        assert_eq!(term.as_value().unwrap().as_i64(), Some(9));
        assert_eq!(registry.names(), vec!["scale", "square"]);
    }

    #[test]
    fn unknown_operation_is_reported() {
        let err = registry().invoke("cube", [3]).unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::UnknownOperation(_))));
    }

    #[test]
    fn lazify_substitutes_and_restores() {
        let registry = registry();
        {
            let mut scope = registry.lazify();
            scope.lazify("scale").unwrap();
            assert!(registry.get("scale").unwrap().is_deferred());
            assert!(!registry.get("square").unwrap().is_deferred());

            let node = match registry.invoke("scale", [5]).unwrap() {
                Term::Pending(node) => node,
                other => panic!("expected a deferred call, got {other:?}"),
            };
            let result = node.call(Overrides::new().set("factor", 10)).unwrap();
            assert_eq!(result.as_i64(), Some(50));
        }
        assert!(!registry.get("scale").unwrap().is_deferred());
    }

    #[test]
    fn lazifying_twice_fails() {
        let registry = registry();
        let mut scope = registry.lazify();
        scope.lazify("square").unwrap();
        let err = scope.lazify("square").unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::AlreadyLazified(_))));
        assert_eq!(scope.names().collect::<Vec<_>>(), vec!["square"]);
    }

    #[test]
    fn lazifying_an_unknown_name_fails() {
        let registry = registry();
        let mut scope = registry.lazify();
        assert!(scope.lazify("cube").is_err());
    }

    #[test]
    fn restores_on_error_exit() {
        let registry = registry();
        let run = || -> Result<()> {
            let mut scope = registry.lazify();
            scope.lazify("square")?;
            scope.lazify("cube")?;
            Ok(())
        };
        assert!(run().is_err());
        assert!(!registry.get("square").unwrap().is_deferred());
    }

    #[test]
    fn lazify_cached_memoizes() {
        let registry = registry();
        let cache = ResultCache::new();
        let mut scope = registry.lazify();
        let square = scope.lazify_cached("square", &cache).unwrap();
        let x = crate::value::Value::int(4);
        square.eager([x.clone()]).unwrap();
        square.eager([x]).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }
}
