//! Operations and the `defer` wrappers.
//!
//! An [`Operation`] is a named function with an explicit [`Signature`].
//! Wrapping it with [`defer`] or [`defer_cached`] gives a [`Deferred`]: calling
//! that builds a [`PendingCall`] instead of running the function.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::ResultCache;
use crate::error::{BindingError, Error, Result};
use crate::pending::{Overrides, PendingCall};
use crate::signature::Signature;
use crate::term::{Args, Term};
use crate::value::Value;

/// Body of an operation.
pub type OperationFn = dyn Fn(&Arguments) -> Result<Term> + Send + Sync;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

struct OperationInner {
    id: u64,
    name: String,
    signature: Signature,
    body: Arc<OperationFn>,
    cache: Option<ResultCache>,
}

/// A named function plus its parameter descriptor.
#[derive(Clone)]
pub struct Operation(Arc<OperationInner>);

impl Operation {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Term> + Send + Sync + 'static,
    {
        Self::assemble(name.into(), signature, Arc::new(body), None)
    }

    fn assemble(
        name: String,
        signature: Signature,
        body: Arc<OperationFn>,
        cache: Option<ResultCache>,
    ) -> Self {
        Self(Arc::new(OperationInner {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            name,
            signature,
            body,
            cache,
        }))
    }

    /// Unique for the life of the process; never reused.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    pub fn is_memoized(&self) -> bool {
        self.0.cache.is_some()
    }

    /// A copy of this operation whose invocations go through `cache`.
    pub fn memoized(&self, cache: &ResultCache) -> Operation {
        Self::assemble(
            self.0.name.clone(),
            self.0.signature.clone(),
            Arc::clone(&self.0.body),
            Some(cache.clone()),
        )
    }

    /// Run the body on fully resolved arguments.
    pub fn invoke(&self, arguments: &Arguments) -> Result<Term> {
        match &self.0.cache {
            Some(cache) => cache.lookup_or_compute(self, arguments, || (self.0.body)(arguments)),
            None => (self.0.body)(arguments),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.0.name)
            .field("params", &self.0.signature.len())
            .field("memoized", &self.is_memoized())
            .finish()
    }
}

/// One resolved argument.
#[derive(Clone, Debug)]
pub struct BoundArgument {
    pub name: String,
    pub value: Value,
    /// Elements of a variadic parameter, also available as `value` (a list).
    pub spread: Option<Vec<Value>>,
}

/// Fully resolved arguments handed to an operation body.
#[derive(Clone, Debug)]
pub struct Arguments {
    operation: String,
    bound: Vec<BoundArgument>,
}

impl Arguments {
    pub fn new(operation: impl Into<String>, bound: Vec<BoundArgument>) -> Self {
        Self {
            operation: operation.into(),
            bound,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundArgument> {
        self.bound.iter()
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.bound
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.value)
            .ok_or_else(|| {
                BindingError::UnknownParameter {
                    operation: self.operation.clone(),
                    parameter: name.to_string(),
                }
                .into()
            })
    }

    pub fn value(&self, name: &str) -> Result<Value> {
        self.get(name).cloned()
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        let v = self.get(name)?;
        v.as_i64()
            .ok_or_else(|| Error::type_mismatch(name, "int", v.kind()))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        let v = self.get(name)?;
        v.as_f64()
            .ok_or_else(|| Error::type_mismatch(name, "number", v.kind()))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        let v = self.get(name)?;
        v.as_bool()
            .ok_or_else(|| Error::type_mismatch(name, "bool", v.kind()))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        let v = self.get(name)?;
        v.as_str()
            .ok_or_else(|| Error::type_mismatch(name, "str", v.kind()))
    }

    pub fn list(&self, name: &str) -> Result<&[Value]> {
        let v = self.get(name)?;
        v.as_list()
            .ok_or_else(|| Error::type_mismatch(name, "list", v.kind()))
    }

    pub fn object<T: Any>(&self, name: &str) -> Result<&T> {
        let v = self.get(name)?;
        v.downcast_ref::<T>()
            .ok_or_else(|| Error::type_mismatch(name, std::any::type_name::<T>(), v.kind()))
    }
}

/// An operation whose invocation is deferred.
#[derive(Clone, Debug)]
pub struct Deferred {
    operation: Operation,
}

/// Wrap `operation` so calling it builds a [`PendingCall`].
pub fn defer(operation: Operation) -> Deferred {
    Deferred { operation }
}

/// Like [`defer`], memoizing invocations in the process-wide cache.
pub fn defer_cached(operation: Operation) -> Deferred {
    Deferred::cached_in(operation, ResultCache::global())
}

impl Deferred {
    /// Like [`defer`], memoizing invocations in `cache`.
    pub fn cached_in(operation: Operation, cache: &ResultCache) -> Self {
        Self {
            operation: operation.memoized(cache),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn name(&self) -> &str {
        self.operation.name()
    }

    /// Build a deferred call node.
    pub fn pending(&self, args: impl Into<Args>) -> PendingCall {
        PendingCall::new(self.operation.clone(), args)
    }

    /// Build the node and evaluate it right away.
    pub fn eager(&self, args: impl Into<Args>) -> Result<Value> {
        self.pending(args).call(Overrides::new())
    }
}
