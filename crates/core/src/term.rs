//! Argument terms and argument lists.

use std::collections::BTreeMap;
use std::fmt;

use crate::aspect::Aspect;
use crate::error::{Error, Result};
use crate::pending::PendingCall;
use crate::value::Value;

/// Anything that can be passed to, or returned from, an operation.
#[derive(Clone)]
pub enum Term {
    Value(Value),
    Aspect(Aspect),
    Pending(PendingCall),
}

impl Term {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Term::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether resolving this term needs a context.
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Term::Value(_))
    }

    /// Boolean coercion. Deferred terms refuse: their truth is not known
    /// until evaluation, and branching on them would silently pick a path.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            Term::Value(v) => Ok(v.truthy()),
            Term::Aspect(a) => Err(Error::InvalidComposition(format!(
                "cannot coerce aspect {} to bool before resolution",
                a.name().unwrap_or("<unnamed>")
            ))),
            Term::Pending(p) => Err(Error::InvalidComposition(format!(
                "cannot coerce deferred call to {} to bool; evaluate it first",
                p.operation().name()
            ))),
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(v) => write!(f, "{v:?}"),
            Term::Aspect(a) => write!(f, "{a:?}"),
            Term::Pending(p) => write!(f, "{p:?}"),
        }
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Value(v)
    }
}

impl From<&Value> for Term {
    fn from(v: &Value) -> Self {
        Term::Value(v.clone())
    }
}

impl From<Aspect> for Term {
    fn from(a: Aspect) -> Self {
        Term::Aspect(a)
    }
}

impl From<PendingCall> for Term {
    fn from(p: PendingCall) -> Self {
        Term::Pending(p)
    }
}

impl From<&PendingCall> for Term {
    fn from(p: &PendingCall) -> Self {
        Term::Pending(p.clone())
    }
}

macro_rules! term_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Term {
            fn from(v: $t) -> Self {
                Term::Value(Value::from(v))
            }
        })*
    };
}

term_from_value!((), bool, i32, i64, f64, &str, String, Vec<Value>);

/// Positional and named arguments for one deferred call.
#[derive(Clone, Debug, Default)]
pub struct Args {
    positional: Vec<Term>,
    named: BTreeMap<String, Term>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, term: impl Into<Term>) -> Self {
        self.positional.push(term.into());
        self
    }

    /// Set a named argument, replacing any earlier one of the same name.
    pub fn kwarg(mut self, name: impl Into<String>, term: impl Into<Term>) -> Self {
        self.named.insert(name.into(), term.into());
        self
    }

    pub fn positional(&self) -> &[Term] {
        &self.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Term> {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Every term, positional first.
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.positional.iter().chain(self.named.values())
    }
}

impl<T: Into<Term>> FromIterator<T> for Args {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            positional: iter.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }
}

impl<T: Into<Term>, const N: usize> From<[T; N]> for Args {
    fn from(terms: [T; N]) -> Self {
        terms.into_iter().collect()
    }
}

impl From<Vec<Term>> for Args {
    fn from(terms: Vec<Term>) -> Self {
        terms.into_iter().collect()
    }
}
