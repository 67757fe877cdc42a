//! Explicit parameter descriptors and argument binding.
//!
//! Every operation carries a [`Signature`] built once when the operation is
//! created: an ordered list of parameter slots with optional declared
//! defaults. Binding merges declared defaults, positional and named
//! arguments the way an ordinary call does, except that slots whose declared
//! default is an [`Aspect`] keep the aspect and report the call-site value
//! separately.

use crate::aspect::{Aspect, Priority};
use crate::error::{BindingError, Result};
use crate::term::{Args, Term};

/// One parameter slot.
#[derive(Clone, Debug)]
pub struct Param {
    name: String,
    default: Option<Term>,
    variadic: bool,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Term> {
        self.default.as_ref()
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// The declared default, if it is an aspect.
    pub fn aspect(&self) -> Option<&Aspect> {
        match &self.default {
            Some(Term::Aspect(a)) => Some(a),
            _ => None,
        }
    }
}

/// Ordered parameter list of an operation.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter without a default.
    pub fn required(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, false)
    }

    /// A parameter with a declared default (a value, an aspect, or a
    /// deferred call).
    pub fn optional(self, name: impl Into<String>, default: impl Into<Term>) -> Self {
        self.push(name.into(), Some(default.into()), false)
    }

    /// Trailing parameter collecting surplus positional arguments as a list.
    pub fn variadic(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, true)
    }

    fn push(mut self, name: String, default: Option<Term>, variadic: bool) -> Self {
        self.params.push(Param {
            name,
            default,
            variadic,
        });
        self
    }

    /// Promote every plain value default to a `Normal` aspect. Aspect and
    /// deferred-call defaults are left alone.
    pub fn auto_aspects(mut self) -> Self {
        for param in &mut self.params {
            if let Some(Term::Value(v)) = &param.default {
                param.default = Some(Term::Aspect(Aspect::with_priority(
                    v.clone(),
                    Priority::Normal,
                )));
            }
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Merge `args` into one slot per parameter.
    pub(crate) fn bind(&self, operation: &str, args: &Args) -> Result<Vec<Slot>> {
        let mut supplied: Vec<Option<Term>> = vec![None; self.params.len()];
        let mut surplus: Vec<Term> = Vec::new();

        let fixed: Vec<usize> = (0..self.params.len())
            .filter(|&i| !self.params[i].variadic)
            .collect();
        let has_variadic = fixed.len() < self.params.len();
        for (k, term) in args.positional().iter().enumerate() {
            match fixed.get(k) {
                Some(&i) => supplied[i] = Some(term.clone()),
                None if has_variadic => surplus.push(term.clone()),
                None => {
                    return Err(BindingError::TooManyArguments {
                        operation: operation.to_string(),
                        expected: fixed.len(),
                        given: args.positional().len(),
                    }
                    .into());
                }
            }
        }

        for (name, term) in args.named() {
            let i = self
                .params
                .iter()
                .position(|p| &p.name == name && !p.variadic)
                .ok_or_else(|| BindingError::UnknownParameter {
                    operation: operation.to_string(),
                    parameter: name.clone(),
                })?;
            if supplied[i].is_some() {
                return Err(BindingError::DuplicateArgument {
                    operation: operation.to_string(),
                    parameter: name.clone(),
                }
                .into());
            }
            supplied[i] = Some(term.clone());
        }

        let mut slots = Vec::with_capacity(self.params.len());
        for (param, supplied) in self.params.iter().zip(supplied) {
            let name = param.name.clone();
            let slot = if param.variadic {
                Slot::Variadic {
                    param: name,
                    terms: std::mem::take(&mut surplus),
                }
            } else if let Some(aspect) = param.aspect() {
                Slot::Aspect {
                    param: name,
                    declared: aspect.clone(),
                    supplied,
                }
            } else {
                match supplied.or_else(|| param.default.clone()) {
                    Some(term) => Slot::Plain { param: name, term },
                    None => {
                        return Err(BindingError::MissingArgument {
                            operation: operation.to_string(),
                            parameter: name,
                        }
                        .into());
                    }
                }
            };
            slots.push(slot);
        }
        Ok(slots)
    }
}

/// A parameter after binding.
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    /// Declared default is an aspect; `supplied` is the call-site term.
    Aspect {
        param: String,
        declared: Aspect,
        supplied: Option<Term>,
    },
    /// Ordinary argument: call-site term or declared default.
    Plain { param: String, term: Term },
    /// Surplus positional arguments.
    Variadic { param: String, terms: Vec<Term> },
}

impl Slot {
    pub(crate) fn param(&self) -> &str {
        match self {
            Slot::Aspect { param, .. } | Slot::Plain { param, .. } | Slot::Variadic { param, .. } => {
                param
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::Value;

    fn increment_signature() -> Signature {
        Signature::new()
            .required("x")
            .optional("inc", Aspect::new(1))
    }

    #[test]
    fn positional_then_defaults() {
        let slots = increment_signature()
            .bind("increment", &Args::new().arg(1))
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert!(matches!(&slots[0], Slot::Plain { param, .. } if param == "x"));
        assert!(matches!(&slots[1], Slot::Aspect { supplied: None, .. }));
    }

    #[test]
    fn call_site_value_does_not_clobber_aspect() {
        let slots = increment_signature()
            .bind("increment", &Args::new().arg(1).arg(3))
            .unwrap();
        match &slots[1] {
            Slot::Aspect { supplied: Some(Term::Value(v)), .. } => assert_eq!(v.as_i64(), Some(3)),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn named_overrides_default() {
        let sig = Signature::new().required("x").optional("bias", 0);
        let slots = sig
            .bind("offset", &Args::new().arg(1).kwarg("bias", 5))
            .unwrap();
        match &slots[1] {
            Slot::Plain { term: Term::Value(v), .. } => assert_eq!(v.as_i64(), Some(5)),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn missing_required_argument() {
        let err = increment_signature()
            .bind("increment", &Args::new())
            .unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::MissingArgument { .. })));
    }

    #[test]
    fn too_many_positional_arguments() {
        let err = increment_signature()
            .bind("increment", &Args::from([1, 2, 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Binding(BindingError::TooManyArguments { expected: 2, given: 3, .. })
        ));
    }

    #[test]
    fn unknown_and_duplicate_named_arguments() {
        let sig = increment_signature();
        let err = sig
            .bind("increment", &Args::new().arg(1).kwarg("step", 2))
            .unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::UnknownParameter { .. })));

        let err = sig
            .bind("increment", &Args::new().arg(1).kwarg("x", 2))
            .unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::DuplicateArgument { .. })));
    }

    #[test]
    fn variadic_collects_surplus() {
        let sig = Signature::new().required("first").variadic("rest");
        let slots = sig.bind("sum", &Args::from([1, 2, 3])).unwrap();
        match &slots[1] {
            Slot::Variadic { terms, .. } => assert_eq!(terms.len(), 2),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn auto_aspects_promotes_plain_defaults() {
        let sig = Signature::new()
            .required("x")
            .optional("scale", 1)
            .optional("offset", Aspect::with_priority(0, Priority::Low))
            .auto_aspects();
        let scale = sig.params()[1].aspect().unwrap();
        assert_eq!(scale.priority(), Priority::Normal);
        assert!(scale.default_value().same(&Value::int(1)));
        assert_eq!(sig.params()[2].aspect().unwrap().priority(), Priority::Low);
        assert!(sig.params()[0].aspect().is_none());
    }
}
