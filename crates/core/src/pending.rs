//! Deferred-call nodes and the two-phase evaluation protocol.
//!
//! `call` runs in four steps against one fresh [`Context`]:
//!
//! 1. register the caller's overrides at `High` priority;
//! 2. **gather**: walk the node tree registering every declared aspect
//!    default (or call-site value for an aspect slot) as a default binding;
//! 3. **evaluate**: walk the tree again, resolving aspects from the context
//!    and nested nodes recursively, invoking operations bottom-up. A body
//!    that returns another node has that node gathered and evaluated against
//!    the same context;
//! 4. **finalize**: reject the call if any binding was never read.
//!
//! Both walks stop with `RecursionLimit` once nesting reaches
//! [`EvalOptions::max_depth`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::aspect::{Aspect, Priority};
use crate::context::{Context, ContextSnapshot};
use crate::error::{BindingError, EvalError, Result};
use crate::operation::{Arguments, BoundArgument, Operation};
use crate::signature::Slot;
use crate::term::{Args, Term};
use crate::value::Value;

/// Default bound on nested evaluation depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Knobs for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// Maximum number of nodes on the evaluation stack at once.
    pub max_depth: usize,
    /// Reject a node that is re-entered while it is still being evaluated.
    pub detect_cycles: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            detect_cycles: true,
        }
    }
}

/// Caller-supplied values for aspect names.
#[derive(Clone, Debug, Default)]
pub struct Overrides(BTreeMap<String, Value>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` over `self`.
    pub fn merged(mut self, other: Overrides) -> Self {
        self.0.extend(other.0);
        self
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

struct Node {
    operation: Operation,
    args: Args,
}

/// An operation plus its not-yet-resolved arguments.
///
/// Immutable; clones share the node.
#[derive(Clone)]
pub struct PendingCall(Arc<Node>);

impl PendingCall {
    pub fn new(operation: Operation, args: impl Into<Args>) -> Self {
        Self(Arc::new(Node {
            operation,
            args: args.into(),
        }))
    }

    pub fn operation(&self) -> &Operation {
        &self.0.operation
    }

    pub fn args(&self) -> &Args {
        &self.0.args
    }

    /// Identity of the node.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &PendingCall) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Evaluate with `overrides` under default options.
    pub fn call(&self, overrides: Overrides) -> Result<Value> {
        self.call_with(overrides, &EvalOptions::default())
    }

    /// Evaluate with no overrides.
    pub fn eval(&self) -> Result<Value> {
        self.call(Overrides::new())
    }

    /// Start an invocation, setting one override: `node.with("inc", 2).call()`.
    pub fn with(&self, name: impl Into<String>, value: impl Into<Value>) -> Invocation<'_> {
        Invocation {
            node: self,
            overrides: Overrides::new().set(name, value),
            options: EvalOptions::default(),
        }
    }

    pub fn call_with(&self, overrides: Overrides, options: &EvalOptions) -> Result<Value> {
        debug!(
            operation = self.operation().name(),
            overrides = overrides.len(),
            "Evaluating deferred call"
        );
        let mut eval = Evaluation::new(options);
        eval.context.extend(overrides.iter(), Priority::High, false)?;
        gather(self, &mut eval.context, options, 0)?;
        let value = eval.evaluate(self)?;
        eval.context.finalize()?;
        Ok(value)
    }

    /// Gather, then resolve every aspect slot of the tree against the
    /// gathered bindings, and return the resulting context without invoking
    /// any operation or finalizing. Unused overrides are not an error here.
    pub fn input_context(&self, overrides: Overrides) -> Result<ContextSnapshot> {
        let options = EvalOptions::default();
        let mut context = Context::new();
        context.extend(overrides.iter(), Priority::High, false)?;
        gather(self, &mut context, &options, 0)?;
        resolve_aspects(self, &mut context, &options, 0)?;
        Ok(context.snapshot())
    }

    fn slots(&self) -> Result<Vec<Slot>> {
        self.operation()
            .signature()
            .bind(self.operation().name(), self.args())
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("operation", &self.operation().name())
            .field("args", self.args())
            .finish()
    }
}

/// Sugar for invoking a node with overrides built up fluently.
pub struct Invocation<'a> {
    node: &'a PendingCall,
    overrides: Overrides,
    options: EvalOptions,
}

impl Invocation<'_> {
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(name, value);
        self
    }

    pub fn options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn call(self) -> Result<Value> {
        self.node.call_with(self.overrides, &self.options)
    }

    pub fn input_context(self) -> Result<ContextSnapshot> {
        self.node.input_context(self.overrides)
    }
}

/// Effective argument of one slot, shared by both phases.
enum Effective<'s> {
    /// Resolve through the context under the aspect's name.
    Aspect(&'s Aspect),
    Term(&'s Term),
    Spread(&'s [Term]),
}

/// Apply the merge rule to a slot.
///
/// A call-site value for an aspect slot leaves the declared aspect in
/// place; a call-site aspect replaces it; a call-site node shadows it.
fn effective(slot: &Slot) -> Effective<'_> {
    match slot {
        Slot::Aspect { declared, supplied, .. } => match supplied {
            None | Some(Term::Value(_)) => Effective::Aspect(declared),
            Some(Term::Aspect(outer)) => Effective::Aspect(outer),
            Some(term @ Term::Pending(_)) => Effective::Term(term),
        },
        Slot::Plain { term, .. } => match term {
            Term::Aspect(a) => Effective::Aspect(a),
            other => Effective::Term(other),
        },
        Slot::Variadic { terms, .. } => Effective::Spread(terms),
    }
}

/// Gather phase for `node` and every node nested in its arguments.
///
/// `depth` counts the nodes enclosing `node`; nesting past
/// `options.max_depth` fails like evaluation does.
fn gather(
    node: &PendingCall,
    context: &mut Context,
    options: &EvalOptions,
    depth: usize,
) -> Result<()> {
    if depth >= options.max_depth {
        return Err(EvalError::RecursionLimit {
            operation: node.operation().name().to_string(),
            max_depth: options.max_depth,
        }
        .into());
    }
    trace!(operation = node.operation().name(), depth, "Gathering aspects");
    for slot in node.slots()? {
        if let Slot::Aspect { param, declared, .. } = &slot {
            declared.bind(param)?;
        }
        match (&slot, effective(&slot)) {
            (Slot::Aspect { supplied: Some(Term::Value(v)), .. }, Effective::Aspect(a)) => {
                context.add(a.name_or_bind(slot.param()), v.clone(), Priority::High, true)?;
            }
            (_, Effective::Aspect(a)) => {
                a.name_or_bind(slot.param());
                a.register_default(context)?;
            }
            (_, Effective::Term(Term::Pending(child))) => {
                gather(child, context, options, depth + 1)?
            }
            (_, Effective::Term(_)) => {}
            (_, Effective::Spread(terms)) => {
                for term in terms {
                    match term {
                        Term::Pending(child) => gather(child, context, options, depth + 1)?,
                        Term::Aspect(a) => a.register_default(context)?,
                        Term::Value(_) => {}
                    }
                }
            }
        }
    }
    Ok(())
}

/// Partial resolution: read every aspect the tree would read, without
/// invoking operations. Nodes produced by operation bodies are not visited.
fn resolve_aspects(
    node: &PendingCall,
    context: &mut Context,
    options: &EvalOptions,
    depth: usize,
) -> Result<()> {
    if depth >= options.max_depth {
        return Err(EvalError::RecursionLimit {
            operation: node.operation().name().to_string(),
            max_depth: options.max_depth,
        }
        .into());
    }
    for slot in node.slots()? {
        match effective(&slot) {
            Effective::Aspect(a) => {
                a.resolve(context)?;
            }
            Effective::Term(Term::Pending(child)) => {
                resolve_aspects(child, context, options, depth + 1)?
            }
            Effective::Term(_) => {}
            Effective::Spread(terms) => {
                for term in terms {
                    match term {
                        Term::Pending(child) => resolve_aspects(child, context, options, depth + 1)?,
                        Term::Aspect(a) => {
                            a.resolve(context)?;
                        }
                        Term::Value(_) => {}
                    }
                }
            }
        }
    }
    Ok(())
}

/// State of one top-level evaluation.
struct Evaluation<'o> {
    context: Context,
    options: &'o EvalOptions,
    /// Nodes currently being evaluated, outermost first.
    stack: Vec<usize>,
}

impl<'o> Evaluation<'o> {
    fn new(options: &'o EvalOptions) -> Self {
        Self {
            context: Context::new(),
            options,
            stack: Vec::new(),
        }
    }

    fn evaluate(&mut self, node: &PendingCall) -> Result<Value> {
        let name = node.operation().name();
        if self.options.detect_cycles && self.stack.contains(&node.id()) {
            return Err(EvalError::Cycle {
                operation: name.to_string(),
            }
            .into());
        }
        if self.stack.len() >= self.options.max_depth {
            return Err(EvalError::RecursionLimit {
                operation: name.to_string(),
                max_depth: self.options.max_depth,
            }
            .into());
        }

        self.stack.push(node.id());
        let result = self.evaluate_node(node);
        self.stack.pop();
        result
    }

    fn evaluate_node(&mut self, node: &PendingCall) -> Result<Value> {
        let slots = node.slots()?;
        let mut bound = Vec::with_capacity(slots.len());
        for slot in &slots {
            let name = slot.param().to_string();
            let argument = match effective(slot) {
                Effective::Aspect(a) => BoundArgument {
                    name,
                    value: a.resolve(&mut self.context)?,
                    spread: None,
                },
                Effective::Term(term) => BoundArgument {
                    name,
                    value: self.resolve(term)?,
                    spread: None,
                },
                Effective::Spread(terms) => {
                    let items = terms
                        .iter()
                        .map(|t| self.resolve(t))
                        .collect::<Result<Vec<_>>>()?;
                    BoundArgument {
                        name,
                        value: Value::list(items.clone()),
                        spread: Some(items),
                    }
                }
            };
            bound.push(argument);
        }

        let operation = node.operation();
        let arguments = Arguments::new(operation.name(), bound);
        debug!(operation = operation.name(), depth = self.stack.len(), "Invoking operation");
        let output = operation.invoke(&arguments)?;
        self.settle(output)
    }

    fn resolve(&mut self, term: &Term) -> Result<Value> {
        match term {
            Term::Value(v) => Ok(v.clone()),
            Term::Aspect(a) => a.resolve(&mut self.context),
            Term::Pending(child) => self.evaluate(child),
        }
    }

    /// Turn an operation's output into a final value.
    fn settle(&mut self, output: Term) -> Result<Value> {
        match output {
            Term::Value(v) => Ok(v),
            Term::Aspect(a) => {
                if a.name().is_none() {
                    return Err(BindingError::UnnamedAspect(format!("{a:?}")).into());
                }
                a.resolve(&mut self.context)
            }
            Term::Pending(next) => {
                debug!(operation = next.operation().name(), "Operation returned a deferred call");
                gather(&next, &mut self.context, self.options, self.stack.len())?;
                self.evaluate(&next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::operation::{Deferred, defer};
    use crate::signature::Signature;
    use std::sync::OnceLock;

    fn increment() -> Deferred {
        defer(Operation::new(
            "increment",
            Signature::new().required("x").optional("inc", Aspect::new(1)),
            |args| Ok(args.value("x")?.add(args.get("inc")?)?.into()),
        ))
    }

    #[test]
    fn simple_call() {
        let inc = increment();
        assert_eq!(inc.pending([1]).eval().unwrap().as_i64(), Some(2));
        let nested = inc.pending([inc.pending([1])]);
        assert_eq!(nested.eval().unwrap().as_i64(), Some(3));
    }

    #[test]
    fn multi_arg() {
        let add = defer(Operation::new(
            "add",
            Signature::new().required("x").required("y"),
            |args| Ok(args.value("x")?.add(args.get("y")?)?.into()),
        ));
        assert_eq!(add.pending([1, 2]).eval().unwrap().as_i64(), Some(3));
    }

    #[test]
    fn nameless_aspect_set_by_caller() {
        let inc = defer(Operation::new(
            "increment",
            Signature::new().required("x").optional("inc", Aspect::unset()),
            |args| Ok(args.value("x")?.add(args.get("inc")?)?.into()),
        ));
        let node = inc.pending([1]);
        assert_eq!(node.with("inc", 2).call().unwrap().as_i64(), Some(3));
    }

    #[test]
    fn outer_override_reaches_nested_calls() {
        let inc = increment();
        let node = inc.pending([inc.pending([1])]);
        let result = node.call(Overrides::new().set("inc", 2)).unwrap();
        assert_eq!(result.as_i64(), Some(5));
    }

    #[test]
    fn inner_call_site_value_reaches_outer_call() {
        let inc = increment();
        let node = inc.pending([inc.pending([1, 3])]);
        assert_eq!(node.eval().unwrap().as_i64(), Some(7));
    }

    #[test]
    fn conflicting_call_site_values_are_rejected() {
        let inc = increment();
        let node = inc.pending([Term::from(inc.pending([1, 3])), Term::from(4)]);
        let err = node.eval().unwrap_err();
        assert!(matches!(err, Error::ConflictingBinding { ref name, .. } if name == "inc"));
    }

    #[test]
    fn defaults_match_manual_substitution() {
        let inc = increment();
        let node = inc.pending([inc.pending([10])]);
        let manual = inc.pending([Term::from(inc.pending([10, 1])), Term::from(1)]);
        assert!(node.eval().unwrap().same(&manual.eval().unwrap()));
    }

    #[test]
    fn unused_override_is_rejected() {
        let inc = increment();
        let err = inc.pending([1]).call(Overrides::new().set("inx", 2)).unwrap_err();
        assert!(matches!(err, Error::UnusedArgument(ref n) if n == "inx"));
    }

    #[test]
    fn input_context_does_not_finalize() {
        let inc = increment();
        let snapshot = inc
            .pending([1])
            .input_context(Overrides::new().set("unused", 1))
            .unwrap();
        assert_eq!(snapshot.names(), vec!["inc", "unused"]);
        assert_eq!(snapshot.get("unused").unwrap().usages, 0);
        assert_eq!(snapshot.get("inc").unwrap().priority, Priority::Normal);
    }

    #[test]
    fn body_returning_node_shares_context() {
        let inc = increment();
        let twice = {
            let inc = inc.clone();
            defer(Operation::new(
                "twice",
                Signature::new().required("x"),
                move |args| Ok(inc.pending([inc.pending([args.value("x")?])]).into()),
            ))
        };
        let result = twice.pending([0]).call(Overrides::new().set("inc", 5)).unwrap();
        assert_eq!(result.as_i64(), Some(10));
    }

    #[test]
    fn late_higher_priority_default_is_inconsistent() {
        let shift = defer(Operation::new(
            "shift",
            Signature::new()
                .required("x")
                .optional("inc", Aspect::with_priority(5, Priority::Critical)),
            |args| Ok(args.value("x")?.add(args.get("inc")?)?.into()),
        ));
        let outer = {
            let shift = shift.clone();
            defer(Operation::new(
                "outer",
                Signature::new().required("x").optional("inc", Aspect::new(1)),
                move |args| {
                    let x = args.value("x")?.add(args.get("inc")?)?;
                    Ok(shift.pending([x]).into())
                },
            ))
        };
        let err = outer.pending([0]).eval().unwrap_err();
        assert!(matches!(err, Error::InconsistentAspectValue { ref name, .. } if name == "inc"));
    }

    #[test]
    fn self_returning_node_is_a_cycle() {
        let me: Arc<OnceLock<PendingCall>> = Arc::new(OnceLock::new());
        let handle = Arc::clone(&me);
        let op = Operation::new("ouroboros", Signature::new(), move |_| {
            handle
                .get()
                .cloned()
                .map(Term::from)
                .ok_or_else(|| Error::operation("ouroboros", "node not set"))
        });
        let node = PendingCall::new(op, Args::new());
        me.set(node.clone()).unwrap();
        let err = node.eval().unwrap_err();
        assert!(matches!(err, Error::Evaluation(EvalError::Cycle { .. })));
    }

    #[test]
    fn unbounded_unfolding_hits_depth_limit() {
        let slot: Arc<OnceLock<Deferred>> = Arc::new(OnceLock::new());
        let handle = Arc::clone(&slot);
        let countdown = defer(Operation::new(
            "countdown",
            Signature::new().required("n"),
            move |args| {
                let n = args.i64("n")?;
                let me = handle
                    .get()
                    .ok_or_else(|| Error::operation("countdown", "not registered"))?;
                Ok(me.pending([n + 1]).into())
            },
        ));
        slot.set(countdown.clone()).unwrap();

        let options = EvalOptions {
            max_depth: 16,
            detect_cycles: true,
        };
        let err = countdown
            .pending([0])
            .call_with(Overrides::new(), &options)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvalError::RecursionLimit { max_depth: 16, .. })
        ));
    }

    fn chain(inc: &Deferred, length: usize) -> PendingCall {
        let mut node = inc.pending([0]);
        for _ in 1..length {
            node = inc.pending([node]);
        }
        node
    }

    #[test]
    fn deep_graph_stops_at_depth_limit_before_any_operation_runs() {
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let inc = defer(Operation::new(
            "increment",
            Signature::new().required("x").optional("inc", Aspect::new(1)),
            move |args| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(args.value("x")?.add(args.get("inc")?)?.into())
            },
        ));
        let options = EvalOptions {
            max_depth: 16,
            detect_cycles: true,
        };

        let err = chain(&inc, 40)
            .call_with(Overrides::new(), &options)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvalError::RecursionLimit { max_depth: 16, .. })
        ));
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);

        let roomy = EvalOptions {
            max_depth: 64,
            detect_cycles: true,
        };
        let value = chain(&inc, 40).call_with(Overrides::new(), &roomy).unwrap();
        assert_eq!(value.as_i64(), Some(40));
    }

    #[test]
    fn input_context_respects_depth_limit() {
        let err = chain(&increment(), DEFAULT_MAX_DEPTH + 10)
            .input_context(Overrides::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvalError::RecursionLimit { .. })
        ));
    }

    #[test]
    fn input_context_reads_aspects_without_invoking() {
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let inc = defer(Operation::new(
            "increment",
            Signature::new().required("x").optional("inc", Aspect::new(1)),
            move |args| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(args.value("x")?.add(args.get("inc")?)?.into())
            },
        ));
        let snapshot = inc
            .pending([inc.pending([1])])
            .input_context(Overrides::new().set("inc", 2).set("unused", 1))
            .unwrap();
        let inc_binding = snapshot.get("inc").unwrap();
        assert_eq!(inc_binding.value.as_i64(), Some(2));
        assert!(inc_binding.usages >= 2);
        assert_eq!(snapshot.get("unused").unwrap().usages, 0);
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn variadic_arguments_resolve_each_element() {
        let total = defer(Operation::new(
            "total",
            Signature::new().variadic("items"),
            |args| {
                let mut acc = Value::int(0);
                for item in args.list("items")? {
                    acc = acc.add(item)?;
                }
                Ok(acc.into())
            },
        ));
        let inc = increment();
        let node = total.pending(Args::new().arg(1).arg(inc.pending([1])).arg(3));
        assert_eq!(node.eval().unwrap().as_i64(), Some(6));
    }

    #[test]
    fn call_site_aspect_on_plain_parameter() {
        let scale = defer(Operation::new(
            "scale",
            Signature::new().required("x").optional("factor", 1),
            |args| Ok(args.value("x")?.mul(args.get("factor")?)?.into()),
        ));
        let node = scale.pending(Args::new().arg(3).kwarg("factor", Aspect::unset()));
        assert_eq!(node.with("factor", 4).call().unwrap().as_i64(), Some(12));
    }

    #[test]
    fn missing_aspect_value_resolves_to_null() {
        let echo = defer(Operation::new(
            "echo",
            Signature::new().optional("norm", Aspect::unset()),
            |args| Ok(args.value("norm")?.into()),
        ));
        assert!(echo.pending(Args::new()).eval().unwrap().is_null());
    }
}
