//! Explicit combinators over deferred terms.
//!
//! Each combinator takes terms (values, aspects or deferred calls) and
//! returns a new [`PendingCall`] over a built-in operation. Nothing is
//! evaluated until the returned node is called.

use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::operation::{Arguments, Deferred, Operation, defer};
use crate::pending::PendingCall;
use crate::signature::Signature;
use crate::term::{Args, Term};
use crate::value::Value;

fn binary(name: &'static str, f: fn(&Value, &Value) -> Result<Value>) -> Deferred {
    defer(Operation::new(
        name,
        Signature::new().required("lhs").required("rhs"),
        move |args: &Arguments| Ok(f(args.get("lhs")?, args.get("rhs")?)?.into()),
    ))
}

fn ordering(name: &'static str, accept: fn(Ordering) -> bool) -> Deferred {
    defer(Operation::new(
        name,
        Signature::new().required("lhs").required("rhs"),
        move |args: &Arguments| {
            let (lhs, rhs) = (args.get("lhs")?, args.get("rhs")?);
            let order = lhs.compare(rhs).ok_or_else(|| {
                Error::operation(name, format!("cannot compare {} with {}", lhs.kind(), rhs.kind()))
            })?;
            Ok(Value::bool(accept(order)).into())
        },
    ))
}

static ADD: LazyLock<Deferred> = LazyLock::new(|| binary("add", Value::add));
static SUBTRACT: LazyLock<Deferred> = LazyLock::new(|| binary("subtract", Value::sub));
static MULTIPLY: LazyLock<Deferred> = LazyLock::new(|| binary("multiply", Value::mul));
static DIVIDE: LazyLock<Deferred> = LazyLock::new(|| binary("divide", Value::div));
static POWER: LazyLock<Deferred> = LazyLock::new(|| binary("power", Value::pow));
static GET_AT: LazyLock<Deferred> = LazyLock::new(|| binary("get_at", Value::get_at));
static EQUALS: LazyLock<Deferred> =
    LazyLock::new(|| binary("equals", |a, b| Ok(Value::bool(a.same(b)))));
static NOT_EQUALS: LazyLock<Deferred> =
    LazyLock::new(|| binary("not_equals", |a, b| Ok(Value::bool(!a.same(b)))));
static LESS_THAN: LazyLock<Deferred> = LazyLock::new(|| ordering("less_than", Ordering::is_lt));
static GREATER_THAN: LazyLock<Deferred> =
    LazyLock::new(|| ordering("greater_than", Ordering::is_gt));
static NEGATE: LazyLock<Deferred> = LazyLock::new(|| {
    defer(Operation::new(
        "negate",
        Signature::new().required("operand"),
        |args| Ok(args.get("operand")?.neg()?.into()),
    ))
});

fn apply(op: &Deferred, lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    op.pending(Args::new().arg(lhs).arg(rhs))
}

pub fn add(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&ADD, lhs, rhs)
}

pub fn subtract(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&SUBTRACT, lhs, rhs)
}

pub fn multiply(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&MULTIPLY, lhs, rhs)
}

/// True division; always yields a float.
pub fn divide(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&DIVIDE, lhs, rhs)
}

pub fn power(base: impl Into<Term>, exponent: impl Into<Term>) -> PendingCall {
    apply(&POWER, base, exponent)
}

pub fn negate(operand: impl Into<Term>) -> PendingCall {
    NEGATE.pending(Args::new().arg(operand))
}

/// Index into a list or string; negative indices count from the end.
pub fn get_at(target: impl Into<Term>, index: impl Into<Term>) -> PendingCall {
    apply(&GET_AT, target, index)
}

pub fn less_than(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&LESS_THAN, lhs, rhs)
}

pub fn greater_than(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&GREATER_THAN, lhs, rhs)
}

/// Equality as used by the context: identical handles, or structurally
/// equal non-object values.
pub fn equals(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&EQUALS, lhs, rhs)
}

pub fn not_equals(lhs: impl Into<Term>, rhs: impl Into<Term>) -> PendingCall {
    apply(&NOT_EQUALS, lhs, rhs)
}
