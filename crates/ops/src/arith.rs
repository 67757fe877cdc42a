//! Scalar operations.
//!
//! `increment`, `adder` and `scaler` share one aspect named `inc`, so every
//! one of them in a graph reads the same step. `affine`, `logpp` and `gm`
//! build the geometric-mean example: `offset` is declared by both `affine`
//! (normal priority) and `logpp` (increased), and the latter wins.

use std::sync::LazyLock;

use aspectflow_core::compose::{multiply, power};
use aspectflow_core::{
    Arguments, Aspect, Deferred, Error, Operation, Priority, Result, Signature, Value, defer,
    defer_cached,
};

static INCREMENT: LazyLock<Deferred> =
    LazyLock::new(|| adder("increment", 1, Priority::Normal));

static OFFSET: LazyLock<Deferred> = LazyLock::new(|| {
    defer_cached(Operation::new(
        "offset",
        Signature::new().required("x").optional("bias", 0).auto_aspects(),
        |args| Ok(args.value("x")?.add(args.get("bias")?)?.into()),
    ))
});

static AFFINE: LazyLock<Deferred> = LazyLock::new(|| {
    defer(Operation::new(
        "affine",
        Signature::new()
            .required("x")
            .optional("scale", 1)
            .optional("offset", 0)
            .auto_aspects(),
        |args| {
            let scaled = args.value("x")?.mul(args.get("scale")?)?;
            Ok(scaled.add(args.get("offset")?)?.into())
        },
    ))
});

static LOGPP: LazyLock<Deferred> = LazyLock::new(|| {
    defer(Operation::new(
        "logpp",
        Signature::new()
            .required("x")
            .optional("offset", Aspect::with_priority(1, Priority::Increased)),
        |args| {
            let shifted = args.f64("x")? + args.f64("offset")?;
            if shifted <= 0.0 {
                return Err(Error::operation("logpp", format!("log of non-positive value {shifted}")));
            }
            Ok(Value::float(shifted.log2()).into())
        },
    ))
});

static GM: LazyLock<Deferred> = LazyLock::new(|| {
    defer(Operation::new(
        "gm",
        Signature::new()
            .required("x")
            .required("y")
            .optional("affine", Value::object(affine()))
            .optional("logpp", Value::object(logpp())),
        |args: &Arguments| {
            let affine = args.object::<Deferred>("affine")?;
            let logpp = args.object::<Deferred>("logpp")?;
            let product = multiply(
                affine.pending([args.value("x")?]),
                logpp.pending([args.value("y")?]),
            );
            Ok(power(product, 0.5).into())
        },
    ))
});

/// Build an operation `name(x, inc)` returning `combine(x, inc)`, where
/// `inc` is an aspect with the given default and priority.
fn stepper(
    name: &str,
    combine: fn(&Value, &Value) -> Result<Value>,
    default: Value,
    priority: Priority,
) -> Deferred {
    defer(Operation::new(
        name,
        Signature::new()
            .required("x")
            .optional("inc", Aspect::with_priority(default, priority)),
        move |args| Ok(combine(args.get("x")?, args.get("inc")?)?.into()),
    ))
}

/// `name(x, inc) = x + inc`.
pub fn adder(name: &str, default: impl Into<Value>, priority: Priority) -> Deferred {
    stepper(name, Value::add, default.into(), priority)
}

/// `name(x, inc) = x * inc`.
pub fn scaler(name: &str, default: impl Into<Value>, priority: Priority) -> Deferred {
    stepper(name, Value::mul, default.into(), priority)
}

/// `increment(x, inc = 1)`.
pub fn increment() -> Deferred {
    INCREMENT.clone()
}

/// `offset(x, bias = 0)`, memoized in the process-wide cache.
pub fn offset() -> Deferred {
    OFFSET.clone()
}

/// `affine(x, scale = 1, offset = 0) = x * scale + offset`.
pub fn affine() -> Deferred {
    AFFINE.clone()
}

/// `logpp(x, offset = 1) = log2(x + offset)`; `offset` has increased priority.
pub fn logpp() -> Deferred {
    LOGPP.clone()
}

/// `gm(x, y) = sqrt(affine(x) * logpp(y))`. The body returns a deferred
/// call, so the aspects of `affine` and `logpp` join the caller's context.
pub fn gm() -> Deferred {
    GM.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aspectflow_core::{EvalError, Overrides};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn increment_nests() {
        let inc = increment();
        let node = inc.pending([inc.pending([1])]);
        assert_eq!(node.eval().unwrap().as_i64(), Some(3));
        assert_eq!(node.with("inc", 2).call().unwrap().as_i64(), Some(5));
    }

    #[test]
    fn higher_priority_default_wins_everywhere() {
        let boost = adder("boost", 7, Priority::Increased);
        let nudge = adder("nudge", 11, Priority::Low);
        let node = boost.pending([nudge.pending([0])]);
        assert_eq!(node.eval().unwrap().as_i64(), Some(14));
        assert_eq!(node.with("inc", 2).call().unwrap().as_i64(), Some(4));
    }

    #[test]
    fn override_result_depends_on_nesting_order() {
        let add = adder("add_step", 7, Priority::Increased);
        let mul = scaler("mul_step", 11, Priority::Low);
        let mul_of_add = mul.pending([add.pending([0])]);
        let add_of_mul = add.pending([mul.pending([0])]);
        assert_eq!(mul_of_add.with("inc", 2).call().unwrap().as_i64(), Some(4));
        assert_eq!(add_of_mul.with("inc", 2).call().unwrap().as_i64(), Some(2));
    }

    #[test]
    fn offset_promotes_bias_to_an_aspect() {
        let node = offset().pending([-1]);
        assert_eq!(node.eval().unwrap().as_i64(), Some(-1));
        assert_eq!(node.with("bias", 4).call().unwrap().as_i64(), Some(3));
    }

    #[test]
    fn gm_combines_affine_and_logpp() {
        let node = gm().pending([2, 8]);
        let scaled = node.with("scale", 3).call().unwrap().as_f64().unwrap();
        assert!(close(scaled, (7.0 * 9f64.log2()).sqrt()));
        let plain = node.eval().unwrap().as_f64().unwrap();
        assert!(close(plain, (3.0 * 9f64.log2()).sqrt()));
    }

    #[test]
    fn gm_input_context_only_sees_the_outer_call() {
        let snapshot = gm()
            .pending([2, 8])
            .input_context(Overrides::new().set("scale", 3))
            .unwrap();
        assert_eq!(snapshot.names(), vec!["scale"]);
    }

    #[test]
    fn logpp_rejects_non_positive_input() {
        let err = logpp().pending([-5]).eval().unwrap_err();
        assert!(matches!(err, Error::Evaluation(EvalError::Operation { .. })));
    }
}
