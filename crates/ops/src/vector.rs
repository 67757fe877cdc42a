//! Vector and matrix operations over lists of numbers.
//!
//! Vectors are lists of numbers; matrices are lists of equal-length rows.
//! Results are fresh float lists.

use std::sync::LazyLock;

use aspectflow_core::{
    Arguments, Aspect, Deferred, Error, Operation, Priority, Result, Signature, Value, defer,
    defer_cached,
};

// ── Conversions ─────────────────────────────────────────────────────────

fn floats(value: &Value, param: &str) -> Result<Vec<f64>> {
    let items = value
        .as_list()
        .ok_or_else(|| Error::type_mismatch(param, "list", value.kind()))?;
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| Error::type_mismatch(param, "list of numbers", item.kind()))
        })
        .collect()
}

fn matrix(value: &Value, param: &str) -> Result<Vec<Vec<f64>>> {
    let rows = value
        .as_list()
        .ok_or_else(|| Error::type_mismatch(param, "list of rows", value.kind()))?;
    let rows = rows
        .iter()
        .map(|row| floats(row, param))
        .collect::<Result<Vec<_>>>()?;
    if let Some(first) = rows.first() {
        if rows.iter().any(|r| r.len() != first.len()) {
            return Err(Error::operation(param, "rows have different lengths"));
        }
    }
    Ok(rows)
}

fn to_value(items: impl IntoIterator<Item = f64>) -> Value {
    Value::list(items.into_iter().map(Value::float).collect())
}

fn same_length(op: &str, x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(Error::operation(
            op,
            format!("length mismatch: {} vs {}", x.len(), y.len()),
        ));
    }
    Ok(())
}

// ── Normalization and similarity ────────────────────────────────────────

static NORMALIZE: LazyLock<Deferred> = LazyLock::new(|| {
    defer_cached(Operation::new(
        "normalize",
        Signature::new()
            .required("x")
            .optional("norm", Aspect::with_priority(2, Priority::Low)),
        |args| {
            let x = floats(args.get("x")?, "x")?;
            let p = args.f64("norm")?;
            if p <= 0.0 {
                return Err(Error::operation("normalize", format!("norm must be positive, got {p}")));
            }
            let length = x.iter().map(|v| v.abs().powf(p)).sum::<f64>().powf(1.0 / p);
            if length == 0.0 {
                return Err(Error::operation("normalize", "cannot normalize a zero vector"));
            }
            Ok(to_value(x.into_iter().map(|v| v / length)).into())
        },
    ))
});

static DOT: LazyLock<Deferred> = LazyLock::new(|| {
    defer_cached(Operation::new(
        "dot",
        Signature::new().required("x").required("y"),
        |args| {
            let (x, y) = (floats(args.get("x")?, "x")?, floats(args.get("y")?, "y")?);
            same_length("dot", &x, &y)?;
            Ok(Value::float(x.iter().zip(&y).map(|(a, b)| a * b).sum()).into())
        },
    ))
});

static KL: LazyLock<Deferred> = LazyLock::new(|| {
    defer_cached(Operation::new(
        "kl",
        Signature::new()
            .required("x")
            .required("y")
            .optional("norm", 1)
            .optional("epsilon", f64::EPSILON)
            .auto_aspects(),
        |args| {
            if args.f64("norm")? != 1.0 {
                return Err(Error::operation(
                    "kl",
                    "KL divergence is only defined over L1-normalized inputs",
                ));
            }
            let (x, y) = (floats(args.get("x")?, "x")?, floats(args.get("y")?, "y")?);
            same_length("kl", &x, &y)?;
            let eps = args.f64("epsilon")?;
            let divergence = x
                .iter()
                .zip(&y)
                .map(|(a, b)| a * (a / (b + eps) + eps).ln())
                .sum();
            Ok(Value::float(divergence).into())
        },
    ))
});

static SIMILARITY: LazyLock<Deferred> = LazyLock::new(|| {
    defer(Operation::new(
        "similarity",
        Signature::new()
            .required("x")
            .required("y")
            .optional("measure", Aspect::new("dot")),
        |args: &Arguments| {
            let measure = match args.str("measure")? {
                "dot" => dot(),
                "kl" => kl(),
                other => {
                    return Err(Error::operation(
                        "similarity",
                        format!("unknown measure '{other}' (expected dot or kl)"),
                    ));
                }
            };
            let normalize = normalize();
            let node = measure.pending([
                normalize.pending([args.value("x")?]),
                normalize.pending([args.value("y")?]),
            ]);
            Ok(node.into())
        },
    ))
});

/// `normalize(x, norm = 2)`: scale `x` to unit p-norm. `norm` has low
/// priority so any measure declaring one overrides it.
pub fn normalize() -> Deferred {
    NORMALIZE.clone()
}

pub fn dot() -> Deferred {
    DOT.clone()
}

/// `kl(x, y, norm = 1, epsilon)`: KL divergence, refusing any norm but 1.
pub fn kl() -> Deferred {
    KL.clone()
}

/// `similarity(x, y, measure = "dot")`: compare normalized `x` and `y`.
/// The returned graph lets the measure pick the normalization.
pub fn similarity() -> Deferred {
    SIMILARITY.clone()
}

// ── Reductions ──────────────────────────────────────────────────────────

fn reduce(args: &Arguments, op: &str, f: fn(&[f64]) -> f64) -> Result<Value> {
    let x = matrix(args.get("x")?, "x")?;
    let axis = args.get("axis")?;
    if axis.is_null() {
        let all: Vec<f64> = x.iter().flatten().copied().collect();
        return Ok(Value::float(f(&all)));
    }
    match axis.as_i64() {
        Some(0) => {
            let width = x.first().map_or(0, Vec::len);
            Ok(to_value((0..width).map(|c| {
                let column: Vec<f64> = x.iter().map(|row| row[c]).collect();
                f(&column)
            })))
        }
        Some(1) => Ok(to_value(x.iter().map(|row| f(row)))),
        _ => Err(Error::operation(op, format!("axis must be 0, 1 or null, got {axis}"))),
    }
}

fn total(xs: &[f64]) -> f64 {
    xs.iter().sum()
}

fn average(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        f64::NAN
    } else {
        total(xs) / xs.len() as f64
    }
}

/// `sum(x, axis = null)` over a matrix: everything, columns (0) or rows (1).
pub fn sum() -> Operation {
    Operation::new(
        "sum",
        Signature::new().required("x").optional("axis", ()),
        |args| Ok(reduce(args, "sum", total)?.into()),
    )
}

/// `mean(x, axis = null)`, shaped like [`sum`].
pub fn mean() -> Operation {
    Operation::new(
        "mean",
        Signature::new().required("x").optional("axis", ()),
        |args| Ok(reduce(args, "mean", average)?.into()),
    )
}

/// Elementwise sum of equal-length vectors, or of two numbers.
pub fn vadd() -> Operation {
    Operation::new(
        "vadd",
        Signature::new().required("x").required("y"),
        |args| {
            let (x, y) = (args.get("x")?, args.get("y")?);
            if x.as_list().is_none() && y.as_list().is_none() {
                return Ok(x.add(y)?.into());
            }
            let (x, y) = (floats(x, "x")?, floats(y, "y")?);
            same_length("vadd", &x, &y)?;
            Ok(to_value(x.iter().zip(&y).map(|(a, b)| a + b)).into())
        },
    )
}
