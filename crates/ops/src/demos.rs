//! Ready-made graphs for the command-line runner.
//!
//! Each demo builds a fresh [`PendingCall`]; the runner evaluates it with
//! whatever overrides the user passes.

use aspectflow_core::compose::{multiply, power};
use aspectflow_core::{Args, Aspect, PendingCall, Priority, Result, Term, Value};

use crate::{arith, default_registry, vector};

/// A named graph builder.
pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    /// Overrides worth trying, as `name=value` pairs.
    pub try_with: &'static [&'static str],
    build: fn() -> Result<PendingCall>,
}

impl Demo {
    pub fn build(&self) -> Result<PendingCall> {
        (self.build)()
    }
}

static DEMOS: &[Demo] = &[
    Demo {
        name: "increment",
        description: "increment(increment(1)) with a shared `inc` aspect (default 1)",
        try_with: &["inc=2"],
        build: increment,
    },
    Demo {
        name: "priorities",
        description: "boost(nudge(0)): `inc` declared at increased priority (7) and low (11)",
        try_with: &["inc=2"],
        build: priorities,
    },
    Demo {
        name: "quickstart",
        description: "gm(2, 8) = sqrt(affine(2) * logpp(8)); logpp's `offset` outranks affine's",
        try_with: &["scale=3"],
        build: quickstart,
    },
    Demo {
        name: "graphical_abstract",
        description: "sqrt(offset(-1) * offset(2)) with one `bias` shared by both offsets",
        try_with: &["bias=1", "bias=2"],
        build: graphical_abstract,
    },
    Demo {
        name: "similarity",
        description: "similarity of two vectors; the measure picks the normalization",
        try_with: &["measure=kl", "measure=dot"],
        build: similarity,
    },
    Demo {
        name: "lazify",
        description: "registry sum/mean swapped for deferred versions sharing one `axis`",
        try_with: &["axis=0", "axis=1"],
        build: lazify,
    },
];

/// Every demo, in display order.
pub fn all() -> &'static [Demo] {
    DEMOS
}

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|d| d.name == name)
}

fn increment() -> Result<PendingCall> {
    let inc = arith::increment();
    Ok(inc.pending([inc.pending([1])]))
}

fn priorities() -> Result<PendingCall> {
    let boost = arith::adder("boost", 7, Priority::Increased);
    let nudge = arith::adder("nudge", 11, Priority::Low);
    Ok(boost.pending([nudge.pending([0])]))
}

fn quickstart() -> Result<PendingCall> {
    Ok(arith::gm().pending([2, 8]))
}

fn graphical_abstract() -> Result<PendingCall> {
    let offset = arith::offset();
    let y1 = offset.pending([-1]);
    let y2 = offset.pending([2]);
    Ok(power(multiply(y1, y2), 0.5))
}

fn numbers(items: &[f64]) -> Value {
    Value::list(items.iter().copied().map(Value::float).collect())
}

fn similarity() -> Result<PendingCall> {
    let x = numbers(&[1.0, 2.0, 3.0]);
    let y = numbers(&[2.0, 2.0, 3.0]);
    Ok(vector::similarity().pending([x, y]))
}

fn lazify() -> Result<PendingCall> {
    let x = Value::list(vec![numbers(&[1.0, 1.0, 1.0]), numbers(&[2.0, 2.0, 2.0])]);
    let y = x.clone();

    let registry = default_registry();
    let mut scope = registry.lazify();
    scope.lazify("sum")?;
    scope.lazify("mean")?;
    scope.lazify("vadd")?;

    let r1 = registry.invoke("sum", Args::new().arg(x).kwarg("axis", Aspect::unset()))?;
    let r2 = registry.invoke("mean", Args::new().arg(y).kwarg("axis", Aspect::unset()))?;
    match registry.invoke("vadd", [r1, r2])? {
        Term::Pending(node) => Ok(node),
        other => Err(aspectflow_core::Error::InvalidComposition(format!(
            "lazified vadd returned {other:?}"
        ))),
    }
}
