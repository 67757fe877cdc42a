//! # AspectFlow Core
//!
//! Deferred computation graphs whose parameters are resolved from a shared
//! context at call time.
//!
//! Operations are wrapped with [`defer`] so that calling them builds a
//! [`PendingCall`] instead of running. Parameters declared with an
//! [`Aspect`] default are not fixed where the call is built: every aspect of
//! the same name anywhere in the graph reads one value, chosen by
//! [`Priority`] when the graph is finally called.
//!
//! ```
//! use aspectflow_core::{Aspect, Operation, Overrides, Signature, defer};
//!
//! let increment = defer(Operation::new(
//!     "increment",
//!     Signature::new().required("x").optional("inc", Aspect::new(1)),
//!     |args| Ok(args.value("x")?.add(args.get("inc")?)?.into()),
//! ));
//!
//! let graph = increment.pending([increment.pending([1])]);
//! assert_eq!(graph.eval().unwrap().as_i64(), Some(3));
//! let result = graph.call(Overrides::new().set("inc", 2)).unwrap();
//! assert_eq!(result.as_i64(), Some(5));
//! ```

pub mod aspect;
pub mod cache;
pub mod compose;
pub mod context;
pub mod error;
pub mod operation;
pub mod pending;
pub mod registry;
pub mod signature;
pub mod term;
pub mod value;

// Re-export key types at crate root for ergonomics
pub use aspect::{Aspect, Priority};
pub use cache::{CacheScope, CacheStats, ResultCache, with_cache_scope};
pub use context::{BindingSnapshot, Context, ContextSnapshot};
pub use error::{BindingError, Error, EvalError, Result};
pub use operation::{Arguments, BoundArgument, Deferred, Operation, defer, defer_cached};
pub use pending::{DEFAULT_MAX_DEPTH, EvalOptions, Invocation, Overrides, PendingCall};
pub use registry::{Callable, LazifyScope, OperationRegistry};
pub use signature::{Param, Signature};
pub use term::{Args, Term};
pub use value::{Data, ObjectId, Value};
