//! Built-in operations for AspectFlow.
//!
//! Scalar arithmetic steps sharing aspects, vector normalization and
//! similarity measures, matrix reductions, and the demo graphs the
//! command-line runner evaluates.

pub mod arith;
pub mod demos;
pub mod vector;

use aspectflow_core::OperationRegistry;

/// Create a registry with every built-in operation.
///
/// Matrix reductions are registered eagerly so they can be swapped for
/// deferred versions with [`OperationRegistry::lazify`]; the scalar steps are
/// deferred already.
pub fn default_registry() -> OperationRegistry {
    let registry = OperationRegistry::new();
    registry.register(vector::sum());
    registry.register(vector::mean());
    registry.register(vector::vadd());
    registry.register_deferred(arith::increment());
    registry.register_deferred(arith::offset());
    registry.register_deferred(arith::gm());
    registry.register_deferred(vector::normalize());
    registry.register_deferred(vector::similarity());
    tracing::debug!(operations = registry.len(), "Default registry built");
    registry
}
