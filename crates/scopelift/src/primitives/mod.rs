//! Eager reference implementations of the pure transforms.
//!
//! ```text
//! batched_map  slice operands per index, run, stack results
//! scan         thread a carry through steps, stack per-step outputs
//! checkpoint   run once (recompute happens on the backward pass)
//! Compiled     signature cache around a call
//! CustomVjp    forward / backward pair
//! named_call   run inside a named tracing span
//! ```
//!
//! These follow the calling conventions of the real transforms. They do not
//! trace, differentiate or compile.

mod batching;
mod compile;
mod loops;
mod vjp;

pub use batching::{BatchAxis, batched_map};
pub use compile::{Compiled, Signature};
pub use loops::{ScanOutput, scan};
pub use vjp::CustomVjp;

use tracing::{debug, info_span};

/// Run `f` as a rematerialized block.
///
/// Evaluation is eager, so the forward value is simply `f(args)`.
pub fn checkpoint<A, R>(f: impl FnOnce(A) -> R, args: A) -> R {
    debug!("checkpoint");
    f(args)
}

/// Run `f` inside a span named `name`.
pub fn named_call<A, R>(name: &str, f: impl FnOnce(A) -> R, args: A) -> R {
    let span = info_span!("named_call", name = %name);
    let _enter = span.enter();
    f(args)
}
