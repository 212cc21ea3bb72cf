//! Lifted transforms over scope trees.
//!
//! Every lift is a policy layer over [`Pack`]: it picks the in, out and RNG
//! filters, then drives a primitive from [`crate::primitives`] with the
//! packed state.
//!
//! ```text
//! lift             in filters                   out filters          primitive
//! transform        target, variables            target?, variables   -
//! vmap             variable_axes (in)           variable_axes (out)  batched_map
//! scan             broadcast, carry, axes (in)  same (out)           scan
//! remat            variables                    variables            checkpoint
//! jit              variables                    variables            Compiled
//! custom_vjp       grad_kind, All               grad_kind, All       CustomVjp
//! named_call       All                          All                  named_call
//! ```

mod axes;
mod custom_vjp;
mod dedup;
mod jit;
mod named_call;
mod pack;
mod remat;
mod scan;
mod transform;
mod vmap;

pub use axes::{ArgAxes, InOut};
pub use custom_vjp::{CustomVjpOptions, LiftedVjp, VjpOutput, VjpScopeFactory, custom_vjp};
pub use dedup::{Dedup, ScopePath};
pub use jit::{JitOptions, Jitted, jit};
pub use named_call::named_call;
pub use pack::{
    Pack, PackCall, Packed, RngGroups, VariableGroups, pack, rng_groups_from_values,
    rng_groups_to_values, variable_groups_from_values, variable_groups_to_values,
};
pub use remat::remat;
pub use scan::{ScanOptions, remat_scan, scan};
pub use transform::{GroupFn, Transform, swap_collection, transform_module};
pub use vmap::{VmapOptions, vmap};
