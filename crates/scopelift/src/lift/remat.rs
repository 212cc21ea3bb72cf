//! Rematerialization lift.

use crate::error::Result;
use crate::filter::Filter;
use crate::lift::pack::{Pack, RngGroups, VariableGroups};
use crate::primitives;
use crate::scope::ScopeStructure;

/// Lift `f` into a checkpointed block.
///
/// Collections selected by `variables` and streams selected by `rngs` are
/// handed to the block. Intermediate values of the block would be
/// recomputed on the backward pass instead of stored.
pub fn remat<S, A, Y, F>(
    f: F,
    variables: impl Into<Filter>,
    rngs: impl Into<Filter>,
) -> impl Fn(&S, A) -> Result<Y>
where
    S: ScopeStructure,
    F: Fn(&S, A) -> Result<Y>,
{
    let variables = variables.into();
    let strategy = Pack::new(vec![variables.clone()], vec![variables], vec![rngs.into()]);
    move |scope_tree: &S, args: A| {
        strategy.run(scope_tree, args, |call, packed, args| {
            primitives::checkpoint(
                |(variable_groups, rng_groups, args): (VariableGroups, RngGroups, A)|
                 -> Result<(Y, VariableGroups)> {
                    let inner = call.scope_fn(variable_groups, rng_groups)?;
                    let y = f(&inner, args)?;
                    Ok((y, call.repack(&inner)?))
                },
                (packed.variable_groups, packed.rng_groups, args),
            )
        })
    }
}
