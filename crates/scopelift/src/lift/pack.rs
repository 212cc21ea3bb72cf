//! The pack adapter.
//!
//! [`Pack`] turns a call on a tree of scopes into a call on plain data:
//!
//! ```text
//!   outer scope tree ──dedup──► canonical roots
//!          │                         │ group by in filters, freeze inputs
//!          │                         ▼
//!          │                 Packed { variable_groups, rng_groups }
//!          │                         │
//!          │          payload(&PackCall, Packed, args)
//!          │             │  scope_fn(groups) ──► fresh inner scope tree
//!          │             │  repack(&tree)    ──► out groups
//!          │                         │
//!          └────── put_variable ◄────┘ (out groups, once, after the payload)
//! ```
//!
//! Groups are indexed `[filter][scope]`: one entry per filter, each holding
//! one group per canonical root.

use std::cell::RefCell;

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::collection::{
    RngGroup, VariableGroup, Variables, group_from_value, group_to_value, rng_group_from_value,
    rng_group_to_value,
};
use crate::error::{LiftError, Result};
use crate::filter::{Filter, group_collections};
use crate::lift::dedup::Dedup;
use crate::random::PrngKey;
use crate::scope::trace::TraceFrame;
use crate::scope::{Scope, ScopePathNames, ScopeStructure};
use crate::tensor::KeyArray;
use crate::value::Value;

/// Variable groups indexed `[filter][scope]`.
pub type VariableGroups = Vec<Vec<VariableGroup>>;

/// RNG groups indexed `[filter][scope]`.
pub type RngGroups = Vec<Vec<RngGroup>>;

/// State extracted from the outer scopes and handed to the payload.
#[derive(Debug, Clone, Default)]
pub struct Packed {
    pub variable_groups: VariableGroups,
    pub rng_groups: RngGroups,
}

/// Filter configuration of a packed call.
#[derive(Debug, Clone)]
pub struct Pack {
    in_filters: Vec<Filter>,
    out_filters: Vec<Filter>,
    rng_filters: Vec<Filter>,
}

impl Pack {
    pub fn new(in_filters: Vec<Filter>, out_filters: Vec<Filter>, rng_filters: Vec<Filter>) -> Self {
        Self {
            in_filters,
            out_filters,
            rng_filters,
        }
    }

    pub fn in_filters(&self) -> &[Filter] {
        &self.in_filters
    }

    pub fn out_filters(&self) -> &[Filter] {
        &self.out_filters
    }

    pub fn rng_filters(&self) -> &[Filter] {
        &self.rng_filters
    }

    /// Run `payload` against the state of `scope_tree` and write its outputs back.
    ///
    /// # Errors
    ///
    /// Fails if an outer scope is invalid or used from the wrong trace frame,
    /// or with whatever error the payload, `scope_fn` or `repack` raise. Inner
    /// scopes are invalidated before any error is returned.
    #[instrument(skip_all, fields(in_filters = self.in_filters.len(), out_filters = self.out_filters.len()))]
    pub fn run<S, A, Y, F>(&self, scope_tree: &S, args: A, payload: F) -> Result<Y>
    where
        S: ScopeStructure,
        F: FnOnce(&PackCall<'_, S>, Packed, A) -> Result<(Y, VariableGroups)>,
    {
        let dedup = Dedup::new(&scope_tree.scopes());
        let roots = dedup.roots();
        debug!(roots = roots.len(), "pack");

        let mut variable_groups: VariableGroups = vec![Vec::with_capacity(roots.len()); self.in_filters.len()];
        for scope in roots {
            scope.validate_trace_level()?;
            scope.populate_collections()?;
            let (groups, rest) = group_collections(scope.variables(), &self.in_filters);
            if !rest.is_empty() {
                trace!(
                    scope = %scope.path_text(),
                    collections = ?rest.keys().collect::<Vec<_>>(),
                    "collections outside every input filter"
                );
            }
            for (slot, group) in variable_groups.iter_mut().zip(groups) {
                let group = group
                    .into_iter()
                    .map(|(col, c)| {
                        let is_output = self.out_filters.iter().any(|f| f.matches(&col));
                        (col, if is_output { c } else { c.freeze() })
                    })
                    .collect();
                slot.push(group);
            }
        }

        let mut rng_groups: RngGroups = vec![Vec::with_capacity(roots.len()); self.rng_filters.len()];
        for scope in roots {
            let streams: IndexMap<String, ()> = scope
                .rng_streams()
                .into_iter()
                .map(|s| (s, ()))
                .collect();
            let (groups, _) = group_collections(streams, &self.rng_filters);
            for (slot, group) in rng_groups.iter_mut().zip(groups) {
                let keys = group
                    .into_keys()
                    .map(|stream| {
                        let key = scope.make_rng(&stream)?;
                        Ok((stream, KeyArray::scalar(key)))
                    })
                    .collect::<Result<RngGroup>>()?;
                slot.push(keys);
            }
        }

        let (y, out_variable_groups) = {
            let _frame = TraceFrame::enter();
            let call = PackCall {
                template: scope_tree,
                dedup: &dedup,
                out_filters: &self.out_filters,
                inner: RefCell::new(Vec::new()),
            };
            let packed = Packed {
                variable_groups,
                rng_groups,
            };
            payload(&call, packed, args)?
        };

        for (f, per_scope) in out_variable_groups.iter().enumerate() {
            check_scope_count(roots.len(), per_scope.len())?;
            for (scope, group) in roots.iter().zip(per_scope) {
                for (col, collection) in group {
                    trace!(filter = f, collection = %col, scope = %scope.path_text(), "write back");
                    for (name, value) in collection.dict() {
                        scope.put_variable(col, name, value.clone())?;
                    }
                }
            }
        }
        Ok(y)
    }
}

/// Wrap `payload` into a function over `(scope_tree, args)`.
///
/// The returned function packs its scope tree with the given filters on
/// every call. See [`Pack::run`].
pub fn pack<S, A, Y, F>(
    payload: F,
    in_filters: Vec<Filter>,
    out_filters: Vec<Filter>,
    rng_filters: Vec<Filter>,
) -> impl Fn(&S, A) -> Result<Y>
where
    S: ScopeStructure,
    F: Fn(&PackCall<'_, S>, Packed, A) -> Result<(Y, VariableGroups)>,
{
    let strategy = Pack::new(in_filters, out_filters, rng_filters);
    move |scope_tree: &S, args: A| strategy.run(scope_tree, args, &payload)
}

fn check_scope_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LiftError::ScopeCountMismatch { expected, actual });
    }
    Ok(())
}

/// One value per filter: a tuple holding one dict per canonical scope.
pub fn variable_groups_to_values(groups: &VariableGroups) -> Vec<Value> {
    groups
        .iter()
        .map(|per_scope| Value::Tuple(per_scope.iter().map(group_to_value).collect()))
        .collect()
}

/// Inverse of [`variable_groups_to_values`]. Every collection comes back mutable.
pub fn variable_groups_from_values(values: Vec<Value>) -> Result<VariableGroups> {
    values
        .into_iter()
        .map(|v| v.into_tuple()?.into_iter().map(group_from_value).collect())
        .collect()
}

pub fn rng_groups_to_values(groups: &RngGroups) -> Vec<Value> {
    groups
        .iter()
        .map(|per_scope| Value::Tuple(per_scope.iter().map(rng_group_to_value).collect()))
        .collect()
}

pub fn rng_groups_from_values(values: Vec<Value>) -> Result<RngGroups> {
    values
        .into_iter()
        .map(|v| v.into_tuple()?.into_iter().map(rng_group_from_value).collect())
        .collect()
}

/// The live side of one packed call.
///
/// Holds the current generation of inner scopes. Building a new generation
/// with [`PackCall::scope_fn`] invalidates the previous one, and every inner
/// scope still alive is invalidated when the call ends.
pub struct PackCall<'p, S> {
    template: &'p S,
    dedup: &'p Dedup,
    out_filters: &'p [Filter],
    inner: RefCell<Vec<Scope>>,
}

impl<S: ScopeStructure> PackCall<'_, S> {
    /// Number of canonical outer roots.
    pub fn num_scopes(&self) -> usize {
        self.dedup.roots().len()
    }

    /// Build a fresh inner scope tree from `variable_groups` and `rng_groups`.
    ///
    /// Each inner root holds the union of its groups. It is mutable for the
    /// collections its outer root may mutate and some out filter selects.
    ///
    /// # Errors
    ///
    /// Fails if a group does not hold one entry per canonical root, or if a
    /// stream key is not a single key.
    pub fn scope_fn(&self, variable_groups: VariableGroups, rng_groups: RngGroups) -> Result<S> {
        self.build_scopes(variable_groups, rng_groups, &Filter::Nothing)
    }

    /// Like [`PackCall::scope_fn`], with the collections selected by `frozen`
    /// made read-only.
    pub fn scope_fn_frozen(
        &self,
        variable_groups: VariableGroups,
        rng_groups: RngGroups,
        frozen: &Filter,
    ) -> Result<S> {
        self.build_scopes(variable_groups, rng_groups, frozen)
    }

    fn build_scopes(
        &self,
        variable_groups: VariableGroups,
        rng_groups: RngGroups,
        frozen: &Filter,
    ) -> Result<S> {
        self.invalidate_inner();

        let roots = self.dedup.roots();
        let mut variables: Vec<Variables> = vec![Variables::new(); roots.len()];
        for per_scope in variable_groups {
            check_scope_count(roots.len(), per_scope.len())?;
            for (vars, group) in variables.iter_mut().zip(per_scope) {
                vars.extend(group);
            }
        }
        let mut rngs: Vec<IndexMap<String, PrngKey>> = vec![Default::default(); roots.len()];
        for per_scope in rng_groups {
            check_scope_count(roots.len(), per_scope.len())?;
            for (streams, group) in rngs.iter_mut().zip(per_scope) {
                for (name, keys) in group {
                    let key = keys.to_scalar().map_err(|_| LiftError::RngNotScalar {
                        name: name.clone(),
                        shape: keys.shape().to_vec(),
                    })?;
                    streams.insert(name, key);
                }
            }
        }

        let out_mutable = Filter::union_all(self.out_filters).intersect(&!frozen.clone());
        let fresh_roots: Vec<Scope> = roots
            .iter()
            .zip(variables.into_iter().zip(rngs))
            .map(|(outer, (vars, streams))| {
                let mutable = outer.mutable().intersect(&out_mutable);
                match outer.name() {
                    Some(name) => Scope::with_name(name, vars, streams, mutable),
                    None => Scope::new(vars, streams, mutable),
                }
            })
            .collect();
        *self.inner.borrow_mut() = fresh_roots.clone();

        let leaves = self.dedup.reduplicate(&fresh_roots)?;
        self.template.with_scopes(leaves)
    }

    /// Harvest the outputs of an inner scope tree built by [`PackCall::scope_fn`].
    ///
    /// The inner scopes are invalidated. Their mutable collections are grouped
    /// by the out filters.
    ///
    /// # Errors
    ///
    /// Fails with [`LiftError::ScopePathMismatch`] if `inner_tree` does not
    /// have the structure of the outer tree, and with
    /// [`LiftError::UnmappedOutputVariables`] if a mutable collection is not
    /// selected by any out filter.
    pub fn repack(&self, inner_tree: &S) -> Result<VariableGroups> {
        let inner = Dedup::new(&inner_tree.scopes());
        let outer_paths: Vec<&ScopePathNames> = self.dedup.paths().iter().map(|p| &p.names).collect();
        let inner_paths: Vec<&ScopePathNames> = inner.paths().iter().map(|p| &p.names).collect();
        if outer_paths != inner_paths {
            let joined = |paths: Vec<&ScopePathNames>| paths.iter().map(|names| names.join("/")).collect();
            return Err(LiftError::ScopePathMismatch {
                outer: joined(outer_paths),
                inner: joined(inner_paths),
            });
        }

        let mut filters = self.out_filters.to_vec();
        filters.push(Filter::All);
        let mut out: VariableGroups = vec![Vec::with_capacity(inner.roots().len()); self.out_filters.len()];
        for scope in inner.roots() {
            scope.invalidate();
            scope.validate_trace_level()?;
            let mutable: Variables = scope
                .variables()
                .into_iter()
                .filter(|(col, _)| scope.is_mutable_collection(col))
                .collect();
            let (mut groups, _) = group_collections(mutable, &filters);
            let remainder = groups.pop().unwrap_or_default();
            if !remainder.is_empty() {
                return Err(LiftError::UnmappedOutputVariables {
                    collections: remainder.into_keys().collect(),
                });
            }
            for (slot, group) in out.iter_mut().zip(groups) {
                slot.push(group);
            }
        }
        Ok(out)
    }

    fn invalidate_inner(&self) {
        for scope in self.inner.borrow_mut().drain(..) {
            scope.invalidate();
        }
    }
}

impl<S> Drop for PackCall<'_, S> {
    fn drop(&mut self) {
        for scope in self.inner.get_mut().drain(..) {
            scope.invalidate();
        }
    }
}
