//! Local variable transforms.
//!
//! A [`Transform`] hands the body a view of the target collections built by
//! `trans_in`, and maps the body's updates back through `trans_out`.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::collection::{Collection, VariableGroup};
use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::lift::pack::Pack;
use crate::scope::ScopeStructure;

/// Map from one view of a variable group to another.
pub type GroupFn = Rc<dyn Fn(VariableGroup) -> VariableGroup>;

/// A local transform of the collections selected by `target`.
#[derive(Clone)]
pub struct Transform {
    target: Filter,
    trans_in: GroupFn,
    trans_out: GroupFn,
    init: bool,
    mutable: bool,
    rngs: Filter,
    variables: Filter,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("target", &self.target)
            .field("init", &self.init)
            .field("mutable", &self.mutable)
            .field("rngs", &self.rngs)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl Transform {
    /// Identity transform of `target`, read-only, with every other
    /// collection and stream passed through.
    pub fn new(target: impl Into<Filter>) -> Self {
        Self {
            target: target.into(),
            trans_in: Rc::new(|group| group),
            trans_out: Rc::new(|group| group),
            init: false,
            mutable: false,
            rngs: Filter::All,
            variables: Filter::All,
        }
    }

    pub fn trans_in(mut self, f: impl Fn(VariableGroup) -> VariableGroup + 'static) -> Self {
        self.trans_in = Rc::new(f);
        self
    }

    pub fn trans_out(mut self, f: impl Fn(VariableGroup) -> VariableGroup + 'static) -> Self {
        self.trans_out = Rc::new(f);
        self
    }

    /// Run the body once to create the target before the transformed run.
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    /// Let the body update the target.
    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    pub fn rngs(mut self, filter: impl Into<Filter>) -> Self {
        self.rngs = filter.into();
        self
    }

    /// Collections besides the target handed to the body.
    pub fn variables(mut self, filter: impl Into<Filter>) -> Self {
        self.variables = filter.into();
        self
    }

    pub fn target(&self) -> &Filter {
        &self.target
    }

    fn is_target_out(&self) -> bool {
        self.mutable || self.init
    }

    fn strategy(&self) -> Pack {
        let in_filters = vec![self.target.clone(), self.variables.clone()];
        let out_filters = if self.is_target_out() {
            in_filters.clone()
        } else {
            vec![Filter::Nothing, self.variables.intersect(&!self.target.clone())]
        };
        Pack::new(in_filters, out_filters, vec![self.rngs.clone()])
    }

    /// Run `f` on `scope_tree` with the target replaced by its view.
    ///
    /// With `init`, `f` first runs once on the untransformed target; only the
    /// target it leaves behind is kept.
    ///
    /// # Errors
    ///
    /// Fails with [`LiftError::MultiScopeUnsupported`] when `scope_tree`
    /// holds more than one root.
    pub fn apply<S, A, Y, F>(&self, scope_tree: &S, f: F, args: A) -> Result<Y>
    where
        S: ScopeStructure,
        A: Clone,
        F: Fn(&S, A) -> Result<Y>,
    {
        let is_target_out = self.is_target_out();
        self.strategy().run(scope_tree, args, |call, packed, args| {
            if call.num_scopes() != 1 {
                return Err(LiftError::MultiScopeUnsupported { transform: "transform" });
            }
            let mut groups = packed
                .variable_groups
                .into_iter()
                .map(|per_scope| per_scope.into_iter().next().unwrap_or_default());
            let mut target = groups.next().unwrap_or_default();
            let variables = groups.next().unwrap_or_default();

            if self.init {
                debug!("transform init run");
                let scope = call.scope_fn(vec![vec![target], vec![variables.clone()]], packed.rng_groups.clone())?;
                f(&scope, args.clone())?;
                let initialized = call.repack(&scope)?.into_iter().next().unwrap_or_default();
                target = (self.trans_out)(initialized.into_iter().next().unwrap_or_default());
            }

            let target = (self.trans_in)(unfreeze(target));
            let target = if is_target_out { target } else { freeze(target) };
            let scope = call.scope_fn(vec![vec![target], vec![variables]], packed.rng_groups)?;
            let y = f(&scope, args)?;
            let mut out = call.repack(&scope)?;
            if is_target_out {
                for group in out.iter_mut().take(1).flatten() {
                    *group = (self.trans_out)(std::mem::take(group));
                }
            }
            Ok((y, out))
        })
    }
}

fn unfreeze(group: VariableGroup) -> VariableGroup {
    group
        .into_iter()
        .map(|(col, c)| (col, Collection::Mutable(c.into_dict())))
        .collect()
}

fn freeze(group: VariableGroup) -> VariableGroup {
    group.into_iter().map(|(col, c)| (col, c.freeze())).collect()
}

/// Lift `f` through `transform`, initializing the target on first use.
///
/// `init` is set whenever no collection selected by the target holds any
/// variables yet.
pub fn transform_module<S, A, Y, F>(f: F, transform: Transform) -> impl Fn(&S, A) -> Result<Y>
where
    S: ScopeStructure,
    A: Clone,
    F: Fn(&S, A) -> Result<Y>,
{
    move |scope_tree: &S, args: A| {
        let initialized = scope_tree.scopes().iter().any(|scope| {
            scope
                .variables()
                .iter()
                .any(|(col, c)| transform.target().matches(col) && !c.is_empty())
        });
        transform.clone().init(!initialized).apply(scope_tree, &f, args)
    }
}

/// A mutable transform that exchanges collections `a` and `b`.
pub fn swap_collection(a: impl Into<String>, b: impl Into<String>) -> Transform {
    let (a, b) = (a.into(), b.into());
    let swap = {
        let (a, b) = (a.clone(), b.clone());
        move |mut group: VariableGroup| {
            let from_a = group.shift_remove(&a).unwrap_or_default();
            let from_b = group.shift_remove(&b).unwrap_or_default();
            group.insert(b.clone(), from_a);
            group.insert(a.clone(), from_b);
            group
        }
    };
    Transform::new(Filter::names([a, b]))
        .trans_in(swap.clone())
        .trans_out(swap)
        .mutable(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Variables;
    use crate::random::PrngKey;
    use crate::scope::Scope;
    use crate::value::{Value, dict};
    use indexmap::IndexMap;

    fn scope(vars: Variables) -> Scope {
        let rngs = IndexMap::from([("params".to_string(), PrngKey::new(0))]);
        Scope::new(vars, rngs, Filter::All)
    }

    fn params(w: f64) -> Variables {
        Variables::from([(
            "params".to_string(),
            Collection::Mutable(dict([("w", Value::scalar(w))])),
        )])
    }

    fn double_params(mut group: VariableGroup) -> VariableGroup {
        if let Some(c) = group.get_mut("params") {
            let doubled = c
                .dict()
                .iter()
                .map(|(k, v)| (k.clone(), Value::scalar(v.to_f64().unwrap_or(0.0) * 2.0)))
                .collect();
            *c = Collection::Mutable(doubled);
        }
        group
    }

    fn read_w(scope: &Scope, (): ()) -> Result<Option<Value>> {
        Ok(scope.get_variable("params", "w"))
    }

    #[test]
    fn test_view_is_read_only_by_default() {
        let scope = scope(params(1.5));
        let t = Transform::new("params").trans_in(double_params);
        assert_eq!(t.apply(&scope, read_w, ()).unwrap(), Some(Value::scalar(3.0)));
        let err = t
            .apply(&scope, |s: &Scope, ()| s.put_variable("params", "w", Value::scalar(0.0)), ())
            .unwrap_err();
        assert!(matches!(err, LiftError::ImmutableCollection { .. }));
        assert_eq!(scope.get_variable("params", "w"), Some(Value::scalar(1.5)));
    }

    #[test]
    fn test_init_keeps_only_target() {
        let scope = scope(Variables::new());
        let t = Transform::new("params").init(true).trans_in(double_params);
        let seen = t
            .apply(
                &scope,
                |s: &Scope, ()| {
                    s.param("w", |_| Value::scalar(1.0))?;
                    Ok(s.get_variable("params", "w"))
                },
                (),
            )
            .unwrap();
        // the init run creates w = 1, the transformed run sees its view
        assert_eq!(seen, Some(Value::scalar(2.0)));
        assert_eq!(scope.get_variable("params", "w"), Some(Value::scalar(2.0)));
    }

    #[test]
    fn test_transform_module_detects_init() {
        let scope = scope(Variables::new());
        let f = transform_module(
            |s: &Scope, ()| s.param("w", |_| Value::scalar(4.0)),
            Transform::new("params"),
        );
        assert_eq!(f(&scope, ()).unwrap(), Value::scalar(4.0));
        assert_eq!(scope.get_variable("params", "w"), Some(Value::scalar(4.0)));
        // second call finds the target and runs read-only
        assert_eq!(f(&scope, ()).unwrap(), Value::scalar(4.0));
    }

    #[test]
    fn test_swap_collection() {
        let mut vars = params(1.0);
        vars.insert(
            "batch_stats".to_string(),
            Collection::Mutable(dict([("m", Value::scalar(5.0))])),
        );
        let scope = scope(vars);
        let t = swap_collection("params", "batch_stats");
        let seen = t
            .apply(
                &scope,
                |s: &Scope, ()| {
                    let m = s.get_variable("params", "m");
                    s.put_variable("batch_stats", "w", Value::scalar(9.0))?;
                    Ok(m)
                },
                (),
            )
            .unwrap();
        assert_eq!(seen, Some(Value::scalar(5.0)));
        assert_eq!(scope.get_variable("params", "w"), Some(Value::scalar(9.0)));
        assert_eq!(scope.get_variable("batch_stats", "m"), Some(Value::scalar(5.0)));
    }

    #[test]
    fn test_multi_scope_rejected() {
        let scopes = vec![scope(params(1.0)), scope(params(2.0))];
        let err = Transform::new("params")
            .apply(&scopes, |_: &Vec<Scope>, ()| Ok(()), ())
            .unwrap_err();
        assert_eq!(err, LiftError::MultiScopeUnsupported { transform: "transform" });
    }
}
