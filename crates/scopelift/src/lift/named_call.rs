//! Named-call lift.

use crate::error::Result;
use crate::filter::Filter;
use crate::lift::pack::Pack;
use crate::primitives;
use crate::scope::ScopeStructure;

/// Lift `f` into a call tagged with `name`.
///
/// Every collection and stream is handed through, and the body runs inside
/// a `named_call` tracing span.
pub fn named_call<S, A, Y, F>(f: F, name: impl Into<String>) -> impl Fn(&S, A) -> Result<Y>
where
    S: ScopeStructure,
    F: Fn(&S, A) -> Result<Y>,
{
    let name = name.into();
    let strategy = Pack::new(vec![Filter::All], vec![Filter::All], vec![Filter::All]);
    move |scope_tree: &S, args: A| {
        strategy.run(scope_tree, args, |call, packed, args| {
            primitives::named_call(
                &name,
                |args| {
                    let inner = call.scope_fn(packed.variable_groups, packed.rng_groups)?;
                    let y = f(&inner, args)?;
                    Ok((y, call.repack(&inner)?))
                },
                args,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Variables;
    use crate::random::PrngKey;
    use crate::scope::Scope;
    use crate::value::Value;
    use indexmap::IndexMap;

    #[test]
    fn test_named_call_is_transparent() {
        let rngs = IndexMap::from([("params".to_string(), PrngKey::new(7))]);
        let scope = Scope::new(Variables::new(), rngs, Filter::All);
        let f = named_call(
            |scope: &Scope, x: f64| {
                let b = scope.param("b", |_| Value::scalar(1.0))?;
                Ok(x + b.to_f64()?)
            },
            "add_bias",
        );
        assert_eq!(f(&scope, 1.0).unwrap(), 2.0);
        assert_eq!(scope.get_variable("params", "b"), Some(Value::scalar(1.0)));
    }
}
