//! Compiled-call lift.

use tracing::trace;

use crate::error::Result;
use crate::filter::Filter;
use crate::lift::pack::{
    Pack, rng_groups_from_values, rng_groups_to_values, variable_groups_from_values,
    variable_groups_to_values,
};
use crate::primitives::Compiled;
use crate::scope::ScopeStructure;
use crate::value::Value;

/// Configuration of [`jit`].
#[derive(Debug, Clone)]
pub struct JitOptions {
    /// Positions of compile-time constant arguments. Position 0 is the scope.
    pub static_argnums: Vec<usize>,
    pub variables: Filter,
    pub rngs: Filter,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            static_argnums: Vec::new(),
            variables: Filter::All,
            rngs: Filter::All,
        }
    }
}

impl JitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn static_argnums(mut self, argnums: impl IntoIterator<Item = usize>) -> Self {
        self.static_argnums = argnums.into_iter().collect();
        self
    }

    pub fn variables(mut self, filter: impl Into<Filter>) -> Self {
        self.variables = filter.into();
        self
    }

    pub fn rngs(mut self, filter: impl Into<Filter>) -> Self {
        self.rngs = filter.into();
        self
    }
}

/// A function lifted by [`jit`], with its signature cache.
pub struct Jitted<F> {
    f: F,
    strategy: Pack,
    compiled: Compiled,
}

/// Lift `f` into a compiled call.
///
/// The compiled call sees `[variables, rngs, args...]`. Argument `i` of the
/// lifted function (counting the scope as 0) becomes operand `i + 1`, so
/// `static_argnums` entries are shifted accordingly and position 0 is
/// dropped.
pub fn jit<F>(f: F, options: JitOptions) -> Jitted<F> {
    let static_argnums = options.static_argnums.iter().filter(|&&i| i > 0).map(|&i| i + 1);
    Jitted {
        f,
        strategy: Pack::new(vec![options.variables.clone()], vec![options.variables], vec![options.rngs]),
        compiled: Compiled::new(static_argnums),
    }
}

impl<F> Jitted<F> {
    /// Call the lifted function on `scope_tree`.
    pub fn call<S>(&self, scope_tree: &S, args: Vec<Value>) -> Result<Value>
    where
        S: ScopeStructure,
        F: Fn(&S, Vec<Value>) -> Result<Value>,
    {
        self.strategy.run(scope_tree, args, |call, packed, args| {
            let mut operands = variable_groups_to_values(&packed.variable_groups);
            let num_vars = operands.len();
            operands.extend(rng_groups_to_values(&packed.rng_groups));
            let num_rngs = operands.len() - num_vars;
            operands.extend(args);
            trace!(operands = operands.len(), "jit call");

            self.compiled.call(operands, |operands| {
                let mut operands = operands.into_iter();
                let vars = variable_groups_from_values(operands.by_ref().take(num_vars).collect())?;
                let rngs = rng_groups_from_values(operands.by_ref().take(num_rngs).collect())?;
                let inner = call.scope_fn(vars, rngs)?;
                let y = (self.f)(&inner, operands.collect())?;
                Ok((y, call.repack(&inner)?))
            })
        })
    }

    /// Number of distinct signatures compiled so far.
    pub fn compile_count(&self) -> usize {
        self.compiled.compile_count()
    }

    pub fn cache_hits(&self) -> usize {
        self.compiled.cache_hits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Collection, Variables};
    use crate::random::PrngKey;
    use crate::scope::Scope;
    use crate::tensor::Tensor;
    use crate::value::dict;
    use indexmap::IndexMap;

    fn scope() -> Scope {
        let vars = Variables::from([(
            "params".to_string(),
            Collection::Mutable(dict([("w", Value::scalar(3.0))])),
        )]);
        let rngs = IndexMap::from([("params".to_string(), PrngKey::new(0))]);
        Scope::new(vars, rngs, Filter::All)
    }

    fn scale(scope: &Scope, args: Vec<Value>) -> Result<Value> {
        let w = scope.param("w", |_| Value::scalar(0.0))?.to_f64()?;
        let x = args[0].clone().into_array()?;
        Ok(x.map(|v| v * w).into())
    }

    #[test]
    fn test_same_shapes_reuse_compilation() {
        let scope = scope();
        let f = jit(scale, JitOptions::new());
        let y = f.call(&scope, vec![Tensor::ones(&[2]).into()]).unwrap();
        assert_eq!(y.as_array().unwrap().data(), &[3.0, 3.0]);
        f.call(&scope, vec![Tensor::zeros(&[2]).into()]).unwrap();
        assert_eq!(f.compile_count(), 1);
        assert_eq!(f.cache_hits(), 1);
    }

    #[test]
    fn test_static_argument_value_recompiles() {
        let scope = scope();
        let f = jit(
            |_: &Scope, args: Vec<Value>| -> Result<Value> { Ok(args[1].clone()) },
            JitOptions::new().static_argnums([0, 2]),
        );
        for flag in [1.0, 1.0, 2.0] {
            f.call(&scope, vec![Value::scalar(0.0), Value::scalar(flag)]).unwrap();
        }
        assert_eq!(f.compile_count(), 2);
    }
}
