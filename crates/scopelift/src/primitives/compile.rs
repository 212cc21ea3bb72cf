//! Compile-and-cache.
//!
//! There is no code generation here. A [`Compiled`] keeps the cache a
//! compiler would keep: one entry per distinct call signature, where the
//! signature is the full contents of the static operands plus the structure
//! and shapes of the dynamic ones. A call with a new signature counts as a
//! compilation.

use std::cell::RefCell;
use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::value::Value;

/// Cache key of one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    static_fingerprints: Vec<(usize, u64)>,
    dynamic_fingerprints: Vec<u64>,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    hits: usize,
}

/// Signature cache for one compiled function.
#[derive(Debug, Default)]
pub struct Compiled {
    static_argnums: BTreeSet<usize>,
    cache: RefCell<IndexMap<Signature, CacheEntry>>,
}

impl Compiled {
    /// Treat the operands at `static_argnums` as compile-time constants.
    pub fn new(static_argnums: impl IntoIterator<Item = usize>) -> Self {
        Self {
            static_argnums: static_argnums.into_iter().collect(),
            cache: RefCell::default(),
        }
    }

    pub fn static_argnums(&self) -> &BTreeSet<usize> {
        &self.static_argnums
    }

    /// The signature `operands` would be cached under.
    pub fn signature(&self, operands: &[Value]) -> Signature {
        let mut static_fingerprints = Vec::new();
        let mut dynamic_fingerprints = Vec::with_capacity(operands.len());
        for (i, op) in operands.iter().enumerate() {
            if self.static_argnums.contains(&i) {
                static_fingerprints.push((i, op.fingerprint()));
            } else {
                dynamic_fingerprints.push(op.abstract_fingerprint());
            }
        }
        Signature {
            static_fingerprints,
            dynamic_fingerprints,
        }
    }

    /// Run `f` on `operands`, recording the call signature.
    #[instrument(skip_all, fields(operands = operands.len()))]
    pub fn call<R>(&self, operands: Vec<Value>, f: impl FnOnce(Vec<Value>) -> Result<R>) -> Result<R> {
        let signature = self.signature(&operands);
        {
            let mut cache = self.cache.borrow_mut();
            match cache.get_mut(&signature) {
                Some(entry) => entry.hits += 1,
                None => {
                    debug!(entries = cache.len() + 1, "compiling new signature");
                    cache.insert(signature, CacheEntry::default());
                }
            }
        }
        f(operands)
    }

    /// Number of distinct signatures seen.
    pub fn compile_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Number of calls served from the cache.
    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().values().map(|e| e.hits).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn double(ops: Vec<Value>) -> Result<f64> {
        Ok(ops[0].to_f64()? * 2.0)
    }

    #[test]
    fn test_same_shapes_hit_cache() {
        let c = Compiled::new([]);
        assert_eq!(c.call(vec![Value::scalar(1.0)], double).unwrap(), 2.0);
        assert_eq!(c.call(vec![Value::scalar(5.0)], double).unwrap(), 10.0);
        assert_eq!(c.compile_count(), 1);
        assert_eq!(c.cache_hits(), 1);
    }

    #[test]
    fn test_new_shape_recompiles() {
        let c = Compiled::new([]);
        c.call(vec![Value::scalar(1.0)], |_| Ok(())).unwrap();
        c.call(vec![Tensor::zeros(&[2]).into()], |_| Ok(())).unwrap();
        assert_eq!(c.compile_count(), 2);
    }

    #[test]
    fn test_static_operand_values_are_keyed() {
        let c = Compiled::new([1]);
        let call = |flag: f64| {
            c.call(vec![Value::scalar(0.0), Value::scalar(flag)], |_| Ok(()))
                .unwrap()
        };
        call(1.0);
        call(1.0);
        call(2.0);
        assert_eq!(c.compile_count(), 2);
    }
}
