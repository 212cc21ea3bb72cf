//! scopelift - lift stateful variable scopes through pure functional transforms
//!
//! Models keep their parameters, state and random streams in a tree of
//! [`Scope`]s. Transforms such as batching, looping or compilation only accept
//! pure functions over plain data. The [`lift`] module bridges the two: it
//! packs the state of a scope tree into data, runs the transform, rebuilds a
//! fresh scope tree inside it, and writes the outputs back afterwards.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Lifted transforms (lift module)
//!     → transform, vmap, scan, remat, jit, custom_vjp, named_call
//!
//! Level 2: Pack adapter (lift::Pack)
//!     → dedup scope trees, group collections by filter, write back
//!
//! Level 3: Eager primitives (primitives module)
//!     → batched_map, scan, checkpoint, Compiled, CustomVjp
//! ```
//!
//! # Example
//!
//! ```
//! use scopelift::{Filter, PrngKey, Scope, Tensor, Value};
//! use scopelift::lift::{ScanOptions, scan};
//! use indexmap::IndexMap;
//!
//! let rngs = IndexMap::from([("params".to_string(), PrngKey::new(0))]);
//! let scope = Scope::new(Default::default(), rngs, Filter::All);
//!
//! // one shared weight, applied at every step
//! let step = |scope: &Scope, c: Value, xs: Vec<Value>| -> scopelift::Result<(Value, Value)> {
//!     let w = scope.param("w", |_| Value::scalar(0.5))?.to_f64()?;
//!     let c = c.to_f64()? * w + xs[0].to_f64()?;
//!     Ok((Value::scalar(c), Value::scalar(c)))
//! };
//! let looped = scan(step, ScanOptions::new().variable_broadcast("params").split_rng("params", false));
//! let (c, ys) = looped(&scope, Value::scalar(0.0), vec![Tensor::ones(&[3]).into()]).unwrap();
//!
//! assert_eq!(c, Value::scalar(1.75));
//! assert_eq!(ys.as_array().unwrap().shape(), &[3]);
//! assert_eq!(scope.get_variable("params", "w"), Some(Value::scalar(0.5)));
//! ```

pub mod collection;
pub mod error;
pub mod filter;
pub mod lift;
pub mod operations;
pub mod primitives;
pub mod random;
pub mod scope;
pub mod strides;
pub mod tensor;
pub mod value;

pub use collection::{Collection, FrozenDict, RngGroup, VariableGroup, Variables};
pub use error::{LiftError, Result, TensorError};
pub use filter::Filter;
pub use random::PrngKey;
pub use scope::{Scope, ScopeStructure};
pub use tensor::{Array, KeyArray, Tensor};
pub use value::{Dict, Value, dict};
