//! Nested value trees.
//!
//! [`Value`] is the structure that flows through every pure primitive:
//! variables, rng keys, arguments and results are all trees of arrays.
//! Batch and loop axes are applied leaf-wise.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::error::{LiftError, Result, TensorError};
use crate::operations;
use crate::tensor::{KeyArray, Tensor};

/// Insertion-ordered mapping from names to values.
pub type Dict = IndexMap<String, Value>;

/// Build a [`Dict`] from `(name, value)` pairs.
pub fn dict<I, K>(entries: I) -> Dict
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// A tree of arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(Tensor),
    Keys(KeyArray),
    Tuple(Vec<Value>),
    Dict(Dict),
}

impl Value {
    /// The empty tuple.
    pub fn unit() -> Self {
        Value::Tuple(Vec::new())
    }

    /// A rank-0 array.
    pub fn scalar(value: f64) -> Self {
        Value::Array(Tensor::scalar(value))
    }

    pub fn as_array(&self) -> Option<&Tensor> {
        match self {
            Value::Array(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_keys(&self) -> Option<&KeyArray> {
        match self {
            Value::Keys(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// The single element of a rank-0 array.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::Array(t) => Ok(t.to_scalar()?),
            other => Err(mismatch("a scalar array", other)),
        }
    }

    pub fn into_array(self) -> Result<Tensor> {
        match self {
            Value::Array(t) => Ok(t),
            other => Err(mismatch("an array", &other)),
        }
    }

    pub fn into_keys(self) -> Result<KeyArray> {
        match self {
            Value::Keys(k) => Ok(k),
            other => Err(mismatch("a key array", &other)),
        }
    }

    pub fn into_dict(self) -> Result<Dict> {
        match self {
            Value::Dict(d) => Ok(d),
            other => Err(mismatch("a dict", &other)),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Value>> {
        match self {
            Value::Tuple(items) => Ok(items),
            other => Err(mismatch("a tuple", &other)),
        }
    }

    /// Apply `f` to every float array leaf.
    pub fn map_arrays(&self, f: &impl Fn(&Tensor) -> Tensor) -> Value {
        match self {
            Value::Array(t) => Value::Array(f(t)),
            Value::Keys(k) => Value::Keys(k.clone()),
            Value::Tuple(items) => Value::Tuple(items.iter().map(|v| v.map_arrays(f)).collect()),
            Value::Dict(d) => Value::Dict(
                d.iter()
                    .map(|(k, v)| (k.clone(), v.map_arrays(f)))
                    .collect(),
            ),
        }
    }

    /// The sizes of dimension `axis` over every leaf.
    ///
    /// # Errors
    ///
    /// Fails if some leaf has rank `<= axis`.
    pub fn axis_sizes(&self, axis: usize) -> Result<BTreeSet<usize>> {
        let mut sizes = BTreeSet::new();
        self.collect_axis_sizes(axis, &mut sizes)?;
        Ok(sizes)
    }

    fn collect_axis_sizes(&self, axis: usize, sizes: &mut BTreeSet<usize>) -> Result<()> {
        let shape = match self {
            Value::Array(t) => t.shape(),
            Value::Keys(k) => k.shape(),
            Value::Tuple(items) => {
                return items
                    .iter()
                    .try_for_each(|v| v.collect_axis_sizes(axis, sizes));
            }
            Value::Dict(d) => {
                return d
                    .values()
                    .try_for_each(|v| v.collect_axis_sizes(axis, sizes));
            }
        };
        let size = shape.get(axis).ok_or(TensorError::AxisOutOfBounds {
            axis,
            ndim: shape.len(),
        })?;
        sizes.insert(*size);
        Ok(())
    }

    /// Select `index` along `axis` in every leaf.
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Value> {
        Ok(match self {
            Value::Array(t) => Value::Array(operations::index_axis(t, axis, index)?),
            Value::Keys(k) => Value::Keys(operations::index_axis(k, axis, index)?),
            Value::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|v| v.index_axis(axis, index))
                    .collect::<Result<_>>()?,
            ),
            Value::Dict(d) => Value::Dict(
                d.iter()
                    .map(|(k, v)| Ok((k.clone(), v.index_axis(axis, index)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Stack structurally identical trees leaf-wise along a new `axis`.
    ///
    /// # Errors
    ///
    /// Fails if `items` is empty or the trees differ in structure or shape.
    ///
    /// # Example
    ///
    /// ```
    /// use scopelift::Value;
    ///
    /// let items = vec![Value::scalar(1.0), Value::scalar(2.0)];
    /// let stacked = Value::stack(&items, 0).unwrap();
    /// assert_eq!(stacked.as_array().unwrap().data(), &[1.0, 2.0]);
    /// ```
    pub fn stack(items: &[Value], axis: usize) -> Result<Value> {
        let first = items.first().ok_or(TensorError::EmptyStack)?;
        Ok(match first {
            Value::Array(_) => {
                let arrays = items
                    .iter()
                    .map(|v| v.as_array().cloned().ok_or_else(|| mismatch("an array", v)))
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(operations::stack(&arrays, axis)?)
            }
            Value::Keys(_) => {
                let keys = items
                    .iter()
                    .map(|v| v.as_keys().cloned().ok_or_else(|| mismatch("a key array", v)))
                    .collect::<Result<Vec<_>>>()?;
                Value::Keys(operations::stack(&keys, axis)?)
            }
            Value::Tuple(head) => {
                let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(items.len()); head.len()];
                for item in items {
                    let tuple = item.as_tuple().ok_or_else(|| mismatch("a tuple", item))?;
                    if tuple.len() != head.len() {
                        return Err(LiftError::StructureMismatch {
                            reason: format!(
                                "tuple of length {} stacked with tuple of length {}",
                                head.len(),
                                tuple.len()
                            ),
                        });
                    }
                    for (column, v) in columns.iter_mut().zip(tuple) {
                        column.push(v.clone());
                    }
                }
                Value::Tuple(
                    columns
                        .iter()
                        .map(|c| Value::stack(c, axis))
                        .collect::<Result<_>>()?,
                )
            }
            Value::Dict(head) => {
                let mut out = Dict::with_capacity(head.len());
                for key in head.keys() {
                    let column = items
                        .iter()
                        .map(|item| {
                            item.as_dict()
                                .and_then(|d| d.get(key))
                                .cloned()
                                .ok_or_else(|| LiftError::StructureMismatch {
                                    reason: format!("entry '{key}' missing from stacked dict"),
                                })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    out.insert(key.clone(), Value::stack(&column, axis)?);
                }
                if let Some(extra) = items
                    .iter()
                    .find(|item| item.as_dict().is_none_or(|d| d.len() != head.len()))
                {
                    return Err(mismatch("a dict with the same keys", extra));
                }
                Value::Dict(out)
            }
        })
    }

    /// Hash of the structure and leaf shapes, ignoring leaf contents.
    pub fn abstract_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher, false);
        hasher.finish()
    }

    /// Hash of the structure, shapes and leaf contents.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher, true);
        hasher.finish()
    }

    fn hash_into(&self, state: &mut DefaultHasher, with_data: bool) {
        match self {
            Value::Array(t) => {
                0u8.hash(state);
                t.shape().hash(state);
                if with_data {
                    t.data().iter().for_each(|x| x.to_bits().hash(state));
                }
            }
            Value::Keys(k) => {
                1u8.hash(state);
                k.shape().hash(state);
                if with_data {
                    k.data().hash(state);
                }
            }
            Value::Tuple(items) => {
                2u8.hash(state);
                items.len().hash(state);
                items.iter().for_each(|v| v.hash_into(state, with_data));
            }
            Value::Dict(d) => {
                3u8.hash(state);
                d.len().hash(state);
                for (k, v) in d {
                    k.hash(state);
                    v.hash_into(state, with_data);
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Array(_) => "array",
            Value::Keys(_) => "key array",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> LiftError {
    LiftError::StructureMismatch {
        reason: format!("expected {expected}, found {}", found.kind()),
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Array(t)
    }
}

impl From<KeyArray> for Value {
    fn from(k: KeyArray) -> Self {
        Value::Keys(k)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::scalar(x)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}
