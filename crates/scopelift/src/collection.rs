//! Variable collections and their immutable snapshots.
//!
//! A collection is either a plain [`Dict`] owned by its scope or a
//! [`FrozenDict`] snapshot shared behind an `Rc`. Collections a transform only
//! reads are frozen before the payload sees them; `repack` skips frozen
//! collections when it harvests outputs.

use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{LiftError, Result};
use crate::tensor::KeyArray;
use crate::value::{Dict, Value};

/// Read-only snapshot of a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrozenDict(Rc<Dict>);

impl FrozenDict {
    pub fn new(dict: Dict) -> Self {
        Self(Rc::new(dict))
    }

    /// Copy the contents out into a fresh mutable dict.
    pub fn unfreeze(&self) -> Dict {
        (*self.0).clone()
    }

    /// Whether both snapshots share the same storage.
    pub fn ptr_eq(&self, other: &FrozenDict) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for FrozenDict {
    type Target = Dict;

    fn deref(&self) -> &Dict {
        &self.0
    }
}

/// A named variable collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Mutable(Dict),
    Frozen(FrozenDict),
}

impl Collection {
    /// An empty mutable collection.
    pub fn new() -> Self {
        Collection::Mutable(Dict::new())
    }

    pub fn dict(&self) -> &Dict {
        match self {
            Collection::Mutable(d) => d,
            Collection::Frozen(f) => f,
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Collection::Frozen(_))
    }

    pub fn is_empty(&self) -> bool {
        self.dict().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.dict().get(name)
    }

    /// Snapshot this collection. Already frozen collections keep their storage.
    pub fn freeze(self) -> Collection {
        match self {
            Collection::Mutable(d) => Collection::Frozen(FrozenDict::new(d)),
            frozen @ Collection::Frozen(_) => frozen,
        }
    }

    /// The contents as an owned mutable dict.
    pub fn into_dict(self) -> Dict {
        match self {
            Collection::Mutable(d) => d,
            Collection::Frozen(f) => f.unfreeze(),
        }
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Dict> for Collection {
    fn from(d: Dict) -> Self {
        Collection::Mutable(d)
    }
}

/// Collections keyed by name, in insertion order.
pub type VariableGroup = IndexMap<String, Collection>;

/// All collections of a scope.
pub type Variables = VariableGroup;

/// RNG stream keys keyed by stream name.
pub type RngGroup = IndexMap<String, KeyArray>;

/// Flatten a group into a nested `Dict` value. Frozen markers are dropped.
pub fn group_to_value(group: &VariableGroup) -> Value {
    Value::Dict(
        group
            .iter()
            .map(|(name, col)| (name.clone(), Value::Dict(col.dict().clone())))
            .collect(),
    )
}

/// Rebuild a group of mutable collections from [`group_to_value`] output.
pub fn group_from_value(value: Value) -> Result<VariableGroup> {
    value
        .into_dict()?
        .into_iter()
        .map(|(name, v)| Ok((name, Collection::Mutable(v.into_dict()?))))
        .collect()
}

pub fn rng_group_to_value(group: &RngGroup) -> Value {
    Value::Dict(
        group
            .iter()
            .map(|(name, keys)| (name.clone(), Value::Keys(keys.clone())))
            .collect(),
    )
}

pub fn rng_group_from_value(value: Value) -> Result<RngGroup> {
    value
        .into_dict()?
        .into_iter()
        .map(|(name, v)| Ok((name, v.into_keys()?)))
        .collect()
}

/// Look up a nested dict along `path`, or `None` if any segment is missing.
pub(crate) fn subtree<'a>(dict: &'a Dict, path: &[String]) -> Option<&'a Dict> {
    path.iter()
        .try_fold(dict, |d, segment| d.get(segment).and_then(Value::as_dict))
}

/// Mutable lookup along `path`, creating empty dicts for missing segments.
pub(crate) fn subtree_mut<'a>(
    collection: &str,
    dict: &'a mut Dict,
    path: &[String],
) -> Result<&'a mut Dict> {
    let mut current = dict;
    for segment in path {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Dict(Dict::new()));
        current = match entry {
            Value::Dict(d) => d,
            _ => {
                return Err(LiftError::PathConflict {
                    collection: collection.to_string(),
                    segment: segment.clone(),
                });
            }
        };
    }
    Ok(current)
}
