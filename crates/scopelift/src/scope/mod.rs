//! Arena-backed scope trees.
//!
//! A scope tree lives in one [`ScopeArena`] shared by every handle into it.
//! Records refer to their parent by [`ScopeId`]; the parent link is only used
//! to rebuild paths and to propagate invalidation checks, never for ownership.
//!
//! ```text
//! Scope { arena: Rc<RefCell<ScopeArena>>, id }
//!                         │
//!                         ▼
//!   ScopeArena ── records: Vec<ScopeRecord>   (name, parent, children, rngs)
//!              ── variables: Variables        (root collections)
//!              ── mutable: Filter
//! ```
//!
//! Child scopes have no storage of their own: a child at path `["a", "b"]`
//! sees `collection["a"]["b"]` of every root collection.

mod structure;
pub mod trace;

pub use structure::ScopeStructure;

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::collection::{Collection, FrozenDict, Variables, subtree, subtree_mut};
use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::random::PrngKey;
use crate::value::Value;

/// Child names leading from a root to a scope.
pub type ScopePathNames = SmallVec<[String; 4]>;

/// Index of a scope record inside its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct ScopeRecord {
    name: Option<String>,
    parent: Option<ScopeId>,
    children: IndexMap<String, ScopeId>,
    rngs: IndexMap<String, PrngKey>,
    rng_counters: IndexMap<String, u64>,
    trace_level: u64,
    invalid: bool,
}

/// Storage shared by all scopes of one tree.
#[derive(Debug)]
pub struct ScopeArena {
    records: Vec<ScopeRecord>,
    variables: Variables,
    mutable: Filter,
}

impl ScopeArena {
    fn record(&self, id: ScopeId) -> &ScopeRecord {
        &self.records[id.0]
    }

    fn record_mut(&mut self, id: ScopeId) -> &mut ScopeRecord {
        &mut self.records[id.0]
    }

    fn path(&self, id: ScopeId) -> ScopePathNames {
        let mut names = ScopePathNames::new();
        let mut current = id;
        while let Some(parent) = self.record(current).parent {
            if let Some(name) = &self.record(current).name {
                names.push(name.clone());
            }
            current = parent;
        }
        names.reverse();
        names
    }

    fn path_text(&self, id: ScopeId) -> String {
        let root_name = self.records[0].name.as_deref().unwrap_or("");
        let mut text = format!("/{root_name}");
        for name in self.path(id) {
            if !text.ends_with('/') {
                text.push('/');
            }
            text.push_str(&name);
        }
        text
    }

    fn is_valid(&self, id: ScopeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            let record = self.record(c);
            if record.invalid {
                return false;
            }
            current = record.parent;
        }
        true
    }
}

/// Handle to one scope of an arena.
///
/// Handles are cheap to clone. Two handles are equal when they refer to the
/// same record of the same arena.
#[derive(Clone)]
pub struct Scope {
    arena: Rc<RefCell<ScopeArena>>,
    id: ScopeId,
}

impl Scope {
    /// Create an unnamed root scope.
    ///
    /// Collections selected by `mutable` are stored mutably; all others are
    /// frozen.
    ///
    /// # Example
    ///
    /// ```
    /// use scopelift::{Filter, PrngKey, Scope, Value};
    /// use indexmap::IndexMap;
    ///
    /// let rngs = IndexMap::from([("params".to_string(), PrngKey::new(0))]);
    /// let scope = Scope::new(Default::default(), rngs, Filter::All);
    /// let dense = scope.push("dense", false).unwrap();
    /// let w = dense.param("w", |key| Value::scalar(key.bits() as f64)).unwrap();
    /// assert_eq!(scope.variables()["params"].dict()["dense"].as_dict().unwrap()["w"], w);
    /// ```
    pub fn new(variables: Variables, rngs: IndexMap<String, PrngKey>, mutable: Filter) -> Scope {
        Self::build(None, variables, rngs, mutable)
    }

    /// Create a named root scope.
    pub fn with_name(
        name: impl Into<String>,
        variables: Variables,
        rngs: IndexMap<String, PrngKey>,
        mutable: Filter,
    ) -> Scope {
        Self::build(Some(name.into()), variables, rngs, mutable)
    }

    fn build(
        name: Option<String>,
        variables: Variables,
        rngs: IndexMap<String, PrngKey>,
        mutable: Filter,
    ) -> Scope {
        let variables = variables
            .into_iter()
            .map(|(col, c)| {
                let c = if mutable.matches(&col) {
                    Collection::Mutable(c.into_dict())
                } else {
                    c.freeze()
                };
                (col, c)
            })
            .collect();
        let rng_counters = rngs.keys().map(|k| (k.clone(), 0)).collect();
        let record = ScopeRecord {
            name,
            parent: None,
            children: IndexMap::new(),
            rngs,
            rng_counters,
            trace_level: trace::current_level(),
            invalid: false,
        };
        let arena = ScopeArena {
            records: vec![record],
            variables,
            mutable,
        };
        Scope {
            arena: Rc::new(RefCell::new(arena)),
            id: ScopeId(0),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.arena.borrow().record(self.id).name.clone()
    }

    /// Child names from the root to this scope.
    pub fn path(&self) -> ScopePathNames {
        self.arena.borrow().path(self.id)
    }

    /// Path rendered as `/root/child/...`, for messages.
    pub fn path_text(&self) -> String {
        self.arena.borrow().path_text(self.id)
    }

    pub fn parent(&self) -> Option<Scope> {
        let parent = self.arena.borrow().record(self.id).parent?;
        Some(self.handle(parent))
    }

    pub fn root(&self) -> Scope {
        self.handle(ScopeId(0))
    }

    pub fn is_root(&self) -> bool {
        self.id.0 == 0
    }

    fn handle(&self, id: ScopeId) -> Scope {
        Scope {
            arena: Rc::clone(&self.arena),
            id,
        }
    }

    /// Trace level this scope was created at.
    pub fn trace_level(&self) -> u64 {
        self.arena.borrow().record(self.id).trace_level
    }

    /// Fail if this scope is used outside the frame it was created in.
    pub fn validate_trace_level(&self) -> Result<()> {
        let created = self.trace_level();
        let current = trace::current_level();
        if created != current {
            return Err(LiftError::TraceLevelMismatch {
                path: self.path_text(),
                created,
                current,
            });
        }
        Ok(())
    }

    /// Mark this scope, and with it every descendant, unusable.
    pub fn invalidate(&self) {
        self.arena.borrow_mut().record_mut(self.id).invalid = true;
    }

    pub fn is_valid(&self) -> bool {
        self.arena.borrow().is_valid(self.id)
    }

    fn check_valid(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(LiftError::InvalidScope {
                path: self.path_text(),
            });
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        self.check_valid()?;
        self.validate_trace_level()
    }

    /// Create a child scope named `name`.
    ///
    /// With `reuse`, an existing child of the same name is returned instead of
    /// failing with [`LiftError::NameInUse`].
    pub fn push(&self, name: &str, reuse: bool) -> Result<Scope> {
        self.check_usable()?;
        let mut arena = self.arena.borrow_mut();
        if let Some(&existing) = arena.record(self.id).children.get(name) {
            if reuse {
                return Ok(self.handle(existing));
            }
            return Err(LiftError::NameInUse {
                name: name.to_string(),
                path: arena.path_text(self.id),
            });
        }
        let parent = arena.record(self.id);
        let rngs: IndexMap<String, PrngKey> = parent
            .rngs
            .iter()
            .map(|(stream, key)| (stream.clone(), key.fold_in_str(name)))
            .collect();
        let rng_counters = rngs.keys().map(|k| (k.clone(), 0)).collect();
        let record = ScopeRecord {
            name: Some(name.to_string()),
            parent: Some(self.id),
            children: IndexMap::new(),
            rngs,
            rng_counters,
            trace_level: parent.trace_level,
            invalid: false,
        };
        let id = ScopeId(arena.records.len());
        arena.records.push(record);
        arena
            .record_mut(self.id)
            .children
            .insert(name.to_string(), id);
        trace!(child = name, parent = %arena.path_text(self.id), "push scope");
        Ok(self.handle(id))
    }

    pub fn has_rng(&self, stream: &str) -> bool {
        self.arena.borrow().record(self.id).rngs.contains_key(stream)
    }

    pub fn rng_streams(&self) -> Vec<String> {
        self.arena.borrow().record(self.id).rngs.keys().cloned().collect()
    }

    /// Derive a fresh key from stream `stream`.
    ///
    /// Each call advances the stream's counter, so no two calls on the same
    /// scope return the same key.
    pub fn make_rng(&self, stream: &str) -> Result<PrngKey> {
        self.check_usable()?;
        let mut arena = self.arena.borrow_mut();
        let path = arena.path_text(self.id);
        let record = arena.record_mut(self.id);
        let base = *record.rngs.get(stream).ok_or_else(|| LiftError::UnknownRng {
            name: stream.to_string(),
            path,
        })?;
        let counter = record.rng_counters.entry(stream.to_string()).or_insert(0);
        *counter += 1;
        Ok(base.fold_in(*counter))
    }

    pub fn mutable(&self) -> Filter {
        self.arena.borrow().mutable.clone()
    }

    pub fn is_mutable_collection(&self, collection: &str) -> bool {
        self.arena.borrow().mutable.matches(collection)
    }

    /// Snapshot of every collection as seen from this scope.
    ///
    /// Collections keep the representation of the root collection. A
    /// collection with nothing stored at this scope's path appears empty.
    pub fn variables(&self) -> Variables {
        let arena = self.arena.borrow();
        let path = arena.path(self.id);
        arena
            .variables
            .iter()
            .map(|(col, c)| {
                let view = subtree(c.dict(), &path).cloned().unwrap_or_default();
                let view = match c {
                    Collection::Mutable(_) => Collection::Mutable(view),
                    Collection::Frozen(_) if path.is_empty() => c.clone(),
                    Collection::Frozen(_) => Collection::Frozen(FrozenDict::new(view)),
                };
                (col.clone(), view)
            })
            .collect()
    }

    pub fn get_variable(&self, collection: &str, name: &str) -> Option<Value> {
        let arena = self.arena.borrow();
        let path = arena.path(self.id);
        let c = arena.variables.get(collection)?;
        subtree(c.dict(), &path)?.get(name).cloned()
    }

    pub fn has_variable(&self, collection: &str, name: &str) -> bool {
        self.get_variable(collection, name).is_some()
    }

    /// Write `value` to `collection[name]` at this scope's path.
    ///
    /// # Errors
    ///
    /// Fails if the scope is invalid or used from the wrong trace frame, or if
    /// `collection` is not mutable.
    pub fn put_variable(&self, collection: &str, name: &str, value: Value) -> Result<()> {
        self.check_usable()?;
        if !self.is_mutable_collection(collection) {
            return Err(LiftError::ImmutableCollection {
                collection: collection.to_string(),
                name: name.to_string(),
            });
        }
        let mut arena = self.arena.borrow_mut();
        let path = arena.path(self.id);
        let c = arena
            .variables
            .entry(collection.to_string())
            .or_insert_with(Collection::new);
        let mut dict = std::mem::take(c).into_dict();
        let written = subtree_mut(collection, &mut dict, &path).map(|d| {
            d.insert(name.to_string(), value);
        });
        *c = Collection::Mutable(dict);
        written
    }

    /// Materialize this scope's path in every mutable collection.
    pub fn populate_collections(&self) -> Result<()> {
        self.check_valid()?;
        let mut arena = self.arena.borrow_mut();
        let path = arena.path(self.id);
        if path.is_empty() {
            return Ok(());
        }
        for (col, c) in arena.variables.iter_mut() {
            if let Collection::Mutable(dict) = c {
                subtree_mut(col, dict, &path)?;
            }
        }
        Ok(())
    }

    /// Get parameter `name`, initializing it from the `params` stream if absent.
    pub fn param(&self, name: &str, init: impl FnOnce(PrngKey) -> Value) -> Result<Value> {
        self.check_usable()?;
        if let Some(value) = self.get_variable("params", name) {
            return Ok(value);
        }
        if !self.is_mutable_collection("params") {
            return Err(LiftError::ParamNotFound {
                name: name.to_string(),
                path: self.path_text(),
            });
        }
        let value = init(self.make_rng("params")?);
        self.put_variable("params", name, value.clone())?;
        Ok(value)
    }

    /// Get `collection[name]`, initializing it with `init` if absent.
    pub fn variable(
        &self,
        collection: &str,
        name: &str,
        init: impl FnOnce() -> Value,
    ) -> Result<Value> {
        self.check_usable()?;
        if let Some(value) = self.get_variable(collection, name) {
            return Ok(value);
        }
        let value = init();
        self.put_variable(collection, name, value.clone())?;
        Ok(value)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.arena), state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.path_text())
            .field("valid", &self.is_valid())
            .finish()
    }
}
