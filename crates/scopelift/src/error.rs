//! Error types for scopelift.

use std::collections::BTreeSet;

use thiserror::Error;

/// Errors raised by dense array operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TensorError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Index out of bounds.
    #[error("index out of bounds: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfBounds { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// Axis does not exist for a tensor of the given rank.
    #[error("axis {axis} is out of bounds for tensor of rank {ndim}")]
    AxisOutOfBounds { axis: usize, ndim: usize },

    /// Two tensors that must agree in shape do not.
    #[error("incompatible shapes: {expected:?} vs {actual:?}")]
    IncompatibleShapes {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Stacking requires at least one tensor.
    #[error("cannot stack an empty sequence of tensors")]
    EmptyStack,

    /// Operation requires a rank-0 tensor.
    #[error("expected a scalar, got shape {shape:?}")]
    NotScalar { shape: Vec<usize> },
}

/// Errors raised by scopes, the pack adapter and the lifted transforms.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LiftError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// The scope (or one of its ancestors) was invalidated.
    #[error("scope {path} is no longer valid")]
    InvalidScope { path: String },

    /// The scope outlived the transform call that created it.
    #[error("scope {path} was created at trace level {created} but used at trace level {current}")]
    TraceLevelMismatch {
        path: String,
        created: u64,
        current: u64,
    },

    /// Mutated collections that no output filter selects.
    #[error("unmapped output variables: {collections:?}")]
    UnmappedOutputVariables { collections: Vec<String> },

    /// Scopes handed back to `repack` do not have the structure of the input.
    #[error("inner scope paths {inner:?} do not match outer scope paths {outer:?}")]
    ScopePathMismatch {
        outer: Vec<String>,
        inner: Vec<String>,
    },

    /// A per-scope input had the wrong number of entries.
    #[error("expected state for {expected} scopes, got {actual}")]
    ScopeCountMismatch { expected: usize, actual: usize },

    #[error("Inconsistent batch axis sizes: {sizes:?}")]
    InconsistentAxisSizes { sizes: BTreeSet<usize> },

    #[error("axis_size should be specified manually")]
    AxisSizeUnspecified,

    #[error("Inconsistent scan lengths: {lengths:?}")]
    InconsistentScanLengths { lengths: BTreeSet<usize> },

    #[error("length should be specified manually")]
    LengthUnspecified,

    #[error("{transform} does not support multi-scope lifting")]
    MultiScopeUnsupported { transform: &'static str },

    #[error("cannot update variable '{name}' in collection '{collection}': collection is immutable")]
    ImmutableCollection { collection: String, name: String },

    #[error("name '{name}' is already in use in scope {path}")]
    NameInUse { name: String, path: String },

    #[error("no rng stream named '{name}' in scope {path}")]
    UnknownRng { name: String, path: String },

    #[error("parameter '{name}' not found in scope {path} and 'params' is immutable")]
    ParamNotFound { name: String, path: String },

    /// A scope can only be seeded with a single key per stream.
    #[error("rng stream '{name}' must hold a single key, got shape {shape:?}")]
    RngNotScalar { name: String, shape: Vec<usize> },

    #[error("structure mismatch: {reason}")]
    StructureMismatch { reason: String },

    /// A variable path runs through a non-dict entry.
    #[error("entry '{segment}' in collection '{collection}' is not a nested dict")]
    PathConflict { collection: String, segment: String },

    #[error("zero-length {kind} is not supported")]
    EmptyAxis { kind: &'static str },

    #[error("nondiff_argnums entry {index} is out of range for {num_args} arguments")]
    InvalidNondiffArgnum { index: usize, num_args: usize },

    #[error("backward function returned {actual} gradients, expected {expected}")]
    GradientArity { expected: usize, actual: usize },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LiftError>;
