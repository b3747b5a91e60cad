//! Node identities, item keys, and the cached value holder.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use weft_common::{ContentHash, Fingerprint};

use crate::error::PassError;

/// Bound satisfied by every value that flows through a pipeline.
///
/// Values are compared structurally: `PartialEq` decides early cutoff and
/// `Hash` feeds the fingerprint. The two must agree.
pub trait Value: Clone + PartialEq + Hash + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + PartialEq + Hash + Send + Sync + 'static {}

/// Type-erased value as stored in the graph and the cache.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// The position of a node in the pipeline graph.
///
/// Nodes are numbered in creation order, which is also a valid topological
/// order: a node can only reference nodes created before it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a `NodeId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this node.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The stable identity of one item within a node.
///
/// Keys survive edits to the item's content, so removing one input never
/// renumbers the others. Source items derive their key from the input
/// identity; `map`, `filter`, and `combine` keep the upstream key; groups use
/// the digest of the group key; single-valued nodes use [`ItemKey::UNIT`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ItemKey(u128);

impl ItemKey {
    /// The key of the only item of a single-valued node.
    pub const UNIT: ItemKey = ItemKey(0);

    /// Derives a key from any hashable identity.
    pub fn of<T: Hash + ?Sized>(identity: &T) -> Self {
        Self(ContentHash::of(identity).as_u128())
    }

    pub(crate) fn digest(self) -> ContentHash {
        ContentHash::from_u128(self.0)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", (self.0 >> 96) as u32)
    }
}

/// One computed value together with the identity it was derived from.
///
/// ValueNodes are read-only views handed out by the driver; the value itself
/// is shared with the cache and never mutated.
#[derive(Debug)]
pub struct ValueNode<T> {
    /// The node that produced the value.
    pub node: NodeId,
    /// The stable key of the item within that node.
    pub key: ItemKey,
    /// Structural digest of the value.
    pub fingerprint: Fingerprint,
    /// The value itself.
    pub value: Arc<T>,
}

impl<T> Clone for ValueNode<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            key: self.key,
            fingerprint: self.fingerprint,
            value: Arc::clone(&self.value),
        }
    }
}

/// One item of a node's output during a pass.
#[derive(Clone)]
pub(crate) struct Item {
    pub key: ItemKey,
    pub value: AnyValue,
    pub fingerprint: Fingerprint,
    /// Whether the fingerprint differs from the last committed pass.
    pub changed: bool,
}

impl<T: Value> ValueNode<T> {
    pub(crate) fn from_erased(
        node: NodeId,
        key: ItemKey,
        fingerprint: Fingerprint,
        value: &AnyValue,
    ) -> Result<Self, PassError> {
        let value = Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| type_mismatch::<T>(node))?;
        Ok(Self {
            node,
            key,
            fingerprint,
            value,
        })
    }
}

/// Borrows a type-erased value as `T`.
///
/// A mismatch means the graph or the cache holds a value of the wrong type,
/// which is an engine invariant violation rather than a panic.
pub(crate) fn downcast<T: 'static>(value: &AnyValue, node: NodeId) -> Result<&T, PassError> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| type_mismatch::<T>(node))
}

fn type_mismatch<T>(node: NodeId) -> PassError {
    PassError::InvariantViolation {
        node,
        message: format!(
            "stored value is not of the expected type `{}`",
            std::any::type_name::<T>()
        ),
    }
}
