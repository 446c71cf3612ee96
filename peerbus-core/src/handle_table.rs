//! The handle-table collaborator (spec §1, §6).
//!
//! Resolves a sender's opaque [`HandleId`]s into shared [`NodeId`]s, and
//! installs the destination-side translations a handle transfer produces.
//! Kept separate from [`crate::peer::Peer`] — unlike the queue/pool/dropped
//! counter, a handle table is shared registry-wide, not owned per peer.

use alloc::vec::Vec;

use peerbus_abi::{HandleId, NodeId, PeerId};

use crate::error::Error;

/// The nodes a transfer set resolved to, in the same order the sender's
/// `HandleId` array was given.
///
/// Produced by [`HandleTable::transfer_import`]; consumed by one of
/// [`HandleTable::inflight_instantiate`] (when a destination has never seen
/// any of these nodes before) or [`HandleTable::dest_export`] (when it has).
#[derive(Debug, Clone, Default)]
pub struct TransferSet {
    nodes: Vec<NodeId>,
}

impl TransferSet {
    /// Wrap a resolved node list. Called by [`HandleTable::transfer_import`]
    /// implementations.
    pub fn new(nodes: Vec<NodeId>) -> Self {
        TransferSet { nodes }
    }

    /// The resolved nodes, in transfer order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Destination-local handle IDs installed for a transfer set, not yet
/// visible to the destination's user space until the message that carries
/// them commits (spec §4.4's "inflight" installation).
#[derive(Debug, Clone, Default)]
pub struct InflightSet {
    handles: Vec<HandleId>,
}

impl InflightSet {
    /// Wrap a list of newly allocated, not-yet-visible destination handle
    /// IDs. Called by [`HandleTable::inflight_instantiate`] implementations.
    pub fn new(handles: Vec<HandleId>) -> Self {
        InflightSet { handles }
    }

    /// The inflight destination handle IDs, in transfer order.
    pub fn handles(&self) -> &[HandleId] {
        &self.handles
    }
}

/// A resolved destination handle together with the node it denotes.
///
/// Returned by [`HandleTable::dest_import`]: the local ID the destination
/// already has bound to this node, plus the node identity itself so commit
/// can decide whether a transfer set shares nodes with the destination
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// The node the destination handle denotes.
    pub node: NodeId,
    /// The destination-local handle ID already bound to that node.
    pub local_id: HandleId,
}

/// Handle-table operations the transaction core drives (spec §6).
///
/// A sender's `HandleId`s are meaningless outside the sender; every
/// operation here takes the sender's peer identity so the table can
/// resolve within the right namespace.
pub trait HandleTable: Send + Sync {
    /// Resolve `count` handle IDs read from the sender's transfer array
    /// into their underlying nodes, incrementing each node's outstanding
    /// reference count for the duration of the transaction (spec §4.1
    /// step 3).
    fn transfer_import(
        &self,
        sender: PeerId,
        ids: &[HandleId],
        count: usize,
    ) -> Result<TransferSet, Error>;

    /// Release the reference counts [`HandleTable::transfer_import`] took,
    /// without installing anything. Used on a construction failure and,
    /// for inflight sets that never commit, as rollback (spec §4.4,
    /// §5 teardown).
    fn transfer_destroy(&self, set: TransferSet);

    /// Resolve the sender's destination handle ID into the node it
    /// denotes, together with that destination peer's own local binding
    /// (spec §4.1 step 2).
    fn dest_import(&self, sender: PeerId, handle_id: HandleId) -> Result<(PeerId, Binding), Error>;

    /// Allocate destination-local handle IDs for `set`'s nodes against
    /// `dest`, not yet visible to user space (spec §4.4 step "instantiate
    /// inflight"). Used the first time a destination observes a given
    /// transfer set of nodes it has no existing binding for.
    fn inflight_instantiate(&self, dest: PeerId, set: &TransferSet) -> Result<InflightSet, Error>;

    /// Release a previously instantiated inflight set against `dest`
    /// without ever making it visible — the destination-side mirror of
    /// [`HandleTable::transfer_destroy`], used when the message that would
    /// have installed it never commits (spec §4.5 teardown, "release its
    /// ... handle references").
    fn inflight_destroy(&self, inflight: InflightSet, dest: PeerId);

    /// Make a previously instantiated inflight set visible to `dest`'s
    /// user space, and drop the reference counts
    /// [`HandleTable::transfer_import`] took for `sender` (spec §4.3
    /// Phase 3, handle commit).
    fn inflight_install(
        &self,
        inflight: InflightSet,
        dest: PeerId,
        set: TransferSet,
        sender: PeerId,
    );

    /// Resolve `binding` against `dest`'s existing handle table entries and
    /// return the destination-local handle ID to stamp into the slice
    /// header (spec §4.3 Phase 3, node commit).
    fn dest_export(&self, binding: Binding, dest: PeerId, t: peerbus_abi::Timestamp) -> HandleId;
}
