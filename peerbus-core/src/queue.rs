//! The per-peer queue collaborator (spec §1, §6).
//!
//! Out of scope for this crate to implement — a destination's queue is
//! owned by whatever embeds the transaction core — but the core needs a
//! concrete node type to hand a [`Queue`] implementation so ordering state
//! can live somewhere between Phase 1 staging and Phase 3 commit.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use spinning_top::Spinlock;

use peerbus_abi::Timestamp;

/// Allocates node identities independently of any peer's logical clock.
///
/// Instantiating a destination must never itself advance that peer's
/// clock — only Phase 1 of commit (spec §4.3) may do that — so node
/// identity is drawn from its own counter rather than a `tick()` call.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// The lifecycle state of one queue node, mirroring spec §3's
/// `{unlinked, staged, committed, removed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueNodeState {
    /// Never staged.
    Unlinked,
    /// Staged at the given timestamp, not yet committed.
    Staged(Timestamp),
    /// Committed at the given timestamp.
    Committed(Timestamp),
    /// Removed by the destination (queue reset) before commit.
    Removed,
}

/// A node representing one message's slot in a destination's queue.
///
/// Owned by the [`crate::message::Message`] it belongs to; a concrete
/// [`Queue`] implementation mutates it through `stage`/`commit`/`remove`
/// and tracks it in whatever ordered structure it uses internally (a
/// `BTreeMap<Timestamp, _>`, a linked list, ...). The node's own identity
/// (`id`) is what an implementation keys that structure on.
pub struct QueueNode {
    id: u64,
    state: Spinlock<QueueNodeState>,
}

impl QueueNode {
    /// Create a fresh, unlinked node with a freshly allocated identity.
    ///
    /// The identity only needs to be unique within one destination's queue;
    /// it comes from [`NEXT_NODE_ID`], not from the destination's clock.
    pub fn new() -> Arc<Self> {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(QueueNode {
            id,
            state: Spinlock::new(QueueNodeState::Unlinked),
        })
    }

    /// This node's identity within its destination's queue.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The node's current lifecycle state.
    pub fn state(&self) -> QueueNodeState {
        *self.state.lock()
    }

    /// Overwrite the node's state. Called by [`Queue`] implementations only.
    pub fn set_state(&self, state: QueueNodeState) {
        *self.state.lock() = state;
    }

    /// Whether the node is still staged or committed (as opposed to
    /// unlinked or removed).
    pub fn is_queued(&self) -> bool {
        matches!(
            *self.state.lock(),
            QueueNodeState::Staged(_) | QueueNodeState::Committed(_)
        )
    }
}

/// Operations a destination's message queue must support (spec §6).
///
/// `tick`/`sync` are the destination's Lamport clock; `stage`/`commit`
/// order and reveal one node; `remove` tears one down. Implementations
/// must order staged/committed nodes strictly by timestamp (spec §5).
pub trait Queue: Send + Sync {
    /// Advance this destination's clock to a fresh value and return it.
    ///
    /// The returned value must always be even: [`peerbus_abi::Timestamp`]'s
    /// low bit distinguishes staging from committed, and every commit
    /// timestamp this crate assigns comes straight from a `tick()` call
    /// (spec §4.3 Phase 1). An implementation backed by
    /// [`crate::clock::LogicalClock`] gets this for free; a hand-rolled one
    /// must preserve it.
    fn tick(&self) -> u64;

    /// Advance this destination's clock to at least `t`, returning the
    /// resulting value.
    fn sync(&self, t: u64) -> u64;

    /// Stage `node` at timestamp `t` (a staging timestamp, low bit set).
    /// Returns whether staging made the node newly visible to a waiter.
    fn stage(&self, node: &Arc<QueueNode>, t: Timestamp) -> bool;

    /// Promote `node` to committed at timestamp `t` (low bit clear).
    /// Returns whether this made the message visible at the head of the
    /// queue. A no-op (returns `false`) if the node was already removed.
    fn commit(&self, node: &Arc<QueueNode>, t: Timestamp) -> bool;

    /// Unlink `node` if it is currently staged or committed. Returns
    /// whether it was actually queued (and therefore removed).
    fn remove(&self, node: &Arc<QueueNode>) -> bool;

    /// Whether `node` is currently staged or committed.
    fn node_is_queued(&self, node: &Arc<QueueNode>) -> bool {
        node.is_queued()
    }
}
