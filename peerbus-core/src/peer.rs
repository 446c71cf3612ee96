//! The peer registry collaborator (spec §1, §6).
//!
//! A peer is the unit the core addresses: it owns a queue, a pool, a
//! dropped-message counter, and the liveness guarantee that backs an
//! "active reference" (spec §5). Acquiring one keeps the peer alive and
//! blocks teardown until released — the same RAII shape as
//! `panda-kernel`'s `ProcessHandle` keeping a child's `ProcessInfo` alive
//! past exit.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::error::Error;
use crate::pool::Pool;
use crate::queue::Queue;

/// A scoped, shared reference to a peer, acquired for as long as this
/// transaction needs the peer to stay alive.
///
/// Dropping the guard releases the reference. Holding one never blocks;
/// it is teardown of the *peer* that blocks until every outstanding guard
/// is dropped (spec §5).
pub struct ActiveGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ActiveGuard {
    /// Wrap a release callback as a guard. Called by [`Peer::active_acquire`]
    /// implementations.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        ActiveGuard {
            release: Some(Box::new(release)),
        }
    }

    /// A guard that releases nothing — for peer implementations with no
    /// teardown-blocking semantics to enforce (e.g. test doubles).
    pub fn noop() -> Self {
        ActiveGuard { release: None }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// An endpoint the transaction core can deliver a message to.
///
/// The sender itself is also a `Peer` — Phase 0 of commit ticks the
/// sender's own clock the same way Phase 1 ticks each destination's.
pub trait Peer: Send + Sync {
    /// This peer's registry identity.
    fn id(&self) -> peerbus_abi::PeerId;

    /// Wake whatever is blocked waiting on this peer's queue.
    fn wake(&self);

    /// Acquire a shared active reference, keeping this peer alive and
    /// blocking its teardown until the guard drops.
    fn active_acquire(&self) -> ActiveGuard;

    /// This peer's message queue.
    fn queue(&self) -> &dyn Queue;

    /// This peer's pool-backed payload arena.
    fn pool(&self) -> &dyn Pool;

    /// Increment this peer's dropped-message counter and return the new
    /// value. A transition from `0` to `1` is the signal to wake the peer
    /// (spec §7, "Dropped" outcome).
    fn increment_dropped(&self) -> u64;
}

/// A shared, dynamically-dispatched handle to a live peer.
pub type PeerRef = Arc<dyn Peer>;

/// The peer registry collaborator (spec §1): issues live [`PeerRef`]s for
/// a [`peerbus_abi::PeerId`], the "deref" operation spec §6 lists
/// alongside `wake`/`active_acquire`/`active_release` — those three are
/// expressed here as methods on [`Peer`]/[`ActiveGuard`] directly, since
/// once a caller holds a `PeerRef` it already *is* the live object; only
/// the initial `PeerId -> PeerRef` translation needs a registry.
pub trait PeerRegistry: Send + Sync {
    /// Resolve `id` into a live peer reference. Fails with
    /// [`Error::HandleNotFound`] if the peer no longer exists (spec §4.2
    /// step 1 folds this into destination resolution).
    fn resolve(&self, id: peerbus_abi::PeerId) -> Result<PeerRef, Error>;
}
