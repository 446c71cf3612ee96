//! The per-destination message instance (spec §3, §4.2, §4.5).
//!
//! Owns everything one destination receives: a pool slice, inflight handle
//! translations, duplicated file descriptors, and a queue node. Undelivered
//! `Message`s tear themselves down on drop; [`Message::deliver`] switches a
//! message into a state where drop is a plain deallocation of Rust-side
//! bookkeeping, since ownership of everything it held has passed to the
//! destination permanently.

use alloc::sync::Arc;
use alloc::vec::Vec;

use peerbus_abi::{SliceHeader, Timestamp};

use crate::fd::FdHolder;
use crate::handle_table::{Binding, HandleTable, InflightSet};
use crate::peer::PeerRef;
use crate::pool::Slice;
use crate::queue::QueueNode;
use crate::userspace::UserPtr;

/// One destination's copy of a transaction's message.
pub struct Message {
    peer: PeerRef,
    binding: Binding,
    write_back: Option<UserPtr>,
    slice: Option<Slice>,
    inflight: Option<InflightSet>,
    handle_table: Arc<dyn HandleTable>,
    files: Vec<FdHolder>,
    node: Arc<QueueNode>,
    silent: bool,
    delivered: bool,
}

impl Message {
    /// Assemble a message from its constituent parts (spec §4.2 steps
    /// 3-8). `slice` is `None` when pool allocation was refused under
    /// `CONTINUE` (spec §4.2 step 4) — such a message can still be staged
    /// but is never committed (spec §3 invariant). `handle_table` is kept
    /// only so an abandoned instance can release its `inflight` set
    /// through [`HandleTable::inflight_destroy`] on teardown.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer: PeerRef,
        binding: Binding,
        write_back: Option<UserPtr>,
        slice: Option<Slice>,
        inflight: Option<InflightSet>,
        handle_table: Arc<dyn HandleTable>,
        files: Vec<FdHolder>,
        node: Arc<QueueNode>,
        silent: bool,
    ) -> Self {
        Message {
            peer,
            binding,
            write_back,
            slice,
            inflight,
            handle_table,
            files,
            node,
            silent,
            delivered: false,
        }
    }

    /// The destination peer this message belongs to.
    pub fn peer(&self) -> &PeerRef {
        &self.peer
    }

    /// The resolved node/handle binding this message targets.
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Where to write the resolved destination-local ID back, if any.
    pub fn write_back(&self) -> Option<UserPtr> {
        self.write_back
    }

    /// This message's queue node.
    pub fn node(&self) -> &Arc<QueueNode> {
        &self.node
    }

    /// Whether the `SILENT` flag was set — gates only the wakeup call,
    /// never ordering (spec §9 Open Question 2).
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether this instance has a payload slice. A sliceless message is
    /// the "dropped" outcome: it is staged for ordering but must never be
    /// promoted to committed (spec §3 invariant, §4.3 Phase 3).
    pub fn has_slice(&self) -> bool {
        self.slice.is_some()
    }

    /// Stamp the slice header's sender-identity fields, if a slice exists.
    pub fn write_header(&self, header: SliceHeader) {
        if let Some(slice) = &self.slice {
            self.peer.pool().write_header(slice, header);
        }
    }

    /// Take the inflight handle set, for installation at commit.
    pub fn take_inflight(&mut self) -> Option<InflightSet> {
        self.inflight.take()
    }

    /// Stamp the destination ID into the slice header, promote the queue
    /// node from staged to committed at `t`, and release the descriptors
    /// this message held into the destination's permanent ownership (spec
    /// §4.3 Phase 3 commit path).
    ///
    /// Marks the message delivered: drop no longer tears anything down.
    /// Wakes the peer itself if promotion made the message newly visible,
    /// unless `SILENT` was set (spec §9 Open Question 2).
    pub fn deliver(mut self, destination_id: u64, t: Timestamp) {
        let slice = self.slice.as_ref().expect("deliver called without a slice");
        self.peer.pool().stamp_destination(slice, destination_id);
        let woke = self.peer.queue().commit(&self.node, t);
        if woke && !self.silent {
            self.peer.wake();
        }
        for file in self.files.drain(..) {
            let _ = file.into_raw();
        }
        self.delivered = true;
    }

    /// Tear this instance down as a "dropped" outcome: release the slice
    /// (if any), remove the queue node if still present, and release file
    /// and inflight references (spec §3 invariant, §4.3 Phase 3 drop path,
    /// §4.5 teardown). Increments the destination's dropped counter and
    /// wakes the peer on the `0 -> 1` transition, unless `SILENT` was set.
    pub fn drop_as_undelivered(mut self) {
        self.teardown();
        if self.peer.increment_dropped() == 1 && !self.silent {
            self.peer.wake();
        }
    }

    fn teardown(&mut self) {
        if self.node.is_queued() {
            let woke = self.peer.queue().remove(&self.node);
            if woke && !self.silent {
                self.peer.wake();
            }
        }
        if let Some(slice) = self.slice.take() {
            self.peer.pool().deallocate(slice);
        }
        if let Some(inflight) = self.inflight.take() {
            self.handle_table.inflight_destroy(inflight, self.peer.id());
        }
        self.files.clear();
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if !self.delivered {
            self.teardown();
        }
    }
}
