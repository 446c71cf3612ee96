//! The per-peer pool collaborator (spec §1, §6).
//!
//! A shared memory arena a destination owns; the core only ever asks it to
//! allocate a slice sized for one message, copy the sender's vectors into
//! it, stamp header fields, and free it again. Backpressure is expressed
//! entirely through `allocate` refusing (spec §5's "pool-allocation
//! failure" is the only flow-control signal this subsystem has).

use alloc::vec::Vec;

use peerbus_abi::SliceHeader;

use crate::error::Error;

/// An owned region of a destination's pool holding one message's payload.
///
/// Opaque outside the [`Pool`] implementation that allocated it — the core
/// only ever round-trips this value back to the same pool.
pub struct Slice {
    id: u64,
    len: usize,
}

impl Slice {
    /// Construct a slice handle. Called by [`Pool::allocate`] implementations.
    pub fn new(id: u64, len: usize) -> Self {
        Slice { id, len }
    }

    /// The pool-assigned identity of this slice.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The slice's payload capacity in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the slice holds zero payload bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A destination's pool-backed payload arena (spec §6).
pub trait Pool: Send + Sync {
    /// Reserve a slice able to hold `size` payload bytes plus one
    /// [`SliceHeader`]. Refusal (e.g. the arena is full) is the
    /// subsystem's sole backpressure signal — see spec §4.2 step 4.
    fn allocate(&self, size: usize) -> Result<Slice, Error>;

    /// Copy `vecs` (totalling `total_len` bytes) into `slice` starting at
    /// `offset`, using whatever pool-aware copy primitive the destination
    /// provides (spec §4.2 step 5).
    fn write_vectors(
        &self,
        slice: &Slice,
        offset: usize,
        vecs: &[Vec<u8>],
        total_len: usize,
    ) -> Result<(), Error>;

    /// Stamp the slice header (sender credentials translated into the
    /// destination's namespaces, spec §4.2 step 7).
    fn write_header(&self, slice: &Slice, header: SliceHeader);

    /// Stamp the destination-local ID of the message's target node into
    /// the slice header (spec §4.3 Phase 3).
    fn stamp_destination(&self, slice: &Slice, destination_id: u64);

    /// Release a previously allocated slice.
    fn deallocate(&self, slice: Slice);
}
