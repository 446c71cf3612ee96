//! In-memory fakes for the five collaborator traits (spec.md §1, §6).
//!
//! Plays the same role `panda-kernel`'s `testing.rs` plays for its own
//! integration tests: a harness that lets the core's logic run end to end
//! without a real kernel underneath it. Nothing here is meant to be fast
//! or production-grade — only observable, so scenario tests can assert on
//! exactly what the staged-commit protocol did.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use peerbus_abi::{HandleId, NodeId, PeerId, RawFd, SliceHeader, Timestamp};
use peerbus_core::clock::LogicalClock;
use peerbus_core::error::Error;
use peerbus_core::fd::FdOwner;
use peerbus_core::handle_table::{Binding, HandleTable, InflightSet, TransferSet};
use peerbus_core::peer::{ActiveGuard, Peer, PeerRef, PeerRegistry};
use peerbus_core::pool::{Pool, Slice};
use peerbus_core::queue::{Queue, QueueNode, QueueNodeState};

/// A destination's pool-backed arena, bounded so tests can force a
/// pool-allocation refusal (spec.md S3).
pub struct FakePool {
    capacity: Option<usize>,
    inner: Mutex<PoolInner>,
    next_id: AtomicU64,
}

struct PoolInner {
    used: usize,
    slices: HashMap<u64, SliceRecord>,
}

struct SliceRecord {
    data: Vec<u8>,
    header: Option<SliceHeader>,
}

impl FakePool {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(None)
    }

    /// A pool that refuses any allocation once `capacity` bytes are in use.
    pub fn with_capacity(capacity: Option<usize>) -> Arc<Self> {
        Arc::new(FakePool {
            capacity,
            inner: Mutex::new(PoolInner {
                used: 0,
                slices: HashMap::new(),
            }),
            next_id: AtomicU64::new(0),
        })
    }

    /// Snapshot of every slice still held by this pool, for assertions.
    pub fn delivered(&self) -> Vec<(Vec<u8>, SliceHeader)> {
        let inner = self.inner.lock().unwrap();
        inner
            .slices
            .values()
            .filter_map(|rec| rec.header.map(|h| (rec.data.clone(), h)))
            .collect()
    }

    pub fn slice_count(&self) -> usize {
        self.inner.lock().unwrap().slices.len()
    }
}

impl Pool for FakePool {
    fn allocate(&self, size: usize) -> Result<Slice, Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cap) = self.capacity {
            if inner.used + size > cap {
                return Err(Error::PeerUnreachable);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        inner.used += size;
        inner.slices.insert(
            id,
            SliceRecord {
                data: vec![0u8; size],
                header: None,
            },
        );
        Ok(Slice::new(id, size))
    }

    fn write_vectors(
        &self,
        slice: &Slice,
        offset: usize,
        vecs: &[Vec<u8>],
        total_len: usize,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let rec = inner
            .slices
            .get_mut(&slice.id())
            .expect("write_vectors on unknown slice");
        if offset + total_len > rec.data.len() {
            return Err(Error::InvalidArgument);
        }
        let mut at = offset;
        for vec in vecs {
            rec.data[at..at + vec.len()].copy_from_slice(vec);
            at += vec.len();
        }
        Ok(())
    }

    fn write_header(&self, slice: &Slice, header: SliceHeader) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rec) = inner.slices.get_mut(&slice.id()) {
            rec.header = Some(header);
        }
    }

    fn stamp_destination(&self, slice: &Slice, destination_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rec) = inner.slices.get_mut(&slice.id()) {
            if let Some(header) = rec.header.as_mut() {
                header.destination_id = destination_id;
            }
        }
    }

    fn deallocate(&self, slice: Slice) {
        let mut inner = self.inner.lock().unwrap();
        if inner.slices.remove(&slice.id()).is_some() {
            inner.used = inner.used.saturating_sub(slice.len());
        }
    }
}

/// A destination's message queue: an ordered map from raw timestamp to
/// node id, plus the Lamport clock underneath `tick`/`sync`.
pub struct FakeQueue {
    clock: LogicalClock,
    entries: Mutex<BTreeMap<u64, u64>>,
    /// When set, the very next `stage` is immediately followed by a
    /// destination-triggered removal of that same node — there is no
    /// real concurrency in this harness, so this is how scenario tests
    /// simulate a queue-reset race landing between Phase 1 and Phase 3
    /// (spec.md S5) without actually running two threads.
    reset_on_next_stage: std::sync::atomic::AtomicBool,
}

impl FakeQueue {
    pub fn new(initial: u64) -> Self {
        FakeQueue {
            clock: LogicalClock::new(initial),
            entries: Mutex::new(BTreeMap::new()),
            reset_on_next_stage: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn arm_reset_on_next_stage(&self) {
        self.reset_on_next_stage.store(true, Ordering::Release);
    }

    fn current_head(entries: &BTreeMap<u64, u64>) -> Option<u64> {
        entries.keys().next().copied()
    }
}

impl Queue for FakeQueue {
    fn tick(&self) -> u64 {
        self.clock.tick()
    }

    fn sync(&self, t: u64) -> u64 {
        self.clock.sync(t)
    }

    fn stage(&self, node: &Arc<QueueNode>, t: Timestamp) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let old_head = Self::current_head(&entries);
        entries.insert(t.raw(), node.id());
        node.set_state(QueueNodeState::Staged(t));
        let woke = old_head.map_or(true, |head| t.raw() < head);
        if self
            .reset_on_next_stage
            .swap(false, Ordering::AcqRel)
        {
            entries.remove(&t.raw());
            node.set_state(QueueNodeState::Removed);
        }
        woke
    }

    fn commit(&self, node: &Arc<QueueNode>, t: Timestamp) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let old_raw = match node.state() {
            QueueNodeState::Staged(old) | QueueNodeState::Committed(old) => Some(old.raw()),
            QueueNodeState::Removed => return false,
            QueueNodeState::Unlinked => None,
        };
        let old_head = Self::current_head(&entries);
        if let Some(old_raw) = old_raw {
            entries.remove(&old_raw);
        }
        entries.insert(t.raw(), node.id());
        node.set_state(QueueNodeState::Committed(t));
        old_head.map_or(true, |head| t.raw() <= head)
    }

    fn remove(&self, node: &Arc<QueueNode>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let old_raw = match node.state() {
            QueueNodeState::Staged(t) | QueueNodeState::Committed(t) => t.raw(),
            QueueNodeState::Unlinked | QueueNodeState::Removed => return false,
        };
        let old_head = Self::current_head(&entries);
        let removed = entries.remove(&old_raw).is_some();
        node.set_state(QueueNodeState::Removed);
        removed && old_head == Some(old_raw)
    }
}

/// A single fake peer: a queue, a pool, a dropped counter and a wake tally.
pub struct FakePeer {
    id: PeerId,
    queue: FakeQueue,
    pool: Arc<FakePool>,
    dropped: AtomicU64,
    wakes: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl FakePeer {
    pub fn new_raw(id: PeerId, clock: u64, pool: Arc<FakePool>) -> Self {
        FakePeer {
            id,
            queue: FakeQueue::new(clock),
            pool,
            dropped: AtomicU64::new(0),
            wakes: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.load(Ordering::Acquire)
    }

    pub fn clock_value(&self) -> u64 {
        self.queue.clock.current()
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &Arc<FakePool> {
        &self.pool
    }

    /// Arm a one-shot queue reset: the next node staged on this peer is
    /// immediately removed again, simulating a destination resetting its
    /// queue in the window between Phase 1 staging and Phase 3 commit
    /// (spec.md S5).
    pub fn arm_reset_on_next_stage(&self) {
        self.queue.arm_reset_on_next_stage();
    }
}

impl Peer for FakePeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::AcqRel);
    }

    fn active_acquire(&self) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        let active = self.active.clone();
        ActiveGuard::new(move || {
            active.fetch_sub(1, Ordering::AcqRel);
        })
    }

    fn queue(&self) -> &dyn Queue {
        &self.queue
    }

    fn pool(&self) -> &dyn Pool {
        self.pool.as_ref()
    }

    fn increment_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Resolves a [`PeerId`] to the live [`PeerRef`] registered for it.
pub struct FakeRegistry {
    peers: Mutex<HashMap<PeerId, PeerRef>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRegistry {
            peers: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(&self, peer: PeerRef) {
        self.peers.lock().unwrap().insert(peer.id(), peer);
    }
}

impl PeerRegistry for FakeRegistry {
    fn resolve(&self, id: PeerId) -> Result<PeerRef, Error> {
        self.peers
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::HandleNotFound)
    }
}

/// A handle table simple enough to drive every scenario in spec.md §8: a
/// sender's transfer handles resolve through one map, a sender's
/// destination handles resolve through another. Both are keyed by
/// `(sender, handle_id)` since handle IDs are only meaningful within the
/// peer that issued them.
pub struct FakeHandleTable {
    transfer_handles: Mutex<HashMap<(PeerId, HandleId), NodeId>>,
    dest_handles: Mutex<HashMap<(PeerId, HandleId), PeerId>>,
    refcounts: Mutex<HashMap<NodeId, u64>>,
    installs: AtomicUsize,
    inflight_destroys: AtomicUsize,
}

impl FakeHandleTable {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeHandleTable {
            transfer_handles: Mutex::new(HashMap::new()),
            dest_handles: Mutex::new(HashMap::new()),
            refcounts: Mutex::new(HashMap::new()),
            installs: AtomicUsize::new(0),
            inflight_destroys: AtomicUsize::new(0),
        })
    }

    /// Register that `sender`'s `handle_id` transfers node `node`.
    pub fn register_transfer(&self, sender: PeerId, handle_id: HandleId, node: NodeId) {
        self.transfer_handles
            .lock()
            .unwrap()
            .insert((sender, handle_id), node);
    }

    /// Register that `sender`'s `handle_id` addresses peer `dest`.
    pub fn register_destination(&self, sender: PeerId, handle_id: HandleId, dest: PeerId) {
        self.dest_handles
            .lock()
            .unwrap()
            .insert((sender, handle_id), dest);
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::Acquire)
    }

    pub fn inflight_destroy_count(&self) -> usize {
        self.inflight_destroys.load(Ordering::Acquire)
    }

    pub fn outstanding_refs(&self, node: NodeId) -> u64 {
        *self.refcounts.lock().unwrap().get(&node).unwrap_or(&0)
    }
}

impl HandleTable for FakeHandleTable {
    fn transfer_import(
        &self,
        sender: PeerId,
        ids: &[HandleId],
        count: usize,
    ) -> Result<TransferSet, Error> {
        let table = self.transfer_handles.lock().unwrap();
        let mut nodes = Vec::with_capacity(count);
        for id in &ids[..count] {
            let node = *table.get(&(sender, *id)).ok_or(Error::HandleNotFound)?;
            nodes.push(node);
        }
        drop(table);
        let mut refcounts = self.refcounts.lock().unwrap();
        for node in &nodes {
            *refcounts.entry(*node).or_insert(0) += 1;
        }
        Ok(TransferSet::new(nodes))
    }

    fn transfer_destroy(&self, set: TransferSet) {
        let mut refcounts = self.refcounts.lock().unwrap();
        for node in set.nodes() {
            if let Some(count) = refcounts.get_mut(node) {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn dest_import(&self, sender: PeerId, handle_id: HandleId) -> Result<(PeerId, Binding), Error> {
        let dest = *self
            .dest_handles
            .lock()
            .unwrap()
            .get(&(sender, handle_id))
            .ok_or(Error::HandleNotFound)?;
        Ok((
            dest,
            Binding {
                node: dest as NodeId,
                local_id: dest as HandleId,
            },
        ))
    }

    fn inflight_instantiate(&self, _dest: PeerId, set: &TransferSet) -> Result<InflightSet, Error> {
        Ok(InflightSet::new(
            set.nodes().iter().map(|&n| n as HandleId).collect(),
        ))
    }

    fn inflight_destroy(&self, _inflight: InflightSet, _dest: PeerId) {
        self.inflight_destroys.fetch_add(1, Ordering::AcqRel);
    }

    fn inflight_install(
        &self,
        _inflight: InflightSet,
        _dest: PeerId,
        _set: TransferSet,
        _sender: PeerId,
    ) {
        // The sender-side reference is released exactly once, by
        // `commit::run`'s own trailing `transfer_destroy` call after every
        // destination has been installed — not here, or a multicast to N
        // destinations would over-release by `N - 1` references.
        self.installs.fetch_add(1, Ordering::AcqRel);
    }

    fn dest_export(&self, binding: Binding, _dest: PeerId, _t: Timestamp) -> HandleId {
        binding.local_id
    }
}

/// Duplicates and releases descriptors by bumping counters only — no real
/// file descriptors exist in these tests.
pub struct FakeFdOwner {
    duplicates: AtomicUsize,
    released: Mutex<Vec<RawFd>>,
}

impl FakeFdOwner {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeFdOwner {
            duplicates: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
        })
    }

    pub fn released(&self) -> Vec<RawFd> {
        self.released.lock().unwrap().clone()
    }
}

impl FdOwner for FakeFdOwner {
    fn duplicate(&self, fd: RawFd) -> Result<RawFd, Error> {
        self.duplicates.fetch_add(1, Ordering::AcqRel);
        Ok(fd)
    }

    fn release(&self, fd: RawFd) {
        self.released.lock().unwrap().push(fd);
    }
}

/// User-space import: every array a transaction reads is pre-registered
/// here under a `UserPtr` the test hands to `ConstructParams`.
pub struct FakeImporter {
    vecs: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    handle_ids: Mutex<HashMap<usize, Vec<HandleId>>>,
    fds: Mutex<HashMap<usize, Vec<RawFd>>>,
    destinations: Mutex<HashMap<usize, HandleId>>,
    faulty_writebacks: Mutex<HashSet<usize>>,
    written: Mutex<HashMap<usize, HandleId>>,
    next_ptr: AtomicUsize,
}

impl FakeImporter {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeImporter {
            vecs: Mutex::new(HashMap::new()),
            handle_ids: Mutex::new(HashMap::new()),
            fds: Mutex::new(HashMap::new()),
            destinations: Mutex::new(HashMap::new()),
            faulty_writebacks: Mutex::new(HashSet::new()),
            written: Mutex::new(HashMap::new()),
            next_ptr: AtomicUsize::new(1),
        })
    }

    fn fresh_ptr(&self) -> usize {
        self.next_ptr.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_vecs(&self, vecs: Vec<Vec<u8>>) -> usize {
        let ptr = self.fresh_ptr();
        self.vecs.lock().unwrap().insert(ptr, vecs);
        ptr
    }

    pub fn register_handle_ids(&self, ids: Vec<HandleId>) -> usize {
        let ptr = self.fresh_ptr();
        self.handle_ids.lock().unwrap().insert(ptr, ids);
        ptr
    }

    pub fn register_fds(&self, fds: Vec<RawFd>) -> usize {
        let ptr = self.fresh_ptr();
        self.fds.lock().unwrap().insert(ptr, fds);
        ptr
    }

    /// Register a destination handle id, returning the `idp` slot a test
    /// can pass to `link`/`commit_for_id` and later read back with
    /// [`FakeImporter::written`].
    pub fn register_destination(&self, handle_id: HandleId) -> usize {
        let ptr = self.fresh_ptr();
        self.destinations.lock().unwrap().insert(ptr, handle_id);
        ptr
    }

    /// Like [`FakeImporter::register_destination`], but every write-back
    /// to the returned `idp` fails with `Fault` (spec.md S4).
    pub fn register_faulty_destination(&self, handle_id: HandleId) -> usize {
        let ptr = self.register_destination(handle_id);
        self.faulty_writebacks.lock().unwrap().insert(ptr);
        ptr
    }

    pub fn written(&self, idp: usize) -> Option<HandleId> {
        self.written.lock().unwrap().get(&idp).copied()
    }
}

impl peerbus_core::userspace::Importer for FakeImporter {
    fn read_vectors(&self, ptr: usize, count: usize) -> Result<(Vec<Vec<u8>>, usize), Error> {
        if count == 0 {
            return Ok((Vec::new(), 0));
        }
        let vecs = self
            .vecs
            .lock()
            .unwrap()
            .get(&ptr)
            .cloned()
            .ok_or(Error::Fault)?;
        let total = vecs.iter().map(Vec::len).sum();
        Ok((vecs, total))
    }

    fn read_handle_ids(&self, ptr: usize, count: usize) -> Result<Vec<HandleId>, Error> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.handle_ids
            .lock()
            .unwrap()
            .get(&ptr)
            .cloned()
            .ok_or(Error::Fault)
    }

    fn read_fds(&self, ptr: usize, count: usize) -> Result<Vec<RawFd>, Error> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.fds.lock().unwrap().get(&ptr).cloned().ok_or(Error::Fault)
    }

    fn read_destination_id(&self, idp: usize) -> Result<HandleId, Error> {
        self.destinations
            .lock()
            .unwrap()
            .get(&idp)
            .copied()
            .ok_or(Error::Fault)
    }

    fn write_destination_id(&self, idp: usize, value: HandleId) -> Result<(), Error> {
        if self.faulty_writebacks.lock().unwrap().contains(&idp) {
            return Err(Error::Fault);
        }
        self.written.lock().unwrap().insert(idp, value);
        Ok(())
    }
}

/// Bundles one sender plus its shared collaborators, so scenario tests
/// read as "set up peers, link destinations, commit, assert".
pub struct Harness {
    pub registry: Arc<FakeRegistry>,
    pub handle_table: Arc<FakeHandleTable>,
    pub importer: Arc<FakeImporter>,
    pub fd_owner: Arc<FakeFdOwner>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            registry: FakeRegistry::new(),
            handle_table: FakeHandleTable::new(),
            importer: FakeImporter::new(),
            fd_owner: FakeFdOwner::new(),
        }
    }

    /// Create and register a fresh peer with its own bounded-or-unbounded
    /// pool and starting clock value. Returns the concrete type so tests
    /// can read its counters directly, alongside the `PeerRef` a
    /// transaction actually addresses.
    pub fn new_peer(
        &self,
        id: PeerId,
        clock: u64,
        pool_capacity: Option<usize>,
    ) -> (PeerRef, Arc<FakePeer>) {
        let pool = FakePool::with_capacity(pool_capacity);
        let concrete = Arc::new(FakePeer::new_raw(id, clock, pool));
        let peer_ref: PeerRef = concrete.clone();
        self.registry.register(peer_ref.clone());
        (peer_ref, concrete)
    }
}
