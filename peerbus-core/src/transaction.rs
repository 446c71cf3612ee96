//! The transaction object (spec §3, §4.1, §4.5).
//!
//! The caller-local container a sender builds once, links every
//! destination into, and commits or drops. Owns everything imported from
//! user space until it is either consumed by a successful commit or torn
//! down on any other exit path.

use alloc::sync::Arc;
use alloc::vec::Vec;

use peerbus_abi::{HandleId, SendFlags, FD_MAX, VEC_MAX};

use crate::commit;
use crate::destination::Destination;
use crate::error::Error;
use crate::fd::{FdHolder, FdOwner};
use crate::handle_table::{HandleTable, TransferSet};
use crate::identity::SenderIdentity;
use crate::message::Message;
use crate::peer::{PeerRef, PeerRegistry};
use crate::userspace::{Importer, UserPtr};

/// Everything `construct` needs from user space besides the collaborators
/// themselves: the descriptor arrays and the recognised flag bits (spec
/// §6).
pub struct ConstructParams {
    /// User-space array of `(base, len)` byte-vector descriptors.
    pub ptr_vecs: UserPtr,
    /// Number of entries at `ptr_vecs`; must not exceed [`VEC_MAX`].
    pub n_vecs: usize,
    /// User-space array of handle IDs to transfer.
    pub ptr_handles: UserPtr,
    /// Number of entries at `ptr_handles`.
    pub n_handles: usize,
    /// User-space array of file-descriptor integers.
    pub ptr_fds: UserPtr,
    /// Number of entries at `ptr_fds`; must not exceed [`FD_MAX`].
    pub n_fds: usize,
    /// Recognised send flags (`CONTINUE`, `SILENT`).
    pub flags: SendFlags,
}

/// A scoped, caller-local multicast message under construction.
pub struct Transaction {
    sender: PeerRef,
    identity: SenderIdentity,
    flags: SendFlags,
    handle_table: Arc<dyn HandleTable>,
    registry: Arc<dyn PeerRegistry>,
    importer: Arc<dyn Importer>,
    length_vecs: usize,
    vecs: Vec<Vec<u8>>,
    files: Vec<FdHolder>,
    transfer_set: Option<TransferSet>,
    entries: Vec<Message>,
}

impl Transaction {
    /// Import everything from user space and build a fresh transaction
    /// (spec §4.1). `identity` is the sender's credential/PID/TID
    /// snapshot, taken exactly once by the caller (spec §9) — this crate
    /// has no collaborator of its own for reading "current task"
    /// credentials.
    pub fn construct(
        sender: PeerRef,
        handle_table: Arc<dyn HandleTable>,
        registry: Arc<dyn PeerRegistry>,
        importer: Arc<dyn Importer>,
        fd_owner: Arc<dyn FdOwner>,
        identity: SenderIdentity,
        params: ConstructParams,
    ) -> Result<Self, Error> {
        if params.n_vecs > VEC_MAX || params.n_fds > FD_MAX {
            return Err(Error::InvalidArgument);
        }

        let (vecs, length_vecs) = importer.read_vectors(params.ptr_vecs, params.n_vecs)?;

        let handle_ids = match importer.read_handle_ids(params.ptr_handles, params.n_handles) {
            Ok(ids) => ids,
            Err(err) => return Err(err),
        };
        let transfer_set =
            handle_table.transfer_import(sender.id(), &handle_ids, params.n_handles)?;

        let raw_fds = match importer.read_fds(params.ptr_fds, params.n_fds) {
            Ok(raw) => raw,
            Err(err) => {
                handle_table.transfer_destroy(transfer_set);
                return Err(err);
            }
        };
        let files = raw_fds
            .into_iter()
            .map(|fd| FdHolder::new(fd, fd_owner.clone()))
            .collect();

        log::debug!(
            "transaction constructed: sender={} n_vecs={} n_fds={} n_handles={} length_vecs={}",
            sender.id(),
            params.n_vecs,
            params.n_fds,
            params.n_handles,
            length_vecs,
        );

        Ok(Transaction {
            sender,
            identity,
            flags: params.flags,
            handle_table,
            registry,
            importer,
            length_vecs,
            vecs,
            files,
            transfer_set: Some(transfer_set),
            entries: Vec::new(),
        })
    }

    /// Number of destinations linked so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve one destination and instantiate its message (spec §4.2).
    fn instantiate(&mut self, idp: UserPtr, want_write_back: bool) -> Result<Message, Error> {
        let handle_id: HandleId = self.importer.read_destination_id(idp)?;
        let (dest_peer_id, binding) = self
            .handle_table
            .dest_import(self.sender.id(), handle_id)?;
        let peer = self.registry.resolve(dest_peer_id)?;

        let _active = peer.active_acquire();

        let write_back = if want_write_back { Some(idp) } else { None };
        let destination = Destination::new(peer.clone(), binding, write_back);

        let node = crate::queue::QueueNode::new();

        let payload_len = self.length_vecs as u64;
        let slice = match peer.pool().allocate(self.vecs.iter().map(Vec::len).sum()) {
            Ok(slice) => {
                if let Err(err) = peer
                    .pool()
                    .write_vectors(&slice, 0, &self.vecs, self.length_vecs)
                {
                    peer.pool().deallocate(slice);
                    return Err(err);
                }
                let header = peerbus_abi::SliceHeader::new(
                    self.identity.uid,
                    self.identity.gid,
                    self.identity.pid,
                    self.identity.tid,
                    payload_len,
                );
                peer.pool().write_header(&slice, header);
                Some(slice)
            }
            Err(err) => {
                if self.flags.is_continue() {
                    None
                } else {
                    return Err(err);
                }
            }
        };

        let inflight = match &self.transfer_set {
            Some(set) if !set.is_empty() => {
                match self.handle_table.inflight_instantiate(dest_peer_id, set) {
                    Ok(inflight) => Some(inflight),
                    Err(err) => {
                        if let Some(slice) = slice {
                            peer.pool().deallocate(slice);
                        }
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        let files = match self
            .files
            .iter()
            .map(FdHolder::duplicate)
            .collect::<Result<Vec<_>, Error>>()
        {
            Ok(files) => files,
            Err(err) => {
                if let Some(slice) = slice {
                    peer.pool().deallocate(slice);
                }
                if let Some(inflight) = inflight {
                    self.handle_table.inflight_destroy(inflight, dest_peer_id);
                }
                return Err(err);
            }
        };

        let (peer, binding, write_back) = destination.into_parts();
        let message = Message::new(
            peer,
            binding,
            write_back,
            slice,
            inflight,
            self.handle_table.clone(),
            files,
            node,
            self.flags.is_silent(),
        );

        drop(_active);
        Ok(message)
    }

    /// Instantiate a destination and, on success, link it into this
    /// transaction (spec §4.2's `link`). Every intended destination must
    /// be linked before [`Transaction::commit`].
    pub fn link(&mut self, idp: UserPtr, want_write_back: bool) -> Result<(), Error> {
        let message = self.instantiate(idp, want_write_back)?;
        self.entries.push(message);
        Ok(())
    }

    /// Run the two-phase staged commit over every linked destination
    /// (spec §4.3), consuming the transaction.
    pub fn commit(mut self) -> Result<(), Error> {
        let list = core::mem::take(&mut self.entries);
        let transfer_set = self.transfer_set.take();
        let result = commit::run(
            &self.sender,
            self.handle_table.as_ref(),
            self.importer.as_ref(),
            transfer_set,
            list,
            true,
        );
        // `entries` and `transfer_set` are now empty/`None`; `Drop` sees a
        // fully torn-down transaction and has nothing left to release.
        result
    }

    /// The single-destination fast path (spec §4.4): `instantiate` plus a
    /// simplified commit that takes the destination's own fresh tick,
    /// with no sender-side pre-reserved timestamp.
    pub fn commit_for_id(mut self, idp: UserPtr) -> Result<(), Error> {
        let message = self.instantiate(idp, true)?;
        let transfer_set = self.transfer_set.take();
        commit::run(
            &self.sender,
            self.handle_table.as_ref(),
            self.importer.as_ref(),
            transfer_set,
            alloc::vec![message],
            false,
        )
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::debug!(
                "transaction teardown: releasing {} unlinked-or-uncommitted entries",
                self.entries.len()
            );
        }
        // Each `Message`'s own `Drop` tears down its slice, queue node,
        // files and inflight set; this just needs to let the vector drain.
        self.entries.clear();
        if let Some(set) = self.transfer_set.take() {
            self.handle_table.transfer_destroy(set);
        }
        // `self.files` (unconsumed file holders) drop and release
        // themselves via `FdHolder`'s own `Drop`.
    }
}
