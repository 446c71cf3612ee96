//! The user-space import collaborator (spec §1, §4.1, §6).
//!
//! Everything this crate reads from or writes back to the caller goes
//! through this trait — there is no raw pointer dereference anywhere in
//! `peerbus-core`. Modelled on `panda-kernel`'s `UserAccess`/`UserSlice`
//! split in `syscall/user_ptr.rs`: that type also turns "read user memory,
//! possibly faulting" into a fallible call an embedder implements against
//! its own page tables, rather than something the core does unsupervised.

use alloc::vec::Vec;

use peerbus_abi::{HandleId, RawFd};

use crate::error::Error;

/// An opaque user-space address. The core never interprets this value —
/// it only ever passes one back to the [`Importer`] that handed it out.
pub type UserPtr = usize;

/// Copies transaction inputs from the caller and writes resolved
/// destination IDs back.
pub trait Importer: Send + Sync {
    /// Read `count` `(base, len)` byte-vector descriptors starting at
    /// `ptr`, validating each and returning the imported vectors together
    /// with their total length (spec §4.1 step 3).
    ///
    /// Implementations must fail with [`Error::InvalidArgument`] on
    /// arithmetic overflow summing lengths, and must themselves enforce
    /// `count <= peerbus_abi::VEC_MAX`.
    fn read_vectors(&self, ptr: UserPtr, count: usize) -> Result<(Vec<Vec<u8>>, usize), Error>;

    /// Read `count` 64-bit handle IDs starting at `ptr` (spec §4.1 step 4).
    fn read_handle_ids(&self, ptr: UserPtr, count: usize) -> Result<Vec<HandleId>, Error>;

    /// Read `count` file-descriptor integers starting at `ptr` and obtain
    /// an owning reference to each (spec §4.1 step 5).
    ///
    /// Implementations must themselves enforce `count <=
    /// peerbus_abi::FD_MAX`.
    fn read_fds(&self, ptr: UserPtr, count: usize) -> Result<Vec<RawFd>, Error>;

    /// Read the single destination handle ID pointed to by `idp` (spec
    /// §4.2 step 1).
    fn read_destination_id(&self, idp: UserPtr) -> Result<HandleId, Error>;

    /// Write the resolved destination-local handle ID back to `idp` (spec
    /// §4.3 Phase 3). A failure here is a [`Error::Fault`], recorded but
    /// never aborting the rest of commit.
    fn write_destination_id(&self, idp: UserPtr, value: HandleId) -> Result<(), Error>;
}
