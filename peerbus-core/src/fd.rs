//! Owned file-descriptor holders (spec §3, §4.1 step 5, §4.2 step 8).
//!
//! A transaction imports one owning reference per descriptor; each
//! destination then gets its own independently-owned duplicate (spec §4.2
//! step 8: "install an independent owning reference into `M`"). Neither
//! duplication nor release is something this `no_std` crate can perform
//! itself — the embedder supplies both through [`FdOwner`], the same way
//! `panda-kernel`'s `UserAccess` supplies the page-table operations
//! `UserSlice` cannot perform on its own.

use alloc::sync::Arc;

use peerbus_abi::RawFd;

use crate::error::Error;

/// Duplicates and releases raw file descriptors on behalf of the core.
pub trait FdOwner: Send + Sync {
    /// Produce a new, independently-owned descriptor referring to the same
    /// open file description as `fd`.
    fn duplicate(&self, fd: RawFd) -> Result<RawFd, Error>;

    /// Close a descriptor this crate is done owning.
    fn release(&self, fd: RawFd);
}

/// A single owned file descriptor.
///
/// Closes `fd` via its [`FdOwner`] on drop unless consumed first through
/// [`FdHolder::into_raw`] — the move-and-zero discipline spec §9 asks for.
pub struct FdHolder {
    fd: Option<RawFd>,
    owner: Arc<dyn FdOwner>,
}

impl FdHolder {
    /// Take ownership of an already-duplicated or freshly-imported
    /// descriptor.
    pub fn new(fd: RawFd, owner: Arc<dyn FdOwner>) -> Self {
        FdHolder {
            fd: Some(fd),
            owner,
        }
    }

    /// The raw descriptor number, without relinquishing ownership.
    ///
    /// Panics if called after [`FdHolder::into_raw`] has consumed the
    /// holder — which cannot happen, since that method takes `self`.
    pub fn raw(&self) -> RawFd {
        self.fd.expect("fd read after into_raw consumed the holder")
    }

    /// Duplicate this descriptor into a new, independently-owned holder —
    /// used once per destination at instantiation (spec §4.2 step 8).
    pub fn duplicate(&self) -> Result<FdHolder, Error> {
        let dup = self.owner.duplicate(self.raw())?;
        Ok(FdHolder {
            fd: Some(dup),
            owner: self.owner.clone(),
        })
    }

    /// Consume the holder and return the raw descriptor without closing
    /// it — used when ownership passes permanently to a destination on
    /// successful delivery.
    pub fn into_raw(mut self) -> RawFd {
        self.fd.take().expect("fd already taken")
    }
}

impl Drop for FdHolder {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.owner.release(fd);
        }
    }
}
