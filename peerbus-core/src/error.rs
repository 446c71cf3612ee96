//! Error kinds for the transaction core.
//!
//! A plain enum, the same shape as `panda-kernel`'s `ChannelError` and
//! `SyscallError`: no `thiserror`/`anyhow`, just `Debug + Clone + Copy +
//! PartialEq + Eq` so callers can match on it without an allocation.

/// Failure modes defined by spec §7.
///
/// `SilentDrop` is intentionally absent here — a destination removing its
/// staged node before commit is never surfaced as a transaction error (see
/// [`crate::commit`]); it only increments that destination's dropped
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Count overflow, a malformed `(base, len)` vector descriptor, or a
    /// count exceeding [`peerbus_abi::VEC_MAX`]/[`peerbus_abi::FD_MAX`].
    InvalidArgument,
    /// Transaction storage, a message instance, or an inflight handle set
    /// could not be allocated.
    OutOfMemory,
    /// A handle ID (destination or transfer) did not resolve.
    HandleNotFound,
    /// The destination's pool refused the slice and `CONTINUE` was not
    /// set, or the destination's node was destroyed mid-transaction.
    PeerUnreachable,
    /// A user-space read of the inputs failed, or a user-space write of a
    /// resolved destination ID failed.
    Fault,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Error::InvalidArgument => "invalid argument",
            Error::OutOfMemory => "out of memory",
            Error::HandleNotFound => "handle not found",
            Error::PeerUnreachable => "peer unreachable",
            Error::Fault => "fault",
        };
        f.write_str(s)
    }
}
