//! Shared vocabulary for the multicast message-transaction core.
//!
//! This crate carries no logic — only the identifiers, limits, flag bits
//! and wire layouts that both the transaction engine (`peerbus-core`) and
//! whatever embeds it need to agree on. Mirrors the role `panda-abi` plays
//! for `panda-kernel`.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

/// A handle ID as seen by a single peer. Opaque outside that peer.
pub type HandleId = u64;

/// A peer's identity within the registry. Opaque; peers compare by equality only.
pub type PeerId = u64;

/// A node's identity within the handle table — the thing a [`HandleId`]
/// resolves to, shared across every peer that holds a handle to it.
///
/// (`HandleId` is forward-declared here as documentation only; the table
/// itself lives in `peerbus-core`, which this crate has no dependency on.)
pub type NodeId = u64;

/// A raw, OS-level file descriptor number.
pub type RawFd = i32;

/// Maximum number of byte-vector descriptors in one transaction.
pub const VEC_MAX: usize = 65535;

/// Maximum number of file-descriptor entries in one transaction.
pub const FD_MAX: usize = 65535;

/// Send flags recognised by the transaction engine.
///
/// Combine with bitwise OR; test with the `is_*` accessors.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendFlags(pub u32);

impl SendFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Per-destination pool-allocation or resolution errors are not
    /// propagated as transaction failures; the destination instead
    /// observes a dropped event.
    pub const CONTINUE: Self = Self(1 << 0);
    /// The instantiated message generates no wakeup-visible event beyond
    /// the dropped/committed counters. Ordering is unaffected.
    pub const SILENT: Self = Self(1 << 1);

    /// Combine flags with bitwise OR.
    #[inline]
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if the `CONTINUE` flag is set.
    #[inline]
    pub const fn is_continue(self) -> bool {
        self.0 & Self::CONTINUE.0 != 0
    }

    /// Check if the `SILENT` flag is set.
    #[inline]
    pub const fn is_silent(self) -> bool {
        self.0 & Self::SILENT.0 != 0
    }
}

/// A 64-bit per-peer logical timestamp.
///
/// The low bit distinguishes *staging* (set) from *committed* (clear).
/// Staging at `t - 1` and committing at `t` share the same slot; ordinary
/// integer comparison of the full 64-bit value still orders nodes
/// correctly because `t - 1 < t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wrap a raw tick value `t` as the *committed* timestamp `t`.
    pub const fn commit_of(tick: u64) -> Self {
        Timestamp(tick & !1)
    }

    /// Wrap a raw tick value `t` as the *staging* timestamp `t - 1`.
    ///
    /// `tick` must be non-zero; a fresh tick from a logical clock always is.
    pub const fn stage_of(tick: u64) -> Self {
        Timestamp((tick - 1) | 1)
    }

    /// The raw 64-bit value, for storage in a queue node.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Reconstruct a `Timestamp` from a raw stored value.
    pub const fn from_raw(raw: u64) -> Self {
        Timestamp(raw)
    }

    /// Whether this timestamp represents a committed (as opposed to staged) node.
    pub const fn is_committed(self) -> bool {
        self.0 & 1 == 0
    }
}

/// Sender identity and slice-header metadata stamped into a destination's
/// pool slice, translated into the destination's namespaces.
///
/// Field order and `repr(C)` mirror the fixed-layout ABI structs in
/// `panda-abi` (e.g. its `SpawnParams`): a plain `Copy` struct with no
/// padding-sensitive logic, safe to treat as a byte blob once written.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    /// Sender UID, translated through the destination's user namespace.
    pub uid: u32,
    /// Sender GID, translated through the destination's user namespace.
    pub gid: u32,
    /// Sender PID, translated through the destination's PID namespace.
    pub pid: u32,
    /// Sender TID, translated through the destination's PID namespace.
    pub tid: u32,
    /// Destination-local ID of the message's target node.
    ///
    /// Filled in only at commit (Phase 3); `0` until then.
    pub destination_id: u64,
    /// Total length of the payload that follows this header.
    pub payload_len: u64,
}

impl SliceHeader {
    /// Build a header with everything but `destination_id` filled in.
    /// `destination_id` defaults to `0` and is stamped at commit time.
    pub const fn new(uid: u32, gid: u32, pid: u32, tid: u32, payload_len: u64) -> Self {
        SliceHeader {
            uid,
            gid,
            pid,
            tid,
            destination_id: 0,
            payload_len,
        }
    }
}
