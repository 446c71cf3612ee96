//! Sender identity snapshot (spec §3, §9).
//!
//! Captured exactly once at construction, per spec §9: "do not re-read per
//! message; a single record captured at construction ensures all
//! destinations observe identical sender metadata."

/// Sender credentials and process/thread identity, as seen at the moment a
/// transaction was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderIdentity {
    /// Sender user ID, in the sender's own namespace.
    pub uid: u32,
    /// Sender group ID, in the sender's own namespace.
    pub gid: u32,
    /// Sender process ID (thread-group ID), in the sender's own namespace.
    pub pid: u32,
    /// Sender thread ID, in the sender's own namespace.
    pub tid: u32,
}

impl SenderIdentity {
    /// Build a snapshot from the four credential fields.
    pub const fn new(uid: u32, gid: u32, pid: u32, tid: u32) -> Self {
        SenderIdentity { uid, gid, pid, tid }
    }
}
