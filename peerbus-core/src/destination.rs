//! The handle-destination binding (spec §3, §4.2 step 1-2).
//!
//! A scoped binding from a caller-supplied handle ID to a live destination
//! peer, plus the write-back slot for the resolved ID. Consumed into a
//! [`crate::message::Message`] on a successful instantiate; otherwise
//! released on its own.

use crate::handle_table::Binding;
use crate::peer::PeerRef;
use crate::userspace::UserPtr;

/// A resolved destination: which peer, which node, and where to write the
/// destination-local ID back to (if the caller wants it).
pub struct Destination {
    peer: PeerRef,
    binding: Binding,
    write_back: Option<UserPtr>,
}

impl Destination {
    /// Build a binding from a resolved peer and node/handle binding.
    /// `write_back` is `None` for broadcast-without-reply (spec §3).
    pub fn new(peer: PeerRef, binding: Binding, write_back: Option<UserPtr>) -> Self {
        Destination {
            peer,
            binding,
            write_back,
        }
    }

    /// The resolved destination peer.
    pub fn peer(&self) -> &PeerRef {
        &self.peer
    }

    /// The resolved node/handle binding.
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Where to write the resolved destination-local ID back, if the
    /// caller supplied a slot.
    pub fn write_back(&self) -> Option<UserPtr> {
        self.write_back
    }

    /// Consume the binding into its three parts, for installation into a
    /// [`crate::message::Message`]. Spec §9: "model as a move... avoid
    /// double-free by zeroing the source after the move" — taking `self`
    /// by value *is* that zeroing in Rust.
    pub fn into_parts(self) -> (PeerRef, Binding, Option<UserPtr>) {
        (self.peer, self.binding, self.write_back)
    }
}
