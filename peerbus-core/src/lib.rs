//! The multicast message-transaction core (spec.md §1-§9).
//!
//! A capability-based IPC bus delivers one sender's message to any number
//! of destination peers atomically with respect to a global causal order.
//! This crate is the two-phase staged-commit engine that makes that
//! guarantee hold under per-peer Lamport-style logical clocks; everything
//! it needs from the rest of a kernel — a peer registry, per-peer queues
//! and pools, a handle table, and a user-space import layer — is named
//! here only as a trait. An embedder supplies the concrete objects, the
//! same way `panda-kernel` hands its own `Resource`/`SchemeHandler` traits
//! to whichever driver implements them.
//!
//! `no_std` by default, compiled with `std` (or under `cfg(test)`) so the
//! in-memory test fakes under `tests/support/` can use `std::sync` and
//! friends.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod clock;
pub mod commit;
pub mod destination;
pub mod error;
pub mod fd;
pub mod handle_table;
pub mod identity;
pub mod message;
pub mod peer;
pub mod pool;
pub mod queue;
pub mod transaction;
pub mod userspace;

pub use error::Error;
pub use transaction::{ConstructParams, Transaction};
