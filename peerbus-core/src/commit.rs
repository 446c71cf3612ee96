//! The staged-commit protocol (spec §4.3).
//!
//! Three phases — stage, resync, commit — run over every linked
//! destination. This is the one place in the crate that is allowed to
//! reason about more than one peer at a time, and even here at most one
//! peer's lock is held at any instant (spec §5, "avoid nested peer locks").

use alloc::vec::Vec;

use peerbus_abi::Timestamp;

use crate::error::Error;
use crate::handle_table::{HandleTable, TransferSet};
use crate::message::Message;
use crate::peer::PeerRef;
use crate::userspace::Importer;

/// Run the staged-commit protocol over every entry in `list`, consuming
/// it. `reserve_sender_tick` is `false` only for the
/// [`crate::transaction::Transaction::commit_for_id`] fast path, which has
/// no cross-destination ordering to protect and so skips Phase 0's
/// pre-reservation (spec §4.4) — but the sender's clock is still synced
/// forward to `T_final` before returning either way (spec §8 property 5).
///
/// `transfer_set` is consumed here: on any non-empty `list`, ownership of
/// its sender-side reference passes into each destination's
/// [`HandleTable::inflight_install`] call, and the set itself is released
/// exactly once via [`HandleTable::transfer_destroy`] once every
/// destination holds its own installed translation.
pub fn run(
    sender: &PeerRef,
    handle_table: &dyn HandleTable,
    importer: &dyn Importer,
    transfer_set: Option<TransferSet>,
    list: Vec<Message>,
    reserve_sender_tick: bool,
) -> Result<(), Error> {
    if list.is_empty() {
        log::trace!("commit: empty entry list, no-op");
        return Ok(());
    }

    // Phase 0 — reserve sender timestamp.
    let t0 = if reserve_sender_tick {
        sender.queue().tick()
    } else {
        0
    };

    // Phase 1 — stage on every destination.
    let mut t_final = 0u64;
    for msg in &list {
        let queue = msg.peer().queue();
        queue.sync(t0);
        let t = queue.tick();
        if t > t_final {
            t_final = t;
        }
        let woke = queue.stage(msg.node(), Timestamp::stage_of(t));
        if woke && !msg.is_silent() {
            msg.peer().wake();
        }
        log::trace!("commit: staged destination {} at {}", msg.peer().id(), t - 1);
    }

    // Sender-forward-progress (spec §8 property 5): whether or not Phase 0
    // pre-reserved a sender timestamp, the sender's own clock must reach
    // at least `T_final` once every destination has staged at or below it
    // — otherwise a later send from this sender could take a sender tick
    // smaller than a commit this one already produced.
    sender.queue().sync(t_final);

    // Phase 2 — synchronise every destination's clock forward past
    // T_final, closing the side-channel window described in spec §4.3.
    for msg in &list {
        msg.peer().queue().sync(t_final);
    }

    // Phase 3 — final commit per destination. Export and write-back run
    // unconditionally for every `M` (spec §4.3: "a user-space write fault
    // does not abort"); only the slice-stamp/promote step is conditional
    // on the instance surviving to commit.
    let mut fault = false;
    for mut msg in list {
        let dest_peer = msg.peer().id();
        let binding = msg.binding();
        let write_back = msg.write_back();
        let local_id = handle_table.dest_export(binding, dest_peer, Timestamp::commit_of(t_final));

        if let Some(idp) = write_back {
            if importer.write_destination_id(idp, local_id).is_err() {
                fault = true;
            }
        }

        if !msg.has_slice() || !msg.node().is_queued() {
            log::debug!("commit: dropping undelivered instance at peer {}", dest_peer);
            msg.drop_as_undelivered();
            continue;
        }

        if let Some(inflight) = msg.take_inflight() {
            if let Some(set) = &transfer_set {
                handle_table.inflight_install(inflight, dest_peer, set.clone(), sender.id());
            }
        }

        log::trace!("commit: delivering to peer {} at {}", dest_peer, t_final);
        msg.deliver(local_id, Timestamp::commit_of(t_final));
    }

    if let Some(set) = transfer_set {
        handle_table.transfer_destroy(set);
    }

    if fault {
        Err(Error::Fault)
    } else {
        Ok(())
    }
}
