//! Deferred reclamation of deleted entries.
//!
//! An entry deleted while other enumerators are open may still be the
//! current entry of one of them, so it is only unlinked. It joins the
//! table's pending queue and is finalized and freed, in unlink order,
//! when the last enumerator is ended.

use crate::entry::{EntryKey, Finalized};
use crate::table::Table;

impl<V, S> Table<V, S> {
    /// Frees an unlinked entry now if no other enumerator can be parked on
    /// it, otherwise queues it.
    pub(crate) fn retire(&mut self, k: EntryKey) {
        if self.sessions.len() <= 1 {
            self.release(k);
        } else {
            self.pending.push(k);
        }
    }

    /// Drains the pending queue. Called on the last `end`.
    pub(crate) fn reclaim(&mut self) {
        debug_assert!(self.sessions.is_empty());
        if self.pending.is_empty() {
            return;
        }
        let queue = core::mem::take(&mut self.pending);
        log::debug!(
            "Reclaiming {} deferred entries of table {:?}",
            queue.len(),
            self.id
        );
        for k in queue {
            self.release(k);
        }
    }

    /// Runs the finalize callback on `k` and frees it.
    fn release(&mut self, k: EntryKey) {
        if let Some(mut entry) = self.entries.remove(k) {
            debug_assert!(!entry.linked);
            self.param.run_finalize(Finalized::new(&mut entry));
        }
    }

    /// Teardown: pending entries first, then everything still linked.
    pub(crate) fn release_all(&mut self) {
        for k in core::mem::take(&mut self.pending) {
            self.release(k);
        }
        let Self {
            entries,
            param,
            buckets,
            ..
        } = self;
        for (_, mut entry) in entries.drain() {
            param.run_finalize(Finalized::new(&mut entry));
        }
        buckets.iter_mut().for_each(|head| *head = None);
        self.live = 0;
    }
}
