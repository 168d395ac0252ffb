//! The flush-request queue (`FQueue`): a ring, parallel to but distinct
//! from the byte ring in [`crate::buffer`], that groups buffered bytes into
//! bounded units the flusher hands to `write()` one at a time.
//!
//! This queue's index space is explicit and never reused from the byte
//! ring's indices.

/// One flush-request slot: a contiguous run of bytes, all sharing a single
/// `dual_write` flag, awaiting a single `write()` call.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FlushSlot {
    pub nflush: u16,
    pub dual_write: bool,
}

/// Fixed-capacity ring of [`FlushSlot`]s.
///
/// Invariants:
/// - Empty iff `fbgn == fend` and `slots[fend].nflush == 0`.
/// - Entries between `fbgn` and `fend` are monotonically ordered with
///   respect to ring wrap.
/// - `dw_end` marks the final-slot index of a completed dual-write cleanup
///   region, or `None` if no cleanup is pending.
#[derive(Debug)]
pub(crate) struct FlushQueue {
    slots: Box<[FlushSlot]>,
    fbgn: usize,
    fend: usize,
    dw_end: Option<usize>,
    flush_auto_size: u32,
}

impl FlushQueue {
    pub(crate) fn new(capacity: usize, flush_auto_size: u32) -> Self {
        assert!(capacity > 0, "flush queue capacity must be nonzero");
        Self {
            slots: vec![FlushSlot::default(); capacity].into_boxed_slice(),
            fbgn: 0,
            fend: 0,
            dw_end: None,
            flush_auto_size,
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fbgn == self.fend && self.slots[self.fend].nflush == 0
    }

    pub(crate) fn fbgn(&self) -> usize {
        self.fbgn
    }

    pub(crate) fn dw_end(&self) -> Option<usize> {
        self.dw_end
    }

    pub(crate) fn slot(&self, index: usize) -> FlushSlot {
        self.slots[index]
    }

    pub(crate) fn fend(&self) -> usize {
        self.fend
    }

    /// Whether there is at least one fully-closed slot of queued work ahead
    /// of `fbgn` (distinct from `fend`'s own, possibly still-open, slot).
    pub(crate) fn has_pending_before_fend(&self) -> bool {
        self.fbgn != self.fend
    }

    /// Closes the current tail slot (advances `fend`) if it holds any
    /// bytes. Returns whether a slot was closed.
    pub(crate) fn close_tail_if_nonempty(&mut self) -> bool {
        if self.slots[self.fend].nflush > 0 {
            self.fend = (self.fend + 1) % self.len();
            true
        } else {
            false
        }
    }

    /// Appends `remaining` bytes worth of flush work tagged `dual_write`,
    /// splitting across slots at the 32 KiB (`flush_auto_size`) boundary
    /// but never across a ring wrap -- the caller is responsible for
    /// calling [`Self::close_tail_if_nonempty`] before this when the byte
    /// ring itself wrapped.
    pub(crate) fn append(&mut self, mut remaining: u32, dual_write: bool) {
        if self.slots[self.fend].nflush > 0 && self.slots[self.fend].dual_write != dual_write {
            self.fend = (self.fend + 1) % self.len();
        }

        while remaining > 0 {
            let slot = &mut self.slots[self.fend];
            if slot.nflush == 0 {
                slot.dual_write = dual_write;
            }

            let spare = self.flush_auto_size - u32::from(slot.nflush);
            let take = spare.min(remaining);
            slot.nflush += take as u16;
            remaining -= take;

            if u32::from(slot.nflush) == self.flush_auto_size {
                self.fend = (self.fend + 1) % self.len();
            }
        }
    }

    /// Clears the consumed slot at `fbgn` and advances it. Called by the
    /// flusher once a slot's bytes have been written out.
    pub(crate) fn consume_fbgn(&mut self) {
        self.slots[self.fbgn] = FlushSlot::default();
        self.fbgn = (self.fbgn + 1) % self.len();
    }

    /// Marks the boundary of a just-completed dual-write cleanup region:
    /// every slot in `[fbgn, dw_end)` is pre-rotation tail still owed to
    /// the old file.
    ///
    /// # Panics
    ///
    /// Panics if a cleanup window is already pending, matching the spec's
    /// assertion that at most one exists at a time.
    pub(crate) fn mark_dual_write_end(&mut self) {
        assert!(self.dw_end.is_none(), "dual-write cleanup already pending");
        self.dw_end = Some(self.fend);
    }

    pub(crate) fn clear_dual_write_end(&mut self) {
        self.dw_end = None;
    }

    /// Clears the `dual_write` flag on every non-empty slot from `fbgn`
    /// onward -- used when a rotation is aborted.
    pub(crate) fn clear_all_dual_write_flags(&mut self) {
        let mut i = self.fbgn;
        loop {
            if self.slots[i].nflush > 0 {
                self.slots[i].dual_write = false;
            }
            if i == self.fend {
                break;
            }
            i = (i + 1) % self.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_has_fbgn_eq_fend() {
        let q = FlushQueue::new(4, 32 * 1024);
        assert!(q.is_empty());
    }

    #[test]
    fn append_fills_single_slot() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(500, false);
        assert!(!q.is_empty());
        assert_eq!(q.slot(q.fbgn()).nflush, 500);
        assert!(!q.slot(q.fbgn()).dual_write);
    }

    #[test]
    fn append_splits_across_slots_at_auto_size_boundary() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(1500, false); // 1024 into slot 0, 476 into slot 1
        assert_eq!(q.slot(0).nflush, 1024);
        assert_eq!(q.slot(1).nflush, 476);
    }

    #[test]
    fn differing_dual_write_flag_closes_tail_slot() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(100, false);
        q.append(50, true);
        assert_eq!(q.slot(0).nflush, 100);
        assert!(!q.slot(0).dual_write);
        assert_eq!(q.slot(1).nflush, 50);
        assert!(q.slot(1).dual_write);
    }

    #[test]
    fn consume_fbgn_zeroes_and_advances() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(100, false);
        q.consume_fbgn();
        assert!(q.is_empty());
        assert_eq!(q.slot(0).nflush, 0);
    }

    #[test]
    fn dual_write_end_tracks_cleanup_boundary() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(100, true);
        q.close_tail_if_nonempty();
        q.mark_dual_write_end();
        assert_eq!(q.dw_end(), Some(1));
        q.clear_dual_write_end();
        assert_eq!(q.dw_end(), None);
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn mark_dual_write_end_twice_panics() {
        let mut q = FlushQueue::new(4, 1024);
        q.mark_dual_write_end();
        q.mark_dual_write_end();
    }

    #[test]
    fn abort_clears_dual_write_flags_on_pending_slots() {
        let mut q = FlushQueue::new(4, 1024);
        q.append(100, true);
        q.close_tail_if_nonempty();
        q.append(50, true);
        q.clear_all_dual_write_flags();
        assert!(!q.slot(0).dual_write);
        assert!(!q.slot(1).dual_write);
    }
}
