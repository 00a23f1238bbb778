// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Stop-the-world mark-sweep-compact garbage collection.
//!
//! Liveness is reachability from the thread's root set: every frame's
//! context, function and argument/register slots, plus the accumulator.
//! Cycles (closure → context → closure) collect naturally; there is no
//! reference counting anywhere in the runtime.
//!
//! Marking is iterative over an explicit grey worklist, so arbitrarily
//! deep object graphs cannot overflow the control stack. The compact phase
//! defragments the slot storage, rewrites every forwarded handle (roots
//! and heap-internal alike) and only then releases the forwarders, leaving
//! donor pages empty.


use core::ptr::NonNull;

use crate::heap::Heap;
use crate::object::HeapObject;
use crate::slots::{Mark, Slot, SlotDisposition};
use crate::thread::{StackFrame, for_each_root};
use crate::value::{Handle, Value};

/// Collection threshold floor: a cycle runs once this many objects are
/// live, and the threshold never resets below it.
pub const INITIAL_GC_THRESHOLD: usize = 1024;

/// How a thread schedules its collection work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GcStrategy {
    /// Mark, sweep and compact in one pause.
    #[default]
    SinglePass,
    /// Alternate a mark-only pause with a sweep+compact pause on
    /// consecutive invocations, trading throughput for shorter pauses.
    ///
    /// Objects allocated between the two pauses are born black so the
    /// deferred sweep cannot free them.
    TwoPass,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TwoPassPhase {
    Mark,
    SweepCompact,
}

/// Per-thread collector state.
pub struct Collector {
    strategy: GcStrategy,
    next_gc: usize,
    next_pass: TwoPassPhase,
}

impl Collector {
    /// Create a collector with the initial threshold.
    #[must_use]
    pub const fn new(strategy: GcStrategy) -> Self {
        Self {
            strategy,
            next_gc: INITIAL_GC_THRESHOLD,
            next_pass: TwoPassPhase::Mark,
        }
    }

    /// Whether allocation pressure warrants a collection.
    #[must_use]
    pub const fn should_collect(&self, live_objects: usize) -> bool {
        live_objects >= self.next_gc
    }

    /// The current threshold.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.next_gc
    }

    /// Run one collection invocation against the given thread state.
    pub(crate) fn collect(
        &mut self,
        heap: &mut Heap,
        sp: *mut StackFrame,
        acc: &mut Handle<Value>,
    ) {
        match self.strategy {
            GcStrategy::SinglePass => {
                let before = heap.live_objects();
                mark(sp, acc);
                let freed = sweep(heap);
                compact(heap, sp, acc);
                self.reset_threshold(heap);
                tracing::debug!(
                    live_before = before,
                    live_after = heap.live_objects(),
                    freed,
                    pages = heap.page_count(),
                    next_gc = self.next_gc,
                    "gc cycle"
                );
            }
            GcStrategy::TwoPass => match self.next_pass {
                TwoPassPhase::Mark => {
                    mark(sp, acc);
                    heap.set_allocation_mark(Mark::Black);
                    self.next_pass = TwoPassPhase::SweepCompact;
                    tracing::debug!(live = heap.live_objects(), "gc mark pass");
                }
                TwoPassPhase::SweepCompact => {
                    let before = heap.live_objects();
                    let freed = sweep(heap);
                    compact(heap, sp, acc);
                    heap.set_allocation_mark(Mark::White);
                    self.next_pass = TwoPassPhase::Mark;
                    self.reset_threshold(heap);
                    tracing::debug!(
                        live_before = before,
                        live_after = heap.live_objects(),
                        freed,
                        next_gc = self.next_gc,
                        "gc sweep pass"
                    );
                }
            },
        }
    }

    fn reset_threshold(&mut self, heap: &Heap) {
        self.next_gc = INITIAL_GC_THRESHOLD.max(2 * heap.live_objects());
    }
}

/// Colour a reachable slot grey and queue it for scanning.
fn push_grey(handle: Handle<Value>, worklist: &mut Vec<NonNull<Slot<HeapObject>>>) {
    let Some(slot) = handle.resolved_slot() else {
        return;
    };
    // SAFETY: a reachable handle addresses a live slot; the collector has
    // exclusive access to the heap during the pause.
    let slot_ref = unsafe { &mut *slot.as_ptr() };
    if slot_ref.mark() == Mark::White {
        slot_ref.set_mark(Mark::Grey);
        worklist.push(slot);
    }
}

/// Mark every object reachable from the root set.
fn mark(sp: *mut StackFrame, acc: &mut Handle<Value>) {
    let mut worklist: Vec<NonNull<Slot<HeapObject>>> = Vec::new();

    // SAFETY: the thread is paused; sp is its live frame chain.
    unsafe {
        for_each_root(sp, acc, |handle| push_grey(*handle, &mut worklist));
    }

    while let Some(slot) = worklist.pop() {
        // SAFETY: grey slots are live; their objects are owned by the heap.
        let object = unsafe { &mut *slot.as_ref().object_ptr() };
        object.for_each_reference(&mut |handle| push_grey(*handle, &mut worklist));
        // SAFETY: the slot is live and uniquely accessed during the pause.
        unsafe { (*slot.as_ptr()).set_mark(Mark::Black) };
    }
}

/// Destroy every object the mark phase did not reach; repaint survivors
/// white for the next cycle.
fn sweep(heap: &mut Heap) -> usize {
    let mut freed = 0usize;
    heap.for_each_slot(|slot| {
        if slot.mark() == Mark::Black {
            slot.set_mark(Mark::White);
            SlotDisposition::Retain
        } else {
            freed += 1;
            SlotDisposition::Release
        }
    });
    freed
}

/// Defragment the slot storage, rewrite every forwarded handle, then
/// release the forwarders so donor pages drain.
fn compact(heap: &mut Heap, sp: *mut StackFrame, acc: &mut Handle<Value>) {
    heap.defragment();

    // SAFETY: the thread is paused; sp is its live frame chain.
    unsafe {
        for_each_root(sp, acc, Handle::compress);
    }
    heap.for_each_slot(|slot| {
        // SAFETY: the handler only sees live slots owning their objects.
        let object = unsafe { &mut *slot.object_ptr() };
        object.for_each_reference(&mut |handle| handle.compress());
        SlotDisposition::Retain
    });

    heap.release_moved();
}
