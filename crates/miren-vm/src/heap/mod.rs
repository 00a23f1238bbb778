// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The managed heap: slot storage plus typed allocation entry points.
//!
//! All runtime objects of one interpreter live here. Allocation returns
//! handles that stay valid across defragmentation; liveness is established
//! only by reachability from the thread's root set during collection.


use core::fmt;

use crate::bytecode::Chunk;
use crate::object::{
    BytecodeFunction, Closure, Context, Function, HeapObject, HeapString, NativeCallable,
    NativeFunction,
};
use crate::slots::{Mark, Slot, SlotDisposition, SlotStorage};
use crate::value::{Handle, HeapKind, Value};

/// Heap failure modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The OS refused a new page; fatal to the owning thread.
    Exhausted,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("heap exhausted"),
        }
    }
}

impl core::error::Error for HeapError {}

/// Storage for all runtime objects of one interpreter.
#[derive(Default)]
pub struct Heap {
    storage: SlotStorage<HeapObject>,
    /// Colour of fresh allocations; black between the passes of a
    /// two-pass collection.
    allocation_mark: Mark,
}

// SAFETY: a Heap is sent to the thread that executes on it and accessed
// exclusively by that thread; the raw slot pointers inside never alias
// across threads.
unsafe impl Send for Heap {}

impl Heap {
    /// Create an empty heap. No pages are allocated until the first store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: SlotStorage::new(),
            allocation_mark: Mark::White,
        }
    }

    /// Store an object, returning a typed handle to its slot.
    pub fn store<T: HeapKind>(&mut self, object: HeapObject) -> Result<Handle<T>, HeapError> {
        let mut slot = self
            .storage
            .store(Box::new(object))
            .map_err(|_| HeapError::Exhausted)?;
        if self.allocation_mark != Mark::White {
            // SAFETY: the slot was just allocated and is exclusively ours.
            unsafe { slot.as_mut().set_mark(self.allocation_mark) };
        }
        Ok(Handle::from_value(Value::from_slot(slot)).cast::<T>())
    }

    /// Set the colour fresh allocations are born with.
    pub(crate) const fn set_allocation_mark(&mut self, mark: Mark) {
        self.allocation_mark = mark;
    }

    /// Allocate a string.
    pub fn alloc_string(&mut self, text: &str) -> Result<Handle<HeapString>, HeapError> {
        self.store(HeapObject::String(HeapString::new(text)))
    }

    /// Allocate an already-built string object (used by concatenation).
    pub fn store_string(&mut self, string: HeapString) -> Result<Handle<HeapString>, HeapError> {
        self.store(HeapObject::String(string))
    }

    /// Allocate a context of the given size below a parent (possibly empty).
    pub fn alloc_context(
        &mut self,
        parent: Handle<Context>,
        size: usize,
    ) -> Result<Handle<Context>, HeapError> {
        self.store(HeapObject::Context(Context::new(parent, size)))
    }

    /// Allocate a closure binding a function to a captured context.
    pub fn alloc_closure(
        &mut self,
        context: Handle<Context>,
        function: Handle<Function>,
    ) -> Result<Handle<Closure>, HeapError> {
        self.store(HeapObject::Closure(Closure::new(context, function)))
    }

    /// Allocate a bytecode function from a flushed chunk.
    pub fn alloc_function(&mut self, chunk: Chunk) -> Result<Handle<Function>, HeapError> {
        self.store(HeapObject::Function(Function::Bytecode(
            BytecodeFunction::new(chunk),
        )))
    }

    /// Allocate a native function from a host callback.
    pub fn alloc_native_function(
        &mut self,
        callable: Box<NativeCallable>,
    ) -> Result<Handle<Function>, HeapError> {
        self.store(HeapObject::Function(Function::Native(NativeFunction::new(
            callable,
        ))))
    }

    /// Number of objects currently stored (live plus, transiently during a
    /// collection, forwarded).
    #[must_use]
    pub const fn live_objects(&self) -> usize {
        self.storage.size()
    }

    /// Number of pages currently held.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.storage.page_count()
    }

    /// Visit every live slot; see [`SlotStorage::for_each_slot`].
    pub fn for_each_slot(&mut self, handler: impl FnMut(&mut Slot<HeapObject>) -> SlotDisposition) {
        self.storage.for_each_slot(handler);
    }

    /// Pack live slots into the smallest prefix of pages.
    pub fn defragment(&mut self) {
        self.storage.defragment();
    }

    /// Release forwarders once every handle has been rewritten.
    pub fn release_moved(&mut self) {
        self.storage.release_moved();
    }

    /// Return empty pages to the OS; returns how many were released.
    pub fn free_empty_pages(&mut self) -> usize {
        self.storage.free_empty_pages()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live_objects", &self.live_objects())
            .field("pages", &self.page_count())
            .finish()
    }
}
