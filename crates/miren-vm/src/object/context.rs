// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Lexical contexts: captured scope bindings.

use core::fmt;

use crate::bytecode::ContextDescriptor;
use crate::value::{Handle, Value};

/// Failure modes of context slot access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// A load or store hit a slot that was never declared.
    UndeclaredSlot,
    /// A declare hit a slot that was already declared.
    RedeclaredSlot,
    /// The descriptor's depth walked past the outermost context.
    DepthOutOfRange,
    /// The descriptor's index lies outside the context's slots.
    IndexOutOfRange,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndeclaredSlot => f.write_str("context slot used before declaration"),
            Self::RedeclaredSlot => f.write_str("context slot declared twice"),
            Self::DepthOutOfRange => f.write_str("context depth out of range"),
            Self::IndexOutOfRange => f.write_str("context index out of range"),
        }
    }
}

impl core::error::Error for ContextError {}

/// A fixed-length array of value slots representing one lexical scope's
/// captured bindings, linked to its parent.
///
/// Slots start out *empty*; `DeclareContext` binds a fresh null, after
/// which loads and stores are legal.
#[derive(Debug)]
pub struct Context {
    parent: Handle<Context>,
    slots: Box<[Handle<Value>]>,
}

impl Context {
    /// Create a context of the given size below a parent (possibly empty).
    #[must_use]
    pub(crate) fn new(parent: Handle<Self>, size: usize) -> Self {
        Self {
            parent,
            slots: vec![Handle::empty(); size].into_boxed_slice(),
        }
    }

    /// The enclosing context, empty at the outermost level.
    #[must_use]
    pub const fn parent(&self) -> Handle<Self> {
        self.parent
    }

    /// Number of slots this context carries.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Visit the parent handle and every slot.
    pub(crate) fn for_each_reference(&mut self, f: &mut dyn FnMut(&mut Handle<Value>)) {
        f(self.parent.erased_mut());
        for slot in &mut self.slots {
            f(slot);
        }
    }

    /// Walk `depth` parent links from `start`.
    fn at_depth(start: Handle<Self>, depth: i32) -> Result<Handle<Self>, ContextError> {
        let mut current = start;
        for _ in 0..depth {
            if current.is_empty() {
                return Err(ContextError::DepthOutOfRange);
            }
            current = current.get().parent;
        }
        if current.is_empty() {
            return Err(ContextError::DepthOutOfRange);
        }
        Ok(current)
    }

    /// Bind a fresh null in the slot the descriptor names.
    pub(crate) fn declare(
        start: Handle<Self>,
        descriptor: ContextDescriptor,
    ) -> Result<(), ContextError> {
        let target = Self::at_depth(start, descriptor.depth)?;
        // SAFETY: the dispatch loop has exclusive access to its heap.
        let context = unsafe { target.get_mut_unchecked() };
        let slot = context
            .slots
            .get_mut(usize::try_from(descriptor.index).map_err(|_| ContextError::IndexOutOfRange)?)
            .ok_or(ContextError::IndexOutOfRange)?;
        if !slot.is_empty() {
            return Err(ContextError::RedeclaredSlot);
        }
        *slot = Handle::from_value(Value::null());
        Ok(())
    }

    /// Read the slot the descriptor names.
    pub(crate) fn load(
        start: Handle<Self>,
        descriptor: ContextDescriptor,
    ) -> Result<Handle<Value>, ContextError> {
        let target = Self::at_depth(start, descriptor.depth)?;
        let context = target.get();
        let slot = context
            .slots
            .get(usize::try_from(descriptor.index).map_err(|_| ContextError::IndexOutOfRange)?)
            .ok_or(ContextError::IndexOutOfRange)?;
        if slot.is_empty() {
            return Err(ContextError::UndeclaredSlot);
        }
        Ok(*slot)
    }

    /// Write the slot the descriptor names.
    pub(crate) fn store(
        start: Handle<Self>,
        descriptor: ContextDescriptor,
        value: Handle<Value>,
    ) -> Result<(), ContextError> {
        let target = Self::at_depth(start, descriptor.depth)?;
        // SAFETY: the dispatch loop has exclusive access to its heap.
        let context = unsafe { target.get_mut_unchecked() };
        let slot = context
            .slots
            .get_mut(usize::try_from(descriptor.index).map_err(|_| ContextError::IndexOutOfRange)?)
            .ok_or(ContextError::IndexOutOfRange)?;
        if slot.is_empty() {
            return Err(ContextError::UndeclaredSlot);
        }
        *slot = value;
        Ok(())
    }
}
